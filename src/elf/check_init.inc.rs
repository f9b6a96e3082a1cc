// 模块映像校验与动态段解析，通过 include! 嵌入 elf.rs

// 动态段扫描的中间结果，全部字段齐备后才构造 Elf
#[derive(Default)]
struct DynamicInfo {
    strtab: Option<usize>,
    symtab: Option<usize>,
    sysv_hash: Option<usize>,
    gnu_hash: Option<usize>,
    rel_format: Option<RelFormat>,
    jmprel: RelTable,
    dynrel: RelTable,
}

// 只接受与当前进程同架构的 64 位小端 ELF
fn check_elf_header(ehdr: &ElfEhdr) -> Result<(), Errno> {
    let ident = &ehdr.e_ident;
    let ident_ok = ident[..ELFMAG.len()] == ELFMAG
        && ident[EI_CLASS] == ELFCLASS64
        && ident[EI_DATA] == ELFDATA2LSB
        && ident[EI_VERSION] == EV_CURRENT;
    let type_ok = matches!(ehdr.e_type, ET_EXEC | ET_DYN);
    if !ident_ok || !type_ok || ehdr.e_machine != EXPECTED_MACHINE {
        return Err(Errno::Format);
    }
    Ok(())
}

impl Elf {
    pub unsafe fn init(load_base: usize, pathname: &str) -> Result<Self, Errno> {
        if load_base == 0 {
            return Err(Errno::Invalid);
        }
        let ehdr = &*(load_base as *const ElfEhdr);
        check_elf_header(ehdr)?;
        let phdrs = slice::from_raw_parts(
            (load_base + ehdr.e_phoff as usize) as *const ElfPhdr,
            ehdr.e_phnum as usize,
        );

        // 首个文件偏移为 0 的 PT_LOAD 段对应 load_base
        let first_load = phdrs
            .iter()
            .find(|ph| ph.p_type == PT_LOAD && ph.p_offset == 0)
            .ok_or(Errno::Format)?;
        let load_bias = load_base
            .checked_sub(first_load.p_vaddr as usize)
            .ok_or(Errno::Format)?;
        let dynamic = phdrs
            .iter()
            .find(|ph| ph.p_type == PT_DYNAMIC)
            .ok_or(Errno::Format)?;
        let dyn_entries = slice::from_raw_parts(
            (load_bias + dynamic.p_vaddr as usize) as *const ElfDyn,
            dynamic.p_memsz as usize / mem::size_of::<ElfDyn>(),
        );

        let info = scan_dynamic(dyn_entries, load_base, load_bias)?;
        let strtab = info.strtab.ok_or(Errno::Format)? as *const c_char;
        let symtab = info.symtab.ok_or(Errno::Format)? as *const ElfSym;
        let index = match (info.gnu_hash, info.sysv_hash) {
            (Some(addr), _) => SymbolIndex::Gnu(GnuHash::parse(addr as *const u32)?),
            (None, Some(addr)) => SymbolIndex::Sysv(SysvHash::parse(addr as *const u32)),
            (None, None) => return Err(Errno::Format),
        };

        let elf = Elf {
            pathname: pathname.to_string(),
            load_base,
            load_bias,
            strtab,
            symtab,
            index,
            rel_format: info.rel_format.unwrap_or(RelFormat::Rela),
            jmprel: info.jmprel,
            dynrel: info.dynrel,
        };
        log::debug(format_args!(
            "elf {}: {:?} {} jmprel {} dynrel {}",
            elf.pathname,
            elf.rel_format,
            elf.index.kind(),
            elf.jmprel.size,
            elf.dynrel.size
        ));
        Ok(elf)
    }

    pub fn pathname(&self) -> &str {
        &self.pathname
    }
}

fn scan_dynamic(
    entries: &[ElfDyn],
    load_base: usize,
    load_bias: usize,
) -> Result<DynamicInfo, Errno> {
    let mut info = DynamicInfo::default();
    for entry in entries {
        if entry.d_tag == DT_NULL {
            break;
        }
        let value = entry.d_un as usize;
        let addr = || to_runtime_addr(value, load_base, load_bias);
        match entry.d_tag {
            DT_STRTAB => info.strtab = Some(addr()?),
            DT_SYMTAB => info.symtab = Some(addr()?),
            DT_HASH => info.sysv_hash = Some(addr()?),
            DT_GNU_HASH => info.gnu_hash = Some(addr()?),
            DT_PLTREL => {
                info.rel_format = Some(if entry.d_un as i64 == DT_RELA {
                    RelFormat::Rela
                } else {
                    RelFormat::Rel
                })
            }
            DT_JMPREL => info.jmprel.addr = addr()?,
            DT_PLTRELSZ => info.jmprel.size = value,
            DT_REL | DT_RELA => info.dynrel.addr = addr()?,
            DT_RELSZ | DT_RELASZ => info.dynrel.size = value,
            _ => {}
        }
    }
    Ok(info)
}

// bionic 的动态段保存虚拟地址，glibc 加载后会改写为绝对地址
fn to_runtime_addr(value: usize, load_base: usize, load_bias: usize) -> Result<usize, Errno> {
    let addr = if load_bias != 0 && value >= load_base {
        value
    } else {
        load_bias.wrapping_add(value)
    };
    if addr < load_base {
        return Err(Errno::Format);
    }
    Ok(addr)
}

impl SysvHash {
    unsafe fn parse(raw: *const u32) -> Self {
        let nbucket = *raw;
        let buckets = raw.add(2);
        Self {
            nbucket,
            buckets,
            chains: buckets.add(nbucket as usize),
        }
    }
}

impl GnuHash {
    unsafe fn parse(raw: *const u32) -> Result<Self, Errno> {
        let nbucket = *raw;
        let bloom_words = *raw.add(2);
        if bloom_words == 0 {
            return Err(Errno::Format);
        }
        let bloom = raw.add(4) as *const usize;
        let buckets = bloom.add(bloom_words as usize) as *const u32;
        Ok(Self {
            nbucket,
            symoffset: *raw.add(1),
            bloom_words,
            bloom_shift: *raw.add(3),
            bloom,
            buckets,
            chains: buckets.add(nbucket as usize),
        })
    }
}
