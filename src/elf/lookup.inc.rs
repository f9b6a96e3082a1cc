// 符号查找与 GOT 槽位收集，通过 include! 嵌入 elf.rs

impl SysvHash {
    unsafe fn lookup(&self, elf: &Elf, symbol: &str) -> Option<u32> {
        if self.nbucket == 0 {
            return None;
        }
        let hash = elf_hash(symbol.as_bytes());
        let mut idx = *self.buckets.add((hash % self.nbucket) as usize);
        while idx != 0 {
            if elf.sym_name(idx) == Some(symbol) {
                return Some(idx);
            }
            idx = *self.chains.add(idx as usize);
        }
        None
    }
}

impl GnuHash {
    // 先过 bloom filter，再按 bucket 遍历 chain，chain 值最低位为 1 表示链尾
    unsafe fn lookup_defined(&self, elf: &Elf, symbol: &str) -> Option<u32> {
        if self.nbucket == 0 {
            return None;
        }
        let hash = elf_gnu_hash(symbol.as_bytes());
        let word_bits = usize::BITS;
        let word = *self
            .bloom
            .add(((hash / word_bits) % self.bloom_words) as usize);
        let mask = (1usize << (hash % word_bits)) | (1usize << ((hash >> self.bloom_shift) % word_bits));
        if word & mask != mask {
            return None;
        }

        let mut idx = *self.buckets.add((hash % self.nbucket) as usize);
        if idx < self.symoffset {
            return None;
        }
        loop {
            let chain_hash = *self.chains.add((idx - self.symoffset) as usize);
            if hash | 1 == chain_hash | 1 && elf.sym_name(idx) == Some(symbol) {
                return Some(idx);
            }
            if chain_hash & 1 != 0 {
                return None;
            }
            idx += 1;
        }
    }

    // symoffset 之前是未进入哈希表的导入符号，只能线性扫描
    unsafe fn lookup_imported(&self, elf: &Elf, symbol: &str) -> Option<u32> {
        (0..self.symoffset).find(|&idx| elf.sym_name(idx) == Some(symbol))
    }
}

impl Elf {
    unsafe fn symbol_index(&self, symbol: &str) -> Option<u32> {
        match &self.index {
            SymbolIndex::Sysv(hash) => hash.lookup(self, symbol),
            SymbolIndex::Gnu(hash) => hash
                .lookup_defined(self, symbol)
                .or_else(|| hash.lookup_imported(self, symbol)),
        }
    }

    unsafe fn sym_name(&self, idx: u32) -> Option<&str> {
        let sym = &*self.symtab.add(idx as usize);
        CStr::from_ptr(self.strtab.add(sym.st_name as usize))
            .to_str()
            .ok()
    }

    /// Collects every GOT slot bound to `symbol`: JUMP_SLOT entries of the
    /// PLT relocation table plus GLOB_DAT/ABS entries of the dynamic one.
    /// An unknown symbol yields an empty list.
    pub unsafe fn find_got_slots(&self, symbol: &str) -> Result<Vec<usize>, Errno> {
        let Some(symidx) = self.symbol_index(symbol) else {
            return Ok(Vec::new());
        };

        let mut slots = Vec::new();
        for (table, from_plt) in [(self.jmprel, true), (self.dynrel, false)] {
            if table.is_empty() {
                continue;
            }
            for (r_offset, r_info) in self.relocations(table) {
                if elf_r_sym(r_info) != symidx || !is_slot_reloc(from_plt, elf_r_type(r_info)) {
                    continue;
                }
                let addr = self.load_bias + r_offset;
                if addr < self.load_base {
                    return Err(Errno::Format);
                }
                if !slots.contains(&addr) {
                    slots.push(addr);
                }
            }
        }
        Ok(slots)
    }

    unsafe fn relocations(&self, table: RelTable) -> Vec<(usize, ElfXword)> {
        match self.rel_format {
            RelFormat::Rela => {
                let count = table.size / mem::size_of::<ElfRela>();
                slice::from_raw_parts(table.addr as *const ElfRela, count)
                    .iter()
                    .map(|rela| (rela.r_offset as usize, rela.r_info))
                    .collect()
            }
            RelFormat::Rel => {
                let count = table.size / mem::size_of::<ElfRel>();
                slice::from_raw_parts(table.addr as *const ElfRel, count)
                    .iter()
                    .map(|rel| (rel.r_offset as usize, rel.r_info))
                    .collect()
            }
        }
    }
}

fn is_slot_reloc(from_plt: bool, r_type: u32) -> bool {
    if from_plt {
        r_type == R_GENERIC_JUMP_SLOT
    } else {
        matches!(r_type, R_GENERIC_GLOB_DAT | R_GENERIC_ABS)
    }
}

// GOT 槽位按指针宽度读写，页面保护由调用方处理
pub unsafe fn read_slot(addr: usize) -> usize {
    ptr::read_volatile(addr as *const usize)
}

pub unsafe fn write_slot(addr: usize, value: usize) {
    ptr::write_volatile(addr as *mut usize, value);
}
