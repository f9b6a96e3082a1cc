// 内存中 ELF 映像解析：定位某个导入符号的全部 GOT 槽位并改写

use crate::errno::Errno;
use crate::log;
use std::ffi::{CStr, c_char};
use std::mem;
use std::ptr;
use std::slice;

// ELF 符号哈希算法
mod hash;
// 重定位条目的 r_sym / r_type 提取
mod reloc;

use hash::{elf_gnu_hash, elf_hash};
use reloc::{elf_r_sym, elf_r_type};

const EI_NIDENT: usize = 16;
const EI_CLASS: usize = 4;
const EI_DATA: usize = 5;
const EI_VERSION: usize = 6;

const ELFMAG: [u8; 4] = [0x7f, b'E', b'L', b'F'];

const ELFCLASS64: u8 = 2;
const ELFDATA2LSB: u8 = 1;
const EV_CURRENT: u8 = 1;

const ET_EXEC: u16 = 2;
const ET_DYN: u16 = 3;
const PT_LOAD: u32 = 1;
const PT_DYNAMIC: u32 = 2;

const DT_NULL: i64 = 0;
const DT_PLTRELSZ: i64 = 2;
const DT_HASH: i64 = 4;
const DT_STRTAB: i64 = 5;
const DT_SYMTAB: i64 = 6;
const DT_RELA: i64 = 7;
const DT_RELASZ: i64 = 8;
const DT_REL: i64 = 17;
const DT_RELSZ: i64 = 18;
const DT_PLTREL: i64 = 20;
const DT_JMPREL: i64 = 23;
const DT_GNU_HASH: i64 = 0x6fff_fef5;

#[cfg(target_arch = "aarch64")]
const EXPECTED_MACHINE: u16 = 183;
#[cfg(target_arch = "x86_64")]
const EXPECTED_MACHINE: u16 = 62;

#[cfg(target_arch = "aarch64")]
const R_GENERIC_JUMP_SLOT: u32 = 1026;
#[cfg(target_arch = "aarch64")]
const R_GENERIC_GLOB_DAT: u32 = 1025;
#[cfg(target_arch = "aarch64")]
const R_GENERIC_ABS: u32 = 257;

#[cfg(target_arch = "x86_64")]
const R_GENERIC_JUMP_SLOT: u32 = 7;
#[cfg(target_arch = "x86_64")]
const R_GENERIC_GLOB_DAT: u32 = 6;
#[cfg(target_arch = "x86_64")]
const R_GENERIC_ABS: u32 = 1;

type ElfAddr = u64;
type ElfOff = u64;
type ElfWord = u32;
type ElfXword = u64;
type ElfSxword = i64;
type ElfHalf = u16;

#[repr(C)]
#[derive(Clone, Copy)]
struct ElfEhdr {
    e_ident: [u8; EI_NIDENT],
    e_type: ElfHalf,
    e_machine: ElfHalf,
    e_version: ElfWord,
    e_entry: ElfAddr,
    e_phoff: ElfOff,
    e_shoff: ElfOff,
    e_flags: ElfWord,
    e_ehsize: ElfHalf,
    e_phentsize: ElfHalf,
    e_phnum: ElfHalf,
    e_shentsize: ElfHalf,
    e_shnum: ElfHalf,
    e_shstrndx: ElfHalf,
}

#[repr(C)]
#[derive(Clone, Copy)]
struct ElfPhdr {
    p_type: ElfWord,
    p_flags: ElfWord,
    p_offset: ElfOff,
    p_vaddr: ElfAddr,
    p_paddr: ElfAddr,
    p_filesz: ElfXword,
    p_memsz: ElfXword,
    p_align: ElfXword,
}

#[repr(C)]
#[derive(Clone, Copy)]
struct ElfDyn {
    d_tag: ElfSxword,
    d_un: ElfXword,
}

#[repr(C)]
#[derive(Clone, Copy)]
struct ElfSym {
    st_name: ElfWord,
    st_info: u8,
    st_other: u8,
    st_shndx: ElfHalf,
    st_value: ElfAddr,
    st_size: ElfXword,
}

#[repr(C)]
#[derive(Clone, Copy)]
struct ElfRel {
    r_offset: ElfAddr,
    r_info: ElfXword,
}

#[repr(C)]
#[derive(Clone, Copy)]
struct ElfRela {
    r_offset: ElfAddr,
    r_info: ElfXword,
    r_addend: ElfSxword,
}

// 重定位表在内存中的位置，size 为字节数
#[derive(Clone, Copy, Default)]
struct RelTable {
    addr: usize,
    size: usize,
}

impl RelTable {
    fn is_empty(&self) -> bool {
        self.addr == 0 || self.size == 0
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
enum RelFormat {
    Rel,
    Rela,
}

// DT_HASH: nbucket | nchain | buckets[] | chains[]
#[derive(Clone, Copy)]
struct SysvHash {
    nbucket: u32,
    buckets: *const u32,
    chains: *const u32,
}

// DT_GNU_HASH: nbucket | symoffset | bloom_words | bloom_shift | bloom[] | buckets[] | chains[]
#[derive(Clone, Copy)]
struct GnuHash {
    nbucket: u32,
    symoffset: u32,
    bloom_words: u32,
    bloom_shift: u32,
    bloom: *const usize,
    buckets: *const u32,
    chains: *const u32,
}

// 两种哈希表同时存在时优先 GNU
#[derive(Clone, Copy)]
enum SymbolIndex {
    Sysv(SysvHash),
    Gnu(GnuHash),
}

impl SymbolIndex {
    fn kind(&self) -> &'static str {
        match self {
            Self::Sysv(_) => "SYSV_HASH",
            Self::Gnu(_) => "GNU_HASH",
        }
    }
}

/// Dynamic-section view of one loaded module, reduced to what is needed to
/// find and rewrite the GOT slots of an imported symbol.
pub struct Elf {
    pathname: String,
    load_base: usize,
    // load_base 与 ELF 虚拟地址之间的偏移量
    load_bias: usize,
    strtab: *const c_char,
    symtab: *const ElfSym,
    index: SymbolIndex,
    rel_format: RelFormat,
    jmprel: RelTable,
    dynrel: RelTable,
}

include!("elf/check_init.inc.rs");
include!("elf/lookup.inc.rs");
