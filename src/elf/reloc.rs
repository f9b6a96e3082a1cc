// ELF64 r_info：高 32 位为符号索引，低 32 位为重定位类型

use super::ElfXword;

pub(super) fn elf_r_sym(info: ElfXword) -> u32 {
    (info >> 32) as u32
}

pub(super) fn elf_r_type(info: ElfXword) -> u32 {
    (info & 0xffff_ffff) as u32
}
