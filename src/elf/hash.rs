// DT_HASH 与 DT_GNU_HASH 的符号哈希

pub(super) fn elf_hash(name: &[u8]) -> u32 {
    let mut h: u32 = 0;
    for &ch in name {
        h = (h << 4).wrapping_add(ch as u32);
        let g = h & 0xf000_0000;
        h ^= g;
        h ^= g >> 24;
    }
    h
}

pub(super) fn elf_gnu_hash(name: &[u8]) -> u32 {
    name.iter()
        .fold(5381u32, |h, &ch| h.wrapping_mul(33).wrapping_add(ch as u32))
}
