// GOT 所在页面的保护属性读取与修改
use crate::errno::Errno;
use crate::log;
use std::sync::atomic::{Ordering, fence};

use super::maps::MapsEntry;

pub(crate) const PROT_READ_FLAG: i32 = libc::PROT_READ;
pub(crate) const PROT_WRITE_FLAG: i32 = libc::PROT_WRITE;
pub(crate) const PROT_EXEC_FLAG: i32 = libc::PROT_EXEC;

// 查询覆盖 [addr, addr+len) 的私有映射权限，跨段时取交集
pub(crate) fn mem_protect(entries: &[MapsEntry], addr: usize, len: usize) -> Result<i32, Errno> {
    let end_addr = addr.saturating_add(len);
    let mut cursor = addr;
    let mut prot: Option<i32> = None;

    for entry in entries {
        if !entry.is_private() || cursor < entry.start || cursor >= entry.end {
            continue;
        }
        let perms = entry.perms.as_bytes();
        let mut entry_prot = 0;
        if perms.first() == Some(&b'r') {
            entry_prot |= PROT_READ_FLAG;
        }
        if perms.get(1) == Some(&b'w') {
            entry_prot |= PROT_WRITE_FLAG;
        }
        if perms.get(2) == Some(&b'x') {
            entry_prot |= PROT_EXEC_FLAG;
        }
        prot = Some(prot.map_or(entry_prot, |current| current & entry_prot));

        if end_addr <= entry.end {
            return prot.ok_or(Errno::BadMaps);
        }
        cursor = entry.end;
    }

    Err(Errno::BadMaps)
}

pub(crate) fn addr_protect(entries: &[MapsEntry], addr: usize) -> Result<i32, Errno> {
    mem_protect(entries, addr, std::mem::size_of::<usize>())
}

// 修改指定地址所在页面的保护属性
pub(crate) fn set_addr_protect(addr: usize, prot: i32) -> Result<(), Errno> {
    let (start, len) = page_bounds(addr);
    let result = unsafe { libc::mprotect(start as *mut libc::c_void, len, prot) };
    if result != 0 {
        let err = std::io::Error::last_os_error().raw_os_error().unwrap_or(0);
        log::error(format_args!("mprotect failed: {err}"));
        return Err(Errno::Unknown);
    }
    Ok(())
}

// GOT 槽位是数据，写入后只需内存屏障
pub(crate) fn publish_slot_write() {
    fence(Ordering::SeqCst);
}

fn page_size() -> usize {
    unsafe { libc::sysconf(libc::_SC_PAGESIZE) as usize }
}

// 计算地址所在页面的起始地址和覆盖长度（页对齐）
fn page_bounds(addr: usize) -> (usize, usize) {
    let page_size = page_size();
    if page_size == 0 {
        return (addr, std::mem::size_of::<usize>());
    }
    let page_mask = !(page_size - 1);
    let start = addr & page_mask;
    let end = ((addr + std::mem::size_of::<usize>() - 1) & page_mask) + page_size;
    (start, end - start)
}

#[cfg(test)]
mod tests {
    use super::super::maps::parse_maps_line;
    use super::*;

    fn entries(lines: &[&str]) -> Vec<MapsEntry> {
        lines.iter().filter_map(|line| parse_maps_line(line)).collect()
    }

    #[test]
    fn protect_of_relro_page() {
        let maps = entries(&[
            "7000000000-7000001000 r--p 00000000 103:06 1 /system/lib64/libart.so",
            "7000001000-7000002000 rw-p 00001000 103:06 1 /system/lib64/libart.so",
        ]);
        assert_eq!(addr_protect(&maps, 0x7000000010), Ok(PROT_READ_FLAG));
        assert_eq!(
            addr_protect(&maps, 0x7000001008),
            Ok(PROT_READ_FLAG | PROT_WRITE_FLAG)
        );
    }

    #[test]
    fn protect_spanning_two_mappings_is_intersection() {
        let maps = entries(&[
            "7000000000-7000001000 rw-p 00000000 103:06 1 /system/lib64/libart.so",
            "7000001000-7000002000 r--p 00001000 103:06 1 /system/lib64/libart.so",
        ]);
        assert_eq!(mem_protect(&maps, 0x7000000ffc, 8), Ok(PROT_READ_FLAG));
    }

    #[test]
    fn unmapped_address_is_error() {
        let maps = entries(&["7000000000-7000001000 r--p 00000000 103:06 1 /system/lib64/libart.so"]);
        assert_eq!(addr_protect(&maps, 0x6000000000), Err(Errno::BadMaps));
    }

    #[test]
    fn page_bounds_cover_pointer() {
        let page = page_size();
        let (start, len) = page_bounds(page * 3 + 8);
        assert_eq!(start, page * 3);
        assert_eq!(len, page);
    }
}
