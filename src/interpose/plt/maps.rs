// /proc/self/maps 解析：枚举已加载 ELF 模块及其地址区间
use std::fs;

const PROC_SELF_MAPS: &str = "/proc/self/maps";

#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) struct MapsEntry {
    pub(crate) start: usize,
    pub(crate) end: usize,
    pub(crate) perms: String,
    pub(crate) offset: usize,
    pub(crate) pathname: String,
}

impl MapsEntry {
    pub(crate) fn is_readable(&self) -> bool {
        self.perms.starts_with('r')
    }

    pub(crate) fn is_private(&self) -> bool {
        self.perms.as_bytes().get(3) == Some(&b'p')
    }
}

// 已加载模块：offset=0 的可读 .so 映射起点即 ELF header
#[derive(Clone, Debug, Eq, PartialEq)]
pub(crate) struct LoadedModule {
    pub(crate) pathname: String,
    pub(crate) base_addr: usize,
}

pub(crate) fn read_maps() -> Vec<MapsEntry> {
    let Ok(content) = fs::read_to_string(PROC_SELF_MAPS) else {
        return Vec::new();
    };
    content.lines().filter_map(parse_maps_line).collect()
}

pub(crate) fn parse_maps_line(line: &str) -> Option<MapsEntry> {
    let mut fields = line.split_whitespace();
    let range = fields.next()?;
    let perms = fields.next()?;
    let offset = fields.next()?;
    let _dev = fields.next()?;
    let _inode = fields.next()?;
    let pathname = fields.next().unwrap_or("");

    let (start, end) = range.split_once('-')?;
    Some(MapsEntry {
        start: usize::from_str_radix(start, 16).ok()?,
        end: usize::from_str_radix(end, 16).ok()?,
        perms: perms.to_string(),
        offset: usize::from_str_radix(offset, 16).ok()?,
        pathname: pathname.to_string(),
    })
}

pub(crate) fn loaded_modules(entries: &[MapsEntry]) -> Vec<LoadedModule> {
    let mut modules: Vec<LoadedModule> = Vec::new();
    for entry in entries {
        if entry.offset != 0 || !entry.is_readable() || !is_probable_elf_path(&entry.pathname) {
            continue;
        }
        if modules.iter().any(|module| module.base_addr == entry.start) {
            continue;
        }
        modules.push(LoadedModule {
            pathname: entry.pathname.clone(),
            base_addr: entry.start,
        });
    }
    modules
}

// 收集某个模块的全部映射区间，用于 callee 过滤
pub(crate) fn module_ranges(entries: &[MapsEntry], rule: &str) -> Vec<(usize, usize)> {
    entries
        .iter()
        .filter(|entry| crate::interpose::path_match(&entry.pathname, rule))
        .map(|entry| (entry.start, entry.end))
        .collect()
}

fn is_probable_elf_path(pathname: &str) -> bool {
    pathname.starts_with('/')
        && (pathname.ends_with(".so")
            || pathname.ends_with("/linker")
            || pathname.ends_with("/linker64"))
}
