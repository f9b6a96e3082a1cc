// 捕获内容落盘：原样写入，不追加任何头部
use crate::errno::Errno;
use std::fs::File;
use std::io::Write;
use std::path::Path;

pub(crate) fn write_capture(path: &Path, bytes: &[u8]) -> Result<(), Errno> {
    let mut file = File::create(path).map_err(|_| Errno::Io)?;
    file.write_all(bytes).map_err(|_| Errno::Io)?;
    file.flush().map_err(|_| Errno::Io)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn writes_exact_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("anr.txt");
        fs::write(&path, "stale content from an earlier episode").unwrap();

        let bytes = b"----- pid 123 at 2024-01-01 -----\n\0\xff";
        write_capture(&path, bytes).unwrap();
        assert_eq!(fs::read(&path).unwrap(), bytes);
    }

    #[test]
    fn missing_directory_is_io_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("anr.txt");
        assert_eq!(write_capture(&path, b"x"), Err(Errno::Io));
    }
}
