//! "全有或全无" 的文件写出.

use std::fs;
use std::io::{self, BufWriter, Write};
use std::path::Path;

use tempfile::NamedTempFile;

use crate::error::WriteError;

/// 在 `path` 的同级目录创建临时文件, 由 `fill` 写入内容, 全部成功后原子重命名到 `path`.
///
/// 父目录不存在时会被创建. 任意一步失败时临时文件被删除, `path` 保持原状.
pub(crate) fn write_atomically<F>(path: &Path, fill: F) -> Result<(), WriteError>
where
    F: FnOnce(&mut dyn Write) -> io::Result<()>,
{
    let wrap = |source: io::Error| WriteError::Io {
        path: path.to_path_buf(),
        source,
    };

    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    fs::create_dir_all(parent).map_err(wrap)?;

    let mut tmp = NamedTempFile::new_in(parent).map_err(wrap)?;
    {
        let mut w = BufWriter::new(tmp.as_file_mut());
        fill(&mut w).map_err(wrap)?;
        w.flush().map_err(wrap)?;
    }
    tmp.as_file().sync_all().map_err(wrap)?;
    tmp.persist(path).map_err(|e| wrap(e.error))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::write_atomically;
    use std::io::{self, Write};

    #[test]
    fn test_creates_parent_and_writes() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("a").join("b").join("out.bin");
        write_atomically(&target, |w| w.write_all(b"berry")).unwrap();
        assert_eq!(std::fs::read(&target).unwrap(), b"berry");
    }

    #[test]
    fn test_failure_leaves_nothing_behind() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("out.bin");
        let err = write_atomically(&target, |w| {
            w.write_all(b"half")?;
            Err(io::Error::new(io::ErrorKind::Other, "boom"))
        });
        assert!(err.is_err());
        assert!(!target.exists());
        // 临时文件也应被清理.
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[test]
    fn test_failure_keeps_previous_file() {
        let dir = tempfile::tempdir().unwrap();
        let target = dir.path().join("out.bin");
        std::fs::write(&target, b"old").unwrap();
        let _ = write_atomically(&target, |_| Err(io::Error::new(io::ErrorKind::Other, "boom")));
        assert_eq!(std::fs::read(&target).unwrap(), b"old");
    }
}
