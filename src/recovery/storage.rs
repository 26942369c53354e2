//! 产物存储 - 固定位置的"最新恢复产物"
//!
//! 先写同目录下的临时文件再重命名覆盖目标，收到通知的读者不会看到写了一半的文件。

use std::ffi::OsString;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// 存储错误类型
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("输出路径没有文件名: {0}")]
    InvalidPath(PathBuf),

    #[error("写入临时文件{path}失败: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("替换{path}失败: {source}")]
    Replace {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

/// 固定位置的产物存储
#[derive(Debug, Clone)]
pub struct ArtifactStore {
    path: PathBuf,
}

impl ArtifactStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// 覆盖写入最新产物
    pub fn write(&self, bytes: &[u8]) -> Result<(), StorageError> {
        let temp = self.temp_path()?;

        fs::write(&temp, bytes).map_err(|source| StorageError::Write {
            path: temp.clone(),
            source,
        })?;

        if let Err(source) = fs::rename(&temp, &self.path) {
            let _ = fs::remove_file(&temp);
            return Err(StorageError::Replace {
                path: self.path.clone(),
                source,
            });
        }
        Ok(())
    }

    fn temp_path(&self) -> Result<PathBuf, StorageError> {
        let name = self
            .path
            .file_name()
            .ok_or_else(|| StorageError::InvalidPath(self.path.clone()))?;
        let mut temp = OsString::from(".");
        temp.push(name);
        temp.push(".part");
        Ok(self.path.with_file_name(temp))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_write_overwrites_latest() {
        let dir = tempdir().unwrap();
        let store = ArtifactStore::new(dir.path().join("latest.jpg"));

        store.write(b"first artifact").unwrap();
        store.write(b"second").unwrap();

        assert_eq!(fs::read(store.path()).unwrap(), b"second");
        // 不残留临时文件
        let entries: Vec<_> = fs::read_dir(dir.path()).unwrap().collect();
        assert_eq!(entries.len(), 1);
    }

    #[test]
    fn test_missing_directory_reports_write_error() {
        let dir = tempdir().unwrap();
        let store = ArtifactStore::new(dir.path().join("no-such-dir").join("latest.jpg"));
        assert!(matches!(store.write(b"x"), Err(StorageError::Write { .. })));
    }

    #[test]
    fn test_path_without_file_name() {
        let store = ArtifactStore::new("/");
        assert!(matches!(store.write(b"x"), Err(StorageError::InvalidPath(_))));
    }
}
