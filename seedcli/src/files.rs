//! Host file access for uploads.

use std::fs;
use std::io;
use std::path::Path;

use crate::error::{Error, Result};

/// File access used by command construction and uploads.
pub trait FileAccess {
    /// Whether `path` exists.
    fn exists(&self, path: &Path) -> bool;

    /// Size of the file in bytes.
    fn size(&self, path: &Path) -> Result<u64>;

    /// Whole file content.
    fn read_all(&self, path: &Path) -> Result<Vec<u8>>;
}

/// [`FileAccess`] over `std::fs`.
#[derive(Debug, Clone, Copy, Default)]
pub struct StdFiles;

fn map_io(path: &Path, e: io::Error) -> Error {
    if e.kind() == io::ErrorKind::NotFound {
        Error::FileNotFound(path.to_path_buf())
    } else {
        Error::Io(e)
    }
}

impl FileAccess for StdFiles {
    fn exists(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn size(&self, path: &Path) -> Result<u64> {
        fs::metadata(path)
            .map(|m| m.len())
            .map_err(|e| map_io(path, e))
    }

    fn read_all(&self, path: &Path) -> Result<Vec<u8>> {
        fs::read(path).map_err(|e| map_io(path, e))
    }
}
