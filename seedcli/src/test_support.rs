//! In-memory collaborators for unit tests.

use std::collections::{HashMap, VecDeque};
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use crate::error::{Error, Result};
use crate::files::FileAccess;
use crate::port::Port;

/// Scripted serial port.
///
/// Reads drain `read_buf`; an empty buffer reads as a timeout. In scripted
/// mode each write releases the next queued reply into the read buffer.
pub(crate) struct MockPort {
    read_buf: VecDeque<u8>,
    replies: VecDeque<Vec<u8>>,
    writes: Vec<Vec<u8>>,
    closed: Arc<AtomicBool>,
    timeout: Duration,
}

impl MockPort {
    pub(crate) fn new(read_data: &[u8]) -> Self {
        Self {
            read_buf: read_data.iter().copied().collect(),
            replies: VecDeque::new(),
            writes: Vec::new(),
            closed: Arc::new(AtomicBool::new(false)),
            timeout: Duration::from_millis(10),
        }
    }

    pub(crate) fn scripted<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<[u8]>,
    {
        let mut port = Self::new(b"");
        port.replies = replies
            .into_iter()
            .map(|r| r.as_ref().to_vec())
            .collect();
        port
    }

    /// Every write call, in order.
    pub(crate) fn writes(&self) -> &[Vec<u8>] {
        &self.writes
    }

    /// All written bytes, concatenated.
    pub(crate) fn written(&self) -> Vec<u8> {
        self.writes.concat()
    }

    /// Shared flag set once the port is closed.
    pub(crate) fn closed_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.closed)
    }
}

impl Read for MockPort {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.read_buf.is_empty() {
            return Err(io::Error::new(io::ErrorKind::TimedOut, "no data"));
        }
        let n = buf.len().min(self.read_buf.len());
        for (slot, byte) in buf.iter_mut().zip(self.read_buf.drain(..n)) {
            *slot = byte;
        }
        Ok(n)
    }
}

impl Write for MockPort {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        if self.closed.load(Ordering::SeqCst) {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "port closed"));
        }
        self.writes.push(buf.to_vec());
        if let Some(reply) = self.replies.pop_front() {
            self.read_buf.extend(reply);
        }
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Port for MockPort {
    fn timeout(&self) -> Duration {
        self.timeout
    }

    fn clear_buffers(&mut self) -> Result<()> {
        self.read_buf.clear();
        Ok(())
    }

    fn name(&self) -> &str {
        "mock"
    }

    fn close(&mut self) -> Result<()> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }
}

/// In-memory file system.
#[derive(Default)]
pub(crate) struct MemFiles {
    files: HashMap<PathBuf, Vec<u8>>,
    sizes: HashMap<PathBuf, u64>,
}

impl MemFiles {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_file(mut self, path: impl Into<PathBuf>, content: impl Into<Vec<u8>>) -> Self {
        self.files.insert(path.into(), content.into());
        self
    }

    /// Report `size` for `path` regardless of its content, as if the file
    /// changed between being measured and being read.
    pub(crate) fn with_reported_size(mut self, path: impl Into<PathBuf>, size: u64) -> Self {
        self.sizes.insert(path.into(), size);
        self
    }

    fn get(&self, path: &Path) -> Result<&Vec<u8>> {
        self.files
            .get(path)
            .ok_or_else(|| Error::FileNotFound(path.to_path_buf()))
    }
}

impl FileAccess for MemFiles {
    fn exists(&self, path: &Path) -> bool {
        self.files.contains_key(path)
    }

    fn size(&self, path: &Path) -> Result<u64> {
        let content = self.get(path)?;
        Ok(self
            .sizes
            .get(path)
            .copied()
            .unwrap_or(content.len() as u64))
    }

    fn read_all(&self, path: &Path) -> Result<Vec<u8>> {
        self.get(path).cloned()
    }
}
