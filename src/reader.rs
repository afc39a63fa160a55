//! Binary reader over a shared byte source.
//!
//! A [`BinaryReader`] is a positioned cursor that decodes little-endian
//! scalars and length-prefixed strings. Readers over an in-memory buffer or
//! a memory mapping copy straight out of the shared slice; file-backed
//! readers each own an independent file handle so pooled readers never
//! fight over a seek position.
//!
//! A reader is not safe for concurrent use. The [`pool`](crate::pool) is
//! the synchronisation point.

use memmap2::Mmap;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::PathBuf;
use std::sync::Arc;

use crate::error::{Error, Result};

/// The byte source a dataset is bound to.
///
/// `Buffer` and `Mmap` hand out zero-copy cursors over shared memory.
/// `File` is a descriptor: every reader bound to it opens its own handle.
#[derive(Debug)]
pub enum ByteSource {
    /// Owned in-memory dataset bytes.
    Buffer(Vec<u8>),
    /// Memory-mapped dataset file.
    Mmap(Mmap),
    /// File-backed dataset read through pooled handles.
    File { path: PathBuf, len: u64 },
}

impl ByteSource {
    /// Total length of the source in bytes.
    pub fn len(&self) -> u64 {
        match self {
            ByteSource::Buffer(bytes) => bytes.len() as u64,
            ByteSource::Mmap(map) => map.len() as u64,
            ByteSource::File { len, .. } => *len,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The shared in-memory slice, when there is one.
    fn as_slice(&self) -> Option<&[u8]> {
        match self {
            ByteSource::Buffer(bytes) => Some(bytes),
            ByteSource::Mmap(map) => Some(map),
            ByteSource::File { .. } => None,
        }
    }
}

/// Positioned little-endian decoder over a [`ByteSource`].
#[derive(Debug)]
pub struct BinaryReader {
    source: Arc<ByteSource>,
    /// Open handle for file-backed sources; `None` for in-memory sources.
    file: Option<File>,
    position: u64,
    len: u64,
}

impl BinaryReader {
    /// Bind a new reader to the source, positioned at 0.
    pub fn new(source: Arc<ByteSource>) -> Result<Self> {
        let file = match source.as_ref() {
            ByteSource::File { path, .. } => Some(File::open(path)?),
            _ => None,
        };
        let len = source.len();
        Ok(Self {
            source,
            file,
            position: 0,
            len,
        })
    }

    /// Current absolute offset.
    pub fn position(&self) -> u64 {
        self.position
    }

    /// Reposition the cursor. Offsets in `[0, len]` are accepted.
    pub fn set_position(&mut self, offset: u64) -> Result<()> {
        if offset > self.len {
            return Err(Error::UnexpectedEof(offset));
        }
        self.position = offset;
        Ok(())
    }

    /// Advance the cursor without decoding.
    pub fn skip(&mut self, n: u64) -> Result<()> {
        let next = self
            .position
            .checked_add(n)
            .ok_or(Error::UnexpectedEof(self.position))?;
        self.set_position(next)
    }

    /// Length of the underlying source.
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn fill(&mut self, buf: &mut [u8]) -> Result<()> {
        let end = self
            .position
            .checked_add(buf.len() as u64)
            .ok_or(Error::UnexpectedEof(self.position))?;
        if end > self.len {
            return Err(Error::UnexpectedEof(self.position));
        }
        if let Some(slice) = self.source.as_slice() {
            let start = self.position as usize;
            buf.copy_from_slice(&slice[start..start + buf.len()]);
        } else {
            let file = self.file.as_mut().expect("file-backed source has a handle");
            file.seek(SeekFrom::Start(self.position))?;
            file.read_exact(buf)?;
        }
        self.position = end;
        Ok(())
    }

    pub fn read_u8(&mut self) -> Result<u8> {
        let mut buf = [0u8; 1];
        self.fill(&mut buf)?;
        Ok(buf[0])
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        let mut buf = [0u8; 2];
        self.fill(&mut buf)?;
        Ok(u16::from_le_bytes(buf))
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        let mut buf = [0u8; 4];
        self.fill(&mut buf)?;
        Ok(u32::from_le_bytes(buf))
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        let mut buf = [0u8; 8];
        self.fill(&mut buf)?;
        Ok(u64::from_le_bytes(buf))
    }

    pub fn read_i16(&mut self) -> Result<i16> {
        let mut buf = [0u8; 2];
        self.fill(&mut buf)?;
        Ok(i16::from_le_bytes(buf))
    }

    pub fn read_i32(&mut self) -> Result<i32> {
        let mut buf = [0u8; 4];
        self.fill(&mut buf)?;
        Ok(i32::from_le_bytes(buf))
    }

    /// Read `n` raw bytes.
    pub fn read_bytes(&mut self, n: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0u8; n];
        self.fill(&mut buf)?;
        Ok(buf)
    }

    /// Read a length-prefixed string: `u16` stored length (text bytes plus
    /// one NUL), the text, then the NUL terminator.
    pub fn read_string(&mut self) -> Result<String> {
        let stored = self.read_u16()?;
        if stored == 0 {
            return Err(Error::Malformed(format!(
                "zero string length at offset {}",
                self.position - 2
            )));
        }
        let text = self.read_bytes(stored as usize - 1)?;
        self.skip(1)?; // NUL
        String::from_utf8(text)
            .map_err(|_| Error::Malformed(format!("invalid UTF-8 at offset {}", self.position)))
    }
}
