// Copyright 2025 Crrow
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//      http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Filesystem capability consumed by the queue.
//!
//! The queue never touches storage directly. It needs existence checks,
//! directory creation and removal, whole-file create/open, directory
//! enumeration and deletion, which is what a flash filesystem driver offers.
//! [`StdFileSystem`] maps this onto a host directory; [`MemoryFileSystem`]
//! keeps everything in process and can inject failures.

mod local;
mod memory;

use std::io::{self, Read, Write};

pub use local::{LocalReadDir, StdFileSystem};
pub use memory::{MemoryFile, MemoryFileSystem};

/// Longest path accepted by flat filesystems such as SPIFFS.
pub const FLAT_MAX_PATH_LEN: usize = 31;

/// Longest path accepted by hierarchical filesystems such as LittleFS.
pub const HIERARCHICAL_MAX_PATH_LEN: usize = 254;

/// An open file. Dropping the handle closes it.
pub trait FileHandle: Read + Write {
    /// Current size in bytes.
    fn size(&self) -> io::Result<u64>;

    /// Flushes written data to stable storage.
    fn sync(&mut self) -> io::Result<()> { self.flush() }
}

/// A child of an enumerated directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirEntry {
    /// Name relative to the enumerated directory.
    pub name:   String,
    pub is_dir: bool,
}

impl DirEntry {
    pub fn file(name: impl Into<String>) -> Self {
        Self {
            name:   name.into(),
            is_dir: false,
        }
    }

    pub fn dir(name: impl Into<String>) -> Self {
        Self {
            name:   name.into(),
            is_dir: true,
        }
    }
}

/// Storage driver interface.
///
/// Paths are `/`-separated and absolute within the filesystem (`/q/0000000001-00`);
/// the empty string addresses the root directory.
pub trait FileSystem {
    type File: FileHandle;
    type ReadDir: Iterator<Item = io::Result<DirEntry>>;

    fn exists(&self, path: &str) -> bool;

    fn create_dir(&self, path: &str) -> io::Result<()>;

    /// Removes an empty directory.
    fn remove_dir(&self, path: &str) -> io::Result<()>;

    /// Opens `path` for writing, creating or truncating it.
    fn create(&self, path: &str) -> io::Result<Self::File>;

    /// Opens `path` for reading.
    fn open(&self, path: &str) -> io::Result<Self::File>;

    /// Enumerates the children of a directory.
    ///
    /// Fails with [`io::ErrorKind::NotFound`] when `path` does not exist and
    /// with [`io::ErrorKind::NotADirectory`] when it is a file.
    fn read_dir(&self, path: &str) -> io::Result<Self::ReadDir>;

    fn remove(&self, path: &str) -> io::Result<()>;

    /// Whether directories must be created before files can be placed in
    /// them. Flat filesystems treat directories as name prefixes.
    fn requires_directories(&self) -> bool { true }

    fn max_path_len(&self) -> usize { HIERARCHICAL_MAX_PATH_LEN }
}

/// Reads until `buf` is full or the reader is exhausted; returns the count.
pub(crate) fn read_up_to<R: Read + ?Sized>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => {}
            Err(err) => return Err(err),
        }
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Hands out at most three bytes per read.
    struct Trickle<'a>(&'a [u8]);

    impl Read for Trickle<'_> {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let n = buf.len().min(self.0.len()).min(3);
            buf[..n].copy_from_slice(&self.0[..n]);
            self.0 = &self.0[n..];
            Ok(n)
        }
    }

    #[test]
    fn test_read_up_to_fills_across_short_reads() {
        let mut buf = [0u8; 8];
        let n = read_up_to(&mut Trickle(b"abcdefghij"), &mut buf).unwrap();
        assert_eq!(n, 8);
        assert_eq!(&buf, b"abcdefgh");
    }

    #[test]
    fn test_read_up_to_stops_at_eof() {
        let mut buf = [0u8; 8];
        let n = read_up_to(&mut Trickle(b"abc"), &mut buf).unwrap();
        assert_eq!(n, 3);
    }
}
