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

use std::{
    collections::{BTreeMap, BTreeSet},
    io::{self, Read, Write},
    sync::{Arc, Mutex, MutexGuard, PoisonError},
    vec,
};

use super::{DirEntry, FLAT_MAX_PATH_LEN, FileHandle, FileSystem, HIERARCHICAL_MAX_PATH_LEN};

/// In-process filesystem.
///
/// Clones share the same storage. Enumeration yields names in lexicographic
/// order. Two profiles are available: [`MemoryFileSystem::new`] behaves like
/// a hierarchical filesystem with real directories, [`MemoryFileSystem::flat`]
/// like a flat one where directories are just name prefixes and paths are
/// limited to [`FLAT_MAX_PATH_LEN`] bytes.
#[derive(Debug, Clone, Default)]
pub struct MemoryFileSystem {
    state: Arc<Mutex<State>>,
}

#[derive(Debug, Default)]
struct State {
    flat:          bool,
    files:         BTreeMap<String, Vec<u8>>,
    /// Hierarchical profile only. The root ("") is implicit.
    dirs:          BTreeSet<String>,
    fail_creates:  bool,
    fail_removals: bool,
}

fn parent_of(path: &str) -> &str { path.rsplit_once('/').map_or("", |(parent, _)| parent) }

fn not_found(path: &str) -> io::Error {
    io::Error::new(io::ErrorKind::NotFound, format!("{path} not found"))
}

fn injected(op: &str, path: &str) -> io::Error {
    io::Error::other(format!("injected {op} failure for {path}"))
}

impl State {
    fn is_dir(&self, path: &str) -> bool {
        if self.flat {
            return !self.files.contains_key(path);
        }
        path.is_empty() || self.dirs.contains(path)
    }

    fn children(&self, path: &str) -> Vec<DirEntry> {
        let mut children: Vec<DirEntry> = self
            .files
            .keys()
            .filter(|file| parent_of(file) == path)
            .map(|file| DirEntry::file(&file[path.len() + 1..]))
            .collect();
        if !self.flat {
            children.extend(
                self.dirs
                    .iter()
                    .filter(|dir| parent_of(dir) == path)
                    .map(|dir| DirEntry::dir(&dir[path.len() + 1..])),
            );
        }
        children.sort_by(|a, b| a.name.cmp(&b.name));
        children
    }
}

impl MemoryFileSystem {
    /// Hierarchical profile.
    pub fn new() -> Self { Self::default() }

    /// Flat profile.
    pub fn flat() -> Self {
        let fs = Self::default();
        fs.lock().flat = true;
        fs
    }

    fn lock(&self) -> MutexGuard<'_, State> { self.state.lock().unwrap_or_else(PoisonError::into_inner) }

    /// Makes every subsequent `create` fail until reset.
    pub fn set_fail_creates(&self, fail: bool) { self.lock().fail_creates = fail; }

    /// Makes every subsequent `remove` fail until reset.
    pub fn set_fail_removals(&self, fail: bool) { self.lock().fail_removals = fail; }

    /// Stores `data` at `path` as-is, bypassing the driver checks.
    pub fn write_file(&self, path: &str, data: impl Into<Vec<u8>>) {
        self.lock().files.insert(path.to_owned(), data.into());
    }

    /// Contents of the file at `path`.
    pub fn read_file(&self, path: &str) -> Option<Vec<u8>> { self.lock().files.get(path).cloned() }

    /// Names of the files directly under `dir`, sorted.
    pub fn file_names(&self, dir: &str) -> Vec<String> {
        self.lock()
            .children(dir)
            .into_iter()
            .filter(|entry| !entry.is_dir)
            .map(|entry| entry.name)
            .collect()
    }
}

impl FileSystem for MemoryFileSystem {
    type File = MemoryFile;
    type ReadDir = vec::IntoIter<io::Result<DirEntry>>;

    fn exists(&self, path: &str) -> bool {
        let state = self.lock();
        state.files.contains_key(path) || (!state.flat && state.is_dir(path))
    }

    fn create_dir(&self, path: &str) -> io::Result<()> {
        let mut state = self.lock();
        if state.flat {
            return Ok(());
        }
        let mut current = path;
        while !current.is_empty() {
            if state.files.contains_key(current) {
                return Err(io::Error::new(
                    io::ErrorKind::AlreadyExists,
                    format!("{current} is a file"),
                ));
            }
            state.dirs.insert(current.to_owned());
            current = parent_of(current);
        }
        Ok(())
    }

    fn remove_dir(&self, path: &str) -> io::Result<()> {
        let mut state = self.lock();
        if state.flat {
            return Ok(());
        }
        if !state.dirs.contains(path) {
            return Err(not_found(path));
        }
        if !state.children(path).is_empty() {
            return Err(io::Error::new(
                io::ErrorKind::DirectoryNotEmpty,
                format!("{path} is not empty"),
            ));
        }
        state.dirs.remove(path);
        Ok(())
    }

    fn create(&self, path: &str) -> io::Result<MemoryFile> {
        let mut state = self.lock();
        if state.fail_creates {
            return Err(injected("create", path));
        }
        if !state.flat && !state.is_dir(parent_of(path)) {
            return Err(not_found(parent_of(path)));
        }
        if state.dirs.contains(path) {
            return Err(io::Error::new(
                io::ErrorKind::IsADirectory,
                format!("{path} is a directory"),
            ));
        }
        state.files.insert(path.to_owned(), Vec::new());
        Ok(MemoryFile {
            state:    Some(Arc::clone(&self.state)),
            path:     path.to_owned(),
            data:     Vec::new(),
            position: 0,
        })
    }

    fn open(&self, path: &str) -> io::Result<MemoryFile> {
        let data = self.lock().files.get(path).cloned().ok_or_else(|| not_found(path))?;
        Ok(MemoryFile {
            state: None,
            path: path.to_owned(),
            data,
            position: 0,
        })
    }

    fn read_dir(&self, path: &str) -> io::Result<Self::ReadDir> {
        let state = self.lock();
        if state.files.contains_key(path) {
            return Err(io::Error::new(
                io::ErrorKind::NotADirectory,
                format!("{path} is not a directory"),
            ));
        }
        if !state.is_dir(path) {
            return Err(not_found(path));
        }
        let children: Vec<_> = state.children(path).into_iter().map(Ok).collect();
        Ok(children.into_iter())
    }

    fn remove(&self, path: &str) -> io::Result<()> {
        let mut state = self.lock();
        if state.fail_removals {
            return Err(injected("remove", path));
        }
        state.files.remove(path).map(|_| ()).ok_or_else(|| not_found(path))
    }

    fn requires_directories(&self) -> bool { !self.lock().flat }

    fn max_path_len(&self) -> usize {
        if self.lock().flat {
            FLAT_MAX_PATH_LEN
        } else {
            HIERARCHICAL_MAX_PATH_LEN
        }
    }
}

/// Handle returned by [`MemoryFileSystem`].
///
/// Read handles work on a snapshot taken at open. Write handles store every
/// write immediately, so a handle dropped halfway leaves a partial file just
/// as a power cut would.
#[derive(Debug)]
pub struct MemoryFile {
    /// Set for write handles.
    state:    Option<Arc<Mutex<State>>>,
    path:     String,
    data:     Vec<u8>,
    position: usize,
}

impl Read for MemoryFile {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let remaining = self.data.get(self.position..).unwrap_or_default();
        let n = remaining.len().min(buf.len());
        buf[..n].copy_from_slice(&remaining[..n]);
        self.position += n;
        Ok(n)
    }
}

impl Write for MemoryFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let Some(state) = &self.state else {
            return Err(io::Error::new(
                io::ErrorKind::PermissionDenied,
                format!("{} is open for reading", self.path),
            ));
        };
        self.data.extend_from_slice(buf);
        let mut state = state.lock().unwrap_or_else(PoisonError::into_inner);
        state.files.insert(self.path.clone(), self.data.clone());
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> { Ok(()) }
}

impl FileHandle for MemoryFile {
    fn size(&self) -> io::Result<u64> { Ok(self.data.len() as u64) }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hierarchical_requires_parent_dir() {
        let fs = MemoryFileSystem::new();
        assert!(fs.create("/q/a").is_err());

        fs.create_dir("/q").unwrap();
        fs.create("/q/a").unwrap().write_all(b"abc").unwrap();
        assert_eq!(fs.read_file("/q/a").unwrap(), b"abc");
        assert!(fs.exists("/q"));
        assert!(fs.requires_directories());
    }

    #[test]
    fn test_read_handle_reports_size_and_contents() {
        let fs = MemoryFileSystem::new();
        fs.write_file("/a", b"hello".to_vec());

        let mut file = fs.open("/a").unwrap();
        assert_eq!(file.size().unwrap(), 5);
        let mut buf = Vec::new();
        file.read_to_end(&mut buf).unwrap();
        assert_eq!(buf, b"hello");
        assert!(file.write(b"x").is_err());
    }

    #[test]
    fn test_read_dir_sorted_with_dirs() {
        let fs = MemoryFileSystem::new();
        fs.create_dir("/q/sub").unwrap();
        fs.write_file("/q/b", b"".to_vec());
        fs.write_file("/q/a", b"".to_vec());
        fs.write_file("/q/sub/c", b"".to_vec());

        let entries: Vec<_> = fs.read_dir("/q").unwrap().map(Result::unwrap).collect();
        assert_eq!(entries, vec![
            DirEntry::file("a"),
            DirEntry::file("b"),
            DirEntry::dir("sub"),
        ]);
        assert_eq!(fs.file_names("/q"), vec!["a", "b"]);
    }

    #[test]
    fn test_read_dir_errors() {
        let fs = MemoryFileSystem::new();
        fs.write_file("/file", b"".to_vec());
        assert_eq!(
            fs.read_dir("/missing").unwrap_err().kind(),
            io::ErrorKind::NotFound
        );
        assert_eq!(
            fs.read_dir("/file").unwrap_err().kind(),
            io::ErrorKind::NotADirectory
        );
    }

    #[test]
    fn test_remove_dir_requires_empty() {
        let fs = MemoryFileSystem::new();
        fs.create_dir("/q").unwrap();
        fs.write_file("/q/a", b"".to_vec());
        assert!(fs.remove_dir("/q").is_err());
        fs.remove("/q/a").unwrap();
        fs.remove_dir("/q").unwrap();
        assert!(!fs.exists("/q"));
    }

    #[test]
    fn test_flat_profile_has_implicit_dirs() {
        let fs = MemoryFileSystem::flat();
        assert!(!fs.requires_directories());
        assert_eq!(fs.max_path_len(), FLAT_MAX_PATH_LEN);

        fs.create("/q/a").unwrap().write_all(b"x").unwrap();
        assert_eq!(fs.file_names("/q"), vec!["a"]);
        assert!(fs.read_dir("/elsewhere").unwrap().next().is_none());
    }

    #[test]
    fn test_injected_failures() {
        let fs = MemoryFileSystem::new();
        fs.write_file("/a", b"".to_vec());

        fs.set_fail_creates(true);
        assert!(fs.create("/b").is_err());
        fs.set_fail_creates(false);
        assert!(fs.create("/b").is_ok());

        fs.set_fail_removals(true);
        assert!(fs.remove("/a").is_err());
        assert!(fs.exists("/a"));
    }

    #[test]
    fn test_partial_write_is_visible() {
        let fs = MemoryFileSystem::new();
        let mut file = fs.create("/a").unwrap();
        file.write_all(b"abc").unwrap();
        assert_eq!(fs.read_file("/a").unwrap(), b"abc");
    }
}
