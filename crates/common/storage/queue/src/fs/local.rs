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
    fs::{self, File},
    io,
    path::{Path, PathBuf},
};

use super::{DirEntry, FileHandle, FileSystem};

/// Host filesystem rooted at a directory.
///
/// Queue paths resolve below the root: `/q/0000000001-00` becomes
/// `<root>/q/0000000001-00`.
#[derive(Debug, Clone)]
pub struct StdFileSystem {
    root: PathBuf,
}

impl StdFileSystem {
    pub fn new<P: Into<PathBuf>>(root: P) -> Self { Self { root: root.into() } }

    pub fn root(&self) -> &Path { &self.root }

    /// Host path backing a queue path.
    pub fn resolve(&self, path: &str) -> PathBuf { self.root.join(path.trim_start_matches('/')) }
}

impl FileHandle for File {
    fn size(&self) -> io::Result<u64> { Ok(self.metadata()?.len()) }

    fn sync(&mut self) -> io::Result<()> { self.sync_all() }
}

impl FileSystem for StdFileSystem {
    type File = File;
    type ReadDir = LocalReadDir;

    fn exists(&self, path: &str) -> bool { self.resolve(path).exists() }

    fn create_dir(&self, path: &str) -> io::Result<()> { fs::create_dir_all(self.resolve(path)) }

    fn remove_dir(&self, path: &str) -> io::Result<()> { fs::remove_dir(self.resolve(path)) }

    fn create(&self, path: &str) -> io::Result<File> { File::create(self.resolve(path)) }

    fn open(&self, path: &str) -> io::Result<File> { File::open(self.resolve(path)) }

    fn read_dir(&self, path: &str) -> io::Result<LocalReadDir> {
        let dir = self.resolve(path);
        if !fs::metadata(&dir)?.is_dir() {
            return Err(io::Error::new(
                io::ErrorKind::NotADirectory,
                format!("{} is not a directory", dir.display()),
            ));
        }
        Ok(LocalReadDir(fs::read_dir(dir)?))
    }

    fn remove(&self, path: &str) -> io::Result<()> { fs::remove_file(self.resolve(path)) }
}

/// Directory enumeration over [`std::fs::ReadDir`].
#[derive(Debug)]
pub struct LocalReadDir(fs::ReadDir);

impl Iterator for LocalReadDir {
    type Item = io::Result<DirEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        let entry = self.0.next()?;
        Some(entry.and_then(|entry| {
            Ok(DirEntry {
                name:   entry.file_name().to_string_lossy().into_owned(),
                is_dir: entry.file_type()?.is_dir(),
            })
        }))
    }
}
