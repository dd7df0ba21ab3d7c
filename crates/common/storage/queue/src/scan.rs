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

//! Directory scans: selection, emptiness and purge targets.
//!
//! The prefix directory is the only index. Every scan enumerates it once,
//! skips subdirectories and, unless fast-checking, opens each file to compare
//! its tag with the queue's magic number. Entries with another tag, or too
//! short to carry one, are skipped silently.

use std::{io, ops::ControlFlow};

use snafu::ResultExt;
use tracing::trace;

use crate::{
    DequeueOrder, Result,
    error::{FileOpSnafu, InvalidPrefixSnafu},
    fs::{FileSystem, read_up_to},
    message::TAG_SIZE,
    path::{bare_name, child_path, parse_sequence},
};

/// Entry chosen by a selection scan.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Candidate {
    /// Bare entry name.
    pub name:     String,
    pub sequence: u32,
}

pub(crate) struct Scanner<'a, F> {
    fs:     &'a F,
    prefix: &'a str,
    magic:  u32,
}

impl<'a, F: FileSystem> Scanner<'a, F> {
    pub(crate) const fn new(fs: &'a F, prefix: &'a str, magic: u32) -> Self {
        Self { fs, prefix, magic }
    }

    /// Reads the tag of an entry; `None` if it cannot be read in full.
    pub(crate) fn read_tag(&self, path: &str) -> Option<u32> {
        let mut file = self.fs.open(path).ok()?;
        let mut tag = [0u8; TAG_SIZE];
        match read_up_to(&mut file, &mut tag) {
            Ok(TAG_SIZE) => Some(u32::from_le_bytes(tag)),
            _ => None,
        }
    }

    /// Visits the bare name of every file that belongs to this queue, in
    /// enumeration order, until `visit` breaks.
    ///
    /// A missing prefix directory has no entries. A prefix that exists but
    /// cannot be enumerated as a directory is invalid.
    fn walk(&self, fast_check: bool, mut visit: impl FnMut(&str) -> ControlFlow<()>) -> Result<()> {
        let entries = match self.fs.read_dir(self.prefix) {
            Ok(entries) => entries,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(()),
            Err(err) => {
                return InvalidPrefixSnafu {
                    prefix: self.prefix,
                    reason: err.to_string(),
                }
                .fail();
            }
        };

        for entry in entries {
            let entry = entry.context(FileOpSnafu {
                op:   "enumerate",
                path: self.prefix,
            })?;
            if entry.is_dir {
                continue;
            }
            let name = bare_name(&entry.name);
            if !fast_check && self.read_tag(&child_path(self.prefix, name)) != Some(self.magic) {
                trace!(prefix = self.prefix, name, "Skipping foreign entry");
                continue;
            }
            if visit(name).is_break() {
                break;
            }
        }
        Ok(())
    }

    /// Whether no entry belongs to this queue. Stops at the first one found.
    pub(crate) fn is_empty(&self, fast_check: bool) -> Result<bool> {
        let mut empty = true;
        self.walk(fast_check, |_| {
            empty = false;
            ControlFlow::Break(())
        })?;
        Ok(empty)
    }

    /// Finds the entry `order` dequeues next.
    ///
    /// Names without a decodable sequence number are skipped. Among entries
    /// sharing the winning sequence number the first enumerated wins.
    pub(crate) fn select(&self, order: DequeueOrder, fast_check: bool) -> Result<Option<Candidate>> {
        let mut best: Option<Candidate> = None;
        self.walk(fast_check, |name| {
            let Some(sequence) = parse_sequence(name) else {
                return ControlFlow::Continue(());
            };
            if best
                .as_ref()
                .is_none_or(|current| order.prefers(sequence, current.sequence))
            {
                best = Some(Candidate {
                    name: name.to_owned(),
                    sequence,
                });
            }
            ControlFlow::Continue(())
        })?;
        Ok(best)
    }

    /// Bare names of every file a purge deletes.
    pub(crate) fn matching_entries(&self, fast_check: bool) -> Result<Vec<String>> {
        let mut names = Vec::new();
        self.walk(fast_check, |name| {
            names.push(name.to_owned());
            ControlFlow::Continue(())
        })?;
        Ok(names)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{ErrorKind, fs::MemoryFileSystem};

    const MAGIC: u32 = 0x1234_5678;
    const OTHER: u32 = 0x8765_4321;

    fn put(fs: &MemoryFileSystem, name: &str, tag: u32) {
        let mut data = tag.to_le_bytes().to_vec();
        data.extend_from_slice(b"payload");
        fs.write_file(&format!("/q/{name}"), data);
    }

    fn setup() -> MemoryFileSystem {
        let fs = MemoryFileSystem::new();
        fs.create_dir("/q").unwrap();
        fs
    }

    #[test]
    fn test_select_oldest_and_latest() {
        let fs = setup();
        put(&fs, "0000000005-00", MAGIC);
        put(&fs, "0000000001-00", MAGIC);
        put(&fs, "0000000003-00", MAGIC);
        let scanner = Scanner::new(&fs, "/q", MAGIC);

        let oldest = scanner.select(DequeueOrder::Oldest, false).unwrap().unwrap();
        assert_eq!(oldest.sequence, 1);
        assert_eq!(oldest.name, "0000000001-00");

        let latest = scanner.select(DequeueOrder::Latest, false).unwrap().unwrap();
        assert_eq!(latest.sequence, 5);
    }

    #[test]
    fn test_select_single_entry_with_sequence_one() {
        let fs = setup();
        put(&fs, "0000000001-00", MAGIC);
        let scanner = Scanner::new(&fs, "/q", MAGIC);
        for order in [DequeueOrder::Oldest, DequeueOrder::Latest] {
            let found = scanner.select(order, false).unwrap().unwrap();
            assert_eq!(found.sequence, 1);
        }
    }

    #[test]
    fn test_select_first_enumerated_wins_ties() {
        let fs = setup();
        put(&fs, "0000000002-01", MAGIC);
        put(&fs, "0000000002-00", MAGIC);
        let scanner = Scanner::new(&fs, "/q", MAGIC);

        let found = scanner.select(DequeueOrder::Oldest, false).unwrap().unwrap();
        assert_eq!(found.name, "0000000002-00");
        let found = scanner.select(DequeueOrder::Latest, false).unwrap().unwrap();
        assert_eq!(found.name, "0000000002-00");
    }

    #[test]
    fn test_full_check_skips_foreign_tags() {
        let fs = setup();
        put(&fs, "0000000001-00", OTHER);
        put(&fs, "0000000002-00", MAGIC);
        let scanner = Scanner::new(&fs, "/q", MAGIC);

        let full = scanner.select(DequeueOrder::Oldest, false).unwrap().unwrap();
        assert_eq!(full.sequence, 2);
        let fast = scanner.select(DequeueOrder::Oldest, true).unwrap().unwrap();
        assert_eq!(fast.sequence, 1);
    }

    #[test]
    fn test_skips_undecodable_names_and_dirs() {
        let fs = setup();
        fs.create_dir("/q/0000000001-00").unwrap();
        put(&fs, "README", MAGIC);
        put(&fs, "0000000000-00", MAGIC);
        put(&fs, "0000000009-00", MAGIC);
        let scanner = Scanner::new(&fs, "/q", MAGIC);

        let found = scanner.select(DequeueOrder::Oldest, true).unwrap().unwrap();
        assert_eq!(found.sequence, 9);
    }

    #[test]
    fn test_short_file_has_no_tag() {
        let fs = setup();
        fs.write_file("/q/0000000001-00", vec![0xDE, 0xC0]);
        let scanner = Scanner::new(&fs, "/q", MAGIC);

        assert_eq!(scanner.read_tag("/q/0000000001-00"), None);
        assert!(scanner.is_empty(false).unwrap());
        assert!(!scanner.is_empty(true).unwrap());
    }

    #[test]
    fn test_is_empty_ignores_other_queues() {
        let fs = setup();
        put(&fs, "0000000001-00", OTHER);
        assert!(Scanner::new(&fs, "/q", MAGIC).is_empty(false).unwrap());
        assert!(!Scanner::new(&fs, "/q", OTHER).is_empty(false).unwrap());
    }

    #[test]
    fn test_missing_prefix_is_empty() {
        let fs = MemoryFileSystem::new();
        let scanner = Scanner::new(&fs, "/gone", MAGIC);
        assert!(scanner.is_empty(false).unwrap());
        assert_eq!(scanner.select(DequeueOrder::Oldest, false).unwrap(), None);
    }

    #[test]
    fn test_file_prefix_is_invalid() {
        let fs = MemoryFileSystem::new();
        fs.write_file("/q", b"not a dir".to_vec());
        let err = Scanner::new(&fs, "/q", MAGIC).is_empty(true).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidPrefix);
    }

    #[test]
    fn test_matching_entries() {
        let fs = setup();
        put(&fs, "0000000001-00", MAGIC);
        put(&fs, "0000000002-00", OTHER);
        put(&fs, "notes", MAGIC);
        let scanner = Scanner::new(&fs, "/q", MAGIC);

        assert_eq!(scanner.matching_entries(false).unwrap(), vec![
            "0000000001-00",
            "notes"
        ]);
        assert_eq!(scanner.matching_entries(true).unwrap().len(), 3);
    }
}
