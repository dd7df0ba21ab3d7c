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

//! Main queue struct and lifecycle management.
//!
//! The [`Queue`] owns one prefix directory on a [`FileSystem`] and:
//! - Recovers its sequence counter from existing entries on `begin`
//! - Admits messages as individual entry files
//! - Selects, verifies and deletes entries on dequeue
//! - Purges its own entries, leaving other queues' entries alone
//!
//! ## Usage
//!
//! ```ignore
//! let fs = StdFileSystem::new("/var/lib/device");
//! let mut queue = QueueBuilder::new(fs).magic(0xC0FF_EE00).open("/telemetry")?;
//!
//! queue.enqueue(0, b"reading-1")?;
//! let message = queue.dequeue(false)?;
//! assert_eq!(&message.payload[..], b"reading-1");
//! ```
//!
//! Nothing is cached beyond the advisory sequence counter: every call
//! rescans the directory, so entries written by an earlier run are visible
//! immediately after `begin`.

use std::io::Write;

use bytes::Bytes;
use snafu::{OptionExt, ResultExt, ensure};
use tracing::{debug, info, warn};

use crate::{
    DequeueOrder, FlushMode, QueueConfig, Result,
    crc::{payload_crc, verify_payload_crc},
    error::{
        BadCrcSnafu, FileOpSnafu, InvalidMagicSnafu, NotInitializedSnafu, OutOfMemorySnafu,
        OutOfSubnumbersSnafu, PurgeIncompleteSnafu, QueueEmptySnafu, SequenceExhaustedSnafu,
        ShortReadSnafu, SmallBufferSnafu, TruncatedSnafu,
    },
    fs::{FileHandle, FileSystem, read_up_to},
    message::{CRC_SIZE, EntryId, Message, SUB_INDEX_LIMIT, TAG_SIZE, min_entry_len, payload_len},
    path::{child_path, entry_path, normalize_prefix, validate_prefix},
    scan::{Candidate, Scanner},
};

/// A file-backed message queue.
///
/// Single owner: two queues (in one process or several) must not dequeue
/// from the same prefix and tag concurrently.
#[derive(Debug)]
pub struct Queue<F: FileSystem> {
    fs:          F,
    config:      QueueConfig,
    /// Normalized prefix, set by `begin`.
    prefix:      String,
    initialized: bool,
    /// Next auto-assigned sequence number. Never decreases.
    counter:     u32,
    /// Highest sequence seen by the last latest-first selection.
    watermark:   Option<u32>,
}

/// Where a dequeued payload is written.
trait Destination {
    /// Returns storage for exactly `len` payload bytes.
    fn reserve(&mut self, len: usize) -> Result<&mut [u8]>;
}

/// Caller-owned buffer of fixed capacity.
struct FixedBuffer<'a>(&'a mut [u8]);

impl Destination for FixedBuffer<'_> {
    fn reserve(&mut self, len: usize) -> Result<&mut [u8]> {
        let capacity = self.0.len();
        ensure!(
            len <= capacity,
            SmallBufferSnafu {
                required: len,
                capacity,
            }
        );
        self.0.fill(0);
        Ok(&mut self.0[..len])
    }
}

/// Buffer allocated to the payload's exact size.
#[derive(Default)]
struct Allocated(Vec<u8>);

impl Destination for Allocated {
    fn reserve(&mut self, len: usize) -> Result<&mut [u8]> {
        self.0
            .try_reserve_exact(len)
            .context(OutOfMemorySnafu { len })?;
        self.0.resize(len, 0);
        Ok(&mut self.0)
    }
}

impl<F: FileSystem> Queue<F> {
    /// Creates an uninitialized queue. Call [`Queue::begin`] before use.
    pub const fn new(fs: F, config: QueueConfig) -> Self {
        Self {
            fs,
            config,
            prefix: String::new(),
            initialized: false,
            counter: 1,
            watermark: None,
        }
    }

    /// Binds the queue to `prefix` and recovers the sequence counter.
    ///
    /// The prefix is normalized to a leading `/` without trailing `/`, and
    /// its directory is created if the filesystem needs one. The counter
    /// resumes after the highest sequence number among this queue's entries.
    ///
    /// On failure the queue is left uninitialized.
    pub fn begin(&mut self, prefix: &str) -> Result<()> {
        self.initialized = false;
        let prefix = normalize_prefix(prefix);
        validate_prefix(&prefix, self.fs.max_path_len())?;
        self.ensure_prefix_dir(&prefix)?;

        let latest = Scanner::new(&self.fs, &prefix, self.config.magic)
            .select(DequeueOrder::Latest, false)?;
        let watermark = latest.map(|candidate| candidate.sequence);

        self.prefix = prefix;
        self.watermark = watermark;
        if let Some(watermark) = watermark {
            self.counter = self.counter.max(watermark.saturating_add(1));
        }
        self.initialized = true;

        info!(
            prefix = %self.prefix,
            magic = format_args!("{:#010x}", self.config.magic),
            next_sequence = self.counter,
            watermark = ?self.watermark,
            "Queue initialized"
        );
        Ok(())
    }

    /// Stops the queue. Every operation fails with `NotInitialized` until
    /// the next [`Queue::begin`].
    pub fn end(&mut self) {
        self.initialized = false;
        info!(prefix = %self.prefix, "Queue stopped");
    }

    /// Stores a message.
    ///
    /// `sequence` orders the message; `0` assigns the next counter value.
    /// Messages sharing a sequence number take the first free sub-index and
    /// are unordered relative to each other.
    pub fn enqueue(&mut self, sequence: u32, payload: &[u8]) -> Result<EntryId> {
        self.ensure_initialized()?;

        let sequence = if sequence == 0 {
            self.next_auto_sequence()?
        } else {
            sequence
        };

        self.ensure_prefix_dir(&self.prefix)?;
        let sub_index = (0..SUB_INDEX_LIMIT)
            .find(|&sub_index| !self.fs.exists(&entry_path(&self.prefix, sequence, sub_index)))
            .context(OutOfSubnumbersSnafu {
                sequence,
                limit: SUB_INDEX_LIMIT,
            })?;

        let path = entry_path(&self.prefix, sequence, sub_index);
        self.write_entry(&path, payload)?;

        debug!(%path, len = payload.len(), "Message enqueued");
        Ok(EntryId {
            sequence,
            sub_index,
        })
    }

    /// Whether the queue holds no entries.
    ///
    /// With `fast_check` every file under the prefix counts; otherwise only
    /// files carrying this queue's tag do.
    pub fn is_empty(&self, fast_check: bool) -> Result<bool> {
        self.ensure_initialized()?;
        self.scanner().is_empty(fast_check)
    }

    /// Dequeues the next message into `buf`, returning the payload length.
    ///
    /// If `buf` is too short the call fails with `SmallBuffer`, reports the
    /// needed length through [`crate::QueueError::required_len`] and leaves
    /// the entry in place for a retry.
    pub fn dequeue_into(&mut self, buf: &mut [u8], fast_check: bool) -> Result<usize> {
        let (_, len) = self.retrieve(&mut FixedBuffer(buf), fast_check)?;
        Ok(len)
    }

    /// Dequeues the next message into a newly allocated buffer.
    pub fn dequeue(&mut self, fast_check: bool) -> Result<Message> {
        let mut dest = Allocated::default();
        let (sequence, _) = self.retrieve(&mut dest, fast_check)?;
        Ok(Message {
            sequence,
            payload: Bytes::from(dest.0),
        })
    }

    /// Deletes every entry of this queue and then the prefix directory if it
    /// ended up empty. Returns the number of entries deleted.
    ///
    /// Best effort: a failed deletion does not stop the others, and is
    /// reported as `FileOp` once all entries were tried.
    pub fn purge(&mut self, fast_check: bool) -> Result<usize> {
        self.ensure_initialized()?;

        let names = self.scanner().matching_entries(fast_check)?;
        let mut removed = 0usize;
        let mut failed = 0usize;
        for name in names {
            let path = child_path(&self.prefix, &name);
            match self.fs.remove(&path) {
                Ok(()) => removed += 1,
                Err(err) => {
                    failed += 1;
                    warn!(%path, error = %err, "Failed to delete entry during purge");
                }
            }
        }

        if self.fs.requires_directories()
            && !self.prefix.is_empty()
            && let Err(err) = self.fs.remove_dir(&self.prefix)
        {
            debug!(prefix = %self.prefix, error = %err, "Prefix directory kept after purge");
        }

        info!(prefix = %self.prefix, removed, failed, "Queue purged");
        ensure!(failed == 0, PurgeIncompleteSnafu { removed, failed });
        Ok(removed)
    }

    /// Get the queue configuration.
    #[must_use]
    pub const fn config(&self) -> &QueueConfig { &self.config }

    /// Normalized prefix. Empty before the first `begin`.
    #[must_use]
    pub fn prefix(&self) -> &str { &self.prefix }

    #[must_use]
    pub const fn is_initialized(&self) -> bool { self.initialized }

    /// Sequence number the next auto-assigned enqueue will use.
    #[must_use]
    pub const fn next_sequence(&self) -> u32 { self.counter }

    /// Highest sequence number seen by the last latest-first selection.
    #[must_use]
    pub const fn watermark(&self) -> Option<u32> { self.watermark }

    #[must_use]
    pub const fn file_system(&self) -> &F { &self.fs }

    fn ensure_initialized(&self) -> Result<()> {
        ensure!(self.initialized, NotInitializedSnafu);
        Ok(())
    }

    fn ensure_prefix_dir(&self, prefix: &str) -> Result<()> {
        if self.fs.requires_directories() && !prefix.is_empty() && !self.fs.exists(prefix) {
            self.fs.create_dir(prefix).context(FileOpSnafu {
                op:   "create directory",
                path: prefix,
            })?;
            debug!(prefix, "Created prefix directory");
        }
        Ok(())
    }

    fn next_auto_sequence(&mut self) -> Result<u32> {
        let sequence = self.counter;
        self.counter = sequence.checked_add(1).context(SequenceExhaustedSnafu)?;
        Ok(sequence)
    }

    fn scanner(&self) -> Scanner<'_, F> { Scanner::new(&self.fs, &self.prefix, self.config.magic) }

    /// Selection scan that also records the watermark for latest-first
    /// scans.
    fn select(&mut self, order: DequeueOrder, fast_check: bool) -> Result<Option<Candidate>> {
        let found = self.scanner().select(order, fast_check)?;
        if order == DequeueOrder::Latest
            && let Some(candidate) = &found
        {
            self.watermark = Some(candidate.sequence);
        }
        Ok(found)
    }

    /// Writes tag, payload and optional checksum in one create-write-close.
    fn write_entry(&self, path: &str, payload: &[u8]) -> Result<()> {
        let mut file = self.fs.create(path).context(FileOpSnafu { op: "create", path })?;
        let write = |file: &mut F::File, bytes: &[u8]| {
            file.write_all(bytes).context(FileOpSnafu { op: "write", path })
        };

        write(&mut file, &self.config.magic.to_le_bytes())?;
        write(&mut file, payload)?;
        if self.config.checksum {
            write(&mut file, &payload_crc(payload).to_le_bytes())?;
        }

        let flushed = match self.config.flush_mode {
            FlushMode::Async => file.flush(),
            FlushMode::Sync => file.sync(),
        };
        flushed.context(FileOpSnafu { op: "flush", path })
    }

    /// Shared dequeue pipeline. Returns the sequence number and payload
    /// length. The entry is deleted only after every check passed.
    fn retrieve<D: Destination>(&mut self, dest: &mut D, fast_check: bool) -> Result<(u32, usize)> {
        self.ensure_initialized()?;
        ensure!(!self.scanner().is_empty(fast_check)?, QueueEmptySnafu);

        let candidate = self
            .select(self.config.order, fast_check)?
            .context(QueueEmptySnafu)?;
        let path = child_path(&self.prefix, &candidate.name);

        let mut file = self.fs.open(&path).context(FileOpSnafu { op: "open", path: &path })?;
        let size = file.size().context(FileOpSnafu { op: "stat", path: &path })?;
        let checksum = self.config.checksum;
        let len = payload_len(size, checksum).context(TruncatedSnafu {
            path: &path,
            size,
            min_len: min_entry_len(checksum),
        })?;

        let mut tag = [0u8; TAG_SIZE];
        let read = read_up_to(&mut file, &mut tag).context(FileOpSnafu { op: "read", path: &path })?;
        ensure!(
            read == TAG_SIZE,
            ShortReadSnafu {
                path:     &path,
                expected: TAG_SIZE,
                actual:   read,
            }
        );
        let found = u32::from_le_bytes(tag);
        if found != self.config.magic {
            warn!(%path, found, expected = self.config.magic, "Selected entry has a foreign tag");
            return InvalidMagicSnafu {
                path,
                expected: self.config.magic,
                found,
            }
            .fail();
        }

        let payload = dest.reserve(len)?;
        let read = read_up_to(&mut file, payload).context(FileOpSnafu { op: "read", path: &path })?;
        ensure!(
            read == len,
            ShortReadSnafu {
                path:     &path,
                expected: len,
                actual:   read,
            }
        );

        if checksum {
            let mut crc_bytes = [0u8; CRC_SIZE];
            let stored = match read_up_to(&mut file, &mut crc_bytes) {
                Ok(CRC_SIZE) => Some(u32::from_le_bytes(crc_bytes)),
                _ => None,
            };
            let payload: &[u8] = payload;
            if !stored.is_some_and(|stored| verify_payload_crc(payload, stored)) {
                let computed = payload_crc(payload);
                warn!(%path, ?stored, computed, "Entry failed checksum verification");
                return BadCrcSnafu {
                    path,
                    stored,
                    computed,
                }
                .fail();
            }
        }
        drop(file);

        if let Err(err) = self.fs.remove(&path) {
            warn!(%path, error = %err, "Delivered entry could not be deleted and may be delivered again");
        }

        debug!(%path, len, "Message dequeued");
        Ok((candidate.sequence, len))
    }
}
