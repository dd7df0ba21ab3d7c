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

//! Message types and on-disk format definitions.
//!
//! ## On-Disk Entry Format
//!
//! Every message is one file named by [`EntryId`] under the queue prefix:
//!
//! ```text
//! ┌─────────────────┬──────────────────────┬─────────────────┐
//! │  Tag (4B)       │   Payload (variable) │   CRC32 (4B)    │
//! │  little-endian  │   raw bytes          │   optional      │
//! └─────────────────┴──────────────────────┴─────────────────┘
//! ```
//!
//! - **Tag**: the queue's magic number. Entries with another tag belong to a
//!   different queue sharing the directory and are ignored.
//! - **Payload**: the message bytes. Its length is implied by the file size.
//! - **CRC32**: present only when checksums are enabled; covers the payload
//!   alone (see [`crate::crc`]).
//!
//! A file's presence is the only record that a message was enqueued, and its
//! deletion the only record that it was delivered.

use std::fmt;

use bytes::Bytes;

use crate::path::entry_name;

/// Size of the type tag in bytes.
pub const TAG_SIZE: usize = 4;

/// Size of the trailing checksum in bytes.
pub const CRC_SIZE: usize = 4;

/// Number of sub-index slots per sequence number (`00`..=`99`).
pub const SUB_INDEX_LIMIT: u8 = 100;

/// A message taken off the queue.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    /// Sequence number decoded from the entry name.
    pub sequence: u32,
    pub payload:  Bytes,
}

/// Identifies a stored entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntryId {
    pub sequence:  u32,
    /// Collision slot among entries sharing `sequence`.
    pub sub_index: u8,
}

impl fmt::Display for EntryId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&entry_name(self.sequence, self.sub_index))
    }
}

/// Smallest valid entry: a tag, plus a checksum when enabled.
#[inline]
pub const fn min_entry_len(checksum: bool) -> usize {
    if checksum { TAG_SIZE + CRC_SIZE } else { TAG_SIZE }
}

/// Payload length implied by an entry's file size, or `None` when the file
/// is too small to be an entry.
#[inline]
pub fn payload_len(file_size: u64, checksum: bool) -> Option<usize> {
    let payload = file_size.checked_sub(min_entry_len(checksum) as u64)?;
    usize::try_from(payload).ok()
}
