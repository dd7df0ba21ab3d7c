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

//! Queue error types.
//!
//! Every public operation returns [`Result`]. The coarse [`ErrorKind`] of a
//! failure (what embedded callers know as the "last error") is available via
//! [`QueueError::kind`], and its numeric [`ErrorKind::code`] is stable.

use std::{collections::TryReserveError, io};

use snafu::{Location, Snafu};

/// Coarse classification of a queue failure.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, strum_macros::Display, strum_macros::IntoStaticStr,
)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// Operation attempted before `begin` or after `end`.
    NotInitialized,
    /// The underlying filesystem failed to create, open, read or delete.
    FileOp,
    /// All sub-index slots for a sequence number are taken.
    OutOfSubnumbers,
    /// The prefix is unusable or is not a directory.
    InvalidPrefix,
    /// No entry with a matching tag exists.
    QueueEmpty,
    /// The selected entry carries another queue's tag.
    InvalidMagic,
    /// The payload buffer could not be allocated.
    OutOfMemory,
    /// Stored checksum missing or not matching the payload.
    BadCrc,
    /// Destination pointer was null.
    ///
    /// Kept for code-table compatibility; slices are never null, so the safe
    /// API does not produce it.
    NullPointer,
    /// Destination buffer is shorter than the payload.
    SmallBuffer,
    /// Anything else.
    Other,
}

impl ErrorKind {
    /// Stable numeric code. `0` is reserved for success.
    #[must_use]
    pub const fn code(self) -> u8 {
        match self {
            Self::NotInitialized => 1,
            Self::FileOp => 2,
            Self::OutOfSubnumbers => 3,
            Self::InvalidPrefix => 4,
            Self::QueueEmpty => 5,
            Self::InvalidMagic => 6,
            Self::OutOfMemory => 7,
            Self::BadCrc => 8,
            Self::NullPointer => 9,
            Self::SmallBuffer => 10,
            Self::Other => 11,
        }
    }
}

/// Queue operation errors.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub))]
pub enum QueueError {
    #[snafu(display("Queue is not initialized"))]
    NotInitialized {
        #[snafu(implicit)]
        loc: Location,
    },

    #[snafu(display("Failed to {op} {path}"))]
    FileOp {
        op:     &'static str,
        path:   String,
        source: io::Error,
        #[snafu(implicit)]
        loc:    Location,
    },

    #[snafu(display("Entry {path} is {size} bytes, shorter than the {min_len} byte minimum"))]
    Truncated {
        path:    String,
        size:    u64,
        min_len: usize,
        #[snafu(implicit)]
        loc:     Location,
    },

    #[snafu(display("Short read of {path}: expected {expected} bytes, got {actual}"))]
    ShortRead {
        path:     String,
        expected: usize,
        actual:   usize,
        #[snafu(implicit)]
        loc:      Location,
    },

    #[snafu(display("All {limit} sub-index slots for sequence {sequence} are occupied"))]
    OutOfSubnumbers {
        sequence: u32,
        limit:    u8,
        #[snafu(implicit)]
        loc:      Location,
    },

    #[snafu(display("Invalid queue prefix {prefix:?}: {reason}"))]
    InvalidPrefix {
        prefix: String,
        reason: String,
        #[snafu(implicit)]
        loc:    Location,
    },

    #[snafu(display("Queue is empty"))]
    QueueEmpty {
        #[snafu(implicit)]
        loc: Location,
    },

    #[snafu(display("Entry {path} has tag {found:#010x}, expected {expected:#010x}"))]
    InvalidMagic {
        path:     String,
        expected: u32,
        found:    u32,
        #[snafu(implicit)]
        loc:      Location,
    },

    #[snafu(display("Failed to allocate {len} bytes for payload"))]
    OutOfMemory {
        len:    usize,
        source: TryReserveError,
        #[snafu(implicit)]
        loc:    Location,
    },

    #[snafu(display("Checksum mismatch in {path}: stored {stored:?}, computed {computed:#010x}"))]
    BadCrc {
        path:     String,
        stored:   Option<u32>,
        computed: u32,
        #[snafu(implicit)]
        loc:      Location,
    },

    #[snafu(display("Destination buffer is null"))]
    NullPointer {
        #[snafu(implicit)]
        loc: Location,
    },

    #[snafu(display("Buffer of {capacity} bytes cannot hold {required} byte payload"))]
    SmallBuffer {
        required: usize,
        capacity: usize,
        #[snafu(implicit)]
        loc:      Location,
    },

    #[snafu(display("Purge removed {removed} entries but failed to delete {failed}"))]
    PurgeIncomplete {
        removed: usize,
        failed:  usize,
        #[snafu(implicit)]
        loc:     Location,
    },

    #[snafu(display("Sequence counter exhausted"))]
    SequenceExhausted {
        #[snafu(implicit)]
        loc: Location,
    },
}

impl QueueError {
    /// The coarse kind of this error.
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::NotInitialized { .. } => ErrorKind::NotInitialized,
            Self::FileOp { .. }
            | Self::Truncated { .. }
            | Self::ShortRead { .. }
            | Self::PurgeIncomplete { .. } => ErrorKind::FileOp,
            Self::OutOfSubnumbers { .. } => ErrorKind::OutOfSubnumbers,
            Self::InvalidPrefix { .. } => ErrorKind::InvalidPrefix,
            Self::QueueEmpty { .. } => ErrorKind::QueueEmpty,
            Self::InvalidMagic { .. } => ErrorKind::InvalidMagic,
            Self::OutOfMemory { .. } => ErrorKind::OutOfMemory,
            Self::BadCrc { .. } => ErrorKind::BadCrc,
            Self::NullPointer { .. } => ErrorKind::NullPointer,
            Self::SmallBuffer { .. } => ErrorKind::SmallBuffer,
            Self::SequenceExhausted { .. } => ErrorKind::Other,
        }
    }

    /// Payload length a retry needs, for [`ErrorKind::SmallBuffer`] failures.
    #[must_use]
    pub const fn required_len(&self) -> Option<usize> {
        match self {
            Self::SmallBuffer { required, .. } => Some(*required),
            _ => None,
        }
    }

    /// Whether the failing entry was left in place and will be selected
    /// again. Callers that retry in a loop must skip or quarantine these.
    #[must_use]
    pub const fn is_poisoned_entry(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::BadCrc | ErrorKind::InvalidMagic
        ) || matches!(self, Self::Truncated { .. } | Self::ShortRead { .. })
    }
}

/// Result type for queue operations.
pub type Result<T> = std::result::Result<T, QueueError>;
