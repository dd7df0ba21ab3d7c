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

//! Crash-resilient file-per-message queue for flash filesystems.
//!
//! Each message is stored as its own file under a prefix directory, named by
//! sequence number and collision slot. The directory is the index: there is
//! no log, manifest or in-memory state that could disagree with storage after
//! a reset. See [`message`] for the on-disk format and [`Queue`] for the
//! operations.

pub mod builder;
pub mod config;
pub mod crc;
pub mod error;
pub mod fs;
pub mod message;
pub mod path;
pub mod queue;
mod scan;

pub use builder::QueueBuilder;
pub use config::{DEFAULT_MAGIC, DequeueOrder, FlushMode, QueueConfig};
pub use error::{ErrorKind, QueueError, Result};
pub use fs::{DirEntry, FileHandle, FileSystem, MemoryFileSystem, StdFileSystem};
pub use message::{EntryId, Message};
pub use queue::Queue;
