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

use serde::{Deserialize, Serialize};
use smart_default::SmartDefault;

/// Tag written by queues that were not given one explicitly.
pub const DEFAULT_MAGIC: u32 = 0xA55A_C0DE;

/// Queue configuration. Fixed once the queue is constructed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, SmartDefault)]
#[serde(default)]
pub struct QueueConfig {
    /// Type tag identifying which entries belong to this queue.
    #[default(DEFAULT_MAGIC)]
    pub magic:      u32,
    /// Which end of the queue `dequeue` takes from.
    pub order:      DequeueOrder,
    /// Append a checksum of the payload to every entry and verify it on read.
    #[default = true]
    pub checksum:   bool,
    pub flush_mode: FlushMode,
}

#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Serialize,
    Deserialize,
    strum_macros::Display,
    strum_macros::EnumString,
)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum DequeueOrder {
    /// Smallest sequence number first (FIFO).
    #[default]
    Oldest,
    /// Largest sequence number first (LIFO).
    Latest,
}

impl DequeueOrder {
    /// Whether `candidate` should replace `current` as the selected sequence.
    ///
    /// Strict, so the first entry seen among equal sequence numbers wins.
    pub const fn prefers(self, candidate: u32, current: u32) -> bool {
        match self {
            Self::Oldest => candidate < current,
            Self::Latest => candidate > current,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlushMode {
    /// Leave write-back to the filesystem.
    #[default]
    Async,
    /// Sync every entry to stable storage before it is reported as enqueued.
    Sync,
}
