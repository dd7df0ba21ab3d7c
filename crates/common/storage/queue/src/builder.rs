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

use crate::{DequeueOrder, FlushMode, Queue, QueueConfig, Result, fs::FileSystem};

pub struct QueueBuilder<F> {
    fs:     F,
    config: QueueConfig,
}

impl<F: FileSystem> QueueBuilder<F> {
    pub fn new(fs: F) -> Self {
        Self {
            fs,
            config: QueueConfig::default(),
        }
    }

    /// Replaces the whole configuration, e.g. one loaded from a file.
    pub fn config(mut self, config: QueueConfig) -> Self {
        self.config = config;
        self
    }

    pub fn magic(mut self, magic: u32) -> Self {
        self.config.magic = magic;
        self
    }

    pub fn order(mut self, order: DequeueOrder) -> Self {
        self.config.order = order;
        self
    }

    pub fn checksum(mut self, enabled: bool) -> Self {
        self.config.checksum = enabled;
        self
    }

    pub fn flush_mode(mut self, mode: FlushMode) -> Self {
        self.config.flush_mode = mode;
        self
    }

    /// Builds an uninitialized queue.
    pub fn build(self) -> Queue<F> { Queue::new(self.fs, self.config) }

    /// Builds the queue and calls [`Queue::begin`] on `prefix`.
    pub fn open(self, prefix: &str) -> Result<Queue<F>> {
        let mut queue = self.build();
        queue.begin(prefix)?;
        Ok(queue)
    }
}
