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

use std::{path::PathBuf, time::Duration};

use crate::{FlushMode, Queue, QueueConfig, Result};

pub struct QueueBuilder {
    config: QueueConfig,
}

impl QueueBuilder {
    pub fn new<P: Into<PathBuf>>(store_path: P) -> Self {
        Self {
            config: QueueConfig {
                store_path: store_path.into(),
                ..Default::default()
            },
        }
    }

    #[must_use]
    pub fn segment_size(mut self, size: u64) -> Self {
        self.config.segment_size = size;
        self
    }

    #[must_use]
    pub fn consumer_retry_interval(mut self, interval: Duration) -> Self {
        self.config.consumer_retry_interval = interval;
        self
    }

    #[must_use]
    pub fn consumer_spin_wait_duration(mut self, duration: Duration) -> Self {
        self.config.consumer_spin_wait_duration = duration;
        self
    }

    #[must_use]
    pub fn flush_mode(mut self, mode: FlushMode) -> Self {
        self.config.flush_mode = mode;
        self
    }

    pub fn build(self) -> Result<Queue> { Queue::new(self.config) }
}
