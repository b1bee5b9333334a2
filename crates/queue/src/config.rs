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

use serde::{Deserialize, Serialize};
use snafu::ensure;

use crate::{
    Result,
    error::{InvalidConfigSnafu, InvalidPathSnafu},
    frame::{MIN_FRAME_SIZE, max_body_size},
};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Root directory holding `commitlog/` and `offset/`.
    pub store_path:                  PathBuf,
    /// Size in bytes of every segment file.
    pub segment_size:                u64,
    /// Sleep between polls once the spin phase is over.
    pub consumer_retry_interval:     Duration,
    /// How long a consumer spins before it starts sleeping.
    pub consumer_spin_wait_duration: Duration,
    pub flush_mode:                  FlushMode,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            store_path:                  PathBuf::from("./queue_data"),
            segment_size:                512 * 1024 * 1024,
            consumer_retry_interval:     Duration::from_secs(1),
            consumer_spin_wait_duration: Duration::from_millis(100),
            flush_mode:                  FlushMode::Async,
        }
    }
}

impl QueueConfig {
    /// Largest message body accepted by the producer.
    #[must_use]
    pub fn max_message_size(&self) -> usize { max_body_size(self.segment_size) }

    /// Rejects configurations the queue cannot operate with.
    pub fn validate(&self) -> Result<()> {
        ensure!(
            !self.store_path.as_os_str().is_empty() && !self.store_path.is_file(),
            InvalidPathSnafu {
                path: self.store_path.clone(),
            }
        );
        ensure!(
            self.segment_size >= MIN_FRAME_SIZE as u64,
            InvalidConfigSnafu {
                message: format!(
                    "segment_size must be at least {MIN_FRAME_SIZE} bytes, got {}",
                    self.segment_size
                ),
            }
        );
        Ok(())
    }
}

/// When mapped writes are forced to stable storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FlushMode {
    /// Leave write-back to the OS, including for segments being closed or
    /// rolled. Survives a process crash, not a power loss.
    #[default]
    Async,
    /// msync every frame before the producer cursor advances, every cursor
    /// update before it returns, and each segment as it is closed or rolled.
    Sync,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::QueueError;

    #[test]
    fn test_default_config_is_valid() {
        let config = QueueConfig::default();
        config.validate().unwrap();
        assert_eq!(config.max_message_size(), 512 * 1024 * 1024 - 5);
    }

    #[test]
    fn test_rejects_empty_path() {
        let config = QueueConfig {
            store_path: PathBuf::new(),
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(QueueError::InvalidPath { .. })
        ));
    }

    #[test]
    fn test_rejects_file_as_store_path() {
        let file = tempfile::NamedTempFile::new().unwrap();
        let config = QueueConfig {
            store_path: file.path().to_path_buf(),
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(QueueError::InvalidPath { .. })
        ));
    }

    #[test]
    fn test_rejects_tiny_segment() {
        let config = QueueConfig {
            segment_size: MIN_FRAME_SIZE as u64 - 1,
            ..Default::default()
        };
        assert!(matches!(
            config.validate(),
            Err(QueueError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn test_deserialize_with_defaults() {
        let config: QueueConfig =
            serde_json::from_str(r#"{"store_path": "/data/q", "flush_mode": "sync"}"#).unwrap();
        assert_eq!(config.store_path, PathBuf::from("/data/q"));
        assert_eq!(config.flush_mode, FlushMode::Sync);
        assert_eq!(config.segment_size, 512 * 1024 * 1024);
        assert_eq!(config.consumer_retry_interval, Duration::from_secs(1));
    }
}
