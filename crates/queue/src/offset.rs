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

//! Durable offset cursor backed by an 8-byte memory-mapped file.
//!
//! The file holds a single little-endian `u64`. There is no header or
//! checksum; an absent file starts at zero. Each role (producer, consumer)
//! owns exactly one cursor file and is its only writer.

use std::path::{Path, PathBuf};

use mmap_io::MemoryMappedFile;
use snafu::{OptionExt, ensure};
use tracing::debug;

use crate::{
    FlushMode, QueueError, Result,
    error::{CorruptedOffsetFileSnafu, OffsetOverflowSnafu},
};

/// Size of a cursor record.
pub const OFFSET_RECORD_SIZE: u64 = size_of::<u64>() as u64;

pub struct OffsetCursor {
    mmap:       MemoryMappedFile,
    path:       PathBuf,
    value:      u64,
    flush_mode: FlushMode,
}

impl OffsetCursor {
    /// Open the cursor at `path`, creating a zeroed one if absent.
    ///
    /// A zero-length file is what an interrupted creation leaves behind and
    /// is treated as absent. Any other size than eight bytes is rejected.
    pub fn open<P: AsRef<Path>>(path: P, flush_mode: FlushMode) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let existing_len = match std::fs::metadata(&path) {
            Ok(meta) => Some(meta.len()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => None,
            Err(e) => return Err(e.into()),
        };

        let mmap = match existing_len {
            None | Some(0) => {
                if let Some(parent) = path.parent() {
                    std::fs::create_dir_all(parent)?;
                }
                debug!(path = ?path, "Creating offset file");
                MemoryMappedFile::create_rw(&path, OFFSET_RECORD_SIZE).map_err(|e| {
                    QueueError::MmapFailed {
                        path:    path.clone(),
                        message: e.to_string(),
                    }
                })?
            }
            Some(len) => {
                ensure!(
                    len == OFFSET_RECORD_SIZE,
                    CorruptedOffsetFileSnafu {
                        path: path.clone(),
                        len,
                    }
                );
                MemoryMappedFile::open_rw(&path).map_err(|e| QueueError::MmapFailed {
                    path:    path.clone(),
                    message: e.to_string(),
                })?
            }
        };

        let mut buf = [0u8; OFFSET_RECORD_SIZE as usize];
        mmap.read_into(0, &mut buf)
            .map_err(|e| QueueError::MmapFailed {
                path:    path.clone(),
                message: e.to_string(),
            })?;
        let value = u64::from_le_bytes(buf);

        debug!(path = ?path, value, "Opened offset file");

        Ok(Self {
            mmap,
            path,
            value,
            flush_mode,
        })
    }

    /// Current offset as loaded at open or last persisted.
    #[must_use]
    pub const fn value(&self) -> u64 { self.value }

    /// Path of the backing file.
    #[must_use]
    pub fn path(&self) -> &Path { &self.path }

    /// Advance by `delta` and persist. Returns the new value.
    pub fn advance_by(&mut self, delta: u64) -> Result<u64> {
        let next = self.value.checked_add(delta).context(OffsetOverflowSnafu {
            offset: self.value,
            delta,
        })?;
        self.move_to(next)?;
        Ok(next)
    }

    /// Set an absolute value and persist it.
    pub fn move_to(&mut self, value: u64) -> Result<()> {
        self.mmap
            .update_region(0, &value.to_le_bytes())
            .map_err(|e| self.mmap_error(&e))?;

        if self.flush_mode == FlushMode::Sync {
            self.mmap.flush().map_err(|e| self.mmap_error(&e))?;
        }

        self.value = value;
        Ok(())
    }

    fn mmap_error(&self, e: &impl std::fmt::Display) -> QueueError {
        QueueError::MmapFailed {
            path:    self.path.clone(),
            message: e.to_string(),
        }
    }
}
