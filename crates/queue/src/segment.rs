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

//! Fixed-size memory-mapped segment files using mmap-io.
//!
//! A [`Segment`] is one slice of the logical log, identified by the global
//! offset of its first byte. It keeps a sequential cursor over the mapping:
//! reads and writes advance it, [`Segment::rewind`] moves it back without
//! touching the content.

use std::path::{Path, PathBuf};

use mmap_io::MemoryMappedFile;
use snafu::ensure;
use tracing::debug;

use crate::{
    QueueError, Result,
    error::{AlreadyExistsSnafu, CapacitySnafu, ReadOnlySnafu, RewindSnafu, SegmentSizeMismatchSnafu},
    path::{find_segment_start, segment_file_name, segment_file_path},
};

/// Chunk size used when scrubbing the unwritten tail of a segment.
const SCRUB_CHUNK_SIZE: usize = 64 * 1024;

/// How a segment is mapped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SegmentMode {
    ReadOnly,
    ReadWrite,
}

/// Memory-mapped segment of the commit log.
pub struct Segment {
    mmap:         MemoryMappedFile,
    path:         PathBuf,
    mode:         SegmentMode,
    /// Logical offset of the first byte of this file.
    start_offset: u64,
    /// Cursor relative to the start of the file.
    position:     u64,
    capacity:     u64,
}

impl Segment {
    /// Create a new zero-filled segment starting at `start_offset`.
    ///
    /// The file is sized under a temporary name and then renamed, so a
    /// concurrent [`Segment::try_find`] never maps a partially sized file.
    pub fn create<P: AsRef<Path>>(dir: P, start_offset: u64, size: u64) -> Result<Self> {
        let dir = dir.as_ref();
        let path = segment_file_path(dir, start_offset);

        ensure!(!path.exists(), AlreadyExistsSnafu { path });

        std::fs::create_dir_all(dir)?;

        let tmp_path = dir.join(format!("{}.tmp", segment_file_name(start_offset)));
        let mmap = MemoryMappedFile::create_rw(&tmp_path, size).map_err(|e| {
            QueueError::MmapFailed {
                path:    tmp_path.clone(),
                message: e.to_string(),
            }
        })?;
        std::fs::rename(&tmp_path, &path)?;

        debug!(path = ?path, start_offset, size, "Created segment");

        Ok(Self {
            mmap,
            path,
            mode: SegmentMode::ReadWrite,
            start_offset,
            position: 0,
            capacity: size,
        })
    }

    /// Open an existing segment positioned at the logical `offset`.
    pub fn open<P: AsRef<Path>>(
        dir: P,
        start_offset: u64,
        size: u64,
        offset: u64,
        mode: SegmentMode,
    ) -> Result<Self> {
        let path = segment_file_path(dir, start_offset);

        let mmap = match mode {
            SegmentMode::ReadOnly => MemoryMappedFile::open_ro(&path),
            SegmentMode::ReadWrite => MemoryMappedFile::open_rw(&path),
        }
        .map_err(|e| QueueError::MmapFailed {
            path:    path.clone(),
            message: e.to_string(),
        })?;

        let actual = mmap.len();
        ensure!(
            actual == size,
            SegmentSizeMismatchSnafu {
                path,
                expected: size,
                actual,
            }
        );

        let position = offset.saturating_sub(start_offset).min(size);

        debug!(path = ?path, start_offset, position, ?mode, "Opened segment");

        Ok(Self {
            mmap,
            path,
            mode,
            start_offset,
            position,
            capacity: size,
        })
    }

    /// Find the segment in `dir` whose range contains `offset` and open it.
    ///
    /// Returns `Ok(None)` when no such segment exists yet, which is the
    /// normal state of a reader that caught up with the writer.
    pub fn try_find<P: AsRef<Path>>(
        dir: P,
        size: u64,
        offset: u64,
        mode: SegmentMode,
    ) -> Result<Option<Self>> {
        let dir = dir.as_ref();
        match find_segment_start(dir, size, offset)? {
            Some(start_offset) => Self::open(dir, start_offset, size, offset, mode).map(Some),
            None => Ok(None),
        }
    }

    /// Whether `byte_count` more bytes fit after the cursor.
    #[inline]
    #[must_use]
    pub fn has_enough_space(&self, byte_count: usize) -> bool {
        self.position
            .checked_add(byte_count as u64)
            .is_some_and(|end| end <= self.capacity)
    }

    /// Copy `bytes` at the cursor and advance past them.
    pub fn write(&mut self, bytes: &[u8]) -> Result<()> {
        ensure!(
            self.mode == SegmentMode::ReadWrite,
            ReadOnlySnafu {
                path: self.path.clone(),
            }
        );
        self.ensure_space(bytes.len())?;

        self.mmap
            .update_region(self.position, bytes)
            .map_err(|e| self.mmap_error(&e))?;
        self.position += bytes.len() as u64;
        Ok(())
    }

    /// Single byte form of [`Segment::write`].
    pub fn write_byte(&mut self, byte: u8) -> Result<()> { self.write(&[byte]) }

    /// Fill `buf` from the cursor and advance past it.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<()> {
        self.peek(0, buf)?;
        self.position += buf.len() as u64;
        Ok(())
    }

    /// Fill `buf` from `skip` bytes past the cursor without moving it.
    pub fn peek(&self, skip: usize, buf: &mut [u8]) -> Result<()> {
        self.ensure_space(skip + buf.len())?;

        self.mmap
            .read_into(self.position + skip as u64, buf)
            .map_err(|e| self.mmap_error(&e))
    }

    /// Move the cursor back by `steps` bytes.
    pub fn rewind(&mut self, steps: u64) -> Result<()> {
        ensure!(
            steps <= self.position,
            RewindSnafu {
                steps,
                position: self.position,
            }
        );
        self.position -= steps;
        Ok(())
    }

    /// Zero every non-zero byte from the cursor to the end of the file.
    ///
    /// Works in chunks and only rewrites chunks holding data. Returns the
    /// number of bytes rewritten. The cursor does not move.
    pub fn zero_remaining(&mut self) -> Result<u64> {
        ensure!(
            self.mode == SegmentMode::ReadWrite,
            ReadOnlySnafu {
                path: self.path.clone(),
            }
        );

        let zeros = vec![0u8; SCRUB_CHUNK_SIZE];
        let mut chunk = vec![0u8; SCRUB_CHUNK_SIZE];
        let mut cleared = 0;
        let mut at = self.position;

        while at < self.capacity {
            #[allow(clippy::cast_possible_truncation)]
            let len = (self.capacity - at).min(SCRUB_CHUNK_SIZE as u64) as usize;
            let window = &mut chunk[..len];
            self.mmap
                .read_into(at, window)
                .map_err(|e| self.mmap_error(&e))?;

            if window.iter().any(|&b| b != 0) {
                self.mmap
                    .update_region(at, &zeros[..len])
                    .map_err(|e| self.mmap_error(&e))?;
                cleared += len as u64;
            }
            at += len as u64;
        }

        Ok(cleared)
    }

    /// Flush the whole mapping to disk.
    pub fn flush(&self) -> Result<()> {
        if self.mode == SegmentMode::ReadOnly {
            return Ok(());
        }
        self.mmap.flush().map_err(|e| self.mmap_error(&e))
    }

    /// Flush `len` bytes starting at file position `position`.
    pub fn flush_range(&self, position: u64, len: u64) -> Result<()> {
        if self.mode == SegmentMode::ReadOnly {
            return Ok(());
        }
        self.mmap
            .flush_range(position, len)
            .map_err(|e| self.mmap_error(&e))
    }

    /// Logical offset of the first byte.
    #[must_use]
    pub const fn start_offset(&self) -> u64 { self.start_offset }

    /// Cursor relative to the start of the file.
    #[must_use]
    pub const fn position(&self) -> u64 { self.position }

    /// Logical offset of the cursor.
    #[must_use]
    pub const fn logical_offset(&self) -> u64 { self.start_offset + self.position }

    #[must_use]
    pub const fn capacity(&self) -> u64 { self.capacity }

    #[must_use]
    pub const fn remaining(&self) -> u64 { self.capacity - self.position }

    #[must_use]
    pub const fn mode(&self) -> SegmentMode { self.mode }

    #[must_use]
    pub fn path(&self) -> &Path { &self.path }

    fn ensure_space(&self, byte_count: usize) -> Result<()> {
        ensure!(
            self.has_enough_space(byte_count),
            CapacitySnafu {
                requested: byte_count as u64,
                position:  self.position,
                capacity:  self.capacity,
            }
        );
        Ok(())
    }

    fn mmap_error(&self, e: &impl std::fmt::Display) -> QueueError {
        QueueError::MmapFailed {
            path:    self.path.clone(),
            message: e.to_string(),
        }
    }
}
