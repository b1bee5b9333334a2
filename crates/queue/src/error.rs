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

use std::path::PathBuf;

use snafu::Snafu;

/// Boxed error returned by user supplied codecs.
pub type BoxedError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Queue operation errors.
///
/// Liveness conditions (frame not written yet, torn frame, end of segment)
/// are never reported through this type; the consumer absorbs them.
#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum QueueError {
    /// Filesystem I/O failure.
    #[snafu(display("IO error: {source}"), context(false))]
    Io { source: std::io::Error },

    /// Memory mapping operation failed.
    #[snafu(display("Mmap operation failed on {}: {message}", path.display()))]
    MmapFailed { path: PathBuf, message: String },

    /// The store path is empty or points at a regular file.
    #[snafu(display("Invalid store path: {}", path.display()))]
    InvalidPath { path: PathBuf },

    /// A configuration value is out of range.
    #[snafu(display("Invalid configuration: {message}"))]
    InvalidConfig { message: String },

    /// A segment file on disk does not match the configured segment size.
    #[snafu(display(
        "Segment {} has {actual} bytes, expected {expected}",
        path.display()
    ))]
    SegmentSizeMismatch {
        path:     PathBuf,
        expected: u64,
        actual:   u64,
    },

    /// A segment with the same start offset already exists.
    #[snafu(display("Segment already exists: {}", path.display()))]
    AlreadyExists { path: PathBuf },

    /// A read or write would cross the end of the segment.
    #[snafu(display(
        "Not enough space in segment: requested {requested} bytes at position {position} of \
         {capacity}"
    ))]
    Capacity {
        requested: u64,
        position:  u64,
        capacity:  u64,
    },

    /// A rewind would move before the start of the segment view.
    #[snafu(display("Cannot rewind {steps} bytes from position {position}"))]
    Rewind { steps: u64, position: u64 },

    /// Write attempted through a read-only mapping.
    #[snafu(display("Segment is mapped read-only: {}", path.display()))]
    ReadOnly { path: PathBuf },

    /// An offset cursor would exceed `u64::MAX`.
    #[snafu(display("Offset {offset} cannot advance by {delta}"))]
    OffsetOverflow { offset: u64, delta: u64 },

    /// An offset file exists but does not hold exactly one `u64`.
    #[snafu(display("Corrupted offset file {} ({len} bytes)", path.display()))]
    CorruptedOffsetFile { path: PathBuf, len: u64 },

    /// A frame header declares a body that cannot fit in its segment.
    #[snafu(display("Corrupted frame at offset {offset}: length {length} exceeds segment"))]
    CorruptedFrame { offset: u64, length: i32 },

    /// Message body is larger than a segment can hold.
    #[snafu(display("Message of {size} bytes exceeds the maximum of {max} bytes"))]
    MessageTooLarge { size: usize, max: usize },

    /// Empty bodies are indistinguishable from unwritten space.
    #[snafu(display("Cannot produce an empty message"))]
    EmptyMessage,

    /// `commit` called without a consumed message awaiting acknowledgment.
    #[snafu(display("Cannot commit without a pending offset to commit"))]
    NoPendingCommit,

    /// `adjust_offset` called while the consumer holds an open segment.
    #[snafu(display("Consumer offset cannot be adjusted while a segment is open"))]
    SegmentActive,

    /// The message encoder failed.
    #[snafu(display("Failed to encode message: {source}"))]
    Encode { source: BoxedError },

    /// The message decoder failed.
    #[snafu(display("Failed to decode message at offset {offset}: {source}"))]
    Decode { offset: u64, source: BoxedError },
}

/// Result type for queue operations.
pub type Result<T> = std::result::Result<T, QueueError>;
