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

//! Store layout and segment discovery.
//!
//! ```text
//! <root>/commitlog/<20-digit start offset>
//! <root>/offset/producer.offset
//! <root>/offset/consumer.offset
//! ```
//!
//! Segment file names are the only index: listing the commit log directory
//! and parsing names back into start offsets is the source of truth for
//! segment boundaries.

use std::path::{Path, PathBuf};

use crate::Result;

pub const COMMIT_LOG_DIR: &str = "commitlog";
pub const OFFSET_DIR: &str = "offset";
pub const PRODUCER_OFFSET_FILE: &str = "producer.offset";
pub const CONSUMER_OFFSET_FILE: &str = "consumer.offset";

/// Digits in a segment file name; enough for any `u64`.
pub const SEGMENT_NAME_WIDTH: usize = 20;

/// Returns `root/commitlog`.
pub fn commit_log_dir<P: AsRef<Path>>(root: P) -> PathBuf { root.as_ref().join(COMMIT_LOG_DIR) }

/// Returns `root/offset`.
pub fn offset_dir<P: AsRef<Path>>(root: P) -> PathBuf { root.as_ref().join(OFFSET_DIR) }

/// Returns `root/offset/producer.offset`.
pub fn producer_offset_path<P: AsRef<Path>>(root: P) -> PathBuf {
    offset_dir(root).join(PRODUCER_OFFSET_FILE)
}

/// Returns `root/offset/consumer.offset`.
pub fn consumer_offset_path<P: AsRef<Path>>(root: P) -> PathBuf {
    offset_dir(root).join(CONSUMER_OFFSET_FILE)
}

/// Generates a segment file name: the zero-padded decimal start offset.
pub fn segment_file_name(start_offset: u64) -> String {
    format!("{start_offset:0width$}", width = SEGMENT_NAME_WIDTH)
}

/// Returns `dir/<20-digit start offset>`.
pub fn segment_file_path<P: AsRef<Path>>(dir: P, start_offset: u64) -> PathBuf {
    dir.as_ref().join(segment_file_name(start_offset))
}

/// Parses a segment file name back into its start offset.
///
/// Anything other than exactly [`SEGMENT_NAME_WIDTH`] ASCII digits is
/// rejected, which keeps temporary files out of discovery.
pub fn parse_segment_file_name(name: &str) -> Option<u64> {
    if name.len() != SEGMENT_NAME_WIDTH || !name.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    name.parse().ok()
}

/// Whether a segment starting at `start_offset` exists in `dir`.
pub fn segment_exists<P: AsRef<Path>>(dir: P, start_offset: u64) -> bool {
    segment_file_path(dir, start_offset).is_file()
}

/// Scans `dir` for segment files and returns their start offsets in
/// ascending order.
///
/// A missing directory yields an empty list: the producer may simply not
/// have written anything yet.
pub fn scan_segment_offsets<P: AsRef<Path>>(dir: P) -> Result<Vec<u64>> {
    let dir = dir.as_ref();
    if !dir.exists() {
        return Ok(Vec::new());
    }

    let mut offsets = Vec::new();
    for entry in std::fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_file() {
            continue;
        }
        if let Some(start) = entry.file_name().to_str().and_then(parse_segment_file_name) {
            offsets.push(start);
        }
    }

    offsets.sort_unstable();
    Ok(offsets)
}

/// Finds the start offset of the segment whose range contains `offset`.
///
/// Walks the start offsets newest first and stops at the first one that is
/// not past `offset`. Returns `None` when that segment ends before
/// `offset`, or when every segment starts after it. Both mean the data
/// has not been written yet.
pub fn find_segment_start<P: AsRef<Path>>(
    dir: P,
    segment_size: u64,
    offset: u64,
) -> Result<Option<u64>> {
    let offsets = scan_segment_offsets(dir)?;

    let Some(&start) = offsets.iter().rev().find(|&&start| start <= offset) else {
        return Ok(None);
    };

    if offset - start >= segment_size {
        return Ok(None);
    }

    Ok(Some(start))
}
