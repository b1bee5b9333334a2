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

//! On-disk frame format definitions.
//!
//! Messages are stored contiguously in segment files with the following
//! binary layout:
//!
//! ```text
//! ┌─────────────────┬──────────────────────┬──────────────┐
//! │  Length (4B)    │   Body (variable)    │ Sentinel (1B)│
//! │  LE i32, > 0    │   raw bytes          │    0xFF      │
//! └─────────────────┴──────────────────────┴──────────────┘
//! ```
//!
//! Segment files are zero-filled when created, so a length that reads as
//! `0` marks space the producer has not reached yet. A positive length
//! followed by anything but [`SENTINEL`] is a frame whose write is still in
//! flight. Neither is an error: both tell the consumer to wait.
//!
//! When the producer retires a segment that still has room for a minimal
//! frame it writes a single [`BOUNDARY_MARKER`] byte where the next header
//! would start. The marker byte can also be the low byte of a genuine
//! length, so readers only honour it once the next segment file, starting
//! exactly at that offset, exists.

/// Size of the length prefix in bytes.
pub const HEADER_SIZE: usize = 4;

/// Size of the trailing sentinel in bytes.
pub const SENTINEL_SIZE: usize = 1;

/// Trailing byte that marks a fully written frame.
pub const SENTINEL: u8 = 0xFF;

/// Byte written at the retirement position of a segment.
pub const BOUNDARY_MARKER: u8 = 0xFE;

/// Smallest possible frame: header, a one byte body and the sentinel.
///
/// Tied to [`HEADER_SIZE`] so that a change of the length encoding moves
/// the boundary threshold with it.
pub const MIN_FRAME_SIZE: usize = HEADER_SIZE + 1 + SENTINEL_SIZE;

/// Total on-disk size of a frame carrying `body_len` bytes.
///
/// ```
/// // 4 (length) + 16 (body) + 1 (sentinel) = 21
/// assert_eq!(mfqueue::frame::frame_size(16), 21);
/// ```
#[inline]
#[must_use]
pub const fn frame_size(body_len: usize) -> usize { HEADER_SIZE + body_len + SENTINEL_SIZE }

/// Largest body that fits into an empty segment of `segment_size` bytes.
#[must_use]
pub fn max_body_size(segment_size: u64) -> usize {
    let overhead = (HEADER_SIZE + SENTINEL_SIZE) as u64;
    let limit = segment_size.saturating_sub(overhead).min(i32::MAX as u64);
    usize::try_from(limit).unwrap_or(i32::MAX as usize)
}

/// Encode a body length into its header bytes.
#[inline]
#[allow(clippy::cast_possible_truncation, clippy::cast_possible_wrap)]
pub(crate) const fn encode_header(body_len: usize) -> [u8; HEADER_SIZE] {
    (body_len as i32).to_le_bytes()
}

/// Decode a header into the signed body length.
#[inline]
pub(crate) const fn decode_header(header: [u8; HEADER_SIZE]) -> i32 { i32::from_le_bytes(header) }

#[cfg(test)]
mod tests {
    use test_case::test_case;

    use super::*;

    #[test]
    fn test_frame_size() {
        assert_eq!(frame_size(1), MIN_FRAME_SIZE);
        assert_eq!(frame_size(16), 21);
        assert_eq!(frame_size(100), 105);
    }

    #[test_case(33, 28 ; "small segment")]
    #[test_case(5, 0 ; "segment smaller than overhead")]
    #[test_case(u64::MAX, i32::MAX as usize ; "clamped to i32 range")]
    fn test_max_body_size(segment_size: u64, expected: usize) {
        assert_eq!(max_body_size(segment_size), expected);
    }

    #[test]
    fn test_header_round_trip() {
        assert_eq!(encode_header(254), [0xFE, 0, 0, 0]);
        assert_eq!(decode_header(encode_header(4096)), 4096);
        assert_eq!(decode_header([0, 0, 0, 0]), 0);
        assert!(decode_header([0xFF, 0xFF, 0xFF, 0xFF]) < 0);
    }

    #[test]
    fn test_markers_are_distinct() {
        assert_ne!(SENTINEL, BOUNDARY_MARKER);
        assert_ne!(SENTINEL, 0);
        assert_ne!(BOUNDARY_MARKER, 0);
    }
}
