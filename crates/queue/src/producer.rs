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

//! Message writer (producer) for appending to the queue.
//!
//! The [`Producer`] owns the write side of the commit log:
//! - Frames each message as `[length][body][sentinel]`
//! - Rolls to a new segment when the current one runs out of room
//! - Advances the durable producer offset only after a frame is complete
//!
//! ## Crash safety
//!
//! The offset cursor is the durability point. A crash mid-frame leaves a
//! tail that readers treat as "not written yet". On restart the producer
//! reopens the segment covering its offset, zeroes everything past that
//! offset and writes over it.

use std::{
    path::PathBuf,
    sync::{
        Arc,
        atomic::{Ordering, fence},
    },
};

use snafu::ensure;
use tracing::{debug, warn};

use crate::{
    FlushMode, QueueConfig, QueueError, Result,
    codec::MessageEncoder,
    error::{EmptyMessageSnafu, MessageTooLargeSnafu},
    frame::{BOUNDARY_MARKER, MIN_FRAME_SIZE, SENTINEL, encode_header, frame_size},
    offset::OffsetCursor,
    path::{commit_log_dir, producer_offset_path},
    segment::{Segment, SegmentMode},
};

/// The single writer of the queue.
///
/// Not meant to be shared between threads; move it to the producing
/// thread instead.
pub struct Producer {
    /// Shared queue configuration.
    config:      Arc<QueueConfig>,
    /// `<root>/commitlog`.
    segment_dir: PathBuf,
    /// Durable position of the next frame.
    offset:      OffsetCursor,
    /// Segment currently receiving frames.
    segment:     Option<Segment>,
}

impl Producer {
    /// Open the producer side, loading its persisted offset.
    pub(crate) fn open(config: Arc<QueueConfig>) -> Result<Self> {
        let offset = OffsetCursor::open(
            producer_offset_path(&config.store_path),
            config.flush_mode,
        )?;
        let segment_dir = commit_log_dir(&config.store_path);

        debug!(offset = offset.value(), "Producer opened");

        Ok(Self {
            config,
            segment_dir,
            offset,
            segment: None,
        })
    }

    /// Append one message.
    ///
    /// Returns the logical offset at which the frame starts. Nothing is
    /// written when the message is rejected.
    ///
    /// # Errors
    ///
    /// [`QueueError::EmptyMessage`] and [`QueueError::MessageTooLarge`] for
    /// rejected input; storage failures otherwise.
    pub fn produce(&mut self, message: &[u8]) -> Result<u64> {
        ensure!(!message.is_empty(), EmptyMessageSnafu);
        let max = self.config.max_message_size();
        ensure!(
            message.len() <= max,
            MessageTooLargeSnafu {
                size: message.len(),
                max,
            }
        );

        let total_size = frame_size(message.len());
        let flush_mode = self.config.flush_mode;
        let frame_offset = self.offset.value();

        let segment = self.ensure_segment(total_size)?;
        let written = Self::write_frame(segment, message, flush_mode)
            .and_then(|()| self.offset.advance_by(total_size as u64));

        // The segment position is past the frame but the offset is not. Unmap
        // it so the next call rediscovers and scrubs from the durable offset.
        if let Err(e) = written {
            self.segment = None;
            return Err(e);
        }

        if self
            .segment
            .as_ref()
            .is_some_and(|segment| !segment.has_enough_space(MIN_FRAME_SIZE))
            && let Err(e) = self.close()
        {
            warn!(error = ?e, offset = self.offset.value(), "Failed to close full segment");
        }

        Ok(frame_offset)
    }

    /// Encode `message` with `encoder` and append it.
    pub fn produce_with<T, E>(&mut self, message: &T, encoder: &E) -> Result<u64>
    where
        T: ?Sized,
        E: MessageEncoder<T>,
    {
        let bytes = encoder.encode(message).map_err(|e| QueueError::Encode {
            source: Box::new(e),
        })?;
        self.produce(&bytes)
    }

    /// Logical offset the next frame will be written at.
    #[must_use]
    pub const fn next_offset(&self) -> u64 { self.offset.value() }

    /// Unmap the active segment, flushing it first in sync mode.
    ///
    /// The next [`Producer::produce`] rediscovers it from the offset.
    pub fn close(&mut self) -> Result<()> {
        if let Some(segment) = self.segment.take() {
            if self.config.flush_mode == FlushMode::Sync {
                segment.flush()?;
            }
            debug!(
                start_offset = segment.start_offset(),
                position = segment.position(),
                "Closed producer segment"
            );
        }
        Ok(())
    }

    /// Return a segment with room for `total_size` bytes at the producer
    /// offset, rolling or creating one as needed.
    fn ensure_segment(&mut self, total_size: usize) -> Result<&mut Segment> {
        if let Some(segment) = self.segment.take() {
            if segment.has_enough_space(total_size) {
                return Ok(self.segment.insert(segment));
            }
            self.retire(segment)?;
            let segment = self.create_segment()?;
            return Ok(self.segment.insert(segment));
        }

        let offset = self.offset.value();
        let segment = match Segment::try_find(
            &self.segment_dir,
            self.config.segment_size,
            offset,
            SegmentMode::ReadWrite,
        )? {
            Some(mut segment) => {
                let cleared = segment.zero_remaining()?;
                if cleared > 0 {
                    warn!(
                        offset,
                        cleared,
                        path = ?segment.path(),
                        "Discarded unacknowledged bytes past the producer offset"
                    );
                }

                if segment.has_enough_space(total_size) {
                    segment
                } else {
                    self.retire(segment)?;
                    self.create_segment()?
                }
            }
            None => self.create_segment()?,
        };

        Ok(self.segment.insert(segment))
    }

    /// Write one frame at the segment position. The sentinel goes last.
    fn write_frame(segment: &mut Segment, message: &[u8], flush_mode: FlushMode) -> Result<()> {
        let position = segment.position();

        segment.write(&encode_header(message.len()))?;
        segment.write(message)?;
        // Readers check the sentinel before copying the body.
        fence(Ordering::Release);
        segment.write_byte(SENTINEL)?;

        if flush_mode == FlushMode::Sync {
            segment.flush_range(position, frame_size(message.len()) as u64)?;
        }
        Ok(())
    }

    /// Mark `segment` as finished and release it.
    ///
    /// The boundary marker is only written when a reader could otherwise
    /// mistake the remaining space for room for another frame.
    fn retire(&self, mut segment: Segment) -> Result<()> {
        let marked = segment.has_enough_space(MIN_FRAME_SIZE);
        if marked {
            segment.write_byte(BOUNDARY_MARKER)?;
        }
        if self.config.flush_mode == FlushMode::Sync {
            segment.flush()?;
        }

        debug!(
            start_offset = segment.start_offset(),
            retired_at = self.offset.value(),
            marked,
            "Retired segment"
        );
        Ok(())
    }

    fn create_segment(&self) -> Result<Segment> {
        Segment::create(
            &self.segment_dir,
            self.offset.value(),
            self.config.segment_size,
        )
    }
}

impl Drop for Producer {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            warn!(error = ?e, "Failed to close producer segment");
        }
    }
}
