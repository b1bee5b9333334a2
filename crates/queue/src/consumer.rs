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

//! Message reader (consumer) for tailing the queue.
//!
//! The [`Consumer`] reads frames in order starting at its persisted offset:
//! - Locates the segment covering the offset by listing the commit log
//! - Hops to the next segment on a boundary marker or an exhausted segment
//! - Waits for frames that are not written yet, spinning first and then
//!   sleeping
//! - Keeps the last message pending until [`Consumer::commit`]
//!
//! ## Delivery
//!
//! Delivery is at-least-once. The offset file only moves on commit, so a
//! message consumed but not committed before a crash is read again on the
//! next start. Within one process, calling [`Consumer::consume`] again
//! before committing returns the same message without touching storage.

use std::{
    path::PathBuf,
    sync::{
        Arc,
        atomic::{Ordering, fence},
    },
    thread,
    time::{Duration, Instant},
};

use crossbeam::utils::Backoff;
use snafu::{OptionExt, ensure};
use tracing::debug;

use crate::{
    QueueConfig, QueueError, Result,
    codec::MessageDecoder,
    error::{CorruptedFrameSnafu, NoPendingCommitSnafu, SegmentActiveSnafu},
    frame::{
        BOUNDARY_MARKER, HEADER_SIZE, MIN_FRAME_SIZE, SENTINEL, SENTINEL_SIZE, decode_header,
        frame_size,
    },
    offset::OffsetCursor,
    path::{commit_log_dir, consumer_offset_path, segment_exists},
    segment::{Segment, SegmentMode},
};

/// Outcome of a single parse attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Poll {
    /// A frame was read into the buffer and is pending commit.
    Ready,
    /// The segment exists but the next frame is not complete yet.
    NotReady,
    /// No segment covers the offset yet.
    NoSegment,
}

/// The single reader of the queue.
pub struct Consumer {
    /// Shared queue configuration.
    config:      Arc<QueueConfig>,
    /// `<root>/commitlog`.
    segment_dir: PathBuf,
    /// Committed position.
    offset:      OffsetCursor,
    /// Read-only mapping of the segment covering `offset`.
    segment:     Option<Segment>,
    /// Offset the cursor moves to on the next commit.
    pending:     Option<u64>,
    /// Body of the pending message; reused across messages.
    buffer:      Vec<u8>,
}

impl Consumer {
    /// Open the consumer side, loading its persisted offset.
    pub(crate) fn open(config: Arc<QueueConfig>) -> Result<Self> {
        let offset = OffsetCursor::open(
            consumer_offset_path(&config.store_path),
            config.flush_mode,
        )?;
        let segment_dir = commit_log_dir(&config.store_path);

        debug!(offset = offset.value(), "Consumer opened");

        Ok(Self {
            config,
            segment_dir,
            offset,
            segment: None,
            pending: None,
            buffer: Vec::new(),
        })
    }

    /// Block until the next message is available and return its body.
    ///
    /// Returns the same body again until [`Consumer::commit`] is called.
    /// The slice borrows the consumer, so it must be dropped before
    /// committing.
    pub fn consume(&mut self) -> Result<&[u8]> {
        if self.pending.is_none() {
            let mut wait = Wait::new(
                self.config.consumer_spin_wait_duration,
                self.config.consumer_retry_interval,
            );
            loop {
                match self.poll()? {
                    Poll::Ready => break,
                    Poll::NotReady => wait.not_ready(),
                    Poll::NoSegment => wait.no_segment(),
                }
            }
        }
        Ok(&self.buffer)
    }

    /// Try once to read the next message without waiting.
    pub fn try_consume(&mut self) -> Result<Option<&[u8]>> {
        if self.pending.is_none() && self.poll()? != Poll::Ready {
            return Ok(None);
        }
        Ok(Some(&self.buffer))
    }

    /// Block for the next message and decode it with `decoder`.
    ///
    /// A decode failure leaves the message pending.
    pub fn consume_with<T, D>(&mut self, decoder: &D) -> Result<T>
    where
        D: MessageDecoder<T>,
    {
        let offset = self.offset.value();
        let bytes = self.consume()?;
        decoder.decode(bytes).map_err(|e| QueueError::Decode {
            offset,
            source: Box::new(e),
        })
    }

    /// Acknowledge the pending message and persist the new offset.
    pub fn commit(&mut self) -> Result<()> {
        let next = self.pending.context(NoPendingCommitSnafu)?;
        self.offset.move_to(next)?;
        self.pending = None;
        self.buffer.clear();
        Ok(())
    }

    /// Overwrite the persisted offset.
    ///
    /// Only allowed while no segment is open, i.e. before the first
    /// consume or after [`Consumer::close`].
    pub fn adjust_offset(&mut self, offset: u64) -> Result<()> {
        ensure!(self.segment.is_none(), SegmentActiveSnafu);
        self.offset.move_to(offset)?;
        self.pending = None;
        self.buffer.clear();
        debug!(offset, "Consumer offset adjusted");
        Ok(())
    }

    /// Committed offset.
    #[must_use]
    pub const fn offset(&self) -> u64 { self.offset.value() }

    /// Offset the next commit would persist, if a message is pending.
    #[must_use]
    pub const fn pending_offset(&self) -> Option<u64> { self.pending }

    /// Unmap the current segment and drop the pending message.
    ///
    /// An uncommitted message is delivered again by the next consume.
    pub fn close(&mut self) {
        self.segment = None;
        self.pending = None;
        self.buffer.clear();
    }

    /// One pass of the frame parser.
    fn poll(&mut self) -> Result<Poll> {
        loop {
            let offset = self.offset.value();

            let Some(segment) = self.segment.as_mut() else {
                match Segment::try_find(
                    &self.segment_dir,
                    self.config.segment_size,
                    offset,
                    SegmentMode::ReadOnly,
                )? {
                    // Too small for a frame: the next one goes to a segment
                    // that starts at this offset and may not exist yet.
                    Some(segment) if !segment.has_enough_space(MIN_FRAME_SIZE) => {
                        return Ok(Poll::NoSegment);
                    }
                    Some(segment) => {
                        self.segment = Some(segment);
                        continue;
                    }
                    None => return Ok(Poll::NoSegment),
                }
            };

            if !segment.has_enough_space(MIN_FRAME_SIZE) {
                debug!(start_offset = segment.start_offset(), offset, "Segment exhausted");
                self.segment = None;
                continue;
            }

            let mut header = [0u8; HEADER_SIZE];
            segment.read(&mut header)?;

            // A marker is only trusted once the segment it points to exists,
            // since 0xFE is also the low byte of some valid lengths.
            let marker = header[0] == BOUNDARY_MARKER;
            if marker
                && offset != segment.start_offset()
                && segment_exists(&self.segment_dir, offset)
            {
                debug!(start_offset = segment.start_offset(), offset, "Segment boundary");
                self.segment = None;
                continue;
            }

            let length = decode_header(header);
            let Ok(body_len) = usize::try_from(length) else {
                segment.rewind(HEADER_SIZE as u64)?;
                return Ok(Poll::NotReady);
            };
            if body_len == 0 {
                segment.rewind(HEADER_SIZE as u64)?;
                return Ok(Poll::NotReady);
            }

            if !segment.has_enough_space(body_len + SENTINEL_SIZE) {
                segment.rewind(HEADER_SIZE as u64)?;
                // The producer retired this segment but the next file is
                // not there yet.
                ensure!(marker, CorruptedFrameSnafu { offset, length });
                return Ok(Poll::NotReady);
            }

            let mut sentinel = [0u8; SENTINEL_SIZE];
            segment.peek(body_len, &mut sentinel)?;
            if sentinel[0] != SENTINEL {
                segment.rewind(HEADER_SIZE as u64)?;
                return Ok(Poll::NotReady);
            }
            fence(Ordering::Acquire);

            self.buffer.resize(body_len, 0);
            segment.read(&mut self.buffer)?;
            segment.read(&mut sentinel)?;

            self.pending = Some(offset + frame_size(body_len) as u64);
            return Ok(Poll::Ready);
        }
    }
}

/// Two-phase wait: snooze until the spin budget is spent, then sleep.
struct Wait {
    started:        Instant,
    spin_duration:  Duration,
    retry_interval: Duration,
    backoff:        Backoff,
}

impl Wait {
    fn new(spin_duration: Duration, retry_interval: Duration) -> Self {
        Self {
            started: Instant::now(),
            spin_duration,
            retry_interval,
            backoff: Backoff::new(),
        }
    }

    fn not_ready(&self) {
        if self.started.elapsed() < self.spin_duration {
            self.backoff.snooze();
        } else {
            thread::sleep(self.retry_interval);
        }
    }

    /// Listing the directory is too costly to spin on.
    fn no_segment(&self) { thread::sleep(self.retry_interval); }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use tempfile::TempDir;

    use super::*;
    use crate::{frame::encode_header, producer::Producer};

    fn test_config(store_path: &Path, segment_size: u64) -> Arc<QueueConfig> {
        Arc::new(QueueConfig {
            store_path: store_path.to_path_buf(),
            segment_size,
            consumer_retry_interval: Duration::from_millis(5),
            consumer_spin_wait_duration: Duration::from_millis(1),
            ..Default::default()
        })
    }

    #[test]
    fn test_empty_queue_is_not_ready() {
        let temp_dir = TempDir::new().unwrap();
        let mut consumer = Consumer::open(test_config(temp_dir.path(), 64)).unwrap();

        assert!(consumer.try_consume().unwrap().is_none());
        assert_eq!(consumer.poll().unwrap(), Poll::NoSegment);
    }

    #[test]
    fn test_consume_and_commit() {
        let temp_dir = TempDir::new().unwrap();
        let config = test_config(temp_dir.path(), 64);
        let mut producer = Producer::open(config.clone()).unwrap();
        let mut consumer = Consumer::open(config).unwrap();

        producer.produce(b"one").unwrap();
        producer.produce(b"two").unwrap();

        assert_eq!(consumer.consume().unwrap(), b"one");
        assert_eq!(consumer.pending_offset(), Some(8));
        assert_eq!(consumer.offset(), 0);
        consumer.commit().unwrap();
        assert_eq!(consumer.offset(), 8);

        assert_eq!(consumer.consume().unwrap(), b"two");
        consumer.commit().unwrap();
        assert_eq!(consumer.offset(), 16);

        assert!(consumer.try_consume().unwrap().is_none());
    }

    #[test]
    fn test_uncommitted_message_is_returned_again() {
        let temp_dir = TempDir::new().unwrap();
        let config = test_config(temp_dir.path(), 64);
        let mut producer = Producer::open(config.clone()).unwrap();
        let mut consumer = Consumer::open(config).unwrap();

        producer.produce(b"first").unwrap();
        producer.produce(b"second").unwrap();

        for _ in 0..3 {
            assert_eq!(consumer.consume().unwrap(), b"first");
        }
        consumer.commit().unwrap();
        assert_eq!(consumer.consume().unwrap(), b"second");
    }

    #[test]
    fn test_commit_without_pending_fails() {
        let temp_dir = TempDir::new().unwrap();
        let mut consumer = Consumer::open(test_config(temp_dir.path(), 64)).unwrap();

        assert!(matches!(
            consumer.commit(),
            Err(QueueError::NoPendingCommit)
        ));
    }

    #[test]
    fn test_torn_frame_waits_for_sentinel() {
        let temp_dir = TempDir::new().unwrap();
        let config = test_config(temp_dir.path(), 64);
        let mut consumer = Consumer::open(config).unwrap();

        let dir = commit_log_dir(temp_dir.path());
        let mut writer = Segment::create(&dir, 0, 64).unwrap();
        writer.write(&encode_header(5)).unwrap();
        writer.write(b"hello").unwrap();

        assert!(consumer.try_consume().unwrap().is_none());
        assert!(consumer.try_consume().unwrap().is_none());

        writer.write_byte(SENTINEL).unwrap();
        assert_eq!(consumer.try_consume().unwrap(), Some(&b"hello"[..]));
    }

    #[test]
    fn test_corrupted_length_is_fatal() {
        let temp_dir = TempDir::new().unwrap();
        let mut consumer = Consumer::open(test_config(temp_dir.path(), 64)).unwrap();

        let dir = commit_log_dir(temp_dir.path());
        let mut writer = Segment::create(&dir, 0, 64).unwrap();
        writer.write(&encode_header(1000)).unwrap();

        assert!(matches!(
            consumer.try_consume(),
            Err(QueueError::CorruptedFrame {
                offset: 0,
                length: 1000
            })
        ));
    }

    #[test]
    fn test_length_with_marker_low_byte_is_a_frame() {
        let temp_dir = TempDir::new().unwrap();
        let config = test_config(temp_dir.path(), 1024);
        let mut producer = Producer::open(config.clone()).unwrap();
        let mut consumer = Consumer::open(config).unwrap();

        let body = vec![0x5Au8; usize::from(BOUNDARY_MARKER)];
        producer.produce(&body).unwrap();

        assert_eq!(consumer.try_consume().unwrap(), Some(&body[..]));
    }

    #[test]
    fn test_marker_before_next_segment_exists() {
        let temp_dir = TempDir::new().unwrap();
        let config = test_config(temp_dir.path(), 32);
        let mut consumer = Consumer::open(config).unwrap();

        let dir = commit_log_dir(temp_dir.path());
        let mut first = Segment::create(&dir, 0, 32).unwrap();
        first.write(&encode_header(3)).unwrap();
        first.write(b"abc").unwrap();
        first.write_byte(SENTINEL).unwrap();
        first.write_byte(BOUNDARY_MARKER).unwrap();

        assert_eq!(consumer.try_consume().unwrap(), Some(&b"abc"[..]));
        consumer.commit().unwrap();

        // Retired, but the producer has not created the next file yet.
        assert!(consumer.try_consume().unwrap().is_none());

        let mut second = Segment::create(&dir, 8, 32).unwrap();
        second.write(&encode_header(2)).unwrap();
        second.write(b"de").unwrap();
        second.write_byte(SENTINEL).unwrap();

        assert_eq!(consumer.try_consume().unwrap(), Some(&b"de"[..]));
        consumer.commit().unwrap();
        assert_eq!(consumer.offset(), 15);
    }

    #[test]
    fn test_located_segment_already_exhausted() {
        let temp_dir = TempDir::new().unwrap();
        // One 21-byte frame leaves 5 bytes: closed without a marker.
        let config = test_config(temp_dir.path(), 26);
        let mut producer = Producer::open(config.clone()).unwrap();
        let mut consumer = Consumer::open(config).unwrap();

        producer.produce(&[1u8; 16]).unwrap();
        consumer.adjust_offset(21).unwrap();

        assert!(consumer.try_consume().unwrap().is_none());
        assert_eq!(consumer.poll().unwrap(), Poll::NoSegment);
        assert!(consumer.segment.is_none());

        producer.produce(&[2u8; 16]).unwrap();
        assert_eq!(consumer.try_consume().unwrap(), Some(&[2u8; 16][..]));
        consumer.commit().unwrap();
        assert_eq!(consumer.offset(), 42);
    }

    #[test]
    fn test_adjust_offset() {
        let temp_dir = TempDir::new().unwrap();
        let config = test_config(temp_dir.path(), 64);
        let mut producer = Producer::open(config.clone()).unwrap();
        let mut consumer = Consumer::open(config).unwrap();

        producer.produce(b"aa").unwrap();
        let second = producer.produce(b"bb").unwrap();

        consumer.adjust_offset(second).unwrap();
        assert_eq!(consumer.consume().unwrap(), b"bb");

        assert!(matches!(
            consumer.adjust_offset(0),
            Err(QueueError::SegmentActive)
        ));

        consumer.close();
        consumer.adjust_offset(0).unwrap();
        assert_eq!(consumer.consume().unwrap(), b"aa");
    }

    #[test]
    fn test_consume_blocks_until_produced() {
        let temp_dir = TempDir::new().unwrap();
        let config = test_config(temp_dir.path(), 64);
        let mut consumer = Consumer::open(config.clone()).unwrap();

        let reader = thread::spawn(move || {
            let body = consumer.consume().unwrap().to_vec();
            consumer.commit().unwrap();
            body
        });

        thread::sleep(Duration::from_millis(30));
        let mut producer = Producer::open(config).unwrap();
        producer.produce(b"late").unwrap();

        assert_eq!(reader.join().unwrap(), b"late");
    }
}
