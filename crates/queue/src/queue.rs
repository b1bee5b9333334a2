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

//! Main queue struct and lifecycle management.
//!
//! The [`Queue`] binds one [`Producer`] and one [`Consumer`] to the same
//! store path and segment size. Both are opened on first use.
//!
//! ## Usage
//!
//! ```no_run
//! use mfqueue::QueueBuilder;
//!
//! # fn main() -> mfqueue::Result<()> {
//! let mut queue = QueueBuilder::new("/path/to/queue").build()?;
//!
//! queue.producer()?.produce(b"hello")?;
//!
//! let consumer = queue.consumer()?;
//! assert_eq!(consumer.consume()?, b"hello");
//! consumer.commit()?;
//!
//! queue.shutdown()?;
//! # Ok(())
//! # }
//! ```
//!
//! To run the two roles on separate threads, split the queue with
//! [`Queue::into_parts`].

use std::sync::Arc;

use tracing::info;

use crate::{QueueConfig, Result, consumer::Consumer, producer::Producer};

/// A persistent single-producer single-consumer queue.
pub struct Queue {
    /// Shared configuration (store path, segment size, wait policy).
    config:   Arc<QueueConfig>,
    producer: Option<Producer>,
    consumer: Option<Consumer>,
}

impl Queue {
    /// Create a queue from a validated configuration.
    ///
    /// Creates the store directory if it is missing. Segment and offset
    /// files are only touched when a role is opened.
    pub(crate) fn new(config: QueueConfig) -> Result<Self> {
        config.validate()?;
        std::fs::create_dir_all(&config.store_path)?;

        info!(
            path = ?config.store_path,
            segment_size = config.segment_size,
            flush_mode = ?config.flush_mode,
            "Queue initialized"
        );

        Ok(Self {
            config:   Arc::new(config),
            producer: None,
            consumer: None,
        })
    }

    /// Open a queue from an already built configuration, e.g. one loaded
    /// with serde.
    pub fn open(config: QueueConfig) -> Result<Self> { Self::new(config) }

    /// The producer, opened on first call.
    pub fn producer(&mut self) -> Result<&mut Producer> {
        if let Some(producer) = self.producer.take() {
            return Ok(self.producer.insert(producer));
        }
        let producer = Producer::open(self.config.clone())?;
        Ok(self.producer.insert(producer))
    }

    /// The consumer, opened on first call.
    pub fn consumer(&mut self) -> Result<&mut Consumer> {
        if let Some(consumer) = self.consumer.take() {
            return Ok(self.consumer.insert(consumer));
        }
        let consumer = Consumer::open(self.config.clone())?;
        Ok(self.consumer.insert(consumer))
    }

    /// Split into the two roles so each can move to its own thread.
    pub fn into_parts(mut self) -> Result<(Producer, Consumer)> {
        let producer = match self.producer.take() {
            Some(producer) => producer,
            None => Producer::open(self.config.clone())?,
        };
        let consumer = match self.consumer.take() {
            Some(consumer) => consumer,
            None => Consumer::open(self.config.clone())?,
        };
        Ok((producer, consumer))
    }

    /// Get the queue configuration.
    #[must_use]
    pub fn config(&self) -> &QueueConfig { &self.config }

    /// Close both roles.
    ///
    /// Flushes the producer's segment. An uncommitted consumer message is
    /// delivered again after the next open.
    pub fn shutdown(mut self) -> Result<()> {
        info!(path = ?self.config.store_path, "Shutting down queue");

        if let Some(mut producer) = self.producer.take() {
            producer.close()?;
        }
        if let Some(mut consumer) = self.consumer.take() {
            consumer.close();
        }

        info!("Queue shutdown complete");
        Ok(())
    }
}
