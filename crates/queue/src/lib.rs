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

//! Persistent single-producer single-consumer queue over memory-mapped
//! segment files.
//!
//! Messages are appended as frames (`[len: i32 LE][body][0xFF]`) to a
//! sequence of fixed-size segment files named after the logical offset of
//! their first byte. The producer and the consumer each persist their
//! position in an 8-byte offset file, so both resume where they left off
//! after a restart. Delivery is at-least-once: the consumer's offset only
//! moves on [`Consumer::commit`].

pub mod builder;
pub mod codec;
pub mod config;
pub mod consumer;
pub mod error;
pub mod frame;
pub mod offset;
pub mod path;
pub mod producer;
pub mod queue;
pub mod segment;

pub use builder::QueueBuilder;
pub use codec::{JsonCodec, MessageDecoder, MessageEncoder};
pub use config::{FlushMode, QueueConfig};
pub use consumer::Consumer;
pub use error::{QueueError, Result};
pub use offset::OffsetCursor;
pub use producer::Producer;
pub use queue::Queue;
pub use segment::{Segment, SegmentMode};
