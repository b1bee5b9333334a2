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

//! Pluggable message serialization.
//!
//! The storage core only moves byte slices. Typed produce/consume go
//! through these two traits, which callers implement for their own
//! formats. [`JsonCodec`] covers any serde type.

use std::marker::PhantomData;

use bytes::Bytes;
use serde::{Serialize, de::DeserializeOwned};

/// Turns a message into the bytes stored in one frame.
pub trait MessageEncoder<T: ?Sized> {
    type Error: std::error::Error + Send + Sync + 'static;

    fn encode(&self, message: &T) -> Result<Bytes, Self::Error>;
}

/// Rebuilds a message from the body of one frame.
pub trait MessageDecoder<T> {
    type Error: std::error::Error + Send + Sync + 'static;

    fn decode(&self, bytes: &[u8]) -> Result<T, Self::Error>;
}

/// JSON codec backed by `serde_json`.
pub struct JsonCodec<T> {
    _marker: PhantomData<fn() -> T>,
}

impl<T> JsonCodec<T> {
    #[must_use]
    pub const fn new() -> Self {
        Self {
            _marker: PhantomData,
        }
    }
}

impl<T> Default for JsonCodec<T> {
    fn default() -> Self { Self::new() }
}

impl<T: Serialize> MessageEncoder<T> for JsonCodec<T> {
    type Error = serde_json::Error;

    fn encode(&self, message: &T) -> Result<Bytes, Self::Error> {
        serde_json::to_vec(message).map(Bytes::from)
    }
}

impl<T: DeserializeOwned> MessageDecoder<T> for JsonCodec<T> {
    type Error = serde_json::Error;

    fn decode(&self, bytes: &[u8]) -> Result<T, Self::Error> { serde_json::from_slice(bytes) }
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;

    use super::*;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Reading {
        sensor: String,
        value:  f64,
    }

    #[test]
    fn test_json_codec() {
        let codec = JsonCodec::<Reading>::new();
        let reading = Reading {
            sensor: "t1".to_string(),
            value:  21.5,
        };

        let bytes = codec.encode(&reading).unwrap();
        assert_eq!(&bytes[..], br#"{"sensor":"t1","value":21.5}"#);
        assert_eq!(codec.decode(&bytes).unwrap(), reading);
    }

    #[test]
    fn test_json_codec_rejects_garbage() {
        let codec = JsonCodec::<Reading>::default();
        assert!(codec.decode(b"not json").is_err());
    }
}
