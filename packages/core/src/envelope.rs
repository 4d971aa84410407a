//! Queued-message envelope: the carrier shape used by the producer and
//! consumer interceptors.
//!
//! Brokers differ in how they spell headers; this envelope normalizes them to
//! a string-keyed bag of byte values, which is the common denominator across
//! Kafka-style record headers and AMQP-style properties. Header values
//! written by this crate are always UTF-8; values read from elsewhere may be
//! arbitrary bytes and decode as `None` when they are not valid text.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::carrier::Carrier;

/// One queued message: routing metadata, a header bag, and an opaque payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MessageEnvelope {
    /// Destination topic or queue name.
    pub topic: String,
    /// Partitioning/routing key, when the producer set one.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub key: Option<String>,
    /// String-keyed header bag. Deterministic order for stable serialization.
    headers: BTreeMap<String, Vec<u8>>,
    /// Message body. Never inspected by the interceptors.
    #[serde(with = "serde_bytes")]
    pub payload: Vec<u8>,
}

impl MessageEnvelope {
    /// Creates an envelope with no key and no headers.
    #[must_use]
    pub fn new(topic: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        Self {
            topic: topic.into(),
            key: None,
            headers: BTreeMap::new(),
            payload: payload.into(),
        }
    }

    /// Creates an envelope carrying a JSON-serialized payload.
    ///
    /// # Errors
    ///
    /// Returns the underlying error when `value` fails to serialize.
    pub fn json<T: Serialize>(
        topic: impl Into<String>,
        value: &T,
    ) -> Result<Self, serde_json::Error> {
        Ok(Self::new(topic, serde_json::to_vec(value)?))
    }

    /// Sets the routing key.
    #[must_use]
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Raw header bytes for `name`, when present.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&[u8]> {
        self.headers.get(name).map(Vec::as_slice)
    }

    /// Header value for `name` decoded as UTF-8; `None` when the header is
    /// absent or not valid text.
    #[must_use]
    pub fn header_str(&self, name: &str) -> Option<&str> {
        self.headers
            .get(name)
            .and_then(|bytes| std::str::from_utf8(bytes).ok())
    }

    /// Sets header `name`, overwriting any previous value.
    pub fn set_header(&mut self, name: impl Into<String>, value: impl Into<Vec<u8>>) {
        self.headers.insert(name.into(), value.into());
    }

    /// Number of headers set.
    #[must_use]
    pub fn header_count(&self) -> usize {
        self.headers.len()
    }

    /// Iterates headers in deterministic (sorted) name order.
    pub fn headers(&self) -> impl Iterator<Item = (&str, &[u8])> {
        self.headers
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_slice()))
    }
}

impl Carrier for MessageEnvelope {
    fn get(&self, name: &str) -> Option<String> {
        self.header_str(name).map(str::to_owned)
    }

    fn set(&mut self, name: &str, value: &str) {
        self.set_header(name, value.as_bytes().to_vec());
    }
}
