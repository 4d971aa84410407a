//! Context propagation across message-bus hops.
//!
//! The producer interceptor stamps outbound envelopes with the sender's
//! context; the consumer interceptor lifts those headers into whatever scope
//! the consumer is processing under. Together they keep a logical request
//! correlated across asynchronous hops the same way the HTTP filter does for
//! synchronous ones.

use obskit_core::{extract_into, inject, MessageEnvelope};

use crate::config::ObskitConfig;
use crate::store;

/// Stamps outbound envelopes with the producer's current context.
#[derive(Debug, Clone)]
pub struct ProducerInterceptor {
    enabled: bool,
}

impl ProducerInterceptor {
    /// Builds the interceptor from the top-level configuration.
    #[must_use]
    pub fn new(config: &ObskitConfig) -> Self {
        Self {
            enabled: config.messaging_propagation.enabled,
        }
    }

    /// Injects the current context into the envelope headers. Returns the
    /// number of propagated entries present; zero when disabled or outside
    /// a scope.
    pub fn on_send(&self, envelope: &mut MessageEnvelope) -> usize {
        if !self.enabled {
            return 0;
        }
        inject(&store::snapshot(), envelope)
    }
}

/// Lifts inbound envelope headers into the consumer's current store.
#[derive(Debug, Clone)]
pub struct ConsumerInterceptor {
    enabled: bool,
}

impl ConsumerInterceptor {
    /// Builds the interceptor from the top-level configuration.
    #[must_use]
    pub fn new(config: &ObskitConfig) -> Self {
        Self {
            enabled: config.messaging_propagation.enabled,
        }
    }

    /// Installs propagated entries from the envelope into the current store,
    /// overwriting same-key values and leaving everything else alone.
    /// Returns how many entries were applied; zero when disabled or outside
    /// a scope.
    pub fn on_consume(&self, envelope: &MessageEnvelope) -> usize {
        if !self.enabled {
            return 0;
        }
        store::with_current(|map| extract_into(envelope, map)).unwrap_or(0)
    }

    /// Installs context from the first message of a batch.
    ///
    /// Poll-loop consumers process a whole batch under one logical context;
    /// ids carried by later messages in the batch are not layered over it.
    /// Per-message correlation needs [`ConsumerInterceptor::on_consume`]
    /// inside a per-message scope instead.
    pub fn on_consume_batch(&self, envelopes: &[MessageEnvelope]) -> usize {
        envelopes
            .first()
            .map_or(0, |first| self.on_consume(first))
    }
}
