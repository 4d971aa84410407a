//! Obskit core — canonical context keys, the context data model, carrier
//! codecs, the queued-message envelope, and PII redaction rules.
//!
//! Everything here is runtime-free: no I/O, no async, no globals beyond
//! lazily compiled regex literals. The server crate supplies the scoped
//! "current" store, the middleware, and the interceptors on top of these
//! types.

pub mod carrier;
pub mod context;
pub mod envelope;
pub mod keys;
pub mod redact;

pub use carrier::{extract_into, inject, Carrier};
pub use context::{ContextMap, ContextSnapshot};
pub use envelope::MessageEnvelope;
pub use keys::ContextKey;
pub use redact::{RedactionOptions, Redactor};
