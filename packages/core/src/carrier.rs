//! Carrier contract: reading and writing context fields on any outbound or
//! inbound message that exposes a string-keyed header bag.
//!
//! The inject/extract algorithms here are pure; they know nothing about HTTP
//! clients or message brokers. Adapters implement [`Carrier`] for the
//! concrete header bag (`http::HeaderMap` on the server side,
//! [`MessageEnvelope`](crate::envelope::MessageEnvelope) here) and the
//! interceptors call [`inject`] just before a message leaves the process and
//! [`extract_into`] when one arrives.

use crate::context::{ContextMap, ContextSnapshot};
use crate::keys::PROPAGATED_KEYS;

/// A header/metadata bag addressable by string name.
///
/// Payloads are never touched; only the four propagated canonical fields are
/// read or written through this trait.
pub trait Carrier {
    /// Returns the header value for `name`, decoded to a string, or `None`
    /// when the header is absent or not representable as text.
    fn get(&self, name: &str) -> Option<String>;

    /// Sets the header `name` to `value`, overwriting any previous value.
    fn set(&mut self, name: &str, value: &str);
}

/// Hands each propagated field present in `snapshot` to the carrier under
/// its canonical header name. Absent and empty values are skipped, so a
/// carrier never ends up with empty-string headers.
///
/// Returns the number of propagated entries present; whether an adapter can
/// represent each value is its own concern.
pub fn inject(snapshot: &ContextSnapshot, carrier: &mut dyn Carrier) -> usize {
    let mut present = 0;
    for key in PROPAGATED_KEYS {
        let Some(header) = key.header() else { continue };
        if let Some(value) = snapshot.get(key) {
            if !value.is_empty() {
                carrier.set(header, value);
                present += 1;
            }
        }
    }
    present
}

/// Copies each propagated header present on the carrier into `map` under its
/// canonical key, overwriting stale values. Never clears the map first: the
/// caller is responsible for invoking this only where a lifecycle boundary
/// already guarantees a clean store.
///
/// Returns the number of entries applied; zero matching headers leave the
/// map untouched.
pub fn extract_into(carrier: &dyn Carrier, map: &mut ContextMap) -> usize {
    let mut applied = 0;
    for key in PROPAGATED_KEYS {
        let Some(header) = key.header() else { continue };
        if let Some(value) = carrier.get(header) {
            map.set(key, value);
            applied += 1;
        }
    }
    applied
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::keys::{
        ContextKey, HEADER_CORRELATION_ID, HEADER_REQUEST_ID, HEADER_TENANT_ID, HEADER_USER_ID,
    };

    #[derive(Default)]
    struct MapCarrier {
        headers: BTreeMap<String, String>,
    }

    impl Carrier for MapCarrier {
        fn get(&self, name: &str) -> Option<String> {
            self.headers.get(name).cloned()
        }

        fn set(&mut self, name: &str, value: &str) {
            self.headers.insert(name.to_owned(), value.to_owned());
        }
    }

    #[test]
    fn inject_writes_only_present_fields() {
        let mut map = ContextMap::new();
        map.set(ContextKey::RequestId, "req-1");
        map.set(ContextKey::UserId, "u1");

        let mut carrier = MapCarrier::default();
        let present = inject(&map.snapshot(), &mut carrier);

        assert_eq!(present, 2);
        assert_eq!(carrier.headers.get(HEADER_REQUEST_ID).map(String::as_str), Some("req-1"));
        assert_eq!(carrier.headers.get(HEADER_USER_ID).map(String::as_str), Some("u1"));
        assert!(!carrier.headers.contains_key(HEADER_CORRELATION_ID));
        assert!(!carrier.headers.contains_key(HEADER_TENANT_ID));
    }

    #[test]
    fn inject_skips_empty_values() {
        let mut map = ContextMap::new();
        map.set(ContextKey::CorrelationId, "");
        map.set(ContextKey::TenantId, "t1");

        let mut carrier = MapCarrier::default();
        inject(&map.snapshot(), &mut carrier);

        assert!(!carrier.headers.contains_key(HEADER_CORRELATION_ID));
        assert_eq!(carrier.headers.get(HEADER_TENANT_ID).map(String::as_str), Some("t1"));
    }

    #[test]
    fn inject_ignores_non_propagated_fields() {
        let mut map = ContextMap::new();
        map.set(ContextKey::ServiceName, "svc");
        map.set(ContextKey::TraceId, "trace-1");

        let mut carrier = MapCarrier::default();
        let present = inject(&map.snapshot(), &mut carrier);

        assert_eq!(present, 0);
        assert!(carrier.headers.is_empty());
    }

    #[test]
    fn extract_overwrites_without_clearing() {
        let mut carrier = MapCarrier::default();
        carrier.set(HEADER_REQUEST_ID, "req-new");

        let mut map = ContextMap::new();
        map.set(ContextKey::RequestId, "req-stale");
        map.set(ContextKey::ServiceName, "svc");

        let applied = extract_into(&carrier, &mut map);

        assert_eq!(applied, 1);
        assert_eq!(map.get(ContextKey::RequestId), Some("req-new"));
        // Entries outside the propagated set survive untouched.
        assert_eq!(map.get(ContextKey::ServiceName), Some("svc"));
    }

    #[test]
    fn extract_with_no_matching_headers_is_a_noop() {
        let carrier = MapCarrier::default();
        let mut map = ContextMap::new();
        map.set(ContextKey::UserId, "u1");

        let applied = extract_into(&carrier, &mut map);

        assert_eq!(applied, 0);
        assert_eq!(map.len(), 1);
        assert_eq!(map.get(ContextKey::UserId), Some("u1"));
    }
}
