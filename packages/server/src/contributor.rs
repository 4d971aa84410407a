//! Extension point for enriching the request context during population.
//!
//! Contributors run inside the lifecycle filter, after the canonical entries
//! are written and before the guardrail and handler execute. They read the
//! inbound request metadata and may write additional entries through
//! [`crate::store`]; whatever they write is torn down by the same boundary
//! that tears down the canonical entries.

use http::request::Parts;

/// A hook that may write additional context entries for an inbound request.
///
/// Contributors are invoked in registration order. They must not clear the
/// store; removing or rewriting entries owned by the lifecycle filter leaves
/// later contributors and the handler with an inconsistent view.
pub trait ContextContributor: Send + Sync {
    /// Inspects the inbound request and writes any derived entries.
    fn contribute(&self, parts: &Parts);
}

/// Plain functions and closures are contributors.
impl<F> ContextContributor for F
where
    F: Fn(&Parts) + Send + Sync,
{
    fn contribute(&self, parts: &Parts) {
        self(parts);
    }
}
