use std::collections::BTreeMap;

use tokio_util::sync::CancellationToken;

/// Per-call request context passed to `log_event`. Carries the raw
/// material enrichment is derived from; never required — `log_event`
/// accepts `None` equally happily and simply skips enrichment.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    /// Lower-cased header name to value. Callers are expected to have
    /// already lower-cased names; this module does not re-normalize.
    pub headers: BTreeMap<String, String>,
    /// Session identifier associated with the in-flight request.
    pub session: Option<String>,
    /// Correlation id linking this event to a wider request trace.
    pub correlation_id: Option<String>,
    /// Cancellation signal for the originating request. Per spec §5,
    /// `log_event` does not consult this before or during admission: an
    /// event that reaches the queue is kept even if the caller's request
    /// is cancelled immediately after.
    pub cancellation: Option<CancellationToken>,
}

impl RequestContext {
    /// An empty context: no headers, no session, nothing to enrich with.
    pub fn empty() -> Self {
        Self::default()
    }
}

/// Enrichment fields derived from a `RequestContext`, applied onto an
/// `Actor` before validation. Failures here degrade silently: a missing or
/// unparseable header simply leaves the corresponding field unset rather
/// than failing admission.
#[derive(Debug, Default)]
pub struct Enrichment {
    /// Best client address, honoring `X-Forwarded-For` before `X-Real-IP`.
    pub address: Option<String>,
    /// User agent string, if present.
    pub agent: Option<String>,
}

/// Derive enrichment fields from a request context. `X-Forwarded-For` may
/// carry a comma-separated proxy chain; only the left-most (originating
/// client) address is kept. An empty or whitespace-only chain is treated
/// as "no address", not an error, and falls through to `X-Real-IP`.
pub fn enrich(ctx: &RequestContext) -> Enrichment {
    let address = ctx
        .headers
        .get("x-forwarded-for")
        .and_then(|chain| chain.split(',').next())
        .map(str::trim)
        .filter(|addr| !addr.is_empty())
        .map(str::to_string)
        .or_else(|| ctx.headers.get("x-real-ip").cloned());

    if address.is_none() && ctx.headers.contains_key("x-forwarded-for") {
        tracing::warn!("x-forwarded-for present but unparseable, falling back to x-real-ip");
    }

    Enrichment {
        address,
        agent: ctx.headers.get("user-agent").cloned(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefers_forwarded_for_over_real_ip() {
        let mut ctx = RequestContext::empty();
        ctx.headers.insert("x-forwarded-for".into(), "203.0.113.7, 10.0.0.1".into());
        ctx.headers.insert("x-real-ip".into(), "10.0.0.1".into());
        assert_eq!(enrich(&ctx).address.as_deref(), Some("203.0.113.7"));
    }

    #[test]
    fn falls_back_to_real_ip_when_forwarded_for_empty() {
        let mut ctx = RequestContext::empty();
        ctx.headers.insert("x-forwarded-for".into(), "  , ".into());
        ctx.headers.insert("x-real-ip".into(), "198.51.100.9".into());
        assert_eq!(enrich(&ctx).address.as_deref(), Some("198.51.100.9"));
    }

    #[test]
    fn no_headers_yields_no_address() {
        let ctx = RequestContext::empty();
        assert_eq!(enrich(&ctx).address, None);
    }
}
