//! Server side of the analysis endpoint.
//!
//! [`AnalysisEndpoint::handle`] answers one HTTP exchange given in
//! transport-neutral form (method, caller address, body), so any HTTP
//! front end can host it. Every answer carries permissive CORS headers;
//! errors are `{ "error": ... }` bodies:
//!
//! | status | when |
//! |--------|------|
//! | 200 | `OPTIONS` preflight, or the model answered (`{ "text": ... }`) |
//! | 405 | any method other than `POST` |
//! | 429 | the caller used up its window |
//! | 500 | no model is configured |
//! | 400 | the body failed validation |
//! | 502 | the model call failed |

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::json;
use tracing::{debug, info, warn};

use crate::backoff::{STATUS_TOO_MANY_REQUESTS, Sleeper};
use crate::gateway::{AnalysisGateway, AnalysisRequest, GatewayError, Transport};
use crate::limiter::{Clock, RateLimiter, SystemClock};

/// Headers attached to every response.
pub const CORS_HEADERS: [(&str, &str); 3] = [
    ("Access-Control-Allow-Origin", "*"),
    ("Access-Control-Allow-Methods", "GET, POST, OPTIONS"),
    ("Access-Control-Allow-Headers", "Content-Type"),
];

/// Error text for a caller over its rate limit.
pub const RATE_LIMITED_MESSAGE: &str = "Too many requests. Please try again later.";

const STATUS_OK: u16 = 200;
const STATUS_BAD_REQUEST: u16 = 400;
const STATUS_METHOD_NOT_ALLOWED: u16 = 405;
const STATUS_INTERNAL: u16 = 500;
const STATUS_BAD_GATEWAY: u16 = 502;

/// The model behind the endpoint.
#[async_trait]
pub trait Analyzer: Send + Sync {
    /// Produce the analysis text for a validated request.
    async fn analyze(&self, request: &AnalysisRequest) -> Result<String, GatewayError>;
}

#[async_trait]
impl<A: Analyzer + ?Sized> Analyzer for Arc<A> {
    async fn analyze(&self, request: &AnalysisRequest) -> Result<String, GatewayError> {
        (**self).analyze(request).await
    }
}

/// Relays to another analysis service, retrying rate-limited calls.
#[async_trait]
impl<T: Transport, S: Sleeper> Analyzer for AnalysisGateway<T, S> {
    async fn analyze(&self, request: &AnalysisRequest) -> Result<String, GatewayError> {
        self.send(request).await
    }
}

/// A response ready to be written by the hosting HTTP layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EndpointResponse {
    /// Status code.
    pub status: u16,
    /// Headers, CORS included.
    pub headers: Vec<(&'static str, String)>,
    /// JSON body; empty for a preflight.
    pub body: Vec<u8>,
}

impl EndpointResponse {
    fn new(status: u16, body: Vec<u8>) -> Self {
        let mut headers: Vec<(&'static str, String)> = CORS_HEADERS
            .iter()
            .map(|&(name, value)| (name, value.to_owned()))
            .collect();
        if !body.is_empty() {
            headers.push(("Content-Type", "application/json".to_owned()));
        }
        Self {
            status,
            headers,
            body,
        }
    }

    fn json(status: u16, value: &serde_json::Value) -> Self {
        Self::new(status, value.to_string().into_bytes())
    }

    fn error(status: u16, message: &str) -> Self {
        Self::json(status, &json!({ "error": message }))
    }

    /// First value of header `name`, compared case-insensitively.
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(n, _)| n.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }
}

/// Validates, rate limits, and forwards analysis requests.
#[derive(Debug)]
pub struct AnalysisEndpoint<A, C = SystemClock> {
    analyzer: Option<A>,
    limiter: RateLimiter<String, C>,
}

impl<A: Analyzer, C: Clock> AnalysisEndpoint<A, C> {
    /// Endpoint over `analyzer`; `None` answers every valid request with
    /// a 500 until a model is configured.
    #[must_use]
    pub const fn new(analyzer: Option<A>, limiter: RateLimiter<String, C>) -> Self {
        Self { analyzer, limiter }
    }

    /// The per-caller limiter.
    #[must_use]
    pub const fn limiter(&self) -> &RateLimiter<String, C> {
        &self.limiter
    }

    /// Answer one exchange from `caller` (its network address).
    pub async fn handle(&self, method: &str, caller: &str, body: &[u8]) -> EndpointResponse {
        if method.eq_ignore_ascii_case("OPTIONS") {
            return EndpointResponse::new(STATUS_OK, Vec::new());
        }
        if !method.eq_ignore_ascii_case("POST") {
            debug!(method, "method not allowed");
            return EndpointResponse::error(STATUS_METHOD_NOT_ALLOWED, "method not allowed; use POST");
        }

        if let Err(limited) = self.limiter.check(caller.to_owned()) {
            let mut response = EndpointResponse::error(STATUS_TOO_MANY_REQUESTS, RATE_LIMITED_MESSAGE);
            let seconds = limited.retry_after.as_millis().div_ceil(1000);
            response.headers.push(("Retry-After", seconds.to_string()));
            return response;
        }

        let Some(analyzer) = &self.analyzer else {
            warn!("analysis requested but no model is configured");
            return EndpointResponse::error(
                STATUS_INTERNAL,
                "analysis model is not configured on the server",
            );
        };

        let request = match AnalysisRequest::from_json(body) {
            Ok(request) => request,
            Err(rejected) => {
                debug!(caller, reason = %rejected, "request rejected");
                return EndpointResponse::error(STATUS_BAD_REQUEST, &rejected.to_string());
            }
        };

        match analyzer.analyze(&request).await {
            Ok(text) => {
                info!(caller, chars = text.chars().count(), "analysis served");
                EndpointResponse::json(STATUS_OK, &json!({ "text": text }))
            }
            Err(e) => {
                warn!(caller, error = %e, "analysis model call failed");
                EndpointResponse::error(STATUS_BAD_GATEWAY, &e.to_string())
            }
        }
    }
}
