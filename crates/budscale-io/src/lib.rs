//! budscale-io: service client, endpoint, persistence, and raster I/O.
//!
//! Wraps the sans-IO core with the pieces that touch the outside world:
//! the retrying analysis client and the rate-limited endpoint it talks
//! to, keyed session storage with change notification, and image probing
//! and overlay rendering.

pub mod backoff;
pub mod config;
pub mod endpoint;
pub mod gateway;
pub mod limiter;
pub mod raster;
pub mod store;
pub mod sync;

pub use backoff::{BackoffClient, BackoffError, HasStatus, Sleeper, TokioSleeper, should_retry};
pub use config::{BackoffConfig, ClientConfig, ConfigError, RateLimitConfig};
pub use endpoint::{AnalysisEndpoint, Analyzer, CORS_HEADERS, EndpointResponse, RATE_LIMITED_MESSAGE};
pub use gateway::{
    AnalysisGateway, AnalysisRequest, FALLBACK_TEXT, GatewayError, HttpResponse, ReqwestTransport,
    RequestRejected, Transport, TransportError,
};
pub use limiter::{Clock, RateLimited, RateLimiter, SystemClock};
pub use raster::{RasterError, image_dimensions, render_overlay};
pub use store::{DocumentReceiver, DocumentStore, MemoryDocumentStore, StoreError};
pub use sync::{SyncError, SyncedSession};
