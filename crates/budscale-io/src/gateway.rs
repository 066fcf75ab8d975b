//! Client for the remote multimodal analysis endpoint.
//!
//! The endpoint takes `{ "prompt": ..., "image": <base64 PNG> }` and
//! answers `{ "text": ... }` on success or `{ "error": ... }` with a
//! 4xx/5xx status. Calls go through [`BackoffClient`], so 429 responses
//! and transport failures are retried before an error reaches the caller.

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use budscale_core::{CalibrationSettings, MAX_PROMPT_CHARS, PromptError, Region, RegionId};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::backoff::{BackoffClient, BackoffError, HasStatus, Sleeper, TokioSleeper};
use crate::config::{ClientConfig, ConfigError};
use crate::raster::{self, RasterError};

/// Text returned when the service succeeds without any analysis text.
pub const FALLBACK_TEXT: &str =
    "Sorry, I couldn't generate an analysis. Please check your image and try again.";

/// Error message used when a failed response carries none of its own.
pub const SERVICE_ERROR_FALLBACK: &str = "analysis request failed";

/// Errors from an analysis request.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// The request failed local validation and was never sent.
    #[error("invalid analysis request: {0}")]
    InvalidRequest(#[from] RequestRejected),

    /// The prompt could not be built from the session.
    #[error(transparent)]
    Prompt(#[from] PromptError),

    /// The image could not be read or re-encoded.
    #[error(transparent)]
    Raster(#[from] RasterError),

    /// The client configuration is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Every attempt was rate limited.
    #[error("analysis service is rate limiting requests; gave up after {attempts} attempts")]
    RetryExhausted {
        /// Attempts made.
        attempts: u32,
    },

    /// The request could not be delivered.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The service answered with an error status.
    #[error("{message} (status {status})")]
    Service {
        /// HTTP status code.
        status: u16,
        /// Message from the service's error payload, or a generic fallback.
        message: String,
    },

    /// A success response whose body is not the expected JSON.
    #[error("invalid response from analysis service: {0}")]
    InvalidResponse(String),
}

impl From<BackoffError<TransportError>> for GatewayError {
    fn from(err: BackoffError<TransportError>) -> Self {
        match err {
            BackoffError::RetryExhausted { attempts } => Self::RetryExhausted { attempts },
            BackoffError::Request(e) => Self::Transport(e),
        }
    }
}

/// Failure to deliver a request or read its response.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("transport error: {0}")]
pub struct TransportError(pub String);

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        Self(err.to_string())
    }
}

/// Why an analysis request was refused before reaching the model.
///
/// The display text is what the endpoint returns in its `error` field.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RequestRejected {
    /// The body is not a JSON object with string fields.
    #[error("request body is not valid JSON: {0}")]
    Malformed(String),

    /// The prompt or the image is absent or empty.
    #[error("missing prompt or image data")]
    Missing,

    /// The prompt is longer than [`MAX_PROMPT_CHARS`] characters.
    #[error("prompt must be between 1 and {max} characters, got {chars}", max = MAX_PROMPT_CHARS)]
    PromptTooLong {
        /// Characters in the rejected prompt.
        chars: usize,
    },

    /// The image is not standard base64.
    #[error("image must be a valid base64 string")]
    InvalidImage,
}

#[derive(Debug, Deserialize)]
struct RequestBody {
    #[serde(default)]
    prompt: Option<String>,
    #[serde(default)]
    image: Option<String>,
}

/// A validated analysis request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AnalysisRequest {
    prompt: String,
    image: String,
}

impl AnalysisRequest {
    /// Build a request from a prompt and an already base64-encoded image.
    ///
    /// # Errors
    ///
    /// Returns [`RequestRejected`] if the prompt is blank or longer than
    /// [`MAX_PROMPT_CHARS`] characters, or the image is empty or not
    /// base64.
    pub fn new(prompt: String, image_base64: String) -> Result<Self, RequestRejected> {
        if image_base64.is_empty() {
            return Err(RequestRejected::Missing);
        }
        check_prompt(&prompt)?;
        if BASE64.decode(&image_base64).is_err() {
            return Err(RequestRejected::InvalidImage);
        }
        Ok(Self {
            prompt,
            image: image_base64,
        })
    }

    /// Build a request from a prompt and raw PNG bytes.
    ///
    /// # Errors
    ///
    /// See [`AnalysisRequest::new`].
    pub fn from_png(prompt: String, png: &[u8]) -> Result<Self, RequestRejected> {
        if png.is_empty() {
            return Err(RequestRejected::Missing);
        }
        check_prompt(&prompt)?;
        Ok(Self {
            prompt,
            image: BASE64.encode(png),
        })
    }

    /// Parse and validate a request body as the endpoint receives it.
    ///
    /// Absent fields and `null` count as missing.
    ///
    /// # Errors
    ///
    /// [`RequestRejected::Malformed`] if the body is not a JSON object
    /// with string fields, otherwise as [`AnalysisRequest::new`].
    pub fn from_json(body: &[u8]) -> Result<Self, RequestRejected> {
        let body: RequestBody =
            serde_json::from_slice(body).map_err(|e| RequestRejected::Malformed(e.to_string()))?;
        match (body.prompt, body.image) {
            (Some(prompt), Some(image)) => Self::new(prompt, image),
            _ => Err(RequestRejected::Missing),
        }
    }

    /// The prompt text.
    #[must_use]
    pub fn prompt(&self) -> &str {
        &self.prompt
    }

    /// The base64-encoded image.
    #[must_use]
    pub fn image(&self) -> &str {
        &self.image
    }
}

fn check_prompt(prompt: &str) -> Result<(), RequestRejected> {
    if prompt.trim().is_empty() {
        return Err(RequestRejected::Missing);
    }
    let chars = prompt.chars().count();
    if chars > MAX_PROMPT_CHARS {
        return Err(RequestRejected::PromptTooLong { chars });
    }
    Ok(())
}

#[derive(Debug, Default, Deserialize)]
struct AnalysisResponse {
    #[serde(default)]
    text: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

/// Status and body of an HTTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// Status code.
    pub status: u16,
    /// Raw body.
    pub body: Vec<u8>,
}

impl HasStatus for HttpResponse {
    fn status(&self) -> u16 {
        self.status
    }
}

/// Delivers a JSON body to the analysis endpoint.
#[async_trait]
pub trait Transport: Send + Sync {
    /// POST `body` as `application/json` and return the response.
    async fn post_json(&self, body: Vec<u8>) -> Result<HttpResponse, TransportError>;
}

#[async_trait]
impl<T: Transport + ?Sized> Transport for std::sync::Arc<T> {
    async fn post_json(&self, body: Vec<u8>) -> Result<HttpResponse, TransportError> {
        (**self).post_json(body).await
    }
}

/// [`Transport`] over HTTP with `reqwest`.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
    endpoint: String,
}

impl ReqwestTransport {
    /// Build a transport for `config.endpoint`, applying its per-attempt
    /// timeout if set.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Config`] if the configuration is invalid and
    /// [`GatewayError::Transport`] if the HTTP client cannot be built.
    pub fn new(config: &ClientConfig) -> Result<Self, GatewayError> {
        config.validate()?;
        let mut builder = reqwest::Client::builder();
        if let Some(timeout) = config.request_timeout() {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().map_err(TransportError::from)?;
        Ok(Self {
            client,
            endpoint: config.endpoint.clone(),
        })
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn post_json(&self, body: Vec<u8>) -> Result<HttpResponse, TransportError> {
        let response = self
            .client
            .post(&self.endpoint)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .body(body)
            .send()
            .await?;
        let status = response.status().as_u16();
        let body = response.bytes().await?.to_vec();
        Ok(HttpResponse { status, body })
    }
}

/// Sends analysis requests and normalizes their results.
#[derive(Debug)]
pub struct AnalysisGateway<T, S = TokioSleeper> {
    transport: T,
    backoff: BackoffClient<S>,
}

impl AnalysisGateway<ReqwestTransport> {
    /// HTTP gateway built from a validated configuration.
    ///
    /// # Errors
    ///
    /// See [`ReqwestTransport::new`].
    pub fn from_config(config: &ClientConfig) -> Result<Self, GatewayError> {
        Ok(Self::new(
            ReqwestTransport::new(config)?,
            BackoffClient::new(config.backoff),
        ))
    }
}

impl<T: Transport, S: Sleeper> AnalysisGateway<T, S> {
    /// Gateway over any transport and retry client.
    #[must_use]
    pub const fn new(transport: T, backoff: BackoffClient<S>) -> Self {
        Self { transport, backoff }
    }

    /// Render the annotated image, build the prompt, and request an
    /// analysis of `image_bytes` with `regions` drawn on it.
    ///
    /// # Errors
    ///
    /// - [`GatewayError::Raster`] if the image cannot be read.
    /// - [`GatewayError::Prompt`] if there are no regions.
    /// - Any error from [`AnalysisGateway::send`].
    pub async fn request_analysis(
        &self,
        image_bytes: &[u8],
        regions: &[Region],
        standard_id: Option<&RegionId>,
        calibration: &CalibrationSettings,
    ) -> Result<String, GatewayError> {
        let dimensions = raster::image_dimensions(image_bytes)?;
        let prompt = budscale_core::build_prompt(regions, standard_id, calibration, dimensions)?;
        let annotated = raster::render_overlay(image_bytes, regions, standard_id)?;
        let request = AnalysisRequest::from_png(prompt, &annotated)?;
        self.send(&request).await
    }

    /// Send a prepared request.
    ///
    /// # Errors
    ///
    /// - [`GatewayError::RetryExhausted`] if every attempt was rate limited.
    /// - [`GatewayError::Transport`] if the last attempt failed to deliver.
    /// - [`GatewayError::Service`] for any other error status.
    /// - [`GatewayError::InvalidResponse`] if a success body is not JSON.
    pub async fn send(&self, request: &AnalysisRequest) -> Result<String, GatewayError> {
        let body = serde_json::to_vec(request)
            .map_err(|e| TransportError(format!("failed to encode request: {e}")))?;
        debug!(
            prompt_chars = request.prompt.chars().count(),
            image_bytes = request.image.len(),
            "sending analysis request"
        );

        let response = self
            .backoff
            .call(|_| self.transport.post_json(body.clone()))
            .await?;
        interpret(&response)
    }
}

fn interpret(response: &HttpResponse) -> Result<String, GatewayError> {
    if (200..300).contains(&response.status) {
        let parsed: AnalysisResponse = serde_json::from_slice(&response.body)
            .map_err(|e| GatewayError::InvalidResponse(e.to_string()))?;
        return Ok(match parsed.text.filter(|t| !t.is_empty()) {
            Some(text) => {
                info!(chars = text.chars().count(), "analysis received");
                text
            }
            None => {
                warn!("analysis response had no text; using fallback");
                FALLBACK_TEXT.to_owned()
            }
        });
    }

    let parsed: AnalysisResponse = serde_json::from_slice(&response.body).unwrap_or_default();
    let message = parsed
        .error
        .filter(|m| !m.trim().is_empty())
        .unwrap_or_else(|| SERVICE_ERROR_FALLBACK.to_owned());
    Err(GatewayError::Service {
        status: response.status,
        message,
    })
}
