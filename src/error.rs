//! Error taxonomy for FlowSlate API calls.
//!
//! Failures split into three classes: API errors carrying HTTP semantics
//! (status, reason, request id, structured sub-errors and the raw body),
//! domain errors raised by envelope decoding, and transport-level wrappers.
//! The dispatcher never leaks a raw transport exception; everything a
//! caller sees is one of the variants below.

use http::{HeaderMap, StatusCode};
use serde_json::Value;
use std::time::SystemTime;

/// Common payload shape shared by every API-error variant.
///
/// Constructed exactly once per failed dispatch attempt and immutable
/// afterwards. Body decoding is best-effort: an unparseable body degrades
/// to reason-only attribution and never propagates a parse error out of
/// the constructor.
#[derive(Debug, Clone)]
pub struct ApiError {
    /// Human-readable message.
    pub message: String,
    /// Reason phrase derived from the HTTP status.
    pub reason: String,
    /// The HTTP status code.
    pub status: StatusCode,
    /// Request identifier reported by the server, when present.
    pub request_id: Option<String>,
    /// Structured sub-errors captured verbatim from the response JSON.
    pub errors: Vec<Value>,
    /// Seconds to wait before retrying, parsed from `Retry-After` on 429.
    pub retry_after: Option<f64>,
    /// The raw response body.
    pub body: String,
}

impl ApiError {
    /// Builds an API error from a response, enriching it from the JSON
    /// body when one can be decoded.
    ///
    /// When the body contains an `errors` list it is captured verbatim;
    /// a top-level `message` (or `error_description`) without structured
    /// errors is synthesized into a single-element list and, if no
    /// explicit `message` was supplied by the caller, adopted as the
    /// error's own message.
    pub fn from_response(
        message: Option<&str>,
        status: StatusCode,
        headers: &HeaderMap,
        body: &str,
    ) -> Self {
        let reason = status
            .canonical_reason()
            .unwrap_or("Unknown Status")
            .to_string();

        let mut message = message.map(str::to_owned);
        let mut request_id = None;
        let mut errors = Vec::new();

        if let Ok(json) = serde_json::from_str::<Value>(body) {
            if let Some(id) = json.get("request_id").and_then(Value::as_str) {
                request_id = Some(id.to_string());
            }

            if let Some(list) = json.get("errors").and_then(Value::as_array) {
                errors = list.clone();
            } else if let Some(msg) = json
                .get("message")
                .or_else(|| json.get("error_description"))
                .and_then(Value::as_str)
            {
                errors = vec![serde_json::json!({ "message": msg })];
                if message.is_none() {
                    message = Some(msg.to_string());
                }
            }
        }

        let retry_after = if status == StatusCode::TOO_MANY_REQUESTS {
            parse_retry_after(headers)
        } else {
            None
        };

        Self {
            message: message.unwrap_or_else(|| reason.clone()),
            reason,
            status,
            request_id,
            errors,
            retry_after,
            body: body.to_string(),
        }
    }
}

/// Parses the `Retry-After` header as floating-point seconds, falling back
/// to the HTTP-date form.
pub(crate) fn parse_retry_after(headers: &HeaderMap) -> Option<f64> {
    let raw = headers.get(http::header::RETRY_AFTER)?.to_str().ok()?;

    if let Ok(seconds) = raw.trim().parse::<f64>() {
        if seconds.is_finite() && seconds >= 0.0 {
            return Some(seconds);
        }
        return None;
    }

    if let Ok(at) = httpdate::parse_http_date(raw) {
        if let Ok(until) = at.duration_since(SystemTime::now()) {
            return Some(until.as_secs_f64());
        }
    }

    None
}

/// The main error type for FlowSlate API calls.
#[derive(thiserror::Error, Debug)]
pub enum Error {
    /// The server could not handle the request (HTTP 400).
    #[error("bad request: {}", .0.message)]
    BadRequest(Box<ApiError>),

    /// The request lacks valid authentication credentials (HTTP 401).
    #[error("unauthorized: {}", .0.message)]
    Unauthorized(Box<ApiError>),

    /// The requested resource does not exist (HTTP 404).
    #[error("not found: {}", .0.message)]
    NotFound(Box<ApiError>),

    /// The API rate limit was reached (HTTP 429). Carries the parsed
    /// `Retry-After` value when the server supplied one.
    #[error("rate limited: {}", .0.message)]
    RateLimited(Box<ApiError>),

    /// A transient failure worth retrying (408/502/503/504 family, or
    /// retry exhaustion without a concrete status).
    #[error("retryable error ({}): {}", .0.status, .0.message)]
    Retryable(Box<ApiError>),

    /// The server encountered a situation it doesn't know how to handle
    /// (unmapped status in `[500, 600)`).
    #[error("internal server error ({}): {}", .0.status, .0.message)]
    InternalServer(Box<ApiError>),

    /// The decoded envelope lacks the expected `data` section.
    #[error("response envelope has no `data` section")]
    MissingData,

    /// The decoded resource's declared type does not match the expected
    /// entity type.
    #[error("resource type `{actual}` does not match expected type `{expected}`")]
    TypeMismatch {
        /// The entity type the caller asked for.
        expected: String,
        /// The type declared by the resource.
        actual: String,
    },

    /// The caller requested a relationship name absent from the resource's
    /// relationship map.
    #[error("relationship `{0}` does not exist on this resource")]
    RelationNotExist(String),

    /// The envelope is structurally not a JSON:API document.
    #[error("malformed JSON:API document: {0}")]
    MalformedDocument(String),

    /// A network-level error outside the dispatcher boundary (token
    /// endpoint exchange, request construction).
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// An invalid URL was provided.
    #[error("invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Invalid client or session configuration.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The request body could not be serialized to JSON.
    #[error("failed to serialize request: {0}")]
    Serialization(String),

    /// A successful response body could not be decoded.
    #[error("failed to decode response (status {status}): {serde_error}")]
    Deserialization {
        /// The raw response body that failed to decode.
        raw_response: String,
        /// The serde error message.
        serde_error: String,
        /// The HTTP status code of the response.
        status: StatusCode,
    },
}

impl Error {
    /// Maps a response status to the matching typed error, or `None` for
    /// statuses the dispatcher passes through to envelope decoding.
    ///
    /// This is the explicit status table; any unmapped status in
    /// `[500, 600)` falls back to [`Error::InternalServer`] with the
    /// actual status preserved.
    pub(crate) fn classify_status(
        status: StatusCode,
        headers: &HeaderMap,
        body: &str,
    ) -> Option<Error> {
        let api = |message: Option<&str>| {
            Box::new(ApiError::from_response(message, status, headers, body))
        };

        match status.as_u16() {
            400 => Some(Error::BadRequest(api(Some("Bad Request")))),
            401 => Some(Error::Unauthorized(api(Some("Unauthorized")))),
            404 => Some(Error::NotFound(api(Some("Not Found")))),
            429 => Some(Error::RateLimited(api(None))),
            408 | 502 | 503 | 504 => Some(Error::Retryable(api(None))),
            500..=599 => Some(Error::InternalServer(api(None))),
            _ => None,
        }
    }

    /// Wraps an already-built payload in the variant matching its status.
    ///
    /// Unlike [`Error::classify_status`] no default message is supplied,
    /// so a `message`/`error_description` from the response body becomes
    /// the error's own message.
    pub(crate) fn from_parts(status: StatusCode, api: Box<ApiError>) -> Error {
        match status.as_u16() {
            400 => Error::BadRequest(api),
            401 => Error::Unauthorized(api),
            404 => Error::NotFound(api),
            429 => Error::RateLimited(api),
            408 | 502 | 503 | 504 => Error::Retryable(api),
            _ => Error::InternalServer(api),
        }
    }

    /// Returns the API-error payload if this error carries one.
    pub fn api(&self) -> Option<&ApiError> {
        match self {
            Error::BadRequest(api)
            | Error::Unauthorized(api)
            | Error::NotFound(api)
            | Error::RateLimited(api)
            | Error::Retryable(api)
            | Error::InternalServer(api) => Some(api),
            _ => None,
        }
    }

    /// Returns the HTTP status code if this error has one.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Error::Deserialization { status, .. } => Some(*status),
            _ => self.api().map(|api| api.status),
        }
    }

    /// Returns `true` if this error corresponds to a transient condition.
    ///
    /// Rate limits and the 408/5xx retryable family qualify; domain errors
    /// and 4xx protocol errors do not.
    pub fn is_retryable(&self) -> bool {
        match self {
            Error::RateLimited(_) | Error::Retryable(_) => true,
            Error::InternalServer(api) => crate::retry::STATUS_FORCELIST
                .contains(&api.status.as_u16()),
            _ => false,
        }
    }

    /// Returns the parsed `Retry-After` value for rate-limit errors.
    pub fn retry_after(&self) -> Option<f64> {
        self.api().and_then(|api| api.retry_after)
    }
}

/// A specialized `Result` type for FlowSlate API calls.
pub type Result<T> = std::result::Result<T, Error>;
