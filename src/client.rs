//! The request dispatcher: option resolution, URL assembly, retries and
//! response classification.
//!
//! [`Client`] is the main entry point. Use [`ClientBuilder`] to configure
//! and create clients; per-call behavior is tuned through an [`Options`]
//! map whose keys are partitioned into client, query and transport
//! buckets before dispatch.

use crate::{
    error::{ApiError, Error},
    jsonapi::Document,
    options::{self, Options},
    resources::{Addons, FlowDocuments, Organizations, Tags},
    retry::RetryPolicy,
    session::{self, JwtAuth, Session},
    Result,
};
use http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

/// JSON:API media type. Clients MUST send request documents with this
/// content type without any media type parameters.
pub const CONTENT_TYPE_JSON_API: &str = "application/vnd.api+json";

/// Plain JSON media type, accepted alongside the JSON:API one.
pub const CONTENT_TYPE_JSON: &str = "application/json";

/// Fixed explanation attached when the connected host never responds.
const CONNECTION_FAILED: &str = "A connection attempt failed because the \
     connected party did not properly respond after a period of time, or \
     established connection failed because connected host has failed to \
     respond.";

/// Every option the client recognizes, with its default.
///
/// Per-call overrides are merged over these values (later sources win);
/// anything the merge produces outside this set flows into the query
/// string or request body as free-form JSON:API parameters.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// API endpoint base URL to connect to.
    pub base_url: String,
    /// API version segment prefixed onto resource paths.
    pub version: String,
    /// Socket inactivity timeout per transport call, not a total
    /// wall-clock budget.
    pub timeout: Duration,
    /// Times to retry when the rate limit is reached or a transient
    /// server error occurs.
    pub max_retries: i32,
    /// Multiplier applied to the exponential retry delay.
    pub backoff_factor: f64,
    /// Return the entire envelope instead of just its `data` section.
    pub full_response: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: "https://api.flowslate.com".to_string(),
            version: "v1".to_string(),
            timeout: Duration::from_secs(5),
            max_retries: 3,
            backoff_factor: 1.0,
            full_response: false,
        }
    }
}

impl ClientConfig {
    /// The configuration as an option map, the leftmost layer of every
    /// per-call merge.
    pub fn as_options(&self) -> Options {
        let mut options = Options::new();
        options.insert("base_url".into(), Value::from(self.base_url.clone()));
        options.insert("timeout".into(), Value::from(self.timeout.as_secs_f64()));
        options.insert("max_retries".into(), Value::from(self.max_retries));
        options.insert("version".into(), Value::from(self.version.clone()));
        options.insert("full_response".into(), Value::from(self.full_response));
        options
    }
}

/// Headers sent by default on write requests; `Content-Type` is stripped
/// for GET-class calls, which carry no body.
pub(crate) fn default_headers() -> Options {
    let mut headers = Options::new();
    headers.insert(
        "Content-Type".into(),
        Value::from(CONTENT_TYPE_JSON_API),
    );
    headers.insert(
        "Accept".into(),
        Value::from(format!("{CONTENT_TYPE_JSON_API}, {CONTENT_TYPE_JSON}")),
    );
    headers
}

/// A client for the FlowSlate JSON:API.
///
/// The client is designed to be reused: it owns a pooled transport
/// session, a retry policy and (optionally) a JWT auth delegate that
/// refreshes the bearer token in place. Cloning is cheap and clones share
/// the same session.
///
/// # Examples
///
/// ```no_run
/// use flowslate::Client;
/// use serde_json::Map;
///
/// # async fn example() -> flowslate::Result<()> {
/// let client = Client::builder()
///     .base_url("https://api.flowslate.com")?
///     .token("0a1b2c3d")
///     .max_retries(3)
///     .build()?;
///
/// let data = client
///     .get("/v1/organizations", Map::new(), Map::new())
///     .await?;
/// println!("organizations: {data}");
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    session: Session,
    config: ClientConfig,
    headers: Options,
    auth: Option<JwtAuth>,
}

/// The fully resolved shape of one dispatch.
struct ResolvedRequest {
    url: String,
    params: Vec<(String, String)>,
    body: Option<String>,
    headers: HeaderMap,
    timeout: Duration,
    full_response: bool,
    policy: RetryPolicy,
}

impl Client {
    /// Creates a new [`ClientBuilder`].
    pub fn builder() -> ClientBuilder {
        ClientBuilder::new()
    }

    /// The client's effective configuration.
    pub fn config(&self) -> &ClientConfig {
        &self.inner.config
    }

    /// The Addons resource.
    pub fn addons(&self) -> Addons<'_> {
        Addons::new(self)
    }

    /// The Flow documents resource.
    pub fn flow_documents(&self) -> FlowDocuments<'_> {
        FlowDocuments::new(self)
    }

    /// The Tags resource.
    pub fn tags(&self) -> Tags<'_> {
        Tags::new(self)
    }

    /// The Organizations resource.
    pub fn organizations(&self) -> Organizations<'_> {
        Organizations::new(self)
    }

    /// Prefixes a resource path with the configured API version.
    pub(crate) fn endpoint(&self, path: &str) -> String {
        format!(
            "/{}/{}",
            self.inner.config.version,
            path.trim_start_matches('/')
        )
    }

    /// Dispatches a request to the API.
    ///
    /// Options are merged over the client defaults (per-call values win),
    /// partitioned into transport buckets, and the response is classified
    /// into a decoded payload or a typed error. Transient statuses are
    /// retried per the session's policy before classification.
    pub async fn request(&self, method: Method, path: &str, options: Options) -> Result<Value> {
        let resolved = self.resolve(&method, path, &options)?;
        let mut attempt: u32 = 0;

        loop {
            attempt += 1;

            let mut request = self
                .inner
                .session
                .http()
                .request(method.clone(), resolved.url.as_str())
                .headers(resolved.headers.clone())
                .timeout(resolved.timeout);

            if !resolved.params.is_empty() {
                request = request.query(&resolved.params);
            }
            if let Some(body) = &resolved.body {
                request = request.body(body.clone());
            }
            if let Some(auth) = &self.inner.auth {
                request = request.bearer_auth(auth.bearer().await?);
            }

            tracing::debug!(
                method = %method,
                url = %resolved.url,
                attempt = attempt,
                "Dispatching request"
            );

            let response = match request.send().await {
                Ok(response) => response,
                Err(e) => {
                    if attempt <= resolved.policy.total && resolved.policy.retries_method(&method)
                    {
                        let delay = resolved.policy.backoff_delay(attempt);
                        tracing::warn!(
                            error = %e,
                            attempt = attempt,
                            delay_ms = delay.as_millis(),
                            "Transport failure, backing off"
                        );
                        tokio::time::sleep(delay).await;
                        continue;
                    }
                    return Err(reclassify_transport(e));
                }
            };

            let status = response.status();
            if resolved.policy.retries_status(status)
                && resolved.policy.retries_method(&method)
                && attempt <= resolved.policy.total
            {
                let delay = retry_after_delay(response.headers(), status)
                    .unwrap_or_else(|| resolved.policy.backoff_delay(attempt));
                tracing::warn!(
                    status = status.as_u16(),
                    attempt = attempt,
                    delay_ms = delay.as_millis(),
                    "Retryable status, backing off"
                );
                tokio::time::sleep(delay).await;
                continue;
            }

            return self.classify(response, resolved.full_response).await;
        }
    }

    /// Parses POST request options and dispatches a request.
    ///
    /// Residual (unrecognized) options merge under body keys not already
    /// present; `data` values win. Default headers merge with caller
    /// headers; caller values win.
    pub async fn post(&self, path: &str, data: Options, options: Options) -> Result<Value> {
        self.write(Method::POST, path, data, options).await
    }

    /// Parses PATCH request options and dispatches a request. Same option
    /// handling as [`Client::post`].
    pub async fn patch(&self, path: &str, data: Options, options: Options) -> Result<Value> {
        self.write(Method::PATCH, path, data, options).await
    }

    /// Parses GET request options and dispatches a request.
    ///
    /// The query string is the merge of query-bucket options, residual
    /// options and the explicit `query` argument; the explicit query
    /// wins. `Content-Type` is stripped, GET requests carry no body.
    pub async fn get(&self, path: &str, query: Options, options: Options) -> Result<Value> {
        let effective = options::merge([&self.inner.config.as_options(), &options]);

        let query_options = options::intersect_keys(&effective, options::QUERY_OPTIONS, false);
        let parameter_options = options::parameter_options(&effective);
        let params = options::merge([&query_options, &parameter_options, &query]);

        let caller_headers = object_option(&options, "headers");
        let mut headers = options::merge([&default_headers(), &caller_headers]);
        headers.remove("Content-Type");

        let mut forwarded = options;
        forwarded.insert("params".into(), Value::Object(params));
        forwarded.insert("headers".into(), Value::Object(headers));

        self.request(Method::GET, path, forwarded).await
    }

    async fn write(
        &self,
        method: Method,
        path: &str,
        data: Options,
        options: Options,
    ) -> Result<Value> {
        let effective = options::merge([&self.inner.config.as_options(), &options]);
        let parameter_options = options::parameter_options(&effective);

        // Values in the data body take precedence.
        let body = options::merge([&parameter_options, &data]);

        let caller_headers = object_option(&options, "headers");
        let headers = options::merge([&default_headers(), &caller_headers]);

        let mut forwarded = options;
        forwarded.insert("data".into(), Value::Object(body));
        forwarded.insert("headers".into(), Value::Object(headers));

        self.request(method, path, forwarded).await
    }

    /// Convenience wrapper: GET with `full_response` forced on, decoded
    /// into a JSON:API [`Document`].
    pub async fn get_document(
        &self,
        path: &str,
        query: Options,
        mut options: Options,
    ) -> Result<Document> {
        options.insert("full_response".into(), Value::from(true));
        Document::from_value(self.get(path, query, options).await?)
    }

    fn resolve(&self, method: &Method, path: &str, options: &Options) -> Result<ResolvedRequest> {
        let config = &self.inner.config;
        let effective = options::merge([&config.as_options(), options]);

        let base_url = effective
            .get("base_url")
            .and_then(Value::as_str)
            .unwrap_or(&config.base_url);
        let url = join_url(base_url, path);

        let request_options = options::intersect_keys(&effective, options::REQUEST_OPTIONS, false);

        let params: Vec<(String, String)> = request_options
            .get("params")
            .and_then(Value::as_object)
            .map(|params| {
                params
                    .iter()
                    .map(|(key, value)| (key.clone(), options::coerce_query_value(value)))
                    .collect()
            })
            .unwrap_or_default();

        let body = match request_options.get("data") {
            Some(data) => Some(
                serde_json::to_string(data).map_err(|e| Error::Serialization(e.to_string()))?,
            ),
            None => None,
        };

        // Caller headers win over client instance headers.
        let header_options = options::merge([
            &self.inner.headers,
            &object_option(&request_options, "headers"),
        ]);
        let mut headers = self.inner.session.default_headers().clone();
        for (name, value) in &header_options {
            let name = HeaderName::try_from(name.as_str())
                .map_err(|e| Error::Configuration(format!("invalid header name: {e}")))?;
            let value = match value {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            let value = HeaderValue::try_from(value)
                .map_err(|e| Error::Configuration(format!("invalid header value: {e}")))?;
            headers.insert(name, value);
        }

        // GET-class requests carry no body.
        if matches!(*method, Method::GET | Method::HEAD) {
            headers.remove(http::header::CONTENT_TYPE);
        }

        let timeout = match effective.get("timeout").and_then(Value::as_f64) {
            Some(secs) if secs <= 0.0 => {
                return Err(Error::Configuration(format!(
                    "timeout must be positive, got {secs}"
                )));
            }
            Some(secs) => Duration::try_from_secs_f64(secs).map_err(|_| {
                Error::Configuration(format!("timeout out of range: {secs}"))
            })?,
            None => config.timeout,
        };

        let full_response = effective
            .get("full_response")
            .and_then(Value::as_bool)
            .unwrap_or(config.full_response);

        let max_retries = effective
            .get("max_retries")
            .and_then(Value::as_i64)
            .map(|n| n.clamp(i32::MIN as i64, i32::MAX as i64) as i32)
            .unwrap_or(config.max_retries);
        let policy = RetryPolicy::new(max_retries, self.inner.session.policy().backoff_factor);

        Ok(ResolvedRequest {
            url,
            params,
            body,
            headers,
            timeout,
            full_response,
            policy,
        })
    }

    async fn classify(&self, response: reqwest::Response, full_response: bool) -> Result<Value> {
        let status = response.status();
        let headers = response.headers().clone();
        let raw = response.text().await.map_err(reclassify_transport)?;

        tracing::info!(status = status.as_u16(), "Received response");

        if let Some(err) = Error::classify_status(status, &headers, &raw) {
            tracing::error!(status = status.as_u16(), "Request failed");
            return Err(err);
        }

        let json: Value = serde_json::from_str(&raw).map_err(|e| Error::Deserialization {
            raw_response: raw.clone(),
            serde_error: e.to_string(),
            status,
        })?;

        if full_response {
            Ok(json)
        } else {
            json.get("data").cloned().ok_or(Error::MissingData)
        }
    }
}

/// Concatenates base URL and path with exactly one `/` between them.
fn join_url(base_url: &str, path: &str) -> String {
    format!(
        "{}/{}",
        base_url.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

fn object_option(options: &Options, key: &str) -> Options {
    options
        .get(key)
        .and_then(Value::as_object)
        .cloned()
        .unwrap_or_default()
}

/// Maps a transport-level failure to a typed API error; raw transport
/// exceptions never cross the dispatcher boundary.
fn reclassify_transport(e: reqwest::Error) -> Error {
    if e.is_connect() {
        return Error::InternalServer(Box::new(ApiError::from_response(
            Some(CONNECTION_FAILED),
            StatusCode::INTERNAL_SERVER_ERROR,
            &HeaderMap::new(),
            "",
        )));
    }

    if e.is_timeout() {
        // Retry exhaustion with no concrete status carries 503.
        return Error::Retryable(Box::new(ApiError::from_response(
            Some("Exceeded API retry limit"),
            StatusCode::SERVICE_UNAVAILABLE,
            &HeaderMap::new(),
            "",
        )));
    }

    let status = e.status().unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    Error::InternalServer(Box::new(ApiError::from_response(
        Some(&e.to_string()),
        status,
        &HeaderMap::new(),
        "",
    )))
}

/// Honors a server-specified `Retry-After` on 429 instead of falling back
/// to exponential backoff.
fn retry_after_delay(headers: &HeaderMap, status: StatusCode) -> Option<Duration> {
    if status != StatusCode::TOO_MANY_REQUESTS {
        return None;
    }
    crate::error::parse_retry_after(headers).map(Duration::from_secs_f64)
}

/// Builder for configuring and creating a [`Client`].
///
/// # Examples
///
/// ```no_run
/// use flowslate::ClientBuilder;
/// use std::time::Duration;
///
/// # fn example() -> flowslate::Result<()> {
/// let client = ClientBuilder::new()
///     .base_url("https://api.flowslate.com")?
///     .timeout(Duration::from_secs(30))
///     .max_retries(5)
///     .backoff_factor(0.5)
///     .default_header("X-App", "demo")
///     .build()?;
/// # Ok(())
/// # }
/// ```
pub struct ClientBuilder {
    config: ClientConfig,
    headers: Options,
    auth: Option<JwtAuth>,
}

impl ClientBuilder {
    /// Creates a builder with the library defaults.
    pub fn new() -> Self {
        Self {
            config: ClientConfig::default(),
            headers: Options::new(),
            auth: None,
        }
    }

    /// Sets the base URL for all requests.
    ///
    /// # Errors
    ///
    /// Returns an error if the URL is invalid.
    pub fn base_url(mut self, url: impl AsRef<str>) -> Result<Self> {
        Url::parse(url.as_ref())?;
        self.config.base_url = url.as_ref().to_string();
        Ok(self)
    }

    /// Sets the API version segment used by resource facades.
    pub fn version(mut self, version: impl Into<String>) -> Self {
        self.config.version = version.into();
        self
    }

    /// Sets the per-request socket inactivity timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.config.timeout = timeout;
        self
    }

    /// Sets the retry attempt ceiling. Negative values are coerced via
    /// absolute value when the policy is built.
    pub fn max_retries(mut self, max_retries: i32) -> Self {
        self.config.max_retries = max_retries;
        self
    }

    /// Sets the backoff multiplier. A non-positive value is normalized to
    /// `1.0` when the policy is built.
    pub fn backoff_factor(mut self, backoff_factor: f64) -> Self {
        self.config.backoff_factor = backoff_factor;
        self
    }

    /// Selects whole-envelope vs `data`-only returns.
    pub fn full_response(mut self, full_response: bool) -> Self {
        self.config.full_response = full_response;
        self
    }

    /// Attaches a static bearer token to every request.
    pub fn token(mut self, token: impl AsRef<str>) -> Self {
        self.headers.insert(
            "Authorization".into(),
            Value::from(format!("Bearer {}", token.as_ref())),
        );
        self
    }

    /// Adds a header included in all requests. Caller headers supplied at
    /// dispatch time win on collision.
    pub fn default_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), Value::from(value.into()));
        self
    }

    /// Attaches a connected JWT auth delegate; its stored token is bound
    /// into every outgoing request.
    pub fn auth(mut self, auth: JwtAuth) -> Self {
        self.auth = Some(auth);
        self
    }

    /// Builds the configured [`Client`].
    pub fn build(self) -> Result<Client> {
        Url::parse(&self.config.base_url)?;

        let session = session::factory(self.config.max_retries, self.config.backoff_factor)?;

        Ok(Client {
            inner: Arc::new(ClientInner {
                session,
                config: self.config,
                headers: self.headers,
                auth: self.auth,
            }),
        })
    }
}

impl Default for ClientBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_join_url_single_separator() {
        assert_eq!(join_url("http://x.test/", "/v1/widgets"), "http://x.test/v1/widgets");
        assert_eq!(join_url("http://x.test", "v1/widgets"), "http://x.test/v1/widgets");
        assert_eq!(join_url("http://x.test/", "v1/widgets"), "http://x.test/v1/widgets");
    }

    #[test]
    fn test_config_as_options_is_complete() {
        let options = ClientConfig::default().as_options();

        for key in ["base_url", "timeout", "max_retries", "version", "full_response"] {
            assert!(options.contains_key(key), "missing {key}");
        }
    }

    #[test]
    fn test_per_call_overrides_win() {
        let config = ClientConfig::default();
        let mut overrides = Options::new();
        overrides.insert("timeout".into(), json!(0.1));

        let effective = options::merge([&config.as_options(), &overrides]);
        assert_eq!(effective["timeout"], json!(0.1));
        assert_eq!(effective["max_retries"], json!(3));
    }

    #[test]
    fn test_default_headers_carry_json_api_media_types() {
        let headers = default_headers();

        assert_eq!(headers["Content-Type"], json!(CONTENT_TYPE_JSON_API));
        assert_eq!(
            headers["Accept"],
            json!("application/vnd.api+json, application/json")
        );
    }

    #[test]
    fn test_endpoint_prefixes_version() {
        let client = Client::builder().build().unwrap();

        assert_eq!(client.endpoint("addon-token"), "/v1/addon-token");
        assert_eq!(client.endpoint("/flows/1/packets/tags"), "/v1/flows/1/packets/tags");
    }

    #[test]
    fn test_invalid_base_url_rejected() {
        assert!(Client::builder().base_url("not a url").is_err());
    }

    #[test]
    fn test_pathological_timeout_rejected_not_panicking() {
        let client = Client::builder().build().unwrap();

        // NaN is unrepresentable in an option map; negative and
        // overflowing values are the reachable pathological inputs.
        for timeout in [json!(-1.0), json!(0.0), json!(1e300)] {
            let mut options = Options::new();
            options.insert("timeout".into(), timeout);

            let result = client.resolve(&Method::GET, "/v1/widgets", &options);
            assert!(matches!(result, Err(Error::Configuration(_))));
        }
    }
}
