//! Retry-aware transport session and the JWT-bearer auth delegate.
//!
//! [`factory`] builds the long-lived session every client owns: a pooled
//! transport configured with a [`RetryPolicy`] and the identifying
//! `User-Agent` header. [`JwtAuth`] implements the OAuth2 JWT-bearer
//! grant: it signs an RS256 assertion, exchanges it at the token endpoint
//! and holds the resulting access token in a single-writer cell that the
//! dispatcher snapshot-reads before attaching the `Authorization` header.

use crate::{
    error::{ApiError, Error},
    retry::RetryPolicy,
    Result,
};
use http::{header, HeaderMap, HeaderValue};
use jsonwebtoken::{encode, Algorithm, EncodingKey, Header};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::sync::RwLock;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use url::Url;

/// Identifying header attached to every request.
pub const USER_AGENT: &str = concat!("flowslate/", env!("CARGO_PKG_VERSION"));

/// Default token endpoint for the JWT-bearer grant.
pub const TOKEN_URL: &str = "https://oauth.flowslate.com/public/oauth/token";

/// Default scope list requested during the token exchange.
pub const DEFAULT_SCOPE: &[&str] = &[
    "openid",
    "email",
    "profile",
    "enterprise",
    "user-client-link",
    "oauth-user-tokens",
];

const GRANT_TYPE: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";

/// Lifetime of the signed assertion.
const ASSERTION_TTL: Duration = Duration::from_secs(600);

/// Tokens are refreshed this long before their reported expiry.
const REFRESH_LEEWAY: Duration = Duration::from_secs(30);

/// A long-lived transport session shared by all calls made through one
/// client: a pooled HTTP transport, the retry policy applied to every
/// scheme it serves, and the default header set.
#[derive(Debug, Clone)]
pub struct Session {
    http: reqwest::Client,
    headers: HeaderMap,
    retry: RetryPolicy,
}

/// Builds a fresh [`Session`] with the given retry configuration mounted
/// and the identifying `User-Agent` header set.
pub fn factory(max_retries: i32, backoff_factor: f64) -> Result<Session> {
    let retry = RetryPolicy::new(max_retries, backoff_factor);

    let http = reqwest::Client::builder()
        .build()
        .map_err(|e| Error::Configuration(format!("failed to build HTTP transport: {e}")))?;

    let mut headers = HeaderMap::new();
    headers.insert(header::USER_AGENT, HeaderValue::from_static(USER_AGENT));

    Ok(Session {
        http,
        headers,
        retry,
    })
}

impl Session {
    /// The underlying pooled transport.
    pub fn http(&self) -> &reqwest::Client {
        &self.http
    }

    /// Headers attached to every request unless overridden.
    pub fn default_headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// The retry policy mounted on this session.
    pub fn policy(&self) -> &RetryPolicy {
        &self.retry
    }
}

/// Configuration for the JWT-bearer grant.
#[derive(Clone)]
pub struct JwtConfig {
    /// OAuth client identifier; doubles as the assertion audience.
    pub client_id: String,
    /// Subject of the assertion.
    pub user_id: String,
    /// RSA private key in PEM form used to sign the assertion.
    pub key_pem: Vec<u8>,
    /// Scopes requested during the exchange, space-joined into the claim.
    pub scope: Vec<String>,
    /// Token endpoint; its hostname becomes the assertion issuer.
    pub token_url: String,
}

impl JwtConfig {
    /// Creates a configuration with the default scope list and token
    /// endpoint.
    pub fn new(
        client_id: impl Into<String>,
        user_id: impl Into<String>,
        key_pem: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            client_id: client_id.into(),
            user_id: user_id.into(),
            key_pem: key_pem.into(),
            scope: DEFAULT_SCOPE.iter().map(|s| s.to_string()).collect(),
            token_url: TOKEN_URL.to_string(),
        }
    }

    /// Replaces the requested scope list.
    pub fn scope(mut self, scope: Vec<String>) -> Self {
        self.scope = scope;
        self
    }

    /// Overrides the token endpoint.
    pub fn token_url(mut self, url: impl Into<String>) -> Self {
        self.token_url = url.into();
        self
    }
}

/// The token payload returned by the token endpoint.
#[derive(Debug, Clone, Deserialize, PartialEq)]
pub struct TokenSet {
    /// The bearer credential attached to outgoing requests.
    pub access_token: String,
    /// Lifetime of the credential in seconds.
    pub expires_in: u64,
    /// Any additional fields the endpoint returned.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

struct TokenState {
    set: TokenSet,
    obtained_at: Instant,
}

#[derive(Serialize)]
struct Claims<'a> {
    aud: &'a str,
    sub: &'a str,
    iss: &'a str,
    iat: u64,
    exp: u64,
    scope: String,
}

/// Auth delegate implementing the OAuth2 JWT-bearer flow.
///
/// Construction performs the initial token exchange; afterwards the
/// delegate refreshes the stored token shortly before expiry. The swap is
/// a single reference replacement, so in-flight requests keep the token
/// they already attached while later requests observe the new one.
pub struct JwtAuth {
    config: JwtConfig,
    key: EncodingKey,
    http: reqwest::Client,
    token_url: Url,
    token: RwLock<TokenState>,
}

impl JwtAuth {
    /// Builds the delegate and performs the initial token exchange.
    ///
    /// A non-2xx response from the token endpoint surfaces as the typed
    /// API error matching its status, with the endpoint's `message` or
    /// `error_description` as the human message.
    pub async fn connect(config: JwtConfig) -> Result<Self> {
        let key = EncodingKey::from_rsa_pem(&config.key_pem)
            .map_err(|e| Error::Configuration(format!("invalid RSA signing key: {e}")))?;
        let token_url = Url::parse(&config.token_url)?;

        let http = reqwest::Client::builder()
            .build()
            .map_err(|e| Error::Configuration(format!("failed to build HTTP transport: {e}")))?;

        let set = fetch_token(&http, &token_url, &key, &config).await?;
        tracing::info!(expires_in = set.expires_in, "Token exchange succeeded");

        Ok(Self {
            config,
            key,
            http,
            token_url,
            token: RwLock::new(TokenState {
                set,
                obtained_at: Instant::now(),
            }),
        })
    }

    /// Snapshot of the currently stored token.
    pub fn token(&self) -> TokenSet {
        self.read().set.clone()
    }

    /// Returns the bearer credential, refreshing the stored token first
    /// when it is about to expire.
    pub async fn bearer(&self) -> Result<String> {
        if self.needs_refresh() {
            self.refresh().await?;
        }
        Ok(self.read().set.access_token.clone())
    }

    /// Re-runs the token exchange and atomically replaces the stored
    /// token.
    pub async fn refresh(&self) -> Result<()> {
        let set = fetch_token(&self.http, &self.token_url, &self.key, &self.config).await?;
        tracing::debug!(expires_in = set.expires_in, "Refreshed access token");
        self.update_token(set);
        Ok(())
    }

    fn needs_refresh(&self) -> bool {
        let guard = self.read();
        let lifetime = Duration::from_secs(guard.set.expires_in);
        guard.obtained_at.elapsed() + REFRESH_LEEWAY >= lifetime
    }

    fn update_token(&self, set: TokenSet) {
        let mut guard = self
            .token
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        *guard = TokenState {
            set,
            obtained_at: Instant::now(),
        };
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, TokenState> {
        self.token
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

async fn fetch_token(
    http: &reqwest::Client,
    token_url: &Url,
    key: &EncodingKey,
    config: &JwtConfig,
) -> Result<TokenSet> {
    let assertion = signed_assertion(token_url, key, config)?;

    let response = http
        .post(token_url.clone())
        .form(&[("grant_type", GRANT_TYPE), ("assertion", assertion.as_str())])
        .send()
        .await?;

    let status = response.status();
    if !status.is_success() {
        let headers = response.headers().clone();
        let body = response.text().await.unwrap_or_default();
        tracing::error!(status = status.as_u16(), "Token exchange failed");

        let api = Box::new(ApiError::from_response(None, status, &headers, &body));
        return Err(Error::from_parts(status, api));
    }

    Ok(response.json::<TokenSet>().await?)
}

fn signed_assertion(token_url: &Url, key: &EncodingKey, config: &JwtConfig) -> Result<String> {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or(Duration::ZERO)
        .as_secs();

    let claims = Claims {
        aud: &config.client_id,
        sub: &config.user_id,
        iss: token_url.host_str().unwrap_or_default(),
        iat: now,
        exp: now + ASSERTION_TTL.as_secs(),
        scope: config.scope.join(" "),
    };

    encode(&Header::new(Algorithm::RS256), &claims, key)
        .map_err(|e| Error::Configuration(format!("failed to sign assertion: {e}")))
}
