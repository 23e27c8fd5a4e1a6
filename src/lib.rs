//! # flowslate - Async client for the FlowSlate JSON:API
//!
//! flowslate is a retry-aware client library built on top of `reqwest`.
//! It layers per-call options over client defaults, assembles JSON:API
//! payloads, manages an authenticated session (including the OAuth2
//! JWT-bearer token refresh flow) and classifies every failure into a
//! typed error.
//!
//! ## Quick Start
//!
//! ```no_run
//! use flowslate::{Client, Options};
//!
//! #[tokio::main]
//! async fn main() -> flowslate::Result<()> {
//!     let client = Client::builder()
//!         .base_url("https://api.flowslate.com")?
//!         .token("0a1b2c3d")
//!         .max_retries(3)
//!         .backoff_factor(1.0)
//!         .build()?;
//!
//!     // Typed resources through a facade.
//!     let organizations = client.organizations().collection(Options::new()).await?;
//!     for org in &organizations {
//!         println!("{}: {:?}", org.id, org.attr("name"));
//!     }
//!
//!     // Or raw dispatch with free-form options.
//!     let mut query = Options::new();
//!     query.insert("include".into(), "fields".into());
//!     let data = client.get("/v1/documents", query, Options::new()).await?;
//!     println!("{data}");
//!
//!     Ok(())
//! }
//! ```
//!
//! ## JWT-bearer authentication
//!
//! ```no_run
//! use flowslate::{Client, JwtAuth, JwtConfig};
//!
//! # async fn example(key_pem: Vec<u8>) -> flowslate::Result<()> {
//! let auth = JwtAuth::connect(JwtConfig::new(
//!     "00000000-0000-0000-0000-000000000000",
//!     "11111111-1111-1111-1111-111111111111",
//!     key_pem,
//! ))
//! .await?;
//!
//! let client = Client::builder().auth(auth).build()?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Error handling
//!
//! Every failure is a typed [`Error`]: protocol-level errors carry the
//! HTTP status, the server's structured sub-errors and the raw body;
//! domain errors report a malformed envelope; transport errors are
//! reclassified at the dispatcher boundary and never leak raw.
//!
//! ```no_run
//! use flowslate::{Client, Error, Options};
//!
//! # async fn example(client: Client) {
//! match client.get("/v1/organizations", Options::new(), Options::new()).await {
//!     Ok(data) => println!("ok: {data}"),
//!     Err(Error::RateLimited(api)) => {
//!         eprintln!("rate limited, retry after {:?}s", api.retry_after);
//!     }
//!     Err(e) => eprintln!("failed with status {:?}: {e}", e.status()),
//! }
//! # }
//! ```

mod client;
mod error;
pub mod jsonapi;
pub mod options;
pub mod resources;
pub mod retry;
pub mod session;

pub use client::{Client, ClientBuilder, ClientConfig};
pub use error::{ApiError, Error, Result};
pub use options::Options;
pub use retry::RetryPolicy;
pub use session::{JwtAuth, JwtConfig, TokenSet};
