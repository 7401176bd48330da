//! # fetchkit
//!
//! A client-side request layer for JSON HTTP APIs: TTL response cache,
//! single-flight deduplication of identical calls, per-call timeout and
//! cooperative abort, bearer credentials with a session-invalidated callback,
//! and small query/mutation helpers on top.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use fetchkit::{ApiClient, ClientConfig, RequestOptions};
//! use fetchkit::http::Params;
//! use serde_json::Value;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = ApiClient::builder(ClientConfig::from_env())
//!         .credentials(|| std::env::var("API_TOKEN").ok())
//!         .on_session_invalidated(|| eprintln!("session expired"))
//!         .build()?;
//!
//!     let models: Value = client
//!         .get("/models", Params::new().with("key", "chair"), RequestOptions::cached())
//!         .await?;
//!     println!("{models}");
//!     println!("{:?}", client.stats());
//!     Ok(())
//! }
//! ```

pub mod cache;
pub mod cancel;
pub mod client;
pub mod config;
pub mod dedup;
pub mod error;
pub mod hooks;
pub mod http;
pub mod transport;

pub use cache::RequestKey;
pub use client::{ApiClient, ApiClientBuilder, ClientStats, RequestOptions};
pub use config::ClientConfig;
pub use error::{ApiError, BuildError};
pub use http::{Headers, Method, Params, RequestConfig, StatusCode};
pub use tokio_util::sync::CancellationToken;
pub use transport::{HttpTransport, Transport};
