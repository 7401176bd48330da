//! Fetches a few resources twice to show caching and deduplication.
//!
//! ```sh
//! FETCHKIT_BASE_URL=http://localhost:5000/api RUST_LOG=fetchkit=debug \
//!     cargo run --example fetch_models
//! ```

use fetchkit::hooks::Query;
use fetchkit::http::Params;
use fetchkit::{ApiClient, ApiError, ClientConfig, RequestOptions};
use serde_json::Value;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let config = ClientConfig::from_env();
    info!(base_url = %config.base_url, "starting");
    let client = ApiClient::builder(config)
        .credentials(|| std::env::var("API_TOKEN").ok())
        .on_session_invalidated(|| warn!("token rejected; sign in again"))
        .build()?;

    // Both calls are in flight together and share one request.
    let params = Params::new().with("key", "chair");
    let (a, b) = tokio::join!(
        client.get::<Value>("/models", params.clone(), RequestOptions::cached()),
        client.get::<Value>("/models", params.clone(), RequestOptions::cached()),
    );
    report("models (first)", &a);
    report("models (second)", &b);

    // Served from cache.
    let again = client
        .get::<Value>("/models", params, RequestOptions::cached())
        .await;
    report("models (cached)", &again);

    let categories = Query::<Value>::new(client.clone(), "/categories", Params::new())
        .options(RequestOptions::cached())
        .on_error(|err| warn!(error = %err, "categories failed"));
    categories.fetch().await;
    info!(loaded = categories.state().data.is_some(), "categories query settled");

    let stats = client.stats();
    info!(size = stats.size, in_flight = stats.in_flight, keys = ?stats.keys, "cache stats");
    Ok(())
}

fn report(label: &str, result: &Result<Value, ApiError>) {
    match result {
        Ok(value) => info!(label, items = value.as_array().map_or(1, Vec::len), "ok"),
        Err(err) => warn!(label, error = %err, "failed"),
    }
}
