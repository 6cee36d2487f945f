//! # Hedgefeed Core
//!
//! Provider-agnostic market data access for the hedge-fund agents.
//!
//! ## Overview
//!
//! - **Canonical records** for prices, fundamentals, insider trades, news and
//!   account state
//! - **One provider interface** with two interchangeable backends: the hosted
//!   financial-data REST service and a brokerage gateway
//! - **Resilient fetching** with bounded retries, exponential backoff and
//!   rate-limit pauses
//! - **Result caching** keyed by capability and arguments, with a TTL
//! - **Tabular view** of price series indexed by time
//!
//! ## Modules
//!
//! | Module | Description |
//! |--------|-------------|
//! | [`adapters`] | REST and gateway providers, gateway HTTP client |
//! | [`cache`] | Cache layer, keys and backends |
//! | [`config`] | Environment configuration and provider selection |
//! | [`domain`] | Canonical records, tickers, timestamps, date helpers |
//! | [`error`] | Validation, configuration and schema errors |
//! | [`fetch`] | Fetch engine, sleepers, cancellation |
//! | [`http_client`] | HTTP transport abstraction |
//! | [`provider`] | Provider trait, capabilities, requests, `ProviderError` |
//! | [`retry`] | Backoff and retry policy |
//! | [`source`] | Provider identifiers |
//! | [`tabular`] | Time-indexed table view |
//! | [`throttling`] | Client-side request pacing |
//!
//! ## Quick Start
//!
//! ```rust,ignore
//! use hedgefeed_core::{PriceRequest, ProviderBuilder, ProviderConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let provider = ProviderBuilder::new(ProviderConfig::from_env()?).build()?;
//!
//!     let request = PriceRequest::new("AAPL", "2024-01-01", "2024-03-01")?;
//!     let table = provider.price_data(request).await?;
//!     println!("{} rows", table.len());
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────┐
//! │  Agents         │
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐     ┌──────────────────┐
//! │  DataProvider   │────▶│ Cache Layer      │
//! │ (REST/Gateway)  │     └──────────────────┘
//! └────────┬────────┘
//!          │
//!          ▼
//! ┌─────────────────┐     ┌──────────────────┐
//! │  Fetch Engine   │────▶│ HTTP Client      │
//! │ (retry/backoff) │     │ (reqwest/script) │
//! └────────┬────────┘     └──────────────────┘
//!          │
//!          ▼
//! ┌─────────────────┐
//! │ Canonical       │
//! │ Records / Table │
//! └─────────────────┘
//! ```
//!
//! ## Error Handling
//!
//! Every capability returns [`ProviderError`]:
//!
//! ```rust
//! use hedgefeed_core::{ProviderError, ProviderErrorKind};
//!
//! fn handle_error(error: ProviderError) {
//!     match error.kind() {
//!         ProviderErrorKind::UnsupportedCapability => {
//!             // Configuration problem, pick another provider
//!         }
//!         ProviderErrorKind::FetchExhausted => {
//!             // Retries already spent
//!         }
//!         ProviderErrorKind::SchemaError | ProviderErrorKind::InvalidInput => {
//!             // Report to user
//!         }
//!         _ => {}
//!     }
//! }
//! ```

pub mod adapters;
pub mod cache;
pub mod config;
pub mod domain;
pub mod error;
pub mod fetch;
pub mod http_client;
pub mod provider;
pub mod retry;
pub mod source;
pub mod tabular;
pub mod throttling;

// Providers
pub use adapters::{
    GatewayClient, GatewayProvider, HistoryRequest, HttpGatewayClient, RestProvider,
};

// Caching
pub use cache::{
    cache_key, CacheArgs, CacheBackend, CacheError, CacheLayer, CacheMode, Cacheable,
    InMemoryCacheBackend,
};

// Configuration
pub use config::{ProviderBuilder, ProviderConfig, ProviderKind};

// Domain models
pub use domain::{
    CompanyNews, FinancialMetrics, InsiderTrade, Ledger, LedgerBalance, LineItem, Portfolio,
    Position, Price, RealizedGains, Record, Ticker, UtcDateTime,
};

// Error types
pub use error::{ConfigError, SchemaError, ValidationError};

// Fetching
pub use fetch::{Cancellation, FetchEngine, RecordingSleeper, Sleeper, TokioSleeper};

// HTTP client types
pub use http_client::{
    HttpAuth, HttpClient, HttpError, HttpMethod, HttpRequest, HttpResponse, NoopHttpClient,
    ReqwestHttpClient, ScriptedHttpClient,
};

// Provider interface
pub use provider::{
    Capability, CapabilitySet, CompanyNewsRequest, DataProvider, FinancialMetricsRequest,
    InsiderTradesRequest, LineItemsRequest, MarketCapRequest, PriceRequest, ProviderError,
    ProviderErrorKind, ProviderFuture,
};

// Retry logic
pub use retry::{Backoff, RetryPolicy};

// Source identifiers
pub use source::ProviderId;

// Tabular view
pub use tabular::{Cell, Table};

// Throttling
pub use throttling::RequestPacer;
