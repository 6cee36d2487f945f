//! Session configuration and provider selection.
//!
//! Settings come from environment variables, each read under a primary
//! name with a fallback:
//!
//! | Setting | Primary | Fallback |
//! |---------|---------|----------|
//! | provider flag | `HEDGEFEED_USE_GATEWAY` | `USE_IBKR` |
//! | REST API key | `HEDGEFEED_API_KEY` | `FINANCIAL_DATASETS_API_KEY` |
//! | REST base URL | `HEDGEFEED_BASE_URL` | `FINANCIAL_DATASETS_BASE_URL` |
//! | gateway URL | `HEDGEFEED_GATEWAY_URL` | `IBKR_GATEWAY_URL` |
//! | gateway CA certificate | `HEDGEFEED_GATEWAY_CACERT` | `IBIND_CACERT` |
//! | cache TTL (seconds) | `HEDGEFEED_CACHE_TTL_SECS` | |

use std::env;
use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::adapters::{GatewayProvider, HttpGatewayClient, RestProvider, DEFAULT_BASE_URL, DEFAULT_GATEWAY_URL};
use crate::cache::{CacheLayer, DEFAULT_TTL};
use crate::domain::is_valid_url;
use crate::fetch::{FetchEngine, Sleeper};
use crate::http_client::{HttpClient, ReqwestHttpClient};
use crate::{ConfigError, DataProvider};

/// Which backend serves the session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ProviderKind {
    #[default]
    Rest,
    Gateway,
}

impl ProviderKind {
    /// Maps the selection flag onto a backend. Only `"true"` (any case)
    /// selects the gateway.
    pub fn select(flag: Option<&str>) -> Self {
        match flag {
            Some(value) if value.trim().eq_ignore_ascii_case("true") => Self::Gateway,
            _ => Self::Rest,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderConfig {
    pub kind: ProviderKind,
    pub api_key: Option<String>,
    pub base_url: String,
    pub gateway_url: String,
    pub gateway_cacert: Option<String>,
    pub cache_ttl: Duration,
}

impl Default for ProviderConfig {
    fn default() -> Self {
        Self {
            kind: ProviderKind::Rest,
            api_key: None,
            base_url: String::from(DEFAULT_BASE_URL),
            gateway_url: String::from(DEFAULT_GATEWAY_URL),
            gateway_cacert: None,
            cache_ttl: DEFAULT_TTL,
        }
    }
}

impl ProviderConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Builds a config from an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |primary: &str, fallback: &str| {
            lookup(primary)
                .or_else(|| lookup(fallback))
                .map(|value| value.trim().to_owned())
                .filter(|value| !value.is_empty())
        };

        let base_url = read("HEDGEFEED_BASE_URL", "FINANCIAL_DATASETS_BASE_URL")
            .unwrap_or_else(|| String::from(DEFAULT_BASE_URL));
        let gateway_url = read("HEDGEFEED_GATEWAY_URL", "IBKR_GATEWAY_URL")
            .unwrap_or_else(|| String::from(DEFAULT_GATEWAY_URL));

        let cache_ttl = match lookup("HEDGEFEED_CACHE_TTL_SECS") {
            Some(value) => value
                .trim()
                .parse::<u64>()
                .map(Duration::from_secs)
                .map_err(|_| ConfigError::InvalidValue {
                    name: "HEDGEFEED_CACHE_TTL_SECS",
                    value,
                })?,
            None => DEFAULT_TTL,
        };

        let config = Self {
            kind: ProviderKind::select(read("HEDGEFEED_USE_GATEWAY", "USE_IBKR").as_deref()),
            api_key: read("HEDGEFEED_API_KEY", "FINANCIAL_DATASETS_API_KEY"),
            base_url,
            gateway_url,
            gateway_cacert: read("HEDGEFEED_GATEWAY_CACERT", "IBIND_CACERT"),
            cache_ttl,
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !is_valid_url(&self.base_url) {
            return Err(ConfigError::InvalidUrl {
                name: "base_url",
                value: self.base_url.clone(),
            });
        }
        if !is_valid_url(&self.gateway_url) {
            return Err(ConfigError::InvalidUrl {
                name: "gateway_url",
                value: self.gateway_url.clone(),
            });
        }
        Ok(())
    }
}

/// Turns a [`ProviderConfig`] into the session's provider handle.
#[derive(Default)]
pub struct ProviderBuilder {
    config: ProviderConfig,
    http: Option<Arc<dyn HttpClient>>,
    sleeper: Option<Arc<dyn Sleeper>>,
    cache: Option<CacheLayer>,
}

impl ProviderBuilder {
    pub fn new(config: ProviderConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    /// Replaces the reqwest transport, e.g. with a scripted one.
    pub fn with_http_client(mut self, http: Arc<dyn HttpClient>) -> Self {
        self.http = Some(http);
        self
    }

    pub fn with_sleeper(mut self, sleeper: Arc<dyn Sleeper>) -> Self {
        self.sleeper = Some(sleeper);
        self
    }

    pub fn with_cache(mut self, cache: CacheLayer) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn build(self) -> Result<Arc<dyn DataProvider>, ConfigError> {
        self.config.validate()?;

        let http = match self.http {
            Some(http) => http,
            None => transport(&self.config)?,
        };
        let mut engine = FetchEngine::new(http);
        if let Some(sleeper) = self.sleeper {
            engine = engine.with_sleeper(sleeper);
        }
        let cache = self
            .cache
            .unwrap_or_else(|| CacheLayer::in_memory().with_default_ttl(self.config.cache_ttl));

        info!(provider = ?self.config.kind, "selected data provider");
        let provider: Arc<dyn DataProvider> = match self.config.kind {
            ProviderKind::Rest => {
                let mut rest = RestProvider::new(engine, cache).with_base_url(&self.config.base_url);
                if let Some(key) = &self.config.api_key {
                    rest = rest.with_api_key(key);
                }
                Arc::new(rest)
            }
            ProviderKind::Gateway => {
                let client = HttpGatewayClient::new(engine, &self.config.gateway_url);
                Arc::new(GatewayProvider::new(Arc::new(client), cache))
            }
        };
        Ok(provider)
    }
}

/// Reqwest transport; the gateway variant trusts the configured certificate.
fn transport(config: &ProviderConfig) -> Result<Arc<dyn HttpClient>, ConfigError> {
    match (config.kind, &config.gateway_cacert) {
        (ProviderKind::Gateway, Some(path)) => {
            let pem = std::fs::read(path).map_err(|source| ConfigError::CertificateRead {
                path: path.clone(),
                source,
            })?;
            let certificate = reqwest::Certificate::from_pem(&pem).map_err(|source| {
                ConfigError::CertificateParse {
                    path: path.clone(),
                    source,
                }
            })?;
            let client = reqwest::Client::builder()
                .user_agent(concat!("hedgefeed/", env!("CARGO_PKG_VERSION")))
                .add_root_certificate(certificate)
                .build()
                .map_err(ConfigError::HttpClient)?;
            Ok(Arc::new(ReqwestHttpClient::with_client(client)))
        }
        _ => Ok(Arc::new(ReqwestHttpClient::new())),
    }
}
