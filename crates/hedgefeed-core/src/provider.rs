//! Provider contract and request/response types.
//!
//! Both backends implement [`DataProvider`]. A capability the active backend
//! cannot serve fails with [`ProviderErrorKind::UnsupportedCapability`]
//! before any I/O happens.
//!
//! # Capabilities
//!
//! | Capability | Request | Response |
//! |------------|---------|----------|
//! | `get_financial_metrics` | [`FinancialMetricsRequest`] | `Vec<FinancialMetrics>` |
//! | `get_prices` | [`PriceRequest`] | `Vec<Price>` |
//! | `search_line_items` | [`LineItemsRequest`] | `Vec<LineItem>` |
//! | `get_insider_trades` | [`InsiderTradesRequest`] | `Vec<InsiderTrade>` |
//! | `get_company_news` | [`CompanyNewsRequest`] | `Vec<CompanyNews>` |
//! | `get_market_cap` | [`MarketCapRequest`] | `Option<f64>` |
//! | `get_portfolio` | none | [`Portfolio`] |
//! | `get_positions` | none | `Vec<Position>` |
//! | `get_ledger` | none | [`Ledger`] |

use std::fmt::{Display, Formatter};
use std::future::Future;
use std::pin::Pin;

use serde::{Deserialize, Serialize};
use serde_json::json;
use time::Date;

use crate::cache::CacheArgs;
use crate::domain::{format_date, parse_date};
use crate::{
    CompanyNews, FinancialMetrics, InsiderTrade, Ledger, LineItem, Portfolio, Position, Price,
    ProviderId, SchemaError, Table, Ticker, ValidationError,
};

/// Named operation of the provider interface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    FinancialMetrics,
    Prices,
    SearchLineItems,
    InsiderTrades,
    CompanyNews,
    MarketCap,
    Portfolio,
    Positions,
    Ledger,
}

impl Capability {
    pub const ALL: [Self; 9] = [
        Self::FinancialMetrics,
        Self::Prices,
        Self::SearchLineItems,
        Self::InsiderTrades,
        Self::CompanyNews,
        Self::MarketCap,
        Self::Portfolio,
        Self::Positions,
        Self::Ledger,
    ];

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::FinancialMetrics => "get_financial_metrics",
            Self::Prices => "get_prices",
            Self::SearchLineItems => "search_line_items",
            Self::InsiderTrades => "get_insider_trades",
            Self::CompanyNews => "get_company_news",
            Self::MarketCap => "get_market_cap",
            Self::Portfolio => "get_portfolio",
            Self::Positions => "get_positions",
            Self::Ledger => "get_ledger",
        }
    }

    const fn bit(self) -> u16 {
        1 << (self as u16)
    }
}

impl Display for Capability {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Capabilities a provider serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CapabilitySet {
    bits: u16,
}

impl CapabilitySet {
    pub const fn empty() -> Self {
        Self { bits: 0 }
    }

    pub const fn of(capabilities: &[Capability]) -> Self {
        let mut bits = 0;
        let mut index = 0;
        while index < capabilities.len() {
            bits |= capabilities[index].bit();
            index += 1;
        }
        Self { bits }
    }

    pub const fn full() -> Self {
        Self::of(&Capability::ALL)
    }

    pub const fn supports(self, capability: Capability) -> bool {
        self.bits & capability.bit() != 0
    }

    pub fn supported(self) -> Vec<Capability> {
        Capability::ALL
            .into_iter()
            .filter(|capability| self.supports(*capability))
            .collect()
    }
}

/// Error classification shared by every provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderErrorKind {
    UnsupportedCapability,
    RateLimited,
    ServerError,
    TransportFailure,
    FetchExhausted,
    HttpStatus,
    SchemaError,
    InvalidInput,
    Cancelled,
}

/// Structured provider error carrying enough context to diagnose a failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderError {
    kind: ProviderErrorKind,
    message: String,
    retryable: bool,
    status: Option<u16>,
}

impl ProviderError {
    fn new(kind: ProviderErrorKind, message: String, retryable: bool) -> Self {
        Self {
            kind,
            message,
            retryable,
            status: None,
        }
    }

    pub fn unsupported_capability(provider: ProviderId, capability: Capability) -> Self {
        Self::new(
            ProviderErrorKind::UnsupportedCapability,
            format!("capability '{capability}' is not supported by provider '{provider}'"),
            false,
        )
    }

    pub fn rate_limited(call: &str, status: u16) -> Self {
        Self {
            status: Some(status),
            ..Self::new(
                ProviderErrorKind::RateLimited,
                format!("{call} was rate limited"),
                true,
            )
        }
    }

    pub fn server_error(call: &str, status: u16) -> Self {
        Self {
            status: Some(status),
            ..Self::new(
                ProviderErrorKind::ServerError,
                format!("{call} failed with server status {status}"),
                true,
            )
        }
    }

    pub fn transport_failure(call: &str, detail: impl Display, retryable: bool) -> Self {
        Self::new(
            ProviderErrorKind::TransportFailure,
            format!("{call} transport failure: {detail}"),
            retryable,
        )
    }

    pub fn fetch_exhausted(call: &str, attempts: u32, last: &ProviderError) -> Self {
        Self {
            status: last.status,
            ..Self::new(
                ProviderErrorKind::FetchExhausted,
                format!("{call} gave up after {attempts} attempts; last error: {}", last.message),
                false,
            )
        }
    }

    pub fn http_status(call: &str, status: u16, body: &str) -> Self {
        Self {
            status: Some(status),
            ..Self::new(
                ProviderErrorKind::HttpStatus,
                format!("{call} returned status {status}: {}", snippet(body)),
                false,
            )
        }
    }

    pub fn schema(context: impl Display, error: impl Display) -> Self {
        Self::new(
            ProviderErrorKind::SchemaError,
            format!("{context}: {error}"),
            false,
        )
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(ProviderErrorKind::InvalidInput, message.into(), false)
    }

    pub fn cancelled(call: &str) -> Self {
        Self::new(
            ProviderErrorKind::Cancelled,
            format!("{call} was cancelled"),
            false,
        )
    }

    pub const fn kind(&self) -> ProviderErrorKind {
        self.kind
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub const fn retryable(&self) -> bool {
        self.retryable
    }

    /// HTTP status involved in the failure, when there was one.
    pub const fn status(&self) -> Option<u16> {
        self.status
    }

    pub const fn code(&self) -> &'static str {
        match self.kind {
            ProviderErrorKind::UnsupportedCapability => "provider.unsupported_capability",
            ProviderErrorKind::RateLimited => "provider.rate_limited",
            ProviderErrorKind::ServerError => "provider.server_error",
            ProviderErrorKind::TransportFailure => "provider.transport_failure",
            ProviderErrorKind::FetchExhausted => "provider.fetch_exhausted",
            ProviderErrorKind::HttpStatus => "provider.http_status",
            ProviderErrorKind::SchemaError => "provider.schema_error",
            ProviderErrorKind::InvalidInput => "provider.invalid_input",
            ProviderErrorKind::Cancelled => "provider.cancelled",
        }
    }
}

impl Display for ProviderError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.message, self.code())
    }
}

impl std::error::Error for ProviderError {}

impl From<ValidationError> for ProviderError {
    fn from(error: ValidationError) -> Self {
        Self::invalid_input(error.to_string())
    }
}

impl From<SchemaError> for ProviderError {
    fn from(error: SchemaError) -> Self {
        Self::new(ProviderErrorKind::SchemaError, error.to_string(), false)
    }
}

fn snippet(body: &str) -> &str {
    const MAX: usize = 200;
    match body.char_indices().nth(MAX) {
        Some((cut, _)) => &body[..cut],
        None => body,
    }
}

fn positive_limit(field: &'static str, limit: usize) -> Result<usize, ValidationError> {
    if limit == 0 {
        return Err(ValidationError::ZeroLimit { field });
    }
    Ok(limit)
}

fn ordered_range(start: Date, end: Date) -> Result<(), ValidationError> {
    if start > end {
        return Err(ValidationError::InvertedDateRange {
            start: format_date(start),
            end: format_date(end),
        });
    }
    Ok(())
}

fn optional_date(value: Option<&str>) -> Result<Option<Date>, ValidationError> {
    value.map(parse_date).transpose()
}

/// Request for `get_financial_metrics`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinancialMetricsRequest {
    pub ticker: Ticker,
    pub end_date: Date,
    pub period: String,
    pub limit: usize,
}

impl FinancialMetricsRequest {
    pub const DEFAULT_PERIOD: &'static str = "ttm";
    pub const DEFAULT_LIMIT: usize = 10;

    pub fn new(ticker: &str, end_date: &str) -> Result<Self, ProviderError> {
        Ok(Self {
            ticker: Ticker::parse(ticker)?,
            end_date: parse_date(end_date)?,
            period: String::from(Self::DEFAULT_PERIOD),
            limit: Self::DEFAULT_LIMIT,
        })
    }

    pub fn with_period(mut self, period: impl Into<String>) -> Result<Self, ProviderError> {
        let period = period.into();
        if period.trim().is_empty() {
            return Err(ProviderError::invalid_input("period must not be empty"));
        }
        self.period = period;
        Ok(self)
    }

    pub fn with_limit(mut self, limit: usize) -> Result<Self, ProviderError> {
        self.limit = positive_limit("limit", limit)?;
        Ok(self)
    }

    pub fn cache_args(&self) -> CacheArgs {
        CacheArgs::new()
            .positional(self.ticker.as_str())
            .positional(format_date(self.end_date))
            .keyword("period", self.period.as_str())
            .keyword("limit", self.limit)
    }
}

/// Request for `get_prices`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PriceRequest {
    pub ticker: Ticker,
    pub start_date: Date,
    pub end_date: Date,
    pub limit: usize,
}

impl PriceRequest {
    pub const DEFAULT_LIMIT: usize = 5_000;

    pub fn new(ticker: &str, start_date: &str, end_date: &str) -> Result<Self, ProviderError> {
        let start_date = parse_date(start_date)?;
        let end_date = parse_date(end_date)?;
        ordered_range(start_date, end_date)?;

        Ok(Self {
            ticker: Ticker::parse(ticker)?,
            start_date,
            end_date,
            limit: Self::DEFAULT_LIMIT,
        })
    }

    pub fn with_limit(mut self, limit: usize) -> Result<Self, ProviderError> {
        self.limit = positive_limit("limit", limit)?;
        Ok(self)
    }

    pub fn cache_args(&self) -> CacheArgs {
        CacheArgs::new()
            .positional(self.ticker.as_str())
            .positional(format_date(self.start_date))
            .positional(format_date(self.end_date))
            .keyword("limit", self.limit)
    }
}

/// Request for `search_line_items`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineItemsRequest {
    pub tickers: Vec<Ticker>,
    pub line_items: Vec<String>,
    pub end_date: Date,
    pub period: String,
    pub limit: usize,
}

impl LineItemsRequest {
    pub const DEFAULT_PERIOD: &'static str = "ttm";
    pub const DEFAULT_LIMIT: usize = 100;

    pub fn new<T, L>(tickers: T, line_items: L, end_date: &str) -> Result<Self, ProviderError>
    where
        T: IntoIterator,
        T::Item: AsRef<str>,
        L: IntoIterator,
        L::Item: Into<String>,
    {
        let tickers = tickers
            .into_iter()
            .map(|ticker| Ticker::parse(ticker.as_ref()))
            .collect::<Result<Vec<_>, _>>()?;
        if tickers.is_empty() {
            return Err(ValidationError::EmptyList { field: "tickers" }.into());
        }

        let line_items = line_items
            .into_iter()
            .map(|item| -> String { item.into() })
            .filter(|item| !item.trim().is_empty())
            .collect::<Vec<_>>();
        if line_items.is_empty() {
            return Err(ValidationError::EmptyList {
                field: "line_items",
            }
            .into());
        }

        Ok(Self {
            tickers,
            line_items,
            end_date: parse_date(end_date)?,
            period: String::from(Self::DEFAULT_PERIOD),
            limit: Self::DEFAULT_LIMIT,
        })
    }

    pub fn with_period(mut self, period: impl Into<String>) -> Result<Self, ProviderError> {
        let period = period.into();
        if period.trim().is_empty() {
            return Err(ProviderError::invalid_input("period must not be empty"));
        }
        self.period = period;
        Ok(self)
    }

    pub fn with_limit(mut self, limit: usize) -> Result<Self, ProviderError> {
        self.limit = positive_limit("limit", limit)?;
        Ok(self)
    }

    /// JSON body of the search call.
    pub fn body(&self) -> serde_json::Value {
        json!({
            "tickers": self.tickers.iter().map(Ticker::as_str).collect::<Vec<_>>(),
            "line_items": self.line_items,
            "end_date": format_date(self.end_date),
            "period": self.period,
            "limit": self.limit,
        })
    }

    pub fn cache_args(&self) -> CacheArgs {
        CacheArgs::new()
            .positional(
                self.tickers
                    .iter()
                    .map(|ticker| ticker.as_str().to_owned())
                    .collect::<Vec<_>>(),
            )
            .positional(self.line_items.clone())
            .positional(format_date(self.end_date))
            .keyword("period", self.period.as_str())
            .keyword("limit", self.limit)
    }
}

/// Request for `get_insider_trades`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsiderTradesRequest {
    pub ticker: Ticker,
    pub end_date: Date,
    /// Without a start date only the newest page is fetched.
    pub start_date: Option<Date>,
    pub limit: usize,
}

impl InsiderTradesRequest {
    pub const DEFAULT_LIMIT: usize = 1_000;

    pub fn new(ticker: &str, end_date: &str, start_date: Option<&str>) -> Result<Self, ProviderError> {
        let end_date = parse_date(end_date)?;
        let start_date = optional_date(start_date)?;
        if let Some(start) = start_date {
            ordered_range(start, end_date)?;
        }

        Ok(Self {
            ticker: Ticker::parse(ticker)?,
            end_date,
            start_date,
            limit: Self::DEFAULT_LIMIT,
        })
    }

    pub fn with_limit(mut self, limit: usize) -> Result<Self, ProviderError> {
        self.limit = positive_limit("limit", limit)?;
        Ok(self)
    }

    pub fn cache_args(&self) -> CacheArgs {
        CacheArgs::new()
            .positional(self.ticker.as_str())
            .positional(format_date(self.end_date))
            .keyword("start_date", self.start_date.map(format_date))
            .keyword("limit", self.limit)
    }
}

/// Request for `get_company_news`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompanyNewsRequest {
    pub ticker: Ticker,
    pub end_date: Option<Date>,
    /// Paging past the first page needs both bounds.
    pub start_date: Option<Date>,
    pub limit: usize,
}

impl CompanyNewsRequest {
    pub const DEFAULT_LIMIT: usize = 500;

    pub fn new(
        ticker: &str,
        end_date: Option<&str>,
        start_date: Option<&str>,
    ) -> Result<Self, ProviderError> {
        let end_date = optional_date(end_date)?;
        let start_date = optional_date(start_date)?;
        if let (Some(start), Some(end)) = (start_date, end_date) {
            ordered_range(start, end)?;
        }

        Ok(Self {
            ticker: Ticker::parse(ticker)?,
            end_date,
            start_date,
            limit: Self::DEFAULT_LIMIT,
        })
    }

    pub fn with_limit(mut self, limit: usize) -> Result<Self, ProviderError> {
        self.limit = positive_limit("limit", limit)?;
        Ok(self)
    }

    pub fn cache_args(&self) -> CacheArgs {
        CacheArgs::new()
            .positional(self.ticker.as_str())
            .positional(self.end_date.map(format_date))
            .keyword("start_date", self.start_date.map(format_date))
            .keyword("limit", self.limit)
    }
}

/// Request for `get_market_cap`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MarketCapRequest {
    pub ticker: Ticker,
    pub end_date: Date,
}

impl MarketCapRequest {
    pub fn new(ticker: &str, end_date: &str) -> Result<Self, ProviderError> {
        Ok(Self {
            ticker: Ticker::parse(ticker)?,
            end_date: parse_date(end_date)?,
        })
    }

    /// Metrics request whose newest entry carries the market cap.
    pub fn metrics_request(&self) -> FinancialMetricsRequest {
        FinancialMetricsRequest {
            ticker: self.ticker.clone(),
            end_date: self.end_date,
            period: String::from(FinancialMetricsRequest::DEFAULT_PERIOD),
            limit: FinancialMetricsRequest::DEFAULT_LIMIT,
        }
    }

    pub fn cache_args(&self) -> CacheArgs {
        CacheArgs::new()
            .positional(self.ticker.as_str())
            .positional(format_date(self.end_date))
    }
}

pub type ProviderFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, ProviderError>> + Send + 'a>>;

/// Capability contract implemented by every backend.
///
/// Implementations must be `Send + Sync`; one handle is shared for a whole
/// session.
pub trait DataProvider: Send + Sync {
    fn id(&self) -> ProviderId;

    fn capabilities(&self) -> CapabilitySet;

    fn financial_metrics<'a>(
        &'a self,
        req: FinancialMetricsRequest,
    ) -> ProviderFuture<'a, Vec<FinancialMetrics>>;

    /// Daily prices; an empty window is a valid, empty result.
    fn prices<'a>(&'a self, req: PriceRequest) -> ProviderFuture<'a, Vec<Price>>;

    fn search_line_items<'a>(&'a self, req: LineItemsRequest) -> ProviderFuture<'a, Vec<LineItem>>;

    fn insider_trades<'a>(
        &'a self,
        req: InsiderTradesRequest,
    ) -> ProviderFuture<'a, Vec<InsiderTrade>>;

    fn company_news<'a>(&'a self, req: CompanyNewsRequest)
        -> ProviderFuture<'a, Vec<CompanyNews>>;

    /// Market cap of the newest metrics entry; `None` when not reported.
    fn market_cap<'a>(&'a self, req: MarketCapRequest) -> ProviderFuture<'a, Option<f64>>;

    fn portfolio<'a>(&'a self) -> ProviderFuture<'a, Portfolio>;

    fn positions<'a>(&'a self) -> ProviderFuture<'a, Vec<Position>>;

    fn ledger<'a>(&'a self) -> ProviderFuture<'a, Ledger>;

    /// Prices projected into the time-indexed tabular view.
    fn price_data<'a>(&'a self, req: PriceRequest) -> ProviderFuture<'a, Table> {
        Box::pin(async move {
            let prices = self.prices(req).await?;
            Ok(Table::from_records(&prices)?)
        })
    }

    /// Fails fast when `capability` is not served by this provider.
    fn ensure_supported(&self, capability: Capability) -> Result<(), ProviderError> {
        if self.capabilities().supports(capability) {
            Ok(())
        } else {
            Err(ProviderError::unsupported_capability(self.id(), capability))
        }
    }
}
