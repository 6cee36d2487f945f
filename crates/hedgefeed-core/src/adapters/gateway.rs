use std::collections::BTreeMap;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::cache::CacheLayer;
use crate::domain::{
    gateway_timestamp, json_kind, volume_from_value, BarPeriod, Record, SessionBound,
};
use crate::provider::{
    Capability, CapabilitySet, CompanyNewsRequest, DataProvider, FinancialMetricsRequest,
    InsiderTradesRequest, LineItemsRequest, MarketCapRequest, PriceRequest, ProviderFuture,
};
use crate::{
    CompanyNews, FinancialMetrics, InsiderTrade, Ledger, LedgerBalance, LineItem, Portfolio,
    Position, Price, ProviderError, ProviderId,
};

pub type GatewayFuture<'a> = Pin<Box<dyn Future<Output = Result<Value, ProviderError>> + Send + 'a>>;

/// Bar-history query in the gateway's own terms.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HistoryRequest {
    pub symbol: String,
    pub period: BarPeriod,
    pub bar: String,
    pub outside_rth: bool,
}

impl HistoryRequest {
    /// Daily bars, including outside-regular-trading-hours data.
    pub fn daily(symbol: impl Into<String>, period: BarPeriod) -> Self {
        Self {
            symbol: symbol.into(),
            period,
            bar: String::from("1d"),
            outside_rth: true,
        }
    }
}

/// Brokerage connection returning gateway-native JSON.
///
/// Shapes expected by [`GatewayProvider`]:
/// - accounts: `[{"accountId": ...}, ...]`
/// - ledger: `{CURRENCY: {"cashbalance", "stockmarketvalue", "netliquidationvalue"}}`
/// - positions: `[{"contractDesc", "position", "mktValue", ...}, ...]`
/// - history: `{SYMBOL: [{"open", "high", "low", "close", "volume", "date"}, ...]}`
pub trait GatewayClient: Send + Sync {
    fn portfolio_accounts<'a>(&'a self) -> GatewayFuture<'a>;

    fn ledger<'a>(&'a self, account_id: &'a str) -> GatewayFuture<'a>;

    fn positions<'a>(&'a self, account_id: &'a str) -> GatewayFuture<'a>;

    fn history_by_symbol<'a>(&'a self, request: HistoryRequest) -> GatewayFuture<'a>;
}

const CAPABILITIES: CapabilitySet = CapabilitySet::of(&[
    Capability::Prices,
    Capability::Portfolio,
    Capability::Positions,
    Capability::Ledger,
]);

/// Provider backed by the brokerage gateway.
///
/// The gateway has no fundamentals or news surface; those capabilities
/// fail as unsupported without touching the connection.
#[derive(Clone)]
pub struct GatewayProvider {
    client: Arc<dyn GatewayClient>,
    cache: CacheLayer,
}

impl GatewayProvider {
    pub fn new(client: Arc<dyn GatewayClient>, cache: CacheLayer) -> Self {
        Self { client, cache }
    }

    async fn account_id(&self) -> Result<String, ProviderError> {
        let accounts = self.client.portfolio_accounts().await?;
        accounts
            .as_array()
            .and_then(|accounts| accounts.first())
            .and_then(|account| account.get("accountId"))
            .and_then(Value::as_str)
            .map(str::to_owned)
            .ok_or_else(|| {
                ProviderError::schema(
                    "portfolio accounts",
                    format!("expected a list of accounts with 'accountId', found {}", json_kind(&accounts)),
                )
            })
    }

    async fn fetch_ledger(&self, account_id: &str) -> Result<Ledger, ProviderError> {
        let raw = self.client.ledger(account_id).await?;
        ledger_from_gateway(&raw)
    }

    async fn fetch_positions(&self, account_id: &str) -> Result<Vec<Position>, ProviderError> {
        let raw = self.client.positions(account_id).await?;
        let entries = raw.as_array().ok_or_else(|| {
            ProviderError::schema(
                "positions",
                format!("expected a list, found {}", json_kind(&raw)),
            )
        })?;

        entries
            .iter()
            .enumerate()
            .map(|(index, entry)| position_from_gateway(index, entry))
            .collect()
    }

    async fn fetch_prices(&self, req: &PriceRequest) -> Result<Vec<Price>, ProviderError> {
        let period = BarPeriod::between(req.start_date, req.end_date)?;
        let history = HistoryRequest::daily(req.ticker.as_str(), period);
        debug!(
            ticker = %req.ticker,
            %period,
            from = %gateway_timestamp(req.start_date, SessionBound::Open),
            to = %gateway_timestamp(req.end_date, SessionBound::Close),
            "requesting gateway bar history"
        );

        let raw = self.client.history_by_symbol(history).await?;
        let mut prices = prices_from_gateway(req.ticker.as_str(), raw)?;

        prices.retain(|price| {
            let day = price.time.date();
            day >= req.start_date && day <= req.end_date
        });
        prices.sort_by_key(|price| price.time);
        prices.dedup_by_key(|price| price.time);
        prices.truncate(req.limit);
        Ok(prices)
    }
}

impl std::fmt::Debug for GatewayProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GatewayProvider")
            .field("cache", &self.cache)
            .finish_non_exhaustive()
    }
}

/// Remaps `{SYMBOL: [bar, ...]}` into canonical prices for `ticker`.
///
/// Bars carry no ticker and name their timestamp `date`; the requested
/// ticker is injected and the timestamp moved to `time`. An empty map is an
/// empty result; a map holding only other symbols is a schema error.
fn prices_from_gateway(ticker: &str, raw: Value) -> Result<Vec<Price>, ProviderError> {
    let mut grouped = match raw {
        Value::Object(map) => map,
        Value::Null => return Ok(Vec::new()),
        other => {
            return Err(ProviderError::schema(
                "bar history",
                format!("expected an object keyed by symbol, found {}", json_kind(&other)),
            ))
        }
    };

    if grouped.is_empty() {
        return Ok(Vec::new());
    }
    let key = grouped
        .keys()
        .find(|key| key.eq_ignore_ascii_case(ticker))
        .cloned();
    let Some(key) = key else {
        let found = grouped.keys().cloned().collect::<Vec<_>>().join(", ");
        return Err(ProviderError::schema(
            "bar history",
            format!("no bars for '{ticker}'; history holds [{found}]"),
        ));
    };

    let bars = match grouped.remove(&key) {
        Some(Value::Array(bars)) => bars,
        Some(Value::Null) | None => return Ok(Vec::new()),
        Some(other) => {
            return Err(ProviderError::schema(
                "bar history",
                format!("expected a list of bars under '{key}', found {}", json_kind(&other)),
            ))
        }
    };

    bars.into_iter()
        .enumerate()
        .map(|(index, bar)| price_from_bar(ticker, index, bar))
        .collect()
}

fn price_from_bar(ticker: &str, index: usize, bar: Value) -> Result<Price, ProviderError> {
    let mut fields = match bar {
        Value::Object(fields) => fields,
        other => {
            return Err(ProviderError::schema(
                "bar history",
                format!("bar {index} is {}, expected an object", json_kind(&other)),
            ))
        }
    };

    if let Some(date) = fields.remove("date") {
        fields.entry("time").or_insert(date);
    }
    fields.insert(String::from("ticker"), Value::String(ticker.to_owned()));
    if let Some(volume) = fields.get("volume").and_then(volume_from_value) {
        fields.insert(String::from("volume"), Value::from(volume));
    }

    let price: Price = serde_json::from_value(Value::Object(fields))
        .map_err(|error| ProviderError::schema(format!("bar {index}"), error))?;
    price
        .validate()
        .map_err(|error| ProviderError::schema(format!("bar {index}"), error))?;
    Ok(price)
}

/// Keeps `{description, quantity, market value}` of a gateway position.
///
/// Negative quantities are short holdings.
fn position_from_gateway(index: usize, entry: &Value) -> Result<Position, ProviderError> {
    let ticker = entry
        .get("contractDesc")
        .and_then(Value::as_str)
        .map(str::trim)
        .filter(|ticker| !ticker.is_empty())
        .ok_or_else(|| {
            ProviderError::schema("positions", format!("position {index} has no 'contractDesc'"))
        })?;

    let quantity = number_field(entry, "position").unwrap_or(0.0);
    let market_value = number_field(entry, "mktValue").unwrap_or(0.0);

    let position = Position {
        ticker: ticker.to_owned(),
        shares: quantity.max(0.0),
        short_shares: (-quantity).max(0.0),
        long_cost_basis: None,
        short_cost_basis: None,
        cash: market_value,
    };
    position
        .validate()
        .map_err(|error| ProviderError::schema(format!("position {index}"), error))?;
    Ok(position)
}

fn ledger_from_gateway(raw: &Value) -> Result<Ledger, ProviderError> {
    let subledgers: &Map<String, Value> = raw.as_object().ok_or_else(|| {
        ProviderError::schema(
            "ledger",
            format!("expected an object keyed by currency, found {}", json_kind(raw)),
        )
    })?;

    let balances = subledgers
        .iter()
        .map(|(currency, subledger)| {
            let balance = LedgerBalance {
                currency: currency.clone(),
                cash_balance: number_field(subledger, "cashbalance").unwrap_or(0.0),
                stock_market_value: number_field(subledger, "stockmarketvalue").unwrap_or(0.0),
                net_liquidation_value: number_field(subledger, "netliquidationvalue"),
            };
            (currency.clone(), balance)
        })
        .collect();

    Ok(Ledger { balances })
}

fn number_field(value: &Value, name: &str) -> Option<f64> {
    match value.get(name)? {
        Value::Number(number) => number.as_f64(),
        Value::String(text) => text.trim().parse().ok(),
        _ => None,
    }
}

/// Builds the portfolio view; several entries for one ticker are summed.
fn portfolio_from_parts(ledger: &Ledger, positions: Vec<Position>) -> Portfolio {
    let total_cash = match ledger.base() {
        Some(base) => base.cash_balance,
        None => {
            warn!("ledger has no BASE subledger; reporting zero cash");
            0.0
        }
    };

    let mut by_ticker: BTreeMap<String, Position> = BTreeMap::new();
    for position in positions {
        match by_ticker.get_mut(&position.ticker) {
            Some(existing) => {
                existing.shares += position.shares;
                existing.short_shares += position.short_shares;
                existing.cash += position.cash;
            }
            None => {
                by_ticker.insert(position.ticker.clone(), position);
            }
        }
    }

    Portfolio {
        total_cash,
        positions: by_ticker,
        realized_gains: BTreeMap::new(),
        cost_basis: BTreeMap::new(),
    }
}

impl DataProvider for GatewayProvider {
    fn id(&self) -> ProviderId {
        ProviderId::IbkrGateway
    }

    fn capabilities(&self) -> CapabilitySet {
        CAPABILITIES
    }

    fn financial_metrics<'a>(
        &'a self,
        _req: FinancialMetricsRequest,
    ) -> ProviderFuture<'a, Vec<FinancialMetrics>> {
        Box::pin(async move {
            Err(ProviderError::unsupported_capability(
                self.id(),
                Capability::FinancialMetrics,
            ))
        })
    }

    fn prices<'a>(&'a self, req: PriceRequest) -> ProviderFuture<'a, Vec<Price>> {
        Box::pin(async move {
            self.cache
                .cached(Capability::Prices, &req.cache_args(), || self.fetch_prices(&req))
                .await
        })
    }

    fn search_line_items<'a>(&'a self, _req: LineItemsRequest) -> ProviderFuture<'a, Vec<LineItem>> {
        Box::pin(async move {
            Err(ProviderError::unsupported_capability(
                self.id(),
                Capability::SearchLineItems,
            ))
        })
    }

    fn insider_trades<'a>(
        &'a self,
        _req: InsiderTradesRequest,
    ) -> ProviderFuture<'a, Vec<InsiderTrade>> {
        Box::pin(async move {
            Err(ProviderError::unsupported_capability(
                self.id(),
                Capability::InsiderTrades,
            ))
        })
    }

    fn company_news<'a>(&'a self, _req: CompanyNewsRequest) -> ProviderFuture<'a, Vec<CompanyNews>> {
        Box::pin(async move {
            Err(ProviderError::unsupported_capability(
                self.id(),
                Capability::CompanyNews,
            ))
        })
    }

    fn market_cap<'a>(&'a self, _req: MarketCapRequest) -> ProviderFuture<'a, Option<f64>> {
        Box::pin(async move {
            Err(ProviderError::unsupported_capability(
                self.id(),
                Capability::MarketCap,
            ))
        })
    }

    fn portfolio<'a>(&'a self) -> ProviderFuture<'a, Portfolio> {
        Box::pin(async move {
            let account_id = self.account_id().await?;
            let ledger = self.fetch_ledger(&account_id).await?;
            let positions = self.fetch_positions(&account_id).await?;
            Ok(portfolio_from_parts(&ledger, positions))
        })
    }

    fn positions<'a>(&'a self) -> ProviderFuture<'a, Vec<Position>> {
        Box::pin(async move {
            let account_id = self.account_id().await?;
            self.fetch_positions(&account_id).await
        })
    }

    fn ledger<'a>(&'a self) -> ProviderFuture<'a, Ledger> {
        Box::pin(async move {
            let account_id = self.account_id().await?;
            self.fetch_ledger(&account_id).await
        })
    }
}
