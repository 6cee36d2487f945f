//! [`GatewayClient`] over the brokerage Client Portal Web API.

use serde_json::{json, Map, Value};
use time::macros::format_description;
use tracing::{debug, warn};

use crate::adapters::gateway::{GatewayClient, GatewayFuture, HistoryRequest};
use crate::domain::json_kind;
use crate::fetch::FetchEngine;
use crate::http_client::HttpRequest;
use crate::{ProviderError, UtcDateTime};

pub const DEFAULT_GATEWAY_URL: &str = "https://localhost:5000/v1/api";

/// Positions are served in pages of this size; a shorter page is the last.
const POSITIONS_PAGE_SIZE: usize = 100;

/// Upper bound on position pages fetched for one account.
const MAX_POSITION_PAGES: usize = 50;

/// Talks to a running brokerage gateway through the shared fetch engine.
#[derive(Debug, Clone)]
pub struct HttpGatewayClient {
    engine: FetchEngine,
    base_url: String,
}

impl HttpGatewayClient {
    pub fn new(engine: FetchEngine, base_url: impl Into<String>) -> Self {
        Self {
            engine,
            base_url: base_url.into().trim_end_matches('/').to_owned(),
        }
    }

    fn get(&self, path: &str) -> HttpRequest {
        HttpRequest::get(format!("{}{path}", self.base_url))
    }

    async fn get_json(&self, call: &str, request: HttpRequest) -> Result<Value, ProviderError> {
        self.engine.fetch_json(call, request).await
    }

    async fn fetch_positions(&self, account_id: &str) -> Result<Value, ProviderError> {
        let mut all = Vec::new();
        let mut previous: Option<Vec<Value>> = None;
        let mut page = 0_usize;

        loop {
            let request = self.get(&format!(
                "/portfolio/{}/positions/{page}",
                urlencoding::encode(account_id)
            ));
            let value = self.get_json("gateway.positions", request).await?;
            let entries = match value {
                Value::Array(entries) => entries,
                Value::Null => Vec::new(),
                other => {
                    return Err(ProviderError::schema(
                        "gateway.positions",
                        format!("expected a list, found {}", json_kind(&other)),
                    ))
                }
            };

            if previous.as_ref() == Some(&entries) {
                warn!(account_id, page, "gateway repeated a positions page; stopping");
                break;
            }

            let page_len = entries.len();
            all.extend(entries.iter().cloned());
            if page_len < POSITIONS_PAGE_SIZE {
                break;
            }
            if page + 1 >= MAX_POSITION_PAGES {
                warn!(account_id, pages = MAX_POSITION_PAGES, "positions page limit reached; stopping");
                break;
            }
            previous = Some(entries);
            page += 1;
        }

        debug!(account_id, pages = page + 1, positions = all.len(), "fetched gateway positions");
        Ok(Value::Array(all))
    }

    async fn fetch_history(&self, request: HistoryRequest) -> Result<Value, ProviderError> {
        let lookup = self
            .get("/trsrv/stocks")
            .with_query([("symbols", Some(request.symbol.clone()))]);
        let contracts = self.get_json("gateway.stocks", lookup).await?;

        let conid = first_us_conid(&contracts, &request.symbol).ok_or_else(|| {
            ProviderError::invalid_input(format!(
                "no US stock contract found for '{}'",
                request.symbol
            ))
        })?;

        let history = self.get("/iserver/marketdata/history").with_query([
            ("conid", Some(conid)),
            ("period", Some(request.period.to_string())),
            ("bar", Some(request.bar.clone())),
            ("outsideRth", Some(request.outside_rth.to_string())),
        ]);
        let raw = self.get_json("gateway.history", history).await?;

        regroup_history(&request.symbol, &raw)
    }
}

/// Contract id of the first US-listed stock contract for `symbol`.
fn first_us_conid(contracts: &Value, symbol: &str) -> Option<String> {
    let entries = contracts
        .get(symbol)
        .or_else(|| contracts.get(symbol.to_ascii_uppercase()))?
        .as_array()?;

    entries
        .iter()
        .filter(|entry| entry.get("assetClass").and_then(Value::as_str) == Some("STK"))
        .flat_map(|entry| {
            entry
                .get("contracts")
                .and_then(Value::as_array)
                .into_iter()
                .flatten()
        })
        .find(|contract| contract.get("isUS").and_then(Value::as_bool) == Some(true))
        .and_then(|contract| match contract.get("conid")? {
            Value::Number(number) => Some(number.to_string()),
            Value::String(text) => Some(text.clone()),
            _ => None,
        })
}

/// Turns `{"data": [{o, h, l, c, v, t}]}` into `{SYMBOL: [{open, ..., date}]}`.
fn regroup_history(symbol: &str, raw: &Value) -> Result<Value, ProviderError> {
    let bars = match raw.get("data") {
        Some(Value::Array(bars)) => bars.as_slice(),
        Some(Value::Null) | None => &[],
        Some(other) => {
            return Err(ProviderError::schema(
                "gateway.history",
                format!("expected 'data' to be a list, found {}", json_kind(other)),
            ))
        }
    };

    let regrouped = bars
        .iter()
        .enumerate()
        .map(|(index, bar)| {
            let millis = bar.get("t").and_then(Value::as_i64).ok_or_else(|| {
                ProviderError::schema("gateway.history", format!("bar {index} has no 't'"))
            })?;
            let date = UtcDateTime::from_unix_millis(millis)?
                .into_inner()
                .format(format_description!(
                    "[year][month][day]-[hour]:[minute]:[second]"
                ))
                .map_err(|error| ProviderError::schema("gateway.history", error))?;

            Ok(json!({
                "open": bar.get("o").cloned().unwrap_or(Value::Null),
                "high": bar.get("h").cloned().unwrap_or(Value::Null),
                "low": bar.get("l").cloned().unwrap_or(Value::Null),
                "close": bar.get("c").cloned().unwrap_or(Value::Null),
                "volume": bar.get("v").cloned().unwrap_or(Value::Null),
                "date": date,
            }))
        })
        .collect::<Result<Vec<_>, ProviderError>>()?;

    let mut grouped = Map::new();
    grouped.insert(symbol.to_owned(), Value::Array(regrouped));
    Ok(Value::Object(grouped))
}

impl GatewayClient for HttpGatewayClient {
    fn portfolio_accounts<'a>(&'a self) -> GatewayFuture<'a> {
        Box::pin(async move {
            self.get_json("gateway.accounts", self.get("/portfolio/accounts"))
                .await
        })
    }

    fn ledger<'a>(&'a self, account_id: &'a str) -> GatewayFuture<'a> {
        Box::pin(async move {
            let path = format!("/portfolio/{}/ledger", urlencoding::encode(account_id));
            self.get_json("gateway.ledger", self.get(&path)).await
        })
    }

    fn positions<'a>(&'a self, account_id: &'a str) -> GatewayFuture<'a> {
        Box::pin(self.fetch_positions(account_id))
    }

    fn history_by_symbol<'a>(&'a self, request: HistoryRequest) -> GatewayFuture<'a> {
        Box::pin(self.fetch_history(request))
    }
}
