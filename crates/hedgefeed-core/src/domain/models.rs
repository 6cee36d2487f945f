use std::collections::BTreeMap;

use serde::de::{DeserializeOwned, Error as DeError};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use time::Date;

use crate::domain::dates::date_part;
use crate::{UtcDateTime, ValidationError};

/// Canonical record produced by a capability.
///
/// `NAME` tags cached payloads and `LIST_FIELD` is the key under which the
/// REST backend wraps a sequence of these records.
pub trait Record: Serialize + DeserializeOwned + Clone + Send + Sync + 'static {
    const NAME: &'static str;
    const LIST_FIELD: &'static str;

    /// Checks invariants that serde alone cannot express.
    fn validate(&self) -> Result<(), ValidationError> {
        Ok(())
    }
}

/// Daily OHLCV price point.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Price {
    #[serde(default)]
    pub ticker: String,
    #[serde(alias = "date")]
    pub time: UtcDateTime,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    #[serde(deserialize_with = "deserialize_volume")]
    pub volume: u64,
}

impl Price {
    pub fn new(
        ticker: impl Into<String>,
        time: UtcDateTime,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: u64,
    ) -> Result<Self, ValidationError> {
        let price = Self {
            ticker: ticker.into(),
            time,
            open,
            high,
            low,
            close,
            volume,
        };
        price.validate()?;
        Ok(price)
    }
}

impl Record for Price {
    const NAME: &'static str = "price";
    const LIST_FIELD: &'static str = "prices";

    fn validate(&self) -> Result<(), ValidationError> {
        validate_non_negative("open", self.open)?;
        validate_non_negative("high", self.high)?;
        validate_non_negative("low", self.low)?;
        validate_non_negative("close", self.close)
    }
}

/// Financial metrics snapshot for one reporting period.
///
/// Named metrics beyond the keyed fields are kept verbatim in `metrics`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinancialMetrics {
    pub ticker: String,
    pub report_period: String,
    #[serde(default)]
    pub period: String,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(default)]
    pub market_cap: Option<f64>,
    #[serde(flatten)]
    pub metrics: BTreeMap<String, Value>,
}

impl FinancialMetrics {
    pub fn report_date(&self) -> Option<Date> {
        date_part(&self.report_period)
    }

    /// Numeric value of a named metric, if present and numeric.
    pub fn metric(&self, name: &str) -> Option<f64> {
        self.metrics.get(name).and_then(Value::as_f64)
    }
}

impl Record for FinancialMetrics {
    const NAME: &'static str = "financial_metrics";
    const LIST_FIELD: &'static str = "financial_metrics";

    fn validate(&self) -> Result<(), ValidationError> {
        if self.report_date().is_none() {
            return Err(ValidationError::InvalidDate {
                value: self.report_period.clone(),
            });
        }
        if let Some(market_cap) = self.market_cap {
            validate_non_negative("market_cap", market_cap)?;
        }
        Ok(())
    }
}

/// One search result row of named financial-statement line items.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LineItem {
    pub ticker: String,
    pub report_period: String,
    #[serde(default)]
    pub period: String,
    #[serde(default)]
    pub currency: Option<String>,
    #[serde(flatten)]
    pub values: BTreeMap<String, Value>,
}

impl LineItem {
    pub fn value(&self, line_item: &str) -> Option<f64> {
        self.values.get(line_item).and_then(Value::as_f64)
    }
}

impl Record for LineItem {
    const NAME: &'static str = "line_item";
    const LIST_FIELD: &'static str = "search_results";
}

/// Insider transaction filing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InsiderTrade {
    pub ticker: String,
    #[serde(default)]
    pub issuer: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub is_board_director: Option<bool>,
    #[serde(default)]
    pub transaction_date: Option<String>,
    #[serde(default)]
    pub transaction_shares: Option<f64>,
    #[serde(default)]
    pub transaction_price_per_share: Option<f64>,
    #[serde(default)]
    pub transaction_value: Option<f64>,
    #[serde(default)]
    pub shares_owned_before_transaction: Option<f64>,
    #[serde(default)]
    pub shares_owned_after_transaction: Option<f64>,
    #[serde(default)]
    pub security_title: Option<String>,
    pub filing_date: String,
}

impl InsiderTrade {
    pub fn filing_day(&self) -> Option<Date> {
        date_part(&self.filing_date)
    }
}

impl Record for InsiderTrade {
    const NAME: &'static str = "insider_trade";
    const LIST_FIELD: &'static str = "insider_trades";

    fn validate(&self) -> Result<(), ValidationError> {
        if self.filing_day().is_none() {
            return Err(ValidationError::InvalidDate {
                value: self.filing_date.clone(),
            });
        }
        Ok(())
    }
}

/// Company news article.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompanyNews {
    pub ticker: String,
    #[serde(alias = "headline")]
    pub title: String,
    #[serde(default)]
    pub author: Option<String>,
    pub source: String,
    pub date: String,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub sentiment: Option<String>,
}

impl CompanyNews {
    pub fn day(&self) -> Option<Date> {
        date_part(&self.date)
    }
}

impl Record for CompanyNews {
    const NAME: &'static str = "company_news";
    const LIST_FIELD: &'static str = "news";

    fn validate(&self) -> Result<(), ValidationError> {
        if self.day().is_none() {
            return Err(ValidationError::InvalidDate {
                value: self.date.clone(),
            });
        }
        Ok(())
    }
}

/// Holding in a single ticker.
///
/// `shares` is the long quantity; `cash` is the position's market value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub ticker: String,
    pub shares: f64,
    #[serde(default)]
    pub short_shares: f64,
    #[serde(default)]
    pub long_cost_basis: Option<f64>,
    #[serde(default)]
    pub short_cost_basis: Option<f64>,
    #[serde(default)]
    pub cash: f64,
}

impl Record for Position {
    const NAME: &'static str = "position";
    const LIST_FIELD: &'static str = "positions";

    fn validate(&self) -> Result<(), ValidationError> {
        validate_non_negative("shares", self.shares)?;
        validate_non_negative("short_shares", self.short_shares)?;
        if self.long_cost_basis.is_some() && self.shares <= 0.0 {
            return Err(ValidationError::OrphanCostBasis { side: "long" });
        }
        if self.short_cost_basis.is_some() && self.short_shares <= 0.0 {
            return Err(ValidationError::OrphanCostBasis { side: "short" });
        }
        Ok(())
    }
}

/// Realized gains split by side.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RealizedGains {
    pub long: f64,
    pub short: f64,
}

/// Account snapshot keyed by ticker.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Portfolio {
    pub total_cash: f64,
    pub positions: BTreeMap<String, Position>,
    #[serde(default)]
    pub realized_gains: BTreeMap<String, RealizedGains>,
    #[serde(default)]
    pub cost_basis: BTreeMap<String, f64>,
}

/// Cash and valuation for one ledger currency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerBalance {
    pub currency: String,
    pub cash_balance: f64,
    pub stock_market_value: f64,
    #[serde(default)]
    pub net_liquidation_value: Option<f64>,
}

/// Account ledger keyed by currency; `BASE` aggregates in the base currency.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Ledger {
    pub balances: BTreeMap<String, LedgerBalance>,
}

impl Ledger {
    pub const BASE: &'static str = "BASE";

    pub fn base(&self) -> Option<&LedgerBalance> {
        self.balances.get(Self::BASE)
    }
}

fn deserialize_volume<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Value::deserialize(deserializer)?;
    volume_from_value(&value).ok_or_else(|| D::Error::custom(format!("invalid volume {value}")))
}

/// Reads a share volume from an integer, float or numeric string.
pub(crate) fn volume_from_value(value: &Value) -> Option<u64> {
    if let Some(volume) = value.as_u64() {
        return Some(volume);
    }

    let float = match value {
        Value::String(text) => text.trim().parse::<f64>().ok()?,
        other => other.as_f64()?,
    };

    if float.is_finite() && float >= 0.0 {
        Some(float.round() as u64)
    } else {
        None
    }
}

fn validate_non_negative(field: &'static str, value: f64) -> Result<(), ValidationError> {
    if !value.is_finite() {
        return Err(ValidationError::NonFiniteValue { field });
    }
    if value < 0.0 {
        return Err(ValidationError::NegativeValue { field });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn price_accepts_date_alias_and_float_volume() {
        let price: Price = serde_json::from_value(json!({
            "ticker": "NVDA",
            "date": "2024-09-26T10:00:00Z",
            "open": 126.17,
            "high": 127.67,
            "low": 121.8,
            "close": 123.35,
            "volume": 2619500.97
        }))
        .expect("price should deserialize");

        assert_eq!(price.volume, 2_619_501);
        assert_eq!(price.time.format_rfc3339(), "2024-09-26T10:00:00Z");
    }

    #[test]
    fn price_rejects_negative_values() {
        let ts = UtcDateTime::parse("2024-01-01T00:00:00Z").expect("timestamp");
        let err = Price::new("AAPL", ts, 10.0, 12.0, -1.0, 11.0, 100).expect_err("must fail");
        assert_eq!(err, ValidationError::NegativeValue { field: "low" });
    }

    #[test]
    fn financial_metrics_keep_named_fields() {
        let metrics: FinancialMetrics = serde_json::from_value(json!({
            "ticker": "AAPL",
            "report_period": "2024-09-28",
            "fiscal_period": "2024-Q4",
            "period": "ttm",
            "currency": "USD",
            "market_cap": 3.5e12,
            "price_to_earnings_ratio": 37.2,
            "return_on_equity": null
        }))
        .expect("metrics should deserialize");

        assert_eq!(metrics.market_cap, Some(3.5e12));
        assert_eq!(metrics.metric("price_to_earnings_ratio"), Some(37.2));
        assert_eq!(metrics.metric("return_on_equity"), None);
        assert!(metrics.metrics.contains_key("fiscal_period"));
        assert!(metrics.validate().is_ok());
    }

    #[test]
    fn position_cost_basis_requires_shares() {
        let position = Position {
            ticker: String::from("NVDA"),
            shares: 0.0,
            short_shares: 0.0,
            long_cost_basis: Some(120.0),
            short_cost_basis: None,
            cash: 0.0,
        };
        assert_eq!(
            position.validate(),
            Err(ValidationError::OrphanCostBasis { side: "long" })
        );
    }

    #[test]
    fn ledger_exposes_base_balance() {
        let mut ledger = Ledger::default();
        ledger.balances.insert(
            String::from("BASE"),
            LedgerBalance {
                currency: String::from("BASE"),
                cash_balance: 1000.0,
                stock_market_value: 500.0,
                net_liquidation_value: None,
            },
        );
        assert_eq!(ledger.base().map(|b| b.cash_balance), Some(1000.0));
    }
}
