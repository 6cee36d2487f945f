//! # Domain Models
//!
//! Canonical, provider-agnostic records and the helpers that build them.
//!
//! ## Records
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Price`] | Daily OHLCV price point |
//! | [`FinancialMetrics`] | Metrics snapshot for one reporting period |
//! | [`LineItem`] | Financial-statement line items for one period |
//! | [`InsiderTrade`] | Insider transaction filing |
//! | [`CompanyNews`] | News article about a company |
//! | [`Position`] | Holding in a single ticker |
//! | [`Portfolio`] | Account snapshot keyed by ticker |
//! | [`Ledger`] | Cash and valuation per currency |
//!
//! ## Values
//!
//! | Type | Description |
//! |------|-------------|
//! | [`Ticker`] | Validated, upper-cased ticker |
//! | [`UtcDateTime`] | UTC timestamp |
//!
//! Records arrive from the backends through [`parse_records`], which accepts
//! a list, a wrapper object or a single object and rejects everything else.

pub mod dates;
mod models;
mod schema;
mod ticker;
mod timestamp;

pub use dates::{
    date_part, format_date, gateway_timestamp, is_valid_url, page_date_limits, parse_date,
    BarPeriod, SessionBound,
};
pub use models::{
    CompanyNews, FinancialMetrics, InsiderTrade, Ledger, LedgerBalance, LineItem, Portfolio,
    Position, Price, RealizedGains, Record,
};
pub(crate) use models::volume_from_value;
pub use schema::{parse_records, parse_records_str};
pub(crate) use schema::json_kind;
pub use ticker::Ticker;
pub use timestamp::UtcDateTime;
