//! Calendar-date helpers shared by both providers.

use std::fmt::{Display, Formatter};

use time::macros::{format_description, time};
use time::{Date, Duration, Time};

use crate::ValidationError;

const MARKET_OPEN: Time = time!(09:30:00);
const MARKET_CLOSE: Time = time!(16:00:00);

/// Parses a `YYYY-MM-DD` calendar date.
pub fn parse_date(input: &str) -> Result<Date, ValidationError> {
    let trimmed = input.trim();
    Date::parse(trimmed, format_description!("[year]-[month]-[day]")).map_err(|_| {
        ValidationError::InvalidDate {
            value: input.to_owned(),
        }
    })
}

pub fn format_date(date: Date) -> String {
    format!(
        "{:04}-{:02}-{:02}",
        date.year(),
        u8::from(date.month()),
        date.day()
    )
}

/// Calendar date of a `YYYY-MM-DD...` or gateway `YYYYMMDD-...` value.
pub fn date_part(value: &str) -> Option<Date> {
    let trimmed = value.trim();
    if let Some(head) = trimmed.get(..10) {
        if let Ok(date) = parse_date(head) {
            return Some(date);
        }
    }

    trimmed
        .get(..8)
        .and_then(|head| Date::parse(head, format_description!("[year][month][day]")).ok())
}

/// Oldest and newest calendar dates found in a page of date strings.
///
/// Values that do not carry a recognizable date are skipped.
pub fn page_date_limits<'a, I>(values: I) -> Option<(Date, Date)>
where
    I: IntoIterator<Item = &'a str>,
{
    values
        .into_iter()
        .filter_map(date_part)
        .fold(None, |limits, date| match limits {
            None => Some((date, date)),
            Some((min, max)) => Some((min.min(date), max.max(date))),
        })
}

/// Which side of a trading session a calendar date stands for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionBound {
    Open,
    Close,
}

impl SessionBound {
    const fn time(self) -> Time {
        match self {
            Self::Open => MARKET_OPEN,
            Self::Close => MARKET_CLOSE,
        }
    }
}

/// Gateway timestamp (`YYYYMMDD-HH:MM:SS`) for the open or close of `date`.
pub fn gateway_timestamp(date: Date, bound: SessionBound) -> String {
    let time = bound.time();
    format!(
        "{:04}{:02}{:02}-{:02}:{:02}:{:02}",
        date.year(),
        u8::from(date.month()),
        date.day(),
        time.hour(),
        time.minute(),
        time.second()
    )
}

/// Coarse bar-history span understood by the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BarPeriod {
    Hours(i64),
    Days(i64),
}

impl BarPeriod {
    /// Span between the open of `start` and the close of `end`.
    ///
    /// Spans shorter than one day are expressed in whole hours, anything
    /// longer in whole days.
    pub fn between(start: Date, end: Date) -> Result<Self, ValidationError> {
        if start > end {
            return Err(ValidationError::InvertedDateRange {
                start: format_date(start),
                end: format_date(end),
            });
        }

        let elapsed =
            end.with_time(SessionBound::Close.time()) - start.with_time(SessionBound::Open.time());

        if elapsed < Duration::days(1) {
            Ok(Self::Hours(elapsed.whole_hours()))
        } else {
            Ok(Self::Days(elapsed.whole_days()))
        }
    }
}

impl Display for BarPeriod {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Hours(hours) => write!(f, "{hours}h"),
            Self::Days(days) => write!(f, "{days}d"),
        }
    }
}

/// True when `url` carries both a scheme and a host.
pub fn is_valid_url(url: &str) -> bool {
    reqwest::Url::parse(url)
        .map(|parsed| !parsed.scheme().is_empty() && parsed.host_str().is_some())
        .unwrap_or(false)
}
