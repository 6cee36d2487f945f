use std::sync::Arc;
use std::time::Duration;

use time::Date;
use tracing::{debug, info, warn};

use crate::cache::CacheLayer;
use crate::domain::{date_part, format_date, page_date_limits, Record};
use crate::fetch::FetchEngine;
use crate::http_client::{HttpAuth, HttpRequest, NoopHttpClient};
use crate::provider::{
    Capability, CapabilitySet, CompanyNewsRequest, DataProvider, FinancialMetricsRequest,
    InsiderTradesRequest, LineItemsRequest, MarketCapRequest, PriceRequest, ProviderFuture,
};
use crate::{
    CompanyNews, FinancialMetrics, InsiderTrade, Ledger, LineItem, Portfolio, Position, Price,
    ProviderError, ProviderId,
};

pub const DEFAULT_BASE_URL: &str = "https://api.financialdatasets.ai";
pub const DEFAULT_PAGE_DELAY: Duration = Duration::from_secs(1);

const CAPABILITIES: CapabilitySet = CapabilitySet::of(&[
    Capability::FinancialMetrics,
    Capability::Prices,
    Capability::SearchLineItems,
    Capability::InsiderTrades,
    Capability::CompanyNews,
    Capability::MarketCap,
]);

/// Provider backed by the hosted financial-data REST service.
///
/// Account capabilities (portfolio, positions, ledger) are not offered by
/// the service and fail as unsupported.
#[derive(Debug, Clone)]
pub struct RestProvider {
    engine: FetchEngine,
    cache: CacheLayer,
    base_url: String,
    auth: HttpAuth,
    page_delay: Duration,
}

impl Default for RestProvider {
    fn default() -> Self {
        Self::new(FetchEngine::new(Arc::new(NoopHttpClient)), CacheLayer::disabled())
    }
}

impl RestProvider {
    pub fn new(engine: FetchEngine, cache: CacheLayer) -> Self {
        Self {
            engine,
            cache,
            base_url: String::from(DEFAULT_BASE_URL),
            auth: HttpAuth::None,
            page_delay: DEFAULT_PAGE_DELAY,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_owned();
        self
    }

    /// Sends `key` as the `X-API-KEY` header on every request.
    pub fn with_api_key(mut self, key: impl Into<String>) -> Self {
        self.auth = HttpAuth::api_key(key);
        self
    }

    /// Flat pause between consecutive pages.
    pub fn with_page_delay(mut self, page_delay: Duration) -> Self {
        self.page_delay = page_delay;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn get(&self, path: &str) -> HttpRequest {
        HttpRequest::get(format!("{}{path}", self.base_url)).with_auth(&self.auth)
    }

    async fn fetch_financial_metrics(
        &self,
        req: &FinancialMetricsRequest,
    ) -> Result<Vec<FinancialMetrics>, ProviderError> {
        let call = Capability::FinancialMetrics.as_str();
        let request = self.get("/financial-metrics/").with_query([
            ("ticker", Some(req.ticker.to_string())),
            ("end_date", Some(format_date(req.end_date))),
            ("limit", Some(req.limit.to_string())),
            ("period", Some(req.period.clone())),
        ]);

        let mut metrics = self
            .engine
            .fetch_records::<FinancialMetrics>(call, request)
            .await?;

        metrics.retain(|metric| {
            metric
                .report_date()
                .is_some_and(|reported| reported <= req.end_date)
        });
        metrics.truncate(req.limit);
        Ok(metrics)
    }

    async fn fetch_prices(&self, req: &PriceRequest) -> Result<Vec<Price>, ProviderError> {
        let call = Capability::Prices.as_str();
        let request = self.get("/prices/").with_query([
            ("ticker", Some(req.ticker.to_string())),
            ("interval", Some(String::from("day"))),
            ("interval_multiplier", Some(String::from("1"))),
            ("start_date", Some(format_date(req.start_date))),
            ("end_date", Some(format_date(req.end_date))),
            ("limit", Some(req.limit.to_string())),
        ]);

        let mut prices = self.engine.fetch_records::<Price>(call, request).await?;
        for price in &mut prices {
            if price.ticker.is_empty() {
                price.ticker = req.ticker.to_string();
            }
        }
        Ok(prices)
    }

    async fn fetch_line_items(&self, req: &LineItemsRequest) -> Result<Vec<LineItem>, ProviderError> {
        let call = Capability::SearchLineItems.as_str();
        let request = HttpRequest::post_json(
            format!("{}/financials/search/line-items", self.base_url),
            &req.body(),
        )
        .with_auth(&self.auth);

        let mut items = self.engine.fetch_records::<LineItem>(call, request).await?;
        items.truncate(req.limit);
        Ok(items)
    }

    async fn fetch_insider_trades(
        &self,
        req: &InsiderTradesRequest,
    ) -> Result<Vec<InsiderTrade>, ProviderError> {
        let plan = PagePlan {
            call: Capability::InsiderTrades.as_str(),
            path: "/insider-trades/",
            cursor_param: "filing_date_lte",
            params: vec![
                ("ticker", Some(req.ticker.to_string())),
                ("limit", Some(req.limit.to_string())),
                ("filing_date_gte", req.start_date.map(format_date)),
            ],
            first_cursor: Some(req.end_date),
            start: req.start_date,
            limit: req.limit,
            follow: req.start_date.is_some(),
        };

        self.paginate::<InsiderTrade>(plan, |trade| trade.filing_date.as_str()).await
    }

    async fn fetch_company_news(
        &self,
        req: &CompanyNewsRequest,
    ) -> Result<Vec<CompanyNews>, ProviderError> {
        let plan = PagePlan {
            call: Capability::CompanyNews.as_str(),
            path: "/news/",
            cursor_param: "end_date",
            params: vec![
                ("ticker", Some(req.ticker.to_string())),
                ("limit", Some(req.limit.to_string())),
                ("start_date", req.start_date.map(format_date)),
            ],
            first_cursor: req.end_date,
            start: req.start_date,
            limit: req.limit,
            follow: req.start_date.is_some() && req.end_date.is_some(),
        };

        self.paginate::<CompanyNews>(plan, |news| news.date.as_str()).await
    }

    /// Walks pages backwards in time until a stop condition holds.
    ///
    /// Stops on an empty or short page, when the oldest date of a page
    /// reaches `start`, or when the cursor would not move strictly
    /// backwards. Records on the boundary date that were already collected
    /// are dropped from the next page. `date_of` yields the raw date value
    /// the cursor follows.
    async fn paginate<T>(
        &self,
        plan: PagePlan,
        date_of: fn(&T) -> &str,
    ) -> Result<Vec<T>, ProviderError>
    where
        T: Record + PartialEq,
    {
        let mut collected: Vec<T> = Vec::new();
        let mut boundary: Vec<T> = Vec::new();
        let mut cursor = plan.first_cursor;
        let mut pages = 0_usize;

        loop {
            self.engine.ensure_active(plan.call)?;

            let mut params = plan.params.clone();
            params.push((plan.cursor_param, cursor.map(format_date)));
            let request = self.get(plan.path).with_query(params);

            let page = self.engine.fetch_records::<T>(plan.call, request).await?;
            if page.is_empty() {
                break;
            }
            pages += 1;
            let page_len = page.len();

            let limits = page_date_limits(page.iter().map(date_of));
            collected.extend(page.iter().filter(|record| !boundary.contains(record)).cloned());

            if !plan.follow || page_len < plan.limit {
                break;
            }

            let Some((oldest, newest)) = limits else {
                warn!(call = plan.call, "page carries no readable dates; stopping");
                break;
            };
            if plan.start.is_some_and(|start| oldest <= start) {
                break;
            }
            if cursor.is_some_and(|current| oldest >= current) {
                warn!(
                    call = plan.call,
                    cursor = %format_date(oldest),
                    "cursor did not move backwards; stopping"
                );
                break;
            }

            boundary = page
                .into_iter()
                .filter(|record| date_part(date_of(record)) == Some(oldest))
                .collect();
            cursor = Some(oldest);
            debug!(
                call = plan.call,
                cursor = %format_date(oldest),
                page_newest = %format_date(newest),
                "requesting next page"
            );

            self.engine.pause(plan.call, self.page_delay).await?;
        }

        info!(call = plan.call, pages, records = collected.len(), "pagination finished");
        Ok(collected)
    }
}

struct PagePlan {
    call: &'static str,
    path: &'static str,
    cursor_param: &'static str,
    params: Vec<(&'static str, Option<String>)>,
    first_cursor: Option<Date>,
    start: Option<Date>,
    limit: usize,
    follow: bool,
}

impl DataProvider for RestProvider {
    fn id(&self) -> ProviderId {
        ProviderId::FinancialDatasets
    }

    fn capabilities(&self) -> CapabilitySet {
        CAPABILITIES
    }

    fn financial_metrics<'a>(
        &'a self,
        req: FinancialMetricsRequest,
    ) -> ProviderFuture<'a, Vec<FinancialMetrics>> {
        Box::pin(async move {
            self.cache
                .cached(Capability::FinancialMetrics, &req.cache_args(), || {
                    self.fetch_financial_metrics(&req)
                })
                .await
        })
    }

    fn prices<'a>(&'a self, req: PriceRequest) -> ProviderFuture<'a, Vec<Price>> {
        Box::pin(async move {
            self.cache
                .cached(Capability::Prices, &req.cache_args(), || self.fetch_prices(&req))
                .await
        })
    }

    fn search_line_items<'a>(&'a self, req: LineItemsRequest) -> ProviderFuture<'a, Vec<LineItem>> {
        Box::pin(async move {
            self.cache
                .cached(Capability::SearchLineItems, &req.cache_args(), || {
                    self.fetch_line_items(&req)
                })
                .await
        })
    }

    fn insider_trades<'a>(
        &'a self,
        req: InsiderTradesRequest,
    ) -> ProviderFuture<'a, Vec<InsiderTrade>> {
        Box::pin(async move {
            self.cache
                .cached(Capability::InsiderTrades, &req.cache_args(), || {
                    self.fetch_insider_trades(&req)
                })
                .await
        })
    }

    fn company_news<'a>(&'a self, req: CompanyNewsRequest) -> ProviderFuture<'a, Vec<CompanyNews>> {
        Box::pin(async move {
            self.cache
                .cached(Capability::CompanyNews, &req.cache_args(), || {
                    self.fetch_company_news(&req)
                })
                .await
        })
    }

    fn market_cap<'a>(&'a self, req: MarketCapRequest) -> ProviderFuture<'a, Option<f64>> {
        Box::pin(async move {
            self.cache
                .cached(Capability::MarketCap, &req.cache_args(), || async {
                    let metrics = self.financial_metrics(req.metrics_request()).await?;
                    Ok(metrics
                        .iter()
                        .max_by_key(|metric| metric.report_date())
                        .and_then(|latest| latest.market_cap)
                        .filter(|market_cap| *market_cap > 0.0))
                })
                .await
        })
    }

    fn portfolio<'a>(&'a self) -> ProviderFuture<'a, Portfolio> {
        Box::pin(async move {
            Err(ProviderError::unsupported_capability(
                self.id(),
                Capability::Portfolio,
            ))
        })
    }

    fn positions<'a>(&'a self) -> ProviderFuture<'a, Vec<Position>> {
        Box::pin(async move {
            Err(ProviderError::unsupported_capability(
                self.id(),
                Capability::Positions,
            ))
        })
    }

    fn ledger<'a>(&'a self) -> ProviderFuture<'a, Ledger> {
        Box::pin(async move {
            Err(ProviderError::unsupported_capability(
                self.id(),
                Capability::Ledger,
            ))
        })
    }
}

#[cfg(test)]
mod tests {
    use std::future::Future;

    use super::*;
    use crate::fetch::RecordingSleeper;
    use crate::http_client::{HttpResponse, ScriptedHttpClient};
    use crate::ProviderErrorKind;

    fn block_on<F: Future>(future: F) -> F::Output {
        tokio::runtime::Builder::new_current_thread()
            .build()
            .expect("runtime")
            .block_on(future)
    }

    fn provider(client: &ScriptedHttpClient) -> RestProvider {
        let engine = FetchEngine::new(Arc::new(client.clone()))
            .with_sleeper(Arc::new(RecordingSleeper::new()));
        RestProvider::new(engine, CacheLayer::disabled())
            .with_base_url("https://api.test/")
            .with_api_key("secret")
    }

    #[test]
    fn prices_request_carries_window_and_api_key() {
        let client = ScriptedHttpClient::responses([HttpResponse::ok_json(
            r#"{"ticker":"AAPL","prices":[{"time":"2024-01-02T05:00:00Z","open":1,"high":2,"low":0.5,"close":1.5,"volume":10}]}"#,
        )]);
        let req = PriceRequest::new("AAPL", "2024-01-01", "2024-01-31").expect("request");

        let prices = block_on(provider(&client).prices(req)).expect("prices");

        assert_eq!(prices.len(), 1);
        assert_eq!(prices[0].ticker, "AAPL");
        let sent = &client.requests()[0];
        assert!(sent.url.starts_with("https://api.test/prices/?"));
        assert_eq!(sent.query_param("start_date").as_deref(), Some("2024-01-01"));
        assert_eq!(sent.query_param("end_date").as_deref(), Some("2024-01-31"));
        assert_eq!(sent.query_param("interval").as_deref(), Some("day"));
        assert_eq!(sent.headers.get("x-api-key").map(String::as_str), Some("secret"));
    }

    #[test]
    fn empty_price_window_is_not_an_error() {
        let client = ScriptedHttpClient::responses([HttpResponse::ok_json(r#"{"prices":[]}"#)]);
        let req = PriceRequest::new("AAPL", "2024-01-01", "2024-01-02").expect("request");

        let prices = block_on(provider(&client).prices(req)).expect("empty ok");
        assert!(prices.is_empty());
    }

    #[test]
    fn line_items_are_posted_and_truncated() {
        let client = ScriptedHttpClient::responses([HttpResponse::ok_json(
            r#"{"search_results":[
                {"ticker":"NVDA","report_period":"2024-10-27","period":"ttm","currency":"USD","revenue":1.0},
                {"ticker":"NVDA","report_period":"2024-07-28","period":"ttm","currency":"USD","revenue":2.0}
            ]}"#,
        )]);
        let req = LineItemsRequest::new(["NVDA"], ["revenue"], "2024-12-31")
            .and_then(|req| req.with_limit(1))
            .expect("request");

        let items = block_on(provider(&client).search_line_items(req)).expect("items");

        assert_eq!(items.len(), 1);
        assert_eq!(items[0].value("revenue"), Some(1.0));
        let sent = &client.requests()[0];
        assert_eq!(sent.method, crate::http_client::HttpMethod::Post);
        assert!(sent.body.as_deref().is_some_and(|body| body.contains("\"tickers\":[\"NVDA\"]")));
    }

    #[test]
    fn market_cap_comes_from_latest_metrics() {
        let client = ScriptedHttpClient::responses([HttpResponse::ok_json(
            r#"{"financial_metrics":[
                {"ticker":"AAPL","report_period":"2024-06-29","period":"ttm","market_cap":3.0e12},
                {"ticker":"AAPL","report_period":"2024-09-28","period":"ttm","market_cap":3.5e12}
            ]}"#,
        )]);
        let req = MarketCapRequest::new("AAPL", "2024-12-31").expect("request");

        let market_cap = block_on(provider(&client).market_cap(req)).expect("market cap");
        assert_eq!(market_cap, Some(3.5e12));
    }

    #[test]
    fn missing_market_cap_is_none() {
        let client = ScriptedHttpClient::responses([HttpResponse::ok_json(
            r#"{"financial_metrics":[]}"#,
        )]);
        let req = MarketCapRequest::new("AAPL", "2024-12-31").expect("request");

        assert_eq!(block_on(provider(&client).market_cap(req)).expect("none"), None);
    }

    #[test]
    fn metrics_after_end_date_are_dropped() {
        let client = ScriptedHttpClient::responses([HttpResponse::ok_json(
            r#"{"financial_metrics":[
                {"ticker":"AAPL","report_period":"2025-03-29","period":"ttm"},
                {"ticker":"AAPL","report_period":"2024-12-28","period":"ttm"}
            ]}"#,
        )]);
        let req = FinancialMetricsRequest::new("AAPL", "2024-12-31").expect("request");

        let metrics = block_on(provider(&client).financial_metrics(req)).expect("metrics");
        assert_eq!(metrics.len(), 1);
        assert_eq!(metrics[0].report_period, "2024-12-28");
    }

    #[test]
    fn account_capabilities_are_unsupported() {
        let client = ScriptedHttpClient::default();
        let provider = provider(&client);

        let err = block_on(provider.portfolio()).expect_err("unsupported");
        assert_eq!(err.kind(), ProviderErrorKind::UnsupportedCapability);
        assert_eq!(client.request_count(), 0);
    }
}
