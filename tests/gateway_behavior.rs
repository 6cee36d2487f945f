//! Gateway provider: schema transformation of brokerage-native payloads.

mod common;

use std::sync::Arc;

use common::ScriptedGateway;
use hedgefeed_core::{
    CacheLayer, DataProvider, FetchEngine, GatewayProvider, HttpGatewayClient, HttpResponse,
    PriceRequest, ProviderErrorKind, RecordingSleeper, ScriptedHttpClient,
};
use serde_json::json;

fn account_gateway() -> ScriptedGateway {
    ScriptedGateway::new()
        .with_ledger(json!({
            "BASE": {"cashbalance": 1000.0, "stockmarketvalue": 500.0, "netliquidationvalue": 1500.0},
            "USD": {"cashbalance": 1000.0, "stockmarketvalue": 500.0}
        }))
        .with_positions(json!([
            {"contractDesc": "NVDA", "position": 10, "mktValue": 500.0, "currency": "USD"}
        ]))
}

#[tokio::test]
async fn portfolio_combines_base_cash_with_positions() {
    // Given: a gateway with one account, a BASE subledger and one holding
    let gateway = Arc::new(account_gateway());
    let provider = GatewayProvider::new(gateway.clone(), CacheLayer::disabled());

    // When
    let portfolio = provider.portfolio().await.expect("portfolio");

    // Then
    assert_eq!(portfolio.total_cash, 1000.0);
    assert_eq!(portfolio.positions.len(), 1);
    let nvda = &portfolio.positions["NVDA"];
    assert_eq!(nvda.shares, 10.0);
    assert_eq!(nvda.short_shares, 0.0);
    assert_eq!(nvda.cash, 500.0);
    assert!(portfolio.realized_gains.is_empty());

    // And: the first account was used for every account call
    assert_eq!(
        gateway.calls(),
        ["accounts", "ledger:U1234567", "positions:U1234567"]
    );
}

#[tokio::test]
async fn missing_base_subledger_reports_zero_cash() {
    let gateway = Arc::new(
        ScriptedGateway::new()
            .with_ledger(json!({"USD": {"cashbalance": 250.0}}))
            .with_positions(json!([])),
    );
    let provider = GatewayProvider::new(gateway, CacheLayer::disabled());

    let portfolio = provider.portfolio().await.expect("portfolio");

    assert_eq!(portfolio.total_cash, 0.0);
    assert!(portfolio.positions.is_empty());
}

#[tokio::test]
async fn ledger_and_positions_are_exposed_directly() {
    let provider = GatewayProvider::new(Arc::new(account_gateway()), CacheLayer::disabled());

    let ledger = provider.ledger().await.expect("ledger");
    let positions = provider.positions().await.expect("positions");

    assert_eq!(ledger.balances["BASE"].net_liquidation_value, Some(1500.0));
    assert_eq!(ledger.balances["USD"].net_liquidation_value, None);
    assert_eq!(positions.len(), 1);
    assert_eq!(positions[0].ticker, "NVDA");
}

#[tokio::test]
async fn history_bars_become_canonical_prices_inside_the_window() {
    // Given: bars out of order, one duplicate and one outside the window
    let gateway = Arc::new(ScriptedGateway::new().with_history(json!({
        "NVDA": [
            {"open": 126.0, "high": 127.0, "low": 121.0, "close": 123.0, "volume": 2619500.97, "date": "20240926-10:00:00"},
            {"open": 120.0, "high": 122.0, "low": 119.0, "close": 121.0, "volume": 100, "date": "20240925-10:00:00"},
            {"open": 120.0, "high": 122.0, "low": 119.0, "close": 121.0, "volume": 100, "date": "20240925-10:00:00"},
            {"open": 110.0, "high": 111.0, "low": 109.0, "close": 110.5, "volume": 50, "date": "20240920-10:00:00"}
        ]
    })));
    let provider = GatewayProvider::new(gateway.clone(), CacheLayer::in_memory());
    let request = PriceRequest::new("NVDA", "2024-09-24", "2024-09-26").expect("request");

    // When
    let prices = provider.prices(request.clone()).await.expect("prices");

    // Then: ticker injected, `date` moved to `time`, sorted and deduplicated
    let times: Vec<_> = prices.iter().map(|price| price.time.format_rfc3339()).collect();
    assert_eq!(times, ["2024-09-25T10:00:00Z", "2024-09-26T10:00:00Z"]);
    assert!(prices.iter().all(|price| price.ticker == "NVDA"));
    assert_eq!(prices[1].volume, 2_619_501);
    assert_eq!(gateway.calls(), ["history:NVDA:2d"]);

    // And: a repeated call is served from the cache
    let again = provider.prices(request).await.expect("cached");
    assert_eq!(again, prices);
    assert_eq!(gateway.calls().len(), 1);
}

#[tokio::test]
async fn empty_history_is_an_empty_result() {
    let gateway = Arc::new(ScriptedGateway::new().with_history(json!({})));
    let provider = GatewayProvider::new(gateway, CacheLayer::disabled());
    let request = PriceRequest::new("NVDA", "2024-09-24", "2024-09-26").expect("request");

    let prices = provider.prices(request).await.expect("empty");

    assert!(prices.is_empty());
}

#[tokio::test]
async fn history_for_another_symbol_is_never_relabelled() {
    // Given: the gateway answers an NVDA request with MSFT bars
    let gateway = Arc::new(ScriptedGateway::new().with_history(json!({
        "MSFT": [
            {"open": 1.0, "high": 1.0, "low": 1.0, "close": 1.0, "volume": 1, "date": "20240925-10:00:00"}
        ]
    })));
    let provider = GatewayProvider::new(gateway, CacheLayer::disabled());
    let request = PriceRequest::new("NVDA", "2024-09-24", "2024-09-26").expect("request");

    // When
    let err = provider.prices(request).await.expect_err("wrong symbol");

    // Then: the mismatch surfaces instead of MSFT prices
    assert_eq!(err.kind(), ProviderErrorKind::SchemaError);
    assert!(err.message().contains("NVDA"));
}

#[tokio::test]
async fn unexpected_account_payload_is_a_schema_error() {
    let mut gateway = ScriptedGateway::new();
    gateway.accounts = json!({"error": "not authenticated"});
    let provider = GatewayProvider::new(Arc::new(gateway), CacheLayer::disabled());

    let err = provider.ledger().await.expect_err("schema");

    assert_eq!(err.kind(), ProviderErrorKind::SchemaError);
}

#[tokio::test]
async fn http_gateway_client_drives_the_portal_endpoints() {
    // Given: the portal API scripted call by call
    let http = ScriptedHttpClient::responses([
        HttpResponse::ok_json(r#"[{"accountId":"U42"}]"#),
        HttpResponse::ok_json(r#"{"BASE":{"cashbalance":1000,"stockmarketvalue":500}}"#),
        HttpResponse::ok_json(r#"[{"contractDesc":"NVDA","position":10,"mktValue":500}]"#),
    ]);
    let engine = FetchEngine::new(Arc::new(http.clone()))
        .with_sleeper(Arc::new(RecordingSleeper::new()));
    let client = HttpGatewayClient::new(engine, "https://localhost:5000/v1/api");
    let provider = GatewayProvider::new(Arc::new(client), CacheLayer::disabled());

    // When
    let portfolio = provider.portfolio().await.expect("portfolio");

    // Then
    assert_eq!(portfolio.total_cash, 1000.0);
    assert_eq!(portfolio.positions["NVDA"].shares, 10.0);
    let urls: Vec<_> = http.requests().into_iter().map(|request| request.url).collect();
    assert_eq!(
        urls,
        [
            "https://localhost:5000/v1/api/portfolio/accounts",
            "https://localhost:5000/v1/api/portfolio/U42/ledger",
            "https://localhost:5000/v1/api/portfolio/U42/positions/0",
        ]
    );
}
