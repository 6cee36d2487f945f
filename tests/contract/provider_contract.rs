#[path = "../common/mod.rs"]
mod common;

use std::sync::Arc;

use common::ScriptedGateway;
use hedgefeed_core::{
    CacheLayer, Capability, CompanyNewsRequest, DataProvider, FetchEngine,
    FinancialMetricsRequest, GatewayProvider, InsiderTradesRequest, LineItemsRequest,
    MarketCapRequest, PriceRequest, ProviderError, ProviderErrorKind, ProviderId, RestProvider,
    ScriptedHttpClient,
};

struct ProviderCase {
    id: ProviderId,
    provider: Arc<dyn DataProvider>,
    supported: &'static [Capability],
}

fn provider_cases(http: &ScriptedHttpClient, gateway: &Arc<ScriptedGateway>) -> Vec<ProviderCase> {
    let engine = FetchEngine::new(Arc::new(http.clone()));
    vec![
        ProviderCase {
            id: ProviderId::FinancialDatasets,
            provider: Arc::new(RestProvider::new(engine, CacheLayer::disabled())),
            supported: &[
                Capability::FinancialMetrics,
                Capability::Prices,
                Capability::SearchLineItems,
                Capability::InsiderTrades,
                Capability::CompanyNews,
                Capability::MarketCap,
            ],
        },
        ProviderCase {
            id: ProviderId::IbkrGateway,
            provider: Arc::new(GatewayProvider::new(gateway.clone(), CacheLayer::disabled())),
            supported: &[
                Capability::Prices,
                Capability::Portfolio,
                Capability::Positions,
                Capability::Ledger,
            ],
        },
    ]
}

async fn invoke(provider: &dyn DataProvider, capability: Capability) -> Result<(), ProviderError> {
    match capability {
        Capability::FinancialMetrics => provider
            .financial_metrics(FinancialMetricsRequest::new("AAPL", "2024-03-01")?)
            .await
            .map(drop),
        Capability::Prices => provider
            .prices(PriceRequest::new("AAPL", "2024-01-01", "2024-03-01")?)
            .await
            .map(drop),
        Capability::SearchLineItems => provider
            .search_line_items(LineItemsRequest::new(["AAPL"], ["revenue"], "2024-03-01")?)
            .await
            .map(drop),
        Capability::InsiderTrades => provider
            .insider_trades(InsiderTradesRequest::new("AAPL", "2024-03-01", None)?)
            .await
            .map(drop),
        Capability::CompanyNews => provider
            .company_news(CompanyNewsRequest::new("AAPL", Some("2024-03-01"), None)?)
            .await
            .map(drop),
        Capability::MarketCap => provider
            .market_cap(MarketCapRequest::new("AAPL", "2024-03-01")?)
            .await
            .map(drop),
        Capability::Portfolio => provider.portfolio().await.map(drop),
        Capability::Positions => provider.positions().await.map(drop),
        Capability::Ledger => provider.ledger().await.map(drop),
    }
}

#[test]
fn every_provider_declares_its_capabilities() {
    let http = ScriptedHttpClient::default();
    let gateway = Arc::new(ScriptedGateway::new());

    for case in provider_cases(&http, &gateway) {
        assert_eq!(case.provider.id(), case.id);
        assert_eq!(case.provider.capabilities().supported(), case.supported.to_vec());
    }
}

#[tokio::test]
async fn unsupported_capabilities_fail_without_io() {
    // Given: both providers over transports that record every call
    let http = ScriptedHttpClient::default();
    let gateway = Arc::new(ScriptedGateway::new());

    for case in provider_cases(&http, &gateway) {
        for capability in Capability::ALL {
            if case.supported.contains(&capability) {
                continue;
            }

            // When: a capability outside the provider's set is invoked
            let err = invoke(case.provider.as_ref(), capability)
                .await
                .expect_err("unsupported capability must fail");

            // Then: the error names provider and capability
            assert_eq!(err.kind(), ProviderErrorKind::UnsupportedCapability);
            assert!(err.message().contains(capability.as_str()));
            assert!(err.message().contains(case.id.as_str()));
            assert!(!err.retryable());
            assert!(case.provider.ensure_supported(capability).is_err());
        }
    }

    // And: nothing reached either backend
    assert_eq!(http.request_count(), 0);
    assert!(gateway.calls().is_empty());
}

#[tokio::test]
async fn invalid_input_is_rejected_before_any_request() {
    let err = PriceRequest::new("AAPL", "01/02/2024", "2024-03-01").expect_err("bad date");
    assert_eq!(err.kind(), ProviderErrorKind::InvalidInput);

    let err = CompanyNewsRequest::new("", Some("2024-03-01"), None).expect_err("empty ticker");
    assert_eq!(err.kind(), ProviderErrorKind::InvalidInput);
}
