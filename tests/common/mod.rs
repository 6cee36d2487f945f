//! Shared doubles for the behaviour tests.

#![allow(dead_code)]

use std::sync::{Arc, Mutex};

use hedgefeed_core::adapters::GatewayFuture;
use hedgefeed_core::{
    CacheLayer, FetchEngine, GatewayClient, HistoryRequest, HttpResponse, ProviderError,
    RecordingSleeper, RestProvider, ScriptedHttpClient,
};
use serde_json::Value;

/// Gateway double answering every call from fixed JSON and logging calls.
#[derive(Default)]
pub struct ScriptedGateway {
    pub accounts: Value,
    pub ledger: Value,
    pub positions: Value,
    pub history: Value,
    calls: Mutex<Vec<String>>,
}

impl ScriptedGateway {
    pub fn new() -> Self {
        Self {
            accounts: serde_json::json!([{"accountId": "U1234567"}]),
            ..Self::default()
        }
    }

    pub fn with_ledger(mut self, ledger: Value) -> Self {
        self.ledger = ledger;
        self
    }

    pub fn with_positions(mut self, positions: Value) -> Self {
        self.positions = positions;
        self
    }

    pub fn with_history(mut self, history: Value) -> Self {
        self.history = history;
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().map(|calls| calls.clone()).unwrap_or_default()
    }

    fn answer<'a>(&'a self, call: String, value: &Value) -> GatewayFuture<'a> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(call);
        }
        let value = value.clone();
        Box::pin(async move { Ok::<Value, ProviderError>(value) })
    }
}

impl GatewayClient for ScriptedGateway {
    fn portfolio_accounts<'a>(&'a self) -> GatewayFuture<'a> {
        self.answer(String::from("accounts"), &self.accounts)
    }

    fn ledger<'a>(&'a self, account_id: &'a str) -> GatewayFuture<'a> {
        self.answer(format!("ledger:{account_id}"), &self.ledger)
    }

    fn positions<'a>(&'a self, account_id: &'a str) -> GatewayFuture<'a> {
        self.answer(format!("positions:{account_id}"), &self.positions)
    }

    fn history_by_symbol<'a>(&'a self, request: HistoryRequest) -> GatewayFuture<'a> {
        self.answer(
            format!("history:{}:{}", request.symbol, request.period),
            &self.history,
        )
    }
}

/// REST provider over a scripted transport and a recording sleeper.
pub fn rest_provider(
    responses: impl IntoIterator<Item = HttpResponse>,
    cache: CacheLayer,
) -> (RestProvider, ScriptedHttpClient, RecordingSleeper) {
    let http = ScriptedHttpClient::responses(responses);
    let sleeper = RecordingSleeper::new();
    let engine =
        FetchEngine::new(Arc::new(http.clone())).with_sleeper(Arc::new(sleeper.clone()));
    let provider = RestProvider::new(engine, cache).with_base_url("https://api.test");
    (provider, http, sleeper)
}

pub fn json_page(field: &str, records: Vec<Value>) -> HttpResponse {
    let mut body = serde_json::Map::new();
    body.insert(field.to_owned(), Value::Array(records));
    HttpResponse::ok_json(Value::Object(body).to_string())
}
