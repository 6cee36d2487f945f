//! Concrete [`DataProvider`](crate::DataProvider) implementations.

pub mod gateway;
pub mod gateway_client;
pub mod rest;

pub use gateway::{GatewayClient, GatewayFuture, GatewayProvider, HistoryRequest};
pub use gateway_client::{HttpGatewayClient, DEFAULT_GATEWAY_URL};
pub use rest::{RestProvider, DEFAULT_BASE_URL, DEFAULT_PAGE_DELAY};
