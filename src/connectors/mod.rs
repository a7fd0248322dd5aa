// src/connectors/mod.rs
pub mod bybit;
pub mod gateway;
pub mod messages;
pub mod traits;

pub use bybit::SignedRequestClient;
pub use gateway::BybitGateway;
pub use traits::{ExchangeGateway, RestTransport};
