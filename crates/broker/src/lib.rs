//! Broker execution gateway for index options.
//!
//! Defines the order shapes the engine sends, the [`BrokerGateway`] seam a
//! live brokerage client implements, a [`SessionGate`] that refuses orders on
//! a dead login, and a [`PaperBroker`] for dry runs and tests.

pub mod gateway;
pub mod paper;
pub mod types;

pub use gateway::{BrokerGateway, GatewayError, SessionGate};
pub use paper::{PaperBroker, PaperOrder};
pub use types::{OrderAck, OrderRequest, OrderType, Product, Segment, SessionState};
