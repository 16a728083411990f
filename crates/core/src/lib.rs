//! Shared foundation for the options order desk.
//!
//! Holds the wire-level domain types, the collaborator traits the engine is
//! written against (coordination store, instrument resolver, notification
//! sink), an in-memory store, and configuration loading.

pub mod alert;
pub mod config;
pub mod config_loader;
pub mod error;
pub mod resolver;
pub mod store;
pub mod traits;
pub mod types;

pub use alert::Alert;
pub use config::{AppConfig, CrossoverProfileConfig, EngineConfig, LedgerConfig, NotifierConfig};
pub use config_loader::ConfigLoader;
pub use error::{EngineError, NotifyError, StoreError};
pub use resolver::StoreResolver;
pub use store::MemoryStore;
pub use traits::{CoordinationStore, InstrumentResolver, NotificationSink};
pub use types::{
    Direction, ExecutionType, InstrumentIndex, IntentStatus, Leg, LegKey, OptionType,
    RequestFlag, Side, Signal, SignalStatus,
};
