//! Signal-driven options order orchestration.
//!
//! Intents arrive as fields on a per-owner hash in the coordination store.
//! This crate claims them exactly once, executes their legs buy-before-sell,
//! arms edge-triggered level watchers that release staged intents, and runs
//! open-interest crossover auto-trading with exit-before-entry reconciliation.
//! Every component is a polling [`actor::Actor`]; they share state only
//! through the store.

pub mod actor;
pub mod channel;
pub mod crossover;
pub mod dispatcher;
pub mod ledger;
pub mod notify;
pub mod sequencer;
pub mod service;
pub mod squareoff;
pub mod types;
pub mod watcher;

pub use actor::{run_actor, Actor};
pub use channel::{ChannelKeys, Claim, RequestChannel, Terminal};
pub use crossover::{CrossoverProfile, CrossoverReconciler, ExitTiming, SignalEngine, SignalTick};
pub use dispatcher::Dispatcher;
pub use ledger::{LedgerError, PositionLedger};
pub use notify::{notify_quietly, sink_from_config, LogSink, WebhookSink};
pub use sequencer::{LegResult, LegSequencer, SequenceReport};
pub use service::{build_actors, Collaborators, Service};
pub use squareoff::{SquareOffDesk, SquareOffTick};
pub use types::{CrossoverOrder, EquityOrder, Outcome, Position, SquareOffLeg};
pub use watcher::{BreakdownWatcher, BreakoutWatcher, EdgeCondition, Falling, LevelWatcher, Rising};
