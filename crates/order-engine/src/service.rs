//! Wires the actor set for one owner and runs it until shutdown.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{error, info};

use optdesk_broker::{BrokerGateway, SessionGate};
use optdesk_core::{AppConfig, CoordinationStore, NotificationSink, StoreResolver};

use crate::actor::{run_actor, Actor};
use crate::crossover::{CrossoverProfile, CrossoverReconciler, ExitTiming, SignalEngine};
use crate::dispatcher::Dispatcher;
use crate::ledger::PositionLedger;
use crate::sequencer::LegSequencer;
use crate::watcher::{BreakdownWatcher, BreakoutWatcher};

/// External collaborators the engine runs against.
#[derive(Clone)]
pub struct Collaborators {
    pub store: Arc<dyn CoordinationStore>,
    pub broker: Arc<dyn BrokerGateway>,
    pub notifier: Arc<dyn NotificationSink>,
    pub ledger: Arc<PositionLedger>,
}

/// Builds every actor described by `config`: the dispatcher, both level
/// watchers, and a signal engine plus reconciler per crossover profile.
#[must_use]
pub fn build_actors(config: &AppConfig, parts: &Collaborators) -> Vec<Arc<dyn Actor>> {
    let engine = &config.engine;
    let owner = engine.owner.as_str();
    let gate = SessionGate::new(parts.broker.clone());
    let resolver = Arc::new(StoreResolver::new(
        parts.store.clone(),
        engine.instrument_hash.clone(),
    ));
    let sequencer = Arc::new(LegSequencer::new(
        resolver,
        gate.clone(),
        parts.notifier.clone(),
        engine.settle_delay(),
    ));
    let timing = ExitTiming {
        timeout: engine.exit_timeout(),
        poll: engine.exit_poll(),
    };

    let mut actors: Vec<Arc<dyn Actor>> = vec![
        Arc::new(Dispatcher::new(
            parts.store.clone(),
            owner,
            sequencer.clone(),
            gate,
            parts.notifier.clone(),
        )),
        Arc::new(BreakoutWatcher::new(
            parts.store.clone(),
            owner,
            parts.notifier.clone(),
        )),
        Arc::new(BreakdownWatcher::new(
            parts.store.clone(),
            owner,
            parts.notifier.clone(),
        )),
    ];

    for profile in config.crossover.iter().cloned().map(CrossoverProfile::from) {
        actors.push(Arc::new(SignalEngine::new(
            profile.clone(),
            parts.store.clone(),
            owner,
        )));
        actors.push(Arc::new(CrossoverReconciler::new(
            profile,
            parts.store.clone(),
            owner,
            parts.ledger.clone(),
            sequencer.clone(),
            parts.notifier.clone(),
            timing,
        )));
    }

    actors
}

/// Running actor tasks plus the shutdown switch.
pub struct Service {
    shutdown: watch::Sender<bool>,
    handles: Vec<(String, JoinHandle<()>)>,
}

impl Service {
    /// Spawns one task per actor on the current runtime.
    #[must_use]
    pub fn spawn(config: &AppConfig, parts: &Collaborators) -> Self {
        let (shutdown, rx) = watch::channel(false);
        let every = config.engine.poll_interval();
        let backoff = config.engine.error_backoff();

        let handles: Vec<_> = build_actors(config, parts)
            .into_iter()
            .map(|actor| {
                let name = actor.name();
                let handle = tokio::spawn(run_actor(actor, every, backoff, rx.clone()));
                (name, handle)
            })
            .collect();

        info!(
            owner = %config.engine.owner,
            actors = handles.len(),
            poll_ms = every.as_millis() as u64,
            "Order engine started"
        );
        Self { shutdown, handles }
    }

    #[must_use]
    pub fn actor_names(&self) -> Vec<&str> {
        self.handles.iter().map(|(name, _)| name.as_str()).collect()
    }

    /// Signals every actor to stop and waits for them. An in-flight tick
    /// finishes first.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        for (name, handle) in self.handles {
            if let Err(e) = handle.await {
                error!(actor = %name, error = %e, "Actor task ended abnormally");
            }
        }
        info!("Order engine stopped");
    }
}
