//! Polling actors.
//!
//! Every component runs as its own loop on a fixed interval and talks to the
//! others only through the coordination store.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use optdesk_core::EngineError;

use crate::crossover::{CrossoverReconciler, SignalEngine, SignalTick};
use crate::dispatcher::Dispatcher;
use crate::watcher::{EdgeCondition, LevelWatcher, TickOutcome};

#[async_trait]
pub trait Actor: Send + Sync {
    fn name(&self) -> String;

    /// One polling step. Errors are logged by [`run_actor`]; store errors
    /// additionally back off.
    async fn tick(&self) -> Result<(), EngineError>;
}

#[async_trait]
impl Actor for Dispatcher {
    fn name(&self) -> String {
        format!("dispatcher:{}", self.owner())
    }

    async fn tick(&self) -> Result<(), EngineError> {
        for (channel, outcome) in Dispatcher::tick(self).await? {
            debug!(%channel, status = %outcome.status, "Dispatched");
        }
        Ok(())
    }
}

#[async_trait]
impl<E: EdgeCondition> Actor for LevelWatcher<E> {
    fn name(&self) -> String {
        format!("watcher:{}", E::NAME)
    }

    async fn tick(&self) -> Result<(), EngineError> {
        if let TickOutcome::Triggered { previous, spot } = LevelWatcher::tick(self).await? {
            debug!(watcher = E::NAME, %previous, %spot, "Watcher fired");
        }
        Ok(())
    }
}

#[async_trait]
impl Actor for SignalEngine {
    fn name(&self) -> String {
        format!("signal:{}", self.profile().index)
    }

    async fn tick(&self) -> Result<(), EngineError> {
        if let SignalTick::Published { id, .. } = SignalEngine::tick(self).await? {
            debug!(index = %self.profile().index, %id, "Entry handed to reconciler");
        }
        Ok(())
    }
}

#[async_trait]
impl Actor for CrossoverReconciler {
    fn name(&self) -> String {
        format!("reconciler:{}", self.profile().index)
    }

    async fn tick(&self) -> Result<(), EngineError> {
        CrossoverReconciler::tick(self).await?;
        Ok(())
    }
}

/// Ticks `actor` every `every` until `shutdown` flips to true or its sender
/// is dropped. A store failure delays the next tick by `backoff`.
pub async fn run_actor(
    actor: Arc<dyn Actor>,
    every: Duration,
    backoff: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let name = actor.name();
    info!(actor = %name, every_ms = every.as_millis() as u64, "Actor started");

    let mut interval = tokio::time::interval(every);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        let signalled = tokio::select! {
            _ = interval.tick() => None,
            changed = shutdown.changed() => Some(changed.is_ok()),
        };
        match signalled {
            Some(false) => break,
            Some(true) if *shutdown.borrow() => break,
            Some(true) => continue,
            None => {}
        }

        match actor.tick().await {
            Ok(()) => {}
            Err(e) if e.is_store() => {
                error!(actor = %name, error = %e, backoff_ms = backoff.as_millis() as u64, "Store unavailable, backing off");
                let sender_alive = tokio::select! {
                    () = tokio::time::sleep(backoff) => true,
                    changed = shutdown.changed() => changed.is_ok(),
                };
                if !sender_alive || *shutdown.borrow() {
                    break;
                }
            }
            Err(e) => warn!(actor = %name, error = %e, "Tick failed"),
        }
    }

    info!(actor = %name, "Actor stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use optdesk_core::StoreError;

    struct Counting {
        ticks: Mutex<u32>,
        fail_with_store: bool,
    }

    #[async_trait]
    impl Actor for Counting {
        fn name(&self) -> String {
            "counting".to_string()
        }

        async fn tick(&self) -> Result<(), EngineError> {
            *self.ticks.lock() += 1;
            if self.fail_with_store {
                return Err(StoreError::Unavailable("down".to_string()).into());
            }
            Err(EngineError::validation("bad reading"))
        }
    }

    #[tokio::test]
    async fn test_errors_do_not_stop_the_loop() {
        let actor = Arc::new(Counting {
            ticks: Mutex::new(0),
            fail_with_store: false,
        });
        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(run_actor(
            actor.clone(),
            Duration::from_millis(10),
            Duration::from_secs(60),
            rx,
        ));

        tokio::time::sleep(Duration::from_millis(80)).await;
        tx.send(true).unwrap();
        handle.await.unwrap();

        assert!(*actor.ticks.lock() >= 3);
    }

    #[tokio::test]
    async fn test_store_errors_back_off() {
        let actor = Arc::new(Counting {
            ticks: Mutex::new(0),
            fail_with_store: true,
        });
        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(run_actor(
            actor.clone(),
            Duration::from_millis(5),
            Duration::from_secs(60),
            rx,
        ));

        tokio::time::sleep(Duration::from_millis(60)).await;
        tx.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();

        assert_eq!(*actor.ticks.lock(), 1);
    }
}
