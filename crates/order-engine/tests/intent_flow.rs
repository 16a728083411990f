//! End-to-end intent handling through the spawned actor set.

use std::sync::Arc;
use std::time::Duration;

use chrono::NaiveDate;
use rust_decimal_macros::dec;

use optdesk_broker::PaperBroker;
use optdesk_core::{
    AppConfig, CoordinationStore, ExecutionType, InstrumentIndex, Leg, MemoryStore, OptionType,
    Side,
};
use optdesk_order_engine::{
    BreakoutWatcher, ChannelKeys, Collaborators, LogSink, PositionLedger, RequestChannel, Service,
};

const OWNER: &str = "AB1234";

fn expiry() -> NaiveDate {
    NaiveDate::from_ymd_opt(2026, 1, 27).unwrap()
}

async fn wait_for(store: &MemoryStore, field: &str, expected: &str) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(3);
    loop {
        if store.hget(OWNER, field).await.unwrap().as_deref() == Some(expected) {
            return;
        }
        assert!(
            tokio::time::Instant::now() < deadline,
            "{field} never became {expected}"
        );
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

fn fast_config() -> AppConfig {
    let mut config = AppConfig::default();
    config.engine.owner = OWNER.to_string();
    config.engine.poll_interval_ms = 10;
    config.engine.settle_delay_ms = 0;
    config
}

#[tokio::test]
async fn test_leg_list_survives_the_store() {
    let store = Arc::new(MemoryStore::new());
    let multi = RequestChannel::new(store.clone(), OWNER, ChannelKeys::multi());

    let mut limit = Leg::market(
        InstrumentIndex::BankNifty,
        expiry(),
        OptionType::Put,
        dec!(55000),
        Side::Buy,
        25,
    );
    limit.execution_type = ExecutionType::Limit;
    limit.limit_price = Some(dec!(112.35));
    let mut carried = Leg::market(
        InstrumentIndex::Nifty,
        expiry(),
        OptionType::Call,
        dec!(26150),
        Side::Sell,
        75,
    );
    carried.resolved_symbol = Some("NIFTY26JAN26150CE".to_string());
    let legs = vec![carried, limit];

    multi.submit(&serde_json::to_string(&legs).unwrap()).await.unwrap();
    let claim = multi.claim().await.unwrap().unwrap();
    let decoded: Vec<Leg> = serde_json::from_str(claim.payload.as_deref().unwrap()).unwrap();

    assert_eq!(decoded, legs);
}

#[tokio::test]
async fn test_breakout_fires_through_running_service() {
    let store = Arc::new(MemoryStore::new());
    store
        .hset("INSTR_OPT", "NIFTY_2026-01-27_CE_26000", "NIFTY26JAN26000CE")
        .await
        .unwrap();
    store
        .hset("INSTR_OPT", "NIFTY_2026-01-27_CE_26200", "NIFTY26JAN26200CE")
        .await
        .unwrap();
    let broker = Arc::new(PaperBroker::new());
    let parts = Collaborators {
        store: store.clone(),
        broker: broker.clone(),
        notifier: Arc::new(LogSink),
        ledger: Arc::new(PositionLedger::in_memory()),
    };
    let config = fast_config();

    let service = Service::spawn(&config, &parts);
    assert_eq!(service.actor_names().len(), 7);

    store.set("NF_SPOT", "25990").await.unwrap();
    let watcher = BreakoutWatcher::new(store.clone(), OWNER, Arc::new(LogSink));
    watcher
        .arm(
            dec!(26000),
            InstrumentIndex::Nifty,
            &[
                Leg::market(InstrumentIndex::Nifty, expiry(), OptionType::Call, dec!(26000), Side::Sell, 75),
                Leg::market(InstrumentIndex::Nifty, expiry(), OptionType::Call, dec!(26200), Side::Buy, 75),
            ],
        )
        .await
        .unwrap();
    wait_for(&store, "LEVEL_CE_PREV_SPOT", "25990").await;
    assert!(broker.orders().is_empty());

    store.set("NF_SPOT", "26010").await.unwrap();
    wait_for(&store, "STATUS_LEVEL_CE", "SUCCESS").await;
    service.shutdown().await;

    let placed: Vec<_> = broker
        .orders()
        .into_iter()
        .map(|o| (o.request.side, o.request.symbol))
        .collect();
    assert_eq!(
        placed,
        vec![
            (Side::Buy, "NIFTY26JAN26200CE".to_string()),
            (Side::Sell, "NIFTY26JAN26000CE".to_string()),
        ]
    );
    assert!(store.hget(OWNER, "LEVEL_CE_TRIGGER").await.unwrap().is_none());
    assert!(store.hget(OWNER, "LEVEL_CE").await.unwrap().is_none());
    assert_eq!(
        store.hget(OWNER, "OI_ENGINE_STATUS").await.unwrap().as_deref(),
        Some("IDLE")
    );
}

#[tokio::test]
async fn test_service_stops_on_shutdown() {
    let store = Arc::new(MemoryStore::new());
    let parts = Collaborators {
        store,
        broker: Arc::new(PaperBroker::new()),
        notifier: Arc::new(LogSink),
        ledger: Arc::new(PositionLedger::in_memory()),
    };

    let service = Service::spawn(&fast_config(), &parts);
    tokio::time::timeout(Duration::from_secs(2), service.shutdown())
        .await
        .unwrap();
}
