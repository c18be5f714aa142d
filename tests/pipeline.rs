//! End-to-end pipeline scenarios: crash-window redelivery, retry exhaustion,
//! and exposure gating across store, tailer, dispatcher and governor.

use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use rust_decimal_macros::dec;
use tokio::sync::watch;

use signal_relay::dispatch::{DispatchConfig, Handled, NotificationDispatcher};
use signal_relay::gateway::NotificationGateway;
use signal_relay::governor::{ExposureConfig, ExposureGovernor, Gate};
use signal_relay::models::{Pair, SignalData, SignalKind, Timeframe};
use signal_relay::store::{CheckpointStore, SignalLogStore};
use signal_relay::tailer::LogTailer;
use signal_relay::GatewayError;

/// Gateway that honors idempotency keys: every call is recorded, but a key
/// seen before produces no new user-visible notification.
#[derive(Default)]
struct IdempotentGateway {
    calls: Mutex<Vec<String>>,
    visible: Mutex<HashSet<String>>,
}

#[async_trait]
impl NotificationGateway for IdempotentGateway {
    async fn deliver(&self, key: &str, _message: &str) -> Result<(), GatewayError> {
        self.calls.lock().unwrap().push(key.to_string());
        self.visible.lock().unwrap().insert(key.to_string());
        Ok(())
    }
}

/// Gateway with a scripted outcome sequence, shared across "restarts".
struct ScriptedGateway {
    script: Mutex<Vec<Result<(), GatewayError>>>,
}

#[async_trait]
impl NotificationGateway for ScriptedGateway {
    async fn deliver(&self, _key: &str, _message: &str) -> Result<(), GatewayError> {
        let mut script = self.script.lock().unwrap();
        if script.is_empty() {
            Ok(())
        } else {
            script.remove(0)
        }
    }
}

fn data(symbol: &str, kind: SignalKind) -> SignalData {
    SignalData {
        symbol: symbol.to_string(),
        kind,
        entry_price: dec!(20050),
        timestamp: Utc::now(),
        note: None,
    }
}

fn fast_config() -> DispatchConfig {
    DispatchConfig {
        poll_interval_ms: 10,
        max_attempts: 4,
        initial_backoff_ms: 1,
        max_backoff_ms: 5,
        dedup_cache_size: 64,
    }
}

/// Scenario A: delivery confirmed but the process dies before the
/// checkpoint persists. After restart the record is redelivered exactly
/// once more and deduplicated by the idempotency key; the stream then
/// proceeds to the next record.
#[tokio::test]
async fn crash_between_delivery_and_checkpoint_is_safe() {
    let tmp = tempfile::tempdir().unwrap();
    let store = Arc::new(SignalLogStore::open(tmp.path().join("logs")).unwrap());
    let checkpoints = Arc::new(CheckpointStore::open(tmp.path().join("ckpt")).unwrap());
    let pair = Pair::new("supertrend", Timeframe::M5);
    let gateway = Arc::new(IdempotentGateway::default());

    let first = store
        .append(&pair, data("NIFTY", SignalKind::EntryLong))
        .await
        .unwrap();
    assert_eq!(first.sequence, 1);

    // First process life: seq 1 is delivered, then the process dies before
    // acknowledge() runs.
    {
        let mut tailer = LogTailer::resume(store.clone(), checkpoints.clone(), pair.clone());
        let mut dispatcher = NotificationDispatcher::new(gateway.clone(), fast_config());
        let batch = tailer.poll().unwrap();
        assert_eq!(dispatcher.handle(&batch[0]).await, Handled::Delivered);
        // no acknowledge: checkpoint stays at 0
    }

    let second = store
        .append(&pair, data("NIFTY", SignalKind::EntryShort))
        .await
        .unwrap();
    assert_eq!(second.sequence, 2);

    // Restart: fresh dispatcher (empty local cache), checkpoint still 0, so
    // seq 1 is redelivered; the gateway's idempotency key collapses it.
    let mut tailer = LogTailer::resume(store, checkpoints.clone(), pair.clone());
    let mut dispatcher = NotificationDispatcher::new(gateway.clone(), fast_config());
    for signal in tailer.poll().unwrap() {
        assert_eq!(dispatcher.handle(&signal).await, Handled::Delivered);
        tailer.acknowledge(signal.sequence).unwrap();
    }

    let calls = gateway.calls.lock().unwrap().clone();
    assert_eq!(calls.iter().filter(|k| **k == first.content_hash).count(), 2);
    assert_eq!(gateway.visible.lock().unwrap().len(), 2);
    assert_eq!(checkpoints.load(&pair), 2);
}

/// Scenario B: three transient failures then a fatal one abandon the
/// record; the checkpoint still advances and later records are unaffected.
#[tokio::test]
async fn abandoned_record_does_not_block_the_stream() {
    let tmp = tempfile::tempdir().unwrap();
    let store = Arc::new(SignalLogStore::open(tmp.path().join("logs")).unwrap());
    let checkpoints = Arc::new(CheckpointStore::open(tmp.path().join("ckpt")).unwrap());
    let pair = Pair::new("supertrend", Timeframe::M5);

    store.append(&pair, data("NIFTY", SignalKind::EntryLong)).await.unwrap();
    store.append(&pair, data("NIFTY", SignalKind::Exit)).await.unwrap();

    let gateway = Arc::new(ScriptedGateway {
        script: Mutex::new(vec![
            Err(GatewayError::Retryable("timeout".into())),
            Err(GatewayError::Retryable("timeout".into())),
            Err(GatewayError::Retryable("timeout".into())),
            Err(GatewayError::Fatal("rejected".into())),
            // seq 2 delivers cleanly
        ]),
    });

    let mut tailer = LogTailer::resume(store, checkpoints.clone(), pair.clone());
    let mut dispatcher = NotificationDispatcher::new(gateway, fast_config());

    let batch = tailer.poll().unwrap();
    assert_eq!(dispatcher.handle(&batch[0]).await, Handled::Abandoned);
    tailer.acknowledge(batch[0].sequence).unwrap();

    assert_eq!(dispatcher.handle(&batch[1]).await, Handled::Delivered);
    tailer.acknowledge(batch[1].sequence).unwrap();

    assert_eq!(checkpoints.load(&pair), 2);
}

/// Scenario C: exposure cap 1 denies new runs for the strategy while its
/// position is open, and allows them again after the matching EXIT.
#[tokio::test]
async fn exposure_cap_gates_until_exit() {
    let tmp = tempfile::tempdir().unwrap();
    let store = Arc::new(SignalLogStore::open(tmp.path().join("logs")).unwrap());
    let pair = Pair::new("straddle", Timeframe::M5);
    let governor = ExposureGovernor::new(
        store.clone(),
        ExposureConfig {
            max_open_per_strategy: 1,
            max_open_global: 10,
        },
    );

    assert_eq!(governor.can_run("straddle", "NIFTY").await, Gate::Allow);

    store.append(&pair, data("NIFTY", SignalKind::EntryLong)).await.unwrap();
    assert!(matches!(governor.can_run("straddle", "NIFTY").await, Gate::Deny(_)));

    store.append(&pair, data("NIFTY", SignalKind::Exit)).await.unwrap();
    assert_eq!(governor.can_run("straddle", "NIFTY").await, Gate::Allow);
}

/// The dispatcher run loop drains a growing log in order and stops cleanly
/// on shutdown with the checkpoint covering everything it handled.
#[tokio::test(start_paused = true)]
async fn dispatcher_loop_drains_and_shuts_down() {
    let tmp = tempfile::tempdir().unwrap();
    let store = Arc::new(SignalLogStore::open(tmp.path().join("logs")).unwrap());
    let checkpoints = Arc::new(CheckpointStore::open(tmp.path().join("ckpt")).unwrap());
    let pair = Pair::new("ma_crossover", Timeframe::M1);
    let gateway = Arc::new(IdempotentGateway::default());

    for _ in 0..3 {
        store.append(&pair, data("EURUSD", SignalKind::EntryLong)).await.unwrap();
    }

    let tailer = LogTailer::resume(store.clone(), checkpoints.clone(), pair.clone());
    let dispatcher = NotificationDispatcher::new(gateway.clone(), fast_config());
    let (tx, rx) = watch::channel(false);
    let handle = tokio::spawn(dispatcher.run(tailer, rx));

    tokio::time::sleep(Duration::from_millis(100)).await;
    store.append(&pair, data("EURUSD", SignalKind::Exit)).await.unwrap();
    tokio::time::sleep(Duration::from_millis(100)).await;

    tx.send(true).unwrap();
    handle.await.unwrap();

    assert_eq!(checkpoints.load(&pair), 4);
    assert_eq!(gateway.visible.lock().unwrap().len(), 4);
}
