//! Lifecycle telemetry collector.
//!
//! The collector fans delegate lifecycle events out to async subscribers
//! through a broadcast channel and keeps a bounded history for snapshots.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{SystemTime, UNIX_EPOCH};

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

use crate::config::TelemetryConfig;

pub mod events;

pub use events::{EngineSource, LifecycleEvent};

/// Global collector shared by runtimes that are not given their own.
static HUB: Lazy<Arc<TelemetryCollector>> = Lazy::new(|| Arc::new(TelemetryCollector::default()));

/// Access the global telemetry collector.
pub fn hub() -> Arc<TelemetryCollector> {
    Arc::clone(&HUB)
}

/// One published event with its position in the stream.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TelemetryRecord {
    pub sequence: u64,
    pub timestamp_ms: u64,
    pub event: LifecycleEvent,
}

/// Snapshot of collector state for CLI reporting.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TelemetrySnapshot {
    pub recent: Vec<TelemetryRecord>,
    pub total_events: u64,
    pub dropped_events: u64,
}

impl TelemetrySnapshot {
    /// Events only, oldest first.
    pub fn events(&self) -> Vec<LifecycleEvent> {
        self.recent.iter().map(|record| record.event.clone()).collect()
    }
}

/// Broadcast-based collector retaining a bounded history of events.
pub struct TelemetryCollector {
    tx: broadcast::Sender<TelemetryRecord>,
    history: Mutex<VecDeque<TelemetryRecord>>,
    history_capacity: usize,
    total_events: AtomicU64,
    dropped_history: AtomicU64,
}

impl TelemetryCollector {
    pub fn new(buffer: usize, history_capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(buffer.max(1));
        Self {
            tx,
            history: Mutex::new(VecDeque::with_capacity(history_capacity)),
            history_capacity,
            total_events: AtomicU64::new(0),
            dropped_history: AtomicU64::new(0),
        }
    }

    pub fn from_config(config: &TelemetryConfig) -> Self {
        Self::new(config.channel_capacity, config.history_capacity)
    }

    pub fn publish(&self, event: LifecycleEvent) {
        let sequence = self.total_events.fetch_add(1, Ordering::Relaxed);
        let record = TelemetryRecord {
            sequence,
            timestamp_ms: now_timestamp_ms(),
            event,
        };
        log::trace!("[Telemetry] {} #{}", record.event.kind(), sequence);

        {
            let mut history = self.lock_history();
            if self.history_capacity == 0 {
                self.dropped_history.fetch_add(1, Ordering::Relaxed);
            } else {
                if history.len() == self.history_capacity {
                    history.pop_front();
                    self.dropped_history.fetch_add(1, Ordering::Relaxed);
                }
                history.push_back(record.clone());
            }
        }

        let _ = self.tx.send(record);
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TelemetryRecord> {
        self.tx.subscribe()
    }

    /// Subscribe as a `Stream`; lagged receivers yield an error item.
    pub fn stream(&self) -> BroadcastStream<TelemetryRecord> {
        BroadcastStream::new(self.tx.subscribe())
    }

    pub fn snapshot(&self) -> TelemetrySnapshot {
        let history = self.lock_history();
        TelemetrySnapshot {
            recent: history.iter().cloned().collect(),
            total_events: self.total_events.load(Ordering::Relaxed),
            dropped_events: self.dropped_history.load(Ordering::Relaxed),
        }
    }

    // History entries are plain data, a poisoned lock still holds a valid queue.
    fn lock_history(&self) -> MutexGuard<'_, VecDeque<TelemetryRecord>> {
        self.history
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for TelemetryCollector {
    fn default() -> Self {
        Self::from_config(&TelemetryConfig::default())
    }
}

fn now_timestamp_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::EngineId;

    fn detached(host: &str) -> LifecycleEvent {
        LifecycleEvent::HostDetached {
            host: host.to_string(),
            engine: EngineId::new(7),
        }
    }

    #[test]
    fn collector_preserves_order_within_history() {
        let collector = TelemetryCollector::new(8, 3);
        collector.publish(detached("a"));
        collector.publish(detached("b"));
        collector.publish(LifecycleEvent::ForwardingSkipped {
            host: "c".to_string(),
            operation: "back_pressed".to_string(),
        });

        let snapshot = collector.snapshot();
        assert_eq!(snapshot.recent.len(), 3);
        assert_eq!(snapshot.recent[0].sequence, 0);
        assert_eq!(snapshot.recent[0].event, detached("a"));
        assert!(matches!(
            snapshot.recent[2].event,
            LifecycleEvent::ForwardingSkipped { .. }
        ));
    }

    #[test]
    fn collector_drops_history_when_full() {
        let collector = TelemetryCollector::new(8, 2);
        collector.publish(detached("a"));
        collector.publish(detached("b"));
        collector.publish(detached("c"));

        let snapshot = collector.snapshot();
        assert_eq!(snapshot.recent.len(), 2);
        assert_eq!(snapshot.total_events, 3);
        assert_eq!(snapshot.dropped_events, 1);
        assert_eq!(snapshot.events(), vec![detached("b"), detached("c")]);
    }

    #[test]
    fn subscribers_receive_published_records() {
        let collector = TelemetryCollector::new(8, 8);
        let mut rx = collector.subscribe();
        collector.publish(detached("a"));

        let record = rx.try_recv().unwrap();
        assert_eq!(record.event, detached("a"));
    }

    #[test]
    fn events_serialize_with_type_tag() {
        let json = serde_json::to_value(detached("a")).unwrap();
        assert_eq!(json["type"], "host_detached");
        assert_eq!(json["payload"]["host"], "a");
    }

    #[test]
    fn global_hub_is_shared() {
        assert!(Arc::ptr_eq(&hub(), &hub()));
    }
}
