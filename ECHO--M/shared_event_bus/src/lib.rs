#![deny(
    clippy::all,
    clippy::pedantic,
    clippy::nursery,
    missing_docs,
    rust_2018_idioms
)]

//! Ordered event records and publish/subscribe plumbing between the scheduler and its hosts.

use anyhow::Result;
use async_trait::async_trait;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::{fs::OpenOptions, io::AsyncWriteExt, sync::broadcast};
use uuid::Uuid;

/// Event record encoded as JSON.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRecord {
    /// Unique identifier.
    pub id: String,
    /// Component producing the event.
    pub source: String,
    /// Dotted event type, e.g. `cycle.step_changed`.
    pub event_type: String,
    /// RFC3339 timestamp.
    pub timestamp: String,
    /// Position in the producer's emission order. Buses carry it unchanged.
    #[serde(default)]
    pub sequence: u64,
    /// Arbitrary JSON payload.
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl EventRecord {
    /// Creates a record stamped with a fresh id and the current time.
    #[must_use]
    pub fn new(
        source: impl Into<String>,
        event_type: impl Into<String>,
        sequence: u64,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            id: format!("evt-{}", Uuid::new_v4()),
            source: source.into(),
            event_type: event_type.into(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            sequence,
            payload,
        }
    }
}

/// Event publisher interface.
#[async_trait]
pub trait EventPublisher: Send + Sync {
    /// Publishes an event. Events from one caller must be delivered in call order.
    async fn publish(&self, event: EventRecord) -> Result<()>;
}

/// Event subscriber interface.
#[async_trait]
pub trait EventSubscriber: Send + Sync {
    /// Returns a receiver for events published after this call.
    async fn subscribe(&self) -> Result<broadcast::Receiver<EventRecord>>;
}

/// In-memory broadcast bus with a bounded backlog of recent events.
///
/// Records keep the `sequence` their producer stamped. The backlog and every
/// subscriber see events in arrival order.
#[derive(Debug, Clone)]
pub struct MemoryEventBus {
    sender: broadcast::Sender<EventRecord>,
    backlog: Arc<Mutex<VecDeque<EventRecord>>>,
    capacity: usize,
}

impl MemoryEventBus {
    /// Creates a new bus retaining at most `capacity` events.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            backlog: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            capacity,
        }
    }

    /// Snapshot of the retained events, oldest first.
    #[must_use]
    pub fn snapshot(&self) -> Vec<EventRecord> {
        self.backlog.lock().iter().cloned().collect()
    }

    /// Retained events of one type, oldest first.
    #[must_use]
    pub fn events_of(&self, event_type: &str) -> Vec<EventRecord> {
        self.backlog
            .lock()
            .iter()
            .filter(|event| event.event_type == event_type)
            .cloned()
            .collect()
    }

    /// Drops the backlog.
    pub fn clear(&self) {
        self.backlog.lock().clear();
    }
}

#[async_trait]
impl EventPublisher for MemoryEventBus {
    async fn publish(&self, event: EventRecord) -> Result<()> {
        {
            let mut backlog = self.backlog.lock();
            backlog.push_back(event.clone());
            while backlog.len() > self.capacity {
                backlog.pop_front();
            }
        }
        // No subscribers is not an error.
        let _ = self.sender.send(event);
        Ok(())
    }
}

#[async_trait]
impl EventSubscriber for MemoryEventBus {
    async fn subscribe(&self) -> Result<broadcast::Receiver<EventRecord>> {
        Ok(self.sender.subscribe())
    }
}

/// File-backed publisher appending one JSON line per event.
#[derive(Debug, Clone)]
pub struct FileEventPublisher {
    path: PathBuf,
}

impl FileEventPublisher {
    /// Creates a publisher that appends JSON lines to the given path.
    pub fn new(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        Ok(Self { path })
    }

    /// Destination path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl EventPublisher for FileEventPublisher {
    async fn publish(&self, event: EventRecord) -> Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        let mut data = serde_json::to_vec(&event)?;
        data.push(b'\n');
        file.write_all(&data).await?;
        file.flush().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;
    use tokio::runtime::Runtime;

    fn step_event(step: u32) -> EventRecord {
        EventRecord::new(
            "scheduler",
            "cycle.step_changed",
            u64::from(step),
            serde_json::json!({ "old": step, "new": step + 1 }),
        )
    }

    #[test]
    fn publishes_and_receives_in_order() {
        let rt = Runtime::new().unwrap();
        rt.block_on(async {
            let bus = MemoryEventBus::new(16);
            let mut rx = bus.subscribe().await.unwrap();
            for step in 0..3 {
                bus.publish(step_event(step)).await.unwrap();
            }
            for expected in 0..3_u64 {
                let event = rx.recv().await.unwrap();
                assert_eq!(event.sequence, expected);
                assert_eq!(event.payload["old"], expected);
            }
        });
    }

    #[test]
    fn keeps_the_producer_sequence() {
        let rt = Runtime::new().unwrap();
        rt.block_on(async {
            let bus = MemoryEventBus::new(8);
            for step in [41, 7, 12] {
                bus.publish(step_event(step)).await.unwrap();
            }
            let sequences: Vec<u64> = bus.snapshot().iter().map(|e| e.sequence).collect();
            assert_eq!(sequences, vec![41, 7, 12]);
        });
    }

    #[test]
    fn backlog_is_bounded() {
        let rt = Runtime::new().unwrap();
        rt.block_on(async {
            let bus = MemoryEventBus::new(4);
            for step in 0..10 {
                bus.publish(step_event(step)).await.unwrap();
            }
            let retained = bus.snapshot();
            assert_eq!(retained.len(), 4);
            assert_eq!(retained[0].sequence, 6);
            assert_eq!(retained[3].sequence, 9);
            bus.clear();
            assert!(bus.snapshot().is_empty());
        });
    }

    #[test]
    fn filters_by_type() {
        let rt = Runtime::new().unwrap();
        rt.block_on(async {
            let bus = MemoryEventBus::new(8);
            bus.publish(step_event(0)).await.unwrap();
            bus.publish(EventRecord::new(
                "scheduler",
                "cycle.cycle_completed",
                0,
                serde_json::json!({ "cycle_count": 1 }),
            ))
            .await
            .unwrap();
            assert_eq!(bus.events_of("cycle.cycle_completed").len(), 1);
            assert_eq!(bus.events_of("cycle.step_changed").len(), 1);
        });
    }

    #[test]
    fn file_publisher_writes_events() {
        let rt = Runtime::new().unwrap();
        rt.block_on(async {
            let dir = tempdir().unwrap();
            let path = dir.path().join("events/cycle.jsonl");
            let publisher = FileEventPublisher::new(&path).unwrap();
            publisher.publish(step_event(0)).await.unwrap();
            publisher.publish(step_event(1)).await.unwrap();
            let content = std::fs::read_to_string(path).unwrap();
            assert_eq!(content.lines().count(), 2);
            assert!(content.contains("cycle.step_changed"));
        });
    }
}
