use std::{
    fmt,
    path::PathBuf,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};

use anyhow::{anyhow, Result};
use serde_json::Value;
use shared_event_bus::{EventPublisher, EventRecord};
use shared_logging::{JsonLogger, LogLevel, LogRecord, LogSink};
use tokio::{
    runtime::{Handle, Runtime},
    sync::{mpsc, oneshot},
};

use crate::events::CycleEvent;

/// Builder for scheduler telemetry sinks.
pub struct SchedulerTelemetryBuilder {
    module: String,
    log_path: Option<PathBuf>,
    log_sink: Option<Arc<dyn LogSink>>,
    event_publisher: Option<Arc<dyn EventPublisher>>,
    min_level: LogLevel,
}

impl SchedulerTelemetryBuilder {
    /// Creates the builder.
    #[must_use]
    pub fn new(module: impl Into<String>) -> Self {
        Self {
            module: module.into(),
            log_path: None,
            log_sink: None,
            event_publisher: None,
            min_level: LogLevel::Info,
        }
    }

    /// Writes logs as JSON lines to `path`.
    #[must_use]
    pub fn log_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_path = Some(path.into());
        self
    }

    /// Sends logs to an existing sink instead of a file.
    #[must_use]
    pub fn log_sink(mut self, sink: Arc<dyn LogSink>) -> Self {
        self.log_sink = Some(sink);
        self
    }

    /// Sets the event publisher.
    #[must_use]
    pub fn event_publisher(mut self, publisher: Arc<dyn EventPublisher>) -> Self {
        self.event_publisher = Some(publisher);
        self
    }

    /// Drops log records below `level`. Defaults to `Info`.
    #[must_use]
    pub fn min_level(mut self, level: LogLevel) -> Self {
        self.min_level = level;
        self
    }

    /// Builds the telemetry handle.
    pub fn build(self) -> Result<SchedulerTelemetry> {
        let logger: Option<Arc<dyn LogSink>> = match (self.log_sink, self.log_path) {
            (Some(sink), _) => Some(sink),
            (None, Some(path)) => Some(Arc::new(JsonLogger::new(path)?)),
            (None, None) => None,
        };
        let event = self.event_publisher.map(EventHandle::new).transpose()?;
        Ok(SchedulerTelemetry {
            inner: Arc::new(TelemetryInner {
                module: self.module,
                min_level: self.min_level,
                logger,
                event,
                sequence: AtomicU64::new(0),
            }),
        })
    }
}

/// Telemetry handle attached to a scheduler.
#[derive(Clone)]
pub struct SchedulerTelemetry {
    inner: Arc<TelemetryInner>,
}

impl fmt::Debug for SchedulerTelemetry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SchedulerTelemetry")
            .field("module", &self.inner.module)
            .field("min_level", &self.inner.min_level)
            .finish()
    }
}

struct TelemetryInner {
    module: String,
    min_level: LogLevel,
    logger: Option<Arc<dyn LogSink>>,
    event: Option<EventHandle>,
    sequence: AtomicU64,
}

enum Forward {
    Record(EventRecord),
    Flush(oneshot::Sender<()>),
}

/// Owns one forwarding task on a private runtime. Records go through a single
/// channel, so the publisher sees them in emission order from any calling context.
struct EventHandle {
    sender: mpsc::UnboundedSender<Forward>,
    runtime: Option<Runtime>,
}

impl EventHandle {
    fn new(publisher: Arc<dyn EventPublisher>) -> Result<Self> {
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("scheduler-events")
            .enable_all()
            .build()?;
        let (sender, receiver) = mpsc::unbounded_channel();
        runtime.spawn(forward(receiver, publisher));
        Ok(Self {
            sender,
            runtime: Some(runtime),
        })
    }

    fn publish(&self, record: EventRecord) -> Result<()> {
        self.sender
            .send(Forward::Record(record))
            .map_err(|_| anyhow!("event forwarder stopped"))
    }

    fn flush_request(&self) -> Result<oneshot::Receiver<()>> {
        let (done, wait) = oneshot::channel();
        self.sender
            .send(Forward::Flush(done))
            .map_err(|_| anyhow!("event forwarder stopped"))?;
        Ok(wait)
    }
}

impl Drop for EventHandle {
    fn drop(&mut self) {
        // Draining blocks, which is not allowed inside a runtime.
        if Handle::try_current().is_err() {
            if let Ok(wait) = self.flush_request() {
                let _ = wait.blocking_recv();
            }
        }
        if let Some(runtime) = self.runtime.take() {
            runtime.shutdown_background();
        }
    }
}

async fn forward(
    mut receiver: mpsc::UnboundedReceiver<Forward>,
    publisher: Arc<dyn EventPublisher>,
) {
    while let Some(message) = receiver.recv().await {
        match message {
            Forward::Record(record) => {
                if let Err(err) = publisher.publish(record).await {
                    eprintln!("telemetry event publish failed: {err:?}");
                }
            }
            Forward::Flush(done) => {
                let _ = done.send(());
            }
        }
    }
}

impl SchedulerTelemetry {
    /// Returns a builder.
    #[must_use]
    pub fn builder(module: impl Into<String>) -> SchedulerTelemetryBuilder {
        SchedulerTelemetryBuilder::new(module)
    }

    /// Logs a message with structured metadata.
    pub fn log(&self, level: LogLevel, message: &str, metadata: Value) -> Result<()> {
        if level < self.inner.min_level {
            return Ok(());
        }
        if let Some(logger) = &self.inner.logger {
            let record = LogRecord::new(&self.inner.module, level, message).with_metadata(&metadata);
            logger.log(&record)?;
        }
        Ok(())
    }

    /// Emits an event on the bus, stamped with this handle's next sequence number.
    pub fn event(&self, event_type: &str, payload: Value) -> Result<()> {
        if let Some(handle) = &self.inner.event {
            let sequence = self.inner.sequence.fetch_add(1, Ordering::SeqCst);
            handle.publish(EventRecord::new(
                &self.inner.module,
                event_type,
                sequence,
                payload,
            ))?;
        }
        Ok(())
    }

    /// Blocks until every event emitted so far has reached the publisher.
    ///
    /// Must not be called from inside an async context; use [`Self::flush_async`] there.
    pub fn flush(&self) -> Result<()> {
        match &self.inner.event {
            Some(handle) => handle
                .flush_request()?
                .blocking_recv()
                .map_err(|_| anyhow!("event forwarder stopped")),
            None => Ok(()),
        }
    }

    /// Waits until every event emitted so far has reached the publisher.
    pub async fn flush_async(&self) -> Result<()> {
        match &self.inner.event {
            Some(handle) => handle
                .flush_request()?
                .await
                .map_err(|_| anyhow!("event forwarder stopped")),
            None => Ok(()),
        }
    }

    /// Publishes a scheduler event as `cycle.<kind>`.
    pub fn cycle_event(&self, event: &CycleEvent) -> Result<()> {
        self.event(&event.event_type(), event.payload())
    }

    /// Module name stamped on records.
    #[must_use]
    pub fn module(&self) -> &str {
        &self.inner.module
    }
}
