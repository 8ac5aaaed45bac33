//! Audit recorders.
//!
//! Mask and unmask operations each produce exactly one [`AuditEvent`]. A
//! recorder persists it and hands back a record id. Recording is best effort:
//! [`record_best_effort`] never fails the surrounding operation and degrades
//! to a sentinel id instead.

use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::{info, warn};

use crate::types::AuditEvent;

/// Record id returned when the recorder did not answer in time.
pub const OFFLINE_AUDIT_ID: &str = "offline_audit_id";
/// Record id returned when the recorder reported a failure.
pub const ERROR_AUDIT_ID: &str = "error_logging";

/// Error type for audit recording.
#[derive(Debug, thiserror::Error)]
pub enum AuditError {
    /// The audit sink rejected or lost the record.
    #[error("Audit sink error: {0}")]
    Sink(String),
    /// Event could not be serialized.
    #[error("Audit serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Sink for audit facts.
#[async_trait]
pub trait AuditRecorder: Send + Sync {
    /// Persist an event and return its record id.
    async fn record(&self, event: &AuditEvent) -> Result<String, AuditError>;

    /// Most recent events, newest first, optionally for one session.
    ///
    /// Recorders that cannot read back return nothing.
    async fn recent(&self, _session_id: Option<&str>, _limit: usize) -> Vec<AuditEvent> {
        Vec::new()
    }

    /// Whether the sink is reachable.
    async fn is_healthy(&self) -> bool {
        true
    }
}

/// Record an event without letting audit problems escape.
///
/// Returns the record id, [`ERROR_AUDIT_ID`] if the recorder failed, or
/// [`OFFLINE_AUDIT_ID`] if it did not answer within `timeout`.
pub async fn record_best_effort(
    recorder: &dyn AuditRecorder,
    event: &AuditEvent,
    timeout: Duration,
) -> String {
    match tokio::time::timeout(timeout, recorder.record(event)).await {
        Ok(Ok(id)) => id,
        Ok(Err(e)) => {
            warn!(
                event_id = %event.event_id,
                operation = %event.operation,
                error = %e,
                "Audit recording failed"
            );
            ERROR_AUDIT_ID.to_string()
        }
        Err(_) => {
            warn!(
                event_id = %event.event_id,
                operation = %event.operation,
                timeout_ms = timeout.as_millis() as u64,
                "Audit recorder timed out"
            );
            OFFLINE_AUDIT_ID.to_string()
        }
    }
}

/// Emits each event as a structured `tracing` record on target `pii_vault::audit`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAuditRecorder;

#[async_trait]
impl AuditRecorder for TracingAuditRecorder {
    async fn record(&self, event: &AuditEvent) -> Result<String, AuditError> {
        let extra = serde_json::to_string(&event.extra)?;
        info!(
            target: "pii_vault::audit",
            event_id = %event.event_id,
            operation = %event.operation,
            session_id = %event.session_id,
            actor_id = event.actor_id.as_deref().unwrap_or(""),
            actor_role = event.actor_role.as_deref().unwrap_or(""),
            entity_types = %event.entity_types.join(","),
            purpose = event.purpose.as_deref().unwrap_or(""),
            reason = event.reason.as_deref().unwrap_or(""),
            success = event.success,
            extra = %extra,
            "audit"
        );
        Ok(event.event_id.clone())
    }
}

/// Bounded in-memory ring of recent events.
///
/// Oldest events are evicted once `capacity` is reached.
#[derive(Debug)]
pub struct MemoryAuditRecorder {
    events: Mutex<VecDeque<AuditEvent>>,
    capacity: usize,
}

impl MemoryAuditRecorder {
    /// Default ring capacity.
    pub const DEFAULT_CAPACITY: usize = 1000;

    /// Create a recorder holding at most `capacity` events.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            events: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
            capacity,
        }
    }

    /// Number of buffered events.
    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    /// Whether no events are buffered.
    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }

    /// Snapshot of all buffered events, oldest first.
    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().iter().cloned().collect()
    }
}

impl Default for MemoryAuditRecorder {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CAPACITY)
    }
}

#[async_trait]
impl AuditRecorder for MemoryAuditRecorder {
    async fn record(&self, event: &AuditEvent) -> Result<String, AuditError> {
        let mut events = self.events.lock();
        if events.len() >= self.capacity {
            events.pop_front();
        }
        events.push_back(event.clone());
        Ok(event.event_id.clone())
    }

    async fn recent(&self, session_id: Option<&str>, limit: usize) -> Vec<AuditEvent> {
        self.events
            .lock()
            .iter()
            .rev()
            .filter(|e| session_id.map_or(true, |sid| e.session_id == sid))
            .take(limit)
            .cloned()
            .collect()
    }
}

/// Discards every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpAuditRecorder;

#[async_trait]
impl AuditRecorder for NoOpAuditRecorder {
    async fn record(&self, event: &AuditEvent) -> Result<String, AuditError> {
        Ok(event.event_id.clone())
    }
}

/// Records to several recorders in order.
///
/// The first recorder's id is returned. Reads come from the first recorder
/// that returns anything.
#[derive(Default)]
pub struct FanoutAuditRecorder {
    recorders: Vec<Arc<dyn AuditRecorder>>,
}

impl FanoutAuditRecorder {
    /// Create an empty fan-out.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a recorder.
    pub fn with_recorder(mut self, recorder: Arc<dyn AuditRecorder>) -> Self {
        self.recorders.push(recorder);
        self
    }
}

#[async_trait]
impl AuditRecorder for FanoutAuditRecorder {
    async fn record(&self, event: &AuditEvent) -> Result<String, AuditError> {
        let mut first_id = None;
        for recorder in &self.recorders {
            let id = recorder.record(event).await?;
            first_id.get_or_insert(id);
        }
        Ok(first_id.unwrap_or_else(|| event.event_id.clone()))
    }

    async fn recent(&self, session_id: Option<&str>, limit: usize) -> Vec<AuditEvent> {
        for recorder in &self.recorders {
            let events = recorder.recent(session_id, limit).await;
            if !events.is_empty() {
                return events;
            }
        }
        Vec::new()
    }

    async fn is_healthy(&self) -> bool {
        for recorder in &self.recorders {
            if !recorder.is_healthy().await {
                return false;
            }
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AuditOperation, ContextMap};

    struct FailingRecorder;

    #[async_trait]
    impl AuditRecorder for FailingRecorder {
        async fn record(&self, _event: &AuditEvent) -> Result<String, AuditError> {
            Err(AuditError::Sink("database down".to_string()))
        }
    }

    struct StalledRecorder;

    #[async_trait]
    impl AuditRecorder for StalledRecorder {
        async fn record(&self, event: &AuditEvent) -> Result<String, AuditError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(event.event_id.clone())
        }
    }

    fn event(session_id: &str) -> AuditEvent {
        AuditEvent::new(AuditOperation::Mask, session_id, &ContextMap::new())
    }

    #[tokio::test]
    async fn test_best_effort_returns_record_id() {
        let e = event("s1");
        let id = record_best_effort(&TracingAuditRecorder, &e, Duration::from_millis(100)).await;
        assert_eq!(id, e.event_id);
    }

    #[tokio::test]
    async fn test_best_effort_sentinels() {
        let e = event("s1");
        let id = record_best_effort(&FailingRecorder, &e, Duration::from_millis(100)).await;
        assert_eq!(id, ERROR_AUDIT_ID);

        let id = record_best_effort(&StalledRecorder, &e, Duration::from_millis(10)).await;
        assert_eq!(id, OFFLINE_AUDIT_ID);
    }

    #[tokio::test]
    async fn test_memory_recorder_ring() {
        let recorder = MemoryAuditRecorder::new(3);
        for sid in ["a", "b", "a", "c"] {
            recorder.record(&event(sid)).await.unwrap();
        }

        assert_eq!(recorder.len(), 3);
        let recent: Vec<_> = recorder.recent(None, 10).await.into_iter().map(|e| e.session_id).collect();
        assert_eq!(recent, vec!["c", "a", "b"]);

        let only_a = recorder.recent(Some("a"), 10).await;
        assert_eq!(only_a.len(), 1);

        assert_eq!(recorder.recent(None, 1).await.len(), 1);
    }

    #[tokio::test]
    async fn test_fanout_records_everywhere() {
        let memory = Arc::new(MemoryAuditRecorder::new(10));
        let fanout = FanoutAuditRecorder::new()
            .with_recorder(Arc::new(TracingAuditRecorder))
            .with_recorder(memory.clone());

        let e = event("s1");
        assert_eq!(fanout.record(&e).await.unwrap(), e.event_id);
        assert_eq!(memory.len(), 1);
        assert_eq!(fanout.recent(Some("s1"), 5).await.len(), 1);

        let failing = FanoutAuditRecorder::new().with_recorder(Arc::new(FailingRecorder));
        assert!(failing.record(&e).await.is_err());
    }

    #[tokio::test]
    async fn test_noop_recorder_reads_nothing() {
        let recorder = NoOpAuditRecorder;
        recorder.record(&event("s1")).await.unwrap();
        assert!(recorder.recent(None, 10).await.is_empty());
    }
}
