use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;

use crate::event::{ActivityEvent, EventDraft};

/// Process-wide event counter. Ids stay strictly increasing across turns so
/// simultaneous completions from concurrent turns still have a total order.
static NEXT_EVENT_ID: AtomicU64 = AtomicU64::new(1);

/// Streaming side of the recorder. Unbounded so a slow consumer never stalls
/// the turn that produces events.
pub type ActivitySink = tokio::sync::mpsc::UnboundedSender<ActivityEvent>;

/// Create a sink/receiver pair for live trace consumption.
#[must_use]
pub fn activity_channel() -> (
    ActivitySink,
    tokio::sync::mpsc::UnboundedReceiver<ActivityEvent>,
) {
    tokio::sync::mpsc::unbounded_channel()
}

/// Per-turn ordered event log.
///
/// Events are appended in completion order; each receives a wall-clock
/// timestamp and a monotonically increasing id. When several workers feed one
/// recorder concurrently, the append lock serializes them and the id
/// tie-breaks identical timestamps.
#[derive(Debug)]
pub struct ActivityRecorder {
    turn_id: String,
    events: Mutex<Vec<ActivityEvent>>,
    sink: Option<ActivitySink>,
}

impl ActivityRecorder {
    #[must_use]
    pub fn new(turn_id: impl Into<String>) -> Self {
        Self {
            turn_id: turn_id.into(),
            events: Mutex::new(Vec::new()),
            sink: None,
        }
    }

    /// Attach a streaming sink. Every subsequently recorded event is pushed
    /// to it as well as appended to the buffer.
    #[must_use]
    pub fn with_sink(mut self, sink: ActivitySink) -> Self {
        self.sink = Some(sink);
        self
    }

    #[must_use]
    pub fn turn_id(&self) -> &str {
        &self.turn_id
    }

    /// Append an event, assigning its id and timestamp. Returns the assigned id.
    pub fn record(&self, draft: EventDraft) -> u64 {
        let mut events = self
            .events
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);

        // Id allocation happens under the append lock so buffer order and id
        // order never diverge, even with concurrent workers.
        let id = NEXT_EVENT_ID.fetch_add(1, Ordering::Relaxed);
        let event = ActivityEvent {
            id,
            turn_id: self.turn_id.clone(),
            timestamp: Utc::now(),
            kind: draft.kind,
            title: draft.title,
            details: draft.details,
            sql_text: draft.sql_text,
            latency_ms: draft.latency_ms,
            worker_name: draft.worker_name,
            source_location: draft.source_location,
        };

        tracing::debug!(
            turn_id = %self.turn_id,
            event_id = id,
            kind = %event.kind,
            title = %event.title,
            "activity recorded"
        );

        if let Some(sink) = &self.sink {
            // Receiver may already be gone; the trace buffer is authoritative.
            let _ = sink.send(event.clone());
        }

        events.push(event);
        id
    }

    /// Drain and return the ordered trace, resetting the buffer.
    #[must_use]
    pub fn take(&self) -> Vec<ActivityEvent> {
        std::mem::take(
            &mut *self
                .events
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner),
        )
    }

    /// Number of events currently buffered.
    #[must_use]
    pub fn len(&self) -> usize {
        self.events
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner)
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
