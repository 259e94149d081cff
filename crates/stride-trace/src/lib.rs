//! Per-turn activity trace: typed events, ordered recorder, streaming sink.

pub mod event;
pub mod recorder;

pub use event::{ActivityEvent, ActivityKind, EventDraft};
pub use recorder::{ActivityRecorder, ActivitySink, activity_channel};
