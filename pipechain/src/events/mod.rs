//! Pipeline lifecycle events and the sinks that receive them.
//!
//! Events complement `tracing` logs: logs are for humans, events are typed
//! records a caller can collect, forward or assert on.

mod event;
mod sink;

pub use event::PipelineEvent;
pub use sink::{CollectingEventSink, EventSink, LoggingEventSink, NoOpEventSink};
