//! Observability helpers: the outbound-HTTP trace recorder.

pub mod recorder;

pub use recorder::{RequestContext, TraceRecorder};
