//! Actors backing the diagnostics console.

pub mod trace_store;

pub use trace_store::{TraceStoreActor, TraceStoreArguments, TraceStoreError, TraceStoreMsg};
