use ractor::ActorRef;
use std::sync::Arc;

use crate::actors::trace_store::TraceStoreMsg;
use crate::observability::recorder::TraceRecorder;
use trace_types::EventSource;

#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    trace_store: ActorRef<TraceStoreMsg>,
}

impl AppState {
    pub fn new(trace_store: ActorRef<TraceStoreMsg>) -> Self {
        Self {
            inner: Arc::new(AppStateInner { trace_store }),
        }
    }

    pub fn trace_store(&self) -> ActorRef<TraceStoreMsg> {
        self.inner.trace_store.clone()
    }

    pub fn recorder(&self, source: EventSource) -> TraceRecorder {
        TraceRecorder::new(self.trace_store(), source)
    }
}
