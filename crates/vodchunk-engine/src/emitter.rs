//! Progress emission.
//!
//! Pipelines report progress through a [`ProgressSession`]; the session
//! formats [`ProgressEvent`]s and hands them to whatever transport the
//! emitter was built with. With no transport bound, events are logged and
//! the pipelines run unchanged.

use std::sync::Arc;
use tracing::info;

use vodchunk_models::{
    chunk_overall_progress, step_progress, ProgressDetail, ProgressEvent, ProgressPhase,
};

/// Delivery channel for progress events.
///
/// Implementations must not block: events are emitted from inside encode
/// loops. Delivery is best-effort; a dropped event never fails a pipeline.
pub trait ProgressTransport: Send + Sync {
    fn send(&self, event: &ProgressEvent);
}

/// Emits progress events to an optional transport.
#[derive(Clone, Default)]
pub struct ProgressEmitter {
    transport: Option<Arc<dyn ProgressTransport>>,
}

impl ProgressEmitter {
    /// Emitter bound to a transport.
    pub fn new(transport: Arc<dyn ProgressTransport>) -> Self {
        Self {
            transport: Some(transport),
        }
    }

    /// Emitter that only logs.
    pub fn disabled() -> Self {
        Self { transport: None }
    }

    /// Start a session for one video or upload.
    pub fn session(&self, owner_id: impl Into<String>) -> ProgressSession {
        ProgressSession {
            emitter: self.clone(),
            owner_id: owner_id.into(),
        }
    }

    fn emit(&self, event: ProgressEvent) {
        match &self.transport {
            Some(transport) => transport.send(&event),
            None => info!(
                owner_id = %event.owner_id,
                phase = %event.phase,
                progress = event.progress,
                "{}",
                event.message
            ),
        }
    }
}

/// Progress reporting scoped to one owner id.
#[derive(Clone)]
pub struct ProgressSession {
    emitter: ProgressEmitter,
    owner_id: String,
}

impl ProgressSession {
    pub fn owner_id(&self) -> &str {
        &self.owner_id
    }

    /// Report a phase at an explicit overall percentage.
    pub fn phase(&self, phase: ProgressPhase, message: impl Into<String>, progress: u8) {
        self.emitter
            .emit(ProgressEvent::phase(&self.owner_id, phase, message, progress));
    }

    /// Report step `current` of `total` within a phase.
    pub fn step(
        &self,
        phase: ProgressPhase,
        message: impl Into<String>,
        current: u32,
        total: u32,
    ) {
        let event =
            ProgressEvent::phase(&self.owner_id, phase, message, step_progress(current, total))
                .with_steps(current, total);
        self.emitter.emit(event);
    }

    /// Report per-chunk progress. The overall percentage advances smoothly
    /// across chunk boundaries.
    pub fn chunk(
        &self,
        phase: ProgressPhase,
        operation: impl Into<String>,
        index: u32,
        total: u32,
        chunk_pct: u8,
    ) {
        let operation = operation.into();
        let overall = chunk_overall_progress(index, total, chunk_pct);
        let event = ProgressEvent::phase(
            &self.owner_id,
            phase,
            format!("{} chunk {}/{}", operation, index + 1, total),
            overall,
        )
        .with_detail(ProgressDetail {
            chunk_index: index,
            total_chunks: total,
            chunk_progress: chunk_pct.min(100),
            operation,
        });
        self.emitter.emit(event);
    }

    /// Report terminal success.
    pub fn complete(&self, message: impl Into<String>) {
        self.phase(ProgressPhase::Complete, message, 100);
    }
}

/// Transport that records events for assertions.
#[derive(Default)]
pub struct RecordingTransport {
    events: std::sync::Mutex<Vec<ProgressEvent>>,
}

impl RecordingTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<ProgressEvent> {
        self.events.lock().map(|e| e.clone()).unwrap_or_default()
    }
}

impl ProgressTransport for RecordingTransport {
    fn send(&self, event: &ProgressEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event.clone());
        }
    }
}
