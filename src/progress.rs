//! Progress notifications for the processing pipeline.
//!
//! Inject an [`Arc<dyn PipelineProgressCallback>`] via
//! [`crate::config::ProcessingConfigBuilder::progress_callback`] to receive
//! an event as each stage starts and after each chunk completes.
//!
//! Events are a pure notification sink: nothing the callback does can change
//! control flow. Callers forward them to a progress bar, a websocket, or a
//! job-status record.
//!
//! # Example
//!
//! ```rust
//! use edgequake_docintel::{ProcessingConfig, ProgressEvent, ProgressCallback};
//! use std::sync::Arc;
//!
//! let cb: ProgressCallback = Arc::new(|event: &ProgressEvent| {
//!     eprintln!("[{}] {}", event.stage.as_str(), event.message);
//! });
//!
//! let config = ProcessingConfig::builder()
//!     .progress_callback(cb)
//!     .build()
//!     .unwrap();
//! ```

use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Pipeline stage an event belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Classify,
    Cache,
    Rasterise,
    Extract,
    Merge,
    Tables,
    Complete,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Classify => "classify",
            Stage::Cache => "cache",
            Stage::Rasterise => "rasterise",
            Stage::Extract => "extract",
            Stage::Merge => "merge",
            Stage::Tables => "tables",
            Stage::Complete => "complete",
        }
    }
}

/// One progress notification: `{stage, message, data?}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProgressEvent {
    pub stage: Stage,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl ProgressEvent {
    pub fn new(stage: Stage, message: impl Into<String>) -> Self {
        Self {
            stage,
            message: message.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }
}

/// Called by the pipeline as it moves through stages and chunks.
///
/// Implementations must be `Send + Sync`. Chunk events are emitted from the
/// task that drains the result channel, one at a time, but the callback may
/// be shared with other documents processed concurrently by the caller.
pub trait PipelineProgressCallback: Send + Sync {
    fn on_event(&self, event: &ProgressEvent);
}

impl<F> PipelineProgressCallback for F
where
    F: Fn(&ProgressEvent) + Send + Sync,
{
    fn on_event(&self, event: &ProgressEvent) {
        self(event)
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl PipelineProgressCallback for NoopProgressCallback {
    fn on_event(&self, _event: &ProgressEvent) {}
}

/// Convenience alias matching the type stored in [`crate::config::ProcessingConfig`].
pub type ProgressCallback = Arc<dyn PipelineProgressCallback>;

/// Emit `event` if a callback is configured.
pub(crate) fn emit(cb: Option<&ProgressCallback>, event: ProgressEvent) {
    if let Some(cb) = cb {
        cb.on_event(&event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[test]
    fn closure_callback_receives_events() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let cb: ProgressCallback = Arc::new(move |e: &ProgressEvent| {
            sink.lock().unwrap().push(e.stage);
        });

        emit(Some(&cb), ProgressEvent::new(Stage::Classify, "start"));
        emit(Some(&cb), ProgressEvent::new(Stage::Extract, "chunk 1/2"));
        emit(None, ProgressEvent::new(Stage::Merge, "ignored"));

        assert_eq!(*seen.lock().unwrap(), vec![Stage::Classify, Stage::Extract]);
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb: ProgressCallback = Arc::new(NoopProgressCallback);
        cb.on_event(&ProgressEvent::new(Stage::Complete, "done"));
    }

    #[test]
    fn event_serialises_without_empty_data() {
        let e = ProgressEvent::new(Stage::Rasterise, "page 1");
        let json = serde_json::to_value(&e).unwrap();
        assert_eq!(json["stage"], "rasterise");
        assert!(json.get("data").is_none());

        let e = e.with_data(serde_json::json!({ "completed": 1 }));
        assert_eq!(serde_json::to_value(&e).unwrap()["data"]["completed"], 1);
    }
}
