//! Pipeline state machine and progress callbacks.
//!
//! A run moves strictly forward through four stages:
//!
//! ```text
//! Pending ──▶ TextExtracted ──▶ ModelInvoked ──▶ Normalized
//!   (0 %)        (25 %)            (50 %)          (75 %)
//! ```
//!
//! and ends in exactly one terminal state, `Succeeded` (100 %) or `Failed`.
//! A stage is entered when its work starts: decoding and text extraction
//! happen in `TextExtracted`, prompt composition and the model call in
//! `ModelInvoked`. Failures can only leave from those two stages (or from
//! `Pending`, for validation and configuration problems).
//! An unparseable model reply does not fail the run: it continues to
//! `Normalized` through the fallback path.
//!
//! Inject an [`Arc<dyn ExtractionProgressCallback>`] via
//! [`crate::extract::ExtractorBuilder::progress_callback`] to observe runs.
//!
//! # Example
//!
//! ```rust
//! use edgequake_pdf2csv::{ExtractionProgressCallback, PipelineStage};
//! use std::sync::Mutex;
//!
//! struct Recorder(Mutex<Vec<PipelineStage>>);
//!
//! impl ExtractionProgressCallback for Recorder {
//!     fn on_stage(&self, stage: PipelineStage) {
//!         self.0.lock().unwrap().push(stage);
//!     }
//! }
//! ```

use crate::error::ExtractError;
use serde::Serialize;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Non-terminal pipeline stages, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum PipelineStage {
    Pending,
    TextExtracted,
    ModelInvoked,
    Normalized,
}

impl PipelineStage {
    /// Progress percentage reported for this stage.
    pub fn percent(self) -> u8 {
        match self {
            PipelineStage::Pending => 0,
            PipelineStage::TextExtracted => 25,
            PipelineStage::ModelInvoked => 50,
            PipelineStage::Normalized => 75,
        }
    }

    /// The stage that follows this one, if any.
    pub fn next(self) -> Option<PipelineStage> {
        match self {
            PipelineStage::Pending => Some(PipelineStage::TextExtracted),
            PipelineStage::TextExtracted => Some(PipelineStage::ModelInvoked),
            PipelineStage::ModelInvoked => Some(PipelineStage::Normalized),
            PipelineStage::Normalized => None,
        }
    }
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PipelineStage::Pending => "pending",
            PipelineStage::TextExtracted => "text-extracted",
            PipelineStage::ModelInvoked => "model-invoked",
            PipelineStage::Normalized => "normalized",
        };
        f.write_str(s)
    }
}

/// Called by the pipeline as a run progresses.
///
/// Implementations must be `Send + Sync`: one [`crate::Extractor`] serves
/// concurrent HTTP requests. All methods default to no-ops.
pub trait ExtractionProgressCallback: Send + Sync {
    /// Called on entering each stage, `Pending` included.
    fn on_stage(&self, stage: PipelineStage) {
        let _ = stage;
    }

    /// Called when the model reply was replaced by the placeholder row.
    fn on_fallback(&self, reason: &str) {
        let _ = reason;
    }

    /// Called once when the run succeeds.
    ///
    /// # Arguments
    /// * `rows`: number of rows produced
    /// * `degraded`: true when the rows are the placeholder fallback
    fn on_success(&self, rows: usize, degraded: bool) {
        let _ = (rows, degraded);
    }

    /// Called once when the run fails.
    ///
    /// # Arguments
    /// * `stage`: last stage reached before the failure
    /// * `error`: the failure
    fn on_failure(&self, stage: PipelineStage, error: &ExtractError) {
        let _ = (stage, error);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl ExtractionProgressCallback for NoopProgressCallback {}

/// Convenience alias for the type stored in [`crate::Extractor`].
pub type ProgressCallback = Arc<dyn ExtractionProgressCallback>;

/// Tracks one run through the stages and forwards events to the callback.
pub(crate) struct StageTracker<'a> {
    stage: PipelineStage,
    callback: Option<&'a ProgressCallback>,
}

impl<'a> StageTracker<'a> {
    pub(crate) fn start(callback: Option<&'a ProgressCallback>) -> Self {
        if let Some(cb) = callback {
            cb.on_stage(PipelineStage::Pending);
        }
        Self {
            stage: PipelineStage::Pending,
            callback,
        }
    }

    pub(crate) fn stage(&self) -> PipelineStage {
        self.stage
    }

    /// Move to the next stage. Stages cannot be skipped or revisited.
    pub(crate) fn advance(&mut self) {
        let Some(next) = self.stage.next() else {
            return;
        };
        debug!("Pipeline stage: {} → {} ({}%)", self.stage, next, next.percent());
        self.stage = next;
        if let Some(cb) = self.callback {
            cb.on_stage(next);
        }
    }

    pub(crate) fn fallback(&self, reason: &str) {
        if let Some(cb) = self.callback {
            cb.on_fallback(reason);
        }
    }

    pub(crate) fn succeed(self, rows: usize, degraded: bool) {
        if let Some(cb) = self.callback {
            cb.on_success(rows, degraded);
        }
    }

    pub(crate) fn fail(self, error: &ExtractError) {
        if let Some(cb) = self.callback {
            cb.on_failure(self.stage, error);
        }
    }
}
