//! Proposal document rendering behind a timeout boundary.
//!
//! Rendering runs on a dedicated thread; the caller waits with a bounded
//! timeout so a wedged renderer cannot stall submission. A timed-out render
//! is abandoned (the thread finishes and its result is dropped).

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use crossbeam_channel::{bounded, RecvTimeoutError};
use tracing::{info_span, warn};

use crate::error::InfraError;

/// Everything the renderer needs, snapshotted from the proposal row so the
/// render thread never touches the database.
#[derive(Debug, Clone)]
pub struct RenderInput {
    pub proposal_code: String,
    pub applicant_name: String,
    pub template_title: String,
    /// Section name and its content payload, in template order.
    pub sections: Vec<(String, serde_json::Value)>,
}

pub trait PdfRenderer: Send + Sync + 'static {
    fn render(&self, input: &RenderInput) -> Result<Vec<u8>, InfraError>;
}

/// Deterministic plaintext rendition. Stands in for a real PDF backend and
/// keeps artifact content reproducible in tests.
pub struct PlainTextRenderer;

impl PdfRenderer for PlainTextRenderer {
    fn render(&self, input: &RenderInput) -> Result<Vec<u8>, InfraError> {
        let mut out = String::new();
        out.push_str(&format!("Proposal {}\n", input.proposal_code));
        out.push_str(&format!("Applicant: {}\n", input.applicant_name));
        out.push_str(&format!("Template: {}\n\n", input.template_title));
        for (name, content) in &input.sections {
            out.push_str(&format!("== {} ==\n{}\n\n", name, content));
        }
        Ok(out.into_bytes())
    }
}

/// Runs a renderer on its own thread and enforces a wall-clock deadline.
#[derive(Clone)]
pub struct RenderBoundary {
    renderer: Arc<dyn PdfRenderer>,
    timeout: Duration,
}

impl RenderBoundary {
    pub fn new(renderer: Arc<dyn PdfRenderer>, timeout: Duration) -> Self {
        Self { renderer, timeout }
    }

    pub fn render(&self, input: RenderInput) -> Result<Vec<u8>, InfraError> {
        let span = info_span!("render", code = %input.proposal_code);
        let _guard = span.enter();

        let (tx, rx) = bounded(1);
        let renderer = self.renderer.clone();
        thread::spawn(move || {
            // Bounded(1) and a single send: this never blocks, and the
            // result is dropped if the caller already timed out.
            let _ = tx.send(renderer.render(&input));
        });

        match rx.recv_timeout(self.timeout) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => {
                warn!(timeout_secs = self.timeout.as_secs(), "Render timed out");
                Err(InfraError::RenderTimeout {
                    seconds: self.timeout.as_secs(),
                })
            }
            Err(RecvTimeoutError::Disconnected) => {
                Err(InfraError::RenderFailed("render thread panicked".to_string()))
            }
        }
    }
}
