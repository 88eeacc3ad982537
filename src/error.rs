//! Error taxonomy for the analysis pipeline.
//!
//! Each stage has its own error enum so callers can react to the
//! specific failure kind (retry later on rate limits, re-run export
//! without redoing the pipeline, and so on). The CLI boundary wraps
//! these in `anyhow` for display.

use thiserror::Error;

/// Failures while extracting content from a video or repository source.
#[derive(Debug, Error)]
pub enum ExtractError {
    /// The source exists but has nothing extractable: a video with no
    /// caption track in any acceptable language, or a repository with
    /// no readable content.
    #[error("content not available: {0}")]
    NotAvailable(String),

    /// The repository (or ref) does not exist or is not visible.
    #[error("not found: {0}")]
    NotFound(String),

    /// The upstream service rate-limited us. Not retried inline;
    /// surfaced with a suggested wait.
    #[error("rate limited by {service}; retry in about {retry_after_secs}s")]
    RateLimited {
        service: String,
        retry_after_secs: u64,
    },

    /// Transient transport failure. Retried a bounded number of times
    /// before surfacing.
    #[error("network error: {0}")]
    Network(String),
}

/// Failures while turning a document into an analysis.
#[derive(Debug, Error)]
pub enum SynthesisError {
    /// The document cannot be fit into the model context even after
    /// chunking and truncation.
    #[error("document exceeds the model context budget")]
    ContextExceeded,

    /// The model backend is unreachable or persistently erroring.
    #[error("language model unavailable: {0}")]
    ModelUnavailable(String),

    /// The model's output could not be parsed into the expected fields,
    /// even after one corrective retry.
    #[error("unparseable model response: {0}")]
    InvalidResponse(String),
}

/// Failures while exporting a finished analysis to the note service.
///
/// An export failure never invalidates the already-produced
/// [`AnalysisResult`](crate::models::AnalysisResult); the caller may
/// retry the export alone.
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("export authentication failed: {0}")]
    AuthFailed(String),

    #[error("export payload rejected: {0}")]
    ValidationFailed(String),

    #[error("network error during export: {0}")]
    Network(String),
}

/// Top-level pipeline failure, one per run.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The input URL is neither a recognized video link nor a
    /// repository link. No extraction is attempted.
    #[error("unrecognized URL: {0}")]
    Unrecognized(String),

    #[error(transparent)]
    Extract(#[from] ExtractError),

    #[error(transparent)]
    Synthesis(#[from] SynthesisError),

    /// The overall pipeline deadline elapsed.
    #[error("pipeline timed out after {0}s")]
    Timeout(u64),
}
