//! Result and error types for Seedsmith.

use crate::surface::SurfaceError;
use crate::synth::SynthError;
use thiserror::Error;

/// Result type for Seedsmith operations
pub type SeedsmithResult<T> = Result<T, SeedsmithError>;

/// Errors that can occur in Seedsmith
#[derive(Debug, Error)]
pub enum SeedsmithError {
    /// Surface failed to load; aborts the run
    #[error("Surface error: {0}")]
    Surface(#[from] SurfaceError),

    /// Combination could not be synthesized
    #[error("Synthesis error: {0}")]
    Synth(#[from] SynthError),

    /// No surface is registered for the library
    #[error("No surface loaded for library '{0}'")]
    UnknownLibrary(String),

    /// Emitted seed header could not be read back
    #[error("Invalid seed header: {message}")]
    SeedHeader {
        /// Error message
        message: String,
    },

    /// Configuration error
    #[error("Configuration error: {message}")]
    Config {
        /// Error message
        message: String,
    },

    /// Worker pool could not be built
    #[error("Worker pool error: {message}")]
    WorkerPool {
        /// Error message
        message: String,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}
