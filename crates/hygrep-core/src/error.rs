//! Error types for hygrep-core.
//!
//! The taxonomy mirrors how callers must react: per-item errors (a single
//! file, a single block) are absorbed at the stage boundary and counted;
//! structural errors (bad path, missing model, locked index) propagate to
//! the caller and map onto the CLI's grep-compatible exit codes.

use std::path::PathBuf;

use thiserror::Error;

/// Top-level error type for all hygrep-core operations.
#[derive(Debug, Error)]
pub enum HygrepError {
    /// The corpus root does not exist or is not a directory.
    #[error("path error: {path} {reason}")]
    Path {
        /// The offending path.
        path: PathBuf,
        /// Why it's invalid (e.g. "does not exist", "is not a directory").
        reason: String,
    },

    /// Bad CLI input reached the core (e.g. `top_k == 0`).
    #[error("argument error: {0}")]
    Argument(String),

    /// A single file failed to parse. Non-fatal: the extractor falls
    /// back to a whole-file `other` block for this path.
    #[error("parse error for {path}: {message}")]
    Parse {
        /// Path to the file that failed to parse.
        path: PathBuf,
        /// Human-readable error description.
        message: String,
    },

    /// No embedder artefact (model or tokenizer file) is available.
    #[error("model missing: {0}")]
    ModelMissing(String),

    /// The on-disk index's manifest is incompatible with the current
    /// embedder (model version or dimension mismatch) or corrupt.
    #[error("index incompatible: {0}")]
    IndexIncompatible(String),

    /// The advisory build lock is already held by another process.
    #[error("index busy: build lock held at {0}")]
    IndexBusy(PathBuf),

    /// Inference failed in a way that invalidates the enclosing batch
    /// (as opposed to a single block's tokenisation failure).
    #[error("inference error: {0}")]
    Inference(String),

    /// A single block failed to tokenise. Non-fatal: the embedder skips
    /// the block and the caller records the count.
    #[error("tokeniser error: {0}")]
    Tokeniser(String),

    /// I/O error reading/writing a single file. Recorded and skipped by
    /// the stage that hit it; not fatal unless the skip count crosses a
    /// threshold.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialisation error for manifest/blocks files.
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// Generic internal error for unexpected conditions that don't fit
    /// another variant.
    #[error("internal error: {0}")]
    Internal(String),
}

/// Convenience type alias for Results in hygrep-core.
pub type HygrepResult<T> = Result<T, HygrepError>;
