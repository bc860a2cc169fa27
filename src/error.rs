// Ultralytics 🚀 AGPL-3.0 License - https://ultralytics.com/license

//! Error types for the detection core.
//!
//! Drop rules (unmapped class, degenerate polygon, missing masks) are not
//! errors. Everything here is either a contract violation by the caller or
//! an I/O / decoding failure at the edges.

use thiserror::Error;

use crate::models::BackendKind;

#[derive(Debug, Error)]
pub enum DetectError {
    #[error("backend mismatch: adapter for {expected:?} got {actual:?} output")]
    BackendMismatch {
        expected: BackendKind,
        actual: BackendKind,
    },

    #[error("shape mismatch: {0}")]
    ShapeMismatch(String),

    #[error("mask size mismatch: {left:?} vs {right:?} (rows, cols)")]
    MaskSize {
        left: (usize, usize),
        right: (usize, usize),
    },

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, DetectError>;
