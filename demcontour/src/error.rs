//! Error types for the contour tile engine.
//!
//! Errors are categorized by pipeline stage. Most kinds propagate to the
//! caller; `VectorParseFailed` and `GeometryFailed` are swallowed at their
//! point of origin (degrading to "no polygons" / "unmodified geometry") and
//! only surface through logs.

use thiserror::Error;

/// Errors that can occur while producing a contour tile.
///
/// The enum is `Clone` so results can be fanned out to every waiter of a
/// deduplicated cache entry.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum ContourError {
    /// HTTP request failed (non-2xx status or transport error).
    #[error("fetch failed for {url}: {message}")]
    FetchFailed { url: String, message: String },

    /// DEM image could not be decoded into an elevation grid.
    #[error("DEM decode failed: {0}")]
    DecodeFailed(String),

    /// A fetch exceeded its deadline.
    #[error("request timed out after {0} ms")]
    Timeout(u64),

    /// The caller cancelled the request.
    #[error("request cancelled")]
    Cancelled,

    /// Terrain vector tile could not be parsed.
    ///
    /// Never returned from the public API; the orchestrator downgrades it to
    /// an empty polygon set.
    #[error("vector tile parse failed: {0}")]
    VectorParseFailed(String),

    /// A geometric predicate failed during simplification or splitting.
    ///
    /// Never returned from the public API; the offending polygon or polyline
    /// is skipped and the original geometry retained.
    #[error("geometry operation failed: {0}")]
    GeometryFailed(String),

    /// Request options could not be decoded.
    #[error("invalid option {key}: {reason}")]
    InvalidOptions { key: String, reason: String },

    /// Internal error (e.g. a channel closed unexpectedly).
    #[error("internal error: {0}")]
    Internal(String),
}
