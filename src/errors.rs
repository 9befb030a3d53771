//! Error Types
//!
//! The renderer is deliberately "fail soft": GPU-resource exhaustion and
//! degenerate numeric inputs are degraded locally (missing texture, fallback
//! projection) with a `log` diagnostic, never propagated. What *is*
//! propagated as [`RenderError`] are configuration mismatches between the
//! material system and the pipeline dispatcher — conditions the reference
//! class of renderers asserts on, surfaced here as values so an embedding
//! application can drop the offending surface and keep rendering.

use thiserror::Error;

use crate::material::{GeometryType, PipelineType};

/// The main error type for the renderer.
#[derive(Error, Debug)]
pub enum RenderError {
    // ========================================================================
    // Configuration / template errors
    // ========================================================================
    /// No shader template exists for this pipeline × geometry combination,
    /// or a volume-only pipeline type reached the generic surface
    /// dispatcher. Indicates a mismatch between the material system and the
    /// pipeline dispatcher, not a user-facing condition.
    #[error("unsupported pipeline configuration: {pipeline:?} x {geometry:?}")]
    UnsupportedPipeline {
        pipeline: PipelineType,
        geometry: GeometryType,
    },

    /// A [`MaterialId`](crate::material::MaterialId) failed to resolve —
    /// the material was freed while a surface still referenced it.
    #[error("stale material handle")]
    StaleMaterial,

    // ========================================================================
    // Shader compilation
    // ========================================================================
    /// The compile worker channel was disconnected before the requested
    /// shader group became ready (shutdown during `wait_ready`).
    #[error("shader compilation cancelled: {0}")]
    CompileCancelled(&'static str),
}

/// Alias for `Result<T, RenderError>`.
pub type Result<T> = std::result::Result<T, RenderError>;
