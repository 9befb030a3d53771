//! Per-View Camera Snapshot
//!
//! The (excluded) orchestration layer hands each pipeline a [`ViewInfo`]
//! per frame: view/projection matrices plus the classification bits that
//! shadow culling and depth-of-field math consume.

use glam::{Mat4, Vec2};

/// Lens projection classification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProjectionKind {
    Perspective,
    Orthographic,
    Panoramic,
}

/// Immutable camera snapshot for one rendered view.
#[derive(Debug, Clone, Copy)]
pub struct ViewInfo {
    pub view: Mat4,
    /// Window (projection) matrix as supplied by the caller. May be
    /// degenerate — consumers go through [`safe_projection`](Self::safe_projection).
    pub projection: Mat4,
    pub near: f32,
    pub far: f32,
    pub kind: ProjectionKind,
    /// Output resolution in pixels.
    pub extent: Vec2,
}

impl ViewInfo {
    /// Returns the projection matrix, substituting a small fixed
    /// orthographic projection when the supplied one contains NaN/Inf
    /// (degenerate FOV or zero-area viewport). Keeps culling and shadow
    /// math finite instead of propagating NaNs into every downstream pass.
    #[must_use]
    pub fn safe_projection(&self) -> Mat4 {
        if self.projection.is_finite() {
            return self.projection;
        }
        log::warn!("degenerate window matrix, substituting fallback orthographic projection");
        Mat4::orthographic_rh(-1.0, 1.0, -1.0, 1.0, 0.1, 100.0)
    }

    /// View-projection with the degenerate-input guard applied.
    #[must_use]
    pub fn safe_view_projection(&self) -> Mat4 {
        self.safe_projection() * self.view
    }

    #[inline]
    #[must_use]
    pub fn is_perspective(&self) -> bool {
        self.kind == ProjectionKind::Perspective
    }
}

impl Default for ViewInfo {
    fn default() -> Self {
        Self {
            view: Mat4::IDENTITY,
            projection: Mat4::perspective_rh(std::f32::consts::FRAC_PI_3, 16.0 / 9.0, 0.1, 1000.0),
            near: 0.1,
            far: 1000.0,
            kind: ProjectionKind::Perspective,
            extent: Vec2::new(1920.0, 1080.0),
        }
    }
}
