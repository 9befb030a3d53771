//! Renderer Settings
//!
//! Plain-data configuration consumed once at renderer construction. Runtime
//! per-view parameters (camera, depth-of-field aperture) travel with
//! [`crate::view::ViewInfo`] instead.
//!
//! | Field                | Description                                | Default        |
//! |----------------------|--------------------------------------------|----------------|
//! | `raytracing`         | Screen-space ray tracing enabled           | `true`         |
//! | `clamp_direct`       | Direct radiance clamp (0 = off)            | `0.0`          |
//! | `clamp_indirect`     | Indirect radiance clamp (0 = off)          | `10.0`         |
//! | `shadow_technique`   | Force a shadow update technique            | `None` (auto)  |
//! | `shadow_pool_size`   | Max resident shadow tile-maps              | `512`          |
//! | `shadow_page_cache`  | Cached-page ring capacity                  | `64`           |
//! | `max_samplers`       | Backend sampler-slot budget per shader     | `128`          |
//! | `max_attributes`     | Backend vertex-attribute budget per shader | `16`           |

use serde::{Deserialize, Serialize};

/// How shadow pages are written back to the atlas.
///
/// A platform capability decision made once at startup, never per frame.
/// The right choice is hardware-dependent configuration data — revalidate
/// against target hardware rather than assuming either is universally
/// faster.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ShadowTechnique {
    /// Render geometry into a large virtual framebuffer with per-fragment
    /// atomic-min depth writes straight into the shared atlas. One pass.
    AtomicRaster,
    /// Clear on-tile, render depth to tile memory, then a store pass copies
    /// only updated tiles to the atlas. Three sequential passes, but far
    /// less off-chip bandwidth on tile-based GPUs.
    TileCopy,
}

/// Global configuration for renderer construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RendererSettings {
    // === Lighting ===
    /// Enable screen-space ray tracing for reflective / transmissive
    /// closures. When off, deferred layers fall back to probe lighting.
    pub raytracing: bool,

    /// Clamp applied to direct radiance before accumulation. `0.0` disables
    /// the clamp. A non-zero clamp forces split direct/indirect radiance
    /// buffers (see the deferred layer `end_sync` rules).
    pub clamp_direct: f32,

    /// Clamp applied to indirect radiance. `0.0` disables.
    pub clamp_indirect: f32,

    // === Shadows ===
    /// Force a specific [`ShadowTechnique`]. `None` selects from the
    /// detected backend capabilities.
    pub shadow_technique: Option<ShadowTechnique>,

    /// Maximum number of tile-maps the shadow pool will grow to.
    pub shadow_pool_size: u32,

    /// Capacity of the recently-freed shadow page cache. Larger values
    /// trade atlas memory for fewer re-renders when tiles flicker in and
    /// out of visibility.
    pub shadow_page_cache: u32,

    // === Shader resource budgets ===
    /// Hard upper bound on texture-sampler slots a single generated shader
    /// may bind. Shaders exceeding it get their resource list cleared and
    /// render without textures rather than corrupting bindings.
    pub max_samplers: u32,

    /// Hard upper bound on vertex-attribute slots, same policy.
    pub max_attributes: u32,
}

impl Default for RendererSettings {
    fn default() -> Self {
        Self {
            raytracing: true,
            clamp_direct: 0.0,
            clamp_indirect: 10.0,
            shadow_technique: None,
            shadow_pool_size: 512,
            shadow_page_cache: 64,
            max_samplers: 128,
            max_attributes: 16,
        }
    }
}

impl RendererSettings {
    /// `true` when either radiance clamp is active.
    #[inline]
    #[must_use]
    pub fn any_clamp_active(&self) -> bool {
        self.clamp_direct > 0.0 || self.clamp_indirect > 0.0
    }
}
