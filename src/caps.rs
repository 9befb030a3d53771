//! Backend Capability Table
//!
//! Driver/OS-specific behavior is expressed as a small flag table populated
//! once at adapter detection, so pass-graph logic stays vendor-neutral.
//! Nothing outside this module inspects vendor or driver strings.

use crate::settings::ShadowTechnique;

/// Capability and workaround flags for the detected backend.
#[derive(Debug, Clone, Copy)]
pub struct BackendCaps {
    /// Issue an explicit queue flush between tile-prepare and reduce-style
    /// dispatch chains. Some driver/OS combinations lose compute-to-compute
    /// ordering across long unsubmitted command streams.
    pub flush_after_tile_prepare: bool,

    /// Prefer [`ShadowTechnique::TileCopy`] over atomic rasterization.
    /// Set for tile-based architectures where off-chip bandwidth dominates.
    pub prefer_tile_copy: bool,

    /// Backend supports 32-bit image atomics (required by
    /// [`ShadowTechnique::AtomicRaster`]).
    pub image_atomics: bool,
}

impl Default for BackendCaps {
    fn default() -> Self {
        Self {
            flush_after_tile_prepare: false,
            prefer_tile_copy: false,
            image_atomics: true,
        }
    }
}

impl BackendCaps {
    /// Populate the table from the adapter description.
    ///
    /// The table is data: entries here encode known-good configurations per
    /// device class, not per-vendor branches scattered through pass code.
    #[must_use]
    pub fn detect(info: &wgpu::AdapterInfo, features: wgpu::Features) -> Self {
        let tiled_gpu = matches!(info.device_type, wgpu::DeviceType::IntegratedGpu)
            && matches!(info.backend, wgpu::Backend::Vulkan | wgpu::Backend::Metal);

        Self {
            // Conservative default: only known-fragile Vulkan compute chains
            // need the extra flush.
            flush_after_tile_prepare: info.backend == wgpu::Backend::Vulkan && tiled_gpu,
            prefer_tile_copy: tiled_gpu,
            image_atomics: features.contains(wgpu::Features::TEXTURE_ATOMIC),
        }
    }

    /// Resolve the shadow update technique from caps + optional override.
    #[must_use]
    pub fn shadow_technique(&self, forced: Option<ShadowTechnique>) -> ShadowTechnique {
        if let Some(t) = forced {
            return t;
        }
        if self.prefer_tile_copy || !self.image_atomics {
            ShadowTechnique::TileCopy
        } else {
            ShadowTechnique::AtomicRaster
        }
    }
}
