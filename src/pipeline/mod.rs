//! Pass / Pipeline Composition
//!
//! One [`PipelineModules`] instance owns every per-view pipeline and is the
//! single routing point for renderable surfaces. The per-frame protocol is a
//! strict phase sequence:
//!
//! ```text
//! begin_sync → (material_add per visible surface) → end_sync → render
//! ```
//!
//! `begin_sync` resets accumulated closure state and sub-pass lists;
//! `material_add` classifies one surface into the right pipeline's sub-pass
//! bucket and returns the handle the caller records draws through;
//! `end_sync` freezes layer decisions (radiance splitting, light-eval
//! variants, feedback copies) for the frame.

pub mod capture;
pub mod deferred;
pub mod forward;
pub mod shadow;
pub mod volume;

pub use capture::ProbePipeline;
pub use deferred::{DeferredPipeline, DeferredPlan, GBufferPassBuilder, LayerPlan};
pub use forward::ForwardPipeline;
pub use shadow::ShadowSurfacePipeline;
pub use volume::{ScreenRect, VolumePipeline};

use crate::errors::{RenderError, Result};
use crate::keys::MaterialKey;
use crate::material::{
    GeometryType, MaterialDescriptor, MaterialFlags, MaterialId, ObjectId, PipelineType,
    ProbeCaptureMode,
};
use crate::pass::{SubPass, SubPassHandle};
use crate::settings::RendererSettings;

/// One renderable surface as handed over by the scene-sync layer.
///
/// The descriptor is borrowed from the material arena for the duration of
/// the call; pipelines copy out the classification bits they need and never
/// retain the reference.
#[derive(Debug, Clone, Copy)]
pub struct SurfaceDraw<'a> {
    pub object: ObjectId,
    pub material: MaterialId,
    pub descriptor: &'a MaterialDescriptor,
    pub key: MaterialKey,
}

/// Material sub-pass bucket, selected by sidedness and the hybrid flag.
///
/// Pure shader-switch minimization; the four buckets are semantically
/// interchangeable but their relative draw order is pinned by tests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MaterialBucket {
    Single,
    SingleHybrid,
    Double,
    DoubleHybrid,
}

impl MaterialBucket {
    #[must_use]
    pub fn from_flags(flags: MaterialFlags) -> Self {
        match (
            flags.contains(MaterialFlags::CULL_BACKFACE),
            flags.contains(MaterialFlags::HYBRID),
        ) {
            (true, false) => Self::Single,
            (true, true) => Self::SingleHybrid,
            (false, false) => Self::Double,
            (false, true) => Self::DoubleHybrid,
        }
    }

    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        match self {
            Self::Single => 0,
            Self::SingleHybrid => 1,
            Self::Double => 2,
            Self::DoubleHybrid => 3,
        }
    }

    #[inline]
    #[must_use]
    pub const fn double_sided(self) -> bool {
        matches!(self, Self::Double | Self::DoubleHybrid)
    }
}

/// Caller-side draw submission capability.
///
/// The renderer composes passes and raster state but owns no per-object
/// geometry; the excluded geometry layer implements this to resolve the
/// opaque buffer identifiers in each [`crate::pass::DrawCommand`] and issue
/// the actual draws.
pub trait DrawEncoder {
    fn encode(&mut self, pass: &mut wgpu::RenderPass<'_>, sub_pass: &SubPass);
}

/// Frozen per-frame decisions produced by `end_sync`.
#[derive(Debug, Clone)]
pub struct FramePlan {
    pub deferred: DeferredPlan,
}

/// Owner of all per-view pipelines and the surface routing table.
pub struct PipelineModules {
    frame: u64,
    settings: RendererSettings,
    pub deferred: DeferredPipeline,
    pub forward: ForwardPipeline,
    pub shadow: ShadowSurfacePipeline,
    pub sphere_probe: ProbePipeline,
    pub planar_probe: ProbePipeline,
    pub volume: VolumePipeline,
}

impl PipelineModules {
    #[must_use]
    pub fn new(settings: RendererSettings) -> Self {
        Self {
            frame: 0,
            settings,
            deferred: DeferredPipeline::new(),
            forward: ForwardPipeline::new(),
            shadow: ShadowSurfacePipeline::new(),
            sphere_probe: ProbePipeline::sphere(),
            planar_probe: ProbePipeline::planar(),
            volume: VolumePipeline::new(),
        }
    }

    pub fn begin_sync(&mut self) {
        self.frame += 1;
        self.deferred.begin_sync(self.frame);
        self.forward.begin_sync(self.frame);
        self.shadow.begin_sync(self.frame);
        self.sphere_probe.begin_sync(self.frame);
        self.planar_probe.begin_sync(self.frame);
        self.volume.begin_sync(self.frame);
    }

    /// Route one surface into a pipeline sub-pass.
    ///
    /// Probe capture overrides the requested pipeline entirely. The two
    /// volume pipeline types never pass through here; callers must hand
    /// volume objects to [`VolumePipeline::volume_add`] directly, and
    /// requesting them from the generic dispatcher is a code/data mismatch
    /// surfaced as an error rather than a crash. `Ok(None)` means the
    /// surface was dropped on purpose: a shadow-routed material whose flags
    /// opt out of casting.
    pub fn material_add(
        &mut self,
        surface: &SurfaceDraw<'_>,
        pipeline: PipelineType,
        probe: ProbeCaptureMode,
    ) -> Result<Option<SubPassHandle>> {
        match probe {
            ProbeCaptureMode::Reflection => {
                return Ok(Some(self.sphere_probe.add_material(surface)));
            }
            ProbeCaptureMode::Planar => {
                return Ok(Some(self.planar_probe.add_material(surface)));
            }
            ProbeCaptureMode::None => {}
        }

        match pipeline {
            PipelineType::DeferredPrepass => Ok(Some(self.deferred.add_prepass(surface))),
            PipelineType::ForwardPrepass => Ok(Some(self.forward.add_prepass(surface))),
            PipelineType::Deferred => {
                // Blended surfaces cannot write a G-buffer; they fall
                // through to forward shading whatever was requested.
                if surface.descriptor.flags.contains(MaterialFlags::BLEND) {
                    Ok(Some(self.forward.add_material(surface)))
                } else {
                    Ok(Some(self.deferred.add_material(surface)))
                }
            }
            PipelineType::Forward => Ok(Some(self.forward.add_material(surface))),
            PipelineType::Shadow => Ok(self.shadow.add_caster(surface)),
            PipelineType::Capture => Ok(Some(self.sphere_probe.add_material(surface))),
            PipelineType::VolumeMaterial | PipelineType::VolumeOccupancy => {
                Err(RenderError::UnsupportedPipeline {
                    pipeline,
                    geometry: surface
                        .key
                        .uuid()
                        .decode()
                        .map_or(GeometryType::Mesh, |f| f.geometry),
                })
            }
        }
    }

    /// Freeze this frame's layer decisions.
    pub fn end_sync(&mut self) -> FramePlan {
        FramePlan {
            deferred: self.deferred.end_sync(&self.settings),
        }
    }

    #[must_use]
    pub fn settings(&self) -> &RendererSettings {
        &self.settings
    }

    #[must_use]
    pub fn frame(&self) -> u64 {
        self.frame
    }
}
