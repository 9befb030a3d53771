//! Shadow Surface Pipeline
//!
//! Caster geometry drawn into the shadow atlas. Buckets split by sidedness
//! only — shadow rendering is depth-only, so the hybrid flag is irrelevant
//! here. Submission is driven by the paging module's update plan (see
//! [`crate::shadow::ShadowModule::plan_update`]): this pipeline supplies the
//! draws for the `SurfaceRender` step.

use rustc_hash::FxHashMap;

use crate::keys::MaterialKey;
use crate::material::MaterialFlags;
use crate::pass::{PassList, RasterState, SubPassHandle, SubPassShader};

use super::{DrawEncoder, SurfaceDraw};

const CASTER_NAMES: [&str; 2] = ["shadow.single", "shadow.double"];

pub struct ShadowSurfacePipeline {
    pub passes: PassList,
    casters: FxHashMap<(bool, MaterialKey), SubPassHandle>,
}

impl Default for ShadowSurfacePipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl ShadowSurfacePipeline {
    #[must_use]
    pub fn new() -> Self {
        Self {
            passes: PassList::new(),
            casters: FxHashMap::default(),
        }
    }

    pub fn begin_sync(&mut self, frame: u64) {
        self.passes.begin_sync(frame);
        self.casters.clear();
    }

    /// Bucket one shadow caster. Surfaces whose material opts out of shadow
    /// casting are dropped here rather than at every call site; `None`
    /// means the surface casts nothing this frame.
    pub fn add_caster(&mut self, surface: &SurfaceDraw<'_>) -> Option<SubPassHandle> {
        if !surface
            .descriptor
            .flags
            .contains(MaterialFlags::CAST_SHADOW)
        {
            return None;
        }
        let double = !surface
            .descriptor
            .flags
            .contains(MaterialFlags::CULL_BACKFACE);
        let key = (double, surface.key);
        if let Some(&handle) = self.casters.get(&key) {
            return Some(handle);
        }
        let state = if double {
            RasterState::PREPASS.double_sided()
        } else {
            RasterState::PREPASS
        };
        let handle = self.passes.declare(
            CASTER_NAMES[usize::from(double)],
            state,
            SubPassShader::Material(surface.key),
        );
        self.casters.insert(key, handle);
        Some(handle)
    }

    /// Encode caster draws into the atlas depth target.
    pub fn render(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        atlas_depth: &wgpu::TextureView,
        draw: &mut dyn DrawEncoder,
    ) {
        if self.passes.is_empty() {
            return;
        }
        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("shadow.surface"),
            color_attachments: &[],
            depth_stencil_attachment: Some(wgpu::RenderPassDepthStencilAttachment {
                view: atlas_depth,
                depth_ops: Some(wgpu::Operations {
                    load: wgpu::LoadOp::Load,
                    store: wgpu::StoreOp::Store,
                }),
                stencil_ops: None,
            }),
            ..Default::default()
        });
        for sub_pass in self.passes.iter() {
            draw.encode(&mut pass, sub_pass);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::keys::ShaderUuid;
    use crate::material::{
        DisplacementType, GeometryType, MaterialDescriptor, MaterialId, ObjectId, PipelineType,
        ThicknessMode, VisibilityFlags,
    };
    use slotmap::Key;

    #[test]
    fn casters_bucket_by_sidedness_only() {
        let mut pipeline = ShadowSurfacePipeline::new();
        pipeline.begin_sync(1);
        let uuid = ShaderUuid::encode(
            GeometryType::Mesh,
            PipelineType::Shadow,
            DisplacementType::Bump,
            ThicknessMode::Sphere,
            VisibilityFlags::SHADOW,
        );
        let single = MaterialDescriptor::default();
        let hybrid_single = MaterialDescriptor {
            flags: single.flags | MaterialFlags::HYBRID,
            ..MaterialDescriptor::default()
        };
        for desc in [&single, &hybrid_single] {
            pipeline.add_caster(&SurfaceDraw {
                object: ObjectId::null(),
                material: MaterialId::null(),
                descriptor: desc,
                key: MaterialKey::new(MaterialId::null(), uuid),
            });
        }
        assert_eq!(pipeline.passes.len(), 1, "hybrid flag must not split shadow buckets");
    }

    #[test]
    fn opt_out_materials_get_no_bucket() {
        let mut pipeline = ShadowSurfacePipeline::new();
        pipeline.begin_sync(1);
        let uuid = ShaderUuid::encode(
            GeometryType::Mesh,
            PipelineType::Shadow,
            DisplacementType::Bump,
            ThicknessMode::Sphere,
            VisibilityFlags::SHADOW,
        );
        let no_cast = MaterialDescriptor {
            flags: MaterialFlags::CULL_BACKFACE,
            ..MaterialDescriptor::default()
        };
        let handle = pipeline.add_caster(&SurfaceDraw {
            object: ObjectId::null(),
            material: MaterialId::null(),
            descriptor: &no_cast,
            key: MaterialKey::new(MaterialId::null(), uuid),
        });
        assert!(handle.is_none(), "a non-casting material must be dropped");
        assert!(pipeline.passes.is_empty());
    }
}
