//! Deferred Layer Engine
//!
//! A deferred *layer* owns one G-buffer fill plus the lighting passes over
//! it. Two layers exist per view: the opaque layer and the refraction layer
//! (surfaces whose closures refract what is behind them). Each layer
//! accumulates the union of closure bits across the materials drawn into it
//! this frame, and `end_sync` turns that union into concrete decisions:
//! split vs merged radiance buffers, screen tracing vs probe fallback, and
//! which of the three closure-count-specialized light-eval shader variants
//! to run.
//!
//! Pixel classification is stencil-driven: after the G-buffer fill, a
//! fullscreen classify pass writes per-pixel stencil bits (closure count,
//! transmission, shadow-derived thickness) decoded from the G-buffer
//! header; light-eval variants then select their pixels with stencil-equal
//! tests instead of per-pixel branching.

use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use crate::closure::{self, ClosureBits, MAX_CLOSURE_COUNT};
use crate::keys::MaterialKey;
use crate::pass::{
    BlendStateKey, PassList, RasterState, StencilTest, SubPassHandle, SubPassShader,
};
use crate::pool::{TexturePool, TextureShape};
use crate::settings::RendererSettings;
use crate::shader::StaticShader;

use super::{DrawEncoder, MaterialBucket, SurfaceDraw};

/// Stencil bit assignments shared by the classify pass and the WGSL side.
pub mod stencil {
    /// Two-bit per-pixel closure count, values 1..=3.
    pub const CLOSURE_COUNT_MASK: u32 = 0b0011;
    /// Pixel has a transmission closure.
    pub const TRANSMISSION: u32 = 1 << 2;
    /// Pixel's material reconstructs thickness from the shadow map.
    pub const THICKNESS_FROM_SHADOW: u32 = 1 << 3;
}

/// Sub-pass name table for one G-buffer builder instance.
#[derive(Debug, Clone, Copy)]
pub struct BucketNames {
    pub prepass: [&'static str; 2],
    pub material: [&'static str; 4],
}

/// G-buffer fill composition, embedded by value in every pipeline variant
/// that renders one (deferred layers, probe captures).
///
/// Tracks the per-frame closure union and the maximum per-pixel closure
/// count alongside the sub-pass buckets themselves.
pub struct GBufferPassBuilder {
    names: BucketNames,
    pub passes: PassList,
    prepass: FxHashMap<(bool, MaterialKey), SubPassHandle>,
    material: FxHashMap<(MaterialBucket, MaterialKey), SubPassHandle>,
    closure_bits: ClosureBits,
    closure_count: u32,
}

impl GBufferPassBuilder {
    #[must_use]
    pub fn new(names: BucketNames) -> Self {
        Self {
            names,
            passes: PassList::new(),
            prepass: FxHashMap::default(),
            material: FxHashMap::default(),
            closure_bits: ClosureBits::empty(),
            closure_count: 0,
        }
    }

    pub fn begin_sync(&mut self, frame: u64) {
        self.passes.begin_sync(frame);
        self.prepass.clear();
        self.material.clear();
        // Recomputed from scratch; closure state never survives a frame.
        self.closure_bits = ClosureBits::empty();
        self.closure_count = 0;
    }

    /// Depth-only prepass bucket, split by sidedness.
    pub fn add_prepass(&mut self, surface: &SurfaceDraw<'_>) -> SubPassHandle {
        let double = !surface
            .descriptor
            .flags
            .contains(crate::material::MaterialFlags::CULL_BACKFACE);
        let key = (double, surface.key);
        if let Some(&handle) = self.prepass.get(&key) {
            return handle;
        }
        let state = if double {
            RasterState::PREPASS.double_sided()
        } else {
            RasterState::PREPASS
        };
        let handle = self.passes.declare(
            self.names.prepass[usize::from(double)],
            state,
            SubPassShader::Material(surface.key),
        );
        self.prepass.insert(key, handle);
        handle
    }

    /// G-buffer material bucket; accumulates the surface's closures into
    /// the layer union.
    pub fn add_material(&mut self, surface: &SurfaceDraw<'_>) -> SubPassHandle {
        let bits = closure::effective_bits(surface.descriptor.closures);
        self.closure_bits |= bits;
        self.closure_count = self
            .closure_count
            .max(closure::closure_count(surface.descriptor.closures));

        let bucket = MaterialBucket::from_flags(surface.descriptor.flags);
        let key = (bucket, surface.key);
        if let Some(&handle) = self.material.get(&key) {
            return handle;
        }
        let state = if bucket.double_sided() {
            RasterState::OPAQUE.double_sided()
        } else {
            RasterState::OPAQUE
        };
        let handle = self.passes.declare(
            self.names.material[bucket.index()],
            state,
            SubPassShader::Material(surface.key),
        );
        self.material.insert(key, handle);
        handle
    }

    #[must_use]
    pub fn closure_bits(&self) -> ClosureBits {
        self.closure_bits
    }

    /// Maximum per-pixel evaluated closure count this frame, `0` when no
    /// surface was added.
    #[must_use]
    pub fn closure_count(&self) -> u32 {
        self.closure_count
    }

    #[must_use]
    pub fn has_surfaces(&self) -> bool {
        !self.material.is_empty()
    }

    /// G-buffer normal layers needed for the accumulated closure union.
    #[must_use]
    pub fn normal_layer_count(&self) -> u32 {
        closure::normal_layer_count(self.closure_bits)
    }
}

// ─── Layer Plan ──────────────────────────────────────────────────────────────

/// Position of a layer in the per-frame layer chain, as seen by `end_sync`.
#[derive(Debug, Clone, Copy)]
pub struct LayerChain {
    pub is_first_layer: bool,
    pub is_last_layer: bool,
    /// A later layer refracts and will read this layer's resolved radiance.
    pub later_layer_refracts: bool,
}

/// Frozen lighting decisions for one deferred layer.
#[derive(Debug, Clone)]
pub struct LayerPlan {
    pub use_raytracing: bool,
    /// Direct and indirect light accumulate into separate buffers, needed
    /// for radiance clamping and for feeding the ray-trace denoiser.
    pub use_split_radiance: bool,
    pub use_screen_transmission: bool,
    pub use_screen_reflection: bool,
    /// Copy this layer's resolved radiance into a feedback buffer the next
    /// layer's refraction pass reads.
    pub use_feedback_output: bool,
    /// Pooled direct-radiance textures to acquire at render time.
    pub direct_radiance_count: u32,
    /// Pooled indirect-radiance textures; `0` when radiance is merged.
    pub indirect_radiance_count: u32,
    /// Light-eval variants in submission order, most expensive first.
    pub light_eval: SmallVec<[StaticShader; 3]>,
}

impl LayerPlan {
    fn inactive() -> Self {
        Self {
            use_raytracing: false,
            use_split_radiance: false,
            use_screen_transmission: false,
            use_screen_reflection: false,
            use_feedback_output: false,
            direct_radiance_count: 0,
            indirect_radiance_count: 0,
            light_eval: SmallVec::new(),
        }
    }
}

const LIGHT_EVAL_VARIANTS: [StaticShader; MAX_CLOSURE_COUNT as usize] = [
    StaticShader::DeferredLightEval1,
    StaticShader::DeferredLightEval2,
    StaticShader::DeferredLightEval3,
];

// ─── Deferred Layer ──────────────────────────────────────────────────────────

const DIRECT_RADIANCE_NAMES: [&str; 3] = [
    "deferred.direct_radiance_0",
    "deferred.direct_radiance_1",
    "deferred.direct_radiance_2",
];
const INDIRECT_RADIANCE_NAMES: [&str; 3] = [
    "deferred.indirect_radiance_0",
    "deferred.indirect_radiance_1",
    "deferred.indirect_radiance_2",
];

/// One deferred layer: G-buffer fill plus classify / light-eval / combine.
pub struct DeferredLayer {
    pub gbuffer: GBufferPassBuilder,
    classify_name: &'static str,
    eval_names: [&'static str; 3],
    combine_name: &'static str,
}

impl DeferredLayer {
    fn new(
        names: BucketNames,
        classify_name: &'static str,
        eval_names: [&'static str; 3],
        combine_name: &'static str,
    ) -> Self {
        Self {
            gbuffer: GBufferPassBuilder::new(names),
            classify_name,
            eval_names,
            combine_name,
        }
    }

    pub fn begin_sync(&mut self, frame: u64) {
        self.gbuffer.begin_sync(frame);
    }

    /// Freeze this layer's decisions and declare its lighting sub-passes.
    pub fn end_sync(&mut self, settings: &RendererSettings, chain: LayerChain) -> LayerPlan {
        if !self.gbuffer.has_surfaces() {
            return LayerPlan::inactive();
        }
        let bits = self.gbuffer.closure_bits();
        let eval_count = self.gbuffer.closure_count().min(MAX_CLOSURE_COUNT);

        let use_raytracing = settings.raytracing && bits.has_raytraced();
        let use_split_radiance = use_raytracing || settings.any_clamp_active();
        let use_screen_transmission =
            settings.raytracing && bits.has_transmission() && !chain.is_first_layer;
        let use_screen_reflection = settings.raytracing && bits.contains(ClosureBits::REFLECTION);
        let use_feedback_output = (use_raytracing || chain.later_layer_refracts)
            && (!chain.is_last_layer || use_screen_reflection);

        self.gbuffer.passes.declare(
            self.classify_name,
            RasterState::FULLSCREEN.with_stencil(StencilTest {
                compare: wgpu::CompareFunction::Always,
                reference: 0,
                read_mask: 0,
                write_mask: stencil::CLOSURE_COUNT_MASK
                    | stencil::TRANSMISSION
                    | stencil::THICKNESS_FROM_SHADOW,
            }),
            SubPassShader::Static(StaticShader::DeferredClassify),
        );

        // Expensive-first: the 3-closure variant is the longest-running GPU
        // work, so it goes into the queue before the cheap ones.
        let mut light_eval = SmallVec::new();
        for count in (1..=eval_count).rev() {
            let shader = LIGHT_EVAL_VARIANTS[(count - 1) as usize];
            light_eval.push(shader);
            self.gbuffer.passes.declare(
                self.eval_names[(count - 1) as usize],
                RasterState::FULLSCREEN
                    .with_blend(BlendStateKey::ADDITIVE)
                    .with_stencil(StencilTest {
                        compare: wgpu::CompareFunction::Equal,
                        reference: count,
                        read_mask: stencil::CLOSURE_COUNT_MASK,
                        write_mask: 0,
                    }),
                SubPassShader::Static(shader),
            );
        }

        self.gbuffer.passes.declare(
            self.combine_name,
            RasterState::FULLSCREEN,
            SubPassShader::Static(StaticShader::DeferredCombine),
        );

        LayerPlan {
            use_raytracing,
            use_split_radiance,
            use_screen_transmission,
            use_screen_reflection,
            use_feedback_output,
            direct_radiance_count: eval_count,
            indirect_radiance_count: if use_split_radiance { eval_count } else { 0 },
            light_eval,
        }
    }

    /// Encode this layer's composed sub-passes.
    ///
    /// Radiance accumulators are pooled; they are acquired here and handed
    /// back as soon as the last pass reading them has been recorded.
    pub fn render(
        &self,
        plan: &LayerPlan,
        device: &wgpu::Device,
        encoder: &mut wgpu::CommandEncoder,
        pool: &mut TexturePool,
        target: &wgpu::TextureView,
        extent: (u32, u32),
        draw: &mut dyn DrawEncoder,
    ) {
        if plan.direct_radiance_count == 0 {
            return;
        }
        let shape = TextureShape::color_2d(extent.0, extent.1, wgpu::TextureFormat::Rgba16Float);
        let mut radiance = Vec::new();
        for name in DIRECT_RADIANCE_NAMES
            .iter()
            .take(plan.direct_radiance_count as usize)
        {
            radiance.push(pool.acquire(device, name, shape));
        }
        for name in INDIRECT_RADIANCE_NAMES
            .iter()
            .take(plan.indirect_radiance_count as usize)
        {
            radiance.push(pool.acquire(device, name, shape));
        }

        {
            let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
                label: Some(self.combine_name),
                color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                    view: target,
                    resolve_target: None,
                    ops: wgpu::Operations {
                        load: wgpu::LoadOp::Load,
                        store: wgpu::StoreOp::Store,
                    },
                    depth_slice: None,
                })],
                ..Default::default()
            });
            for sub_pass in self.gbuffer.passes.iter() {
                draw.encode(&mut pass, sub_pass);
            }
        }

        // Last read of the radiance accumulators is recorded; release.
        for handle in radiance {
            pool.release(handle);
        }
    }
}

// ─── Deferred Pipeline ───────────────────────────────────────────────────────

/// Frozen decisions for both layers of the deferred pipeline.
#[derive(Debug, Clone)]
pub struct DeferredPlan {
    pub opaque: LayerPlan,
    pub refraction: LayerPlan,
}

/// The two-layer deferred pipeline: opaque first, refraction behind it.
pub struct DeferredPipeline {
    pub opaque_layer: DeferredLayer,
    pub refraction_layer: DeferredLayer,
}

impl Default for DeferredPipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl DeferredPipeline {
    #[must_use]
    pub fn new() -> Self {
        Self {
            opaque_layer: DeferredLayer::new(
                BucketNames {
                    prepass: ["deferred.opaque.prepass", "deferred.opaque.prepass_double"],
                    material: [
                        "deferred.opaque.single",
                        "deferred.opaque.single_hybrid",
                        "deferred.opaque.double",
                        "deferred.opaque.double_hybrid",
                    ],
                },
                "deferred.opaque.classify",
                [
                    "deferred.opaque.eval_1",
                    "deferred.opaque.eval_2",
                    "deferred.opaque.eval_3",
                ],
                "deferred.opaque.combine",
            ),
            refraction_layer: DeferredLayer::new(
                BucketNames {
                    prepass: [
                        "deferred.refraction.prepass",
                        "deferred.refraction.prepass_double",
                    ],
                    material: [
                        "deferred.refraction.single",
                        "deferred.refraction.single_hybrid",
                        "deferred.refraction.double",
                        "deferred.refraction.double_hybrid",
                    ],
                },
                "deferred.refraction.classify",
                [
                    "deferred.refraction.eval_1",
                    "deferred.refraction.eval_2",
                    "deferred.refraction.eval_3",
                ],
                "deferred.refraction.combine",
            ),
        }
    }

    pub fn begin_sync(&mut self, frame: u64) {
        self.opaque_layer.begin_sync(frame);
        self.refraction_layer.begin_sync(frame);
    }

    pub fn add_prepass(&mut self, surface: &SurfaceDraw<'_>) -> SubPassHandle {
        self.layer_for(surface).add_prepass(surface)
    }

    pub fn add_material(&mut self, surface: &SurfaceDraw<'_>) -> SubPassHandle {
        self.layer_for(surface).add_material(surface)
    }

    fn layer_for(&mut self, surface: &SurfaceDraw<'_>) -> &mut GBufferPassBuilder {
        // Refracting surfaces need the opaque result behind them; everything
        // else fills the opaque layer.
        if surface
            .descriptor
            .closures
            .contains(ClosureBits::REFRACTION)
        {
            &mut self.refraction_layer.gbuffer
        } else {
            &mut self.opaque_layer.gbuffer
        }
    }

    pub fn end_sync(&mut self, settings: &RendererSettings) -> DeferredPlan {
        let refraction_active = self.refraction_layer.gbuffer.has_surfaces();
        let later_layer_refracts = refraction_active
            && self
                .refraction_layer
                .gbuffer
                .closure_bits()
                .contains(ClosureBits::REFRACTION);

        let opaque = self.opaque_layer.end_sync(
            settings,
            LayerChain {
                is_first_layer: true,
                is_last_layer: !refraction_active,
                later_layer_refracts,
            },
        );
        let refraction = self.refraction_layer.end_sync(
            settings,
            LayerChain {
                is_first_layer: false,
                is_last_layer: true,
                later_layer_refracts: false,
            },
        );
        DeferredPlan { opaque, refraction }
    }

    /// Encode both layers in dependency order (opaque feeds refraction).
    #[allow(clippy::too_many_arguments)]
    pub fn render(
        &self,
        plan: &DeferredPlan,
        device: &wgpu::Device,
        encoder: &mut wgpu::CommandEncoder,
        pool: &mut TexturePool,
        target: &wgpu::TextureView,
        extent: (u32, u32),
        draw: &mut dyn DrawEncoder,
    ) {
        self.opaque_layer
            .render(&plan.opaque, device, encoder, pool, target, extent, draw);
        self.refraction_layer
            .render(&plan.refraction, device, encoder, pool, target, extent, draw);
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

    fn surface(desc: &MaterialDescriptor) -> SurfaceDraw<'_> {
        let uuid = ShaderUuid::encode(
            GeometryType::Mesh,
            PipelineType::Deferred,
            DisplacementType::Bump,
            ThicknessMode::Sphere,
            VisibilityFlags::CAMERA,
        );
        SurfaceDraw {
            object: ObjectId::null(),
            material: MaterialId::null(),
            descriptor: desc,
            key: MaterialKey::new(MaterialId::null(), uuid),
        }
    }

    fn settings() -> RendererSettings {
        RendererSettings {
            clamp_direct: 0.0,
            clamp_indirect: 0.0,
            ..RendererSettings::default()
        }
    }

    #[test]
    fn empty_layer_stays_inactive() {
        let mut pipeline = DeferredPipeline::new();
        pipeline.begin_sync(1);
        let plan = pipeline.end_sync(&settings());
        assert_eq!(plan.opaque.direct_radiance_count, 0);
        assert!(plan.opaque.light_eval.is_empty());
    }

    #[test]
    fn light_eval_runs_expensive_first_behind_stencil_tests() {
        let desc = MaterialDescriptor {
            closures: ClosureBits::DIFFUSE | ClosureBits::REFLECTION | ClosureBits::SUBSURFACE,
            ..MaterialDescriptor::default()
        };
        let mut pipeline = DeferredPipeline::new();
        pipeline.begin_sync(1);
        pipeline.add_material(&surface(&desc));
        let plan = pipeline.end_sync(&settings());

        assert_eq!(
            plan.opaque.light_eval.as_slice(),
            [
                StaticShader::DeferredLightEval3,
                StaticShader::DeferredLightEval2,
                StaticShader::DeferredLightEval1,
            ]
        );
        let layer = &pipeline.opaque_layer.gbuffer.passes;
        let eval3 = layer
            .iter()
            .find(|p| p.shader == SubPassShader::Static(StaticShader::DeferredLightEval3))
            .unwrap();
        let stencil = eval3.state.stencil.unwrap();
        assert_eq!(stencil.compare, wgpu::CompareFunction::Equal);
        assert_eq!(stencil.reference, 3);
        assert_eq!(stencil.read_mask, stencil::CLOSURE_COUNT_MASK);
    }

    #[test]
    fn split_radiance_follows_raytracing_and_clamps() {
        let desc = MaterialDescriptor {
            closures: ClosureBits::DIFFUSE,
            ..MaterialDescriptor::default()
        };

        // Diffuse only, no clamps: merged radiance.
        let mut pipeline = DeferredPipeline::new();
        pipeline.begin_sync(1);
        pipeline.add_material(&surface(&desc));
        let plan = pipeline.end_sync(&settings());
        assert!(!plan.opaque.use_raytracing, "diffuse alone never ray-traces");
        assert!(!plan.opaque.use_split_radiance);
        assert_eq!(plan.opaque.indirect_radiance_count, 0);

        // A clamp forces the split even without ray tracing.
        let clamped = RendererSettings {
            clamp_direct: 5.0,
            ..settings()
        };
        let mut pipeline = DeferredPipeline::new();
        pipeline.begin_sync(1);
        pipeline.add_material(&surface(&desc));
        let plan = pipeline.end_sync(&clamped);
        assert!(plan.opaque.use_split_radiance);
        assert_eq!(plan.opaque.indirect_radiance_count, 1);
    }

    #[test]
    fn first_layer_never_screen_traces_transmission() {
        let refractive = MaterialDescriptor {
            closures: ClosureBits::DIFFUSE | ClosureBits::REFRACTION,
            ..MaterialDescriptor::default()
        };
        let opaque_sss = MaterialDescriptor {
            closures: ClosureBits::DIFFUSE | ClosureBits::SUBSURFACE,
            ..MaterialDescriptor::default()
        };
        let mut pipeline = DeferredPipeline::new();
        pipeline.begin_sync(1);
        pipeline.add_material(&surface(&opaque_sss));
        pipeline.add_material(&surface(&refractive));
        let plan = pipeline.end_sync(&settings());

        assert!(
            !plan.opaque.use_screen_transmission,
            "nothing exists behind the first layer to refract against"
        );
        assert!(plan.refraction.use_screen_transmission);
        // The opaque result feeds the refraction layer.
        assert!(plan.opaque.use_feedback_output);
        assert!(!plan.refraction.use_feedback_output, "last layer with no reflection consumer");
    }

    #[test]
    fn refracting_surfaces_route_to_the_refraction_layer() {
        let refractive = MaterialDescriptor {
            closures: ClosureBits::REFRACTION,
            ..MaterialDescriptor::default()
        };
        let mut pipeline = DeferredPipeline::new();
        pipeline.begin_sync(1);
        pipeline.add_material(&surface(&refractive));
        assert!(!pipeline.opaque_layer.gbuffer.has_surfaces());
        assert!(pipeline.refraction_layer.gbuffer.has_surfaces());
    }
}
