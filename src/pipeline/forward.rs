//! Forward Pipeline
//!
//! Surfaces that cannot (blended) or should not (explicitly forward-shaded)
//! write a G-buffer render here: a depth prepass split by sidedness, four
//! opaque material buckets split by sidedness and the hybrid flag, and an
//! alpha-blended tail submitted after every opaque bucket so blending reads
//! the finished opaque depth.

use rustc_hash::FxHashMap;

use crate::keys::MaterialKey;
use crate::material::MaterialFlags;
use crate::pass::{BlendStateKey, PassList, RasterState, SubPassHandle, SubPassShader};

use super::{DrawEncoder, MaterialBucket, SurfaceDraw};

const PREPASS_NAMES: [&str; 2] = ["forward.prepass", "forward.prepass_double"];
const MATERIAL_NAMES: [&str; 4] = [
    "forward.single",
    "forward.single_hybrid",
    "forward.double",
    "forward.double_hybrid",
];
const BLEND_NAME: &str = "forward.blend";

pub struct ForwardPipeline {
    pub passes: PassList,
    prepass: FxHashMap<(bool, MaterialKey), SubPassHandle>,
    opaque: FxHashMap<(MaterialBucket, MaterialKey), SubPassHandle>,
    /// Blended buckets are kept separate so they can be submitted last.
    blend: Vec<(MaterialKey, SubPassHandle)>,
    pub blend_list: PassList,
}

impl Default for ForwardPipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl ForwardPipeline {
    #[must_use]
    pub fn new() -> Self {
        Self {
            passes: PassList::new(),
            prepass: FxHashMap::default(),
            opaque: FxHashMap::default(),
            blend: Vec::new(),
            blend_list: PassList::new(),
        }
    }

    pub fn begin_sync(&mut self, frame: u64) {
        self.passes.begin_sync(frame);
        self.blend_list.begin_sync(frame);
        self.prepass.clear();
        self.opaque.clear();
        self.blend.clear();
    }

    pub fn add_prepass(&mut self, surface: &SurfaceDraw<'_>) -> SubPassHandle {
        let double = !surface
            .descriptor
            .flags
            .contains(MaterialFlags::CULL_BACKFACE);
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
            PREPASS_NAMES[usize::from(double)],
            state,
            SubPassShader::Material(surface.key),
        );
        self.prepass.insert(key, handle);
        handle
    }

    pub fn add_material(&mut self, surface: &SurfaceDraw<'_>) -> SubPassHandle {
        if surface.descriptor.flags.contains(MaterialFlags::BLEND) {
            return self.add_blend(surface);
        }
        let bucket = MaterialBucket::from_flags(surface.descriptor.flags);
        let key = (bucket, surface.key);
        if let Some(&handle) = self.opaque.get(&key) {
            return handle;
        }
        let state = if bucket.double_sided() {
            RasterState::OPAQUE.double_sided()
        } else {
            RasterState::OPAQUE
        };
        let handle = self.passes.declare(
            MATERIAL_NAMES[bucket.index()],
            state,
            SubPassShader::Material(surface.key),
        );
        self.opaque.insert(key, handle);
        handle
    }

    fn add_blend(&mut self, surface: &SurfaceDraw<'_>) -> SubPassHandle {
        if let Some(&(_, handle)) = self.blend.iter().find(|(k, _)| *k == surface.key) {
            return handle;
        }
        // Blended surfaces test depth but never write it.
        let state = RasterState {
            depth_write: false,
            ..RasterState::OPAQUE.double_sided()
        }
        .with_blend(BlendStateKey::ALPHA);
        let handle = self
            .blend_list
            .declare(BLEND_NAME, state, SubPassShader::Material(surface.key));
        self.blend.push((surface.key, handle));
        handle
    }

    /// Append a draw to a blended bucket (blend handles index the separate
    /// tail list, not the opaque list).
    pub fn push_blend(&mut self, handle: SubPassHandle, command: crate::pass::DrawCommand) {
        self.blend_list.push(handle, command);
    }

    /// Encode the forward pass: prepass and opaque buckets in declaration
    /// order, then the blended tail.
    pub fn render(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        target: &wgpu::TextureView,
        draw: &mut dyn DrawEncoder,
    ) {
        if self.passes.is_empty() && self.blend_list.is_empty() {
            return;
        }
        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("forward"),
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
        for sub_pass in self.passes.iter().chain(self.blend_list.iter()) {
            draw.encode(&mut pass, sub_pass);
        }
    }
}
