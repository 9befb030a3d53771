//! Sub-Pass Composition
//!
//! A *sub-pass* is a named bucket of draw commands sharing GPU raster state
//! and one shader variant. Pipelines declare their sub-passes during
//! `begin_sync`, surfaces are appended between the sync calls, and
//! `render` submits buckets strictly in declaration order — that order is
//! the only cross-pass ordering guarantee within a pipeline.
//!
//! The raster-state types are hashable mirrors of the corresponding `wgpu`
//! state structs (which do not implement `Hash`/`Eq` themselves), reduced
//! to the fields that participate in sub-pass identity.

use smallvec::SmallVec;

use crate::keys::MaterialKey;
use crate::material::ObjectId;
use crate::shader::StaticShader;

// ─── Hashable State Mirrors ──────────────────────────────────────────────────

/// Hashable mirror of `wgpu::BlendComponent`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlendComponentKey {
    pub src_factor: wgpu::BlendFactor,
    pub dst_factor: wgpu::BlendFactor,
    pub operation: wgpu::BlendOperation,
}

/// Hashable mirror of `wgpu::BlendState`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlendStateKey {
    pub color: BlendComponentKey,
    pub alpha: BlendComponentKey,
}

impl BlendStateKey {
    /// Standard premultiplied alpha-over blending.
    pub const ALPHA: Self = Self {
        color: BlendComponentKey {
            src_factor: wgpu::BlendFactor::One,
            dst_factor: wgpu::BlendFactor::OneMinusSrcAlpha,
            operation: wgpu::BlendOperation::Add,
        },
        alpha: BlendComponentKey {
            src_factor: wgpu::BlendFactor::One,
            dst_factor: wgpu::BlendFactor::OneMinusSrcAlpha,
            operation: wgpu::BlendOperation::Add,
        },
    };

    /// Additive accumulation (light evaluation into radiance buffers).
    pub const ADDITIVE: Self = Self {
        color: BlendComponentKey {
            src_factor: wgpu::BlendFactor::One,
            dst_factor: wgpu::BlendFactor::One,
            operation: wgpu::BlendOperation::Add,
        },
        alpha: BlendComponentKey {
            src_factor: wgpu::BlendFactor::One,
            dst_factor: wgpu::BlendFactor::One,
            operation: wgpu::BlendOperation::Add,
        },
    };
}

impl From<BlendStateKey> for wgpu::BlendState {
    fn from(k: BlendStateKey) -> Self {
        wgpu::BlendState {
            color: wgpu::BlendComponent {
                src_factor: k.color.src_factor,
                dst_factor: k.color.dst_factor,
                operation: k.color.operation,
            },
            alpha: wgpu::BlendComponent {
                src_factor: k.alpha.src_factor,
                dst_factor: k.alpha.dst_factor,
                operation: k.alpha.operation,
            },
        }
    }
}

/// Stencil-equal test configuration for selective fullscreen passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StencilTest {
    pub compare: wgpu::CompareFunction,
    pub reference: u32,
    pub read_mask: u32,
    pub write_mask: u32,
}

/// GPU raster state for one sub-pass bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct RasterState {
    pub cull_backface: bool,
    pub depth_write: bool,
    pub depth_compare: wgpu::CompareFunction,
    pub blend: Option<BlendStateKey>,
    pub stencil: Option<StencilTest>,
}

impl RasterState {
    /// Depth-tested opaque geometry, greater-equal for reverse-Z.
    pub const OPAQUE: Self = Self {
        cull_backface: true,
        depth_write: true,
        depth_compare: wgpu::CompareFunction::GreaterEqual,
        blend: None,
        stencil: None,
    };

    /// Depth-only prepass state.
    pub const PREPASS: Self = Self {
        cull_backface: true,
        depth_write: true,
        depth_compare: wgpu::CompareFunction::GreaterEqual,
        blend: None,
        stencil: None,
    };

    /// Fullscreen evaluation pass: no depth interaction.
    pub const FULLSCREEN: Self = Self {
        cull_backface: false,
        depth_write: false,
        depth_compare: wgpu::CompareFunction::Always,
        blend: None,
        stencil: None,
    };

    #[must_use]
    pub const fn double_sided(mut self) -> Self {
        self.cull_backface = false;
        self
    }

    #[must_use]
    pub const fn with_blend(mut self, blend: BlendStateKey) -> Self {
        self.blend = Some(blend);
        self
    }

    #[must_use]
    pub const fn with_stencil(mut self, stencil: StencilTest) -> Self {
        self.stencil = Some(stencil);
        self
    }
}

// ─── Draw Commands ───────────────────────────────────────────────────────────

/// Shader bound to a sub-pass bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SubPassShader {
    /// One of the fixed utility shaders.
    Static(StaticShader),
    /// Material shader variant shared by every draw in the bucket.
    Material(MaterialKey),
    /// Fullscreen/compute pass with no per-draw geometry.
    None,
}

/// One surface draw recorded by the caller through a [`SubPassHandle`].
///
/// The renderer does not own per-object geometry; the caller supplies
/// opaque buffer identifiers and ranges which the (excluded) geometry layer
/// resolves at encode time.
#[derive(Debug, Clone, Copy)]
pub struct DrawCommand {
    pub object: ObjectId,
    /// Caller-side vertex buffer identifier.
    pub vertex_buffer: u64,
    /// Caller-side index buffer identifier, 0 when non-indexed.
    pub index_buffer: u64,
    pub element_count: u32,
    pub instance_count: u32,
}

/// One named bucket of draws sharing state + shader.
#[derive(Debug)]
pub struct SubPass {
    pub name: &'static str,
    pub state: RasterState,
    pub shader: SubPassShader,
    pub commands: Vec<DrawCommand>,
}

/// Opaque handle the caller uses to append draws to a sub-pass.
///
/// Valid only for the frame it was issued in; the frame stamp guards
/// against a handle outliving its `begin_sync`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubPassHandle {
    index: u32,
    frame: u64,
}

// ─── Pass List ───────────────────────────────────────────────────────────────

/// Ordered sub-pass collection for one pipeline, rebuilt every frame.
#[derive(Debug, Default)]
pub struct PassList {
    frame: u64,
    sub_passes: Vec<SubPass>,
}

impl PassList {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reset for a new frame. Outstanding [`SubPassHandle`]s become stale.
    pub fn begin_sync(&mut self, frame: u64) {
        self.frame = frame;
        self.sub_passes.clear();
    }

    /// Declare a sub-pass bucket. Buckets are submitted in declaration
    /// order at render time.
    pub fn declare(
        &mut self,
        name: &'static str,
        state: RasterState,
        shader: SubPassShader,
    ) -> SubPassHandle {
        let index = self.sub_passes.len() as u32;
        self.sub_passes.push(SubPass {
            name,
            state,
            shader,
            commands: Vec::new(),
        });
        SubPassHandle {
            index,
            frame: self.frame,
        }
    }

    /// Append a draw to a previously declared bucket.
    ///
    /// A handle from an earlier frame is ignored with a diagnostic — the
    /// draw belongs to state that no longer exists.
    pub fn push(&mut self, handle: SubPassHandle, command: DrawCommand) {
        if handle.frame != self.frame {
            log::warn!("dropping draw recorded with a stale sub-pass handle");
            return;
        }
        self.sub_passes[handle.index as usize].commands.push(command);
    }

    #[must_use]
    pub fn get(&self, handle: SubPassHandle) -> Option<&SubPass> {
        (handle.frame == self.frame).then(|| &self.sub_passes[handle.index as usize])
    }

    /// Sub-passes in declaration (submission) order.
    pub fn iter(&self) -> impl Iterator<Item = &SubPass> {
        self.sub_passes.iter()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.sub_passes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.sub_passes.is_empty()
    }

    /// Names in submission order — used by ordering regression tests.
    #[must_use]
    pub fn names(&self) -> SmallVec<[&'static str; 8]> {
        self.sub_passes.iter().map(|p| p.name).collect()
    }
}
