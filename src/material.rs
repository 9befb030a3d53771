//! Material & Surface Classification Model
//!
//! The renderer never sees scene geometry directly — the excluded scene-sync
//! layer hands it a resolved [`MaterialDescriptor`] per surface, plus the
//! per-object [`VisibilityFlags`]. Everything a pipeline needs to route a
//! surface into the right sub-pass lives here.
//!
//! Materials are addressed through generation-checked [`MaterialId`] slot-map
//! keys rather than raw pointers, so a stale key can never alias a newly
//! allocated material.

use bitflags::bitflags;
use slotmap::{SlotMap, new_key_type};

use crate::closure::ClosureBits;

new_key_type! {
    /// Generation-checked handle to a material registered with the renderer.
    pub struct MaterialId;

    /// Generation-checked handle to a scene object.
    pub struct ObjectId;
}

// ─── Geometry / Pipeline Classification ──────────────────────────────────────

/// Geometry families a shader variant can be specialized for.
///
/// Encoded in 4 bits of the shader uuid (see [`crate::keys::ShaderUuid`]);
/// the numeric values are part of that encoding and must not be reordered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum GeometryType {
    Mesh = 0,
    Curves = 1,
    PointCloud = 2,
    Volume = 3,
    World = 4,
}

impl GeometryType {
    pub const ALL: [Self; 5] = [
        Self::Mesh,
        Self::Curves,
        Self::PointCloud,
        Self::Volume,
        Self::World,
    ];

    #[must_use]
    pub const fn from_bits(bits: u64) -> Option<Self> {
        match bits {
            0 => Some(Self::Mesh),
            1 => Some(Self::Curves),
            2 => Some(Self::PointCloud),
            3 => Some(Self::Volume),
            4 => Some(Self::World),
            _ => None,
        }
    }
}

/// Pipeline families a surface can be drawn through.
///
/// Encoded in 4 bits of the shader uuid. `VolumeMaterial` and
/// `VolumeOccupancy` are only valid when handed straight to the volume
/// pipeline; the generic dispatcher rejects them (see
/// [`crate::pipeline::PipelineModules::material_add`]).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PipelineType {
    Deferred = 0,
    DeferredPrepass = 1,
    Forward = 2,
    ForwardPrepass = 3,
    Shadow = 4,
    Capture = 5,
    VolumeMaterial = 6,
    VolumeOccupancy = 7,
}

impl PipelineType {
    pub const ALL: [Self; 8] = [
        Self::Deferred,
        Self::DeferredPrepass,
        Self::Forward,
        Self::ForwardPrepass,
        Self::Shadow,
        Self::Capture,
        Self::VolumeMaterial,
        Self::VolumeOccupancy,
    ];

    #[must_use]
    pub const fn from_bits(bits: u64) -> Option<Self> {
        match bits {
            0 => Some(Self::Deferred),
            1 => Some(Self::DeferredPrepass),
            2 => Some(Self::Forward),
            3 => Some(Self::ForwardPrepass),
            4 => Some(Self::Shadow),
            5 => Some(Self::Capture),
            6 => Some(Self::VolumeMaterial),
            7 => Some(Self::VolumeOccupancy),
            _ => None,
        }
    }

    /// `true` for the two volume-only pipeline types that must never reach
    /// the generic surface dispatcher.
    #[inline]
    #[must_use]
    pub const fn is_volume(self) -> bool {
        matches!(self, Self::VolumeMaterial | Self::VolumeOccupancy)
    }
}

/// How the material displaces geometry. One bit of the shader uuid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum DisplacementType {
    #[default]
    Bump = 0,
    Displace = 1,
}

/// How subsurface/volume thickness is estimated. One bit of the shader uuid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum ThicknessMode {
    #[default]
    Sphere = 0,
    Slab = 1,
}

bitflags! {
    /// Per-object visibility toggles.
    ///
    /// These feed the top 4 bits of the shader uuid: two objects sharing a
    /// material but differing in visibility must resolve to distinct shader
    /// variants (probe-only geometry compiles different outputs).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct VisibilityFlags: u8 {
        const CAMERA       = 1 << 0;
        const SHADOW       = 1 << 1;
        const PROBE_CUBE   = 1 << 2;
        const PROBE_PLANAR = 1 << 3;
    }
}

bitflags! {
    /// Resolved material feature flags consumed by sub-pass routing.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct MaterialFlags: u16 {
        /// Single-sided: back faces are culled.
        const CULL_BACKFACE        = 1 << 0;
        /// Uses the shader-to-rgba (NPR) path; needs the hybrid sub-pass
        /// buckets so deferred data and forward color mix correctly.
        const HYBRID               = 1 << 1;
        /// Alpha-blended; routed to forward regardless of requested pipeline.
        const BLEND                = 1 << 2;
        /// Participates in shadow-map rendering.
        const CAST_SHADOW          = 1 << 3;
        /// Thickness is reconstructed from the shadow map instead of the
        /// analytic sphere approximation. Gets a dedicated stencil bit in
        /// deferred layers.
        const THICKNESS_FROM_SHADOW = 1 << 4;
    }
}

/// Capture-probe routing requested by the caller for one surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ProbeCaptureMode {
    #[default]
    None,
    Reflection,
    Planar,
}

// ─── Material Descriptor ─────────────────────────────────────────────────────

/// A fully resolved material as handed over by the (excluded) node-graph
/// evaluation layer.
///
/// The renderer only reads classification data from it; shading code itself
/// is produced by the injected codegen callback (see
/// [`crate::shader::MaterialCodegen`]).
#[derive(Debug, Clone)]
pub struct MaterialDescriptor {
    /// Debug label, used in degradation diagnostics.
    pub name: String,
    /// Shading closures this material evaluates.
    pub closures: ClosureBits,
    pub flags: MaterialFlags,
    pub displacement: DisplacementType,
    pub thickness: ThicknessMode,
    /// Number of texture samplers the generated shader will bind.
    pub sampler_count: u32,
    /// Number of vertex attributes the generated shader reads.
    pub attribute_count: u32,
}

impl Default for MaterialDescriptor {
    fn default() -> Self {
        Self {
            name: String::from("material"),
            closures: ClosureBits::DIFFUSE,
            flags: MaterialFlags::CULL_BACKFACE | MaterialFlags::CAST_SHADOW,
            displacement: DisplacementType::Bump,
            thickness: ThicknessMode::Sphere,
            sampler_count: 0,
            attribute_count: 0,
        }
    }
}

/// Owning arena for registered materials.
///
/// A thin wrapper over `SlotMap` so call sites read as renderer vocabulary
/// rather than container plumbing.
#[derive(Default)]
pub struct MaterialArena {
    map: SlotMap<MaterialId, MaterialDescriptor>,
}

impl MaterialArena {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, desc: MaterialDescriptor) -> MaterialId {
        self.map.insert(desc)
    }

    /// Frees a material. Outstanding [`MaterialId`]s become invalid and will
    /// simply fail lookups — they can never alias a later insertion.
    pub fn remove(&mut self, id: MaterialId) -> Option<MaterialDescriptor> {
        self.map.remove(id)
    }

    #[must_use]
    pub fn get(&self, id: MaterialId) -> Option<&MaterialDescriptor> {
        self.map.get(id)
    }

    /// Resolving a freed handle is a scene-sync bug surfaced as an error so
    /// the caller can drop the surface and keep the frame alive.
    pub fn try_get(&self, id: MaterialId) -> crate::errors::Result<&MaterialDescriptor> {
        self.map.get(id).ok_or(crate::errors::RenderError::StaleMaterial)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.map.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }
}
