//! Shader / Material / Pass Keys
//!
//! Pure bit-packing of classification enums into integer keys used for
//! shader-variant and sub-pass deduplication.
//!
//! The [`ShaderUuid`] bit layout is a **cross-language wire format**: the
//! same encoding is decoded inside generated shader code to recover the
//! pipeline/geometry fields, so bit widths and shift order are contractual.
//! Do not reshape them.
//!
//! ```text
//!  bits 0..4   geometry type        (GeometryType, 4 bits)
//!  bits 4..8   pipeline type        (PipelineType, 4 bits)
//!  bit  8      displacement type    (DisplacementType, 1 bit)
//!  bit  9      thickness mode       (ThicknessMode, 1 bit)
//!  bits 10..14 visibility flags     (camera / shadow / probe-cube / probe-planar)
//! ```

use std::hash::{Hash, Hasher};

use crate::material::{
    DisplacementType, GeometryType, MaterialId, PipelineType, ThicknessMode, VisibilityFlags,
};

const GEOMETRY_SHIFT: u64 = 0;
const GEOMETRY_MASK: u64 = 0xF;
const PIPELINE_SHIFT: u64 = 4;
const PIPELINE_MASK: u64 = 0xF;
const DISPLACEMENT_SHIFT: u64 = 8;
const THICKNESS_SHIFT: u64 = 9;
const VISIBILITY_SHIFT: u64 = 10;
const VISIBILITY_MASK: u64 = 0xF;

/// Packed shader-variant identifier.
///
/// Two surfaces with identical uuids always share one compiled shader
/// variant and one draw sub-pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShaderUuid(u64);

impl ShaderUuid {
    #[must_use]
    pub fn encode(
        geometry: GeometryType,
        pipeline: PipelineType,
        displacement: DisplacementType,
        thickness: ThicknessMode,
        visibility: VisibilityFlags,
    ) -> Self {
        let mut bits = 0u64;
        bits |= (geometry as u64 & GEOMETRY_MASK) << GEOMETRY_SHIFT;
        bits |= (pipeline as u64 & PIPELINE_MASK) << PIPELINE_SHIFT;
        bits |= (displacement as u64) << DISPLACEMENT_SHIFT;
        bits |= (thickness as u64) << THICKNESS_SHIFT;
        bits |= (u64::from(visibility.bits()) & VISIBILITY_MASK) << VISIBILITY_SHIFT;
        Self(bits)
    }

    /// Recovers the packed fields.
    ///
    /// Returns `None` only for bit patterns that were never produced by
    /// [`encode`](Self::encode) (unknown enum discriminants).
    #[must_use]
    pub fn decode(self) -> Option<ShaderUuidFields> {
        let geometry = GeometryType::from_bits((self.0 >> GEOMETRY_SHIFT) & GEOMETRY_MASK)?;
        let pipeline = PipelineType::from_bits((self.0 >> PIPELINE_SHIFT) & PIPELINE_MASK)?;
        let displacement = if (self.0 >> DISPLACEMENT_SHIFT) & 1 == 0 {
            DisplacementType::Bump
        } else {
            DisplacementType::Displace
        };
        let thickness = if (self.0 >> THICKNESS_SHIFT) & 1 == 0 {
            ThicknessMode::Sphere
        } else {
            ThicknessMode::Slab
        };
        let visibility = VisibilityFlags::from_bits_truncate(
            ((self.0 >> VISIBILITY_SHIFT) & VISIBILITY_MASK) as u8,
        );
        Some(ShaderUuidFields {
            geometry,
            pipeline,
            displacement,
            thickness,
            visibility,
        })
    }

    /// Raw packed value, as handed to the codegen callback.
    #[inline]
    #[must_use]
    pub const fn bits(self) -> u64 {
        self.0
    }

    #[inline]
    #[must_use]
    pub const fn from_bits(bits: u64) -> Self {
        Self(bits)
    }
}

/// Unpacked view of a [`ShaderUuid`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShaderUuidFields {
    pub geometry: GeometryType,
    pub pipeline: PipelineType,
    pub displacement: DisplacementType,
    pub thickness: ThicknessMode,
    pub visibility: VisibilityFlags,
}

// ─── Material Key ────────────────────────────────────────────────────────────

/// Deduplication key for one (material, shader-variant) combination.
///
/// Equality is by value on handle + option bits. The material handle is a
/// generation-checked slot-map key, so a freed-and-reallocated material can
/// never collide with a stale key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MaterialKey {
    pub material: MaterialId,
    pub options: u64,
}

impl MaterialKey {
    #[must_use]
    pub fn new(material: MaterialId, uuid: ShaderUuid) -> Self {
        Self {
            material,
            options: uuid.bits(),
        }
    }

    #[inline]
    #[must_use]
    pub fn uuid(self) -> ShaderUuid {
        ShaderUuid::from_bits(self.options)
    }
}

/// Compute a `u64` hash of any `Hash`-able key using `FxHasher`.
#[inline]
#[must_use]
pub fn fx_hash_key<K: Hash>(key: &K) -> u64 {
    let mut hasher = rustc_hash::FxHasher::default();
    key.hash(&mut hasher);
    hasher.finish()
}
