//! Closure Bit-Set & G-Buffer Layout Engine
//!
//! A material's shading response is summarized as a 16-bit set of *closures*
//! (diffuse, reflection, refraction, …). G-buffer sizing is a pure function
//! of the closure set: [`bin_count`] decides how many storage bins a surface
//! needs, [`normal_layer_count`] how many normal layers back them. Pipelines
//! recompute both every frame from the union of bits across all materials
//! drawn that frame — the functions depend on nothing else.

use bitflags::bitflags;

bitflags! {
    /// One bit per shading response component of a material.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ClosureBits: u16 {
        const DIFFUSE           = 1 << 0;
        const SUBSURFACE        = 1 << 1;
        const REFLECTION        = 1 << 2;
        const REFRACTION        = 1 << 3;
        const TRANSLUCENT       = 1 << 4;
        const TRANSPARENCY      = 1 << 5;
        const EMISSION          = 1 << 6;
        const HOLDOUT           = 1 << 7;
        const VOLUME            = 1 << 8;
        const AMBIENT_OCCLUSION = 1 << 9;
        const SHADER_TO_RGBA    = 1 << 10;
        const CLEARCOAT         = 1 << 11;

        /// Derived alias: closures that transport light through the surface.
        const TRANSMISSION = Self::SUBSURFACE.bits()
            | Self::REFRACTION.bits()
            | Self::TRANSLUCENT.bits();
    }
}

impl ClosureBits {
    /// `true` if any transmission closure is present.
    #[inline]
    #[must_use]
    pub fn has_transmission(self) -> bool {
        self.intersects(Self::TRANSMISSION)
    }

    /// `true` if any closure that benefits from screen-space ray tracing is
    /// present (reflective or transmissive).
    #[inline]
    #[must_use]
    pub fn has_raytraced(self) -> bool {
        self.intersects(Self::REFLECTION | Self::TRANSMISSION)
    }
}

/// Closures that evaluate lights and therefore occupy a G-buffer bin.
///
/// Emission, holdout, transparency, AO and shader-to-rgba are resolved
/// inline during the G-buffer fill and never need a lighting bin.
/// Clear-coat rides on top of the reflection/diffuse bins instead of owning
/// one, but its presence changes how the others pack (see [`bin_count`]).
const LIT_CLOSURES: ClosureBits = ClosureBits::DIFFUSE
    .union(ClosureBits::SUBSURFACE)
    .union(ClosureBits::REFLECTION)
    .union(ClosureBits::REFRACTION)
    .union(ClosureBits::TRANSLUCENT);

/// Upper bound on per-pixel evaluated closures; light-evaluation shaders are
/// specialized for 1, 2 and 3 closures only.
pub const MAX_CLOSURE_COUNT: u32 = 3;

// ─── Layout Functions ────────────────────────────────────────────────────────

/// Number of independent storage bins the closure set needs.
///
/// Diffuse and translucent share one noise-free bin when clear-coat is
/// absent: both are hemispherical lobes around the same normal, so they can
/// be evaluated together without stochastic blending. Clear-coat needs the
/// diffuse bin intact for its base layer, which forces the pair apart again.
#[must_use]
pub fn bin_count(bits: ClosureBits) -> u32 {
    let lit = bits & LIT_CLOSURES;
    let mut count = lit.bits().count_ones();

    let merged_pair = ClosureBits::DIFFUSE | ClosureBits::TRANSLUCENT;
    if lit.contains(merged_pair) && !bits.contains(ClosureBits::CLEARCOAT) {
        count -= 1;
    }
    count
}

/// Number of G-buffer normal layers backing the closure set.
///
/// One layer per bin, plus one extra for every closure that carries
/// auxiliary directional data (entry/exit direction for subsurface and
/// translucency, refraction vector for refraction).
#[must_use]
pub fn normal_layer_count(bits: ClosureBits) -> u32 {
    let aux = bits
        & (ClosureBits::SUBSURFACE | ClosureBits::TRANSLUCENT | ClosureBits::REFRACTION);
    bin_count(bits) + aux.bits().count_ones()
}

/// Per-pixel evaluated closure count contributed by one material, clamped to
/// `[1, MAX_CLOSURE_COUNT]`.
///
/// A material mapping to zero lit closures (empty shader graph) is treated
/// as pure emission so the surface is never silently dropped from its layer.
#[must_use]
pub fn closure_count(bits: ClosureBits) -> u32 {
    bin_count(effective_bits(bits)).clamp(1, MAX_CLOSURE_COUNT)
}

/// The closure set actually accumulated into a deferred layer: an empty set
/// is promoted to emission.
#[must_use]
pub fn effective_bits(bits: ClosureBits) -> ClosureBits {
    if (bits & LIT_CLOSURES).is_empty() && !bits.contains(ClosureBits::EMISSION) {
        bits | ClosureBits::EMISSION
    } else {
        bits
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn diffuse_translucent_merge() {
        assert_eq!(bin_count(ClosureBits::DIFFUSE), 1);
        assert_eq!(bin_count(ClosureBits::DIFFUSE | ClosureBits::TRANSLUCENT), 1);
        assert_eq!(
            bin_count(
                ClosureBits::DIFFUSE | ClosureBits::TRANSLUCENT | ClosureBits::CLEARCOAT
            ),
            2,
            "clear-coat re-splits the merged bin"
        );
    }

    #[test]
    fn unlit_closures_take_no_bin() {
        assert_eq!(bin_count(ClosureBits::EMISSION), 0);
        assert_eq!(bin_count(ClosureBits::HOLDOUT | ClosureBits::TRANSPARENCY), 0);
    }

    #[test]
    fn normal_layers_track_aux_data() {
        assert_eq!(normal_layer_count(ClosureBits::REFLECTION), 1);
        assert_eq!(
            normal_layer_count(ClosureBits::REFLECTION | ClosureBits::REFRACTION),
            3,
            "refraction bin plus its auxiliary direction layer"
        );
        assert_eq!(
            normal_layer_count(ClosureBits::DIFFUSE | ClosureBits::SUBSURFACE),
            3
        );
    }

    #[test]
    fn empty_set_promotes_to_emission() {
        assert_eq!(closure_count(ClosureBits::empty()), 1);
        assert!(effective_bits(ClosureBits::empty()).contains(ClosureBits::EMISSION));
    }

    #[test]
    fn closure_count_clamped() {
        let everything = ClosureBits::all();
        assert_eq!(closure_count(everything), MAX_CLOSURE_COUNT);
    }
}
