//! Shader Create-Info Amendment
//!
//! Material shader sources come from an injected codegen callback as a
//! structured [`ShaderCreateInfo`]. Before compilation the cache *amends*
//! the description: closure and geometry defines are injected, sampler
//! slots are repositioned into a contiguous range, and resource counts are
//! checked against the backend budgets.
//!
//! On budget overflow the offending resource list is **cleared** and a
//! diagnostic naming the material is logged. The shader still compiles and
//! renders visibly wrong (missing textures) instead of corrupting unrelated
//! bindings — degradation the user can see and report beats a crash.

use smallvec::SmallVec;

use crate::closure::{ClosureBits, bin_count, normal_layer_count};
use crate::keys::ShaderUuid;
use crate::material::{DisplacementType, GeometryType, MaterialDescriptor, ThicknessMode};

/// One texture-sampler binding requested by generated shader code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SamplerSlot {
    pub name: String,
    pub slot: u32,
}

/// One vertex-attribute binding requested by generated shader code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttributeSlot {
    pub name: String,
    pub location: u32,
}

/// Structured shader description returned by the codegen callback.
///
/// The `source` text is opaque to the renderer; only the resource lists and
/// defines are inspected and rewritten here.
#[derive(Debug, Clone, Default)]
pub struct ShaderCreateInfo {
    pub label: String,
    pub source: String,
    pub samplers: Vec<SamplerSlot>,
    pub attributes: Vec<AttributeSlot>,
    pub defines: SmallVec<[(String, String); 8]>,
}

impl ShaderCreateInfo {
    fn define(&mut self, key: &str, value: impl ToString) {
        self.defines.push((key.to_string(), value.to_string()));
    }

    /// Amend the generated description for one shader variant.
    ///
    /// Injects closure-layout and entry-point defines derived from the
    /// uuid, compacts sampler slots into `[first_sampler_slot, …)`, and
    /// enforces the sampler / vertex-attribute budgets.
    ///
    /// Returns `false` when a budget was exceeded and the corresponding
    /// resource list was cleared.
    pub fn amend(
        &mut self,
        uuid: ShaderUuid,
        desc: &MaterialDescriptor,
        closures: ClosureBits,
        first_sampler_slot: u32,
        max_samplers: u32,
        max_attributes: u32,
    ) -> bool {
        let fields = uuid.decode();

        self.define("CLOSURE_BIN_COUNT", bin_count(closures));
        self.define("GBUFFER_NORMAL_LAYERS", normal_layer_count(closures));

        if let Some(fields) = fields {
            if fields.displacement == DisplacementType::Displace {
                self.define("MAT_DISPLACEMENT", 1u32);
            }
            if fields.thickness == ThicknessMode::Slab {
                self.define("MAT_THICKNESS_SLAB", 1u32);
            }
            if fields.geometry == GeometryType::Curves {
                self.define("MAT_GEOM_CURVES", 1u32);
            }
            if closures.contains(ClosureBits::VOLUME)
                || fields.geometry == GeometryType::Volume
            {
                self.define("MAT_VOLUME", 1u32);
            }
        }

        // Reposition sampler slots into a contiguous range above the
        // renderer-owned bindings. Generated code addresses samplers by
        // name, so renumbering is safe.
        for (i, sampler) in self.samplers.iter_mut().enumerate() {
            sampler.slot = first_sampler_slot + i as u32;
        }

        let mut ok = true;
        if first_sampler_slot + self.samplers.len() as u32 > max_samplers {
            log::warn!(
                "material {:?}: {} samplers exceed the backend budget of {}, \
                 clearing texture bindings (material will render without textures)",
                desc.name,
                self.samplers.len(),
                max_samplers.saturating_sub(first_sampler_slot),
            );
            self.samplers.clear();
            ok = false;
        }

        if self.attributes.len() as u32 > max_attributes {
            log::warn!(
                "material {:?}: {} vertex attributes exceed the backend budget of {}, \
                 clearing attribute bindings",
                desc.name,
                self.attributes.len(),
                max_attributes,
            );
            self.attributes.clear();
            ok = false;
        }
        ok
    }
}
