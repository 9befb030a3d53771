//! Shader Subsystem
//!
//! Two shader families exist:
//!
//! | Family   | Source                              | Cached by          |
//! |----------|-------------------------------------|--------------------|
//! | Static   | embedded WGSL (`include_str!`)      | [`StaticShader`]   |
//! | Material | injected codegen callback           | [`MaterialKey`](crate::keys::MaterialKey) |
//!
//! Static shaders are grouped into [`ShaderGroups`] so startup can fire
//! compilation for whole pipelines asynchronously and block only at the
//! points that actually need the result.

pub mod cache;
pub mod create_info;

pub use cache::{MaterialCodegen, MaterialShaderHandle, ShaderCache, StaticShaderVariant};
pub use create_info::{AttributeSlot, SamplerSlot, ShaderCreateInfo};

use bitflags::bitflags;

bitflags! {
    /// Readiness bitmask over static shader groups.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct ShaderGroups: u8 {
        const DEFERRED = 1 << 0;
        const SHADOW   = 1 << 1;
        const DOF      = 1 << 2;
        const VOLUME   = 1 << 3;
    }
}

/// Embedded WGSL source files; one compiled module per file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) enum SourceFile {
    Deferred,
    Shadow,
    Dof,
    Volume,
}

impl SourceFile {
    pub(crate) const fn source(self) -> &'static str {
        match self {
            Self::Deferred => include_str!("wgsl/deferred.wgsl"),
            Self::Shadow => include_str!("wgsl/shadow.wgsl"),
            Self::Dof => include_str!("wgsl/dof.wgsl"),
            Self::Volume => include_str!("wgsl/volume.wgsl"),
        }
    }

    pub(crate) const fn label(self) -> &'static str {
        match self {
            Self::Deferred => "lucent/deferred.wgsl",
            Self::Shadow => "lucent/shadow.wgsl",
            Self::Dof => "lucent/dof.wgsl",
            Self::Volume => "lucent/volume.wgsl",
        }
    }

    pub(crate) const fn group(self) -> ShaderGroups {
        match self {
            Self::Deferred => ShaderGroups::DEFERRED,
            Self::Shadow => ShaderGroups::SHADOW,
            Self::Dof => ShaderGroups::DOF,
            Self::Volume => ShaderGroups::VOLUME,
        }
    }

    pub(crate) fn for_groups(groups: ShaderGroups) -> impl Iterator<Item = Self> {
        [Self::Deferred, Self::Shadow, Self::Dof, Self::Volume]
            .into_iter()
            .filter(move |f| groups.contains(f.group()))
    }
}

/// The fixed enumerated set of utility shaders.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StaticShader {
    // Deferred layers
    DeferredClassify,
    DeferredLightEval1,
    DeferredLightEval2,
    DeferredLightEval3,
    DeferredCombine,
    // Shadow paging
    ShadowUsageTag,
    ShadowTileClear,
    ShadowTileStore,
    ShadowDilateMinmax,
    ShadowDilateAbs,
    // Depth of field
    DofSetup,
    DofStabilize,
    DofDownsample,
    DofReduce,
    DofTileFlatten,
    DofTileDilate,
    DofGather,
    DofFilter,
    DofScatter,
    DofHoleFill,
    DofResolve,
    // Volumes
    VolumeIntegrate,
}

impl StaticShader {
    pub(crate) const fn file(self) -> SourceFile {
        match self {
            Self::DeferredClassify
            | Self::DeferredLightEval1
            | Self::DeferredLightEval2
            | Self::DeferredLightEval3
            | Self::DeferredCombine => SourceFile::Deferred,
            Self::ShadowUsageTag
            | Self::ShadowTileClear
            | Self::ShadowTileStore
            | Self::ShadowDilateMinmax
            | Self::ShadowDilateAbs => SourceFile::Shadow,
            Self::DofSetup
            | Self::DofStabilize
            | Self::DofDownsample
            | Self::DofReduce
            | Self::DofTileFlatten
            | Self::DofTileDilate
            | Self::DofGather
            | Self::DofFilter
            | Self::DofScatter
            | Self::DofHoleFill
            | Self::DofResolve => SourceFile::Dof,
            Self::VolumeIntegrate => SourceFile::Volume,
        }
    }

    /// Entry point name inside the module. Contractual with the WGSL files.
    #[must_use]
    pub const fn entry_point(self) -> &'static str {
        match self {
            Self::DeferredClassify => "classify_fs",
            Self::DeferredLightEval1 => "light_eval_1_fs",
            Self::DeferredLightEval2 => "light_eval_2_fs",
            Self::DeferredLightEval3 => "light_eval_3_fs",
            Self::DeferredCombine => "combine_fs",
            Self::ShadowUsageTag => "usage_tag_cs",
            Self::ShadowTileClear => "tile_clear_cs",
            Self::ShadowTileStore => "tile_store_cs",
            Self::ShadowDilateMinmax => "dilate_minmax_cs",
            Self::ShadowDilateAbs => "dilate_abs_cs",
            Self::DofSetup => "setup_cs",
            Self::DofStabilize => "stabilize_cs",
            Self::DofDownsample => "downsample_cs",
            Self::DofReduce => "reduce_cs",
            Self::DofTileFlatten => "tile_flatten_cs",
            Self::DofTileDilate => "tile_dilate_cs",
            Self::DofGather => "gather_cs",
            Self::DofFilter => "filter_cs",
            Self::DofScatter => "scatter_fs",
            Self::DofHoleFill => "hole_fill_cs",
            Self::DofResolve => "resolve_cs",
            Self::VolumeIntegrate => "integrate_cs",
        }
    }

    /// The group this shader's module belongs to.
    #[must_use]
    pub const fn group(self) -> ShaderGroups {
        self.file().group()
    }
}
