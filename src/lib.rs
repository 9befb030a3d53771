#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::cast_precision_loss)]
#![allow(clippy::cast_possible_truncation)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::too_many_arguments)]

pub mod caps;
pub mod closure;
pub mod dof;
pub mod errors;
pub mod keys;
pub mod material;
pub mod pass;
pub mod pipeline;
pub mod pool;
pub mod settings;
pub mod shader;
pub mod shadow;
pub mod view;

pub use caps::BackendCaps;
pub use closure::{ClosureBits, bin_count, closure_count, normal_layer_count};
pub use dof::{DepthOfField, split_radius};
pub use errors::{RenderError, Result};
pub use keys::{MaterialKey, ShaderUuid};
pub use material::{
    GeometryType, MaterialArena, MaterialDescriptor, MaterialFlags, MaterialId, ObjectId,
    PipelineType, ProbeCaptureMode, VisibilityFlags,
};
pub use pass::{DrawCommand, PassList, RasterState, SubPass, SubPassHandle};
pub use pipeline::{DrawEncoder, PipelineModules, SurfaceDraw};
pub use pool::TexturePool;
pub use settings::{RendererSettings, ShadowTechnique};
pub use shader::{MaterialCodegen, ShaderCache, ShaderGroups, StaticShader};
pub use shadow::{LightId, LightKind, ShadowModule};
pub use view::ViewInfo;
