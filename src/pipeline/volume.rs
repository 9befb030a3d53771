//! Volume Pipeline
//!
//! Volume objects rasterize an occupancy mask before material evaluation,
//! and two volumes overlapping in screen space would fight over the same
//! occupancy bits. Objects are therefore grouped into *volume layers*: each
//! layer holds objects whose 2D screen bounds are mutually disjoint, so one
//! raster pass per layer is conflict-free. Assignment is first-fit against
//! each layer's accumulated bounding box, growing a new layer only when
//! every existing one overlaps the candidate.

use glam::Vec2;
use rustc_hash::FxHashMap;

use crate::keys::MaterialKey;
use crate::pass::{PassList, RasterState, SubPassHandle, SubPassShader};

use super::{DrawEncoder, SurfaceDraw};

/// Axis-aligned screen-space bounds, in NDC-agnostic units chosen by the
/// caller (both objects in one frame must use the same convention).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScreenRect {
    pub min: Vec2,
    pub max: Vec2,
}

impl ScreenRect {
    #[must_use]
    pub fn new(min: Vec2, max: Vec2) -> Self {
        Self { min, max }
    }

    #[must_use]
    pub fn intersects(&self, other: &Self) -> bool {
        self.min.x < other.max.x
            && other.min.x < self.max.x
            && self.min.y < other.max.y
            && other.min.y < self.max.y
    }

    #[must_use]
    pub fn union(&self, other: &Self) -> Self {
        Self {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }
}

struct VolumeLayer {
    /// Union of assigned object bounds. Disjointness is tested against the
    /// union, which is conservative: clear of the union implies clear of
    /// every member.
    bounds: Option<ScreenRect>,
    occupancy: FxHashMap<MaterialKey, SubPassHandle>,
    material: FxHashMap<MaterialKey, SubPassHandle>,
}

impl VolumeLayer {
    fn new() -> Self {
        Self {
            bounds: None,
            occupancy: FxHashMap::default(),
            material: FxHashMap::default(),
        }
    }

    fn accepts(&self, rect: &ScreenRect) -> bool {
        self.bounds.as_ref().is_none_or(|b| !b.intersects(rect))
    }

    fn admit(&mut self, rect: ScreenRect) {
        self.bounds = Some(match &self.bounds {
            Some(b) => b.union(&rect),
            None => rect,
        });
    }
}

/// Handles for one volume object: the occupancy raster bucket and the
/// material evaluation bucket of its layer.
#[derive(Debug, Clone, Copy)]
pub struct VolumeHandles {
    pub layer: usize,
    pub occupancy: SubPassHandle,
    pub material: SubPassHandle,
}

pub struct VolumePipeline {
    layers: Vec<VolumeLayer>,
    pub passes: PassList,
}

impl Default for VolumePipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl VolumePipeline {
    #[must_use]
    pub fn new() -> Self {
        Self {
            layers: Vec::new(),
            passes: PassList::new(),
        }
    }

    pub fn begin_sync(&mut self, frame: u64) {
        self.passes.begin_sync(frame);
        self.layers.clear();
    }

    /// Assign one volume object to the first layer whose accumulated bounds
    /// it does not overlap.
    pub fn volume_add(&mut self, surface: &SurfaceDraw<'_>, bounds: ScreenRect) -> VolumeHandles {
        let layer_index = match self.layers.iter().position(|l| l.accepts(&bounds)) {
            Some(i) => i,
            None => {
                self.layers.push(VolumeLayer::new());
                self.layers.len() - 1
            }
        };
        self.layers[layer_index].admit(bounds);

        let occupancy = match self.layers[layer_index].occupancy.get(&surface.key) {
            Some(&handle) => handle,
            None => {
                let handle = self.passes.declare(
                    "volume.occupancy",
                    RasterState::FULLSCREEN,
                    SubPassShader::Material(surface.key),
                );
                self.layers[layer_index]
                    .occupancy
                    .insert(surface.key, handle);
                handle
            }
        };
        let material = match self.layers[layer_index].material.get(&surface.key) {
            Some(&handle) => handle,
            None => {
                let handle = self.passes.declare(
                    "volume.material",
                    RasterState::FULLSCREEN,
                    SubPassShader::Material(surface.key),
                );
                self.layers[layer_index]
                    .material
                    .insert(surface.key, handle);
                handle
            }
        };
        VolumeHandles {
            layer: layer_index,
            occupancy,
            material,
        }
    }

    #[must_use]
    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }

    /// Encode occupancy and material passes, then the froxel integration
    /// dispatch.
    pub fn render(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        target: &wgpu::TextureView,
        draw: &mut dyn DrawEncoder,
    ) {
        if self.layers.is_empty() {
            return;
        }
        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("volume"),
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

    fn surface(desc: &MaterialDescriptor) -> SurfaceDraw<'_> {
        let uuid = ShaderUuid::encode(
            GeometryType::Volume,
            PipelineType::VolumeMaterial,
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

    fn rect(min: (f32, f32), max: (f32, f32)) -> ScreenRect {
        ScreenRect::new(Vec2::new(min.0, min.1), Vec2::new(max.0, max.1))
    }

    #[test]
    fn disjoint_volumes_share_a_layer() {
        let desc = MaterialDescriptor::default();
        let mut pipeline = VolumePipeline::new();
        pipeline.begin_sync(1);
        let a = pipeline.volume_add(&surface(&desc), rect((0.0, 0.0), (0.4, 0.4)));
        let b = pipeline.volume_add(&surface(&desc), rect((0.6, 0.6), (1.0, 1.0)));
        assert_eq!(a.layer, b.layer);
        assert_eq!(pipeline.layer_count(), 1);
    }

    #[test]
    fn overlapping_volumes_split_layers() {
        let desc = MaterialDescriptor::default();
        let mut pipeline = VolumePipeline::new();
        pipeline.begin_sync(1);
        let a = pipeline.volume_add(&surface(&desc), rect((0.0, 0.0), (0.5, 0.5)));
        let b = pipeline.volume_add(&surface(&desc), rect((0.3, 0.3), (0.8, 0.8)));
        assert_ne!(a.layer, b.layer);
        assert_eq!(pipeline.layer_count(), 2);
    }

    #[test]
    fn second_layer_is_reused_by_later_fits() {
        let desc = MaterialDescriptor::default();
        let mut pipeline = VolumePipeline::new();
        pipeline.begin_sync(1);
        pipeline.volume_add(&surface(&desc), rect((0.0, 0.0), (1.0, 1.0)));
        let b = pipeline.volume_add(&surface(&desc), rect((0.1, 0.1), (0.2, 0.2)));
        let c = pipeline.volume_add(&surface(&desc), rect((0.5, 0.5), (0.6, 0.6)));
        assert_eq!(b.layer, 1);
        assert_eq!(c.layer, 1, "disjoint from layer 1's union, no third layer");
        assert_eq!(pipeline.layer_count(), 2);
    }

    #[test]
    fn touching_edges_do_not_overlap() {
        let a = rect((0.0, 0.0), (0.5, 1.0));
        let b = rect((0.5, 0.0), (1.0, 1.0));
        assert!(!a.intersects(&b));
    }
}
