//! Probe Capture Pipelines
//!
//! Reflection probes re-render the scene into a cubemap (sphere probe) or a
//! mirrored planar target (planar probe). Both are thin wrappers around a
//! [`GBufferPassBuilder`] embedded by value; the capture-specific behavior
//! is only the target layout at render time, so no pipeline hierarchy is
//! needed beyond composition.

use crate::pass::SubPassHandle;

use super::deferred::{BucketNames, GBufferPassBuilder};
use super::{DrawEncoder, SurfaceDraw};

pub struct ProbePipeline {
    label: &'static str,
    pub gbuffer: GBufferPassBuilder,
}

impl ProbePipeline {
    #[must_use]
    pub fn sphere() -> Self {
        Self {
            label: "capture.sphere",
            gbuffer: GBufferPassBuilder::new(BucketNames {
                prepass: ["capture.sphere.prepass", "capture.sphere.prepass_double"],
                material: [
                    "capture.sphere.single",
                    "capture.sphere.single_hybrid",
                    "capture.sphere.double",
                    "capture.sphere.double_hybrid",
                ],
            }),
        }
    }

    #[must_use]
    pub fn planar() -> Self {
        Self {
            label: "capture.planar",
            gbuffer: GBufferPassBuilder::new(BucketNames {
                prepass: ["capture.planar.prepass", "capture.planar.prepass_double"],
                material: [
                    "capture.planar.single",
                    "capture.planar.single_hybrid",
                    "capture.planar.double",
                    "capture.planar.double_hybrid",
                ],
            }),
        }
    }

    pub fn begin_sync(&mut self, frame: u64) {
        self.gbuffer.begin_sync(frame);
    }

    pub fn add_prepass(&mut self, surface: &SurfaceDraw<'_>) -> SubPassHandle {
        self.gbuffer.add_prepass(surface)
    }

    pub fn add_material(&mut self, surface: &SurfaceDraw<'_>) -> SubPassHandle {
        self.gbuffer.add_material(surface)
    }

    /// Encode the capture into one face/target view.
    pub fn render(
        &self,
        encoder: &mut wgpu::CommandEncoder,
        target: &wgpu::TextureView,
        draw: &mut dyn DrawEncoder,
    ) {
        if !self.gbuffer.has_surfaces() {
            return;
        }
        let mut pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some(self.label),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view: target,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(wgpu::Color::BLACK),
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
}
