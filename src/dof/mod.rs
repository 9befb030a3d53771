//! Depth-of-Field Multi-Pass Post-Processor
//!
//! A linear chain of compute/raster stages over half and quarter resolution
//! derived buffers; the only branch is the foreground/background split,
//! which runs two independent copies of the gather chain. Stage order is
//! load-bearing: every stage reads the previous stage's outputs, and pooled
//! buffers are handed back at the exact pass that performs their last read.
//!
//! The aperture blur is split between two mechanisms. Temporal jittering of
//! the camera sample position resolves blur at reference quality for free,
//! but only up to a radius the accumulated sample count can cover without
//! visible gaps; the spatial gather/scatter passes absorb the remainder.
//! [`split_radius`] encodes that balance and is pinned by regression tests,
//! down to the exact constants.

use crate::caps::BackendCaps;
use crate::pool::{PoolHandle, TexturePool, TextureShape};
use crate::shadow::{DilationStep, plan_dilation};
use crate::shader::StaticShader;

/// Per-16x16-tile CoC bounds grid divisor.
pub const TILE_DIVISOR: u32 = 16;

// ─── Radius Balance ──────────────────────────────────────────────────────────

/// The aperture blur split between temporal jitter and spatial post-fx.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RadiusSplit {
    /// Radius handled by the gather/scatter post-process.
    pub fx_radius: f32,
    /// Radius absorbed by temporal camera jitter.
    pub jitter_radius: f32,
}

/// Balance the aperture radius between jitter and post-fx.
///
/// `minimal_overblur = 1/sqrt(sample_count)` is the fraction of the blur
/// the post-process must keep even at high sample counts so the jittered
/// samples never show gaps; `user_overblur` shifts more work to the
/// (cheaper, softer) post-process on top of that.
#[must_use]
pub fn split_radius(aperture: f32, sample_count: u32, user_overblur: f32) -> RadiusSplit {
    let minimal_overblur = 1.0 / (sample_count.max(1) as f32).sqrt();
    let fx_radius = (minimal_overblur + user_overblur) * aperture;
    let jitter_radius = (aperture - fx_radius).max(0.0);
    RadiusSplit {
        fx_radius,
        jitter_radius,
    }
}

// ─── Pass Plan ───────────────────────────────────────────────────────────────

/// Pooled buffer names, also used as GPU debug labels.
mod buffers {
    pub const SETUP_COLOR: &str = "dof.setup_color";
    pub const SETUP_COC: &str = "dof.setup_coc";
    pub const STABLE_COLOR: &str = "dof.stable_color";
    pub const DOWNSAMPLE: &str = "dof.downsample";
    pub const REDUCED: &str = "dof.reduced";
    pub const TILES: &str = "dof.tiles";
    pub const TILES_DILATED: &str = "dof.tiles_dilated";
    pub const GATHER_FG: &str = "dof.gather_fg";
    pub const GATHER_BG: &str = "dof.gather_bg";
    pub const FILTERED_FG: &str = "dof.filtered_fg";
    pub const FILTERED_BG: &str = "dof.filtered_bg";
}

/// One entry of the depth-of-field pass sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DofPass {
    /// `None` marks a required command-stream flush instead of a dispatch.
    pub shader: Option<StaticShader>,
    /// Ring parameters for the tile-dilate iterations.
    pub step: Option<DilationStep>,
    /// Pooled buffers whose last read this pass records; they are released
    /// immediately after it is encoded.
    pub releases: &'static [&'static str],
}

impl DofPass {
    const fn dispatch(shader: StaticShader, releases: &'static [&'static str]) -> Self {
        Self {
            shader: Some(shader),
            step: None,
            releases,
        }
    }
}

/// Depth-of-field post-processor state.
pub struct DepthOfField {
    flush_after_tile_prepare: bool,
}

impl DepthOfField {
    #[must_use]
    pub fn new(caps: &BackendCaps) -> Self {
        Self {
            flush_after_tile_prepare: caps.flush_after_tile_prepare,
        }
    }

    /// Build the strictly ordered pass sequence.
    ///
    /// `tile_dilation_radius` is the CoC spread in tiles; the dilate stage
    /// runs the shared exact ring-dilation plan over the tile bounds grid.
    #[must_use]
    pub fn plan(&self, tile_dilation_radius: u32) -> Vec<DofPass> {
        let mut passes = vec![
            DofPass::dispatch(StaticShader::DofSetup, &[]),
            DofPass::dispatch(StaticShader::DofStabilize, &[]),
            DofPass::dispatch(StaticShader::DofDownsample, &[]),
            // Mip chain plus the scatter-rect lists for bright pixels; the
            // quarter-res local-contrast input is dead after this.
            DofPass::dispatch(StaticShader::DofReduce, &[buffers::DOWNSAMPLE]),
            DofPass::dispatch(StaticShader::DofTileFlatten, &[]),
        ];
        let dilate_steps = plan_dilation(tile_dilation_radius, 3);
        for step in &dilate_steps {
            passes.push(DofPass {
                shader: Some(StaticShader::DofTileDilate),
                step: Some(*step),
                releases: &[],
            });
        }
        if !dilate_steps.is_empty()
            && let Some(last) = passes.last_mut()
        {
            last.releases = &[buffers::TILES];
        }
        if self.flush_after_tile_prepare {
            passes.push(DofPass {
                shader: None,
                step: None,
                releases: &[],
            });
        }
        // With no dilate iterations the gathers read the flat tile grid
        // directly; its last read moves to the second gather.
        let tiles_release: &'static [&'static str] = if dilate_steps.is_empty() {
            &[buffers::TILES]
        } else {
            &[]
        };
        passes.extend_from_slice(&[
            // Foreground and background gathers are independent; either
            // order is valid, foreground first by convention.
            DofPass::dispatch(StaticShader::DofGather, &[]),
            DofPass {
                shader: Some(StaticShader::DofGather),
                step: None,
                releases: tiles_release,
            },
            DofPass::dispatch(
                StaticShader::DofFilter,
                &[buffers::GATHER_FG, buffers::GATHER_BG],
            ),
            DofPass::dispatch(StaticShader::DofScatter, &[buffers::REDUCED]),
            DofPass::dispatch(StaticShader::DofHoleFill, &[]),
            DofPass::dispatch(
                StaticShader::DofResolve,
                &[
                    buffers::SETUP_COLOR,
                    buffers::SETUP_COC,
                    buffers::STABLE_COLOR,
                    buffers::TILES_DILATED,
                    buffers::FILTERED_FG,
                    buffers::FILTERED_BG,
                ],
            ),
        ]);
        passes
    }

    /// Encode the full chain over `input`, writing into `output`.
    ///
    /// Pooled buffers are acquired up front and returned at the release
    /// points baked into the plan; by the time `resolve` has been recorded
    /// every handle is back in the pool.
    pub fn render(
        &self,
        device: &wgpu::Device,
        pool: &mut TexturePool,
        extent: (u32, u32),
        tile_dilation_radius: u32,
        dispatch: &mut dyn DispatchEncoder,
    ) {
        let half = (extent.0.div_ceil(2), extent.1.div_ceil(2));
        let quarter = (extent.0.div_ceil(4), extent.1.div_ceil(4));
        let tiles = (
            half.0.div_ceil(TILE_DIVISOR),
            half.1.div_ceil(TILE_DIVISOR),
        );

        let color = |w: u32, h: u32| {
            TextureShape::storage_2d(w, h, wgpu::TextureFormat::Rgba16Float)
        };
        let coc = |w: u32, h: u32| TextureShape::storage_2d(w, h, wgpu::TextureFormat::R16Float);
        let tile_shape = TextureShape::storage_2d(tiles.0, tiles.1, wgpu::TextureFormat::Rgba16Float);

        let mut held: Vec<PoolHandle> = vec![
            pool.acquire(device, buffers::SETUP_COLOR, color(half.0, half.1)),
            pool.acquire(device, buffers::SETUP_COC, coc(half.0, half.1)),
            pool.acquire(device, buffers::STABLE_COLOR, color(half.0, half.1)),
            pool.acquire(device, buffers::DOWNSAMPLE, color(quarter.0, quarter.1)),
            pool.acquire(device, buffers::REDUCED, color(half.0, half.1)),
            pool.acquire(device, buffers::TILES, tile_shape),
            pool.acquire(device, buffers::TILES_DILATED, tile_shape),
            pool.acquire(device, buffers::GATHER_FG, color(half.0, half.1)),
            pool.acquire(device, buffers::GATHER_BG, color(half.0, half.1)),
            pool.acquire(device, buffers::FILTERED_FG, color(half.0, half.1)),
            pool.acquire(device, buffers::FILTERED_BG, color(half.0, half.1)),
        ];

        for pass in self.plan(tile_dilation_radius) {
            encode_pass(&pass, dispatch);
            for name in pass.releases {
                if let Some(i) = held.iter().position(|h| h.name() == *name) {
                    pool.release(held.swap_remove(i));
                }
            }
        }

        debug_assert!(held.is_empty(), "every pooled buffer must be released by resolve");
    }
}

/// Route one plan entry to the matching encoder hook.
fn encode_pass(pass: &DofPass, dispatch: &mut dyn DispatchEncoder) {
    match pass.shader {
        // Scatter rasterizes one quad per bright pixel; the caller owns
        // its target and draw setup.
        Some(StaticShader::DofScatter) => dispatch.scatter(pass),
        Some(_) => dispatch.dispatch(pass),
        None => dispatch.flush(),
    }
}

/// Caller-side encoding capability, mirroring
/// [`crate::pipeline::DrawEncoder`] for the depth-of-field stages.
///
/// Unlike `DrawEncoder`, the implementation owns its command encoder:
/// [`flush`](Self::flush) has to finish and submit the stream mid-chain,
/// which a shared borrowed encoder cannot express.
pub trait DispatchEncoder {
    /// Record one compute stage.
    fn dispatch(&mut self, stage: &DofPass);

    /// Record the raster scatter stage: an instanced quad per bright pixel,
    /// drawn additively over the gather output.
    fn scatter(&mut self, stage: &DofPass);

    /// Submit everything recorded so far before continuing. Called only at
    /// the plan's flush entries.
    fn flush(&mut self);
}
