//! Shadow Tile-Map Paging
//!
//! Shadows are virtual: each light owns a handful of tile maps (cube faces
//! or clip-map levels), and only tiles actually sampled by a receiver get a
//! physical atlas page. Per frame the module tags used tiles, dilates the
//! usage mask so neighbouring tiles are resident before the camera reaches
//! them, allocates pages for newly needed tiles, and renders casters into
//! the updated pages with one of two techniques chosen at startup.

pub mod dilation;
pub mod pages;
pub mod tilemap;

pub use dilation::{DilationStep, plan_dilation};
pub use pages::{PAGE_SIZE, PageAcquire, PageAllocator, PageCoord};
pub use tilemap::{TILE_GRID, TILES_PER_TILEMAP, TileMap, TileMapPool, TileMapProjection, TileMapRange};

use glam::Mat4;
use rustc_hash::FxHashMap;
use slotmap::{SlotMap, new_key_type};

use crate::caps::BackendCaps;
use crate::settings::{RendererSettings, ShadowTechnique};
use crate::shader::StaticShader;

new_key_type! {
    pub struct LightId;
}

/// Shadow shape of a light, fixed at registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LightKind {
    /// Point or spot light; `face_count` cube faces in `1..=6`.
    Punctual { face_count: u8 },
    /// Directional light with clip-map levels `level_min..=level_max`.
    Directional { level_min: i32, level_max: i32 },
}

struct LightShadow {
    maps: Vec<u32>,
    range: TileMapRange,
    synced: bool,
}

/// One step of the per-frame shadow update sequence.
///
/// The caller walks this list in order, encoding each entry into the frame's
/// command stream. `Flush` entries mark points where the encoder must be
/// submitted before continuing, driven by [`BackendCaps`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShadowPass {
    Dispatch {
        shader: StaticShader,
        step: Option<DilationStep>,
    },
    /// Rasterize casters into the tiles flagged for update.
    SurfaceRender,
    Flush,
}

/// CPU-side owner of tile maps, atlas pages, and the shadow update plan.
pub struct ShadowModule {
    technique: ShadowTechnique,
    flush_after_tile_prepare: bool,
    pool: TileMapPool,
    pages: PageAllocator,
    lights: SlotMap<LightId, LightShadow>,
    /// Light order for compaction: sync order this frame, then leftovers.
    order: Vec<LightId>,
    /// Atlas pages currently backing a tile, keyed by packed tile key.
    resident: FxHashMap<u64, PageCoord>,
}

impl ShadowModule {
    #[must_use]
    pub fn new(settings: &RendererSettings, caps: &BackendCaps) -> Self {
        let technique = caps.shadow_technique(settings.shadow_technique);
        log::info!("shadow update technique: {technique:?}");
        Self {
            technique,
            flush_after_tile_prepare: caps.flush_after_tile_prepare,
            pool: TileMapPool::new(settings.shadow_pool_size),
            pages: PageAllocator::new(settings.shadow_page_cache),
            lights: SlotMap::with_key(),
            order: Vec::new(),
            resident: FxHashMap::default(),
        }
    }

    #[must_use]
    pub fn technique(&self) -> ShadowTechnique {
        self.technique
    }

    // ── Light lifecycle ──────────────────────────────────────────────────────

    /// Register a shadow-casting light, acquiring its tile maps.
    ///
    /// Maps the pool could not provide are simply absent; the light casts
    /// partial (or no) shadow rather than failing the frame.
    pub fn light_add(&mut self, kind: LightKind) -> LightId {
        let projections: Vec<TileMapProjection> = match kind {
            LightKind::Punctual { face_count } => (0..face_count.min(6))
                .map(|face| TileMapProjection::CubeFace { face })
                .collect(),
            LightKind::Directional {
                level_min,
                level_max,
            } => (level_min..=level_max)
                .map(|level| TileMapProjection::Clip { level })
                .collect(),
        };
        let maps = projections
            .into_iter()
            .filter_map(|p| self.pool.acquire(p))
            .collect();
        self.lights.insert(LightShadow {
            maps,
            range: TileMapRange { base: 0, count: 0 },
            synced: false,
        })
    }

    /// Unregister a light, returning its tile maps and pages to the pools.
    pub fn light_remove(&mut self, id: LightId) {
        let Some(light) = self.lights.remove(id) else {
            return;
        };
        for index in light.maps {
            self.drop_resident_pages(index);
            self.pool.release(index);
        }
        self.order.retain(|&o| o != id);
    }

    // ── Per-frame sync ───────────────────────────────────────────────────────

    pub fn begin_sync(&mut self) {
        self.order.clear();
        for light in self.lights.values_mut() {
            light.synced = false;
        }
    }

    /// Update one light's per-map transforms. `view_matrices` pairs with
    /// the light's tile maps in acquisition order; a changed transform
    /// dirties the map and drops its now-stale pages.
    pub fn light_sync(&mut self, id: LightId, view_matrices: &[Mat4]) {
        let Some(light) = self.lights.get_mut(id) else {
            log::warn!("light_sync on unknown light; skipped");
            return;
        };
        light.synced = true;
        let maps = light.maps.clone();
        for (&index, &view) in maps.iter().zip(view_matrices) {
            // Pages rendered under the old projection hold wrong depth;
            // straight back to the free list.
            if self.pool.get_mut(index).sync_transform(view) {
                self.drop_resident_pages(index);
            }
        }
        self.order.push(id);
    }

    /// Close the sync window: compact tile maps so each light's run is
    /// contiguous in the shared buffer, synced lights first.
    pub fn end_sync(&mut self) {
        let mut order = std::mem::take(&mut self.order);
        for (id, light) in &self.lights {
            if !light.synced {
                order.push(id);
            }
        }
        let per_light: Vec<Vec<u32>> = order
            .iter()
            .map(|&id| self.lights[id].maps.clone())
            .collect();
        let ranges = self.pool.compact(&per_light);
        for (&id, range) in order.iter().zip(ranges) {
            self.lights[id].range = range;
        }
        self.order = order;
        // Page invalidation for this frame's moves happened in light_sync;
        // maps enter the next sync clean.
        for light in self.lights.values() {
            for &index in &light.maps {
                self.pool.get_mut(index).dirty = false;
            }
        }
    }

    /// Buffer range assigned to a light by the last `end_sync`.
    #[must_use]
    pub fn light_range(&self, id: LightId) -> Option<TileMapRange> {
        self.lights.get(id).map(|l| l.range)
    }

    // ── Page management ──────────────────────────────────────────────────────

    /// Back one tile with an atlas page, reusing the tile's cached page
    /// when it is still warm.
    pub fn request_page(&mut self, map_index: u32, tile: u32) -> Option<PageAcquire> {
        let key = tile_key(map_index, tile);
        if let Some(&page) = self.resident.get(&key) {
            return Some(PageAcquire {
                page,
                needs_render: false,
            });
        }
        let acquired = self.pages.acquire(key)?;
        self.resident.insert(key, acquired.page);
        Some(acquired)
    }

    /// Release one tile's page into the warm cache.
    pub fn retire_page(&mut self, map_index: u32, tile: u32) {
        let key = tile_key(map_index, tile);
        if let Some(page) = self.resident.remove(&key) {
            self.pages.retire(page, key);
        }
    }

    fn drop_resident_pages(&mut self, map_index: u32) {
        // Stale content: straight back to the free list, never the cache.
        let base = tile_key(map_index, 0);
        let keys: Vec<u64> = self
            .resident
            .keys()
            .copied()
            .filter(|k| k & !u64::from(u32::MAX) == base)
            .collect();
        for key in keys {
            if let Some(page) = self.resident.remove(&key) {
                self.pages.release(page);
            }
        }
    }

    // ── Update plan ──────────────────────────────────────────────────────────

    /// Build the ordered shadow update sequence for this frame.
    ///
    /// Two dilation chains run on the tagged usage mask: min/max of the
    /// tile depth range, and min-of-absolute-value for nearest-occluder
    /// distance. The render portion depends on the startup technique:
    /// atomic-raster renders straight into the atlas, tile-copy brackets
    /// the render with a clear and a store pass.
    #[must_use]
    pub fn plan_update(&self, dilation_radius: u32) -> Vec<ShadowPass> {
        let mut passes = vec![ShadowPass::Dispatch {
            shader: StaticShader::ShadowUsageTag,
            step: None,
        }];
        for step in tilemap::usage_dilation_plan(dilation_radius, 3) {
            passes.push(ShadowPass::Dispatch {
                shader: StaticShader::ShadowDilateMinmax,
                step: Some(step),
            });
        }
        for step in tilemap::usage_dilation_plan(dilation_radius, 3) {
            passes.push(ShadowPass::Dispatch {
                shader: StaticShader::ShadowDilateAbs,
                step: Some(step),
            });
        }
        if self.flush_after_tile_prepare {
            passes.push(ShadowPass::Flush);
        }
        match self.technique {
            ShadowTechnique::AtomicRaster => passes.push(ShadowPass::SurfaceRender),
            ShadowTechnique::TileCopy => {
                passes.push(ShadowPass::Dispatch {
                    shader: StaticShader::ShadowTileClear,
                    step: None,
                });
                passes.push(ShadowPass::SurfaceRender);
                passes.push(ShadowPass::Dispatch {
                    shader: StaticShader::ShadowTileStore,
                    step: None,
                });
            }
        }
        passes
    }
}

#[inline]
fn tile_key(map_index: u32, tile: u32) -> u64 {
    (u64::from(map_index) << 32) | u64::from(tile)
}
