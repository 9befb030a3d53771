//! Shadow Tile Maps
//!
//! Each shadow-casting light owns one tile map per cube face (point lights)
//! or per clip-map level (sun lights). A tile map is a fixed square grid of
//! tiles whose per-tile words live in one shared GPU buffer; the buffer
//! slot a tile map writes into is reassigned every sync so that each
//! light's tile maps sit in one contiguous run, letting shader code index a
//! light's maps as `base + face` without an extra indirection table.

use glam::Mat4;

use crate::shadow::dilation::plan_dilation;

/// Tiles per tile-map side.
pub const TILE_GRID: u32 = 16;
/// Tiles per tile map.
pub const TILES_PER_TILEMAP: u32 = TILE_GRID * TILE_GRID;

/// What a tile map projects.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TileMapProjection {
    /// One face of a point light's cube, `face` in `0..6`.
    CubeFace { face: u8 },
    /// One clip-map level of a directional light.
    Clip { level: i32 },
}

/// CPU state of one tile map.
#[derive(Debug, Clone)]
pub struct TileMap {
    pub projection: TileMapProjection,
    /// Light-space view matrix captured at the last sync. Compared against
    /// the incoming transform to decide whether cached pages survive.
    pub view_matrix: Mat4,
    /// Set at acquisition and on transform change: every tile needs
    /// re-rendering. Cleared by the shadow module once the frame's sync
    /// has handled the invalidation.
    pub dirty: bool,
    /// First tile-word slot in the shared buffer. Assigned by
    /// [`TileMapPool::compact`]; meaningless before the first sync.
    pub tiles_base: u32,
}

impl TileMap {
    /// Update the cached transform. Returns `true` when the transform
    /// changed this call: the map is marked dirty and any pages rendered
    /// under the old projection are stale.
    pub fn sync_transform(&mut self, view_matrix: Mat4) -> bool {
        if self.view_matrix == view_matrix {
            return false;
        }
        self.view_matrix = view_matrix;
        self.dirty = true;
        true
    }
}

struct Slot {
    map: TileMap,
    live: bool,
}

/// Contiguous run of tile maps belonging to one light after compaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TileMapRange {
    /// First tile map slot in the shared buffer ordering.
    pub base: u32,
    pub count: u32,
}

impl TileMapRange {
    /// First tile-word index of this light's run.
    #[must_use]
    pub const fn tiles_base(self) -> u32 {
        self.base * TILES_PER_TILEMAP
    }
}

/// Fixed-capacity pool of tile maps with a free-index stack.
///
/// Pool indices are stable for the lifetime of a tile map; only the
/// shared-buffer ordering produced by [`compact`](Self::compact) moves
/// between syncs.
pub struct TileMapPool {
    slots: Vec<Slot>,
    free: Vec<u32>,
    capacity: u32,
}

impl TileMapPool {
    #[must_use]
    pub fn new(capacity: u32) -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            capacity,
        }
    }

    /// Acquire a tile map. Returns `None` when the pool is at capacity;
    /// the light simply casts no shadow this frame.
    pub fn acquire(&mut self, projection: TileMapProjection) -> Option<u32> {
        let map = TileMap {
            projection,
            view_matrix: Mat4::IDENTITY,
            dirty: true,
            tiles_base: 0,
        };
        if let Some(index) = self.free.pop() {
            self.slots[index as usize] = Slot { map, live: true };
            return Some(index);
        }
        if self.slots.len() as u32 >= self.capacity {
            log::warn!(
                "shadow tile-map pool exhausted ({} maps); light gets no shadow",
                self.capacity
            );
            return None;
        }
        let index = self.slots.len() as u32;
        self.slots.push(Slot { map, live: true });
        Some(index)
    }

    pub fn release(&mut self, index: u32) {
        let slot = &mut self.slots[index as usize];
        debug_assert!(slot.live, "releasing a tile map twice");
        slot.live = false;
        self.free.push(index);
    }

    #[must_use]
    pub fn get(&self, index: u32) -> &TileMap {
        let slot = &self.slots[index as usize];
        debug_assert!(slot.live, "reading a released tile map");
        &slot.map
    }

    pub fn get_mut(&mut self, index: u32) -> &mut TileMap {
        let slot = &mut self.slots[index as usize];
        debug_assert!(slot.live, "writing a released tile map");
        &mut slot.map
    }

    #[must_use]
    pub fn live_count(&self) -> usize {
        self.slots.len() - self.free.len()
    }

    /// Recompute the shared-buffer ordering for the given per-light tile
    /// map lists (in light submission order).
    ///
    /// Returns one range per light, each base equal to the running sum of
    /// preceding counts, and writes each tile map's `tiles_base`. The
    /// flattened ordering is exactly the concatenation of the input lists,
    /// so every light's maps are contiguous and in caller order.
    pub fn compact(&mut self, lights: &[Vec<u32>]) -> Vec<TileMapRange> {
        let mut ranges = Vec::with_capacity(lights.len());
        let mut next_base = 0u32;
        for maps in lights {
            let range = TileMapRange {
                base: next_base,
                count: maps.len() as u32,
            };
            for (offset, &index) in maps.iter().enumerate() {
                self.get_mut(index).tiles_base =
                    (range.base + offset as u32) * TILES_PER_TILEMAP;
            }
            next_base += range.count;
            ranges.push(range);
        }
        ranges
    }
}

/// Dilation plan for the tile-usage masks, expressed in tiles.
///
/// Radius is clamped to the grid; dilating further than the map is wide
/// buys nothing.
#[must_use]
pub fn usage_dilation_plan(radius: u32, max_ring_count: u32) -> Vec<crate::shadow::dilation::DilationStep> {
    plan_dilation(radius.min(TILE_GRID - 1), max_ring_count)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pool_with(count: u32) -> (TileMapPool, Vec<u32>) {
        let mut pool = TileMapPool::new(64);
        let indices = (0..count)
            .map(|face| {
                pool.acquire(TileMapProjection::CubeFace { face: face as u8 })
                    .unwrap()
            })
            .collect();
        (pool, indices)
    }

    #[test]
    fn ranges_are_contiguous_running_sums() {
        let (mut pool, indices) = pool_with(11);
        let lights = vec![
            indices[0..6].to_vec(),
            indices[6..7].to_vec(),
            indices[7..11].to_vec(),
        ];
        let ranges = pool.compact(&lights);
        assert_eq!(ranges[0], TileMapRange { base: 0, count: 6 });
        assert_eq!(ranges[1], TileMapRange { base: 6, count: 1 });
        assert_eq!(ranges[2], TileMapRange { base: 7, count: 4 });
        // Tile bases follow the ordering, not the pool slots.
        assert_eq!(pool.get(indices[6]).tiles_base, 6 * TILES_PER_TILEMAP);
        assert_eq!(pool.get(indices[10]).tiles_base, 10 * TILES_PER_TILEMAP);
    }

    #[test]
    fn compaction_closes_holes_left_by_released_lights() {
        let (mut pool, indices) = pool_with(8);
        pool.compact(&[indices[0..4].to_vec(), indices[4..8].to_vec()]);
        // Drop the first light; its slots return to the free stack.
        for &i in &indices[0..4] {
            pool.release(i);
        }
        let ranges = pool.compact(&[indices[4..8].to_vec()]);
        assert_eq!(ranges[0], TileMapRange { base: 0, count: 4 });
        assert_eq!(pool.get(indices[4]).tiles_base, 0);
    }

    #[test]
    fn released_slots_are_reused_before_growth() {
        let (mut pool, indices) = pool_with(3);
        pool.release(indices[1]);
        let reused = pool.acquire(TileMapProjection::Clip { level: 0 }).unwrap();
        assert_eq!(reused, indices[1]);
        assert_eq!(pool.live_count(), 3);
    }

    #[test]
    fn capacity_exhaustion_yields_none() {
        let mut pool = TileMapPool::new(2);
        assert!(pool.acquire(TileMapProjection::CubeFace { face: 0 }).is_some());
        assert!(pool.acquire(TileMapProjection::CubeFace { face: 1 }).is_some());
        assert!(pool.acquire(TileMapProjection::CubeFace { face: 2 }).is_none());
    }

    #[test]
    fn transform_change_marks_dirty() {
        let (mut pool, indices) = pool_with(1);
        let map = pool.get_mut(indices[0]);
        map.dirty = false;
        assert!(
            !map.sync_transform(Mat4::IDENTITY),
            "unchanged transform is not a move"
        );
        assert!(!map.dirty, "unchanged transform must not dirty the map");
        assert!(map.sync_transform(Mat4::from_translation(glam::Vec3::X)));
        assert!(map.dirty);
    }

    #[test]
    fn usage_dilation_clamps_to_grid() {
        let steps = usage_dilation_plan(1000, 3);
        let total: u32 = steps.iter().map(|s| s.ring_count * s.multiplier).sum();
        assert_eq!(total, TILE_GRID - 1);
    }
}
