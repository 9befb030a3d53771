//! Shadow Page Allocation
//!
//! The shadow atlas is carved into fixed-size square pages addressed by a
//! packed `(x, y)` coordinate. A page backs at most one tile at a time.
//!
//! Reuse is two-tier: a page retired by a tile is parked in a bounded ring
//! of *cached* pages keyed by the tile that owned it. If the same tile
//! needs a page again before the ring evicts it, it gets its old page back
//! with its rendered depth intact — no re-render. Only when the ring holds
//! nothing for the tile does allocation fall through to the free list (or
//! evict the oldest cached page).

use std::collections::VecDeque;

/// Page side length in texels.
pub const PAGE_SIZE: u32 = 256;
/// Atlas side length in texels.
pub const ATLAS_EXTENT: u32 = 4096;
/// Pages per atlas row/column.
pub const PAGES_PER_ROW: u16 = (ATLAS_EXTENT / PAGE_SIZE) as u16;

/// Packed page coordinate: `x | (y << 8)`.
///
/// The packing is shared with the tile-data words decoded in shader code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PageCoord(pub u16);

impl PageCoord {
    #[must_use]
    pub const fn new(x: u16, y: u16) -> Self {
        Self(x | (y << 8))
    }

    #[inline]
    #[must_use]
    pub const fn x(self) -> u16 {
        self.0 & 0xFF
    }

    #[inline]
    #[must_use]
    pub const fn y(self) -> u16 {
        self.0 >> 8
    }

    /// Texel origin inside the atlas.
    #[must_use]
    pub const fn origin(self) -> (u32, u32) {
        (self.x() as u32 * PAGE_SIZE, self.y() as u32 * PAGE_SIZE)
    }
}

/// Result of a page acquisition.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageAcquire {
    pub page: PageCoord,
    /// `false` when the tile got its own cached page back and its depth
    /// content is still valid.
    pub needs_render: bool,
}

/// Free-list + cached-ring page allocator for the shared atlas.
pub struct PageAllocator {
    free: Vec<PageCoord>,
    /// Recently retired pages, oldest at the front. Bounded.
    cached: VecDeque<(PageCoord, u64)>,
    cache_capacity: usize,
}

impl PageAllocator {
    #[must_use]
    pub fn new(cache_capacity: u32) -> Self {
        let mut free = Vec::with_capacity((PAGES_PER_ROW as usize).pow(2));
        // Reverse order so page (0,0) is handed out first.
        for y in (0..PAGES_PER_ROW).rev() {
            for x in (0..PAGES_PER_ROW).rev() {
                free.push(PageCoord::new(x, y));
            }
        }
        Self {
            free,
            cached: VecDeque::new(),
            cache_capacity: cache_capacity as usize,
        }
    }

    /// Acquire a page for `tile_key`.
    ///
    /// Returns `None` only when the atlas is fully exhausted (every page
    /// resident and uncached), which callers treat as "render without this
    /// shadow tile this frame".
    pub fn acquire(&mut self, tile_key: u64) -> Option<PageAcquire> {
        // Tier 1: this tile's own retired page, content intact.
        if let Some(pos) = self.cached.iter().position(|(_, key)| *key == tile_key) {
            let (page, _) = self.cached.remove(pos).unwrap();
            return Some(PageAcquire {
                page,
                needs_render: false,
            });
        }

        // Tier 2: brand-new page from the free list.
        if let Some(page) = self.free.pop() {
            return Some(PageAcquire {
                page,
                needs_render: true,
            });
        }

        // Tier 3: steal the oldest cached page.
        self.cached.pop_front().map(|(page, _)| PageAcquire {
            page,
            needs_render: true,
        })
    }

    /// Retire a page the tile no longer needs, keeping it warm in the
    /// cache ring. On overflow the oldest cached page returns to the free
    /// list.
    pub fn retire(&mut self, page: PageCoord, tile_key: u64) {
        self.cached.push_back((page, tile_key));
        if self.cached.len() > self.cache_capacity
            && let Some((evicted, _)) = self.cached.pop_front()
        {
            self.free.push(evicted);
        }
    }

    /// Return a page straight to the free list (owning light deleted; its
    /// content can never be revalidated).
    pub fn release(&mut self, page: PageCoord) {
        self.free.push(page);
    }

    #[must_use]
    pub fn free_count(&self) -> usize {
        self.free.len()
    }

    #[must_use]
    pub fn cached_count(&self) -> usize {
        self.cached.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cached_page_returns_without_render() {
        let mut alloc = PageAllocator::new(8);
        let a = alloc.acquire(1).unwrap();
        assert!(a.needs_render);
        alloc.retire(a.page, 1);
        let b = alloc.acquire(1).unwrap();
        assert_eq!(b.page, a.page, "tile must get its own page back");
        assert!(!b.needs_render, "cached content is still valid");
    }

    #[test]
    fn foreign_tile_does_not_steal_cached_content() {
        let mut alloc = PageAllocator::new(8);
        let a = alloc.acquire(1).unwrap();
        alloc.retire(a.page, 1);
        let b = alloc.acquire(2).unwrap();
        assert!(b.needs_render);
        assert_ne!(b.page, a.page, "free list is preferred over evicting the cache");
    }

    #[test]
    fn cache_overflow_spills_to_free_list() {
        let mut alloc = PageAllocator::new(2);
        let pages: Vec<_> = (0..3).map(|i| alloc.acquire(i).unwrap().page).collect();
        let free_before = alloc.free_count();
        for (i, page) in pages.iter().enumerate() {
            alloc.retire(*page, i as u64);
        }
        assert_eq!(alloc.cached_count(), 2);
        assert_eq!(alloc.free_count(), free_before + 1);
    }

    #[test]
    fn exhaustion_falls_back_to_cache_eviction() {
        let mut alloc = PageAllocator::new(4);
        // Drain the entire atlas.
        let total = (PAGES_PER_ROW as u64).pow(2);
        let mut last = None;
        for i in 0..total {
            last = Some(alloc.acquire(i).unwrap().page);
        }
        assert!(alloc.acquire(total).is_none(), "atlas exhausted");
        alloc.retire(last.unwrap(), 0);
        let stolen = alloc.acquire(total).unwrap();
        assert!(stolen.needs_render, "stolen cache page must re-render");
    }
}
