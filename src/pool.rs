//! Pooled Render Textures
//!
//! Per-frame intermediate textures (G-buffer layers, radiance accumulators,
//! depth-of-field chains) are acquired from a pool keyed by **name + shape**
//! and handed back as soon as their last reader has consumed them. Pooled
//! textures are never destroyed during normal rendering; they persist in the
//! free pool for reuse next frame. Call [`TexturePool::trim`] after a
//! resolution change to drop stale allocations.
//!
//! One pipeline owns a pooled name exclusively for the duration of a frame.
//! Acquiring a name that is already checked out is a logic bug; the pool
//! carries a `debug_assert` for it.

use rustc_hash::FxHashMap;

/// Shape portion of the pool key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextureShape {
    pub width: u32,
    pub height: u32,
    pub layers: u32,
    pub format: wgpu::TextureFormat,
    pub usage: wgpu::TextureUsages,
    pub mip_level_count: u32,
}

impl TextureShape {
    #[must_use]
    pub fn color_2d(width: u32, height: u32, format: wgpu::TextureFormat) -> Self {
        Self {
            width,
            height,
            layers: 1,
            format,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::TEXTURE_BINDING,
            mip_level_count: 1,
        }
    }

    #[must_use]
    pub fn storage_2d(width: u32, height: u32, format: wgpu::TextureFormat) -> Self {
        Self {
            width,
            height,
            layers: 1,
            format,
            usage: wgpu::TextureUsages::STORAGE_BINDING | wgpu::TextureUsages::TEXTURE_BINDING,
            mip_level_count: 1,
        }
    }
}

#[derive(Clone, PartialEq, Eq, Hash)]
struct PoolKey {
    name: &'static str,
    shape: TextureShape,
}

struct PooledTexture {
    texture: wgpu::Texture,
    default_view: wgpu::TextureView,
    idle_frames: u32,
}

impl PooledTexture {
    fn new(device: &wgpu::Device, name: &'static str, shape: &TextureShape) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(name),
            size: wgpu::Extent3d {
                width: shape.width,
                height: shape.height,
                depth_or_array_layers: shape.layers,
            },
            mip_level_count: shape.mip_level_count,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format: shape.format,
            usage: shape.usage,
            view_formats: &[],
        });
        let default_view = texture.create_view(&wgpu::TextureViewDescriptor::default());
        Self {
            texture,
            default_view,
            idle_frames: 0,
        }
    }
}

/// A texture checked out of the pool for the current frame.
pub struct PoolHandle {
    key_name: &'static str,
    shape: TextureShape,
    inner: PooledTexture,
}

impl PoolHandle {
    #[inline]
    #[must_use]
    pub fn texture(&self) -> &wgpu::Texture {
        &self.inner.texture
    }

    #[inline]
    #[must_use]
    pub fn view(&self) -> &wgpu::TextureView {
        &self.inner.default_view
    }

    #[inline]
    #[must_use]
    pub fn name(&self) -> &'static str {
        self.key_name
    }
}

/// Named texture pool with an acquire/release discipline.
pub struct TexturePool {
    free: FxHashMap<PoolKey, Vec<PooledTexture>>,
    /// Names currently checked out (debug bookkeeping only).
    #[cfg(debug_assertions)]
    checked_out: rustc_hash::FxHashSet<&'static str>,
}

impl Default for TexturePool {
    fn default() -> Self {
        Self::new()
    }
}

impl TexturePool {
    #[must_use]
    pub fn new() -> Self {
        Self {
            free: FxHashMap::default(),
            #[cfg(debug_assertions)]
            checked_out: rustc_hash::FxHashSet::default(),
        }
    }

    /// Check a texture out of the pool, creating one on a miss.
    pub fn acquire(
        &mut self,
        device: &wgpu::Device,
        name: &'static str,
        shape: TextureShape,
    ) -> PoolHandle {
        #[cfg(debug_assertions)]
        {
            debug_assert!(
                self.checked_out.insert(name),
                "texture pool name {name:?} acquired twice in one frame"
            );
        }

        let key = PoolKey { name, shape };
        let inner = self
            .free
            .get_mut(&key)
            .and_then(Vec::pop)
            .map_or_else(|| PooledTexture::new(device, name, &shape), |mut t| {
                t.idle_frames = 0;
                t
            });

        PoolHandle {
            key_name: name,
            shape,
            inner,
        }
    }

    /// Return a texture to the pool. Call at the exact point the last
    /// reading pass has been recorded — releasing earlier would let another
    /// acquire reuse memory that is still feeding an in-flight pass.
    pub fn release(&mut self, handle: PoolHandle) {
        #[cfg(debug_assertions)]
        {
            self.checked_out.remove(handle.key_name);
        }
        let key = PoolKey {
            name: handle.key_name,
            shape: handle.shape,
        };
        self.free.entry(key).or_default().push(handle.inner);
    }

    /// Drop free textures that have been idle for more than
    /// `max_idle_frames` frames. Call after resolution changes.
    pub fn trim(&mut self, max_idle_frames: u32) {
        for bucket in self.free.values_mut() {
            for t in bucket.iter_mut() {
                t.idle_frames += 1;
            }
            bucket.retain(|t| t.idle_frames <= max_idle_frames);
        }
        self.free.retain(|_, bucket| !bucket.is_empty());
    }

    /// Total textures resident in the free pool.
    #[must_use]
    pub fn free_count(&self) -> usize {
        self.free.values().map(Vec::len).sum()
    }
}
