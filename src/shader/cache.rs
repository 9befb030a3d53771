//! Shader Cache
//!
//! Central owner of all compiled shader modules. Static utility shaders are
//! compiled from embedded WGSL, lazily or asynchronously by group; material
//! shaders are produced by the injected [`MaterialCodegen`] callback, then
//! amended (resource repositioning, budget enforcement) and deduplicated by
//! an xxh3-128 hash of the final source.
//!
//! # Concurrency contract
//!
//! Internal maps are guarded by a single `parking_lot::Mutex`:
//! single-writer-many-reader between the main thread and the compile
//! worker threads. Workers never hold the lock — they deliver finished
//! modules over a `flume` channel which is drained under the lock.
//!
//! `wait_ready` blocks without a timeout. This is a deliberate barrier used
//! only at controlled sync points (before the first frame); a stuck driver
//! compile hanging it is a platform-trust boundary, not something handled
//! defensively here.

use parking_lot::Mutex;
use rustc_hash::FxHashMap;
use xxhash_rust::xxh3::xxh3_128;

use crate::errors::{RenderError, Result};
use crate::keys::{MaterialKey, ShaderUuid};
use crate::material::{GeometryType, MaterialDescriptor, MaterialId, PipelineType, VisibilityFlags};
use crate::settings::RendererSettings;

use super::create_info::ShaderCreateInfo;
use super::{ShaderGroups, SourceFile, StaticShader};

/// Sampler slots `[0, FIRST_MATERIAL_SAMPLER)` are reserved for
/// renderer-owned bindings (shadow atlas, probes, utility LUTs).
const FIRST_MATERIAL_SAMPLER: u32 = 8;

/// Callback producing generated shader code for one material variant.
///
/// The renderer's only contract with it: given the packed uuid (decodable
/// into pipeline/geometry/displacement/thickness fields), return a
/// structured description the cache can amend before finalizing.
pub trait MaterialCodegen: Send + Sync {
    fn generate(&self, uuid: ShaderUuid, material: &MaterialDescriptor) -> ShaderCreateInfo;
}

/// A compiled static shader: module plus entry-point name.
#[derive(Debug, Clone)]
pub struct StaticShaderVariant {
    pub module: wgpu::ShaderModule,
    pub entry_point: &'static str,
}

/// A resolved material shader variant.
#[derive(Debug, Clone)]
pub struct MaterialShaderHandle {
    pub key: MaterialKey,
    pub module: wgpu::ShaderModule,
    pub source_hash: u128,
    /// Set when amendment cleared a resource list over budget; the shader
    /// renders visibly wrong but safely.
    pub degraded: bool,
}

/// A pending light-eval specialization of a parent material shader.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SpecializationHandle {
    pub parent: MaterialKey,
    pub closure_count: u32,
}

type CompiledBatch = (ShaderGroups, Vec<(SourceFile, wgpu::ShaderModule)>);

struct CacheInner {
    static_modules: FxHashMap<SourceFile, wgpu::ShaderModule>,
    ready_groups: ShaderGroups,
    pending_groups: ShaderGroups,
    /// xxh3-128 of final material WGSL → module (shared across keys whose
    /// amended source collapses to the same text).
    module_dedup: FxHashMap<u128, wgpu::ShaderModule>,
    materials: FxHashMap<MaterialKey, MaterialShaderHandle>,
    specializations: Vec<SpecializationHandle>,
}

/// Central shader cache, shared by reference with every pipeline.
pub struct ShaderCache {
    device: wgpu::Device,
    codegen: Box<dyn MaterialCodegen>,
    max_samplers: u32,
    max_attributes: u32,
    inner: Mutex<CacheInner>,
    tx: flume::Sender<CompiledBatch>,
    rx: flume::Receiver<CompiledBatch>,
}

impl ShaderCache {
    #[must_use]
    pub fn new(
        device: wgpu::Device,
        settings: &RendererSettings,
        codegen: Box<dyn MaterialCodegen>,
    ) -> Self {
        let (tx, rx) = flume::unbounded();
        Self {
            device,
            codegen,
            max_samplers: settings.max_samplers,
            max_attributes: settings.max_attributes,
            inner: Mutex::new(CacheInner {
                static_modules: FxHashMap::default(),
                ready_groups: ShaderGroups::empty(),
                pending_groups: ShaderGroups::empty(),
                module_dedup: FxHashMap::default(),
                materials: FxHashMap::default(),
                specializations: Vec::new(),
            }),
            tx,
            rx,
        }
    }

    // ── Static shaders ───────────────────────────────────────────────────────

    /// Returns (lazily compiling if needed) one of the fixed utility
    /// shaders.
    #[must_use]
    pub fn get_static(&self, shader: StaticShader) -> StaticShaderVariant {
        let mut inner = self.inner.lock();
        self.drain_completed(&mut inner);

        let file = shader.file();
        let module = inner
            .static_modules
            .entry(file)
            .or_insert_with(|| compile_file(&self.device, file))
            .clone();
        inner.ready_groups |= file.group();

        StaticShaderVariant {
            module,
            entry_point: shader.entry_point(),
        }
    }

    /// Fire async compilation for the requested groups.
    ///
    /// Returns the subset of `groups` that is **already** compiled; the
    /// rest completes on worker threads and is picked up by the next cache
    /// access or by [`wait_ready`](Self::wait_ready).
    pub fn static_shaders_load_async(&self, groups: ShaderGroups) -> ShaderGroups {
        let mut inner = self.inner.lock();
        self.drain_completed(&mut inner);

        let to_spawn = groups & !inner.ready_groups & !inner.pending_groups;
        if !to_spawn.is_empty() {
            inner.pending_groups |= to_spawn;
            let device = self.device.clone();
            let tx = self.tx.clone();
            std::thread::Builder::new()
                .name("lucent-shader-compile".into())
                .spawn(move || {
                    let modules: Vec<_> = SourceFile::for_groups(to_spawn)
                        .map(|file| (file, compile_file(&device, file)))
                        .collect();
                    // Receiver dropped during shutdown: nothing to deliver to.
                    let _ = tx.send((to_spawn, modules));
                })
                .expect("failed to spawn shader compile thread");
        }

        groups & inner.ready_groups
    }

    /// Block until every requested group is compiled.
    pub fn wait_ready(&self, groups: ShaderGroups) -> Result<()> {
        loop {
            {
                let mut inner = self.inner.lock();
                self.drain_completed(&mut inner);
                if inner.ready_groups.contains(groups) {
                    return Ok(());
                }
                let missing = groups & !inner.ready_groups & !inner.pending_groups;
                // Not ready and nobody compiling it: do it here and now.
                for file in SourceFile::for_groups(missing) {
                    let module = compile_file(&self.device, file);
                    inner.static_modules.insert(file, module);
                    inner.ready_groups |= file.group();
                }
                if inner.ready_groups.contains(groups) {
                    return Ok(());
                }
            }
            let batch = self
                .rx
                .recv()
                .map_err(|_| RenderError::CompileCancelled("compile worker channel closed"))?;
            let mut inner = self.inner.lock();
            Self::apply_batch(&mut inner, batch);
        }
    }

    fn drain_completed(&self, inner: &mut CacheInner) {
        while let Ok(batch) = self.rx.try_recv() {
            Self::apply_batch(inner, batch);
        }
    }

    fn apply_batch(inner: &mut CacheInner, (groups, modules): CompiledBatch) {
        for (file, module) in modules {
            inner.static_modules.entry(file).or_insert(module);
        }
        inner.pending_groups &= !groups;
        inner.ready_groups |= groups;
    }

    // ── Material shaders ─────────────────────────────────────────────────────

    /// Resolve the shader variant for one (material, pipeline, geometry)
    /// combination, compiling on first request.
    pub fn get_material(
        &self,
        id: MaterialId,
        material: &MaterialDescriptor,
        pipeline: PipelineType,
        geometry: GeometryType,
        visibility: VisibilityFlags,
    ) -> Result<MaterialShaderHandle> {
        if !has_template(pipeline, geometry) {
            return Err(RenderError::UnsupportedPipeline { pipeline, geometry });
        }

        let uuid = ShaderUuid::encode(
            geometry,
            pipeline,
            material.displacement,
            material.thickness,
            visibility,
        );
        let key = MaterialKey::new(id, uuid);

        {
            let mut inner = self.inner.lock();
            self.drain_completed(&mut inner);
            if let Some(handle) = inner.materials.get(&key) {
                return Ok(handle.clone());
            }
        }

        // Codegen runs outside the lock; it may be expensive.
        let mut info = self.codegen.generate(uuid, material);
        let within_budget = info.amend(
            uuid,
            material,
            material.closures,
            FIRST_MATERIAL_SAMPLER,
            self.max_samplers,
            self.max_attributes,
        );

        let mut hashed = info.source.clone();
        for (k, v) in &info.defines {
            hashed.push_str(k);
            hashed.push('=');
            hashed.push_str(v);
            hashed.push(';');
        }
        let source_hash = xxh3_128(hashed.as_bytes());

        let mut inner = self.inner.lock();
        let device = &self.device;
        let module = inner
            .module_dedup
            .entry(source_hash)
            .or_insert_with(|| {
                device.create_shader_module(wgpu::ShaderModuleDescriptor {
                    label: Some(&info.label),
                    source: wgpu::ShaderSource::Wgsl(info.source.clone().into()),
                })
            })
            .clone();

        let handle = MaterialShaderHandle {
            key,
            module,
            source_hash,
            degraded: !within_budget,
        };
        inner.materials.insert(key, handle.clone());
        Ok(handle)
    }

    /// Register a light-eval specialization of a compiled material shader.
    pub fn specialize(&self, parent: MaterialKey, closure_count: u32) -> SpecializationHandle {
        let handle = SpecializationHandle {
            parent,
            closure_count,
        };
        let mut inner = self.inner.lock();
        if !inner.specializations.contains(&handle) {
            inner.specializations.push(handle);
        }
        handle
    }

    /// Cancel all in-flight compilation work.
    ///
    /// Specialization handles are cancelled **before** their parent
    /// shaders so an in-flight specialization can never reference a
    /// destroyed parent module.
    pub fn shutdown(&self) {
        let mut inner = self.inner.lock();
        let spec_count = inner.specializations.len();
        inner.specializations.clear();
        let material_count = inner.materials.len();
        inner.materials.clear();
        inner.module_dedup.clear();
        log::debug!(
            "shader cache shutdown: cancelled {spec_count} specializations, \
             released {material_count} material variants"
        );
    }

    /// Number of distinct compiled material variants (diagnostics).
    #[must_use]
    pub fn material_variant_count(&self) -> usize {
        self.inner.lock().materials.len()
    }
}

/// Template support table. A combination absent here has no create-info
/// template: requesting it is a code/data mismatch surfaced as
/// [`RenderError::UnsupportedPipeline`].
#[must_use]
pub fn has_template(pipeline: PipelineType, geometry: GeometryType) -> bool {
    match geometry {
        GeometryType::Volume => pipeline.is_volume(),
        GeometryType::World => matches!(
            pipeline,
            PipelineType::Forward | PipelineType::Capture | PipelineType::VolumeMaterial
        ),
        GeometryType::Mesh | GeometryType::Curves | GeometryType::PointCloud => {
            !pipeline.is_volume()
        }
    }
}

fn compile_file(device: &wgpu::Device, file: SourceFile) -> wgpu::ShaderModule {
    device.create_shader_module(wgpu::ShaderModuleDescriptor {
        label: Some(file.label()),
        source: wgpu::ShaderSource::Wgsl(file.source().into()),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn volume_geometry_requires_volume_pipeline() {
        assert!(has_template(PipelineType::VolumeMaterial, GeometryType::Volume));
        assert!(!has_template(PipelineType::Deferred, GeometryType::Volume));
    }

    #[test]
    fn mesh_rejects_volume_pipelines() {
        assert!(!has_template(PipelineType::VolumeOccupancy, GeometryType::Mesh));
        assert!(has_template(PipelineType::Shadow, GeometryType::Mesh));
    }
}
