//! Shader / Material Key Tests
//!
//! Tests for:
//! - ShaderUuid encode/decode round-trip over every valid field tuple
//! - Bit-layout stability (the packing is decoded by generated shader code)
//! - MaterialKey deduplication: identical classification shares one key
//! - End-to-end: visibility flags split sub-pass population as expected

use lucent::keys::{MaterialKey, ShaderUuid};
use lucent::material::{
    DisplacementType, GeometryType, MaterialArena, MaterialDescriptor, PipelineType,
    ProbeCaptureMode, ThicknessMode, VisibilityFlags,
};
use lucent::pass::SubPassShader;
use lucent::pipeline::{PipelineModules, SurfaceDraw};
use lucent::settings::RendererSettings;

use slotmap::Key;

// ============================================================================
// Round-trip law
// ============================================================================

#[test]
fn uuid_roundtrip_over_every_valid_tuple() {
    for geometry in GeometryType::ALL {
        for pipeline in PipelineType::ALL {
            for displacement in [DisplacementType::Bump, DisplacementType::Displace] {
                for thickness in [ThicknessMode::Sphere, ThicknessMode::Slab] {
                    for vis_bits in 0u8..16 {
                        let visibility = VisibilityFlags::from_bits_truncate(vis_bits);
                        let uuid = ShaderUuid::encode(
                            geometry,
                            pipeline,
                            displacement,
                            thickness,
                            visibility,
                        );
                        let fields = uuid.decode().expect("encoded uuid must decode");
                        assert_eq!(fields.geometry, geometry);
                        assert_eq!(fields.pipeline, pipeline);
                        assert_eq!(fields.displacement, displacement);
                        assert_eq!(fields.thickness, thickness);
                        assert_eq!(fields.visibility, visibility);
                    }
                }
            }
        }
    }
}

#[test]
fn bit_layout_is_stable() {
    // Decoded inside generated shader code; shifting any field breaks the
    // GPU side silently.
    let uuid = ShaderUuid::encode(
        GeometryType::World,
        PipelineType::Capture,
        DisplacementType::Displace,
        ThicknessMode::Slab,
        VisibilityFlags::CAMERA | VisibilityFlags::PROBE_PLANAR,
    );
    let expected = 4u64 | (5 << 4) | (1 << 8) | (1 << 9) | (0b1001 << 10);
    assert_eq!(uuid.bits(), expected, "packed layout drifted");
}

// ============================================================================
// End-to-end: visibility-driven key buckets
// ============================================================================

#[test]
fn visibility_flags_split_material_keys_but_not_buckets() {
    let mut arena = MaterialArena::new();
    let material = arena.insert(MaterialDescriptor::default());
    let desc = arena.get(material).unwrap().clone();

    let mut modules = PipelineModules::new(RendererSettings::default());
    modules.begin_sync();

    let key_for = |visibility: VisibilityFlags| {
        MaterialKey::new(
            material,
            ShaderUuid::encode(
                GeometryType::Mesh,
                PipelineType::Deferred,
                DisplacementType::Bump,
                ThicknessMode::Sphere,
                visibility,
            ),
        )
    };

    // Three surfaces, identical material and classification apart from the
    // visibility flags: camera-only, shadow-only, camera+shadow.
    let camera_only = key_for(VisibilityFlags::CAMERA);
    let shadow_only = key_for(VisibilityFlags::SHADOW);
    let both = key_for(VisibilityFlags::CAMERA | VisibilityFlags::SHADOW);
    assert_ne!(camera_only, both);
    assert_ne!(shadow_only, both);

    // Only the camera-visible surfaces reach the deferred G-buffer; the
    // shadow-only surface routes to the shadow pipeline.
    for key in [camera_only, both] {
        modules
            .material_add(
                &SurfaceDraw {
                    object: lucent::material::ObjectId::null(),
                    material,
                    descriptor: &desc,
                    key,
                },
                PipelineType::Deferred,
                ProbeCaptureMode::None,
            )
            .unwrap();
    }
    modules
        .material_add(
            &SurfaceDraw {
                object: lucent::material::ObjectId::null(),
                material,
                descriptor: &desc,
                key: shadow_only,
            },
            PipelineType::Shadow,
            ProbeCaptureMode::None,
        )
        .unwrap();

    // Two distinct keys in the G-buffer, both landing in the same sub-pass
    // bucket since blend/sidedness are identical.
    let passes = &modules.deferred.opaque_layer.gbuffer.passes;
    assert_eq!(passes.len(), 2, "two shader-key buckets expected");
    let names: Vec<_> = passes.iter().map(|p| p.name).collect();
    assert!(names.iter().all(|n| *n == "deferred.opaque.single"));
    let keys: Vec<_> = passes
        .iter()
        .map(|p| match p.shader {
            SubPassShader::Material(k) => k,
            other => panic!("expected a material shader, got {other:?}"),
        })
        .collect();
    assert!(keys.contains(&camera_only) && keys.contains(&both));
}

#[test]
fn identical_keys_share_one_sub_pass() {
    let mut arena = MaterialArena::new();
    let material = arena.insert(MaterialDescriptor::default());
    let desc = arena.get(material).unwrap().clone();
    let key = MaterialKey::new(
        material,
        ShaderUuid::encode(
            GeometryType::Mesh,
            PipelineType::Deferred,
            DisplacementType::Bump,
            ThicknessMode::Sphere,
            VisibilityFlags::CAMERA,
        ),
    );

    let mut modules = PipelineModules::new(RendererSettings::default());
    modules.begin_sync();
    let surface = SurfaceDraw {
        object: lucent::material::ObjectId::null(),
        material,
        descriptor: &desc,
        key,
    };
    let a = modules
        .material_add(&surface, PipelineType::Deferred, ProbeCaptureMode::None)
        .unwrap();
    let b = modules
        .material_add(&surface, PipelineType::Deferred, ProbeCaptureMode::None)
        .unwrap();
    assert_eq!(a, b, "one key, one bucket, one handle");
}
