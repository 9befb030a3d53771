//! Shadow Paging Tests
//!
//! Tests for:
//! - Exact ring-dilation planning (terminates, never overshoots, O(log R))
//! - Tile-map contiguity: each light's maps occupy [base, base+N) after
//!   end_sync, ranges never overlap
//! - Two-tier page reuse: warm cache hit returns content intact
//! - Technique selection from capability flags and forced configuration

use glam::Mat4;

use lucent::caps::BackendCaps;
use lucent::settings::{RendererSettings, ShadowTechnique};
use lucent::shadow::{LightKind, ShadowModule, plan_dilation};

fn caps_atomic() -> BackendCaps {
    BackendCaps {
        flush_after_tile_prepare: false,
        prefer_tile_copy: false,
        image_atomics: true,
    }
}

fn caps_tiled() -> BackendCaps {
    BackendCaps {
        flush_after_tile_prepare: true,
        prefer_tile_copy: true,
        image_atomics: false,
    }
}

// ============================================================================
// Dilation exactness
// ============================================================================

#[test]
fn dilation_exact_for_wide_parameter_sweep() {
    for radius in (0u32..=256).chain([1000, 4096, 65535]) {
        for max_rings in 1..=6 {
            let steps = plan_dilation(radius, max_rings);
            let total: u32 = steps.iter().map(|s| s.ring_count * s.multiplier).sum();
            assert_eq!(total, radius, "radius {radius}, max_rings {max_rings}");
            assert!(
                steps.len() <= 64,
                "radius {radius} took {} passes, expected logarithmic growth",
                steps.len()
            );

            let mut accumulated = 0;
            for step in steps {
                assert!(step.ring_count >= 1 && step.ring_count <= max_rings);
                assert!(
                    step.multiplier <= accumulated + 1,
                    "ring spacing may not skip unvisited tiles"
                );
                accumulated += step.ring_count * step.multiplier;
            }
        }
    }
}

// ============================================================================
// Tile-map contiguity
// ============================================================================

#[test]
fn tile_map_ranges_contiguous_and_disjoint() {
    let mut shadows = ShadowModule::new(&RendererSettings::default(), &caps_atomic());
    let lights = [
        shadows.light_add(LightKind::Punctual { face_count: 6 }),
        shadows.light_add(LightKind::Directional {
            level_min: -2,
            level_max: 2,
        }),
        shadows.light_add(LightKind::Punctual { face_count: 1 }),
    ];
    let counts = [6u32, 5, 1];

    shadows.begin_sync();
    for (&light, &count) in lights.iter().zip(&counts) {
        let views = vec![Mat4::IDENTITY; count as usize];
        shadows.light_sync(light, &views);
    }
    shadows.end_sync();

    let ranges: Vec<_> = lights
        .iter()
        .map(|&l| shadows.light_range(l).unwrap())
        .collect();
    let mut expected_base = 0;
    for (range, &count) in ranges.iter().zip(&counts) {
        assert_eq!(range.base, expected_base, "base must be the running sum");
        assert_eq!(range.count, count);
        expected_base += count;
    }
}

#[test]
fn shrinking_light_set_recompacts_from_zero() {
    let mut shadows = ShadowModule::new(&RendererSettings::default(), &caps_atomic());
    let a = shadows.light_add(LightKind::Punctual { face_count: 6 });
    let b = shadows.light_add(LightKind::Punctual { face_count: 3 });

    shadows.begin_sync();
    shadows.light_sync(a, &[Mat4::IDENTITY; 6]);
    shadows.light_sync(b, &[Mat4::IDENTITY; 3]);
    shadows.end_sync();
    assert_eq!(shadows.light_range(b).unwrap().base, 6);

    shadows.light_remove(a);
    shadows.begin_sync();
    shadows.light_sync(b, &[Mat4::IDENTITY; 3]);
    shadows.end_sync();
    let range = shadows.light_range(b).unwrap();
    assert_eq!((range.base, range.count), (0, 3));
}

// ============================================================================
// Page cache
// ============================================================================

#[test]
fn warm_page_cache_avoids_re_render() {
    let mut shadows = ShadowModule::new(&RendererSettings::default(), &caps_atomic());
    let first = shadows.request_page(0, 42).unwrap();
    assert!(first.needs_render, "cold page needs rendering");

    shadows.retire_page(0, 42);
    let again = shadows.request_page(0, 42).unwrap();
    assert_eq!(again.page, first.page);
    assert!(!again.needs_render, "warm cache hit keeps rendered depth");

    // A different tile must not inherit the cached content.
    let other = shadows.request_page(0, 43).unwrap();
    assert!(other.needs_render);
    assert_ne!(other.page, first.page);
}

// ============================================================================
// Technique selection
// ============================================================================

#[test]
fn technique_follows_capabilities() {
    let atomic = ShadowModule::new(&RendererSettings::default(), &caps_atomic());
    assert_eq!(atomic.technique(), ShadowTechnique::AtomicRaster);

    let tiled = ShadowModule::new(&RendererSettings::default(), &caps_tiled());
    assert_eq!(tiled.technique(), ShadowTechnique::TileCopy);
}

#[test]
fn forced_technique_overrides_detection() {
    let settings = RendererSettings {
        shadow_technique: Some(ShadowTechnique::TileCopy),
        ..RendererSettings::default()
    };
    let shadows = ShadowModule::new(&settings, &caps_atomic());
    assert_eq!(
        shadows.technique(),
        ShadowTechnique::TileCopy,
        "configuration data wins over detection"
    );
}
