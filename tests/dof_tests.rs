//! Depth-of-Field Tests
//!
//! Tests for:
//! - The jitter/post-fx radius balance, pinned to closed-form values
//! - Strict stage ordering of the pass chain
//! - Capability-driven flush point placement
//! - Exactly-once release of every pooled intermediate buffer

use lucent::caps::BackendCaps;
use lucent::dof::{DepthOfField, split_radius};
use lucent::shader::StaticShader;

fn dof(flush: bool) -> DepthOfField {
    DepthOfField::new(&BackendCaps {
        flush_after_tile_prepare: flush,
        prefer_tile_copy: false,
        image_atomics: true,
    })
}

// ============================================================================
// Radius balance
// ============================================================================

#[test]
fn reference_configuration_splits_exactly() {
    // aperture 0.02, 16 temporal samples, no user overblur:
    // fx = (1/sqrt(16)) * 0.02 = 0.005, jitter = 0.02 - 0.005 = 0.015.
    let split = split_radius(0.02, 16, 0.0);
    assert!((split.fx_radius - 0.005).abs() < 1e-9, "fx_radius {}", split.fx_radius);
    assert!(
        (split.jitter_radius - 0.015).abs() < 1e-9,
        "jitter_radius {}",
        split.jitter_radius
    );
}

#[test]
fn user_overblur_shifts_work_to_post_fx() {
    let plain = split_radius(0.02, 16, 0.0);
    let overblurred = split_radius(0.02, 16, 0.5);
    assert!(overblurred.fx_radius > plain.fx_radius);
    assert!(overblurred.jitter_radius < plain.jitter_radius);
    assert!(overblurred.jitter_radius >= 0.0);
}

#[test]
fn single_sample_leaves_everything_to_post_fx() {
    let split = split_radius(0.02, 1, 0.0);
    assert!((split.fx_radius - 0.02).abs() < 1e-9);
    assert_eq!(split.jitter_radius, 0.0);
}

// ============================================================================
// Stage ordering
// ============================================================================

#[test]
fn chain_starts_with_setup_and_ends_with_resolve() {
    let plan = dof(false).plan(2);
    let shaders: Vec<_> = plan.iter().filter_map(|p| p.shader).collect();
    assert_eq!(shaders.first(), Some(&StaticShader::DofSetup));
    assert_eq!(shaders.last(), Some(&StaticShader::DofResolve));

    // The gather split runs exactly twice (foreground, background) and
    // strictly after every tile-prepare dispatch.
    let gather_count = shaders
        .iter()
        .filter(|s| **s == StaticShader::DofGather)
        .count();
    assert_eq!(gather_count, 2);
    let last_dilate = shaders
        .iter()
        .rposition(|s| *s == StaticShader::DofTileDilate)
        .unwrap();
    let first_gather = shaders
        .iter()
        .position(|s| *s == StaticShader::DofGather)
        .unwrap();
    assert!(last_dilate < first_gather);
}

#[test]
fn tile_dilation_uses_the_exact_ring_plan() {
    let plan = dof(false).plan(5);
    let total: u32 = plan
        .iter()
        .filter_map(|p| p.step)
        .map(|s| s.ring_count * s.multiplier)
        .sum();
    assert_eq!(total, 5, "dilate iterations must cover the radius exactly");
}

#[test]
fn flush_point_only_when_capability_demands_it() {
    assert!(dof(false).plan(2).iter().all(|p| p.shader.is_some()));
    let flushing = dof(true).plan(2);
    assert_eq!(
        flushing.iter().filter(|p| p.shader.is_none()).count(),
        1,
        "exactly one flush point, keyed by the capability table"
    );
}

// ============================================================================
// Buffer lifecycle
// ============================================================================

#[test]
fn each_pooled_buffer_released_exactly_once() {
    for radius in [0, 1, 4, 9] {
        let plan = dof(true).plan(radius);
        let mut released: Vec<&str> = plan
            .iter()
            .flat_map(|p| p.releases.iter().copied())
            .collect();
        let before = released.len();
        released.sort_unstable();
        released.dedup();
        assert_eq!(before, released.len(), "duplicate release at radius {radius}");
        assert_eq!(
            released.len(),
            11,
            "all eleven pooled buffers must come back (radius {radius})"
        );
    }
}
