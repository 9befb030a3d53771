//! Closure / G-Buffer Layout Tests
//!
//! Tests for:
//! - bin_count monotonicity under bit addition (modulo the merge rule)
//! - The diffuse+translucent merge and its clear-coat re-split
//! - closure_count clamp to [1, 3] over every possible bit-set
//! - normal_layer_count tracking auxiliary directional closures

use lucent::closure::{
    ClosureBits, MAX_CLOSURE_COUNT, bin_count, closure_count, effective_bits, normal_layer_count,
};

const ALL_BITS: [ClosureBits; 12] = [
    ClosureBits::DIFFUSE,
    ClosureBits::SUBSURFACE,
    ClosureBits::REFLECTION,
    ClosureBits::REFRACTION,
    ClosureBits::TRANSLUCENT,
    ClosureBits::TRANSPARENCY,
    ClosureBits::EMISSION,
    ClosureBits::HOLDOUT,
    ClosureBits::VOLUME,
    ClosureBits::AMBIENT_OCCLUSION,
    ClosureBits::SHADER_TO_RGBA,
    ClosureBits::CLEARCOAT,
];

fn every_subset() -> impl Iterator<Item = ClosureBits> {
    (0u16..(1 << 12)).map(|i| {
        let mut bits = ClosureBits::empty();
        for (bit_index, flag) in ALL_BITS.iter().enumerate() {
            if i & (1 << bit_index) != 0 {
                bits |= *flag;
            }
        }
        bits
    })
}

// ============================================================================
// bin_count
// ============================================================================

#[test]
fn bin_count_monotone_under_bit_addition() {
    let merge_pair = ClosureBits::DIFFUSE | ClosureBits::TRANSLUCENT;
    for bits in every_subset() {
        for added in ALL_BITS {
            if bits.contains(added) {
                continue;
            }
            let grown = bits | added;
            let before = bin_count(bits);
            let after = bin_count(grown);
            // Only the diffuse+translucent merge may absorb an addition
            // without growing the count; nothing ever shrinks it.
            let merged = grown.contains(merge_pair) && !grown.contains(ClosureBits::CLEARCOAT);
            if merged {
                assert!(after >= before, "merge may flatten growth, never reverse it");
            } else {
                assert!(
                    after >= before,
                    "adding {added:?} to {bits:?} shrank bin_count {before} -> {after}"
                );
            }
        }
    }
}

#[test]
fn clearcoat_resplits_the_merged_bin() {
    let merged = ClosureBits::DIFFUSE | ClosureBits::TRANSLUCENT;
    assert_eq!(bin_count(ClosureBits::DIFFUSE), 1);
    assert_eq!(bin_count(merged), 1, "diffuse+translucent share a bin");
    assert_eq!(
        bin_count(merged | ClosureBits::CLEARCOAT),
        2,
        "clear-coat must strictly re-split the merged bin"
    );
}

// ============================================================================
// closure_count clamp
// ============================================================================

#[test]
fn closure_count_always_in_unit_range() {
    for bits in every_subset() {
        let count = closure_count(bits);
        assert!(
            (1..=MAX_CLOSURE_COUNT).contains(&count),
            "closure_count({bits:?}) = {count} out of [1, {MAX_CLOSURE_COUNT}]"
        );
    }
}

#[test]
fn empty_graph_contributes_emission() {
    assert_eq!(closure_count(ClosureBits::empty()), 1);
    assert!(
        effective_bits(ClosureBits::empty()).contains(ClosureBits::EMISSION),
        "an empty shader graph must never drop out of its layer"
    );
    // Already-lit sets are left alone.
    assert_eq!(
        effective_bits(ClosureBits::DIFFUSE),
        ClosureBits::DIFFUSE
    );
}

// ============================================================================
// normal_layer_count
// ============================================================================

#[test]
fn normal_layers_add_one_per_auxiliary_closure() {
    for bits in every_subset() {
        let aux = (bits
            & (ClosureBits::SUBSURFACE | ClosureBits::TRANSLUCENT | ClosureBits::REFRACTION))
            .bits()
            .count_ones();
        assert_eq!(normal_layer_count(bits), bin_count(bits) + aux);
    }
}
