//! Ring-Dilation Pass Planner
//!
//! Dilating tile usage by a radius R is done on the GPU in rings. Each
//! dispatch covers `ring_count` rings spaced `multiplier` tiles apart, so
//! one pass advances the dilation front by `ring_count * multiplier` —
//! but a ring may never be spaced wider than the area already visited, or
//! it would step over untagged tiles. The planner below chooses the step
//! sequence so the accumulated radius lands **exactly** on R (the GPU pass
//! is a full-resolution dispatch, so both overshoot and extra passes cost
//! real time), in `O(log R)` passes.
//!
//! Shared by shadow tile-map dilation and the depth-of-field tile dilate.

/// One GPU dilation dispatch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DilationStep {
    pub ring_count: u32,
    pub multiplier: u32,
}

/// Plan the dispatch sequence for a target dilation radius.
///
/// Invariants (checked by the property tests):
/// - the sum of `ring_count * multiplier` over all steps equals exactly
///   `target_radius`;
/// - every `ring_count <= max_ring_count`;
/// - every `multiplier` is at most one more than the radius already
///   accumulated when its step runs.
#[must_use]
pub fn plan_dilation(target_radius: u32, max_ring_count: u32) -> Vec<DilationStep> {
    assert!(max_ring_count >= 1, "at least one ring per pass");

    let mut steps = Vec::new();
    let mut accumulated = 0u32;
    while accumulated < target_radius {
        let remaining = target_radius - accumulated;
        // Widest safe spacing: one past the already-dilated radius.
        let max_multiplier = accumulated + 1;
        let ring_count = max_ring_count.min(remaining.div_ceil(max_multiplier));
        let multiplier = max_multiplier.min(remaining / ring_count);
        accumulated += ring_count * multiplier;
        steps.push(DilationStep {
            ring_count,
            multiplier,
        });
    }
    steps
}
