//! Deterministic jitter for coincident points
//!
//! Both backends must perturb a zero separation the same way, so the jitter
//! is a pure function of the pair of node indices. The WGSL prelude in
//! [`crate::gpu`] carries a line-for-line copy of these functions.

/// Magnitude of the jitter applied to a degenerate axis
pub const JIGGLE_SCALE: f32 = 1e-6;

/// Jitter in `[-JIGGLE_SCALE / 2, JIGGLE_SCALE / 2]`, never exactly zero
pub fn jiggle(seed: u32) -> f32 {
    let s = seed.wrapping_mul(1_103_515_245).wrapping_add(12_345) & 0x7fff_ffff;
    let v = (s as f32 / 2_147_483_648.0 - 0.5) * JIGGLE_SCALE;
    if v == 0.0 { JIGGLE_SCALE * 0.25 } else { v }
}

/// Seed shared by both members of a pair, independent of argument order
pub fn pair_seed(i: u32, j: u32, node_count: u32) -> u32 {
    i.min(j).wrapping_mul(node_count).wrapping_add(i.max(j))
}

/// Jitter for node `i` against node `j` on `axis` (0 for x, 1 for y).
///
/// Antisymmetric: the lower index gets `+v`, the higher `-v`, so two
/// coincident nodes are pushed apart instead of together.
pub fn pair_jiggle(i: u32, j: u32, node_count: u32, axis: u32) -> f32 {
    let v = jiggle(pair_seed(i, j, node_count).wrapping_add(axis));
    if i < j { v } else { -v }
}
