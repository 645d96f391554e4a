// SPDX-License-Identifier: AGPL-3.0-or-later
// © 2025 Ryo ∴ SpiralArchitect (kishkavsesvit@icloud.com)
// Part of SpiralTorch — Licensed under AGPL-3.0-or-later.
// Unauthorized derivative works or closed redistribution prohibited under AGPL §13.

use rayon::prelude::*;

/// Runs `op` once per sample row of `dst` (rows are `stride` wide), either on
/// the rayon pool or serially. Each worker owns one scratch value built by
/// `init`. A sample's work never depends on the dispatch mode, so both paths
/// produce identical bits.
pub(crate) fn for_each_sample<T, S, I, F>(parallel: bool, dst: &mut [T], stride: usize, init: I, op: F)
where
    T: Send,
    I: Fn() -> S + Sync + Send,
    F: Fn(&mut S, usize, &mut [T]) + Sync + Send,
{
    debug_assert!(stride > 0 && dst.len() % stride == 0);
    if parallel {
        dst.par_chunks_mut(stride)
            .enumerate()
            .for_each_init(init, |scratch, (sample, row)| op(scratch, sample, row));
    } else {
        let mut scratch = init();
        for (sample, row) in dst.chunks_mut(stride).enumerate() {
            op(&mut scratch, sample, row);
        }
    }
}
