//! Cache-blocking size solver.
//!
//! Chooses per-side row tiles that fit a cache budget: one block of 32-bit
//! result accumulators plus a full-depth input stripe per side,
//!
//! ```text
//! 32*L*R + d*(L + R) <= cache_bits,   L = lhs_mult*x, R = rhs_mult*x
//! ```
//!
//! which is quadratic in `x`; the solver takes the floor of the positive
//! root. A fine-tuning pass then shrinks a block when padding waste is high.

use bitserial_core::align::align_to;
use bitserial_core::error::{BitSerialError, Result};

/// Bits of one result accumulator in the cache budget.
const ACC_BITS: usize = 32;

/// Maximise row tiles `(L, R)` under the cache budget.
///
/// `depth_bits` is the padded depth in bits. The returned tiles are
/// multiples of `lhs_mult` and `rhs_mult` respectively.
pub fn compute_block_size(
    lhs_mult: usize,
    rhs_mult: usize,
    cache_bits: usize,
    depth_bits: usize,
) -> Result<(usize, usize)> {
    assert!(lhs_mult > 0 && rhs_mult > 0, "register multiples must be > 0");

    let a = (ACC_BITS * lhs_mult * rhs_mult) as f64;
    let b = (depth_bits * (lhs_mult + rhs_mult)) as f64;
    let c = -(cache_bits as f64);
    let discr_sq = b * b - 4.0 * a * c;
    if discr_sq <= 0.0 {
        return Err(BitSerialError::SolverInfeasible {
            cache_bits,
            depth_bits,
        });
    }
    let fits = |x: u128| {
        let l = lhs_mult as u128 * x;
        let r = rhs_mult as u128 * x;
        ACC_BITS as u128 * l * r + depth_bits as u128 * (l + r) <= cache_bits as u128
    };
    let mut x = ((-b + discr_sq.sqrt()) / (2.0 * a)).floor() as i64;
    // sqrt rounding can overshoot the exact root by one
    while x > 0 && !fits(x as u128) {
        x -= 1;
    }
    if x <= 0 {
        return Err(BitSerialError::SolverInfeasible {
            cache_bits,
            depth_bits,
        });
    }

    let lhs_block = lhs_mult * x as usize;
    let rhs_block = rhs_mult * x as usize;
    log::debug!(
        "block solver: depth {} bits, budget {} bits -> tiles {}x{}",
        depth_bits,
        cache_bits,
        lhs_block,
        rhs_block
    );
    Ok((lhs_block, rhs_block))
}

/// Shrink a block size to reduce padding waste.
///
/// Candidates descend from `bs_max` in steps of `bs_div`, keeping only
/// multiples of `bs_div`; the candidate with the smallest padding penalty
/// wins, and ties keep the largest candidate for throughput.
pub fn finetune_block_size(rows: usize, bs_max: usize, bs_div: usize) -> usize {
    assert!(bs_div > 0, "bs_div must be > 0");
    assert!(bs_max >= bs_div, "bs_max {} < bs_div {}", bs_max, bs_div);

    let mut best_cand = bs_max;
    let mut min_penalty = align_to(rows, best_cand) - rows;
    let mut cand = bs_max;
    while cand > bs_div {
        if cand.is_multiple_of(bs_div) {
            let penalty = align_to(rows, cand) - rows;
            if penalty < min_penalty {
                best_cand = cand;
                min_penalty = penalty;
            }
        }
        cand -= bs_div;
    }
    best_cand
}
