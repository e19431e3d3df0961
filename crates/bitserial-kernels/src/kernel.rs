//! Cache-blocked bit-serial GEMM kernel.
//!
//! The outer loops walk LHS row tiles x RHS row tiles x bit-plane pairs and
//! delegate each row pair to the back-end's AND+popcount micro-kernel. Each
//! `(bL, bR)` contribution is weighted by `2^(bL+bR)` and negated when
//! exactly one operand's top signed plane is involved. Per result cell the
//! accumulation order is fixed: `bL` ascending, then `bR` ascending.
//!
//! Bipolar operands store {-1, +1} in a single plane, so their popcount sums
//! are remapped to signed sums with per-row popcount corrections:
//! both bipolar: `c = 4p - 2*rs_l[i] - 2*rs_r[j] + depth`; one bipolar:
//! each regular plane `t` contributes `(2p_t - rs_t) * 2^t` with the usual
//! top-plane sign.
//!
//! Padded rows and columns hold zero bits, so tiles may sweep across them;
//! only logical result cells are ever written.

use rayon::prelude::*;

use bitserial_core::matrix::BitSerialMatrix;

use crate::context::GemmContext;
use crate::dispatch::{detected_backend, Backend};

/// Below this LHS row count the parallel entry point stays single-threaded.
const PARALLEL_MIN_ROWS: usize = 128;

/// Per-plane, per-row popcounts needed by the bipolar correction paths.
struct Corrections {
    lhs: Vec<Vec<i32>>,
    rhs: Vec<Vec<i32>>,
}

fn plane_row_sums(backend: Backend, m: &BitSerialMatrix) -> Vec<Vec<i32>> {
    (0..m.nbits)
        .map(|b| {
            (0..m.nrows)
                .map(|r| backend.popcount(m.row_words(b, r)) as i32)
                .collect()
        })
        .collect()
}

fn corrections(backend: Backend, lhs: &BitSerialMatrix, rhs: &BitSerialMatrix) -> Corrections {
    let need_lhs = rhs.is_bipolar();
    let need_rhs = lhs.is_bipolar();
    Corrections {
        lhs: if need_lhs {
            plane_row_sums(backend, lhs)
        } else {
            Vec::new()
        },
        rhs: if need_rhs {
            plane_row_sums(backend, rhs)
        } else {
            Vec::new()
        },
    }
}

/// Multiply `ctx.lhs` by `ctx.rhs` transposed, writing `ctx.res`.
pub fn gemm_bit_serial(ctx: &mut GemmContext) {
    run(ctx, false)
}

/// Parallel variant: LHS row tiles are dispatched to the rayon pool, each
/// writing its disjoint result stripe. Bit-identical to [`gemm_bit_serial`];
/// falls back to it for small row counts.
pub fn gemm_bit_serial_parallel(ctx: &mut GemmContext) {
    run(ctx, true)
}

/// Matrix-vector product: the single-row-RHS case of the kernel.
pub fn gemv_bit_serial(ctx: &mut GemmContext) {
    assert_eq!(ctx.rhs.nrows, 1, "gemv requires a single-row rhs");
    gemm_bit_serial(ctx)
}

fn run(ctx: &mut GemmContext, parallel: bool) {
    let GemmContext {
        lhs,
        rhs,
        lhs_block,
        rhs_block,
        res,
        backend,
    } = ctx;
    let (lhs, rhs) = (&*lhs, &*rhs);
    let (lhs_block, rhs_block, backend) = (*lhs_block, *rhs_block, *backend);

    assert_eq!(
        lhs.ncols, rhs.ncols,
        "depth mismatch: lhs {} vs rhs {}",
        lhs.ncols, rhs.ncols
    );
    assert_eq!(
        lhs.words_per_row(),
        rhs.words_per_row(),
        "operand column padding mismatch"
    );
    assert_eq!(
        res.len(),
        lhs.nrows * rhs.nrows,
        "result length {} != {}x{}",
        res.len(),
        lhs.nrows,
        rhs.nrows
    );

    let sums = corrections(backend, lhs, rhs);
    res.fill(0);

    let stripe_len = lhs_block * rhs.nrows;
    if parallel && lhs.nrows >= PARALLEL_MIN_ROWS {
        res.par_chunks_mut(stripe_len)
            .enumerate()
            .for_each(|(tile, stripe)| {
                gemm_stripe(lhs, rhs, backend, rhs_block, &sums, tile * lhs_block, stripe);
            });
    } else {
        for (tile, stripe) in res.chunks_mut(stripe_len).enumerate() {
            gemm_stripe(lhs, rhs, backend, rhs_block, &sums, tile * lhs_block, stripe);
        }
    }
}

/// Compute one LHS tile's stripe of the result (rows `row0..row0 + rows`).
fn gemm_stripe(
    lhs: &BitSerialMatrix,
    rhs: &BitSerialMatrix,
    backend: Backend,
    rhs_block: usize,
    sums: &Corrections,
    row0: usize,
    stripe: &mut [i32],
) {
    let n = rhs.nrows;
    let rows = stripe.len() / n;
    let depth = lhs.ncols as i32;

    for rb in (0..n).step_by(rhs_block) {
        let r_end = (rb + rhs_block).min(n);

        if lhs.is_bipolar() && rhs.is_bipolar() {
            for i in 0..rows {
                let arow = lhs.row_words(0, row0 + i);
                let rs_l = sums.lhs[0][row0 + i];
                for j in rb..r_end {
                    let p = backend.and_popcount(arow, rhs.row_words(0, j)) as i32;
                    stripe[i * n + j] += 4 * p - 2 * rs_l - 2 * sums.rhs[0][j] + depth;
                }
            }
        } else if lhs.is_bipolar() {
            for br in 0..rhs.nbits {
                let neg = rhs.signed && br == rhs.nbits - 1;
                for i in 0..rows {
                    let arow = lhs.row_words(0, row0 + i);
                    for j in rb..r_end {
                        let p = backend.and_popcount(arow, rhs.row_words(br, j)) as i32;
                        let contrib = (2 * p - sums.rhs[br][j]) << br;
                        let cell = &mut stripe[i * n + j];
                        *cell += if neg { -contrib } else { contrib };
                    }
                }
            }
        } else if rhs.is_bipolar() {
            for bl in 0..lhs.nbits {
                let neg = lhs.signed && bl == lhs.nbits - 1;
                for i in 0..rows {
                    let arow = lhs.row_words(bl, row0 + i);
                    let rs_l = sums.lhs[bl][row0 + i];
                    for j in rb..r_end {
                        let p = backend.and_popcount(arow, rhs.row_words(0, j)) as i32;
                        let contrib = (2 * p - rs_l) << bl;
                        let cell = &mut stripe[i * n + j];
                        *cell += if neg { -contrib } else { contrib };
                    }
                }
            }
        } else {
            for bl in 0..lhs.nbits {
                for br in 0..rhs.nbits {
                    let neg = (lhs.signed && bl == lhs.nbits - 1)
                        != (rhs.signed && br == rhs.nbits - 1);
                    let shift = bl + br;
                    for i in 0..rows {
                        let arow = lhs.row_words(bl, row0 + i);
                        for j in rb..r_end {
                            let p = backend.and_popcount(arow, rhs.row_words(br, j)) as i32;
                            let contrib = p << shift;
                            let cell = &mut stripe[i * n + j];
                            *cell += if neg { -contrib } else { contrib };
                        }
                    }
                }
            }
        }
    }
}

/// Per-row popcounts of a 1-bit matrix.
///
/// Bipolar callers use this to turn AND-cardinalities into signed sums.
pub fn sum_rows(m: &BitSerialMatrix) -> Vec<i32> {
    assert_eq!(
        m.nbits, 1,
        "sum_rows requires a 1-bit matrix, got {} bits",
        m.nbits
    );
    let backend = detected_backend();
    (0..m.nrows)
        .map(|r| backend.popcount(m.row_words(0, r)) as i32)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::alloc_gemm_context_with;
    use bitserial_core::verify::naive_gemm;

    fn run_gemm(
        a: &[i32],
        b: &[i32],
        m: usize,
        k: usize,
        n: usize,
        bits: (usize, usize),
        signed: (bool, bool),
    ) -> Vec<i32> {
        let mut ctx =
            alloc_gemm_context_with(Backend::Generic, m, k, n, bits.0, bits.1, signed.0, signed.1)
                .unwrap();
        ctx.lhs.import_regular(a, false);
        ctx.rhs.import_regular(b, false);
        gemm_bit_serial(&mut ctx);
        ctx.res.clone()
    }

    #[test]
    fn test_unsigned_2bit() {
        let a = [1, 2, 3, 0, 1, 2];
        let b = [1, 1, 1, 2, 0, 1];
        let c = run_gemm(&a, &b, 2, 3, 2, (2, 2), (false, false));
        assert_eq!(c, [6, 5, 3, 2]);
    }

    #[test]
    fn test_signed_2bit() {
        let a = [-2, 1, 0, -1];
        let b = [1, 1, 1, 1];
        let c = run_gemm(&a, &b, 1, 4, 1, (2, 2), (true, true));
        assert_eq!(c, [-2]);
    }

    #[test]
    fn test_bipolar_orthogonal_rows() {
        let a = [1, 1, 1, 1, 1, 1, 1, 1];
        let b = [1, -1, 1, -1, 1, -1, 1, -1];
        let c = run_gemm(&a, &b, 1, 8, 1, (1, 1), (true, true));
        assert_eq!(c, [0]);
    }

    #[test]
    fn test_mixed_bipolar_times_unsigned() {
        let a = [1, -1, -1, 1];
        let b = [3, 0, 1, 2];
        let c = run_gemm(&a, &b, 1, 4, 1, (1, 2), (true, false));
        let expected = naive_gemm(&a, &b, 1, 4, 1);
        assert_eq!(c, expected);
    }

    #[test]
    fn test_matches_naive_on_larger_shape() {
        let m = 9;
        let k = 130;
        let n = 7;
        let a: Vec<i32> = (0..m * k).map(|i| ((i * 7 + 3) % 8) as i32).collect();
        let b: Vec<i32> = (0..n * k).map(|i| ((i * 5 + 1) % 8) as i32 - 4).collect();
        let c = run_gemm(&a, &b, m, k, n, (3, 3), (false, true));
        assert_eq!(c, naive_gemm(&a, &b, m, k, n));
    }

    #[test]
    fn test_parallel_matches_serial() {
        let m = 300;
        let k = 64;
        let n = 100;
        let a: Vec<i32> = (0..m * k).map(|i| ((i * 13 + 5) % 4) as i32).collect();
        let b: Vec<i32> = (0..n * k).map(|i| ((i * 11 + 2) % 4) as i32).collect();

        let mut ctx =
            alloc_gemm_context_with(Backend::Generic, m, k, n, 2, 2, false, false).unwrap();
        ctx.lhs.import_regular(&a, false);
        ctx.rhs.import_regular(&b, false);
        gemm_bit_serial(&mut ctx);
        let serial = ctx.res.clone();
        gemm_bit_serial_parallel(&mut ctx);
        assert_eq!(serial, ctx.res);
    }

    #[test]
    fn test_gemv_single_row_rhs() {
        let a = [1, 2, 3, 0, 1, 2];
        let x = [2, 1, 1];
        let mut ctx =
            alloc_gemm_context_with(Backend::Generic, 2, 3, 1, 2, 2, false, false).unwrap();
        ctx.lhs.import_regular(&a, false);
        ctx.rhs.import_regular(&x, false);
        gemv_bit_serial(&mut ctx);
        assert_eq!(ctx.res, naive_gemm(&a, &x, 2, 3, 1));
    }

    #[test]
    fn test_sum_rows() {
        let src = [1u8, 0, 1, 1, 0, 1, 0, 0, 0];
        let mut m = BitSerialMatrix::alloc(1, 3, 3, false, 1, 64).unwrap();
        m.import_regular(&src, false);
        assert_eq!(sum_rows(&m), [2, 2, 0]);
    }

    #[test]
    #[should_panic(expected = "requires a 1-bit matrix")]
    fn test_sum_rows_rejects_multibit() {
        let m = BitSerialMatrix::alloc(2, 3, 3, false, 1, 64).unwrap();
        sum_rows(&m);
    }
}
