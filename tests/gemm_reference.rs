//! Kernel cross-validation against the naive integer GEMM.
//!
//! Every admissible `(shape, bits, sign)` combination must reproduce
//! `C = A * B^T` computed directly from the source operands, including the
//! bipolar encodings and the parallel entry point.

use gemm_bitserial::verify::naive_gemm;
use gemm_bitserial::{
    alloc_gemm_context, alloc_gemm_context_with, gemm_bit_serial, gemm_bit_serial_parallel,
    gemv_bit_serial, threshold_result, Backend,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Random operand with every element in range for `(nbits, signed)`.
fn random_operand(rng: &mut StdRng, rows: usize, cols: usize, nbits: usize, signed: bool) -> Vec<i32> {
    (0..rows * cols)
        .map(|_| {
            if nbits == 1 && signed {
                if rng.gen_bool(0.5) {
                    1
                } else {
                    -1
                }
            } else if signed {
                rng.gen_range(-(1i32 << (nbits - 1))..(1i32 << (nbits - 1)))
            } else {
                rng.gen_range(0..(1i32 << nbits))
            }
        })
        .collect()
}

fn check_against_naive(
    m: usize,
    k: usize,
    n: usize,
    lhs_bits: usize,
    rhs_bits: usize,
    lhs_signed: bool,
    rhs_signed: bool,
    seed: u64,
) {
    let mut rng = StdRng::seed_from_u64(seed);
    let a = random_operand(&mut rng, m, k, lhs_bits, lhs_signed);
    let b = random_operand(&mut rng, n, k, rhs_bits, rhs_signed);

    let mut ctx =
        alloc_gemm_context(m, k, n, lhs_bits, rhs_bits, lhs_signed, rhs_signed).unwrap();
    ctx.lhs.import_regular(&a, false);
    ctx.rhs.import_regular(&b, false);
    gemm_bit_serial(&mut ctx);

    let expected = naive_gemm(&a, &b, m, k, n);
    assert_eq!(
        ctx.res, expected,
        "mismatch for {}x{}x{} bits ({}, {}) signed ({}, {})",
        m, k, n, lhs_bits, rhs_bits, lhs_signed, rhs_signed
    );

    gemm_bit_serial_parallel(&mut ctx);
    assert_eq!(ctx.res, expected, "parallel kernel disagrees with naive");
}

#[test]
fn gemm_matches_naive_across_shapes_bits_and_signs() {
    let shapes = [
        (1usize, 1usize, 1usize),
        (2, 3, 2),
        (5, 64, 5),
        (7, 65, 3),
        (16, 128, 17),
        (33, 70, 29),
    ];
    let bit_pairs = [(1usize, 1usize), (1, 2), (2, 1), (2, 2), (3, 4), (4, 3)];
    let signs = [(false, false), (true, false), (false, true), (true, true)];

    let mut seed = 0xB17u64;
    for &(m, k, n) in &shapes {
        for &(lb, rb) in &bit_pairs {
            for &(ls, rs) in &signs {
                seed += 1;
                check_against_naive(m, k, n, lb, rb, ls, rs, seed);
            }
        }
    }
}

#[test]
fn scenario_unsigned_2bit() {
    let mut ctx = alloc_gemm_context(2, 3, 2, 2, 2, false, false).unwrap();
    ctx.lhs.import_regular(&[1u8, 2, 3, 0, 1, 2], false);
    ctx.rhs.import_regular(&[1u8, 1, 1, 2, 0, 1], false);
    gemm_bit_serial(&mut ctx);
    assert_eq!(ctx.res, [6, 5, 3, 2]);
}

#[test]
fn scenario_signed_2bit() {
    let mut ctx = alloc_gemm_context(1, 4, 1, 2, 2, true, true).unwrap();
    ctx.lhs.import_regular(&[-2i8, 1, 0, -1], false);
    ctx.rhs.import_regular(&[1i8, 1, 1, 1], false);
    gemm_bit_serial(&mut ctx);
    assert_eq!(ctx.res, [-2]);
}

#[test]
fn scenario_bipolar_orthogonal() {
    let mut ctx = alloc_gemm_context(1, 8, 1, 1, 1, true, true).unwrap();
    ctx.lhs.import_regular(&[1i8; 8], false);
    ctx.rhs
        .import_regular(&[1i8, -1, 1, -1, 1, -1, 1, -1], false);
    gemm_bit_serial(&mut ctx);
    assert_eq!(ctx.res, [0]);
}

#[test]
fn bipolar_equals_sign_expanded_gemm() {
    let mut rng = StdRng::seed_from_u64(0x51DE);
    for &(m, k, n) in &[(3usize, 64usize, 4usize), (5, 100, 5), (8, 7, 8)] {
        let a = random_operand(&mut rng, m, k, 1, true);
        let b = random_operand(&mut rng, n, k, 1, true);

        let mut ctx = alloc_gemm_context(m, k, n, 1, 1, true, true).unwrap();
        ctx.lhs.import_regular(&a, false);
        ctx.rhs.import_regular(&b, false);
        gemm_bit_serial(&mut ctx);

        assert_eq!(ctx.res, naive_gemm(&a, &b, m, k, n));
    }
}

#[test]
fn backends_agree_bit_for_bit() {
    if !gemm_bitserial::has_neon() {
        return;
    }
    let mut rng = StdRng::seed_from_u64(0xA6EE);
    let (m, k, n) = (13, 200, 11);
    let a = random_operand(&mut rng, m, k, 3, true);
    let b = random_operand(&mut rng, n, k, 2, false);

    let mut run = |backend: Backend| {
        let mut ctx = alloc_gemm_context_with(backend, m, k, n, 3, 2, true, false).unwrap();
        ctx.lhs.import_regular(&a, false);
        ctx.rhs.import_regular(&b, false);
        gemm_bit_serial(&mut ctx);
        ctx.res
    };
    assert_eq!(run(Backend::Generic), run(Backend::Neon));
}

#[test]
fn parallel_matches_serial_on_many_tiles() {
    let mut rng = StdRng::seed_from_u64(0x9A11);
    let (m, k, n) = (512, 192, 96);
    let a = random_operand(&mut rng, m, k, 2, false);
    let b = random_operand(&mut rng, n, k, 2, true);

    let mut ctx = alloc_gemm_context(m, k, n, 2, 2, false, true).unwrap();
    ctx.lhs.import_regular(&a, false);
    ctx.rhs.import_regular(&b, false);
    gemm_bit_serial(&mut ctx);
    let serial = ctx.res.clone();
    gemm_bit_serial_parallel(&mut ctx);
    assert_eq!(serial, ctx.res);
}

#[test]
fn gemv_is_the_single_row_case() {
    let mut rng = StdRng::seed_from_u64(0x6E3B);
    let (m, k) = (21, 130);
    let a = random_operand(&mut rng, m, k, 3, false);
    let x = random_operand(&mut rng, 1, k, 3, false);

    let mut ctx = alloc_gemm_context(m, k, 1, 3, 3, false, false).unwrap();
    ctx.lhs.import_regular(&a, false);
    ctx.rhs.import_regular(&x, false);
    gemv_bit_serial(&mut ctx);
    assert_eq!(ctx.res, naive_gemm(&a, &x, m, k, 1));
}

#[test]
fn thresholding_counts_crossings_per_channel() {
    let mut ctx = alloc_gemm_context(2, 3, 2, 2, 2, false, false).unwrap();
    ctx.lhs.import_regular(&[1u8, 2, 3, 0, 1, 2], false);
    ctx.rhs.import_regular(&[1u8, 1, 1, 2, 0, 1], false);
    gemm_bit_serial(&mut ctx);
    // res = [6, 5, 3, 2]; thresholds: row 0 -> [4, 6], row 1 -> [2, 3]
    let thresholds = [4, 2, 6, 3];
    let out = threshold_result(&ctx.res, 2, 2, &thresholds, 2, 2).unwrap();
    assert_eq!(out, [2, 1, 2, 1]);
}

#[test]
fn threshold_broadcast_is_unsupported() {
    let err = threshold_result(&[1, 2, 3, 4], 2, 2, &[0], 1, 1).unwrap_err();
    assert!(err.to_string().contains("Not yet implemented"));
}
