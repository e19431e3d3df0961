//! Scalar reference GEMM for cross-validating all kernel paths.

/// Naive integer GEMM computing `C = A * B^T`.
///
/// `a` is row-major `m x k`, `b` is row-major `n x k`; the result is
/// row-major `m x n` with `c[i][j] = sum_k a[i][k] * b[j][k]`, matching the
/// operand orientation of the bit-serial kernel.
pub fn naive_gemm(a: &[i32], b: &[i32], m: usize, k: usize, n: usize) -> Vec<i32> {
    assert_eq!(a.len(), m * k, "lhs length {} != {}x{}", a.len(), m, k);
    assert_eq!(b.len(), n * k, "rhs length {} != {}x{}", b.len(), n, k);
    let mut c = vec![0i32; m * n];
    for i in 0..m {
        for j in 0..n {
            let mut acc = 0i32;
            for kk in 0..k {
                acc += a[i * k + kk] * b[j * k + kk];
            }
            c[i * n + j] = acc;
        }
    }
    c
}
