//! Bit-serial GEMM for low-precision integer matrices.
//!
//! Operand matrices of configurable bit-width (optionally signed, or bipolar
//! {-1, +1}) are decomposed into binary bit-planes; the product is computed
//! as AND+popcount over bit-plane pairs with shift weighting and sign
//! correction, accumulating 32-bit integers.
//!
//! ```
//! use gemm_bitserial::{alloc_gemm_context, gemm_bit_serial};
//!
//! let mut ctx = alloc_gemm_context(2, 3, 2, 2, 2, false, false).unwrap();
//! ctx.lhs.import_regular(&[1u8, 2, 3, 0, 1, 2], false);
//! ctx.rhs.import_regular(&[1u8, 1, 1, 2, 0, 1], false);
//! gemm_bit_serial(&mut ctx);
//! assert_eq!(ctx.res, [6, 5, 3, 2]);
//! ```

pub use bitserial_core::{align, elem, error, matrix, verify};
pub use bitserial_core::{AlignedVec, BitSerialError, BitSerialMatrix, Elem, Result};

pub use bitserial_kernels::{
    alloc_gemm_context, alloc_gemm_context_with, compute_block_size, detected_backend,
    finetune_block_size, gemm_bit_serial, gemm_bit_serial_parallel, gemv_bit_serial, has_neon,
    sum_rows, threshold_result, Backend, GemmContext, Tuning,
};
