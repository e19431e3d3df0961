//! GEMM context: operand matrices, block sizes, result buffer.
//!
//! The context owns both bit-serial operands, the blocking decision, and the
//! `i32` result buffer; dropping it releases all three. The result is
//! unpadded: only logical cells materialise.

use bitserial_core::align::{align_to, WORD_BITS};
use bitserial_core::error::{BitSerialError, Result};
use bitserial_core::matrix::BitSerialMatrix;

use crate::dispatch::{detected_backend, Backend, Tuning};
use crate::solver::{compute_block_size, finetune_block_size};

/// Padding waste above this fraction of the row count triggers the
/// block-size fine-tuner.
const WASTE_NUM: usize = 1;
const WASTE_DEN: usize = 10;

/// Operands, blocking and result for one bit-serial product `lhs * rhs^T`.
#[derive(Debug)]
pub struct GemmContext {
    pub lhs: BitSerialMatrix,
    pub rhs: BitSerialMatrix,
    /// LHS rows per cache tile; divides `lhs.nrows_a`.
    pub lhs_block: usize,
    /// RHS rows per cache tile; divides `rhs.nrows_a`.
    pub rhs_block: usize,
    /// Row-major `lhs.nrows x rhs.nrows` accumulators.
    pub res: Vec<i32>,
    /// Micro-kernel selected when the context was allocated.
    pub backend: Backend,
}

impl GemmContext {
    /// Whether both operands are bipolar {-1, +1}.
    #[inline]
    pub fn is_bipolar_times_bipolar(&self) -> bool {
        self.lhs.is_bipolar() && self.rhs.is_bipolar()
    }

    /// Whether exactly one operand is bipolar.
    #[inline]
    pub fn is_bipolar_times_regular(&self) -> bool {
        self.lhs.is_bipolar() != self.rhs.is_bipolar()
    }

    /// Fraction of the padded compute that lands on logical cells.
    pub fn utilization(&self) -> f64 {
        let actual = (self.lhs.nrows * self.lhs.ncols * self.rhs.nrows) as f64;
        let allocated = (self.lhs.nrows_a * self.lhs.ncols_a * self.rhs.nrows_a) as f64;
        actual / allocated
    }

    /// Emit key statistics at debug level.
    pub fn log_summary(&self) {
        self.lhs.log_summary();
        self.rhs.log_summary();
        log::debug!(
            "GemmContext: blocks {}x{}, {} backend, utilization {:.1}%",
            self.lhs_block,
            self.rhs_block,
            self.backend.name(),
            100.0 * self.utilization()
        );
    }
}

/// Allocate a context using the back-end detected for this process.
#[allow(clippy::too_many_arguments)]
pub fn alloc_gemm_context(
    lhs_rows: usize,
    depth: usize,
    rhs_rows: usize,
    lhs_bits: usize,
    rhs_bits: usize,
    lhs_signed: bool,
    rhs_signed: bool,
) -> Result<GemmContext> {
    alloc_gemm_context_with(
        detected_backend(),
        lhs_rows,
        depth,
        rhs_rows,
        lhs_bits,
        rhs_bits,
        lhs_signed,
        rhs_signed,
    )
}

/// Allocate a context for an explicit back-end, using its tuning constants.
///
/// Aligns the depth to the back-end's word granule, solves for cache-resident
/// row tiles (falling back to register-only tiles when a whole side fits),
/// fine-tunes tiles whose padding waste exceeds 10%, then allocates both
/// operands with matching row alignment and the unpadded result buffer.
#[allow(clippy::too_many_arguments)]
pub fn alloc_gemm_context_with(
    backend: Backend,
    lhs_rows: usize,
    depth: usize,
    rhs_rows: usize,
    lhs_bits: usize,
    rhs_bits: usize,
    lhs_signed: bool,
    rhs_signed: bool,
) -> Result<GemmContext> {
    if lhs_rows == 0 || depth == 0 || rhs_rows == 0 {
        return Err(BitSerialError::InvalidShape(format!(
            "gemm dims must be > 0, got {}x{}x{}",
            lhs_rows, depth, rhs_rows
        )));
    }

    let Tuning {
        lhs_mult,
        depth_mult,
        rhs_mult,
        cache_bits,
    } = backend.tuning();

    let colalign = depth_mult * WORD_BITS;
    let depth_al = align_to(depth, colalign);
    let (mut lhs_block, mut rhs_block) =
        compute_block_size(lhs_mult, rhs_mult, cache_bits, depth_al)?;

    if lhs_block > lhs_rows || rhs_block > rhs_rows {
        // a whole side fits in cache; register blocking only
        lhs_block = align_to(lhs_rows, lhs_mult);
        rhs_block = align_to(rhs_rows, rhs_mult);
    } else {
        if WASTE_DEN * (align_to(lhs_rows, lhs_block) - lhs_rows) > WASTE_NUM * lhs_rows {
            lhs_block = finetune_block_size(lhs_rows, lhs_block, lhs_mult);
        }
        if WASTE_DEN * (align_to(rhs_rows, rhs_block) - rhs_rows) > WASTE_NUM * rhs_rows {
            rhs_block = finetune_block_size(rhs_rows, rhs_block, rhs_mult);
        }
    }

    let lhs = BitSerialMatrix::alloc(lhs_bits, lhs_rows, depth, lhs_signed, lhs_block, colalign)?;
    let rhs = BitSerialMatrix::alloc(rhs_bits, rhs_rows, depth, rhs_signed, rhs_block, colalign)?;

    let res_len = lhs_rows.checked_mul(rhs_rows).ok_or_else(|| {
        BitSerialError::InvalidShape(format!("result size overflow: {}x{}", lhs_rows, rhs_rows))
    })?;
    let res = vec![0i32; res_len];

    Ok(GemmContext {
        lhs,
        rhs,
        lhs_block,
        rhs_block,
        res,
        backend,
    })
}
