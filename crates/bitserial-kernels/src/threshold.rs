//! Threshold activation applied to a GEMM result.
//!
//! The threshold matrix has shape `[num_thres][num_chans]` with one channel
//! per LHS row, non-decreasing along the threshold axis; each output cell is
//! the number of thresholds its accumulator crossed. Broadcasting a single
//! channel across rows is a known unsupported mode.

use bitserial_core::error::{BitSerialError, Result};

/// Replace each accumulator with the count of thresholds it crossed.
///
/// `res` is the row-major `lhs_rows x rhs_rows` kernel output; channel `i`
/// of `thresholds` applies to result row `i`.
pub fn threshold_result(
    res: &[i32],
    lhs_rows: usize,
    rhs_rows: usize,
    thresholds: &[i32],
    num_thres: usize,
    num_chans: usize,
) -> Result<Vec<i32>> {
    if num_chans != lhs_rows {
        return Err(BitSerialError::UnsupportedMode("threshold broadcast"));
    }
    assert_eq!(
        res.len(),
        lhs_rows * rhs_rows,
        "result length {} != {}x{}",
        res.len(),
        lhs_rows,
        rhs_rows
    );
    assert_eq!(
        thresholds.len(),
        num_thres * num_chans,
        "threshold matrix length {} != {}x{}",
        thresholds.len(),
        num_thres,
        num_chans
    );

    let mut out = vec![0i32; res.len()];
    for i in 0..lhs_rows {
        for j in 0..rhs_rows {
            let acc = res[i * rhs_rows + j];
            let mut crossed = 0;
            for t in 0..num_thres {
                if acc >= thresholds[t * num_chans + i] {
                    crossed += 1;
                }
            }
            out[i * rhs_rows + j] = crossed;
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_threshold_counts_crossings() {
        // 2 rows x 2 cols, thresholds per row: row 0 -> [1, 5], row 1 -> [0, 2]
        let res = [0, 6, 1, 2];
        let thresholds = [1, 0, 5, 2];
        let out = threshold_result(&res, 2, 2, &thresholds, 2, 2).unwrap();
        // row 0: 0 crosses none, 6 crosses both
        // row 1: 1 crosses [0], 2 crosses both
        assert_eq!(out, [0, 2, 1, 2]);
    }

    #[test]
    fn test_threshold_broadcast_unsupported() {
        let err = threshold_result(&[0, 0], 2, 1, &[1], 1, 1).unwrap_err();
        assert!(err.to_string().contains("threshold broadcast"));
    }

    #[test]
    fn test_threshold_equal_value_crosses() {
        let out = threshold_result(&[3], 1, 1, &[3], 1, 1).unwrap();
        assert_eq!(out, [1]);
    }
}
