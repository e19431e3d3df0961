//! Centralized error types for the bit-serial GEMM crates.
//!
//! Uses thiserror for ergonomic error handling with context.

use thiserror::Error;

/// Main error type for bit-serial matrix and kernel operations.
///
/// Out-of-range element indices are a programmer error and assert instead
/// of returning a variant.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum BitSerialError {
    /// Matrix or tile geometry that cannot be represented.
    #[error("Invalid shape: {0}")]
    InvalidShape(String),

    /// The allocator could not provide the requested buffer.
    #[error("Out of memory: failed to allocate {bytes} bytes")]
    OutOfMemory { bytes: usize },

    /// A mode the library deliberately does not implement.
    #[error("Not yet implemented: {0}")]
    UnsupportedMode(&'static str),

    /// The block-size solver found no positive tile count for this budget.
    #[error("Block size solver infeasible: cache_bits={cache_bits}, depth_bits={depth_bits}")]
    SolverInfeasible {
        cache_bits: usize,
        depth_bits: usize,
    },
}

/// Convenient Result type alias.
pub type Result<T> = std::result::Result<T, BitSerialError>;
