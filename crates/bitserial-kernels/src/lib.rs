//! Cache-blocked bit-serial GEMM kernels with runtime back-end dispatch.
//!
//! The context allocator pairs the block-size solver with the detected
//! micro-kernel's tuning constants; the kernel walks row tiles and bit-plane
//! pairs, delegating AND+popcount to the selected back-end.

pub mod context;
pub mod dispatch;
pub mod generic;
pub mod kernel;
pub mod neon;
pub mod solver;
pub mod threshold;

// Re-export the main surface
pub use context::{alloc_gemm_context, alloc_gemm_context_with, GemmContext};
pub use dispatch::{detected_backend, has_neon, Backend, Tuning};
pub use kernel::{gemm_bit_serial, gemm_bit_serial_parallel, gemv_bit_serial, sum_rows};
pub use solver::{compute_block_size, finetune_block_size};
pub use threshold::threshold_result;
