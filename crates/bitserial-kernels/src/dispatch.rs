//! Runtime CPU feature detection and micro-kernel dispatch.
//!
//! The micro-kernel is selected once, at context-allocation time. All
//! back-ends produce bit-identical integer results; they differ only in
//! throughput. Each back-end also carries the register-tile multiples and
//! cache budget the block-size solver runs against.

use once_cell::sync::Lazy;

/// Check if NEON is available (always true on AArch64).
#[cfg(target_arch = "aarch64")]
pub fn has_neon() -> bool {
    std::arch::is_aarch64_feature_detected!("neon")
}

#[cfg(not(target_arch = "aarch64"))]
pub fn has_neon() -> bool {
    false
}

/// Available micro-kernel implementations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Backend {
    /// Scalar 64-bit AND + hardware popcount (portable, always available).
    Generic,
    /// ARM NEON wide AND + vectorised popcount.
    Neon,
}

/// Register-tile multiples and cache budget for the block-size solver.
#[derive(Debug, Clone, Copy)]
pub struct Tuning {
    /// LHS row-tile multiple.
    pub lhs_mult: usize,
    /// Depth multiple, in units of 64-bit words.
    pub depth_mult: usize,
    /// RHS row-tile multiple.
    pub rhs_mult: usize,
    /// Cache budget in bits for one result block plus its input stripes.
    pub cache_bits: usize,
}

impl Backend {
    /// Pick the best back-end available on this CPU.
    pub fn detect() -> Self {
        if has_neon() {
            Backend::Neon
        } else {
            Backend::Generic
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Backend::Generic => "generic",
            Backend::Neon => "neon",
        }
    }

    /// Solver tuning constants for this back-end. The cache budget targets a
    /// 32 KiB L1d; NEON prefers a two-word depth granule for full vectors.
    pub fn tuning(&self) -> Tuning {
        match self {
            Backend::Generic => Tuning {
                lhs_mult: 2,
                depth_mult: 1,
                rhs_mult: 2,
                cache_bits: 32 * 1024 * 8,
            },
            Backend::Neon => Tuning {
                lhs_mult: 2,
                depth_mult: 2,
                rhs_mult: 2,
                cache_bits: 32 * 1024 * 8,
            },
        }
    }

    /// AND-cardinality of two equal-length word stripes.
    #[inline]
    pub fn and_popcount(&self, a: &[u64], b: &[u64]) -> u32 {
        match self {
            Backend::Generic => crate::generic::and_popcount(a, b),
            Backend::Neon => crate::neon::and_popcount(a, b),
        }
    }

    /// Popcount of a word stripe.
    #[inline]
    pub fn popcount(&self, a: &[u64]) -> u32 {
        match self {
            Backend::Generic => crate::generic::popcount(a),
            Backend::Neon => crate::neon::popcount(a),
        }
    }
}

static DETECTED: Lazy<Backend> = Lazy::new(|| {
    let backend = Backend::detect();
    log::debug!("selected {} micro-kernel", backend.name());
    backend
});

/// The back-end detected for this process.
pub fn detected_backend() -> Backend {
    *DETECTED
}
