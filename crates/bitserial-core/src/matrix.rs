//! Bit-plane matrix storage: THE operand format for the bit-serial kernels.
//!
//! An `nrows x ncols` matrix of `nbits`-precision integers is stored as
//! `nbits` binary bit-planes in one contiguous buffer of 64-bit words,
//! addressed `[bit][row][col_word]` row-major.
//!
//! Layout:
//! - logical dims `nrows`/`ncols` carry the semantics
//! - allocated dims `nrows_a`/`ncols_a` are padded up for tile and word
//!   alignment; `ncols_a` is always a multiple of 64
//! - padded cells are zero across every bit-plane
//!
//! Element encoding: bipolar (`nbits == 1 && signed`) stores +1 as a set bit
//! and -1 as a clear bit; everything else is nbits-wide two's complement
//! (signed) or plain binary (unsigned).

use std::alloc::{self, Layout};
use std::ops::{Deref, DerefMut};
use std::ptr::NonNull;

use crate::align::{align_to, bitpos, word_index, WORD_BITS};
use crate::elem::Elem;
use crate::error::{BitSerialError, Result};

// ============================================================
// AlignedVec: 128-byte aligned allocation
// ============================================================

/// A vector with guaranteed 128-byte alignment, suitable for SIMD loads on
/// every supported back-end.
pub struct AlignedVec<T: Copy + Default> {
    ptr: NonNull<T>,
    len: usize,
}

// Safety: AlignedVec owns its data
unsafe impl<T: Copy + Default + Send> Send for AlignedVec<T> {}
unsafe impl<T: Copy + Default + Sync> Sync for AlignedVec<T> {}

const BUF_ALIGN: usize = 128;

impl<T: Copy + Default> AlignedVec<T> {
    /// Allocate a zeroed, 128-byte aligned vector of `len` elements.
    ///
    /// Returns [`BitSerialError::OutOfMemory`] when the allocator fails.
    pub fn try_new_zeroed(len: usize) -> Result<Self> {
        if len == 0 {
            return Ok(Self {
                ptr: NonNull::dangling(),
                len: 0,
            });
        }

        let size = std::mem::size_of::<T>()
            .checked_mul(len)
            .ok_or_else(|| BitSerialError::InvalidShape(format!("byte size overflow: {} elements", len)))?;
        let layout = Layout::from_size_align(size, BUF_ALIGN)
            .map_err(|_| BitSerialError::InvalidShape(format!("unrepresentable layout: {} bytes", size)))?;

        // Safety: layout has nonzero size
        let raw = unsafe { alloc::alloc_zeroed(layout) };
        let ptr = NonNull::new(raw as *mut T).ok_or(BitSerialError::OutOfMemory { bytes: size })?;

        // Advise huge pages for large buffers (>= 2MB)
        #[cfg(target_os = "linux")]
        {
            if size >= 2 * 1024 * 1024 {
                unsafe {
                    libc::madvise(raw as *mut libc::c_void, size, libc::MADV_HUGEPAGE);
                }
            }
        }

        Ok(Self { ptr, len })
    }

    /// Allocate a zeroed, 128-byte aligned vector, panicking on failure.
    pub fn new_zeroed(len: usize) -> Self {
        Self::try_new_zeroed(len).expect("allocation failed")
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn as_ptr(&self) -> *const T {
        self.ptr.as_ptr()
    }

    pub fn as_mut_ptr(&mut self) -> *mut T {
        self.ptr.as_ptr()
    }
}

impl<T: Copy + Default> Deref for AlignedVec<T> {
    type Target = [T];

    fn deref(&self) -> &[T] {
        if self.len == 0 {
            return &[];
        }
        unsafe { std::slice::from_raw_parts(self.ptr.as_ptr(), self.len) }
    }
}

impl<T: Copy + Default> DerefMut for AlignedVec<T> {
    fn deref_mut(&mut self) -> &mut [T] {
        if self.len == 0 {
            return &mut [];
        }
        unsafe { std::slice::from_raw_parts_mut(self.ptr.as_ptr(), self.len) }
    }
}

impl<T: Copy + Default> Drop for AlignedVec<T> {
    fn drop(&mut self) {
        if self.len == 0 {
            return;
        }
        let size = std::mem::size_of::<T>() * self.len;
        let layout = Layout::from_size_align(size, BUF_ALIGN).unwrap();
        unsafe {
            alloc::dealloc(self.ptr.as_ptr() as *mut u8, layout);
        }
    }
}

impl<T: Copy + Default> Clone for AlignedVec<T> {
    fn clone(&self) -> Self {
        let mut new = Self::new_zeroed(self.len);
        if self.len > 0 {
            new.copy_from_slice(self);
        }
        new
    }
}

impl<T: Copy + Default> std::fmt::Debug for AlignedVec<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "AlignedVec(len={}, align={})", self.len, BUF_ALIGN)
    }
}

// ============================================================
// BitSerialMatrix
// ============================================================

/// Bit-plane decomposition of a low-precision integer matrix.
#[derive(Debug, Clone)]
pub struct BitSerialMatrix {
    /// Bits of precision.
    pub nbits: usize,
    /// Number of real (logical) rows.
    pub nrows: usize,
    /// Number of real (logical) columns.
    pub ncols: usize,
    /// Number of allocated rows.
    pub nrows_a: usize,
    /// Number of allocated columns, always a multiple of 64.
    pub ncols_a: usize,
    /// Whether the highest-order bit plane is negative (two's complement),
    /// or, for 1-bit matrices, whether the encoding is bipolar {-1, +1}.
    pub signed: bool,
    data: AlignedVec<u64>,
}

impl BitSerialMatrix {
    /// Allocate a zeroed bit-serial matrix.
    ///
    /// `rowalign`/`colalign` pad the allocated dimensions up so the kernels
    /// can tile without edge cases; `colalign` must be a multiple of 64.
    pub fn alloc(
        nbits: usize,
        nrows: usize,
        ncols: usize,
        signed: bool,
        rowalign: usize,
        colalign: usize,
    ) -> Result<Self> {
        if nbits == 0 || nbits > WORD_BITS {
            return Err(BitSerialError::InvalidShape(format!(
                "nbits must be in 1..=64, got {}",
                nbits
            )));
        }
        if nrows == 0 || ncols == 0 {
            return Err(BitSerialError::InvalidShape(format!(
                "matrix dims must be > 0, got {}x{}",
                nrows, ncols
            )));
        }
        if rowalign == 0 {
            return Err(BitSerialError::InvalidShape("rowalign must be > 0".into()));
        }
        if colalign == 0 || !colalign.is_multiple_of(WORD_BITS) {
            return Err(BitSerialError::InvalidShape(format!(
                "colalign must be a positive multiple of {}, got {}",
                WORD_BITS, colalign
            )));
        }

        let nrows_a = align_to(nrows, rowalign);
        let ncols_a = align_to(ncols, colalign);
        let words = nbits
            .checked_mul(nrows_a)
            .and_then(|w| w.checked_mul(ncols_a / WORD_BITS))
            .ok_or_else(|| {
                BitSerialError::InvalidShape(format!(
                    "buffer size overflow: {} bitplanes of {}x{}",
                    nbits, nrows_a, ncols_a
                ))
            })?;

        let data = AlignedVec::try_new_zeroed(words)?;
        Ok(Self {
            nbits,
            nrows,
            ncols,
            nrows_a,
            ncols_a,
            signed,
            data,
        })
    }

    /// Whether the matrix holds bipolar binary {-1, +1} values.
    #[inline]
    pub fn is_bipolar(&self) -> bool {
        self.nbits == 1 && self.signed
    }

    /// Storage words per row.
    #[inline]
    pub fn words_per_row(&self) -> usize {
        self.ncols_a / WORD_BITS
    }

    /// Storage words per bit-plane.
    #[inline]
    pub fn words_per_bitplane(&self) -> usize {
        self.nrows_a * self.words_per_row()
    }

    #[inline]
    fn word_offset(&self, bit: usize, row: usize, col: usize) -> usize {
        assert!(
            bit < self.nbits && row < self.nrows_a && col < self.ncols_a,
            "index ({}, {}, {}) out of allocated extents ({}, {}, {})",
            bit,
            row,
            col,
            self.nbits,
            self.nrows_a,
            self.ncols_a
        );
        bit * self.words_per_bitplane() + row * self.words_per_row() + word_index(col)
    }

    /// Read one bit. True if set.
    #[inline]
    pub fn get(&self, bit: usize, row: usize, col: usize) -> bool {
        (self.data[self.word_offset(bit, row, col)] >> bitpos(col)) & 1 == 1
    }

    /// Set one bit.
    #[inline]
    pub fn set(&mut self, bit: usize, row: usize, col: usize) {
        let w = self.word_offset(bit, row, col);
        self.data[w] |= 1u64 << bitpos(col);
    }

    /// Clear one bit.
    #[inline]
    pub fn unset(&mut self, bit: usize, row: usize, col: usize) {
        let w = self.word_offset(bit, row, col);
        self.data[w] &= !(1u64 << bitpos(col));
    }

    /// Zero the entire buffer, padding included.
    pub fn clear_all(&mut self) {
        self.data.fill(0);
    }

    /// Storage words of one row of one bit-plane.
    #[inline]
    pub fn row_words(&self, bit: usize, row: usize) -> &[u64] {
        let start = self.word_offset(bit, row, 0);
        &self.data[start..start + self.words_per_row()]
    }

    /// Storage words of one whole bit-plane.
    #[inline]
    pub fn bitplane(&self, bit: usize) -> &[u64] {
        assert!(bit < self.nbits, "bit {} out of range {}", bit, self.nbits);
        let start = bit * self.words_per_bitplane();
        &self.data[start..start + self.words_per_bitplane()]
    }

    /// The raw word buffer, padding included.
    pub fn words(&self) -> &[u64] {
        &self.data
    }

    /// nbits-wide stored representation of an element value. Negative values
    /// wrap to two's complement at this width.
    #[inline]
    fn encode(&self, v: i64) -> u64 {
        let mask = if self.nbits == WORD_BITS {
            u64::MAX
        } else {
            (1u64 << self.nbits) - 1
        };
        (v as u64) & mask
    }

    #[inline]
    fn decode(&self, bits: u64) -> i64 {
        if self.signed {
            // sign-extend from nbits: the top plane contributes -(1 << (nbits-1))
            let shift = WORD_BITS - self.nbits;
            ((bits << shift) as i64) >> shift
        } else {
            bits as i64
        }
    }

    /// Import a regular row-major (or column-major) matrix.
    ///
    /// Bipolar matrices set the single bit-plane for strictly positive
    /// elements. All other matrices bit-split the nbits-wide encoding.
    /// Padded cells stay zero.
    pub fn import_regular<T: Elem>(&mut self, src: &[T], col_major: bool) {
        assert_eq!(
            src.len(),
            self.nrows * self.ncols,
            "source length {} != {}x{}",
            src.len(),
            self.nrows,
            self.ncols
        );
        self.clear_all();
        for r in 0..self.nrows {
            for c in 0..self.ncols {
                let elem = if col_major {
                    src[c * self.nrows + r]
                } else {
                    src[r * self.ncols + c]
                };
                if self.is_bipolar() {
                    if elem > T::zero() {
                        self.set(0, r, c);
                    }
                } else {
                    let enc = self.encode(elem.to_i64());
                    for b in 0..self.nbits {
                        if (enc >> b) & 1 == 1 {
                            self.set(b, r, c);
                        }
                    }
                }
            }
        }
    }

    /// Import a regular matrix after threshold quantization.
    ///
    /// Each element becomes the smallest threshold index `t` with
    /// `elem <= thresholds[t][row]`, or `num_thres` when every threshold is
    /// crossed. `thresholds` has shape `[num_thres][nrows]` and must be
    /// non-decreasing along `t` for the quantization to be monotone.
    ///
    /// Only valid for unsigned matrices.
    pub fn import_regular_quantized<T: Elem>(
        &mut self,
        src: &[T],
        thresholds: &[T],
        num_thres: usize,
        col_major: bool,
    ) -> Result<()> {
        if self.signed {
            return Err(BitSerialError::UnsupportedMode(
                "threshold quantization of signed matrices",
            ));
        }
        assert_eq!(
            src.len(),
            self.nrows * self.ncols,
            "source length {} != {}x{}",
            src.len(),
            self.nrows,
            self.ncols
        );
        assert_eq!(
            thresholds.len(),
            num_thres * self.nrows,
            "threshold matrix length {} != {}x{}",
            thresholds.len(),
            num_thres,
            self.nrows
        );
        self.clear_all();
        for r in 0..self.nrows {
            for c in 0..self.ncols {
                let elem = if col_major {
                    src[c * self.nrows + r]
                } else {
                    src[r * self.ncols + c]
                };
                let mut level = num_thres as u64;
                for t in 0..num_thres {
                    if elem <= thresholds[t * self.nrows + r] {
                        level = t as u64;
                        break;
                    }
                }
                for b in 0..self.nbits {
                    if (level >> b) & 1 == 1 {
                        self.set(b, r, c);
                    }
                }
            }
        }
        Ok(())
    }

    /// Reconstruct the logical matrix into a row-major buffer.
    pub fn export_regular<T: Elem>(&self, dst: &mut [T]) {
        assert_eq!(
            dst.len(),
            self.nrows * self.ncols,
            "destination length {} != {}x{}",
            dst.len(),
            self.nrows,
            self.ncols
        );
        for r in 0..self.nrows {
            for c in 0..self.ncols {
                let val = if self.is_bipolar() {
                    if self.get(0, r, c) {
                        1
                    } else {
                        -1
                    }
                } else {
                    let mut bits: u64 = 0;
                    for b in 0..self.nbits {
                        if self.get(b, r, c) {
                            bits |= 1u64 << b;
                        }
                    }
                    self.decode(bits)
                };
                dst[r * self.ncols + c] = T::from_i64(val);
            }
        }
    }

    /// Emit key statistics at debug level.
    pub fn log_summary(&self) {
        log::debug!(
            "BitSerialMatrix: {} bits, signed={}, logical {}x{}, allocated {}x{}",
            self.nbits,
            self.signed,
            self.nrows,
            self.ncols,
            self.nrows_a,
            self.ncols_a
        );
    }
}
