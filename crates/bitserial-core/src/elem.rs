//! Scalar element types accepted by the importers and exporters.
//!
//! The stored representation is always an integer of `nbits` precision; the
//! source/destination buffers may hold any of the types below. Conversion to
//! the bit-serial encoding is identical for all of them up to the
//! scalar-to-integer step.

/// A scalar type that can be imported into or exported from a
/// [`BitSerialMatrix`](crate::matrix::BitSerialMatrix).
pub trait Elem: Copy + PartialOrd {
    /// Integer value of this element. Fractional sources truncate.
    fn to_i64(self) -> i64;

    /// Element reconstructed from a decoded integer value.
    fn from_i64(v: i64) -> Self;

    /// Additive zero, used for the bipolar sign test.
    fn zero() -> Self;
}

macro_rules! impl_elem_int {
    ($($t:ty),*) => {$(
        impl Elem for $t {
            #[inline]
            fn to_i64(self) -> i64 {
                self as i64
            }

            #[inline]
            fn from_i64(v: i64) -> Self {
                v as $t
            }

            #[inline]
            fn zero() -> Self {
                0
            }
        }
    )*};
}

impl_elem_int!(i8, u8, i16, u16, i32, u32);

impl Elem for f32 {
    #[inline]
    fn to_i64(self) -> i64 {
        self as i64
    }

    #[inline]
    fn from_i64(v: i64) -> Self {
        v as f32
    }

    #[inline]
    fn zero() -> Self {
        0.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_int_roundtrip() {
        assert_eq!(i8::from_i64((-5i8).to_i64()), -5);
        assert_eq!(u8::from_i64(200u8.to_i64()), 200);
        assert_eq!(i16::from_i64((-300i16).to_i64()), -300);
        assert_eq!(u32::from_i64(70000u32.to_i64()), 70000);
    }

    #[test]
    fn test_f32_conversion() {
        assert_eq!(3.0f32.to_i64(), 3);
        assert_eq!((-2.0f32).to_i64(), -2);
        assert_eq!(f32::from_i64(-7), -7.0);
    }

    #[test]
    fn test_zero_ordering() {
        assert!(1i8 > i8::zero());
        assert!(-1i8 < i8::zero());
        assert!(0.5f32 > f32::zero());
    }
}
