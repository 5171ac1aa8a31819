//! Ring arithmetic over Z/2^32 in a u64 carrier.
//!
//! Only the low 32 bits of a [`Field`] value are semantic; every operation
//! normalises its result back below the modulus. The signed view reads the
//! low 32 bits as a two's-complement i32.

use rand::Rng;

pub type Field = u64;

pub const MODULUS: Field = 1 << 32;
const MASK: Field = MODULUS - 1;

#[inline]
pub fn add(a: Field, b: Field) -> Field {
    a.wrapping_add(b) & MASK
}

#[inline]
pub fn sub(a: Field, b: Field) -> Field {
    a.wrapping_sub(b) & MASK
}

#[inline]
pub fn mul(a: Field, b: Field) -> Field {
    a.wrapping_mul(b) & MASK
}

/// Uniform element of [0, 2^32).
pub fn random() -> Field {
    rand::rng().random_range(0..MODULUS)
}

/// Uniform element of {1..5}. Keeps reconstructed intermediate values small
/// enough to eyeball while debugging; never suitable as masking material in
/// a deployment.
pub fn small_random() -> Field {
    rand::rng().random_range(1..=5)
}

#[inline]
pub fn from_signed(x: i64) -> Field {
    (x as u64) & MASK
}

#[inline]
pub fn to_signed(v: Field) -> i64 {
    v as u32 as i32 as i64
}

/// Dot product of two equal-length vectors, reduced mod 2^32.
pub fn dot(a: &[Field], b: &[Field]) -> Field {
    debug_assert_eq!(a.len(), b.len());
    a.iter()
        .zip(b.iter())
        .fold(0, |acc, (x, y)| add(acc, mul(*x, *y)))
}
