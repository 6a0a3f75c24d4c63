//! Galois Field GF(2^8) arithmetic for the matrix codec
//!
//! The field is generated by the primitive irreducible polynomial **0x11D**
//! (x⁸ + x⁴ + x³ + x² + 1) with generator element 2, the conventional choice
//! for byte-oriented Reed-Solomon codes. Addition is XOR; multiplication and
//! division go through log/antilog tables; the hot coding paths use the dense
//! 256×256 product table built on top of them.

use std::ops::{Add, AddAssign, Div, DivAssign, Mul, MulAssign, Sub, SubAssign};
use std::sync::OnceLock;

/// GF(2^8) field polynomial: 0x11D (x⁸ + x⁴ + x³ + x² + 1)
const GF8_POLYNOMIAL: u32 = 0x11D;

/// Number of field elements
pub const FIELD_SIZE: usize = 256;

/// Multiplicative group order (`FIELD_SIZE - 1`)
pub const FIELD_LIMIT: usize = FIELD_SIZE - 1;

/// Log/antilog lookup tables for GF(2^8)
pub struct GaloisTable {
    pub log: [u8; FIELD_SIZE],
    /// Doubled so `antilog[log_a + log_b]` never needs a modulo
    pub antilog: [u8; FIELD_LIMIT * 2],
}

impl GaloisTable {
    fn new() -> Self {
        let mut table = GaloisTable {
            log: [0; FIELD_SIZE],
            antilog: [0; FIELD_LIMIT * 2],
        };
        table.build_tables();
        table
    }

    fn build_tables(&mut self) {
        let mut b = 1u32;
        for l in 0..FIELD_LIMIT {
            self.log[b as usize] = l as u8;
            self.antilog[l] = b as u8;
            self.antilog[l + FIELD_LIMIT] = b as u8;
            b <<= 1;
            if b & FIELD_SIZE as u32 != 0 {
                b ^= GF8_POLYNOMIAL;
            }
        }
        // log[0] is never a valid lookup; callers check for zero first
        self.log[0] = 0;
    }
}

fn tables() -> &'static GaloisTable {
    static TABLE: OnceLock<GaloisTable> = OnceLock::new();
    TABLE.get_or_init(GaloisTable::new)
}

/// Dense product table: `mul_table()[c][x] == gal_mul(c, x)`
///
/// 64 KiB, built once. This is the scalar kernel's primitive and the source
/// the vector kernels derive their nibble tables from.
pub fn mul_table() -> &'static [[u8; 256]; 256] {
    static MUL: OnceLock<Box<[[u8; 256]; 256]>> = OnceLock::new();
    MUL.get_or_init(|| {
        let t = tables();
        let mut m = Box::new([[0u8; 256]; 256]);
        for c in 1..256 {
            let log_c = t.log[c] as usize;
            for x in 1..256 {
                m[c][x] = t.antilog[log_c + t.log[x] as usize];
            }
        }
        m
    })
}

/// `a + b` (XOR)
#[inline(always)]
pub fn gal_add(a: u8, b: u8) -> u8 {
    a ^ b
}

/// `a * b` via log tables
#[inline]
pub fn gal_mul(a: u8, b: u8) -> u8 {
    if a == 0 || b == 0 {
        return 0;
    }
    let t = tables();
    t.antilog[t.log[a as usize] as usize + t.log[b as usize] as usize]
}

/// `a / b`; `b` must be nonzero
#[inline]
pub fn gal_div(a: u8, b: u8) -> u8 {
    assert_ne!(b, 0, "division by zero in GF(2^8)");
    if a == 0 {
        return 0;
    }
    let t = tables();
    let log_diff =
        (t.log[a as usize] as usize + FIELD_LIMIT - t.log[b as usize] as usize) % FIELD_LIMIT;
    t.antilog[log_diff]
}

/// Multiplicative inverse of nonzero `a`
#[inline]
pub fn gal_inv(a: u8) -> u8 {
    assert_ne!(a, 0, "zero has no inverse in GF(2^8)");
    let t = tables();
    t.antilog[(FIELD_LIMIT - t.log[a as usize] as usize) % FIELD_LIMIT]
}

/// `a` raised to `n`; `gal_exp(a, 0) == 1` and `gal_exp(0, n > 0) == 0`
pub fn gal_exp(a: u8, n: usize) -> u8 {
    if n == 0 {
        return 1;
    }
    if a == 0 {
        return 0;
    }
    let t = tables();
    let log_result = t.log[a as usize] as usize * n % FIELD_LIMIT;
    t.antilog[log_result]
}

/// Galois field element wrapper for callers that prefer operator syntax
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Galois8(pub u8);

impl Galois8 {
    pub const ZERO: Galois8 = Galois8(0);
    pub const ONE: Galois8 = Galois8(1);

    #[inline]
    pub fn new(value: u8) -> Self {
        Self(value)
    }

    #[inline]
    pub fn value(self) -> u8 {
        self.0
    }

    #[inline]
    pub fn is_zero(self) -> bool {
        self.0 == 0
    }

    pub fn pow(self, n: usize) -> Self {
        Self(gal_exp(self.0, n))
    }

    /// Multiplicative inverse; `self` must be nonzero
    pub fn inv(self) -> Self {
        Self(gal_inv(self.0))
    }
}

impl Add for Galois8 {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Self(self.0 ^ rhs.0)
    }
}

impl AddAssign for Galois8 {
    fn add_assign(&mut self, rhs: Self) {
        self.0 ^= rhs.0;
    }
}

// Subtraction is addition in a characteristic-2 field
impl Sub for Galois8 {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Self(self.0 ^ rhs.0)
    }
}

impl SubAssign for Galois8 {
    fn sub_assign(&mut self, rhs: Self) {
        self.0 ^= rhs.0;
    }
}

impl Mul for Galois8 {
    type Output = Self;
    fn mul(self, rhs: Self) -> Self {
        Self(gal_mul(self.0, rhs.0))
    }
}

impl MulAssign for Galois8 {
    fn mul_assign(&mut self, rhs: Self) {
        *self = *self * rhs;
    }
}

impl Div for Galois8 {
    type Output = Self;
    fn div(self, rhs: Self) -> Self {
        Self(gal_div(self.0, rhs.0))
    }
}

impl DivAssign for Galois8 {
    fn div_assign(&mut self, rhs: Self) {
        *self = *self / rhs;
    }
}

impl From<u8> for Galois8 {
    fn from(value: u8) -> Self {
        Self(value)
    }
}

impl From<Galois8> for u8 {
    fn from(val: Galois8) -> Self {
        val.0
    }
}

impl std::fmt::Display for Galois8 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
