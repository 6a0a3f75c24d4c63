//! PSHUFB-based GF(2^8) multiplication for x86_64
//!
//! Implements the nibble-split technique from James Plank's "Screaming Fast
//! Galois Field Arithmetic Using Intel SIMD Instructions" (FAST 2013):
//! PSHUFB does 16-entry lookups, so each byte is split into two 4-bit
//! lookups whose results XOR together.
//!
//! For a coefficient `c`, two 16-byte tables are derived from the dense
//! product table:
//!
//! ```text
//! lo[n] = mul(c, n)        n = 0..16   (low-nibble contribution)
//! hi[n] = mul(c, n << 4)   n = 0..16   (high-nibble contribution)
//! mul(c, x) = lo[x & 0x0F] ^ hi[x >> 4]
//! ```
//!
//! The SSSE3 path processes 16 bytes per step, the AVX2 path 32 with the
//! tables broadcast to both lanes. Tails go through the scalar path, so any
//! buffer length is accepted.

use super::scalar;
use crate::galois::mul_table;

use std::arch::x86_64::*;

/// Split the coefficient's product-table row into the two nibble tables
#[inline]
fn build_nibble_tables(c: u8) -> ([u8; 16], [u8; 16]) {
    let mt = &mul_table()[c as usize];
    let mut lo = [0u8; 16];
    let mut hi = [0u8; 16];
    for n in 0..16 {
        lo[n] = mt[n];
        hi[n] = mt[n << 4];
    }
    (lo, hi)
}

macro_rules! pshufb_kernel_128 {
    ($name:ident, $xor:expr) => {
        /// # Safety
        /// Caller must have verified SSSE3 support.
        #[target_feature(enable = "ssse3")]
        pub(crate) unsafe fn $name(c: u8, input: &[u8], output: &mut [u8]) {
            let len = input.len().min(output.len());
            let (lo, hi) = build_nibble_tables(c);

            let tbl_lo = _mm_loadu_si128(lo.as_ptr() as *const __m128i);
            let tbl_hi = _mm_loadu_si128(hi.as_ptr() as *const __m128i);
            let mask = _mm_set1_epi8(0x0F);

            let simd_end = len - len % 16;
            let mut pos = 0;
            while pos < simd_end {
                let in_vec = _mm_loadu_si128(input.as_ptr().add(pos) as *const __m128i);
                let lo_nib = _mm_and_si128(in_vec, mask);
                let hi_nib = _mm_and_si128(_mm_srli_epi64::<4>(in_vec), mask);
                let product = _mm_xor_si128(
                    _mm_shuffle_epi8(tbl_lo, lo_nib),
                    _mm_shuffle_epi8(tbl_hi, hi_nib),
                );
                let result = if $xor {
                    let out_vec = _mm_loadu_si128(output.as_ptr().add(pos) as *const __m128i);
                    _mm_xor_si128(out_vec, product)
                } else {
                    product
                };
                _mm_storeu_si128(output.as_mut_ptr().add(pos) as *mut __m128i, result);
                pos += 16;
            }

            if pos < len {
                if $xor {
                    scalar::mul_slice_xor(c, &input[pos..len], &mut output[pos..len]);
                } else {
                    scalar::mul_slice(c, &input[pos..len], &mut output[pos..len]);
                }
            }
        }
    };
}

macro_rules! pshufb_kernel_256 {
    ($name:ident, $xor:expr) => {
        /// # Safety
        /// Caller must have verified AVX2 and SSSE3 support.
        #[target_feature(enable = "avx2")]
        pub(crate) unsafe fn $name(c: u8, input: &[u8], output: &mut [u8]) {
            let len = input.len().min(output.len());
            let (lo, hi) = build_nibble_tables(c);

            let tbl_lo =
                _mm256_broadcastsi128_si256(_mm_loadu_si128(lo.as_ptr() as *const __m128i));
            let tbl_hi =
                _mm256_broadcastsi128_si256(_mm_loadu_si128(hi.as_ptr() as *const __m128i));
            let mask = _mm256_set1_epi8(0x0F);

            let simd_end = len - len % 32;
            let mut pos = 0;
            while pos < simd_end {
                let in_vec = _mm256_loadu_si256(input.as_ptr().add(pos) as *const __m256i);
                let lo_nib = _mm256_and_si256(in_vec, mask);
                let hi_nib = _mm256_and_si256(_mm256_srli_epi64::<4>(in_vec), mask);
                let product = _mm256_xor_si256(
                    _mm256_shuffle_epi8(tbl_lo, lo_nib),
                    _mm256_shuffle_epi8(tbl_hi, hi_nib),
                );
                let result = if $xor {
                    let out_vec = _mm256_loadu_si256(output.as_ptr().add(pos) as *const __m256i);
                    _mm256_xor_si256(out_vec, product)
                } else {
                    product
                };
                _mm256_storeu_si256(output.as_mut_ptr().add(pos) as *mut __m256i, result);
                pos += 32;
            }

            if pos < len {
                if $xor {
                    scalar::mul_slice_xor(c, &input[pos..len], &mut output[pos..len]);
                } else {
                    scalar::mul_slice(c, &input[pos..len], &mut output[pos..len]);
                }
            }
        }
    };
}

pshufb_kernel_128!(mul_slice_ssse3, false);
pshufb_kernel_128!(mul_slice_xor_ssse3, true);
pshufb_kernel_256!(mul_slice_avx2, false);
pshufb_kernel_256!(mul_slice_xor_avx2, true);
