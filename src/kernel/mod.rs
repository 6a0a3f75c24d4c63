//! Byte-level coding kernel: `output (^)= coefficient * input` over GF(2^8)
//!
//! The kernel is the hot loop everything else drives. One implementation is
//! chosen per codec at construction time and never re-probed:
//!
//! - **Scalar**: per-byte lookups in the dense product table.
//! - **Ssse3 / Avx2** (x86_64): the PSHUFB nibble technique from Plank's
//!   "Screaming Fast Galois Field Arithmetic" paper, 16 or 32 bytes per step.
//! - **Neon** (aarch64): the same technique via `vqtbl1q_u8`.
//!
//! All paths produce bitwise-identical output; vector paths hand any
//! non-multiple tail to the scalar path. The kernel is pure and re-entrant.

mod scalar;

#[cfg(target_arch = "x86_64")]
mod pshufb;

#[cfg(target_arch = "aarch64")]
mod neon;

/// CPU capability snapshot taken once, with room for option overrides.
///
/// Flags without a dedicated path here (avx512, gfni, avx_gfni) are carried
/// so that disabling a level also rules out everything above it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CpuFeatures {
    pub sse2: bool,
    pub ssse3: bool,
    pub avx2: bool,
    pub avx512: bool,
    pub gfni: bool,
    pub avx_gfni: bool,
    pub neon: bool,
}

impl CpuFeatures {
    /// Detect what the running CPU supports
    pub fn detect() -> Self {
        #[cfg(target_arch = "x86_64")]
        {
            CpuFeatures {
                sse2: is_x86_feature_detected!("sse2"),
                ssse3: is_x86_feature_detected!("ssse3"),
                avx2: is_x86_feature_detected!("avx2"),
                avx512: is_x86_feature_detected!("avx512f")
                    && is_x86_feature_detected!("avx512bw"),
                gfni: is_x86_feature_detected!("gfni"),
                avx_gfni: is_x86_feature_detected!("gfni")
                    && is_x86_feature_detected!("avx2"),
                neon: false,
            }
        }
        #[cfg(target_arch = "aarch64")]
        {
            CpuFeatures {
                sse2: false,
                ssse3: false,
                avx2: false,
                avx512: false,
                gfni: false,
                avx_gfni: false,
                neon: true,
            }
        }
        #[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
        {
            CpuFeatures {
                sse2: false,
                ssse3: false,
                avx2: false,
                avx512: false,
                gfni: false,
                avx_gfni: false,
                neon: false,
            }
        }
    }

    /// Everything off; the scalar path
    pub fn none() -> Self {
        CpuFeatures {
            sse2: false,
            ssse3: false,
            avx2: false,
            avx512: false,
            gfni: false,
            avx_gfni: false,
            neon: false,
        }
    }
}

/// Which implementation the kernel runs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KernelPath {
    Scalar,
    #[cfg(target_arch = "x86_64")]
    Ssse3,
    #[cfg(target_arch = "x86_64")]
    Avx2,
    #[cfg(target_arch = "aarch64")]
    Neon,
}

/// The selected kernel. Cheap to copy; codecs store one at construction.
#[derive(Debug, Clone, Copy)]
pub struct Kernel {
    path: KernelPath,
}

impl Kernel {
    /// Pick the widest available path for the capability set
    pub fn select(features: CpuFeatures) -> Kernel {
        #[cfg(target_arch = "x86_64")]
        {
            if features.avx2 && features.ssse3 {
                return Kernel {
                    path: KernelPath::Avx2,
                };
            }
            if features.ssse3 {
                return Kernel {
                    path: KernelPath::Ssse3,
                };
            }
        }
        #[cfg(target_arch = "aarch64")]
        {
            if features.neon {
                return Kernel {
                    path: KernelPath::Neon,
                };
            }
        }
        let _ = features;
        Kernel {
            path: KernelPath::Scalar,
        }
    }

    pub fn path(&self) -> KernelPath {
        self.path
    }

    /// `output[i] = mul(c, input[i])`
    pub fn mul_slice(&self, c: u8, input: &[u8], output: &mut [u8]) {
        debug_assert_eq!(input.len(), output.len());
        if c == 0 {
            output.fill(0);
            return;
        }
        if c == 1 {
            output.copy_from_slice(input);
            return;
        }
        match self.path {
            KernelPath::Scalar => scalar::mul_slice(c, input, output),
            #[cfg(target_arch = "x86_64")]
            KernelPath::Ssse3 => unsafe { pshufb::mul_slice_ssse3(c, input, output) },
            #[cfg(target_arch = "x86_64")]
            KernelPath::Avx2 => unsafe { pshufb::mul_slice_avx2(c, input, output) },
            #[cfg(target_arch = "aarch64")]
            KernelPath::Neon => unsafe { neon::mul_slice_neon(c, input, output) },
        }
    }

    /// `output[i] ^= mul(c, input[i])`
    pub fn mul_slice_xor(&self, c: u8, input: &[u8], output: &mut [u8]) {
        debug_assert_eq!(input.len(), output.len());
        if c == 0 {
            return;
        }
        if c == 1 {
            slice_xor(input, output);
            return;
        }
        match self.path {
            KernelPath::Scalar => scalar::mul_slice_xor(c, input, output),
            #[cfg(target_arch = "x86_64")]
            KernelPath::Ssse3 => unsafe { pshufb::mul_slice_xor_ssse3(c, input, output) },
            #[cfg(target_arch = "x86_64")]
            KernelPath::Avx2 => unsafe { pshufb::mul_slice_xor_avx2(c, input, output) },
            #[cfg(target_arch = "aarch64")]
            KernelPath::Neon => unsafe { neon::mul_slice_xor_neon(c, input, output) },
        }
    }

    /// Fill each output with the XOR-sum of `matrix_rows[out][in] * inputs[in]`.
    ///
    /// The first input writes directly so outputs never need pre-zeroing.
    pub fn code_some_shards(
        &self,
        matrix_rows: &[&[u8]],
        inputs: &[&[u8]],
        outputs: &mut [&mut [u8]],
    ) {
        debug_assert_eq!(matrix_rows.len(), outputs.len());
        for (i_in, input) in inputs.iter().enumerate() {
            for (i_out, output) in outputs.iter_mut().enumerate() {
                let c = matrix_rows[i_out][i_in];
                if i_in == 0 {
                    self.mul_slice(c, input, output);
                } else {
                    self.mul_slice_xor(c, input, output);
                }
            }
        }
    }
}

/// `output[i] ^= input[i]`
pub fn slice_xor(input: &[u8], output: &mut [u8]) {
    // Word-at-a-time; the compiler vectorizes this fine on its own
    let words = input.len().min(output.len()) / 8 * 8;
    for (o, i) in output[..words]
        .chunks_exact_mut(8)
        .zip(input[..words].chunks_exact(8))
    {
        let x = u64::from_ne_bytes((&*o).try_into().unwrap())
            ^ u64::from_ne_bytes(i.try_into().unwrap());
        o.copy_from_slice(&x.to_ne_bytes());
    }
    for (o, i) in output[words..].iter_mut().zip(&input[words..]) {
        *o ^= i;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::galois::gal_mul;

    fn reference_mul_xor(c: u8, input: &[u8], output: &mut [u8]) {
        for (o, i) in output.iter_mut().zip(input) {
            *o ^= gal_mul(c, *i);
        }
    }

    fn pseudo_random(len: usize, mut seed: u32) -> Vec<u8> {
        (0..len)
            .map(|_| {
                seed = seed.wrapping_mul(1664525).wrapping_add(1013904223);
                (seed >> 24) as u8
            })
            .collect()
    }

    #[test]
    fn test_scalar_matches_reference() {
        let kernel = Kernel::select(CpuFeatures::none());
        for len in [0, 1, 15, 16, 17, 31, 32, 33, 64, 1000] {
            for c in [0u8, 1, 2, 7, 133, 255] {
                let input = pseudo_random(len, 7 + c as u32);
                let mut out_a = pseudo_random(len, 99);
                let mut out_b = out_a.clone();
                kernel.mul_slice_xor(c, &input, &mut out_a);
                reference_mul_xor(c, &input, &mut out_b);
                assert_eq!(out_a, out_b, "xor c={} len={}", c, len);

                kernel.mul_slice(c, &input, &mut out_a);
                let expect: Vec<u8> = input.iter().map(|&x| gal_mul(c, x)).collect();
                assert_eq!(out_a, expect, "direct c={} len={}", c, len);
            }
        }
    }

    #[test]
    fn test_vector_paths_match_scalar() {
        let scalar = Kernel::select(CpuFeatures::none());
        let best = Kernel::select(CpuFeatures::detect());
        if best.path() == KernelPath::Scalar {
            return;
        }
        for len in [1, 13, 16, 32, 33, 63, 64, 65, 255, 4096, 4097] {
            for c in [0u8, 1, 3, 29, 142, 255] {
                let input = pseudo_random(len, c as u32 + 1);
                let seed_out = pseudo_random(len, 4242);

                let mut out_scalar = seed_out.clone();
                let mut out_vector = seed_out.clone();
                scalar.mul_slice_xor(c, &input, &mut out_scalar);
                best.mul_slice_xor(c, &input, &mut out_vector);
                assert_eq!(out_scalar, out_vector, "xor c={} len={}", c, len);

                scalar.mul_slice(c, &input, &mut out_scalar);
                best.mul_slice(c, &input, &mut out_vector);
                assert_eq!(out_scalar, out_vector, "direct c={} len={}", c, len);
            }
        }
    }

    #[test]
    fn test_slice_xor() {
        let input = pseudo_random(133, 5);
        let mut output = pseudo_random(133, 6);
        let expect: Vec<u8> = output.iter().zip(&input).map(|(o, i)| o ^ i).collect();
        slice_xor(&input, &mut output);
        assert_eq!(output, expect);
    }

    #[test]
    fn test_code_some_shards_xor_sum() {
        let kernel = Kernel::select(CpuFeatures::none());
        let rows: Vec<Vec<u8>> = vec![vec![1, 2, 3], vec![4, 5, 6]];
        let inputs: Vec<Vec<u8>> = (0..3).map(|i| pseudo_random(40, i + 10)).collect();
        let mut outputs: Vec<Vec<u8>> = vec![vec![0xAA; 40]; 2];

        {
            let row_refs: Vec<&[u8]> = rows.iter().map(|r| r.as_slice()).collect();
            let in_refs: Vec<&[u8]> = inputs.iter().map(|v| v.as_slice()).collect();
            let mut out_refs: Vec<&mut [u8]> =
                outputs.iter_mut().map(|v| v.as_mut_slice()).collect();
            kernel.code_some_shards(&row_refs, &in_refs, &mut out_refs);
        }

        for (out_idx, output) in outputs.iter().enumerate() {
            for byte in 0..40 {
                let mut want = 0u8;
                for (in_idx, input) in inputs.iter().enumerate() {
                    want ^= gal_mul(rows[out_idx][in_idx], input[byte]);
                }
                assert_eq!(output[byte], want, "output {} byte {}", out_idx, byte);
            }
        }
    }
}
