//! Codec construction options
//!
//! A plain builder over the knobs the codec families understand: coding
//! matrix selection, inversion-cache toggle, FFT-codec opt-in, scheduler
//! controls, and CPU capability overrides for the kernel. Unset CPU flags
//! fall back to runtime detection.

use crate::kernel::CpuFeatures;

/// Which coding-matrix construction the classical codec uses
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum MatrixKind {
    /// Systematic Vandermonde (the default); any k survivors decode
    #[default]
    Standard,
    /// Cauchy matrix; any k survivors decode
    Cauchy,
    /// PAR1-format compatible; some erasure patterns are singular
    Par1,
    /// Jerasure-library compatible layout
    Jerasure,
    /// Caller-supplied m×k parity rows
    Custom(Vec<Vec<u8>>),
}

/// FFT-codec selection
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LeopardMode {
    /// Matrix codec for k+m ≤ 256, GF(2¹⁶) FFT codec above
    #[default]
    AsNeeded,
    /// Force the GF(2⁸) FFT codec (falls back to GF(2¹⁶) when the
    /// transform would not fit the field)
    Gf8,
    /// Force the GF(2¹⁶) FFT codec
    Gf16,
}

/// Per-flag CPU capability overrides; `None` means "as detected"
#[derive(Debug, Clone, Copy, Default)]
pub struct CpuOverrides {
    pub sse2: Option<bool>,
    pub ssse3: Option<bool>,
    pub avx2: Option<bool>,
    pub avx512: Option<bool>,
    pub gfni: Option<bool>,
    pub avx_gfni: Option<bool>,
}

/// Options accepted by [`ReedSolomon::with_options`](crate::ReedSolomon::with_options)
#[derive(Debug, Clone, Default)]
pub struct Options {
    pub(crate) matrix: MatrixKind,
    pub(crate) fast_one_parity: bool,
    pub(crate) inversion_cache_disabled: bool,
    pub(crate) leopard: LeopardMode,
    pub(crate) max_parallelism: usize,
    pub(crate) min_split_size: usize,
    pub(crate) auto_shard_size: usize,
    pub(crate) cpu: CpuOverrides,
}

impl Options {
    pub fn new() -> Options {
        Options::default()
    }

    /// Use a Cauchy coding matrix
    pub fn cauchy_matrix(mut self) -> Options {
        self.matrix = MatrixKind::Cauchy;
        self
    }

    /// Use a PAR1-compatible coding matrix
    pub fn par1_matrix(mut self) -> Options {
        self.matrix = MatrixKind::Par1;
        self
    }

    /// Use a Jerasure-compatible coding matrix
    pub fn jerasure_matrix(mut self) -> Options {
        self.matrix = MatrixKind::Jerasure;
        self
    }

    /// Use caller-supplied m×k parity rows; only the shape is validated
    pub fn custom_matrix(mut self, parity_rows: Vec<Vec<u8>>) -> Options {
        self.matrix = MatrixKind::Custom(parity_rows);
        self
    }

    /// With exactly one parity shard, make its row all ones so encoding is
    /// a plain XOR. Ignored for m != 1.
    pub fn fast_one_parity(mut self) -> Options {
        self.fast_one_parity = true;
        self
    }

    /// Enable or disable the decode-matrix cache (enabled by default)
    pub fn inversion_cache(mut self, enabled: bool) -> Options {
        self.inversion_cache_disabled = !enabled;
        self
    }

    /// Opt into the GF(2⁸) FFT codec
    pub fn leopard_gf8(mut self, enabled: bool) -> Options {
        self.leopard = if enabled {
            LeopardMode::Gf8
        } else {
            LeopardMode::AsNeeded
        };
        self
    }

    /// Opt into the GF(2¹⁶) FFT codec
    pub fn leopard_gf16(mut self, enabled: bool) -> Options {
        self.leopard = if enabled {
            LeopardMode::Gf16
        } else {
            LeopardMode::AsNeeded
        };
        self
    }

    /// Ceiling on concurrent stripe workers; 0 uses the rayon pool width
    pub fn max_parallelism(mut self, workers: usize) -> Options {
        self.max_parallelism = workers;
        self
    }

    /// Minimum bytes per stripe; shorter ranges run on one worker
    pub fn min_split_size(mut self, bytes: usize) -> Options {
        self.min_split_size = bytes;
        self
    }

    /// Derive the scheduler settings from an expected shard size
    pub fn auto_parallelism(mut self, shard_size: usize) -> Options {
        self.auto_shard_size = shard_size;
        self
    }

    pub fn sse2(mut self, enabled: bool) -> Options {
        self.cpu.sse2 = Some(enabled);
        self
    }

    pub fn ssse3(mut self, enabled: bool) -> Options {
        self.cpu.ssse3 = Some(enabled);
        self
    }

    pub fn avx2(mut self, enabled: bool) -> Options {
        self.cpu.avx2 = Some(enabled);
        self
    }

    pub fn avx512(mut self, enabled: bool) -> Options {
        self.cpu.avx512 = Some(enabled);
        self
    }

    pub fn gfni(mut self, enabled: bool) -> Options {
        self.cpu.gfni = Some(enabled);
        self
    }

    pub fn avx_gfni(mut self, enabled: bool) -> Options {
        self.cpu.avx_gfni = Some(enabled);
        self
    }

    /// Detected capabilities with overrides applied. Disabling a level also
    /// rules out everything that builds on it.
    pub(crate) fn cpu_features(&self) -> CpuFeatures {
        let mut f = CpuFeatures::detect();
        if let Some(v) = self.cpu.sse2 {
            f.sse2 = v;
        }
        if let Some(v) = self.cpu.ssse3 {
            f.ssse3 = v;
        }
        if let Some(v) = self.cpu.avx2 {
            f.avx2 = v;
        }
        if let Some(v) = self.cpu.avx512 {
            f.avx512 = v;
        }
        if let Some(v) = self.cpu.gfni {
            f.gfni = v;
        }
        if let Some(v) = self.cpu.avx_gfni {
            f.avx_gfni = v;
        }
        f.ssse3 &= f.sse2;
        f.avx2 &= f.ssse3;
        f.avx512 &= f.avx2;
        f.gfni &= f.sse2;
        f.avx_gfni &= f.avx2;
        f
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let o = Options::new();
        assert_eq!(o.matrix, MatrixKind::Standard);
        assert!(!o.inversion_cache_disabled);
        assert_eq!(o.leopard, LeopardMode::AsNeeded);
    }

    #[test]
    fn test_disable_cascades() {
        let o = Options::new().ssse3(false);
        let f = o.cpu_features();
        assert!(!f.ssse3);
        assert!(!f.avx2);
        assert!(!f.avx512);
    }

    #[test]
    fn test_builder_chain() {
        let o = Options::new()
            .cauchy_matrix()
            .inversion_cache(false)
            .max_parallelism(3)
            .min_split_size(128);
        assert_eq!(o.matrix, MatrixKind::Cauchy);
        assert!(o.inversion_cache_disabled);
        assert_eq!(o.max_parallelism, 3);
        assert_eq!(o.min_split_size, 128);
    }
}
