//! Reed-Solomon erasure coding over GF(2^8) and GF(2^16)
//!
//! Splits data into `k` data shards plus `m` parity shards so that any `k`
//! of the `k + m` survivors reconstruct the original. Two codec families sit
//! behind one surface:
//!
//! - a **matrix codec** for `k + m <= 256`: classical Reed-Solomon with a
//!   systematic coding matrix (Vandermonde by default; Cauchy, PAR1,
//!   Jerasure and custom layouts available), SIMD byte kernels and an
//!   inversion cache;
//! - an **FFT codec** for up to 65,536 shards: O(n log n) additive-FFT
//!   encoding and decoding over GF(2^8) or GF(2^16), selected with
//!   [`Options::leopard_gf8`]/[`Options::leopard_gf16`] or automatically
//!   once `k + m` outgrows the matrix codec.
//!
//! # Example
//!
//! ```
//! use rscodec::ReedSolomon;
//!
//! let codec = ReedSolomon::new(4, 2)?;
//! let mut shards = codec.split(b"some bytes worth protecting")?;
//! codec.encode(&mut shards)?;
//!
//! // Lose any two shards...
//! shards[1] = Vec::new();
//! shards[4] = Vec::new();
//!
//! // ...and get them back.
//! codec.reconstruct(&mut shards)?;
//! assert!(codec.verify(&shards)?);
//!
//! let mut restored = Vec::new();
//! codec.join(&mut restored, &shards, 27)?;
//! assert_eq!(&restored, b"some bytes worth protecting");
//! # Ok::<(), rscodec::Error>(())
//! ```
//!
//! Shard buffers are caller-owned. A zero-length shard marks a missing
//! slot; if its capacity already covers the shard size, reconstruction
//! fills it in place without moving the allocation.

mod classical;
mod error;
mod galois;
mod inversion;
mod kernel;
mod leopard;
mod matrix;
mod options;
mod scheduler;
mod shards;

pub use error::{Error, Result};
pub use galois::Galois8;
pub use kernel::CpuFeatures;
pub use options::{LeopardMode, MatrixKind, Options};
pub use shards::alloc_aligned;

use classical::Classical;
use leopard::{LeopardFF16, LeopardFF8};
use options::LeopardMode as Mode;
use std::io::Write;

enum Codec {
    Classical(Classical),
    LeopardFF8(LeopardFF8),
    LeopardFF16(LeopardFF16),
}

/// A Reed-Solomon codec for a fixed (k, m) geometry.
///
/// Construction precomputes the coding matrix or FFT tables; all operations
/// afterwards are read-only on the codec and safe to call concurrently.
pub struct ReedSolomon {
    codec: Codec,
}

impl ReedSolomon {
    /// Codec with default options: matrix codec up to 256 total shards,
    /// GF(2^16) FFT codec beyond
    pub fn new(data_shards: usize, parity_shards: usize) -> Result<ReedSolomon> {
        ReedSolomon::with_options(data_shards, parity_shards, Options::default())
    }

    /// Codec with explicit [`Options`]
    pub fn with_options(
        data_shards: usize,
        parity_shards: usize,
        opts: Options,
    ) -> Result<ReedSolomon> {
        if data_shards == 0 {
            return Err(Error::InvalidShardCount);
        }
        let total = data_shards
            .checked_add(parity_shards)
            .ok_or(Error::InvalidRowSize)?;

        let codec = match opts.leopard {
            Mode::Gf16 if parity_shards > 0 => {
                Codec::LeopardFF16(LeopardFF16::new(data_shards, parity_shards, &opts)?)
            }
            Mode::Gf8 if parity_shards > 0 => {
                if LeopardFF8::fits(data_shards, parity_shards) {
                    Codec::LeopardFF8(LeopardFF8::new(data_shards, parity_shards, &opts)?)
                } else {
                    Codec::LeopardFF16(LeopardFF16::new(data_shards, parity_shards, &opts)?)
                }
            }
            _ if total > 256 && parity_shards > 0 => {
                Codec::LeopardFF16(LeopardFF16::new(data_shards, parity_shards, &opts)?)
            }
            _ => Codec::Classical(Classical::new(data_shards, parity_shards, &opts)?),
        };
        Ok(ReedSolomon { codec })
    }

    /// Number of data shards
    pub fn data_shards(&self) -> usize {
        match &self.codec {
            Codec::Classical(c) => c.data_shards(),
            Codec::LeopardFF8(c) => c.data_shards(),
            Codec::LeopardFF16(c) => c.data_shards(),
        }
    }

    /// Number of parity shards
    pub fn parity_shards(&self) -> usize {
        match &self.codec {
            Codec::Classical(c) => c.parity_shards(),
            Codec::LeopardFF8(c) => c.parity_shards(),
            Codec::LeopardFF16(c) => c.parity_shards(),
        }
    }

    /// Total shard count, data plus parity
    pub fn total_shards(&self) -> usize {
        match &self.codec {
            Codec::Classical(c) => c.total_shards(),
            Codec::LeopardFF8(c) => c.total_shards(),
            Codec::LeopardFF16(c) => c.total_shards(),
        }
    }

    /// Every shard length must be a positive multiple of this (1 for the
    /// matrix codec, 64 for the FFT codecs)
    pub fn shard_size_multiple(&self) -> usize {
        match &self.codec {
            Codec::Classical(_) => 1,
            Codec::LeopardFF8(c) => c.shard_size_multiple(),
            Codec::LeopardFF16(c) => c.shard_size_multiple(),
        }
    }

    /// `total_shards` zeroed buffers of `shard_size` bytes, capacity rounded
    /// for later in-place growth
    pub fn alloc_aligned(&self, shard_size: usize) -> Vec<Vec<u8>> {
        shards::alloc_aligned(self.total_shards(), shard_size)
    }

    /// Fill the parity shards from the data shards.
    ///
    /// `shards` must hold `total_shards` buffers of one common length (a
    /// multiple of [`shard_size_multiple`](Self::shard_size_multiple));
    /// parity contents are overwritten.
    pub fn encode(&self, shards: &mut [Vec<u8>]) -> Result<()> {
        match &self.codec {
            Codec::Classical(c) => c.encode(shards),
            Codec::LeopardFF8(c) => c.encode(shards),
            Codec::LeopardFF16(c) => c.encode(shards),
        }
    }

    /// Fold a single data shard into pre-zeroed parity buffers, in any
    /// order across calls. Parity is valid once every data index has been
    /// folded exactly once. `NotSupported` on the FFT codecs.
    pub fn encode_idx(&self, data_shard: &[u8], idx: usize, parity: &mut [Vec<u8>]) -> Result<()> {
        match &self.codec {
            Codec::Classical(c) => c.encode_idx(data_shard, idx, parity),
            _ => Err(Error::NotSupported),
        }
    }

    /// Recompute parity into scratch and compare with the stored parity
    pub fn verify(&self, shards: &[Vec<u8>]) -> Result<bool> {
        match &self.codec {
            Codec::Classical(c) => c.verify(shards),
            Codec::LeopardFF8(c) => c.verify(shards),
            Codec::LeopardFF16(c) => c.verify(shards),
        }
    }

    /// Re-derive parity after replacing a subset of data shards, without
    /// re-encoding the unchanged ones.
    ///
    /// `new_data` holds one entry per data shard; empty entries mean
    /// "unchanged". On return the changed `shards` entries contain the new
    /// data and all parity is consistent. `NotSupported` on the FFT codecs.
    pub fn update(&self, shards: &mut [Vec<u8>], new_data: &[Vec<u8>]) -> Result<()> {
        match &self.codec {
            Codec::Classical(c) => c.update(shards, new_data),
            _ => Err(Error::NotSupported),
        }
    }

    /// Rebuild every missing shard, data and parity, in place
    pub fn reconstruct(&self, shards: &mut [Vec<u8>]) -> Result<()> {
        match &self.codec {
            Codec::Classical(c) => c.reconstruct(shards, false, None),
            Codec::LeopardFF8(c) => c.reconstruct(shards, false),
            Codec::LeopardFF16(c) => c.reconstruct(shards, false),
        }
    }

    /// Rebuild only missing data shards, leaving missing parity empty
    pub fn reconstruct_data(&self, shards: &mut [Vec<u8>]) -> Result<()> {
        match &self.codec {
            Codec::Classical(c) => c.reconstruct(shards, true, None),
            Codec::LeopardFF8(c) => c.reconstruct(shards, true),
            Codec::LeopardFF16(c) => c.reconstruct(shards, true),
        }
    }

    /// Rebuild the shards flagged in `required` (length `data_shards` for a
    /// data-only request, `total_shards` otherwise). Implementations may
    /// reconstruct additional missing shards when convenient.
    pub fn reconstruct_some(&self, shards: &mut [Vec<u8>], required: &[bool]) -> Result<()> {
        let data_only = if required.len() == self.total_shards() {
            false
        } else if required.len() == self.data_shards() {
            true
        } else {
            return Err(Error::InvalidInput(
                "required list must cover data or total shards",
            ));
        };
        match &self.codec {
            Codec::Classical(c) => c.reconstruct(shards, data_only, Some(required)),
            // The FFT decode is a single pass over everything missing
            Codec::LeopardFF8(c) => c.reconstruct(shards, data_only),
            Codec::LeopardFF16(c) => c.reconstruct(shards, data_only),
        }
    }

    /// Slice `data` into `data_shards` zero-padded shards and append zeroed
    /// parity slots, ready for [`encode`](Self::encode)
    pub fn split(&self, data: &[u8]) -> Result<Vec<Vec<u8>>> {
        shards::split(
            data,
            self.data_shards(),
            self.parity_shards(),
            self.shard_size_multiple(),
        )
    }

    /// Write `out_size` bytes of original data from the data shards
    pub fn join<W: Write>(&self, dst: &mut W, shards: &[Vec<u8>], out_size: usize) -> Result<()> {
        shards::join(dst, shards, self.data_shards(), out_size)
    }
}
