//! GF(2^16) additive-FFT codec, for up to 65,536 total shards
//!
//! Field polynomial 0x1002D with logarithms taken over a Cantor basis,
//! which is what makes the FFT twiddle ("skew") factors well-defined. Shard
//! bytes are consumed as little-endian 16-bit pairs; every pair position is
//! transformed independently, so byte ranges stripe cleanly.

use super::{ceil_pow2, formal_derivative, SHARD_SIZE_MULTIPLE};
use crate::error::{Error, Result};
use crate::kernel::slice_xor;
use crate::options::Options;
use crate::scheduler::{split_stripes, Scheduler};
use crate::shards::{check_shards, grow_shard, shard_present};
use log::debug;
use rayon::prelude::*;
use std::sync::OnceLock;

const ORDER: usize = 65536;
const MODULUS: u16 = 65535;
const POLYNOMIAL: usize = 0x1002D;

/// Basis used to build the logarithm tables
const CANTOR_BASIS: [u16; 16] = [
    0x0001, 0xACCA, 0x3C0E, 0x163E, 0xC582, 0xED2E, 0x914C, 0x4012, 0x6C98, 0x10D8, 0x6A72,
    0xB900, 0xFDB8, 0xFB34, 0xFF38, 0x991E,
];

/// Sum of two logarithms, folded into `[0, MODULUS]`
#[inline(always)]
fn add_mod(a: u16, b: u16) -> u16 {
    let sum = a as usize + b as usize;
    (sum + (sum >> 16)) as u16
}

struct Tables {
    log: Vec<u16>,
    exp: Vec<u16>,
    /// FFT butterfly twiddles in log form, indexed by position
    skew: Vec<u16>,
    /// Walsh-transformed logarithms for the erasure locator
    log_walsh: Vec<u16>,
}

/// In-place Walsh-Hadamard transform modulo 65,535. Only group starts below
/// `mtrunc` are visited; entries past it must be zero on entry.
fn fwht(data: &mut [u16], mtrunc: usize) {
    let mut dist = 1;
    while dist < ORDER {
        let mut r = 0;
        while r < mtrunc {
            for i in r..r + dist {
                let a = data[i];
                let b = data[i + dist];
                let sum = a as usize + b as usize;
                let dif = (a as usize).wrapping_sub(b as usize);
                data[i] = (sum + (sum >> 16)) as u16;
                data[i + dist] = dif.wrapping_add(dif >> 16) as u16;
            }
            r += dist * 2;
        }
        dist *= 2;
    }
}

fn build_tables() -> Tables {
    let mut log = vec![0u16; ORDER];
    let mut exp = vec![0u16; ORDER];

    // LFSR walk: exp temporarily maps element -> discrete log
    let mut state: usize = 1;
    for i in 0..MODULUS as usize {
        exp[state] = i as u16;
        state <<= 1;
        if state >= ORDER {
            state ^= POLYNOMIAL;
        }
    }
    exp[0] = MODULUS;

    // Map logs through the Cantor basis, then invert into a true exp table
    log[0] = 0;
    for (i, &basis) in CANTOR_BASIS.iter().enumerate() {
        let width = 1usize << i;
        for j in 0..width {
            log[j + width] = log[j] ^ basis;
        }
    }
    for entry in log.iter_mut() {
        *entry = exp[*entry as usize];
    }
    for i in 0..ORDER {
        exp[log[i] as usize] = i as u16;
    }
    exp[MODULUS as usize] = exp[0];

    // FFT skew factors
    let mul_log = |a: u16, log_b: u16, log: &[u16], exp: &[u16]| -> u16 {
        if a == 0 {
            0
        } else {
            exp[add_mod(log[a as usize], log_b) as usize]
        }
    };

    let mut skew = vec![0u16; ORDER];
    let mut temp = [0u16; 15];
    for (i, t) in temp.iter_mut().enumerate() {
        *t = 1 << (i + 1);
    }
    for m in 0..15 {
        let step = 1usize << (m + 1);
        skew[(1 << m) - 1] = 0;
        for i in m..15 {
            let s = 1usize << (i + 1);
            let mut j = (1usize << m) - 1;
            while j < s {
                skew[j + s] = skew[j] ^ temp[i];
                j += step;
            }
        }
        let idx = mul_log(temp[m], log[(temp[m] ^ 1) as usize], &log, &exp);
        temp[m] = MODULUS - log[idx as usize];
        for i in m + 1..15 {
            let sum = add_mod(log[(temp[i] ^ 1) as usize], temp[m]);
            temp[i] = mul_log(temp[i], sum, &log, &exp);
        }
    }
    for entry in skew.iter_mut() {
        *entry = log[*entry as usize];
    }

    // Erasure-locator helper table
    let mut log_walsh = log.clone();
    log_walsh[0] = 0;
    fwht(&mut log_walsh, ORDER);

    Tables {
        log,
        exp,
        skew,
        log_walsh,
    }
}

fn tables() -> &'static Tables {
    static TABLES: OnceLock<Tables> = OnceLock::new();
    TABLES.get_or_init(build_tables)
}

/// Per-coefficient split product tables: `mul(x) = lo[x & 0xFF] ^ hi[x >> 8]`.
/// 1 KiB built per butterfly, amortized over the whole buffer it multiplies.
struct MulTable {
    lo: [u16; 256],
    hi: [u16; 256],
}

fn build_mul_table(log_m: u16, t: &Tables) -> MulTable {
    let mut lo = [0u16; 256];
    let mut hi = [0u16; 256];
    for b in 1..256usize {
        lo[b] = t.exp[add_mod(t.log[b], log_m) as usize];
        hi[b] = t.exp[add_mod(t.log[b << 8], log_m) as usize];
    }
    MulTable { lo, hi }
}

/// `x[] ^= y[] * exp(log_m)` over little-endian byte pairs
fn mul_add(x: &mut [u8], y: &[u8], log_m: u16, t: &Tables) {
    let mt = build_mul_table(log_m, t);
    for (xc, yc) in x.chunks_exact_mut(2).zip(y.chunks_exact(2)) {
        let w = u16::from_le_bytes([yc[0], yc[1]]);
        let p = mt.lo[(w & 0xFF) as usize] ^ mt.hi[(w >> 8) as usize];
        let cur = u16::from_le_bytes([xc[0], xc[1]]);
        xc.copy_from_slice(&(cur ^ p).to_le_bytes());
    }
}

/// `x[] = y[] * exp(log_m)` over little-endian byte pairs
fn mul(x: &mut [u8], y: &[u8], log_m: u16, t: &Tables) {
    let mt = build_mul_table(log_m, t);
    for (xc, yc) in x.chunks_exact_mut(2).zip(y.chunks_exact(2)) {
        let w = u16::from_le_bytes([yc[0], yc[1]]);
        let p = mt.lo[(w & 0xFF) as usize] ^ mt.hi[(w >> 8) as usize];
        xc.copy_from_slice(&p.to_le_bytes());
    }
}

/// Decimation-in-time IFFT across the first `size` work buffers.
///
/// Only butterfly groups starting below `mtrunc` run; buffers past the
/// truncation point must hold zeros. `skew_delta` selects the evaluation
/// point block.
fn ifft(work: &mut [&mut [u8]], mtrunc: usize, size: usize, skew_delta: usize, t: &Tables) {
    let mut dist = 1;
    while dist < size {
        let mut r = 0;
        while r < mtrunc {
            let log_m = t.skew[r + dist + skew_delta - 1];
            let (xs, ys) = work.split_at_mut(r + dist);
            for i in r..r + dist {
                // y += x, then x += y * m
                let x = &mut *xs[i];
                let y = &mut *ys[i - r];
                slice_xor(x, y);
                if log_m != MODULUS {
                    mul_add(x, y, log_m, t);
                }
            }
            r += dist * 2;
        }
        dist *= 2;
    }
}

/// Decimation-in-time forward FFT; mirror of [`ifft`]
fn fft(work: &mut [&mut [u8]], mtrunc: usize, size: usize, skew_delta: usize, t: &Tables) {
    let mut dist = size >> 1;
    while dist > 0 {
        let mut r = 0;
        while r < mtrunc {
            let log_m = t.skew[r + dist + skew_delta - 1];
            let (xs, ys) = work.split_at_mut(r + dist);
            for i in r..r + dist {
                // x += y * m, then y += x
                let x = &mut *xs[i];
                let y = &mut *ys[i - r];
                if log_m != MODULUS {
                    mul_add(x, y, log_m, t);
                }
                slice_xor(x, y);
            }
            r += dist * 2;
        }
        dist >>= 1;
    }
}

/// The GF(2^16) FFT codec
pub(crate) struct LeopardFF16 {
    data_shards: usize,
    parity_shards: usize,
    total_shards: usize,
    scheduler: Scheduler,
}

impl LeopardFF16 {
    /// True when the decode work set `next_pow2(next_pow2(m) + k)` fits the
    /// field order
    pub fn fits(data_shards: usize, parity_shards: usize) -> bool {
        ceil_pow2(data_shards + ceil_pow2(parity_shards)) <= ORDER
    }

    pub fn new(data_shards: usize, parity_shards: usize, opts: &Options) -> Result<LeopardFF16> {
        if data_shards == 0 || parity_shards == 0 {
            return Err(Error::InvalidShardCount);
        }
        let total_shards = data_shards
            .checked_add(parity_shards)
            .ok_or(Error::InvalidRowSize)?;
        if total_shards > ORDER || !Self::fits(data_shards, parity_shards) {
            return Err(Error::MaxShardCount(ORDER));
        }
        let scheduler = Scheduler::from_options(
            opts.max_parallelism,
            opts.min_split_size,
            opts.auto_shard_size,
        );
        debug!("GF(2^16) FFT codec {}+{} created", data_shards, parity_shards);
        Ok(LeopardFF16 {
            data_shards,
            parity_shards,
            total_shards,
            scheduler,
        })
    }

    pub fn data_shards(&self) -> usize {
        self.data_shards
    }

    pub fn parity_shards(&self) -> usize {
        self.parity_shards
    }

    pub fn total_shards(&self) -> usize {
        self.total_shards
    }

    pub fn shard_size_multiple(&self) -> usize {
        SHARD_SIZE_MULTIPLE
    }

    fn check_size(size: usize) -> Result<usize> {
        if size % SHARD_SIZE_MULTIPLE != 0 {
            return Err(Error::ShardSize);
        }
        Ok(size)
    }

    pub fn encode(&self, shards: &mut [Vec<u8>]) -> Result<()> {
        if shards.len() != self.total_shards {
            return Err(Error::TooFewShards);
        }
        let size = Self::check_size(check_shards(shards, false)?)?;
        let (data, parity) = shards.split_at_mut(self.data_shards);
        let inputs: Vec<&[u8]> = data.iter().map(|s| s.as_slice()).collect();
        let outputs: Vec<&mut [u8]> = parity.iter_mut().map(|s| s.as_mut_slice()).collect();
        self.encode_parity(&inputs, outputs, size);
        Ok(())
    }

    pub fn verify(&self, shards: &[Vec<u8>]) -> Result<bool> {
        if shards.len() != self.total_shards {
            return Err(Error::TooFewShards);
        }
        let size = Self::check_size(check_shards(shards, false)?)?;
        let inputs: Vec<&[u8]> = shards[..self.data_shards]
            .iter()
            .map(|s| s.as_slice())
            .collect();
        let mut scratch: Vec<Vec<u8>> = vec![vec![0u8; size]; self.parity_shards];
        {
            let outputs: Vec<&mut [u8]> = scratch.iter_mut().map(|s| s.as_mut_slice()).collect();
            self.encode_parity(&inputs, outputs, size);
        }
        Ok(scratch
            .iter()
            .zip(&shards[self.data_shards..])
            .all(|(got, want)| got == want))
    }

    /// Parity generation: per stripe, an inverse transform folds each block
    /// of m̂ data shards into an accumulator, and one forward transform of
    /// the accumulator yields all parity
    fn encode_parity(&self, inputs: &[&[u8]], outputs: Vec<&mut [u8]>, size: usize) {
        let t = tables();
        let m = ceil_pow2(self.parity_shards);
        let k = self.data_shards;
        let plan = self.scheduler.stripes_aligned(size, SHARD_SIZE_MULTIPLE);
        let grouped = split_stripes(&plan, outputs);

        plan.into_par_iter()
            .zip(grouped)
            .for_each(|((start, end), mut stripe_outputs)| {
                let chunk = end - start;
                let mut work: Vec<Vec<u8>> = vec![vec![0u8; chunk]; 2 * m];
                let (acc, temp) = work.split_at_mut(m);

                // First block lands directly in the accumulator
                let mtrunc = m.min(k);
                for (w, input) in acc.iter_mut().zip(inputs) {
                    w.copy_from_slice(&input[start..end]);
                }
                {
                    let mut refs: Vec<&mut [u8]> =
                        acc.iter_mut().map(|w| w.as_mut_slice()).collect();
                    ifft(&mut refs, mtrunc, m, m, t);
                }

                // Remaining blocks transform into scratch and fold in
                let mut off = m;
                while off < k {
                    let count = (k - off).min(m);
                    for (i, w) in temp.iter_mut().enumerate() {
                        if i < count {
                            w.copy_from_slice(&inputs[off + i][start..end]);
                        } else {
                            w.fill(0);
                        }
                    }
                    {
                        let mut refs: Vec<&mut [u8]> =
                            temp.iter_mut().map(|w| w.as_mut_slice()).collect();
                        ifft(&mut refs, count, m, m + off, t);
                    }
                    for (a, tmp) in acc.iter_mut().zip(temp.iter()) {
                        slice_xor(tmp, a);
                    }
                    off += m;
                }

                // Forward transform; only the first parity_shards outputs
                // are needed
                {
                    let mut refs: Vec<&mut [u8]> =
                        acc.iter_mut().map(|w| w.as_mut_slice()).collect();
                    fft(&mut refs, self.parity_shards, m, 0, t);
                }
                for (out, w) in stripe_outputs.iter_mut().zip(acc.iter()) {
                    out.copy_from_slice(w);
                }
            });
    }

    pub fn reconstruct(&self, shards: &mut [Vec<u8>], data_only: bool) -> Result<()> {
        if shards.len() != self.total_shards {
            return Err(Error::TooFewShards);
        }
        let size = check_shards(shards, true)?;

        let mut present = 0;
        let mut data_present = 0;
        for (i, shard) in shards.iter().enumerate() {
            if shard_present(shard) {
                present += 1;
                if i < self.data_shards {
                    data_present += 1;
                }
            }
        }
        if present == self.total_shards || (data_only && data_present == self.data_shards) {
            return Ok(());
        }
        if present < self.data_shards {
            return Err(Error::TooFewShards);
        }
        Self::check_size(size)?;

        let t = tables();
        let m = ceil_pow2(self.parity_shards);
        let n = ceil_pow2(m + self.data_shards);
        let k = self.data_shards;

        // Erasure locator over shard positions, independent of byte offset:
        // indicator -> FWHT -> pointwise log-Walsh product -> FWHT
        let mut err_locs = vec![0u16; ORDER];
        for i in 0..self.parity_shards {
            if !shard_present(&shards[k + i]) {
                err_locs[i] = 1;
            }
        }
        for loc in err_locs.iter_mut().take(m).skip(self.parity_shards) {
            *loc = 1;
        }
        for i in 0..k {
            if !shard_present(&shards[i]) {
                err_locs[m + i] = 1;
            }
        }
        fwht(&mut err_locs, m + k);
        for (loc, &walsh) in err_locs.iter_mut().zip(&t.log_walsh) {
            *loc = ((*loc as usize * walsh as usize) % MODULUS as usize) as u16;
        }
        fwht(&mut err_locs, ORDER);

        // Pull out the shards being rebuilt; reads borrow what remains
        let mut out_indices = Vec::new();
        let mut out_bufs: Vec<Vec<u8>> = Vec::new();
        for i in 0..self.total_shards {
            if shard_present(&shards[i]) || (data_only && i >= k) {
                continue;
            }
            let mut buf = std::mem::take(&mut shards[i]);
            grow_shard(&mut buf, size);
            out_indices.push(i);
            out_bufs.push(buf);
        }

        {
            let plan = self.scheduler.stripes_aligned(size, SHARD_SIZE_MULTIPLE);
            let outputs: Vec<&mut [u8]> = out_bufs.iter_mut().map(|b| b.as_mut_slice()).collect();
            let grouped = split_stripes(&plan, outputs);

            plan.into_par_iter()
                .zip(grouped)
                .for_each(|((start, end), mut stripe_outputs)| {
                    let chunk = end - start;
                    let mut work: Vec<Vec<u8>> = vec![vec![0u8; chunk]; n];

                    // work <- locator-scaled received shards
                    for i in 0..self.parity_shards {
                        let shard = &shards[k + i];
                        if shard_present(shard) {
                            mul(&mut work[i], &shard[start..end], err_locs[i], t);
                        }
                    }
                    for i in 0..k {
                        let shard = &shards[i];
                        if shard_present(shard) {
                            mul(&mut work[m + i], &shard[start..end], err_locs[m + i], t);
                        }
                    }

                    {
                        let mut refs: Vec<&mut [u8]> =
                            work.iter_mut().map(|w| w.as_mut_slice()).collect();
                        ifft(&mut refs, m + k, n, 0, t);
                        formal_derivative(&mut refs, n);
                        fft(&mut refs, m + k, n, 0, t);
                    }

                    // Reveal erasures at their original positions
                    for (&idx, out) in out_indices.iter().zip(stripe_outputs.iter_mut()) {
                        let pos = if idx < k { m + idx } else { idx - k };
                        mul(out, &work[pos], MODULUS - err_locs[pos], t);
                    }
                });
        }

        for (i, buf) in out_indices.into_iter().zip(out_bufs) {
            shards[i] = buf;
        }
        Ok(())
    }
}
