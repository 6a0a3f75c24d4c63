//! GF(2^8) additive-FFT codec, the opt-in variant for k+m ≤ 256
//!
//! Structural sibling of [`ff16`](super::ff16) over the byte field
//! (polynomial 0x11D, 8-bit Cantor basis). Cheaper tables and transforms
//! when the shard count allows it; elements are single bytes, so shard
//! buffers need no pairing.

use super::{ceil_pow2, formal_derivative, SHARD_SIZE_MULTIPLE};
use crate::error::{Error, Result};
use crate::kernel::slice_xor;
use crate::options::Options;
use crate::scheduler::{split_stripes, Scheduler};
use crate::shards::{check_shards, grow_shard, shard_present};
use log::debug;
use rayon::prelude::*;
use std::sync::OnceLock;

const ORDER: usize = 256;
const MODULUS: u8 = 255;
const POLYNOMIAL: usize = 0x11D;

/// Basis used to build the logarithm tables
const CANTOR_BASIS: [u8; 8] = [1, 214, 152, 146, 86, 200, 88, 230];

#[inline(always)]
fn add_mod(a: u8, b: u8) -> u8 {
    let sum = a as usize + b as usize;
    (sum + (sum >> 8)) as u8
}

struct Tables {
    log: [u8; ORDER],
    exp: [u8; ORDER],
    skew: [u8; ORDER],
    log_walsh: [u8; ORDER],
}

/// Walsh-Hadamard transform modulo 255; counterpart of the 16-bit version
fn fwht(data: &mut [u8], mtrunc: usize) {
    let mut dist = 1;
    while dist < ORDER {
        let mut r = 0;
        while r < mtrunc {
            for i in r..r + dist {
                let a = data[i];
                let b = data[i + dist];
                let sum = a as usize + b as usize;
                let dif = (a as usize).wrapping_sub(b as usize);
                data[i] = (sum + (sum >> 8)) as u8;
                data[i + dist] = dif.wrapping_add(dif >> 8) as u8;
            }
            r += dist * 2;
        }
        dist *= 2;
    }
}

fn build_tables() -> Tables {
    let mut log = [0u8; ORDER];
    let mut exp = [0u8; ORDER];

    let mut state: usize = 1;
    for i in 0..MODULUS as usize {
        exp[state] = i as u8;
        state <<= 1;
        if state >= ORDER {
            state ^= POLYNOMIAL;
        }
    }
    exp[0] = MODULUS;

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
        exp[log[i] as usize] = i as u8;
    }
    exp[MODULUS as usize] = exp[0];

    let mul_log = |a: u8, log_b: u8, log: &[u8; ORDER], exp: &[u8; ORDER]| -> u8 {
        if a == 0 {
            0
        } else {
            exp[add_mod(log[a as usize], log_b) as usize]
        }
    };

    let mut skew = [0u8; ORDER];
    let mut temp = [0u8; 7];
    for (i, t) in temp.iter_mut().enumerate() {
        *t = 1 << (i + 1);
    }
    for m in 0..7 {
        let step = 1usize << (m + 1);
        skew[(1 << m) - 1] = 0;
        for i in m..7 {
            let s = 1usize << (i + 1);
            let mut j = (1usize << m) - 1;
            while j < s {
                skew[j + s] = skew[j] ^ temp[i];
                j += step;
            }
        }
        let idx = mul_log(temp[m], log[(temp[m] ^ 1) as usize], &log, &exp);
        temp[m] = MODULUS - log[idx as usize];
        for i in m + 1..7 {
            let sum = add_mod(log[(temp[i] ^ 1) as usize], temp[m]);
            temp[i] = mul_log(temp[i], sum, &log, &exp);
        }
    }
    for entry in skew.iter_mut() {
        *entry = log[*entry as usize];
    }

    let mut log_walsh = log;
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

/// 256-byte product table for one log coefficient
fn build_mul_table(log_m: u8, t: &Tables) -> [u8; 256] {
    let mut mt = [0u8; 256];
    for b in 1..256usize {
        mt[b] = t.exp[add_mod(t.log[b], log_m) as usize];
    }
    mt
}

/// `x[] ^= y[] * exp(log_m)`
fn mul_add(x: &mut [u8], y: &[u8], log_m: u8, t: &Tables) {
    let mt = build_mul_table(log_m, t);
    for (xb, yb) in x.iter_mut().zip(y) {
        *xb ^= mt[*yb as usize];
    }
}

/// `x[] = y[] * exp(log_m)`
fn mul(x: &mut [u8], y: &[u8], log_m: u8, t: &Tables) {
    let mt = build_mul_table(log_m, t);
    for (xb, yb) in x.iter_mut().zip(y) {
        *xb = mt[*yb as usize];
    }
}

fn ifft(work: &mut [&mut [u8]], mtrunc: usize, size: usize, skew_delta: usize, t: &Tables) {
    let mut dist = 1;
    while dist < size {
        let mut r = 0;
        while r < mtrunc {
            let log_m = t.skew[r + dist + skew_delta - 1];
            let (xs, ys) = work.split_at_mut(r + dist);
            for i in r..r + dist {
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

fn fft(work: &mut [&mut [u8]], mtrunc: usize, size: usize, skew_delta: usize, t: &Tables) {
    let mut dist = size >> 1;
    while dist > 0 {
        let mut r = 0;
        while r < mtrunc {
            let log_m = t.skew[r + dist + skew_delta - 1];
            let (xs, ys) = work.split_at_mut(r + dist);
            for i in r..r + dist {
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

/// The GF(2^8) FFT codec
pub(crate) struct LeopardFF8 {
    data_shards: usize,
    parity_shards: usize,
    total_shards: usize,
    scheduler: Scheduler,
}

impl LeopardFF8 {
    /// True when the decode work set fits the byte field
    pub fn fits(data_shards: usize, parity_shards: usize) -> bool {
        data_shards + parity_shards <= ORDER
            && ceil_pow2(data_shards + ceil_pow2(parity_shards)) <= ORDER
    }

    pub fn new(data_shards: usize, parity_shards: usize, opts: &Options) -> Result<LeopardFF8> {
        if data_shards == 0 || parity_shards == 0 {
            return Err(Error::InvalidShardCount);
        }
        let total_shards = data_shards
            .checked_add(parity_shards)
            .ok_or(Error::InvalidRowSize)?;
        if !Self::fits(data_shards, parity_shards) {
            return Err(Error::MaxShardCount(ORDER));
        }
        let scheduler = Scheduler::from_options(
            opts.max_parallelism,
            opts.min_split_size,
            opts.auto_shard_size,
        );
        debug!("GF(2^8) FFT codec {}+{} created", data_shards, parity_shards);
        Ok(LeopardFF8 {
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

                let mtrunc = m.min(k);
                for (w, input) in acc.iter_mut().zip(inputs) {
                    w.copy_from_slice(&input[start..end]);
                }
                {
                    let mut refs: Vec<&mut [u8]> =
                        acc.iter_mut().map(|w| w.as_mut_slice()).collect();
                    ifft(&mut refs, mtrunc, m, m, t);
                }

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

        let mut err_locs = vec![0u8; ORDER];
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
            *loc = ((*loc as usize * walsh as usize) % MODULUS as usize) as u8;
        }
        fwht(&mut err_locs, ORDER);

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

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_exp_tables_are_inverse() {
        let t = tables();
        for x in 1..ORDER {
            assert_eq!(t.exp[t.log[x] as usize] as usize, x);
        }
        assert_eq!(t.log[1], 0);
    }

    #[test]
    fn test_fft_ifft_round_trip() {
        let t = tables();
        let size = 16;
        let chunk = 64;
        let mut work: Vec<Vec<u8>> = (0..size)
            .map(|i| (0..chunk).map(|j| ((i * 37 + j * 11 + 3) % 256) as u8).collect())
            .collect();
        let orig = work.clone();
        {
            let mut refs: Vec<&mut [u8]> = work.iter_mut().map(|w| w.as_mut_slice()).collect();
            ifft(&mut refs, size, size, 1, t);
            fft(&mut refs, size, size, 1, t);
        }
        assert_eq!(work, orig);
    }

    #[test]
    fn test_encode_reconstruct_round_trip() {
        let codec = LeopardFF8::new(100, 28, &Options::new()).unwrap();
        let size = 192;
        let mut shards: Vec<Vec<u8>> = (0..128)
            .map(|i| (0..size).map(|j| ((i * 89 + j * 13 + 1) % 256) as u8).collect())
            .collect();
        codec.encode(&mut shards).unwrap();
        assert!(codec.verify(&shards).unwrap());

        let reference = shards.clone();
        for &gone in &[2usize, 47, 99, 101, 127] {
            shards[gone] = Vec::new();
        }
        codec.reconstruct(&mut shards, false).unwrap();
        assert_eq!(shards, reference);
    }

    #[test]
    fn test_envelope() {
        assert!(LeopardFF8::fits(100, 28));
        assert!(LeopardFF8::fits(128, 128));
        assert!(!LeopardFF8::fits(200, 56));
        assert!(!LeopardFF8::fits(255, 2));
    }
}
