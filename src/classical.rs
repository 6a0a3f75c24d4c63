//! The matrix codec for k+m ≤ 256
//!
//! Parity is the product of the coding matrix's bottom m rows with the data
//! shards, computed byte-wise over GF(2^8). Reconstruction inverts the k×k
//! sub-matrix of surviving rows (consulting the inversion cache first) and
//! applies it to the survivors. All heavy loops go through the byte kernel,
//! stripe-parallelized by the scheduler.

use crate::error::{Error, Result};
use crate::inversion::InversionCache;
use crate::kernel::{slice_xor, Kernel};
use crate::matrix::{
    build_matrix, build_matrix_cauchy, build_matrix_jerasure, build_matrix_par1, build_xor_matrix,
    Matrix,
};
use crate::options::{MatrixKind, Options};
use crate::scheduler::{split_stripes, Scheduler};
use crate::shards::{check_shards, grow_shard, shard_present};
use log::debug;
use rayon::prelude::*;
use std::sync::Arc;

/// Classical Reed-Solomon codec state; immutable after construction apart
/// from the internally synchronized inversion cache
pub(crate) struct Classical {
    data_shards: usize,
    parity_shards: usize,
    total_shards: usize,
    matrix: Matrix,
    /// Bottom m rows of the coding matrix, kept separate for fast encoding
    parity: Vec<Vec<u8>>,
    kernel: Kernel,
    scheduler: Scheduler,
    cache: Option<InversionCache>,
}

impl Classical {
    pub fn new(data_shards: usize, parity_shards: usize, opts: &Options) -> Result<Classical> {
        if data_shards == 0 {
            return Err(Error::InvalidShardCount);
        }
        let total_shards = data_shards
            .checked_add(parity_shards)
            .ok_or(Error::InvalidRowSize)?;
        if total_shards > 256 {
            return Err(Error::MaxShardCount(256));
        }

        let matrix = match &opts.matrix {
            MatrixKind::Custom(parity_rows) => {
                if parity_rows.len() != parity_shards
                    || parity_rows.iter().any(|r| r.len() != data_shards)
                {
                    return Err(Error::InvalidInput("custom matrix must be m x k"));
                }
                let mut rows = Vec::with_capacity(total_shards);
                for r in 0..data_shards {
                    let mut row = vec![0u8; data_shards];
                    row[r] = 1;
                    rows.push(row);
                }
                rows.extend(parity_rows.iter().cloned());
                Matrix::from_rows(rows)?
            }
            _ if opts.fast_one_parity && parity_shards == 1 => {
                build_xor_matrix(data_shards, total_shards)?
            }
            MatrixKind::Standard => build_matrix(data_shards, total_shards)?,
            MatrixKind::Cauchy => build_matrix_cauchy(data_shards, total_shards)?,
            MatrixKind::Par1 => build_matrix_par1(data_shards, total_shards)?,
            MatrixKind::Jerasure => build_matrix_jerasure(data_shards, total_shards)?,
        };

        debug_assert_eq!(matrix.row_count(), total_shards);
        debug_assert_eq!(matrix.col_count(), data_shards);
        let parity: Vec<Vec<u8>> = (data_shards..total_shards)
            .map(|r| matrix.row(r).to_vec())
            .collect();

        let kernel = Kernel::select(opts.cpu_features());
        let scheduler = Scheduler::from_options(
            opts.max_parallelism,
            opts.min_split_size,
            opts.auto_shard_size,
        );
        let cache = if opts.inversion_cache_disabled || parity_shards == 0 {
            None
        } else {
            Some(InversionCache::new())
        };

        debug!(
            "matrix codec {}+{} created, kernel {:?}",
            data_shards,
            parity_shards,
            kernel.path()
        );

        Ok(Classical {
            data_shards,
            parity_shards,
            total_shards,
            matrix,
            parity,
            kernel,
            scheduler,
            cache,
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

    pub fn encode(&self, shards: &mut [Vec<u8>]) -> Result<()> {
        if shards.len() != self.total_shards {
            return Err(Error::TooFewShards);
        }
        check_shards(shards, false)?;
        if self.parity_shards == 0 {
            return Ok(());
        }

        let (data, parity) = shards.split_at_mut(self.data_shards);
        let matrix_rows: Vec<&[u8]> = self.parity.iter().map(|r| r.as_slice()).collect();
        let inputs: Vec<&[u8]> = data.iter().map(|s| s.as_slice()).collect();
        let outputs: Vec<&mut [u8]> = parity.iter_mut().map(|s| s.as_mut_slice()).collect();
        self.code_some_shards(&matrix_rows, &inputs, outputs);
        Ok(())
    }

    /// Fold one data shard's parity contribution in, in any order.
    ///
    /// Parity is correct once every data index has been folded exactly once;
    /// folding an index twice or skipping one leaves it undefined.
    pub fn encode_idx(&self, data_shard: &[u8], idx: usize, parity: &mut [Vec<u8>]) -> Result<()> {
        if parity.len() != self.parity_shards {
            return Err(Error::TooFewShards);
        }
        if self.parity_shards == 0 {
            return Ok(());
        }
        if idx >= self.data_shards {
            return Err(Error::InvalidShardCount);
        }
        let size = check_shards(parity, false)?;
        if data_shard.len() != size {
            return Err(Error::ShardSize);
        }
        for (p, out) in parity.iter_mut().enumerate() {
            self.mul_xor_striped(self.parity[p][idx], data_shard, out);
        }
        Ok(())
    }

    pub fn verify(&self, shards: &[Vec<u8>]) -> Result<bool> {
        if shards.len() != self.total_shards {
            return Err(Error::TooFewShards);
        }
        check_shards(shards, false)?;
        if self.parity_shards == 0 {
            return Ok(true);
        }
        let matrix_rows: Vec<&[u8]> = self.parity.iter().map(|r| r.as_slice()).collect();
        let inputs: Vec<&[u8]> = shards[..self.data_shards]
            .iter()
            .map(|s| s.as_slice())
            .collect();
        let expected: Vec<&[u8]> = shards[self.data_shards..]
            .iter()
            .map(|s| s.as_slice())
            .collect();
        Ok(self.check_some_shards(&matrix_rows, &inputs, &expected))
    }

    /// Apply the parity delta for changed data shards without re-encoding
    /// the unchanged ones, then store the new data in place.
    ///
    /// `new_data` has one entry per data shard; empty entries are unchanged.
    pub fn update(&self, shards: &mut [Vec<u8>], new_data: &[Vec<u8>]) -> Result<()> {
        if shards.len() != self.total_shards {
            return Err(Error::TooFewShards);
        }
        if new_data.len() != self.data_shards {
            return Err(Error::TooFewShards);
        }
        let size = check_shards(shards, true)?;
        for p in self.data_shards..self.total_shards {
            if !shard_present(&shards[p]) {
                return Err(Error::InvalidInput("all parity shards must be present"));
            }
        }
        for (i, new) in new_data.iter().enumerate() {
            if !shard_present(new) {
                continue;
            }
            if new.len() != size {
                return Err(Error::ShardSize);
            }
            if !shard_present(&shards[i]) {
                return Err(Error::InvalidInput(
                    "updated data shard must be present in shards",
                ));
            }
        }

        let mut delta = vec![0u8; size];
        for i in 0..self.data_shards {
            if !shard_present(&new_data[i]) {
                continue;
            }
            delta.copy_from_slice(&shards[i]);
            slice_xor(&new_data[i], &mut delta);
            for p in 0..self.parity_shards {
                let coeff = self.parity[p][i];
                self.mul_xor_striped(coeff, &delta, &mut shards[self.data_shards + p]);
            }
            shards[i].clear();
            shards[i].extend_from_slice(&new_data[i]);
        }
        Ok(())
    }

    pub fn reconstruct(
        &self,
        shards: &mut [Vec<u8>],
        data_only: bool,
        required: Option<&[bool]>,
    ) -> Result<()> {
        if shards.len() != self.total_shards {
            return Err(Error::TooFewShards);
        }
        let size = check_shards(shards, true)?;

        let mut present = 0;
        let mut data_present = 0;
        let mut missing_required = 0;
        for (i, shard) in shards.iter().enumerate() {
            if shard_present(shard) {
                present += 1;
                if i < self.data_shards {
                    data_present += 1;
                }
            } else if required.is_some_and(|r| r.get(i).copied().unwrap_or(false)) {
                missing_required += 1;
            }
        }
        if present == self.total_shards
            || (data_only && data_present == self.data_shards)
            || (required.is_some() && missing_required == 0)
        {
            // Nothing asked for is missing
            return Ok(());
        }
        if present < self.data_shards {
            return Err(Error::TooFewShards);
        }

        // The valid set: the first k present shards, in index order. The
        // missing indices seen before the set fills are the cache key.
        let mut valid_indices = Vec::with_capacity(self.data_shards);
        let mut invalid_indices = Vec::new();
        for (i, shard) in shards.iter().enumerate() {
            if valid_indices.len() == self.data_shards {
                break;
            }
            if shard_present(shard) {
                valid_indices.push(i);
            } else {
                invalid_indices.push(i);
            }
        }

        let decode_matrix = self.decode_matrix_for(&valid_indices, &invalid_indices)?;

        // Parity regeneration multiplies the parity rows with *all* data
        // shards, so a required parity forces every missing data shard back
        // first, required or not.
        let parity_needed = !data_only
            && (self.data_shards..self.total_shards).any(|i| {
                !shard_present(&shards[i]) && required.map_or(true, |r| r.get(i).copied().unwrap_or(false))
            });
        let want_data = |i: usize, required: Option<&[bool]>| {
            required.map_or(true, |r| r.get(i).copied().unwrap_or(false)) || parity_needed
        };

        // Rebuild missing data shards from the survivors
        let mut out_indices = Vec::new();
        let mut out_bufs: Vec<Vec<u8>> = Vec::new();
        for i in 0..self.data_shards {
            if !shard_present(&shards[i]) && want_data(i, required) {
                let mut buf = std::mem::take(&mut shards[i]);
                grow_shard(&mut buf, size);
                out_indices.push(i);
                out_bufs.push(buf);
            }
        }
        if !out_bufs.is_empty() {
            let matrix_rows: Vec<&[u8]> = out_indices
                .iter()
                .map(|&i| decode_matrix.row(i))
                .collect();
            let inputs: Vec<&[u8]> = valid_indices
                .iter()
                .map(|&i| shards[i].as_slice())
                .collect();
            let outputs: Vec<&mut [u8]> =
                out_bufs.iter_mut().map(|b| b.as_mut_slice()).collect();
            self.code_some_shards(&matrix_rows, &inputs, outputs);
        }
        for (i, buf) in out_indices.into_iter().zip(out_bufs) {
            shards[i] = buf;
        }

        if data_only {
            return Ok(());
        }

        // With the data complete, regenerate whichever parity is missing
        let mut out_indices = Vec::new();
        let mut out_bufs: Vec<Vec<u8>> = Vec::new();
        for i in self.data_shards..self.total_shards {
            if !shard_present(&shards[i])
                && required.map_or(true, |r| r.get(i).copied().unwrap_or(false))
            {
                let mut buf = std::mem::take(&mut shards[i]);
                grow_shard(&mut buf, size);
                out_indices.push(i);
                out_bufs.push(buf);
            }
        }
        if !out_bufs.is_empty() {
            let matrix_rows: Vec<&[u8]> = out_indices
                .iter()
                .map(|&i| self.parity[i - self.data_shards].as_slice())
                .collect();
            let inputs: Vec<&[u8]> = shards[..self.data_shards]
                .iter()
                .map(|s| s.as_slice())
                .collect();
            let outputs: Vec<&mut [u8]> =
                out_bufs.iter_mut().map(|b| b.as_mut_slice()).collect();
            self.code_some_shards(&matrix_rows, &inputs, outputs);
        }
        for (i, buf) in out_indices.into_iter().zip(out_bufs) {
            shards[i] = buf;
        }

        Ok(())
    }

    /// Decode matrix for a survivor set: cache hit, or invert and insert
    fn decode_matrix_for(
        &self,
        valid_indices: &[usize],
        invalid_indices: &[usize],
    ) -> Result<Arc<Matrix>> {
        if let Some(cache) = &self.cache {
            if let Some(hit) = cache.get(invalid_indices) {
                debug!("inversion cache hit for {:?}", invalid_indices);
                return Ok(hit);
            }
        }
        let sub = self.matrix.sub_matrix_rows(valid_indices);
        let inverted = sub.invert()?;
        debug!("computed decode matrix for missing {:?}", invalid_indices);
        Ok(match &self.cache {
            Some(cache) => cache.insert(invalid_indices, inverted),
            None => Arc::new(inverted),
        })
    }

    /// Matrix-vector product over shards, stripe-parallel
    fn code_some_shards(
        &self,
        matrix_rows: &[&[u8]],
        inputs: &[&[u8]],
        outputs: Vec<&mut [u8]>,
    ) {
        if outputs.is_empty() {
            return;
        }
        let byte_count = inputs[0].len();
        let plan = self.scheduler.stripes(byte_count);
        if plan.len() <= 1 {
            let mut outputs = outputs;
            self.kernel.code_some_shards(matrix_rows, inputs, &mut outputs);
            return;
        }
        let grouped = split_stripes(&plan, outputs);
        plan.into_par_iter()
            .zip(grouped)
            .for_each(|((start, end), mut stripe_outputs)| {
                let stripe_inputs: Vec<&[u8]> =
                    inputs.iter().map(|s| &s[start..end]).collect();
                self.kernel
                    .code_some_shards(matrix_rows, &stripe_inputs, &mut stripe_outputs);
            });
    }

    /// Recompute parity into per-stripe scratch and compare; a mismatching
    /// stripe fails the whole check
    fn check_some_shards(
        &self,
        matrix_rows: &[&[u8]],
        inputs: &[&[u8]],
        expected: &[&[u8]],
    ) -> bool {
        let byte_count = inputs[0].len();
        let plan = self.scheduler.stripes(byte_count);
        plan.into_par_iter().all(|(start, end)| {
            let stripe_inputs: Vec<&[u8]> = inputs.iter().map(|s| &s[start..end]).collect();
            let mut scratch: Vec<Vec<u8>> =
                (0..expected.len()).map(|_| vec![0u8; end - start]).collect();
            {
                let mut outputs: Vec<&mut [u8]> =
                    scratch.iter_mut().map(|b| b.as_mut_slice()).collect();
                self.kernel
                    .code_some_shards(matrix_rows, &stripe_inputs, &mut outputs);
            }
            scratch
                .iter()
                .zip(expected)
                .all(|(got, exp)| got[..] == exp[start..end])
        })
    }

    /// `output ^= coeff * input`, stripe-parallel
    fn mul_xor_striped(&self, coeff: u8, input: &[u8], output: &mut [u8]) {
        let plan = self.scheduler.stripes(input.len());
        if plan.len() <= 1 {
            self.kernel.mul_slice_xor(coeff, input, output);
            return;
        }
        let grouped = split_stripes(&plan, vec![output]);
        plan.into_par_iter()
            .zip(grouped)
            .for_each(|((start, end), mut stripe_outputs)| {
                self.kernel
                    .mul_slice_xor(coeff, &input[start..end], &mut stripe_outputs[0]);
            });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fill_random(shard: &mut [u8], mut seed: u64) {
        for b in shard.iter_mut() {
            seed = seed.wrapping_mul(6364136223846793005).wrapping_add(1442695040888963407);
            *b = (seed >> 56) as u8;
        }
    }

    fn encoded_shards(codec: &Classical, per_shard: usize) -> Vec<Vec<u8>> {
        let mut shards = vec![vec![0u8; per_shard]; codec.total_shards()];
        for (i, s) in shards.iter_mut().enumerate() {
            fill_random(s, i as u64 + 1);
        }
        codec.encode(&mut shards).unwrap();
        shards
    }

    #[test]
    fn test_one_encode_literal_vector() {
        // Known-answer test for the default matrix at 5+5
        let codec = Classical::new(5, 5, &Options::new().fast_one_parity()).unwrap();
        let mut shards = vec![
            vec![0u8, 1],
            vec![4, 5],
            vec![2, 3],
            vec![6, 7],
            vec![8, 9],
            vec![0, 0],
            vec![0, 0],
            vec![0, 0],
            vec![0, 0],
            vec![0, 0],
        ];
        codec.encode(&mut shards).unwrap();
        assert_eq!(shards[5], vec![12, 13]);
        assert_eq!(shards[6], vec![10, 11]);
        assert_eq!(shards[7], vec![14, 15]);
        assert_eq!(shards[8], vec![90, 91]);
        assert_eq!(shards[9], vec![94, 95]);

        assert!(codec.verify(&shards).unwrap());
        shards[8][0] += 1;
        assert!(!codec.verify(&shards).unwrap());
    }

    #[test]
    fn test_fast_one_parity_is_xor() {
        let codec = Classical::new(4, 1, &Options::new().fast_one_parity()).unwrap();
        let mut shards = encoded_shards(&codec, 100);
        for byte in 0..100 {
            let want = shards[0][byte] ^ shards[1][byte] ^ shards[2][byte] ^ shards[3][byte];
            assert_eq!(shards[4][byte], want);
        }
        assert!(codec.verify(&shards).unwrap());
        shards[4][3] ^= 1;
        assert!(!codec.verify(&shards).unwrap());
    }

    #[test]
    fn test_round_trip_all_matrix_kinds() {
        let kinds = [
            Options::new(),
            Options::new().cauchy_matrix(),
            Options::new().jerasure_matrix(),
        ];
        for opts in kinds {
            let codec = Classical::new(7, 3, &opts).unwrap();
            let shards = encoded_shards(&codec, 1021);

            let mut damaged = shards.clone();
            damaged[0] = Vec::new();
            damaged[3] = Vec::new();
            damaged[8] = Vec::new();
            codec.reconstruct(&mut damaged, false, None).unwrap();
            assert_eq!(damaged, shards, "{:?}", opts.matrix);
        }
    }

    #[test]
    fn test_reconstruct_data_leaves_parity_missing() {
        let codec = Classical::new(5, 3, &Options::new()).unwrap();
        let shards = encoded_shards(&codec, 64);
        let mut damaged = shards.clone();
        damaged[1] = Vec::new();
        damaged[6] = Vec::new();
        codec.reconstruct(&mut damaged, true, None).unwrap();
        assert_eq!(damaged[1], shards[1]);
        assert!(damaged[6].is_empty());
    }

    #[test]
    fn test_update_matches_fresh_encode() {
        let codec = Classical::new(6, 3, &Options::new()).unwrap();
        let mut shards = encoded_shards(&codec, 257);

        let mut new_data = vec![Vec::new(); 6];
        new_data[2] = vec![0u8; 257];
        new_data[4] = vec![0u8; 257];
        fill_random(&mut new_data[2], 77);
        fill_random(&mut new_data[4], 78);
        codec.update(&mut shards, &new_data).unwrap();
        assert_eq!(shards[2], new_data[2]);
        assert_eq!(shards[4], new_data[4]);
        assert!(codec.verify(&shards).unwrap());
    }

    #[test]
    fn test_encode_idx_any_order() {
        let codec = Classical::new(5, 4, &Options::new()).unwrap();
        let reference = encoded_shards(&codec, 333);

        let mut parity = vec![vec![0u8; 333]; 4];
        for &i in &[3usize, 0, 4, 1, 2] {
            codec.encode_idx(&reference[i], i, &mut parity).unwrap();
        }
        assert_eq!(&reference[5..], &parity[..]);
    }

    #[test]
    fn test_zero_parity() {
        let codec = Classical::new(4, 0, &Options::new()).unwrap();
        let mut shards = vec![vec![1u8; 10]; 4];
        codec.encode(&mut shards).unwrap();
        assert!(codec.verify(&shards).unwrap());
        codec.reconstruct(&mut shards, false, None).unwrap();
        codec.reconstruct(&mut shards, true, None).unwrap();
    }

    #[test]
    fn test_construction_validation() {
        assert!(matches!(
            Classical::new(0, 1, &Options::new()),
            Err(Error::InvalidShardCount)
        ));
        assert!(matches!(
            Classical::new(255, 2, &Options::new()),
            Err(Error::MaxShardCount(256))
        ));
        assert!(matches!(
            Classical::new(256, usize::MAX, &Options::new()),
            Err(Error::InvalidRowSize)
        ));
        assert!(Classical::new(255, 1, &Options::new()).is_ok());
        assert!(Classical::new(128, 128, &Options::new()).is_ok());
    }

    #[test]
    fn test_custom_matrix_shape_validation() {
        let bad = Options::new().custom_matrix(vec![vec![1, 2, 3]]);
        assert!(Classical::new(4, 1, &bad).is_err());
        let good = Options::new().custom_matrix(vec![vec![1, 2, 3, 4]]);
        assert!(Classical::new(4, 1, &good).is_ok());
    }
}
