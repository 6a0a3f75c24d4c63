//! Shard buffer helpers: validation, allocation, split and join
//!
//! Shard conventions used across both codec families:
//!
//! - a shard with `len() == size` is **present**;
//! - a shard with `len() == 0` and `capacity() >= size` is **missing** and
//!   will be reconstructed in place, preserving its backing allocation;
//! - a shard with `len() == 0` and insufficient capacity is **absent** and
//!   gets a fresh buffer.

use crate::error::{Error, Result};
use std::io::Write;

/// Capacities are rounded up to this so buffers can later grow to any
/// FFT-friendly size without reallocating
const ALLOC_ROUND: usize = 64;

#[inline]
pub(crate) fn shard_present(shard: &[u8]) -> bool {
    !shard.is_empty()
}

/// Length of the first present shard, or 0 when all are empty
pub(crate) fn shard_size(shards: &[Vec<u8>]) -> usize {
    shards
        .iter()
        .find(|s| shard_present(s))
        .map(|s| s.len())
        .unwrap_or(0)
}

/// Validate that all present shards share a length.
///
/// With `nil_ok`, empty slots are allowed (reconstruction input); without
/// it every shard must be present. Returns the common length.
pub(crate) fn check_shards(shards: &[Vec<u8>], nil_ok: bool) -> Result<usize> {
    let size = shard_size(shards);
    if size == 0 {
        return Err(Error::ShardNoData);
    }
    for shard in shards {
        if shard.len() != size {
            if !shard.is_empty() || !nil_ok {
                return Err(Error::ShardSize);
            }
        }
    }
    Ok(size)
}

/// One zeroed shard buffer with capacity rounded to a 64-byte multiple
pub(crate) fn alloc_shard(size: usize) -> Vec<u8> {
    let cap = size.div_ceil(ALLOC_ROUND) * ALLOC_ROUND;
    let mut buf = Vec::with_capacity(cap);
    buf.resize(size, 0);
    buf
}

/// `n` zeroed shard buffers of `size` bytes each.
///
/// Capacities are rounded to 64-byte multiples; the vector kernels use
/// unaligned loads, so this is about growth headroom rather than pointer
/// alignment.
pub fn alloc_aligned(n: usize, size: usize) -> Vec<Vec<u8>> {
    (0..n).map(|_| alloc_shard(size)).collect()
}

/// Grow a missing slot to `size`, reusing its allocation when the capacity
/// is already adequate (the backing address must not change in that case)
pub(crate) fn grow_shard(shard: &mut Vec<u8>, size: usize) {
    shard.clear();
    if shard.capacity() >= size {
        shard.resize(size, 0);
    } else {
        *shard = alloc_shard(size);
    }
}

/// Split a buffer into `data_shards` equal shards, zero-padded, with
/// `parity_shards` zeroed parity slots appended.
///
/// The shard length is `ceil(len / data_shards)` rounded up to
/// `size_multiple`. Empty input is `ShortData`.
pub(crate) fn split(
    data: &[u8],
    data_shards: usize,
    parity_shards: usize,
    size_multiple: usize,
) -> Result<Vec<Vec<u8>>> {
    if data.is_empty() {
        return Err(Error::ShortData);
    }
    let per_shard = data.len().div_ceil(data_shards).div_ceil(size_multiple) * size_multiple;
    let mut shards = alloc_aligned(data_shards + parity_shards, per_shard);
    for (shard, chunk) in shards.iter_mut().zip(data.chunks(per_shard)) {
        shard[..chunk.len()].copy_from_slice(chunk);
    }
    Ok(shards)
}

/// Concatenate the first `data_shards` shards into `dst`, writing exactly
/// `out_size` bytes.
///
/// Fails with `TooFewShards` on a short list, `ReconstructRequired` when a
/// needed shard is empty, and `ShortData` when the shards hold fewer than
/// `out_size` bytes.
pub(crate) fn join<W: Write>(
    dst: &mut W,
    shards: &[Vec<u8>],
    data_shards: usize,
    out_size: usize,
) -> Result<()> {
    if shards.len() < data_shards {
        return Err(Error::TooFewShards);
    }
    let shards = &shards[..data_shards];

    // Enough bytes before the cut-off, with every contributing shard present
    let mut size = 0;
    for shard in shards {
        if !shard_present(shard) {
            return Err(Error::ReconstructRequired);
        }
        size += shard.len();
        if size >= out_size {
            break;
        }
    }
    if size < out_size {
        return Err(Error::ShortData);
    }

    let mut remaining = out_size;
    for shard in shards {
        if remaining < shard.len() {
            dst.write_all(&shard[..remaining])?;
            return Ok(());
        }
        dst.write_all(shard)?;
        remaining -= shard.len();
        if remaining == 0 {
            return Ok(());
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_shard_size_skips_missing() {
        let shards = vec![vec![], vec![1, 2, 3], vec![]];
        assert_eq!(shard_size(&shards), 3);
        assert_eq!(shard_size(&[vec![], vec![]]), 0);
    }

    #[test]
    fn test_check_shards() {
        let shards = vec![vec![0u8; 4], vec![0u8; 4]];
        assert_eq!(check_shards(&shards, false).unwrap(), 4);

        let with_hole = vec![vec![0u8; 4], vec![]];
        assert!(matches!(
            check_shards(&with_hole, false),
            Err(Error::ShardSize)
        ));
        assert_eq!(check_shards(&with_hole, true).unwrap(), 4);

        let mismatched = vec![vec![0u8; 4], vec![0u8; 5]];
        assert!(matches!(
            check_shards(&mismatched, true),
            Err(Error::ShardSize)
        ));

        let empty = vec![vec![], vec![]];
        assert!(matches!(check_shards(&empty, true), Err(Error::ShardNoData)));
    }

    #[test]
    fn test_alloc_aligned_rounds_capacity() {
        let bufs = alloc_aligned(3, 100);
        assert_eq!(bufs.len(), 3);
        for b in &bufs {
            assert_eq!(b.len(), 100);
            assert_eq!(b.capacity() % 64, 0);
            assert!(b.iter().all(|&x| x == 0));
        }
    }

    #[test]
    fn test_grow_shard_keeps_allocation() {
        let mut shard = Vec::with_capacity(128);
        let addr = shard.as_ptr();
        grow_shard(&mut shard, 100);
        assert_eq!(shard.len(), 100);
        assert_eq!(shard.as_ptr(), addr);
    }

    #[test]
    fn test_split_pads_and_allocates_parity() {
        let data: Vec<u8> = (0..10).collect();
        let shards = split(&data, 3, 2, 1).unwrap();
        assert_eq!(shards.len(), 5);
        // ceil(10/3) = 4 bytes per shard
        assert_eq!(shards[0], vec![0, 1, 2, 3]);
        assert_eq!(shards[1], vec![4, 5, 6, 7]);
        assert_eq!(shards[2], vec![8, 9, 0, 0]);
        assert_eq!(shards[3], vec![0; 4]);
        assert_eq!(shards[4], vec![0; 4]);
    }

    #[test]
    fn test_split_respects_size_multiple() {
        let data = vec![7u8; 100];
        let shards = split(&data, 3, 1, 64).unwrap();
        assert_eq!(shards[0].len(), 64);
    }

    #[test]
    fn test_split_empty_is_short_data() {
        assert!(matches!(split(&[], 3, 2, 1), Err(Error::ShortData)));
    }

    #[test]
    fn test_join_round_trip() {
        let data: Vec<u8> = (0..100).collect();
        let shards = split(&data, 7, 2, 1).unwrap();
        let mut out = Vec::new();
        join(&mut out, &shards, 7, data.len()).unwrap();
        assert_eq!(out, data);
    }

    #[test]
    fn test_join_errors() {
        let shards = vec![vec![1u8, 2], vec![3, 4]];
        let mut out = Vec::new();
        assert!(matches!(
            join(&mut out, &shards[..1], 2, 2),
            Err(Error::TooFewShards)
        ));
        assert!(matches!(
            join(&mut out, &shards, 2, 10),
            Err(Error::ShortData)
        ));
        let with_hole = vec![vec![], vec![3u8, 4]];
        assert!(matches!(
            join(&mut out, &with_hole, 2, 2),
            Err(Error::ReconstructRequired)
        ));
    }
}
