//! Encode/verify behavior across codec geometries and option sets

use rand::{Rng, SeedableRng};
use rscodec::{Error, Options, ReedSolomon};

fn fill_random(shard: &mut [u8], seed: u64) {
    let mut rng = rand::rngs::StdRng::seed_from_u64(seed);
    rng.fill(shard);
}

fn option_sets() -> Vec<Options> {
    vec![
        Options::new(),
        Options::new().cauchy_matrix(),
        Options::new().jerasure_matrix(),
        Options::new().fast_one_parity(),
        Options::new().cauchy_matrix().fast_one_parity(),
        Options::new().max_parallelism(1).min_split_size(500),
        Options::new().max_parallelism(5000).min_split_size(50),
        Options::new().max_parallelism(5000).min_split_size(500_000),
        Options::new().auto_parallelism(50_000).min_split_size(500),
        Options::new().inversion_cache(false),
        Options::new().ssse3(false).avx2(false).avx512(false),
        Options::new().leopard_gf8(true),
        Options::new().leopard_gf16(true),
    ]
}

fn geometries() -> Vec<(usize, usize)> {
    vec![
        (1, 0),
        (10, 0),
        (1, 1),
        (1, 2),
        (3, 3),
        (5, 3),
        (8, 4),
        (10, 30),
        (14, 7),
        (41, 17),
        (49, 1),
        (256, 20),
    ]
}

#[test]
fn test_encoding_round_trip() {
    for (oi, opts) in option_sets().into_iter().enumerate() {
        for (data, parity) in geometries() {
            let codec = match ReedSolomon::with_options(data, parity, opts.clone()) {
                Ok(c) => c,
                Err(e) => panic!("new({}, {}) opts #{}: {}", data, parity, oi, e),
            };
            assert_eq!(codec.data_shards(), data);
            assert_eq!(codec.parity_shards(), parity);
            assert_eq!(codec.total_shards(), data + parity);
            let mul = codec.shard_size_multiple();
            assert!(mul > 0);

            for base_size in [10usize, 1001, 10_003] {
                let per_shard = base_size.div_ceil(mul) * mul;
                let mut shards = codec.alloc_aligned(per_shard);
                for (s, shard) in shards.iter_mut().enumerate() {
                    fill_random(shard, (oi * 1000 + s) as u64);
                }

                codec.encode(&mut shards).unwrap();
                assert!(
                    codec.verify(&shards).unwrap(),
                    "verify failed {}x{} opts #{}",
                    data,
                    parity,
                    oi
                );

                if parity == 0 {
                    // Reconstruct variants are no-ops without parity
                    codec.reconstruct(&mut shards).unwrap();
                    codec.reconstruct_data(&mut shards).unwrap();
                    continue;
                }

                // Drop one data shard, restore data only
                let idx = base_size % data;
                let want = shards[idx].clone();
                shards[idx] = Vec::new();
                codec.reconstruct_data(&mut shards).unwrap();
                assert_eq!(shards[idx], want, "{}x{} opts #{}", data, parity, oi);

                // Drop any one shard, full restore
                let idx = (base_size * 7) % (data + parity);
                let want = shards[idx].clone();
                shards[idx] = Vec::new();
                codec.reconstruct(&mut shards).unwrap();
                assert_eq!(shards[idx], want);

                // Wrong list length
                assert!(matches!(
                    codec.encode(&mut vec![Vec::new()]),
                    Err(Error::TooFewShards)
                ));

                // One shard too short
                let shortened = shards[idx].len() - 1;
                shards[idx].truncate(shortened);
                assert!(matches!(codec.encode(&mut shards), Err(Error::ShardSize)));
            }
        }
    }
}

#[test]
fn test_one_encode_known_vector() {
    let codec = ReedSolomon::with_options(5, 5, Options::new().fast_one_parity()).unwrap();
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
fn test_verify_detects_any_flip() {
    let codec = ReedSolomon::new(10, 4).unwrap();
    let per_shard = 3333;
    let mut shards = codec.alloc_aligned(per_shard);
    for (s, shard) in shards.iter_mut().enumerate() {
        fill_random(shard, s as u64);
    }
    codec.encode(&mut shards).unwrap();
    assert!(codec.verify(&shards).unwrap());

    // Corrupt a parity shard
    fill_random(&mut shards[10], 999);
    assert!(!codec.verify(&shards).unwrap());

    codec.encode(&mut shards).unwrap();
    // Corrupt a data shard
    fill_random(&mut shards[0], 998);
    assert!(!codec.verify(&shards).unwrap());

    // Single byte flips
    codec.encode(&mut shards).unwrap();
    for &(idx, byte) in &[(0usize, 0usize), (5, 1717), (13, 3332)] {
        shards[idx][byte] ^= 0x40;
        assert!(!codec.verify(&shards).unwrap(), "flip at {}:{}", idx, byte);
        shards[idx][byte] ^= 0x40;
    }
    assert!(codec.verify(&shards).unwrap());
}

#[test]
fn test_verify_argument_validation() {
    let codec = ReedSolomon::new(10, 4).unwrap();
    assert!(matches!(
        codec.verify(&vec![Vec::new(); 1]),
        Err(Error::TooFewShards)
    ));
    assert!(matches!(
        codec.verify(&vec![Vec::new(); 14]),
        Err(Error::ShardNoData)
    ));
}

#[test]
fn test_custom_matrix_encode() {
    let codec = ReedSolomon::with_options(
        4,
        3,
        Options::new().custom_matrix(vec![
            vec![1, 1, 0, 0],
            vec![0, 0, 1, 1],
            vec![1, 2, 3, 4],
        ]),
    )
    .unwrap();
    let mut shards = codec.alloc_aligned(64);
    for (s, shard) in shards.iter_mut().enumerate() {
        fill_random(shard, s as u64 + 40);
    }
    codec.encode(&mut shards).unwrap();
    // First parity row is data0 ^ data1
    for i in 0..64 {
        assert_eq!(shards[4][i], shards[0][i] ^ shards[1][i]);
        assert_eq!(shards[5][i], shards[2][i] ^ shards[3][i]);
    }
    assert!(codec.verify(&shards).unwrap());
}
