//! # Rolling-Shutter Benchmarks
//!
//! | Group      | Operation                                   | Hot path of           |
//! |------------|---------------------------------------------|-----------------------|
//! | threshold  | epoch secret key share, verify, aggregate   | keyper per trigger    |
//! | codec      | ShutterTx decode + sender recovery          | collator per tx       |
//! | codec      | transactions hash over a full batch         | collator per trigger  |

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use std::time::Duration;

use rs_03_collator::{tx_hash, ShutterTx};
use shared_crypto::{
    compute_epoch_secret_key, hash_byte_list, EpochSecretKeyShare, Secp256k1KeyPair,
    ThresholdKeyGen,
};
use shared_types::{EpochId, U256};

// ============================================================================
// THRESHOLD
// ============================================================================

fn bench_epoch_key_shares(c: &mut Criterion) {
    let mut group = c.benchmark_group("threshold");
    group.measurement_time(Duration::from_secs(10));

    let dealer = ThresholdKeyGen::new(3, 2, 7).unwrap().generate().unwrap();
    let identity = EpochId::from_u64(42);
    let share = dealer.secret_key_shares[0]
        .compute_epoch_secret_key_share(identity.as_bytes())
        .unwrap();

    group.bench_function("compute_share", |b| {
        b.iter(|| {
            dealer.secret_key_shares[0]
                .compute_epoch_secret_key_share(black_box(identity.as_bytes()))
                .unwrap()
        })
    });
    group.bench_function("verify_share", |b| {
        b.iter(|| black_box(share.verify(identity.as_bytes(), &dealer.public_key_shares[0])))
    });

    for (num_keypers, threshold) in [(3u64, 2u64), (10, 7), (30, 20)] {
        let dealer = ThresholdKeyGen::new(num_keypers, threshold, 7)
            .unwrap()
            .generate()
            .unwrap();
        let indices: Vec<u64> = (0..threshold).collect();
        let shares: Vec<EpochSecretKeyShare> = indices
            .iter()
            .map(|i| {
                dealer.secret_key_shares[*i as usize]
                    .compute_epoch_secret_key_share(identity.as_bytes())
                    .unwrap()
            })
            .collect();

        group.throughput(Throughput::Elements(threshold));
        group.bench_with_input(
            BenchmarkId::new("aggregate", format!("{threshold}-of-{num_keypers}")),
            &(indices, shares),
            |b, (indices, shares)| {
                b.iter(|| compute_epoch_secret_key(indices, shares, threshold).unwrap())
            },
        );
    }
    group.finish();
}

// ============================================================================
// CODEC
// ============================================================================

fn signed_tx(key: &Secp256k1KeyPair, nonce: u64) -> Vec<u8> {
    ShutterTx {
        chain_id: U256::from(1337),
        nonce,
        gas_tip_cap: U256::from(1),
        gas_fee_cap: U256::from(2),
        gas: 21_000,
        encrypted_payload: vec![0xee; 256],
        batch_index: 1,
        signature: None,
    }
    .sign(key)
    .unwrap()
    .encode()
    .unwrap()
}

fn bench_transaction_codec(c: &mut Criterion) {
    let mut group = c.benchmark_group("codec");
    let key = Secp256k1KeyPair::from_bytes([7u8; 32]).unwrap();
    let raw = signed_tx(&key, 0);

    group.bench_function("decode_and_recover_sender", |b| {
        b.iter(|| {
            let tx = ShutterTx::decode(black_box(&raw)).unwrap();
            tx.sender().unwrap()
        })
    });

    for size in [10usize, 100, 1000] {
        let batch: Vec<Vec<u8>> = (0..size as u64).map(|n| signed_tx(&key, n)).collect();
        group.throughput(Throughput::Elements(size as u64));
        group.bench_with_input(
            BenchmarkId::new("transactions_hash", size),
            &batch,
            |b, batch| b.iter(|| hash_byte_list(batch.iter().map(|raw| tx_hash(raw)))),
        );
    }
    group.finish();
}

criterion_group!(benches, bench_epoch_key_shares, bench_transaction_codec);
criterion_main!(benches);
