use serde_json::json;
use vitae_chain::{Block, Payload, GENESIS_PREVIOUS_HASH};

fn unsealed(seed: u64) -> Block {
    Block::new(
        1,
        seed as f64,
        Payload::new("resume", json!({"user_id": "bench", "seed": seed})),
        GENESIS_PREVIOUS_HASH,
    )
}

#[divan::bench]
fn bench_calculate_hash(bencher: divan::Bencher) {
    let block = unsealed(7);
    bencher.bench(|| divan::black_box(&block).calculate_hash());
}

#[divan::bench(args = [1, 2, 3])]
fn bench_seal(bencher: divan::Bencher, difficulty: usize) {
    let mut seed = 0u64;
    bencher
        .with_inputs(|| {
            seed += 1;
            unsealed(seed)
        })
        .bench_values(|mut block| {
            block.seal(difficulty);
            block
        });
}

fn main() {
    divan::main();
}
