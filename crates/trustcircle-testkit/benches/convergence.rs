//! Convergence and snapshot benchmarks over growing circles.

use std::collections::BTreeSet;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use trustcircle::CircleSnapshot;
use trustcircle_core::{CliqueId, PeerId};
use trustcircle_model::Model;
use trustcircle_testkit::TestPeer;

/// A model where peer 1 trusts peers 2..=size and everyone trusts peer 1.
fn circle_of(size: u8) -> (Model, Vec<TestPeer>) {
    let model = Model::new();
    let peers: Vec<TestPeer> = (1..=size).map(TestPeer::new).collect();
    for p in &peers {
        p.register(&model);
    }
    let others: Vec<&PeerId> = peers[1..].iter().map(|p| &p.id).collect();
    peers[0].advance(&model, &others, &[]);
    for p in &peers[1..] {
        p.advance(&model, &[&peers[0].id], &[]);
    }
    (model, peers)
}

fn bench_transitive_join(c: &mut Criterion) {
    let mut group = c.benchmark_group("transitive_join");

    for size in [4u8, 16, 64] {
        let (model, peers) = circle_of(size);
        let newcomer = TestPeer::new(200);
        newcomer.register(&model);
        let adding: BTreeSet<PeerId> = [peers[0].id.clone()].into();

        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| {
                let result = model
                    .calculate_dynamic_info(
                        &newcomer.id,
                        &adding,
                        &BTreeSet::new(),
                        &newcomer.keypair,
                        || CliqueId::new("bench"),
                    )
                    .unwrap();
                black_box(result)
            });
        });
    }

    group.finish();
}

fn bench_status(c: &mut Criterion) {
    let mut group = c.benchmark_group("status_of");

    for size in [4u8, 16, 64] {
        let (model, peers) = circle_of(size);
        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| black_box(model.status_of(&peers[0].id).unwrap()));
        });
    }

    group.finish();
}

fn bench_snapshot_merge(c: &mut Criterion) {
    let mut group = c.benchmark_group("snapshot_merge");

    for size in [4u8, 16] {
        let (model, _) = circle_of(size);
        let bytes = CircleSnapshot::capture(&model.snapshot()).to_bytes().unwrap();

        group.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            b.iter(|| {
                let target = Model::new();
                let report = CircleSnapshot::from_bytes(&bytes)
                    .unwrap()
                    .merge_into(&target);
                black_box(report)
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_transitive_join, bench_status, bench_snapshot_merge);
criterion_main!(benches);
