use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use chrono::Utc;
use stockroom_catalog::ProductId;
use stockroom_core::{Aggregate, UserId};
use stockroom_ledger::{
    current_quantity, MovementId, MovementKind, NegativeStockPolicy, NewMovement, ProductStock,
    RecordMovement, StockMovement,
};

fn ledger(product_id: ProductId, len: usize) -> Vec<StockMovement> {
    let actor = UserId::new();
    let now = Utc::now();
    (0..len)
        .map(|i| {
            let (kind, qty) = match i % 3 {
                0 => (MovementKind::StockIn, 10),
                1 => (MovementKind::StockOut, 3),
                _ => (MovementKind::Adjustment, -1),
            };
            StockMovement::record(
                MovementId::new(),
                NewMovement::new(product_id, kind, qty),
                actor,
                now,
                i as u64,
            )
        })
        .collect()
}

/// Full replay: what `currentQuantity` costs without a running total.
fn bench_fold(c: &mut Criterion) {
    let mut group = c.benchmark_group("ledger_fold");

    for len in [100usize, 1_000, 10_000, 100_000] {
        let product_id = ProductId::new();
        let log = ledger(product_id, len);
        group.throughput(Throughput::Elements(len as u64));
        group.bench_with_input(BenchmarkId::from_parameter(len), &log, |b, log| {
            b.iter(|| current_quantity(black_box(product_id), black_box(log)));
        });
    }

    group.finish();
}

/// Decision + apply against a loaded balance (the transactional path).
fn bench_record_decision(c: &mut Criterion) {
    let product_id = ProductId::new();
    let stock = ProductStock::at(product_id, 1_000_000, 42);
    let cmd = RecordMovement {
        movement: NewMovement::new(product_id, MovementKind::StockOut, 5),
        policy: NegativeStockPolicy::Reject,
    };

    c.bench_function("record_movement_decision", |b| {
        b.iter(|| {
            let mut s = stock.clone();
            for e in s.handle(black_box(&cmd)).unwrap() {
                s.apply(&e);
            }
            s.on_hand()
        });
    });
}

criterion_group!(benches, bench_fold, bench_record_decision);
criterion_main!(benches);
