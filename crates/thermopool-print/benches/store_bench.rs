// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Criterion benchmarks for the pending job store and ESC/POS encoding.

use criterion::{BatchSize, Criterion, black_box, criterion_group, criterion_main};

use thermopool_core::row::{Alignment, Column, FontSize};
use thermopool_core::types::{PendingJob, PrinterId};
use thermopool_core::PrintRow;
use thermopool_print::escpos::{EscPosEncoder, RowEncoder};
use thermopool_print::store::PendingStore;

fn receipt_rows() -> Vec<PrintRow> {
    let mut rows = vec![PrintRow::text("THE CORNER CAFE")];
    for i in 0..20 {
        rows.push(PrintRow::Column {
            bold: false,
            font_size: FontSize::Normal,
            columns: vec![
                Column {
                    text: format!("Item number {i} with a longish name"),
                    width: 70,
                    alignment: Alignment::Left,
                    wrap_words: true,
                },
                Column {
                    text: format!("{}.50", i + 1),
                    width: 30,
                    alignment: Alignment::Right,
                    wrap_words: false,
                },
            ],
        });
    }
    rows.push(PrintRow::QrCode {
        text: "https://example.test/r/0001".into(),
        alignment: None,
    });
    rows.push(PrintRow::Cut);
    rows
}

/// A store holding `per_printer` jobs for each of `printers` printers.
fn filled_store(printers: usize, per_printer: usize) -> PendingStore {
    let store = PendingStore::new();
    for p in 0..printers {
        let printer = PrinterId::new(format!("10.0.0.{p}"));
        for _ in 0..per_printer {
            let job = PendingJob::new(
                printer.clone(),
                1,
                vec![PrintRow::text("x")],
                r#"{"type":"KOT"}"#.into(),
            );
            store.insert(job).expect("insert");
        }
    }
    store
}

fn bench_store_listing(c: &mut Criterion) {
    let store = filled_store(8, 250);
    let printer = PrinterId::from("10.0.0.3");

    c.bench_function("store list (2000 jobs)", |b| {
        b.iter(|| black_box(store.list().expect("list")));
    });

    c.bench_function("store list_for (250 of 2000)", |b| {
        b.iter(|| black_box(store.list_for(black_box(&printer), 1).expect("list_for")));
    });
}

fn bench_checkout_checkin(c: &mut Criterion) {
    c.bench_function("store checkout + checkin", |b| {
        b.iter_batched(
            || {
                let store = filled_store(1, 100);
                let id = store.list().expect("list")[50].id;
                (store, id)
            },
            |(store, id)| {
                let job = store.checkout(&id).expect("checkout");
                store.checkin(job).expect("checkin");
            },
            BatchSize::SmallInput,
        );
    });
}

fn bench_escpos_encode(c: &mut Criterion) {
    let rows = receipt_rows();
    let encoder = EscPosEncoder::default();

    c.bench_function("escpos encode (20-line receipt)", |b| {
        b.iter(|| black_box(encoder.encode(black_box(&rows)).expect("encode")));
    });
}

criterion_group!(
    benches,
    bench_store_listing,
    bench_checkout_checkin,
    bench_escpos_encode,
);
criterion_main!(benches);
