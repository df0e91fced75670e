use stampline_core::Ledger;

fn synthetic_ledger(n: usize) -> Ledger {
    let mut ledger = Ledger::new("path");
    ledger.ensure_column("info").unwrap();
    ledger.ensure_column("GEM").unwrap();
    for i in 0..n {
        let row = ledger.push_row(&format!("stamps/{i:06}.jpg")).unwrap();
        ledger
            .set(row, "info", format!("country=Brazil; type=entry; #{i}"))
            .unwrap();
        if i % 2 == 0 {
            ledger.set(row, "GEM", "2020-01-01, entry").unwrap();
        }
    }
    ledger
}

/// Full snapshot cost, paid once per processed row
#[divan::bench(args = [1_000, 10_000, 50_000])]
fn persist_snapshot(bencher: divan::Bencher, rows: usize) {
    let ledger = synthetic_ledger(rows);
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("stamps.csv");
    bencher.bench(|| ledger.persist(&path).unwrap());
}

#[divan::bench(args = [1_000, 10_000, 50_000])]
fn load(bencher: divan::Bencher, rows: usize) {
    let bytes = synthetic_ledger(rows).to_csv_bytes().unwrap();
    bencher.bench(|| Ledger::from_reader(bytes.as_slice(), "path").unwrap());
}

#[divan::bench(args = [10_000, 50_000])]
fn scan_pending(bencher: divan::Bencher, rows: usize) {
    let ledger = synthetic_ledger(rows);
    bencher.bench(|| ledger.first_empty("GEM", 1..ledger.len()));
}

fn main() {
    divan::main();
}
