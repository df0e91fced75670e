use std::path::Path;
use std::sync::atomic::AtomicBool;

use image::{GrayImage, Luma, RgbImage};
use indicatif::ProgressBar;
use stampline_core::Ledger;
use stampline_dataset::{
    ContrastConfig, fill_info_column, find_images, merge_identities, run_contrast,
};
use tempfile::TempDir;

fn write_photo(root: &Path, rel: &str) {
    let path = root.join(rel);
    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
    let img = RgbImage::from_fn(8, 8, |x, _| {
        if x < 4 {
            image::Rgb([20, 30, 40])
        } else {
            image::Rgb([230, 220, 210])
        }
    });
    img.save(path).unwrap();
}

#[test]
fn scan_info_contrast_pipeline() {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    write_photo(root, "data/stamps/Brazil_entry.png");
    write_photo(root, "data/stamps/Salida_Argentina.jpg");
    std::fs::write(root.join("data/stamps/broken.png"), b"not a png").unwrap();

    let ledger_path = root.join("stamps.csv");
    let mut ledger = Ledger::new("path");
    let found = find_images(root, &root.join("data/stamps")).unwrap();
    let report = merge_identities(&mut ledger, &found).unwrap();
    assert_eq!(report.added, 3);
    ledger.persist(&ledger_path).unwrap();

    // a second scan adds nothing
    let mut ledger = Ledger::load(&ledger_path, "path").unwrap();
    let again = merge_identities(&mut ledger, &find_images(root, &root.join("data/stamps")).unwrap()).unwrap();
    assert_eq!(again.added, 0);
    assert_eq!(again.existing, 3);

    fill_info_column(&mut ledger, "info", false).unwrap();
    let brazil = ledger.index_of("data/stamps/Brazil_entry.png").unwrap();
    assert_eq!(ledger.get(brazil, "info"), Some("country=Brazil; type=entry"));

    let stop = AtomicBool::new(false);
    let config = ContrastConfig::default();
    let report = run_contrast(&mut ledger, root, &config, false, &stop, &ProgressBar::hidden()).unwrap();
    assert_eq!(report.processed, 2);
    assert_eq!(report.failed, 1);
    assert_eq!(
        ledger.get(brazil, "processed"),
        Some("data/bw-stamps/Brazil_entry.png")
    );
    let broken = ledger.index_of("data/stamps/broken.png").unwrap();
    assert_eq!(ledger.get(broken, "processed"), Some(""));

    let bw: GrayImage = image::open(root.join("data/bw-stamps/Brazil_entry.png"))
        .unwrap()
        .to_luma8();
    assert_eq!(bw.get_pixel(0, 0), &Luma([0]));
    assert_eq!(bw.get_pixel(7, 7), &Luma([255]));

    // existing outputs are kept unless forced
    let report = run_contrast(&mut ledger, root, &config, false, &stop, &ProgressBar::hidden()).unwrap();
    assert_eq!(report.processed, 0);
    assert_eq!(report.existing, 2);
    let report = run_contrast(&mut ledger, root, &config, true, &stop, &ProgressBar::hidden()).unwrap();
    assert_eq!(report.processed, 2);
}

#[test]
fn stop_flag_skips_remaining_images() {
    let dir = TempDir::new().unwrap();
    let root = dir.path();
    write_photo(root, "stamps/a.png");
    let mut ledger = Ledger::new("path");
    ledger.push_row("stamps/a.png").unwrap();

    let stop = AtomicBool::new(true);
    let report = run_contrast(
        &mut ledger,
        root,
        &ContrastConfig::default(),
        false,
        &stop,
        &ProgressBar::hidden(),
    )
    .unwrap();
    assert_eq!(report.processed, 0);
    assert_eq!(report.failed, 0);
    assert!(!root.join("bw-stamps/a.png").exists());
}
