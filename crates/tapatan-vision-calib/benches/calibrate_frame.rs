use criterion::{black_box, criterion_group, criterion_main, Criterion};
use nalgebra::Point2;
use std::path::Path;
use tapatan_vision_aruco::{draw_marker, Dictionary};
use tapatan_vision_calib::{CalibrationConfig, CalibrationOrchestrator};
use tapatan_vision_core::{Frame, GrayImage};

fn sample_dictionary() -> Dictionary {
    let path = Path::new(env!("CARGO_MANIFEST_DIR")).join("../../testdata/dict_6x6_sample.json");
    Dictionary::load_json(path).expect("load sample dictionary")
}

fn vga_board(dict: &Dictionary) -> GrayImage {
    let mut img = GrayImage::filled(640, 480, 255);
    img.blit(&draw_marker(dict, 0, 10, 1).expect("marker 0"), 80, 120);
    img.blit(&draw_marker(dict, 1, 10, 1).expect("marker 1"), 350, 120);
    img
}

fn bench_calibrate(c: &mut Criterion) {
    let dict = sample_dictionary();
    let img = vga_board(&dict);
    let mut calib =
        CalibrationOrchestrator::new(CalibrationConfig::default(), dict).expect("orchestrator");

    c.bench_function("calibrate_vga_gray", |b| {
        b.iter(|| calib.calibrate(black_box(&Frame::from_gray_image(&img))))
    });

    let bgr: Vec<u8> = img.data.iter().flat_map(|&v| [v, v, v]).collect();
    c.bench_function("calibrate_vga_bgr", |b| {
        b.iter(|| calib.calibrate(black_box(&Frame::bgr(img.width, img.height, &bgr))))
    });

    c.bench_function("pixel_to_position", |b| {
        b.iter(|| calib.pixel_to_position(black_box(Point2::new(250.0, 260.0))))
    });
}

criterion_group!(benches, bench_calibrate);
criterion_main!(benches);
