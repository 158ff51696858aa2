#![cfg(feature = "cli")]

use approx::assert_relative_eq;
use assert_cmd::Command;
use predicates::prelude::*;
use std::path::{Path, PathBuf};
use tapatan_vision::aruco::{draw_marker, Dictionary};
use tapatan_vision::core::GrayImage;
use tapatan_vision::detect::from_core_gray;

fn dictionary_path() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("../../testdata/dict_6x6_sample.json")
}

fn cli() -> Command {
    Command::cargo_bin("tapatan-vision").expect("binary built")
}

/// 480x240 frame with markers 0 and 1 whose centers are 270 px apart.
fn write_board_png(path: &Path, with_markers: bool) {
    let dict = Dictionary::load_json(dictionary_path()).expect("dictionary");
    let mut img = GrayImage::filled(480, 240, 255);
    if with_markers {
        img.blit(&draw_marker(&dict, 0, 10, 1).expect("marker 0"), 60, 60);
        img.blit(&draw_marker(&dict, 1, 10, 1).expect("marker 1"), 330, 60);
    }
    from_core_gray(&img)
        .expect("convert")
        .save(path)
        .expect("save png");
}

fn write_setup(dir: &Path) -> PathBuf {
    let setup = dir.join("setup.json");
    let json = serde_json::json!({
        "dictionary_path": dictionary_path(),
        "calibration": { "distance_mm": 270.0 }
    });
    std::fs::write(&setup, json.to_string()).expect("write setup");
    setup
}

fn report_of(output: &std::process::Output) -> serde_json::Value {
    serde_json::from_slice(&output.stdout).expect("report json")
}

#[test]
fn calibrates_from_a_png_frame() {
    let dir = tempfile::tempdir().expect("tempdir");
    let frame = dir.path().join("board.png");
    write_board_png(&frame, true);
    let out_path = dir.path().join("report.json");

    let assert = cli()
        .arg("calibrate")
        .arg("--setup")
        .arg(write_setup(dir.path()))
        .arg("--out")
        .arg(&out_path)
        .arg(&frame)
        .assert()
        .success();

    let report = report_of(assert.get_output());
    assert_eq!(report["frames"][0]["calibrated"], true);
    assert_eq!(report["status"]["state"], "calibrated");
    let center = &report["board_positions_mm"]["4"];
    assert_relative_eq!(center[0].as_f64().expect("x"), 135.0, epsilon = 1e-6);
    assert_relative_eq!(center[1].as_f64().expect("y"), 135.0, epsilon = 1e-6);

    let saved = tapatan_vision::CalibrationReport::load_json(&out_path).expect("saved report");
    assert_eq!(saved.calibrated_frames(), 1);
    assert_eq!(saved.board_positions_mm.len(), 9);
}

#[test]
fn failed_frames_are_reported_and_fallback_holds() {
    let dir = tempfile::tempdir().expect("tempdir");
    let good = dir.path().join("good.png");
    let blank = dir.path().join("blank.png");
    write_board_png(&good, true);
    write_board_png(&blank, false);

    let assert = cli()
        .arg("calibrate")
        .arg("--setup")
        .arg(write_setup(dir.path()))
        .arg(&blank)
        .arg(&good)
        .arg(&blank)
        .arg(dir.path().join("missing.png"))
        .assert()
        .success();

    let report = report_of(assert.get_output());
    let frames = report["frames"].as_array().expect("frames");
    assert_eq!(frames.len(), 4);
    assert_eq!(frames[0]["calibrated"], false);
    assert_eq!(frames[0]["error_kind"], "detection");
    assert_eq!(frames[1]["calibrated"], true);
    assert_eq!(frames[2]["calibrated"], false);
    assert_eq!(frames[3]["calibrated"], false);
    assert!(frames[3].get("error_kind").is_none());

    assert_eq!(report["status"]["is_calibrated"], true);
    assert_eq!(report["status"]["is_stale"], true);
    assert_eq!(report["status"]["attempts"], 3);
    assert_eq!(report["board_positions_mm"].as_object().expect("positions").len(), 9);
}

#[test]
fn writes_overlays_for_calibrated_frames() {
    let dir = tempfile::tempdir().expect("tempdir");
    let good = dir.path().join("good.png");
    let blank = dir.path().join("blank.png");
    write_board_png(&good, true);
    write_board_png(&blank, false);
    let overlays = dir.path().join("overlays");
    std::fs::create_dir(&overlays).expect("overlay dir");

    cli()
        .arg("calibrate")
        .arg("--setup")
        .arg(write_setup(dir.path()))
        .arg("--overlay-dir")
        .arg(&overlays)
        .arg(&good)
        .arg(&blank)
        .assert()
        .success();

    assert!(!overlays.join("blank.overlay.png").exists());
    let img = image::open(overlays.join("good.overlay.png"))
        .expect("overlay png")
        .to_rgb8();
    assert_eq!(img.dimensions(), (480, 240));
    // marker 0 center, drawn green over the black marker
    assert_eq!(img.get_pixel(99, 99).0, [0, 255, 0]);
}

#[test]
fn exits_with_error_when_nothing_calibrates() {
    let dir = tempfile::tempdir().expect("tempdir");
    let blank = dir.path().join("blank.png");
    write_board_png(&blank, false);

    cli()
        .arg("calibrate")
        .arg("--setup")
        .arg(write_setup(dir.path()))
        .arg(&blank)
        .assert()
        .failure()
        .stderr(predicate::str::contains("no frame produced a calibration"));
}

#[test]
fn bad_setup_is_rejected() {
    let dir = tempfile::tempdir().expect("tempdir");
    let setup = dir.path().join("setup.json");
    let json = serde_json::json!({
        "dictionary_path": dictionary_path(),
        "calibration": { "distance_mm": 0.0 }
    });
    std::fs::write(&setup, json.to_string()).expect("write setup");
    let frame = dir.path().join("board.png");
    write_board_png(&frame, true);

    cli()
        .arg("calibrate")
        .arg("--setup")
        .arg(&setup)
        .arg(&frame)
        .assert()
        .failure()
        .stderr(predicate::str::contains("DistanceMm(0.0)"));
}

#[test]
fn renders_a_marker_sheet() {
    let dir = tempfile::tempdir().expect("tempdir");
    let out = dir.path().join("marker3.png");

    cli()
        .args(["render-marker", "--id", "3", "--cell-px", "10", "--quiet-px", "5"])
        .arg("--dictionary")
        .arg(dictionary_path())
        .arg("--out")
        .arg(&out)
        .assert()
        .success()
        .stdout(predicate::str::contains("wrote marker 3 (90x90 px)"));

    let img = image::open(&out).expect("png").to_luma8();
    assert_eq!(img.dimensions(), (90, 90));
    assert_eq!(img.get_pixel(0, 0).0[0], 255);
    assert_eq!(img.get_pixel(5, 5).0[0], 0);
}

#[test]
fn prints_dictionary_info() {
    cli()
        .arg("dictionary-info")
        .arg("--dictionary")
        .arg(dictionary_path())
        .assert()
        .success()
        .stdout(predicate::str::contains("name: DICT_6X6_SAMPLE"))
        .stdout(predicate::str::contains("markers: 8"))
        .stdout(predicate::str::contains("min distance: 12"));
}
