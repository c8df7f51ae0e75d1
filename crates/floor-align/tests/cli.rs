use assert_cmd::Command;
use floor_align::AlignmentStore;
use predicates::prelude::*;
use std::fs;

fn floor_align() -> Command {
    let mut cmd = Command::cargo_bin("floor-align").expect("floor-align binary");
    cmd.env_remove("RUST_LOG");
    cmd
}

#[test]
fn set_then_show_lists_the_room() {
    let dir = tempfile::tempdir().expect("tempdir");
    let file = dir.path().join("Ground.json");

    floor_align()
        .arg("set")
        .arg(&file)
        .arg("Kitchen")
        .args(["--translation", "2,0,-1", "--yaw-deg", "-90"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Kitchen: translation (2.0000, 0.0000, -1.0000)"));

    floor_align()
        .arg("show")
        .arg(&file)
        .assert()
        .success()
        .stdout(predicate::str::contains("Kitchen").and(predicate::str::contains("-90.000")));
}

#[test]
fn show_json_is_parseable() {
    let dir = tempfile::tempdir().expect("tempdir");
    let file = dir.path().join("Ground.json");
    floor_align()
        .arg("set")
        .arg(&file)
        .arg("Hall")
        .args(["--translation", "1,0,3"])
        .assert()
        .success();

    let output = floor_align()
        .arg("show")
        .arg(&file)
        .arg("--json")
        .output()
        .expect("run");
    assert!(output.status.success());
    let summary: serde_json::Value = serde_json::from_slice(&output.stdout).expect("json");
    assert_eq!(summary["Hall"]["translation"][2].as_f64(), Some(3.0));
}

#[test]
fn nudge_applies_steps_in_order() {
    let dir = tempfile::tempdir().expect("tempdir");
    let file = dir.path().join("Ground.json");
    floor_align()
        .arg("set")
        .arg(&file)
        .arg("Office")
        .args(["--translation", "0,0,0"])
        .assert()
        .success();

    floor_align()
        .arg("nudge")
        .arg(&file)
        .arg("Office")
        .args(["plus-x", "plus-x", "minus-z", "ccw"])
        .args(["--translation-step", "0.25", "--rotation-step-deg", "90"])
        .assert()
        .success()
        .stdout(predicate::str::contains("(0.5000, 0.0000, -0.2500), yaw 90.000 deg"));

    let store = AlignmentStore::load(&file).expect("load");
    let t = store.get("Office").translation_vector();
    assert!((t.x - 0.5).abs() < 1e-12 && (t.z + 0.25).abs() < 1e-12);
}

#[test]
fn nudge_rejects_invalid_step() {
    let dir = tempfile::tempdir().expect("tempdir");
    let file = dir.path().join("Ground.json");
    floor_align()
        .arg("nudge")
        .arg(&file)
        .arg("Office")
        .arg("plus-x")
        .args(["--translation-step", "0"])
        .assert()
        .failure();
    assert!(!file.exists());
}

#[test]
fn rename_and_remove_edit_the_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    let file = dir.path().join("Ground.json");
    for room in ["Kitchen", "Bath"] {
        floor_align()
            .arg("set")
            .arg(&file)
            .arg(room)
            .args(["--translation", "1,0,1"])
            .assert()
            .success();
    }

    floor_align()
        .args(["rename"])
        .arg(&file)
        .args(["Kitchen", "Bath"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("already has an alignment entry"));

    floor_align()
        .args(["rename"])
        .arg(&file)
        .args(["Kitchen", "Galley"])
        .assert()
        .success();
    floor_align()
        .args(["remove"])
        .arg(&file)
        .arg("Bath")
        .assert()
        .success();

    let store = AlignmentStore::load(&file).expect("load");
    let rooms: Vec<&str> = store.rooms().collect();
    assert_eq!(rooms, vec!["Galley"]);
}

#[test]
fn place_prints_floor_frame_points() {
    let dir = tempfile::tempdir().expect("tempdir");
    let file = dir.path().join("Ground.json");
    floor_align()
        .arg("set")
        .arg(&file)
        .arg("Kitchen")
        .args(["--translation", "2,0,-1"])
        .assert()
        .success();

    let output = floor_align()
        .arg("place")
        .arg(&file)
        .arg("Kitchen")
        .args(["--point", "1,0,0", "--point", "-1,2,0.5"])
        .output()
        .expect("run");
    assert!(output.status.success());
    let placed: serde_json::Value = serde_json::from_slice(&output.stdout).expect("json");
    assert_eq!(placed["points"][0], serde_json::json!([3.0, 0.0, -1.0]));
    assert_eq!(placed["points"][1], serde_json::json!([1.0, 2.0, -0.5]));
}

#[test]
fn malformed_file_is_reported_and_kept() {
    let dir = tempfile::tempdir().expect("tempdir");
    let file = dir.path().join("Ground.json");
    fs::write(&file, r#"{"Kitchen": {"translation": [[1,0]]}}"#).expect("write");

    floor_align()
        .arg("nudge")
        .arg(&file)
        .arg("Kitchen")
        .arg("cw")
        .assert()
        .failure()
        .stderr(predicate::str::contains("cannot load alignment file"));
    assert_eq!(
        fs::read_to_string(&file).expect("read"),
        r#"{"Kitchen": {"translation": [[1,0]]}}"#
    );
}

#[test]
fn rename_to_same_name_keeps_the_file() {
    let dir = tempfile::tempdir().expect("tempdir");
    let file = dir.path().join("Ground.json");
    floor_align()
        .arg("set")
        .arg(&file)
        .arg("Kitchen")
        .args(["--translation", "1,0,1"])
        .assert()
        .success();
    let before = fs::read_to_string(&file).expect("read");

    floor_align()
        .args(["rename"])
        .arg(&file)
        .args(["Kitchen", "Kitchen"])
        .assert()
        .success();
    assert_eq!(fs::read_to_string(&file).expect("read"), before);
}
