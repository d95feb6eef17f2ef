//! End-to-end runs of the `bragg` binary

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::tempdir;

use bragg_completeness::MeasuredSet;
use bragg_core::{Hkl, SpaceGroup, UnitCell};

fn write_measured(path: &std::path::Path) {
    let cell = UnitCell::orthorhombic(10.0, 12.0, 14.0).unwrap();
    let indices = vec![
        Hkl::new(1, 0, 0),
        Hkl::new(0, 1, 0),
        Hkl::new(0, 0, 1),
        Hkl::new(1, 1, 0),
        Hkl::new(1, 0, 1),
        Hkl::new(0, 1, 1),
        Hkl::new(1, 1, 1),
        Hkl::new(2, 1, 0),
    ];
    MeasuredSet::new(cell, SpaceGroup::p222(), indices)
        .to_json_file(path)
        .unwrap();
}

#[test]
fn completeness_writes_a_versioned_summary() {
    let dir = tempdir().unwrap();
    let measured = dir.path().join("measured.json");
    let summary = dir.path().join("summary.json");
    write_measured(&measured);

    Command::cargo_bin("bragg")
        .unwrap()
        .arg("completeness")
        .arg(&measured)
        .arg("--summary-out")
        .arg(&summary)
        .assert()
        .success();

    let text = std::fs::read_to_string(&summary).unwrap();
    assert!(text.contains("\"schema_version\": 1"));
    assert!(text.contains("\"symmetry_level\""));
}

#[test]
fn simulate_writes_one_summary_per_trial() {
    let dir = tempdir().unwrap();
    let measured = dir.path().join("measured.json");
    let out_dir = dir.path().join("trials");
    write_measured(&measured);

    Command::cargo_bin("bragg")
        .unwrap()
        .arg("simulate")
        .arg(&measured)
        .arg("--strategy")
        .arg("range")
        .arg("--coord")
        .arg("theta")
        .arg("--fraction")
        .arg("0.3")
        .arg("--repeats")
        .arg("2")
        .arg("--out-dir")
        .arg(&out_dir)
        .assert()
        .success();

    assert!(out_dir.join("summary_0.json").is_file());
    assert!(out_dir.join("summary_1.json").is_file());
}

#[test]
fn aggregate_joins_the_surviving_summaries() {
    let dir = tempdir().unwrap();
    let measured = dir.path().join("measured.json");
    let summary = dir.path().join("summary.json");
    write_measured(&measured);

    Command::cargo_bin("bragg")
        .unwrap()
        .arg("completeness")
        .arg(&measured)
        .arg("--summary-out")
        .arg(&summary)
        .assert()
        .success();

    Command::cargo_bin("bragg")
        .unwrap()
        .arg("aggregate")
        .arg("summaries")
        .arg(&summary)
        .arg(dir.path().join("never_written.json"))
        .assert()
        .success()
        .stdout(predicate::str::contains("schema_version"));
}

#[test]
fn aggregate_with_nothing_loadable_fails() {
    let dir = tempdir().unwrap();
    Command::cargo_bin("bragg")
        .unwrap()
        .arg("aggregate")
        .arg("summaries")
        .arg(dir.path().join("absent.json"))
        .assert()
        .failure()
        .stderr(predicate::str::contains("no completeness summaries"));
}
