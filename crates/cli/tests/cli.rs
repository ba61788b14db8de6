//! The `beatsort` binary end to end: synth, sort, unshear, shift reuse and
//! the fatal exits.

use std::path::Path;
use std::process::{Command, Output};

use tempfile::tempdir;

fn beatsort(args: &[&str]) -> Output {
    Command::new(env!("CARGO_BIN_EXE_beatsort"))
        .args(args)
        .output()
        .unwrap()
}

fn arg(path: &Path) -> &str {
    path.to_str().unwrap()
}

#[track_caller]
fn assert_ok(out: &Output) {
    assert!(
        out.status.success(),
        "status {:?}\nstderr:\n{}",
        out.status,
        String::from_utf8_lossy(&out.stderr)
    );
}

#[track_caller]
fn assert_fatal(out: &Output) {
    assert!(!out.status.success(), "expected failure, got {:?}", out.status);
    #[cfg(unix)]
    assert_eq!(out.status.code(), Some(255));
}

fn write_synthetic(dir: &Path) -> std::path::PathBuf {
    let input = dir.join("heart.npy");
    assert_ok(&beatsort(&[
        "synth", "-o", arg(&input), "--rows", "16", "--cols", "8", "--frames", "12",
        "--shear", "0.5", "--seed", "3",
    ]));
    input
}

#[test]
fn sort_then_unshear_with_default_outputs_and_shift_reuse() {
    let dir = tempdir().unwrap();
    let input = write_synthetic(dir.path());
    assert!(dir.path().join("heart.provenance.json").exists());

    assert_ok(&beatsort(&["sort", "-i", arg(&input), "--solver", "exact", "-y", "2", "-x", "2"]));
    let sorted = dir.path().join("heart_sorted.npy");
    assert!(sorted.exists());
    assert!(dir.path().join("heart_sorted.provenance.json").exists());
    assert!(dir.path().join("sorting.log").exists());
    let problem = std::fs::read_to_string(dir.path().join("heart_tsp_file_edge_weight.txt")).unwrap();
    assert!(problem.contains("DIMENSION: 12\n"));
    let solution = std::fs::read_to_string(dir.path().join("heart_tsp_file_solution.txt")).unwrap();
    assert!(solution.starts_with("12\n"));

    assert_ok(&beatsort(&["unshear", "-i", arg(&sorted), "-y", "2", "-x", "1", "--shift-init", "1.0"]));
    let estimated = dir.path().join("heart_sorted_unsheared.npy");
    let shift_file = dir.path().join("heart_sorted_shift.txt");
    assert!(estimated.exists());
    assert!(dir.path().join("unshearing.log").exists());
    let shift: f64 = std::fs::read_to_string(&shift_file).unwrap().trim().parse().unwrap();
    assert!(shift.is_finite());

    let reused = dir.path().join("reused.npy");
    assert_ok(&beatsort(&[
        "unshear", "-i", arg(&sorted), "-o", arg(&reused), "--input-shift-file", arg(&shift_file),
    ]));
    assert_eq!(std::fs::read(&estimated).unwrap(), std::fs::read(&reused).unwrap());
    let sidecar = std::fs::read_to_string(dir.path().join("reused.provenance.json")).unwrap();
    assert!(sidecar.contains("\"estimated\": false"));
}

#[test]
fn missing_input_is_fatal() {
    let dir = tempdir().unwrap();
    let missing = dir.path().join("nothing_here.npy");
    assert_fatal(&beatsort(&["sort", "-i", arg(&missing), "--solver", "two-opt"]));
    assert_fatal(&beatsort(&["unshear", "-i", arg(&missing)]));
    assert!(!dir.path().join("nothing_here_sorted.npy").exists());
}

#[test]
fn missing_or_short_solution_file_is_fatal() {
    let dir = tempdir().unwrap();
    let input = write_synthetic(dir.path());

    let absent = dir.path().join("absent_solution.txt");
    assert_fatal(&beatsort(&["sort", "-i", arg(&input), "--tsp-file", arg(&absent)]));

    let short = dir.path().join("short_solution.txt");
    std::fs::write(&short, "3\n0 1 2\n").unwrap();
    let out = beatsort(&["sort", "-i", arg(&input), "--tsp-file", arg(&short)]);
    assert_fatal(&out);
    assert!(String::from_utf8_lossy(&out.stderr).contains('3'));
    assert!(!dir.path().join("heart_sorted.npy").exists());
    let log = std::fs::read_to_string(dir.path().join("sorting.log")).unwrap();
    assert!(log.contains("ERROR"));
}
