//! Integration tests for the nandpatch CLI
//!
//! Drives the built binary against sparse full-size images and small
//! custom layouts.

use std::fs::{self, File};
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

const EXPECTED_SIZE: u64 = 138_412_032;
const BLOCK_SIZE: usize = 135_168;

fn nandpatch() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_nandpatch"));
    cmd.env_remove("NANDPATCH_RESOURCES").env_remove("NANDPATCH_LOG");
    cmd
}

/// Temp dir holding an input image of `len` zero bytes and MR33 payloads
fn workspace(len: u64) -> (TempDir, PathBuf) {
    let dir = TempDir::new().expect("Failed to create temp dir");
    let input = dir.path().join("nand.bin");
    File::create(&input)
        .and_then(|f| f.set_len(len))
        .expect("Failed to create input image");
    fs::write(dir.path().join("ubootmr332012.bin"), [0xAA; 10]).unwrap();
    fs::write(dir.path().join("ubimr33.bin"), [0xBB; 10]).unwrap();
    fs::write(dir.path().join("art_repaired.bin"), [0xCC; 10]).unwrap();
    (dir, input)
}

fn run_patch(dir: &Path, input: &Path, output: &Path, extra: &[&str]) -> Output {
    nandpatch()
        .arg(input)
        .arg(output)
        .arg("--resources")
        .arg(dir)
        .args(extra)
        .output()
        .expect("Failed to run nandpatch")
}

fn stderr(output: &Output) -> String {
    String::from_utf8_lossy(&output.stderr).into_owned()
}

fn stdout(output: &Output) -> String {
    String::from_utf8_lossy(&output.stdout).into_owned()
}

#[test]
fn test_cli_help() {
    let output = nandpatch().arg("--help").output().unwrap();

    assert!(output.status.success());
    let text = stdout(&output);
    assert!(text.contains("MR33"));
    assert!(text.contains("--art"));
    assert!(text.contains("--dry-run"));
}

#[test]
fn test_cli_version() {
    let output = nandpatch().arg("--version").output().unwrap();

    assert!(output.status.success());
    assert!(stdout(&output).contains("nandpatch"));
}

#[test]
fn test_wrong_argument_count() {
    for args in [&[][..], &["only-one.bin"][..], &["a.bin", "b.bin", "c.bin"][..]] {
        let output = nandpatch().args(args).output().unwrap();
        assert_eq!(output.status.code(), Some(1), "args: {args:?}");
        assert!(stderr(&output).contains("Usage"));
    }
}

#[test]
fn test_missing_input() {
    let dir = TempDir::new().unwrap();
    let output = run_patch(
        dir.path(),
        &dir.path().join("missing.bin"),
        &dir.path().join("out.bin"),
        &[],
    );

    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("Source image missing"));
}

#[test]
fn test_empty_input_path() {
    let dir = TempDir::new().unwrap();
    let output = run_patch(dir.path(), Path::new(""), &dir.path().join("out.bin"), &[]);

    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("Source image missing"));
}

#[test]
fn test_empty_output_path() {
    let (dir, input) = workspace(EXPECTED_SIZE);
    let output = run_patch(dir.path(), &input, Path::new(""), &[]);

    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("Target image not provided"));
}

#[test]
fn test_source_equals_target() {
    let (dir, input) = workspace(EXPECTED_SIZE);
    let output = run_patch(dir.path(), &input, &input, &[]);

    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("Source equals target"));
}

#[test]
fn test_one_byte_short() {
    let (dir, input) = workspace(EXPECTED_SIZE - 1);
    let out = dir.path().join("out.bin");
    let output = run_patch(dir.path(), &input, &out, &[]);

    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("invalid size"));
    assert!(!out.exists());
}

#[test]
fn test_patch_default_plan() {
    let (dir, input) = workspace(EXPECTED_SIZE);
    let out = dir.path().join("out.bin");
    let output = run_patch(dir.path(), &input, &out, &["--verify"]);

    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert!(stdout(&output).contains("Patching completed successfully"));
    assert!(stdout(&output).contains("Verified"));

    let data = fs::read(&out).unwrap();
    assert_eq!(data.len() as u64, EXPECTED_SIZE);
    assert!(data[7_569_408..7_569_418].iter().all(|&b| b == 0xAA));
    assert!(data[12_976_128..12_976_138].iter().all(|&b| b == 0xBB));
    assert_eq!(data.iter().filter(|&&b| b != 0).count(), 20);

    // Input untouched
    assert_eq!(fs::metadata(&input).unwrap().len(), EXPECTED_SIZE);
}

#[test]
fn test_patch_with_art() {
    let (dir, input) = workspace(EXPECTED_SIZE);
    let out = dir.path().join("out.bin");
    let output = run_patch(dir.path(), &input, &out, &["--art"]);

    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let data = fs::read(&out).unwrap();
    let art = 88 * BLOCK_SIZE;
    assert!(data[art..art + 10].iter().all(|&b| b == 0xCC));
    assert_eq!(data.iter().filter(|&&b| b != 0).count(), 30);
}

#[test]
fn test_second_run_refuses_overwrite() {
    let (dir, input) = workspace(EXPECTED_SIZE);
    let out = dir.path().join("out.bin");

    let first = run_patch(dir.path(), &input, &out, &[]);
    assert!(first.status.success(), "stderr: {}", stderr(&first));

    let second = run_patch(dir.path(), &input, &out, &[]);
    assert_eq!(second.status.code(), Some(1));
    assert!(stderr(&second).contains("already exists"));
}

#[test]
fn test_missing_payload_leaves_no_output() {
    let (dir, input) = workspace(EXPECTED_SIZE);
    fs::remove_file(dir.path().join("ubimr33.bin")).unwrap();
    let out = dir.path().join("out.bin");
    let output = run_patch(dir.path(), &input, &out, &[]);

    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("ubimr33.bin"));
    assert!(!out.exists());
}

#[test]
fn test_dry_run_writes_nothing() {
    let (dir, input) = workspace(EXPECTED_SIZE);
    let out = dir.path().join("out.bin");
    let output = run_patch(dir.path(), &input, &out, &["--dry-run", "--art"]);

    assert!(output.status.success(), "stderr: {}", stderr(&output));
    let text = stdout(&output);
    assert!(text.contains("Dry run"));
    assert!(text.contains("calibration"));
    assert!(!out.exists());
}

#[test]
fn test_custom_layout() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("small.bin");
    fs::write(&input, [0x11u8; 512]).unwrap();
    fs::write(dir.path().join("boot.bin"), [0x22u8; 8]).unwrap();

    let layout = dir.path().join("layout.json");
    fs::write(
        &layout,
        r#"{
            "name": "test-board",
            "block_size": 64,
            "expected_size": 512,
            "slots": [{ "name": "boot", "file": "boot.bin", "block": 3 }]
        }"#,
    )
    .unwrap();

    let out = dir.path().join("out.bin");
    let output = run_patch(
        dir.path(),
        &input,
        &out,
        &["--layout", layout.to_str().unwrap(), "--in-place"],
    );

    assert!(output.status.success(), "stderr: {}", stderr(&output));
    assert!(stdout(&output).contains("test-board"));
    assert!(stdout(&output).contains("in-place"));
    assert!(stdout(&output).contains("Payload dir"));

    let data = fs::read(&out).unwrap();
    assert_eq!(data.len(), 512);
    assert_eq!(&data[192..200], &[0x22u8; 8]);
    assert!(data[..192].iter().all(|&b| b == 0x11));
    assert!(data[200..].iter().all(|&b| b == 0x11));
}

#[test]
fn test_invalid_layout() {
    let dir = TempDir::new().unwrap();
    let input = dir.path().join("small.bin");
    fs::write(&input, [0u8; 16]).unwrap();
    let layout = dir.path().join("layout.json");
    fs::write(&layout, r#"{ "name": "bad", "block_size": 0, "expected_size": 16, "slots": [] }"#)
        .unwrap();

    let output = run_patch(
        dir.path(),
        &input,
        &dir.path().join("out.bin"),
        &["--layout", layout.to_str().unwrap()],
    );

    assert_eq!(output.status.code(), Some(1));
    assert!(stderr(&output).contains("Failed to load layout"));
}
