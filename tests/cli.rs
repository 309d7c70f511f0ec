//! Runs the `um` binary and checks exit codes and stream contents.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};
use um::{assemble, save_image};

fn um() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_um"));
    cmd.env_remove("RUST_LOG");
    cmd
}

fn temp_path(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!("um-cli-{}-{}", std::process::id(), name))
}

fn image(name: &str, source: &str) -> PathBuf {
    let path = temp_path(name);
    save_image(&path, &assemble(source).unwrap()).unwrap();
    path
}

fn run_with_input(path: &Path, input: &[u8]) -> Output {
    let mut child = um()
        .arg(path)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .unwrap();
    child.stdin.take().unwrap().write_all(input).unwrap();
    child.wait_with_output().unwrap()
}

#[test]
fn no_program_is_a_usage_error() {
    let output = um().output().unwrap();
    assert_eq!(output.status.code(), Some(2));
    assert!(output.stdout.is_empty());
}

#[test]
fn halting_program_exits_cleanly_with_raw_bytes() {
    let path = image("halt.um", "lv r1, 25\nlv r2, 17\nadd r3, r1, r2\nout r3\nlv r1, 200\nout r1\nhalt");
    let output = run_with_input(&path, b"");
    let _ = std::fs::remove_file(&path);

    assert_eq!(output.status.code(), Some(0));
    assert_eq!(output.stdout, vec![42, 200]);
}

#[test]
fn input_comes_from_stdin() {
    let path = image("echo.um", "in r1\nout r1\nin r1\nout r1\nin r2\nhalt");
    let output = run_with_input(&path, b"ok");
    let _ = std::fs::remove_file(&path);

    assert_eq!(output.status.code(), Some(0));
    assert_eq!(output.stdout, b"ok");
}

#[test]
fn fault_exits_1_after_flushing_output() {
    let path = image("fault.um", "lv r1, 'A'\nout r1\nlv r1, 300\nout r1\nhalt");
    let output = run_with_input(&path, b"");
    let _ = std::fs::remove_file(&path);

    assert_eq!(output.status.code(), Some(1));
    assert_eq!(output.stdout, b"A");
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("error: invalid output"), "stderr: {}", stderr);
}

#[test]
fn truncated_image_exits_1() {
    let path = temp_path("short.um");
    std::fs::write(&path, [0x70, 0, 0, 0, 0xD2]).unwrap();
    let output = run_with_input(&path, b"");
    let _ = std::fs::remove_file(&path);

    assert_eq!(output.status.code(), Some(1));
    assert!(output.stdout.is_empty());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("error: image is 5 bytes long"), "stderr: {}", stderr);
}

#[test]
fn missing_image_exits_1() {
    let output = um().arg(temp_path("absent.um")).output().unwrap();
    assert_eq!(output.status.code(), Some(1));
    assert!(String::from_utf8_lossy(&output.stderr).contains("error:"));
}

#[test]
fn self_test_passes() {
    let output = um().arg("self-test").output().unwrap();
    assert_eq!(output.status.code(), Some(0));
    assert!(String::from_utf8_lossy(&output.stdout).contains(" 0 failed"));
}
