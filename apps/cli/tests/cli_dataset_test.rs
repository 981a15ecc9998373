//! Integration tests for `booth extract` and `booth package`.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::io::Write;
use tempfile::TempDir;
use zip::write::SimpleFileOptions;
use zip::{ZipArchive, ZipWriter};

fn booth(temp_dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("booth").unwrap();
    cmd.current_dir(temp_dir.path()).env("HOME", temp_dir.path());
    cmd
}

#[test]
fn test_extract_keeps_only_images() {
    let temp_dir = TempDir::new().unwrap();
    let archive = temp_dir.path().join("data.zip");
    let mut zip = ZipWriter::new(fs::File::create(&archive).unwrap());
    for (name, data) in [
        ("set/a.png", "a"),
        ("set/b.jpeg", "b"),
        ("set/readme.txt", "c"),
        ("__MACOSX/set/._a.png", "d"),
    ] {
        zip.start_file(name, SimpleFileOptions::default()).unwrap();
        zip.write_all(data.as_bytes()).unwrap();
    }
    zip.finish().unwrap();

    booth(&temp_dir)
        .arg("extract")
        .arg(&archive)
        .arg("out")
        .arg("--json")
        .assert()
        .success()
        .stdout(predicate::str::contains("a.png"))
        .stdout(predicate::str::contains("readme.txt").not());

    let mut names: Vec<String> = fs::read_dir(temp_dir.path().join("out"))
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
        .collect();
    names.sort();
    assert_eq!(names, vec!["a.png", "b.jpeg"]);
}

#[test]
fn test_extract_rejects_non_zip() {
    let temp_dir = TempDir::new().unwrap();
    fs::write(temp_dir.path().join("data.zip"), "not a zip").unwrap();

    booth(&temp_dir)
        .arg("extract")
        .arg("data.zip")
        .arg("out")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to extract"));
}

#[test]
fn test_package_writes_relative_entries() {
    let temp_dir = TempDir::new().unwrap();
    let checkpoints = temp_dir.path().join("checkpoints");
    fs::create_dir_all(checkpoints.join("800/unet")).unwrap();
    fs::write(checkpoints.join("800/unet/model.bin"), "weights").unwrap();

    booth(&temp_dir)
        .arg("package")
        .arg("checkpoints")
        .arg("output.zip")
        .assert()
        .success()
        .stdout(predicate::str::contains("sha256"));

    let archive = ZipArchive::new(fs::File::open(temp_dir.path().join("output.zip")).unwrap()).unwrap();
    let mut names: Vec<&str> = archive.file_names().collect();
    names.sort_unstable();
    assert_eq!(names, vec!["800/", "800/unet/", "800/unet/model.bin"]);
}

#[test]
fn test_package_rejects_output_inside_directory() {
    let temp_dir = TempDir::new().unwrap();
    fs::create_dir_all(temp_dir.path().join("checkpoints")).unwrap();

    booth(&temp_dir)
        .arg("package")
        .arg("checkpoints")
        .arg("checkpoints/output.zip")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to package"));
}
