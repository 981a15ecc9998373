//! Integration tests for the `booth run` command.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::io::Write;
use std::path::Path;
use tempfile::TempDir;
use zip::write::SimpleFileOptions;
use zip::ZipWriter;

/// `booth` isolated from the user's global and local configuration.
fn booth(temp_dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("booth").unwrap();
    cmd.current_dir(temp_dir.path())
        .env("HOME", temp_dir.path())
        .env("BOOTH_SCRATCH_ROOT", temp_dir.path().join("scratch"))
        .env_remove("BOOTH_TRAINER_PROGRAM")
        .env_remove("BOOTH_PREDICTOR_PROGRAM");
    cmd
}

fn write_instance_zip(path: &Path) {
    let mut zip = ZipWriter::new(fs::File::create(path).unwrap());
    zip.start_file("photos/dog.png", SimpleFileOptions::default()).unwrap();
    zip.write_all(b"png").unwrap();
    zip.finish().unwrap();
}

#[test]
fn test_run_missing_job_file() {
    let temp_dir = TempDir::new().unwrap();
    booth(&temp_dir)
        .arg("run")
        .arg("missing.json")
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to read job file"));
}

#[test]
fn test_run_reports_input_stage_on_stdout() {
    let temp_dir = TempDir::new().unwrap();
    booth(&temp_dir)
        .arg("run")
        .arg("-")
        .write_stdin(r#"{"id": "job-1", "input": {"infer": {"prompt": "photo of sks dog"}}}"#)
        .assert()
        .failure()
        .stdout(predicate::str::contains(r#""stage": "input""#))
        .stderr(predicate::str::contains("job failed in input stage"));
}

#[test]
fn test_run_rejects_non_json() {
    let temp_dir = TempDir::new().unwrap();
    booth(&temp_dir)
        .arg("run")
        .arg("-")
        .write_stdin("not json")
        .assert()
        .failure()
        .stderr(predicate::str::contains("not a valid JSON envelope"));
}

#[cfg(unix)]
#[test]
fn test_run_training_job_with_script_trainer() {
    let temp_dir = TempDir::new().unwrap();
    let archive = temp_dir.path().join("instance.zip");
    write_instance_zip(&archive);

    let config = temp_dir.path().join("booth.toml");
    fs::write(
        &config,
        r#"
[trainer]
program = "sh"
args = ["-c", '''test -f "$1" && mkdir -p checkpoints/400 && echo weights > checkpoints/400/model.bin && echo '{"samples": []}' > "$3"''']

[diagnostics]
command = []
"#,
    )
    .unwrap();

    let job = temp_dir.path().join("job.json");
    fs::write(
        &job,
        serde_json::json!({
            "id": "train-cli",
            "input": {
                "instance_prompt": "photo of sks dog",
                "class_prompt": "photo of a dog",
                "instance_data": archive,
                "max_train_steps": 400
            }
        })
        .to_string(),
    )
    .unwrap();

    booth(&temp_dir)
        .arg("--config")
        .arg(&config)
        .arg("run")
        .arg(&job)
        .assert()
        .success()
        .stdout(predicate::str::contains("output.zip"))
        .stdout(predicate::str::contains(r#""samples": []"#));

    let job_dir = temp_dir.path().join("scratch/train-cli");
    assert!(job_dir.join("output.zip").is_file());
    assert!(job_dir.join("training_config.json").is_file());
    assert!(!job_dir.join("instance_data").exists());
}
