//! Skip-log persistence and short-circuiting across runs.
#![cfg(unix)]

mod common;

use assert_cmd::prelude::*;
use common::{conform4, install_fake_tools, make_input};
use std::error::Error;
use std::fs;
use tempfile::TempDir;

#[test]
fn successful_conversion_records_source_and_output_basenames() -> Result<(), Box<dyn Error>> {
    let tmp = TempDir::new()?;
    let tools = install_fake_tools(&tmp, "mpeg4", "mp3", "");
    let input = make_input(&tmp, "movie.mkv");
    let log = tmp.path().join("converted.log");

    conform4(&tmp, &tools)
        .arg(&input)
        .arg("--log-file")
        .arg(&log)
        .assert()
        .success();

    let contents = fs::read_to_string(&log)?;
    assert_eq!(contents, "[DONE]-movie.mkv\n[DONE]-movie.mp4\n");
    Ok(())
}

#[test]
fn surviving_source_is_not_reconverted_on_the_next_run() -> Result<(), Box<dyn Error>> {
    let tmp = TempDir::new()?;
    let tools = install_fake_tools(&tmp, "mpeg4", "mp3", "");
    let root = tmp.path().join("library");
    make_input(&tmp, "library/movie.mkv");
    let log = tmp.path().join("converted.log");

    conform4(&tmp, &tools)
        .arg("--root")
        .arg(&root)
        .arg("--log-file")
        .arg(&log)
        .assert()
        .success();
    let invocations_after_first = tools.ffmpeg_invocations().len();
    assert!(root.join("movie.mkv").exists(), "deletion is off by default");
    let output = root.join("movie.mp4");
    let converted = fs::read_to_string(&output)?;

    // The second batch rediscovers both the source and the output; neither
    // may be encoded again.
    conform4(&tmp, &tools)
        .arg("--root")
        .arg(&root)
        .arg("--log-file")
        .arg(&log)
        .assert()
        .success();

    assert_eq!(
        tools.ffmpeg_invocations().len(),
        invocations_after_first,
        "already-converted source must not be re-encoded"
    );
    assert_eq!(fs::read_to_string(&output)?, converted);
    Ok(())
}

#[test]
fn already_conforming_file_is_recorded_too() -> Result<(), Box<dyn Error>> {
    let tmp = TempDir::new()?;
    let tools = install_fake_tools(&tmp, "h264", "aac", "");
    let input = make_input(&tmp, "movie.mp4");
    let log = tmp.path().join("converted.log");

    conform4(&tmp, &tools)
        .arg(&input)
        .arg("--log-file")
        .arg(&log)
        .assert()
        .success();

    assert_eq!(fs::read_to_string(&log)?, "[DONE]-movie.mp4\n");
    Ok(())
}

#[test]
fn logged_basename_short_circuits_the_next_run() -> Result<(), Box<dyn Error>> {
    let tmp = TempDir::new()?;
    let tools = install_fake_tools(&tmp, "mpeg4", "mp3", "");
    let input = make_input(&tmp, "movie.mkv");
    let log = tmp.path().join("converted.log");
    fs::write(&log, "[DONE]-movie.mkv\n")?;

    conform4(&tmp, &tools)
        .arg(&input)
        .arg("--log-file")
        .arg(&log)
        .assert()
        .success();

    assert!(
        tools.ffmpeg_invocations().is_empty(),
        "logged file must not be re-converted"
    );
    assert_eq!(
        fs::read_to_string(&log)?,
        "[DONE]-movie.mkv\n",
        "log must not grow on a short-circuited run"
    );
    Ok(())
}

#[test]
fn second_run_on_converted_output_performs_no_writes() -> Result<(), Box<dyn Error>> {
    let tmp = TempDir::new()?;
    let tools = install_fake_tools(&tmp, "mpeg4", "mp3", "");
    let input = make_input(&tmp, "movie.mkv");
    let log = tmp.path().join("converted.log");

    conform4(&tmp, &tools)
        .arg(&input)
        .arg("--log-file")
        .arg(&log)
        .assert()
        .success();
    let log_after_first = fs::read_to_string(&log)?;
    let invocations_after_first = tools.ffmpeg_invocations().len();

    // The canonical output now exists and is recorded; a second batch over
    // the same name must do nothing.
    let output = tmp.path().join("movie.mp4");
    conform4(&tmp, &tools)
        .arg(&output)
        .arg("--log-file")
        .arg(&log)
        .assert()
        .success();

    assert_eq!(tools.ffmpeg_invocations().len(), invocations_after_first);
    assert_eq!(fs::read_to_string(&log)?, log_after_first);
    Ok(())
}
