//! The --probe early exit: machine-readable codec report, no conversion.
#![cfg(unix)]

mod common;

use assert_cmd::prelude::*;
use common::{conform4, install_fake_tools, make_input};
use predicates::prelude::*;
use std::error::Error;
use tempfile::TempDir;

#[test]
fn probe_prints_codecs_as_json_and_exits() -> Result<(), Box<dyn Error>> {
    let tmp = TempDir::new()?;
    let tools = install_fake_tools(&tmp, "hevc", "dts", "subrip");
    let input = make_input(&tmp, "movie.mkv");

    conform4(&tmp, &tools)
        .arg(&input)
        .arg("--probe")
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""video_codec": "hevc""#))
        .stdout(predicate::str::contains(r#""audio_codec": "dts""#))
        .stdout(predicate::str::contains(r#""subtitle_codec": "subrip""#));

    assert!(tools.ffmpeg_invocations().is_empty(), "--probe never encodes");
    Ok(())
}

#[test]
fn probe_reports_missing_streams_as_empty_strings() -> Result<(), Box<dyn Error>> {
    let tmp = TempDir::new()?;
    let tools = install_fake_tools(&tmp, "h264", "", "");
    let input = make_input(&tmp, "movie.mp4");

    conform4(&tmp, &tools)
        .arg(&input)
        .arg("--probe")
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""audio_codec": """#));
    Ok(())
}

#[test]
fn probe_requires_an_input_file() -> Result<(), Box<dyn Error>> {
    let tmp = TempDir::new()?;
    let tools = install_fake_tools(&tmp, "h264", "aac", "");

    conform4(&tmp, &tools).arg("--probe").assert().failure();
    Ok(())
}
