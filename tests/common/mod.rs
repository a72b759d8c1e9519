#![allow(dead_code)]

use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

/// Fake `ffprobe`/`ffmpeg` executables installed into a temp bin directory
/// that tests prepend to PATH. The fake ffprobe answers the per-stream-kind
/// queries with canned JSON; the fake ffmpeg records its argument list to
/// `ffmpeg_log` and writes a dummy output file (or exits with
/// `$FAKE_FFMPEG_EXIT`). This keeps the suite independent of a real encoder.
pub struct FakeTools {
    pub bin_dir: PathBuf,
    pub ffmpeg_log: PathBuf,
}

impl FakeTools {
    /// One line per ffmpeg invocation, arguments space-joined.
    pub fn ffmpeg_invocations(&self) -> Vec<String> {
        fs::read_to_string(&self.ffmpeg_log)
            .unwrap_or_default()
            .lines()
            .map(str::to_string)
            .collect()
    }
}

pub fn stream_json(codec: &str) -> String {
    if codec.is_empty() {
        r#"{"streams":[]}"#.to_string()
    } else {
        format!(r#"{{"streams":[{{"codec_name":"{codec}"}}]}}"#)
    }
}

pub fn video_stream_json(codec: &str, width: u32, height: u32, pix_fmt: &str) -> String {
    if codec.is_empty() {
        r#"{"streams":[]}"#.to_string()
    } else {
        format!(
            r#"{{"streams":[{{"codec_name":"{codec}","width":{width},"height":{height},"pix_fmt":"{pix_fmt}"}}]}}"#
        )
    }
}

/// Install fakes answering with the given codec names (1080p yuv420p video).
pub fn install_fake_tools(tmp: &TempDir, video: &str, audio: &str, subtitle: &str) -> FakeTools {
    install_fake_tools_json(
        tmp,
        &video_stream_json(video, 1920, 1080, "yuv420p"),
        &stream_json(audio),
        &stream_json(subtitle),
    )
}

pub fn install_fake_tools_json(
    tmp: &TempDir,
    video_json: &str,
    audio_json: &str,
    subtitle_json: &str,
) -> FakeTools {
    let bin_dir = tmp.path().join("fakebin");
    fs::create_dir_all(&bin_dir).expect("create fake bin dir");
    let ffmpeg_log = tmp.path().join("ffmpeg-invocations.log");

    let ffprobe = format!(
        r#"#!/bin/sh
kind=""
prev=""
for a in "$@"; do
  if [ "$prev" = "-select_streams" ]; then kind="$a"; fi
  prev="$a"
done
case "$kind" in
  v:0) printf '%s' '{video_json}' ;;
  a:0) printf '%s' '{audio_json}' ;;
  s:0) printf '%s' '{subtitle_json}' ;;
  *) exit 1 ;;
esac
exit 0
"#
    );
    write_executable(&bin_dir.join("ffprobe"), &ffprobe);

    let ffmpeg = format!(
        r#"#!/bin/sh
printf '%s\n' "$*" >> "{log}"
if [ -n "$FAKE_FFMPEG_EXIT" ] && [ "$FAKE_FFMPEG_EXIT" != "0" ]; then
  exit "$FAKE_FFMPEG_EXIT"
fi
if [ -n "$FAKE_NVENC_FAIL" ]; then
  case "$*" in *h264_nvenc*) exit 1 ;; esac
fi
for a in "$@"; do out="$a"; done
printf 'fake encoder output\n' > "$out"
exit 0
"#,
        log = ffmpeg_log.display()
    );
    write_executable(&bin_dir.join("ffmpeg"), &ffmpeg);

    FakeTools { bin_dir, ffmpeg_log }
}

fn write_executable(path: &Path, contents: &str) {
    let mut file = File::create(path).expect("create fake tool");
    file.write_all(contents.as_bytes()).expect("write fake tool");
    drop(file);
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        fs::set_permissions(path, fs::Permissions::from_mode(0o755)).expect("chmod fake tool");
    }
}

/// A conform4 command wired to the fake tools and isolated from any ambient
/// configuration file.
pub fn conform4(tmp: &TempDir, tools: &FakeTools) -> Command {
    let path = format!(
        "{}:{}",
        tools.bin_dir.display(),
        std::env::var("PATH").unwrap_or_default()
    );
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("conform4"));
    cmd.env("PATH", path);
    cmd.env("HOME", tmp.path());
    cmd.env_remove("CONFORM4_CONFIG");
    cmd.env_remove("XDG_CONFIG_HOME");
    cmd.current_dir(tmp.path());
    cmd
}

pub fn make_input(tmp: &TempDir, name: &str) -> PathBuf {
    make_input_sized(tmp, name, 4096)
}

pub fn make_input_sized(tmp: &TempDir, name: &str, bytes: usize) -> PathBuf {
    let path = tmp.path().join(name);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("create input dir");
    }
    fs::write(&path, vec![0u8; bytes]).expect("write input file");
    path
}
