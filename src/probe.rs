use anyhow::{Context, Result};
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::process::Command;

const FFPROBE: &str = "ffprobe";

/// First stream of each kind, mirroring ffprobe's `-select_streams` selectors.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum StreamKind {
    Video,
    Audio,
    Subtitle,
}

impl StreamKind {
    fn selector(self) -> &'static str {
        match self {
            StreamKind::Video => "v:0",
            StreamKind::Audio => "a:0",
            StreamKind::Subtitle => "s:0",
        }
    }
}

/// Codec identifiers (and video characteristics) probed from a single file.
/// Computed fresh each invocation; never cached. An empty codec string means
/// the stream does not exist or the probe produced no usable output.
#[derive(Clone, Debug, Default, Serialize)]
pub struct CodecProbe {
    pub video_codec: String,
    pub audio_codec: String,
    pub subtitle_codec: String,
    pub width: u32,
    pub height: u32,
    pub pix_fmt: String,
    pub color_transfer: String,
}

impl CodecProbe {
    /// 2160p-or-larger frame, or an HDR transfer function.
    pub fn is_4k_or_hdr(&self) -> bool {
        if self.width >= 3840 && self.height >= 2160 {
            return true;
        }
        matches!(self.color_transfer.as_str(), "smpte2084" | "arib-std-b67" | "pq")
    }

    /// 10-bit sources need a pixel-format downconversion before libx264/nvenc
    /// can emit a broadly playable 8-bit stream.
    pub fn is_high_bit_depth(&self) -> bool {
        self.pix_fmt.contains("10")
    }
}

#[derive(Debug, Default, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Default, Deserialize)]
struct FfprobeStream {
    codec_name: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
    pix_fmt: Option<String>,
    color_transfer: Option<String>,
}

/// Probe the first video, audio, and subtitle stream of `path`.
///
/// A non-zero ffprobe exit or unparsable output for one stream kind is
/// reported as an empty codec name, not an error; the policy treats that the
/// same as a missing stream. Failing to launch ffprobe at all is an error.
pub fn probe_file(path: &Path) -> Result<CodecProbe> {
    let mut probe = CodecProbe::default();

    if let Some(stream) = probe_stream(path, StreamKind::Video)? {
        probe.video_codec = stream.codec_name.unwrap_or_default();
        probe.width = stream.width.unwrap_or(0);
        probe.height = stream.height.unwrap_or(0);
        probe.pix_fmt = stream.pix_fmt.unwrap_or_default();
        probe.color_transfer = stream.color_transfer.unwrap_or_default();
    }
    if let Some(stream) = probe_stream(path, StreamKind::Audio)? {
        probe.audio_codec = stream.codec_name.unwrap_or_default();
    }
    if let Some(stream) = probe_stream(path, StreamKind::Subtitle)? {
        probe.subtitle_codec = stream.codec_name.unwrap_or_default();
    }

    debug!(
        "Probed '{}': video='{}' audio='{}' subtitle='{}' {}x{} pix_fmt='{}'",
        path.display(),
        probe.video_codec,
        probe.audio_codec,
        probe.subtitle_codec,
        probe.width,
        probe.height,
        probe.pix_fmt
    );
    Ok(probe)
}

fn probe_stream(path: &Path, kind: StreamKind) -> Result<Option<FfprobeStream>> {
    let output = Command::new(FFPROBE)
        .arg("-v")
        .arg("error")
        .arg("-select_streams")
        .arg(kind.selector())
        .arg("-show_entries")
        .arg("stream=codec_name,width,height,pix_fmt,color_transfer")
        .arg("-of")
        .arg("json")
        .arg(path)
        .output()
        .with_context(|| format!("Failed to launch {} for '{}'", FFPROBE, path.display()))?;

    if !output.status.success() {
        warn!(
            "ffprobe exited with {} for '{}' ({:?} stream); treating as absent",
            output.status,
            path.display(),
            kind
        );
        return Ok(None);
    }

    Ok(parse_probe_output(&output.stdout, path, kind))
}

fn parse_probe_output(stdout: &[u8], path: &Path, kind: StreamKind) -> Option<FfprobeStream> {
    match serde_json::from_slice::<FfprobeOutput>(stdout) {
        Ok(parsed) => parsed.streams.into_iter().next(),
        Err(err) => {
            warn!(
                "Unparsable ffprobe output for '{}' ({:?} stream): {}",
                path.display(),
                kind,
                err
            );
            None
        }
    }
}
