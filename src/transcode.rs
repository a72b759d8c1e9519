use crate::policy::{self, PolicyOptions, TranscodeAction, TARGET_EXTENSION};
use crate::probe::{self, CodecProbe};
use crate::skiplog::SkipLog;
use anyhow::{anyhow, Context, Result};
use clap::ValueEnum;
use log::{debug, info, warn};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;

const FFMPEG: &str = "ffmpeg";

/// Marker inserted between the stem and the target extension while the
/// external encoder is still writing.
const CONVERTING_MARKER: &str = "converting";

/// Subtitle codecs that can be converted to a standalone SubRip file.
const TEXT_SUBTITLE_CODECS: &[&str] = &["subrip", "ass", "ssa", "mov_text", "webvtt"];

/// Bitmap subtitle codecs; these cannot become SubRip, so they are
/// stream-copied into a `.sup` sidecar instead.
const BITMAP_SUBTITLE_CODECS: &[&str] = &["hdmv_pgs_subtitle", "dvd_subtitle"];

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HwAccel {
    /// Try the NVENC H.264 encoder first, falling back to libx264.
    Auto,
    /// Software encoding only.
    None,
}

/// Options for the full re-encode path. Stream-copy actions ignore these.
#[derive(Clone, Debug, Deserialize)]
pub struct EncoderSettings {
    pub preset: String,
    pub crf: u32,
    pub audio_bitrate: String,
    pub gop_size: Option<u32>,
    pub max_b_frames: Option<u32>,
    pub threads: Option<u32>,
}

impl Default for EncoderSettings {
    fn default() -> Self {
        Self {
            preset: "medium".to_string(),
            crf: 18,
            audio_bitrate: "192k".to_string(),
            gop_size: None,
            max_b_frames: None,
            threads: None,
        }
    }
}

/// External-tool failure carrying the tool's own exit code so the process
/// can exit with it.
#[derive(Debug)]
pub struct TranscodeFailure {
    pub tool: String,
    pub code: i32,
    pub path: PathBuf,
}

impl std::fmt::Display for TranscodeFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} exited with code {} while processing '{}'",
            self.tool,
            self.code,
            self.path.display()
        )
    }
}

impl std::error::Error for TranscodeFailure {}

/// One resolved unit of external work: a classified input plus the temporary
/// path the encoder writes to.
#[derive(Clone, Debug)]
pub struct TranscodePlan {
    pub action: TranscodeAction,
    pub input: PathBuf,
    pub temp_output: PathBuf,
    /// `-vf` filter chain, e.g. yadif and/or a 10-bit downconversion.
    pub video_filters: Vec<String>,
    pub use_hw_encoder: bool,
}

/// How a subtitle stream leaves the container before being stripped.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum SubtitleSidecar {
    /// Text codec, converted to SubRip.
    Text,
    /// Bitmap codec (PGS, DVD subs), stream-copied as-is.
    Bitmap,
}

impl SubtitleSidecar {
    fn extension(self) -> &'static str {
        match self {
            SubtitleSidecar::Text => "srt",
            SubtitleSidecar::Bitmap => "sup",
        }
    }

    fn codec_arg(self) -> &'static str {
        match self {
            SubtitleSidecar::Text => "srt",
            SubtitleSidecar::Bitmap => "copy",
        }
    }
}

/// The external encoder, modeled as a capability so tests can substitute a
/// fake. Implementations must be callable from batch worker threads.
pub trait Transcoder: Send + Sync {
    /// Produce `plan.temp_output`. On failure the partial output is left in
    /// place for diagnosis.
    fn execute(&self, plan: &TranscodePlan) -> Result<()>;

    /// Extract the first subtitle stream of `input` to `output`, converting
    /// or stream-copying per `sidecar`.
    fn extract_subtitles(&self, input: &Path, output: &Path, sidecar: SubtitleSidecar)
        -> Result<()>;
}

pub struct FfmpegTranscoder {
    settings: EncoderSettings,
}

impl FfmpegTranscoder {
    pub fn new(settings: EncoderSettings) -> Self {
        Self { settings }
    }

    fn run_ffmpeg(&self, args: &[String], input: &Path) -> Result<()> {
        debug!("Running ffmpeg {}", args.join(" "));
        let status = Command::new(FFMPEG)
            .args(args)
            .status()
            .with_context(|| format!("Failed to launch {} for '{}'", FFMPEG, input.display()))?;
        if status.success() {
            return Ok(());
        }
        Err(anyhow!(TranscodeFailure {
            tool: FFMPEG.to_string(),
            code: status.code().unwrap_or(1),
            path: input.to_path_buf(),
        }))
    }
}

impl Transcoder for FfmpegTranscoder {
    fn execute(&self, plan: &TranscodePlan) -> Result<()> {
        match plan.action {
            TranscodeAction::Skip => Ok(()),
            TranscodeAction::StripSubtitlesOnly | TranscodeAction::ReencodeAudioOnly => {
                self.run_ffmpeg(&build_args(plan, &self.settings, false), &plan.input)
            }
            TranscodeAction::FullReencode => {
                if plan.use_hw_encoder {
                    match self.run_ffmpeg(&build_args(plan, &self.settings, true), &plan.input) {
                        Ok(()) => return Ok(()),
                        Err(err) => {
                            warn!(
                                "Hardware encode failed for '{}' ({}); retrying with libx264",
                                plan.input.display(),
                                err
                            );
                            // The software attempt needs a clean slate.
                            remove_if_exists(&plan.temp_output);
                        }
                    }
                }
                self.run_ffmpeg(&build_args(plan, &self.settings, false), &plan.input)
            }
        }
    }

    fn extract_subtitles(
        &self,
        input: &Path,
        output: &Path,
        sidecar: SubtitleSidecar,
    ) -> Result<()> {
        let args = subtitle_extract_args(input, output, sidecar);
        self.run_ffmpeg(&args, input)
    }
}

/// Build the full ffmpeg argument list for a plan. Kept free of process
/// handling so the exact command shapes stay unit-testable.
fn build_args(plan: &TranscodePlan, settings: &EncoderSettings, hw: bool) -> Vec<String> {
    let mut args: Vec<String> = vec![
        "-hide_banner".into(),
        "-nostdin".into(),
        "-loglevel".into(),
        "error".into(),
        "-y".into(),
        "-i".into(),
        plan.input.to_string_lossy().into_owned(),
    ];

    match plan.action {
        TranscodeAction::Skip => {}
        TranscodeAction::StripSubtitlesOnly => {
            args.extend(str_args(&[
                "-map", "0:v:0", "-map", "0:a:0", "-c:v", "copy", "-c:a", "copy",
                // Re-packaging ADTS AAC into MP4 needs the header rewrite.
                "-bsf:a", "aac_adtstoasc",
            ]));
        }
        TranscodeAction::ReencodeAudioOnly => {
            args.extend(str_args(&["-map", "0:v:0", "-map", "0:a:0?", "-c:v", "copy"]));
            push_aac_audio(&mut args, settings);
        }
        TranscodeAction::FullReencode => {
            args.extend(str_args(&["-map", "0:v:0", "-map", "0:a:0?"]));
            if !plan.video_filters.is_empty() {
                args.push("-vf".into());
                args.push(plan.video_filters.join(","));
            }
            args.push("-c:v".into());
            args.push(if hw { "h264_nvenc" } else { "libx264" }.into());
            if hw {
                args.extend(str_args(&["-preset", "p5", "-cq"]));
                args.push(settings.crf.to_string());
            } else {
                args.push("-preset".into());
                args.push(settings.preset.clone());
                args.push("-crf".into());
                args.push(settings.crf.to_string());
            }
            args.extend(str_args(&["-pix_fmt", "yuv420p"]));
            if let Some(gop) = settings.gop_size {
                args.push("-g".into());
                args.push(gop.to_string());
            }
            if let Some(bf) = settings.max_b_frames {
                args.push("-bf".into());
                args.push(bf.to_string());
            }
            if let Some(threads) = settings.threads {
                args.push("-threads".into());
                args.push(threads.to_string());
            }
            push_aac_audio(&mut args, settings);
        }
    }

    // Every action drops subtitles and lands in a streamable MP4.
    args.extend(str_args(&["-sn", "-movflags", "+faststart", "-f", "mp4"]));
    args.push(plan.temp_output.to_string_lossy().into_owned());
    args
}

fn push_aac_audio(args: &mut Vec<String>, settings: &EncoderSettings) {
    args.extend(str_args(&["-c:a", "aac", "-b:a"]));
    args.push(settings.audio_bitrate.clone());
    args.extend(str_args(&["-ac", "2"]));
}

fn subtitle_extract_args(input: &Path, output: &Path, sidecar: SubtitleSidecar) -> Vec<String> {
    let mut args = str_args(&["-hide_banner", "-nostdin", "-loglevel", "error", "-y", "-i"]);
    args.push(input.to_string_lossy().into_owned());
    args.extend(str_args(&["-map", "0:s:0", "-c:s", sidecar.codec_arg()]));
    args.push(output.to_string_lossy().into_owned());
    args
}

fn str_args(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

/// Settings for one decide-and-execute pipeline run.
#[derive(Clone, Debug)]
pub struct ConversionOptions {
    pub policy: PolicyOptions,
    pub delete_source: bool,
    pub extract_subtitles: bool,
    pub skip_4k_hdr: bool,
    pub deinterlace: bool,
    /// Language tag used when naming extracted subtitle files.
    pub language: String,
    pub hw_accel: HwAccel,
}

impl Default for ConversionOptions {
    fn default() -> Self {
        Self {
            policy: PolicyOptions::default(),
            delete_source: false,
            extract_subtitles: false,
            skip_4k_hdr: false,
            deinterlace: false,
            language: "eng".to_string(),
            hw_accel: HwAccel::None,
        }
    }
}

#[derive(Clone, Debug)]
pub enum UnitOutcome {
    /// Nothing was written for this file.
    Skipped { reason: String },
    /// A conforming file now exists at `output`.
    Converted { output: PathBuf },
}

/// Run the full pipeline for one file: skip-log short-circuit, probe,
/// classification, external encode, and finalize (rename over the canonical
/// name, optional source deletion, skip-log append).
pub fn process_file(
    path: &Path,
    options: &ConversionOptions,
    transcoder: &dyn Transcoder,
    skiplog: Option<&SkipLog>,
) -> Result<UnitOutcome> {
    let basename = file_basename(path)?;

    if let Some(log) = skiplog {
        if log.contains(&basename) {
            debug!("'{}' already recorded as converted; skipping", basename);
            return Ok(UnitOutcome::Skipped {
                reason: "already in skip log".to_string(),
            });
        }
    }

    let temp_output = temp_output_path(path);
    // A leftover temp file means an earlier run died mid-encode.
    remove_if_exists(&temp_output);

    let codec_probe = probe::probe_file(path)?;

    if options.skip_4k_hdr && codec_probe.is_4k_or_hdr() {
        info!("'{}' is 4K/HDR; leaving untouched", basename);
        return Ok(UnitOutcome::Skipped {
            reason: "4K/HDR source".to_string(),
        });
    }

    let action = policy::decide(&codec_probe, options.policy);
    debug!("'{}' classified as {:?}", basename, action);

    if action == TranscodeAction::Skip {
        if let Some(log) = skiplog {
            log.record(&basename)?;
        }
        info!("'{}' already conforms; nothing to do", basename);
        return Ok(UnitOutcome::Skipped {
            reason: "already in target format".to_string(),
        });
    }

    if options.extract_subtitles {
        if let Some(sidecar) = subtitle_sidecar(&codec_probe) {
            let subtitle_path = subtitle_output_path(path, &options.language, sidecar);
            if subtitle_path.exists() {
                debug!("Subtitle file '{}' already exists", subtitle_path.display());
            } else if let Err(err) = transcoder.extract_subtitles(path, &subtitle_path, sidecar) {
                // Losing a subtitle sidecar is not worth failing the unit.
                warn!(
                    "Subtitle extraction failed for '{}': {}",
                    path.display(),
                    err
                );
            } else {
                info!("Extracted subtitles to '{}'", subtitle_path.display());
            }
        }
    }

    let plan = TranscodePlan {
        action,
        input: path.to_path_buf(),
        temp_output: temp_output.clone(),
        video_filters: video_filters(&codec_probe, options),
        use_hw_encoder: options.hw_accel == HwAccel::Auto && action == TranscodeAction::FullReencode,
    };

    info!("Converting '{}' ({:?})", path.display(), action);
    transcoder.execute(&plan)?;

    let output = finalize(path, &temp_output, options.delete_source)?;
    if let Some(log) = skiplog {
        // Record the source name too: with deletion off the source survives
        // and must short-circuit the next batch run, not be re-encoded over
        // its own output.
        log.record(&basename)?;
        log.record(&file_basename(&output)?)?;
    }
    info!("Converted '{}' -> '{}'", path.display(), output.display());
    Ok(UnitOutcome::Converted { output })
}

fn video_filters(probe: &CodecProbe, options: &ConversionOptions) -> Vec<String> {
    let mut filters = Vec::new();
    if options.deinterlace {
        filters.push("yadif".to_string());
    }
    if probe.is_high_bit_depth() {
        filters.push("format=yuv420p".to_string());
    }
    filters
}

fn subtitle_sidecar(probe: &CodecProbe) -> Option<SubtitleSidecar> {
    let codec = probe.subtitle_codec.as_str();
    if TEXT_SUBTITLE_CODECS.contains(&codec) {
        Some(SubtitleSidecar::Text)
    } else if BITMAP_SUBTITLE_CODECS.contains(&codec) {
        Some(SubtitleSidecar::Bitmap)
    } else {
        None
    }
}

/// Move the finished temp file over the canonical `<stem>.mp4` name, then
/// apply the source-deletion policy: sources that already carried the target
/// extension were replaced in place by the rename, anything else is deleted
/// only when the policy asks for it.
fn finalize(input: &Path, temp_output: &Path, delete_source: bool) -> Result<PathBuf> {
    let output = canonical_output_path(input);
    fs::rename(temp_output, &output).with_context(|| {
        format!(
            "Failed to move '{}' into place as '{}'",
            temp_output.display(),
            output.display()
        )
    })?;

    if delete_source && !has_target_extension(input) {
        fs::remove_file(input)
            .with_context(|| format!("Failed to delete source file '{}'", input.display()))?;
        info!("Deleted source file '{}'", input.display());
    }
    Ok(output)
}

pub fn file_basename(path: &Path) -> Result<String> {
    path.file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .ok_or_else(|| anyhow!("Path '{}' has no file name", path.display()))
}

fn has_target_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case(TARGET_EXTENSION))
}

/// `<stem>.converting.mp4`, alongside the input.
pub fn temp_output_path(input: &Path) -> PathBuf {
    input.with_extension(format!("{}.{}", CONVERTING_MARKER, TARGET_EXTENSION))
}

/// `<stem>.mp4`; inputs already named `.mp4` (any case) keep their path so
/// the rename replaces them in place.
pub fn canonical_output_path(input: &Path) -> PathBuf {
    if has_target_extension(input) {
        input.to_path_buf()
    } else {
        input.with_extension(TARGET_EXTENSION)
    }
}

fn subtitle_output_path(input: &Path, language: &str, sidecar: SubtitleSidecar) -> PathBuf {
    input.with_extension(format!("{}.{}", language, sidecar.extension()))
}

fn remove_if_exists(path: &Path) {
    if path.exists() {
        match fs::remove_file(path) {
            Ok(()) => info!("Removed stale temp file '{}'", path.display()),
            Err(err) => warn!("Failed to remove stale temp file '{}': {}", path.display(), err),
        }
    }
}
