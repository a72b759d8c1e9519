use crate::probe::CodecProbe;
use serde::Deserialize;

/// Canonical target: H.264 video + AAC stereo audio, no subtitle stream, MP4.
pub const TARGET_VIDEO_CODEC: &str = "h264";
pub const TARGET_AUDIO_CODEC: &str = "aac";
pub const TARGET_EXTENSION: &str = "mp4";

/// What to do with a probed file. Derived deterministically from the probe;
/// carries no state of its own.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum TranscodeAction {
    /// File already conforms; nothing to do.
    Skip,
    /// Stream-copy video and audio into a fresh container, dropping subtitles.
    StripSubtitlesOnly,
    /// Stream-copy video, re-encode audio to AAC stereo, drop subtitles.
    ReencodeAudioOnly,
    /// Re-encode video to H.264 and audio to AAC stereo, drop subtitles.
    FullReencode,
}

#[derive(Copy, Clone, Debug, Default, Deserialize)]
pub struct PolicyOptions {
    /// Accept HEVC video as-is instead of forcing a full re-encode. HEVC
    /// sources then take the same path an H.264 source would (skip, strip,
    /// or audio-only), which keeps the video stream untouched.
    pub treat_hevc_as_acceptable: bool,
}

/// Classify a probed file. Comparison is exact-string: ffprobe already
/// reports lowercase codec names, and an empty string (no such stream or a
/// failed probe) deliberately falls through to the re-encode branches.
pub fn decide(probe: &CodecProbe, options: PolicyOptions) -> TranscodeAction {
    let video_ok = probe.video_codec == TARGET_VIDEO_CODEC
        || (options.treat_hevc_as_acceptable && probe.video_codec == "hevc");

    if !video_ok {
        return TranscodeAction::FullReencode;
    }
    if probe.audio_codec != TARGET_AUDIO_CODEC {
        return TranscodeAction::ReencodeAudioOnly;
    }
    if probe.subtitle_codec.is_empty() {
        TranscodeAction::Skip
    } else {
        TranscodeAction::StripSubtitlesOnly
    }
}
