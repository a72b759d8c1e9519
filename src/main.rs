use anyhow::{bail, Context, Result};
use clap::parser::ValueSource;
use clap::{value_parser, ArgMatches, CommandFactory, FromArgMatches, Parser};
use log::{error, info};
use std::env;
use std::path::PathBuf;
use std::process;

mod batch;
mod config;
mod logging;
mod policy;
mod probe;
mod scan;
mod skiplog;
mod transcode;

use batch::BatchOptions;
use policy::PolicyOptions;
use skiplog::SkipLog;
use transcode::{
    process_file, ConversionOptions, EncoderSettings, FfmpegTranscoder, HwAccel,
    TranscodeFailure, UnitOutcome,
};

#[derive(Parser, Clone)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Single video file to conform (omit to run a batch with --root)
    #[arg(value_parser = value_parser!(PathBuf))]
    input_file: Option<PathBuf>,

    /// Root directory to search for candidate files (batch mode)
    #[arg(long, value_parser = value_parser!(PathBuf))]
    root: Option<PathBuf>,

    /// Path to the configuration file
    #[arg(short, long, value_parser = value_parser!(PathBuf))]
    config_file: Option<PathBuf>,

    /// File extensions eligible for batch conversion
    #[arg(
        long,
        value_delimiter = ',',
        value_name = "EXT",
        default_values_t = ["mkv", "mp4", "avi", "mov", "flv", "wmv"].map(String::from)
    )]
    extensions: Vec<String>,

    /// Minimum file size for batch candidates (plain bytes or k/m/g suffix)
    #[arg(long, value_parser = Args::parse_size, default_value = "0", id = "min_size")]
    min_size: u64,

    /// Batch worker count: 1 = sequential (fail-fast), 0 = one worker per file
    #[arg(long, default_value_t = 1)]
    concurrency: usize,

    /// Continue with the remaining batch when a file fails (sequential mode)
    #[arg(
        long = "keep-going",
        value_name = "BOOL",
        num_args = 0..=1,
        default_missing_value = "true",
        value_parser = clap::builder::BoolishValueParser::new(),
        id = "keep_going"
    )]
    keep_going: Option<bool>,

    /// Delete the source file after a successful conversion. Pass
    /// --delete-source=false to override config.
    #[arg(
        long = "delete-source",
        value_name = "BOOL",
        num_args = 0..=1,
        default_missing_value = "true",
        value_parser = clap::builder::BoolishValueParser::new(),
        id = "delete_source"
    )]
    delete_source: Option<bool>,

    /// Accept HEVC video as-is instead of forcing a full re-encode
    #[arg(
        long = "treat-hevc-as-acceptable",
        value_name = "BOOL",
        num_args = 0..=1,
        default_missing_value = "true",
        value_parser = clap::builder::BoolishValueParser::new(),
        id = "treat_hevc_as_acceptable"
    )]
    treat_hevc_as_acceptable: Option<bool>,

    /// Extract text subtitles to a sidecar .srt before stripping them
    #[arg(
        long = "extract-subtitles",
        value_name = "BOOL",
        num_args = 0..=1,
        default_missing_value = "true",
        value_parser = clap::builder::BoolishValueParser::new(),
        id = "extract_subtitles"
    )]
    extract_subtitles: Option<bool>,

    /// Leave 4K and HDR sources untouched
    #[arg(
        long = "skip-4k-hdr",
        value_name = "BOOL",
        num_args = 0..=1,
        default_missing_value = "true",
        value_parser = clap::builder::BoolishValueParser::new(),
        id = "skip_4k_hdr"
    )]
    skip_4k_hdr: Option<bool>,

    /// Deinterlace during full re-encodes
    #[arg(
        long,
        value_name = "BOOL",
        num_args = 0..=1,
        default_missing_value = "true",
        value_parser = clap::builder::BoolishValueParser::new(),
        id = "deinterlace"
    )]
    deinterlace: Option<bool>,

    /// Language tag used when naming extracted subtitle files
    #[arg(long, default_value = "eng")]
    language: String,

    /// Skip-log file recording already-converted basenames
    #[arg(long = "log-file", value_parser = value_parser!(PathBuf), id = "log_file")]
    log_file: Option<PathBuf>,

    /// Hardware acceleration preference (auto tries NVENC, falls back to libx264)
    #[arg(long, value_enum, default_value_t = HwAccel::None, id = "hw_accel")]
    hw_accel: HwAccel,

    /// x264 encoder preset for full re-encodes
    #[arg(long, default_value = "medium")]
    preset: String,

    /// Constant-quality value for full re-encodes
    #[arg(long, default_value_t = 18)]
    crf: u32,

    /// AAC bitrate for re-encoded audio (e.g. 192k)
    #[arg(long = "audio-bitrate", default_value = "192k", id = "audio_bitrate")]
    audio_bitrate: String,

    /// Keyframe interval (GOP size) for full re-encodes
    #[arg(long = "gop-size", id = "gop_size")]
    gop_size: Option<u32>,

    /// Maximum consecutive B-frames for full re-encodes
    #[arg(long = "max-b-frames", id = "max_b_frames")]
    max_b_frames: Option<u32>,

    /// Encoder thread count for full re-encodes
    #[arg(long)]
    threads: Option<u32>,

    /// Print the probed codecs for INPUT_FILE as JSON and exit
    #[arg(long, default_value_t = false)]
    probe: bool,
}

impl Args {
    fn parse_size(input: &str) -> Result<u64, String> {
        let trimmed = input.trim();
        if trimmed.is_empty() {
            return Err("Size value cannot be empty".to_string());
        }

        let lower = trimmed.to_ascii_lowercase().replace(' ', "");
        let mut split_idx = lower.len();
        for (idx, ch) in lower.char_indices() {
            if !(ch.is_ascii_digit() || ch == '.' || ch == ',' || ch == '_') {
                split_idx = idx;
                break;
            }
        }

        let (number_str, suffix) = lower.split_at(split_idx);
        if number_str.is_empty() {
            return Err(format!("Failed to parse size '{}': missing number", input));
        }

        let numeric = number_str.replace(',', "").replace('_', "");
        let value: f64 = numeric
            .parse()
            .map_err(|_| format!("Failed to parse size '{}': invalid number", input))?;

        let multiplier = match suffix.trim_end_matches('b') {
            "" => 1u64,
            "k" => 1_000,
            "m" => 1_000_000,
            "g" => 1_000_000_000,
            other => {
                return Err(format!(
                    "Failed to parse size '{}': unsupported suffix '{}'. Use plain bytes or k/m/g suffixes.",
                    input, other
                ));
            }
        };

        let bytes = (value * multiplier as f64).round();
        if bytes < 0.0 {
            return Err(format!("Failed to parse size '{}': value must not be negative", input));
        }
        Ok(bytes as u64)
    }
}

// Every arg carries an explicit snake_case id, so this is the only lookup
// needed; `value_source` panics on ids clap does not know about.
fn cli_value_provided(matches: &ArgMatches, id: &str) -> bool {
    matches
        .value_source(id)
        .is_some_and(|src| matches!(src, ValueSource::CommandLine))
}

fn apply_config_overrides(
    args: &mut Args,
    cfg: &config::Config,
    matches: &ArgMatches,
) -> Result<()> {
    // A configured root must not turn an explicit single-file run into a batch.
    if args.root.is_none() && args.input_file.is_none() {
        args.root = cfg.root.clone();
    }
    if !cli_value_provided(matches, "extensions") {
        if let Some(extensions) = &cfg.extensions {
            args.extensions = extensions.clone();
        }
    }
    if !cli_value_provided(matches, "min_size") {
        if let Some(min_size) = &cfg.min_size {
            args.min_size = Args::parse_size(min_size)
                .map_err(|err| anyhow::anyhow!("Invalid min_size in config: {err}"))?;
        }
    }
    if !cli_value_provided(matches, "concurrency") {
        if let Some(concurrency) = cfg.concurrency {
            args.concurrency = concurrency;
        }
    }
    if !cli_value_provided(matches, "language") {
        if let Some(language) = &cfg.language {
            args.language = language.clone();
        }
    }
    if !cli_value_provided(matches, "hw_accel") {
        if let Some(hw_accel) = cfg.hw_accel {
            args.hw_accel = hw_accel;
        }
    }
    if !cli_value_provided(matches, "preset") {
        if let Some(preset) = &cfg.preset {
            args.preset = preset.clone();
        }
    }
    if !cli_value_provided(matches, "crf") {
        if let Some(crf) = cfg.crf {
            args.crf = crf;
        }
    }
    if !cli_value_provided(matches, "audio_bitrate") {
        if let Some(audio_bitrate) = &cfg.audio_bitrate {
            args.audio_bitrate = audio_bitrate.clone();
        }
    }
    if args.log_file.is_none() {
        args.log_file = cfg.log_file.clone();
    }
    if args.keep_going.is_none() {
        args.keep_going = cfg.keep_going;
    }
    if args.delete_source.is_none() {
        args.delete_source = cfg.delete_source;
    }
    if args.treat_hevc_as_acceptable.is_none() {
        args.treat_hevc_as_acceptable = cfg.treat_hevc_as_acceptable;
    }
    if args.extract_subtitles.is_none() {
        args.extract_subtitles = cfg.extract_subtitles;
    }
    if args.skip_4k_hdr.is_none() {
        args.skip_4k_hdr = cfg.skip_4k_hdr;
    }
    if args.deinterlace.is_none() {
        args.deinterlace = cfg.deinterlace;
    }
    Ok(())
}

fn main() {
    if env::var_os("RUST_LOG").is_none() {
        env::set_var("RUST_LOG", "info");
    }
    let _ = env_logger::Builder::from_default_env()
        .format_timestamp(None)
        .target(env_logger::Target::Stderr)
        .try_init();

    if let Err(err) = run() {
        error!("{:#}", err);
        // A transcode failure exits with the external tool's own code.
        let code = err
            .downcast_ref::<TranscodeFailure>()
            .map(|failure| failure.code)
            .unwrap_or(1);
        process::exit(code);
    }
}

fn run() -> Result<()> {
    let mut matches = Args::command().get_matches();
    let mut args = Args::from_arg_matches_mut(&mut matches).expect("Failed to parse CLI arguments");

    let loaded_config = config::load(args.config_file.as_deref())?;
    if let Some((cfg, source)) = &loaded_config {
        match source {
            config::ConfigSource::Env(path) => info!(
                "Loaded configuration from '{}' (via {}).",
                path.display(),
                config::CONFIG_ENV_VAR
            ),
            _ => info!("Loaded configuration from '{}'.", source.path().display()),
        }
        apply_config_overrides(&mut args, cfg, &matches)?;
    }
    logging::log_relevant_env();

    if args.probe {
        let input = args
            .input_file
            .as_ref()
            .context("<INPUT_FILE> required for --probe")?;
        let codec_probe = probe::probe_file(input)?;
        println!("{}", serde_json::to_string_pretty(&codec_probe)?);
        return Ok(());
    }

    let conversion = ConversionOptions {
        policy: PolicyOptions {
            treat_hevc_as_acceptable: args.treat_hevc_as_acceptable.unwrap_or(false),
        },
        delete_source: args.delete_source.unwrap_or(false),
        extract_subtitles: args.extract_subtitles.unwrap_or(false),
        skip_4k_hdr: args.skip_4k_hdr.unwrap_or(false),
        deinterlace: args.deinterlace.unwrap_or(false),
        language: args.language.clone(),
        hw_accel: args.hw_accel,
    };
    let transcoder = FfmpegTranscoder::new(EncoderSettings {
        preset: args.preset.clone(),
        crf: args.crf,
        audio_bitrate: args.audio_bitrate.clone(),
        gop_size: args.gop_size,
        max_b_frames: args.max_b_frames,
        threads: args.threads,
    });
    let skiplog = match &args.log_file {
        Some(path) => Some(SkipLog::open(path)?),
        None => None,
    };

    match (&args.input_file, &args.root) {
        (Some(input), None) => {
            if !input.is_file() {
                bail!("Input file '{}' does not exist", input.display());
            }
            match process_file(input, &conversion, &transcoder, skiplog.as_ref())? {
                UnitOutcome::Converted { output } => {
                    info!("Done: '{}'", output.display());
                }
                UnitOutcome::Skipped { reason } => {
                    info!("Skipped '{}': {}", input.display(), reason);
                }
            }
            Ok(())
        }
        (None, Some(root)) => {
            let extensions = scan::extension_set(&args.extensions);
            if extensions.is_empty() {
                bail!("No eligible extensions configured");
            }
            let files = scan::find_candidates(root, &extensions, args.min_size)?;
            let result = batch::run(
                &files,
                &BatchOptions {
                    concurrency: args.concurrency,
                    keep_going: args.keep_going.unwrap_or(false),
                },
                &conversion,
                &transcoder,
                skiplog.as_ref(),
            )?;
            if result.failed > 0 {
                bail!("{} of {} files failed to convert", result.failed, files.len());
            }
            Ok(())
        }
        (Some(_), Some(_)) => bail!("Pass either <INPUT_FILE> or --root, not both"),
        (None, None) => {
            bail!("<INPUT_FILE> or --root is required unless you use --probe")
        }
    }
}
