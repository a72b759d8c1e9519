use crate::transcode::HwAccel;
use anyhow::{Context, Result};
use serde::Deserialize;
use std::collections::BTreeSet;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};

pub const CONFIG_ENV_VAR: &str = "CONFORM4_CONFIG";

/// Where the loaded configuration file came from, for the startup log line.
#[derive(Debug)]
pub enum ConfigSource {
    Cli(PathBuf),
    Env(PathBuf),
    Default(PathBuf),
}

impl ConfigSource {
    pub fn path(&self) -> &Path {
        match self {
            ConfigSource::Cli(path) | ConfigSource::Env(path) | ConfigSource::Default(path) => {
                path
            }
        }
    }
}

/// On-disk configuration. Every field is optional; CLI flags given on the
/// command line take precedence over file values.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    pub root: Option<PathBuf>,
    pub extensions: Option<Vec<String>>,
    pub min_size: Option<String>,
    pub concurrency: Option<usize>,
    pub keep_going: Option<bool>,
    pub delete_source: Option<bool>,
    pub treat_hevc_as_acceptable: Option<bool>,
    pub extract_subtitles: Option<bool>,
    pub skip_4k_hdr: Option<bool>,
    pub deinterlace: Option<bool>,
    pub language: Option<String>,
    pub log_file: Option<PathBuf>,
    pub hw_accel: Option<HwAccel>,
    pub preset: Option<String>,
    pub crf: Option<u32>,
    pub audio_bitrate: Option<String>,
}

/// Locate and parse a configuration file. Order: explicit CLI path, the
/// `CONFORM4_CONFIG` environment variable, then the default candidates.
/// Returns `None` when no file exists anywhere.
pub fn load(path_override: Option<&Path>) -> Result<Option<(Config, ConfigSource)>> {
    if let Some(path) = path_override {
        let config = parse_file(path)?;
        return Ok(Some((config, ConfigSource::Cli(path.to_path_buf()))));
    }

    if let Some(env_path) = env::var_os(CONFIG_ENV_VAR).filter(|value| !value.is_empty()) {
        let path = PathBuf::from(env_path);
        let config = parse_file(&path)?;
        return Ok(Some((config, ConfigSource::Env(path))));
    }

    for candidate in default_config_candidates() {
        if candidate.as_os_str().is_empty() || !candidate.exists() {
            continue;
        }
        let config = parse_file(&candidate)?;
        return Ok(Some((config, ConfigSource::Default(candidate))));
    }

    Ok(None)
}

fn parse_file(path: &Path) -> Result<Config> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read configuration file at {}", path.display()))?;
    toml::from_str(&contents)
        .with_context(|| format!("Invalid configuration file at {}", path.display()))
}

fn default_config_candidates() -> Vec<PathBuf> {
    let mut seen = BTreeSet::new();
    let mut out = Vec::new();

    let mut push_unique = |path: PathBuf, out: &mut Vec<PathBuf>| {
        if !path.as_os_str().is_empty() && seen.insert(path.clone()) {
            out.push(path);
        }
    };

    if let Some(xdg_config) = env::var_os("XDG_CONFIG_HOME").filter(|val| !val.is_empty()) {
        let mut path = PathBuf::from(xdg_config);
        path.push("conform4");
        path.push("config.toml");
        push_unique(path, &mut out);
    }

    if let Some(home) = env::var_os("HOME").filter(|val| !val.is_empty()) {
        let home = PathBuf::from(home);
        let mut path = home.join(".config");
        path.push("conform4");
        path.push("config.toml");
        push_unique(path, &mut out);
        push_unique(home.join("conform4.toml"), &mut out);
    }

    if let Ok(current_dir) = env::current_dir() {
        push_unique(current_dir.join("conform4.toml"), &mut out);
    }

    if let Ok(exe_path) = env::current_exe() {
        if let Some(parent) = exe_path.parent() {
            push_unique(parent.join("conform4.toml"), &mut out);
        }
    }

    push_unique(PathBuf::from("/etc/conform4/config.toml"), &mut out);

    out
}
