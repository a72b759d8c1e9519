use log::debug;
use std::env;

const ENV_PREFIX: &str = "conform4_";

fn relevant_env() -> Vec<(String, String)> {
    let mut entries: Vec<(String, String)> = env::vars()
        .filter(|(key, _)| key.to_ascii_lowercase().starts_with(ENV_PREFIX))
        .collect();
    entries.sort_by(|a, b| a.0.cmp(&b.0));
    entries
}

/// Debug-log every CONFORM4_* environment variable so misbehaving runs can
/// be reconstructed from the log alone. Long values are truncated; paths are
/// printed whole.
pub fn log_relevant_env() {
    let entries = relevant_env();
    if entries.is_empty() {
        return;
    }
    debug!("Environment snapshot ({} entries):", entries.len());
    for (key, value) in entries {
        debug!("  {} = {}", key, display_value(&key, &value));
    }
}

const TRUNCATE_AT: usize = 200;

fn display_value(key: &str, value: &str) -> String {
    let lower = key.to_ascii_lowercase();
    if lower.ends_with("_path") || lower.ends_with("_file") || value.len() <= TRUNCATE_AT {
        return value.to_string();
    }
    // Back off to a char boundary; byte 200 may be mid-codepoint.
    let mut cut = TRUNCATE_AT;
    while !value.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}…", &value[..cut])
}
