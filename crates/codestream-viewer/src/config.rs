use anyhow::{bail, Context, Result};
use clap::Parser;
use codestream_core::{
    ReconnectPolicy, RevealConfig, RevealUnit, SessionConfig, DEFAULT_MAX_PAYLOAD_BYTES,
};
use std::{path::PathBuf, time::Duration};
use url::Url;

pub const DEFAULT_URL: &str = "ws://127.0.0.1:6789/ws";
pub const DEFAULT_LOG_DIR: &str = ".codestream/logs";
const DEFAULT_LOG_LEVEL: &str = "info";

#[derive(Parser, Debug, Default)]
#[command(name = "codestream-viewer", about = "Watch generated code arrive over a WebSocket")]
pub struct Args {
    /// WebSocket endpoint of the event source
    #[arg(long, default_value = "")]
    pub url: String,
    /// Milliseconds between revealed units
    #[arg(long)]
    pub speed_ms: Option<u64>,
    /// line, char or diff-block
    #[arg(long, default_value = "")]
    pub reveal_unit: String,
    #[arg(long)]
    pub max_attempts: Option<u32>,
    #[arg(long, default_value = "")]
    pub log_dir: String,
}

#[derive(Clone, Debug)]
pub struct ViewerConfig {
    pub url: Url,
    pub reveal: RevealConfig,
    pub reconnect: ReconnectPolicy,
    pub log_dir: PathBuf,
    pub log_stdout: bool,
    pub log_level: String,
}

impl ViewerConfig {
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            reveal: self.reveal,
            max_payload_bytes: DEFAULT_MAX_PAYLOAD_BYTES,
            ..SessionConfig::default()
        }
    }
}

pub fn load_config(args: Args) -> Result<ViewerConfig> {
    load_config_with(args, |key| std::env::var(key).ok())
}

/// Flags win over `CODESTREAM_*` variables, which win over built-in defaults.
pub fn load_config_with(args: Args, env: impl Fn(&str) -> Option<String>) -> Result<ViewerConfig> {
    let url = resolve_url(&args.url, &env)?;
    let cadence = resolve_speed(args.speed_ms, &env)?;
    let snapshot_unit = resolve_reveal_unit(&args.reveal_unit, &env)?;
    let max_attempts = resolve_max_attempts(args.max_attempts, &env)?;
    let log_dir = resolve_log_dir(&args.log_dir, &env);
    let log_stdout = env("CODESTREAM_LOG_STDOUT")
        .and_then(|value| parse_bool_flag(&value))
        .unwrap_or(false);
    let log_level = non_empty(env("CODESTREAM_LOG_LEVEL"))
        .unwrap_or_else(|| DEFAULT_LOG_LEVEL.to_string());
    Ok(ViewerConfig {
        url,
        reveal: RevealConfig {
            cadence,
            snapshot_unit,
        },
        reconnect: ReconnectPolicy {
            max_attempts,
            ..ReconnectPolicy::default()
        },
        log_dir,
        log_stdout,
        log_level,
    })
}

pub fn parse_bool_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn pick(flag: &str, env: &impl Fn(&str) -> Option<String>, key: &str) -> Option<String> {
    non_empty(Some(flag.to_string())).or_else(|| non_empty(env(key)))
}

fn resolve_url(flag: &str, env: &impl Fn(&str) -> Option<String>) -> Result<Url> {
    let raw = pick(flag, env, "CODESTREAM_URL").unwrap_or_else(|| DEFAULT_URL.to_string());
    let url = Url::parse(&raw).with_context(|| format!("invalid url `{raw}`"))?;
    match url.scheme() {
        "ws" | "wss" => Ok(url),
        other => bail!("unsupported url scheme `{other}`, expected ws or wss"),
    }
}

fn resolve_speed(flag: Option<u64>, env: &impl Fn(&str) -> Option<String>) -> Result<Duration> {
    let millis = match flag {
        Some(value) => value,
        None => match non_empty(env("CODESTREAM_SPEED_MS")) {
            Some(raw) => raw
                .parse()
                .with_context(|| format!("invalid CODESTREAM_SPEED_MS `{raw}`"))?,
            None => RevealConfig::default().cadence.as_millis() as u64,
        },
    };
    // zero would spin the reveal timer
    Ok(Duration::from_millis(millis.max(1)))
}

fn resolve_reveal_unit(flag: &str, env: &impl Fn(&str) -> Option<String>) -> Result<RevealUnit> {
    match pick(flag, env, "CODESTREAM_REVEAL_UNIT") {
        Some(raw) => raw.parse::<RevealUnit>().map_err(anyhow::Error::msg),
        None => Ok(RevealUnit::default()),
    }
}

fn resolve_max_attempts(flag: Option<u32>, env: &impl Fn(&str) -> Option<String>) -> Result<u32> {
    if let Some(value) = flag {
        return Ok(value);
    }
    match non_empty(env("CODESTREAM_MAX_ATTEMPTS")) {
        Some(raw) => raw
            .parse()
            .with_context(|| format!("invalid CODESTREAM_MAX_ATTEMPTS `{raw}`")),
        None => Ok(ReconnectPolicy::default().max_attempts),
    }
}

fn resolve_log_dir(flag: &str, env: &impl Fn(&str) -> Option<String>) -> PathBuf {
    PathBuf::from(pick(flag, env, "CODESTREAM_LOG_DIR").unwrap_or_else(|| DEFAULT_LOG_DIR.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_without_flags_or_env() {
        let config = load_config_with(Args::default(), env_from(&[])).expect("config");
        assert_eq!(config.url.as_str(), DEFAULT_URL);
        assert_eq!(config.reveal.cadence, Duration::from_millis(10));
        assert_eq!(config.reveal.snapshot_unit, RevealUnit::Line);
        assert_eq!(config.reconnect.max_attempts, 5);
        assert_eq!(config.log_dir, PathBuf::from(DEFAULT_LOG_DIR));
        assert!(!config.log_stdout);
        assert_eq!(config.log_level, "info");
    }

    #[test]
    fn flags_win_over_environment() {
        let args = Args {
            url: "ws://localhost:9000/ws".to_string(),
            speed_ms: Some(25),
            reveal_unit: "char".to_string(),
            max_attempts: Some(2),
            log_dir: String::new(),
        };
        let env = env_from(&[
            ("CODESTREAM_URL", "ws://example.invalid/ws"),
            ("CODESTREAM_SPEED_MS", "99"),
            ("CODESTREAM_LOG_DIR", "/tmp/codestream-logs"),
            ("CODESTREAM_LOG_STDOUT", "yes"),
        ]);
        let config = load_config_with(args, env).expect("config");
        assert_eq!(config.url.as_str(), "ws://localhost:9000/ws");
        assert_eq!(config.reveal.cadence, Duration::from_millis(25));
        assert_eq!(config.reveal.snapshot_unit, RevealUnit::Char);
        assert_eq!(config.reconnect.max_attempts, 2);
        assert_eq!(config.log_dir, PathBuf::from("/tmp/codestream-logs"));
        assert!(config.log_stdout);
    }

    #[test]
    fn rejects_bad_values() {
        let http = Args {
            url: "http://127.0.0.1:6789".to_string(),
            ..Args::default()
        };
        assert!(load_config_with(http, env_from(&[])).is_err());
        assert!(load_config_with(Args::default(), env_from(&[("CODESTREAM_SPEED_MS", "fast")])).is_err());
        let unit = Args {
            reveal_unit: "word".to_string(),
            ..Args::default()
        };
        assert!(load_config_with(unit, env_from(&[])).is_err());
    }

    #[test]
    fn zero_speed_is_clamped() {
        let args = Args {
            speed_ms: Some(0),
            ..Args::default()
        };
        let config = load_config_with(args, env_from(&[])).expect("config");
        assert_eq!(config.reveal.cadence, Duration::from_millis(1));
    }
}
