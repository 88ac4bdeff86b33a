use crate::filter::DEFAULT_SKIP_FILES;
use anyhow::{bail, Context, Result};
use clap::Parser;
use std::{net::SocketAddr, path::PathBuf, time::Duration};

pub const DEFAULT_ADDR: &str = "127.0.0.1:6789";
pub const DEFAULT_DEBOUNCE_MS: u64 = 100;

#[derive(Parser, Debug, Default)]
#[command(name = "codestream-source", about = "Watch a folder and stream file changes over websocket")]
pub struct Args {
    /// Listen address; loopback only.
    #[arg(long, default_value = "")]
    pub addr: String,
    /// Folder to watch.
    #[arg(long, default_value = "")]
    pub root: String,
    /// File names never streamed, comma separated.
    #[arg(long, value_delimiter = ',')]
    pub skip: Vec<String>,
    #[arg(long)]
    pub debounce_ms: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct SourceConfig {
    pub addr: SocketAddr,
    pub root: PathBuf,
    pub skip: Vec<String>,
    pub debounce: Duration,
    pub log_level: String,
}

pub fn load_config(args: Args) -> Result<SourceConfig> {
    load_config_with(args, |key| std::env::var(key).ok())
}

pub fn load_config_with<F>(args: Args, env: F) -> Result<SourceConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let raw_addr = first_non_empty(args.addr, env("CODESTREAM_ADDR"))
        .unwrap_or_else(|| DEFAULT_ADDR.to_string());
    let addr: SocketAddr = raw_addr
        .parse()
        .with_context(|| format!("invalid listen address `{raw_addr}`"))?;
    if !addr.ip().is_loopback() {
        bail!("listen address `{addr}` is not loopback");
    }

    let raw_root = first_non_empty(args.root, env("CODESTREAM_ROOT")).unwrap_or_else(|| ".".to_string());
    let root = std::fs::canonicalize(&raw_root)
        .with_context(|| format!("cannot resolve watch folder `{raw_root}`"))?;
    if !root.is_dir() {
        bail!("watch folder `{}` is not a directory", root.display());
    }

    let mut skip: Vec<String> = args
        .skip
        .into_iter()
        .map(|name| name.trim().to_string())
        .filter(|name| !name.is_empty())
        .collect();
    if skip.is_empty() {
        skip = match env("CODESTREAM_SKIP") {
            Some(raw) => raw
                .split(',')
                .map(|name| name.trim().to_string())
                .filter(|name| !name.is_empty())
                .collect(),
            None => DEFAULT_SKIP_FILES.iter().map(|name| name.to_string()).collect(),
        };
    }

    let debounce_ms = match args.debounce_ms {
        Some(ms) => ms,
        None => match env("CODESTREAM_DEBOUNCE_MS") {
            Some(raw) => raw
                .trim()
                .parse()
                .with_context(|| format!("invalid CODESTREAM_DEBOUNCE_MS `{raw}`"))?,
            None => DEFAULT_DEBOUNCE_MS,
        },
    };

    Ok(SourceConfig {
        addr,
        root,
        skip,
        debounce: Duration::from_millis(debounce_ms),
        log_level: env("CODESTREAM_LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
    })
}

fn first_non_empty(arg: String, env_value: Option<String>) -> Option<String> {
    let arg = arg.trim();
    if !arg.is_empty() {
        return Some(arg.to_string());
    }
    env_value
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn args_in(dir: &tempfile::TempDir) -> Args {
        Args {
            root: dir.path().display().to_string(),
            ..Args::default()
        }
    }

    #[test]
    fn defaults_apply() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = load_config_with(args_in(&dir), |_| None).expect("config");
        assert_eq!(config.addr.to_string(), DEFAULT_ADDR);
        assert_eq!(config.skip, vec!["package-lock.json", "yarn.lock"]);
        assert_eq!(config.debounce, Duration::from_millis(DEFAULT_DEBOUNCE_MS));
        assert_eq!(config.root, std::fs::canonicalize(dir.path()).expect("canonical"));
    }

    #[test]
    fn env_fills_what_flags_leave_empty() {
        let dir = tempfile::tempdir().expect("tempdir");
        let env: HashMap<&str, &str> = HashMap::from([
            ("CODESTREAM_ADDR", "127.0.0.1:7000"),
            ("CODESTREAM_SKIP", "Cargo.lock, go.sum"),
            ("CODESTREAM_DEBOUNCE_MS", "250"),
        ]);
        let config =
            load_config_with(args_in(&dir), |key| env.get(key).map(|v| v.to_string())).expect("config");
        assert_eq!(config.addr.port(), 7000);
        assert_eq!(config.skip, vec!["Cargo.lock", "go.sum"]);
        assert_eq!(config.debounce, Duration::from_millis(250));
    }

    #[test]
    fn rejects_non_loopback_and_missing_root() {
        let dir = tempfile::tempdir().expect("tempdir");
        let args = Args {
            addr: "0.0.0.0:6789".to_string(),
            ..args_in(&dir)
        };
        assert!(load_config_with(args, |_| None).is_err());

        let args = Args {
            root: dir.path().join("missing").display().to_string(),
            ..Args::default()
        };
        assert!(load_config_with(args, |_| None).is_err());
    }
}
