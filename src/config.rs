//! Process-level configuration.
//!
//! Kept deliberately small: just enough to turn CLI flags (with environment
//! fallback) into a validated [`Settings`] value handed once into
//! [`crate::server`]. Never read as a global from deeper layers.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};

use clap::Parser;
use serde::Deserialize;

use crate::error::ConfigError;

/// On-disk fallback for unattended deployments: any field left unset by a
/// CLI flag or environment variable falls back to this file, and any field
/// still unset after that falls back to the [`Args`] default. Read once,
/// before [`Args::parse`], so clap's own env-fallback machinery sees the
/// file's values as if they had been exported.
#[derive(Debug, Default, Deserialize)]
struct ConfigFile {
    repo: Option<PathBuf>,
    listen: Option<String>,
    log: Option<String>,
}

/// Default location consulted when `--config` is not passed:
/// `$XDG_CONFIG_HOME/syncd/config.toml` (`~/.config/syncd/config.toml` on
/// Linux). Missing is not an error; the file is an optional convenience.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("syncd").join("config.toml"))
}

/// Read `path` (or [`default_config_path`] when `None`) and export any field
/// it sets as the corresponding `SYNCD_*` environment variable, but only
/// where that variable is not already set: CLI flags and pre-existing
/// environment variables always win over the file.
pub fn apply_config_file_defaults(path: Option<&Path>) {
    let path = match path
        .map(Path::to_path_buf)
        .or_else(|| std::env::var_os("SYNCD_CONFIG").map(PathBuf::from))
        .or_else(default_config_path)
    {
        Some(p) => p,
        None => return,
    };

    let raw = match std::fs::read_to_string(&path) {
        Ok(raw) => raw,
        Err(_) => return,
    };

    let file: ConfigFile = match toml::from_str(&raw) {
        Ok(f) => f,
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "ignoring unparsable config file");
            return;
        }
    };

    set_env_if_absent("SYNCD_REPO", file.repo.map(|p| p.to_string_lossy().into_owned()));
    set_env_if_absent("SYNCD_LISTEN", file.listen);
    set_env_if_absent("SYNCD_LOG", file.log);
}

fn set_env_if_absent(key: &str, value: Option<String>) {
    if let Some(value) = value {
        if std::env::var_os(key).is_none() {
            std::env::set_var(key, value);
        }
    }
}

/// Validated process settings.
#[derive(Debug, Clone)]
pub struct Settings {
    /// Canonicalised path to the git working tree `syncd` serves.
    pub repository_root: PathBuf,
    /// Address the WebSocket server binds.
    pub listen_addr: SocketAddr,
    /// `tracing_subscriber::EnvFilter` directive, e.g. `"syncd=debug,info"`.
    pub log_filter: String,
}

/// Command-line flags; environment variables of the same name (upper-cased,
/// `SYNCD_` prefixed) are consulted when a flag is absent.
#[derive(Parser, Debug)]
#[command(name = "syncd", about = "Collaborative file-synchronisation engine")]
pub struct Args {
    /// Path to the git working tree to serve.
    #[arg(long, env = "SYNCD_REPO")]
    pub repo: PathBuf,

    /// Address to listen on.
    #[arg(long, env = "SYNCD_LISTEN", default_value = "127.0.0.1:7420")]
    pub listen: String,

    /// `tracing_subscriber` filter directive.
    #[arg(long, env = "SYNCD_LOG", default_value = "syncd=info")]
    pub log: String,
}

impl Settings {
    /// Validate `args` into [`Settings`], failing fast before the accept loop
    /// starts if the repository root is missing, not a directory, or not a
    /// git repository, or the listen address does not parse.
    pub fn from_args(args: Args) -> Result<Self, ConfigError> {
        let repository_root = validate_repo_root(&args.repo)?;
        let listen_addr = args
            .listen
            .parse()
            .map_err(|_| ConfigError::InvalidAddr(args.listen.clone()))?;

        Ok(Settings {
            repository_root,
            listen_addr,
            log_filter: args.log,
        })
    }
}

fn validate_repo_root(path: &Path) -> Result<PathBuf, ConfigError> {
    if !path.exists() {
        return Err(ConfigError::RootMissing(path.to_path_buf()));
    }
    if !path.is_dir() {
        return Err(ConfigError::RootNotDir(path.to_path_buf()));
    }
    if !path.join(".git").exists() {
        return Err(ConfigError::NotAGitRepo(path.to_path_buf()));
    }
    path.canonicalize().map_err(|_| ConfigError::RootMissing(path.to_path_buf()))
}
