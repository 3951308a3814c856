//! Configuration file and want-file loading

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};

/// Extensions accepted for want files, in lookup order
pub const WANT_EXTENSIONS: &[&str] = &["json", "toml"];

/// Contents of `~/.config/sonic-cfg/config.toml`
#[derive(Debug, Serialize, Deserialize, Default)]
pub struct Config {
    /// Switch to talk to; only `apply` without `--check` needs it
    #[serde(default)]
    pub device: Option<DeviceConfig>,

    /// Where snapshots of applied configuration live
    #[serde(default)]
    pub state: StateConfig,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct DeviceConfig {
    /// Host name or base URL (`https://` is assumed when no scheme is given)
    pub host: String,

    /// Environment variable holding the bearer token
    #[serde(default = "default_token_env")]
    pub token_env: String,

    #[serde(default = "default_true")]
    pub verify_tls: bool,

    #[serde(default = "default_timeout")]
    pub timeout_secs: u64,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct StateConfig {
    #[serde(default = "default_state_dir")]
    pub dir: String,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            dir: default_state_dir(),
        }
    }
}

fn default_token_env() -> String {
    "SONIC_CFG_TOKEN".to_string()
}

fn default_true() -> bool {
    true
}

fn default_timeout() -> u64 {
    30
}

fn default_state_dir() -> String {
    "~/.local/state/sonic-cfg".to_string()
}

impl Config {
    /// Default location of the config file
    pub fn default_path() -> Result<PathBuf> {
        let home = dirs::home_dir().context("Could not determine home directory")?;
        Ok(home.join(".config").join("sonic-cfg").join("config.toml"))
    }

    /// Load the config from `path`, or from the default location
    ///
    /// A missing file at the default location yields the defaults. An
    /// explicit path must exist.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => {
                let path = Self::default_path()?;
                if !path.exists() {
                    log::debug!("No config at {}, using defaults", path.display());
                    return Ok(Self::default());
                }
                path
            }
        };

        let content = fs::read_to_string(&path)
            .with_context(|| format!("Could not read config file: {}", path.display()))?;
        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Invalid TOML format in {}", path.display()))?;
        config.validate()?;

        log::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if let Some(device) = &self.device {
            if device.host.trim().is_empty() {
                bail!("[device] host cannot be empty");
            }
            if device.token_env.trim().is_empty() {
                bail!("[device] token_env cannot be empty");
            }
            if device.timeout_secs == 0 {
                bail!("[device] timeout_secs must be greater than zero");
            }
        }
        if self.state.dir.trim().is_empty() {
            bail!("[state] dir cannot be empty");
        }
        Ok(())
    }

    /// The device section, required for talking to a switch
    pub fn device(&self) -> Result<&DeviceConfig> {
        self.device
            .as_ref()
            .context("No [device] section in config; add one or use --check")
    }

    /// Snapshot directory with `~` expanded
    pub fn state_dir(&self) -> PathBuf {
        PathBuf::from(shellexpand::tilde(&self.state.dir).as_ref())
    }
}

impl DeviceConfig {
    /// Base URL that relative `data/...` paths hang off
    pub fn restconf_root(&self) -> String {
        let host = self.host.trim_end_matches('/');
        if host.starts_with("http://") || host.starts_with("https://") {
            format!("{host}/restconf")
        } else {
            format!("https://{host}/restconf")
        }
    }

    /// Bearer token from the configured environment variable, if set
    pub fn token(&self) -> Option<String> {
        std::env::var(&self.token_env)
            .ok()
            .filter(|t| !t.is_empty())
    }
}

/// Read a want file, JSON or TOML by extension
///
/// The root must be a mapping.
pub fn load_want(path: &Path) -> Result<Value> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Could not read {}", path.display()))?;

    let tree: Value = match path.extension().and_then(|e| e.to_str()) {
        Some("toml") => {
            let table: toml::Table = toml::from_str(&content)
                .with_context(|| format!("Invalid TOML in {}", path.display()))?;
            serde_json::to_value(table)?
        }
        Some("json") | None => serde_json::from_str(&content)
            .with_context(|| format!("Invalid JSON in {}", path.display()))?,
        Some(other) => bail!(
            "{}: unsupported extension `.{other}` (expected .json or .toml)",
            path.display()
        ),
    };

    if !tree.is_object() {
        bail!("{}: the root must be a mapping", path.display());
    }
    Ok(tree)
}

/// The want file for `resource` in `dir`, if there is one
pub fn want_file_in(dir: &Path, resource: &str) -> Option<PathBuf> {
    WANT_EXTENSIONS
        .iter()
        .map(|ext| dir.join(format!("{resource}.{ext}")))
        .find(|path| path.is_file())
}
