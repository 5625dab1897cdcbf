use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

pub type Result<T> = std::result::Result<T, String>;

/// Run configuration for the hexbadge companion runtime.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BadgeConfig {
    /// Name of the badge profile.
    pub name: String,
    /// Where the firmware module comes from.
    pub firmware: FirmwareConfig,
    /// IPC bridge behavior (optional).
    ///
    /// Backward compatible: if omitted, defaults are used.
    #[serde(default)]
    pub ipc: IpcConfig,
    /// Outbound HTTP proxying on the guest's behalf (optional).
    #[serde(default)]
    pub http: HttpConfig,
    /// Decoded-frame sink (optional).
    #[serde(default)]
    pub frames: FramesConfig,

    /// Directory where the badge config file is located.
    /// This is used as a base directory when the firmware is specified as a relative path.
    #[serde(skip)]
    config_dir: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FirmwareConfig {
    /// Path to the firmware module on disk.
    pub path: Option<PathBuf>,
    /// URL the firmware module is fetched from.
    pub url: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct IpcConfig {
    /// What to do with guest messages the host has no handler for.
    #[serde(default)]
    pub unsupported_message: UnsupportedMessage,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum UnsupportedMessage {
    /// Log a warning and discard the message (the device behavior).
    #[default]
    Drop,
    /// Abort the guest run.
    Fail,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct HttpConfig {
    /// Timeout for proxied guest HTTP requests, in milliseconds.
    #[serde(default = "default_http_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_http_timeout_ms(),
        }
    }
}

fn default_http_timeout_ms() -> u64 {
    30_000
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(deny_unknown_fields)]
pub struct FramesConfig {
    /// Write every decoded frame as a PNG into this directory.
    pub dir: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FirmwareLocation {
    Path(PathBuf),
    Url(String),
}

impl BadgeConfig {
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let mut config: BadgeConfig = serde_yaml::from_reader(
            std::fs::File::open(path).map_err(|e| format!("Failed to open file: {}", e))?,
        )
        .map_err(|e| format!("Failed to parse YAML: {}", e))?;

        let path = path
            .canonicalize()
            .map_err(|e| format!("Failed to canonicalize path: {}", e))?;
        config.config_dir = path
            .parent()
            .ok_or_else(|| format!("Failed to get parent directory of path: {}", path.display()))?
            .to_path_buf();
        config.validate()?;

        Ok(config)
    }

    pub fn get_firmware_location(&self) -> FirmwareLocation {
        if let Some(path) = &self.firmware.path {
            if path.is_relative() {
                return FirmwareLocation::Path(self.config_dir.join(path));
            } else {
                return FirmwareLocation::Path(path.clone());
            }
        }

        if let Some(url) = &self.firmware.url {
            return FirmwareLocation::Url(url.clone());
        }

        unreachable!();
    }

    fn validate(&self) -> Result<()> {
        if !self.config_dir.is_dir() {
            return Err(format!(
                "Broken badge config path: config_dir is not a directory: {}",
                self.config_dir.display()
            ));
        }

        if self.name.is_empty() {
            return Err("Name is required in the name field".to_string());
        }

        if self.firmware.path.is_some() && self.firmware.url.is_some() {
            return Err("Only one of path or url can be specified".to_string());
        }

        if self.firmware.path.is_none() && self.firmware.url.is_none() {
            return Err("One of path or url must be specified".to_string());
        }

        if self.http.timeout_ms == 0 {
            return Err("http.timeout_ms must be greater than zero".to_string());
        }

        Ok(())
    }
}
