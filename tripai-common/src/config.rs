//! Configuration loading and root folder resolution
//!
//! Missing or unreadable config files never stop startup: they produce a
//! warning and the compiled defaults.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Environment variable overriding the root folder
pub const ROOT_FOLDER_ENV: &str = "TRIPAI_ROOT_FOLDER";

/// Config file name looked up under the platform config dir
pub const CONFIG_FILE_NAME: &str = "tripai.toml";

/// Default analyze server
pub const DEFAULT_SERVER_URL: &str = "http://10.4.4.38:3001";

/// Top-level TOML configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TomlConfig {
    pub root_folder: Option<PathBuf>,
    pub server: ServerConfig,
    pub identity: IdentityConfig,
    pub image: ImageConfig,
    pub connectivity: ConnectivityConfig,
    pub logging: LoggingConfig,
}

/// Remote analyze server settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub base_url: String,
    /// Per-item bound while draining the pending queue
    pub batch_timeout_secs: u64,
    /// Bound for the capture-time analysis the user is waiting on
    pub interactive_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_SERVER_URL.to_string(),
            batch_timeout_secs: 120,
            interactive_timeout_secs: 45,
        }
    }
}

/// Who is asking for the analysis; every field is optional on the wire
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IdentityConfig {
    pub user_id: Option<i64>,
    pub device_id: Option<String>,
    pub language: Option<String>,
}

/// Upload image preparation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageConfig {
    /// Long edge bound in pixels
    pub max_edge: u32,
    /// JPEG quality 1-100
    pub jpeg_quality: u8,
}

impl Default for ImageConfig {
    fn default() -> Self {
        Self {
            max_edge: 1200,
            jpeg_quality: 65,
        }
    }
}

/// Reachability probing
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConnectivityConfig {
    pub probe_interval_secs: u64,
    pub probe_timeout_secs: u64,
}

impl Default for ConnectivityConfig {
    fn default() -> Self {
        Self {
            probe_interval_secs: 5,
            probe_timeout_secs: 3,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// tracing filter directive, e.g. "info" or "tripai_sync=debug"
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl TomlConfig {
    /// Validate values that serde cannot
    pub fn validate(&self) -> Result<()> {
        if self.server.base_url.trim().is_empty() {
            return Err(Error::Config("server.base_url must not be empty".to_string()));
        }
        if self.image.max_edge == 0 {
            return Err(Error::Config("image.max_edge must be positive".to_string()));
        }
        if !(1..=100).contains(&self.image.jpeg_quality) {
            return Err(Error::Config(format!(
                "image.jpeg_quality must be 1-100, got {}",
                self.image.jpeg_quality
            )));
        }
        if self.connectivity.probe_interval_secs == 0 {
            return Err(Error::Config(
                "connectivity.probe_interval_secs must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Load TOML config from `path`
///
/// Returns defaults (with a warning) when the file is missing or cannot be parsed.
pub fn load_toml_config(path: &Path) -> TomlConfig {
    let content = match std::fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Config file not readable, using defaults");
            return TomlConfig::default();
        }
    };

    match toml::from_str::<TomlConfig>(&content) {
        Ok(config) => {
            debug!(path = %path.display(), "Loaded config file");
            config
        }
        Err(e) => {
            warn!(path = %path.display(), error = %e, "Config file invalid, using defaults");
            TomlConfig::default()
        }
    }
}

/// Write config as TOML, creating parent directories
pub fn write_toml_config(config: &TomlConfig, path: &Path) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let content = toml::to_string_pretty(config)
        .map_err(|e| Error::Config(format!("Serialize TOML failed: {}", e)))?;
    std::fs::write(path, content)?;
    Ok(())
}

/// Default config file location: `<config_dir>/tripai/tripai.toml`
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|d| d.join("tripai").join(CONFIG_FILE_NAME))
}

/// Root folder resolution, in priority order:
/// 1. Command-line argument (highest priority)
/// 2. Environment variable
/// 3. TOML config file
/// 4. OS-dependent compiled default (fallback)
pub struct RootFolderResolver<'a> {
    cli_arg: Option<&'a Path>,
    config: Option<&'a TomlConfig>,
}

impl<'a> RootFolderResolver<'a> {
    pub fn new() -> Self {
        Self {
            cli_arg: None,
            config: None,
        }
    }

    pub fn with_cli_arg(mut self, path: Option<&'a Path>) -> Self {
        self.cli_arg = path;
        self
    }

    pub fn with_config(mut self, config: &'a TomlConfig) -> Self {
        self.config = Some(config);
        self
    }

    pub fn resolve(&self) -> PathBuf {
        if let Some(path) = self.cli_arg {
            return path.to_path_buf();
        }

        if let Ok(path) = std::env::var(ROOT_FOLDER_ENV) {
            if !path.trim().is_empty() {
                return PathBuf::from(path);
            }
        }

        if let Some(path) = self.config.and_then(|c| c.root_folder.as_ref()) {
            return path.clone();
        }

        default_root_folder()
    }
}

impl Default for RootFolderResolver<'_> {
    fn default() -> Self {
        Self::new()
    }
}

/// Get OS-dependent default root folder path
pub fn default_root_folder() -> PathBuf {
    if cfg!(target_os = "linux") {
        // ~/.local/share/tripai
        dirs::data_local_dir()
            .map(|d| d.join("tripai"))
            .unwrap_or_else(|| PathBuf::from("/var/lib/tripai"))
    } else if cfg!(target_os = "macos") {
        // ~/Library/Application Support/tripai
        dirs::data_dir()
            .map(|d| d.join("tripai"))
            .unwrap_or_else(|| PathBuf::from("/Library/Application Support/tripai"))
    } else if cfg!(target_os = "windows") {
        // %LOCALAPPDATA%\tripai
        dirs::data_local_dir()
            .map(|d| d.join("tripai"))
            .unwrap_or_else(|| PathBuf::from("C:\\ProgramData\\tripai"))
    } else {
        PathBuf::from("./tripai_data")
    }
}

/// Files and folders kept under the root folder
pub struct RootFolderLayout {
    root: PathBuf,
}

impl RootFolderLayout {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    /// Create the root and cache folders if missing
    pub fn ensure_directories(&self) -> Result<()> {
        std::fs::create_dir_all(&self.root)?;
        std::fs::create_dir_all(self.image_cache_dir())?;
        Ok(())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn database_path(&self) -> PathBuf {
        self.root.join("tripai.db")
    }

    pub fn image_cache_dir(&self) -> PathBuf {
        self.root.join("cache").join("compressed_images")
    }
}
