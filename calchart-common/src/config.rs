//! Configuration loading and root folder resolution
//!
//! Every setting resolves in the same priority order:
//! 1. Command-line argument (highest priority)
//! 2. Environment variable
//! 3. TOML config file
//! 4. Compiled default (fallback)
//!
//! When no config file is named (by `--config` or `CALCHART_CONFIG`) and none
//! exists in the platform locations, the server starts on defaults. A config
//! file that is named or found but cannot be read or parsed is an error.

use crate::{Error, Result};
use serde::Deserialize;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Environment variable naming the root folder
pub const ROOT_FOLDER_ENV: &str = "CALCHART_ROOT";

/// Environment variable naming the TOML config file
pub const CONFIG_FILE_ENV: &str = "CALCHART_CONFIG";

/// Upper bound for `session_ttl_days`
pub const MAX_SESSION_TTL_DAYS: i64 = 3650;

/// Database file name inside the root folder
pub const DATABASE_FILE: &str = "calchart.db";

/// Contents of the TOML configuration file
///
/// All keys are optional; absent keys fall through to compiled defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct TomlConfig {
    pub root_folder: Option<PathBuf>,
    pub bind_address: Option<IpAddr>,
    pub port: Option<u16>,
    /// URL prefix under which stored media is served (e.g. "/media/")
    pub media_url: Option<String>,
    /// Members Only login page the server redirects to
    pub members_only_url: Option<String>,
    /// Secret shared with Members Only for signing login callbacks
    pub members_only_secret: Option<String>,
    pub session_ttl_days: Option<i64>,
    pub max_upload_mb: Option<usize>,
    /// Local development deployment (exposed to the editor page)
    pub is_local: Option<bool>,
}

impl TomlConfig {
    /// Load a TOML config file
    ///
    /// An explicit path that cannot be read is an error. Without an explicit
    /// path the platform locations are tried and a missing file yields
    /// defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        let path = match explicit {
            Some(path) => path.to_path_buf(),
            None => match std::env::var(CONFIG_FILE_ENV) {
                Ok(path) => PathBuf::from(path),
                Err(_) => match default_config_file() {
                    Some(path) => path,
                    None => {
                        debug!("No config file found, using defaults");
                        return Ok(Self::default());
                    }
                },
            },
        };

        let content = std::fs::read_to_string(&path)
            .map_err(|e| Error::Config(format!("Cannot read {}: {}", path.display(), e)))?;
        Self::parse(&content)
            .map_err(|e| Error::Config(format!("Invalid config file {}: {}", path.display(), e)))
    }

    /// Parse TOML text
    pub fn parse(content: &str) -> std::result::Result<Self, toml::de::Error> {
        toml::from_str(content)
    }
}

/// Platform default config file, if one exists
fn default_config_file() -> Option<PathBuf> {
    let user_config = dirs::config_dir().map(|d| d.join("calchart").join("config.toml"));
    if let Some(path) = user_config {
        if path.exists() {
            return Some(path);
        }
    }

    if cfg!(target_os = "linux") {
        let system_config = PathBuf::from("/etc/calchart/config.toml");
        if system_config.exists() {
            return Some(system_config);
        }
    }

    None
}

/// Compiled fallback values
#[derive(Debug, Clone)]
pub struct CompiledDefaults {
    pub root_folder: PathBuf,
    pub bind_address: IpAddr,
    pub port: u16,
    pub media_url: String,
    pub session_ttl_days: i64,
    pub max_upload_mb: usize,
}

impl CompiledDefaults {
    pub fn for_current_platform() -> Self {
        Self {
            root_folder: default_root_folder(),
            bind_address: IpAddr::V4(Ipv4Addr::LOCALHOST),
            port: 8000,
            media_url: "/media/".to_string(),
            session_ttl_days: 14,
            max_upload_mb: 64,
        }
    }
}

/// OS-dependent default root folder path
fn default_root_folder() -> PathBuf {
    if cfg!(target_os = "linux") {
        // ~/.local/share/calchart (or /var/lib/calchart for system-wide)
        dirs::data_local_dir()
            .map(|d| d.join("calchart"))
            .unwrap_or_else(|| PathBuf::from("/var/lib/calchart"))
    } else if cfg!(target_os = "macos") {
        dirs::data_dir()
            .map(|d| d.join("calchart"))
            .unwrap_or_else(|| PathBuf::from("/Library/Application Support/calchart"))
    } else if cfg!(target_os = "windows") {
        dirs::data_local_dir()
            .map(|d| d.join("calchart"))
            .unwrap_or_else(|| PathBuf::from("C:\\ProgramData\\calchart"))
    } else {
        PathBuf::from("./calchart_data")
    }
}

/// Resolves the root folder from CLI, environment, TOML and defaults
pub struct RootFolderResolver<'a> {
    cli_arg: Option<&'a Path>,
    toml: &'a TomlConfig,
}

impl<'a> RootFolderResolver<'a> {
    pub fn new(cli_arg: Option<&'a Path>, toml: &'a TomlConfig) -> Self {
        Self { cli_arg, toml }
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

        if let Some(path) = &self.toml.root_folder {
            return path.clone();
        }

        CompiledDefaults::for_current_platform().root_folder
    }
}

/// Creates the root folder layout on first run
pub struct RootFolderInitializer {
    root_folder: PathBuf,
}

impl RootFolderInitializer {
    pub fn new(root_folder: PathBuf) -> Self {
        Self { root_folder }
    }

    /// Create root, media and help directories if missing
    pub fn ensure_directory_exists(&self) -> Result<()> {
        for dir in [self.root_folder.clone(), self.media_root(), self.help_root()] {
            if !dir.exists() {
                std::fs::create_dir_all(&dir)?;
                debug!("Created directory {}", dir.display());
            }
        }
        Ok(())
    }

    pub fn database_path(&self) -> PathBuf {
        self.root_folder.join(DATABASE_FILE)
    }

    pub fn media_root(&self) -> PathBuf {
        self.root_folder.join("media")
    }

    pub fn help_root(&self) -> PathBuf {
        self.root_folder.join("help")
    }
}

/// Values given on the command line (or via clap's env fallbacks)
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub root_folder: Option<PathBuf>,
    pub bind_address: Option<IpAddr>,
    pub port: Option<u16>,
}

/// Fully resolved server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub root_folder: PathBuf,
    pub bind_addr: SocketAddr,
    pub media_url: String,
    pub members_only_url: Option<String>,
    pub members_only_secret: Option<String>,
    pub session_ttl_days: i64,
    pub max_upload_bytes: usize,
    pub is_local: bool,
}

impl ServerConfig {
    pub fn resolve(overrides: &ConfigOverrides, toml: &TomlConfig) -> Result<Self> {
        let defaults = CompiledDefaults::for_current_platform();

        let root_folder =
            RootFolderResolver::new(overrides.root_folder.as_deref(), toml).resolve();

        let bind_address = overrides
            .bind_address
            .or(toml.bind_address)
            .unwrap_or(defaults.bind_address);
        let port = overrides.port.or(toml.port).unwrap_or(defaults.port);

        let media_url = normalize_media_url(
            toml.media_url.as_deref().unwrap_or(&defaults.media_url),
        )?;

        let session_ttl_days = toml.session_ttl_days.unwrap_or(defaults.session_ttl_days);
        if !(1..=MAX_SESSION_TTL_DAYS).contains(&session_ttl_days) {
            return Err(Error::Config(format!(
                "session_ttl_days must be between 1 and {}, got {}",
                MAX_SESSION_TTL_DAYS, session_ttl_days
            )));
        }

        let members_only_secret = toml
            .members_only_secret
            .clone()
            .filter(|s| !s.trim().is_empty());
        if toml.members_only_url.is_some() && members_only_secret.is_none() {
            warn!("members_only_url is set without members_only_secret; Members Only login is disabled");
        }

        Ok(Self {
            root_folder,
            bind_addr: SocketAddr::new(bind_address, port),
            media_url,
            members_only_url: toml.members_only_url.clone(),
            members_only_secret,
            session_ttl_days,
            max_upload_bytes: toml.max_upload_mb.unwrap_or(defaults.max_upload_mb) * 1024 * 1024,
            is_local: toml.is_local.unwrap_or(false),
        })
    }

    /// Members Only login is available only with both URL and secret
    pub fn members_only_enabled(&self) -> bool {
        self.members_only_url.is_some() && self.members_only_secret.is_some()
    }

    pub fn initializer(&self) -> RootFolderInitializer {
        RootFolderInitializer::new(self.root_folder.clone())
    }
}

/// Media URL must be an absolute path prefix ending in '/'
fn normalize_media_url(url: &str) -> Result<String> {
    let trimmed = url.trim();
    if !trimmed.starts_with('/') || trimmed.contains("..") {
        return Err(Error::Config(format!(
            "media_url must be an absolute path, got {:?}",
            url
        )));
    }
    if trimmed.ends_with('/') {
        Ok(trimmed.to_string())
    } else {
        Ok(format!("{}/", trimmed))
    }
}
