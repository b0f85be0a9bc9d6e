//! Configuration file support for bootagent.
//!
//! Configuration is loaded from multiple sources with the following priority (highest first):
//! 1. Command-line arguments
//! 2. Environment variables (BOOTAGENT_*)
//! 3. Local config file (./bootagent.toml)
//! 4. Global config file (~/.config/bootagent/config.toml)
//!
//! `--config PATH` replaces steps 3 and 4.

use bootagent::{ChecksumMode, FlashLayout, ProtocolConfig, SelectorOrder};
use directories::ProjectDirs;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Name of the local configuration file.
pub const LOCAL_CONFIG: &str = "bootagent.toml";

/// Serial port settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PortConfig {
    /// Serial port to listen on (e.g., "/dev/ttyUSB0" or "COM3").
    pub serial: Option<String>,
    /// Baud rate.
    pub baud: Option<u32>,
}

/// Flash image and geometry.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FlashConfig {
    /// Raw image file backing the flash.
    pub image: Option<PathBuf>,
    /// Total flash size in bytes.
    pub size: Option<u32>,
    /// Erase page size in bytes.
    pub page_size: Option<u32>,
    /// First application address.
    pub app_start: Option<u32>,
    /// Bytes reserved at the top of flash.
    pub reserved: Option<u32>,
    /// Accept images that replace the agent.
    pub allow_agent_update: Option<bool>,
}

impl FlashConfig {
    /// Geometry with defaults filled in.
    pub fn layout(&self) -> FlashLayout {
        let defaults = FlashLayout::default();
        FlashLayout {
            size: self
                .size
                .unwrap_or(defaults.size),
            page_size: self
                .page_size
                .unwrap_or(defaults.page_size),
            app_start: self
                .app_start
                .unwrap_or(defaults.app_start),
            reserved: self
                .reserved
                .unwrap_or(defaults.reserved),
            allow_agent_update: self
                .allow_agent_update
                .unwrap_or(defaults.allow_agent_update),
        }
    }
}

/// Wire protocol variant.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProtocolSection {
    /// Checksum convention.
    pub checksum: Option<ChecksumMode>,
    /// Byte order of the selector field.
    pub selector_order: Option<SelectorOrder>,
    /// Id byte of the status frame.
    pub status_id: Option<u8>,
}

impl ProtocolSection {
    /// Protocol settings with defaults filled in.
    pub fn protocol(&self) -> ProtocolConfig {
        let defaults = ProtocolConfig::default();
        ProtocolConfig {
            checksum: self
                .checksum
                .unwrap_or(defaults.checksum),
            selector_order: self
                .selector_order
                .unwrap_or(defaults.selector_order),
            status_id: self
                .status_id
                .unwrap_or(defaults.status_id),
        }
    }
}

/// Main configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Serial port settings.
    #[serde(default)]
    pub port: PortConfig,
    /// Flash settings.
    #[serde(default)]
    pub flash: FlashConfig,
    /// Protocol settings.
    #[serde(default)]
    pub protocol: ProtocolSection,
}

impl Config {
    /// Load configuration from the global and local files.
    pub fn load() -> Self {
        let mut config = Self::default();

        if let Some(global_path) = Self::global_config_path() {
            if let Some(global_config) = Self::load_from_file(&global_path) {
                debug!("Loaded global config from {}", global_path.display());
                config.merge(global_config);
            }
        }

        if let Some(local_config) = Self::load_from_file(Path::new(LOCAL_CONFIG)) {
            debug!("Loaded local config from {LOCAL_CONFIG}");
            config.merge(local_config);
        }

        config
    }

    /// Load configuration from a specific file path (--config flag).
    pub fn load_from_path(path: &Path) -> Self {
        if let Some(config) = Self::load_from_file(path) {
            debug!("Loaded config from {}", path.display());
            config
        } else {
            warn!(
                "Could not load config from {}, using defaults",
                path.display()
            );
            Self::default()
        }
    }

    fn load_from_file(path: &Path) -> Option<Self> {
        if !path.exists() {
            return None;
        }

        match fs::read_to_string(path) {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => Some(config),
                Err(e) => {
                    warn!("Failed to parse config file {}: {}", path.display(), e);
                    None
                },
            },
            Err(e) => {
                warn!("Failed to read config file {}: {}", path.display(), e);
                None
            },
        }
    }

    /// Get the global configuration directory.
    pub fn global_config_dir() -> Option<PathBuf> {
        ProjectDirs::from("", "", "bootagent").map(|dirs| dirs.config_dir().to_path_buf())
    }

    /// Get the global configuration file path.
    pub fn global_config_path() -> Option<PathBuf> {
        Self::global_config_dir().map(|dir| dir.join("config.toml"))
    }

    /// Merge another config into this one. Values set in `other` win.
    fn merge(&mut self, other: Self) {
        fn take<T>(slot: &mut Option<T>, value: Option<T>) {
            if value.is_some() {
                *slot = value;
            }
        }

        take(&mut self.port.serial, other.port.serial);
        take(&mut self.port.baud, other.port.baud);

        take(&mut self.flash.image, other.flash.image);
        take(&mut self.flash.size, other.flash.size);
        take(&mut self.flash.page_size, other.flash.page_size);
        take(&mut self.flash.app_start, other.flash.app_start);
        take(&mut self.flash.reserved, other.flash.reserved);
        take(
            &mut self.flash.allow_agent_update,
            other.flash.allow_agent_update,
        );

        take(&mut self.protocol.checksum, other.protocol.checksum);
        take(
            &mut self.protocol.selector_order,
            other.protocol.selector_order,
        );
        take(&mut self.protocol.status_id, other.protocol.status_id);
    }
}
