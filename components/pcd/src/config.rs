//! Board configuration - which platform devices exist and how they look
//!
//! A board file is TOML:
//!
//! ```toml
//! [driver]
//! name = "pseudo-char_device"
//! max_devices = 10
//! class = "pcd_class"
//!
//! [[device]]
//! id = 0
//! size = 512
//! perm = "rdwr"
//! serial = "PCDEV1"
//! ```
//!
//! `perm` accepts `rdonly`, `wronly`, `rdwr` or a raw mask (`0x11`, `17`).
//! Sizes are not checked here; an unusable size is rejected when the
//! device is probed.

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use pcd_platform::PlatformDevice;
use serde::Deserialize;
use thiserror::Error;

use crate::pdata::PcdevPlatformData;
use crate::perm::Permission;
use crate::platform_driver::{CLASS_NAME, MAX_DEVICES, PCD_DRIVER_NAME, REGION_NAME};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to parse board config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to read board config {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid permission {0:?}")]
    InvalidPermission(String),

    #[error("Duplicate device id {0}")]
    DuplicateId(u32),
}

/// Platform driver settings
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DriverConfig {
    /// Name platform devices are matched against
    pub name: String,
    /// Size of the device-number region
    pub max_devices: u32,
    pub class: String,
    /// Owner name recorded for the device-number region
    pub region: String,
}

impl Default for DriverConfig {
    fn default() -> Self {
        Self {
            name: PCD_DRIVER_NAME.to_string(),
            max_devices: MAX_DEVICES,
            class: CLASS_NAME.to_string(),
            region: REGION_NAME.to_string(),
        }
    }
}

/// One platform device on the board
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceConfig {
    pub id: u32,
    pub size: usize,
    pub perm: Permission,
    pub serial: String,
}

impl DeviceConfig {
    pub fn platform_data(&self) -> PcdevPlatformData {
        PcdevPlatformData::new(self.size, self.perm, &self.serial)
    }
}

/// Devices and driver settings for one board
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BoardConfig {
    pub driver: DriverConfig,
    pub devices: Vec<DeviceConfig>,
}

impl Default for BoardConfig {
    /// The two-device board: 512 and 1024 bytes, both read/write
    fn default() -> Self {
        Self {
            driver: DriverConfig::default(),
            devices: vec![
                DeviceConfig {
                    id: 0,
                    size: 512,
                    perm: Permission::RDWR,
                    serial: "PCDEV1".to_string(),
                },
                DeviceConfig {
                    id: 1,
                    size: 1024,
                    perm: Permission::RDWR,
                    serial: "PCDEV2".to_string(),
                },
            ],
        }
    }
}

impl BoardConfig {
    /// Parse a board file
    ///
    /// # Errors
    /// Returns `Parse` on malformed TOML, `InvalidPermission` or
    /// `DuplicateId` on bad device entries
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let raw: RawBoard = toml::from_str(text)?;

        let defaults = DriverConfig::default();
        let driver = DriverConfig {
            name: raw.driver.name.unwrap_or(defaults.name),
            max_devices: raw.driver.max_devices.unwrap_or(defaults.max_devices),
            class: raw.driver.class.unwrap_or(defaults.class),
            region: raw.driver.region.unwrap_or(defaults.region),
        };

        let mut seen = BTreeSet::new();
        let mut devices = Vec::with_capacity(raw.device.len());
        for entry in raw.device {
            if !seen.insert(entry.id) {
                return Err(ConfigError::DuplicateId(entry.id));
            }
            devices.push(DeviceConfig {
                id: entry.id,
                size: entry.size,
                perm: entry.perm.resolve()?,
                serial: entry.serial,
            });
        }

        Ok(Self { driver, devices })
    }

    /// Read and parse the board file at `path`
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config = Self::from_toml_str(&text)?;
        log::info!(
            "board config {}: {} device(s) for driver {}",
            path.display(),
            config.devices.len(),
            config.driver.name
        );
        Ok(config)
    }

    /// Platform devices to register on the bus, carrying their platform data
    pub fn platform_devices(&self) -> Vec<PlatformDevice> {
        self.devices
            .iter()
            .map(|dev| {
                PlatformDevice::new(&self.driver.name, dev.id)
                    .with_platform_data(dev.platform_data())
            })
            .collect()
    }
}

#[derive(Deserialize)]
struct RawBoard {
    #[serde(default)]
    driver: RawDriver,
    #[serde(default)]
    device: Vec<RawDevice>,
}

#[derive(Deserialize, Default)]
struct RawDriver {
    name: Option<String>,
    max_devices: Option<u32>,
    class: Option<String>,
    region: Option<String>,
}

#[derive(Deserialize)]
struct RawDevice {
    id: u32,
    size: usize,
    perm: PermSpec,
    #[serde(default)]
    serial: String,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum PermSpec {
    Bits(u8),
    Name(String),
}

impl PermSpec {
    fn resolve(self) -> Result<Permission, ConfigError> {
        match self {
            PermSpec::Bits(bits) => Permission::from_bits(bits)
                .ok_or_else(|| ConfigError::InvalidPermission(format!("0x{:x}", bits))),
            PermSpec::Name(name) => name
                .parse()
                .map_err(|_| ConfigError::InvalidPermission(name)),
        }
    }
}
