//! Configuration
//!
//! Settings come from an optional TOML file overlaid with `BRIDGENUM_*`
//! environment variables (`__` separates sections), e.g.
//! `BRIDGENUM_ALLOCATOR__MAX_NUMBER=16`.
//!
//! ```toml
//! [allocator]
//! kind = "bridgeNum"
//! max_number = 255
//!
//! [registry]
//! number_registry = "data/uuidtonum.json"
//! network_status = "data/networkstatus.json"
//! ```

use crate::allocator::BridgeNum;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Number kind used for bridge records in the number registry
pub const BRIDGE_NUM_KIND: &str = "bridgeNum";

/// Allocator behaviour
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct AllocatorConfig {
    /// Kind tag written to and matched against registry records
    pub kind: String,
    /// Highest number handed out; numbers come from `1..=max_number`
    pub max_number: u8,
}

impl Default for AllocatorConfig {
    fn default() -> Self {
        Self {
            kind: BRIDGE_NUM_KIND.to_string(),
            max_number: u8::MAX,
        }
    }
}

impl AllocatorConfig {
    pub fn validate(&self) -> Result<()> {
        if self.kind.is_empty() {
            return Err(Error::Config("allocator.kind must not be empty".to_string()));
        }
        if self.max_number == 0 {
            return Err(Error::Config(
                "allocator.max_number must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Upper bound as a bridge number; zero is clamped to the minimum
    pub fn max(&self) -> BridgeNum {
        BridgeNum::new(self.max_number).unwrap_or(BridgeNum::MIN)
    }
}

/// Locations of the file-backed registries
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    pub number_registry: PathBuf,
    pub network_status: PathBuf,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            number_registry: PathBuf::from("data/uuidtonum.json"),
            network_status: PathBuf::from("data/networkstatus.json"),
        }
    }
}

/// Top-level settings
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub allocator: AllocatorConfig,
    pub registry: RegistryConfig,
}

impl Settings {
    /// Load from an optional TOML file plus environment overrides
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = config::Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(
                config::File::from(path)
                    .format(config::FileFormat::Toml)
                    .required(true),
            );
        }

        let settings: Settings = builder
            .add_source(
                config::Environment::with_prefix("BRIDGENUM")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .and_then(|c| c.try_deserialize())
            .map_err(|e| Error::Config(e.to_string()))?;

        settings.allocator.validate()?;
        Ok(settings)
    }

    /// Parse settings from a TOML string
    pub fn from_toml(source: &str) -> Result<Self> {
        let settings: Settings =
            toml::from_str(source).map_err(|e| Error::Config(e.to_string()))?;
        settings.allocator.validate()?;
        Ok(settings)
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))
    }
}
