//! Registry configuration
//!
//! Loaded from RON. Every field has a default, so an empty `()` document is a
//! valid configuration.
//!
//! ```
//! use landclaim_registry::RegistryConfig;
//!
//! let config = RegistryConfig::from_ron_str("(max_depth: -64, creative_worlds: [\"build\"])").unwrap();
//! assert_eq!(config.max_depth, -64);
//! assert!(config.is_creative_world("build"));
//! assert_eq!(config.siege_checkup_ticks, 600);
//! ```

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Settings for a [`crate::Registry`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Root directory for file-backed storage
    pub data_dir: PathBuf,
    /// Lowest Y a claim's bottom may sit at; deeper requests are raised to it
    pub max_depth: i32,
    /// Y of the world floor, used for administrative and creative-world claims
    pub bedrock_y: i32,
    /// Worlds where every claim reaches down to bedrock
    pub creative_worlds: Vec<String>,
    /// Consult the region guard when an actor creates or resizes a claim
    pub respect_region_guard: bool,
    /// Delay between siege checkups
    pub siege_checkup_ticks: u64,
    /// Cooldown between the same attacker and defender or claim owner
    pub siege_cooldown_minutes: i64,
    /// Blanket protection for a defender after any siege ends
    pub siege_defender_cooldown_minutes: i64,
    /// How long doors stay open after an attacker wins
    pub siege_doors_open_seconds: u64,
    /// Host tick rate, for converting seconds to ticks
    pub ticks_per_second: u64,
    /// Allow rescue requests inside administrative claims
    pub allow_trapped_in_admin_claims: bool,
    /// Delay before a requested rescue runs
    pub rescue_delay_ticks: u64,
    /// Search radius around a location for nearby claims
    pub nearby_radius: i32,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from("data"),
            max_depth: 0,
            bedrock_y: 0,
            creative_worlds: Vec::new(),
            respect_region_guard: true,
            siege_checkup_ticks: 600,
            siege_cooldown_minutes: 60,
            siege_defender_cooldown_minutes: 15,
            siege_doors_open_seconds: 300,
            ticks_per_second: 20,
            allow_trapped_in_admin_claims: false,
            rescue_delay_ticks: 200,
            nearby_radius: 150,
        }
    }
}

impl RegistryConfig {
    /// Load a configuration from a RON file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = fs::read_to_string(path.as_ref())
            .map_err(|e| Error::Config(format!("{}: {}", path.as_ref().display(), e)))?;
        Self::from_ron_str(&content)
    }

    /// Parse a configuration from RON text
    pub fn from_ron_str(content: &str) -> Result<Self> {
        ron::from_str(content).map_err(|e| Error::Config(e.to_string()))
    }

    pub fn is_creative_world(&self, world: &str) -> bool {
        self.creative_worlds.iter().any(|w| w == world)
    }

    /// Looting window length in ticks
    pub fn doors_open_ticks(&self) -> u64 {
        self.siege_doors_open_seconds * self.ticks_per_second
    }
}
