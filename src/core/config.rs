use std::env;
use std::fs;
use std::path::PathBuf;

use log::{info, warn};
use serde::{Deserialize, Serialize};

use crate::core::error::BatteryError;

/// A difficulty tier of the sequence-memory battery
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct LevelDefinition {
    /// Display name of the level
    pub name: String,
    /// Number of regions placed on the canvas
    pub box_count: usize,
    /// Number of regions flashed (and recalled)
    pub flash_count: usize,
}

impl LevelDefinition {
    pub fn new(name: &str, box_count: usize, flash_count: usize) -> Self {
        Self {
            name: name.to_string(),
            box_count,
            flash_count,
        }
    }
}

/// Canvas geometry used for region placement
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct CanvasConfig {
    /// Canvas width in pixels
    pub width: f64,
    /// Canvas height in pixels
    pub height: f64,
    /// Side length of each square region
    pub box_size: f64,
    /// Maximum candidate draws before placement gives up
    pub max_placement_attempts: u32,
}

impl Default for CanvasConfig {
    fn default() -> Self {
        Self {
            width: 500.0,
            height: 500.0,
            box_size: 50.0,
            max_placement_attempts: 10_000,
        }
    }
}

/// Configuration of the sequence-memory (A-Set) battery
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct BatteryConfig {
    /// Canvas geometry
    pub canvas: CanvasConfig,
    /// Ordered scored levels
    pub levels: Vec<LevelDefinition>,
    /// Problems administered per level
    pub problems_per_level: u32,
    /// Level used for the unscored practice round
    pub practice_level: LevelDefinition,
}

impl Default for BatteryConfig {
    fn default() -> Self {
        Self {
            canvas: CanvasConfig::default(),
            levels: vec![
                LevelDefinition::new("Level 1", 5, 3),
                LevelDefinition::new("Level 2", 7, 4),
                LevelDefinition::new("Level 3", 9, 5),
            ],
            problems_per_level: 5,
            practice_level: LevelDefinition::new("Practice", 3, 2),
        }
    }
}

impl BatteryConfig {
    /// Check the invariants every problem generated from this config relies on
    pub fn validate(&self) -> Result<(), BatteryError> {
        if self.levels.is_empty() {
            return Err(BatteryError::ConfigurationError(
                "at least one level must be configured".to_string(),
            ));
        }
        if self.problems_per_level == 0 {
            return Err(BatteryError::ConfigurationError(
                "problemsPerLevel must be at least 1".to_string(),
            ));
        }
        let canvas = &self.canvas;
        if !(canvas.box_size > 0.0) {
            return Err(BatteryError::ConfigurationError(format!(
                "box size must be positive, got {}",
                canvas.box_size
            )));
        }
        if canvas.box_size > canvas.width || canvas.box_size > canvas.height {
            return Err(BatteryError::ConfigurationError(format!(
                "box size {} does not fit a {}x{} canvas",
                canvas.box_size, canvas.width, canvas.height
            )));
        }
        for level in self.levels.iter().chain(std::iter::once(&self.practice_level)) {
            if level.flash_count > level.box_count {
                return Err(BatteryError::ConfigurationError(format!(
                    "level '{}' flashes {} of only {} boxes",
                    level.name, level.flash_count, level.box_count
                )));
            }
        }
        Ok(())
    }

    /// Load a battery config from a JSON file
    pub fn from_file(path: &str) -> Result<Self, BatteryError> {
        let raw = fs::read_to_string(path).map_err(|e| {
            BatteryError::ConfigurationError(format!("cannot read '{}': {}", path, e))
        })?;
        let config: BatteryConfig = serde_json::from_str(&raw).map_err(|e| {
            BatteryError::ConfigurationError(format!("cannot parse '{}': {}", path, e))
        })?;
        config.validate()?;
        Ok(config)
    }
}

/// Process-level settings read from the environment
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address the HTTP boundary binds to
    pub bind_address: String,
    /// SQLite database file
    pub database_path: PathBuf,
    /// Shared secret for the result listings
    pub admin_password: String,
    /// Maximum number of visits held in the session store
    pub session_capacity: usize,
    /// Sequence-memory battery settings
    pub battery: BatteryConfig,
}

impl ServerConfig {
    /// Build the configuration from environment variables, falling back to defaults
    pub fn from_env() -> Result<Self, BatteryError> {
        let bind_address = env::var("BIND_ADDRESS").unwrap_or_else(|_| "127.0.0.1:5001".to_string());
        let database_path = env::var("DATABASE_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("instance").join("cognitive_tests.db"));

        let admin_password = match env::var("ADMIN_PASSWORD") {
            Ok(pw) => pw,
            Err(_) => {
                warn!("ADMIN_PASSWORD not set, using the development default");
                "local_admin_pw".to_string()
            }
        };

        let session_capacity = match env::var("SESSION_CAPACITY") {
            Ok(raw) => raw.parse::<usize>().ok().filter(|c| *c > 0).ok_or_else(|| {
                BatteryError::ConfigurationError(format!("invalid SESSION_CAPACITY '{}'", raw))
            })?,
            Err(_) => 10_000,
        };

        let battery = match env::var("BATTERY_CONFIG") {
            Ok(path) => {
                info!("Loading battery configuration from {}", path);
                BatteryConfig::from_file(&path)?
            }
            Err(_) => BatteryConfig::default(),
        };
        battery.validate()?;

        Ok(Self {
            bind_address,
            database_path,
            admin_password,
            session_capacity,
            battery,
        })
    }
}
