//! Simulation parameters.
//!
//! A [`SimConfig`] is built once (defaults, or a TOML file) and then passed by
//! reference to every component. Nothing reads configuration from globals.

use std::path::Path;

use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Every tunable of the field, the battery and the decision loop.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Side of one grid cell in world units.
    pub cell_size: i32,
    /// Width of the field in world units.
    pub field_width: i32,
    /// Height of the field in world units, including the HUD band.
    pub field_height: i32,
    /// Height of the reserved band at the top of the field.
    pub hud_height: i32,

    /// Battery capacity.
    pub max_charge: f64,
    /// At or below this level the robot abandons its task and goes to charge.
    pub emergency_charge: f64,
    /// Charge spent per single-cell step.
    pub charge_per_move: f64,
    /// Charge gained per decision tick while docked.
    pub recharge_rate: f64,

    /// Minimum time between two decision ticks in normal mode.
    pub decision_cooldown_ms: u64,
    /// World units travelled per frame while interpolating a step.
    pub animation_speed: i32,
    /// Consecutive failed path computations tolerated before giving up.
    pub max_stuck_retries: u32,

    /// Number of items placed in a generated layout; delivering this many
    /// ends the episode.
    pub total_items: usize,
    /// Number of fixed obstacles a generated layout tries to place.
    pub obstacle_count: usize,
    pub station_size: i32,
    pub basket_size: i32,
}

impl Default for SimConfig {
    fn default() -> Self {
        SimConfig {
            cell_size: 30,
            field_width: 810,
            field_height: 660,
            hud_height: 60,
            max_charge: 600.0,
            emergency_charge: 250.0,
            charge_per_move: 2.0,
            recharge_rate: 600.0 / 30.0,
            decision_cooldown_ms: 100,
            animation_speed: 5,
            max_stuck_retries: 1,
            total_items: 10,
            obstacle_count: 10,
            station_size: 30,
            basket_size: 30,
        }
    }
}

impl SimConfig {
    /// Parses a TOML document. Missing keys take their default value.
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: SimConfig = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Loads and validates a TOML configuration file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let source = std::fs::read_to_string(path)?;
        Self::from_toml_str(&source)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Invalid(msg));

        if self.cell_size <= 0 {
            return invalid(format!("cell_size must be positive, got {}", self.cell_size));
        }
        if self.field_width < self.cell_size {
            return invalid(format!(
                "field_width {} holds no column of size {}",
                self.field_width, self.cell_size
            ));
        }
        let playable_rows = self.field_height / self.cell_size - self.hud_height / self.cell_size;
        if self.hud_height < 0 || playable_rows <= 0 {
            return invalid(format!(
                "field_height {} leaves no playable row below hud_height {}",
                self.field_height, self.hud_height
            ));
        }
        if self.max_charge <= 0.0 {
            return invalid(format!("max_charge must be positive, got {}", self.max_charge));
        }
        if !(0.0..self.max_charge).contains(&self.emergency_charge) {
            return invalid(format!(
                "emergency_charge {} must lie in [0, max_charge {})",
                self.emergency_charge, self.max_charge
            ));
        }
        if self.charge_per_move <= 0.0 || self.recharge_rate <= 0.0 {
            return invalid("charge_per_move and recharge_rate must be positive".to_string());
        }
        if self.animation_speed <= 0 {
            return invalid("animation_speed must be positive".to_string());
        }
        if self.max_stuck_retries == 0 {
            return invalid("max_stuck_retries must be at least 1".to_string());
        }
        if self.station_size <= 0 || self.basket_size <= 0 {
            return invalid("station_size and basket_size must be positive".to_string());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(SimConfig::default().validate().is_ok());
    }

    #[test]
    fn partial_toml_keeps_defaults() {
        let config = SimConfig::from_toml_str(
            r#"
            max_charge = 100.0
            emergency_charge = 20.0
            total_items = 3
            "#,
        )
        .unwrap();
        assert_eq!(config.max_charge, 100.0);
        assert_eq!(config.total_items, 3);
        assert_eq!(config.cell_size, 30);
        assert_eq!(config.recharge_rate, 20.0);
    }

    #[test]
    fn rejects_threshold_above_capacity() {
        let err =
            SimConfig::from_toml_str("max_charge = 100.0\nemergency_charge = 150.0").unwrap_err();
        assert!(matches!(err, ConfigError::Invalid(_)));
    }

    #[test]
    fn rejects_field_without_rows() {
        let config = SimConfig {
            field_height: 60,
            ..SimConfig::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn reports_parse_errors() {
        let err = SimConfig::from_toml_str("cell_size = \"big\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
    }
}
