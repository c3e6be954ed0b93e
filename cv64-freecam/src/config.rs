use std::fs;
use std::path::Path;

use log::{info, warn};
use serde::{Deserialize, Serialize};

fn default_true() -> bool {
    true
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CameraConfig {
    pub mouse_sensitivity: f32,   // degrees per mouse count
    pub stick_sensitivity: f32,   // degrees per second at full deflection
    pub dpad_speed: f32,          // degrees per second while held
    pub invert_x: bool,
    pub invert_y: bool,
    pub stick_deadzone: f32,      // 0..1 of full deflection
    pub smoothing_enabled: bool,
    pub smoothing_factor: f32,    // lerp factor per frame, 0..1
    pub pitch_min: f32,           // degrees
    pub pitch_max: f32,           // degrees
    pub default_distance: f32,    // guest world units
    pub min_distance: f32,
    pub max_distance: f32,
    pub zoom_step: f32,           // distance change per wheel notch
    pub auto_center_enabled: bool,
    pub auto_center_delay: f32,   // idle seconds before re-centering
    pub auto_center_speed: f32,   // degrees per second
}

impl Default for CameraConfig {
    fn default() -> Self {
        Self {
            mouse_sensitivity: 0.15,
            stick_sensitivity: 120.0,
            dpad_speed: 90.0,
            invert_x: false,
            invert_y: false,
            stick_deadzone: 0.15,
            smoothing_enabled: true,
            smoothing_factor: 0.25,
            pitch_min: -60.0,
            pitch_max: 75.0,
            default_distance: 8.0,
            min_distance: 2.0,
            max_distance: 30.0,
            zoom_step: 1.0,
            auto_center_enabled: false,
            auto_center_delay: 3.0,
            auto_center_speed: 90.0,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CheatConfig {
    pub infinite_health: bool,
    pub infinite_sub_weapon: bool,
    pub moon_jump: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PerformanceConfig {
    pub lag_reduction: bool,
}

impl Default for PerformanceConfig {
    fn default() -> Self {
        Self { lag_reduction: false }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DrawDistanceConfig {
    pub enabled: bool,
    pub multiplier: f32,
}

impl Default for DrawDistanceConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            multiplier: 2.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Config {
    pub version: u32,
    #[serde(default = "default_true")]
    pub free_camera_enabled: bool,
    #[serde(default)]
    pub log_file: Option<String>,
    #[serde(default)]
    pub camera: CameraConfig,
    #[serde(default)]
    pub cheats: CheatConfig,
    #[serde(default)]
    pub performance: PerformanceConfig,
    #[serde(default)]
    pub draw_distance: DrawDistanceConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            version: 2,
            free_camera_enabled: true,
            log_file: None,
            camera: CameraConfig::default(),
            cheats: CheatConfig::default(),
            performance: PerformanceConfig::default(),
            draw_distance: DrawDistanceConfig::default(),
        }
    }
}

impl Config {
    /// Read the file, or fall back to defaults and write them out.
    ///
    /// Runs before the logger exists, so the outcome is returned for the caller to log.
    pub fn load_or_create(config_path: &Path) -> (Self, ConfigSource) {
        let problem = if config_path.exists() {
            match fs::read_to_string(config_path) {
                Ok(content) => match toml::from_str::<Config>(&content) {
                    Ok(config) => return (config, ConfigSource::Loaded),
                    Err(e) => Some(format!("parse error: {}", e)),
                },
                Err(e) => Some(format!("read error: {}", e)),
            }
        } else {
            None
        };

        let config = Config::default();
        let source = match (config.save(config_path), problem) {
            (Ok(()), None) => ConfigSource::Created,
            (Ok(()), Some(reason)) => ConfigSource::Replaced { reason },
            (Err(e), None) => ConfigSource::Unsaved { reason: e.to_string() },
            (Err(e), Some(reason)) => ConfigSource::Unsaved {
                reason: format!("{}; save error: {}", reason, e),
            },
        };
        (config, source)
    }

    pub fn save(&self, config_path: &Path) -> Result<(), Box<dyn std::error::Error>> {
        let toml_string = toml::to_string_pretty(self)?;
        fs::write(config_path, toml_string)?;
        Ok(())
    }
}

/// Where the active configuration came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    Loaded,
    Created,
    /// The file was unusable and has been overwritten with defaults.
    Replaced { reason: String },
    /// Defaults are in use but could not be written out.
    Unsaved { reason: String },
}

impl ConfigSource {
    pub fn log(&self, config_path: &Path) {
        match self {
            ConfigSource::Loaded => info!("[CONFIG] Loaded configuration from {:?}", config_path),
            ConfigSource::Created => info!("[CONFIG] Created default configuration at {:?}", config_path),
            ConfigSource::Replaced { reason } => {
                warn!("[CONFIG] Failed to load {:?} ({}), replaced with defaults", config_path, reason)
            }
            ConfigSource::Unsaved { reason } => {
                warn!("[CONFIG] Using defaults, could not write {:?}: {}", config_path, reason)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_file_fills_in_defaults() {
        let text = r#"
            version = 2

            [cheats]
            moon_jump = true

            [camera]
            invert_y = true
        "#;
        let config: Config = toml::from_str(text).unwrap();
        assert!(config.free_camera_enabled);
        assert!(config.cheats.moon_jump);
        assert!(!config.cheats.infinite_health);
        assert!(config.camera.invert_y);
        assert_eq!(config.camera.pitch_max, CameraConfig::default().pitch_max);
        assert_eq!(config.draw_distance, DrawDistanceConfig::default());
    }

    #[test]
    fn unreadable_file_falls_back_to_defaults() {
        let dir = std::env::temp_dir().join(format!("cv64-freecam-config-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("cv64-freecam.toml");
        fs::write(&path, "this is = = not toml").unwrap();

        let (config, source) = Config::load_or_create(&path);
        assert_eq!(config, Config::default());
        assert!(matches!(source, ConfigSource::Replaced { ref reason } if reason.starts_with("parse error")));

        let (reloaded, source) = Config::load_or_create(&path);
        assert_eq!(reloaded, Config::default());
        assert_eq!(source, ConfigSource::Loaded);
        let _ = fs::remove_dir_all(&dir);
    }

    #[test]
    fn missing_file_is_created() {
        let dir = std::env::temp_dir().join(format!("cv64-freecam-fresh-{}", std::process::id()));
        fs::create_dir_all(&dir).unwrap();
        let path = dir.join("cv64-freecam.toml");
        let _ = fs::remove_file(&path);

        let (config, source) = Config::load_or_create(&path);
        assert_eq!(config, Config::default());
        assert_eq!(source, ConfigSource::Created);
        assert!(path.exists());
        let _ = fs::remove_dir_all(&dir);
    }
}
