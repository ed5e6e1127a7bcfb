//! Configuration structs with sensible defaults and RON persistence.

use std::path::{Path, PathBuf};

use aether_atmosphere::{ModelConfig, SampleCounts, TableResolution};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

const CONFIG_FILE: &str = "config.ron";

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Config {
    /// Physical atmosphere model.
    pub atmosphere: ModelConfig,
    /// Table sizes and integration sample counts.
    pub precompute: PrecomputeConfig,
    /// Per-frame sky appearance.
    pub sky: SkyConfig,
    /// Output of the bake tool.
    pub bake: BakeConfig,
    pub debug: DebugConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PrecomputeConfig {
    pub resolution: TableResolution,
    pub samples: SampleCounts,
}

impl PrecomputeConfig {
    /// Coarse tables for quick iteration.
    pub fn preview() -> Self {
        Self {
            resolution: TableResolution::preview(),
            samples: SampleCounts::preview(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SkyConfig {
    /// Multiplier on the angular sun radius.
    pub sun_scale: f32,
    pub exposure: f32,
    /// Blue hour tint (RGB).
    pub lheurebleue_color: [f32; 3],
    pub lheurebleue_intensity: f32,
    /// Camera altitude above sea level in km.
    pub altitude_km: f32,
    /// Use the analytic optical depth for view-ray attenuation.
    pub analytic_transmittance: bool,
    pub dither: bool,
    /// Shade rays hitting the planet.
    pub ground: bool,
}

impl Default for SkyConfig {
    fn default() -> Self {
        Self {
            sun_scale: 2.0,
            exposure: 0.22,
            lheurebleue_color: [0.08, 0.30, 1.00],
            lheurebleue_intensity: 0.5,
            altitude_km: 0.2,
            analytic_transmittance: false,
            dither: true,
            ground: true,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BakeConfig {
    /// Directory receiving shader sources and previews.
    pub out_dir: PathBuf,
    /// Size of the rendered sky image.
    pub render_width: u32,
    pub render_height: u32,
    /// Sun position for the rendered sky, in degrees.
    pub sun_altitude_deg: f32,
    pub sun_azimuth_deg: f32,
}

impl Default for BakeConfig {
    fn default() -> Self {
        Self {
            out_dir: PathBuf::from("aether-out"),
            render_width: 512,
            render_height: 256,
            sun_altitude_deg: 10.0,
            sun_azimuth_deg: 0.0,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct DebugConfig {
    /// Log level override (e.g., "debug", "info", "warn").
    pub log_level: String,
}

impl Default for DebugConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

/// Platform config directory for the atmosphere tools.
pub fn default_config_dir() -> Result<PathBuf, ConfigError> {
    dirs::config_dir()
        .map(|dir| dir.join("aether"))
        .ok_or(ConfigError::NoConfigDir)
}

// --- Load / Save / Reload ---

impl Config {
    /// Load config from the given directory, or create a default config file.
    pub fn load_or_create(config_dir: &Path) -> Result<Self, ConfigError> {
        let config_path = config_dir.join(CONFIG_FILE);

        if config_path.exists() {
            let contents = std::fs::read_to_string(&config_path).map_err(ConfigError::ReadError)?;
            let config: Config = ron::from_str(&contents).map_err(ConfigError::ParseError)?;
            log::info!("Loaded config from {}", config_path.display());
            Ok(config)
        } else {
            let config = Config::default();
            config.save(config_dir)?;
            log::info!("Created default config at {}", config_path.display());
            Ok(config)
        }
    }

    /// Save config to the given directory as `config.ron`.
    pub fn save(&self, config_dir: &Path) -> Result<(), ConfigError> {
        std::fs::create_dir_all(config_dir).map_err(ConfigError::WriteError)?;

        let pretty = ron::ser::PrettyConfig::new()
            .depth_limit(3)
            .separate_tuple_members(true)
            .enumerate_arrays(false);
        let serialized =
            ron::ser::to_string_pretty(self, pretty).map_err(ConfigError::SerializeError)?;

        std::fs::write(config_dir.join(CONFIG_FILE), serialized).map_err(ConfigError::WriteError)?;
        Ok(())
    }

    /// Returns `Some(new_config)` if the file on disk differs from `self`.
    pub fn reload(&self, config_dir: &Path) -> Result<Option<Self>, ConfigError> {
        let contents = std::fs::read_to_string(config_dir.join(CONFIG_FILE))
            .map_err(ConfigError::ReadError)?;
        let new_config: Config = ron::from_str(&contents).map_err(ConfigError::ParseError)?;

        if &new_config != self {
            log::info!("Config reloaded with changes");
            Ok(Some(new_config))
        } else {
            Ok(None)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_serializes() {
        let ron_str =
            ron::ser::to_string_pretty(&Config::default(), ron::ser::PrettyConfig::new().depth_limit(3))
                .unwrap();
        assert!(ron_str.contains("planet_radius: 6360.0"));
        assert!(ron_str.contains("exposure: 0.22"));
    }

    #[test]
    fn test_sky_defaults_match_drawable_baseline() {
        let sky = SkyConfig::default();
        assert_eq!(sky.sun_scale, 2.0);
        assert_eq!(sky.exposure, 0.22);
        assert_eq!(sky.lheurebleue_color, [0.08, 0.30, 1.00]);
        assert_eq!(sky.lheurebleue_intensity, 0.5);
    }

    #[test]
    fn test_missing_section_uses_default() {
        let config: Config = ron::from_str("(sky: (exposure: 0.4))").unwrap();
        assert_eq!(config.atmosphere, ModelConfig::earth());
        assert_eq!(config.sky.exposure, 0.4);
        assert_eq!(config.sky.sun_scale, 2.0);
    }

    #[test]
    fn test_extra_field_ignored() {
        let result: Result<Config, _> = ron::from_str("(future_setting: true)");
        assert!(result.is_ok());
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.atmosphere.mie_g = 0.7;
        config.precompute = PrecomputeConfig::preview();
        config.bake.out_dir = PathBuf::from("/tmp/sky");

        config.save(dir.path()).unwrap();
        let loaded = Config::load_or_create(dir.path()).unwrap();
        assert_eq!(config, loaded);
    }

    #[test]
    fn test_load_or_create_writes_default_file() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_or_create(dir.path()).unwrap();
        assert_eq!(config, Config::default());
        assert!(dir.path().join(CONFIG_FILE).exists());
    }

    #[test]
    fn test_reload_detects_changes() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::default();
        config.save(dir.path()).unwrap();

        let mut modified = config.clone();
        modified.precompute.samples.scattering_orders = 6;
        modified.save(dir.path()).unwrap();

        let result = config.reload(dir.path()).unwrap();
        assert_eq!(result.unwrap().precompute.samples.scattering_orders, 6);
    }

    #[test]
    fn test_reload_no_changes() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::default();
        config.save(dir.path()).unwrap();
        assert!(config.reload(dir.path()).unwrap().is_none());
    }

    #[test]
    fn test_invalid_ron_produces_error() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE), "{{not valid}}").unwrap();
        assert!(matches!(
            Config::load_or_create(dir.path()),
            Err(ConfigError::ParseError(_))
        ));
    }
}
