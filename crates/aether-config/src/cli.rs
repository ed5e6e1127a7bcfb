//! Command-line arguments of the bake tool.

use std::path::PathBuf;

use clap::Parser;

use crate::Config;
use crate::config::PrecomputeConfig;

/// Precompute atmospheric scattering tables and write the sky program.
///
/// CLI values override settings loaded from `config.ron`.
#[derive(Parser, Debug, Default)]
#[command(name = "aether-bake", about = "Atmospheric scattering table baker")]
pub struct CliArgs {
    /// Path to config directory (overrides default location).
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Number of scattering orders to accumulate.
    #[arg(long)]
    pub orders: Option<u32>,

    /// Exposure of the rendered sky.
    #[arg(long)]
    pub exposure: Option<f32>,

    /// Output directory.
    #[arg(long)]
    pub out: Option<PathBuf>,

    /// Log level (error, warn, info, debug, trace).
    #[arg(long)]
    pub log_level: Option<String>,

    /// Bake the coarse preview tables instead of the configured ones.
    #[arg(long)]
    pub preview: bool,

    /// Also render the sky on the GPU and save it as `sky.png`.
    #[arg(long)]
    pub render: bool,

    /// Sun altitude in degrees for the rendered sky.
    #[arg(long, allow_negative_numbers = true)]
    pub sun_altitude: Option<f32>,
}

impl Config {
    /// Apply CLI overrides to a loaded config.
    pub fn apply_cli_overrides(&mut self, args: &CliArgs) {
        if args.preview {
            let orders = self.precompute.samples.scattering_orders;
            self.precompute = PrecomputeConfig::preview();
            self.precompute.samples.scattering_orders = orders;
        }
        if let Some(orders) = args.orders {
            self.precompute.samples.scattering_orders = orders;
        }
        if let Some(exposure) = args.exposure {
            self.sky.exposure = exposure;
        }
        if let Some(ref out) = args.out {
            self.bake.out_dir = out.clone();
        }
        if let Some(ref level) = args.log_level {
            self.debug.log_level = level.clone();
        }
        if let Some(altitude) = args.sun_altitude {
            self.bake.sun_altitude_deg = altitude;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aether_atmosphere::TableResolution;

    #[test]
    fn test_cli_override() {
        let mut config = Config::default();
        let args = CliArgs {
            orders: Some(2),
            exposure: Some(0.4),
            out: Some(PathBuf::from("baked")),
            ..Default::default()
        };
        config.apply_cli_overrides(&args);
        assert_eq!(config.precompute.samples.scattering_orders, 2);
        assert_eq!(config.sky.exposure, 0.4);
        assert_eq!(config.bake.out_dir, PathBuf::from("baked"));
        // Non-overridden fields retain defaults
        assert_eq!(config.debug.log_level, "info");
        assert_eq!(config.precompute.resolution, TableResolution::default());
    }

    #[test]
    fn test_cli_no_override() {
        let original = Config::default();
        let mut config = Config::default();
        config.apply_cli_overrides(&CliArgs::default());
        assert_eq!(config, original);
    }

    #[test]
    fn test_preview_keeps_configured_orders() {
        let mut config = Config::default();
        config.precompute.samples.scattering_orders = 3;
        config.apply_cli_overrides(&CliArgs {
            preview: true,
            ..Default::default()
        });
        assert_eq!(config.precompute.resolution, TableResolution::preview());
        assert_eq!(config.precompute.samples.scattering_orders, 3);
    }

    #[test]
    fn test_parse_flags() {
        let args = CliArgs::parse_from([
            "aether-bake",
            "--orders",
            "6",
            "--sun-altitude",
            "-4.5",
            "--render",
        ]);
        assert_eq!(args.orders, Some(6));
        assert_eq!(args.sun_altitude, Some(-4.5));
        assert!(args.render);
        assert!(!args.preview);
    }
}
