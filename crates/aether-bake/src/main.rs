//! Bakes the atmospheric scattering tables and writes the composed sky program.
//!
//! Output directory contents:
//! - `sky.vert.wgsl`, `sky.frag.wgsl`: the sky program for the baked model
//! - `transmittance.png`, `irradiance.png`, `inscatter.png`, `inscatter_mie.png`: table previews
//! - `sky.png` with `--render`: the sky rendered on the GPU

mod preview;
mod render;

use std::path::Path;
use std::time::Instant;

use aether_atmosphere::{AtmosphereError, PrecomputeEngine};
use aether_config::{CliArgs, Config, default_config_dir};
use aether_sky::{SkyError, SkyProgram, macro_set};
use clap::Parser;
use tracing::info;

#[derive(Debug, thiserror::Error)]
enum BakeError {
    #[error(transparent)]
    Atmosphere(#[from] AtmosphereError),

    #[error(transparent)]
    Sky(#[from] SkyError),

    #[error("failed to write {path}: {source}")]
    Write {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to encode {path}: {source}")]
    Image {
        path: String,
        #[source]
        source: image::ImageError,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = CliArgs::parse();

    let config_dir = match args.config.clone() {
        Some(dir) => dir,
        None => default_config_dir()?,
    };
    let mut config = Config::load_or_create(&config_dir).unwrap_or_else(|e| {
        eprintln!("Failed to load config: {e}, using defaults");
        Config::default()
    });
    config.apply_cli_overrides(&args);

    aether_log::init_logging(
        Some(&config_dir.join("logs")),
        cfg!(debug_assertions),
        Some(&config),
    );

    bake(&config, args.render)?;
    Ok(())
}

fn bake(config: &Config, render: bool) -> Result<(), BakeError> {
    let out_dir = &config.bake.out_dir;
    std::fs::create_dir_all(out_dir).map_err(|source| BakeError::Write {
        path: out_dir.display().to_string(),
        source,
    })?;

    let mut engine = PrecomputeEngine::with_resolution(
        config.atmosphere.clone(),
        config.precompute.resolution,
        config.precompute.samples,
    )?;
    let start = Instant::now();
    engine.compute()?;
    info!(
        orders = engine.samples().scattering_orders,
        elapsed_ms = start.elapsed().as_millis() as u64,
        "Baked lookup tables"
    );

    let program = SkyProgram::new(render::build_options(config));
    let vertex = program.build_vertex_source().map_err(SkyError::from)?;
    let fragment = program
        .build_fragment_source(&macro_set(&engine.macro_params()))
        .map_err(SkyError::from)?;
    write_text(&out_dir.join("sky.vert.wgsl"), &vertex)?;
    write_text(&out_dir.join("sky.frag.wgsl"), &fragment)?;

    if let Some(tables) = engine.tables() {
        for (name, image) in preview::table_previews(tables) {
            save_image(&out_dir.join(name), &image)?;
        }
    }

    if render {
        let sky = render::render_sky(config, engine)?;
        save_image(&out_dir.join("sky.png"), &image::DynamicImage::ImageRgba8(sky))?;
    }

    info!("Wrote bake output to {}", out_dir.display());
    Ok(())
}

fn write_text(path: &Path, text: &str) -> Result<(), BakeError> {
    std::fs::write(path, text).map_err(|source| BakeError::Write {
        path: path.display().to_string(),
        source,
    })
}

fn save_image(path: &Path, image: &image::DynamicImage) -> Result<(), BakeError> {
    image.save(path).map_err(|source| BakeError::Image {
        path: path.display().to_string(),
        source,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use aether_atmosphere::TableResolution;
    use aether_config::PrecomputeConfig;

    #[test]
    fn test_bake_writes_program_and_previews() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.precompute = PrecomputeConfig::preview();
        config.precompute.samples.scattering_orders = 2;
        config.bake.out_dir = dir.path().join("out");

        bake(&config, false).unwrap();

        let out = &config.bake.out_dir;
        let fragment = std::fs::read_to_string(out.join("sky.frag.wgsl")).unwrap();
        assert!(fragment.contains("fn fs_main"));
        assert!(!fragment.contains("{{"));
        for name in ["transmittance.png", "irradiance.png", "inscatter.png", "inscatter_mie.png"] {
            assert!(out.join(name).is_file(), "{name}");
        }
        let res = TableResolution::preview();
        let inscatter = image::open(out.join("inscatter.png")).unwrap();
        assert_eq!(inscatter.width(), res.inscatter_width());
        assert_eq!(inscatter.height(), res.res_mu * res.res_r);
        assert!(!out.join("sky.png").exists());
    }

    #[test]
    fn test_invalid_model_fails_bake() {
        let dir = tempfile::tempdir().unwrap();
        let mut config = Config::default();
        config.precompute = PrecomputeConfig::preview();
        config.atmosphere.top_radius = config.atmosphere.planet_radius;
        config.bake.out_dir = dir.path().to_path_buf();
        assert!(matches!(
            bake(&config, false),
            Err(BakeError::Atmosphere(_))
        ));
    }
}
