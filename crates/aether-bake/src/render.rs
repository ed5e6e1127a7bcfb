//! Offscreen rendering of the procedural sky into an image.

use aether_atmosphere::PrecomputeEngine;
use aether_config::Config;
use aether_sky::{BuildOptions, FixedAstronomy, SkyDrawable, SkyError, init_wgpu_backend};
use glam::{Mat4, Vec3};

/// Vertical field of view of the preview camera.
const FOV_Y_DEGREES: f32 = 70.0;
/// Camera pitch above the horizon so both sky and ground are in view.
const PITCH_DEGREES: f32 = 15.0;

/// Sky program variants selected by the config.
pub fn build_options(config: &Config) -> BuildOptions {
    BuildOptions {
        analytic_transmittance: config.sky.analytic_transmittance,
        dither: config.sky.dither,
        ground: config.sky.ground,
    }
}

/// Inverse view-projection of a camera at the origin looking towards `azimuth` degrees.
pub fn camera_inverse_view_projection(azimuth: f32, aspect: f32) -> Mat4 {
    let (az_sin, az_cos) = azimuth.to_radians().sin_cos();
    let (pitch_sin, pitch_cos) = PITCH_DEGREES.to_radians().sin_cos();
    let forward = Vec3::new(pitch_cos * az_cos, pitch_cos * az_sin, pitch_sin);
    let view = Mat4::look_to_rh(Vec3::ZERO, forward, Vec3::Z);
    let projection = Mat4::perspective_rh(FOV_Y_DEGREES.to_radians(), aspect, 0.1, 100.0);
    (projection * view).inverse()
}

/// Render the sky once with the engine's tables and return the RGBA8 image.
pub fn render_sky(config: &Config, engine: PrecomputeEngine) -> Result<image::RgbaImage, SkyError> {
    let (width, height) = (config.bake.render_width, config.bake.render_height);
    let backend = init_wgpu_backend(width, height)?;
    let mut sky = SkyDrawable::new(backend, engine, build_options(config))?;

    sky.set_sun_scale(config.sky.sun_scale);
    sky.set_exposure(config.sky.exposure);
    sky.set_lheurebleue_color(Vec3::from_array(config.sky.lheurebleue_color));
    sky.set_lheurebleue_intensity(config.sky.lheurebleue_intensity);
    sky.set_altitude(config.sky.altitude_km);
    sky.set_inverse_view_projection(camera_inverse_view_projection(
        config.bake.sun_azimuth_deg,
        width as f32 / height as f32,
    ));

    let astronomy =
        FixedAstronomy::from_altitude_azimuth(config.bake.sun_altitude_deg, config.bake.sun_azimuth_deg);
    sky.update(&astronomy)?;
    sky.backend_mut().clear(wgpu::Color::BLACK);
    sky.draw()?;

    let pixels = sky.backend().read_color()?;
    image::RgbaImage::from_raw(width, height, pixels)
        .ok_or_else(|| SkyError::Backend("readback size does not match the target".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use glam::Vec4;

    #[test]
    fn test_camera_center_ray_points_at_azimuth_above_horizon() {
        let inv = camera_inverse_view_projection(90.0, 2.0);
        let near = inv * Vec4::new(0.0, 0.0, 0.0, 1.0);
        let far = inv * Vec4::new(0.0, 0.0, 1.0, 1.0);
        let ray = (far.truncate() / far.w - near.truncate() / near.w).normalize();
        assert!(ray.y > 0.9, "ray = {ray}");
        assert!(ray.z > 0.2, "ray = {ray}");
        assert!(ray.x.abs() < 1e-3, "ray = {ray}");
    }

    #[test]
    fn test_build_options_follow_config() {
        let mut config = Config::default();
        config.sky.dither = false;
        config.sky.analytic_transmittance = true;
        let options = build_options(&config);
        assert!(!options.dither);
        assert!(options.analytic_transmittance);
        assert!(options.ground);
    }
}
