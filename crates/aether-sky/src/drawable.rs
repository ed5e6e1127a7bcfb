//! The procedural sky: precomputed tables, the composed program and the per-frame draw.

use aether_atmosphere::PrecomputeEngine;
use glam::{Mat4, Vec3, Vec4};

use crate::astronomy::Astronomy;
use crate::backend::{RenderState, RenderStateGuard, SkyBackend};
use crate::error::SkyError;
use crate::program::{BuildOptions, SkyProgram, macro_set};
use crate::uniforms::UniformValue;

/// Draws a physically based sky through a [`SkyBackend`].
///
/// Construction computes the lookup tables, composes the program and uploads
/// everything. After that [`update`](Self::update) is the only place that
/// recomposes the program, and only when a model setter changed the tables.
/// A failed rebuild is retried on every following update, and drawing is
/// refused until one succeeds.
pub struct SkyDrawable<B: SkyBackend> {
    backend: B,
    engine: PrecomputeEngine,
    program: SkyProgram,
    vertex_source: String,
    fragment_source: String,
    sun_scale: f32,
    exposure: f32,
    lheurebleue_color: Vec3,
    lheurebleue_intensity: f32,
    altitude: f32,
    inverse_view_projection: Mat4,
    rebuild_pending: bool,
}

impl<B: SkyBackend> SkyDrawable<B> {
    pub fn new(mut backend: B, mut engine: PrecomputeEngine, options: BuildOptions) -> Result<Self, SkyError> {
        engine.compute()?;
        backend.create_textures(engine.resolution())?;

        let program = SkyProgram::new(options);
        let vertex_source = program.build_vertex_source()?;

        let mut sky = Self {
            backend,
            engine,
            program,
            vertex_source,
            fragment_source: String::new(),
            sun_scale: Self::default_sun_scale(),
            exposure: Self::default_exposure(),
            lheurebleue_color: Self::default_lheurebleue_color(),
            lheurebleue_intensity: Self::default_lheurebleue_intensity(),
            altitude: Self::default_altitude(),
            inverse_view_projection: Mat4::IDENTITY,
            rebuild_pending: true,
        };
        sky.rebuild()?;
        Ok(sky)
    }

    pub const fn default_sun_scale() -> f32 {
        2.0
    }

    pub const fn default_exposure() -> f32 {
        0.22
    }

    pub const fn default_lheurebleue_color() -> Vec3 {
        Vec3::new(0.08, 0.30, 1.00)
    }

    pub const fn default_lheurebleue_intensity() -> f32 {
        0.5
    }

    /// Camera altitude above sea level in km.
    pub const fn default_altitude() -> f32 {
        0.2
    }

    /// Scale applied to the angular sun radius for the drawn disc.
    pub fn sun_scale(&self) -> f32 {
        self.sun_scale
    }

    pub fn set_sun_scale(&mut self, scale: f32) {
        self.sun_scale = scale;
    }

    pub fn exposure(&self) -> f32 {
        self.exposure
    }

    pub fn set_exposure(&mut self, exposure: f32) {
        self.exposure = exposure;
    }

    /// Tint of the blue hour.
    pub fn lheurebleue_color(&self) -> Vec3 {
        self.lheurebleue_color
    }

    pub fn set_lheurebleue_color(&mut self, color: Vec3) {
        self.lheurebleue_color = color;
    }

    pub fn lheurebleue_intensity(&self) -> f32 {
        self.lheurebleue_intensity
    }

    pub fn set_lheurebleue_intensity(&mut self, intensity: f32) {
        self.lheurebleue_intensity = intensity;
    }

    pub fn altitude(&self) -> f32 {
        self.altitude
    }

    pub fn set_altitude(&mut self, altitude: f32) {
        self.altitude = altitude;
    }

    pub fn set_inverse_view_projection(&mut self, matrix: Mat4) {
        self.inverse_view_projection = matrix;
    }

    pub fn set_average_ground_reflectance(&mut self, reflectance: f32) {
        self.engine.set_average_ground_reflectance(reflectance);
    }

    pub fn set_thickness_rayleigh(&mut self, thickness: f32) {
        self.engine.set_rayleigh_scale_height(thickness);
    }

    pub fn set_scattering_rayleigh(&mut self, coefficients: Vec3) {
        self.engine.set_rayleigh_scattering(coefficients.to_array());
    }

    pub fn set_thickness_mie(&mut self, thickness: f32) {
        self.engine.set_mie_scale_height(thickness);
    }

    pub fn set_scattering_mie(&mut self, coefficient: f32) {
        self.engine.set_mie_scattering(coefficient);
    }

    pub fn set_phase_g(&mut self, g: f32) {
        self.engine.set_mie_phase_g(g);
    }

    pub fn set_scattering_orders(&mut self, orders: u32) {
        self.engine.set_scattering_orders(orders);
    }

    pub fn engine(&self) -> &PrecomputeEngine {
        &self.engine
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn backend_mut(&mut self) -> &mut B {
        &mut self.backend
    }

    pub fn fragment_source(&self) -> &str {
        &self.fragment_source
    }

    pub fn vertex_source(&self) -> &str {
        &self.vertex_source
    }

    /// Push this frame's uniforms and recompute the tables if the model changed.
    pub fn update(&mut self, astronomy: &dyn Astronomy) -> Result<(), SkyError> {
        let config = self.engine.config();
        let cmn = Vec4::new(
            self.altitude,
            config.planet_radius,
            config.top_radius,
            astronomy.time(),
        );
        let uniforms = [
            (
                "inverseViewProjection",
                UniformValue::Mat4(self.inverse_view_projection),
            ),
            ("sun", UniformValue::Vec3(astronomy.sun_direction())),
            (
                "sunr",
                UniformValue::Vec3(astronomy.refracted_sun_direction()),
            ),
            ("cmn", UniformValue::Vec4(cmn)),
            (
                "sunScale",
                UniformValue::Float(astronomy.angular_sun_radius() * self.sun_scale),
            ),
            ("exposure", UniformValue::Float(self.exposure)),
            (
                "lheurebleueColor",
                UniformValue::Vec3(self.lheurebleue_color),
            ),
            (
                "lheurebleueIntensity",
                UniformValue::Float(self.lheurebleue_intensity),
            ),
        ];
        for (name, value) in uniforms {
            self.backend.set_uniform(name, value)?;
        }

        match self.engine.compute() {
            Ok(true) => self.rebuild_pending = true,
            Ok(false) => {}
            Err(e) => {
                self.rebuild_pending = true;
                return Err(e.into());
            }
        }
        if self.rebuild_pending {
            self.rebuild()?;
        }
        Ok(())
    }

    /// Draw the sky behind everything already in the depth buffer.
    ///
    /// The previous render state is restored even when the draw fails.
    pub fn draw(&mut self) -> Result<(), SkyError> {
        if self.rebuild_pending {
            return Err(SkyError::StaleProgram);
        }
        debug_assert!(!self.fragment_source.is_empty(), "sky program not built");
        let mut guard = RenderStateGuard::apply(&mut self.backend, RenderState::SKY);
        guard.backend().draw_fullscreen_triangle()
    }

    fn rebuild(&mut self) -> Result<(), SkyError> {
        let tables = self.engine.tables().ok_or_else(|| {
            SkyError::Backend("lookup tables are not computed".to_string())
        })?;
        self.backend.upload_tables(tables)?;

        let fragment_source = self
            .program
            .build_fragment_source(&macro_set(&self.engine.macro_params()))?;
        self.backend
            .build_program(&self.vertex_source, &fragment_source)?;
        self.fragment_source = fragment_source;
        self.rebuild_pending = false;
        log::info!(
            "Rebuilt sky program for model version {}",
            self.engine.version()
        );
        Ok(())
    }
}
