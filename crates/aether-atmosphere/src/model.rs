//! Physical atmosphere model: radii, scale heights, and scattering coefficients.
//!
//! All lengths are in kilometres and all coefficients are per kilometre, which
//! keeps the numbers in a range where `f32` integration stays stable.

use glam::Vec3;
use serde::{Deserialize, Serialize};
use std::f32::consts::PI;

use crate::error::AtmosphereError;

/// Distance between the top of the atmosphere and the sphere rays are integrated to.
pub const LIMIT_MARGIN: f32 = 1.0;

/// Ratio between Mie scattering and Mie extinction used by [`ModelConfig::set_mie_scattering`].
pub const MIE_SINGLE_SCATTERING_ALBEDO: f32 = 0.9;

/// Physical parameters of a planet's atmosphere.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Planet (sea level) radius `Rg`.
    pub planet_radius: f32,
    /// Top-of-atmosphere radius `Rt`.
    pub top_radius: f32,
    /// Rayleigh scale height `HR`.
    pub rayleigh_scale_height: f32,
    /// Rayleigh scattering coefficients at sea level (RGB).
    pub rayleigh_scattering: [f32; 3],
    /// Mie scale height `HM`.
    pub mie_scale_height: f32,
    /// Mie scattering coefficients at sea level (RGB).
    pub mie_scattering: [f32; 3],
    /// Mie extinction coefficients at sea level (RGB).
    pub mie_extinction: [f32; 3],
    /// Henyey-Greenstein style anisotropy of the Mie phase function.
    pub mie_g: f32,
    /// Average ground albedo used for the light bounced back into the atmosphere.
    pub average_ground_reflectance: f32,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self::earth()
    }
}

impl ModelConfig {
    /// Clear-sky Earth atmosphere.
    pub fn earth() -> Self {
        let mie = 4e-3;
        Self {
            planet_radius: 6360.0,
            top_radius: 6420.0,
            rayleigh_scale_height: 8.0,
            rayleigh_scattering: [5.8e-3, 1.35e-2, 3.31e-2],
            mie_scale_height: 1.2,
            mie_scattering: [mie; 3],
            mie_extinction: [mie / MIE_SINGLE_SCATTERING_ALBEDO; 3],
            mie_g: 0.8,
            average_ground_reflectance: 0.1,
        }
    }

    /// Set a uniform Mie scattering coefficient and derive the matching extinction.
    pub fn set_mie_scattering(&mut self, coefficient: f32) {
        self.mie_scattering = [coefficient; 3];
        self.mie_extinction = [coefficient / MIE_SINGLE_SCATTERING_ALBEDO; 3];
    }

    /// Radius of the sphere view and light rays are integrated to (`RL`).
    pub fn limit_radius(&self) -> f32 {
        self.top_radius + LIMIT_MARGIN
    }

    pub fn beta_r(&self) -> Vec3 {
        Vec3::from_array(self.rayleigh_scattering)
    }

    pub fn beta_m_sca(&self) -> Vec3 {
        Vec3::from_array(self.mie_scattering)
    }

    pub fn beta_m_ex(&self) -> Vec3 {
        Vec3::from_array(self.mie_extinction)
    }

    /// Check that every parameter is in a range the precomputation can integrate.
    pub fn validate(&self) -> Result<(), AtmosphereError> {
        fn invalid(name: &'static str, value: f32, reason: &'static str) -> AtmosphereError {
            AtmosphereError::InvalidModelParameter {
                name,
                value,
                reason,
            }
        }

        if !(self.planet_radius.is_finite() && self.planet_radius > 0.0) {
            return Err(invalid(
                "planet_radius",
                self.planet_radius,
                "must be positive",
            ));
        }
        if !(self.top_radius.is_finite() && self.top_radius > self.planet_radius) {
            return Err(invalid(
                "top_radius",
                self.top_radius,
                "must exceed the planet radius",
            ));
        }
        if !(self.rayleigh_scale_height.is_finite() && self.rayleigh_scale_height > 0.0) {
            return Err(invalid(
                "rayleigh_scale_height",
                self.rayleigh_scale_height,
                "must be positive",
            ));
        }
        if !(self.mie_scale_height.is_finite() && self.mie_scale_height > 0.0) {
            return Err(invalid(
                "mie_scale_height",
                self.mie_scale_height,
                "must be positive",
            ));
        }
        let coefficients = [
            ("rayleigh_scattering", self.rayleigh_scattering),
            ("mie_scattering", self.mie_scattering),
            ("mie_extinction", self.mie_extinction),
        ];
        for (name, rgb) in coefficients {
            if let Some(&bad) = rgb.iter().find(|c| !(c.is_finite() && **c >= 0.0)) {
                return Err(invalid(name, bad, "must be non-negative"));
            }
        }
        if !(self.mie_g.is_finite() && self.mie_g > -1.0 && self.mie_g < 1.0) {
            return Err(invalid("mie_g", self.mie_g, "must lie in (-1, 1)"));
        }
        if !(0.0..=1.0).contains(&self.average_ground_reflectance) {
            return Err(invalid(
                "average_ground_reflectance",
                self.average_ground_reflectance,
                "must lie in [0, 1]",
            ));
        }
        Ok(())
    }

    /// Distance from radius `r` along `mu` to the ground or the `RL` sphere.
    pub fn limit(&self, r: f32, mu: f32) -> f32 {
        let rg = self.planet_radius;
        let rl = self.limit_radius();
        let mut dout = -r * mu + (r * r * (mu * mu - 1.0) + rl * rl).max(0.0).sqrt();
        let delta2 = r * r * (mu * mu - 1.0) + rg * rg;
        if delta2 >= 0.0 {
            let din = -r * mu - delta2.sqrt();
            if din >= 0.0 {
                dout = dout.min(din);
            }
        }
        dout
    }

    /// Cosine of the horizon seen from radius `r` (negative below the horizontal).
    pub fn horizon_mu(&self, r: f32) -> f32 {
        let ratio = self.planet_radius / r;
        -(1.0 - ratio * ratio).max(0.0).sqrt()
    }

    /// Trapezoid-integrated density along the ray `(r, mu)` for one scale height.
    ///
    /// Rays that hit the ground are treated as opaque.
    pub fn optical_depth(&self, scale_height: f32, r: f32, mu: f32, samples: u32) -> f32 {
        if mu < self.horizon_mu(r) {
            return 1e9;
        }
        let rg = self.planet_radius;
        let dx = self.limit(r, mu) / samples as f32;
        let mut yi = (-(r - rg) / scale_height).exp();
        let mut result = 0.0;
        for i in 1..=samples {
            let xj = i as f32 * dx;
            let rj = (r * r + xj * xj + 2.0 * xj * r * mu).sqrt();
            let yj = (-(rj - rg) / scale_height).exp();
            result += (yi + yj) * 0.5 * dx;
            yi = yj;
        }
        result
    }

    /// Transmittance from radius `r` along `mu` to the atmosphere boundary, integrated directly.
    pub fn direct_transmittance(&self, r: f32, mu: f32, samples: u32) -> Vec3 {
        let depth_r = self.optical_depth(self.rayleigh_scale_height, r, mu, samples);
        let depth_m = self.optical_depth(self.mie_scale_height, r, mu, samples);
        let tau = self.beta_r() * depth_r + self.beta_m_ex() * depth_m;
        (-tau).exp()
    }

    /// Closed-form transmittance over a segment of length `d`.
    ///
    /// Uses the Chapman-function approximation; avoids the imprecision of the
    /// table lookup near the horizon.
    pub fn analytic_transmittance(&self, r: f32, mu: f32, d: f32) -> Vec3 {
        let tau = self.beta_r() * self.analytic_optical_depth(self.rayleigh_scale_height, r, mu, d)
            + self.beta_m_ex() * self.analytic_optical_depth(self.mie_scale_height, r, mu, d);
        (-tau).exp()
    }

    fn analytic_optical_depth(&self, h: f32, r: f32, mu: f32, d: f32) -> f32 {
        let a = ((0.5 / h) * r).sqrt();
        let a0 = a * mu;
        let a1 = a * (mu + d / r);
        let x = if a1.signum() > a0.signum() {
            (a0 * a0).exp()
        } else {
            0.0
        };
        let y0 = a0.signum() / (2.3193 * a0.abs() + (1.52 * a0 * a0 + 4.0).sqrt());
        let y1 = a1.signum() / (2.3193 * a1.abs() + (1.52 * a1 * a1 + 4.0).sqrt())
            * (-d / h * (d / (2.0 * r) + mu)).exp();
        ((2.0 * PI * h) * r).sqrt() * ((self.planet_radius - r) / h).exp() * (x + y0 - y1)
    }
}

/// Rayleigh phase function.
pub fn phase_rayleigh(nu: f32) -> f32 {
    (3.0 / (16.0 * PI)) * (1.0 + nu * nu)
}

/// Cornette-Shanks Mie phase function.
pub fn phase_mie(nu: f32, g: f32) -> f32 {
    let g2 = g * g;
    1.5 * 1.0 / (4.0 * PI) * (1.0 - g2) * (1.0 + g2 - 2.0 * g * nu).powf(-1.5) * (1.0 + nu * nu)
        / (2.0 + g2)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_earth() {
        let model = ModelConfig::default();
        assert_eq!(model.planet_radius, 6360.0);
        assert_eq!(model.top_radius, 6420.0);
        assert_eq!(model.limit_radius(), 6421.0);
        assert!(model.validate().is_ok());
    }

    #[test]
    fn test_mie_extinction_follows_scattering() {
        let mut model = ModelConfig::earth();
        model.set_mie_scattering(9e-3);
        assert_eq!(model.mie_scattering, [9e-3; 3]);
        assert!((model.mie_extinction[0] - 1e-2).abs() < 1e-7);
    }

    #[test]
    fn test_negative_scale_height_rejected() {
        let mut model = ModelConfig::earth();
        model.rayleigh_scale_height = -8.0;
        let err = model.validate().unwrap_err();
        assert!(matches!(
            err,
            AtmosphereError::InvalidModelParameter {
                name: "rayleigh_scale_height",
                ..
            }
        ));
    }

    #[test]
    fn test_top_below_planet_rejected() {
        let mut model = ModelConfig::earth();
        model.top_radius = 6000.0;
        assert!(model.validate().is_err());
    }

    #[test]
    fn test_phase_g_out_of_range_rejected() {
        let mut model = ModelConfig::earth();
        model.mie_g = 1.0;
        assert!(model.validate().is_err());
    }

    #[test]
    fn test_limit_straight_up_reaches_limit_sphere() {
        let model = ModelConfig::earth();
        let r = model.planet_radius + 1.0;
        let d = model.limit(r, 1.0);
        assert!((d - (model.limit_radius() - r)).abs() < 1e-2);
    }

    #[test]
    fn test_limit_straight_down_hits_ground() {
        let model = ModelConfig::earth();
        let r = model.planet_radius + 2.0;
        let d = model.limit(r, -1.0);
        assert!((d - 2.0).abs() < 1e-2);
    }

    #[test]
    fn test_optical_depth_below_horizon_is_opaque() {
        let model = ModelConfig::earth();
        let r = model.planet_radius + 1.0;
        assert_eq!(model.optical_depth(8.0, r, -1.0, 100), 1e9);
    }

    #[test]
    fn test_zenith_optical_depth_close_to_scale_height() {
        // Integral of exp(-h/H) from 0 to ~infinity is H.
        let model = ModelConfig::earth();
        let depth = model.optical_depth(8.0, model.planet_radius, 1.0, 500);
        assert!((depth - 8.0).abs() < 0.05, "depth = {depth}");
    }

    #[test]
    fn test_analytic_matches_integrated_transmittance() {
        let model = ModelConfig::earth();
        let r = model.planet_radius + 0.5;
        let mu = 0.5;
        let d = model.limit(r, mu);
        let analytic = model.analytic_transmittance(r, mu, d);
        let integrated = model.direct_transmittance(r, mu, 500);
        assert!(
            (analytic - integrated).abs().max_element() < 0.02,
            "analytic {analytic} vs integrated {integrated}"
        );
    }

    #[test]
    fn test_phase_functions_positive_and_forward_peaked() {
        assert!(phase_rayleigh(0.0) > 0.0);
        assert!((phase_rayleigh(1.0) - phase_rayleigh(-1.0)).abs() < 1e-7);
        assert!(phase_mie(1.0, 0.8) > phase_mie(-1.0, 0.8));
    }
}
