//! Table resolutions and integration sample counts.

use serde::{Deserialize, Serialize};

use crate::error::AtmosphereError;

pub const TRANSMITTANCE_W: u32 = 256;
pub const TRANSMITTANCE_H: u32 = 64;

pub const SKY_W: u32 = 64;
pub const SKY_H: u32 = 16;

pub const RES_R: u32 = 32;
pub const RES_MU: u32 = 128;
pub const RES_MU_S: u32 = 32;
pub const RES_NU: u32 = 8;

pub const TRANSMITTANCE_INTEGRAL_SAMPLES: u32 = 500;
pub const INSCATTER_INTEGRAL_SAMPLES: u32 = 50;
pub const IRRADIANCE_INTEGRAL_SAMPLES: u32 = 32;
pub const INSCATTER_SPHERICAL_INTEGRAL_SAMPLES: u32 = 16;

/// Number of scattering orders accumulated into the tables (single scattering is order 1).
pub const SCATTERING_ORDERS: u32 = 4;

/// Dimensions of the three lookup tables.
///
/// The inscatter table folds four dimensions into a 3D texture of
/// `res_mu_s * res_nu` x `res_mu` x `res_r` texels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TableResolution {
    pub transmittance_w: u32,
    pub transmittance_h: u32,
    pub sky_w: u32,
    pub sky_h: u32,
    pub res_r: u32,
    pub res_mu: u32,
    pub res_mu_s: u32,
    pub res_nu: u32,
}

impl Default for TableResolution {
    fn default() -> Self {
        Self {
            transmittance_w: TRANSMITTANCE_W,
            transmittance_h: TRANSMITTANCE_H,
            sky_w: SKY_W,
            sky_h: SKY_H,
            res_r: RES_R,
            res_mu: RES_MU,
            res_mu_s: RES_MU_S,
            res_nu: RES_NU,
        }
    }
}

impl TableResolution {
    /// Coarse tables for quick iteration; roughly two orders of magnitude cheaper to bake.
    pub fn preview() -> Self {
        Self {
            transmittance_w: 64,
            transmittance_h: 16,
            sky_w: 16,
            sky_h: 8,
            res_r: 8,
            res_mu: 32,
            res_mu_s: 8,
            res_nu: 4,
        }
    }

    /// Width of the folded inscatter texture.
    pub fn inscatter_width(&self) -> u32 {
        self.res_mu_s * self.res_nu
    }

    /// Number of inscatter texels.
    pub fn inscatter_len(&self) -> usize {
        (self.inscatter_width() * self.res_mu * self.res_r) as usize
    }

    pub fn validate(&self) -> Result<(), AtmosphereError> {
        let checks = [
            ("transmittance_w", self.transmittance_w, 2),
            ("transmittance_h", self.transmittance_h, 2),
            ("sky_w", self.sky_w, 2),
            ("sky_h", self.sky_h, 2),
            ("res_r", self.res_r, 2),
            ("res_mu", self.res_mu, 4),
            ("res_mu_s", self.res_mu_s, 2),
            ("res_nu", self.res_nu, 2),
        ];
        for (name, value, min) in checks {
            if value < min {
                return Err(AtmosphereError::InvalidResolution { name, value, min });
            }
        }
        if self.res_mu % 2 != 0 {
            return Err(AtmosphereError::InvalidResolution {
                name: "res_mu",
                value: self.res_mu,
                min: self.res_mu + 1,
            });
        }
        Ok(())
    }
}

/// Integration sample counts and the number of scattering orders.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SampleCounts {
    pub transmittance: u32,
    pub inscatter: u32,
    pub irradiance: u32,
    pub inscatter_spherical: u32,
    pub scattering_orders: u32,
}

impl Default for SampleCounts {
    fn default() -> Self {
        Self {
            transmittance: TRANSMITTANCE_INTEGRAL_SAMPLES,
            inscatter: INSCATTER_INTEGRAL_SAMPLES,
            irradiance: IRRADIANCE_INTEGRAL_SAMPLES,
            inscatter_spherical: INSCATTER_SPHERICAL_INTEGRAL_SAMPLES,
            scattering_orders: SCATTERING_ORDERS,
        }
    }
}

impl SampleCounts {
    /// Reject counts the integrators cannot work with; at least one scattering order is required.
    pub fn validate(&self) -> Result<(), AtmosphereError> {
        for (name, value) in [
            ("scattering_orders", self.scattering_orders),
            ("transmittance_samples", self.transmittance),
            ("inscatter_samples", self.inscatter),
            ("inscatter_spherical_samples", self.inscatter_spherical),
        ] {
            if value == 0 {
                return Err(AtmosphereError::InvalidResolution { name, value, min: 1 });
            }
        }
        if self.irradiance < 2 {
            return Err(AtmosphereError::InvalidResolution {
                name: "irradiance_samples",
                value: self.irradiance,
                min: 2,
            });
        }
        Ok(())
    }

    /// Sample counts matching [`TableResolution::preview`].
    pub fn preview() -> Self {
        Self {
            transmittance: 100,
            inscatter: 16,
            irradiance: 8,
            inscatter_spherical: 4,
            scattering_orders: SCATTERING_ORDERS,
        }
    }
}
