//! The sun position feed consumed by the sky every frame.
//!
//! Directions are unit vectors in a local horizon frame with `+z` up.

use glam::Vec3;

/// Mean angular radius of the sun seen from Earth, in radians.
pub const MEAN_SUN_ANGULAR_RADIUS: f32 = 0.004_654;

/// Per-frame astronomical state the sky depends on.
pub trait Astronomy {
    /// Geometric direction towards the sun.
    fn sun_direction(&self) -> Vec3;

    /// Direction towards the sun after atmospheric refraction.
    fn refracted_sun_direction(&self) -> Vec3 {
        self.sun_direction()
    }

    /// Angular radius of the sun disc in radians.
    fn angular_sun_radius(&self) -> f32;

    /// Seconds since an arbitrary epoch; seeds per-frame noise.
    fn time(&self) -> f32;
}

/// An [`Astronomy`] that reports a fixed sun, for tools and tests.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FixedAstronomy {
    pub sun_direction: Vec3,
    pub refracted_sun_direction: Vec3,
    pub angular_sun_radius: f32,
    pub time: f32,
}

impl FixedAstronomy {
    /// Sun at `altitude` above the horizon and `azimuth` from `+x`, both in degrees.
    pub fn from_altitude_azimuth(altitude: f32, azimuth: f32) -> Self {
        let (alt_sin, alt_cos) = altitude.to_radians().sin_cos();
        let (az_sin, az_cos) = azimuth.to_radians().sin_cos();
        let direction = Vec3::new(alt_cos * az_cos, alt_cos * az_sin, alt_sin);
        Self {
            sun_direction: direction,
            refracted_sun_direction: refract_near_horizon(direction),
            angular_sun_radius: MEAN_SUN_ANGULAR_RADIUS,
            time: 0.0,
        }
    }

    pub fn with_time(mut self, time: f32) -> Self {
        self.time = time;
        self
    }
}

impl Default for FixedAstronomy {
    fn default() -> Self {
        Self::from_altitude_azimuth(30.0, 0.0)
    }
}

impl Astronomy for FixedAstronomy {
    fn sun_direction(&self) -> Vec3 {
        self.sun_direction
    }

    fn refracted_sun_direction(&self) -> Vec3 {
        self.refracted_sun_direction
    }

    fn angular_sun_radius(&self) -> f32 {
        self.angular_sun_radius
    }

    fn time(&self) -> f32 {
        self.time
    }
}

/// Lift a direction by Bennett's refraction formula for standard conditions.
fn refract_near_horizon(direction: Vec3) -> Vec3 {
    let altitude = direction.z.clamp(-1.0, 1.0).asin().to_degrees();
    if altitude < -2.0 {
        return direction;
    }
    // Bennett (1982), result in arc minutes.
    let refraction = 1.0 / (altitude + 7.31 / (altitude + 4.4)).to_radians().tan();
    let lifted = (altitude + refraction / 60.0).to_radians();
    let horizontal = Vec3::new(direction.x, direction.y, 0.0).normalize_or_zero();
    if horizontal == Vec3::ZERO {
        return direction;
    }
    (horizontal * lifted.cos() + Vec3::Z * lifted.sin()).normalize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zenith_sun_points_up() {
        let astro = FixedAstronomy::from_altitude_azimuth(90.0, 0.0);
        assert!((astro.sun_direction() - Vec3::Z).length() < 1e-5);
    }

    #[test]
    fn test_refraction_lifts_sun_at_horizon() {
        let astro = FixedAstronomy::from_altitude_azimuth(0.0, 45.0);
        let geometric = astro.sun_direction().z;
        let refracted = astro.refracted_sun_direction().z;
        assert!(refracted > geometric);
        // About half a degree at the horizon.
        let lift = refracted.asin().to_degrees();
        assert!((lift - 0.57).abs() < 0.05, "lift = {lift}");
    }

    #[test]
    fn test_refraction_negligible_high_in_sky() {
        let astro = FixedAstronomy::from_altitude_azimuth(60.0, 0.0);
        let delta = astro.refracted_sun_direction() - astro.sun_direction();
        assert!(delta.length() < 1e-3);
    }

    #[test]
    fn test_default_trait_refraction_is_geometric() {
        struct Plain;
        impl Astronomy for Plain {
            fn sun_direction(&self) -> Vec3 {
                Vec3::X
            }
            fn angular_sun_radius(&self) -> f32 {
                0.01
            }
            fn time(&self) -> f32 {
                0.0
            }
        }
        assert_eq!(Plain.refracted_sun_direction(), Vec3::X);
    }
}
