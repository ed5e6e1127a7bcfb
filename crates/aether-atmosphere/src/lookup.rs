//! Table parameterisations and the lookup functions shared by every pass.
//!
//! Each table maps physical coordinates (radius `r`, view cosine `mu`, sun
//! cosine `mu_s`, view-sun cosine `nu`) to texture coordinates. The forward
//! mappings are used when reading a table; the inverse mappings give the
//! physical coordinates of a texel when writing one. The WGSL fragments in the
//! sky program implement the same forward mappings.

use glam::{Vec3, Vec4, Vec4Swizzles};

use crate::model::ModelConfig;
use crate::resolution::TableResolution;
use crate::table::{Table2D, Table3D};

/// Transmittance texture coordinates for `(r, mu)`.
pub fn transmittance_uv(model: &ModelConfig, r: f32, mu: f32) -> (f32, f32) {
    let rg = model.planet_radius;
    let rt = model.top_radius;
    let u_r = ((r - rg) / (rt - rg)).max(0.0).sqrt();
    let u_mu = ((mu + 0.15) / (1.0 + 0.15) * 1.5_f32.tan()).atan() / 1.5;
    (u_mu, u_r)
}

/// Physical `(r, mu)` at normalised transmittance coordinates.
pub fn transmittance_r_mu(model: &ModelConfig, u: f32, v: f32) -> (f32, f32) {
    let rg = model.planet_radius;
    let rt = model.top_radius;
    let r = rg + v * v * (rt - rg);
    let mu = -0.15 + (1.5 * u).tan() / 1.5_f32.tan() * (1.0 + 0.15);
    (r, mu)
}

/// Irradiance texture coordinates for `(r, mu_s)`.
pub fn irradiance_uv(model: &ModelConfig, r: f32, mu_s: f32) -> (f32, f32) {
    let rg = model.planet_radius;
    let rt = model.top_radius;
    ((mu_s + 0.2) / (1.0 + 0.2), (r - rg) / (rt - rg))
}

/// Physical `(r, mu_s)` of irradiance texel `(x, y)`.
pub fn irradiance_r_mu_s(model: &ModelConfig, res: &TableResolution, x: u32, y: u32) -> (f32, f32) {
    let rg = model.planet_radius;
    let rt = model.top_radius;
    let r = rg + y as f32 / (res.sky_h as f32 - 1.0) * (rt - rg);
    let mu_s = -0.2 + x as f32 / (res.sky_w as f32 - 1.0) * (1.0 + 0.2);
    (r, mu_s)
}

/// Radius of an inscatter layer plus the distance bounds used to place `mu` samples.
#[derive(Clone, Copy, Debug)]
pub struct InscatterLayer {
    pub r: f32,
    /// Shortest distance to the top boundary.
    pub d_min: f32,
    /// Longest distance to the top boundary.
    pub d_max: f32,
    /// Shortest distance to the ground.
    pub d_min_ground: f32,
    /// Longest distance to the ground.
    pub d_max_ground: f32,
}

impl InscatterLayer {
    pub fn new(model: &ModelConfig, res: &TableResolution, layer: u32) -> Self {
        let rg = model.planet_radius;
        let rt = model.top_radius;
        let t = layer as f32 / (res.res_r as f32 - 1.0);
        let t = t * t;
        let mut r = (rg * rg + t * (rt * rt - rg * rg)).sqrt();
        if layer == 0 {
            r += 0.01;
        } else if layer == res.res_r - 1 {
            r -= 0.001;
        }
        let rho = (r * r - rg * rg).sqrt();
        let h = (rt * rt - rg * rg).sqrt();
        Self {
            r,
            d_min: rt - r,
            d_max: rho + h,
            d_min_ground: r - rg,
            d_max_ground: rho,
        }
    }

    /// Physical `(mu, mu_s, nu)` of texel `(x, y)` in this layer.
    pub fn mu_mu_s_nu(&self, model: &ModelConfig, res: &TableResolution, x: u32, y: u32) -> (f32, f32, f32) {
        let rg = model.planet_radius;
        let rt = model.top_radius;
        let r = self.r;
        let half = res.res_mu as f32 / 2.0;
        let y = y as f32;
        let mu = if y < half {
            let d = 1.0 - y / (half - 1.0);
            let d = (d * self.d_max_ground)
                .max(self.d_min_ground)
                .min(self.d_max_ground * 0.999);
            let mu = (rg * rg - r * r - d * d) / (2.0 * r * d);
            mu.min(model.horizon_mu(r) - 0.001)
        } else {
            let d = (y - half) / (half - 1.0);
            let d = (d * self.d_max).max(self.d_min).min(self.d_max * 0.999);
            (rt * rt - r * r - d * d) / (2.0 * r * d)
        };
        let slice = x / res.res_mu_s;
        let mu_s = (x % res.res_mu_s) as f32 / (res.res_mu_s as f32 - 1.0);
        let mu_s = ((2.0 * mu_s - 1.0 + 0.26) * 1.1).tan() / (1.26_f32 * 1.1).tan();
        let nu = -1.0 + slice as f32 / (res.res_nu as f32 - 1.0) * 2.0;
        (mu, mu_s, nu)
    }
}

/// Read-only view over a finished transmittance table and the model it was built from.
pub struct Lookup<'a> {
    pub model: &'a ModelConfig,
    pub res: &'a TableResolution,
    pub transmittance: &'a Table2D,
}

impl Lookup<'_> {
    /// Transmittance from `(r, mu)` to the atmosphere boundary.
    pub fn transmittance(&self, r: f32, mu: f32) -> Vec3 {
        let (u, v) = transmittance_uv(self.model, r, mu);
        self.transmittance.sample(u, v).xyz()
    }

    /// Transmittance to the boundary, zero where the planet blocks the ray.
    pub fn transmittance_with_shadow(&self, r: f32, mu: f32) -> Vec3 {
        if mu < self.model.horizon_mu(r) {
            Vec3::ZERO
        } else {
            self.transmittance(r, mu)
        }
    }

    /// Transmittance between `x` at `(r, mu)` and the point `d` further along the ray.
    pub fn transmittance_between(&self, r: f32, mu: f32, d: f32) -> Vec3 {
        let r1 = (r * r + d * d + 2.0 * r * mu * d).sqrt();
        let mu1 = (r * mu + d) / r1;
        let ratio = if mu > 0.0 {
            self.transmittance(r, mu) / self.transmittance(r1, mu1)
        } else {
            self.transmittance(r1, -mu1) / self.transmittance(r, -mu)
        };
        ratio.min(Vec3::ONE)
    }

    /// Sample an irradiance-shaped table at `(r, mu_s)`.
    pub fn irradiance(&self, table: &Table2D, r: f32, mu_s: f32) -> Vec3 {
        let (u, v) = irradiance_uv(self.model, r, mu_s);
        table.sample(u, v).xyz()
    }

    /// Sample an inscatter-shaped table at the 4D coordinate `(r, mu, mu_s, nu)`.
    pub fn inscatter4d(&self, table: &Table3D, r: f32, mu: f32, mu_s: f32, nu: f32) -> Vec4 {
        inscatter4d(self.model, self.res, table, r, mu, mu_s, nu)
    }
}

/// Sample a folded 4D inscatter table, interpolating between the two nearest `nu` slices.
pub fn inscatter4d(
    model: &ModelConfig,
    res: &TableResolution,
    table: &Table3D,
    r: f32,
    mu: f32,
    mu_s: f32,
    nu: f32,
) -> Vec4 {
    let rg = model.planet_radius;
    let rt = model.top_radius;
    let res_r = res.res_r as f32;
    let res_mu = res.res_mu as f32;
    let res_mu_s = res.res_mu_s as f32;
    let res_nu = res.res_nu as f32;

    let r = r.clamp(rg, rt);
    let h = (rt * rt - rg * rg).sqrt();
    let rho = (r * r - rg * rg).max(0.0).sqrt();
    let rmu = r * mu;
    let delta = rmu * rmu - r * r + rg * rg;
    let (cx, cy, cz, cw) = if rmu < 0.0 && delta > 0.0 {
        (1.0, 0.0, 0.0, 0.5 - 0.5 / res_mu)
    } else {
        (-1.0, h * h, h, 0.5 + 0.5 / res_mu)
    };
    let u_r = 0.5 / res_r + rho / h * (1.0 - 1.0 / res_r);
    let u_mu =
        cw + (rmu * cx + (delta + cy).max(0.0).sqrt()) / (rho + cz).max(1e-6) * (0.5 - 1.0 / res_mu);
    let u_mu_s = 0.5 / res_mu_s
        + ((mu_s.max(-0.1975) * (1.26_f32 * 1.1).tan()).atan() / 1.1 + (1.0 - 0.26))
            * 0.5
            * (1.0 - 1.0 / res_mu_s);
    let lerp = (nu.clamp(-1.0, 1.0) + 1.0) / 2.0 * (res_nu - 1.0);
    let u_nu = lerp.floor();
    let lerp = lerp - u_nu;
    let a = table.sample((u_nu + u_mu_s) / res_nu, u_mu, u_r);
    let b = table.sample((u_nu + u_mu_s + 1.0) / res_nu, u_mu, u_r);
    a * (1.0 - lerp) + b * lerp
}

/// Recover the full Mie colour from the red-only Mie channel stored in alpha.
pub fn mie_from_packed(model: &ModelConfig, ray_mie: Vec4) -> Vec3 {
    let beta_r = model.beta_r();
    let ratio = if beta_r.min_element() > 0.0 {
        Vec3::splat(beta_r.x) / beta_r
    } else {
        Vec3::ONE
    };
    ray_mie.xyz() * ray_mie.w / ray_mie.x.max(1e-4) * ratio
}
