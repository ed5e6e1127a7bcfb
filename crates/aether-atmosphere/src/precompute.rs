//! Multi-pass precomputation of the transmittance, irradiance, and inscatter tables.
//!
//! The pipeline follows Bruneton & Neyret, "Precomputed Atmospheric
//! Scattering" (2008):
//!
//! 1. transmittance `T`
//! 2. direct irradiance `ΔE`, which also seeds `E`
//! 3. single scattering `ΔSR`, `ΔSM`, which seeds `S`
//! 4. for every further order: scattering density `ΔJ`, indirect irradiance
//!    `ΔE`, multiple scattering `ΔS`; accumulate `E += ΔE`, `S += ΔS / P_R`
//!
//! Every pass reads only tables finished by earlier passes. All passes run
//! single-threaded in a fixed order, so a given [`ModelConfig`] always yields
//! bit-identical tables.

use std::f32::consts::PI;
use std::time::Instant;

use glam::{Vec3, Vec4Swizzles};
use tracing::{debug, info, info_span};

use crate::error::AtmosphereError;
use crate::lookup::{InscatterLayer, Lookup, irradiance_r_mu_s, transmittance_r_mu};
use crate::model::{ModelConfig, phase_mie, phase_rayleigh};
use crate::resolution::{SampleCounts, TableResolution};
use crate::table::{Table2D, Table3D};

/// The three finished lookup tables.
#[derive(Clone, Debug, PartialEq)]
pub struct LookupTables {
    /// Attenuation to the atmosphere boundary, indexed by `(mu, r)`.
    pub transmittance: Table2D,
    /// Sky irradiance (direct plus every indirect order), indexed by `(mu_s, r)`.
    pub irradiance: Table2D,
    /// Rayleigh + multiple scattering in RGB, single Mie (red) in alpha.
    pub inscatter: Table3D,
}

impl LookupTables {
    fn new(res: &TableResolution) -> Self {
        Self {
            transmittance: Table2D::new(res.transmittance_w, res.transmittance_h),
            irradiance: Table2D::new(res.sky_w, res.sky_h),
            inscatter: Table3D::new(res.inscatter_width(), res.res_mu, res.res_r),
        }
    }
}

/// Intermediate per-order tables, allocated once next to the final tables.
struct DeltaTables {
    irradiance: Table2D,
    rayleigh: Table3D,
    mie: Table3D,
    density: Table3D,
}

impl DeltaTables {
    fn new(res: &TableResolution) -> Self {
        let inscatter = || Table3D::new(res.inscatter_width(), res.res_mu, res.res_r);
        Self {
            irradiance: Table2D::new(res.sky_w, res.sky_h),
            rayleigh: inscatter(),
            mie: inscatter(),
            density: inscatter(),
        }
    }
}

/// Literal values the shader composer substitutes into the sky program.
#[derive(Clone, Debug, PartialEq)]
pub struct MacroParams {
    pub resolution: TableResolution,
    pub planet_radius: f32,
    pub top_radius: f32,
    pub limit_radius: f32,
    pub rayleigh_scale_height: f32,
    pub mie_scale_height: f32,
    pub rayleigh_scattering: [f32; 3],
    pub mie_extinction: [f32; 3],
    pub mie_g: f32,
    pub average_ground_reflectance: f32,
    pub scattering_orders: u32,
}

/// Owns a [`ModelConfig`] and the lookup tables computed from it.
///
/// Every mutation bumps a version counter; [`PrecomputeEngine::compute`]
/// reruns the pipeline only when the version moved since the last run.
pub struct PrecomputeEngine {
    config: ModelConfig,
    resolution: TableResolution,
    samples: SampleCounts,
    version: u64,
    computed_version: Option<u64>,
    tables: LookupTables,
    deltas: DeltaTables,
}

impl PrecomputeEngine {
    /// Allocate the tables at the default resolution.
    pub fn new(config: ModelConfig) -> Result<Self, AtmosphereError> {
        Self::with_resolution(config, TableResolution::default(), SampleCounts::default())
    }

    /// Allocate the tables once at the given resolution. Nothing is computed yet.
    pub fn with_resolution(
        config: ModelConfig,
        resolution: TableResolution,
        samples: SampleCounts,
    ) -> Result<Self, AtmosphereError> {
        resolution.validate()?;
        samples.validate()?;

        Ok(Self {
            config,
            resolution,
            samples,
            version: 0,
            computed_version: None,
            tables: LookupTables::new(&resolution),
            deltas: DeltaTables::new(&resolution),
        })
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    pub fn resolution(&self) -> &TableResolution {
        &self.resolution
    }

    pub fn samples(&self) -> &SampleCounts {
        &self.samples
    }

    /// Monotonic counter bumped by every mutation.
    pub fn version(&self) -> u64 {
        self.version
    }

    /// Mark the tables stale.
    pub fn dirty(&mut self) {
        self.version += 1;
    }

    /// Whether the next [`compute`](Self::compute) will run the pipeline.
    pub fn is_dirty(&self) -> bool {
        self.computed_version != Some(self.version)
    }

    /// Mutate the model through a closure; always marks the tables stale.
    pub fn edit_config(&mut self, edit: impl FnOnce(&mut ModelConfig)) {
        edit(&mut self.config);
        self.dirty();
    }

    /// Replace the whole model.
    pub fn set_config(&mut self, config: ModelConfig) {
        self.edit_config(|c| *c = config);
    }

    pub fn set_average_ground_reflectance(&mut self, reflectance: f32) {
        self.edit_config(|c| c.average_ground_reflectance = reflectance);
    }

    pub fn set_rayleigh_scale_height(&mut self, thickness: f32) {
        self.edit_config(|c| c.rayleigh_scale_height = thickness);
    }

    pub fn set_rayleigh_scattering(&mut self, coefficients: [f32; 3]) {
        self.edit_config(|c| c.rayleigh_scattering = coefficients);
    }

    pub fn set_mie_scale_height(&mut self, thickness: f32) {
        self.edit_config(|c| c.mie_scale_height = thickness);
    }

    /// Uniform Mie scattering; extinction is derived from it.
    pub fn set_mie_scattering(&mut self, coefficient: f32) {
        self.edit_config(|c| c.set_mie_scattering(coefficient));
    }

    pub fn set_mie_phase_g(&mut self, g: f32) {
        self.edit_config(|c| c.mie_g = g);
    }

    /// Number of scattering orders to accumulate. Zero is rejected by the next [`compute`](Self::compute).
    pub fn set_scattering_orders(&mut self, orders: u32) {
        self.samples.scattering_orders = orders;
        self.dirty();
    }

    /// The finished tables, or `None` while a recompute is pending.
    pub fn tables(&self) -> Option<&LookupTables> {
        (!self.is_dirty()).then_some(&self.tables)
    }

    /// Values for macro substitution in the sky program.
    pub fn macro_params(&self) -> MacroParams {
        MacroParams {
            resolution: self.resolution,
            planet_radius: self.config.planet_radius,
            top_radius: self.config.top_radius,
            limit_radius: self.config.limit_radius(),
            rayleigh_scale_height: self.config.rayleigh_scale_height,
            mie_scale_height: self.config.mie_scale_height,
            rayleigh_scattering: self.config.rayleigh_scattering,
            mie_extinction: self.config.mie_extinction,
            mie_g: self.config.mie_g,
            average_ground_reflectance: self.config.average_ground_reflectance,
            scattering_orders: self.samples.scattering_orders,
        }
    }

    /// Recompute every table if the model changed since the last run.
    ///
    /// Returns `Ok(false)` without doing any work when the tables are current.
    /// An invalid model leaves the tables pending and returns the validation error.
    pub fn compute(&mut self) -> Result<bool, AtmosphereError> {
        if !self.is_dirty() {
            return Ok(false);
        }
        self.config.validate()?;
        self.samples.validate()?;

        let version = self.version;
        let _span = info_span!("precompute", version).entered();
        let start = Instant::now();

        let model = &self.config;
        let res = &self.resolution;
        let samples = &self.samples;
        let tables = &mut self.tables;
        let deltas = &mut self.deltas;

        transmittance_pass(model, samples, &mut tables.transmittance);
        debug!("transmittance pass done");

        let lookup = Lookup {
            model,
            res,
            transmittance: &tables.transmittance,
        };

        direct_irradiance_pass(&lookup, &mut deltas.irradiance);
        tables.irradiance.copy_from(&deltas.irradiance);

        single_scattering_pass(
            &lookup,
            samples,
            &mut deltas.rayleigh,
            &mut deltas.mie,
            &mut tables.inscatter,
        );
        debug!("single scattering pass done");

        for order in 2..=samples.scattering_orders {
            let first = order == 2;
            scattering_density_pass(&lookup, samples, deltas, first);
            indirect_irradiance_pass(&lookup, samples, deltas, first);
            multiple_scattering_pass(&lookup, samples, deltas);
            accumulate(&lookup, deltas, &mut tables.irradiance, &mut tables.inscatter);
            debug!(order, "scattering order done");
        }

        self.computed_version = Some(version);
        info!(
            elapsed_ms = start.elapsed().as_millis() as u64,
            orders = samples.scattering_orders,
            "atmosphere tables recomputed"
        );
        Ok(true)
    }
}

fn transmittance_pass(model: &ModelConfig, samples: &SampleCounts, out: &mut Table2D) {
    let (w, h) = (out.width(), out.height());
    let beta_r = model.beta_r();
    let beta_m_ex = model.beta_m_ex();
    for y in 0..h {
        for x in 0..w {
            let u = (x as f32 + 0.5) / w as f32;
            let v = (y as f32 + 0.5) / h as f32;
            let (r, mu) = transmittance_r_mu(model, u, v);
            let depth = beta_r
                * model.optical_depth(model.rayleigh_scale_height, r, mu, samples.transmittance)
                + beta_m_ex
                    * model.optical_depth(model.mie_scale_height, r, mu, samples.transmittance);
            out.set(x, y, (-depth).exp().extend(0.0));
        }
    }
}

fn direct_irradiance_pass(lookup: &Lookup<'_>, out: &mut Table2D) {
    for y in 0..out.height() {
        for x in 0..out.width() {
            let (r, mu_s) = irradiance_r_mu_s(lookup.model, lookup.res, x, y);
            let e = lookup.transmittance(r, mu_s) * mu_s.max(0.0);
            out.set(x, y, e.extend(0.0));
        }
    }
}

/// Visit every inscatter texel with its physical coordinates.
fn for_each_inscatter_texel(
    lookup: &Lookup<'_>,
    mut visit: impl FnMut(u32, u32, u32, f32, f32, f32, f32),
) {
    let res = lookup.res;
    for layer in 0..res.res_r {
        let geometry = InscatterLayer::new(lookup.model, res, layer);
        for y in 0..res.res_mu {
            for x in 0..res.inscatter_width() {
                let (mu, mu_s, nu) = geometry.mu_mu_s_nu(lookup.model, res, x, y);
                visit(x, y, layer, geometry.r, mu, mu_s, nu);
            }
        }
    }
}

fn single_scattering_pass(
    lookup: &Lookup<'_>,
    samples: &SampleCounts,
    delta_rayleigh: &mut Table3D,
    delta_mie: &mut Table3D,
    inscatter: &mut Table3D,
) {
    let model = lookup.model;
    let rg = model.planet_radius;
    let integrand = |r: f32, mu: f32, mu_s: f32, nu: f32, t: f32| -> (Vec3, Vec3) {
        let ri = (r * r + t * t + 2.0 * r * mu * t).sqrt();
        let mu_si = (nu * t + mu_s * r) / ri;
        let ri = ri.max(rg);
        if mu_si >= model.horizon_mu(ri) {
            let ti = lookup.transmittance_between(r, mu, t) * lookup.transmittance(ri, mu_si);
            (
                (-(ri - rg) / model.rayleigh_scale_height).exp() * ti,
                (-(ri - rg) / model.mie_scale_height).exp() * ti,
            )
        } else {
            (Vec3::ZERO, Vec3::ZERO)
        }
    };

    for_each_inscatter_texel(lookup, |x, y, z, r, mu, mu_s, nu| {
        let dx = model.limit(r, mu) / samples.inscatter as f32;
        let (mut ray_i, mut mie_i) = integrand(r, mu, mu_s, nu, 0.0);
        let mut ray = Vec3::ZERO;
        let mut mie = Vec3::ZERO;
        for i in 1..=samples.inscatter {
            let xj = i as f32 * dx;
            let (ray_j, mie_j) = integrand(r, mu, mu_s, nu, xj);
            ray += (ray_i + ray_j) * 0.5 * dx;
            mie += (mie_i + mie_j) * 0.5 * dx;
            ray_i = ray_j;
            mie_i = mie_j;
        }
        let ray = ray * model.beta_r();
        let mie = mie * model.beta_m_sca();
        delta_rayleigh.set(x, y, z, ray.extend(0.0));
        delta_mie.set(x, y, z, mie.extend(0.0));
        inscatter.set(x, y, z, ray.extend(mie.x));
    });
}

/// Read the previous order's inscattered radiance arriving from `(mu, mu_s, nu)`.
///
/// Single scattering is stored without phase functions, so they are applied
/// here for the first multiple-scattering order.
fn previous_inscatter(
    lookup: &Lookup<'_>,
    deltas: &DeltaTables,
    first: bool,
    r: f32,
    mu: f32,
    mu_s: f32,
    nu: f32,
) -> Vec3 {
    let ray = lookup.inscatter4d(&deltas.rayleigh, r, mu, mu_s, nu).xyz();
    if first {
        let mie = lookup.inscatter4d(&deltas.mie, r, mu, mu_s, nu).xyz();
        ray * phase_rayleigh(nu) + mie * phase_mie(nu, lookup.model.mie_g)
    } else {
        ray
    }
}

/// ΔJ: light scattered towards the view direction from every direction of the sphere.
fn scattering_density_pass(
    lookup: &Lookup<'_>,
    samples: &SampleCounts,
    deltas: &mut DeltaTables,
    first: bool,
) {
    let model = lookup.model;
    let rg = model.planet_radius;
    let rt = model.top_radius;
    let n = samples.inscatter_spherical;
    let dtheta = PI / n as f32;
    let dphi = PI / n as f32;
    let phis: Vec<(f32, f32)> = (0..2 * n)
        .map(|i| ((i as f32 + 0.5) * dphi).sin_cos())
        .collect();
    let beta_r = model.beta_r();
    let beta_m_sca = model.beta_m_sca();

    let mut density = std::mem::replace(&mut deltas.density, Table3D::new(0, 0, 0));
    let deltas_ref: &DeltaTables = deltas;

    for_each_inscatter_texel(lookup, |x, y, z, r, mu, mu_s, nu| {
        let r = r.clamp(rg, rt);
        let mu = mu.clamp(-1.0, 1.0);
        let mu_s = mu_s.clamp(-1.0, 1.0);
        let var = (1.0 - mu * mu).sqrt() * (1.0 - mu_s * mu_s).sqrt();
        let nu = nu.clamp(mu_s * mu - var, mu_s * mu + var);

        let ctheta_min = model.horizon_mu(r);
        let v = Vec3::new((1.0 - mu * mu).sqrt(), 0.0, mu);
        let sx = if v.x == 0.0 { 0.0 } else { (nu - mu_s * mu) / v.x };
        let s = Vec3::new(sx, (1.0 - sx * sx - mu_s * mu_s).max(0.0).sqrt(), mu_s);

        let density_r = beta_r * (-(r - rg) / model.rayleigh_scale_height).exp();
        let density_m = beta_m_sca * (-(r - rg) / model.mie_scale_height).exp();

        let mut raymie = Vec3::ZERO;
        for itheta in 0..n {
            let theta = (itheta as f32 + 0.5) * dtheta;
            let (stheta, ctheta) = theta.sin_cos();

            let mut ground_reflectance = 0.0;
            let mut ground_distance = 0.0;
            let mut ground_transmittance = Vec3::ZERO;
            if ctheta < ctheta_min {
                ground_reflectance = model.average_ground_reflectance / PI;
                ground_distance =
                    -r * ctheta - (r * r * (ctheta * ctheta - 1.0) + rg * rg).max(0.0).sqrt();
                ground_transmittance = lookup.transmittance_between(
                    rg,
                    -(r * ctheta + ground_distance) / rg,
                    ground_distance,
                );
            }

            let dw = dtheta * dphi * stheta;
            for &(sphi, cphi) in &phis {
                let w = Vec3::new(cphi * stheta, sphi * stheta, ctheta);
                let nu1 = s.dot(w);
                let nu2 = v.dot(w);

                let mut incoming = Vec3::ZERO;
                if ground_reflectance > 0.0 {
                    let normal = (Vec3::new(0.0, 0.0, r) + ground_distance * w) / rg;
                    let ground_irradiance =
                        lookup.irradiance(&deltas_ref.irradiance, rg, normal.dot(s));
                    incoming += ground_reflectance * ground_irradiance * ground_transmittance;
                }
                incoming += previous_inscatter(lookup, deltas_ref, first, r, w.z, mu_s, nu1);

                raymie += incoming
                    * (density_r * phase_rayleigh(nu2) + density_m * phase_mie(nu2, model.mie_g))
                    * dw;
            }
        }
        density.set(x, y, z, raymie.extend(0.0));
    });

    deltas.density = density;
}

/// ΔE: irradiance at the ground from the previous order's inscattered light.
fn indirect_irradiance_pass(
    lookup: &Lookup<'_>,
    samples: &SampleCounts,
    deltas: &mut DeltaTables,
    first: bool,
) {
    let n = samples.irradiance;
    let dphi = PI / n as f32;
    let dtheta = PI / n as f32;

    let mut out = std::mem::replace(&mut deltas.irradiance, Table2D::new(0, 0));
    for y in 0..out.height() {
        for x in 0..out.width() {
            let (r, mu_s) = irradiance_r_mu_s(lookup.model, lookup.res, x, y);
            let s = Vec3::new((1.0 - mu_s * mu_s).max(0.0).sqrt(), 0.0, mu_s);
            let mut result = Vec3::ZERO;
            for iphi in 0..2 * n {
                let (sphi, cphi) = ((iphi as f32 + 0.5) * dphi).sin_cos();
                for itheta in 0..n / 2 {
                    let (stheta, ctheta) = ((itheta as f32 + 0.5) * dtheta).sin_cos();
                    let dw = dtheta * dphi * stheta;
                    let w = Vec3::new(cphi * stheta, sphi * stheta, ctheta);
                    let nu = s.dot(w);
                    result +=
                        previous_inscatter(lookup, deltas, first, r, w.z, mu_s, nu) * w.z * dw;
                }
            }
            out.set(x, y, result.extend(0.0));
        }
    }
    deltas.irradiance = out;
}

/// ΔS: integrate the scattering density ΔJ along every view ray.
fn multiple_scattering_pass(lookup: &Lookup<'_>, samples: &SampleCounts, deltas: &mut DeltaTables) {
    let model = lookup.model;
    let density = &deltas.density;
    let out = &mut deltas.rayleigh;
    let integrand = |r: f32, mu: f32, mu_s: f32, nu: f32, t: f32| -> Vec3 {
        let ri = (r * r + t * t + 2.0 * r * mu * t).sqrt();
        let mui = (r * mu + t) / ri;
        let mu_si = (nu * t + mu_s * r) / ri;
        lookup.inscatter4d(density, ri, mui, mu_si, nu).xyz()
            * lookup.transmittance_between(r, mu, t)
    };

    for_each_inscatter_texel(lookup, |x, y, z, r, mu, mu_s, nu| {
        let dx = model.limit(r, mu) / samples.inscatter as f32;
        let mut raymie_i = integrand(r, mu, mu_s, nu, 0.0);
        let mut raymie = Vec3::ZERO;
        for i in 1..=samples.inscatter {
            let xj = i as f32 * dx;
            let raymie_j = integrand(r, mu, mu_s, nu, xj);
            raymie += (raymie_i + raymie_j) * 0.5 * dx;
            raymie_i = raymie_j;
        }
        out.set(x, y, z, raymie.extend(0.0));
    });
}

/// `E += ΔE`, `S.rgb += ΔS / P_R(nu)`.
fn accumulate(
    lookup: &Lookup<'_>,
    deltas: &DeltaTables,
    irradiance: &mut Table2D,
    inscatter: &mut Table3D,
) {
    for y in 0..irradiance.height() {
        for x in 0..irradiance.width() {
            let sum = irradiance.get(x, y) + deltas.irradiance.get(x, y);
            irradiance.set(x, y, sum);
        }
    }
    for_each_inscatter_texel(lookup, |x, y, z, _r, _mu, _mu_s, nu| {
        let delta = deltas.rayleigh.get(x, y, z).xyz() / phase_rayleigh(nu);
        let sum = inscatter.get(x, y, z) + delta.extend(0.0);
        inscatter.set(x, y, z, sum);
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lookup::inscatter4d;

    fn preview_engine(config: ModelConfig) -> PrecomputeEngine {
        PrecomputeEngine::with_resolution(config, TableResolution::preview(), SampleCounts::preview())
            .unwrap()
    }

    #[test]
    fn test_fresh_engine_is_dirty_and_has_no_tables() {
        let engine = preview_engine(ModelConfig::earth());
        assert!(engine.is_dirty());
        assert!(engine.tables().is_none());
    }

    #[test]
    fn test_compute_runs_once_until_dirtied() {
        let mut engine = preview_engine(ModelConfig::earth());
        assert_eq!(engine.compute(), Ok(true));
        assert_eq!(engine.compute(), Ok(false));
        assert!(engine.tables().is_some());

        engine.dirty();
        assert!(engine.tables().is_none());
        assert_eq!(engine.compute(), Ok(true));
        assert_eq!(engine.compute(), Ok(false));
    }

    #[test]
    fn test_every_setter_marks_dirty_exactly_once() {
        let setters: [(&str, fn(&mut PrecomputeEngine)); 8] = [
            ("ground", |e| e.set_average_ground_reflectance(0.2)),
            ("hr", |e| e.set_rayleigh_scale_height(7.0)),
            ("beta_r", |e| e.set_rayleigh_scattering([6e-3, 1.4e-2, 3.4e-2])),
            ("hm", |e| e.set_mie_scale_height(1.5)),
            ("beta_m", |e| e.set_mie_scattering(2e-3)),
            ("g", |e| e.set_mie_phase_g(0.7)),
            ("orders", |e| e.set_scattering_orders(3)),
            ("edit", |e| e.edit_config(|c| c.top_radius = 6430.0)),
        ];
        let mut engine = PrecomputeEngine::with_resolution(
            ModelConfig::earth(),
            TableResolution::preview(),
            SampleCounts {
                scattering_orders: 2,
                ..SampleCounts::preview()
            },
        )
        .unwrap();
        engine.compute().unwrap();
        for (name, setter) in setters {
            setter(&mut engine);
            assert_eq!(engine.compute(), Ok(true), "setter {name}");
            assert_eq!(engine.compute(), Ok(false), "setter {name}");
        }
    }

    #[test]
    fn test_compute_is_deterministic() {
        let mut a = preview_engine(ModelConfig::earth());
        let mut b = preview_engine(ModelConfig::earth());
        a.compute().unwrap();
        b.compute().unwrap();
        assert_eq!(a.tables(), b.tables());
    }

    #[test]
    fn test_invalid_model_fails_and_stays_pending() {
        let mut engine = preview_engine(ModelConfig::earth());
        engine.compute().unwrap();
        engine.set_mie_scale_height(-1.0);
        let err = engine.compute().unwrap_err();
        assert!(matches!(
            err,
            AtmosphereError::InvalidModelParameter {
                name: "mie_scale_height",
                ..
            }
        ));
        assert!(engine.tables().is_none());

        engine.set_mie_scale_height(1.2);
        assert_eq!(engine.compute(), Ok(true));
    }

    #[test]
    fn test_zero_scattering_orders_rejected_by_compute() {
        let mut engine = preview_engine(ModelConfig::earth());
        engine.compute().unwrap();
        engine.set_scattering_orders(0);
        assert_eq!(engine.samples().scattering_orders, 0);
        assert_eq!(
            engine.compute(),
            Err(AtmosphereError::InvalidResolution {
                name: "scattering_orders",
                value: 0,
                min: 1,
            })
        );
        assert!(engine.tables().is_none());

        engine.set_scattering_orders(1);
        assert_eq!(engine.compute(), Ok(true));
    }

    #[test]
    fn test_zero_resolution_rejected_at_construction() {
        let res = TableResolution {
            res_nu: 0,
            ..TableResolution::preview()
        };
        let result = PrecomputeEngine::with_resolution(ModelConfig::earth(), res, SampleCounts::preview());
        assert!(matches!(
            result,
            Err(AtmosphereError::InvalidResolution { name: "res_nu", .. })
        ));
    }

    #[test]
    fn test_tables_have_fixed_sizes() {
        let mut engine = preview_engine(ModelConfig::earth());
        engine.compute().unwrap();
        let res = TableResolution::preview();
        let tables = engine.tables().unwrap();
        assert_eq!(tables.transmittance.width(), res.transmittance_w);
        assert_eq!(tables.irradiance.height(), res.sky_h);
        assert_eq!(tables.inscatter.width(), res.res_mu_s * res.res_nu);
        assert_eq!(tables.inscatter.depth(), res.res_r);
    }

    #[test]
    fn test_tables_are_finite_and_non_negative() {
        let mut engine = preview_engine(ModelConfig::earth());
        engine.compute().unwrap();
        let tables = engine.tables().unwrap();
        let all = tables
            .transmittance
            .texels()
            .iter()
            .chain(tables.irradiance.texels())
            .chain(tables.inscatter.texels());
        for texel in all {
            for c in texel {
                assert!(c.is_finite() && *c >= 0.0, "bad texel {texel:?}");
            }
        }
    }

    #[test]
    fn test_transmittance_within_unit_range_and_opaque_below_horizon() {
        let mut engine = preview_engine(ModelConfig::earth());
        engine.compute().unwrap();
        let tables = engine.tables().unwrap();
        for t in tables.transmittance.texels() {
            assert!(t[..3].iter().all(|c| (0.0..=1.0).contains(c)));
        }
        // First column looks steeply down from the lowest row: blocked by the ground.
        assert!(tables.transmittance.get(0, 0).x < 1e-6);
    }

    #[test]
    fn test_multiple_scattering_adds_energy() {
        let single = {
            let mut e = PrecomputeEngine::with_resolution(
                ModelConfig::earth(),
                TableResolution::preview(),
                SampleCounts {
                    scattering_orders: 1,
                    ..SampleCounts::preview()
                },
            )
            .unwrap();
            e.compute().unwrap();
            e.tables().unwrap().clone()
        };
        let mut multi = preview_engine(ModelConfig::earth());
        multi.compute().unwrap();
        let multi = multi.tables().unwrap();

        let sum = |t: &Table3D| t.texels().iter().map(|c| c[0] + c[1] + c[2]).sum::<f32>();
        assert!(sum(&multi.inscatter) > sum(&single.inscatter));
        let sum_e = |t: &Table2D| t.texels().iter().map(|c| c[2]).sum::<f32>();
        assert!(sum_e(&multi.irradiance) > sum_e(&single.irradiance));
        assert_eq!(multi.transmittance, single.transmittance);
    }

    #[test]
    fn test_zero_mie_zeroes_mie_channel_only() {
        let mut engine = preview_engine(ModelConfig::earth());
        engine.set_mie_scattering(0.0);
        engine.set_average_ground_reflectance(0.0);
        engine.compute().unwrap();
        let tables = engine.tables().unwrap();

        assert!(tables.inscatter.texels().iter().all(|t| t[3] == 0.0));
        let rayleigh: f32 = tables.inscatter.texels().iter().map(|t| t[2]).sum();
        assert!(rayleigh > 0.0);

        // At the top boundary looking sideways the remaining optical depth is tiny.
        let model = engine.config();
        let lookup = Lookup {
            model,
            res: engine.resolution(),
            transmittance: &tables.transmittance,
        };
        let t = lookup.transmittance(model.top_radius, 0.3);
        assert!(t.min_element() > 0.99, "t = {t}");
        let direct = model.direct_transmittance(model.top_radius, 0.0, 500);
        assert!(direct.min_element() > 0.99, "direct = {direct}");
    }

    #[test]
    fn test_taller_atmosphere_lowers_transmittance() {
        let low = ModelConfig::earth();
        let high = ModelConfig {
            top_radius: 6480.0,
            ..ModelConfig::earth()
        };
        for &(altitude, mu) in &[(0.5_f32, 1.0_f32), (2.0, 0.3), (10.0, 0.05), (30.0, 0.8)] {
            let r = low.planet_radius + altitude;
            assert!(high.limit(r, mu) > low.limit(r, mu));
            let t_low = low.direct_transmittance(r, mu, 500);
            let t_high = high.direct_transmittance(r, mu, 500);
            assert!(
                t_high.cmplt(t_low).all(),
                "altitude {altitude}, mu {mu}: {t_high} !< {t_low}"
            );
        }
    }

    #[test]
    fn test_zenith_inscatter_brighter_in_blue_at_noon() {
        let mut engine = preview_engine(ModelConfig::earth());
        engine.compute().unwrap();
        let tables = engine.tables().unwrap();
        let model = engine.config();
        let s = inscatter4d(
            model,
            engine.resolution(),
            &tables.inscatter,
            model.planet_radius + 0.2,
            0.8,
            1.0,
            0.8,
        );
        assert!(s.z > s.x, "inscatter = {s}");
    }

    #[test]
    fn test_macro_params_track_config() {
        let mut engine = preview_engine(ModelConfig::earth());
        engine.edit_config(|c| c.top_radius = 6500.0);
        let params = engine.macro_params();
        assert_eq!(params.top_radius, 6500.0);
        assert_eq!(params.limit_radius, 6501.0);
        assert_eq!(params.resolution, TableResolution::preview());
        assert_eq!(params.scattering_orders, 4);
    }
}
