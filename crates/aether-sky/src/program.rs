//! Assembly of the sky vertex and fragment programs.

use aether_atmosphere::MacroParams;
use aether_render::{CompositionError, MacroSet, MacroValue, ShaderComposer};

use crate::fragments::SKY_FRAGMENTS;

/// Amplitude of the dither noise in 8-bit steps.
pub const DITHER_LEVELS: f32 = 1.0;

/// Fragment variants of the sky program.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct BuildOptions {
    /// Attenuate view rays with the analytic optical depth instead of the transmittance table.
    pub analytic_transmittance: bool,
    /// Add noise against colour banding.
    pub dither: bool,
    /// Shade rays that hit the planet with reflected sun and sky light.
    pub ground: bool,
}

impl Default for BuildOptions {
    fn default() -> Self {
        Self {
            analytic_transmittance: false,
            dither: true,
            ground: true,
        }
    }
}

/// Macro values for the sky fragments derived from the atmosphere model.
pub fn macro_set(params: &MacroParams) -> MacroSet {
    let res = &params.resolution;
    let mut macros = MacroSet::new();
    macros
        .insert("PI", MacroValue::Float(std::f32::consts::PI))
        .insert("RG", MacroValue::Float(params.planet_radius))
        .insert("RT", MacroValue::Float(params.top_radius))
        .insert("RL", MacroValue::Float(params.limit_radius))
        .insert("TRANSMITTANCE_W", MacroValue::Float(res.transmittance_w as f32))
        .insert("TRANSMITTANCE_H", MacroValue::Float(res.transmittance_h as f32))
        .insert("SKY_W", MacroValue::Float(res.sky_w as f32))
        .insert("SKY_H", MacroValue::Float(res.sky_h as f32))
        .insert("RES_R", MacroValue::Float(res.res_r as f32))
        .insert("RES_MU", MacroValue::Float(res.res_mu as f32))
        .insert("RES_MU_S", MacroValue::Float(res.res_mu_s as f32))
        .insert("RES_NU", MacroValue::Float(res.res_nu as f32))
        .insert(
            "SCATTERING_ORDERS",
            MacroValue::Int(i64::from(params.scattering_orders)),
        )
        .insert("HR", MacroValue::Float(params.rayleigh_scale_height))
        .insert("HM", MacroValue::Float(params.mie_scale_height))
        .insert("MIE_G", MacroValue::Float(params.mie_g))
        .insert("BETA_R", MacroValue::Vec3(params.rayleigh_scattering))
        .insert("BETA_M_EX", MacroValue::Vec3(params.mie_extinction))
        .insert(
            "AVERAGE_GROUND_REFLECTANCE",
            MacroValue::Float(params.average_ground_reflectance),
        )
        .insert("DITHER_LEVELS", MacroValue::Float(DITHER_LEVELS));
    macros
}

/// Builds the sky program sources from the fragment registry.
pub struct SkyProgram {
    composer: ShaderComposer,
    options: BuildOptions,
}

impl SkyProgram {
    pub fn new(options: BuildOptions) -> Self {
        Self {
            composer: ShaderComposer::with_fragments(SKY_FRAGMENTS),
            options,
        }
    }

    pub fn options(&self) -> BuildOptions {
        self.options
    }

    /// Fragment names of the vertex program in emission order.
    pub fn vertex_fragments(&self) -> Vec<&'static str> {
        vec!["uniforms", "vertex_io", "quad_ray", "vertex_main"]
    }

    /// Fragment names of the fragment program in emission order.
    pub fn fragment_fragments(&self) -> Vec<&'static str> {
        let mut names = vec![
            "constants",
            "uniforms",
            "lookup_bindings",
            "vertex_io",
            "pseudo_rand",
        ];
        names.push(if self.options.dither {
            "dither_noise"
        } else {
            "dither_off"
        });
        names.push("transmittance");
        if self.options.analytic_transmittance {
            names.extend(["analytic_transmittance", "attenuation_analytic"]);
        } else {
            names.push("attenuation_table");
        }
        names.extend(["irradiance", "texture4d", "phase", "hdr"]);
        names.push(if self.options.ground {
            "ground_reflected"
        } else {
            "ground_none"
        });
        names.extend(["inscatter", "sun_color", "fragment_main"]);
        names
    }

    pub fn build_vertex_source(&self) -> Result<String, CompositionError> {
        self.composer
            .compose(&self.vertex_fragments(), &MacroSet::new())
    }

    pub fn build_fragment_source(&self, macros: &MacroSet) -> Result<String, CompositionError> {
        self.composer.compose(&self.fragment_fragments(), macros)
    }
}

impl Default for SkyProgram {
    fn default() -> Self {
        Self::new(BuildOptions::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use aether_atmosphere::{ModelConfig, PrecomputeEngine};

    fn macros() -> MacroSet {
        macro_set(&PrecomputeEngine::new(ModelConfig::earth()).unwrap().macro_params())
    }

    #[test]
    fn test_fragment_source_has_no_unresolved_tokens() {
        let program = SkyProgram::default();
        let source = program.build_fragment_source(&macros()).unwrap();
        assert!(!source.contains("{{"));
        assert!(source.contains("const RES_MU: f32 = 128.0;"));
        assert!(source.contains("const SCATTERING_ORDERS: i32 = 4;"));
    }

    #[test]
    fn test_vertex_source_needs_no_macros() {
        let source = SkyProgram::default().build_vertex_source().unwrap();
        assert!(source.contains("fn vs_main"));
        assert!(!source.contains("{{"));
    }

    #[test]
    fn test_each_fragment_emitted_once() {
        let program = SkyProgram::default();
        let source = program.build_fragment_source(&macros()).unwrap();
        for name in program.fragment_fragments() {
            let header = format!("// {name}\n");
            assert_eq!(source.matches(&header).count(), 1, "fragment {name}");
        }
        assert_eq!(source.matches("fn fs_main").count(), 1);
    }

    #[test]
    fn test_every_option_combination_composes() {
        for bits in 0..8u8 {
            let options = BuildOptions {
                analytic_transmittance: bits & 1 != 0,
                dither: bits & 2 != 0,
                ground: bits & 4 != 0,
            };
            let source = SkyProgram::new(options)
                .build_fragment_source(&macros())
                .unwrap();
            assert_eq!(source.contains("fn opticalDepth"), options.analytic_transmittance);
            assert_eq!(source.contains("pseudo_rand(fragCoord"), options.dither);
            assert_eq!(source.contains("AVERAGE_GROUND_REFLECTANCE * groundLight"), options.ground);
        }
    }

    #[test]
    fn test_missing_macro_is_reported() {
        let mut partial = MacroSet::new();
        partial.insert("PI", MacroValue::Float(std::f32::consts::PI));
        let err = SkyProgram::default()
            .build_fragment_source(&partial)
            .unwrap_err();
        assert!(matches!(
            err,
            CompositionError::UnresolvedToken { ref fragment, .. } if fragment == "constants"
        ));
    }

    #[test]
    fn test_program_without_variant_providers_is_rejected() {
        let program = SkyProgram::default();
        let without_variants: Vec<_> = program
            .fragment_fragments()
            .into_iter()
            .filter(|name| !matches!(*name, "ground_reflected" | "attenuation_table" | "dither_noise"))
            .collect();
        let err = program
            .composer
            .compose(&without_variants, &macros())
            .unwrap_err();
        assert_eq!(
            err,
            CompositionError::UndefinedSymbol {
                symbol: "rayAttenuation".into(),
                fragment: "inscatter".into(),
            }
        );

        let mut no_ground = program.fragment_fragments();
        no_ground.retain(|name| *name != "ground_reflected");
        let err = program.composer.compose(&no_ground, &macros()).unwrap_err();
        assert_eq!(
            err,
            CompositionError::UndefinedSymbol {
                symbol: "groundColor".into(),
                fragment: "fragment_main".into(),
            }
        );
    }

    #[test]
    fn test_twilight_term_squares_sun_height_directly() {
        let source = SkyProgram::default()
            .build_fragment_source(&macros())
            .unwrap();
        assert!(source.contains("exp(-(sunr.z * sunr.z) * 166.0)"));
        assert!(!source.contains("pow(sunr.z"));
    }

    #[test]
    fn test_macro_set_tracks_model() {
        let mut engine = PrecomputeEngine::new(ModelConfig::earth()).unwrap();
        engine.set_mie_phase_g(0.6);
        let macros = macro_set(&engine.macro_params());
        assert_eq!(macros.get("MIE_G"), Some(&MacroValue::Float(0.6)));
        assert_eq!(macros.get("RG"), Some(&MacroValue::Float(6360.0)));
    }
}
