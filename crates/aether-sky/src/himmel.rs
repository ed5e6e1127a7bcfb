//! Sky variants behind one closed type.
//!
//! Besides the procedural atmosphere a sky can be a pre-rendered texture in
//! one of three mappings. Each variant produces the source of its fragment
//! program and takes the per-frame astronomy update.

use aether_render::{MacroSet, MacroValue, ShaderComposer, ShaderFragment};
use glam::Vec3;

use crate::astronomy::Astronomy;
use crate::backend::SkyBackend;
use crate::drawable::SkyDrawable;
use crate::error::SkyError;
use crate::fragments::{UNIFORMS, VERTEX_IO};

/// How much of the sphere a polar-mapped texture covers.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum MappingMode {
    /// Both hemispheres.
    Full,
    /// The upper hemisphere only.
    #[default]
    Half,
}

/// Texture-mapped sky state shared by the mapped variants.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct MappedSky {
    sun_direction: Vec3,
    time: f32,
}

impl MappedSky {
    pub fn sun_direction(&self) -> Vec3 {
        self.sun_direction
    }

    pub fn time(&self) -> f32 {
        self.time
    }

    fn update(&mut self, astronomy: &dyn Astronomy) {
        self.sun_direction = astronomy.refracted_sun_direction();
        self.time = astronomy.time();
    }
}

pub enum Himmel<B: SkyBackend> {
    ProceduralAtmosphere(SkyDrawable<B>),
    PolarMapped { sky: MappedSky, mode: MappingMode },
    CubeMapped { sky: MappedSky },
    ParaboloidMapped { sky: MappedSky },
}

impl<B: SkyBackend> Himmel<B> {
    pub fn polar(mode: MappingMode) -> Self {
        Self::PolarMapped {
            sky: MappedSky::default(),
            mode,
        }
    }

    pub fn cube() -> Self {
        Self::CubeMapped {
            sky: MappedSky::default(),
        }
    }

    pub fn paraboloid() -> Self {
        Self::ParaboloidMapped {
            sky: MappedSky::default(),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::ProceduralAtmosphere(_) => "procedural-atmosphere",
            Self::PolarMapped { .. } => "polar-mapped",
            Self::CubeMapped { .. } => "cube-mapped",
            Self::ParaboloidMapped { .. } => "paraboloid-mapped",
        }
    }

    /// Source of this variant's fragment program.
    pub fn fragment_source(&self) -> Result<String, SkyError> {
        let mapping = match self {
            Self::ProceduralAtmosphere(drawable) => {
                return Ok(drawable.fragment_source().to_string());
            }
            Self::PolarMapped {
                mode: MappingMode::Full,
                ..
            } => "polar_full",
            Self::PolarMapped {
                mode: MappingMode::Half,
                ..
            } => "polar_half",
            Self::CubeMapped { .. } => "cube_lookup",
            Self::ParaboloidMapped { .. } => "paraboloid",
        };
        let binding = if mapping == "cube_lookup" {
            "cube_binding"
        } else {
            "planar_binding"
        };

        let composer = ShaderComposer::with_fragments(MAPPED_FRAGMENTS);
        let macros = MacroSet::new().with("PI", MacroValue::Float(std::f32::consts::PI));
        let source = composer.compose(
            &[
                "uniforms",
                "vertex_io",
                binding,
                "mapped_constants",
                mapping,
                "mapped_main",
            ],
            &macros,
        )?;
        Ok(source)
    }

    /// Per-frame update; only the procedural sky may recompute anything.
    pub fn update(&mut self, astronomy: &dyn Astronomy) -> Result<(), SkyError> {
        match self {
            Self::ProceduralAtmosphere(drawable) => drawable.update(astronomy),
            Self::PolarMapped { sky, .. } | Self::CubeMapped { sky } | Self::ParaboloidMapped { sky } => {
                sky.update(astronomy);
                Ok(())
            }
        }
    }
}

const PLANAR_BINDING: ShaderFragment = ShaderFragment::new(
    "planar_binding",
    &[],
    &["skyTexture", "skySampler", "sampleSky"],
    r#"
@group(0) @binding(0) var skyTexture: texture_2d<f32>;
@group(0) @binding(3) var skySampler: sampler;

fn sampleSky(uv: vec2<f32>) -> vec4<f32> {
    return textureSampleLevel(skyTexture, skySampler, uv, 0.0);
}
"#,
);

const CUBE_BINDING: ShaderFragment = ShaderFragment::new(
    "cube_binding",
    &[],
    &["skyTexture", "skySampler"],
    r#"
@group(0) @binding(0) var skyTexture: texture_cube<f32>;
@group(0) @binding(3) var skySampler: sampler;
"#,
);

const MAPPED_CONSTANTS: ShaderFragment = ShaderFragment::new(
    "mapped_constants",
    &[],
    &["PI"],
    "const PI: f32 = {{PI}};\n",
);

const POLAR_FULL: ShaderFragment = ShaderFragment::new(
    "polar_full",
    &["planar_binding", "mapped_constants"],
    &["skyColor"],
    r#"
fn skyColor(d: vec3<f32>) -> vec4<f32> {
    let u = atan2(d.y, d.x) / (2.0 * PI) + 0.5;
    let v = acos(clamp(d.z, -1.0, 1.0)) / PI;
    return sampleSky(vec2<f32>(u, v));
}
"#,
);

const POLAR_HALF: ShaderFragment = ShaderFragment::new(
    "polar_half",
    &["planar_binding", "mapped_constants"],
    &["skyColor"],
    r#"
// Directions below the horizon repeat the horizon row.
fn skyColor(d: vec3<f32>) -> vec4<f32> {
    let u = atan2(d.y, d.x) / (2.0 * PI) + 0.5;
    let v = acos(clamp(d.z, 0.0, 1.0)) / (0.5 * PI);
    return sampleSky(vec2<f32>(u, v));
}
"#,
);

const CUBE_LOOKUP: ShaderFragment = ShaderFragment::new(
    "cube_lookup",
    &["cube_binding"],
    &["skyColor"],
    r#"
fn skyColor(d: vec3<f32>) -> vec4<f32> {
    return textureSampleLevel(skyTexture, skySampler, d, 0.0);
}
"#,
);

const PARABOLOID: ShaderFragment = ShaderFragment::new(
    "paraboloid",
    &["planar_binding"],
    &["skyColor"],
    r#"
// Upper-hemisphere paraboloid map.
fn skyColor(d: vec3<f32>) -> vec4<f32> {
    let z = max(d.z, 0.0);
    let uv = d.xy / (1.0 + z) * 0.5 + vec2<f32>(0.5);
    return sampleSky(uv);
}
"#,
);

const MAPPED_MAIN: ShaderFragment = ShaderFragment::new(
    "mapped_main",
    &["uniforms", "vertex_io"],
    &["fs_main"],
    r#"
@fragment
fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {
    let color = skyColor(normalize(in.ray));
    return vec4<f32>(color.rgb * sky.exposure, color.a);
}
"#,
)
.with_uses(&["skyColor"]);

const MAPPED_FRAGMENTS: [ShaderFragment; 10] = [
    UNIFORMS,
    VERTEX_IO,
    PLANAR_BINDING,
    CUBE_BINDING,
    MAPPED_CONSTANTS,
    POLAR_FULL,
    POLAR_HALF,
    CUBE_LOOKUP,
    PARABOLOID,
    MAPPED_MAIN,
];
