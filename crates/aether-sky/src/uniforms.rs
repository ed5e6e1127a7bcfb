//! The per-frame uniform block of the sky program.

use bytemuck::{Pod, Zeroable};
use glam::{Mat4, Vec3, Vec4};

use crate::error::SkyError;

/// A value assigned to a named uniform.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum UniformValue {
    Float(f32),
    Vec3(Vec3),
    Vec4(Vec4),
    Mat4(Mat4),
}

/// GPU layout of `SkyUniforms` in the WGSL program (binding 4).
#[repr(C)]
#[derive(Clone, Copy, Debug, PartialEq, Pod, Zeroable)]
pub struct SkyUniforms {
    pub inverse_view_projection: [[f32; 4]; 4],
    /// Geometric sun direction, `w` unused.
    pub sun: [f32; 4],
    /// Refracted sun direction, `w` unused.
    pub sunr: [f32; 4],
    pub lheurebleue_color: [f32; 3],
    pub lheurebleue_intensity: f32,
    /// Camera altitude, sea level radius, top radius, time.
    pub cmn: [f32; 4],
    pub sun_scale: f32,
    pub exposure: f32,
    pub padding: [f32; 2],
}

static_assertions::assert_eq_size!(SkyUniforms, [u8; 144]);
static_assertions::const_assert_eq!(std::mem::size_of::<SkyUniforms>() % 16, 0);

impl Default for SkyUniforms {
    fn default() -> Self {
        Self {
            inverse_view_projection: Mat4::IDENTITY.to_cols_array_2d(),
            ..Self::zeroed()
        }
    }
}

impl SkyUniforms {
    /// Uniform names understood by [`SkyUniforms::set`].
    pub const NAMES: [&'static str; 8] = [
        "inverseViewProjection",
        "sun",
        "sunr",
        "lheurebleueColor",
        "lheurebleueIntensity",
        "cmn",
        "sunScale",
        "exposure",
    ];

    /// Assign a uniform by its WGSL field name.
    pub fn set(&mut self, name: &str, value: UniformValue) -> Result<(), SkyError> {
        let mismatch = |expected| SkyError::UniformType {
            name: name.to_string(),
            expected,
        };
        match (name, value) {
            ("inverseViewProjection", UniformValue::Mat4(m)) => {
                self.inverse_view_projection = m.to_cols_array_2d()
            }
            ("inverseViewProjection", _) => return Err(mismatch("mat4")),
            ("sun", UniformValue::Vec3(v)) => self.sun = v.extend(0.0).to_array(),
            ("sun", UniformValue::Vec4(v)) => self.sun = v.to_array(),
            ("sunr", UniformValue::Vec3(v)) => self.sunr = v.extend(0.0).to_array(),
            ("sunr", UniformValue::Vec4(v)) => self.sunr = v.to_array(),
            ("sun" | "sunr", _) => return Err(mismatch("vec3")),
            ("lheurebleueColor", UniformValue::Vec3(v)) => self.lheurebleue_color = v.to_array(),
            ("lheurebleueColor", _) => return Err(mismatch("vec3")),
            ("cmn", UniformValue::Vec4(v)) => self.cmn = v.to_array(),
            ("cmn", _) => return Err(mismatch("vec4")),
            ("lheurebleueIntensity", UniformValue::Float(f)) => self.lheurebleue_intensity = f,
            ("sunScale", UniformValue::Float(f)) => self.sun_scale = f,
            ("exposure", UniformValue::Float(f)) => self.exposure = f,
            ("lheurebleueIntensity" | "sunScale" | "exposure", _) => {
                return Err(mismatch("float"));
            }
            _ => {
                return Err(SkyError::UnknownUniform {
                    name: name.to_string(),
                });
            }
        }
        Ok(())
    }

    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_float_uniforms() {
        let mut uniforms = SkyUniforms::default();
        uniforms.set("exposure", UniformValue::Float(0.22)).unwrap();
        uniforms.set("sunScale", UniformValue::Float(0.01)).unwrap();
        assert_eq!(uniforms.exposure, 0.22);
        assert_eq!(uniforms.sun_scale, 0.01);
    }

    #[test]
    fn test_sun_vec3_widens_to_vec4() {
        let mut uniforms = SkyUniforms::default();
        uniforms
            .set("sunr", UniformValue::Vec3(Vec3::new(0.0, 0.6, 0.8)))
            .unwrap();
        assert_eq!(uniforms.sunr, [0.0, 0.6, 0.8, 0.0]);
    }

    #[test]
    fn test_unknown_uniform_rejected() {
        let mut uniforms = SkyUniforms::default();
        let err = uniforms.set("gamma", UniformValue::Float(2.2)).unwrap_err();
        assert!(matches!(err, SkyError::UnknownUniform { name } if name == "gamma"));
    }

    #[test]
    fn test_wrong_type_rejected() {
        let mut uniforms = SkyUniforms::default();
        let err = uniforms
            .set("exposure", UniformValue::Vec3(Vec3::ONE))
            .unwrap_err();
        assert!(matches!(err, SkyError::UniformType { expected: "float", .. }));
    }

    #[test]
    fn test_every_listed_name_is_settable() {
        let mut uniforms = SkyUniforms::default();
        for name in SkyUniforms::NAMES {
            let value = match name {
                "inverseViewProjection" => UniformValue::Mat4(Mat4::IDENTITY),
                "cmn" => UniformValue::Vec4(Vec4::ONE),
                "sun" | "sunr" | "lheurebleueColor" => UniformValue::Vec3(Vec3::ONE),
                _ => UniformValue::Float(1.0),
            };
            assert!(uniforms.set(name, value).is_ok(), "uniform {name}");
        }
    }

    #[test]
    fn test_field_offsets_match_wgsl_layout() {
        assert_eq!(std::mem::offset_of!(SkyUniforms, sun), 64);
        assert_eq!(std::mem::offset_of!(SkyUniforms, sunr), 80);
        assert_eq!(std::mem::offset_of!(SkyUniforms, lheurebleue_color), 96);
        assert_eq!(std::mem::offset_of!(SkyUniforms, lheurebleue_intensity), 108);
        assert_eq!(std::mem::offset_of!(SkyUniforms, cmn), 112);
        assert_eq!(std::mem::offset_of!(SkyUniforms, sun_scale), 128);
        assert_eq!(std::mem::offset_of!(SkyUniforms, exposure), 132);
    }
}
