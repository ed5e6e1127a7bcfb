//! WGSL fragments of the procedural sky program.
//!
//! The scattering functions follow Bruneton & Neyret (2008). Lookup functions
//! mirror `aether_atmosphere::lookup` so the GPU reads the tables exactly the
//! way the precomputation wrote them.
//!
//! Some symbols have interchangeable implementations (`rayAttenuation`,
//! `groundColor`, `dither`); [`BuildOptions`](crate::BuildOptions) picks one
//! fragment of each pair.

use aether_render::ShaderFragment;

pub const CONSTANTS: ShaderFragment = ShaderFragment::new(
    "constants",
    &[],
    &[
        "PI",
        "Rg",
        "Rt",
        "RL",
        "TRANSMITTANCE_W",
        "TRANSMITTANCE_H",
        "SKY_W",
        "SKY_H",
        "RES_R",
        "RES_MU",
        "RES_MU_S",
        "RES_NU",
        "SCATTERING_ORDERS",
        "HR",
        "HM",
        "mieG",
        "betaR",
        "betaMEx",
        "AVERAGE_GROUND_REFLECTANCE",
        "DITHER_LEVELS",
        "ISun",
    ],
    r#"
const PI: f32 = {{PI}};
const Rg: f32 = {{RG}};
const Rt: f32 = {{RT}};
const RL: f32 = {{RL}};
const TRANSMITTANCE_W: f32 = {{TRANSMITTANCE_W}};
const TRANSMITTANCE_H: f32 = {{TRANSMITTANCE_H}};
const SKY_W: f32 = {{SKY_W}};
const SKY_H: f32 = {{SKY_H}};
const RES_R: f32 = {{RES_R}};
const RES_MU: f32 = {{RES_MU}};
const RES_MU_S: f32 = {{RES_MU_S}};
const RES_NU: f32 = {{RES_NU}};
const SCATTERING_ORDERS: i32 = {{SCATTERING_ORDERS}};
const HR: f32 = {{HR}};
const HM: f32 = {{HM}};
const mieG: f32 = {{MIE_G}};
const betaR: vec3<f32> = {{BETA_R}};
const betaMEx: vec3<f32> = {{BETA_M_EX}};
const AVERAGE_GROUND_REFLECTANCE: f32 = {{AVERAGE_GROUND_REFLECTANCE}};
const DITHER_LEVELS: f32 = {{DITHER_LEVELS}};
const ISun: f32 = 100.0;
"#,
);

pub const UNIFORMS: ShaderFragment = ShaderFragment::new(
    "uniforms",
    &[],
    &["SkyUniforms", "sky"],
    r#"
struct SkyUniforms {
    inverseViewProjection: mat4x4<f32>,
    sun: vec4<f32>,
    sunr: vec4<f32>,
    lheurebleueColor: vec3<f32>,
    lheurebleueIntensity: f32,
    // altitude, sea level radius, top radius, time
    cmn: vec4<f32>,
    sunScale: f32,
    exposure: f32,
    padding: vec2<f32>,
};

@group(0) @binding(4)
var<uniform> sky: SkyUniforms;
"#,
);

pub const LOOKUP_BINDINGS: ShaderFragment = ShaderFragment::new(
    "lookup_bindings",
    &[],
    &[
        "transmittanceSampler",
        "irradianceSampler",
        "inscatterSampler",
        "lookupSampler",
    ],
    r#"
@group(0) @binding(0) var transmittanceSampler: texture_2d<f32>;
@group(0) @binding(1) var irradianceSampler: texture_2d<f32>;
@group(0) @binding(2) var inscatterSampler: texture_3d<f32>;
@group(0) @binding(3) var lookupSampler: sampler;
"#,
);

pub const VERTEX_IO: ShaderFragment = ShaderFragment::new(
    "vertex_io",
    &[],
    &["VertexOutput"],
    r#"
struct VertexOutput {
    @builtin(position) position: vec4<f32>,
    @location(0) ray: vec3<f32>,
};
"#,
);

pub const QUAD_RAY: ShaderFragment = ShaderFragment::new(
    "quad_ray",
    &["uniforms"],
    &["quadRetrieveRay"],
    r#"
// World-space view ray through a point of the screen.
fn quadRetrieveRay(ndc: vec2<f32>) -> vec3<f32> {
    let near = sky.inverseViewProjection * vec4<f32>(ndc, 0.0, 1.0);
    let far = sky.inverseViewProjection * vec4<f32>(ndc, 1.0, 1.0);
    return far.xyz / far.w - near.xyz / near.w;
}
"#,
);

pub const VERTEX_MAIN: ShaderFragment = ShaderFragment::new(
    "vertex_main",
    &["vertex_io", "quad_ray"],
    &["vs_main"],
    r#"
@vertex
fn vs_main(@builtin(vertex_index) idx: u32) -> VertexOutput {
    // Full-screen triangle on the far plane
    let uv = vec2<f32>(f32((idx << 1u) & 2u), f32(idx & 2u));
    let ndc = uv * 2.0 - 1.0;
    var out: VertexOutput;
    out.position = vec4<f32>(ndc, 1.0, 1.0);
    out.ray = quadRetrieveRay(ndc);
    return out;
}
"#,
);

pub const PSEUDO_RAND: ShaderFragment = ShaderFragment::new(
    "pseudo_rand",
    &[],
    &["pseudo_rand"],
    r#"
fn pseudo_rand(i: vec2<f32>, seed: f32) -> f32 {
    return fract(sin(dot(i + vec2<f32>(seed), vec2<f32>(12.9898, 78.233))) * 43758.5453);
}
"#,
);

pub const DITHER_NOISE: ShaderFragment = ShaderFragment::new(
    "dither_noise",
    &["constants", "pseudo_rand"],
    &["dither"],
    r#"
// Breaks up 8-bit banding in the smooth sky gradient.
fn dither(fragCoord: vec2<f32>, seed: f32) -> vec4<f32> {
    let n = pseudo_rand(fragCoord, fract(seed * 0.001)) - 0.5;
    return vec4<f32>(vec3<f32>(n * DITHER_LEVELS / 255.0), 0.0);
}
"#,
);

pub const DITHER_OFF: ShaderFragment = ShaderFragment::new(
    "dither_off",
    &[],
    &["dither"],
    r#"
fn dither(fragCoord: vec2<f32>, seed: f32) -> vec4<f32> {
    return vec4<f32>(0.0);
}
"#,
);

pub const TRANSMITTANCE: ShaderFragment = ShaderFragment::new(
    "transmittance",
    &["constants", "lookup_bindings"],
    &[
        "getTransmittanceUV",
        "transmittance",
        "transmittanceWithShadow",
        "transmittanceBetween",
    ],
    r#"
fn getTransmittanceUV(r: f32, mu: f32) -> vec2<f32> {
    let uR = sqrt(max(r - Rg, 0.0) / (Rt - Rg));
    let uMu = atan((mu + 0.15) / (1.0 + 0.15) * tan(1.5)) / 1.5;
    return vec2<f32>(uMu, uR);
}

// Transmittance from the point at (r, mu) to the top of the atmosphere.
fn transmittance(r: f32, mu: f32) -> vec3<f32> {
    let uv = getTransmittanceUV(r, mu);
    return textureSampleLevel(transmittanceSampler, lookupSampler, uv, 0.0).rgb;
}

// Zero when the planet occludes the ray.
fn transmittanceWithShadow(r: f32, mu: f32) -> vec3<f32> {
    let ratio = Rg / r;
    if (mu < -sqrt(max(1.0 - ratio * ratio, 0.0))) {
        return vec3<f32>(0.0);
    }
    return transmittance(r, mu);
}

// Transmittance between x at (r, mu) and x0, both on a ray of direction v.
fn transmittanceBetween(r: f32, mu: f32, v: vec3<f32>, x0: vec3<f32>) -> vec3<f32> {
    let r1 = length(x0);
    let mu1 = dot(x0, v) / r1;
    if (mu > 0.0) {
        return min(transmittance(r, mu) / transmittance(r1, mu1), vec3<f32>(1.0));
    }
    return min(transmittance(r1, -mu1) / transmittance(r, -mu), vec3<f32>(1.0));
}
"#,
);

pub const ANALYTIC_TRANSMITTANCE: ShaderFragment = ShaderFragment::new(
    "analytic_transmittance",
    &["constants"],
    &["opticalDepth", "analyticTransmittance"],
    r#"
// Chapman-function approximation of the optical depth over a segment of length d.
fn opticalDepth(H: f32, r: f32, mu: f32, d: f32) -> f32 {
    let a = sqrt((0.5 / H) * r);
    let a01 = a * vec2<f32>(mu, mu + d / r);
    let a01s = sign(a01);
    let a01sq = a01 * a01;
    let x = select(0.0, exp(a01sq.x), a01s.y > a01s.x);
    let y = a01s / (2.3193 * abs(a01) + sqrt(1.52 * a01sq + 4.0))
        * vec2<f32>(1.0, exp(-d / H * (d / (2.0 * r) + mu)));
    return sqrt((2.0 * PI * H) * r) * exp((Rg - r) / H) * (x + dot(y, vec2<f32>(1.0, -1.0)));
}

fn analyticTransmittance(r: f32, mu: f32, d: f32) -> vec3<f32> {
    return exp(-betaR * opticalDepth(HR, r, mu, d) - betaMEx * opticalDepth(HM, r, mu, d));
}
"#,
);

pub const ATTENUATION_TABLE: ShaderFragment = ShaderFragment::new(
    "attenuation_table",
    &["transmittance"],
    &["rayAttenuation"],
    r#"
fn rayAttenuation(r: f32, mu: f32, v: vec3<f32>, x0: vec3<f32>, t: f32) -> vec3<f32> {
    return transmittanceBetween(r, mu, v, x0);
}
"#,
);

pub const ATTENUATION_ANALYTIC: ShaderFragment = ShaderFragment::new(
    "attenuation_analytic",
    &["analytic_transmittance"],
    &["rayAttenuation"],
    r#"
// Avoids the imprecision of table-based transmittance near the horizon.
fn rayAttenuation(r: f32, mu: f32, v: vec3<f32>, x0: vec3<f32>, t: f32) -> vec3<f32> {
    return analyticTransmittance(r, mu, t);
}
"#,
);

pub const IRRADIANCE: ShaderFragment = ShaderFragment::new(
    "irradiance",
    &["constants", "lookup_bindings"],
    &["getIrradianceUV", "irradiance"],
    r#"
fn getIrradianceUV(r: f32, muS: f32) -> vec2<f32> {
    let uR = (r - Rg) / (Rt - Rg);
    let uMuS = (muS + 0.2) / (1.0 + 0.2);
    return vec2<f32>(uMuS, uR);
}

fn irradiance(r: f32, muS: f32) -> vec3<f32> {
    let uv = getIrradianceUV(r, muS);
    return textureSampleLevel(irradianceSampler, lookupSampler, uv, 0.0).rgb;
}
"#,
);

pub const TEXTURE_4D: ShaderFragment = ShaderFragment::new(
    "texture4d",
    &["constants", "lookup_bindings"],
    &["texture4D"],
    r#"
// Inscatter table lookup; nu selects and blends two slices of the folded 3D texture.
fn texture4D(r: f32, mu: f32, muS: f32, nu: f32) -> vec4<f32> {
    let rc = clamp(r, Rg, Rt);
    let H = sqrt(Rt * Rt - Rg * Rg);
    let rho = sqrt(max(rc * rc - Rg * Rg, 0.0));
    let rmu = rc * mu;
    let delta = rmu * rmu - rc * rc + Rg * Rg;
    var cst = vec4<f32>(-1.0, H * H, H, 0.5 + 0.5 / RES_MU);
    if (rmu < 0.0 && delta > 0.0) {
        cst = vec4<f32>(1.0, 0.0, 0.0, 0.5 - 0.5 / RES_MU);
    }
    let uR = 0.5 / RES_R + rho / H * (1.0 - 1.0 / RES_R);
    let uMu = cst.w + (rmu * cst.x + sqrt(max(delta + cst.y, 0.0))) / max(rho + cst.z, 1e-6)
        * (0.5 - 1.0 / RES_MU);
    let uMuS = 0.5 / RES_MU_S
        + (atan(max(muS, -0.1975) * tan(1.26 * 1.1)) / 1.1 + (1.0 - 0.26)) * 0.5
        * (1.0 - 1.0 / RES_MU_S);
    let nuSlice = (clamp(nu, -1.0, 1.0) + 1.0) / 2.0 * (RES_NU - 1.0);
    let uNu = floor(nuSlice);
    let blend = nuSlice - uNu;
    let a = textureSampleLevel(inscatterSampler, lookupSampler,
        vec3<f32>((uNu + uMuS) / RES_NU, uMu, uR), 0.0);
    let b = textureSampleLevel(inscatterSampler, lookupSampler,
        vec3<f32>((uNu + uMuS + 1.0) / RES_NU, uMu, uR), 0.0);
    return a * (1.0 - blend) + b * blend;
}
"#,
);

pub const PHASE: ShaderFragment = ShaderFragment::new(
    "phase",
    &["constants"],
    &["phaseFunctionR", "phaseFunctionM", "getMie"],
    r#"
fn phaseFunctionR(mu: f32) -> f32 {
    return (3.0 / (16.0 * PI)) * (1.0 + mu * mu);
}

fn phaseFunctionM(mu: f32) -> f32 {
    let g2 = mieG * mieG;
    return 1.5 * 1.0 / (4.0 * PI) * (1.0 - g2) * pow(1.0 + g2 - 2.0 * mieG * mu, -1.5)
        * (1.0 + mu * mu) / (2.0 + g2);
}

// Approximate the full Mie colour from its red channel stored in alpha.
fn getMie(rayMie: vec4<f32>) -> vec3<f32> {
    return rayMie.rgb * rayMie.w / max(rayMie.r, 1e-4) * (betaR.r / betaR);
}
"#,
);

pub const HDR: ShaderFragment = ShaderFragment::new(
    "hdr",
    &["uniforms"],
    &["HDR"],
    r#"
fn HDR(color: vec3<f32>) -> vec3<f32> {
    let L = color * sky.exposure;
    let low = pow(max(L * 0.38317, vec3<f32>(0.0)), vec3<f32>(1.0 / 2.2));
    let high = vec3<f32>(1.0) - exp(-L);
    return select(high, low, L < vec3<f32>(1.413));
}
"#,
);

pub const INSCATTER: ShaderFragment = ShaderFragment::new(
    "inscatter",
    &["uniforms", "texture4d", "phase"],
    &["Inscatter", "inscatter"],
    r#"
struct Inscatter {
    color: vec3<f32>,
    // Viewer moved onto the atmosphere boundary when it starts in space.
    origin: vec3<f32>,
    t: f32,
    attenuation: vec3<f32>,
};

// Light scattered towards the viewer along x + t v with the sun in direction s.
fn inscatter(x_in: vec3<f32>, t_in: f32, v: vec3<f32>, s: vec3<f32>) -> Inscatter {
    let top = sky.cmn.z;
    var x = x_in;
    var t = t_in;
    var r = length(x);
    var mu = dot(x, v) / r;
    var attenuation = vec3<f32>(1.0);
    var result = vec3<f32>(0.0);

    let d = -r * mu - sqrt(max(r * r * (mu * mu - 1.0) + top * top, 0.0));
    if (d > 0.0) {
        x += d * v;
        t -= d;
        mu = (r * mu + d) / top;
        r = top;
    }
    if (r <= top) {
        let nu = dot(v, s);
        let muS = dot(x, s) / r;
        let phaseR = phaseFunctionR(nu);
        let phaseM = phaseFunctionM(nu);
        var ins = max(texture4D(r, mu, muS, nu), vec4<f32>(0.0));
        if (t > 0.0) {
            let x0 = x + t * v;
            let r0 = length(x0);
            let mu0 = dot(x0, v) / r0;
            let muS0 = dot(x0, s) / r0;
            attenuation = rayAttenuation(r, mu, v, x0, t);
            if (r0 > sky.cmn.y + 0.01) {
                ins = max(ins - attenuation.rgbr * texture4D(r0, mu0, muS0, nu), vec4<f32>(0.0));
            }
        }
        // Mie is unreliable once the sun is below the horizon.
        ins.w *= smoothstep(0.00, 0.02, muS);
        result = max(ins.rgb * phaseR + getMie(ins) * phaseM, vec3<f32>(0.0));
    }

    var out: Inscatter;
    out.color = result * ISun;
    out.origin = x;
    out.t = t;
    out.attenuation = attenuation;
    return out;
}
"#,
)
.with_uses(&["rayAttenuation"]);

pub const GROUND_REFLECTED: ShaderFragment = ShaderFragment::new(
    "ground_reflected",
    &["constants", "irradiance"],
    &["groundColor"],
    r#"
// Sunlight and skylight reflected by the ground at the end of the ray.
fn groundColor(x: vec3<f32>, t: f32, v: vec3<f32>, s: vec3<f32>, attenuation: vec3<f32>) -> vec3<f32> {
    if (t <= 0.0) {
        return vec3<f32>(0.0);
    }
    let x0 = x + t * v;
    let r0 = length(x0);
    let muS = dot(x0 / r0, s);
    // The irradiance table already holds the direct sunlight term.
    let groundLight = irradiance(r0, muS);
    let reflected = AVERAGE_GROUND_REFLECTANCE * groundLight * ISun / PI;
    return attenuation * reflected;
}
"#,
);

pub const GROUND_NONE: ShaderFragment = ShaderFragment::new(
    "ground_none",
    &[],
    &["groundColor"],
    r#"
fn groundColor(x: vec3<f32>, t: f32, v: vec3<f32>, s: vec3<f32>, attenuation: vec3<f32>) -> vec3<f32> {
    return vec3<f32>(0.0);
}
"#,
);

pub const SUN_COLOR: ShaderFragment = ShaderFragment::new(
    "sun_color",
    &["uniforms", "transmittance"],
    &["sunColor"],
    r#"
// Direct sunlight for rays that hit the sun disc and not the ground.
fn sunColor(t: f32, v: vec3<f32>, s: vec3<f32>, r: f32, mu: f32) -> vec3<f32> {
    if (t > 0.0) {
        return vec3<f32>(0.0);
    }
    var toTop = vec3<f32>(1.0);
    if (r <= sky.cmn.z) {
        toTop = transmittanceWithShadow(r, mu);
    }
    let isun = step(cos(sky.sunScale), dot(v, s)) * ISun;
    return toTop * isun;
}
"#,
);

pub const FRAGMENT_MAIN: ShaderFragment = ShaderFragment::new(
    "fragment_main",
    &[
        "vertex_io",
        "inscatter",
        "sun_color",
        "hdr",
    ],
    &["fs_main"],
    r#"
@fragment
fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {
    let x = vec3<f32>(0.0, 0.0, sky.cmn.y + sky.cmn.x);
    let ray = normalize(in.ray);
    let sunr = sky.sunr.xyz;

    let r = length(x);
    let mu = dot(x, ray) / r;
    let disc = r * r * (mu * mu - 1.0) + sky.cmn.y * sky.cmn.y;
    var t = -1.0;
    if (disc >= 0.0) {
        t = -r * mu - sqrt(disc);
    }

    let scatter = inscatter(x, t, ray, sunr);
    let ground = groundColor(scatter.origin, scatter.t, ray, sunr, scatter.attenuation);
    let sunLight = sunColor(t, ray, sunr, r, mu);

    // L'heure bleue: blue tint between about -12 and 0 degrees of sun altitude.
    var hb = 0.0;
    if (t <= 0.0) {
        hb = exp(-(sunr.z * sunr.z) * 166.0) + 0.03;
    }
    let bluehour = sky.lheurebleueIntensity * sky.lheurebleueColor * (dot(ray, sunr) + 1.5) * hb;

    return vec4<f32>(HDR(bluehour + sunLight + ground + scatter.color), 1.0)
        + dither(in.position.xy, sky.cmn.w);
}
"#,
)
.with_uses(&["groundColor", "dither"]);

/// Every fragment of the procedural sky program.
pub const SKY_FRAGMENTS: [ShaderFragment; 22] = [
    CONSTANTS,
    UNIFORMS,
    LOOKUP_BINDINGS,
    VERTEX_IO,
    QUAD_RAY,
    VERTEX_MAIN,
    PSEUDO_RAND,
    DITHER_NOISE,
    DITHER_OFF,
    TRANSMITTANCE,
    ANALYTIC_TRANSMITTANCE,
    ATTENUATION_TABLE,
    ATTENUATION_ANALYTIC,
    IRRADIANCE,
    TEXTURE_4D,
    PHASE,
    HDR,
    INSCATTER,
    GROUND_REFLECTED,
    GROUND_NONE,
    SUN_COLOR,
    FRAGMENT_MAIN,
];
