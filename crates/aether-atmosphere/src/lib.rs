//! Precomputed atmospheric scattering: the physical model, table layouts, and
//! the multi-pass CPU bake producing transmittance, irradiance, and inscatter tables.

mod error;
pub mod lookup;
pub mod model;
mod precompute;
pub mod resolution;
pub mod table;

pub use error::AtmosphereError;
pub use lookup::{Lookup, inscatter4d, mie_from_packed};
pub use model::{ModelConfig, phase_mie, phase_rayleigh};
pub use precompute::{LookupTables, MacroParams, PrecomputeEngine};
pub use resolution::{SampleCounts, TableResolution};
pub use table::{Table2D, Table3D};
