//! CPU-resident RGBA float tables with GPU-style filtered sampling.
//!
//! Sampling follows the conventions of a linearly filtered, clamp-to-edge
//! texture: texel `i` covers `[i, i + 1) / size` and its centre is at
//! `(i + 0.5) / size`.

use glam::Vec4;

/// A 2D table of RGBA `f32` texels, stored row-major.
#[derive(Clone, Debug, PartialEq)]
pub struct Table2D {
    width: u32,
    height: u32,
    texels: Vec<[f32; 4]>,
}

impl Table2D {
    /// Allocate a zeroed table.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            texels: vec![[0.0; 4]; (width * height) as usize],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn get(&self, x: u32, y: u32) -> Vec4 {
        Vec4::from_array(self.texels[self.index(x, y)])
    }

    pub fn set(&mut self, x: u32, y: u32, value: Vec4) {
        let i = self.index(x, y);
        self.texels[i] = value.to_array();
    }

    pub fn texels(&self) -> &[[f32; 4]] {
        &self.texels
    }

    /// Raw bytes in `Rgba32Float` layout, ready for upload.
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.texels)
    }

    /// Overwrite every texel with another table of the same size.
    pub fn copy_from(&mut self, other: &Table2D) {
        debug_assert_eq!((self.width, self.height), (other.width, other.height));
        self.texels.copy_from_slice(&other.texels);
    }

    /// Bilinear sample at normalised coordinates.
    pub fn sample(&self, u: f32, v: f32) -> Vec4 {
        let (x0, x1, fx) = filter_taps(u, self.width);
        let (y0, y1, fy) = filter_taps(v, self.height);
        let top = self.get(x0, y0).lerp(self.get(x1, y0), fx);
        let bottom = self.get(x0, y1).lerp(self.get(x1, y1), fx);
        top.lerp(bottom, fy)
    }

    fn index(&self, x: u32, y: u32) -> usize {
        debug_assert!(x < self.width && y < self.height);
        (y * self.width + x) as usize
    }
}

/// A 3D table of RGBA `f32` texels, stored slice by slice.
#[derive(Clone, Debug, PartialEq)]
pub struct Table3D {
    width: u32,
    height: u32,
    depth: u32,
    texels: Vec<[f32; 4]>,
}

impl Table3D {
    /// Allocate a zeroed table.
    pub fn new(width: u32, height: u32, depth: u32) -> Self {
        Self {
            width,
            height,
            depth,
            texels: vec![[0.0; 4]; (width * height * depth) as usize],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn depth(&self) -> u32 {
        self.depth
    }

    pub fn get(&self, x: u32, y: u32, z: u32) -> Vec4 {
        Vec4::from_array(self.texels[self.index(x, y, z)])
    }

    pub fn set(&mut self, x: u32, y: u32, z: u32, value: Vec4) {
        let i = self.index(x, y, z);
        self.texels[i] = value.to_array();
    }

    pub fn texels(&self) -> &[[f32; 4]] {
        &self.texels
    }

    /// Raw bytes in `Rgba32Float` layout, ready for upload.
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.texels)
    }

    /// Trilinear sample at normalised coordinates.
    pub fn sample(&self, u: f32, v: f32, w: f32) -> Vec4 {
        let (x0, x1, fx) = filter_taps(u, self.width);
        let (y0, y1, fy) = filter_taps(v, self.height);
        let (z0, z1, fz) = filter_taps(w, self.depth);
        let slice = |z: u32| {
            let top = self.get(x0, y0, z).lerp(self.get(x1, y0, z), fx);
            let bottom = self.get(x0, y1, z).lerp(self.get(x1, y1, z), fx);
            top.lerp(bottom, fy)
        };
        slice(z0).lerp(slice(z1), fz)
    }

    fn index(&self, x: u32, y: u32, z: u32) -> usize {
        debug_assert!(x < self.width && y < self.height && z < self.depth);
        ((z * self.height + y) * self.width + x) as usize
    }
}

/// The two texel indices and blend weight for linear filtering along one axis.
fn filter_taps(coord: f32, size: u32) -> (u32, u32, f32) {
    let coord = if coord.is_finite() { coord } else { 0.0 };
    let x = coord * size as f32 - 0.5;
    let base = x.floor();
    let frac = x - base;
    let last = size as i64 - 1;
    let i0 = (base as i64).clamp(0, last) as u32;
    let i1 = (base as i64 + 1).clamp(0, last) as u32;
    (i0, i1, frac)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_at_texel_centre_returns_texel() {
        let mut table = Table2D::new(4, 2);
        table.set(2, 1, Vec4::new(1.0, 2.0, 3.0, 4.0));
        let v = table.sample(2.5 / 4.0, 1.5 / 2.0);
        assert_eq!(v, Vec4::new(1.0, 2.0, 3.0, 4.0));
    }

    #[test]
    fn test_sample_between_texels_interpolates() {
        let mut table = Table2D::new(2, 1);
        table.set(0, 0, Vec4::ZERO);
        table.set(1, 0, Vec4::ONE);
        let v = table.sample(0.5, 0.5);
        assert!((v.x - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_sample_clamps_to_edge() {
        let mut table = Table2D::new(3, 1);
        table.set(0, 0, Vec4::splat(7.0));
        assert_eq!(table.sample(-5.0, 0.5), Vec4::splat(7.0));
        assert_eq!(table.sample(f32::NAN, 0.5), Vec4::splat(7.0));
    }

    #[test]
    fn test_3d_layout_is_slice_major() {
        let mut table = Table3D::new(2, 3, 4);
        table.set(1, 2, 3, Vec4::ONE);
        assert_eq!(table.texels().last().copied(), Some([1.0; 4]));
        assert_eq!(table.as_bytes().len(), 2 * 3 * 4 * 16);
    }

    #[test]
    fn test_3d_sample_interpolates_between_slices() {
        let mut table = Table3D::new(1, 1, 2);
        table.set(0, 0, 1, Vec4::splat(2.0));
        let v = table.sample(0.5, 0.5, 0.5);
        assert!((v.x - 1.0).abs() < 1e-6);
    }
}
