//! PNG previews of the lookup tables.
//!
//! Each table is normalised by its brightest channel so the structure is
//! visible regardless of the absolute radiance. The inscatter table is unfolded
//! into a column of `res_r` slices, each `res_mu_s * res_nu` wide.

use aether_atmosphere::{LookupTables, Table2D, Table3D};
use glam::Vec4;

/// Convert a 2D table to an 8-bit RGB image.
pub fn table2d_image(table: &Table2D) -> image::RgbImage {
    let scale = normaliser(table.texels());
    image::RgbImage::from_fn(table.width(), table.height(), |x, y| {
        // Row 0 is the lowest radius; put it at the bottom of the image.
        to_rgb(table.get(x, table.height() - 1 - y), scale)
    })
}

/// Unfold a 3D table into a 2D image, one `width x height` slice per depth layer.
pub fn table3d_image(table: &Table3D) -> image::RgbImage {
    let scale = normaliser(table.texels());
    let (w, h, d) = (table.width(), table.height(), table.depth());
    image::RgbImage::from_fn(w, h * d, |x, y| {
        let layer = d - 1 - y / h;
        to_rgb(table.get(x, h - 1 - y % h, layer), scale)
    })
}

/// The Mie channel (alpha) of the inscatter table as greyscale.
pub fn inscatter_mie_image(table: &Table3D) -> image::GrayImage {
    let peak = table
        .texels()
        .iter()
        .map(|t| t[3])
        .fold(0.0_f32, f32::max);
    let scale = if peak > 0.0 { 1.0 / peak } else { 0.0 };
    let (w, h, d) = (table.width(), table.height(), table.depth());
    image::GrayImage::from_fn(w, h * d, |x, y| {
        let layer = d - 1 - y / h;
        let v = table.get(x, h - 1 - y % h, layer).w * scale;
        image::Luma([quantize(v)])
    })
}

/// Named preview images for all three tables.
pub fn table_previews(tables: &LookupTables) -> Vec<(&'static str, image::DynamicImage)> {
    vec![
        (
            "transmittance.png",
            table2d_image(&tables.transmittance).into(),
        ),
        ("irradiance.png", table2d_image(&tables.irradiance).into()),
        ("inscatter.png", table3d_image(&tables.inscatter).into()),
        (
            "inscatter_mie.png",
            inscatter_mie_image(&tables.inscatter).into(),
        ),
    ]
}

fn normaliser(texels: &[[f32; 4]]) -> f32 {
    let peak = texels
        .iter()
        .flat_map(|t| t[..3].iter().copied())
        .fold(0.0_f32, f32::max);
    if peak > 0.0 { 1.0 / peak } else { 0.0 }
}

fn to_rgb(texel: Vec4, scale: f32) -> image::Rgb<u8> {
    image::Rgb([
        quantize(texel.x * scale),
        quantize(texel.y * scale),
        quantize(texel.z * scale),
    ])
}

fn quantize(v: f32) -> u8 {
    (v.clamp(0.0, 1.0) * 255.0).round() as u8
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_brightest_texel_maps_to_white() {
        let mut table = Table2D::new(2, 2);
        table.set(1, 0, Vec4::new(4.0, 2.0, 1.0, 0.0));
        let img = table2d_image(&table);
        // Row 0 ends up at the bottom.
        assert_eq!(img.get_pixel(1, 1).0, [255, 128, 64]);
        assert_eq!(img.get_pixel(0, 0).0, [0, 0, 0]);
    }

    #[test]
    fn test_empty_table_is_black() {
        let img = table2d_image(&Table2D::new(3, 2));
        assert!(img.pixels().all(|p| p.0 == [0, 0, 0]));
    }

    #[test]
    fn test_inscatter_unfolds_layers_vertically() {
        let mut table = Table3D::new(4, 2, 3);
        table.set(0, 0, 2, Vec4::ONE);
        let img = table3d_image(&table);
        assert_eq!(img.dimensions(), (4, 6));
        // Top layer, bottom row of its slice.
        assert_eq!(img.get_pixel(0, 1).0, [255, 255, 255]);
    }

    #[test]
    fn test_mie_image_reads_alpha() {
        let mut table = Table3D::new(2, 2, 1);
        table.set(1, 1, 0, Vec4::new(0.0, 0.0, 0.0, 0.5));
        let img = inscatter_mie_image(&table);
        assert_eq!(img.get_pixel(1, 0).0, [255]);
    }
}
