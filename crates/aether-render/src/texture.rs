//! GPU copies of the precomputed lookup tables.
//!
//! [`LookupTextures`] allocates the three `Rgba32Float` textures once for a
//! [`TableResolution`] and re-uploads them in place whenever the tables change.

use aether_atmosphere::{LookupTables, TableResolution};

/// Texel format of every lookup table.
pub const LOOKUP_FORMAT: wgpu::TextureFormat = wgpu::TextureFormat::Rgba32Float;

/// Errors that can occur during texture creation or upload.
#[derive(Debug, thiserror::Error)]
pub enum TextureError {
    /// Texel data length doesn't match the texture extent.
    #[error(
        "texture '{label}' data size ({actual}) does not match expected ({expected}) for {width}x{height}x{depth}"
    )]
    DataSizeMismatch {
        label: &'static str,
        actual: usize,
        expected: usize,
        width: u32,
        height: u32,
        depth: u32,
    },

    /// A dimension is zero.
    #[error("texture dimensions must be non-zero, got {width}x{height}x{depth}")]
    ZeroDimensions { width: u32, height: u32, depth: u32 },
}

/// One lookup table on the GPU.
pub struct LookupTexture {
    pub texture: wgpu::Texture,
    pub view: wgpu::TextureView,
    pub label: &'static str,
    pub size: wgpu::Extent3d,
    pub dimension: wgpu::TextureDimension,
}

impl LookupTexture {
    /// Allocate an uninitialized 2D or 3D lookup texture.
    pub fn new(
        device: &wgpu::Device,
        label: &'static str,
        dimension: wgpu::TextureDimension,
        size: wgpu::Extent3d,
    ) -> Result<Self, TextureError> {
        if size.width == 0 || size.height == 0 || size.depth_or_array_layers == 0 {
            return Err(TextureError::ZeroDimensions {
                width: size.width,
                height: size.height,
                depth: size.depth_or_array_layers,
            });
        }

        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some(label),
            size,
            mip_level_count: 1,
            sample_count: 1,
            dimension,
            format: LOOKUP_FORMAT,
            usage: wgpu::TextureUsages::TEXTURE_BINDING | wgpu::TextureUsages::COPY_DST,
            view_formats: &[],
        });
        let view = texture.create_view(&wgpu::TextureViewDescriptor::default());

        Ok(Self {
            texture,
            view,
            label,
            size,
            dimension,
        })
    }

    /// Expected upload size in bytes.
    pub fn byte_len(&self) -> usize {
        self.size.width as usize
            * self.size.height as usize
            * self.size.depth_or_array_layers as usize
            * bytes_per_texel()
    }

    /// Overwrite the whole texture.
    pub fn upload(&self, queue: &wgpu::Queue, data: &[u8]) -> Result<(), TextureError> {
        let expected = self.byte_len();
        if data.len() != expected {
            return Err(TextureError::DataSizeMismatch {
                label: self.label,
                actual: data.len(),
                expected,
                width: self.size.width,
                height: self.size.height,
                depth: self.size.depth_or_array_layers,
            });
        }

        queue.write_texture(
            wgpu::TexelCopyTextureInfo {
                texture: &self.texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            data,
            wgpu::TexelCopyBufferLayout {
                offset: 0,
                bytes_per_row: Some(self.size.width * bytes_per_texel() as u32),
                rows_per_image: Some(self.size.height),
            },
            self.size,
        );
        Ok(())
    }

    /// View dimension matching the texture dimension.
    pub fn view_dimension(&self) -> wgpu::TextureViewDimension {
        match self.dimension {
            wgpu::TextureDimension::D3 => wgpu::TextureViewDimension::D3,
            _ => wgpu::TextureViewDimension::D2,
        }
    }
}

/// Transmittance, irradiance and inscatter textures, bound to units 0, 1 and 2.
pub struct LookupTextures {
    pub transmittance: LookupTexture,
    pub irradiance: LookupTexture,
    pub inscatter: LookupTexture,
}

impl LookupTextures {
    /// Allocate the three textures for `resolution`.
    pub fn new(device: &wgpu::Device, resolution: &TableResolution) -> Result<Self, TextureError> {
        let transmittance = LookupTexture::new(
            device,
            "transmittance-lut",
            wgpu::TextureDimension::D2,
            extent(resolution.transmittance_w, resolution.transmittance_h, 1),
        )?;
        let irradiance = LookupTexture::new(
            device,
            "irradiance-lut",
            wgpu::TextureDimension::D2,
            extent(resolution.sky_w, resolution.sky_h, 1),
        )?;
        let inscatter = LookupTexture::new(
            device,
            "inscatter-lut",
            wgpu::TextureDimension::D3,
            extent(resolution.inscatter_width(), resolution.res_mu, resolution.res_r),
        )?;
        log::info!(
            "Created lookup textures ({} bytes)",
            transmittance.byte_len() + irradiance.byte_len() + inscatter.byte_len()
        );

        Ok(Self {
            transmittance,
            irradiance,
            inscatter,
        })
    }

    /// Upload all three tables.
    pub fn upload(&self, queue: &wgpu::Queue, tables: &LookupTables) -> Result<(), TextureError> {
        self.transmittance
            .upload(queue, tables.transmittance.as_bytes())?;
        self.irradiance.upload(queue, tables.irradiance.as_bytes())?;
        self.inscatter.upload(queue, tables.inscatter.as_bytes())?;
        log::debug!("Uploaded lookup tables");
        Ok(())
    }

    /// Textures in binding order.
    pub fn in_binding_order(&self) -> [&LookupTexture; 3] {
        [&self.transmittance, &self.irradiance, &self.inscatter]
    }
}

/// Sampler shared by all lookup textures; linear only when the device can filter `f32` textures.
pub fn create_lookup_sampler(device: &wgpu::Device, filterable: bool) -> wgpu::Sampler {
    let filter = if filterable {
        wgpu::FilterMode::Linear
    } else {
        wgpu::FilterMode::Nearest
    };
    device.create_sampler(&wgpu::SamplerDescriptor {
        label: Some("lookup-sampler"),
        address_mode_u: wgpu::AddressMode::ClampToEdge,
        address_mode_v: wgpu::AddressMode::ClampToEdge,
        address_mode_w: wgpu::AddressMode::ClampToEdge,
        mag_filter: filter,
        min_filter: filter,
        mipmap_filter: wgpu::MipmapFilterMode::Nearest,
        ..Default::default()
    })
}

fn extent(width: u32, height: u32, depth: u32) -> wgpu::Extent3d {
    wgpu::Extent3d {
        width,
        height,
        depth_or_array_layers: depth,
    }
}

fn bytes_per_texel() -> usize {
    LOOKUP_FORMAT.block_copy_size(None).unwrap_or(16) as usize
}
