//! Mipmapped indexed-color textures
//!
//! All mip levels live in one contiguous texel buffer, level 0 first. The
//! per-level offsets are computed once per upload and kept in a [`MipChain`],
//! so selecting a level is a plain lookup.

use std::borrow::Cow;
use std::path::Path;

use crate::error::{Error, Result};
use super::palette::PALETTE;
use super::types::ImageFormat;

/// Location and size of one mip level inside the texel buffer
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MipLevel {
    pub offset: usize,
    pub width: usize,
    pub height: usize,
}

impl MipLevel {
    pub fn len(&self) -> usize {
        self.width * self.height
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Layout of a full mip chain
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MipChain {
    levels: Vec<MipLevel>,
}

impl MipChain {
    /// Level 0 only, or every halving step down to 1x1 inclusive
    pub fn new(width: usize, height: usize, generate_mips: bool) -> Self {
        let mut levels = Vec::new();
        let (mut w, mut h) = (width, height);
        let mut offset = 0;

        loop {
            levels.push(MipLevel { offset, width: w, height: h });
            offset += w * h;

            if !generate_mips || (w == 1 && h == 1) {
                break;
            }
            w = (w / 2).max(1);
            h = (h / 2).max(1);
        }

        Self { levels }
    }

    pub fn count(&self) -> usize {
        self.levels.len()
    }

    pub fn levels(&self) -> &[MipLevel] {
        &self.levels
    }

    /// Sum of all level sizes
    pub fn total_texels(&self) -> usize {
        self.levels.last().map_or(0, |l| l.offset + l.len())
    }
}

/// Texture resource: exclusive owner of its texel buffer
#[derive(Debug, Clone, Default)]
pub struct Texture {
    width: usize,
    height: usize,
    texels: Vec<u8>,
    chain: MipChain,
}

impl Texture {
    /// Empty texture with zero dimensions and no texels
    pub fn new() -> Self {
        Self::default()
    }

    pub fn width(&self) -> usize {
        self.width
    }

    pub fn height(&self) -> usize {
        self.height
    }

    pub fn mip_count(&self) -> usize {
        self.chain.count()
    }

    pub fn mip_chain(&self) -> &MipChain {
        &self.chain
    }

    pub fn texels(&self) -> &[u8] {
        &self.texels
    }

    pub fn is_empty(&self) -> bool {
        self.texels.is_empty()
    }

    /// Upload image data, optionally generating the full mip chain.
    ///
    /// The texel buffer is only reallocated when width, height or mip count
    /// change; otherwise it is overwritten in place.
    pub fn set_image_2d(
        &mut self,
        width: usize,
        height: usize,
        format: ImageFormat,
        data: &[u8],
        dither: bool,
        generate_mips: bool,
    ) -> Result<()> {
        if width == 0 || height == 0 {
            return Err(Error::invalid_argument("texture_image_2d"));
        }
        if data.len() < width * height * format.bytes_per_pixel() {
            return Err(Error::argument_mismatch("texture_image_2d"));
        }

        let chain = MipChain::new(width, height, generate_mips);

        if self.width != width || self.height != height || self.chain.count() != chain.count() {
            log::debug!(
                "Texture realloc: {}x{} with {} mip level(s), {} texels",
                width,
                height,
                chain.count(),
                chain.total_texels()
            );
            self.width = width;
            self.height = height;
            self.texels = vec![0; chain.total_texels()];
        }
        self.chain = chain;

        let bpp = format.bytes_per_pixel();
        let mut source: Cow<[u8]> = Cow::Borrowed(data);
        let (mut src_w, mut src_h) = (width, height);

        for (mip, level) in self.chain.levels.iter().enumerate() {
            if mip > 0 {
                // The previous level's source is dropped here unless it is the caller's data
                source = Cow::Owned(downsample(src_w, src_h, bpp, &source));
                src_w = level.width;
                src_h = level.height;
            }
            let dest = &mut self.texels[level.offset..level.offset + level.len()];
            PALETTE.quantize(dest, level.width, level.height, format, &source, dither);
        }

        Ok(())
    }

    /// Replace a rectangle of one mip level
    #[allow(clippy::too_many_arguments)]
    pub fn sub_image_2d(
        &mut self,
        mip: usize,
        x: usize,
        y: usize,
        width: usize,
        height: usize,
        format: ImageFormat,
        data: &[u8],
        dither: bool,
    ) -> Result<()> {
        let level = *self
            .chain
            .levels
            .get(mip)
            .ok_or(Error::invalid_argument("texture_sub_image_2d"))?;
        if width == 0 || height == 0 || x + width > level.width || y + height > level.height {
            return Err(Error::invalid_argument("texture_sub_image_2d"));
        }
        if data.len() < width * height * format.bytes_per_pixel() {
            return Err(Error::argument_mismatch("texture_sub_image_2d"));
        }

        let mut rect = vec![0u8; width * height];
        PALETTE.quantize(&mut rect, width, height, format, data, dither);

        for (row, src) in rect.chunks_exact(width).enumerate() {
            let start = level.offset + (y + row) * level.width + x;
            self.texels[start..start + width].copy_from_slice(src);
        }
        Ok(())
    }

    /// Offset and size of a mip level, `mip` clamped into the chain.
    /// `None` while no image has been uploaded.
    pub fn select_mip_level(&self, mip: usize) -> Option<MipLevel> {
        let last = self.chain.count().checked_sub(1)?;
        self.chain.levels.get(mip.min(last)).copied()
    }

    /// Texels of a level as returned by [`Texture::select_mip_level`]
    pub fn level_texels(&self, level: &MipLevel) -> &[u8] {
        &self.texels[level.offset..level.offset + level.len()]
    }

    /// Mip level whose texel density best matches the projected pixel density
    pub fn compute_mip_level(&self, pixel_area: f32, texel_area: f32) -> usize {
        let max_mip = self.chain.count().saturating_sub(1) as f32;
        let texel_area = texel_area * (self.width * self.height) as f32 * 0.5;
        (texel_area / pixel_area).clamp(0.0, max_mip) as usize
    }
}

/// Nearest-neighbour sample with repeat wrapping
pub fn sample_nearest(texels: &[u8], width: usize, height: usize, u: f32, v: f32) -> u8 {
    let x = wrap_coord(u, width);
    let y = wrap_coord(v, height);
    texels[y * width + x]
}

fn wrap_coord(t: f32, size: usize) -> usize {
    let mut f = t - t.trunc();
    if f < 0.0 {
        f += 1.0;
    }
    ((f * size as f32) as usize).min(size - 1)
}

/// Box-filter an image down to the next mip size
fn downsample(width: usize, height: usize, bpp: usize, data: &[u8]) -> Vec<u8> {
    let scaled_w = (width / 2).max(1);
    let scaled_h = (height / 2).max(1);
    let texel = |x: usize, y: usize, i: usize| data[(y * width + x) * bpp + i] as u32;

    let mut scaled = vec![0u8; scaled_w * scaled_h * bpp];

    if width > 1 && height > 1 {
        for y in 0..scaled_h {
            for x in 0..scaled_w {
                for i in 0..bpp {
                    let sum = texel(x * 2, y * 2, i)
                        + texel(x * 2 + 1, y * 2, i)
                        + texel(x * 2 + 1, y * 2 + 1, i)
                        + texel(x * 2, y * 2 + 1, i);
                    scaled[(y * scaled_w + x) * bpp + i] = (sum / 4) as u8;
                }
            }
        }
    } else if width > 1 {
        for x in 0..scaled_w {
            for i in 0..bpp {
                let sum = texel(x * 2, 0, i) + texel(x * 2 + 1, 0, i);
                scaled[x * bpp + i] = (sum / 2) as u8;
            }
        }
    } else if height > 1 {
        for y in 0..scaled_h {
            for i in 0..bpp {
                let sum = texel(0, y * 2, i) + texel(0, y * 2 + 1, i);
                scaled[y * bpp + i] = (sum / 2) as u8;
            }
        }
    } else {
        scaled.copy_from_slice(&data[..bpp]);
    }

    scaled
}

/// Decoded RGB8 image produced by the external image loader
pub struct DecodedImage {
    pub width: usize,
    pub height: usize,
    pub rgb: Vec<u8>,
}

/// Decode a BMP, PNG, TGA or JPEG file into tightly packed RGB8
pub fn decode_image_file<P: AsRef<Path>>(path: P) -> std::result::Result<DecodedImage, image::ImageError> {
    let img = image::open(path.as_ref())?;
    let rgb = img.to_rgb8();
    Ok(DecodedImage {
        width: rgb.width() as usize,
        height: rgb.height() as usize,
        rgb: rgb.into_raw(),
    })
}
