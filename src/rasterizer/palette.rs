//! Fixed 256-entry R3G3B2 color palette
//!
//! Index bits: `RRRGGGBB`. Decoding spreads each field over 0-255, encoding
//! picks the nearest level per channel, so `index_of(color(i)) == i` holds for
//! every index.

use super::types::{Color, ImageFormat};

/// Global palette, immutable for the process lifetime
pub static PALETTE: ColorPalette = ColorPalette::r3g3b2();

/// 4x4 ordered-dither thresholds
const BAYER_4X4: [[i32; 4]; 4] = [
    [0, 8, 2, 10],
    [12, 4, 14, 6],
    [3, 11, 1, 9],
    [15, 7, 13, 5],
];

pub struct ColorPalette {
    colors: [Color; 256],
}

impl ColorPalette {
    const fn r3g3b2() -> Self {
        let mut colors = [Color::BLACK; 256];
        let mut i = 0;
        while i < 256 {
            let r = ((i >> 5) & 0x7) as u32;
            let g = ((i >> 2) & 0x7) as u32;
            let b = (i & 0x3) as u32;
            colors[i] = Color::new((r * 255 / 7) as u8, (g * 255 / 7) as u8, (b * 255 / 3) as u8);
            i += 1;
        }
        Self { colors }
    }

    /// RGB value of a palette index
    pub fn color(&self, index: u8) -> Color {
        self.colors[index as usize]
    }

    pub fn colors(&self) -> &[Color; 256] {
        &self.colors
    }

    /// Nearest palette index for an RGB color
    pub fn index_of(&self, color: Color) -> u8 {
        color_to_index(color.r, color.g, color.b)
    }

    /// Quantize an image into palette indices, writing `width * height` bytes into `dest`
    pub fn quantize(
        &self,
        dest: &mut [u8],
        width: usize,
        height: usize,
        format: ImageFormat,
        data: &[u8],
        dither: bool,
    ) {
        let bpp = format.bytes_per_pixel();
        for y in 0..height {
            for x in 0..width {
                let i = y * width + x;
                let c = format.color_at(data, i * bpp);
                dest[i] = if dither {
                    dithered_index(c, x, y)
                } else {
                    color_to_index(c.r, c.g, c.b)
                };
            }
        }
    }
}

fn nearest_level(value: u8, max_level: u32) -> u32 {
    (value as u32 * max_level + 127) / 255
}

/// Converts an RGB color into its R3G3B2 palette index
pub fn color_to_index(r: u8, g: u8, b: u8) -> u8 {
    let r = nearest_level(r, 7);
    let g = nearest_level(g, 7);
    let b = nearest_level(b, 3);
    ((r << 5) | (g << 2) | b) as u8
}

fn dither_channel(value: u8, threshold: i32, step: i32) -> u8 {
    // threshold in [0, 16) becomes an offset in (-step/2, step/2)
    let offset = (threshold * 2 + 1 - 16) * step / 32;
    (value as i32 + offset).clamp(0, 255) as u8
}

fn dithered_index(c: Color, x: usize, y: usize) -> u8 {
    let t = BAYER_4X4[y & 3][x & 3];
    color_to_index(
        dither_channel(c.r, t, 255 / 7),
        dither_channel(c.g, t, 255 / 7),
        dither_channel(c.b, t, 255 / 3),
    )
}
