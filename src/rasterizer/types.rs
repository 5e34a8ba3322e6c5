//! Core types for the rasterizer

use serde::{Deserialize, Serialize};

/// RGB color (0-255 per channel)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const BLACK: Color = Color { r: 0, g: 0, b: 0 };
    pub const WHITE: Color = Color { r: 255, g: 255, b: 255 };
    pub const RED: Color = Color { r: 255, g: 0, b: 0 };
    pub const GREEN: Color = Color { r: 0, g: 255, b: 0 };
    pub const BLUE: Color = Color { r: 0, g: 0, b: 255 };

    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Convert to [u8; 4] with opaque alpha, for presentation surfaces
    pub fn to_rgba(self) -> [u8; 4] {
        [self.r, self.g, self.b, 255]
    }
}

/// Pixel layout of uploaded image data (row-major, tightly packed)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ImageFormat {
    /// 8 bits per channel RGB
    Rgb8,
    /// 8 bits per channel RGBA, alpha is ignored
    Rgba8,
    /// Single 8-bit gray channel
    Luminance8,
}

impl ImageFormat {
    pub fn bytes_per_pixel(self) -> usize {
        match self {
            ImageFormat::Rgb8 => 3,
            ImageFormat::Rgba8 => 4,
            ImageFormat::Luminance8 => 1,
        }
    }

    /// Read the pixel starting at byte offset `i`
    pub fn color_at(self, data: &[u8], i: usize) -> Color {
        match self {
            ImageFormat::Rgb8 | ImageFormat::Rgba8 => Color::new(data[i], data[i + 1], data[i + 2]),
            ImageFormat::Luminance8 => Color::new(data[i], data[i], data[i]),
        }
    }
}

/// Primitive topology for draw calls and immediate mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Primitive {
    Points,
    Lines,
    LineStrip,
    LineLoop,
    Triangles,
    TriangleStrip,
    TriangleFan,
}

/// Which faces are discarded before scan conversion
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum CullMode {
    #[default]
    None,
    Front,
    Back,
}

/// How triangles are drawn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum PolygonMode {
    #[default]
    Fill,
    Line,
    Point,
}

/// Screen-space winding that counts as a front face
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
pub enum FrontFace {
    /// Counter-clockwise as seen on screen
    #[default]
    Ccw,
    Cw,
}

/// Depth comparison, fragment depth against stored depth
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum DepthFunc {
    Never,
    #[default]
    Less,
    Equal,
    LessEqual,
    Greater,
    NotEqual,
    GreaterEqual,
    Always,
}

impl DepthFunc {
    pub fn passes(self, frag_z: f32, stored_z: f32) -> bool {
        match self {
            DepthFunc::Never => false,
            DepthFunc::Less => frag_z < stored_z,
            DepthFunc::Equal => frag_z == stored_z,
            DepthFunc::LessEqual => frag_z <= stored_z,
            DepthFunc::Greater => frag_z > stored_z,
            DepthFunc::NotEqual => frag_z != stored_z,
            DepthFunc::GreaterEqual => frag_z >= stored_z,
            DepthFunc::Always => true,
        }
    }
}

/// Integer pixel rectangle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Rect {
    pub x: i32,
    pub y: i32,
    pub width: i32,
    pub height: i32,
}

impl Rect {
    pub const fn new(x: i32, y: i32, width: i32, height: i32) -> Self {
        Self { x, y, width, height }
    }

    pub fn right(&self) -> i32 {
        self.x + self.width
    }

    pub fn bottom(&self) -> i32 {
        self.y + self.height
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }

    pub fn contains(&self, x: i32, y: i32) -> bool {
        x >= self.x && x < self.right() && y >= self.y && y < self.bottom()
    }

    /// Overlapping area of two rectangles (empty if disjoint)
    pub fn intersect(&self, other: &Rect) -> Rect {
        let x = self.x.max(other.x);
        let y = self.y.max(other.y);
        let right = self.right().min(other.right());
        let bottom = self.bottom().min(other.bottom());
        Rect::new(x, y, (right - x).max(0), (bottom - y).max(0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rect_intersect() {
        let a = Rect::new(0, 0, 10, 10);
        let b = Rect::new(5, -5, 10, 10);
        assert_eq!(a.intersect(&b), Rect::new(5, 0, 5, 5));
        assert!(a.intersect(&Rect::new(20, 20, 1, 1)).is_empty());
    }

    #[test]
    fn test_depth_func() {
        assert!(DepthFunc::Less.passes(0.5, 1.0));
        assert!(!DepthFunc::Less.passes(1.0, 1.0));
        assert!(DepthFunc::LessEqual.passes(1.0, 1.0));
        assert!(!DepthFunc::Never.passes(0.0, 1.0));
        assert!(DepthFunc::Always.passes(2.0, 1.0));
    }

    #[test]
    fn test_image_format_reads_pixels() {
        let rgba = [1, 2, 3, 4, 5, 6, 7, 8];
        assert_eq!(ImageFormat::Rgba8.color_at(&rgba, 4), Color::new(5, 6, 7));
        assert_eq!(ImageFormat::Luminance8.color_at(&[9], 0), Color::new(9, 9, 9));
    }
}
