//! Fixed-function software rasterizer
//!
//! Features:
//! - 8-bit indexed color (R3G3B2 palette) with optional ordered dithering
//! - Mipmapped textures with nearest sampling and per-triangle LOD
//! - Perspective-correct or affine texture mapping
//! - Near-plane clipping, face culling, fill/line/point polygon modes
//! - Optional depth test and scissor rectangle

mod buffer;
mod framebuffer;
mod immediate;
mod math;
mod palette;
mod render;
mod texture;
mod transform;
mod types;

pub use buffer::*;
pub use framebuffer::*;
pub use immediate::*;
pub use math::*;
pub use palette::*;
pub use render::*;
pub use texture::*;
pub use transform::*;
pub use types::*;
