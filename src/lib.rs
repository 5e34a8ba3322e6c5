//! pico-raster: fixed-function software rasterizer
//!
//! OpenGL-1.x-style rendering (bound buffers, matrices, draw calls and an
//! immediate mode) into a CPU-resident framebuffer of 8-bit palette indices:
//! - R3G3B2 palette with optional ordered dithering on texture upload
//! - Mipmapped textures, per-triangle LOD, nearest sampling with wrapping
//! - Perspective-correct texturing, near-plane clipping, culling
//! - Depth test, scissor rectangle, fill/line/point polygon modes
//!
//! Everything goes through a [`Context`]:
//!
//! ```no_run
//! use pico_raster::{ClearFlags, Context, Primitive};
//!
//! let mut ctx = Context::default();
//! let fb = ctx.create_framebuffer(320, 240).unwrap();
//! ctx.bind_framebuffer(Some(fb)).unwrap();
//! ctx.clear(0, 1.0, ClearFlags::ALL).unwrap();
//!
//! ctx.set_color_index(ctx.color_index(255, 255, 0));
//! ctx.begin(Primitive::Triangles).unwrap();
//! ctx.vertex(-0.5, -0.5, 0.0).unwrap();
//! ctx.vertex(0.5, -0.5, 0.0).unwrap();
//! ctx.vertex(0.0, 0.5, 0.0).unwrap();
//! ctx.end().unwrap();
//! ```

pub mod arena;
pub mod config;
pub mod context;
pub mod error;
pub mod rasterizer;
pub mod state;

pub use config::{ConfigError, RenderConfig};
pub use context::{Context, PresentSurface, RenderStats};
pub use error::{Error, ErrorKind, LoadError, Result};
pub use rasterizer::{ClearFlags, CullMode, DepthFunc, FrontFace, ImageFormat, PolygonMode, Primitive};
pub use state::{Capability, FramebufferId, IndexBufferId, TextureId, VertexBufferId};

/// Version from Cargo.toml
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
