//! Vertex transform stage
//!
//! object coordinate -> (model-view, projection) -> clip space
//! -> perspective divide -> NDC -> viewport / depth range -> screen space

use super::buffer::Vertex;
use super::framebuffer::DepthRange;
use super::math::{Mat4, Vec2, Vec4};
use super::types::Rect;

/// Vertices with a clip-space w below this are behind the eye
pub const W_EPSILON: f32 = 1e-5;

/// Everything needed to map clip space onto the bound framebuffer
#[derive(Debug, Clone, Copy)]
pub struct ScreenMapping {
    pub viewport: Rect,
    pub depth_range: DepthRange,
    pub perspective_correct: bool,
}

impl ScreenMapping {
    /// Fill `ndc` and `inv_tex_coord` from the vertex's clip coordinate.
    ///
    /// `ndc` ends up as (screen x, screen y, depth, 1/w). Without perspective
    /// correction 1/w is stored as 1 so the rasterizer interpolates linearly.
    pub fn project(&self, v: &mut Vertex) {
        let w = v.clip.w;
        let inv_w = if w.abs() < W_EPSILON { 1.0 / W_EPSILON } else { 1.0 / w };

        let ndc_x = v.clip.x * inv_w;
        let ndc_y = v.clip.y * inv_w;
        let ndc_z = v.clip.z * inv_w;

        let vp = &self.viewport;
        let screen_x = vp.x as f32 + (ndc_x + 1.0) * 0.5 * vp.width as f32;
        // NDC +Y is up, screen +Y is down
        let screen_y = vp.y as f32 + (1.0 - ndc_y) * 0.5 * vp.height as f32;
        let range = &self.depth_range;
        let depth = range.min + (ndc_z + 1.0) * 0.5 * (range.max - range.min);

        if self.perspective_correct {
            v.ndc = Vec4::new(screen_x, screen_y, depth, inv_w);
            v.inv_tex_coord = v.tex_coord * inv_w;
        } else {
            v.ndc = Vec4::new(screen_x, screen_y, depth, 1.0);
            v.inv_tex_coord = v.tex_coord;
        }
    }
}

/// Run the transform stage over a range of vertices
pub fn transform_vertices(vertices: &mut [Vertex], model_view: &Mat4, projection: &Mat4, mapping: &ScreenMapping) {
    let mvp = *projection * *model_view;
    for v in vertices.iter_mut() {
        v.clip = mvp * v.coord;
        mapping.project(v);
    }
}

/// Clip-space interpolation between two vertices, used by near-plane clipping
pub fn lerp_vertex(a: &Vertex, b: &Vertex, t: f32) -> Vertex {
    let mut v = Vertex::new(a.coord.lerp(b.coord, t), a.tex_coord + (b.tex_coord - a.tex_coord) * t);
    v.clip = a.clip.lerp(b.clip, t);
    v
}

/// Texture coordinate recovered from interpolated `inv_tex_coord` and `1/w`
#[inline]
pub fn perspective_tex_coord(inv_tex_coord: Vec2, inv_w: f32) -> Vec2 {
    if inv_w.abs() < f32::EPSILON {
        return inv_tex_coord;
    }
    inv_tex_coord * (1.0 / inv_w)
}
