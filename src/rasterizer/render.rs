//! Primitive rasterization
//!
//! Points, lines and triangles are written into the palette-index plane of a
//! framebuffer. Strips, loops and fans are first decomposed into atomic
//! primitives, then each atom is clipped, culled and scan converted.
//!
//! Triangle coverage uses fixed-point edge functions sampled at pixel centers
//! with a top-left fill rule, so two triangles sharing an edge never both
//! cover (or both miss) a pixel on that edge.

use super::buffer::Vertex;
use super::framebuffer::Framebuffer;
use super::math::Vec2;
use super::texture::{sample_nearest, Texture};
use super::transform::{lerp_vertex, perspective_tex_coord, ScreenMapping, W_EPSILON};
use super::types::{CullMode, DepthFunc, FrontFace, PolygonMode, Primitive, Rect};

/// Sub-pixel precision of screen coordinates
const SUB_PIXEL_BITS: u32 = 4;
const SUB_PIXEL: i64 = 1 << SUB_PIXEL_BITS;
/// Screen coordinates are clamped to +-COORD_LIMIT pixels before snapping
/// or line setup
const COORD_LIMIT: f32 = 1.0e6;

/// Draw state the rasterizer needs, captured from the state machine per draw
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RasterState {
    pub color_index: u8,
    pub cull_mode: CullMode,
    pub front_face: FrontFace,
    pub polygon_mode: PolygonMode,
    pub depth_test: bool,
    pub depth_func: DepthFunc,
    pub scissor_test: bool,
    pub perspective_correct: bool,
}

impl Default for RasterState {
    fn default() -> Self {
        Self {
            color_index: 0,
            cull_mode: CullMode::None,
            front_face: FrontFace::Ccw,
            polygon_mode: PolygonMode::Fill,
            depth_test: false,
            depth_func: DepthFunc::Less,
            scissor_test: false,
            perspective_correct: true,
        }
    }
}

/// Atomic primitive, as positions into the draw's vertex order
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Atom {
    Point(usize),
    Line(usize, usize),
    Triangle(usize, usize, usize),
}

/// Expand a topology over `count` vertices into atomic primitives
pub fn decompose(primitive: Primitive, count: usize) -> Vec<Atom> {
    let mut atoms = Vec::new();

    match primitive {
        Primitive::Points => atoms.extend((0..count).map(Atom::Point)),
        Primitive::Lines => atoms.extend((0..count / 2).map(|i| Atom::Line(i * 2, i * 2 + 1))),
        Primitive::LineStrip | Primitive::LineLoop => {
            if count >= 2 {
                atoms.extend((0..count - 1).map(|i| Atom::Line(i, i + 1)));
                if primitive == Primitive::LineLoop && count > 2 {
                    atoms.push(Atom::Line(count - 1, 0));
                }
            }
        }
        Primitive::Triangles => {
            atoms.extend((0..count / 3).map(|i| Atom::Triangle(i * 3, i * 3 + 1, i * 3 + 2)))
        }
        Primitive::TriangleStrip => {
            if count >= 3 {
                atoms.extend((0..count - 2).map(|i| {
                    if i % 2 == 0 {
                        Atom::Triangle(i, i + 1, i + 2)
                    } else {
                        // Keep winding consistent along the strip
                        Atom::Triangle(i + 1, i, i + 2)
                    }
                }));
            }
        }
        Primitive::TriangleFan => {
            if count >= 3 {
                atoms.extend((1..count - 1).map(|i| Atom::Triangle(0, i, i + 1)));
            }
        }
    }

    atoms
}

/// Maps a position in the draw to a vertex in the buffer
#[derive(Debug, Clone, Copy)]
pub enum VertexOrder<'a> {
    /// Consecutive vertices starting at `first`
    Range { first: usize },
    /// Indices read from an index buffer
    Indexed(&'a [u16]),
}

impl VertexOrder<'_> {
    #[inline]
    pub fn get(&self, i: usize) -> usize {
        match self {
            VertexOrder::Range { first } => first + i,
            VertexOrder::Indexed(indices) => indices[i] as usize,
        }
    }
}

/// Signed screen-space area (doubled), positive when counter-clockwise on screen
pub fn signed_area(a: &Vertex, b: &Vertex, c: &Vertex) -> f32 {
    // Screen y grows downwards, hence the flipped cross product
    (c.ndc.x - a.ndc.x) * (b.ndc.y - a.ndc.y) - (b.ndc.x - a.ndc.x) * (c.ndc.y - a.ndc.y)
}

/// Fixed-point screen position
#[derive(Debug, Clone, Copy)]
struct FixedPoint {
    x: i64,
    y: i64,
}

impl FixedPoint {
    fn from_vertex(v: &Vertex) -> Self {
        let snap = |c: f32| (c.clamp(-COORD_LIMIT, COORD_LIMIT) * SUB_PIXEL as f32).round() as i64;
        Self { x: snap(v.ndc.x), y: snap(v.ndc.y) }
    }
}

/// Edge function: twice the signed area of (a, b, p) in fixed-point units
#[inline]
fn edge(a: FixedPoint, b: FixedPoint, px: i64, py: i64) -> i64 {
    (b.x - a.x) * (py - a.y) - (b.y - a.y) * (px - a.x)
}

/// Top edges (horizontal, pointing right) and left edges (pointing up) own
/// the pixels lying exactly on them
#[inline]
fn is_top_left(a: FixedPoint, b: FixedPoint) -> bool {
    let dx = b.x - a.x;
    let dy = b.y - a.y;
    (dy == 0 && dx > 0) || dy < 0
}

pub struct Rasterizer<'a> {
    fb: &'a mut Framebuffer,
    texture: Option<&'a Texture>,
    state: RasterState,
    mapping: ScreenMapping,
    clip: Rect,
    /// Triangles scan converted since creation
    pub triangles: usize,
}

impl<'a> Rasterizer<'a> {
    pub fn new(fb: &'a mut Framebuffer, texture: Option<&'a Texture>, state: RasterState) -> Self {
        let mapping = ScreenMapping {
            viewport: fb.viewport,
            depth_range: fb.depth_range,
            perspective_correct: state.perspective_correct,
        };
        let clip = fb.clip_rect(state.scissor_test);
        Self {
            fb,
            texture: texture.filter(|t| !t.is_empty()),
            state,
            mapping,
            clip,
            triangles: 0,
        }
    }

    /// Screen mapping of the target framebuffer, for the transform stage
    pub fn mapping(&self) -> ScreenMapping {
        self.mapping
    }

    /// Rasterize decomposed primitives over transformed vertices
    pub fn draw_atoms(&mut self, atoms: &[Atom], vertices: &[Vertex], order: VertexOrder<'_>) {
        for &atom in atoms {
            match atom {
                Atom::Point(i) => self.point(&vertices[order.get(i)]),
                Atom::Line(i, j) => self.line(&vertices[order.get(i)], &vertices[order.get(j)]),
                Atom::Triangle(i, j, k) => self.triangle(
                    &vertices[order.get(i)],
                    &vertices[order.get(j)],
                    &vertices[order.get(k)],
                ),
            }
        }
    }

    pub fn point(&mut self, v: &Vertex) {
        if v.clip.w < W_EPSILON {
            return;
        }
        let x = v.ndc.x.floor() as i32;
        let y = v.ndc.y.floor() as i32;
        self.screen_point(x, y, self.state.color_index);
    }

    pub fn line(&mut self, a: &Vertex, b: &Vertex) {
        let (a, b) = match (a.clip.w >= W_EPSILON, b.clip.w >= W_EPSILON) {
            (true, true) => (*a, *b),
            (false, false) => return,
            (true, false) => (*a, self.clip_to_near(a, b)),
            (false, true) => (self.clip_to_near(b, a), *b),
        };
        let pixel = |c: f32| c.clamp(-COORD_LIMIT, COORD_LIMIT).floor() as i32;
        let (x0, y0) = (pixel(a.ndc.x), pixel(a.ndc.y));
        let (x1, y1) = (pixel(b.ndc.x), pixel(b.ndc.y));
        self.screen_line(x0, y0, x1, y1, self.state.color_index);
    }

    pub fn triangle(&mut self, a: &Vertex, b: &Vertex, c: &Vertex) {
        if a.clip.w >= W_EPSILON && b.clip.w >= W_EPSILON && c.clip.w >= W_EPSILON {
            self.projected_triangle(a, b, c);
            return;
        }

        let clipped = self.clip_polygon_to_near([*a, *b, *c]);
        for i in 1..clipped.len().saturating_sub(1) {
            self.projected_triangle(&clipped[0], &clipped[i], &clipped[i + 1]);
        }
    }

    /// Vertex on segment `inside -> outside` where w reaches the near limit
    fn clip_to_near(&self, inside: &Vertex, outside: &Vertex) -> Vertex {
        let t = (inside.clip.w - W_EPSILON) / (inside.clip.w - outside.clip.w);
        let mut v = lerp_vertex(inside, outside, t);
        self.mapping.project(&mut v);
        v
    }

    /// Sutherland-Hodgman against the w = W_EPSILON plane
    fn clip_polygon_to_near(&self, input: [Vertex; 3]) -> Vec<Vertex> {
        let mut out = Vec::with_capacity(4);
        for i in 0..3 {
            let cur = &input[i];
            let next = &input[(i + 1) % 3];
            let cur_in = cur.clip.w >= W_EPSILON;
            let next_in = next.clip.w >= W_EPSILON;
            if cur_in {
                out.push(*cur);
            }
            if cur_in != next_in {
                out.push(if cur_in {
                    self.clip_to_near(cur, next)
                } else {
                    self.clip_to_near(next, cur)
                });
            }
        }
        out
    }

    fn is_culled(&self, area: f32) -> bool {
        let is_front = match self.state.front_face {
            FrontFace::Ccw => area > 0.0,
            FrontFace::Cw => area < 0.0,
        };
        match self.state.cull_mode {
            CullMode::None => false,
            CullMode::Front => is_front,
            CullMode::Back => !is_front,
        }
    }

    fn projected_triangle(&mut self, a: &Vertex, b: &Vertex, c: &Vertex) {
        let area = signed_area(a, b, c);
        if self.is_culled(area) {
            return;
        }

        match self.state.polygon_mode {
            PolygonMode::Fill => self.fill_triangle(a, b, c),
            PolygonMode::Line => {
                self.line(a, b);
                self.line(b, c);
                self.line(c, a);
            }
            PolygonMode::Point => {
                self.point(a);
                self.point(b);
                self.point(c);
            }
        }
    }

    fn fill_triangle(&mut self, a: &Vertex, b: &Vertex, c: &Vertex) {
        let mut v = [a, b, c];
        let mut p = [FixedPoint::from_vertex(a), FixedPoint::from_vertex(b), FixedPoint::from_vertex(c)];

        let mut area = edge(p[0], p[1], p[2].x, p[2].y);
        if area == 0 {
            return;
        }
        if area < 0 {
            v.swap(1, 2);
            p.swap(1, 2);
            area = -area;
        }

        // Bounding box in whole pixels, clipped to the scissor/viewport region
        let min_x = (p[0].x.min(p[1].x).min(p[2].x) >> SUB_PIXEL_BITS) as i32;
        let min_y = (p[0].y.min(p[1].y).min(p[2].y) >> SUB_PIXEL_BITS) as i32;
        let max_x = (p[0].x.max(p[1].x).max(p[2].x) >> SUB_PIXEL_BITS) as i32 + 1;
        let max_y = (p[0].y.max(p[1].y).max(p[2].y) >> SUB_PIXEL_BITS) as i32 + 1;
        let bbox = Rect::new(min_x, min_y, max_x - min_x, max_y - min_y).intersect(&self.clip);
        if bbox.is_empty() {
            return;
        }

        self.triangles += 1;

        // Mip level from the screen-space vs texture-space area of the whole triangle
        let sampler = self.texture.and_then(|tex| {
            let pixel_area = area as f32 / (SUB_PIXEL * SUB_PIXEL) as f32 * 0.5;
            let texel_area = tex_area(v[0].tex_coord, v[1].tex_coord, v[2].tex_coord);
            let level = tex.select_mip_level(tex.compute_mip_level(pixel_area, texel_area))?;
            Some((tex.level_texels(&level), level.width, level.height))
        });

        let bias = [
            if is_top_left(p[1], p[2]) { 0 } else { -1 },
            if is_top_left(p[2], p[0]) { 0 } else { -1 },
            if is_top_left(p[0], p[1]) { 0 } else { -1 },
        ];
        let inv_area = 1.0 / area as f32;
        let depth_test = self.state.depth_test;
        let depth_func = self.state.depth_func;
        let flat_color = self.state.color_index;

        // Edge function values at the first pixel center and their per-pixel steps
        let px0 = bbox.x as i64 * SUB_PIXEL + SUB_PIXEL / 2;
        let py0 = bbox.y as i64 * SUB_PIXEL + SUB_PIXEL / 2;
        let mut row = [
            edge(p[1], p[2], px0, py0),
            edge(p[2], p[0], px0, py0),
            edge(p[0], p[1], px0, py0),
        ];
        let step_x = [
            -(p[2].y - p[1].y) * SUB_PIXEL,
            -(p[0].y - p[2].y) * SUB_PIXEL,
            -(p[1].y - p[0].y) * SUB_PIXEL,
        ];
        let step_y = [
            (p[2].x - p[1].x) * SUB_PIXEL,
            (p[0].x - p[2].x) * SUB_PIXEL,
            (p[1].x - p[0].x) * SUB_PIXEL,
        ];

        for y in bbox.y..bbox.bottom() {
            let mut w = row;
            for x in bbox.x..bbox.right() {
                if w[0] + bias[0] >= 0 && w[1] + bias[1] >= 0 && w[2] + bias[2] >= 0 {
                    let l0 = w[0] as f32 * inv_area;
                    let l1 = w[1] as f32 * inv_area;
                    let l2 = w[2] as f32 * inv_area;
                    let idx = self.fb.index(x as usize, y as usize);
                    let z = l0 * v[0].ndc.z + l1 * v[1].ndc.z + l2 * v[2].ndc.z;

                    if !depth_test || depth_func.passes(z, self.fb.depth[idx]) {
                        if depth_test {
                            self.fb.depth[idx] = z;
                        }
                        self.fb.color[idx] = match sampler {
                            Some((texels, tw, th)) => {
                                let inv_w = l0 * v[0].ndc.w + l1 * v[1].ndc.w + l2 * v[2].ndc.w;
                                let inv_uv = v[0].inv_tex_coord * l0 + v[1].inv_tex_coord * l1 + v[2].inv_tex_coord * l2;
                                let uv = perspective_tex_coord(inv_uv, inv_w);
                                sample_nearest(texels, tw, th, uv.x, uv.y)
                            }
                            None => flat_color,
                        };
                    }
                }
                for i in 0..3 {
                    w[i] += step_x[i];
                }
            }
            for i in 0..3 {
                row[i] += step_y[i];
            }
        }
    }

    /// Single pixel, no transform
    pub fn screen_point(&mut self, x: i32, y: i32, color_index: u8) {
        if self.clip.contains(x, y) {
            self.fb.set_pixel(x as usize, y as usize, color_index);
        }
    }

    /// Line between integer pixel coordinates, no transform
    pub fn screen_line(&mut self, x0: i32, y0: i32, x1: i32, y1: i32, color_index: u8) {
        let clip = self.clip;
        self.fb.draw_line(x0, y0, x1, y1, color_index, &clip);
    }

    /// Copy level 0 of the bound texture into a rectangle, nearest-neighbour
    /// resampled, without depth test. Returns false if no texture is bound.
    pub fn screen_image(&mut self, left: i32, top: i32, right: i32, bottom: i32) -> bool {
        let Some(texture) = self.texture else {
            return false;
        };
        let Some(level) = texture.select_mip_level(0) else {
            return false;
        };
        let texels = texture.level_texels(&level);

        let (left, right) = (left.min(right), left.max(right));
        let (top, bottom) = (top.min(bottom), top.max(bottom));
        let dest = Rect::new(left, top, right - left, bottom - top);
        let visible = dest.intersect(&self.clip);
        if visible.is_empty() {
            return true;
        }

        for y in visible.y..visible.bottom() {
            let ty = (y - top) as usize * level.height / dest.height as usize;
            for x in visible.x..visible.right() {
                let tx = (x - left) as usize * level.width / dest.width as usize;
                let idx = self.fb.index(x as usize, y as usize);
                self.fb.color[idx] = texels[ty * level.width + tx];
            }
        }
        true
    }
}

/// Twice the area of a triangle in normalized texture space
fn tex_area(a: Vec2, b: Vec2, c: Vec2) -> f32 {
    ((b.x - a.x) * (c.y - a.y) - (c.x - a.x) * (b.y - a.y)).abs()
}
