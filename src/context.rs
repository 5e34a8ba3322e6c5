//! Render context
//!
//! A [`Context`] owns every resource (framebuffers, textures, vertex and index
//! buffers), the state machine that binds them, and the immediate-mode stream.
//! Each fallible call returns a [`Result`]; failures are additionally stored
//! in a single last-error slot, passed to the error handler if one is set and
//! logged at `warn` level.

use std::io::Read;
use std::path::Path;

use crate::arena::{Arena, Handle};
use crate::config::RenderConfig;
use crate::error::{Error, ErrorHandler, LoadError, Result};
use crate::rasterizer::{
    color_to_index, decode_image_file, decompose, transform_vertices, Atom, ClearFlags, CullMode, DepthFunc, DepthRange, Framebuffer,
    FrontFace, ImageFormat, ImmediateStream, IndexBuffer, Mat4, PolygonMode, Primitive, Rasterizer, Rect, Texture,
    Vec2, Vec3, Vec4, Vertex, VertexBuffer, VertexOrder,
};
use crate::state::{Capability, FramebufferId, IndexBufferId, StateMachine, TextureId, VertexBufferId};

/// Target of [`Context::present`], e.g. a window surface
pub trait PresentSurface {
    /// Surface size in pixels (width, height)
    fn size(&self) -> (usize, usize);
    /// Receive one frame of RGBA pixels, row-major
    fn blit(&mut self, pixels: &[[u8; 4]]);
}

/// Counters accumulated over draw calls
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RenderStats {
    pub draw_calls: usize,
    pub vertices: usize,
    /// Triangles that reached scan conversion
    pub triangles: usize,
    pub immediate_flushes: usize,
}

impl RenderStats {
    fn record_draw(&mut self, vertices: usize, triangles: usize) {
        self.draw_calls += 1;
        self.vertices += vertices;
        self.triangles += triangles;
    }
}

pub struct Context {
    config: RenderConfig,
    state: StateMachine,
    framebuffers: Arena<Framebuffer>,
    textures: Arena<Texture>,
    vertex_buffers: Arena<VertexBuffer>,
    index_buffers: Arena<IndexBuffer>,
    immediate: ImmediateStream,
    last_error: Option<Error>,
    error_handler: Option<ErrorHandler>,
    stats: RenderStats,
}

/// Bound resource, `NullPointer` when nothing is bound or the handle is stale
fn resolve<'a, T>(arena: &'a Arena<T>, id: Option<Handle<T>>, context: &'static str) -> Result<&'a T> {
    id.and_then(|id| arena.get(id)).ok_or(Error::null_pointer(context))
}

fn resolve_mut<'a, T>(arena: &'a mut Arena<T>, id: Option<Handle<T>>, context: &'static str) -> Result<&'a mut T> {
    id.and_then(|id| arena.get_mut(id)).ok_or(Error::null_pointer(context))
}

/// Optional binding: unbound is fine, a stale handle is not
fn resolve_optional<'a, T>(
    arena: &'a Arena<T>,
    id: Option<Handle<T>>,
    context: &'static str,
) -> Result<Option<&'a T>> {
    id.map(|id| arena.get(id).ok_or(Error::null_pointer(context))).transpose()
}

/// Transform stage followed by rasterization. Returns the triangle count.
fn rasterize(
    fb: &mut Framebuffer,
    texture: Option<&Texture>,
    state: &StateMachine,
    atoms: &[Atom],
    vertices: &mut [Vertex],
    order: VertexOrder<'_>,
) -> usize {
    let mut raster = Rasterizer::new(fb, texture, state.raster_state());
    transform_vertices(vertices, state.model_view(), state.projection(), &raster.mapping());
    raster.draw_atoms(atoms, vertices, order);
    raster.triangles
}

impl Context {
    pub fn new(config: RenderConfig) -> Self {
        Self {
            state: StateMachine::new(&config),
            immediate: ImmediateStream::new(config.immediate_capacity),
            config,
            framebuffers: Arena::new(),
            textures: Arena::new(),
            vertex_buffers: Arena::new(),
            index_buffers: Arena::new(),
            last_error: None,
            error_handler: None,
            stats: RenderStats::default(),
        }
    }

    pub fn config(&self) -> &RenderConfig {
        &self.config
    }

    pub fn state(&self) -> &StateMachine {
        &self.state
    }

    // --- errors --- //

    /// Return and clear the last recorded error
    pub fn take_error(&mut self) -> Option<Error> {
        self.last_error.take()
    }

    pub fn last_error(&self) -> Option<Error> {
        self.last_error
    }

    /// Observer called synchronously for every recorded error
    pub fn set_error_handler(&mut self, handler: Option<ErrorHandler>) {
        self.error_handler = handler;
    }

    fn raise(&mut self, err: Error) -> Error {
        log::warn!("{}", err);
        self.last_error = Some(err);
        if let Some(handler) = self.error_handler.as_mut() {
            handler(&err);
        }
        err
    }

    fn fail<T>(&mut self, err: Error) -> Result<T> {
        Err(self.raise(err))
    }

    fn record<T>(&mut self, result: Result<T>) -> Result<T> {
        result.map_err(|err| self.raise(err))
    }

    /// I/O and decode failures reach the error slot as `InvalidArgument`;
    /// the caller still gets the detailed `LoadError`
    fn record_load<T>(
        &mut self,
        result: std::result::Result<T, LoadError>,
        context: &'static str,
    ) -> std::result::Result<T, LoadError> {
        match result {
            Err(LoadError::Render(err)) => Err(LoadError::Render(self.raise(err))),
            Err(err) => {
                log::warn!("{}: {}", context, err);
                self.raise(Error::invalid_argument(context));
                Err(err)
            }
            ok => ok,
        }
    }

    // --- statistics and queries --- //

    pub fn stats(&self) -> RenderStats {
        self.stats
    }

    pub fn reset_stats(&mut self) {
        self.stats = RenderStats::default();
    }

    pub fn max_texture_size(&self) -> usize {
        self.config.max_texture_size
    }

    /// Palette index nearest to an RGB color
    pub fn color_index(&self, r: u8, g: u8, b: u8) -> u8 {
        color_to_index(r, g, b)
    }

    // --- framebuffers --- //

    pub fn create_framebuffer(&mut self, width: usize, height: usize) -> Result<FramebufferId> {
        if width == 0 || height == 0 {
            return self.fail(Error::invalid_argument("create_framebuffer"));
        }
        let id = self.framebuffers.insert(Framebuffer::new(width, height));
        log::debug!("Created framebuffer {:?} ({}x{})", id, width, height);
        Ok(id)
    }

    pub fn delete_framebuffer(&mut self, fb: FramebufferId) -> Result<()> {
        if self.framebuffers.remove(fb).is_none() {
            return self.fail(Error::null_pointer("delete_framebuffer"));
        }
        log::debug!("Deleted framebuffer {:?}", fb);
        Ok(())
    }

    pub fn framebuffer(&self, fb: FramebufferId) -> Option<&Framebuffer> {
        self.framebuffers.get(fb)
    }

    pub fn resize_framebuffer(&mut self, fb: FramebufferId, width: usize, height: usize) -> Result<()> {
        if width == 0 || height == 0 {
            return self.fail(Error::invalid_argument("resize_framebuffer"));
        }
        let result = resolve_mut(&mut self.framebuffers, Some(fb), "resize_framebuffer")
            .map(|framebuffer| framebuffer.resize(width, height));
        self.record(result)
    }

    /// Bind a framebuffer, or unbind with `None`
    pub fn bind_framebuffer(&mut self, fb: Option<FramebufferId>) -> Result<()> {
        if fb.is_some_and(|id| !self.framebuffers.contains(id)) {
            return self.fail(Error::null_pointer("bind_framebuffer"));
        }
        self.state.framebuffer = fb;
        Ok(())
    }

    fn with_bound_framebuffer(&mut self, context: &'static str, f: impl FnOnce(&mut Framebuffer)) -> Result<()> {
        let result = resolve_mut(&mut self.framebuffers, self.state.framebuffer, context).map(f);
        self.record(result)
    }

    pub fn clear(&mut self, color_index: u8, depth: f32, flags: ClearFlags) -> Result<()> {
        self.with_bound_framebuffer("clear", |fb| fb.clear(color_index, depth, flags))
    }

    pub fn viewport(&mut self, x: i32, y: i32, width: i32, height: i32) -> Result<()> {
        if width < 0 || height < 0 {
            return self.fail(Error::invalid_argument("viewport"));
        }
        self.with_bound_framebuffer("viewport", |fb| fb.viewport = Rect::new(x, y, width, height))
    }

    pub fn scissor(&mut self, x: i32, y: i32, width: i32, height: i32) -> Result<()> {
        if width < 0 || height < 0 {
            return self.fail(Error::invalid_argument("scissor"));
        }
        self.with_bound_framebuffer("scissor", |fb| fb.scissor = Rect::new(x, y, width, height))
    }

    pub fn depth_range(&mut self, min: f32, max: f32) -> Result<()> {
        self.with_bound_framebuffer("depth_range", |fb| fb.depth_range = DepthRange { min, max })
    }

    // --- textures --- //

    pub fn create_texture(&mut self) -> TextureId {
        let id = self.textures.insert(Texture::new());
        log::debug!("Created texture {:?}", id);
        id
    }

    pub fn delete_texture(&mut self, tex: TextureId) -> Result<()> {
        if self.textures.remove(tex).is_none() {
            return self.fail(Error::null_pointer("delete_texture"));
        }
        log::debug!("Deleted texture {:?}", tex);
        Ok(())
    }

    pub fn texture(&self, tex: TextureId) -> Option<&Texture> {
        self.textures.get(tex)
    }

    pub fn bind_texture(&mut self, tex: Option<TextureId>) -> Result<()> {
        if tex.is_some_and(|id| !self.textures.contains(id)) {
            return self.fail(Error::null_pointer("bind_texture"));
        }
        self.state.texture = tex;
        Ok(())
    }

    /// Upload an image into a texture, see [`Texture::set_image_2d`]
    #[allow(clippy::too_many_arguments)]
    pub fn texture_image_2d(
        &mut self,
        tex: TextureId,
        width: usize,
        height: usize,
        format: ImageFormat,
        data: &[u8],
        dither: bool,
        generate_mips: bool,
    ) -> Result<()> {
        const CONTEXT: &str = "texture_image_2d";
        let max = self.config.max_texture_size;
        let result = if width > max || height > max {
            Err(Error::invalid_argument(CONTEXT))
        } else {
            resolve_mut(&mut self.textures, Some(tex), CONTEXT)
                .and_then(|texture| texture.set_image_2d(width, height, format, data, dither, generate_mips))
        };
        self.record(result)
    }

    /// Replace a rectangle of one mip level
    #[allow(clippy::too_many_arguments)]
    pub fn texture_sub_image_2d(
        &mut self,
        tex: TextureId,
        mip: usize,
        x: usize,
        y: usize,
        width: usize,
        height: usize,
        format: ImageFormat,
        data: &[u8],
        dither: bool,
    ) -> Result<()> {
        let result = resolve_mut(&mut self.textures, Some(tex), "texture_sub_image_2d")
            .and_then(|texture| texture.sub_image_2d(mip, x, y, width, height, format, data, dither));
        self.record(result)
    }

    /// Decode an image file (BMP, PNG, TGA, JPEG) and upload it as RGB8
    pub fn texture_image_2d_from_file<P: AsRef<Path>>(
        &mut self,
        tex: TextureId,
        path: P,
        dither: bool,
        generate_mips: bool,
    ) -> std::result::Result<(), LoadError> {
        if !self.textures.contains(tex) {
            return Err(self.raise(Error::null_pointer("texture_image_2d_from_file")).into());
        }
        let decoded = decode_image_file(path.as_ref()).map_err(LoadError::from);
        let image = self.record_load(decoded, "texture_image_2d_from_file")?;
        log::debug!("Decoded {} ({}x{})", path.as_ref().display(), image.width, image.height);
        self.texture_image_2d(tex, image.width, image.height, ImageFormat::Rgb8, &image.rgb, dither, generate_mips)?;
        Ok(())
    }

    // --- vertex and index buffers --- //

    pub fn create_vertex_buffer(&mut self, count: usize) -> VertexBufferId {
        let id = self.vertex_buffers.insert(VertexBuffer::new(count));
        log::debug!("Created vertex buffer {:?} ({} vertices)", id, count);
        id
    }

    pub fn delete_vertex_buffer(&mut self, vb: VertexBufferId) -> Result<()> {
        if self.vertex_buffers.remove(vb).is_none() {
            return self.fail(Error::null_pointer("delete_vertex_buffer"));
        }
        log::debug!("Deleted vertex buffer {:?}", vb);
        Ok(())
    }

    pub fn vertex_buffer(&self, vb: VertexBufferId) -> Option<&VertexBuffer> {
        self.vertex_buffers.get(vb)
    }

    pub fn bind_vertex_buffer(&mut self, vb: Option<VertexBufferId>) -> Result<()> {
        if vb.is_some_and(|id| !self.vertex_buffers.contains(id)) {
            return self.fail(Error::null_pointer("bind_vertex_buffer"));
        }
        self.state.vertex_buffer = vb;
        Ok(())
    }

    /// Replace a vertex buffer's contents. Missing coordinate or texture
    /// coordinate arrays default to zero.
    pub fn vertex_buffer_data(
        &mut self,
        vb: VertexBufferId,
        count: usize,
        coords: Option<&[Vec3]>,
        tex_coords: Option<&[Vec2]>,
    ) -> Result<()> {
        let result = resolve_mut(&mut self.vertex_buffers, Some(vb), "vertex_buffer_data")
            .and_then(|buffer| buffer.set_data(count, coords, tex_coords));
        self.record(result)
    }

    /// Load a vertex buffer from a raw stream, returning the vertex count
    pub fn vertex_buffer_data_from_reader<R: Read>(
        &mut self,
        vb: VertexBufferId,
        reader: &mut R,
    ) -> std::result::Result<usize, LoadError> {
        let Some(buffer) = self.vertex_buffers.get_mut(vb) else {
            return Err(self.raise(Error::null_pointer("vertex_buffer_data_from_reader")).into());
        };
        let result = buffer.read_from(reader);
        self.record_load(result, "vertex_buffer_data_from_reader")
    }

    pub fn create_index_buffer(&mut self, count: usize) -> IndexBufferId {
        let id = self.index_buffers.insert(IndexBuffer::new(count));
        log::debug!("Created index buffer {:?} ({} indices)", id, count);
        id
    }

    pub fn delete_index_buffer(&mut self, ib: IndexBufferId) -> Result<()> {
        if self.index_buffers.remove(ib).is_none() {
            return self.fail(Error::null_pointer("delete_index_buffer"));
        }
        log::debug!("Deleted index buffer {:?}", ib);
        Ok(())
    }

    pub fn index_buffer(&self, ib: IndexBufferId) -> Option<&IndexBuffer> {
        self.index_buffers.get(ib)
    }

    pub fn bind_index_buffer(&mut self, ib: Option<IndexBufferId>) -> Result<()> {
        if ib.is_some_and(|id| !self.index_buffers.contains(id)) {
            return self.fail(Error::null_pointer("bind_index_buffer"));
        }
        self.state.index_buffer = ib;
        Ok(())
    }

    pub fn index_buffer_data(&mut self, ib: IndexBufferId, indices: &[u16]) -> Result<()> {
        let result = resolve_mut(&mut self.index_buffers, Some(ib), "index_buffer_data")
            .map(|buffer| buffer.set_data(indices));
        self.record(result)
    }

    pub fn index_buffer_data_from_reader<R: Read>(
        &mut self,
        ib: IndexBufferId,
        reader: &mut R,
    ) -> std::result::Result<usize, LoadError> {
        let Some(buffer) = self.index_buffers.get_mut(ib) else {
            return Err(self.raise(Error::null_pointer("index_buffer_data_from_reader")).into());
        };
        let result = buffer.read_from(reader);
        self.record_load(result, "index_buffer_data_from_reader")
    }

    // --- matrices and states --- //

    pub fn set_projection(&mut self, m: Mat4) {
        self.state.set_projection(m);
    }

    pub fn set_view(&mut self, m: Mat4) {
        self.state.set_view(m);
    }

    pub fn set_world(&mut self, m: Mat4) {
        self.state.set_world(m);
    }

    pub fn set_color_index(&mut self, color_index: u8) {
        self.state.color_index = color_index;
    }

    pub fn set_cull_mode(&mut self, mode: CullMode) {
        self.state.cull_mode = mode;
    }

    pub fn set_polygon_mode(&mut self, mode: PolygonMode) {
        self.state.polygon_mode = mode;
    }

    pub fn set_front_face(&mut self, face: FrontFace) {
        self.state.front_face = face;
    }

    pub fn set_depth_func(&mut self, func: DepthFunc) {
        self.state.depth_func = func;
    }

    pub fn set_state(&mut self, cap: Capability, enabled: bool) {
        self.state.set_state(cap, enabled);
    }

    pub fn get_state(&self, cap: Capability) -> bool {
        self.state.get_state(cap)
    }

    pub fn enable(&mut self, cap: Capability) {
        self.set_state(cap, true);
    }

    pub fn disable(&mut self, cap: Capability) {
        self.set_state(cap, false);
    }

    // --- drawing --- //

    /// Draw `count` vertices of the bound vertex buffer starting at `first`
    pub fn draw(&mut self, primitive: Primitive, first: usize, count: usize) -> Result<()> {
        let result = self.draw_arrays(primitive, first, count);
        self.record(result)
    }

    fn draw_arrays(&mut self, primitive: Primitive, first: usize, count: usize) -> Result<()> {
        const CONTEXT: &str = "draw";
        let fb = resolve_mut(&mut self.framebuffers, self.state.framebuffer, CONTEXT)?;
        let vb = resolve_mut(&mut self.vertex_buffers, self.state.vertex_buffer, CONTEXT)?;
        let texture = resolve_optional(&self.textures, self.state.texture, CONTEXT)?;
        let end = first
            .checked_add(count)
            .filter(|&end| end <= vb.len())
            .ok_or(Error::invalid_argument(CONTEXT))?;

        log::trace!("draw {:?}: {} vertices from {}", primitive, count, first);
        let atoms = decompose(primitive, count);
        let order = VertexOrder::Range { first: 0 };
        let triangles = rasterize(fb, texture, &self.state, &atoms, &mut vb.vertices[first..end], order);
        self.stats.record_draw(count, triangles);
        Ok(())
    }

    /// Draw `count` indices of the bound index buffer starting at `first`
    pub fn draw_indexed(&mut self, primitive: Primitive, first: usize, count: usize) -> Result<()> {
        let result = self.draw_elements(primitive, first, count);
        self.record(result)
    }

    fn draw_elements(&mut self, primitive: Primitive, first: usize, count: usize) -> Result<()> {
        const CONTEXT: &str = "draw_indexed";
        let fb = resolve_mut(&mut self.framebuffers, self.state.framebuffer, CONTEXT)?;
        let vb = resolve_mut(&mut self.vertex_buffers, self.state.vertex_buffer, CONTEXT)?;
        let ib = resolve(&self.index_buffers, self.state.index_buffer, CONTEXT)?;
        let texture = resolve_optional(&self.textures, self.state.texture, CONTEXT)?;
        let indices = first
            .checked_add(count)
            .and_then(|end| ib.indices.get(first..end))
            .ok_or(Error::invalid_argument(CONTEXT))?;
        if indices.iter().any(|&i| i as usize >= vb.len()) {
            return Err(Error::invalid_argument(CONTEXT));
        }

        log::trace!("draw_indexed {:?}: {} indices from {}", primitive, count, first);
        let atoms = decompose(primitive, count);
        let triangles = rasterize(fb, texture, &self.state, &atoms, &mut vb.vertices, VertexOrder::Indexed(indices));
        self.stats.record_draw(count, triangles);
        Ok(())
    }

    /// Set one pixel of the bound framebuffer, bypassing the transform stage
    pub fn draw_screen_point(&mut self, x: i32, y: i32, color_index: u8) -> Result<()> {
        let raster_state = self.state.raster_state();
        self.with_bound_framebuffer("draw_screen_point", |fb| {
            Rasterizer::new(fb, None, raster_state).screen_point(x, y, color_index)
        })
    }

    /// Draw a line between pixel coordinates, bypassing the transform stage
    pub fn draw_screen_line(&mut self, x0: i32, y0: i32, x1: i32, y1: i32, color_index: u8) -> Result<()> {
        let raster_state = self.state.raster_state();
        self.with_bound_framebuffer("draw_screen_line", |fb| {
            Rasterizer::new(fb, None, raster_state).screen_line(x0, y0, x1, y1, color_index)
        })
    }

    /// Blit the bound texture into a screen rectangle
    pub fn draw_screen_image(&mut self, left: i32, top: i32, right: i32, bottom: i32) -> Result<()> {
        let result = self.blit_texture(left, top, right, bottom);
        self.record(result)
    }

    fn blit_texture(&mut self, left: i32, top: i32, right: i32, bottom: i32) -> Result<()> {
        const CONTEXT: &str = "draw_screen_image";
        let fb = resolve_mut(&mut self.framebuffers, self.state.framebuffer, CONTEXT)?;
        let texture = resolve(&self.textures, self.state.texture, CONTEXT)?;
        let mut raster = Rasterizer::new(fb, Some(texture), self.state.raster_state());
        if !raster.screen_image(left, top, right, bottom) {
            // Bound texture has no image yet
            return Err(Error::invalid_operation(CONTEXT));
        }
        Ok(())
    }

    // --- immediate mode --- //

    pub fn begin(&mut self, primitive: Primitive) -> Result<()> {
        let result = self.immediate.begin(primitive);
        self.record(result)
    }

    pub fn end(&mut self) -> Result<()> {
        let result = self.immediate.end();
        let primitive = self.record(result)?;
        let result = self.draw_immediate(primitive, true);
        self.immediate.reset();
        self.record(result)
    }

    pub fn tex_coord(&mut self, u: f32, v: f32) -> Result<()> {
        let result = self.immediate.tex_coord(u, v);
        self.record(result)
    }

    /// Emit a vertex with w = 1
    pub fn vertex(&mut self, x: f32, y: f32, z: f32) -> Result<()> {
        self.vertex4(x, y, z, 1.0)
    }

    pub fn vertex4(&mut self, x: f32, y: f32, z: f32, w: f32) -> Result<()> {
        let result = self.immediate.vertex(Vec4::new(x, y, z, w));
        self.record(result)?;

        if self.immediate.is_full() {
            if let Some(primitive) = self.immediate.primitive() {
                // Complete primitives are drawn, the open one carries over
                let result = self.draw_immediate(primitive, false);
                self.immediate.carry_over(primitive);
                self.record(result)?;
            }
        }
        Ok(())
    }

    fn draw_immediate(&mut self, primitive: Primitive, closing: bool) -> Result<()> {
        const CONTEXT: &str = "immediate_flush";
        let atoms = self.immediate.batch(primitive, closing);
        if atoms.is_empty() {
            return Ok(());
        }
        let fb = resolve_mut(&mut self.framebuffers, self.state.framebuffer, CONTEXT)?;
        let texture = resolve_optional(&self.textures, self.state.texture, CONTEXT)?;

        let fresh = self.immediate.fresh();
        log::trace!("Immediate flush {:?}: {} atoms, {} new vertices", primitive, atoms.len(), fresh);
        let order = VertexOrder::Range { first: 0 };
        let triangles = rasterize(fb, texture, &self.state, &atoms, self.immediate.pending_mut(), order);
        self.stats.record_draw(fresh, triangles);
        self.stats.immediate_flushes += 1;
        Ok(())
    }

    // --- presentation --- //

    /// Expand the bound framebuffer through the palette onto `surface`
    pub fn present<S: PresentSurface + ?Sized>(&mut self, surface: &mut S) -> Result<()> {
        const CONTEXT: &str = "present";
        let result = resolve(&self.framebuffers, self.state.framebuffer, CONTEXT).and_then(|fb| {
            if surface.size() != (fb.width, fb.height) {
                return Err(Error::argument_mismatch(CONTEXT));
            }
            surface.blit(&fb.to_rgba());
            Ok(())
        });
        self.record(result)
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::new(RenderConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;
    use std::cell::Cell;
    use std::io::Cursor;
    use std::rc::Rc;

    /// Context with a bound, cleared framebuffer
    fn context_with_framebuffer(width: usize, height: usize) -> (Context, FramebufferId) {
        let mut ctx = Context::default();
        let fb = ctx.create_framebuffer(width, height).unwrap();
        ctx.bind_framebuffer(Some(fb)).unwrap();
        ctx.clear(0, 1.0, ClearFlags::ALL).unwrap();
        (ctx, fb)
    }

    fn bind_vertices(ctx: &mut Context, coords: &[Vec3]) -> VertexBufferId {
        let vb = ctx.create_vertex_buffer(0);
        ctx.vertex_buffer_data(vb, coords.len(), Some(coords), None).unwrap();
        ctx.bind_vertex_buffer(Some(vb)).unwrap();
        vb
    }

    fn full_screen_triangle(z: f32) -> [Vec3; 3] {
        [Vec3::new(-1.0, -1.0, z), Vec3::new(3.0, -1.0, z), Vec3::new(-1.0, 3.0, z)]
    }

    struct TestSurface {
        width: usize,
        height: usize,
        pixels: Vec<[u8; 4]>,
    }

    impl PresentSurface for TestSurface {
        fn size(&self) -> (usize, usize) {
            (self.width, self.height)
        }

        fn blit(&mut self, pixels: &[[u8; 4]]) {
            self.pixels = pixels.to_vec();
        }
    }

    #[test]
    fn test_full_screen_triangle_fills_framebuffer() {
        let (mut ctx, fb) = context_with_framebuffer(4, 4);
        bind_vertices(&mut ctx, &full_screen_triangle(0.0));
        ctx.set_color_index(7);
        ctx.draw(Primitive::Triangles, 0, 3).unwrap();

        let framebuffer = ctx.framebuffer(fb).unwrap();
        assert!(framebuffer.color.iter().all(|&c| c == 7));
        assert_eq!(ctx.stats().triangles, 1);
        assert_eq!(ctx.stats().vertices, 3);
    }

    #[test]
    fn test_ndc_triangle_misses_top_corners() {
        // (-2,-2), (2,-2), (0,2) leaves the two top corner pixel centers of a 4x4 target uncovered
        let (mut ctx, fb) = context_with_framebuffer(4, 4);
        bind_vertices(&mut ctx, &[Vec3::new(-2.0, -2.0, 0.0), Vec3::new(2.0, -2.0, 0.0), Vec3::new(0.0, 2.0, 0.0)]);
        ctx.set_color_index(7);
        ctx.draw(Primitive::Triangles, 0, 3).unwrap();

        let framebuffer = ctx.framebuffer(fb).unwrap();
        assert_eq!(framebuffer.get_pixel(0, 0), Some(0));
        assert_eq!(framebuffer.get_pixel(3, 0), Some(0));
        assert_eq!(framebuffer.color.iter().filter(|&&c| c == 7).count(), 14);
    }

    #[test]
    fn test_far_away_lines_are_clipped() {
        let (mut ctx, fb) = context_with_framebuffer(4, 2);
        bind_vertices(&mut ctx, &[Vec3::new(-1.0e10, 0.5, 0.0), Vec3::new(1.0e10, 0.5, 0.0)]);
        ctx.set_color_index(2);
        ctx.draw(Primitive::Lines, 0, 2).unwrap();
        ctx.draw_screen_line(i32::MIN, 1, i32::MAX, 1, 3).unwrap();

        let framebuffer = ctx.framebuffer(fb).unwrap();
        assert_eq!(&framebuffer.color[..4], &[2; 4]);
        assert_eq!(&framebuffer.color[4..], &[3; 4]);
    }

    #[test]
    fn test_mip_generation_through_context() {
        let mut ctx = Context::default();
        let tex = ctx.create_texture();
        let rgb = [255, 0, 0, 0, 255, 0, 0, 0, 255, 255, 255, 0];
        ctx.texture_image_2d(tex, 2, 2, ImageFormat::Rgb8, &rgb, false, true).unwrap();

        let texture = ctx.texture(tex).unwrap();
        assert_eq!(texture.mip_count(), 2);
        let level = texture.select_mip_level(1).unwrap();
        assert_eq!((level.width, level.height), (1, 1));
        assert_eq!(texture.level_texels(&level), &[color_to_index(127, 127, 63)]);
    }

    #[test]
    fn test_immediate_stream_flushes_when_full() {
        let (mut ctx, _) = context_with_framebuffer(8, 8);
        let capacity = ctx.config().immediate_capacity;
        assert_eq!(capacity, 32);

        ctx.begin(Primitive::Points).unwrap();
        for i in 0..=capacity {
            ctx.vertex(i as f32 / capacity as f32 - 0.5, 0.0, 0.0).unwrap();
        }
        assert_eq!(ctx.stats().immediate_flushes, 1);
        ctx.end().unwrap();

        let stats = ctx.stats();
        assert_eq!(stats.immediate_flushes, 2);
        assert_eq!(stats.draw_calls, 2);
        assert_eq!(stats.vertices, capacity + 1);
    }

    #[test]
    fn test_immediate_triangles_survive_flushes() {
        // Twelve separate triangles, one per pixel of a 12x1 target: 36 vertices through a 32 vertex cache
        let (mut ctx, fb) = context_with_framebuffer(12, 1);
        ctx.set_color_index(5);
        ctx.begin(Primitive::Triangles).unwrap();
        for i in 0..12 {
            let left = i as f32 / 6.0 - 1.0;
            ctx.vertex(left, 1.0, 0.0).unwrap();
            ctx.vertex(left + 1.0 / 6.0, 1.0, 0.0).unwrap();
            ctx.vertex(left + 1.0 / 12.0, -3.0, 0.0).unwrap();
        }
        ctx.end().unwrap();

        assert_eq!(ctx.framebuffer(fb).unwrap().color, vec![5; 12]);
        let stats = ctx.stats();
        assert_eq!(stats.triangles, 12);
        assert_eq!(stats.vertices, 36);
        assert_eq!(stats.immediate_flushes, 2);
    }

    #[test]
    fn test_immediate_strip_keeps_winding_across_flushes() {
        // A 5 vertex cache flushes after an odd number of strip triangles, so a
        // lost parity shows up as culled back faces
        let mut ctx = Context::new(RenderConfig { immediate_capacity: 5, ..Default::default() });
        let fb = ctx.create_framebuffer(40, 2).unwrap();
        ctx.bind_framebuffer(Some(fb)).unwrap();
        ctx.set_cull_mode(CullMode::Back);
        ctx.set_color_index(6);

        ctx.begin(Primitive::TriangleStrip).unwrap();
        for k in 0..=40 {
            let x = k as f32 / 20.0 - 1.0;
            ctx.vertex(x, 1.0, 0.0).unwrap();
            ctx.vertex(x, -1.0, 0.0).unwrap();
        }
        ctx.end().unwrap();

        assert!(ctx.framebuffer(fb).unwrap().color.iter().all(|&c| c == 6));
        assert_eq!(ctx.stats().triangles, 80);
    }

    #[test]
    fn test_immediate_quad_with_tex_coords() {
        let (mut ctx, fb) = context_with_framebuffer(4, 4);
        let tex = ctx.create_texture();
        ctx.texture_image_2d(tex, 1, 1, ImageFormat::Rgb8, &[0, 255, 0], false, false).unwrap();
        ctx.bind_texture(Some(tex)).unwrap();

        ctx.begin(Primitive::TriangleStrip).unwrap();
        for (u, v, x, y) in [(0.0, 0.0, -1.0, 1.0), (1.0, 0.0, 1.0, 1.0), (0.0, 1.0, -1.0, -1.0), (1.0, 1.0, 1.0, -1.0)] {
            ctx.tex_coord(u, v).unwrap();
            ctx.vertex(x, y, 0.0).unwrap();
        }
        ctx.end().unwrap();

        let green = color_to_index(0, 255, 0);
        assert!(ctx.framebuffer(fb).unwrap().color.iter().all(|&c| c == green));
        assert_eq!(ctx.stats().triangles, 2);
    }

    #[test]
    fn test_scissor_masks_full_screen_draw() {
        let (mut ctx, fb) = context_with_framebuffer(8, 8);
        ctx.clear(3, 1.0, ClearFlags::COLOR).unwrap();
        ctx.scissor(2, 1, 3, 4).unwrap();
        ctx.enable(Capability::ScissorTest);
        bind_vertices(&mut ctx, &full_screen_triangle(0.0));
        ctx.set_color_index(9);
        ctx.draw(Primitive::Triangles, 0, 3).unwrap();

        let framebuffer = ctx.framebuffer(fb).unwrap();
        let scissor = Rect::new(2, 1, 3, 4);
        for y in 0..8 {
            for x in 0..8 {
                let expected = if scissor.contains(x as i32, y as i32) { 9 } else { 3 };
                assert_eq!(framebuffer.get_pixel(x, y), Some(expected), "pixel ({}, {})", x, y);
            }
        }
    }

    #[test]
    fn test_depth_test_keeps_nearest() {
        let (mut ctx, fb) = context_with_framebuffer(4, 4);
        ctx.enable(Capability::DepthTest);
        let vb = ctx.create_vertex_buffer(0);
        ctx.bind_vertex_buffer(Some(vb)).unwrap();

        for (z, color) in [(0.5, 1), (-0.5, 2), (0.8, 3)] {
            let coords = full_screen_triangle(z);
            ctx.vertex_buffer_data(vb, 3, Some(&coords), None).unwrap();
            ctx.set_color_index(color);
            ctx.draw(Primitive::Triangles, 0, 3).unwrap();
        }

        let framebuffer = ctx.framebuffer(fb).unwrap();
        assert!(framebuffer.color.iter().all(|&c| c == 2));
        // NDC z = -0.5 maps to 0.25 in the default depth range
        assert!(framebuffer.depth.iter().all(|&d| (d - 0.25).abs() < 1e-5));
    }

    #[test]
    fn test_indexed_quad_and_bad_indices() {
        let (mut ctx, fb) = context_with_framebuffer(4, 4);
        let quad = [
            Vec3::new(-1.0, -1.0, 0.0),
            Vec3::new(1.0, -1.0, 0.0),
            Vec3::new(-1.0, 1.0, 0.0),
            Vec3::new(1.0, 1.0, 0.0),
        ];
        bind_vertices(&mut ctx, &quad);
        let ib = ctx.create_index_buffer(0);
        ctx.index_buffer_data(ib, &[0, 1, 2, 2, 1, 3, 9]).unwrap();
        ctx.bind_index_buffer(Some(ib)).unwrap();
        ctx.set_color_index(4);

        ctx.draw_indexed(Primitive::Triangles, 0, 6).unwrap();
        assert!(ctx.framebuffer(fb).unwrap().color.iter().all(|&c| c == 4));
        assert_eq!(ctx.stats().triangles, 2);

        let err = ctx.draw_indexed(Primitive::Triangles, 1, 6).unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidArgument);
        let err = ctx.draw_indexed(Primitive::Triangles, 4, 6).unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidArgument);
    }

    #[test]
    fn test_line_primitive_uses_flat_color() {
        let (mut ctx, fb) = context_with_framebuffer(4, 4);
        bind_vertices(&mut ctx, &[Vec3::new(-0.75, 0.75, 0.0), Vec3::new(0.75, 0.75, 0.0)]);
        ctx.set_color_index(6);
        ctx.draw(Primitive::Lines, 0, 2).unwrap();

        let framebuffer = ctx.framebuffer(fb).unwrap();
        for x in 0..4 {
            assert_eq!(framebuffer.get_pixel(x, 0), Some(6));
            assert_eq!(framebuffer.get_pixel(x, 1), Some(0));
        }
    }

    #[test]
    fn test_draw_without_bindings_records_error() {
        let mut ctx = Context::default();
        let seen = Rc::new(Cell::new(0));
        let counter = Rc::clone(&seen);
        ctx.set_error_handler(Some(Box::new(move |_: &Error| counter.set(counter.get() + 1))));

        let err = ctx.draw(Primitive::Triangles, 0, 3).unwrap_err();
        assert_eq!(err.kind, ErrorKind::NullPointer);
        assert_eq!(ctx.last_error(), Some(err));
        assert_eq!(ctx.take_error(), Some(err));
        assert_eq!(ctx.take_error(), None);

        assert_eq!(ctx.viewport(0, 0, 1, 1).unwrap_err().kind, ErrorKind::NullPointer);
        assert_eq!(ctx.vertex(0.0, 0.0, 0.0).unwrap_err().kind, ErrorKind::InvalidOperation);
        assert_eq!(seen.get(), 3);
        assert_eq!(ctx.stats(), RenderStats::default());
    }

    #[test]
    fn test_deleted_resource_handles_go_stale() {
        let (mut ctx, fb) = context_with_framebuffer(4, 4);
        let vb = bind_vertices(&mut ctx, &full_screen_triangle(0.0));
        ctx.delete_vertex_buffer(vb).unwrap();

        assert_eq!(ctx.draw(Primitive::Triangles, 0, 3).unwrap_err().kind, ErrorKind::NullPointer);
        assert!(ctx.framebuffer(fb).unwrap().color.iter().all(|&c| c == 0));
        assert_eq!(ctx.bind_vertex_buffer(Some(vb)).unwrap_err().kind, ErrorKind::NullPointer);
        assert_eq!(ctx.delete_vertex_buffer(vb).unwrap_err().kind, ErrorKind::NullPointer);

        // A new buffer may reuse the slot but not the handle
        let other = ctx.create_vertex_buffer(3);
        assert_ne!(other, vb);
        assert!(ctx.vertex_buffer(vb).is_none());
    }

    #[test]
    fn test_draw_range_out_of_bounds() {
        let (mut ctx, _) = context_with_framebuffer(4, 4);
        bind_vertices(&mut ctx, &full_screen_triangle(0.0));
        assert_eq!(ctx.draw(Primitive::Triangles, 1, 3).unwrap_err().kind, ErrorKind::InvalidArgument);
        assert_eq!(ctx.draw(Primitive::Triangles, usize::MAX, 3).unwrap_err().kind, ErrorKind::InvalidArgument);
    }

    #[test]
    fn test_texture_upload_limits() {
        let config = RenderConfig { max_texture_size: 4, ..Default::default() };
        let mut ctx = Context::new(config);
        assert_eq!(ctx.max_texture_size(), 4);
        let tex = ctx.create_texture();

        let err = ctx.texture_image_2d(tex, 8, 1, ImageFormat::Luminance8, &[0; 8], false, false).unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidArgument);
        let err = ctx.texture_image_2d(tex, 2, 2, ImageFormat::Rgb8, &[0; 6], false, false).unwrap_err();
        assert_eq!(err.kind, ErrorKind::ArgumentMismatch);
        assert!(ctx.texture(tex).unwrap().is_empty());

        ctx.delete_texture(tex).unwrap();
        let err = ctx.texture_image_2d(tex, 1, 1, ImageFormat::Luminance8, &[0], false, false).unwrap_err();
        assert_eq!(err.kind, ErrorKind::NullPointer);
    }

    #[test]
    fn test_screen_space_drawing() {
        let (mut ctx, fb) = context_with_framebuffer(6, 6);
        ctx.draw_screen_point(5, 5, 1).unwrap();
        ctx.draw_screen_point(9, 9, 1).unwrap();
        ctx.draw_screen_line(0, 2, 5, 2, 2).unwrap();

        assert_eq!(ctx.draw_screen_image(0, 0, 2, 2).unwrap_err().kind, ErrorKind::NullPointer);
        let tex = ctx.create_texture();
        ctx.bind_texture(Some(tex)).unwrap();
        assert_eq!(ctx.draw_screen_image(0, 0, 2, 2).unwrap_err().kind, ErrorKind::InvalidOperation);
        ctx.texture_image_2d(tex, 1, 1, ImageFormat::Luminance8, &[255], false, false).unwrap();
        ctx.draw_screen_image(0, 0, 2, 2).unwrap();

        let framebuffer = ctx.framebuffer(fb).unwrap();
        let white = color_to_index(255, 255, 255);
        assert_eq!(framebuffer.get_pixel(5, 5), Some(1));
        assert_eq!(framebuffer.get_pixel(3, 2), Some(2));
        assert_eq!(framebuffer.get_pixel(0, 0), Some(white));
        assert_eq!(framebuffer.get_pixel(1, 1), Some(white));
        assert_eq!(framebuffer.get_pixel(2, 0), Some(0));
    }

    #[test]
    fn test_present_expands_palette() {
        let (mut ctx, _) = context_with_framebuffer(2, 1);
        ctx.clear(0xFF, 1.0, ClearFlags::COLOR).unwrap();

        let mut wrong = TestSurface { width: 3, height: 1, pixels: Vec::new() };
        assert_eq!(ctx.present(&mut wrong).unwrap_err().kind, ErrorKind::ArgumentMismatch);
        assert!(wrong.pixels.is_empty());

        let mut surface = TestSurface { width: 2, height: 1, pixels: Vec::new() };
        ctx.present(&mut surface).unwrap();
        assert_eq!(surface.pixels, vec![[255, 255, 255, 255]; 2]);

        ctx.bind_framebuffer(None).unwrap();
        assert_eq!(ctx.present(&mut surface).unwrap_err().kind, ErrorKind::NullPointer);
    }

    #[test]
    fn test_missing_image_file_is_recorded() {
        let mut ctx = Context::default();
        let tex = ctx.create_texture();
        let err = ctx.texture_image_2d_from_file(tex, "no/such/texture.png", false, false).unwrap_err();
        assert_eq!(err.kind(), None);
        assert_eq!(ctx.take_error().map(|e| e.kind), Some(ErrorKind::InvalidArgument));
        assert!(ctx.texture(tex).unwrap().is_empty());
    }

    #[test]
    fn test_buffer_streams_through_context() {
        let mut ctx = Context::default();
        let vb = ctx.create_vertex_buffer(0);
        let mut bytes = 1u16.to_le_bytes().to_vec();
        for f in [0.5f32, -0.5, 0.0, 1.0, 0.0] {
            bytes.extend_from_slice(&f.to_le_bytes());
        }
        assert_eq!(ctx.vertex_buffer_data_from_reader(vb, &mut Cursor::new(bytes)).unwrap(), 1);
        assert_eq!(ctx.vertex_buffer(vb).unwrap().vertices[0].tex_coord, Vec2::new(1.0, 0.0));

        let ib = ctx.create_index_buffer(0);
        let err = ctx.index_buffer_data_from_reader(ib, &mut Cursor::new(vec![4u8, 0, 1])).unwrap_err();
        assert!(matches!(err, LoadError::Io(_)));
        assert_eq!(ctx.take_error().map(|e| e.kind), Some(ErrorKind::InvalidArgument));

        ctx.delete_index_buffer(ib).unwrap();
        let err = ctx.index_buffer_data_from_reader(ib, &mut Cursor::new(Vec::new())).unwrap_err();
        assert_eq!(err.kind(), Some(ErrorKind::NullPointer));
    }
}
