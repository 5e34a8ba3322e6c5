//! Bindings and draw state
//!
//! The state machine only refers to resources by handle; the context owns
//! them. Nothing here changes except through explicit set/bind calls.

use bitflags::bitflags;

use crate::arena::Handle;
use crate::config::RenderConfig;
use crate::rasterizer::{
    CullMode, DepthFunc, Framebuffer, FrontFace, IndexBuffer, Mat4, PolygonMode, RasterState, Texture, VertexBuffer,
};

pub type FramebufferId = Handle<Framebuffer>;
pub type TextureId = Handle<Texture>;
pub type VertexBufferId = Handle<VertexBuffer>;
pub type IndexBufferId = Handle<IndexBuffer>;

/// Switchable pipeline features
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    /// Restrict pixel writes to the scissor rectangle instead of the viewport
    ScissorTest,
    DepthTest,
    /// Interpolate texture coordinates with 1/w
    PerspectiveCorrect,
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    struct StateFlags: u32 {
        const SCISSOR_TEST = 1 << 0;
        const DEPTH_TEST = 1 << 1;
        const PERSPECTIVE_CORRECT = 1 << 2;
    }
}

impl Capability {
    fn flag(self) -> StateFlags {
        match self {
            Capability::ScissorTest => StateFlags::SCISSOR_TEST,
            Capability::DepthTest => StateFlags::DEPTH_TEST,
            Capability::PerspectiveCorrect => StateFlags::PERSPECTIVE_CORRECT,
        }
    }
}

pub struct StateMachine {
    pub framebuffer: Option<FramebufferId>,
    pub texture: Option<TextureId>,
    pub vertex_buffer: Option<VertexBufferId>,
    pub index_buffer: Option<IndexBufferId>,

    pub color_index: u8,
    pub cull_mode: CullMode,
    pub polygon_mode: PolygonMode,
    pub front_face: FrontFace,
    pub depth_func: DepthFunc,

    projection: Mat4,
    view: Mat4,
    world: Mat4,
    /// view * world, kept in sync by the setters
    model_view: Mat4,

    flags: StateFlags,
}

impl StateMachine {
    pub fn new(config: &RenderConfig) -> Self {
        let mut flags = StateFlags::empty();
        flags.set(StateFlags::DEPTH_TEST, config.depth_test);
        flags.set(StateFlags::PERSPECTIVE_CORRECT, config.perspective_correct);

        Self {
            framebuffer: None,
            texture: None,
            vertex_buffer: None,
            index_buffer: None,
            color_index: 0,
            cull_mode: CullMode::None,
            polygon_mode: PolygonMode::Fill,
            front_face: config.front_face,
            depth_func: DepthFunc::Less,
            projection: Mat4::IDENTITY,
            view: Mat4::IDENTITY,
            world: Mat4::IDENTITY,
            model_view: Mat4::IDENTITY,
            flags,
        }
    }

    pub fn projection(&self) -> &Mat4 {
        &self.projection
    }

    pub fn view(&self) -> &Mat4 {
        &self.view
    }

    pub fn world(&self) -> &Mat4 {
        &self.world
    }

    pub fn model_view(&self) -> &Mat4 {
        &self.model_view
    }

    pub fn set_projection(&mut self, m: Mat4) {
        self.projection = m;
    }

    pub fn set_view(&mut self, m: Mat4) {
        self.view = m;
        self.model_view = self.view * self.world;
    }

    pub fn set_world(&mut self, m: Mat4) {
        self.world = m;
        self.model_view = self.view * self.world;
    }

    pub fn set_state(&mut self, cap: Capability, enabled: bool) {
        self.flags.set(cap.flag(), enabled);
    }

    pub fn get_state(&self, cap: Capability) -> bool {
        self.flags.contains(cap.flag())
    }

    /// Snapshot of everything the rasterizer reads during a draw
    pub fn raster_state(&self) -> RasterState {
        RasterState {
            color_index: self.color_index,
            cull_mode: self.cull_mode,
            front_face: self.front_face,
            polygon_mode: self.polygon_mode,
            depth_test: self.get_state(Capability::DepthTest),
            depth_func: self.depth_func,
            scissor_test: self.get_state(Capability::ScissorTest),
            perspective_correct: self.get_state(Capability::PerspectiveCorrect),
        }
    }
}

impl Default for StateMachine {
    fn default() -> Self {
        Self::new(&RenderConfig::default())
    }
}
