//! pico-raster viewer
//!
//! Renders a spinning textured cube over an immediate-mode floor through the
//! software pipeline, then blits the indexed framebuffer into a window.
//!
//! Keys: Tab cycles polygon modes, C cycles culling, P toggles perspective
//! correction, S toggles the scissor box, Escape quits.
//! An optional first argument names a RON render config.

use macroquad::prelude::*;
use pico_raster::rasterizer::{Mat4 as RasterMat4, Vec2 as RasterVec2, Vec3 as RasterVec3};
use pico_raster::{
    Capability, ClearFlags, Context, CullMode, ImageFormat, IndexBufferId, PolygonMode, PresentSurface, Primitive,
    RenderConfig, TextureId, VertexBufferId, VERSION,
};

/// Framebuffer resolution
const WIDTH: usize = 320;
const HEIGHT: usize = 240;

const CHECKER_SIZE: usize = 64;

/// RGBA buffer the context presents into, uploaded to the GPU once per frame
struct WindowSurface {
    width: usize,
    height: usize,
    pixels: Vec<u8>,
}

impl WindowSurface {
    fn new(width: usize, height: usize) -> Self {
        Self { width, height, pixels: vec![0; width * height * 4] }
    }
}

impl PresentSurface for WindowSurface {
    fn size(&self) -> (usize, usize) {
        (self.width, self.height)
    }

    fn blit(&mut self, pixels: &[[u8; 4]]) {
        self.pixels.clear();
        self.pixels.extend(pixels.iter().flatten());
    }
}

struct Scene {
    texture: TextureId,
    cube_vertices: VertexBufferId,
    cube_indices: IndexBufferId,
    index_count: usize,
    background: u8,
    border: u8,
    floor: u8,
}

/// Two-tone checkerboard with a diagonal stripe, RGB8
fn checkerboard(size: usize) -> Vec<u8> {
    let mut rgb = Vec::with_capacity(size * size * 3);
    for y in 0..size {
        for x in 0..size {
            let texel = if x == y || x + y == size - 1 {
                [255, 220, 40]
            } else if (x / 8 + y / 8) % 2 == 0 {
                [200, 60, 60]
            } else {
                [40, 40, 160]
            };
            rgb.extend_from_slice(&texel);
        }
    }
    rgb
}

/// Unit cube, four vertices per face so every face gets the full texture
fn cube_mesh() -> (Vec<RasterVec3>, Vec<RasterVec2>, Vec<u16>) {
    // (origin corner, u edge, v edge)
    let faces = [
        ([-1.0, -1.0, -1.0], [2.0, 0.0, 0.0], [0.0, 2.0, 0.0]),
        ([1.0, -1.0, 1.0], [-2.0, 0.0, 0.0], [0.0, 2.0, 0.0]),
        ([-1.0, -1.0, 1.0], [0.0, 0.0, -2.0], [0.0, 2.0, 0.0]),
        ([1.0, -1.0, -1.0], [0.0, 0.0, 2.0], [0.0, 2.0, 0.0]),
        ([-1.0, 1.0, -1.0], [2.0, 0.0, 0.0], [0.0, 0.0, 2.0]),
        ([-1.0, -1.0, 1.0], [2.0, 0.0, 0.0], [0.0, 0.0, -2.0]),
    ];

    let mut coords = Vec::with_capacity(24);
    let mut tex_coords = Vec::with_capacity(24);
    let mut indices = Vec::with_capacity(36);

    for (o, u, v) in faces {
        let base = coords.len() as u16;
        let origin = RasterVec3::new(o[0], o[1], o[2]);
        let u = RasterVec3::new(u[0], u[1], u[2]);
        let v = RasterVec3::new(v[0], v[1], v[2]);

        coords.extend([origin, origin + u, origin + v, origin + u + v]);
        tex_coords.extend([
            RasterVec2::new(0.0, 1.0),
            RasterVec2::new(1.0, 1.0),
            RasterVec2::new(0.0, 0.0),
            RasterVec2::new(1.0, 0.0),
        ]);
        indices.extend([base, base + 1, base + 2, base + 2, base + 1, base + 3]);
    }

    (coords, tex_coords, indices)
}

fn setup_scene(ctx: &mut Context) -> pico_raster::Result<Scene> {
    let fb = ctx.create_framebuffer(WIDTH, HEIGHT)?;
    ctx.bind_framebuffer(Some(fb))?;

    let texture = ctx.create_texture();
    ctx.texture_image_2d(texture, CHECKER_SIZE, CHECKER_SIZE, ImageFormat::Rgb8, &checkerboard(CHECKER_SIZE), true, true)?;

    let (coords, tex_coords, indices) = cube_mesh();
    let cube_vertices = ctx.create_vertex_buffer(coords.len());
    ctx.vertex_buffer_data(cube_vertices, coords.len(), Some(&coords), Some(&tex_coords))?;
    let cube_indices = ctx.create_index_buffer(indices.len());
    ctx.index_buffer_data(cube_indices, &indices)?;

    ctx.set_projection(RasterMat4::perspective(
        WIDTH as f32 / HEIGHT as f32,
        0.1,
        100.0,
        60f32.to_radians(),
    ));
    ctx.enable(Capability::DepthTest);

    Ok(Scene {
        texture,
        cube_vertices,
        cube_indices,
        index_count: indices.len(),
        background: ctx.color_index(20, 20, 40),
        border: ctx.color_index(255, 255, 255),
        floor: ctx.color_index(60, 140, 60),
    })
}

fn render_frame(ctx: &mut Context, scene: &Scene, angle: f32) -> pico_raster::Result<()> {
    ctx.clear(scene.background, 1.0, ClearFlags::ALL)?;

    let mut view = RasterMat4::IDENTITY;
    view.translate(0.0, -0.5, 6.0);
    view.rotate(1.0, 0.0, 0.0, 0.35);
    ctx.set_view(view);

    // Floor, streamed through immediate mode
    ctx.bind_texture(None)?;
    ctx.set_color_index(scene.floor);
    ctx.set_world(RasterMat4::IDENTITY);
    ctx.begin(Primitive::TriangleFan)?;
    ctx.vertex(-4.0, -1.0, -4.0)?;
    ctx.vertex(-4.0, -1.0, 4.0)?;
    ctx.vertex(4.0, -1.0, 4.0)?;
    ctx.vertex(4.0, -1.0, -4.0)?;
    ctx.end()?;

    // Cube from retained buffers
    let mut world = RasterMat4::IDENTITY;
    world.rotate(0.3, 1.0, 0.2, angle);
    ctx.set_world(world);
    ctx.bind_texture(Some(scene.texture))?;
    ctx.bind_vertex_buffer(Some(scene.cube_vertices))?;
    ctx.bind_index_buffer(Some(scene.cube_indices))?;
    ctx.draw_indexed(Primitive::Triangles, 0, scene.index_count)?;

    // Screen-space overlay: texture thumbnail with a frame
    ctx.draw_screen_image(4, 4, 36, 36)?;
    ctx.draw_screen_line(3, 3, 36, 3, scene.border)?;
    ctx.draw_screen_line(36, 3, 36, 36, scene.border)?;
    ctx.draw_screen_line(36, 36, 3, 36, scene.border)?;
    ctx.draw_screen_line(3, 36, 3, 3, scene.border)?;

    Ok(())
}

fn next_polygon_mode(mode: PolygonMode) -> PolygonMode {
    match mode {
        PolygonMode::Fill => PolygonMode::Line,
        PolygonMode::Line => PolygonMode::Point,
        PolygonMode::Point => PolygonMode::Fill,
    }
}

fn next_cull_mode(mode: CullMode) -> CullMode {
    match mode {
        CullMode::None => CullMode::Back,
        CullMode::Back => CullMode::Front,
        CullMode::Front => CullMode::None,
    }
}

fn window_conf() -> Conf {
    Conf {
        window_title: format!("pico-raster v{}", VERSION),
        window_width: WIDTH as i32 * 3,
        window_height: HEIGHT as i32 * 3,
        window_resizable: true,
        ..Default::default()
    }
}

#[macroquad::main(window_conf)]
async fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let config = match std::env::args().nth(1) {
        Some(path) => match RenderConfig::load(&path) {
            Ok(config) => {
                log::info!("Loaded render config from {}", path);
                config
            }
            Err(e) => {
                log::warn!("Failed to load {}: {}, using defaults", path, e);
                RenderConfig::default()
            }
        },
        None => RenderConfig::default(),
    };

    let mut ctx = Context::new(config);
    let scene = match setup_scene(&mut ctx) {
        Ok(scene) => scene,
        Err(e) => {
            log::error!("Scene setup failed: {}", e);
            return;
        }
    };

    let mut surface = WindowSurface::new(WIDTH, HEIGHT);
    let mut polygon_mode = PolygonMode::Fill;
    let mut cull_mode = CullMode::None;
    let mut angle = 0.0f32;

    loop {
        if is_key_pressed(KeyCode::Escape) {
            break;
        }
        if is_key_pressed(KeyCode::Tab) {
            polygon_mode = next_polygon_mode(polygon_mode);
            ctx.set_polygon_mode(polygon_mode);
        }
        if is_key_pressed(KeyCode::C) {
            cull_mode = next_cull_mode(cull_mode);
            ctx.set_cull_mode(cull_mode);
        }
        if is_key_pressed(KeyCode::P) {
            let enabled = !ctx.get_state(Capability::PerspectiveCorrect);
            ctx.set_state(Capability::PerspectiveCorrect, enabled);
        }
        if is_key_pressed(KeyCode::S) {
            let enabled = !ctx.get_state(Capability::ScissorTest);
            if enabled {
                let (w, h) = (WIDTH as i32, HEIGHT as i32);
                if let Err(e) = ctx.scissor(w / 4, h / 4, w / 2, h / 2) {
                    log::error!("Scissor failed: {}", e);
                }
            }
            ctx.set_state(Capability::ScissorTest, enabled);
        }

        angle += get_frame_time();
        ctx.reset_stats();

        if let Err(e) = render_frame(&mut ctx, &scene, angle).and_then(|_| ctx.present(&mut surface)) {
            log::error!("Frame failed: {}", e);
            break;
        }

        let texture = Texture2D::from_rgba8(WIDTH as u16, HEIGHT as u16, &surface.pixels);
        texture.set_filter(FilterMode::Nearest);

        clear_background(BLACK);
        let scale = (screen_width() / WIDTH as f32).min(screen_height() / HEIGHT as f32);
        let (draw_w, draw_h) = (WIDTH as f32 * scale, HEIGHT as f32 * scale);
        draw_texture_ex(
            &texture,
            (screen_width() - draw_w) * 0.5,
            (screen_height() - draw_h) * 0.5,
            WHITE,
            DrawTextureParams {
                dest_size: Some(vec2(draw_w, draw_h)),
                ..Default::default()
            },
        );

        let stats = ctx.stats();
        draw_text(
            &format!(
                "{:?} | cull {:?} | draws {} | tris {} | flushes {}",
                polygon_mode, cull_mode, stats.draw_calls, stats.triangles, stats.immediate_flushes
            ),
            8.0,
            screen_height() - 8.0,
            20.0,
            WHITE,
        );

        next_frame().await;
    }
}
