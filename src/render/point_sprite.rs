//! GPU backend: every LED is a point sprite in a single draw call
//!
//! Vertices carry position, RGBA color and sprite diameter, so the base
//! layer, halos and lit LEDs all go out in one `draw_arrays`. Vertex data is
//! rebuilt on the CPU in [`RenderBackend::draw`] and uploaded from egui's
//! paint callback, which is where the GL context is current.

use super::backend::{color32, BackendKind, RenderBackend, Scene, Viewport};
use eframe::egui_glow;
use eframe::glow::{self, HasContext};
use std::sync::{Arc, Mutex};

/// Halo opacity relative to the LED itself
const GLOW_ALPHA: f32 = 0.25;

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, bytemuck::Pod, bytemuck::Zeroable)]
pub(crate) struct Vertex {
    pos: [f32; 2],
    color: [f32; 4],
    /// Diameter in points
    size: f32,
}

const VERTEX_SHADER: &str = r#"
    in vec2 a_pos;
    in vec4 a_color;
    in float a_size;
    uniform vec2 u_screen_size;
    uniform float u_pixels_per_point;
    out vec4 v_color;
    void main() {
        vec2 ndc = vec2(
            2.0 * a_pos.x / u_screen_size.x - 1.0,
            1.0 - 2.0 * a_pos.y / u_screen_size.y
        );
        gl_Position = vec4(ndc, 0.0, 1.0);
        gl_PointSize = a_size * u_pixels_per_point;
        v_color = a_color;
    }
"#;

const FRAGMENT_SHADER: &str = r#"
    precision mediump float;
    in vec4 v_color;
    out vec4 out_color;
    void main() {
        vec2 d = gl_PointCoord * 2.0 - 1.0;
        if (dot(d, d) > 1.0) {
            discard;
        }
        // egui blends with premultiplied alpha
        out_color = vec4(v_color.rgb * v_color.a, v_color.a);
    }
"#;

struct GpuState {
    program: glow::Program,
    vertex_array: glow::VertexArray,
    vertex_buffer: glow::Buffer,
    u_screen_size: Option<glow::UniformLocation>,
    u_pixels_per_point: Option<glow::UniformLocation>,
    vertices: Vec<Vertex>,
    /// Pixel ratio the vertices were laid out for
    pixel_ratio: f32,
    dirty: bool,
    destroyed: bool,
}

impl GpuState {
    /// # Safety
    ///
    /// `gl` must be the context the resources were created on, and current.
    unsafe fn paint(&mut self, gl: &glow::Context, screen_size: egui::Vec2) {
        if self.destroyed || self.vertices.is_empty() {
            return;
        }
        gl.use_program(Some(self.program));
        gl.bind_vertex_array(Some(self.vertex_array));
        gl.bind_buffer(glow::ARRAY_BUFFER, Some(self.vertex_buffer));
        if self.dirty {
            gl.buffer_data_u8_slice(
                glow::ARRAY_BUFFER,
                bytemuck::cast_slice(&self.vertices),
                glow::DYNAMIC_DRAW,
            );
            self.dirty = false;
        }
        gl.uniform_2_f32(self.u_screen_size.as_ref(), screen_size.x, screen_size.y);
        gl.uniform_1_f32(self.u_pixels_per_point.as_ref(), self.pixel_ratio);
        #[cfg(not(target_arch = "wasm32"))]
        gl.enable(glow::PROGRAM_POINT_SIZE);
        gl.draw_arrays(glow::POINTS, 0, self.vertices.len() as i32);
        gl.bind_vertex_array(None);
    }

    /// # Safety
    ///
    /// Same requirements as [`GpuState::paint`].
    unsafe fn destroy(&mut self, gl: &glow::Context) {
        if self.destroyed {
            return;
        }
        gl.delete_program(self.program);
        gl.delete_vertex_array(self.vertex_array);
        gl.delete_buffer(self.vertex_buffer);
        self.destroyed = true;
    }
}

/// Accelerated backend using `glow` point sprites
pub struct PointSpriteBackend {
    state: Arc<Mutex<GpuState>>,
    background: egui::Color32,
}

impl std::fmt::Debug for PointSpriteBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PointSpriteBackend")
            .field("background", &self.background)
            .finish_non_exhaustive()
    }
}

impl PointSpriteBackend {
    /// Compile the sprite program and allocate vertex storage on `gl`
    pub fn new(gl: &glow::Context) -> Result<Self, String> {
        let shader_version = if cfg!(target_arch = "wasm32") {
            "#version 300 es"
        } else {
            "#version 330"
        };

        // SAFETY: called with the context eframe created for this window
        let state = unsafe {
            let program = gl.create_program()?;
            let sources = [
                (glow::VERTEX_SHADER, VERTEX_SHADER),
                (glow::FRAGMENT_SHADER, FRAGMENT_SHADER),
            ];
            let mut shaders = Vec::with_capacity(sources.len());
            for (kind, source) in sources {
                let shader = match gl.create_shader(kind) {
                    Ok(shader) => shader,
                    Err(e) => {
                        for shader in shaders {
                            gl.delete_shader(shader);
                        }
                        gl.delete_program(program);
                        return Err(e);
                    }
                };
                gl.shader_source(shader, &format!("{}\n{}", shader_version, source));
                gl.compile_shader(shader);
                if !gl.get_shader_compile_status(shader) {
                    let log = gl.get_shader_info_log(shader);
                    gl.delete_shader(shader);
                    for shader in shaders {
                        gl.delete_shader(shader);
                    }
                    gl.delete_program(program);
                    return Err(format!("shader compilation failed: {}", log));
                }
                gl.attach_shader(program, shader);
                shaders.push(shader);
            }
            gl.link_program(program);
            for shader in shaders {
                gl.detach_shader(program, shader);
                gl.delete_shader(shader);
            }
            if !gl.get_program_link_status(program) {
                let log = gl.get_program_info_log(program);
                gl.delete_program(program);
                return Err(format!("program link failed: {}", log));
            }

            let vertex_array = match gl.create_vertex_array() {
                Ok(vertex_array) => vertex_array,
                Err(e) => {
                    gl.delete_program(program);
                    return Err(e);
                }
            };
            let vertex_buffer = match gl.create_buffer() {
                Ok(vertex_buffer) => vertex_buffer,
                Err(e) => {
                    gl.delete_vertex_array(vertex_array);
                    gl.delete_program(program);
                    return Err(e);
                }
            };
            gl.bind_vertex_array(Some(vertex_array));
            gl.bind_buffer(glow::ARRAY_BUFFER, Some(vertex_buffer));

            let stride = std::mem::size_of::<Vertex>() as i32;
            let attributes = match resolve_attributes(|name| gl.get_attrib_location(program, name)) {
                Ok(attributes) => attributes,
                Err(e) => {
                    gl.bind_vertex_array(None);
                    gl.delete_buffer(vertex_buffer);
                    gl.delete_vertex_array(vertex_array);
                    gl.delete_program(program);
                    return Err(e);
                }
            };
            for (location, components, offset) in attributes {
                gl.enable_vertex_attrib_array(location);
                gl.vertex_attrib_pointer_f32(location, components, glow::FLOAT, false, stride, offset);
            }
            gl.bind_vertex_array(None);

            GpuState {
                u_screen_size: gl.get_uniform_location(program, "u_screen_size"),
                u_pixels_per_point: gl.get_uniform_location(program, "u_pixels_per_point"),
                program,
                vertex_array,
                vertex_buffer,
                vertices: Vec::new(),
                pixel_ratio: 1.0,
                dirty: false,
                destroyed: false,
            }
        };

        tracing::info!("Point sprite backend ready");
        Ok(Self {
            state: Arc::new(Mutex::new(state)),
            background: egui::Color32::BLACK,
        })
    }
}

/// Look up every vertex attribute as `(location, components, byte offset)`.
/// Fails on the first name the linked program does not expose.
fn resolve_attributes(
    mut locate: impl FnMut(&str) -> Option<u32>,
) -> Result<[(u32, i32, i32); 3], String> {
    let mut resolved = [(0, 0, 0); 3];
    for (slot, (name, components, offset)) in resolved
        .iter_mut()
        .zip([("a_pos", 2, 0), ("a_color", 4, 8), ("a_size", 1, 24)])
    {
        let location = locate(name).ok_or_else(|| format!("attribute {} not found", name))?;
        *slot = (location, components, offset);
    }
    Ok(resolved)
}

/// Fill `out` with base layer, halo and lit vertices, in draw order
pub(crate) fn build_vertices(scene: &Scene, out: &mut Vec<Vertex>) {
    out.clear();
    out.reserve(scene.led_count() + scene.glow.len() + scene.lit.len());

    let diameter = scene.led_radius * 2.0;
    let filler = normalized(scene.filler, 1.0);
    for i in 0..scene.led_count() {
        let (x, y) = scene.position(i);
        out.push(Vertex {
            pos: [x, y],
            color: filler,
            size: diameter,
        });
    }
    for &i in &scene.glow {
        let (x, y) = scene.position(i as usize);
        out.push(Vertex {
            pos: [x, y],
            color: normalized(scene.color(i as usize), GLOW_ALPHA),
            size: scene.glow_radius * 2.0,
        });
    }
    for &i in &scene.lit {
        let (x, y) = scene.position(i as usize);
        out.push(Vertex {
            pos: [x, y],
            color: normalized(scene.color(i as usize), 1.0),
            size: diameter,
        });
    }
}

fn normalized([r, g, b]: [u8; 3], alpha: f32) -> [f32; 4] {
    [r as f32 / 255.0, g as f32 / 255.0, b as f32 / 255.0, alpha]
}

impl RenderBackend for PointSpriteBackend {
    fn kind(&self) -> BackendKind {
        BackendKind::PointSprite
    }

    /// Sprites are positioned from the scene and sized with its pixel
    /// ratio, so a resize needs no GPU work
    fn resize(&mut self, _viewport: Viewport) {}

    fn draw(&mut self, scene: &Scene) -> u32 {
        self.background = color32(scene.background);
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        build_vertices(scene, &mut state.vertices);
        state.pixel_ratio = scene.pixel_ratio;
        state.dirty = true;
        1
    }

    fn paint(&self, painter: &egui::Painter, rect: egui::Rect) {
        painter.rect_filled(rect, 0.0, self.background);

        let state = Arc::clone(&self.state);
        let callback = egui_glow::CallbackFn::new(move |info, painter| {
            let mut state = state.lock().unwrap_or_else(|e| e.into_inner());
            // SAFETY: egui_glow runs callbacks with its own context current
            unsafe {
                state.paint(painter.gl(), info.viewport.size());
            }
        });
        painter.add(egui::PaintCallback {
            rect,
            callback: Arc::new(callback),
        });
    }

    fn destroy(&mut self, gl: &glow::Context) {
        let mut state = self.state.lock().unwrap_or_else(|e| e.into_inner());
        // SAFETY: called from eframe's exit hook with the app's context
        unsafe { state.destroy(gl) };
    }
}
