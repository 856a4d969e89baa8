//! Devices that keep every object in memory instead of talking to a driver.
//!
//! They validate their inputs the way a strict driver would, so misuse shows
//! up as an error, and expose what they saw through a `Recorder`.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::errors::*;

use super::super::pixel::PixelFormat;
use super::super::primitives::Topology;
use super::super::shader::{names, source, ShaderStage};
use super::super::state::{Blender, Wrap};
use super::{
    AttribLayout, BuildStatus, ClientArray, Cooperative, D3dCaps, D3dDevice, D3dElement,
    DeviceId, EffectBuild, GlDevice, GlFeatures, UniformData, Viewport,
};

/// One recorded draw call.
#[derive(Debug, Clone, PartialEq)]
pub struct DrawCall {
    pub topology: Topology,
    pub primitives: usize,
    /// Vertices in the supplied data, or the declared range of an indexed
    /// Direct3D draw.
    pub vertices: usize,
    pub indices: Option<Vec<u32>>,
    /// The framebuffer or render target texture, `None` for the backbuffer.
    pub target: Option<u32>,
    /// The viewport in effect, `None` until one was set.
    pub viewport: Option<Viewport>,
    /// The projection-view matrix the vertices went through.
    pub projview: Option<[f32; 16]>,
}

struct ShaderObject {
    stage: ShaderStage,
    compiled: Option<String>,
}

#[derive(Default)]
struct ProgramObject {
    shaders: Vec<u32>,
    uniforms: Vec<String>,
    attributes: Vec<String>,
    linked: bool,
}

struct State {
    calls: usize,
    next: u32,
    shaders: HashMap<u32, ShaderObject>,
    programs: HashMap<u32, ProgramObject>,
    textures: HashMap<u32, (u32, u32, Vec<u8>)>,
    framebuffers: HashSet<u32>,
    depth_buffers: HashSet<u32>,
    effects: HashMap<u32, Vec<String>>,
    declarations: HashSet<u32>,
    vertex_shaders: HashSet<u32>,
    locations: HashMap<i32, (u32, String)>,
    values: HashMap<(u32, String), UniformData>,
    program: u32,
    framebuffer: u32,
    render_target: Option<u32>,
    bound_textures: HashMap<u32, u32>,
    wrap: (Wrap, Wrap),
    transform_flags: u32,
    vertex_shader: Option<u32>,
    fvf: Option<u32>,
    projview: Option<[f32; 16]>,
    viewport: Option<Viewport>,
    effect: Option<u32>,
    streamed: usize,
    draws: Vec<DrawCall>,
    incomplete_framebuffers: bool,
    cooperative: Cooperative,
    fail_reset: bool,
    resets: usize,
    passes: u32,
}

impl Default for State {
    fn default() -> Self {
        State {
            calls: 0,
            next: 1,
            shaders: HashMap::new(),
            programs: HashMap::new(),
            textures: HashMap::new(),
            framebuffers: HashSet::new(),
            depth_buffers: HashSet::new(),
            effects: HashMap::new(),
            declarations: HashSet::new(),
            vertex_shaders: HashSet::new(),
            locations: HashMap::new(),
            values: HashMap::new(),
            program: 0,
            framebuffer: 0,
            render_target: None,
            bound_textures: HashMap::new(),
            wrap: (Wrap::Clamp, Wrap::Clamp),
            transform_flags: 0,
            vertex_shader: None,
            fvf: None,
            projview: None,
            viewport: None,
            effect: None,
            streamed: 0,
            draws: Vec::new(),
            incomplete_framebuffers: false,
            cooperative: Cooperative::Ok,
            fail_reset: false,
            resets: 0,
            passes: 1,
        }
    }
}

impl State {
    fn handle(&mut self) -> u32 {
        let v = self.next;
        self.next += 1;
        v
    }

    fn texture(&self, texture: u32) -> Result<()> {
        if self.textures.contains_key(&texture) {
            Ok(())
        } else {
            bail!("Texture {} does not exist.", texture)
        }
    }

    fn location(&mut self, program: u32, name: &str) -> i32 {
        let key = (program, name.to_owned());
        if let Some((&k, _)) = self.locations.iter().find(|&(_, v)| *v == key) {
            return k;
        }

        let v = self.handle() as i32;
        self.locations.insert(v, key);
        v
    }

    /// The matrix of the bound program or running effect, otherwise the
    /// fixed-function one.
    fn draw_projview(&self) -> Option<[f32; 16]> {
        let owner = match self.effect {
            Some(v) => v,
            None if self.program != 0 => self.program,
            None => return self.projview,
        };

        match self.values.get(&(owner, names::PROJVIEW_MATRIX.to_owned())) {
            Some(UniformData::Matrix(m)) => Some(*m),
            _ => None,
        }
    }

    fn draw(&mut self, mut call: DrawCall) {
        call.viewport = self.viewport;
        call.projview = self.draw_projview();
        trace!("{:?}", call);
        self.draws.push(call);
    }
}

/// Read access to what a headless device has seen, shared with the device.
#[derive(Clone)]
pub struct Recorder(Arc<Mutex<State>>);

impl Recorder {
    fn state(&self) -> MutexGuard<State> {
        match self.0.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// The number of device calls made so far.
    pub fn calls(&self) -> usize {
        self.state().calls
    }

    pub fn draws(&self) -> Vec<DrawCall> {
        self.state().draws.clone()
    }

    pub fn clear_draws(&self) {
        self.state().draws.clear();
    }

    pub fn live_shaders(&self) -> usize {
        self.state().shaders.len()
    }

    pub fn live_programs(&self) -> usize {
        self.state().programs.len()
    }

    pub fn live_textures(&self) -> usize {
        self.state().textures.len()
    }

    pub fn live_framebuffers(&self) -> usize {
        self.state().framebuffers.len()
    }

    pub fn live_depth_buffers(&self) -> usize {
        self.state().depth_buffers.len()
    }

    pub fn live_effects(&self) -> usize {
        self.state().effects.len()
    }

    pub fn live_declarations(&self) -> usize {
        self.state().declarations.len()
    }

    pub fn live_vertex_shaders(&self) -> usize {
        self.state().vertex_shaders.len()
    }

    /// The pixels last uploaded to `texture`.
    pub fn texture_pixels(&self, texture: u32) -> Option<Vec<u8>> {
        self.state().textures.get(&texture).map(|v| v.2.clone())
    }

    /// The last value written to `name` of a program or effect.
    pub fn uniform(&self, owner: u32, name: &str) -> Option<UniformData> {
        self.state().values.get(&(owner, name.to_owned())).cloned()
    }

    pub fn current_program(&self) -> u32 {
        self.state().program
    }

    pub fn vertex_shader(&self) -> Option<u32> {
        self.state().vertex_shader
    }

    pub fn fvf(&self) -> Option<u32> {
        self.state().fvf
    }

    /// The fixed pipeline projection-view matrix.
    pub fn projview(&self) -> Option<[f32; 16]> {
        self.state().projview
    }

    pub fn viewport(&self) -> Option<Viewport> {
        self.state().viewport
    }

    pub fn resets(&self) -> usize {
        self.state().resets
    }

    /// Makes every color attachment report an incomplete framebuffer.
    pub fn set_incomplete_framebuffers(&self, incomplete: bool) {
        self.state().incomplete_framebuffers = incomplete;
    }

    pub fn set_cooperative(&self, level: Cooperative) {
        self.state().cooperative = level;
    }

    pub fn set_fail_reset(&self, fail: bool) {
        self.state().fail_reset = fail;
    }

    /// Passes of every effect technique.
    pub fn set_passes(&self, passes: u32) {
        self.state().passes = passes;
    }
}

fn link_status(state: &mut State, program: u32) -> Result<BuildStatus> {
    let shaders = match state.programs.get(&program) {
        Some(v) => v.shaders.clone(),
        None => bail!("Program {} does not exist.", program),
    };

    if shaders.is_empty() {
        return Ok(BuildStatus::Failure("No shaders attached.".to_owned()));
    }

    let mut uniforms = Vec::new();
    let mut attributes = Vec::new();
    for v in &shaders {
        let shader = match state.shaders.get(v) {
            Some(v) => v,
            None => bail!("Shader {} does not exist.", v),
        };

        let text = match shader.compiled {
            Some(ref v) => v,
            None => return Ok(BuildStatus::Failure(format!("Shader {} is not compiled.", v))),
        };

        uniforms.extend(source::glsl_declarations(text, "uniform"));
        if shader.stage == ShaderStage::Vertex {
            attributes.extend(source::glsl_declarations(text, "attribute"));
            attributes.extend(source::glsl_declarations(text, "in"));
        }
    }

    if let Some(p) = state.programs.get_mut(&program) {
        p.uniforms = uniforms;
        p.attributes = attributes;
        p.linked = true;
    }

    Ok(BuildStatus::Success)
}

/// The fewest vertices `primitives` primitives are made of.
fn vertices_for(topology: Topology, primitives: usize) -> Result<usize> {
    Ok(match topology {
        Topology::PointList => primitives,
        Topology::LineList => primitives * 2,
        Topology::LineStrip => primitives + 1,
        Topology::TriangleList => primitives * 3,
        Topology::TriangleStrip | Topology::TriangleFan => primitives + 2,
        Topology::LineLoop => bail!("D3DERR_INVALIDCALL: no line loop primitive type."),
    })
}

/// An OpenGL device without a context.
pub struct HeadlessGl {
    id: DeviceId,
    features: GlFeatures,
    state: Arc<Mutex<State>>,
}

impl HeadlessGl {
    pub fn new(id: DeviceId) -> Self {
        HeadlessGl {
            id,
            features: GlFeatures {
                programmable: true,
                framebuffer_objects: true,
                es: false,
                max_texture_units: 8,
            },
            state: Arc::new(Mutex::new(State::default())),
        }
    }

    pub fn with_features(mut self, features: GlFeatures) -> Self {
        self.features = features;
        self
    }

    pub fn recorder(&self) -> Recorder {
        Recorder(self.state.clone())
    }

    fn call(&self) -> MutexGuard<State> {
        let mut state = match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        state.calls += 1;
        state
    }
}

impl GlDevice for HeadlessGl {
    fn device_id(&self) -> DeviceId {
        self.id
    }

    fn features(&self) -> GlFeatures {
        self.features
    }

    fn create_shader(&mut self, stage: ShaderStage) -> Result<u32> {
        if !self.features.programmable {
            bail!("Shader objects are not supported.");
        }

        let mut state = self.call();
        let v = state.handle();
        state.shaders.insert(
            v,
            ShaderObject {
                stage,
                compiled: None,
            },
        );
        Ok(v)
    }

    fn compile_shader(&mut self, shader: u32, source: &str) -> Result<BuildStatus> {
        let mut state = self.call();
        let object = match state.shaders.get_mut(&shader) {
            Some(v) => v,
            None => bail!("Shader {} does not exist.", shader),
        };

        if source.contains("#error") {
            object.compiled = None;
            return Ok(BuildStatus::Failure("0:1: '#error' : found".to_owned()));
        }

        object.compiled = Some(source.to_owned());
        Ok(BuildStatus::Success)
    }

    fn delete_shader(&mut self, shader: u32) -> Result<()> {
        let mut state = self.call();
        if state.shaders.remove(&shader).is_none() {
            bail!("Shader {} does not exist.", shader);
        }

        Ok(())
    }

    fn create_program(&mut self) -> Result<u32> {
        let mut state = self.call();
        let v = state.handle();
        state.programs.insert(v, ProgramObject::default());
        Ok(v)
    }

    fn attach_shader(&mut self, program: u32, shader: u32) -> Result<()> {
        let mut state = self.call();
        if !state.shaders.contains_key(&shader) {
            bail!("Shader {} does not exist.", shader);
        }

        match state.programs.get_mut(&program) {
            Some(p) => {
                if !p.shaders.contains(&shader) {
                    p.shaders.push(shader);
                }

                Ok(())
            }
            None => bail!("Program {} does not exist.", program),
        }
    }

    fn link_program(&mut self, program: u32) -> Result<BuildStatus> {
        let mut state = self.call();
        link_status(&mut state, program)
    }

    fn delete_program(&mut self, program: u32) -> Result<()> {
        let mut state = self.call();
        if state.programs.remove(&program).is_none() {
            bail!("Program {} does not exist.", program);
        }

        if state.program == program {
            state.program = 0;
        }

        state.locations.retain(|_, v| v.0 != program);
        state.values.retain(|k, _| k.0 != program);
        Ok(())
    }

    fn use_program(&mut self, program: u32) -> Result<()> {
        let mut state = self.call();
        if program != 0 {
            match state.programs.get(&program) {
                Some(p) if p.linked => {}
                _ => bail!("GL_INVALID_OPERATION: program {} is not linked.", program),
            }
        }

        state.program = program;
        Ok(())
    }

    fn uniform_location(&mut self, program: u32, name: &str) -> Result<Option<i32>> {
        let mut state = self.call();
        let declared = match state.programs.get(&program) {
            Some(p) if p.linked => p.uniforms.iter().any(|v| v == name),
            _ => bail!("GL_INVALID_OPERATION: program {} is not linked.", program),
        };

        Ok(if declared {
            Some(state.location(program, name))
        } else {
            None
        })
    }

    fn attrib_location(&mut self, program: u32, name: &str) -> Result<Option<u32>> {
        let state = self.call();
        match state.programs.get(&program) {
            Some(p) if p.linked => Ok(p.attributes.iter().position(|v| v == name).map(|v| v as u32)),
            _ => bail!("GL_INVALID_OPERATION: program {} is not linked.", program),
        }
    }

    fn set_uniform(&mut self, location: i32, data: &UniformData) -> Result<()> {
        let mut state = self.call();
        if state.program == 0 {
            bail!("GL_INVALID_OPERATION: no program is bound.");
        }

        let key = match state.locations.get(&location) {
            Some(v) if v.0 == state.program => v.clone(),
            _ => bail!("GL_INVALID_OPERATION: location {} is not part of program {}.", location, state.program),
        };

        state.values.insert(key, data.clone());
        Ok(())
    }

    fn create_texture(&mut self, w: u32, h: u32, format: PixelFormat, pixels: &[u8]) -> Result<u32> {
        if pixels.len() != (w * h) as usize * format.bytes_per_pixel() {
            bail!("GL_INVALID_VALUE: {} bytes for a {}x{} texture.", pixels.len(), w, h);
        }

        let mut state = self.call();
        let v = state.handle();
        state.textures.insert(v, (w, h, pixels.to_vec()));
        Ok(v)
    }

    fn upload_texture(&mut self, texture: u32, w: u32, h: u32, _: PixelFormat, pixels: &[u8]) -> Result<()> {
        let mut state = self.call();
        match state.textures.get_mut(&texture) {
            Some(v) if (v.0, v.1) == (w, h) => {
                v.2 = pixels.to_vec();
                Ok(())
            }
            Some(_) => bail!("GL_INVALID_VALUE: size mismatch uploading texture {}.", texture),
            None => bail!("Texture {} does not exist.", texture),
        }
    }

    fn delete_texture(&mut self, texture: u32) -> Result<()> {
        let mut state = self.call();
        if state.textures.remove(&texture).is_none() {
            bail!("Texture {} does not exist.", texture);
        }

        state.bound_textures.retain(|_, v| *v != texture);
        Ok(())
    }

    fn bind_texture(&mut self, unit: u32, texture: Option<u32>) -> Result<()> {
        if unit >= self.features.max_texture_units {
            bail!("GL_INVALID_ENUM: texture unit {}.", unit);
        }

        let mut state = self.call();
        match texture {
            Some(v) => {
                state.texture(v)?;
                state.bound_textures.insert(unit, v);
            }
            None => {
                state.bound_textures.remove(&unit);
            }
        }

        Ok(())
    }

    fn texture_wrap(&mut self) -> Result<(Wrap, Wrap)> {
        Ok(self.call().wrap)
    }

    fn set_texture_wrap(&mut self, u: Wrap, v: Wrap) -> Result<()> {
        self.call().wrap = (u, v);
        Ok(())
    }

    fn set_texturing(&mut self, _: bool) -> Result<()> {
        self.call();
        Ok(())
    }

    fn texture_matrix(&mut self) -> Result<[f32; 16]> {
        self.call();
        let mut m = [0.0; 16];
        for i in 0..4 {
            m[i * 5] = 1.0;
        }

        Ok(m)
    }

    fn load_texture_matrix(&mut self, _: &[f32; 16]) -> Result<()> {
        self.call();
        Ok(())
    }

    fn stream_vertices(&mut self, data: &[u8]) -> Result<()> {
        self.call().streamed = data.len();
        Ok(())
    }

    fn vertex_attrib(&mut self, _: u32, layout: Option<AttribLayout>) -> Result<()> {
        let state = self.call();
        if let Some(v) = layout {
            if v.offset >= state.streamed.max(1) {
                bail!("Attribute offset {} outside of the streamed vertices.", v.offset);
            }
        }

        Ok(())
    }

    fn client_array(&mut self, _: ClientArray, _: Option<AttribLayout>) -> Result<()> {
        self.call();
        Ok(())
    }

    fn set_blender(&mut self, _: &Blender) -> Result<()> {
        self.call();
        Ok(())
    }

    fn set_projview(&mut self, matrix: &[f32; 16]) -> Result<()> {
        self.call().projview = Some(*matrix);
        Ok(())
    }

    fn draw_arrays(&mut self, topology: Topology, first: usize, count: usize) -> Result<()> {
        let mut state = self.call();
        let target = Some(state.framebuffer).filter(|&v| v != 0);
        state.draw(DrawCall {
            topology,
            primitives: topology.primitive_count(count),
            vertices: first + count,
            indices: None,
            target,
            viewport: None,
            projview: None,
        });

        Ok(())
    }

    fn draw_elements(&mut self, topology: Topology, indices: &[u32]) -> Result<()> {
        let mut state = self.call();
        let target = Some(state.framebuffer).filter(|&v| v != 0);
        state.draw(DrawCall {
            topology,
            primitives: topology.primitive_count(indices.len()),
            vertices: indices.iter().max().map(|&v| v as usize + 1).unwrap_or(0),
            indices: Some(indices.to_vec()),
            target,
            viewport: None,
            projview: None,
        });

        Ok(())
    }

    fn create_framebuffer(&mut self) -> Result<u32> {
        if !self.features.framebuffer_objects {
            bail!("Framebuffer objects are not supported.");
        }

        let mut state = self.call();
        let v = state.handle();
        state.framebuffers.insert(v);
        Ok(v)
    }

    fn delete_framebuffer(&mut self, fbo: u32) -> Result<()> {
        let mut state = self.call();
        if !state.framebuffers.remove(&fbo) {
            bail!("Framebuffer {} does not exist.", fbo);
        }

        if state.framebuffer == fbo {
            state.framebuffer = 0;
        }

        Ok(())
    }

    fn set_viewport(&mut self, viewport: Viewport) -> Result<()> {
        self.call().viewport = Some(viewport);
        Ok(())
    }

    fn bind_framebuffer(&mut self, fbo: u32) -> Result<()> {
        let mut state = self.call();
        if fbo != 0 && !state.framebuffers.contains(&fbo) {
            bail!("Framebuffer {} does not exist.", fbo);
        }

        state.framebuffer = fbo;
        Ok(())
    }

    fn attach_color_texture(&mut self, texture: u32) -> Result<bool> {
        let state = self.call();
        if state.framebuffer == 0 {
            bail!("GL_INVALID_OPERATION: no framebuffer is bound.");
        }

        state.texture(texture)?;
        Ok(!state.incomplete_framebuffers)
    }

    fn create_depth_buffer(&mut self, _: u32, _: u32) -> Result<u32> {
        let mut state = self.call();
        let v = state.handle();
        state.depth_buffers.insert(v);
        Ok(v)
    }

    fn attach_depth_buffer(&mut self, buffer: u32) -> Result<()> {
        let state = self.call();
        if state.framebuffer == 0 || !state.depth_buffers.contains(&buffer) {
            bail!("GL_INVALID_OPERATION: can't attach depth buffer {}.", buffer);
        }

        Ok(())
    }

    fn delete_depth_buffer(&mut self, buffer: u32) -> Result<()> {
        if !self.call().depth_buffers.remove(&buffer) {
            bail!("Depth buffer {} does not exist.", buffer);
        }

        Ok(())
    }
}

/// A Direct3D 9 device without a driver.
pub struct HeadlessD3d {
    id: DeviceId,
    caps: D3dCaps,
    state: Arc<Mutex<State>>,
}

impl HeadlessD3d {
    pub fn new(id: DeviceId) -> Self {
        HeadlessD3d {
            id,
            caps: D3dCaps {
                pixel_shader: (3, 0),
                vertex_shader: (3, 0),
                float16_declarations: true,
                normalized_declarations: true,
            },
            state: Arc::new(Mutex::new(State::default())),
        }
    }

    pub fn with_caps(mut self, caps: D3dCaps) -> Self {
        self.caps = caps;
        self
    }

    pub fn with_pixel_shader(mut self, version: (u8, u8)) -> Self {
        self.caps.pixel_shader = version;
        self
    }

    pub fn recorder(&self) -> Recorder {
        Recorder(self.state.clone())
    }

    fn call(&self) -> MutexGuard<State> {
        let mut state = match self.state.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };

        state.calls += 1;
        state
    }

    fn effect(state: &State, effect: u32) -> Result<&Vec<String>> {
        match state.effects.get(&effect) {
            Some(v) => Ok(v),
            None => bail!("Effect {} does not exist.", effect),
        }
    }
}

impl D3dDevice for HeadlessD3d {
    fn device_id(&self) -> DeviceId {
        self.id
    }

    fn caps(&self) -> D3dCaps {
        self.caps
    }

    fn test_cooperative_level(&mut self) -> Cooperative {
        self.call().cooperative
    }

    fn reset(&mut self) -> Result<()> {
        let mut state = self.call();
        if state.fail_reset {
            bail!("D3DERR_DEVICELOST");
        }

        state.resets += 1;
        state.cooperative = Cooperative::Ok;
        Ok(())
    }

    fn create_texture(&mut self, w: u32, h: u32, format: PixelFormat, pixels: &[u8]) -> Result<u32> {
        if format.d3d_format().is_none() {
            bail!("D3DERR_INVALIDCALL: no device format for {:?}.", format);
        }

        let mut state = self.call();
        let v = state.handle();
        state.textures.insert(v, (w, h, pixels.to_vec()));
        Ok(v)
    }

    fn upload_texture(&mut self, texture: u32, _: PixelFormat, pixels: &[u8]) -> Result<()> {
        let mut state = self.call();
        match state.textures.get_mut(&texture) {
            Some(v) => {
                v.2 = pixels.to_vec();
                Ok(())
            }
            None => bail!("Texture {} does not exist.", texture),
        }
    }

    fn release_texture(&mut self, texture: u32) -> Result<()> {
        let mut state = self.call();
        if state.textures.remove(&texture).is_none() {
            bail!("Texture {} does not exist.", texture);
        }

        Ok(())
    }

    fn set_render_target(&mut self, texture: Option<u32>) -> Result<()> {
        let mut state = self.call();
        if let Some(v) = texture {
            state.texture(v)?;
        }

        state.render_target = texture;
        state.viewport = None;
        Ok(())
    }

    fn set_viewport(&mut self, viewport: Viewport) -> Result<()> {
        self.call().viewport = Some(viewport);
        Ok(())
    }

    fn create_effect(&mut self, source: &str) -> Result<EffectBuild> {
        let mut state = self.call();
        if source.contains("#error") {
            return Ok(EffectBuild::Failed("(1,1): error X1507: #error".to_owned()));
        }

        let v = state.handle();
        state.effects.insert(v, source::hlsl_parameters(source));
        Ok(EffectBuild::Created(v))
    }

    fn release_effect(&mut self, effect: u32) -> Result<()> {
        let mut state = self.call();
        if state.effects.remove(&effect).is_none() {
            bail!("Effect {} does not exist.", effect);
        }

        state.values.retain(|k, _| k.0 != effect);
        Ok(())
    }

    fn effect_on_lost(&mut self, effect: u32) -> Result<()> {
        let state = self.call();
        Self::effect(&state, effect).map(|_| ())
    }

    fn effect_on_reset(&mut self, effect: u32) -> Result<()> {
        let state = self.call();
        Self::effect(&state, effect).map(|_| ())
    }

    fn effect_set(&mut self, effect: u32, name: &str, data: &UniformData) -> Result<bool> {
        let mut state = self.call();
        if !Self::effect(&state, effect)?.iter().any(|v| v == name) {
            return Ok(false);
        }

        state.values.insert((effect, name.to_owned()), data.clone());
        Ok(true)
    }

    fn effect_set_texture(&mut self, effect: u32, name: &str, texture: Option<u32>) -> Result<bool> {
        let mut state = self.call();
        if !Self::effect(&state, effect)?.iter().any(|v| v == name) {
            return Ok(false);
        }

        if let Some(v) = texture {
            state.texture(v)?;
        }

        let value = UniformData::Int(texture.map(|v| v as i32).unwrap_or(0));
        state.values.insert((effect, name.to_owned()), value);
        Ok(true)
    }

    fn effect_begin(&mut self, effect: u32) -> Result<u32> {
        let mut state = self.call();
        Self::effect(&state, effect)?;
        state.effect = Some(effect);
        Ok(state.passes)
    }

    fn effect_pass(&mut self, effect: u32, pass: u32) -> Result<()> {
        let state = self.call();
        Self::effect(&state, effect)?;
        if pass >= state.passes {
            bail!("Pass {} out of {}.", pass, state.passes);
        }

        Ok(())
    }

    fn effect_end(&mut self, effect: u32) -> Result<()> {
        let mut state = self.call();
        Self::effect(&state, effect)?;
        state.effect = None;
        Ok(())
    }

    fn create_vertex_declaration(&mut self, elements: &[D3dElement]) -> Result<u32> {
        if elements.is_empty() {
            bail!("D3DERR_INVALIDCALL: empty vertex declaration.");
        }

        let mut state = self.call();
        let v = state.handle();
        state.declarations.insert(v);
        Ok(v)
    }

    fn release_vertex_declaration(&mut self, decl: u32) -> Result<()> {
        if !self.call().declarations.remove(&decl) {
            bail!("Vertex declaration {} does not exist.", decl);
        }

        Ok(())
    }

    fn set_vertex_declaration(&mut self, decl: u32) -> Result<()> {
        let mut state = self.call();
        if !state.declarations.contains(&decl) {
            bail!("Vertex declaration {} does not exist.", decl);
        }

        state.fvf = None;
        Ok(())
    }

    fn set_fvf(&mut self, fvf: u32) -> Result<()> {
        self.call().fvf = Some(fvf);
        Ok(())
    }

    fn create_primitives_shader(&mut self, elements: &[D3dElement]) -> Result<u32> {
        if self.caps.vertex_shader < (1, 1) {
            bail!("Vertex shaders are not supported.");
        }

        if elements.is_empty() {
            bail!("D3DERR_INVALIDCALL: empty vertex declaration.");
        }

        let mut state = self.call();
        let v = state.handle();
        state.vertex_shaders.insert(v);
        Ok(v)
    }

    fn release_vertex_shader(&mut self, shader: u32) -> Result<()> {
        let mut state = self.call();
        if !state.vertex_shaders.remove(&shader) {
            bail!("Vertex shader {} does not exist.", shader);
        }

        if state.vertex_shader == Some(shader) {
            state.vertex_shader = None;
        }

        Ok(())
    }

    fn vertex_shader(&mut self) -> Result<Option<u32>> {
        Ok(self.call().vertex_shader)
    }

    fn set_vertex_shader(&mut self, shader: Option<u32>) -> Result<()> {
        let mut state = self.call();
        if let Some(v) = shader {
            if !state.vertex_shaders.contains(&v) {
                bail!("Vertex shader {} does not exist.", v);
            }
        }

        state.vertex_shader = shader;
        Ok(())
    }

    fn set_vertex_shader_constant(&mut self, _: u32, data: &[f32]) -> Result<()> {
        if data.len() % 4 != 0 {
            bail!("D3DERR_INVALIDCALL: constants come in float4 registers.");
        }

        self.call();
        Ok(())
    }

    fn sampler_address(&mut self, _: u32) -> Result<(Wrap, Wrap)> {
        Ok(self.call().wrap)
    }

    fn set_sampler_address(&mut self, _: u32, u: Wrap, v: Wrap) -> Result<()> {
        self.call().wrap = (u, v);
        Ok(())
    }

    fn texture_transform_flags(&mut self, _: u32) -> Result<u32> {
        Ok(self.call().transform_flags)
    }

    fn set_texture_transform_flags(&mut self, _: u32, flags: u32) -> Result<()> {
        self.call().transform_flags = flags;
        Ok(())
    }

    fn set_texture_transform(&mut self, _: u32, _: &[f32; 16]) -> Result<()> {
        self.call();
        Ok(())
    }

    fn set_texture(&mut self, stage: u32, texture: Option<u32>) -> Result<()> {
        let mut state = self.call();
        match texture {
            Some(v) => {
                state.texture(v)?;
                state.bound_textures.insert(stage, v);
            }
            None => {
                state.bound_textures.remove(&stage);
            }
        }

        Ok(())
    }

    fn set_blender(&mut self, _: &Blender) -> Result<()> {
        self.call();
        Ok(())
    }

    fn set_projview(&mut self, matrix: &[f32; 16]) -> Result<()> {
        self.call().projview = Some(*matrix);
        Ok(())
    }

    fn draw_primitive_up(
        &mut self,
        topology: Topology,
        primitives: usize,
        data: &[u8],
        stride: usize,
    ) -> Result<()> {
        let available = data.len() / stride.max(1);
        let needed = vertices_for(topology, primitives)?;
        if primitives == 0 || needed > available {
            bail!("D3DERR_INVALIDCALL: {} primitives from {} vertices.", primitives, available);
        }

        let mut state = self.call();
        let target = state.render_target;
        state.draw(DrawCall {
            topology,
            primitives,
            vertices: available,
            indices: None,
            target,
            viewport: None,
            projview: None,
        });

        Ok(())
    }

    fn draw_indexed_primitive_up(
        &mut self,
        topology: Topology,
        min_index: u32,
        num_vertices: usize,
        primitives: usize,
        indices: &[u32],
        data: &[u8],
        stride: usize,
    ) -> Result<()> {
        if topology == Topology::PointList {
            bail!("D3DERR_INVALIDCALL: indexed point lists.");
        }

        let needed = vertices_for(topology, primitives)?;
        if primitives == 0 || needed > indices.len() {
            bail!("D3DERR_INVALIDCALL: {} primitives from {} indices.", primitives, indices.len());
        }

        let hi = u64::from(min_index) + num_vertices as u64;
        let available = (data.len() / stride.max(1)) as u64;
        if hi > available || indices.iter().any(|&v| v < min_index || u64::from(v) >= hi) {
            bail!("D3DERR_INVALIDCALL: index outside of [{}, {}).", min_index, hi);
        }

        let mut state = self.call();
        let target = state.render_target;
        state.draw(DrawCall {
            topology,
            primitives,
            vertices: num_vertices,
            indices: Some(indices.to_vec()),
            target,
            viewport: None,
            projview: None,
        });

        Ok(())
    }
}
