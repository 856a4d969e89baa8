//! The device seams between the video layer and concrete graphics APIs.
//!
//! `GlDevice` mirrors the OpenGL object model (shader and program objects,
//! uniform locations, framebuffer objects) while `D3dDevice` mirrors the
//! Direct3D 9 one (effects, vertex declarations, FVF codes, texture stage
//! states). Both report API errors immediately from the call that caused them.

pub mod headless;

#[cfg(not(target_arch = "wasm32"))]
pub mod gl;

use crate::errors::*;

use super::pixel::PixelFormat;
use super::primitives::Topology;
use super::shader::ShaderStage;
use super::state::{Blender, Wrap};

/// The raw value of a concrete device handle. Values can be reused by the
/// driver once a device has been destroyed.
pub type DeviceId = u64;

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum BackendKind {
    OpenGl,
    Direct3D,
    Software,
}

/// Outcome of a compile or link step, carrying the log on failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildStatus {
    Success,
    Failure(String),
}

/// A uniform value as handed to a backend.
#[derive(Debug, Clone, PartialEq)]
pub enum UniformData {
    Int(i32),
    Float(f32),
    Bool(bool),
    IntVector(usize, Vec<i32>),
    FloatVector(usize, Vec<f32>),
    Matrix([f32; 16]),
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ComponentKind {
    Float,
    HalfFloat,
    Short,
    UShort,
    UByte,
}

/// Describes one vertex attribute stream inside the streamed vertex data.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct AttribLayout {
    pub components: u8,
    pub kind: ComponentKind,
    pub normalized: bool,
    pub stride: usize,
    pub offset: usize,
}

/// A rectangle of the bound render target, in its native rows: bottom-up
/// framebuffer rows for OpenGL, top-down for Direct3D.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct Viewport {
    pub x: u32,
    pub y: u32,
    pub w: u32,
    pub h: u32,
}

impl Viewport {
    pub fn new(x: u32, y: u32, w: u32, h: u32) -> Self {
        Viewport { x, y, w, h }
    }
}

/// Fixed-function vertex arrays.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ClientArray {
    Vertex,
    Color,
    TexCoord,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct GlFeatures {
    /// Shader objects are available.
    pub programmable: bool,
    pub framebuffer_objects: bool,
    /// OpenGL ES context.
    pub es: bool,
    pub max_texture_units: u32,
}

/// The OpenGL side. Implementations assume their context is current on the
/// calling thread.
pub trait GlDevice {
    fn device_id(&self) -> DeviceId;
    fn features(&self) -> GlFeatures;

    fn create_shader(&mut self, stage: ShaderStage) -> Result<u32>;
    fn compile_shader(&mut self, shader: u32, source: &str) -> Result<BuildStatus>;
    fn delete_shader(&mut self, shader: u32) -> Result<()>;
    fn create_program(&mut self) -> Result<u32>;
    fn attach_shader(&mut self, program: u32, shader: u32) -> Result<()>;
    fn link_program(&mut self, program: u32) -> Result<BuildStatus>;
    fn delete_program(&mut self, program: u32) -> Result<()>;
    /// Binds `program`, or the fixed-function pipeline for 0.
    fn use_program(&mut self, program: u32) -> Result<()>;
    fn uniform_location(&mut self, program: u32, name: &str) -> Result<Option<i32>>;
    fn attrib_location(&mut self, program: u32, name: &str) -> Result<Option<u32>>;
    /// Sets a uniform of the currently bound program.
    fn set_uniform(&mut self, location: i32, data: &UniformData) -> Result<()>;

    fn create_texture(&mut self, w: u32, h: u32, format: PixelFormat, pixels: &[u8])
        -> Result<u32>;
    fn upload_texture(
        &mut self,
        texture: u32,
        w: u32,
        h: u32,
        format: PixelFormat,
        pixels: &[u8],
    ) -> Result<()>;
    fn delete_texture(&mut self, texture: u32) -> Result<()>;
    fn bind_texture(&mut self, unit: u32, texture: Option<u32>) -> Result<()>;
    /// Wrap modes of the texture bound to the active unit.
    fn texture_wrap(&mut self) -> Result<(Wrap, Wrap)>;
    fn set_texture_wrap(&mut self, u: Wrap, v: Wrap) -> Result<()>;

    /// Fixed-function texturing switch.
    fn set_texturing(&mut self, enabled: bool) -> Result<()>;
    fn texture_matrix(&mut self) -> Result<[f32; 16]>;
    fn load_texture_matrix(&mut self, matrix: &[f32; 16]) -> Result<()>;

    /// Uploads the vertex data the following attribute pointers refer to.
    fn stream_vertices(&mut self, data: &[u8]) -> Result<()>;
    /// Points a generic attribute at the streamed vertices, or disables it.
    fn vertex_attrib(&mut self, location: u32, layout: Option<AttribLayout>) -> Result<()>;
    fn client_array(&mut self, array: ClientArray, layout: Option<AttribLayout>) -> Result<()>;

    fn set_blender(&mut self, blender: &Blender) -> Result<()>;
    fn set_viewport(&mut self, viewport: Viewport) -> Result<()>;
    /// Loads the fixed-function projection-view matrix.
    fn set_projview(&mut self, matrix: &[f32; 16]) -> Result<()>;
    fn draw_arrays(&mut self, topology: Topology, first: usize, count: usize) -> Result<()>;
    fn draw_elements(&mut self, topology: Topology, indices: &[u32]) -> Result<()>;

    fn create_framebuffer(&mut self) -> Result<u32>;
    fn delete_framebuffer(&mut self, fbo: u32) -> Result<()>;
    /// Binds `fbo`, or the backbuffer for 0.
    fn bind_framebuffer(&mut self, fbo: u32) -> Result<()>;
    /// Attaches `texture` to the bound framebuffer, returns true if complete.
    fn attach_color_texture(&mut self, texture: u32) -> Result<bool>;
    fn create_depth_buffer(&mut self, w: u32, h: u32) -> Result<u32>;
    fn attach_depth_buffer(&mut self, buffer: u32) -> Result<()>;
    fn delete_depth_buffer(&mut self, buffer: u32) -> Result<()>;
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct D3dCaps {
    pub pixel_shader: (u8, u8),
    pub vertex_shader: (u8, u8),
    /// `D3DDTCAPS_FLOAT16_2` and `D3DDTCAPS_FLOAT16_4`.
    pub float16_declarations: bool,
    /// `D3DDTCAPS_SHORT2N` and friends.
    pub normalized_declarations: bool,
}

/// Result of `TestCooperativeLevel`.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Cooperative {
    Ok,
    Lost,
    NotReset,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EffectBuild {
    Created(u32),
    Failed(String),
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum D3dDeclType {
    Float1,
    Float2,
    Float3,
    Float4,
    UByte4,
    Short2,
    Short4,
    UByte4N,
    Short2N,
    Short4N,
    UShort2N,
    UShort4N,
    Float16x2,
    Float16x4,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum D3dUsage {
    Position,
    TexCoord,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct D3dElement {
    pub offset: u16,
    pub ty: D3dDeclType,
    pub usage: D3dUsage,
    pub usage_index: u8,
}

/// `D3DFVF_XYZ | D3DFVF_DIFFUSE | D3DFVF_TEX1`.
pub const LEGACY_FVF: u32 = 0x002 | 0x040 | 0x100;
/// `D3DFVF_XYZ | D3DFVF_TEX2 | D3DFVF_TEXCOORDSIZE2(0) | D3DFVF_TEXCOORDSIZE4(1)`,
/// the layout of `Vertex` as seen by the primitives vertex shader.
pub const DEFAULT_FVF: u32 = 0x002 | 0x200 | (2 << 18);
/// `D3DTTFF_DISABLE`.
pub const TTFF_DISABLE: u32 = 0;
/// `D3DTTFF_COUNT2`.
pub const TTFF_COUNT2: u32 = 2;
/// Constant register holding the texture matrix of the primitives vertex shader.
pub const TEX_MATRIX_REGISTER: u32 = 4;

/// The Direct3D 9 side.
pub trait D3dDevice {
    fn device_id(&self) -> DeviceId;
    fn caps(&self) -> D3dCaps;
    fn test_cooperative_level(&mut self) -> Cooperative;
    fn reset(&mut self) -> Result<()>;

    fn create_texture(&mut self, w: u32, h: u32, format: PixelFormat, pixels: &[u8])
        -> Result<u32>;
    fn upload_texture(&mut self, texture: u32, format: PixelFormat, pixels: &[u8]) -> Result<()>;
    fn release_texture(&mut self, texture: u32) -> Result<()>;
    /// Sets the render target to `texture`, or the backbuffer for `None`.
    fn set_render_target(&mut self, texture: Option<u32>) -> Result<()>;
    /// Restricts drawing to a part of the render target. Setting a render
    /// target resets the viewport to all of it.
    fn set_viewport(&mut self, viewport: Viewport) -> Result<()>;

    fn create_effect(&mut self, source: &str) -> Result<EffectBuild>;
    fn release_effect(&mut self, effect: u32) -> Result<()>;
    fn effect_on_lost(&mut self, effect: u32) -> Result<()>;
    fn effect_on_reset(&mut self, effect: u32) -> Result<()>;
    /// Returns false if the effect has no parameter called `name`.
    fn effect_set(&mut self, effect: u32, name: &str, data: &UniformData) -> Result<bool>;
    fn effect_set_texture(&mut self, effect: u32, name: &str, texture: Option<u32>)
        -> Result<bool>;
    /// Begins the effect's technique and returns its pass count.
    fn effect_begin(&mut self, effect: u32) -> Result<u32>;
    fn effect_pass(&mut self, effect: u32, pass: u32) -> Result<()>;
    fn effect_end(&mut self, effect: u32) -> Result<()>;

    fn create_vertex_declaration(&mut self, elements: &[D3dElement]) -> Result<u32>;
    fn release_vertex_declaration(&mut self, decl: u32) -> Result<()>;
    fn set_vertex_declaration(&mut self, decl: u32) -> Result<()>;
    fn set_fvf(&mut self, fvf: u32) -> Result<()>;

    /// Builds the vertex shader used for primitives on non-programmable
    /// displays, reading the texture matrix from `TEX_MATRIX_REGISTER`.
    fn create_primitives_shader(&mut self, elements: &[D3dElement]) -> Result<u32>;
    fn release_vertex_shader(&mut self, shader: u32) -> Result<()>;
    fn vertex_shader(&mut self) -> Result<Option<u32>>;
    fn set_vertex_shader(&mut self, shader: Option<u32>) -> Result<()>;
    fn set_vertex_shader_constant(&mut self, register: u32, data: &[f32]) -> Result<()>;

    fn sampler_address(&mut self, stage: u32) -> Result<(Wrap, Wrap)>;
    fn set_sampler_address(&mut self, stage: u32, u: Wrap, v: Wrap) -> Result<()>;
    fn texture_transform_flags(&mut self, stage: u32) -> Result<u32>;
    fn set_texture_transform_flags(&mut self, stage: u32, flags: u32) -> Result<()>;
    fn set_texture_transform(&mut self, stage: u32, matrix: &[f32; 16]) -> Result<()>;
    fn set_texture(&mut self, stage: u32, texture: Option<u32>) -> Result<()>;
    fn set_blender(&mut self, blender: &Blender) -> Result<()>;
    /// Sets the world-view-projection transform of the fixed pipeline.
    fn set_projview(&mut self, matrix: &[f32; 16]) -> Result<()>;

    fn draw_primitive_up(
        &mut self,
        topology: Topology,
        primitives: usize,
        data: &[u8],
        stride: usize,
    ) -> Result<()>;
    fn draw_indexed_primitive_up(
        &mut self,
        topology: Topology,
        min_index: u32,
        num_vertices: usize,
        primitives: usize,
        indices: &[u32],
        data: &[u8],
        stride: usize,
    ) -> Result<()>;
}
