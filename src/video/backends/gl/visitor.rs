use std::ffi::CString;
use std::os::raw::c_void;
use std::ptr;

use gl;
use gl::types::*;

use crate::errors::*;

use super::super::super::pixel::PixelFormat;
use super::super::super::primitives::Topology;
use super::super::super::shader::ShaderStage;
use super::super::super::state::{Blender, Wrap};
use super::super::{
    AttribLayout, BuildStatus, ClientArray, DeviceId, GlDevice, GlFeatures, UniformData,
    Viewport,
};
use super::capabilities::{Capabilities, Profile};
use super::types;

/// A `GlDevice` over the loaded OpenGL functions of one context.
///
/// Vertices are streamed through a single buffer and vertex array object.
/// The fixed-function entry points are not part of the loaded bindings, so
/// contexts without shader objects are rejected.
pub struct GlVisitor {
    device: DeviceId,
    capabilities: Capabilities,
    features: GlFeatures,
    vao: GLuint,
    vbo: GLuint,
    ibo: GLuint,
}

impl GlVisitor {
    /// Loads the function pointers of the current context through `loader`.
    /// `device` identifies the context, usually its native handle.
    pub unsafe fn load_with<F>(device: DeviceId, loader: F) -> Result<Self>
    where
        F: FnMut(&'static str) -> *const c_void,
    {
        gl::load_with(loader);
        Self::new(device)
    }

    /// Wraps the current context, whose functions must already be loaded.
    pub unsafe fn new(device: DeviceId) -> Result<Self> {
        let capabilities = Capabilities::parse()?;
        info!("GlVisitor {:#?}", capabilities);

        let features = capabilities.features();
        if !features.programmable {
            bail!("The OpenGL implementation does not supports shader objects.");
        }

        if !capabilities.vertex_array_objects() {
            bail!("The OpenGL implementation does not supports vertex array objects.");
        }

        if let Some(Profile::Compatibility) = capabilities.profile {
            debug!("Compatibility profile, fixed-function calls stay unavailable.");
        }

        let mut vao = 0;
        gl::GenVertexArrays(1, &mut vao);
        gl::BindVertexArray(vao);

        let mut buffers = [0; 2];
        gl::GenBuffers(2, buffers.as_mut_ptr());
        gl::BindBuffer(gl::ARRAY_BUFFER, buffers[0]);
        gl::BindBuffer(gl::ELEMENT_ARRAY_BUFFER, buffers[1]);
        gl::PixelStorei(gl::UNPACK_ALIGNMENT, 1);
        check()?;

        Ok(GlVisitor {
            device,
            capabilities,
            features,
            vao,
            vbo: buffers[0],
            ibo: buffers[1],
        })
    }

    pub fn capabilities(&self) -> &Capabilities {
        &self.capabilities
    }

    unsafe fn info_log(id: GLuint, program: bool) -> String {
        let mut len: GLint = 0;
        if program {
            gl::GetProgramiv(id, gl::INFO_LOG_LENGTH, &mut len);
        } else {
            gl::GetShaderiv(id, gl::INFO_LOG_LENGTH, &mut len);
        }

        if len <= 1 {
            return String::new();
        }

        let mut buf = vec![0u8; len as usize];
        if program {
            gl::GetProgramInfoLog(id, len, ptr::null_mut(), buf.as_mut_ptr() as *mut GLchar);
        } else {
            gl::GetShaderInfoLog(id, len, ptr::null_mut(), buf.as_mut_ptr() as *mut GLchar);
        }

        // Skip the trailing null character.
        buf.truncate(len as usize - 1);
        String::from_utf8_lossy(&buf).into_owned()
    }

    fn unsupported(&self, what: &str) -> Result<()> {
        bail!("[GL] {} needs the fixed-function pipeline.", what)
    }
}

impl Drop for GlVisitor {
    fn drop(&mut self) {
        unsafe {
            let buffers = [self.vbo, self.ibo];
            gl::DeleteBuffers(2, buffers.as_ptr());
            gl::DeleteVertexArrays(1, &self.vao);
        }
    }
}

fn c_string(name: &str) -> Result<CString> {
    CString::new(name.as_bytes()).map_err(|_| format_err!("[GL] {:?} contains a nul byte.", name))
}

impl GlDevice for GlVisitor {
    fn device_id(&self) -> DeviceId {
        self.device
    }

    fn features(&self) -> GlFeatures {
        self.features
    }

    fn create_shader(&mut self, stage: ShaderStage) -> Result<u32> {
        let kind = match stage {
            ShaderStage::Vertex => gl::VERTEX_SHADER,
            ShaderStage::Pixel => gl::FRAGMENT_SHADER,
        };

        unsafe {
            let shader = gl::CreateShader(kind);
            check()?;
            Ok(shader)
        }
    }

    fn compile_shader(&mut self, shader: u32, source: &str) -> Result<BuildStatus> {
        let c_str = c_string(source)?;
        unsafe {
            gl::ShaderSource(shader, 1, &c_str.as_ptr(), ptr::null());
            gl::CompileShader(shader);
            check()?;

            let mut status = GLint::from(gl::FALSE);
            gl::GetShaderiv(shader, gl::COMPILE_STATUS, &mut status);
            if status != GLint::from(gl::TRUE) {
                Ok(BuildStatus::Failure(Self::info_log(shader, false)))
            } else {
                Ok(BuildStatus::Success)
            }
        }
    }

    fn delete_shader(&mut self, shader: u32) -> Result<()> {
        unsafe {
            gl::DeleteShader(shader);
            check()
        }
    }

    fn create_program(&mut self) -> Result<u32> {
        unsafe {
            let program = gl::CreateProgram();
            check()?;
            Ok(program)
        }
    }

    fn attach_shader(&mut self, program: u32, shader: u32) -> Result<()> {
        unsafe {
            gl::AttachShader(program, shader);
            check()
        }
    }

    fn link_program(&mut self, program: u32) -> Result<BuildStatus> {
        unsafe {
            gl::LinkProgram(program);
            check()?;

            let mut status = GLint::from(gl::FALSE);
            gl::GetProgramiv(program, gl::LINK_STATUS, &mut status);
            if status != GLint::from(gl::TRUE) {
                Ok(BuildStatus::Failure(Self::info_log(program, true)))
            } else {
                Ok(BuildStatus::Success)
            }
        }
    }

    fn delete_program(&mut self, program: u32) -> Result<()> {
        unsafe {
            gl::DeleteProgram(program);
            check()
        }
    }

    fn use_program(&mut self, program: u32) -> Result<()> {
        unsafe {
            gl::UseProgram(program);
            check()
        }
    }

    fn uniform_location(&mut self, program: u32, name: &str) -> Result<Option<i32>> {
        let c_name = c_string(name)?;
        unsafe {
            let location = gl::GetUniformLocation(program, c_name.as_ptr());
            check()?;
            Ok(Some(location).filter(|&v| v >= 0))
        }
    }

    fn attrib_location(&mut self, program: u32, name: &str) -> Result<Option<u32>> {
        let c_name = c_string(name)?;
        unsafe {
            let location = gl::GetAttribLocation(program, c_name.as_ptr());
            check()?;
            Ok(Some(location).filter(|&v| v >= 0).map(|v| v as u32))
        }
    }

    fn set_uniform(&mut self, location: i32, data: &UniformData) -> Result<()> {
        unsafe {
            match *data {
                UniformData::Int(v) => gl::Uniform1i(location, v),
                UniformData::Bool(v) => gl::Uniform1i(location, v as GLint),
                UniformData::Float(v) => gl::Uniform1f(location, v),
                UniformData::IntVector(n, ref v) => {
                    let count = (v.len() / n.max(1)) as GLsizei;
                    match n {
                        1 => gl::Uniform1iv(location, count, v.as_ptr()),
                        2 => gl::Uniform2iv(location, count, v.as_ptr()),
                        3 => gl::Uniform3iv(location, count, v.as_ptr()),
                        4 => gl::Uniform4iv(location, count, v.as_ptr()),
                        _ => bail!("[GL] Vectors of {} components.", n),
                    }
                }
                UniformData::FloatVector(n, ref v) => {
                    let count = (v.len() / n.max(1)) as GLsizei;
                    match n {
                        1 => gl::Uniform1fv(location, count, v.as_ptr()),
                        2 => gl::Uniform2fv(location, count, v.as_ptr()),
                        3 => gl::Uniform3fv(location, count, v.as_ptr()),
                        4 => gl::Uniform4fv(location, count, v.as_ptr()),
                        _ => bail!("[GL] Vectors of {} components.", n),
                    }
                }
                UniformData::Matrix(ref v) => gl::UniformMatrix4fv(location, 1, gl::FALSE, v.as_ptr()),
            }

            check()
        }
    }

    fn create_texture(&mut self, w: u32, h: u32, format: PixelFormat, pixels: &[u8]) -> Result<u32> {
        let (internal, format, ty) = types::texture_format(format, self.features.es);
        unsafe {
            let mut id = 0;
            gl::GenTextures(1, &mut id);
            gl::BindTexture(gl::TEXTURE_2D, id);
            gl::TexParameteri(gl::TEXTURE_2D, gl::TEXTURE_MIN_FILTER, gl::NEAREST as GLint);
            gl::TexParameteri(gl::TEXTURE_2D, gl::TEXTURE_MAG_FILTER, gl::NEAREST as GLint);
            gl::TexParameteri(gl::TEXTURE_2D, gl::TEXTURE_WRAP_S, gl::CLAMP_TO_EDGE as GLint);
            gl::TexParameteri(gl::TEXTURE_2D, gl::TEXTURE_WRAP_T, gl::CLAMP_TO_EDGE as GLint);
            gl::TexImage2D(
                gl::TEXTURE_2D,
                0,
                internal as GLint,
                w as GLsizei,
                h as GLsizei,
                0,
                format,
                ty,
                pixels.as_ptr() as *const c_void,
            );

            if let Err(err) = check() {
                gl::DeleteTextures(1, &id);
                return Err(err);
            }

            Ok(id)
        }
    }

    fn upload_texture(
        &mut self,
        texture: u32,
        w: u32,
        h: u32,
        format: PixelFormat,
        pixels: &[u8],
    ) -> Result<()> {
        let (_, format, ty) = types::texture_format(format, self.features.es);
        unsafe {
            gl::BindTexture(gl::TEXTURE_2D, texture);
            gl::TexSubImage2D(
                gl::TEXTURE_2D,
                0,
                0,
                0,
                w as GLsizei,
                h as GLsizei,
                format,
                ty,
                pixels.as_ptr() as *const c_void,
            );

            check()
        }
    }

    fn delete_texture(&mut self, texture: u32) -> Result<()> {
        unsafe {
            gl::DeleteTextures(1, &texture);
            check()
        }
    }

    fn bind_texture(&mut self, unit: u32, texture: Option<u32>) -> Result<()> {
        if unit >= self.features.max_texture_units {
            bail!("[GL] Texture unit {} is out of range.", unit);
        }

        unsafe {
            gl::ActiveTexture(gl::TEXTURE0 + unit);
            gl::BindTexture(gl::TEXTURE_2D, texture.unwrap_or(0));
            check()
        }
    }

    fn texture_wrap(&mut self) -> Result<(Wrap, Wrap)> {
        unsafe {
            let (mut s, mut t) = (0, 0);
            gl::GetTexParameteriv(gl::TEXTURE_2D, gl::TEXTURE_WRAP_S, &mut s);
            gl::GetTexParameteriv(gl::TEXTURE_2D, gl::TEXTURE_WRAP_T, &mut t);
            check()?;
            Ok((types::wrap(s), types::wrap(t)))
        }
    }

    fn set_texture_wrap(&mut self, u: Wrap, v: Wrap) -> Result<()> {
        let (u, v): (GLenum, GLenum) = (u.into(), v.into());
        unsafe {
            gl::TexParameteri(gl::TEXTURE_2D, gl::TEXTURE_WRAP_S, u as GLint);
            gl::TexParameteri(gl::TEXTURE_2D, gl::TEXTURE_WRAP_T, v as GLint);
            check()
        }
    }

    fn set_texturing(&mut self, _: bool) -> Result<()> {
        self.unsupported("Texturing switches")
    }

    fn texture_matrix(&mut self) -> Result<[f32; 16]> {
        self.unsupported("The texture matrix stack")?;
        Ok([0.0; 16])
    }

    fn load_texture_matrix(&mut self, _: &[f32; 16]) -> Result<()> {
        self.unsupported("The texture matrix stack")
    }

    fn stream_vertices(&mut self, data: &[u8]) -> Result<()> {
        unsafe {
            gl::BindVertexArray(self.vao);
            gl::BindBuffer(gl::ARRAY_BUFFER, self.vbo);
            gl::BufferData(
                gl::ARRAY_BUFFER,
                data.len() as isize,
                data.as_ptr() as *const c_void,
                gl::STREAM_DRAW,
            );

            check()
        }
    }

    fn vertex_attrib(&mut self, location: u32, layout: Option<AttribLayout>) -> Result<()> {
        unsafe {
            match layout {
                Some(v) => {
                    gl::EnableVertexAttribArray(location);
                    gl::VertexAttribPointer(
                        location,
                        GLint::from(v.components),
                        v.kind.into(),
                        v.normalized as GLboolean,
                        v.stride as GLsizei,
                        v.offset as *const u8 as *const c_void,
                    );
                }
                None => gl::DisableVertexAttribArray(location),
            }

            check()
        }
    }

    fn client_array(&mut self, array: ClientArray, _: Option<AttribLayout>) -> Result<()> {
        self.unsupported(&format!("The {:?} client array", array))
    }

    fn set_blender(&mut self, blender: &Blender) -> Result<()> {
        unsafe {
            gl::Enable(gl::BLEND);
            gl::BlendEquationSeparate(blender.op.into(), blender.alpha_op.into());
            gl::BlendFuncSeparate(
                blender.src.into(),
                blender.dst.into(),
                blender.alpha_src.into(),
                blender.alpha_dst.into(),
            );

            check()
        }
    }

    fn set_projview(&mut self, _: &[f32; 16]) -> Result<()> {
        self.unsupported("The projection matrix stack")
    }

    fn draw_arrays(&mut self, topology: Topology, first: usize, count: usize) -> Result<()> {
        unsafe {
            gl::DrawArrays(topology.into(), first as GLint, count as GLsizei);
            check()
        }
    }

    fn draw_elements(&mut self, topology: Topology, indices: &[u32]) -> Result<()> {
        unsafe {
            gl::BindBuffer(gl::ELEMENT_ARRAY_BUFFER, self.ibo);
            gl::BufferData(
                gl::ELEMENT_ARRAY_BUFFER,
                (indices.len() * 4) as isize,
                indices.as_ptr() as *const c_void,
                gl::STREAM_DRAW,
            );

            gl::DrawElements(
                topology.into(),
                indices.len() as GLsizei,
                gl::UNSIGNED_INT,
                ptr::null(),
            );

            check()
        }
    }

    fn create_framebuffer(&mut self) -> Result<u32> {
        unsafe {
            let mut id = 0;
            gl::GenFramebuffers(1, &mut id);
            check()?;
            Ok(id)
        }
    }

    fn delete_framebuffer(&mut self, fbo: u32) -> Result<()> {
        unsafe {
            gl::DeleteFramebuffers(1, &fbo);
            check()
        }
    }

    fn set_viewport(&mut self, viewport: Viewport) -> Result<()> {
        unsafe {
            gl::Viewport(
                viewport.x as GLint,
                viewport.y as GLint,
                viewport.w as GLsizei,
                viewport.h as GLsizei,
            );
            check()
        }
    }

    fn bind_framebuffer(&mut self, fbo: u32) -> Result<()> {
        unsafe {
            gl::BindFramebuffer(gl::FRAMEBUFFER, fbo);
            check()
        }
    }

    fn attach_color_texture(&mut self, texture: u32) -> Result<bool> {
        unsafe {
            gl::FramebufferTexture2D(
                gl::FRAMEBUFFER,
                gl::COLOR_ATTACHMENT0,
                gl::TEXTURE_2D,
                texture,
                0,
            );

            check()?;
            Ok(gl::CheckFramebufferStatus(gl::FRAMEBUFFER) == gl::FRAMEBUFFER_COMPLETE)
        }
    }

    fn create_depth_buffer(&mut self, w: u32, h: u32) -> Result<u32> {
        unsafe {
            let mut id = 0;
            gl::GenRenderbuffers(1, &mut id);
            gl::BindRenderbuffer(gl::RENDERBUFFER, id);
            gl::RenderbufferStorage(
                gl::RENDERBUFFER,
                gl::DEPTH_COMPONENT16,
                w as GLsizei,
                h as GLsizei,
            );

            check()?;
            Ok(id)
        }
    }

    fn attach_depth_buffer(&mut self, buffer: u32) -> Result<()> {
        unsafe {
            gl::FramebufferRenderbuffer(
                gl::FRAMEBUFFER,
                gl::DEPTH_ATTACHMENT,
                gl::RENDERBUFFER,
                buffer,
            );

            check()
        }
    }

    fn delete_depth_buffer(&mut self, buffer: u32) -> Result<()> {
        unsafe {
            gl::DeleteRenderbuffers(1, &buffer);
            check()
        }
    }
}

unsafe fn check() -> Result<()> {
    match gl::GetError() {
        gl::NO_ERROR => Ok(()),

        gl::INVALID_ENUM => {
            bail!("[GL] An unacceptable value is specified for an enumerated argument.")
        }

        gl::INVALID_VALUE => bail!("[GL] A numeric argument is out of range."),

        gl::INVALID_OPERATION => {
            bail!("[GL] The specified operation is not allowed in the current state.")
        }

        gl::INVALID_FRAMEBUFFER_OPERATION => bail!(
            "[GL] The command is trying to render to or read from the framebuffer while the \
             currently bound framebuffer is not framebuffer complete."
        ),

        gl::OUT_OF_MEMORY => bail!("[GL] There is not enough memory left to execute the command."),
        _ => bail!("[GL] Oops, Unknown OpenGL error."),
    }
}
