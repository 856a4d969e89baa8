//! GLSL programs on an OpenGL display.

use std::collections::HashMap;

use crate::errors;
use crate::math;
use crate::utils::HashValue;

use super::super::backends::{BuildStatus, DeviceId, GlDevice, UniformData};
use super::super::display::{ActiveProgram, Display};
use super::super::vertex::MAX_USER_ATTRIBUTES;
use super::deferred::DeferredQueue;
use super::{names, ShaderBackend, ShaderId, ShaderStage, Sources, UniformOp};

/// Locations of the reserved variables in a linked program. The primitive
/// dispatcher reads these instead of querying names on every draw.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct VarLocations {
    pub pos: Option<u32>,
    pub color: Option<u32>,
    pub texcoord: Option<u32>,
    pub user_attr: [Option<u32>; MAX_USER_ATTRIBUTES],
    pub projview_matrix: Option<i32>,
    pub tex: Option<i32>,
    pub use_tex: Option<i32>,
    pub tex_matrix: Option<i32>,
    pub use_tex_matrix: Option<i32>,
    pub alpha_test: Option<i32>,
    pub alpha_func: Option<i32>,
    pub alpha_test_val: Option<i32>,
}

fn attrib(gl: &mut dyn GlDevice, program: u32, name: &str) -> Option<u32> {
    match gl.attrib_location(program, name) {
        Ok(v) => v,
        Err(err) => {
            debug!("Failed to query attribute {}: {}", name, err);
            None
        }
    }
}

fn uniform(gl: &mut dyn GlDevice, program: u32, name: &str) -> Option<i32> {
    match gl.uniform_location(program, name) {
        Ok(v) => v,
        Err(err) => {
            debug!("Failed to query uniform {}: {}", name, err);
            None
        }
    }
}

impl VarLocations {
    pub fn lookup(gl: &mut dyn GlDevice, program: u32) -> Self {
        let mut user_attr = [None; MAX_USER_ATTRIBUTES];
        for (i, v) in user_attr.iter_mut().enumerate() {
            *v = attrib(gl, program, &names::user_attr(i as u8));
        }

        VarLocations {
            pos: attrib(gl, program, names::POS),
            color: attrib(gl, program, names::COLOR),
            texcoord: attrib(gl, program, names::TEXCOORD),
            user_attr,
            projview_matrix: uniform(gl, program, names::PROJVIEW_MATRIX),
            tex: uniform(gl, program, names::TEX),
            use_tex: uniform(gl, program, names::USE_TEX),
            tex_matrix: uniform(gl, program, names::TEX_MATRIX),
            use_tex_matrix: uniform(gl, program, names::USE_TEX_MATRIX),
            alpha_test: uniform(gl, program, names::ALPHA_TEST),
            alpha_func: uniform(gl, program, names::ALPHA_FUNCTION),
            alpha_test_val: uniform(gl, program, names::ALPHA_TEST_VALUE),
        }
    }
}

fn discard(result: errors::Result<()>, what: &str) {
    if let Err(err) = result {
        warn!("Failed to {}: {}", what, err);
    }
}

fn link(gl: &mut dyn GlDevice, program: u32, stages: &[u32]) -> errors::Result<BuildStatus> {
    for &v in stages {
        gl.attach_shader(program, v)?;
    }

    gl.link_program(program)
}

pub struct GlslShader {
    device: DeviceId,
    /// Display epoch the handles below were created in.
    epoch: u64,
    vertex: Option<u32>,
    pixel: Option<u32>,
    program: Option<u32>,
    varlocs: VarLocations,
    locations: HashMap<HashValue<str>, Option<i32>>,
    deferred: DeferredQueue,
}

impl GlslShader {
    pub fn new(display: &Display) -> Self {
        GlslShader {
            device: display.device_id(),
            epoch: display.epoch(),
            vertex: None,
            pixel: None,
            program: None,
            varlocs: VarLocations::default(),
            locations: HashMap::new(),
            deferred: DeferredQueue::new(),
        }
    }

    /// The linked program object.
    #[inline]
    pub fn program(&self) -> Option<u32> {
        self.program
    }

    /// Uniform writes waiting for the program to be bound.
    #[inline]
    pub fn deferred(&self) -> &DeferredQueue {
        &self.deferred
    }

    fn has_handles(&self) -> bool {
        self.program.is_some() || self.vertex.is_some() || self.pixel.is_some()
    }

    fn location(&mut self, display: &mut Display, name: &str) -> Option<i32> {
        let key = HashValue::from(name);
        if let Some(&v) = self.locations.get(&key) {
            return v;
        }

        let program = self.program?;
        let gl = display.gl()?;
        let v = uniform(gl, program, name);
        self.locations.insert(key, v);
        v
    }

    fn apply(&mut self, display: &mut Display, op: &UniformOp) -> bool {
        let location = match self.location(display, op.name()) {
            Some(v) => v,
            None => return false,
        };

        let texture = match *op {
            UniformOp::SetSampler { ref bitmap, .. } => match display.ensure_texture(bitmap) {
                Ok(v) => v,
                Err(err) => {
                    warn!("Failed to prepare sampler {}: {}", op.name(), err);
                    return false;
                }
            },
            _ => None,
        };

        let gl = match display.gl() {
            Some(v) => v,
            None => return false,
        };

        if let UniformOp::SetSampler { unit, .. } = *op {
            if let Err(err) = gl.bind_texture(unit, texture) {
                warn!("{} ({})", op.name(), err);
                return false;
            }
        }

        match gl.set_uniform(location, &op.data()) {
            Ok(()) => true,
            Err(err) => {
                warn!("{} ({})", op.name(), err);
                false
            }
        }
    }
}

impl ShaderBackend for GlslShader {
    fn attach(
        &mut self,
        display: &mut Display,
        stage: ShaderStage,
        sources: &Sources,
    ) -> Result<(), String> {
        let epoch = display.epoch();
        let gl = display
            .gl()
            .ok_or_else(|| "Not an OpenGL display.".to_owned())?;

        let slot = match stage {
            ShaderStage::Vertex => &mut self.vertex,
            ShaderStage::Pixel => &mut self.pixel,
        };

        let source = match sources.get(stage) {
            Some(v) => v,
            None => {
                if let Some(v) = slot.take() {
                    discard(gl.delete_shader(v), "delete shader");
                }

                return Ok(());
            }
        };

        let handle = gl.create_shader(stage).map_err(|e| e.to_string())?;
        match gl.compile_shader(handle, source) {
            Ok(BuildStatus::Success) => {
                if let Some(v) = slot.replace(handle) {
                    discard(gl.delete_shader(v), "delete shader");
                }

                self.epoch = epoch;
                Ok(())
            }
            Ok(BuildStatus::Failure(log)) => {
                discard(gl.delete_shader(handle), "delete shader");
                Err(log)
            }
            Err(err) => {
                discard(gl.delete_shader(handle), "delete shader");
                Err(err.to_string())
            }
        }
    }

    fn build(&mut self, display: &mut Display, _: &Sources) -> Result<(), String> {
        let stages: Vec<u32> = self.vertex.iter().chain(self.pixel.iter()).cloned().collect();
        if stages.is_empty() {
            return Err("No shader stages attached.".to_owned());
        }

        let epoch = display.epoch();
        let gl = display
            .gl()
            .ok_or_else(|| "Not an OpenGL display.".to_owned())?;

        let program = gl.create_program().map_err(|e| e.to_string())?;
        match link(gl, program, &stages) {
            Ok(BuildStatus::Success) => {
                if let Some(v) = self.program.replace(program) {
                    discard(gl.delete_program(v), "delete program");
                }

                self.varlocs = VarLocations::lookup(gl, program);
                self.locations.clear();
                self.deferred.clear();
                self.epoch = epoch;
                Ok(())
            }
            Ok(BuildStatus::Failure(log)) => {
                discard(gl.delete_program(program), "delete program");
                Err(log)
            }
            Err(err) => {
                discard(gl.delete_program(program), "delete program");
                Err(err.to_string())
            }
        }
    }

    fn bind(&mut self, display: &mut Display, id: ShaderId, sync_matrices: bool) -> bool {
        let program = match self.program {
            Some(v) => v,
            None => return false,
        };

        let projview = math::flatten(&display.projview());
        let bound = match display.gl() {
            Some(gl) => match gl.use_program(program) {
                Ok(()) => {
                    if let (true, Some(loc)) = (sync_matrices, self.varlocs.projview_matrix) {
                        discard(
                            gl.set_uniform(loc, &UniformData::Matrix(projview)),
                            "set projview matrix",
                        );
                    }

                    true
                }
                Err(err) => {
                    warn!("glUseProgram({}) failed: {}", program, err);
                    false
                }
            },
            None => false,
        };

        if !bound {
            display.clear_active();
            return false;
        }

        display.set_active(ActiveProgram::Glsl {
            shader: id,
            program,
            varlocs: self.varlocs.clone(),
        });

        let pending = self.deferred.take();
        if !pending.is_empty() {
            debug!("Replaying {} deferred uniforms of {:?}.", pending.len(), id);
        }

        for op in &pending {
            if !self.apply(display, op) {
                debug!("Deferred uniform {} could not be applied.", op.name());
            }
        }

        display.sync_render_state();
        true
    }

    fn unbind(&mut self, display: &mut Display) {
        if let Some(gl) = display.gl() {
            discard(gl.use_program(0), "unbind program");
        }

        display.clear_active();
    }

    fn set(&mut self, display: &mut Display, id: ShaderId, op: UniformOp) -> bool {
        if self.location(display, op.name()).is_none() {
            warn!("No uniform variable '{}' in shader program", op.name());
            return false;
        }

        if display.active_shader() == Some(id) {
            self.apply(display, &op)
        } else {
            self.deferred.push(op);
            true
        }
    }

    fn release(&mut self, display: &mut Display) {
        let live = !display.is_lost()
            && display.device_id() == self.device
            && self.epoch == display.epoch();

        let program = self.program.take();
        let stages = [self.vertex.take(), self.pixel.take()];

        if live {
            if let Some(gl) = display.gl() {
                if let Some(v) = program {
                    discard(gl.delete_program(v), "delete program");
                }

                for v in stages.iter().filter_map(|v| *v) {
                    discard(gl.delete_shader(v), "delete shader");
                }
            }
        } else if program.is_some() {
            debug!("Forgetting GLSL handles of an invalidated context.");
        }

        self.varlocs = VarLocations::default();
        self.locations.clear();
        self.deferred.clear();
        self.epoch = display.epoch();
    }

    fn is_current(&self, display: &Display) -> bool {
        !self.has_handles() || self.epoch == display.epoch()
    }
}
