//! Shaders of software displays. Nothing is compiled; the declared uniforms
//! are scanned from the sources so lookups behave like on a real backend.

use std::collections::HashMap;

use super::super::display::{ActiveProgram, Display};
use super::{source, ShaderBackend, ShaderId, ShaderStage, Sources, UniformOp};

#[derive(Default)]
pub struct SoftwareShader {
    declared: Vec<String>,
    linked: bool,
    values: HashMap<String, UniformOp>,
}

impl SoftwareShader {
    pub fn new() -> Self {
        SoftwareShader::default()
    }

    /// The last value written to `name`.
    pub fn value(&self, name: &str) -> Option<&UniformOp> {
        self.values.get(name)
    }
}

impl ShaderBackend for SoftwareShader {
    fn attach(&mut self, _: &mut Display, _: ShaderStage, _: &Sources) -> Result<(), String> {
        Ok(())
    }

    fn build(&mut self, _: &mut Display, sources: &Sources) -> Result<(), String> {
        if sources.is_empty() {
            return Err("No shader stages attached.".to_owned());
        }

        self.declared = [ShaderStage::Vertex, ShaderStage::Pixel]
            .iter()
            .filter_map(|&stage| sources.get(stage))
            .flat_map(|src| source::glsl_declarations(src, "uniform"))
            .collect();

        self.values.clear();
        self.linked = true;
        Ok(())
    }

    fn bind(&mut self, display: &mut Display, id: ShaderId, _: bool) -> bool {
        if !self.linked {
            return false;
        }

        display.set_active(ActiveProgram::Software { shader: id });
        true
    }

    fn unbind(&mut self, display: &mut Display) {
        display.clear_active();
    }

    fn set(&mut self, _: &mut Display, _: ShaderId, op: UniformOp) -> bool {
        if !self.declared.iter().any(|v| v == op.name()) {
            warn!("No uniform variable '{}' in shader program", op.name());
            return false;
        }

        self.values.insert(op.name().to_owned(), op);
        true
    }

    fn release(&mut self, _: &mut Display) {
        self.declared.clear();
        self.values.clear();
        self.linked = false;
    }
}
