//! Programmable shaders behind one uniform-setting surface.
//!
//! A `Shader` owns its source copies, its log and its lifecycle state, and
//! forwards the API-specific work to a `ShaderBackend` picked once when the
//! shader is created:
//!
//! - `GlslShader` compiles stage objects, links programs and resolves uniform
//!   locations. Writes issued while its program is not bound are queued and
//!   replayed the next time it is used.
//! - `HlslShader` compiles both stages into one effect and follows the
//!   display's invalidate and validate notifications.
//! - `SoftwareShader` only records values for software displays.
//!
//! Every display lazily builds a default shader from the built-in sources.
//! It is used whenever no user shader is bound.

pub mod deferred;
pub mod glsl;
pub mod hlsl;
pub mod names;
pub mod software;
pub mod source;

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::math::{self, Transform};

use super::backends::{BackendKind, DeviceId, UniformData};
use super::bitmap::{Bitmap, WeakBitmap};
use super::display::Display;

pub use self::glsl::GlslShader;
pub use self::hlsl::HlslShader;
pub use self::software::SoftwareShader;

static SHADER_IDS: AtomicU64 = AtomicU64::new(1);

/// Identifies a shader for the lifetime of the process.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ShaderId(u64);

impl ShaderId {
    fn next() -> Self {
        ShaderId(SHADER_IDS.fetch_add(1, Ordering::Relaxed))
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ShaderStage {
    Vertex,
    Pixel,
}

#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum ShaderPlatform {
    /// GLSL or HLSL depending on the display.
    Auto,
    /// Like `Auto`, with default sources that omit the alpha test.
    AutoMinimal,
    Glsl,
    GlslMinimal,
    Hlsl,
    HlslMinimal,
    /// HLSL compiled against shader model 3.
    HlslSm3,
    /// Cg is never available; creating such a shader fails.
    Cg,
    Software,
}

impl ShaderPlatform {
    /// Resolves the automatic platforms against `backend`. Returns `None` if
    /// the result cannot run there.
    pub fn resolve(self, backend: BackendKind) -> Option<ShaderPlatform> {
        let resolved = match (self, backend) {
            (ShaderPlatform::Auto, BackendKind::OpenGl) => ShaderPlatform::Glsl,
            (ShaderPlatform::Auto, BackendKind::Direct3D) => ShaderPlatform::Hlsl,
            (ShaderPlatform::AutoMinimal, BackendKind::OpenGl) => ShaderPlatform::GlslMinimal,
            (ShaderPlatform::AutoMinimal, BackendKind::Direct3D) => ShaderPlatform::HlslMinimal,
            (ShaderPlatform::Auto, BackendKind::Software)
            | (ShaderPlatform::AutoMinimal, BackendKind::Software) => ShaderPlatform::Software,
            (v, _) => v,
        };

        let supported = match resolved {
            ShaderPlatform::Glsl | ShaderPlatform::GlslMinimal => backend == BackendKind::OpenGl,
            ShaderPlatform::Hlsl | ShaderPlatform::HlslMinimal | ShaderPlatform::HlslSm3 => {
                backend == BackendKind::Direct3D
            }
            ShaderPlatform::Software => backend == BackendKind::Software,
            _ => false,
        };

        if supported {
            Some(resolved)
        } else {
            None
        }
    }

    pub fn is_glsl(self) -> bool {
        self == ShaderPlatform::Glsl || self == ShaderPlatform::GlslMinimal
    }

    pub fn is_hlsl(self) -> bool {
        match self {
            ShaderPlatform::Hlsl | ShaderPlatform::HlslMinimal | ShaderPlatform::HlslSm3 => true,
            _ => false,
        }
    }
}

/// UNLINKED -> LINKED, with BUILD_FAILED as a retryable dead end and
/// DESTROYED as the terminal state.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum ShaderState {
    Unlinked,
    BuildFailed,
    Linked,
    Destroyed,
}

/// One uniform write, kept whole so it can be replayed later.
#[derive(Debug, Clone, PartialEq)]
pub enum UniformOp {
    SetSampler {
        name: String,
        bitmap: Bitmap,
        unit: u32,
    },
    SetMatrix {
        name: String,
        matrix: Transform,
    },
    SetInt {
        name: String,
        value: i32,
    },
    SetFloat {
        name: String,
        value: f32,
    },
    SetIntVector {
        name: String,
        components: usize,
        data: Vec<i32>,
    },
    SetFloatVector {
        name: String,
        components: usize,
        data: Vec<f32>,
    },
    SetBool {
        name: String,
        value: bool,
    },
}

impl UniformOp {
    pub fn name(&self) -> &str {
        match *self {
            UniformOp::SetSampler { ref name, .. }
            | UniformOp::SetMatrix { ref name, .. }
            | UniformOp::SetInt { ref name, .. }
            | UniformOp::SetFloat { ref name, .. }
            | UniformOp::SetIntVector { ref name, .. }
            | UniformOp::SetFloatVector { ref name, .. }
            | UniformOp::SetBool { ref name, .. } => name,
        }
    }

    /// The value as handed to a backend. Samplers carry their texture unit.
    pub fn data(&self) -> UniformData {
        match *self {
            UniformOp::SetSampler { unit, .. } => UniformData::Int(unit as i32),
            UniformOp::SetMatrix { ref matrix, .. } => UniformData::Matrix(math::flatten(matrix)),
            UniformOp::SetInt { value, .. } => UniformData::Int(value),
            UniformOp::SetFloat { value, .. } => UniformData::Float(value),
            UniformOp::SetIntVector {
                components,
                ref data,
                ..
            } => UniformData::IntVector(components, data.clone()),
            UniformOp::SetFloatVector {
                components,
                ref data,
                ..
            } => UniformData::FloatVector(components, data.clone()),
            UniformOp::SetBool { value, .. } => UniformData::Bool(value),
        }
    }
}

/// Copies of the attached sources, kept for relinking.
#[derive(Debug, Clone, Default)]
pub struct Sources {
    pub vertex: Option<String>,
    pub pixel: Option<String>,
}

impl Sources {
    pub fn get(&self, stage: ShaderStage) -> Option<&str> {
        match stage {
            ShaderStage::Vertex => self.vertex.as_ref().map(|v| v.as_str()),
            ShaderStage::Pixel => self.pixel.as_ref().map(|v| v.as_str()),
        }
    }

    fn slot(&mut self, stage: ShaderStage) -> &mut Option<String> {
        match stage {
            ShaderStage::Vertex => &mut self.vertex,
            ShaderStage::Pixel => &mut self.pixel,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.vertex.is_none() && self.pixel.is_none()
    }
}

/// The per-API half of a shader. Failures of `attach` and `build` return
/// the log that replaces the shader's previous one.
pub trait ShaderBackend: Send {
    /// (Re)compiles `stage` from `sources`, or frees it if that stage has no
    /// source. A working linked program stays intact on failure.
    fn attach(
        &mut self,
        display: &mut Display,
        stage: ShaderStage,
        sources: &Sources,
    ) -> Result<(), String>;

    fn build(&mut self, display: &mut Display, sources: &Sources) -> Result<(), String>;

    /// Makes this shader the display's active program.
    fn bind(&mut self, display: &mut Display, id: ShaderId, sync_matrices: bool) -> bool;

    fn unbind(&mut self, display: &mut Display);

    /// Applies `op`, or queues it if this shader is not bound. Fails if the
    /// linked program has no such uniform.
    fn set(&mut self, display: &mut Display, id: ShaderId, op: UniformOp) -> bool;

    /// Frees every backend object. Handles of a lost or replaced context are
    /// forgotten without backend calls.
    fn release(&mut self, display: &mut Display);

    /// False if the backend objects belong to a context that has since been
    /// invalidated.
    fn is_current(&self, _: &Display) -> bool {
        true
    }
}

/// A shader program and its lifecycle.
///
/// Backend objects are only freed by `destroy`, which needs the display the
/// shader was created on. A shader that is dropped instead leaves them
/// allocated on the device.
pub struct Shader {
    id: ShaderId,
    platform: ShaderPlatform,
    device: DeviceId,
    state: ShaderState,
    sources: Sources,
    log: String,
    bitmaps: Vec<WeakBitmap>,
    imp: Box<dyn ShaderBackend>,
}

impl Shader {
    /// Creates an unlinked shader for `display`. Returns `None` if `platform`
    /// has no implementation on this display.
    pub fn create(display: &mut Display, platform: ShaderPlatform) -> Option<Shader> {
        let backend = display.backend_kind();
        let resolved = match platform.resolve(backend) {
            Some(v) => v,
            None => {
                warn!("{:?} shaders are not available on {:?} displays.", platform, backend);
                return None;
            }
        };

        if resolved != ShaderPlatform::Software && !display.flags().programmable {
            warn!("Display does not have a programmable pipeline.");
            return None;
        }

        let imp: Box<dyn ShaderBackend> = if resolved.is_glsl() {
            Box::new(GlslShader::new(display))
        } else if resolved.is_hlsl() {
            Box::new(HlslShader::new(display, resolved == ShaderPlatform::HlslSm3))
        } else {
            Box::new(SoftwareShader::new())
        };

        let shader = Shader {
            id: ShaderId::next(),
            platform: resolved,
            device: display.device_id(),
            state: ShaderState::Unlinked,
            sources: Sources::default(),
            log: String::new(),
            bitmaps: Vec::new(),
            imp,
        };

        debug!("Created {:?} shader {:?}.", resolved, shader.id);
        Some(shader)
    }

    #[inline]
    pub fn id(&self) -> ShaderId {
        self.id
    }

    /// The resolved platform.
    #[inline]
    pub fn platform(&self) -> ShaderPlatform {
        self.platform
    }

    #[inline]
    pub fn state(&self) -> ShaderState {
        self.state
    }

    /// The last compile or link log.
    #[inline]
    pub fn log(&self) -> &str {
        &self.log
    }

    pub fn source(&self, stage: ShaderStage) -> Option<&str> {
        self.sources.get(stage)
    }

    fn accessible(&self, display: &Display) -> bool {
        self.state != ShaderState::Destroyed
            && !display.is_lost()
            && self.device == display.device_id()
    }

    /// Detects handles left over from an invalidated context.
    fn revalidate(&mut self, display: &mut Display) -> bool {
        if self.imp.is_current(display) {
            return true;
        }

        self.imp.release(display);
        if self.state != ShaderState::Destroyed {
            self.state = ShaderState::Unlinked;
        }

        self.log = "The device was reset; attach and build again.".to_owned();
        false
    }

    /// Compiles `stage` from `source`, or detaches it for `None`.
    pub fn attach_source(
        &mut self,
        display: &mut Display,
        stage: ShaderStage,
        source: Option<&str>,
    ) -> bool {
        if !self.accessible(display) {
            return false;
        }

        self.revalidate(display);

        let previous = self.sources.slot(stage).take();
        *self.sources.slot(stage) = source.map(|v| v.to_owned());

        match self.imp.attach(display, stage, &self.sources) {
            Ok(()) => {
                self.state = ShaderState::Unlinked;
                true
            }
            Err(log) => {
                error!("Failed to compile {:?} stage of {:?}: {}", stage, self.id, log);
                *self.sources.slot(stage) = previous;
                self.log = log;
                false
            }
        }
    }

    /// Links the attached stages.
    pub fn build(&mut self, display: &mut Display) -> bool {
        if !self.accessible(display) {
            return false;
        }

        if !self.revalidate(display) {
            return false;
        }

        match self.imp.build(display, &self.sources) {
            Ok(()) => {
                self.state = ShaderState::Linked;
                true
            }
            Err(log) => {
                error!("Failed to link {:?}: {}", self.id, log);
                self.state = ShaderState::BuildFailed;
                self.log = log;
                false
            }
        }
    }

    /// Binds this shader on `display`. With `sync_matrices` the display's
    /// projection-view transform is pushed right away.
    pub fn use_on(&mut self, display: &mut Display, sync_matrices: bool) -> bool {
        if !self.accessible(display) {
            return false;
        }

        if !self.revalidate(display) || self.state != ShaderState::Linked {
            return false;
        }

        self.imp.bind(display, self.id, sync_matrices)
    }

    /// Unbinds this shader if it is the display's active program.
    pub fn unuse(&mut self, display: &mut Display) {
        if display.active_shader() != Some(self.id) {
            return;
        }

        if display.is_lost() {
            display.clear_active();
        } else {
            self.imp.unbind(display);
        }
    }

    fn set(&mut self, display: &mut Display, op: UniformOp) -> bool {
        if !self.accessible(display) || self.state != ShaderState::Linked {
            return false;
        }

        if !self.revalidate(display) {
            return false;
        }

        self.imp.set(display, self.id, op)
    }

    pub fn set_sampler(
        &mut self,
        display: &mut Display,
        name: &str,
        bitmap: &Bitmap,
        unit: u32,
    ) -> bool {
        if bitmap.is_memory() {
            warn!("Cannot use memory bitmap for sampler.");
            return false;
        }

        let op = UniformOp::SetSampler {
            name: name.to_owned(),
            bitmap: bitmap.clone(),
            unit,
        };

        self.set(display, op)
    }

    pub fn set_matrix(&mut self, display: &mut Display, name: &str, matrix: &Transform) -> bool {
        let op = UniformOp::SetMatrix {
            name: name.to_owned(),
            matrix: *matrix,
        };

        self.set(display, op)
    }

    pub fn set_int(&mut self, display: &mut Display, name: &str, value: i32) -> bool {
        let op = UniformOp::SetInt {
            name: name.to_owned(),
            value,
        };

        self.set(display, op)
    }

    pub fn set_float(&mut self, display: &mut Display, name: &str, value: f32) -> bool {
        let op = UniformOp::SetFloat {
            name: name.to_owned(),
            value,
        };

        self.set(display, op)
    }

    /// Sets `elements` vectors of `components` ints each.
    pub fn set_int_vector(
        &mut self,
        display: &mut Display,
        name: &str,
        components: usize,
        values: &[i32],
        elements: usize,
    ) -> bool {
        if components == 0 || values.len() < components * elements {
            return false;
        }

        let op = UniformOp::SetIntVector {
            name: name.to_owned(),
            components,
            data: values[..components * elements].to_vec(),
        };

        self.set(display, op)
    }

    /// Sets `elements` vectors of `components` floats each.
    pub fn set_float_vector(
        &mut self,
        display: &mut Display,
        name: &str,
        components: usize,
        values: &[f32],
        elements: usize,
    ) -> bool {
        if components == 0 || values.len() < components * elements {
            return false;
        }

        let op = UniformOp::SetFloatVector {
            name: name.to_owned(),
            components,
            data: values[..components * elements].to_vec(),
        };

        self.set(display, op)
    }

    pub fn set_bool(&mut self, display: &mut Display, name: &str, value: bool) -> bool {
        let op = UniformOp::SetBool {
            name: name.to_owned(),
            value,
        };

        self.set(display, op)
    }

    /// Releases every backend object, detaches the shader from the bitmaps
    /// using it and unbinds it if it is active.
    pub fn destroy(&mut self, display: &mut Display) {
        if self.state == ShaderState::Destroyed {
            return;
        }

        if self.device == display.device_id() {
            self.unuse(display);
            self.imp.release(display);
        } else {
            warn!("{:?} destroyed through a foreign display.", self.id);
        }

        for bitmap in self.bitmaps.drain(..).filter_map(|v| v.upgrade()) {
            if bitmap.shader() == Some(self.id) {
                bitmap.set_shader(None);
            }
        }

        self.state = ShaderState::Destroyed;
        self.log.clear();
        debug!("Destroyed {:?}.", self.id);
    }

    fn track(&mut self, bitmap: &Bitmap) {
        self.bitmaps.retain(|v| v.upgrade().is_some());
        if !self.bitmaps.iter().any(|v| v.upgrade().as_ref() == Some(bitmap)) {
            self.bitmaps.push(bitmap.downgrade());
        }
    }

    /// True if this shader can be bound on `display` without a rebuild.
    pub(crate) fn is_usable_on(&self, display: &Display) -> bool {
        self.state == ShaderState::Linked
            && self.device == display.device_id()
            && self.imp.is_current(display)
    }
}

impl Drop for Shader {
    fn drop(&mut self) {
        if self.state != ShaderState::Destroyed {
            warn!("{:?} dropped without being destroyed.", self.id);
        }
    }
}

/// The built-in source for `platform` and `stage`. Automatic platforms have
/// to be resolved against a display first and yield `None`, as do platforms
/// without built-in sources.
pub fn default_shader_source(platform: ShaderPlatform, stage: ShaderStage) -> Option<&'static str> {
    source::default_source(platform, stage)
}

/// The shader associated with `target`.
pub fn current_shader(target: &Bitmap) -> Option<ShaderId> {
    target.shader()
}

/// Binds `shader` for drawing onto `target` and associates the two. Falls
/// back to the display's default shader if binding fails; `None` binds the
/// default shader directly.
pub fn use_shader(display: &mut Display, target: &Bitmap, shader: Option<&mut Shader>) -> bool {
    if target.is_memory() || display.is_lost() || !display.owns(target) {
        return false;
    }

    match shader {
        Some(shader) => {
            if shader.use_on(display, true) {
                target.set_shader(Some(shader.id()));
                shader.track(target);
                true
            } else {
                target.set_shader(None);
                bind_default_shader(display);
                false
            }
        }
        None => {
            target.set_shader(None);
            bind_default_shader(display)
        }
    }
}

pub(crate) fn lock(shader: &Mutex<Shader>) -> MutexGuard<Shader> {
    match shader.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// Binds the display's default shader, creating it on first need. Fixed
/// pipelines have no default shader and just drop the active program.
pub(crate) fn bind_default_shader(display: &mut Display) -> bool {
    if display.is_lost() {
        return false;
    }

    if !display.flags().programmable {
        if display.active_shader().is_some() {
            display.unbind_program();
        }

        return true;
    }

    if let Some(id) = display.active_shader() {
        if Some(id) == display.default_shader() {
            return true;
        }
    }

    match default_shader(display) {
        Some(shader) => lock(&shader).use_on(display, true),
        None => false,
    }
}

fn default_shader(display: &mut Display) -> Option<Arc<Mutex<Shader>>> {
    let system = display.system().clone();
    let device = display.device_id();

    let cached = system.default_shaders().get(&device).cloned();
    if let Some(shader) = cached {
        if lock(&shader).is_usable_on(display) {
            return Some(shader);
        }

        debug!("Discarding stale default shader of device {:#x}.", device);
        system.default_shaders().remove(&device);
        lock(&shader).destroy(display);
    }

    let shader = create_default_shader(display)?;
    let id = shader.id();
    let shared = Arc::new(Mutex::new(shader));
    system.default_shaders().insert(device, shared.clone());
    display.notify_default_shader_created(id);
    Some(shared)
}

fn create_default_shader(display: &mut Display) -> Option<Shader> {
    let platform = if display.system().settings().minimal_default_shader {
        ShaderPlatform::AutoMinimal
    } else {
        ShaderPlatform::Auto
    };

    let mut shader = Shader::create(display, platform)?;
    for &stage in &[ShaderStage::Vertex, ShaderStage::Pixel] {
        let source = source::default_source(shader.platform(), stage)?;
        if !shader.attach_source(display, stage, Some(source)) {
            error!("Failed to compile the default shader: {}", shader.log());
            shader.destroy(display);
            return None;
        }
    }

    if !shader.build(display) {
        error!("Failed to link the default shader: {}", shader.log());
        shader.destroy(display);
        return None;
    }

    info!("Created default {:?} shader for device {:#x}.", shader.platform(), display.device_id());
    Some(shader)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn platform_resolution() {
        assert_eq!(
            ShaderPlatform::Auto.resolve(BackendKind::OpenGl),
            Some(ShaderPlatform::Glsl)
        );
        assert_eq!(
            ShaderPlatform::AutoMinimal.resolve(BackendKind::Direct3D),
            Some(ShaderPlatform::HlslMinimal)
        );
        assert_eq!(
            ShaderPlatform::Auto.resolve(BackendKind::Software),
            Some(ShaderPlatform::Software)
        );
        assert_eq!(ShaderPlatform::Glsl.resolve(BackendKind::Direct3D), None);
        assert_eq!(ShaderPlatform::Cg.resolve(BackendKind::OpenGl), None);
    }

    #[test]
    fn default_sources() {
        assert!(default_shader_source(ShaderPlatform::Auto, ShaderStage::Vertex).is_none());
        let pixel = default_shader_source(ShaderPlatform::Glsl, ShaderStage::Pixel).unwrap();
        assert!(pixel.contains(names::ALPHA_TEST));

        let minimal = default_shader_source(ShaderPlatform::GlslMinimal, ShaderStage::Pixel).unwrap();
        assert!(!minimal.contains(names::ALPHA_TEST));
        assert!(minimal.contains(names::USE_TEX));
    }

    #[test]
    fn op_payloads() {
        let op = UniformOp::SetIntVector {
            name: "v".to_owned(),
            components: 2,
            data: vec![1, 2, 3, 4],
        };

        assert_eq!(op.name(), "v");
        assert_eq!(op.data(), UniformData::IntVector(2, vec![1, 2, 3, 4]));
    }
}
