//! Displays own one backend device and everything cached against it: the
//! textures of their bitmaps, compiled vertex declarations, the framebuffer
//! pool and the active program. They also drive the device-loss state
//! machine and fire the invalidate and validate notifications.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::errors;
use crate::math::{self, SquareMatrix, Transform};

use super::backends::{
    BackendKind, Cooperative, D3dDevice, DeviceId, GlDevice, UniformData, Viewport,
};
use super::bitmap::{self, Bitmap, Residency, WeakBitmap};
use super::errors::*;
use super::fbo::FboPool;
use super::lifecycle::{
    CallbackId, CallbackList, DeviceLink, DeviceState, DisplayCallback, ResetSignal,
};
use super::pixel::{self, PixelFormat};
use super::shader::glsl::VarLocations;
use super::shader::{self, names, ShaderId};
use super::state::{Blender, RenderState};
use super::system::{CapabilityTier, System};
use super::vertex::DeclCache;

static DISPLAY_IDS: AtomicU64 = AtomicU64::new(1);

/// Device ids of software displays live above every real handle value.
const SOFTWARE_DEVICE_BIT: u64 = 1 << 63;

/// Slice in which a blocked resize re-polls a Direct3D device.
const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// The concrete device behind a display.
pub enum Backend {
    OpenGl(Box<dyn GlDevice>),
    Direct3D(Box<dyn D3dDevice>),
    Software,
}

impl Backend {
    pub fn kind(&self) -> BackendKind {
        match *self {
            Backend::OpenGl(_) => BackendKind::OpenGl,
            Backend::Direct3D(_) => BackendKind::Direct3D,
            Backend::Software => BackendKind::Software,
        }
    }
}

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct DisplayParams {
    pub width: u32,
    pub height: u32,
    /// Request the programmable pipeline. It is used only if the device has
    /// one.
    pub programmable: bool,
}

impl Default for DisplayParams {
    fn default() -> Self {
        DisplayParams {
            width: 640,
            height: 480,
            programmable: true,
        }
    }
}

/// What kind of pipeline a display ended up with.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct DisplayFlags {
    pub backend: BackendKind,
    pub programmable: bool,
}

/// The program currently bound for drawing.
#[derive(Debug, Clone, PartialEq)]
pub enum ActiveProgram {
    Glsl {
        shader: ShaderId,
        program: u32,
        varlocs: VarLocations,
    },
    Hlsl {
        shader: ShaderId,
        effect: u32,
    },
    Software {
        shader: ShaderId,
    },
}

impl ActiveProgram {
    pub fn shader(&self) -> ShaderId {
        match *self {
            ActiveProgram::Glsl { shader, .. }
            | ActiveProgram::Hlsl { shader, .. }
            | ActiveProgram::Software { shader } => shader,
        }
    }
}

fn discard(result: errors::Result<()>, what: &str) {
    if let Err(err) = result {
        warn!("Failed to {}: {}", what, err);
    }
}

fn pixel_projection(w: u32, h: u32) -> Transform {
    math::ortho(0.0, w as f32, h as f32, 0.0, -1.0, 1.0)
}

pub struct Display {
    id: u64,
    system: System,
    backend: Backend,
    flags: DisplayFlags,
    width: u32,
    height: u32,
    blender: Blender,
    render_state: RenderState,
    projection: Transform,
    view: Transform,
    backbuffer: Bitmap,
    bitmaps: Vec<WeakBitmap>,
    link: Arc<DeviceLink>,
    state: DeviceState,
    epoch: u64,
    invalidate: CallbackList,
    validate: CallbackList,
    reset: Arc<ResetSignal>,
    active: Option<ActiveProgram>,
    default_shader: Option<ShaderId>,
    destroyed: bool,
    fbos: FboPool,
    decls: DeclCache,
    /// Primitives vertex shaders of a Direct3D display, keyed by declaration.
    prim_shaders: HashMap<Option<u64>, u32>,
}

impl Display {
    /// Creates a display around `backend`.
    pub fn new(system: &System, backend: Backend, params: DisplayParams) -> Result<Display> {
        if !system.is_alive() {
            return Err(Error::Shutdown);
        }

        if params.width == 0 || params.height == 0 {
            return Err(Error::OutOfBounds);
        }

        let id = DISPLAY_IDS.fetch_add(1, Ordering::Relaxed);
        let (device, programmable) = match backend {
            Backend::OpenGl(ref gl) => {
                let features = gl.features();
                info!("OpenGL device {:#x}: {:?}.", gl.device_id(), features);
                (gl.device_id(), params.programmable && features.programmable)
            }
            Backend::Direct3D(ref d3d) => {
                let caps = d3d.caps();
                info!("Direct3D device {:#x}: {:?}.", d3d.device_id(), caps);
                (d3d.device_id(), params.programmable && caps.pixel_shader >= (2, 0))
            }
            Backend::Software => (SOFTWARE_DEVICE_BIT | id, false),
        };

        let flags = DisplayFlags {
            backend: backend.kind(),
            programmable,
        };

        let link = DeviceLink::new(device);
        let backbuffer = Bitmap::backbuffer(link.clone(), params.width, params.height);

        let mut display = Display {
            id,
            system: system.clone(),
            backend,
            flags,
            width: params.width,
            height: params.height,
            blender: Blender::default(),
            render_state: RenderState::default(),
            projection: pixel_projection(params.width, params.height),
            view: Transform::identity(),
            backbuffer,
            bitmaps: Vec::new(),
            link,
            state: DeviceState::Valid,
            epoch: 0,
            invalidate: CallbackList::new(),
            validate: CallbackList::new(),
            reset: ResetSignal::new(),
            active: None,
            default_shader: None,
            destroyed: false,
            fbos: FboPool::new(system.settings().max_fbos),
            decls: DeclCache::new(),
            prim_shaders: HashMap::new(),
        };

        display.register_invalidate_callback(Arc::new(|d: &mut Display| d.release_textures(false)));
        display.register_invalidate_callback(Arc::new(|d: &mut Display| d.release_fbos()));
        display.register_invalidate_callback(Arc::new(|d: &mut Display| d.release_decls()));
        if flags.backend == BackendKind::OpenGl {
            display.register_invalidate_callback(Arc::new(|d: &mut Display| {
                d.evict_default_shader()
            }));
        }

        display.register_validate_callback(Arc::new(|d: &mut Display| {
            d.system.device_list_changed()
        }));

        system.device_list_changed();
        info!(
            "Created {:?} display {} ({}x{}, programmable: {}).",
            flags.backend, id, params.width, params.height, programmable
        );

        Ok(display)
    }

    #[inline]
    pub fn id(&self) -> u64 {
        self.id
    }

    /// The handle of the concrete device.
    #[inline]
    pub fn device_id(&self) -> DeviceId {
        self.link.device()
    }

    #[inline]
    pub fn system(&self) -> &System {
        &self.system
    }

    #[inline]
    pub fn flags(&self) -> DisplayFlags {
        self.flags
    }

    #[inline]
    pub fn backend_kind(&self) -> BackendKind {
        self.flags.backend
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.height
    }

    #[inline]
    pub fn state(&self) -> DeviceState {
        self.state
    }

    #[inline]
    pub fn is_lost(&self) -> bool {
        self.state != DeviceState::Valid
    }

    /// Increments on every invalidation. Backend handles created in an older
    /// epoch are stale.
    #[inline]
    pub fn epoch(&self) -> u64 {
        self.epoch
    }

    /// The capability tier primitives are drawn with.
    pub fn capability_tier(&self) -> CapabilityTier {
        match self.backend {
            Backend::Direct3D(ref d3d) => self.system.capability_tier(d3d.as_ref()),
            _ => CapabilityTier::Modern,
        }
    }

    pub fn backbuffer(&self) -> Bitmap {
        self.backbuffer.clone()
    }

    /// Creates a bitmap whose pixels live on this display's device.
    pub fn create_bitmap(&mut self, width: u32, height: u32, format: PixelFormat) -> Result<Bitmap> {
        if width == 0 || height == 0 {
            return Err(Error::OutOfBounds);
        }

        if self.is_lost() {
            return Err(Error::DeviceLost);
        }

        let bitmap = Bitmap::video(self.link.clone(), width, height, format);
        self.bitmaps.retain(|v| v.upgrade().is_some());
        self.bitmaps.push(bitmap.downgrade());
        Ok(bitmap)
    }

    /// Releases the framebuffer and the device texture of `bitmap`. Other
    /// views of the same storage lose them as well.
    pub fn destroy_bitmap(&mut self, bitmap: Bitmap) {
        if !self.owns(&bitmap) || bitmap.is_backbuffer() {
            return;
        }

        let owner = bitmap.storage_id();
        let lost = self.is_lost();
        if let Backend::OpenGl(ref mut gl) = self.backend {
            let gl: Option<&mut dyn GlDevice> = if lost { None } else { Some(&mut **gl) };
            self.fbos.release(gl, owner);
        }

        let mut storage = bitmap::write(bitmap.storage());
        if let Residency::Video {
            ref mut texture,
            ref mut dirty,
            ..
        } = storage.residency
        {
            if let Some(v) = texture.take() {
                match self.backend {
                    Backend::OpenGl(ref mut gl) if !lost => {
                        discard(gl.delete_texture(v), "delete texture")
                    }
                    Backend::Direct3D(ref mut d3d) => {
                        discard(d3d.release_texture(v), "release texture")
                    }
                    _ => {}
                }
            }

            *dirty = true;
        }
    }

    /// Gives `target` a framebuffer of its own, never stolen by other
    /// targets, with a depth buffer if `depth` is set. OpenGL only.
    pub fn create_render_target(&mut self, target: &Bitmap, depth: bool) -> Result<u32> {
        if self.flags.backend != BackendKind::OpenGl {
            return Err(Error::BackendMismatch(BackendKind::OpenGl, self.flags.backend));
        }

        if !self.owns(target) || target.is_backbuffer() {
            return Err(Error::Unsupported("rendering into this bitmap".into()));
        }

        let texture = match self.ensure_texture(target)? {
            Some(v) => v,
            None => return Err(Error::ResourceExhausted("texture".into())),
        };

        let owner = target.storage_id();
        let (_, size) = target.texture_origin_and_size();
        match self.gl_parts() {
            Some((gl, fbos, _)) => {
                let depth = if depth { Some(size) } else { None };
                fbos.create_persistent(gl, owner, texture, depth)
                    .map_err(|err| Error::ResourceExhausted(format!("framebuffer ({})", err)))
            }
            None => Err(Error::BackendMismatch(BackendKind::OpenGl, self.flags.backend)),
        }
    }

    /// Keeps the framebuffer `target` was last drawn through out of the
    /// eviction rotation. False if it has none.
    pub fn persist_render_target(&mut self, target: &Bitmap) -> bool {
        self.fbos.persist(target.storage_id())
    }

    /// The framebuffer pool, for inspection.
    pub fn fbos(&self) -> &FboPool {
        &self.fbos
    }

    /// True if `bitmap` lives on this display's device.
    pub fn owns(&self, bitmap: &Bitmap) -> bool {
        bitmap.device() == Some(self.device_id())
    }

    #[inline]
    pub fn blender(&self) -> &Blender {
        &self.blender
    }

    pub fn set_blender(&mut self, blender: Blender) {
        self.blender = blender;
    }

    #[inline]
    pub fn render_state(&self) -> &RenderState {
        &self.render_state
    }

    pub fn set_render_state(&mut self, state: RenderState) {
        self.render_state = state;
        if !self.is_lost() {
            self.sync_render_state();
        }
    }

    #[inline]
    pub fn projection(&self) -> &Transform {
        &self.projection
    }

    #[inline]
    pub fn view(&self) -> &Transform {
        &self.view
    }

    pub fn set_projection(&mut self, projection: &Transform) {
        self.projection = *projection;
        self.sync_projview();
    }

    pub fn set_view(&mut self, view: &Transform) {
        self.view = *view;
        self.sync_projview();
    }

    /// `projection * view` of the backbuffer.
    pub fn projview(&self) -> Transform {
        self.projection * self.view
    }

    /// The transform used when drawing onto `target`. Other targets than the
    /// backbuffer get a pixel projection of their own size.
    pub fn target_projview(&self, target: &Bitmap) -> Transform {
        if target.is_backbuffer() {
            self.projview()
        } else {
            pixel_projection(target.width(), target.height()) * self.view
        }
    }

    /// The shader of the active program.
    pub fn active_shader(&self) -> Option<ShaderId> {
        self.active.as_ref().map(|v| v.shader())
    }

    /// The default shader of this display, once it has been created.
    #[inline]
    pub fn default_shader(&self) -> Option<ShaderId> {
        self.default_shader
    }

    pub fn register_invalidate_callback(&mut self, callback: DisplayCallback) -> CallbackId {
        self.invalidate.register(callback)
    }

    pub fn register_validate_callback(&mut self, callback: DisplayCallback) -> CallbackId {
        self.validate.register(callback)
    }

    pub fn unregister_invalidate_callback(&mut self, id: CallbackId) -> bool {
        self.invalidate.unregister(id)
    }

    pub fn unregister_validate_callback(&mut self, id: CallbackId) -> bool {
        self.validate.unregister(id)
    }

    pub fn notify_default_shader_created(&mut self, shader: ShaderId) {
        debug!("Display {} uses default shader {:?}.", self.id, shader);
        self.default_shader = Some(shader);
    }

    /// The reset completion signal, for threads waiting on this display.
    pub fn reset_signal(&self) -> Arc<ResetSignal> {
        self.reset.clone()
    }

    /// VALID -> LOST. Fires the invalidate callbacks in registration order.
    pub fn notify_device_lost(&mut self) {
        if self.state == DeviceState::Lost {
            return;
        }

        warn!("Device {:#x} of display {} is lost.", self.device_id(), self.id);
        self.state = DeviceState::Lost;
        self.link.set_lost(true);
        self.epoch += 1;
        self.active = None;
        self.fire_invalidate();
    }

    /// LOST -> RESETTING -> VALID. Direct3D devices are reset here; a failed
    /// reset leaves the display lost.
    pub fn notify_device_restored(&mut self) -> bool {
        if self.state == DeviceState::Valid {
            return true;
        }

        self.state = DeviceState::Resetting;
        if let Backend::Direct3D(ref mut d3d) = self.backend {
            if let Err(err) = d3d.reset() {
                warn!("Failed to reset device {:#x}: {}", d3d.device_id(), err);
                self.state = DeviceState::Lost;
                return false;
            }
        }

        self.state = DeviceState::Valid;
        self.link.set_lost(false);
        self.fire_validate();
        self.reset.complete();
        info!("Device {:#x} of display {} restored.", self.device_id(), self.id);
        true
    }

    /// Polls the cooperative level of a Direct3D device and follows it,
    /// resetting the device once that is possible. Other backends report
    /// their current state.
    pub fn check_device(&mut self) -> DeviceState {
        let level = match self.backend {
            Backend::Direct3D(ref mut d3d) => d3d.test_cooperative_level(),
            _ => return self.state,
        };

        match level {
            Cooperative::Ok => {
                if self.state != DeviceState::Valid {
                    self.notify_device_restored();
                }
            }
            Cooperative::Lost => self.notify_device_lost(),
            Cooperative::NotReset => {
                self.notify_device_lost();
                self.notify_device_restored();
            }
        }

        self.state
    }

    /// Blocks until a pending reset completes or the configured timeout
    /// elapses. Returns false on timeout.
    fn await_reset(&mut self) -> bool {
        if self.state == DeviceState::Valid {
            return true;
        }

        let generation = self.reset.generation();
        let timeout = self.system.settings().reset_timeout();

        if self.flags.backend != BackendKind::Direct3D {
            // The signal comes from whoever rebuilt the context, the display
            // itself still has to come back.
            return self.reset.wait_since(generation, timeout) && self.notify_device_restored();
        }

        let deadline = Instant::now() + timeout;
        loop {
            if self.check_device() == DeviceState::Valid {
                return true;
            }

            let now = Instant::now();
            if now >= deadline {
                return false;
            }

            let slice = (deadline - now).min(POLL_INTERVAL);
            if self.reset.wait_since(generation, slice) && self.state == DeviceState::Valid {
                return true;
            }
        }
    }

    /// Applies a new window size. A pending reset is waited for with the
    /// configured timeout; on timeout the resize goes ahead regardless.
    pub fn acknowledge_resize(&mut self, width: u32, height: u32) -> bool {
        if width == 0 || height == 0 {
            return false;
        }

        if !self.await_reset() {
            warn!(
                "Timed out waiting for device {:#x} to reset, resizing anyway.",
                self.device_id()
            );
        }

        self.width = width;
        self.height = height;
        self.projection = pixel_projection(width, height);
        self.backbuffer = Bitmap::backbuffer(self.link.clone(), width, height);
        self.sync_projview();

        if !self.is_lost() {
            let viewport = Viewport::new(0, 0, width, height);
            match self.backend {
                Backend::OpenGl(ref mut gl) => discard(gl.set_viewport(viewport), "set viewport"),
                Backend::Direct3D(ref mut d3d) => {
                    discard(d3d.set_viewport(viewport), "set viewport")
                }
                Backend::Software => {}
            }
        }

        true
    }

    /// Releases every device object this display cached. Shaders created by
    /// the caller have to be destroyed separately.
    pub fn destroy(mut self) {
        self.release_textures(true);
        self.fire_invalidate();
        self.release_fbos();
        self.release_decls();
        self.evict_default_shader();
        self.active = None;
        self.destroyed = true;
        self.system.device_list_changed();
        info!("Destroyed display {}.", self.id);
    }

    fn fire(&mut self, validate: bool) {
        let ids = if validate {
            self.validate.snapshot()
        } else {
            self.invalidate.snapshot()
        };

        for id in ids {
            let callback = if validate {
                self.validate.get(id)
            } else {
                self.invalidate.get(id)
            };

            if let Some(callback) = callback {
                (*callback)(self);
            }
        }
    }

    fn fire_invalidate(&mut self) {
        self.fire(false);
    }

    fn fire_validate(&mut self) {
        self.fire(true);
    }

    /// Drops the device textures of this display's bitmaps; the CPU copies
    /// are uploaded again on next use. With `delete`, OpenGL textures are
    /// deleted as well. Direct3D textures are always released.
    fn release_textures(&mut self, delete: bool) {
        self.bitmaps.retain(|v| v.upgrade().is_some());
        let bitmaps: Vec<Bitmap> = self.bitmaps.iter().filter_map(|v| v.upgrade()).collect();

        let lost = self.is_lost();
        for bitmap in bitmaps {
            let mut storage = bitmap::write(bitmap.storage());
            if let Residency::Video {
                ref mut texture,
                ref mut dirty,
                ..
            } = storage.residency
            {
                if let Some(v) = texture.take() {
                    match self.backend {
                        Backend::Direct3D(ref mut d3d) => {
                            discard(d3d.release_texture(v), "release texture")
                        }
                        Backend::OpenGl(ref mut gl) => {
                            if delete && !lost {
                                discard(gl.delete_texture(v), "delete texture");
                            }
                        }
                        Backend::Software => {}
                    }
                }

                *dirty = true;
            }
        }
    }

    fn release_fbos(&mut self) {
        let lost = self.is_lost();
        match self.backend {
            Backend::OpenGl(ref mut gl) => {
                let gl: Option<&mut dyn GlDevice> = if lost { None } else { Some(&mut **gl) };
                self.fbos.release_all(gl);
            }
            _ => self.fbos.release_all(None),
        }
    }

    fn release_decls(&mut self) {
        match self.backend {
            Backend::Direct3D(ref mut d3d) => {
                self.decls.release(Some(d3d.as_mut()));
                for (_, v) in self.prim_shaders.drain() {
                    discard(d3d.release_vertex_shader(v), "release vertex shader");
                }
            }
            _ => {
                self.decls.release(None);
                self.prim_shaders.clear();
            }
        }
    }

    /// Removes this device's default shader from the registry. It is built
    /// again on next need.
    fn evict_default_shader(&mut self) {
        let device = self.device_id();
        let cached = self.system.default_shaders().remove(&device);
        if let Some(cached) = cached {
            debug!("Evicting default shader of device {:#x}.", device);
            shader::lock(&cached).destroy(self);
        }

        self.default_shader = None;
    }

    pub(crate) fn gl(&mut self) -> Option<&mut dyn GlDevice> {
        match self.backend {
            Backend::OpenGl(ref mut gl) => Some(gl.as_mut()),
            _ => None,
        }
    }

    pub(crate) fn d3d(&mut self) -> Option<&mut dyn D3dDevice> {
        match self.backend {
            Backend::Direct3D(ref mut d3d) => Some(d3d.as_mut()),
            _ => None,
        }
    }

    /// The OpenGL device with the caches the primitive dispatcher needs.
    pub(crate) fn gl_parts(&mut self) -> Option<(&mut dyn GlDevice, &mut FboPool, &mut DeclCache)> {
        match self.backend {
            Backend::OpenGl(ref mut gl) => Some((gl.as_mut(), &mut self.fbos, &mut self.decls)),
            _ => None,
        }
    }

    /// The Direct3D device with its declaration and vertex shader caches.
    pub(crate) fn d3d_parts(
        &mut self,
    ) -> Option<(&mut dyn D3dDevice, &mut DeclCache, &mut HashMap<Option<u64>, u32>)> {
        match self.backend {
            Backend::Direct3D(ref mut d3d) => {
                Some((d3d.as_mut(), &mut self.decls, &mut self.prim_shaders))
            }
            _ => None,
        }
    }

    pub(crate) fn active(&self) -> Option<&ActiveProgram> {
        self.active.as_ref()
    }

    pub(crate) fn set_active(&mut self, program: ActiveProgram) {
        self.active = Some(program);
    }

    pub(crate) fn clear_active(&mut self) {
        self.active = None;
    }

    /// Restores the fixed pipeline.
    pub(crate) fn unbind_program(&mut self) {
        if let Some(gl) = self.gl() {
            discard(gl.use_program(0), "unbind program");
        }

        self.active = None;
    }

    /// Uploads the pixels of a video bitmap if its device copy is missing or
    /// out of date. Memory bitmaps, backbuffers and software displays have no
    /// texture.
    pub(crate) fn ensure_texture(&mut self, bitmap: &Bitmap) -> errors::Result<Option<u32>> {
        if self.is_lost() {
            bail!("{}", Error::DeviceLost);
        }

        let kind = self.flags.backend;
        if kind == BackendKind::Software {
            return Ok(None);
        }

        let device = self.device_id();
        let mut storage = bitmap::write(bitmap.storage());
        let (current, dirty) = match storage.residency {
            Residency::Video {
                ref link,
                texture,
                dirty,
            } => {
                if link.device() != device {
                    bail!("Bitmap belongs to device {:#x}.", link.device());
                }

                (texture, dirty)
            }
            _ => return Ok(None),
        };

        if current.is_some() && !dirty {
            return Ok(current);
        }

        let (w, h, format) = (storage.width, storage.height, storage.format);
        let upload = format.upload_format(kind);
        let pixels = pixel::convert(format, upload, &storage.pixels);

        let texture = match self.backend {
            Backend::OpenGl(ref mut gl) => match current {
                Some(v) => {
                    gl.upload_texture(v, w, h, upload, &pixels)?;
                    v
                }
                None => gl.create_texture(w, h, upload, &pixels)?,
            },
            Backend::Direct3D(ref mut d3d) => match current {
                Some(v) => {
                    d3d.upload_texture(v, upload, &pixels)?;
                    v
                }
                None => d3d.create_texture(w, h, upload, &pixels)?,
            },
            Backend::Software => return Ok(None),
        };

        if let Residency::Video {
            texture: ref mut slot,
            ref mut dirty,
            ..
        } = storage.residency
        {
            *slot = Some(texture);
            *dirty = false;
        }

        Ok(Some(texture))
    }

    /// Pushes the alpha test into the active program, if it declares the
    /// reserved variables.
    pub(crate) fn sync_render_state(&mut self) {
        let alpha = self.render_state.alpha_test;
        let values = [
            (names::ALPHA_TEST, UniformData::Bool(alpha.enabled)),
            (names::ALPHA_FUNCTION, UniformData::Int(alpha.func as i32)),
            (names::ALPHA_TEST_VALUE, UniformData::Float(alpha.value)),
        ];

        match self.active.clone() {
            Some(ActiveProgram::Glsl { ref varlocs, .. }) => {
                let locations = [varlocs.alpha_test, varlocs.alpha_func, varlocs.alpha_test_val];
                if let Some(gl) = self.gl() {
                    for (location, &(_, ref data)) in locations.iter().zip(values.iter()) {
                        if let Some(location) = *location {
                            discard(gl.set_uniform(location, data), "set alpha test");
                        }
                    }
                }
            }
            Some(ActiveProgram::Hlsl { effect, .. }) => {
                if let Some(d3d) = self.d3d() {
                    for &(name, ref data) in &values {
                        if let Err(err) = d3d.effect_set(effect, name, data) {
                            debug!("Failed to set {}: {}", name, err);
                        }
                    }
                }
            }
            _ => {}
        }
    }

    /// Loads `projview` into the active program, or the fixed pipeline.
    pub(crate) fn load_projview(&mut self, projview: &Transform) {
        if self.is_lost() {
            return;
        }

        let matrix = math::flatten(projview);
        match self.active.clone() {
            Some(ActiveProgram::Glsl { ref varlocs, .. }) => {
                if let (Some(location), Some(gl)) = (varlocs.projview_matrix, self.gl()) {
                    discard(
                        gl.set_uniform(location, &UniformData::Matrix(matrix)),
                        "set projview matrix",
                    );
                }
            }
            Some(ActiveProgram::Hlsl { effect, .. }) => {
                if let Some(d3d) = self.d3d() {
                    if let Err(err) =
                        d3d.effect_set(effect, names::PROJVIEW_MATRIX, &UniformData::Matrix(matrix))
                    {
                        debug!("Failed to set projview matrix: {}", err);
                    }
                }
            }
            Some(ActiveProgram::Software { .. }) => {}
            None => {
                let fixed = !self.flags.programmable;
                match self.backend {
                    Backend::OpenGl(ref mut gl) => {
                        if fixed {
                            discard(gl.set_projview(&matrix), "load projview matrix");
                        }
                    }
                    Backend::Direct3D(ref mut d3d) => {
                        discard(d3d.set_projview(&matrix), "load projview matrix")
                    }
                    Backend::Software => {}
                }
            }
        }
    }

    fn sync_projview(&mut self) {
        let projview = self.projview();
        self.load_projview(&projview);
    }
}

impl Drop for Display {
    fn drop(&mut self) {
        if !self.destroyed {
            debug!("Display {} dropped without being destroyed.", self.id);
        }
    }
}
