//! HLSL effects on a Direct3D display.

use std::sync::{Arc, Mutex, MutexGuard};

use crate::errors;
use crate::math;

use super::super::backends::{DeviceId, EffectBuild, UniformData};
use super::super::display::{ActiveProgram, Display};
use super::super::lifecycle::CallbackId;
use super::{names, source, ShaderBackend, ShaderId, ShaderStage, Sources, UniformOp};

type EffectSlot = Arc<Mutex<Option<u32>>>;

/// The lost and reset subscriptions of one effect.
type Subscriptions = Arc<Mutex<Option<(CallbackId, CallbackId)>>>;

fn lock<T>(slot: &Mutex<T>) -> MutexGuard<T> {
    match slot.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

fn unsubscribe(display: &mut Display, subscriptions: &Mutex<Option<(CallbackId, CallbackId)>>) {
    let ids = lock(subscriptions).take();
    if let Some((lost, reset)) = ids {
        display.unregister_invalidate_callback(lost);
        display.unregister_validate_callback(reset);
    }
}

fn discard(result: errors::Result<()>, what: &str) {
    if let Err(err) = result {
        warn!("Failed to {}: {}", what, err);
    }
}

/// Both stages compiled into a single effect. The display's lost and reset
/// notifications only see the effect through a weak reference; once the
/// shader is gone they unsubscribe themselves on the next notification.
pub struct HlslShader {
    sm3: bool,
    device: DeviceId,
    effect: EffectSlot,
    subscriptions: Subscriptions,
}

impl HlslShader {
    pub fn new(display: &mut Display, sm3: bool) -> Self {
        let effect: EffectSlot = Arc::new(Mutex::new(None));
        let subscriptions: Subscriptions = Arc::new(Mutex::new(None));

        let (slot, subs) = (Arc::downgrade(&effect), subscriptions.clone());
        let lost = display.register_invalidate_callback(Arc::new(move |d: &mut Display| {
            let slot = match slot.upgrade() {
                Some(v) => v,
                None => return unsubscribe(d, &subs),
            };

            let effect = *lock(&slot);
            if let (Some(effect), Some(d3d)) = (effect, d.d3d()) {
                discard(d3d.effect_on_lost(effect), "release effect resources");
            }
        }));

        let (slot, subs) = (Arc::downgrade(&effect), subscriptions.clone());
        let reset = display.register_validate_callback(Arc::new(move |d: &mut Display| {
            let slot = match slot.upgrade() {
                Some(v) => v,
                None => return unsubscribe(d, &subs),
            };

            let effect = *lock(&slot);
            if let (Some(effect), Some(d3d)) = (effect, d.d3d()) {
                discard(d3d.effect_on_reset(effect), "restore effect resources");
            }
        }));

        *lock(&subscriptions) = Some((lost, reset));
        HlslShader {
            sm3,
            device: display.device_id(),
            effect,
            subscriptions,
        }
    }

    /// The compiled effect.
    pub fn effect(&self) -> Option<u32> {
        *lock(&self.effect)
    }

    fn drop_effect(&mut self, display: &mut Display, effect: u32) {
        if let Some(&ActiveProgram::Hlsl { effect: active, .. }) = display.active() {
            if active == effect {
                display.clear_active();
            }
        }

        if display.device_id() != self.device {
            return;
        }

        if let Some(d3d) = display.d3d() {
            discard(d3d.release_effect(effect), "release effect");
        }
    }
}

impl ShaderBackend for HlslShader {
    fn attach(&mut self, display: &mut Display, _: ShaderStage, sources: &Sources) -> Result<(), String> {
        let vertex = sources.vertex.as_ref().map(|v| v.as_str()).unwrap_or("");
        let pixel = sources.pixel.as_ref().map(|v| v.as_str()).unwrap_or("");

        let source = match source::effect_source(vertex, pixel, self.sm3) {
            Some(v) => v,
            None => {
                let previous = lock(&self.effect).take();
                if let Some(v) = previous {
                    self.drop_effect(display, v);
                }

                return Ok(());
            }
        };

        let build = match display.d3d() {
            Some(d3d) => d3d.create_effect(&source).map_err(|e| e.to_string())?,
            None => return Err("Not a Direct3D display.".to_owned()),
        };

        match build {
            EffectBuild::Created(effect) => {
                let previous = lock(&self.effect).replace(effect);
                if let Some(v) = previous {
                    self.drop_effect(display, v);
                }

                Ok(())
            }
            EffectBuild::Failed(log) => Err(log),
        }
    }

    fn build(&mut self, _: &mut Display, _: &Sources) -> Result<(), String> {
        if self.effect().is_some() {
            Ok(())
        } else {
            Err("No effect has been compiled.".to_owned())
        }
    }

    fn bind(&mut self, display: &mut Display, id: ShaderId, sync_matrices: bool) -> bool {
        let effect = match self.effect() {
            Some(v) => v,
            None => return false,
        };

        if sync_matrices {
            let projview = UniformData::Matrix(math::flatten(&display.projview()));
            let synced = match display.d3d() {
                Some(d3d) => d3d
                    .effect_set(effect, names::PROJVIEW_MATRIX, &projview)
                    .unwrap_or(false),
                None => false,
            };

            if !synced {
                display.clear_active();
                return false;
            }
        }

        display.set_active(ActiveProgram::Hlsl { shader: id, effect });
        true
    }

    fn unbind(&mut self, display: &mut Display) {
        display.clear_active();
    }

    fn set(&mut self, display: &mut Display, _: ShaderId, op: UniformOp) -> bool {
        let effect = match self.effect() {
            Some(v) => v,
            None => return false,
        };

        let result = match op {
            UniformOp::SetSampler {
                ref name,
                ref bitmap,
                unit,
            } => {
                let texture = match display.ensure_texture(bitmap) {
                    Ok(v) => v,
                    Err(err) => {
                        warn!("Failed to prepare sampler {}: {}", name, err);
                        return false;
                    }
                };

                match display.d3d() {
                    Some(d3d) => {
                        let set = d3d.effect_set_texture(effect, name, texture);
                        discard(d3d.set_texture(unit, texture), "bind sampler texture");
                        set
                    }
                    None => return false,
                }
            }
            _ => match display.d3d() {
                Some(d3d) => d3d.effect_set(effect, op.name(), &op.data()),
                None => return false,
            },
        };

        match result {
            Ok(true) => true,
            Ok(false) => {
                warn!("No uniform variable '{}' in shader program", op.name());
                false
            }
            Err(err) => {
                warn!("{} ({})", op.name(), err);
                false
            }
        }
    }

    fn release(&mut self, display: &mut Display) {
        unsubscribe(display, &self.subscriptions);

        let effect = lock(&self.effect).take();
        if let Some(v) = effect {
            self.drop_effect(display, v);
        }
    }
}
