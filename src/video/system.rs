//! Process-wide video state: the legacy-detection cache, the legacy vertex
//! scratch buffer and the default-shader registry. Each sits behind its own
//! mutex and is reached through the `System` every display keeps a clone of.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use super::backends::{D3dDevice, DeviceId};
use super::errors::*;
use super::settings::{LegacyDetection, VideoSettings};
use super::shader::Shader;

/// Whether a device can consume custom vertex layouts and shaders.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum CapabilityTier {
    Modern,
    Legacy,
}

pub(crate) type DefaultShaders = HashMap<DeviceId, Arc<Mutex<Shader>>>;

struct SystemState {
    settings: VideoSettings,
    alive: AtomicBool,
    generation: AtomicU64,
    legacy: Mutex<HashMap<DeviceId, (u64, CapabilityTier)>>,
    scratch: Mutex<Vec<u8>>,
    default_shaders: Mutex<DefaultShaders>,
}

fn lock<T>(m: &Mutex<T>) -> MutexGuard<T> {
    match m.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

/// The explicit process-wide state of the video layer.
#[derive(Clone)]
pub struct System(Arc<SystemState>);

impl System {
    pub fn new(settings: VideoSettings) -> Result<Self> {
        settings.validate()?;
        info!("Initializing video system with {:?}.", settings);

        Ok(System(Arc::new(SystemState {
            settings,
            alive: AtomicBool::new(true),
            generation: AtomicU64::new(0),
            legacy: Mutex::new(HashMap::new()),
            scratch: Mutex::new(Vec::new()),
            default_shaders: Mutex::new(HashMap::new()),
        })))
    }

    #[inline]
    pub fn settings(&self) -> &VideoSettings {
        &self.0.settings
    }

    #[inline]
    pub fn is_alive(&self) -> bool {
        self.0.alive.load(Ordering::Acquire)
    }

    /// Invalidates every cached per-device answer. Called whenever a device
    /// is created, destroyed or reset, since handle values may be reused.
    pub fn device_list_changed(&self) {
        self.0.generation.fetch_add(1, Ordering::AcqRel);
    }

    /// Classifies `device`, querying its caps on first use after any change
    /// of the device list.
    pub fn capability_tier(&self, device: &dyn D3dDevice) -> CapabilityTier {
        match self.0.settings.legacy_detection {
            LegacyDetection::ForceLegacy => return CapabilityTier::Legacy,
            LegacyDetection::ForceModern => return CapabilityTier::Modern,
            LegacyDetection::Default => {}
        }

        let generation = self.0.generation.load(Ordering::Acquire);
        let id = device.device_id();

        let mut cache = lock(&self.0.legacy);
        if let Some(&(g, tier)) = cache.get(&id) {
            if g == generation {
                return tier;
            }
        }

        let tier = if device.caps().pixel_shader < (2, 0) {
            CapabilityTier::Legacy
        } else {
            CapabilityTier::Modern
        };

        debug!("Device {:#x} classified as {:?}.", id, tier);
        cache.insert(id, (generation, tier));
        tier
    }

    /// The legacy vertex conversion buffer. Hold the guard only for the
    /// conversion and the draw that consumes it.
    pub(crate) fn scratch(&self) -> MutexGuard<Vec<u8>> {
        lock(&self.0.scratch)
    }

    pub(crate) fn default_shaders(&self) -> MutexGuard<DefaultShaders> {
        lock(&self.0.default_shaders)
    }

    /// Tears down cached state. Cached default shaders are dropped without
    /// touching their devices; displays should be destroyed first.
    pub fn shutdown(&self) {
        if !self.0.alive.swap(false, Ordering::AcqRel) {
            return;
        }

        let leaked = {
            let mut shaders = self.default_shaders();
            let n = shaders.len();
            shaders.clear();
            n
        };

        if leaked > 0 {
            warn!("{} default shaders were still alive at shutdown.", leaked);
        }

        lock(&self.0.legacy).clear();
        *lock(&self.0.scratch) = Vec::new();
        info!("Video system shut down.");
    }
}

impl Drop for SystemState {
    fn drop(&mut self) {
        if self.alive.load(Ordering::Acquire) {
            debug!("Video system dropped without an explicit shutdown.");
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::video::backends::headless::HeadlessD3d;

    #[test]
    fn tier_cache_is_per_device_and_generation() {
        let system = System::new(VideoSettings::default()).unwrap();

        let legacy = HeadlessD3d::new(1).with_pixel_shader((1, 4));
        let modern = HeadlessD3d::new(2).with_pixel_shader((3, 0));
        assert_eq!(system.capability_tier(&legacy), CapabilityTier::Legacy);
        assert_eq!(system.capability_tier(&modern), CapabilityTier::Modern);

        // A different device reusing handle 1 is only seen after the device
        // list changed.
        let reused = HeadlessD3d::new(1).with_pixel_shader((3, 0));
        assert_eq!(system.capability_tier(&reused), CapabilityTier::Legacy);
        system.device_list_changed();
        assert_eq!(system.capability_tier(&reused), CapabilityTier::Modern);
    }

    #[test]
    fn overrides() {
        let mut settings = VideoSettings::default();
        settings.legacy_detection = LegacyDetection::ForceLegacy;
        let system = System::new(settings).unwrap();

        let modern = HeadlessD3d::new(3).with_pixel_shader((3, 0));
        assert_eq!(system.capability_tier(&modern), CapabilityTier::Legacy);
    }

    #[test]
    fn shutdown_is_idempotent() {
        let system = System::new(VideoSettings::default()).unwrap();
        system.scratch().extend_from_slice(&[1, 2, 3]);
        system.shutdown();
        assert!(!system.is_alive());
        assert!(system.scratch().is_empty());
        system.shutdown();
    }
}
