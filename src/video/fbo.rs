//! A small fixed pool of OpenGL framebuffer objects used to render into
//! textures. Each entry is associated with at most one root bitmap storage;
//! transient entries are stolen least-recently-used when the pool runs out.

use crate::errors;

use super::backends::GlDevice;
use super::errors::Error;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum FboState {
    Unused,
    /// Associated with a bitmap, but may be taken over by another one.
    Transient,
    /// Exclusively owned by one bitmap until released.
    Persistent,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FboInfo {
    pub state: FboState,
    pub fbo: u32,
    /// Storage id of the root bitmap rendered into.
    pub owner: Option<u64>,
    pub last_use: u64,
    pub depth_buffer: Option<u32>,
}

impl FboInfo {
    fn unused() -> Self {
        FboInfo {
            state: FboState::Unused,
            fbo: 0,
            owner: None,
            last_use: 0,
            depth_buffer: None,
        }
    }
}

/// Result of binding a render target.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum Binding {
    Backbuffer,
    Framebuffer(u32),
    /// The driver rejected the attachment; draw in software instead.
    Incomplete,
}

#[derive(Debug)]
pub struct FboPool {
    entries: Vec<FboInfo>,
    clock: u64,
    bound: Option<u32>,
}

fn discard(result: errors::Result<()>, what: &str) {
    if let Err(err) = result {
        warn!("Failed to {}: {}", what, err);
    }
}

fn delete(gl: &mut dyn GlDevice, info: &FboInfo) {
    if info.fbo != 0 {
        discard(gl.delete_framebuffer(info.fbo), "delete framebuffer");
    }

    if let Some(v) = info.depth_buffer {
        discard(gl.delete_depth_buffer(v), "delete depth buffer");
    }
}

impl FboPool {
    pub fn new(capacity: usize) -> Self {
        FboPool {
            entries: (0..capacity).map(|_| FboInfo::unused()).collect(),
            clock: 0,
            bound: None,
        }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.entries.len()
    }

    /// The framebuffer currently bound, `None` for the backbuffer.
    #[inline]
    pub fn bound(&self) -> Option<u32> {
        self.bound
    }

    pub fn entries(&self) -> &[FboInfo] {
        &self.entries
    }

    /// The entry rendering into `owner`.
    pub fn find(&self, owner: u64) -> Option<&FboInfo> {
        self.entries.iter().find(|v| v.owner == Some(owner))
    }

    fn tick(&mut self) -> u64 {
        self.clock += 1;
        self.clock
    }

    pub fn bind_backbuffer(&mut self, gl: &mut dyn GlDevice) -> errors::Result<Binding> {
        if self.bound.is_some() {
            gl.bind_framebuffer(0)?;
            self.bound = None;
        }

        Ok(Binding::Backbuffer)
    }

    fn bind(&mut self, gl: &mut dyn GlDevice, fbo: u32) -> errors::Result<()> {
        if self.bound != Some(fbo) {
            gl.bind_framebuffer(fbo)?;
            self.bound = Some(fbo);
        }

        Ok(())
    }

    /// Picks the first unused entry, or evicts the least recently used
    /// transient one.
    fn acquire(&mut self, gl: &mut dyn GlDevice) -> errors::Result<usize> {
        if let Some(i) = self.entries.iter().position(|v| v.state == FboState::Unused) {
            return Ok(i);
        }

        let victim = self
            .entries
            .iter()
            .enumerate()
            .filter(|(_, v)| v.state == FboState::Transient)
            .min_by_key(|(_, v)| v.last_use)
            .map(|(i, _)| i);

        match victim {
            Some(i) => {
                debug!(
                    "Evicting framebuffer {} of storage {:?}.",
                    self.entries[i].fbo, self.entries[i].owner
                );

                // The framebuffer object itself is reused by the new owner.
                let entry = &mut self.entries[i];
                if let Some(v) = entry.depth_buffer.take() {
                    discard(gl.delete_depth_buffer(v), "delete depth buffer");
                }

                entry.owner = None;
                Ok(i)
            }
            None => {
                let err = Error::ResourceExhausted("a framebuffer object".into());
                bail!("{}", err)
            }
        }
    }

    /// Binds a framebuffer rendering into `texture`, the texture of the root
    /// storage `owner`.
    pub fn bind_target(
        &mut self,
        gl: &mut dyn GlDevice,
        owner: u64,
        texture: u32,
    ) -> errors::Result<Binding> {
        let now = self.tick();

        if let Some(i) = self.entries.iter().position(|v| v.owner == Some(owner)) {
            self.entries[i].last_use = now;
            let fbo = self.entries[i].fbo;
            self.bind(gl, fbo)?;
            return Ok(Binding::Framebuffer(fbo));
        }

        let slot = self.acquire(gl)?;
        let fbo = match self.entries[slot].fbo {
            0 => gl.create_framebuffer()?,
            v => v,
        };

        let attached = self.bind(gl, fbo).and_then(|_| gl.attach_color_texture(texture));
        let complete = match attached {
            Ok(v) => v,
            Err(err) => {
                self.drop_slot(gl, slot, fbo);
                return Err(err);
            }
        };

        if !complete {
            warn!("Framebuffer {} is incomplete, drawing in software.", fbo);
            self.drop_slot(gl, slot, fbo);
            return Ok(Binding::Incomplete);
        }

        let entry = &mut self.entries[slot];
        entry.state = FboState::Transient;
        entry.fbo = fbo;
        entry.owner = Some(owner);
        entry.last_use = now;
        Ok(Binding::Framebuffer(fbo))
    }

    fn drop_slot(&mut self, gl: &mut dyn GlDevice, slot: usize, fbo: u32) {
        self.bound = None;
        discard(gl.bind_framebuffer(0), "bind backbuffer");
        discard(gl.delete_framebuffer(fbo), "delete framebuffer");
        self.entries[slot] = FboInfo::unused();
    }

    /// Creates a framebuffer exclusively owned by `owner`, optionally with a
    /// depth buffer. The previously bound framebuffer stays bound.
    pub fn create_persistent(
        &mut self,
        gl: &mut dyn GlDevice,
        owner: u64,
        texture: u32,
        depth: Option<(u32, u32)>,
    ) -> errors::Result<u32> {
        self.release(Some(&mut *gl), owner);

        let slot = self.acquire(gl)?;
        let fbo = match self.entries[slot].fbo {
            0 => gl.create_framebuffer()?,
            v => v,
        };

        let mut info = FboInfo {
            state: FboState::Persistent,
            fbo,
            owner: Some(owner),
            last_use: self.tick(),
            depth_buffer: None,
        };

        let attached = gl.bind_framebuffer(fbo).and_then(|_| gl.attach_color_texture(texture));
        let complete = match attached {
            Ok(v) => v,
            Err(err) => {
                self.entries[slot] = FboInfo::unused();
                self.rebind(gl);
                delete(gl, &info);
                return Err(err);
            }
        };

        if complete {
            if let Some((w, h)) = depth {
                match gl.create_depth_buffer(w, h) {
                    Ok(v) => {
                        info.depth_buffer = Some(v);
                        discard(gl.attach_depth_buffer(v), "attach depth buffer");
                    }
                    Err(err) => warn!("Failed to create depth buffer: {}", err),
                }
            }
        }

        if self.bound == Some(fbo) {
            self.bound = None;
        }

        self.rebind(gl);
        if !complete {
            self.entries[slot] = FboInfo::unused();
            delete(gl, &info);
            bail!("Framebuffer for storage {} is incomplete.", owner);
        }

        self.entries[slot] = info;
        Ok(fbo)
    }

    fn rebind(&mut self, gl: &mut dyn GlDevice) {
        let fbo = self.bound.unwrap_or(0);
        discard(gl.bind_framebuffer(fbo), "restore framebuffer");
    }

    /// Marks the transient entry of `owner` persistent, so it is never
    /// stolen. Returns false if `owner` has no transient entry.
    pub fn persist(&mut self, owner: u64) -> bool {
        match self
            .entries
            .iter_mut()
            .find(|v| v.owner == Some(owner) && v.state == FboState::Transient)
        {
            Some(entry) => {
                entry.state = FboState::Persistent;
                true
            }
            None => false,
        }
    }

    /// Frees the framebuffer of `owner`. Without `gl` the handles are
    /// forgotten.
    pub fn release(&mut self, gl: Option<&mut dyn GlDevice>, owner: u64) {
        let released: Vec<_> = self
            .entries
            .iter_mut()
            .filter(|v| v.owner == Some(owner))
            .map(|v| ::std::mem::replace(v, FboInfo::unused()))
            .collect();

        self.drop_entries(gl, released);
    }

    /// Frees every framebuffer. Without `gl` the handles are forgotten.
    pub fn release_all(&mut self, gl: Option<&mut dyn GlDevice>) {
        let released: Vec<_> = self
            .entries
            .iter_mut()
            .filter(|v| v.state != FboState::Unused || v.fbo != 0)
            .map(|v| ::std::mem::replace(v, FboInfo::unused()))
            .collect();

        self.drop_entries(gl, released);
    }

    fn drop_entries(&mut self, gl: Option<&mut dyn GlDevice>, released: Vec<FboInfo>) {
        let unbind = released.iter().any(|v| Some(v.fbo) == self.bound);
        if unbind {
            self.bound = None;
        }

        match gl {
            Some(gl) => {
                if unbind {
                    discard(gl.bind_framebuffer(0), "bind backbuffer");
                }

                for info in &released {
                    delete(gl, info);
                }
            }
            None => {
                if !released.is_empty() {
                    debug!("Forgetting {} framebuffers.", released.len());
                }
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::video::backends::headless::HeadlessGl;
    use crate::video::pixel::PixelFormat;

    fn texture(gl: &mut HeadlessGl) -> u32 {
        gl.create_texture(1, 1, PixelFormat::Abgr8888, &[0; 4]).unwrap()
    }

    #[test]
    fn reuse_and_evict_least_recently_used() {
        let mut gl = HeadlessGl::new(1);
        let recorder = gl.recorder();
        let mut pool = FboPool::new(2);
        let (t1, t2, t3) = (texture(&mut gl), texture(&mut gl), texture(&mut gl));

        let a = pool.bind_target(&mut gl, 1, t1).unwrap();
        let b = pool.bind_target(&mut gl, 2, t2).unwrap();
        assert_ne!(a, b);
        assert_eq!(pool.bind_target(&mut gl, 1, t1).unwrap(), a);

        // 2 is now the least recently used entry.
        let c = pool.bind_target(&mut gl, 3, t3).unwrap();
        assert_eq!(c, b);
        assert!(pool.find(2).is_none());
        assert!(pool.find(1).is_some());
        assert_eq!(recorder.live_framebuffers(), 2);
        assert_eq!(pool.bound(), match c {
            Binding::Framebuffer(v) => Some(v),
            _ => None,
        });

        pool.release_all(Some(&mut gl));
        assert_eq!(recorder.live_framebuffers(), 0);
        assert_eq!(pool.bound(), None);
    }

    #[test]
    fn persistent_entries_are_never_stolen() {
        let mut gl = HeadlessGl::new(1);
        let recorder = gl.recorder();
        let mut pool = FboPool::new(2);
        let t: Vec<u32> = (0..5).map(|_| texture(&mut gl)).collect();

        pool.bind_target(&mut gl, 1, t[0]).unwrap();
        assert!(pool.persist(1));
        assert!(!pool.persist(1));
        assert_eq!(pool.find(1).map(|v| v.state), Some(FboState::Persistent));

        pool.bind_target(&mut gl, 2, t[1]).unwrap();
        pool.bind_target(&mut gl, 3, t[2]).unwrap();
        assert!(pool.find(1).is_some());
        assert!(pool.find(2).is_none());

        let fbo = pool.create_persistent(&mut gl, 4, t[3], Some((8, 8))).unwrap();
        assert_eq!(pool.find(4).map(|v| v.fbo), Some(fbo));
        assert!(pool.find(4).and_then(|v| v.depth_buffer).is_some());
        assert!(pool.find(3).is_none());

        assert!(pool.bind_target(&mut gl, 5, t[4]).is_err());

        pool.release(Some(&mut gl), 4);
        assert!(pool.bind_target(&mut gl, 5, t[4]).is_ok());

        pool.release_all(Some(&mut gl));
        assert_eq!(recorder.live_framebuffers(), 0);
        assert_eq!(recorder.live_depth_buffers(), 0);
    }

    #[test]
    fn incomplete_framebuffers_are_dropped() {
        let mut gl = HeadlessGl::new(1);
        let recorder = gl.recorder();
        recorder.set_incomplete_framebuffers(true);
        let t = texture(&mut gl);

        let mut pool = FboPool::new(2);
        assert_eq!(pool.bind_target(&mut gl, 1, t).unwrap(), Binding::Incomplete);
        assert_eq!(recorder.live_framebuffers(), 0);
        assert!(pool.find(1).is_none());
        assert_eq!(pool.bound(), None);
    }

    #[test]
    fn unknown_textures_are_rejected() {
        let mut gl = HeadlessGl::new(1);
        let recorder = gl.recorder();
        let mut pool = FboPool::new(2);

        assert!(pool.bind_target(&mut gl, 1, 99).is_err());
        assert!(pool.find(1).is_none());
        assert_eq!(pool.bound(), None);
        assert_eq!(recorder.live_framebuffers(), 0);
    }
}
