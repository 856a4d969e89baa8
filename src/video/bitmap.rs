//! Pixel storage resident either in CPU memory or on a display's device.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard, Weak};

use crate::math::Color;

use super::backends::DeviceId;
use super::lifecycle::DeviceLink;
use super::pixel::PixelFormat;
use super::shader::ShaderId;

static BITMAP_IDS: AtomicU64 = AtomicU64::new(1);

pub(crate) enum Residency {
    Memory,
    /// `texture` mirrors `pixels` unless `dirty`. A stale texture is
    /// forgotten on invalidation and re-created on next use.
    Video {
        link: Arc<DeviceLink>,
        texture: Option<u32>,
        dirty: bool,
    },
    Backbuffer {
        link: Arc<DeviceLink>,
    },
}

pub(crate) struct Storage {
    pub id: u64,
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    /// CPU copy, authoritative for memory bitmaps and a shadow otherwise.
    pub pixels: Vec<u8>,
    pub residency: Residency,
    pub locked: bool,
}

impl Storage {
    fn new(width: u32, height: u32, format: PixelFormat, residency: Residency) -> Self {
        Storage {
            id: BITMAP_IDS.fetch_add(1, Ordering::Relaxed),
            width,
            height,
            format,
            pixels: vec![0; (width * height) as usize * format.bytes_per_pixel()],
            residency,
            locked: false,
        }
    }

    #[inline]
    fn offset(&self, x: u32, y: u32) -> usize {
        (y * self.width + x) as usize * self.format.bytes_per_pixel()
    }

    pub fn get(&self, x: u32, y: u32) -> Color {
        let o = self.offset(x, y);
        self.format.read(&self.pixels[o..])
    }

    pub fn put(&mut self, x: u32, y: u32, color: Color) {
        let o = self.offset(x, y);
        let format = self.format;
        format.write(color, &mut self.pixels[o..]);
        self.touch();
    }

    /// Marks the device copy out of date.
    pub fn touch(&mut self) {
        if let Residency::Video { ref mut dirty, .. } = self.residency {
            *dirty = true;
        }
    }

    pub fn link(&self) -> Option<&Arc<DeviceLink>> {
        match self.residency {
            Residency::Memory => None,
            Residency::Video { ref link, .. } | Residency::Backbuffer { ref link } => Some(link),
        }
    }
}

pub(crate) type SharedStorage = Arc<RwLock<Storage>>;
pub(crate) type WeakStorage = Weak<RwLock<Storage>>;

pub(crate) fn read(storage: &RwLock<Storage>) -> RwLockReadGuard<Storage> {
    match storage.read() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

pub(crate) fn write(storage: &RwLock<Storage>) -> RwLockWriteGuard<Storage> {
    match storage.write() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

struct BitmapInner {
    id: u64,
    storage: SharedStorage,
    /// Region within the root storage.
    x: u32,
    y: u32,
    w: u32,
    h: u32,
    parent: Option<Bitmap>,
    shader: Mutex<Option<ShaderId>>,
}

/// A reference-counted bitmap. Clones refer to the same bitmap; sub-bitmaps
/// share the storage of their root.
#[derive(Clone)]
pub struct Bitmap(Arc<BitmapInner>);

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum LockMode {
    ReadOnly,
    WriteOnly,
    ReadWrite,
}

impl Bitmap {
    fn from_storage(storage: Storage) -> Self {
        let (w, h) = (storage.width, storage.height);
        Bitmap(Arc::new(BitmapInner {
            id: storage.id,
            storage: Arc::new(RwLock::new(storage)),
            x: 0,
            y: 0,
            w,
            h,
            parent: None,
            shader: Mutex::new(None),
        }))
    }

    /// Creates a CPU-resident bitmap cleared to transparent black.
    pub fn memory(width: u32, height: u32, format: PixelFormat) -> Self {
        Bitmap::from_storage(Storage::new(width, height, format, Residency::Memory))
    }

    pub(crate) fn video(link: Arc<DeviceLink>, width: u32, height: u32, format: PixelFormat) -> Self {
        let residency = Residency::Video {
            link,
            texture: None,
            dirty: true,
        };

        Bitmap::from_storage(Storage::new(width, height, format, residency))
    }

    pub(crate) fn backbuffer(link: Arc<DeviceLink>, width: u32, height: u32) -> Self {
        let residency = Residency::Backbuffer { link };
        Bitmap::from_storage(Storage::new(width, height, PixelFormat::Argb8888, residency))
    }

    /// Creates a view into a rectangle of this bitmap, clipped to its bounds.
    /// Returns `None` if nothing of the rectangle remains.
    pub fn sub_bitmap(&self, x: i32, y: i32, w: u32, h: u32) -> Option<Bitmap> {
        let x0 = x.max(0) as u32;
        let y0 = y.max(0) as u32;
        let x1 = (i64::from(x) + i64::from(w)).min(i64::from(self.0.w)).max(0) as u32;
        let y1 = (i64::from(y) + i64::from(h)).min(i64::from(self.0.h)).max(0) as u32;

        if x0 >= x1 || y0 >= y1 {
            return None;
        }

        Some(Bitmap(Arc::new(BitmapInner {
            id: BITMAP_IDS.fetch_add(1, Ordering::Relaxed),
            storage: self.0.storage.clone(),
            x: self.0.x + x0,
            y: self.0.y + y0,
            w: x1 - x0,
            h: y1 - y0,
            parent: Some(self.clone()),
            shader: Mutex::new(None),
        })))
    }

    #[inline]
    pub fn id(&self) -> u64 {
        self.0.id
    }

    #[inline]
    pub fn width(&self) -> u32 {
        self.0.w
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.0.h
    }

    pub fn format(&self) -> PixelFormat {
        read(&self.0.storage).format
    }

    pub fn parent(&self) -> Option<&Bitmap> {
        self.0.parent.as_ref()
    }

    #[inline]
    pub fn is_sub_bitmap(&self) -> bool {
        self.0.parent.is_some()
    }

    pub fn is_memory(&self) -> bool {
        match read(&self.0.storage).residency {
            Residency::Memory => true,
            _ => false,
        }
    }

    pub fn is_backbuffer(&self) -> bool {
        match read(&self.0.storage).residency {
            Residency::Backbuffer { .. } => true,
            _ => false,
        }
    }

    pub fn is_locked(&self) -> bool {
        read(&self.0.storage).locked
    }

    /// True if both bitmaps are views of the same root storage.
    pub fn shares_storage(&self, other: &Bitmap) -> bool {
        Arc::ptr_eq(&self.0.storage, &other.0.storage)
    }

    /// The offset of this bitmap inside its root texture, and the root size.
    pub fn texture_origin_and_size(&self) -> ((u32, u32), (u32, u32)) {
        let storage = read(&self.0.storage);
        ((self.0.x, self.0.y), (storage.width, storage.height))
    }

    /// The device texture currently holding this bitmap's pixels.
    pub fn texture_handle(&self) -> Option<u32> {
        match read(&self.0.storage).residency {
            Residency::Video { texture, .. } => texture,
            _ => None,
        }
    }

    /// The shader used when drawing onto this bitmap.
    pub fn shader(&self) -> Option<ShaderId> {
        match self.0.shader.lock() {
            Ok(v) => *v,
            Err(poisoned) => *poisoned.into_inner(),
        }
    }

    pub(crate) fn set_shader(&self, shader: Option<ShaderId>) {
        match self.0.shader.lock() {
            Ok(mut v) => *v = shader,
            Err(poisoned) => *poisoned.into_inner() = shader,
        }
    }

    pub(crate) fn storage(&self) -> &SharedStorage {
        &self.0.storage
    }

    /// Identifies the root storage shared by every view of it.
    pub fn storage_id(&self) -> u64 {
        read(&self.0.storage).id
    }

    /// The device owning the storage, if it is not a memory bitmap.
    pub(crate) fn device(&self) -> Option<DeviceId> {
        read(&self.0.storage).link().map(|l| l.device())
    }

    pub(crate) fn downgrade(&self) -> WeakBitmap {
        WeakBitmap(Arc::downgrade(&self.0))
    }

    fn device_lost(&self) -> bool {
        read(&self.0.storage).link().map(|l| l.is_lost()).unwrap_or(false)
    }

    pub fn get_pixel(&self, x: u32, y: u32) -> Option<Color> {
        if x >= self.0.w || y >= self.0.h {
            return None;
        }

        Some(read(&self.0.storage).get(self.0.x + x, self.0.y + y))
    }

    /// Writes one pixel. Memory bitmaps only; video bitmaps go through `lock`.
    pub fn put_pixel(&self, x: u32, y: u32, color: Color) -> bool {
        if x >= self.0.w || y >= self.0.h || !self.is_memory() {
            return false;
        }

        write(&self.0.storage).put(self.0.x + x, self.0.y + y, color);
        true
    }

    /// Locks a region, or the whole bitmap, for CPU access. Fails if the
    /// bitmap is already locked, the region is out of bounds, or the owning
    /// display's device is lost.
    pub fn lock(&self, region: Option<(u32, u32, u32, u32)>, mode: LockMode) -> Option<BitmapLock> {
        let (x, y, w, h) = region.unwrap_or((0, 0, self.0.w, self.0.h));
        if w == 0 || h == 0 || x + w > self.0.w || y + h > self.0.h {
            return None;
        }

        if self.device_lost() {
            return None;
        }

        let mut storage = write(&self.0.storage);
        if storage.locked {
            return None;
        }

        storage.locked = true;
        Some(BitmapLock {
            bitmap: self.clone(),
            x: self.0.x + x,
            y: self.0.y + y,
            w,
            h,
            mode,
        })
    }
}

impl fmt::Debug for Bitmap {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Bitmap")
            .field("id", &self.0.id)
            .field("region", &(self.0.x, self.0.y, self.0.w, self.0.h))
            .field("sub", &self.is_sub_bitmap())
            .finish()
    }
}

impl PartialEq for Bitmap {
    fn eq(&self, other: &Bitmap) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

#[derive(Clone)]
pub(crate) struct WeakBitmap(Weak<BitmapInner>);

impl WeakBitmap {
    pub fn upgrade(&self) -> Option<Bitmap> {
        self.0.upgrade().map(Bitmap)
    }
}

/// A locked region of a bitmap. Unlocks when dropped; writable locks mark the
/// device copy out of date so it is uploaded again on next use.
pub struct BitmapLock {
    bitmap: Bitmap,
    x: u32,
    y: u32,
    w: u32,
    h: u32,
    mode: LockMode,
}

impl BitmapLock {
    #[inline]
    pub fn width(&self) -> u32 {
        self.w
    }

    #[inline]
    pub fn height(&self) -> u32 {
        self.h
    }

    #[inline]
    pub fn mode(&self) -> LockMode {
        self.mode
    }

    pub fn get_pixel(&self, x: u32, y: u32) -> Option<Color> {
        if x >= self.w || y >= self.h || self.mode == LockMode::WriteOnly {
            return None;
        }

        Some(read(self.bitmap.storage()).get(self.x + x, self.y + y))
    }

    pub fn put_pixel(&mut self, x: u32, y: u32, color: Color) -> bool {
        if x >= self.w || y >= self.h || self.mode == LockMode::ReadOnly {
            return false;
        }

        write(self.bitmap.storage()).put(self.x + x, self.y + y, color);
        true
    }
}

impl Drop for BitmapLock {
    fn drop(&mut self) {
        let mut storage = write(self.bitmap.storage());
        storage.locked = false;
        if self.mode != LockMode::ReadOnly {
            storage.touch();
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn sub_bitmaps_share_root_storage() {
        let root = Bitmap::memory(4, 4, PixelFormat::Abgr8888);
        let sub = root.sub_bitmap(1, 1, 8, 2).unwrap();
        assert_eq!((sub.width(), sub.height()), (3, 2));
        assert_eq!(sub.texture_origin_and_size(), ((1, 1), (4, 4)));
        assert!(sub.shares_storage(&root));
        assert_eq!(sub.parent(), Some(&root));

        assert!(sub.put_pixel(0, 0, Color::red()));
        assert_eq!(root.get_pixel(1, 1), Some(Color::red()));

        let nested = sub.sub_bitmap(1, 1, 1, 1).unwrap();
        assert_eq!(nested.texture_origin_and_size(), ((2, 2), (4, 4)));
        assert!(root.sub_bitmap(4, 0, 1, 1).is_none());
    }

    #[test]
    fn lock_is_exclusive() {
        let bitmap = Bitmap::memory(2, 2, PixelFormat::Argb8888);
        {
            let mut lock = bitmap.lock(None, LockMode::WriteOnly).unwrap();
            assert!(bitmap.is_locked());
            assert!(bitmap.lock(Some((0, 0, 1, 1)), LockMode::ReadOnly).is_none());
            assert!(lock.put_pixel(1, 1, Color::blue()));
            assert_eq!(lock.get_pixel(1, 1), None);
        }

        assert!(!bitmap.is_locked());
        assert_eq!(bitmap.get_pixel(1, 1), Some(Color::blue()));
        assert!(bitmap.lock(Some((1, 1, 2, 1)), LockMode::ReadOnly).is_none());
    }

    #[test]
    fn lock_fails_on_lost_device() {
        let link = DeviceLink::new(7);
        let bitmap = Bitmap::video(link.clone(), 2, 2, PixelFormat::Abgr8888);
        assert!(bitmap.lock(None, LockMode::ReadWrite).is_some());

        link.set_lost(true);
        assert!(bitmap.lock(None, LockMode::ReadWrite).is_none());
    }
}
