//! Device-loss state machine primitives: the per-display state, the ordered
//! callback lists owners subscribe to, and the bounded reset wait.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Condvar, Mutex, MutexGuard};
use std::time::{Duration, Instant};

use crate::utils::HandlePool;

use super::backends::DeviceId;
use super::display::Display;

/// VALID -> LOST -> RESETTING -> VALID.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum DeviceState {
    Valid,
    Lost,
    Resetting,
}

impl_handle!(CallbackId);

pub type DisplayCallback = Arc<dyn Fn(&mut Display) + Send + Sync>;

/// An ordered subscriber list. Firing walks a snapshot of the registered ids
/// and looks every id up again right before calling it, so a callback may
/// unregister itself or any other subscriber while the list is being fired.
#[derive(Default)]
pub struct CallbackList {
    ids: HandlePool,
    entries: Vec<(CallbackId, DisplayCallback)>,
}

impl CallbackList {
    pub fn new() -> Self {
        CallbackList::default()
    }

    pub fn register(&mut self, callback: DisplayCallback) -> CallbackId {
        let id = CallbackId::from(self.ids.create());
        self.entries.push((id, callback));
        id
    }

    pub fn unregister(&mut self, id: CallbackId) -> bool {
        if !self.ids.free(id) {
            return false;
        }

        self.entries.retain(|&(v, _)| v != id);
        true
    }

    pub fn snapshot(&self) -> Vec<CallbackId> {
        self.entries.iter().map(|&(id, _)| id).collect()
    }

    pub fn get(&self, id: CallbackId) -> Option<DisplayCallback> {
        self.entries
            .iter()
            .find(|&&(v, _)| v == id)
            .map(|(_, cb)| cb.clone())
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl fmt::Debug for CallbackList {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_list().entries(self.snapshot()).finish()
    }
}

/// The part of a display's lifecycle that bitmaps and other resources keep a
/// reference to, so they can check for device loss without the display.
#[derive(Debug)]
pub struct DeviceLink {
    pub(crate) device: DeviceId,
    lost: AtomicBool,
}

impl DeviceLink {
    pub fn new(device: DeviceId) -> Arc<Self> {
        Arc::new(DeviceLink {
            device,
            lost: AtomicBool::new(false),
        })
    }

    #[inline]
    pub fn device(&self) -> DeviceId {
        self.device
    }

    #[inline]
    pub fn is_lost(&self) -> bool {
        self.lost.load(Ordering::Acquire)
    }

    pub(crate) fn set_lost(&self, lost: bool) {
        self.lost.store(lost, Ordering::Release);
    }
}

/// Completion counter for device resets, waited on with a bounded timeout.
#[derive(Debug, Default)]
pub struct ResetSignal {
    completed: Mutex<u64>,
    cond: Condvar,
}

impl ResetSignal {
    pub fn new() -> Arc<Self> {
        Arc::new(ResetSignal::default())
    }

    fn lock(&self) -> MutexGuard<u64> {
        match self.completed.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    /// The number of resets completed so far.
    pub fn generation(&self) -> u64 {
        *self.lock()
    }

    pub fn complete(&self) {
        *self.lock() += 1;
        self.cond.notify_all();
    }

    /// Blocks until a reset completes after `generation`, or `timeout`
    /// elapses. Returns false on timeout.
    pub fn wait_since(&self, generation: u64, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut completed = self.lock();

        while *completed <= generation {
            let now = Instant::now();
            if now >= deadline {
                return false;
            }

            completed = match self.cond.wait_timeout(completed, deadline - now) {
                Ok((guard, _)) => guard,
                Err(poisoned) => poisoned.into_inner().0,
            };
        }

        true
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::thread;

    fn noop() -> DisplayCallback {
        Arc::new(|_: &mut Display| {})
    }

    #[test]
    fn ordered_registration() {
        let mut list = CallbackList::new();
        let a = list.register(noop());
        let b = list.register(noop());
        let c = list.register(noop());
        assert_eq!(list.snapshot(), vec![a, b, c]);

        assert!(list.unregister(b));
        assert!(!list.unregister(b));
        assert_eq!(list.snapshot(), vec![a, c]);
        assert!(list.get(b).is_none());

        let d = list.register(noop());
        assert_ne!(d, b);
        assert_eq!(list.snapshot(), vec![a, c, d]);
    }

    #[test]
    fn reset_wait_times_out() {
        let signal = ResetSignal::new();
        let generation = signal.generation();
        assert!(!signal.wait_since(generation, Duration::from_millis(10)));
    }

    #[test]
    fn reset_wait_wakes() {
        let signal = ResetSignal::new();
        let generation = signal.generation();

        let remote = signal.clone();
        let handle = thread::spawn(move || {
            thread::sleep(Duration::from_millis(5));
            remote.complete();
        });

        assert!(signal.wait_since(generation, Duration::from_secs(5)));
        handle.join().unwrap();
        assert_eq!(signal.generation(), generation + 1);
    }
}
