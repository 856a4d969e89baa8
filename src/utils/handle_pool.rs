use std::borrow::Borrow;
use std::cmp::Reverse;
use std::collections::BinaryHeap;

use super::handle::{Handle, HandleIndex};

/// `HandlePool` hands out versioned handles and recycles freed indices,
/// lowest first. An odd version marks a live slot.
#[derive(Debug, Default)]
pub struct HandlePool {
    versions: Vec<HandleIndex>,
    frees: BinaryHeap<Reverse<HandleIndex>>,
}

impl HandlePool {
    pub fn new() -> HandlePool {
        HandlePool::default()
    }

    /// Creates a unused `Handle`.
    pub fn create(&mut self) -> Handle {
        if let Some(Reverse(index)) = self.frees.pop() {
            let version = &mut self.versions[index as usize];
            *version += 1;
            Handle::new(index, *version)
        } else {
            self.versions.push(1);
            Handle::new(self.versions.len() as HandleIndex - 1, 1)
        }
    }

    /// Returns true if this `Handle` was created by this pool and has not been
    /// freed yet.
    pub fn contains<T>(&self, handle: T) -> bool
    where
        T: Borrow<Handle>,
    {
        let handle = handle.borrow();
        match self.versions.get(handle.index() as usize) {
            Some(&v) => v & 0x1 == 1 && v == handle.version(),
            None => false,
        }
    }

    /// Recycles the `Handle` index and marks its version as dead.
    pub fn free<T>(&mut self, handle: T) -> bool
    where
        T: Borrow<Handle>,
    {
        let handle = *handle.borrow();
        if !self.contains(handle) {
            return false;
        }

        self.versions[handle.index() as usize] += 1;
        self.frees.push(Reverse(handle.index()));
        true
    }

    /// Returns the number of alive handles.
    #[inline]
    pub fn len(&self) -> usize {
        self.versions.len() - self.frees.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Iterates alive handles in index order.
    pub fn iter<'a>(&'a self) -> impl Iterator<Item = Handle> + 'a {
        self.versions
            .iter()
            .enumerate()
            .filter(|&(_, &v)| v & 0x1 == 1)
            .map(|(i, &v)| Handle::new(i as HandleIndex, v))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn create_and_free() {
        let mut pool = HandlePool::new();
        let h1 = pool.create();
        let h2 = pool.create();
        assert!(pool.contains(h1));
        assert!(pool.contains(h2));
        assert_eq!(pool.len(), 2);

        assert!(pool.free(h1));
        assert!(!pool.free(h1));
        assert!(!pool.contains(h1));
        assert_eq!(pool.len(), 1);
    }

    #[test]
    fn index_reuse() {
        let mut pool = HandlePool::new();
        let v: Vec<_> = (0..4).map(|_| pool.create()).collect();

        pool.free(v[2]);
        pool.free(v[1]);

        let h = pool.create();
        assert_eq!(h.index(), 1);
        assert_eq!(h.version(), 3);
        assert!(!pool.contains(v[1]));

        let alive: Vec<_> = pool.iter().map(|h| h.index()).collect();
        assert_eq!(alive, vec![0, 1, 3]);
    }
}
