use std::fmt;

/// Index type of a `Handle`. Keeping it 32-bits allows for a single 64-bits
/// word per `Handle`.
pub type HandleIndex = u32;

/// A versioned slot reference. The `index` addresses a slot in some arena and
/// is recycled once the slot is freed; the `version` tells a stale `Handle`
/// apart from a fresh one that happens to reuse the same index.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Handle {
    index: HandleIndex,
    version: HandleIndex,
}

impl Handle {
    #[inline]
    pub fn new(index: HandleIndex, version: HandleIndex) -> Self {
        Handle { index, version }
    }

    /// Constructs a nil `Handle`, which never refers to a live slot.
    #[inline]
    pub fn nil() -> Self {
        Handle::default()
    }

    /// Returns true if this `Handle` has been initialized.
    #[inline]
    pub fn is_valid(self) -> bool {
        self.version > 0
    }

    #[inline]
    pub fn invalidate(&mut self) {
        *self = Handle::nil();
    }

    #[inline]
    pub fn index(self) -> HandleIndex {
        self.index
    }

    #[inline]
    pub fn version(self) -> HandleIndex {
        self.version
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Handle ({}, {})", self.index, self.version)
    }
}

/// Declares a type-safe wrapper around `Handle`.
#[macro_export]
macro_rules! impl_handle {
    ($name:ident) => {
        #[derive(Debug, Default, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
        pub struct $name($crate::utils::handle::Handle);

        impl From<$name> for $crate::utils::handle::Handle {
            fn from(handle: $name) -> Self {
                handle.0
            }
        }

        impl From<$crate::utils::handle::Handle> for $name {
            fn from(handle: $crate::utils::handle::Handle) -> Self {
                $name(handle)
            }
        }

        impl ::std::borrow::Borrow<$crate::utils::handle::Handle> for $name {
            fn borrow(&self) -> &$crate::utils::handle::Handle {
                &self.0
            }
        }

        impl $name {
            #[inline]
            pub fn index(self) -> $crate::utils::handle::HandleIndex {
                self.0.index()
            }

            #[inline]
            pub fn version(self) -> $crate::utils::handle::HandleIndex {
                self.0.version()
            }
        }

        impl ::std::fmt::Display for $name {
            fn fmt(&self, f: &mut ::std::fmt::Formatter) -> ::std::fmt::Result {
                write!(
                    f,
                    "{} ({}, {})",
                    stringify!($name),
                    self.0.index(),
                    self.0.version()
                )
            }
        }
    };
}

#[cfg(test)]
mod test {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn basic() {
        let mut h2 = Handle::new(2, 4);
        assert_eq!(h2.index(), 2);
        assert_eq!(h2.version(), 4);
        assert!(h2.is_valid());

        h2.invalidate();
        assert_eq!(h2, Handle::nil());
        assert!(!h2.is_valid());
    }

    #[test]
    fn container() {
        let mut set = HashSet::new();
        assert!(set.insert(Handle::new(1, 1)));
        assert!(!set.insert(Handle::new(1, 1)));
        assert!(set.insert(Handle::new(1, 2)));
        assert!(set.insert(Handle::new(2, 2)));
        assert_eq!(set.len(), 3);
    }

    impl_handle!(TypeSafeHandle);

    #[test]
    fn type_safe_handle() {
        let h1 = TypeSafeHandle::default();
        assert_eq!(h1, TypeSafeHandle::from(Handle::default()));

        let h2 = TypeSafeHandle::from(Handle::new(3, 1));
        assert_eq!(h2.index(), 3);
        assert_eq!(format!("{}", h2), "TypeSafeHandle (3, 1)");
    }
}
