use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::marker::PhantomData;

/// Hashes anything hashable into a 64-bits value.
pub fn hash64<T: Hash + ?Sized>(v: &T) -> u64 {
    let mut s = DefaultHasher::new();
    v.hash(&mut s);
    s.finish()
}

/// A pre-computed hash of some `T`, used as a cheap map key for names that are
/// looked up on every draw (uniform and attribute names).
#[derive(Debug)]
pub struct HashValue<T: ?Sized>(u64, PhantomData<T>);

impl<T: ?Sized> Clone for HashValue<T> {
    fn clone(&self) -> Self {
        HashValue(self.0, PhantomData)
    }
}

impl<T: ?Sized> Copy for HashValue<T> {}

impl<T: ?Sized> PartialEq for HashValue<T> {
    fn eq(&self, other: &Self) -> bool {
        self.0 == other.0
    }
}

impl<T: ?Sized> Eq for HashValue<T> {}

impl<T: ?Sized> Hash for HashValue<T> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.hash(state);
    }
}

impl<T: AsRef<str>> From<T> for HashValue<str> {
    fn from(v: T) -> Self {
        HashValue(hash64(v.as_ref()), PhantomData)
    }
}

impl<T: AsRef<str>> PartialEq<T> for HashValue<str> {
    fn eq(&self, other: &T) -> bool {
        self.0 == hash64(other.as_ref())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn hash_str() {
        let hash = HashValue::<str>::from("al_projview_matrix");
        assert_eq!(hash, "al_projview_matrix");
        assert!(hash != "al_tex_matrix");
    }

    #[test]
    fn collections() {
        let mut set = HashSet::<HashValue<str>>::new();
        set.insert("al_tex".into());
        set.insert(String::from("al_tex").into());
        assert_eq!(set.len(), 1);
        assert!(set.contains(&"al_tex".into()));
    }
}
