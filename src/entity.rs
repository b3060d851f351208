//! Densely numbered indices for the actions-graph arena.
//!
//! The actions graph is a DAG with heavily shared subexpressions, so nodes
//! are addressed by a small `Copy` index into a backing `Vec` rather than by
//! pointer. This is the same idiom `cranelift-entity` uses for IR references
//! (`Inst`, `Value`, `Block`, ...): a newtyped `usize` plus a `PrimaryMap`
//! that owns the storage and hands out fresh indices.

use std::marker::PhantomData;
use std::ops::{Index, IndexMut};

/// A type that can be used as a dense index into a [`PrimaryMap`].
pub trait EntityRef: Copy + Eq {
    fn new(index: usize) -> Self;
    fn index(self) -> usize;
}

/// Defines a `Copy` newtype wrapping a `u32` index and implements [`EntityRef`]
/// for it. Mirrors `cranelift_entity::entity_impl!`.
macro_rules! entity_ref {
    ($name:ident) => {
        #[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
        pub struct $name(u32);

        impl EntityRef for $name {
            fn new(index: usize) -> Self {
                debug_assert!(index < u32::MAX as usize);
                $name(index as u32)
            }

            fn index(self) -> usize {
                self.0 as usize
            }
        }
    };
}

entity_ref!(NodeId);

/// A `K -> V` map for densely indexed keys, doubling as the allocator for
/// fresh keys via [`PrimaryMap::push`].
#[derive(Debug, Clone)]
pub struct PrimaryMap<K: EntityRef, V> {
    elems: Vec<V>,
    unused: PhantomData<K>,
}

impl<K: EntityRef, V> PrimaryMap<K, V> {
    pub fn new() -> Self {
        Self { elems: Vec::new(), unused: PhantomData }
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self { elems: Vec::with_capacity(capacity), unused: PhantomData }
    }

    /// Appends `value` and returns the key freshly assigned to it.
    pub fn push(&mut self, value: V) -> K {
        let key = K::new(self.elems.len());
        self.elems.push(value);
        key
    }

    pub fn len(&self) -> usize {
        self.elems.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elems.is_empty()
    }

    pub fn get(&self, key: K) -> Option<&V> {
        self.elems.get(key.index())
    }

    pub fn get_mut(&mut self, key: K) -> Option<&mut V> {
        self.elems.get_mut(key.index())
    }

    pub fn keys(&self) -> impl Iterator<Item = K> + '_ {
        (0..self.elems.len()).map(K::new)
    }

    pub fn iter(&self) -> impl Iterator<Item = (K, &V)> {
        self.elems.iter().enumerate().map(|(i, v)| (K::new(i), v))
    }
}

impl<K: EntityRef, V> Default for PrimaryMap<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: EntityRef, V> Index<K> for PrimaryMap<K, V> {
    type Output = V;

    fn index(&self, key: K) -> &V {
        &self.elems[key.index()]
    }
}

impl<K: EntityRef, V> IndexMut<K> for PrimaryMap<K, V> {
    fn index_mut(&mut self, key: K) -> &mut V {
        &mut self.elems[key.index()]
    }
}

/// A `K -> V` map that behaves as if every key already maps to a default
/// value, growing lazily on write. Used for the per-pass bookkeeping the
/// rewriter attaches to nodes (`is_compilable_in_isolation`, etc.) without
/// threading extra fields through the arena itself.
#[derive(Debug, Clone)]
pub struct SecondaryMap<K: EntityRef, V: Clone + Default> {
    elems: Vec<V>,
    default: V,
    unused: PhantomData<K>,
}

impl<K: EntityRef, V: Clone + Default> SecondaryMap<K, V> {
    pub fn new() -> Self {
        Self { elems: Vec::new(), default: V::default(), unused: PhantomData }
    }

    fn resize(&mut self, n: usize) {
        self.elems.resize(n, self.default.clone());
    }
}

impl<K: EntityRef, V: Clone + Default> Default for SecondaryMap<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: EntityRef, V: Clone + Default> Index<K> for SecondaryMap<K, V> {
    type Output = V;

    fn index(&self, key: K) -> &V {
        self.elems.get(key.index()).unwrap_or(&self.default)
    }
}

impl<K: EntityRef, V: Clone + Default> IndexMut<K> for SecondaryMap<K, V> {
    fn index_mut(&mut self, key: K) -> &mut V {
        let i = key.index();
        if i >= self.elems.len() {
            self.resize(i + 1);
        }
        &mut self.elems[i]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    entity_ref!(TestId);

    #[test]
    fn primary_map_assigns_increasing_keys() {
        let mut m: PrimaryMap<TestId, &str> = PrimaryMap::new();
        let a = m.push("a");
        let b = m.push("b");
        assert_eq!(a.index(), 0);
        assert_eq!(b.index(), 1);
        assert_eq!(m[a], "a");
        assert_eq!(m[b], "b");
    }

    #[test]
    fn secondary_map_grows_and_defaults() {
        let mut m: SecondaryMap<TestId, bool> = SecondaryMap::new();
        let k = TestId::new(3);
        m[k] = true;
        assert!(m[k]);
    }
}
