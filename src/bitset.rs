//! Fixed-width component signatures.
//!
//! A [`Signature`] is a bit vector indexed by [`ComponentId`]. It lives inline
//! (no heap), so a structural change can copy the source signature, flip a few
//! bits and probe the archetype table before anything is allocated.

use std::hash::{Hash, Hasher};

use rustc_hash::FxHasher;

use crate::registry::ComponentId;

/// Hard upper bound on distinct component types (signature width in bits)
pub const MAX_COMPONENTS: usize = 256;

const WORDS: usize = MAX_COMPONENTS / 64;

/// Set of component ids
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct Signature {
    words: [u64; WORDS],
}

impl Signature {
    /// The empty signature
    pub const EMPTY: Signature = Signature { words: [0; WORDS] };

    /// Build a signature from a list of ids
    pub fn from_ids(ids: &[ComponentId]) -> Self {
        let mut signature = Self::EMPTY;
        for &id in ids {
            signature.set(id);
        }
        signature
    }

    #[inline]
    fn split(id: ComponentId) -> (usize, u64) {
        let index = id.index();
        debug_assert!(index < MAX_COMPONENTS, "component id {index} out of range");
        (index / 64, 1u64 << (index % 64))
    }

    /// Set the bit for `id`.
    #[inline]
    pub fn set(&mut self, id: ComponentId) {
        let (word, mask) = Self::split(id);
        self.words[word] |= mask;
    }

    /// Clear the bit for `id`.
    #[inline]
    pub fn clear(&mut self, id: ComponentId) {
        let (word, mask) = Self::split(id);
        self.words[word] &= !mask;
    }

    /// Check if the bit for `id` is set.
    #[inline]
    pub fn contains(&self, id: ComponentId) -> bool {
        let (word, mask) = Self::split(id);
        self.words[word] & mask != 0
    }

    /// Copy of `self` with `id` set
    #[inline]
    pub fn with(mut self, id: ComponentId) -> Self {
        self.set(id);
        self
    }

    /// Copy of `self` with `id` cleared
    #[inline]
    pub fn without(mut self, id: ComponentId) -> Self {
        self.clear(id);
        self
    }

    pub fn union(&self, other: &Self) -> Self {
        let mut out = *self;
        for (a, b) in out.words.iter_mut().zip(other.words.iter()) {
            *a |= *b;
        }
        out
    }

    pub fn difference(&self, other: &Self) -> Self {
        let mut out = *self;
        for (a, b) in out.words.iter_mut().zip(other.words.iter()) {
            *a &= !*b;
        }
        out
    }

    pub fn intersection(&self, other: &Self) -> Self {
        let mut out = *self;
        for (a, b) in out.words.iter_mut().zip(other.words.iter()) {
            *a &= *b;
        }
        out
    }

    /// Every id in `other` is also in `self`
    #[inline]
    pub fn is_superset(&self, other: &Self) -> bool {
        self.words
            .iter()
            .zip(other.words.iter())
            .all(|(a, b)| a & b == *b)
    }

    /// No id is shared with `other`
    #[inline]
    pub fn is_disjoint(&self, other: &Self) -> bool {
        self.words
            .iter()
            .zip(other.words.iter())
            .all(|(a, b)| a & b == 0)
    }

    /// Returns true if this set shares any set bits with `other`.
    #[inline]
    pub fn intersects(&self, other: &Self) -> bool {
        !self.is_disjoint(other)
    }

    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|w| *w == 0)
    }

    /// Number of ids in the set
    pub fn len(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// Hash used as the archetype table key
    pub fn hash_value(&self) -> u64 {
        let mut hasher = FxHasher::default();
        self.words.hash(&mut hasher);
        hasher.finish()
    }

    /// Iterate set ids in ascending order
    pub fn ones(&self) -> OnesIter<'_> {
        OnesIter {
            signature: self,
            word_idx: 0,
            current_word: self.words[0],
        }
    }
}

impl std::fmt::Debug for Signature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_set().entries(self.ones().map(|id| id.index())).finish()
    }
}

impl FromIterator<ComponentId> for Signature {
    fn from_iter<I: IntoIterator<Item = ComponentId>>(iter: I) -> Self {
        let mut signature = Signature::EMPTY;
        for id in iter {
            signature.set(id);
        }
        signature
    }
}

pub struct OnesIter<'a> {
    signature: &'a Signature,
    word_idx: usize,
    current_word: u64,
}

impl Iterator for OnesIter<'_> {
    type Item = ComponentId;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.current_word != 0 {
                let trailing = self.current_word.trailing_zeros();
                self.current_word &= self.current_word - 1;
                return Some(ComponentId::new(self.word_idx * 64 + trailing as usize));
            }

            self.word_idx += 1;
            if self.word_idx >= WORDS {
                return None;
            }
            self.current_word = self.signature.words[self.word_idx];
        }
    }
}
