//! Env bitmask
//!
//! Provides [`EnvMask`], an unbounded bitset over env bit positions.

use smallvec::SmallVec;
use std::fmt::{self, Debug, Formatter};

const WORD_BITS: usize = 64;

/// Set of env bit positions
///
/// Trailing zero words are always trimmed so that derived equality and hashing
/// agree with set equality.
#[derive(Clone, Default, PartialEq, Eq, Hash)]
pub struct EnvMask {
    words: SmallVec<[u64; 2]>,
}

impl EnvMask {
    /// Create an empty mask
    #[inline]
    #[must_use]
    pub fn empty() -> Self {
        Self::default()
    }

    /// Create a mask with exactly one bit set
    #[must_use]
    pub fn bit(index: usize) -> Self {
        let mut mask = Self::empty();
        mask.set(index);
        mask
    }

    /// Set a bit
    pub fn set(&mut self, index: usize) {
        let word = index / WORD_BITS;
        if self.words.len() <= word {
            self.words.resize(word + 1, 0);
        }
        self.words[word] |= 1u64 << (index % WORD_BITS);
    }

    /// Clear a bit
    pub fn clear(&mut self, index: usize) {
        let word = index / WORD_BITS;
        if let Some(w) = self.words.get_mut(word) {
            *w &= !(1u64 << (index % WORD_BITS));
        }
        self.trim();
    }

    /// Check whether a bit is set
    #[inline]
    #[must_use]
    pub fn contains(&self, index: usize) -> bool {
        self.words
            .get(index / WORD_BITS)
            .is_some_and(|w| w & (1u64 << (index % WORD_BITS)) != 0)
    }

    /// Add all bits of `other`
    pub fn union_with(&mut self, other: &EnvMask) {
        if self.words.len() < other.words.len() {
            self.words.resize(other.words.len(), 0);
        }
        for (w, o) in self.words.iter_mut().zip(other.words.iter()) {
            *w |= *o;
        }
    }

    /// True if every bit of `other` is also set here
    #[must_use]
    pub fn is_superset(&self, other: &EnvMask) -> bool {
        other.words.iter().enumerate().all(|(i, o)| {
            let w = self.words.get(i).copied().unwrap_or(0);
            w & o == *o
        })
    }

    /// True if `other` is a superset and the masks differ
    #[inline]
    #[must_use]
    pub fn is_strict_subset(&self, other: &EnvMask) -> bool {
        other.is_superset(self) && self != other
    }

    /// True if no bit is set
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.words.is_empty()
    }

    /// Number of bits set
    #[must_use]
    pub fn count(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// Iterate over set bit positions in ascending order
    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        self.words.iter().enumerate().flat_map(|(i, &w)| {
            (0..WORD_BITS).filter(move |b| w & (1u64 << b) != 0).map(move |b| i * WORD_BITS + b)
        })
    }

    fn trim(&mut self) {
        while self.words.last() == Some(&0) {
            self.words.pop();
        }
    }
}

impl Debug for EnvMask {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

impl FromIterator<usize> for EnvMask {
    fn from_iter<I: IntoIterator<Item = usize>>(iter: I) -> Self {
        let mut mask = Self::empty();
        for index in iter {
            mask.set(index);
        }
        mask
    }
}
