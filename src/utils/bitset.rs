//! Fixed-capacity bit sets for dataflow analysis.
//!
//! Dominator sets, dominance frontiers, gen/kill sets and live-variable sets are all sets of
//! small dense integers (block indices or liveness indices). [`BitSet`] stores them 64 per word
//! and exposes the in-place set operations the fixpoint solvers need, each reporting whether
//! the receiver changed so callers can detect convergence without a second comparison.
//!
//! ```rust
//! use cilaot::utils::BitSet;
//!
//! let mut live = BitSet::new(130);
//! live.insert(3);
//! live.insert(129);
//!
//! let mut other = BitSet::new(130);
//! other.insert(64);
//! assert!(live.union_with(&other));
//! assert_eq!(live.iter().collect::<Vec<_>>(), vec![3, 64, 129]);
//! ```

use std::fmt;

/// A set of integers in `0..capacity`, one bit per element.
#[derive(Clone, PartialEq, Eq, Hash, Default)]
pub struct BitSet {
    words: Vec<u64>,
    capacity: usize,
}

impl BitSet {
    /// Creates an empty set able to hold `0..capacity`.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        BitSet {
            words: vec![0; capacity.div_ceil(64)],
            capacity,
        }
    }

    /// Creates a set containing every element of `0..capacity`.
    #[must_use]
    pub fn full(capacity: usize) -> Self {
        let mut set = BitSet {
            words: vec![u64::MAX; capacity.div_ceil(64)],
            capacity,
        };
        set.mask_tail();
        set
    }

    /// Creates a set of the given capacity holding `indices`.
    ///
    /// # Panics
    ///
    /// Panics if any index is not below `capacity`.
    #[must_use]
    pub fn from_indices(capacity: usize, indices: impl IntoIterator<Item = usize>) -> Self {
        let mut set = BitSet::new(capacity);
        for index in indices {
            set.insert(index);
        }
        set
    }

    /// The number of representable elements.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns `true` if no element is present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.words.iter().all(|w| *w == 0)
    }

    /// Adds `index`, returning `true` if it was not yet present.
    ///
    /// # Panics
    ///
    /// Panics if `index >= capacity`.
    pub fn insert(&mut self, index: usize) -> bool {
        assert!(index < self.capacity, "bit {index} out of range {}", self.capacity);
        let (word, bit) = (index / 64, 1u64 << (index % 64));
        let absent = self.words[word] & bit == 0;
        self.words[word] |= bit;
        absent
    }

    /// Removes `index`, returning `true` if it was present.
    pub fn remove(&mut self, index: usize) -> bool {
        if index >= self.capacity {
            return false;
        }
        let (word, bit) = (index / 64, 1u64 << (index % 64));
        let present = self.words[word] & bit != 0;
        self.words[word] &= !bit;
        present
    }

    /// Returns `true` if `index` is present. Out-of-range indices are never present.
    #[must_use]
    pub fn contains(&self, index: usize) -> bool {
        index < self.capacity && self.words[index / 64] & (1u64 << (index % 64)) != 0
    }

    /// Number of elements present.
    #[must_use]
    pub fn count(&self) -> usize {
        self.words.iter().map(|w| w.count_ones() as usize).sum()
    }

    /// Removes every element.
    pub fn clear(&mut self) {
        self.words.iter_mut().for_each(|w| *w = 0);
    }

    /// `self = self ∪ other`; returns `true` if `self` grew.
    pub fn union_with(&mut self, other: &BitSet) -> bool {
        self.combine(other, |a, b| a | b)
    }

    /// `self = self ∩ other`; returns `true` if `self` shrank.
    pub fn intersect_with(&mut self, other: &BitSet) -> bool {
        self.combine(other, |a, b| a & b)
    }

    /// `self = self − other`; returns `true` if `self` shrank.
    pub fn difference_with(&mut self, other: &BitSet) -> bool {
        self.combine(other, |a, b| a & !b)
    }

    /// Returns `true` if every element of `self` is in `other`.
    #[must_use]
    pub fn is_subset(&self, other: &BitSet) -> bool {
        self.words
            .iter()
            .enumerate()
            .all(|(i, w)| w & !other.words.get(i).copied().unwrap_or(0) == 0)
    }

    /// Iterates the present elements in ascending order.
    #[must_use]
    pub fn iter(&self) -> Iter<'_> {
        Iter {
            words: &self.words,
            word_index: 0,
            current: self.words.first().copied().unwrap_or(0),
        }
    }

    fn combine(&mut self, other: &BitSet, op: impl Fn(u64, u64) -> u64) -> bool {
        let mut changed = false;
        for (i, word) in self.words.iter_mut().enumerate() {
            let updated = op(*word, other.words.get(i).copied().unwrap_or(0));
            changed |= updated != *word;
            *word = updated;
        }
        changed
    }

    fn mask_tail(&mut self) {
        let rem = self.capacity % 64;
        if rem != 0 {
            if let Some(last) = self.words.last_mut() {
                *last &= (1u64 << rem) - 1;
            }
        }
    }
}

impl fmt::Debug for BitSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

impl<'a> IntoIterator for &'a BitSet {
    type Item = usize;
    type IntoIter = Iter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// Ascending iterator over the elements of a [`BitSet`].
#[derive(Clone)]
pub struct Iter<'a> {
    words: &'a [u64],
    word_index: usize,
    current: u64,
}

impl Iterator for Iter<'_> {
    type Item = usize;

    fn next(&mut self) -> Option<usize> {
        loop {
            if self.current != 0 {
                let bit = self.current.trailing_zeros() as usize;
                self.current &= self.current - 1;
                return Some(self.word_index * 64 + bit);
            }
            self.word_index += 1;
            self.current = *self.words.get(self.word_index)?;
        }
    }
}
