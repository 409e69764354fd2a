use std::collections::HashMap;

use rand::Rng;
use rand::seq::SliceRandom;

/// A permutation of answer options: canonical index <-> display position.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShuffleMap {
    display_of: Vec<usize>,
    canonical_at: Vec<usize>,
}

impl ShuffleMap {
    /// Uniformly random permutation of `0..option_count`.
    pub fn random<R: Rng + ?Sized>(option_count: usize, rng: &mut R) -> Self {
        let mut canonical_at: Vec<usize> = (0..option_count).collect();
        canonical_at.shuffle(rng);
        Self::from_display_order(canonical_at)
    }

    /// Build from the canonical indices listed in display order.
    fn from_display_order(canonical_at: Vec<usize>) -> Self {
        let mut display_of = vec![0; canonical_at.len()];
        for (position, &canonical) in canonical_at.iter().enumerate() {
            display_of[canonical] = position;
        }
        Self {
            display_of,
            canonical_at,
        }
    }

    pub fn len(&self) -> usize {
        self.display_of.len()
    }

    pub fn is_empty(&self) -> bool {
        self.display_of.is_empty()
    }

    /// Panics if `canonical` is not below [`ShuffleMap::len`].
    pub fn display_position(&self, canonical: usize) -> usize {
        self.display_of[canonical]
    }

    pub fn canonical_index(&self, position: usize) -> Option<usize> {
        self.canonical_at.get(position).copied()
    }

    /// Reorder canonical options into display order.
    pub fn arrange<T: Clone>(&self, canonical: &[T]) -> Vec<T> {
        self.canonical_at
            .iter()
            .map(|&index| canonical[index].clone())
            .collect()
    }
}

/// Per-session memo of shuffle maps, keyed by question index.
/// A map never changes once created.
#[derive(Debug, Default)]
pub struct ShuffleCache {
    maps: HashMap<usize, ShuffleMap>,
}

impl ShuffleCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn shuffle_for<R: Rng + ?Sized>(
        &mut self,
        question_index: usize,
        option_count: usize,
        rng: &mut R,
    ) -> &ShuffleMap {
        self.maps.entry(question_index).or_insert_with(|| {
            tracing::debug!("Shuffled options for question {}", question_index + 1);
            ShuffleMap::random(option_count, rng)
        })
    }

    pub fn get(&self, question_index: usize) -> Option<&ShuffleMap> {
        self.maps.get(&question_index)
    }
}
