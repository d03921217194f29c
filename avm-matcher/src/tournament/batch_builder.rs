//! Batch partitioning
//!
//! Splits an ordered id sequence into consecutive chunks of at most
//! `capacity` ids. Input order is preserved; shuffling happens per batch in
//! the comparator.

use crate::error::MatchError;

/// One round's group of candidate ids, fixed once built
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Batch {
    index: usize,
    ids: Vec<String>,
}

impl Batch {
    pub fn new(index: usize, ids: Vec<String>) -> Self {
        Self { index, ids }
    }

    /// Position within the round
    pub fn index(&self) -> usize {
        self.index
    }

    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }
}

#[derive(Debug, Clone, Copy)]
pub struct BatchBuilder {
    capacity: usize,
}

impl BatchBuilder {
    pub fn new(capacity: usize) -> Result<Self, MatchError> {
        if capacity == 0 {
            return Err(MatchError::Config("batch capacity must be at least 1".to_string()));
        }
        Ok(Self { capacity })
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of batches `build` will produce for `population` ids
    pub fn batch_count(&self, population: usize) -> usize {
        population.div_ceil(self.capacity)
    }

    pub fn build(&self, ids: &[String]) -> Vec<Batch> {
        ids.chunks(self.capacity)
            .enumerate()
            .map(|(index, chunk)| Batch::new(index, chunk.to_vec()))
            .collect()
    }
}
