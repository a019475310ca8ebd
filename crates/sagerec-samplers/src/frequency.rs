//! Popularity-band filtering for negative sampling.

use sagerec_core::InteractionStore;

/// Restricts negative candidates to items whose training interaction count
/// falls inside an inclusive `[min, max]` band.
///
/// With no band configured every item is admitted, so the filter is a no-op
/// unless frequency-aware sampling is switched on.
#[derive(Clone, Debug)]
pub struct ItemFrequency {
    counts: Vec<u32>,
    min: u32,
    max: u32,
}

impl ItemFrequency {
    /// Count training interactions per item, admitting everything.
    pub fn from_store(store: &InteractionStore) -> Self {
        let mut counts = vec![0u32; store.n_items];
        for &item in &store.train.items {
            counts[item] += 1;
        }
        Self {
            counts,
            min: 0,
            max: u32::MAX,
        }
    }

    /// Restrict admission to the inclusive popularity band `[min, max]`.
    pub fn with_band(mut self, min: u32, max: u32) -> Self {
        self.min = min;
        self.max = max;
        self
    }

    pub fn count(&self, item: usize) -> u32 {
        self.counts[item]
    }

    /// Whether `item` may be drawn as a negative.
    pub fn admits(&self, item: usize) -> bool {
        let c = self.counts[item];
        c >= self.min && c <= self.max
    }

    /// All admitted items, in id order. Empty when the band excludes the
    /// whole catalog.
    pub fn admitted(&self) -> Vec<usize> {
        (0..self.counts.len()).filter(|&i| self.admits(i)).collect()
    }
}
