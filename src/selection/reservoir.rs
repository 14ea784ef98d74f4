//! Single-pass uniform sampling (Algorithm R).

use crate::selection::rng::SplitMix64;

/// Fixed-capacity uniform sample of everything offered so far.
///
/// After `seen` offers, `items` is a simple random sample without
/// replacement of those offers, with `items.len() == min(capacity, seen)`.
/// Slots are overwritten in place, so no entry is final until the stream
/// ends.
#[derive(Debug, Clone)]
pub struct ReservoirState<T> {
    capacity: usize,
    items: Vec<T>,
    seen: u64,
}

impl<T> ReservoirState<T> {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            items: Vec::with_capacity(capacity.min(4096)),
            seen: 0,
        }
    }

    /// Offer the next stream element.
    pub fn offer(&mut self, item: T, rng: &mut SplitMix64) {
        self.seen += 1;
        if self.items.len() < self.capacity {
            self.items.push(item);
            return;
        }
        let j = rng.next_in_one_to(self.seen);
        if let Ok(slot) = usize::try_from(j - 1)
            && slot < self.capacity
        {
            self.items[slot] = item;
        }
    }

    #[must_use]
    pub const fn capacity(&self) -> usize {
        self.capacity
    }

    #[must_use]
    pub const fn seen(&self) -> u64 {
        self.seen
    }

    #[must_use]
    pub fn items(&self) -> &[T] {
        &self.items
    }

    #[must_use]
    pub fn into_items(self) -> Vec<T> {
        self.items
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fills_before_replacing() {
        let mut rng = SplitMix64::new(3);
        let mut r = ReservoirState::new(4);
        for i in 0..4 {
            r.offer(i, &mut rng);
        }
        assert_eq!(r.items(), &[0, 1, 2, 3]);
        for i in 4..100 {
            r.offer(i, &mut rng);
        }
        assert_eq!(r.items().len(), 4);
        assert_eq!(r.seen(), 100);
    }

    #[test]
    fn test_zero_capacity_keeps_nothing() {
        let mut rng = SplitMix64::new(3);
        let mut r = ReservoirState::new(0);
        r.offer(1, &mut rng);
        assert!(r.items().is_empty());
        assert_eq!(r.seen(), 1);
    }
}
