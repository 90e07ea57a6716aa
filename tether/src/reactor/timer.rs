use crate::utils::Key;

use std::cmp::Ordering;
use std::time::Instant;

/// When a registration stops waiting for readiness, or a lookup for its
/// answer.
///
/// Deadlines sit in a min-heap and are never removed early: once the
/// registration fires or the lookup is answered, its key no longer resolves
/// in the slab, and the stale deadline is discarded when it reaches the top.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct Deadline {
    pub(crate) at: Instant,
    pub(crate) key: Key,
}

impl Ord for Deadline {
    fn cmp(&self, other: &Self) -> Ordering {
        // Reversed, so `BinaryHeap` pops the earliest deadline first.
        other
            .at
            .cmp(&self.at)
            .then_with(|| other.key.to_token().cmp(&self.key.to_token()))
    }
}

impl PartialOrd for Deadline {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::utils::Slab;

    use std::collections::BinaryHeap;
    use std::time::Duration;

    #[test]
    fn earliest_deadline_pops_first() {
        let mut slab = Slab::with_capacity(3);
        let now = Instant::now();
        let mut heap = BinaryHeap::new();

        for ms in [30, 10, 20] {
            heap.push(Deadline {
                at: now + Duration::from_millis(ms),
                key: slab.insert(ms),
            });
        }

        let order: Vec<_> = std::iter::from_fn(|| heap.pop())
            .map(|d| slab.get(d.key).copied())
            .collect();
        assert_eq!(order, vec![Some(10), Some(20), Some(30)]);
    }
}
