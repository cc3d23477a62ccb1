//! Static work partitioning
//!
//! Splits `0..n` into one contiguous stripe per worker plus a remainder
//! stripe that the calling thread handles itself. Stripes never overlap and
//! together cover every index exactly once.

use std::ops::Range;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Partition {
    pub slices: Vec<Range<usize>>, // one per worker, all the same length
    pub remainder: Range<usize>,   // processed on the calling thread
}

impl Partition {
    /// Worker slices that actually contain indices, with their worker index.
    pub fn assigned(&self) -> impl Iterator<Item = (usize, Range<usize>)> + '_ {
        self.slices
            .iter()
            .enumerate()
            .filter(|(_, r)| !r.is_empty())
            .map(|(w, r)| (w, r.clone()))
    }

    /// Total number of indices covered, remainder included.
    pub fn len(&self) -> usize {
        self.slices.iter().map(|r| r.len()).sum::<usize>() + self.remainder.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Partition `n` indices across `workers` equal slices.
///
/// Each slice gets `n / workers` indices; the last `n % workers` indices form
/// the remainder. With no workers everything is remainder.
pub fn partition(n: usize, workers: usize) -> Partition {
    if workers == 0 {
        return Partition {
            slices: Vec::new(),
            remainder: 0..n,
        };
    }

    let chunk = n / workers;
    let slices = (0..workers).map(|w| w * chunk..(w + 1) * chunk).collect();

    Partition {
        slices,
        remainder: workers * chunk..n,
    }
}
