//! Fixed-capacity history sequences.
//!
//! Every detector keeps short rolling windows of recent values: flux
//! histories for the adaptive thresholds, inter-onset intervals, tempo
//! candidates, pitch and HNR series. `History` is a bounded push-evicts-oldest
//! sequence with the small-n statistics those windows need (all windows hold
//! at most 64 elements, so O(n) statistics per frame are fine).

use std::collections::VecDeque;

/// Bounded sequence of `f32` values with O(1) push and rolling statistics.
#[derive(Clone, Debug)]
pub struct History {
    buf: VecDeque<f32>,
    capacity: usize,
}

impl History {
    pub fn new(capacity: usize) -> Self {
        Self {
            buf: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a value, evicting the oldest once the capacity is reached.
    pub fn push(&mut self, value: f32) {
        if self.buf.len() == self.capacity {
            self.buf.pop_front();
        }
        self.buf.push_back(value);
    }

    pub fn len(&self) -> usize {
        self.buf.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }

    pub fn last(&self) -> Option<f32> {
        self.buf.back().copied()
    }

    pub fn iter(&self) -> impl DoubleEndedIterator<Item = f32> + ExactSizeIterator + '_ {
        self.buf.iter().copied()
    }

    pub fn clear(&mut self) {
        self.buf.clear();
    }

    /// Median of the stored values; averages the two middle elements for
    /// even lengths. 0.0 when empty.
    pub fn median(&self) -> f32 {
        let mut values: Vec<f32> = self.buf.iter().copied().collect();
        median_of(&mut values)
    }

    /// Median absolute deviation from the median. 0.0 when empty.
    pub fn mad(&self) -> f32 {
        if self.buf.is_empty() {
            return 0.0;
        }
        let med = self.median();
        let mut devs: Vec<f32> = self.buf.iter().map(|v| (v - med).abs()).collect();
        median_of(&mut devs)
    }

    pub fn mean(&self) -> f32 {
        if self.buf.is_empty() {
            return 0.0;
        }
        self.buf.iter().sum::<f32>() / self.buf.len() as f32
    }

    /// Population standard deviation. 0.0 when fewer than two values.
    pub fn std(&self) -> f32 {
        if self.buf.len() < 2 {
            return 0.0;
        }
        let mean = self.mean();
        let var =
            self.buf.iter().map(|v| (v - mean) * (v - mean)).sum::<f32>() / self.buf.len() as f32;
        var.sqrt()
    }
}

fn median_of(values: &mut Vec<f32>) -> f32 {
    if values.is_empty() {
        return 0.0;
    }
    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_push_evicts_oldest() {
        let mut h = History::new(3);
        for v in [1.0, 2.0, 3.0, 4.0] {
            h.push(v);
        }
        assert_eq!(h.len(), 3);
        let values: Vec<f32> = h.iter().collect();
        assert_eq!(values, vec![2.0, 3.0, 4.0]);
        assert_eq!(h.last(), Some(4.0));
    }

    #[test]
    fn test_median_odd_and_even() {
        let mut h = History::new(8);
        for v in [5.0, 1.0, 3.0] {
            h.push(v);
        }
        assert_eq!(h.median(), 3.0);
        h.push(7.0);
        // Sorted: 1, 3, 5, 7 -> average of middles
        assert_eq!(h.median(), 4.0);
    }

    #[test]
    fn test_mad() {
        let mut h = History::new(8);
        for v in [1.0, 1.0, 2.0, 2.0, 4.0] {
            h.push(v);
        }
        // median 2, deviations 1,1,0,0,2 -> median 1
        assert_eq!(h.mad(), 1.0);
    }

    #[test]
    fn test_empty_statistics_are_zero() {
        let h = History::new(4);
        assert_eq!(h.median(), 0.0);
        assert_eq!(h.mad(), 0.0);
        assert_eq!(h.mean(), 0.0);
        assert_eq!(h.std(), 0.0);
    }

    #[test]
    fn test_std_population() {
        let mut h = History::new(4);
        for v in [2.0, 4.0, 4.0, 6.0] {
            h.push(v);
        }
        // mean 4, variance (4+0+0+4)/4 = 2
        assert!((h.std() - 2.0f32.sqrt()).abs() < 1e-6);
    }
}
