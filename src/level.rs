// Copyright (C) 2026 Michael Wilson <mike@mdwn.dev>
//
// This program is free software: you can redistribute it and/or modify it under
// the terms of the GNU General Public License as published by the Free Software
// Foundation, version 3.
//
// This program is distributed in the hope that it will be useful, but WITHOUT
// ANY WARRANTY; without even the implied warranty of MERCHANTABILITY or FITNESS
// FOR A PARTICULAR PURPOSE. See the GNU General Public License for more details.
//
// You should have received a copy of the GNU General Public License along with
// this program. If not, see <https://www.gnu.org/licenses/>.
//
//! Running signal level over a fixed window of recent values.

/// Fixed-length ring of recent values with running sum and sum of squares.
///
/// Pushing evicts the oldest value and adjusts both sums, so queries are O(1)
/// and nothing is ever recomputed. Sums are kept in f64 so the drift of long
/// runs of incremental updates stays far below f32 resolution.
#[derive(Debug, Clone)]
pub struct LevelTracker {
    values: Box<[f32]>,
    position: usize,
    sum: f64,
    sum_of_squares: f64,
}

impl LevelTracker {
    /// Creates a tracker over the last `len` values, initially all zero.
    pub fn new(len: usize) -> Self {
        Self {
            values: vec![0.0; len.max(1)].into_boxed_slice(),
            position: 0,
            sum: 0.0,
            sum_of_squares: 0.0,
        }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    #[inline]
    pub fn push(&mut self, value: f32) {
        let old = std::mem::replace(&mut self.values[self.position], value) as f64;
        let new = value as f64;
        self.sum += new - old;
        self.sum_of_squares += new * new - old * old;
        self.position += 1;
        if self.position == self.values.len() {
            self.position = 0;
        }
    }

    pub fn average(&self) -> f32 {
        (self.sum / self.values.len() as f64) as f32
    }

    pub fn mean_squared(&self) -> f32 {
        (self.sum_of_squares / self.values.len() as f64).max(0.0) as f32
    }

    pub fn rms(&self) -> f32 {
        self.mean_squared().sqrt()
    }

    pub fn clear(&mut self) {
        self.values.fill(0.0);
        self.position = 0;
        self.sum = 0.0;
        self.sum_of_squares = 0.0;
    }
}

#[cfg(test)]
mod test {
    use rand::{rngs::StdRng, Rng, SeedableRng};

    use super::LevelTracker;
    use crate::testutil::calculate_rms;

    fn direct(values: &[f32]) -> (f32, f32) {
        let n = values.len() as f64;
        let sum: f64 = values.iter().map(|&v| v as f64).sum();
        let squares: f64 = values.iter().map(|&v| (v as f64) * (v as f64)).sum();
        ((sum / n) as f32, (squares / n) as f32)
    }

    #[test]
    fn test_matches_direct_recomputation() {
        let mut rng = StdRng::seed_from_u64(7);
        let mut tracker = LevelTracker::new(64);
        let mut history = Vec::new();

        for _ in 0..10_000 {
            let value = rng.gen_range(-1.0..1.0f32);
            tracker.push(value);
            history.push(value);
        }

        let window = &history[history.len() - 64..];
        let (average, mean_squared) = direct(window);
        assert!((tracker.average() - average).abs() < 1e-5);
        assert!((tracker.mean_squared() - mean_squared).abs() < 1e-5);
        assert!((tracker.rms() - mean_squared.sqrt()).abs() < 1e-5);
        assert!((tracker.rms() - calculate_rms(window)).abs() < 1e-5);
    }

    #[test]
    fn test_partial_window_counts_zeros() {
        let mut tracker = LevelTracker::new(4);
        tracker.push(1.0);
        tracker.push(1.0);
        assert_eq!(0.5, tracker.average());
        assert_eq!(0.5, tracker.mean_squared());
    }

    #[test]
    fn test_clear_and_minimum_size() {
        let mut tracker = LevelTracker::new(0);
        assert_eq!(1, tracker.len());
        tracker.push(-2.0);
        assert_eq!(-2.0, tracker.average());
        assert_eq!(2.0, tracker.rms());
        tracker.clear();
        assert_eq!(0.0, tracker.rms());
    }
}
