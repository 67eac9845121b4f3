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
//! Response curves indexed by 7-bit MIDI values.

use std::collections::BTreeMap;

const CURVE_POINTS: usize = 128;

/// A 128-point response table.
#[derive(Debug, Clone, PartialEq)]
pub struct Curve {
    points: [f32; CURVE_POINTS],
}

impl Curve {
    /// The identity response, 0 at 0 and 1 at 127.
    pub fn linear() -> Self {
        let mut points = [0.0; CURVE_POINTS];
        for (i, point) in points.iter_mut().enumerate() {
            *point = i as f32 / 127.0;
        }
        Self { points }
    }

    /// Builds a curve from (index, value) points, interpolating linearly
    /// between them. Missing end points default to 0 at index 0 and 1 at 127.
    pub fn from_points(points: &[(u8, f32)]) -> Self {
        let mut defined: BTreeMap<usize, f32> = points
            .iter()
            .map(|&(index, value)| ((index as usize).min(CURVE_POINTS - 1), value))
            .collect();
        defined.entry(0).or_insert(0.0);
        defined.entry(CURVE_POINTS - 1).or_insert(1.0);

        let mut table = [0.0; CURVE_POINTS];
        let anchors: Vec<(usize, f32)> = defined.into_iter().collect();
        for pair in anchors.windows(2) {
            let (x0, y0) = pair[0];
            let (x1, y1) = pair[1];
            let span = (x1 - x0) as f32;
            for (x, point) in table.iter_mut().enumerate().take(x1 + 1).skip(x0) {
                *point = y0 + (y1 - y0) * (x - x0) as f32 / span;
            }
        }
        Self { points: table }
    }

    pub fn eval_cc(&self, value: u8) -> f32 {
        self.points[(value as usize).min(CURVE_POINTS - 1)]
    }

    /// Evaluates the curve at a position in [0, 1], interpolating between points.
    pub fn eval_normalized(&self, x: f32) -> f32 {
        let position = x.clamp(0.0, 1.0) * (CURVE_POINTS - 1) as f32;
        let index = position as usize;
        if index >= CURVE_POINTS - 1 {
            return self.points[CURVE_POINTS - 1];
        }
        let frac = position - index as f32;
        self.points[index] + frac * (self.points[index + 1] - self.points[index])
    }
}

impl Default for Curve {
    fn default() -> Self {
        Self::linear()
    }
}

/// Curves of an instrument, by index.
#[derive(Debug, Clone, Default)]
pub struct CurveSet {
    curves: BTreeMap<u8, Curve>,
}

impl CurveSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, index: u8, curve: Curve) {
        self.curves.insert(index, curve);
    }

    pub fn get(&self, index: u8) -> Option<&Curve> {
        self.curves.get(&index)
    }

    pub fn len(&self) -> usize {
        self.curves.len()
    }

    pub fn is_empty(&self) -> bool {
        self.curves.is_empty()
    }
}
