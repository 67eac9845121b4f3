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
use std::f32::consts::TAU;

use super::{AdsrEnvelope, EnvelopeGenerator, LfoDescription};

/// An ADSR envelope multiplied by a tremolo carrier.
///
/// The carrier starts at full gain and dips by `depth` once per period, so
/// a depth of zero leaves the inner envelope untouched.
#[derive(Debug, Clone)]
pub struct MultiplicativeEnvelope {
    inner: AdsrEnvelope,
    depth: f32,
    phase: f32,
    increment: f32,
}

impl MultiplicativeEnvelope {
    pub fn new(inner: AdsrEnvelope, lfo: &LfoDescription, sample_rate: f32) -> Self {
        Self {
            inner,
            depth: (lfo.depth / 100.0).clamp(0.0, 1.0),
            phase: 0.0,
            increment: (lfo.frequency / sample_rate).max(0.0),
        }
    }

    pub fn inner(&self) -> &AdsrEnvelope {
        &self.inner
    }

    fn carrier(&mut self) -> f32 {
        let value = 1.0 - self.depth * 0.5 * (1.0 - (TAU * self.phase).cos());
        self.phase = (self.phase + self.increment).fract();
        value
    }
}

impl EnvelopeGenerator for MultiplicativeEnvelope {
    fn next_value(&mut self) -> f32 {
        self.inner.next_value() * self.carrier()
    }

    /// The carrier has no cheap closed-form average, so the block is summed
    /// sample by sample.
    fn next_quantized(&mut self, frames: usize) -> f32 {
        if frames == 0 {
            return self.inner.current();
        }
        let sum: f64 = (0..frames).map(|_| self.next_value() as f64).sum();
        (sum / frames as f64) as f32
    }

    fn remaining_delay(&self) -> usize {
        self.inner.remaining_delay()
    }

    fn start_release(&mut self, delay: usize) {
        self.inner.start_release(delay);
    }

    fn is_released(&self) -> bool {
        self.inner.is_released()
    }

    fn is_finished(&self) -> bool {
        self.inner.is_finished()
    }

    fn finish(&mut self) {
        self.inner.finish();
    }
}
