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
use super::{block_average, EnvelopeGenerator, Segments};

/// A single linear ramp between two levels, after an optional delay.
///
/// Releasing ramps to zero over the release length set with
/// [`LinearEnvelope::set_release`]. Voices also use it on its own to smooth
/// gain changes that are computed once per block.
#[derive(Debug, Clone)]
pub struct LinearEnvelope {
    current: f32,
    target: f32,
    step: f32,
    /// Samples left in the ramp.
    remaining: usize,
    delay: usize,
    release: usize,
    pending_release: Option<usize>,
    released: bool,
}

impl LinearEnvelope {
    /// A flat envelope at `level`.
    pub fn new(level: f32) -> Self {
        Self {
            current: level,
            target: level,
            step: 0.0,
            remaining: 0,
            delay: 0,
            release: 0,
            pending_release: None,
            released: false,
        }
    }

    /// Restarts at `start`, holds it for `delay` samples, then ramps to `end`
    /// over `duration` samples.
    pub fn reset(&mut self, start: f32, end: f32, duration: usize, delay: usize) {
        self.current = start;
        self.delay = delay;
        self.pending_release = None;
        self.released = false;
        self.ramp_to(end, duration);
    }

    /// Starts a new ramp from the current value.
    pub fn retarget(&mut self, target: f32, duration: usize) {
        self.ramp_to(target, duration);
    }

    /// Length of the ramp to zero started by a release.
    pub fn set_release(&mut self, frames: usize) {
        self.release = frames;
    }

    pub fn current(&self) -> f32 {
        self.current
    }

    pub fn target(&self) -> f32 {
        self.target
    }

    fn ramp_to(&mut self, target: f32, duration: usize) {
        self.target = target;
        if duration == 0 {
            self.current = target;
            self.remaining = 0;
            self.step = 0.0;
        } else {
            self.remaining = duration;
            self.step = (target - self.current) / duration as f32;
        }
    }
}

impl Default for LinearEnvelope {
    fn default() -> Self {
        Self::new(0.0)
    }
}

impl Segments for LinearEnvelope {
    fn pending_release(&mut self) -> &mut Option<usize> {
        &mut self.pending_release
    }

    fn enter_release(&mut self) {
        self.delay = 0;
        self.ramp_to(0.0, self.release);
    }

    fn advance(&mut self, frames: usize) -> f64 {
        let held = self.delay.min(frames);
        self.delay -= held;
        let mut sum = held as f64 * self.current as f64;

        let ramp = self.remaining.min(frames - held);
        if ramp > 0 {
            let n = ramp as f64;
            let start = self.current as f64;
            let step = self.step as f64;
            sum += n * start + step * n * (n + 1.0) / 2.0;
            self.remaining -= ramp;
            self.current = if self.remaining == 0 {
                self.target
            } else {
                (start + step * n) as f32
            };
        }

        sum + (frames - held - ramp) as f64 * self.current as f64
    }

    fn current(&self) -> f32 {
        self.current
    }
}

impl EnvelopeGenerator for LinearEnvelope {
    fn next_value(&mut self) -> f32 {
        match self.pending_release {
            Some(0) => {
                self.pending_release = None;
                self.enter_release();
            }
            Some(ref mut countdown) => *countdown -= 1,
            None => {}
        }
        if self.delay > 0 {
            self.delay -= 1;
        } else if self.remaining > 0 {
            self.remaining -= 1;
            self.current = if self.remaining == 0 {
                self.target
            } else {
                self.current + self.step
            };
        }
        self.current
    }

    fn next_quantized(&mut self, frames: usize) -> f32 {
        block_average(self, frames)
    }

    fn remaining_delay(&self) -> usize {
        self.delay
    }

    fn start_release(&mut self, delay: usize) {
        if self.released {
            return;
        }
        self.released = true;
        self.pending_release = Some(delay);
    }

    fn is_released(&self) -> bool {
        self.released
    }

    fn is_finished(&self) -> bool {
        self.released && self.pending_release.is_none() && self.remaining == 0
    }

    fn finish(&mut self) {
        self.released = true;
        self.pending_release = None;
        self.delay = 0;
        self.ramp_to(0.0, 0);
    }
}
