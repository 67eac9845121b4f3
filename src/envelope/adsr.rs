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
use std::fmt;

use super::{block_average, EgDescription, EnvelopeGenerator, Segments};
use crate::util::seconds_to_frames;

/// Level a release ramps down to before the envelope reports itself done.
/// Decays towards a zero sustain level aim for it as well.
pub const RELEASE_THRESHOLD: f32 = 5e-5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AdsrState {
    Delay,
    Attack,
    Hold,
    Decay,
    Sustain,
    Release,
    Done,
}

/// Segment lengths in samples, start and sustain levels in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AdsrParameters {
    pub delay: usize,
    pub attack: usize,
    pub hold: usize,
    pub decay: usize,
    pub release: usize,
    pub start: f32,
    pub sustain: f32,
}

impl Default for AdsrParameters {
    fn default() -> Self {
        Self {
            delay: 0,
            attack: 0,
            hold: 0,
            decay: 0,
            release: 0,
            start: 0.0,
            sustain: 1.0,
        }
    }
}

impl AdsrParameters {
    /// Evaluates an envelope description for a note.
    pub fn from_description(
        description: &EgDescription,
        cc: &[u8],
        velocity: u8,
        sample_rate: f32,
    ) -> Self {
        let frames = |seconds: f32| seconds_to_frames(seconds, sample_rate);
        Self {
            delay: frames(description.delay(cc, velocity)),
            attack: frames(description.attack(cc, velocity)),
            hold: frames(description.hold(cc, velocity)),
            decay: frames(description.decay(cc, velocity)),
            release: frames(description.release(cc, velocity)),
            start: description.start(cc, velocity),
            sustain: description.sustain(cc, velocity),
        }
    }
}

/// Delay, attack, hold, decay, sustain and release.
///
/// The attack is a linear ramp from the start level to 1. Decay and release
/// are exponential: the decay reaches the sustain level in exactly `decay`
/// samples, and the release reaches [`RELEASE_THRESHOLD`] in exactly
/// `release` samples, after which the envelope outputs 0 and is done.
#[derive(Clone)]
pub struct AdsrEnvelope {
    params: AdsrParameters,
    state: AdsrState,
    current: f32,
    /// Samples left in the current segment.
    counter: usize,
    /// Increment of the attack ramp.
    step: f32,
    /// Per-sample factor of the decay or release.
    rate: f32,
    pending_release: Option<usize>,
    released: bool,
}

impl AdsrEnvelope {
    pub fn new(params: AdsrParameters) -> Self {
        let mut envelope = Self {
            params,
            state: AdsrState::Delay,
            current: 0.0,
            counter: 0,
            step: 0.0,
            rate: 1.0,
            pending_release: None,
            released: false,
        };
        envelope.reset(params);
        envelope
    }

    /// Restarts the envelope with new parameters.
    pub fn reset(&mut self, params: AdsrParameters) {
        self.params = AdsrParameters {
            start: params.start.clamp(0.0, 1.0),
            sustain: params.sustain.clamp(0.0, 1.0),
            ..params
        };
        self.state = AdsrState::Delay;
        self.current = self.params.start;
        self.counter = self.params.delay;
        self.step = 0.0;
        self.rate = 1.0;
        self.pending_release = None;
        self.released = false;
    }

    pub fn state(&self) -> AdsrState {
        self.state
    }

    pub fn params(&self) -> &AdsrParameters {
        &self.params
    }

    /// The value of the last sample produced.
    pub fn current(&self) -> f32 {
        self.current
    }

    /// Moves to the state after the current one once its counter ran out.
    fn transition(&mut self) {
        match self.state {
            AdsrState::Delay => {
                self.state = AdsrState::Attack;
                self.counter = self.params.attack;
                if self.params.attack > 0 {
                    self.step = (1.0 - self.current) / self.params.attack as f32;
                }
            }
            AdsrState::Attack => {
                self.state = AdsrState::Hold;
                self.current = 1.0;
                self.counter = self.params.hold;
            }
            AdsrState::Hold => {
                self.state = AdsrState::Decay;
                self.counter = self.params.decay;
                if self.params.decay > 0 {
                    let target = self.params.sustain.max(RELEASE_THRESHOLD);
                    self.rate = (target / self.current).powf(1.0 / self.params.decay as f32);
                }
            }
            AdsrState::Decay => {
                self.state = AdsrState::Sustain;
                self.current = self.params.sustain;
            }
            AdsrState::Release => {
                self.state = AdsrState::Done;
                self.current = 0.0;
            }
            AdsrState::Sustain | AdsrState::Done => {}
        }
    }

    fn begin_release(&mut self) {
        if self.params.release == 0 || self.current <= RELEASE_THRESHOLD {
            self.state = AdsrState::Done;
            self.current = 0.0;
            return;
        }
        self.state = AdsrState::Release;
        self.counter = self.params.release;
        self.rate = (RELEASE_THRESHOLD / self.current).powf(1.0 / self.params.release as f32);
    }

    fn check_pending_release(&mut self) {
        match self.pending_release {
            Some(0) => {
                self.pending_release = None;
                self.begin_release();
            }
            Some(ref mut countdown) => *countdown -= 1,
            None => {}
        }
    }

    /// Whether the current state runs until its counter expires.
    fn is_timed(&self) -> bool {
        matches!(
            self.state,
            AdsrState::Delay
                | AdsrState::Attack
                | AdsrState::Hold
                | AdsrState::Decay
                | AdsrState::Release
        )
    }
}

/// An envelope that was never triggered: silent and finished.
impl Default for AdsrEnvelope {
    fn default() -> Self {
        Self {
            params: AdsrParameters::default(),
            state: AdsrState::Done,
            current: 0.0,
            counter: 0,
            step: 0.0,
            rate: 1.0,
            pending_release: None,
            released: false,
        }
    }
}

impl fmt::Debug for AdsrEnvelope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AdsrEnvelope")
            .field("state", &self.state)
            .field("current", &self.current)
            .field("counter", &self.counter)
            .field("pending_release", &self.pending_release)
            .finish()
    }
}

impl Segments for AdsrEnvelope {
    fn pending_release(&mut self) -> &mut Option<usize> {
        &mut self.pending_release
    }

    fn enter_release(&mut self) {
        self.begin_release();
    }

    fn advance(&mut self, frames: usize) -> f64 {
        let mut sum = 0.0;
        let mut left = frames;
        while left > 0 {
            if self.is_timed() && self.counter == 0 {
                self.transition();
                continue;
            }
            let count = if self.is_timed() {
                self.counter.min(left)
            } else {
                left
            };
            let n = count as f64;
            let current = self.current as f64;
            match self.state {
                AdsrState::Attack => {
                    let step = self.step as f64;
                    sum += n * current + step * n * (n + 1.0) / 2.0;
                    self.current = (current + step * n) as f32;
                }
                AdsrState::Decay | AdsrState::Release => {
                    let rate = self.rate as f64;
                    if (1.0 - rate).abs() < 1e-12 {
                        sum += n * current;
                    } else {
                        let decayed = rate.powf(n);
                        sum += current * rate * (1.0 - decayed) / (1.0 - rate);
                        self.current = (current * decayed) as f32;
                    }
                }
                AdsrState::Delay | AdsrState::Hold | AdsrState::Sustain | AdsrState::Done => {
                    sum += n * current;
                }
            }
            if self.is_timed() {
                self.counter -= count;
            }
            left -= count;
        }
        sum
    }

    fn current(&self) -> f32 {
        self.current
    }
}

impl EnvelopeGenerator for AdsrEnvelope {
    fn next_value(&mut self) -> f32 {
        self.check_pending_release();
        loop {
            if !self.is_timed() {
                return self.current;
            }
            if self.counter > 0 {
                self.counter -= 1;
                match self.state {
                    AdsrState::Attack => self.current += self.step,
                    AdsrState::Decay | AdsrState::Release => self.current *= self.rate,
                    _ => {}
                }
                return self.current;
            }
            self.transition();
        }
    }

    fn next_quantized(&mut self, frames: usize) -> f32 {
        block_average(self, frames)
    }

    fn remaining_delay(&self) -> usize {
        match self.state {
            AdsrState::Delay => self.counter,
            _ => 0,
        }
    }

    fn start_release(&mut self, delay: usize) {
        if self.released || self.state == AdsrState::Done {
            return;
        }
        self.released = true;
        self.pending_release = Some(delay);
    }

    fn is_released(&self) -> bool {
        self.released
    }

    fn is_finished(&self) -> bool {
        self.state == AdsrState::Done
    }

    fn finish(&mut self) {
        self.state = AdsrState::Done;
        self.current = 0.0;
        self.pending_release = None;
        self.released = true;
    }
}
