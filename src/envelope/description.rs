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
use serde::Deserialize;

use crate::midi::CCMap;
use crate::util::normalize_7bits;

/// One envelope parameter: a base value, a velocity tracking amount added at
/// full velocity, and per-controller amounts added at full controller value.
#[derive(Debug, Clone, PartialEq, Default, Deserialize)]
#[serde(from = "ParameterRepr")]
pub struct EgParameter {
    pub value: f32,
    pub velocity: f32,
    pub cc: CCMap<f32>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum ParameterRepr {
    Value(f32),
    Full {
        value: f32,
        #[serde(default)]
        velocity: f32,
        #[serde(default)]
        cc: CCMap<f32>,
    },
}

impl From<ParameterRepr> for EgParameter {
    fn from(repr: ParameterRepr) -> Self {
        match repr {
            ParameterRepr::Value(value) => EgParameter::new(value),
            ParameterRepr::Full {
                value,
                velocity,
                cc,
            } => EgParameter {
                value,
                velocity,
                cc,
            },
        }
    }
}

impl EgParameter {
    pub fn new(value: f32) -> Self {
        Self {
            value,
            velocity: 0.0,
            cc: CCMap::default(),
        }
    }

    /// The parameter value for a note of the given velocity under the given
    /// controller state.
    pub fn evaluate(&self, cc: &[u8], velocity: u8) -> f32 {
        let modulation: f32 = self
            .cc
            .iter()
            .map(|(number, amount)| {
                let value = cc.get(number as usize).copied().unwrap_or(0);
                amount * normalize_7bits(value)
            })
            .sum();
        self.value + self.velocity * normalize_7bits(velocity) + modulation
    }
}

/// Which generator an amplitude envelope runs on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EgShape {
    #[default]
    Adsr,
    /// One ramp from the start level to full gain over the attack time, held
    /// until the release ramps it to zero over the release time. Hold, decay
    /// and sustain do not apply.
    Linear,
}

/// Amplitude envelope shape. Times are in seconds, start and sustain levels
/// in percent.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct EgDescription {
    pub shape: EgShape,
    pub delay: EgParameter,
    pub start: EgParameter,
    pub attack: EgParameter,
    pub hold: EgParameter,
    pub decay: EgParameter,
    pub sustain: EgParameter,
    pub release: EgParameter,
}

impl Default for EgDescription {
    fn default() -> Self {
        Self {
            shape: EgShape::Adsr,
            delay: EgParameter::default(),
            start: EgParameter::default(),
            attack: EgParameter::default(),
            hold: EgParameter::default(),
            decay: EgParameter::default(),
            sustain: EgParameter::new(100.0),
            release: EgParameter::default(),
        }
    }
}

impl EgDescription {
    pub fn delay(&self, cc: &[u8], velocity: u8) -> f32 {
        self.delay.evaluate(cc, velocity).max(0.0)
    }

    pub fn attack(&self, cc: &[u8], velocity: u8) -> f32 {
        self.attack.evaluate(cc, velocity).max(0.0)
    }

    pub fn hold(&self, cc: &[u8], velocity: u8) -> f32 {
        self.hold.evaluate(cc, velocity).max(0.0)
    }

    pub fn decay(&self, cc: &[u8], velocity: u8) -> f32 {
        self.decay.evaluate(cc, velocity).max(0.0)
    }

    pub fn release(&self, cc: &[u8], velocity: u8) -> f32 {
        self.release.evaluate(cc, velocity).max(0.0)
    }

    /// Start level in [0, 1].
    pub fn start(&self, cc: &[u8], velocity: u8) -> f32 {
        (self.start.evaluate(cc, velocity) / 100.0).clamp(0.0, 1.0)
    }

    /// Sustain level in [0, 1].
    pub fn sustain(&self, cc: &[u8], velocity: u8) -> f32 {
        (self.sustain.evaluate(cc, velocity) / 100.0).clamp(0.0, 1.0)
    }
}

/// Amplitude LFO: a tremolo of the given rate, dipping the gain by up to
/// `depth` percent.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize)]
#[serde(default)]
pub struct LfoDescription {
    pub frequency: f32,
    pub depth: f32,
}

impl Default for LfoDescription {
    fn default() -> Self {
        Self {
            frequency: 5.0,
            depth: 0.0,
        }
    }
}
