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
//! Immutable descriptions of what plays for which event.
//!
//! A region ties one sample to trigger conditions (channel, key, velocity,
//! random and controller ranges) and to the shaping applied while it plays.
//! Regions arrive already range-checked and never change while an instrument
//! is loaded.

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::curve::CurveSet;
use crate::envelope::{EgDescription, LfoDescription};
use crate::midi::CCMap;
use crate::util::{db_to_gain, normalize_7bits, normalize_bend};

/// Inclusive range of values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(from = "(T, T)")]
#[serde(bound(deserialize = "T: Deserialize<'de>"))]
pub struct Range<T> {
    start: T,
    end: T,
}

impl<T: PartialOrd + Copy> Range<T> {
    pub fn new(start: T, end: T) -> Self {
        Self { start, end }
    }

    pub fn start(&self) -> T {
        self.start
    }

    pub fn end(&self) -> T {
        self.end
    }

    pub fn contains(&self, value: T) -> bool {
        self.start <= value && value <= self.end
    }
}

/// The full MIDI data range, so an unbound controller never restricts.
impl Default for Range<u8> {
    fn default() -> Self {
        Self::new(0, 127)
    }
}

impl<T> From<(T, T)> for Range<T> {
    fn from((start, end): (T, T)) -> Self {
        Self { start, end }
    }
}

/// What kind of event starts a region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerType {
    /// Note on.
    #[default]
    Attack,
    /// Note off, with gain reduced by how long the note was held.
    Release,
    /// Note on while no other note is held on the channel.
    First,
    /// Note on while another note is held on the channel.
    Legato,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopMode {
    /// Play to the end of the sample, release on note off.
    #[default]
    NoLoop,
    /// Play to the end of the sample, ignoring note off.
    OneShot,
    /// Loop until the envelope finishes.
    LoopContinuous,
    /// Loop until note off, then play to the end.
    LoopSustain,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CrossfadeCurve {
    /// Gain follows the position in the fade linearly.
    Gain,
    /// Power follows the position in the fade linearly.
    #[default]
    Power,
}

impl CrossfadeCurve {
    fn apply(self, position: f32) -> f32 {
        match self {
            CrossfadeCurve::Gain => position,
            CrossfadeCurve::Power => position.sqrt(),
        }
    }
}

/// Gain of a fade-in over `range`: 0 below it, 1 above it.
pub fn crossfade_in(range: Range<u8>, value: u8, curve: CrossfadeCurve) -> f32 {
    if value < range.start() {
        0.0
    } else if value >= range.end() {
        1.0
    } else {
        let position = (value - range.start()) as f32 / (range.end() - range.start()) as f32;
        curve.apply(position)
    }
}

/// Gain of a fade-out over `range`: 1 below it, 0 above it.
pub fn crossfade_out(range: Range<u8>, value: u8, curve: CrossfadeCurve) -> f32 {
    if value <= range.start() {
        1.0
    } else if value > range.end() {
        0.0
    } else {
        let position = (range.end() - value) as f32 / (range.end() - range.start()) as f32;
        curve.apply(position)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Region {
    /// Sample file, relative to the instrument's sample directory, or the name
    /// of a sample registered in memory.
    pub sample: String,

    // Trigger conditions.
    pub channel_range: Range<u8>,
    pub key_range: Range<u8>,
    pub velocity_range: Range<u8>,
    /// Matched against a uniform random number in [0, 1) drawn per event.
    pub random_range: Range<f32>,
    /// Controllers that must hold a value in range for the region to play.
    pub cc_conditions: CCMap<Range<u8>>,
    pub trigger: TriggerType,
    /// Controllers whose change into range starts the region. A region with
    /// controller triggers does not respond to notes.
    pub cc_triggers: CCMap<Range<u8>>,

    // Pitch. Keytrack, tune, random and bends are in cents.
    pub pitch_keycenter: u8,
    pub pitch_keytrack: f32,
    pub transpose: i32,
    pub tune: f32,
    pub pitch_random: f32,
    pub bend_up: f32,
    pub bend_down: f32,

    // Amplitude.
    /// Gain in dB.
    pub volume: f32,
    /// Gain in percent, modulated by `amplitude_cc`.
    pub amplitude: f32,
    /// Percent added to `amplitude` per controller at full value.
    pub amplitude_cc: CCMap<f32>,
    /// Stereo position in percent, -100 is hard left.
    pub pan: f32,
    /// Velocity tracking in percent.
    pub amp_veltrack: f32,
    /// Curve index mapping velocity to gain. Defaults to a square law.
    pub amp_velcurve: Option<u8>,
    /// Maximum random gain reduction in dB.
    pub amp_random: f32,
    /// Release trigger attenuation in dB per second the note was held.
    pub rt_decay: f32,

    // Crossfades.
    pub xfin_key: Range<u8>,
    pub xfout_key: Range<u8>,
    pub xfin_velocity: Range<u8>,
    pub xfout_velocity: Range<u8>,
    pub xfin_cc: CCMap<Range<u8>>,
    pub xfout_cc: CCMap<Range<u8>>,
    pub xf_keycurve: CrossfadeCurve,
    pub xf_velcurve: CrossfadeCurve,
    pub xf_cccurve: CrossfadeCurve,

    // Timing, in seconds and in frames of the source file.
    pub delay: f32,
    pub delay_random: f32,
    pub offset: u32,
    pub offset_random: u32,
    /// Frames at and after `end` are never played.
    pub end: Option<u32>,
    pub loop_mode: LoopMode,
    /// Inclusive loop bounds. The whole sample when unset.
    pub loop_range: Option<Range<u32>>,

    // Choke groups.
    pub group: u32,
    /// Starting a region of this group releases voices of this region.
    pub off_by: Option<u32>,

    pub amp_eg: EgDescription,
    pub amp_lfo: Option<LfoDescription>,

    #[serde(flatten)]
    unknown: BTreeMap<String, serde_yml::Value>,
}

impl Default for Region {
    fn default() -> Self {
        Self {
            sample: String::new(),
            channel_range: Range::new(0, 15),
            key_range: Range::new(0, 127),
            velocity_range: Range::new(0, 127),
            random_range: Range::new(0.0, 1.0),
            cc_conditions: CCMap::default(),
            trigger: TriggerType::Attack,
            cc_triggers: CCMap::default(),
            pitch_keycenter: 60,
            pitch_keytrack: 100.0,
            transpose: 0,
            tune: 0.0,
            pitch_random: 0.0,
            bend_up: 200.0,
            bend_down: -200.0,
            volume: 0.0,
            amplitude: 100.0,
            amplitude_cc: CCMap::default(),
            pan: 0.0,
            amp_veltrack: 100.0,
            amp_velcurve: None,
            amp_random: 0.0,
            rt_decay: 0.0,
            xfin_key: Range::new(0, 0),
            xfout_key: Range::new(127, 127),
            xfin_velocity: Range::new(0, 0),
            xfout_velocity: Range::new(127, 127),
            xfin_cc: CCMap::default(),
            xfout_cc: CCMap::default(),
            xf_keycurve: CrossfadeCurve::Power,
            xf_velcurve: CrossfadeCurve::Power,
            xf_cccurve: CrossfadeCurve::Power,
            delay: 0.0,
            delay_random: 0.0,
            offset: 0,
            offset_random: 0,
            end: None,
            loop_mode: LoopMode::NoLoop,
            loop_range: None,
            group: 0,
            off_by: None,
            amp_eg: EgDescription::default(),
            amp_lfo: None,
            unknown: BTreeMap::new(),
        }
    }
}

impl Region {
    pub fn new(sample: impl Into<String>) -> Self {
        Self {
            sample: sample.into(),
            ..Default::default()
        }
    }

    /// Keys of the description that were not recognized.
    pub fn unknown_directives(&self) -> impl Iterator<Item = &str> {
        self.unknown.keys().map(String::as_str)
    }

    pub fn is_cc_triggered(&self) -> bool {
        !self.cc_triggers.is_empty()
    }

    pub fn is_release_trigger(&self) -> bool {
        self.trigger == TriggerType::Release
    }

    /// Whether every controller condition holds for the given controller values.
    pub fn cc_conditions_met(&self, cc: &[u8]) -> bool {
        self.cc_conditions
            .iter()
            .all(|(number, range)| range.contains(cc.get(number as usize).copied().unwrap_or(0)))
    }

    /// Whether a note event with the given random draw falls in this region.
    /// The trigger type is not considered.
    pub fn matches_note(
        &self,
        channel: u8,
        note: u8,
        velocity: u8,
        random: f32,
        cc: &[u8],
    ) -> bool {
        !self.is_cc_triggered()
            && self.channel_range.contains(channel)
            && self.key_range.contains(note)
            && self.velocity_range.contains(velocity)
            && self.random_range.start() <= random
            && (random < self.random_range.end() || self.random_range.end() >= 1.0)
            && self.cc_conditions_met(cc)
    }

    /// Whether a controller event starts this region.
    pub fn matches_cc_trigger(&self, channel: u8, number: u8, value: u8, cc: &[u8]) -> bool {
        self.channel_range.contains(channel)
            && self
                .cc_triggers
                .get(number)
                .is_some_and(|range| range.contains(value))
            && self.cc_conditions_met(cc)
    }

    /// Loop bounds are active for this loop mode and release state.
    pub fn loops(&self, released: bool) -> bool {
        match self.loop_mode {
            LoopMode::LoopContinuous => true,
            LoopMode::LoopSustain => !released,
            LoopMode::NoLoop | LoopMode::OneShot => false,
        }
    }

    /// Fixed gain from the volume.
    pub fn base_gain(&self) -> f32 {
        db_to_gain(self.volume)
    }

    /// Gain applied for a note velocity, after velocity tracking.
    pub fn velocity_gain(&self, velocity: u8, curves: &CurveSet) -> f32 {
        let response = match self.amp_velcurve.and_then(|index| curves.get(index)) {
            Some(curve) => curve.eval_cc(velocity),
            None => {
                let v = normalize_7bits(velocity);
                v * v
            }
        };
        let track = (self.amp_veltrack / 100.0).clamp(-1.0, 1.0);
        if track >= 0.0 {
            1.0 - track * (1.0 - response)
        } else {
            1.0 + track * response
        }
    }

    /// Gain of the key and velocity crossfades, fixed for the note.
    pub fn note_crossfade_gain(&self, note: u8, velocity: u8) -> f32 {
        crossfade_in(self.xfin_key, note, self.xf_keycurve)
            * crossfade_out(self.xfout_key, note, self.xf_keycurve)
            * crossfade_in(self.xfin_velocity, velocity, self.xf_velcurve)
            * crossfade_out(self.xfout_velocity, velocity, self.xf_velcurve)
    }

    /// Gain of the controller crossfades for the given controller values.
    pub fn cc_crossfade_gain(&self, cc: &[u8]) -> f32 {
        let value = |number: u8| cc.get(number as usize).copied().unwrap_or(0);
        let fade_in: f32 = self
            .xfin_cc
            .iter()
            .map(|(number, range)| crossfade_in(*range, value(number), self.xf_cccurve))
            .product();
        let fade_out: f32 = self
            .xfout_cc
            .iter()
            .map(|(number, range)| crossfade_out(*range, value(number), self.xf_cccurve))
            .product();
        fade_in * fade_out
    }

    /// Amplitude after controller modulation, as a gain factor.
    pub fn amplitude_gain(&self, cc: &[u8]) -> f32 {
        let modulation: f32 = self
            .amplitude_cc
            .iter()
            .map(|(number, amount)| {
                amount * normalize_7bits(cc.get(number as usize).copied().unwrap_or(0))
            })
            .sum();
        ((self.amplitude + modulation) / 100.0).max(0.0)
    }

    /// Left and right gains for the pan position.
    pub fn pan_gains(&self) -> (f32, f32) {
        let pan = (self.pan / 100.0).clamp(-1.0, 1.0);
        ((1.0 - pan).min(1.0), (1.0 + pan).min(1.0))
    }

    /// Pitch offset in cents for a note, with `random` in [-1, 1] scaling the
    /// random detune.
    pub fn pitch_cents(&self, note: u8, random: f32) -> f32 {
        (note as f32 - self.pitch_keycenter as f32) * self.pitch_keytrack
            + self.transpose as f32 * 100.0
            + self.tune
            + self.pitch_random * random
    }

    /// Pitch offset in cents for a pitch bend value.
    pub fn bend_cents(&self, bend: i16) -> f32 {
        let bend = normalize_bend(bend);
        if bend >= 0.0 {
            bend * self.bend_up
        } else {
            -bend * self.bend_down
        }
    }

    /// Delay before the voice starts, with `random` in [0, 1].
    pub fn delay_seconds(&self, random: f32) -> f32 {
        (self.delay + self.delay_random * random).max(0.0)
    }

    /// First source frame played, with `random` in [0, 1].
    pub fn offset_frames(&self, random: f32) -> u32 {
        self.offset + (self.offset_random as f32 * random) as u32
    }

    /// Random gain reduction, with `random` in [0, 1].
    pub fn random_gain(&self, random: f32) -> f32 {
        db_to_gain(-self.amp_random * random)
    }

    /// Attenuation of a release trigger for a note held this long.
    pub fn release_trigger_gain(&self, held_seconds: f32) -> f32 {
        db_to_gain(-self.rt_decay * held_seconds)
    }
}
