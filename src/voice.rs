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
//! One sounding note.
//!
//! Voices are allocated once with the synth and recycled. A voice refers to
//! its region and sample by index into tables the synth owns; the synth hands
//! both back on every render call, so a voice never holds a borrow across
//! blocks.

use std::fmt;

use rand::Rng;

use crate::audio::{AudioBuffer, AudioSpanMut, BufferCounter};
use crate::curve::CurveSet;
use crate::envelope::{
    AdsrEnvelope, AdsrParameters, EgShape, Envelope, EnvelopeGenerator, EnvelopeMode,
    LinearEnvelope, MultiplicativeEnvelope,
};
use crate::level::LevelTracker;
use crate::midi::MidiState;
use crate::region::{LoopMode, Region};
use crate::samples::{FileId, SampleEntry};
use crate::util::{cents_to_ratio, seconds_to_frames};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VoiceState {
    Idle,
    Playing,
    Releasing,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TriggerKind {
    NoteOn,
    NoteOff,
    Controller,
}

/// The event that started a voice.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TriggerEvent {
    pub kind: TriggerKind,
    pub channel: u8,
    /// Note or controller number.
    pub number: u8,
    /// Velocity or controller value.
    pub value: u8,
}

impl TriggerEvent {
    pub fn note_on(channel: u8, note: u8, velocity: u8) -> Self {
        Self {
            kind: TriggerKind::NoteOn,
            channel,
            number: note,
            value: velocity,
        }
    }

    /// A release trigger. `velocity` is the velocity of the matching note on.
    pub fn note_off(channel: u8, note: u8, velocity: u8) -> Self {
        Self {
            kind: TriggerKind::NoteOff,
            channel,
            number: note,
            value: velocity,
        }
    }

    pub fn controller(channel: u8, cc: u8, value: u8) -> Self {
        Self {
            kind: TriggerKind::Controller,
            channel,
            number: cc,
            value,
        }
    }
}

/// What a voice needs to start playing a region.
pub struct VoiceStart<'a> {
    pub region_index: usize,
    pub region: &'a Region,
    pub file: FileId,
    pub entry: &'a SampleEntry,
    pub trigger: TriggerEvent,
    /// Frames from the start of the block to the triggering event.
    pub delay: usize,
    pub event_id: u64,
    /// Synth clock at the start of the block.
    pub onset: u64,
    /// Extra gain factor, such as release trigger attenuation.
    pub gain: f32,
}

pub struct Voice {
    state: VoiceState,
    region: Option<usize>,
    file: Option<FileId>,
    trigger: TriggerEvent,
    event_id: u64,
    onset: u64,
    sustained: bool,

    sample_rate: f32,
    samples_per_block: usize,
    envelope_mode: EnvelopeMode,

    /// Frames to skip before the voice starts sounding.
    trigger_delay: usize,
    /// Read position in stored (oversampled) frames.
    position: f64,
    /// Source frames advanced per output frame, before pitch bend.
    pitch_ratio: f64,
    gain: f32,
    pan_gains: (f32, f32),
    end: usize,
    loop_start: usize,
    loop_end: usize,

    envelope: Envelope,
    /// Smooths the controller-driven gain between blocks.
    smoother: LinearEnvelope,
    level: LevelTracker,

    envelope_buffer: Vec<f32>,
    gain_buffer: Vec<f32>,
    scratch: AudioBuffer,
    counter: BufferCounter,
}

impl Voice {
    pub fn new(
        sample_rate: f32,
        samples_per_block: usize,
        envelope_mode: EnvelopeMode,
        counter: &BufferCounter,
    ) -> Self {
        let samples_per_block = samples_per_block.max(1);
        Self {
            state: VoiceState::Idle,
            region: None,
            file: None,
            trigger: TriggerEvent::note_on(0, 0, 0),
            event_id: 0,
            onset: 0,
            sustained: false,
            sample_rate,
            samples_per_block,
            envelope_mode,
            trigger_delay: 0,
            position: 0.0,
            pitch_ratio: 1.0,
            gain: 0.0,
            pan_gains: (1.0, 1.0),
            end: 0,
            loop_start: 0,
            loop_end: 0,
            envelope: Envelope::default(),
            smoother: LinearEnvelope::default(),
            level: LevelTracker::new(samples_per_block),
            envelope_buffer: vec![0.0; samples_per_block],
            gain_buffer: vec![0.0; samples_per_block],
            scratch: AudioBuffer::with_counter(2, samples_per_block, counter),
            counter: counter.clone(),
        }
    }

    /// Resizes the per-block buffers. Not for the render thread.
    pub fn set_samples_per_block(&mut self, samples_per_block: usize) {
        let samples_per_block = samples_per_block.max(1);
        self.samples_per_block = samples_per_block;
        self.level = LevelTracker::new(samples_per_block);
        self.envelope_buffer = vec![0.0; samples_per_block];
        self.gain_buffer = vec![0.0; samples_per_block];
        self.scratch = AudioBuffer::with_counter(2, samples_per_block, &self.counter);
    }

    pub fn set_sample_rate(&mut self, sample_rate: f32) {
        self.sample_rate = sample_rate;
    }

    pub fn set_envelope_mode(&mut self, envelope_mode: EnvelopeMode) {
        self.envelope_mode = envelope_mode;
    }

    /// Claims the voice for a region. Whatever it played before is dropped.
    pub fn start<R: Rng>(
        &mut self,
        start: VoiceStart<'_>,
        midi: &MidiState,
        curves: &CurveSet,
        rng: &mut R,
    ) {
        let region = start.region;
        let trigger = start.trigger;
        let cc = midi.cc_array(trigger.channel);
        let velocity = trigger.value;
        let note = match trigger.kind {
            TriggerKind::Controller => region.pitch_keycenter,
            TriggerKind::NoteOn | TriggerKind::NoteOff => trigger.number,
        };

        let information = start.entry.information();
        let factor = information
            .map(|i| i.oversampling().factor())
            .unwrap_or(1);
        let file_rate = information
            .map(|i| i.sample_rate() as f64)
            .unwrap_or(self.sample_rate as f64);

        let pitch_random: f32 = rng.gen_range(-1.0..=1.0);
        self.pitch_ratio = cents_to_ratio(region.pitch_cents(note, pitch_random)) * file_rate
            * factor as f64
            / self.sample_rate as f64;
        self.gain = start.gain
            * region.base_gain()
            * region.velocity_gain(velocity, curves)
            * region.note_crossfade_gain(note, velocity)
            * region.random_gain(rng.gen());
        self.pan_gains = region.pan_gains();

        self.trigger_delay =
            start.delay + seconds_to_frames(region.delay_seconds(rng.gen()), self.sample_rate);
        self.position = (region.offset_frames(rng.gen()) as usize * factor) as f64;
        self.end = region
            .end
            .map(|end| end as usize * factor)
            .unwrap_or(usize::MAX)
            .min(start.entry.capacity());
        let (loop_start, loop_end) = match region.loop_range {
            Some(range) => (
                range.start() as usize * factor,
                (range.end() as usize + 1) * factor - 1,
            ),
            None => (0, usize::MAX),
        };
        self.loop_end = loop_end.min(self.end.saturating_sub(1));
        self.loop_start = loop_start.min(self.loop_end);

        let params = AdsrParameters::from_description(&region.amp_eg, cc, velocity, self.sample_rate);
        self.envelope = match (&region.amp_lfo, region.amp_eg.shape) {
            (Some(lfo), _) => Envelope::Multiplicative(MultiplicativeEnvelope::new(
                AdsrEnvelope::new(params),
                lfo,
                self.sample_rate,
            )),
            (None, EgShape::Adsr) => Envelope::Adsr(AdsrEnvelope::new(params)),
            (None, EgShape::Linear) => {
                let mut linear = LinearEnvelope::default();
                linear.reset(params.start, 1.0, params.attack, params.delay);
                linear.set_release(params.release);
                Envelope::Linear(linear)
            }
        };
        self.smoother.reset(0.0, cc_gain(region, cc), 0, 0);
        self.level.clear();

        self.state = VoiceState::Playing;
        self.region = Some(start.region_index);
        self.file = Some(start.file);
        self.trigger = trigger;
        self.event_id = start.event_id;
        self.onset = start.onset + start.delay as u64;
        self.sustained = false;
    }

    /// Renders one block, mixing into `output`. `region` and `entry` must be
    /// the ones the voice was started with.
    pub fn render(
        &mut self,
        output: &mut AudioSpanMut<'_>,
        region: &Region,
        entry: &SampleEntry,
        midi: &MidiState,
    ) {
        if self.state == VoiceState::Idle || self.envelope.is_finished() {
            return;
        }
        let frames = output.num_frames().min(self.samples_per_block);
        let skip = self.trigger_delay.min(frames);
        self.trigger_delay -= skip;
        let active = frames - skip;
        if active == 0 {
            return;
        }

        // Nothing will ever play; let the envelope run out.
        if !entry.is_valid() && !self.envelope.is_released() {
            self.envelope.start_release(0);
            self.state = VoiceState::Releasing;
        }

        self.envelope
            .render(self.envelope_mode, &mut self.envelope_buffer[..active]);

        let cc = midi.cc_array(self.trigger.channel);
        let target = cc_gain(region, cc);
        if target != self.smoother.target() {
            self.smoother.retarget(target, active);
        }
        self.smoother.fill_block(&mut self.gain_buffer[..active]);

        let bend = region.bend_cents(midi.pitch_bend(self.trigger.channel));
        let step = self.pitch_ratio * cents_to_ratio(bend);
        let reader = entry.reader();
        let end = self.end.min(entry.total_frames());
        let looping = region.loops(self.state == VoiceState::Releasing) && self.loop_end < end;
        let loop_length = (self.loop_end + 1 - self.loop_start) as f64;
        let (left_pan, right_pan) = self.pan_gains;

        self.scratch.set_num_frames(active);
        let (left, right) = self.scratch.stereo_mut();
        let mut ended = false;
        for i in 0..active {
            if looping {
                while self.position >= (self.loop_end + 1) as f64 {
                    self.position -= loop_length;
                }
            }
            let index = self.position as usize;
            if !looping && index >= end {
                left[i..].fill(0.0);
                right[i..].fill(0.0);
                ended = true;
                break;
            }
            let next = if looping && index == self.loop_end {
                self.loop_start
            } else {
                index + 1
            };
            let fraction = (self.position - index as f64) as f32;
            let gain = self.envelope_buffer[i] * self.gain_buffer[i] * self.gain;
            let l = interpolate(reader.sample(0, index), reader.sample(0, next), fraction);
            let r = interpolate(reader.sample(1, index), reader.sample(1, next), fraction);
            left[i] = l * gain * left_pan;
            right[i] = r * gain * right_pan;
            self.level.push(0.5 * (left[i] + right[i]));
            self.position += step;
        }

        output
            .subspan_mut(skip, active)
            .add_from(&self.scratch.span());

        if ended {
            self.envelope.finish();
        }
    }

    /// Starts the release after `delay` frames. One-shot voices ignore it.
    pub fn release(&mut self, delay: usize, region: &Region) {
        if region.loop_mode == LoopMode::OneShot {
            return;
        }
        self.force_release(delay);
    }

    /// Starts the release whatever the loop mode.
    pub fn force_release(&mut self, delay: usize) {
        if self.state != VoiceState::Playing {
            return;
        }
        self.envelope
            .start_release(delay.saturating_sub(self.trigger_delay));
        self.state = VoiceState::Releasing;
        self.sustained = false;
    }

    /// Returns the voice to the free pool.
    pub fn reset(&mut self) {
        self.state = VoiceState::Idle;
        self.region = None;
        self.file = None;
        self.sustained = false;
        self.trigger_delay = 0;
        self.envelope.finish();
        self.level.clear();
    }

    pub fn state(&self) -> VoiceState {
        self.state
    }

    pub fn is_free(&self) -> bool {
        self.state == VoiceState::Idle
    }

    /// The voice is no longer producing sound and can be reclaimed.
    pub fn is_finished(&self) -> bool {
        self.state != VoiceState::Idle && self.envelope.is_finished()
    }

    pub fn region(&self) -> Option<usize> {
        self.region
    }

    pub fn file(&self) -> Option<FileId> {
        self.file
    }

    pub fn trigger(&self) -> &TriggerEvent {
        &self.trigger
    }

    pub fn event_id(&self) -> u64 {
        self.event_id
    }

    /// Synth clock at the frame the voice was triggered.
    pub fn onset(&self) -> u64 {
        self.onset
    }

    /// Note off arrived while the sustain pedal was down.
    pub fn is_sustained(&self) -> bool {
        self.sustained
    }

    pub fn set_sustained(&mut self, sustained: bool) {
        self.sustained = sustained;
    }

    /// RMS of the output over the last block.
    pub fn rms(&self) -> f32 {
        self.level.rms()
    }

    /// Frames before the voice makes sound.
    pub fn remaining_delay(&self) -> usize {
        self.trigger_delay + self.envelope.remaining_delay()
    }

    /// Read position in stored frames.
    pub fn position(&self) -> f64 {
        self.position
    }

    pub fn pitch_ratio(&self) -> f64 {
        self.pitch_ratio
    }
}

impl fmt::Debug for Voice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Voice")
            .field("state", &self.state)
            .field("region", &self.region)
            .field("trigger", &self.trigger)
            .field("position", &self.position)
            .field("envelope", &self.envelope)
            .finish()
    }
}

/// Gain of the controller modulations of a region, updated once per block.
fn cc_gain(region: &Region, cc: &[u8]) -> f32 {
    region.amplitude_gain(cc) * region.cc_crossfade_gain(cc)
}

#[inline]
fn interpolate(a: f32, b: f32, fraction: f32) -> f32 {
    a + (b - a) * fraction
}
