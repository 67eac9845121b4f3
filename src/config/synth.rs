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
use std::path::Path;

use config::{Config, Environment, File};
use serde::Deserialize;

use super::ConfigError;
use crate::audio::Oversampling;
use crate::envelope::EnvelopeMode;

/// Default number of voices.
pub const DEFAULT_VOICES: usize = 64;

/// Default preload window, in frames of the source files.
pub const DEFAULT_PRELOAD_SIZE: usize = 8192;

pub const DEFAULT_SAMPLE_RATE: f32 = 48000.0;

pub const DEFAULT_SAMPLES_PER_BLOCK: usize = 1024;

pub const DEFAULT_EVENT_QUEUE_SIZE: usize = 1024;

/// Settings fixed for a render session. Loaded from YAML, with
/// POLYSAMPLER_* environment variables taking precedence.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct SynthConfig {
    /// Maximum number of simultaneous voices.
    voices: usize,
    /// Frames of each file decoded before it can play.
    preload_size: usize,
    oversampling: Oversampling,
    sample_rate: f32,
    /// Largest block rendered at once. Longer requests are split.
    samples_per_block: usize,
    loader_threads: usize,
    /// Capacity of the queue behind [`crate::EventSender`].
    event_queue_size: usize,
    envelope_mode: EnvelopeMode,
    /// Master volume in dB.
    volume: f32,
    /// Seed for the random draws of regions. Random when unset.
    seed: Option<u64>,
}

impl Default for SynthConfig {
    fn default() -> Self {
        Self {
            voices: DEFAULT_VOICES,
            preload_size: DEFAULT_PRELOAD_SIZE,
            oversampling: Oversampling::default(),
            sample_rate: DEFAULT_SAMPLE_RATE,
            samples_per_block: DEFAULT_SAMPLES_PER_BLOCK,
            loader_threads: default_loader_threads(),
            event_queue_size: DEFAULT_EVENT_QUEUE_SIZE,
            envelope_mode: EnvelopeMode::default(),
            volume: 0.0,
            seed: None,
        }
    }
}

fn default_loader_threads() -> usize {
    (num_cpus::get() / 2).max(1)
}

impl SynthConfig {
    /// Parse a synth configuration from a YAML file.
    pub fn deserialize(path: &Path) -> Result<SynthConfig, ConfigError> {
        Ok(Config::builder()
            .add_source(File::from(path))
            .add_source(environment())
            .build()?
            .try_deserialize::<SynthConfig>()?)
    }

    /// Defaults overridden by the environment only.
    pub fn from_env() -> Result<SynthConfig, ConfigError> {
        Ok(Config::builder()
            .add_source(environment())
            .build()?
            .try_deserialize::<SynthConfig>()?)
    }

    pub fn voices(&self) -> usize {
        self.voices
    }

    pub fn preload_size(&self) -> usize {
        self.preload_size
    }

    pub fn oversampling(&self) -> Oversampling {
        self.oversampling
    }

    pub fn sample_rate(&self) -> f32 {
        self.sample_rate
    }

    pub fn samples_per_block(&self) -> usize {
        self.samples_per_block.max(1)
    }

    pub fn loader_threads(&self) -> usize {
        self.loader_threads.max(1)
    }

    pub fn event_queue_size(&self) -> usize {
        self.event_queue_size.max(1)
    }

    pub fn envelope_mode(&self) -> EnvelopeMode {
        self.envelope_mode
    }

    pub fn volume(&self) -> f32 {
        self.volume
    }

    pub fn seed(&self) -> Option<u64> {
        self.seed
    }

    pub fn with_voices(mut self, voices: usize) -> Self {
        self.voices = voices;
        self
    }

    pub fn with_preload_size(mut self, preload_size: usize) -> Self {
        self.preload_size = preload_size;
        self
    }

    pub fn with_oversampling(mut self, oversampling: Oversampling) -> Self {
        self.oversampling = oversampling;
        self
    }

    pub fn with_sample_rate(mut self, sample_rate: f32) -> Self {
        self.sample_rate = sample_rate;
        self
    }

    pub fn with_samples_per_block(mut self, samples_per_block: usize) -> Self {
        self.samples_per_block = samples_per_block;
        self
    }

    pub fn with_loader_threads(mut self, loader_threads: usize) -> Self {
        self.loader_threads = loader_threads;
        self
    }

    pub fn with_event_queue_size(mut self, event_queue_size: usize) -> Self {
        self.event_queue_size = event_queue_size;
        self
    }

    pub fn with_envelope_mode(mut self, envelope_mode: EnvelopeMode) -> Self {
        self.envelope_mode = envelope_mode;
        self
    }

    pub fn with_volume(mut self, volume: f32) -> Self {
        self.volume = volume;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = Some(seed);
        self
    }

    pub(crate) fn set_voices(&mut self, voices: usize) {
        self.voices = voices;
    }

    pub(crate) fn set_preload_size(&mut self, preload_size: usize) {
        self.preload_size = preload_size;
    }

    pub(crate) fn set_oversampling(&mut self, oversampling: Oversampling) {
        self.oversampling = oversampling;
    }

    pub(crate) fn set_sample_rate(&mut self, sample_rate: f32) {
        self.sample_rate = sample_rate;
    }

    pub(crate) fn set_samples_per_block(&mut self, samples_per_block: usize) {
        self.samples_per_block = samples_per_block;
    }

    pub(crate) fn set_envelope_mode(&mut self, envelope_mode: EnvelopeMode) {
        self.envelope_mode = envelope_mode;
    }

    pub(crate) fn set_volume(&mut self, volume: f32) {
        self.volume = volume;
    }
}

fn environment() -> Environment {
    Environment::with_prefix("POLYSAMPLER").try_parsing(true)
}
