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
//! The synth: voice allocation, event dispatch and block rendering.
//!
//! Everything except [`Synth::render_block`] and the event handlers belongs
//! on a control thread. Events can also be queued from any thread through an
//! [`EventSender`]; they are taken in at the start of the next block.

mod events;

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use crossbeam_channel::Receiver;
use rand::rngs::StdRng;
use rand::SeedableRng;
use tracing::{debug, info, warn};

pub use events::EventSender;

use crate::audio::{AudioSpanMut, BufferCounter, Oversampling};
use crate::config::{ConfigError, SynthConfig};
use crate::envelope::EnvelopeMode;
use crate::instrument::Instrument;
use crate::midi::{MidiState, SynthEvent};
use crate::region::Region;
use crate::samples::{FileId, SampleError, SamplePool};
use crate::util::db_to_gain;
use crate::voice::Voice;

/// Longest a freewheeling block waits for sample streaming.
const FREEWHEELING_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, thiserror::Error)]
pub enum SynthError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Samples(#[from] SampleError),
}

/// Counters of what the synth had to give up on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SynthStats {
    /// Voices cut off to make room for a new one.
    pub voices_stolen: u64,
    /// Region starts that found no voice to play on.
    pub notes_dropped: u64,
    /// Events rejected because the queue was full.
    pub events_dropped: u64,
}

pub struct Synth {
    config: SynthConfig,
    voices: Vec<Voice>,
    instrument: Instrument,
    /// Sample file of each region, by region index.
    region_files: Vec<FileId>,
    pool: SamplePool,
    midi: MidiState,
    rng: StdRng,
    counter: BufferCounter,

    events: Receiver<SynthEvent>,
    sender: EventSender,
    dropped_events: Arc<AtomicU64>,
    stats: SynthStats,

    volume_gain: f32,
    /// Frames rendered since creation.
    clock: u64,
    next_event_id: u64,
    /// Scratch list of region indices for event handling.
    matches: Vec<usize>,
    /// Data registered with [`Synth::register_sample`], kept to re-register
    /// it when the pool is rebuilt.
    memory_samples: BTreeMap<String, (Vec<Vec<f32>>, u32)>,
    /// Modification times of the instrument file and its samples when the
    /// instrument was set.
    file_times: BTreeMap<PathBuf, Option<SystemTime>>,
    freewheeling: bool,
}

impl Synth {
    pub fn new(config: SynthConfig) -> Result<Self, SynthError> {
        let counter = BufferCounter::new();
        let pool = SamplePool::new(
            config.loader_threads(),
            config.preload_size(),
            config.oversampling(),
            counter.clone(),
        )?;
        let voices = (0..config.voices())
            .map(|_| {
                Voice::new(
                    config.sample_rate(),
                    config.samples_per_block(),
                    config.envelope_mode(),
                    &counter,
                )
            })
            .collect();
        let rng = match config.seed() {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let (tx, events) = crossbeam_channel::bounded(config.event_queue_size());
        let dropped_events = Arc::new(AtomicU64::new(0));

        info!(
            voices = config.voices(),
            sample_rate = config.sample_rate(),
            samples_per_block = config.samples_per_block(),
            loader_threads = config.loader_threads(),
            "Synth created"
        );

        Ok(Self {
            volume_gain: db_to_gain(config.volume()),
            midi: MidiState::new(config.sample_rate()),
            config,
            voices,
            instrument: Instrument::default(),
            region_files: Vec::new(),
            pool,
            rng,
            counter,
            events,
            sender: EventSender::new(tx, dropped_events.clone()),
            dropped_events,
            stats: SynthStats::default(),
            clock: 0,
            next_event_id: 0,
            matches: Vec::new(),
            memory_samples: BTreeMap::new(),
            file_times: BTreeMap::new(),
            freewheeling: false,
        })
    }

    /// Loads an instrument file and replaces the current instrument with it.
    /// On error the current instrument is kept.
    pub fn load_instrument(&mut self, path: &Path) -> Result<(), SynthError> {
        let instrument = Instrument::from_file(path)?;
        self.set_instrument(instrument);
        Ok(())
    }

    /// Replaces the instrument. Every voice is stopped and the sample pool is
    /// rebuilt for the new regions.
    pub fn set_instrument(&mut self, instrument: Instrument) {
        self.reset_voices();
        self.pool.clear();
        for (name, (channels, sample_rate)) in &self.memory_samples {
            self.pool.insert_memory(name, channels.clone(), *sample_rate);
        }

        let mut file_times = BTreeMap::new();
        if let Some(source) = instrument.source() {
            file_times.insert(source.to_path_buf(), modified_time(source));
        }
        let mut region_files = Vec::with_capacity(instrument.num_regions());
        for region in instrument.regions() {
            let registered = match self.memory_samples.contains_key(&region.sample) {
                true => self.pool.id(Path::new(&region.sample)),
                false => None,
            };
            let id = match registered {
                Some(id) => id,
                None => {
                    let path = instrument.sample_path(region);
                    let id = self.pool.load(&path);
                    let modified = modified_time(&path);
                    file_times.insert(path, modified);
                    id
                }
            };
            region_files.push(id);
        }
        self.region_files = region_files;
        self.file_times = file_times;

        info!(
            regions = instrument.num_regions(),
            samples = self.pool.len(),
            preloaded = self.pool.num_preloaded_samples(),
            unknown = instrument.unknown_directives().count(),
            "Instrument set"
        );
        self.matches = Vec::with_capacity(instrument.num_regions());
        self.instrument = instrument;
    }

    /// Makes planar sample data available to regions under `name`. Register
    /// samples before setting the instrument that uses them.
    pub fn register_sample(&mut self, name: &str, channels: Vec<Vec<f32>>, sample_rate: u32) -> FileId {
        self.memory_samples
            .insert(name.to_string(), (channels.clone(), sample_rate));
        self.pool.insert_memory(name, channels, sample_rate)
    }

    /// Whether the instrument file or one of its samples changed on disk
    /// since the instrument was set.
    pub fn should_reload_file(&self) -> bool {
        for (path, recorded) in &self.file_times {
            if modified_time(path) != *recorded {
                debug!(path = ?path, "File modified since the instrument was set");
                return true;
            }
        }
        false
    }

    /// Loads the instrument again from its file, or rebuilds the sample pool
    /// for an instrument that was not loaded from a file.
    pub fn reload_instrument(&mut self) -> Result<(), SynthError> {
        match self.instrument.source().map(Path::to_path_buf) {
            Some(path) => self.load_instrument(&path),
            None => {
                self.reload_samples();
                Ok(())
            }
        }
    }

    /// Rebuilds the sample pool under the current settings.
    fn reload_samples(&mut self) {
        let instrument = std::mem::take(&mut self.instrument);
        self.set_instrument(instrument);
    }

    /// Renders the next block into `output`, overwriting it. Queued events
    /// are handled first, timed from the start of `output`. Longer outputs are
    /// rendered in chunks of the configured block size.
    pub fn render_block(&mut self, output: &mut AudioSpanMut<'_>) {
        while let Ok(event) = self.events.try_recv() {
            self.handle_event(event);
        }
        if self.freewheeling
            && self.is_streaming()
            && !self.pool.wait_until_loaded(FREEWHEELING_TIMEOUT)
        {
            warn!(
                timeout_ms = FREEWHEELING_TIMEOUT.as_millis(),
                "Sample streaming did not finish while freewheeling"
            );
        }

        let total = output.num_frames();
        let block = self.config.samples_per_block();
        let mut offset = 0;
        while offset < total {
            let frames = block.min(total - offset);
            let mut chunk = output.subspan_mut(offset, frames);
            chunk.fill(0.0);

            for voice in self.voices.iter_mut() {
                let (Some(region), Some(file)) = (voice.region(), voice.file()) else {
                    continue;
                };
                let (Some(region), Some(entry)) =
                    (self.instrument.region(region), self.pool.entry(file))
                else {
                    continue;
                };
                voice.render(&mut chunk, region, entry, &self.midi);
            }
            chunk.apply_gain(self.volume_gain);

            self.garbage_collect();
            self.midi.advance_time(frames);
            self.clock += frames as u64;
            offset += frames;
        }
    }

    /// Whether a playing voice reads a sample that is still streaming.
    fn is_streaming(&self) -> bool {
        self.voices
            .iter()
            .filter_map(|voice| voice.file())
            .filter_map(|file| self.pool.entry(file))
            .any(|entry| !entry.is_complete())
    }

    /// Renders offline from now on: each block waits for the samples its
    /// voices read to finish streaming instead of playing silence.
    pub fn enable_freewheeling(&mut self) {
        if !self.freewheeling {
            debug!("Freewheeling enabled");
        }
        self.freewheeling = true;
    }

    pub fn disable_freewheeling(&mut self) {
        if self.freewheeling {
            debug!("Freewheeling disabled");
        }
        self.freewheeling = false;
    }

    pub fn is_freewheeling(&self) -> bool {
        self.freewheeling
    }

    /// Frees the voices that finished playing. Returns how many were freed.
    pub fn garbage_collect(&mut self) -> usize {
        let mut freed = 0;
        for voice in self.voices.iter_mut().filter(|voice| voice.is_finished()) {
            retire(voice, &self.pool);
            freed += 1;
        }
        freed
    }

    /// Stops every voice immediately.
    pub fn all_sound_off(&mut self) {
        self.reset_voices();
    }

    fn reset_voices(&mut self) {
        for voice in self.voices.iter_mut().filter(|voice| !voice.is_free()) {
            retire(voice, &self.pool);
        }
    }

    /// Changes the polyphony. Every voice is stopped.
    pub fn set_num_voices(&mut self, voices: usize) {
        self.reset_voices();
        self.config.set_voices(voices);
        let counter = &self.counter;
        let config = &self.config;
        self.voices = (0..voices)
            .map(|_| {
                Voice::new(
                    config.sample_rate(),
                    config.samples_per_block(),
                    config.envelope_mode(),
                    counter,
                )
            })
            .collect();
        debug!(voices, "Polyphony changed");
    }

    pub fn set_sample_rate(&mut self, sample_rate: f32) {
        self.config.set_sample_rate(sample_rate);
        self.midi.set_sample_rate(sample_rate);
        for voice in &mut self.voices {
            voice.set_sample_rate(sample_rate);
        }
    }

    pub fn set_samples_per_block(&mut self, samples_per_block: usize) {
        self.config.set_samples_per_block(samples_per_block);
        let samples_per_block = self.config.samples_per_block();
        for voice in &mut self.voices {
            voice.set_samples_per_block(samples_per_block);
        }
    }

    /// Changes the preload window and reloads every sample.
    pub fn set_preload_size(&mut self, preload_size: usize) {
        if preload_size == self.pool.preload_size() {
            return;
        }
        self.config.set_preload_size(preload_size);
        self.pool.set_preload_size(preload_size);
        self.reload_samples();
    }

    /// Changes the oversampling factor and reloads every sample.
    pub fn set_oversampling(&mut self, oversampling: Oversampling) {
        if oversampling == self.pool.oversampling() {
            return;
        }
        self.config.set_oversampling(oversampling);
        self.pool.set_oversampling(oversampling);
        self.reload_samples();
    }

    /// Master volume in dB.
    pub fn set_volume(&mut self, volume: f32) {
        self.config.set_volume(volume);
        self.volume_gain = db_to_gain(volume);
    }

    pub fn volume(&self) -> f32 {
        self.config.volume()
    }

    pub fn set_envelope_mode(&mut self, envelope_mode: EnvelopeMode) {
        self.config.set_envelope_mode(envelope_mode);
        for voice in &mut self.voices {
            voice.set_envelope_mode(envelope_mode);
        }
    }

    /// A handle for queueing events from other threads.
    pub fn event_sender(&self) -> EventSender {
        self.sender.clone()
    }

    pub fn config(&self) -> &SynthConfig {
        &self.config
    }

    pub fn num_voices(&self) -> usize {
        self.voices.len()
    }

    pub fn num_active_voices(&self) -> usize {
        self.voices.iter().filter(|voice| !voice.is_free()).count()
    }

    pub fn voice(&self, index: usize) -> Option<&Voice> {
        self.voices.get(index)
    }

    pub fn instrument(&self) -> &Instrument {
        &self.instrument
    }

    pub fn num_regions(&self) -> usize {
        self.instrument.num_regions()
    }

    pub fn num_groups(&self) -> usize {
        self.instrument.num_groups()
    }

    pub fn num_masters(&self) -> usize {
        self.instrument.num_masters()
    }

    pub fn num_curves(&self) -> usize {
        self.instrument.num_curves()
    }

    pub fn region(&self, index: usize) -> Option<&Region> {
        self.instrument.region(index)
    }

    pub fn unknown_directives(&self) -> impl Iterator<Item = &str> {
        self.instrument.unknown_directives()
    }

    pub fn num_preloaded_samples(&self) -> usize {
        self.pool.num_preloaded_samples()
    }

    /// Bytes held by sample data and voice buffers.
    pub fn allocated_bytes(&self) -> usize {
        self.counter.bytes()
    }

    pub fn allocated_buffers(&self) -> usize {
        self.counter.buffers()
    }

    pub fn sample_pool(&self) -> &SamplePool {
        &self.pool
    }

    pub fn midi_state(&self) -> &MidiState {
        &self.midi
    }

    pub fn stats(&self) -> SynthStats {
        SynthStats {
            events_dropped: self.dropped_events.load(Ordering::Relaxed),
            ..self.stats
        }
    }

    /// Waits for background sample streaming to finish.
    pub fn wait_until_loaded(&self, timeout: Duration) -> bool {
        self.pool.wait_until_loaded(timeout)
    }
}

fn modified_time(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|metadata| metadata.modified()).ok()
}

/// Frees a voice and releases its hold on the sample.
fn retire(voice: &mut Voice, pool: &SamplePool) {
    if let Some(entry) = voice.file().and_then(|file| pool.entry(file)) {
        entry.remove_reader();
    }
    voice.reset();
}

impl fmt::Debug for Synth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Synth")
            .field("voices", &self.voices.len())
            .field("active_voices", &self.num_active_voices())
            .field("instrument", &self.instrument)
            .field("pool", &self.pool)
            .field("clock", &self.clock)
            .field("freewheeling", &self.freewheeling)
            .field("stats", &self.stats())
            .finish()
    }
}
