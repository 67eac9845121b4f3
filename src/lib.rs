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
//! Real-time core of a polyphonic sample-playback synthesizer.
//!
//! A [`Synth`] owns a fixed pool of [`Voice`]s, the immutable regions of a loaded
//! [`Instrument`] and a [`SamplePool`] that streams sample data from disk on
//! background threads. Hosts feed it note and controller events between blocks
//! and call [`Synth::render_block`] from their audio callback.

pub mod audio;
pub mod config;
pub mod curve;
pub mod envelope;
pub mod instrument;
pub mod level;
pub mod midi;
pub mod region;
pub mod samples;
pub mod synth;
mod thread_priority;
pub mod util;
pub mod voice;

#[cfg(test)]
mod test;
#[cfg(test)]
mod testutil;

pub use audio::{AudioBuffer, AudioSpan, AudioSpanMut};
pub use config::SynthConfig;
pub use instrument::Instrument;
pub use region::Region;
pub use samples::{FileId, SamplePool};
pub use synth::{EventSender, Synth, SynthError, SynthStats};
pub use voice::Voice;
