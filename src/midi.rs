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
//! Controller and note state, and the events that update it.

pub mod cc_map;
pub mod event;
pub mod state;

pub use cc_map::CCMap;
pub use event::SynthEvent;
pub use state::MidiState;

/// Number of MIDI channels tracked.
pub const NUM_CHANNELS: usize = 16;
/// Number of controllers per channel.
pub const NUM_CCS: usize = 128;
/// Number of notes per channel.
pub const NUM_NOTES: usize = 128;

/// Controllers with fixed meaning to the synth.
pub mod cc {
    pub const SUSTAIN: u8 = 64;
    pub const ALL_SOUND_OFF: u8 = 120;
    pub const RESET_ALL_CONTROLLERS: u8 = 121;
    pub const ALL_NOTES_OFF: u8 = 123;
}
