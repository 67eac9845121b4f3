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
use super::{NUM_CCS, NUM_CHANNELS, NUM_NOTES};

#[derive(Clone)]
struct ChannelState {
    cc: [u8; NUM_CCS],
    pitch_bend: i16,
    note_on_time: [u64; NUM_NOTES],
    note_velocity: [u8; NUM_NOTES],
    held: [bool; NUM_NOTES],
    active_notes: usize,
}

impl Default for ChannelState {
    fn default() -> Self {
        Self {
            cc: [0; NUM_CCS],
            pitch_bend: 0,
            note_on_time: [0; NUM_NOTES],
            note_velocity: [0; NUM_NOTES],
            held: [false; NUM_NOTES],
            active_notes: 0,
        }
    }
}

/// Latest controller values, pitch bend and note timing for every channel.
///
/// Written only while events are taken in between blocks and read only while
/// rendering, so it needs no synchronization. Times are kept in frames on an
/// internal clock advanced once per block.
pub struct MidiState {
    channels: Vec<ChannelState>,
    internal_clock: u64,
    sample_rate: f32,
}

impl MidiState {
    pub fn new(sample_rate: f32) -> Self {
        Self {
            channels: vec![ChannelState::default(); NUM_CHANNELS],
            internal_clock: 0,
            sample_rate,
        }
    }

    pub fn set_sample_rate(&mut self, sample_rate: f32) {
        self.sample_rate = sample_rate;
    }

    /// Moves the clock forward by a rendered block.
    pub fn advance_time(&mut self, frames: usize) {
        self.internal_clock += frames as u64;
    }

    pub fn internal_clock(&self) -> u64 {
        self.internal_clock
    }

    pub fn note_on_event(&mut self, delay: usize, channel: u8, note: u8, velocity: u8) {
        let time = self.internal_clock + delay as u64;
        let Some(state) = self.channels.get_mut(channel as usize) else {
            return;
        };
        let note = note as usize % NUM_NOTES;
        state.note_on_time[note] = time;
        state.note_velocity[note] = velocity;
        if !state.held[note] {
            state.held[note] = true;
            state.active_notes += 1;
        }
    }

    pub fn note_off_event(&mut self, _delay: usize, channel: u8, note: u8) {
        let Some(state) = self.channels.get_mut(channel as usize) else {
            return;
        };
        let note = note as usize % NUM_NOTES;
        if state.held[note] {
            state.held[note] = false;
            state.active_notes -= 1;
        }
    }

    pub fn cc_event(&mut self, _delay: usize, channel: u8, cc: u8, value: u8) {
        if let Some(state) = self.channels.get_mut(channel as usize) {
            state.cc[cc as usize % NUM_CCS] = value;
        }
    }

    pub fn pitch_bend_event(&mut self, _delay: usize, channel: u8, bend: i16) {
        if let Some(state) = self.channels.get_mut(channel as usize) {
            state.pitch_bend = bend.clamp(-8192, 8191);
        }
    }

    pub fn cc_value(&self, channel: u8, cc: u8) -> u8 {
        self.channels
            .get(channel as usize)
            .map(|state| state.cc[cc as usize % NUM_CCS])
            .unwrap_or(0)
    }

    /// All controller values of a channel. Out of range channels read as channel 0.
    pub fn cc_array(&self, channel: u8) -> &[u8; NUM_CCS] {
        let index = if (channel as usize) < NUM_CHANNELS {
            channel as usize
        } else {
            0
        };
        &self.channels[index].cc
    }

    pub fn pitch_bend(&self, channel: u8) -> i16 {
        self.channels
            .get(channel as usize)
            .map(|state| state.pitch_bend)
            .unwrap_or(0)
    }

    /// Velocity of the last note on for this note.
    pub fn note_velocity(&self, channel: u8, note: u8) -> u8 {
        self.channels
            .get(channel as usize)
            .map(|state| state.note_velocity[note as usize % NUM_NOTES])
            .unwrap_or(0)
    }

    /// Seconds between the last note on for this note and `delay` frames into
    /// the current block.
    pub fn note_duration(&self, channel: u8, note: u8, delay: usize) -> f32 {
        let Some(state) = self.channels.get(channel as usize) else {
            return 0.0;
        };
        let now = self.internal_clock + delay as u64;
        let onset = state.note_on_time[note as usize % NUM_NOTES];
        now.saturating_sub(onset) as f32 / self.sample_rate
    }

    /// Number of notes currently held down on a channel.
    pub fn active_notes(&self, channel: u8) -> usize {
        self.channels
            .get(channel as usize)
            .map(|state| state.active_notes)
            .unwrap_or(0)
    }

    pub fn is_note_held(&self, channel: u8, note: u8) -> bool {
        self.channels
            .get(channel as usize)
            .map(|state| state.held[note as usize % NUM_NOTES])
            .unwrap_or(false)
    }

    /// Zeroes the controllers and pitch bend of a channel. Held notes are kept.
    pub fn reset_controllers(&mut self, channel: u8) {
        if let Some(state) = self.channels.get_mut(channel as usize) {
            state.cc = [0; NUM_CCS];
            state.pitch_bend = 0;
        }
    }

    /// Forgets everything, including the clock.
    pub fn reset(&mut self) {
        self.channels
            .iter_mut()
            .for_each(|state| *state = ChannelState::default());
        self.internal_clock = 0;
    }
}

impl std::fmt::Debug for MidiState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MidiState")
            .field("internal_clock", &self.internal_clock)
            .field("sample_rate", &self.sample_rate)
            .finish()
    }
}

#[cfg(test)]
mod test {
    use super::MidiState;

    #[test]
    fn test_cc_and_bend() {
        let mut state = MidiState::new(48000.0);
        state.cc_event(0, 1, 7, 100);
        state.pitch_bend_event(0, 1, -8192);
        assert_eq!(100, state.cc_value(1, 7));
        assert_eq!(0, state.cc_value(0, 7));
        assert_eq!(100, state.cc_array(1)[7]);
        assert_eq!(-8192, state.pitch_bend(1));

        state.reset_controllers(1);
        assert_eq!(0, state.cc_value(1, 7));
        assert_eq!(0, state.pitch_bend(1));
    }

    #[test]
    fn test_out_of_range_channels_are_ignored() {
        let mut state = MidiState::new(48000.0);
        state.cc_event(0, 16, 1, 10);
        state.note_on_event(0, 200, 60, 10);
        assert_eq!(0, state.cc_value(16, 1));
        assert_eq!(0, state.active_notes(200));
        assert_eq!(0, state.cc_array(16)[1]);
    }

    #[test]
    fn test_note_duration() {
        let mut state = MidiState::new(1000.0);
        state.note_on_event(250, 0, 60, 90);
        assert_eq!(90, state.note_velocity(0, 60));
        state.advance_time(1000);
        assert!((state.note_duration(0, 60, 250) - 1.0).abs() < 1e-6);
        assert!((state.note_duration(0, 60, 0) - 0.75).abs() < 1e-6);
    }

    #[test]
    fn test_active_notes() {
        let mut state = MidiState::new(48000.0);
        state.note_on_event(0, 0, 60, 100);
        state.note_on_event(0, 0, 64, 100);
        state.note_on_event(0, 0, 64, 100);
        assert_eq!(2, state.active_notes(0));
        assert!(state.is_note_held(0, 64));
        state.note_off_event(0, 0, 64);
        state.note_off_event(0, 0, 64);
        assert_eq!(1, state.active_notes(0));
        assert!(!state.is_note_held(0, 64));

        state.reset();
        assert_eq!(0, state.active_notes(0));
        assert_eq!(0, state.internal_clock());
    }
}
