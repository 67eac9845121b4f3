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
use midly::live::LiveEvent;
use midly::MidiMessage;

/// An event for the synth, timestamped in frames relative to the start of the
/// block it is delivered in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SynthEvent {
    NoteOn {
        delay: usize,
        channel: u8,
        note: u8,
        velocity: u8,
    },
    NoteOff {
        delay: usize,
        channel: u8,
        note: u8,
        velocity: u8,
    },
    Controller {
        delay: usize,
        channel: u8,
        cc: u8,
        value: u8,
    },
    /// Pitch bend in [-8192, 8191].
    PitchBend { delay: usize, channel: u8, bend: i16 },
}

impl SynthEvent {
    /// Decodes a raw MIDI channel message. A note on with zero velocity is a
    /// note off. Returns None for messages the synth does not act on.
    pub fn from_midi(delay: usize, raw: &[u8]) -> Option<SynthEvent> {
        let LiveEvent::Midi { channel, message } = LiveEvent::parse(raw).ok()? else {
            return None;
        };
        let channel = channel.as_int();

        match message {
            MidiMessage::NoteOn { key, vel } if vel.as_int() == 0 => Some(SynthEvent::NoteOff {
                delay,
                channel,
                note: key.as_int(),
                velocity: 0,
            }),
            MidiMessage::NoteOn { key, vel } => Some(SynthEvent::NoteOn {
                delay,
                channel,
                note: key.as_int(),
                velocity: vel.as_int(),
            }),
            MidiMessage::NoteOff { key, vel } => Some(SynthEvent::NoteOff {
                delay,
                channel,
                note: key.as_int(),
                velocity: vel.as_int(),
            }),
            MidiMessage::Controller { controller, value } => Some(SynthEvent::Controller {
                delay,
                channel,
                cc: controller.as_int(),
                value: value.as_int(),
            }),
            MidiMessage::PitchBend { bend } => Some(SynthEvent::PitchBend {
                delay,
                channel,
                bend: bend.as_int(),
            }),
            _ => None,
        }
    }

    pub fn delay(&self) -> usize {
        match *self {
            SynthEvent::NoteOn { delay, .. }
            | SynthEvent::NoteOff { delay, .. }
            | SynthEvent::Controller { delay, .. }
            | SynthEvent::PitchBend { delay, .. } => delay,
        }
    }

    pub fn channel(&self) -> u8 {
        match *self {
            SynthEvent::NoteOn { channel, .. }
            | SynthEvent::NoteOff { channel, .. }
            | SynthEvent::Controller { channel, .. }
            | SynthEvent::PitchBend { channel, .. } => channel,
        }
    }
}
