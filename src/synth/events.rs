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
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crossbeam_channel::{Sender, TrySendError};
use rand::Rng;

use super::{retire, Synth};
use crate::midi::{cc, SynthEvent};
use crate::region::TriggerType;
use crate::voice::{TriggerEvent, TriggerKind, Voice, VoiceStart, VoiceState};

/// Controller values at or above this hold the sustain pedal down.
const PEDAL_THRESHOLD: u8 = 64;

/// Queues events for a [`Synth`] from any thread. Sending never blocks: when
/// the queue is full the event is dropped and counted.
#[derive(Clone)]
pub struct EventSender {
    tx: Sender<SynthEvent>,
    dropped: Arc<AtomicU64>,
}

impl EventSender {
    pub(super) fn new(tx: Sender<SynthEvent>, dropped: Arc<AtomicU64>) -> Self {
        Self { tx, dropped }
    }

    /// Queues an event. Returns false if it was dropped.
    pub fn send(&self, event: SynthEvent) -> bool {
        match self.tx.try_send(event) {
            Ok(()) => true,
            Err(TrySendError::Full(_)) | Err(TrySendError::Disconnected(_)) => {
                self.dropped.fetch_add(1, Ordering::Relaxed);
                false
            }
        }
    }

    /// Decodes and queues a raw MIDI channel message. Messages the synth does
    /// not act on are ignored and return false.
    pub fn send_midi(&self, delay: usize, raw: &[u8]) -> bool {
        match SynthEvent::from_midi(delay, raw) {
            Some(event) => self.send(event),
            None => false,
        }
    }

    /// Events dropped so far because the queue was full.
    pub fn dropped(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

impl std::fmt::Debug for EventSender {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventSender")
            .field("queued", &self.tx.len())
            .field("dropped", &self.dropped())
            .finish()
    }
}

impl Synth {
    /// Applies an event immediately. Its delay is counted from the start of
    /// the next rendered block.
    pub fn handle_event(&mut self, event: SynthEvent) {
        match event {
            SynthEvent::NoteOn {
                delay,
                channel,
                note,
                velocity,
            } => self.note_on(delay, channel, note, velocity),
            SynthEvent::NoteOff {
                delay,
                channel,
                note,
                velocity,
            } => self.note_off(delay, channel, note, velocity),
            SynthEvent::Controller {
                delay,
                channel,
                cc,
                value,
            } => self.cc(delay, channel, cc, value),
            SynthEvent::PitchBend {
                delay,
                channel,
                bend,
            } => self.pitch_bend(delay, channel, bend),
        }
    }

    /// Starts every region matching the note. A velocity of 0 is a note off.
    pub fn note_on(&mut self, delay: usize, channel: u8, note: u8, velocity: u8) {
        if velocity == 0 {
            self.note_off(delay, channel, note, 0);
            return;
        }

        self.midi.note_on_event(delay, channel, note, velocity);
        let active_notes = self.midi.active_notes(channel);
        let random: f32 = self.rng.gen();
        let controllers = self.midi.cc_array(channel);

        let mut matches = std::mem::take(&mut self.matches);
        matches.clear();
        matches.extend(
            self.instrument
                .regions()
                .iter()
                .enumerate()
                .filter(|(_, region)| {
                    let fires = match region.trigger {
                        TriggerType::Attack => true,
                        TriggerType::First => active_notes == 1,
                        TriggerType::Legato => active_notes > 1,
                        TriggerType::Release => false,
                    };
                    fires && region.matches_note(channel, note, velocity, random, controllers)
                })
                .map(|(index, _)| index),
        );

        let event_id = self.new_event_id();
        let trigger = TriggerEvent::note_on(channel, note, velocity);
        for &index in &matches {
            self.trigger_region(index, trigger, delay, event_id, 1.0);
        }
        self.matches = matches;
    }

    /// Releases the voices of the note, or marks them sustained while the
    /// pedal is down, then starts the matching release regions.
    pub fn note_off(&mut self, delay: usize, channel: u8, note: u8, _velocity: u8) {
        let held = self.midi.note_duration(channel, note, delay);
        let velocity = self.midi.note_velocity(channel, note);
        self.midi.note_off_event(delay, channel, note);
        let pedal_down = self.pedal_down(channel);

        for voice in self.voices.iter_mut() {
            if !plays_note(voice, channel, note) {
                continue;
            }
            if pedal_down {
                voice.set_sustained(true);
            } else if let Some(region) = voice.region().and_then(|r| self.instrument.region(r)) {
                voice.release(delay, region);
            }
        }

        let random: f32 = self.rng.gen();
        let controllers = self.midi.cc_array(channel);
        let mut matches = std::mem::take(&mut self.matches);
        matches.clear();
        matches.extend(
            self.instrument
                .regions()
                .iter()
                .enumerate()
                .filter(|(_, region)| {
                    region.is_release_trigger()
                        && region.matches_note(channel, note, velocity, random, controllers)
                })
                .map(|(index, _)| index),
        );

        let event_id = self.new_event_id();
        let trigger = TriggerEvent::note_off(channel, note, velocity);
        for &index in &matches {
            let gain = self
                .instrument
                .region(index)
                .map(|region| region.release_trigger_gain(held))
                .unwrap_or(1.0);
            self.trigger_region(index, trigger, delay, event_id, gain);
        }
        self.matches = matches;
    }

    pub fn cc(&mut self, delay: usize, channel: u8, number: u8, value: u8) {
        let pedal_was_down = self.pedal_down(channel);
        match number {
            cc::RESET_ALL_CONTROLLERS => self.midi.reset_controllers(channel),
            _ => self.midi.cc_event(delay, channel, number, value),
        }
        if pedal_was_down && !self.pedal_down(channel) {
            self.release_sustained(delay, channel);
        }
        if matches!(number, cc::ALL_SOUND_OFF | cc::ALL_NOTES_OFF) {
            for voice in self.voices.iter_mut() {
                if !voice.is_free() && voice.trigger().channel == channel {
                    voice.force_release(delay);
                }
            }
        }

        let controllers = self.midi.cc_array(channel);
        let mut matches = std::mem::take(&mut self.matches);
        matches.clear();
        matches.extend(
            self.instrument
                .regions()
                .iter()
                .enumerate()
                .filter(|(_, region)| {
                    region.matches_cc_trigger(channel, number, value, controllers)
                })
                .map(|(index, _)| index),
        );
        if !matches.is_empty() {
            let event_id = self.new_event_id();
            let trigger = TriggerEvent::controller(channel, number, value);
            for &index in &matches {
                self.trigger_region(index, trigger, delay, event_id, 1.0);
            }
        }
        self.matches = matches;
    }

    pub fn pitch_bend(&mut self, delay: usize, channel: u8, bend: i16) {
        self.midi.pitch_bend_event(delay, channel, bend);
    }

    fn pedal_down(&self, channel: u8) -> bool {
        self.midi.cc_value(channel, cc::SUSTAIN) >= PEDAL_THRESHOLD
    }

    fn release_sustained(&mut self, delay: usize, channel: u8) {
        for voice in self.voices.iter_mut() {
            if !voice.is_sustained() || voice.trigger().channel != channel {
                continue;
            }
            voice.set_sustained(false);
            if let Some(region) = voice.region().and_then(|r| self.instrument.region(r)) {
                voice.release(delay, region);
            }
        }
    }

    fn new_event_id(&mut self) -> u64 {
        self.next_event_id += 1;
        self.next_event_id
    }

    /// Chokes the voices whose region is turned off by the region's group,
    /// then starts the region on a voice.
    fn trigger_region(
        &mut self,
        index: usize,
        trigger: TriggerEvent,
        delay: usize,
        event_id: u64,
        gain: f32,
    ) {
        let Some(group) = self.instrument.region(index).map(|region| region.group) else {
            return;
        };
        for voice in self.voices.iter_mut() {
            if voice.is_free() || voice.event_id() == event_id {
                continue;
            }
            let choked = voice
                .region()
                .and_then(|r| self.instrument.region(r))
                .is_some_and(|region| region.off_by == Some(group));
            if choked {
                voice.force_release(delay);
            }
        }
        self.start_region(index, trigger, delay, event_id, gain);
    }

    fn start_region(
        &mut self,
        index: usize,
        trigger: TriggerEvent,
        delay: usize,
        event_id: u64,
        gain: f32,
    ) {
        let (Some(region), Some(&file)) =
            (self.instrument.region(index), self.region_files.get(index))
        else {
            return;
        };
        let Some(entry) = self.pool.entry(file) else {
            return;
        };
        let Some(slot) = find_voice(&self.voices, event_id) else {
            self.stats.notes_dropped += 1;
            return;
        };

        let voice = &mut self.voices[slot];
        if !voice.is_free() {
            if !voice.is_finished() {
                self.stats.voices_stolen += 1;
            }
            retire(voice, &self.pool);
        }
        voice.start(
            VoiceStart {
                region_index: index,
                region,
                file,
                entry: entry.as_ref(),
                trigger,
                delay,
                event_id,
                onset: self.clock,
                gain,
            },
            &self.midi,
            self.instrument.curves(),
            &mut self.rng,
        );
        entry.add_reader();
    }
}

/// A voice still sounding from a note on of this note.
fn plays_note(voice: &Voice, channel: u8, note: u8) -> bool {
    let trigger = voice.trigger();
    voice.state() == VoiceState::Playing
        && trigger.kind == TriggerKind::NoteOn
        && trigger.channel == channel
        && trigger.number == note
}

/// A free or finished voice if there is one. Otherwise the quietest voice not
/// started by `event_id`, the oldest among equally quiet ones, the first
/// among equally old ones.
fn find_voice(voices: &[Voice], event_id: u64) -> Option<usize> {
    if let Some(index) = voices
        .iter()
        .position(|voice| voice.is_free() || voice.is_finished())
    {
        return Some(index);
    }
    voices
        .iter()
        .enumerate()
        .filter(|(_, voice)| voice.event_id() != event_id)
        .min_by(|(_, a), (_, b)| {
            a.rms()
                .total_cmp(&b.rms())
                .then_with(|| a.onset().cmp(&b.onset()))
        })
        .map(|(index, _)| index)
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_sender_counts_dropped_events() {
        let (tx, rx) = crossbeam_channel::bounded(2);
        let sender = EventSender::new(tx, Arc::new(AtomicU64::new(0)));
        let event = SynthEvent::PitchBend {
            delay: 0,
            channel: 0,
            bend: 100,
        };
        assert!(sender.send(event));
        assert!(sender.clone().send(event));
        assert!(!sender.send(event));
        assert_eq!(1, sender.dropped());
        assert_eq!(2, rx.len());
    }

    #[test]
    fn test_send_midi() {
        let (tx, rx) = crossbeam_channel::bounded(4);
        let sender = EventSender::new(tx, Arc::new(AtomicU64::new(0)));
        assert!(sender.send_midi(12, &[0x91, 60, 100]));
        // Program change is not handled.
        assert!(!sender.send_midi(0, &[0xC0, 5]));
        assert!(!sender.send_midi(0, &[]));
        assert_eq!(
            SynthEvent::NoteOn {
                delay: 12,
                channel: 1,
                note: 60,
                velocity: 100
            },
            rx.try_recv().unwrap()
        );
        assert!(rx.try_recv().is_err());
        assert_eq!(0, sender.dropped());
    }
}
