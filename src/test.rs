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
use std::fs;
use std::path::Path;
use std::time::{Duration, SystemTime};

use crate::audio::AudioBuffer;
use crate::config::SynthConfig;
use crate::envelope::{EgParameter, EnvelopeMode};
use crate::instrument::Instrument;
use crate::midi::SynthEvent;
use crate::region::{LoopMode, Range, Region, TriggerType};
use crate::synth::Synth;
use crate::testutil::{eventually, first_non_silent, init_logging, write_wav_with_bits};
use crate::voice::{TriggerKind, VoiceState};

const RATE: u32 = 48000;
const BLOCK: usize = 256;
const TONE: &str = "tone";

fn config(voices: usize) -> SynthConfig {
    SynthConfig::default()
        .with_voices(voices)
        .with_sample_rate(RATE as f32)
        .with_samples_per_block(BLOCK)
        .with_loader_threads(1)
        .with_seed(7)
}

/// A synth playing a constant 0.5 mono tone of one second.
fn synth_with(voices: usize, regions: Vec<Region>) -> Synth {
    init_logging();
    let mut synth = Synth::new(config(voices)).unwrap();
    synth.register_sample(TONE, vec![vec![0.5; RATE as usize]], RATE);
    synth.set_instrument(Instrument::new(regions));
    assert!(synth.wait_until_loaded(Duration::from_secs(10)));
    synth
}

fn render(synth: &mut Synth, frames: usize) -> AudioBuffer {
    let mut output = AudioBuffer::new(2, frames);
    synth.render_block(&mut output.span_mut());
    output
}

fn region_with_release(seconds: f32) -> Region {
    let mut region = Region::new(TONE);
    region.amp_eg.release = EgParameter::new(seconds);
    region
}

#[test]
fn test_note_starts_at_event_offset() {
    for offset in [0, 1, 100, BLOCK - 1] {
        let mut synth = synth_with(4, vec![Region::new(TONE)]);
        synth.note_on(offset, 0, 60, 127);
        let output = render(&mut synth, BLOCK);
        assert_eq!(Some(offset), first_non_silent(output.channel(0), 1e-6));
        assert_eq!(Some(offset), first_non_silent(output.channel(1), 1e-6));
        assert!((output.channel(0)[BLOCK - 1] - 0.5).abs() < 1e-4);
    }
}

#[test]
fn test_offset_beyond_the_block_size() {
    let mut synth = synth_with(4, vec![Region::new(TONE)]);
    synth.note_on(BLOCK + 44, 0, 60, 127);
    let output = render(&mut synth, 3 * BLOCK + 10);
    assert_eq!(Some(BLOCK + 44), first_non_silent(output.channel(0), 1e-6));
}

#[test]
fn test_steals_the_quietest_voice() {
    let mut synth = synth_with(2, vec![Region::new(TONE)]);
    synth.note_on(0, 0, 60, 127);
    synth.note_on(0, 0, 62, 40);
    render(&mut synth, BLOCK);
    assert!(synth.voice(1).unwrap().rms() < synth.voice(0).unwrap().rms());

    synth.note_on(0, 0, 64, 100);
    assert_eq!(60, synth.voice(0).unwrap().trigger().number);
    assert_eq!(64, synth.voice(1).unwrap().trigger().number);
    assert_eq!(1, synth.stats().voices_stolen);
    assert_eq!(0, synth.stats().notes_dropped);
}

#[test]
fn test_steals_the_oldest_of_equally_quiet_voices() {
    let mut synth = synth_with(2, vec![Region::new(TONE)]);
    synth.note_on(0, 0, 60, 127);
    render(&mut synth, BLOCK);
    synth.note_on(0, 0, 62, 127);
    render(&mut synth, BLOCK);
    assert_eq!(synth.voice(0).unwrap().rms(), synth.voice(1).unwrap().rms());
    assert!(synth.voice(0).unwrap().onset() < synth.voice(1).unwrap().onset());

    synth.note_on(0, 0, 64, 127);
    assert_eq!(64, synth.voice(0).unwrap().trigger().number);
    assert_eq!(62, synth.voice(1).unwrap().trigger().number);
}

#[test]
fn test_one_extra_note_steals_one_voice() {
    for voices in [1, 2, 4, 8] {
        let mut synth = synth_with(voices, vec![Region::new(TONE)]);
        let sender = synth.event_sender();
        for note in 0..=voices {
            assert!(sender.send_midi(0, &[0x90, 60 + note as u8, 100]));
        }
        render(&mut synth, BLOCK);

        assert_eq!(1, synth.stats().voices_stolen, "{} voices", voices);
        assert_eq!(0, synth.stats().notes_dropped, "{} voices", voices);
        assert_eq!(voices, synth.num_active_voices());
        // Every voice ties on level and onset, so the first one goes.
        assert_eq!(60 + voices as u8, synth.voice(0).unwrap().trigger().number);
        for index in 1..voices {
            assert_eq!(60 + index as u8, synth.voice(index).unwrap().trigger().number);
        }
    }
}

#[test]
fn test_voices_of_the_same_event_are_not_stolen() {
    let mut synth = synth_with(1, vec![Region::new(TONE), Region::new(TONE)]);
    synth.note_on(0, 0, 60, 127);
    assert_eq!(1, synth.num_active_voices());
    assert_eq!(0, synth.stats().voices_stolen);
    assert_eq!(1, synth.stats().notes_dropped);
}

#[test]
fn test_garbage_collect_is_idempotent() {
    let mut synth = synth_with(4, vec![Region::new(TONE)]);
    let file = synth.sample_pool().id(Path::new(TONE)).unwrap();

    synth.note_on(0, 0, 60, 127);
    render(&mut synth, BLOCK);
    assert_eq!(1, synth.sample_pool().entry(file).unwrap().readers());

    // No release time: the voice is done within the block.
    synth.note_off(10, 0, 60, 0);
    let output = render(&mut synth, BLOCK);
    assert!(output.channel(0)[20..].iter().all(|s| *s == 0.0));
    assert_eq!(0, synth.num_active_voices());
    assert_eq!(0, synth.sample_pool().entry(file).unwrap().readers());
    assert_eq!(0, synth.garbage_collect());
    assert_eq!(0, synth.garbage_collect());
    assert_eq!(0, synth.sample_pool().entry(file).unwrap().readers());
}

#[test]
fn test_release_keeps_the_voice_until_done() {
    let mut synth = synth_with(4, vec![region_with_release(0.01)]);
    synth.note_on(0, 0, 60, 127);
    render(&mut synth, BLOCK);
    synth.note_off(0, 0, 60, 0);
    render(&mut synth, BLOCK);
    assert_eq!(VoiceState::Releasing, synth.voice(0).unwrap().state());

    // 480 release frames, then silence.
    render(&mut synth, BLOCK);
    render(&mut synth, BLOCK);
    assert_eq!(0, synth.num_active_voices());
}

#[test]
fn test_quantized_note_starts_at_event_offset() {
    for offset in [0, 1, 100, BLOCK - 1] {
        let mut synth = synth_with(4, vec![Region::new(TONE)]);
        synth.set_envelope_mode(EnvelopeMode::Quantized);
        synth.note_on(offset, 0, 60, 127);
        let output = render(&mut synth, BLOCK);
        assert_eq!(Some(offset), first_non_silent(output.channel(0), 1e-6));
        assert_eq!(Some(offset), first_non_silent(output.channel(1), 1e-6));
        assert!((output.channel(0)[BLOCK - 1] - 0.5).abs() < 1e-4);
    }
}

#[test]
fn test_quantized_release_frees_the_voice() {
    let mut synth = synth_with(4, vec![region_with_release(0.01)]);
    synth.set_envelope_mode(EnvelopeMode::Quantized);
    synth.note_on(0, 0, 60, 127);
    render(&mut synth, BLOCK);
    synth.note_off(0, 0, 60, 0);
    render(&mut synth, BLOCK);
    assert_eq!(VoiceState::Releasing, synth.voice(0).unwrap().state());

    for _ in 0..4 {
        render(&mut synth, BLOCK);
    }
    assert_eq!(0, synth.num_active_voices());
}

#[test]
fn test_one_shot_ignores_note_off() {
    let mut region = Region::new(TONE);
    region.loop_mode = LoopMode::OneShot;
    let mut synth = synth_with(4, vec![region]);
    synth.note_on(0, 0, 60, 127);
    synth.note_off(10, 0, 60, 0);
    render(&mut synth, BLOCK);
    assert_eq!(VoiceState::Playing, synth.voice(0).unwrap().state());
}

#[test]
fn test_preload_window_is_ready_before_streaming_finishes() {
    init_logging();
    let tempdir = tempfile::tempdir().unwrap();
    let frames = 200_000;
    write_wav_with_bits(
        &tempdir.path().join("long.wav"),
        vec![vec![16384i16; frames]],
        RATE,
        16,
    )
    .unwrap();

    let mut synth = Synth::new(config(4).with_preload_size(1024)).unwrap();
    synth.set_instrument(
        Instrument::new(vec![Region::new("long.wav")]).with_root(tempdir.path()),
    );
    let file = synth
        .sample_pool()
        .id(&tempdir.path().join("long.wav"))
        .unwrap();
    let entry = synth.sample_pool().entry(file).unwrap().clone();
    assert!(entry.is_valid());
    assert_eq!(1024, entry.preload_frames());
    assert!(entry.frames_ready() >= 1024);
    assert_eq!(1, synth.num_preloaded_samples());

    // Playback can start right away.
    synth.note_on(0, 0, 60, 127);
    let output = render(&mut synth, BLOCK);
    assert!((output.channel(0)[0] - 0.5).abs() < 1e-3);

    eventually(|| entry.is_complete(), "Sample never finished streaming");
    assert_eq!(frames, entry.frames_ready());
    assert!(synth.wait_until_loaded(Duration::from_secs(10)));
}

#[test]
fn test_freewheeling_waits_for_streaming() {
    init_logging();
    let tempdir = tempfile::tempdir().unwrap();
    write_wav_with_bits(
        &tempdir.path().join("long.wav"),
        vec![vec![16384i16; 200_000]],
        RATE,
        16,
    )
    .unwrap();

    let mut region = Region::new("long.wav");
    region.offset = 150_000;
    let mut synth = Synth::new(config(4).with_preload_size(1024)).unwrap();
    synth.set_instrument(Instrument::new(vec![region]).with_root(tempdir.path()));
    synth.enable_freewheeling();
    assert!(synth.is_freewheeling());

    // The voice starts far past the preload window but never reads silence.
    synth.note_on(0, 0, 60, 127);
    let output = render(&mut synth, BLOCK);
    assert!((output.channel(0)[0] - 0.5).abs() < 1e-3);
    assert!(output.channel(0).iter().all(|s| (s - 0.5).abs() < 1e-3));
    let file = synth.voice(0).unwrap().file().unwrap();
    assert!(synth.sample_pool().entry(file).unwrap().is_complete());

    synth.disable_freewheeling();
    assert!(!synth.is_freewheeling());
}

/// Pushes the modification time of a file into the future.
fn touch(path: &Path, seconds: u64) {
    fs::File::options()
        .write(true)
        .open(path)
        .unwrap()
        .set_modified(SystemTime::now() + Duration::from_secs(seconds))
        .unwrap();
}

#[test]
fn test_modified_files_are_detected() {
    init_logging();
    let tempdir = tempfile::tempdir().unwrap();
    let sample = tempdir.path().join("kick.wav");
    write_wav_with_bits(&sample, vec![vec![16384i16; 4000]], RATE, 16).unwrap();
    let path = tempdir.path().join("kit.yaml");
    fs::write(&path, "regions:\n  - { sample: kick.wav }\n").unwrap();

    let mut synth = Synth::new(config(4)).unwrap();
    synth.load_instrument(&path).unwrap();
    assert!(synth.wait_until_loaded(Duration::from_secs(10)));
    assert!(!synth.should_reload_file());

    touch(&sample, 100);
    assert!(synth.should_reload_file());
    synth.reload_instrument().unwrap();
    assert!(!synth.should_reload_file());

    fs::write(&path, "regions:\n  - { sample: kick.wav }\n  - { sample: kick.wav }\n").unwrap();
    touch(&path, 200);
    assert!(synth.should_reload_file());
    synth.reload_instrument().unwrap();
    assert_eq!(2, synth.num_regions());
    assert!(!synth.should_reload_file());

    fs::remove_file(&sample).unwrap();
    assert!(synth.should_reload_file());
}

#[test]
fn test_in_memory_instrument_is_never_stale() {
    let mut synth = synth_with(4, vec![Region::new(TONE)]);
    assert!(!synth.should_reload_file());
    synth.reload_instrument().unwrap();
    assert_eq!(1, synth.num_regions());
    assert!(synth.sample_pool().id(Path::new(TONE)).is_some());
}

#[test]
fn test_missing_sample_is_silent() {
    init_logging();
    let tempdir = tempfile::tempdir().unwrap();
    let mut synth = Synth::new(config(4)).unwrap();
    synth.set_instrument(Instrument::new(vec![Region::new("nope.wav")]).with_root(tempdir.path()));
    assert_eq!(0, synth.num_preloaded_samples());

    synth.note_on(0, 0, 60, 127);
    let output = render(&mut synth, BLOCK);
    assert_eq!(None, first_non_silent(output.channel(0), 0.0));
    render(&mut synth, BLOCK);
    assert_eq!(0, synth.num_active_voices());
}

#[test]
fn test_load_instrument_file() {
    init_logging();
    let tempdir = tempfile::tempdir().unwrap();
    fs::create_dir(tempdir.path().join("samples")).unwrap();
    write_wav_with_bits(
        &tempdir.path().join("samples").join("kick.wav"),
        vec![vec![16384i16; 8000]],
        RATE,
        16,
    )
    .unwrap();
    let path = tempdir.path().join("kit.yaml");
    fs::write(
        &path,
        r#"
default_path: samples
groups:
  - settings: { group: 1 }
    regions:
      - { sample: kick.wav, key_range: [36, 36], sw_last: 12 }
"#,
    )
    .unwrap();

    let mut synth = Synth::new(config(4)).unwrap();
    synth.load_instrument(&path).unwrap();
    assert!(synth.wait_until_loaded(Duration::from_secs(10)));
    assert_eq!(1, synth.num_regions());
    assert_eq!(1, synth.num_groups());
    assert_eq!(0, synth.num_masters());
    assert_eq!(1, synth.num_preloaded_samples());
    assert_eq!(vec!["sw_last"], synth.unknown_directives().collect::<Vec<_>>());

    synth.note_on(0, 0, 37, 127);
    assert_eq!(0, synth.num_active_voices());
    synth.note_on(5, 0, 36, 127);
    let output = render(&mut synth, BLOCK);
    assert_eq!(Some(5), first_non_silent(output.channel(0), 1e-6));

    assert!(synth
        .load_instrument(&tempdir.path().join("missing.yaml"))
        .is_err());
    assert_eq!(1, synth.num_regions());
}

#[test]
fn test_release_trigger() {
    let mut release = Region::new(TONE);
    release.trigger = TriggerType::Release;
    release.rt_decay = 6.0;
    let mut synth = synth_with(4, vec![Region::new(TONE), release]);

    synth.note_on(0, 0, 60, 100);
    assert_eq!(1, synth.num_active_voices());
    render(&mut synth, BLOCK);

    synth.note_off(0, 0, 60, 0);
    let voice = synth.voice(1).unwrap();
    assert_eq!(TriggerKind::NoteOff, voice.trigger().kind);
    assert_eq!(100, voice.trigger().value);
    assert_eq!(Some(1), voice.region());
}

#[test]
fn test_first_and_legato_triggers() {
    let mut first = Region::new(TONE);
    first.trigger = TriggerType::First;
    let mut legato = Region::new(TONE);
    legato.trigger = TriggerType::Legato;
    let mut synth = synth_with(4, vec![first, legato]);

    synth.note_on(0, 0, 60, 100);
    assert_eq!(Some(0), synth.voice(0).unwrap().region());
    synth.note_on(0, 0, 62, 100);
    assert_eq!(Some(1), synth.voice(1).unwrap().region());
    assert_eq!(2, synth.num_active_voices());
}

#[test]
fn test_sustain_pedal() {
    let mut synth = synth_with(4, vec![region_with_release(1.0)]);
    synth.cc(0, 0, 64, 127);
    synth.note_on(0, 0, 60, 127);
    render(&mut synth, BLOCK);

    synth.note_off(0, 0, 60, 0);
    let voice = synth.voice(0).unwrap();
    assert_eq!(VoiceState::Playing, voice.state());
    assert!(voice.is_sustained());

    synth.cc(0, 0, 64, 0);
    let voice = synth.voice(0).unwrap();
    assert_eq!(VoiceState::Releasing, voice.state());
    assert!(!voice.is_sustained());
}

#[test]
fn test_reset_controllers_lifts_the_pedal() {
    let mut synth = synth_with(4, vec![region_with_release(1.0)]);
    synth.cc(0, 0, 64, 127);
    synth.cc(0, 0, 7, 90);
    synth.note_on(0, 0, 60, 127);
    synth.note_off(0, 0, 60, 0);

    synth.cc(0, 0, 121, 0);
    assert_eq!(0, synth.midi_state().cc_value(0, 7));
    assert_eq!(VoiceState::Releasing, synth.voice(0).unwrap().state());
}

#[test]
fn test_all_notes_off() {
    let mut synth = synth_with(4, vec![region_with_release(1.0)]);
    synth.note_on(0, 0, 60, 127);
    synth.note_on(0, 0, 64, 127);
    synth.note_on(0, 1, 67, 127);
    synth.cc(0, 0, 123, 0);
    assert_eq!(VoiceState::Releasing, synth.voice(0).unwrap().state());
    assert_eq!(VoiceState::Releasing, synth.voice(1).unwrap().state());
    assert_eq!(VoiceState::Playing, synth.voice(2).unwrap().state());
}

#[test]
fn test_cc_trigger() {
    let mut region = Region::new(TONE);
    region.cc_triggers.insert(20, Range::new(64, 127));
    let mut synth = synth_with(4, vec![region]);

    synth.note_on(0, 0, 60, 127);
    assert_eq!(0, synth.num_active_voices());
    synth.cc(0, 0, 20, 10);
    assert_eq!(0, synth.num_active_voices());
    synth.cc(8, 0, 20, 100);
    assert_eq!(1, synth.num_active_voices());
    assert_eq!(TriggerKind::Controller, synth.voice(0).unwrap().trigger().kind);

    let output = render(&mut synth, BLOCK);
    assert_eq!(Some(8), first_non_silent(output.channel(0), 1e-6));
}

#[test]
fn test_off_by_chokes_other_groups() {
    let mut open = region_with_release(1.0);
    open.key_range = Range::new(46, 46);
    open.group = 2;
    open.off_by = Some(1);
    let mut closed = region_with_release(1.0);
    closed.key_range = Range::new(42, 42);
    closed.group = 1;
    let mut synth = synth_with(4, vec![open, closed]);

    synth.note_on(0, 0, 46, 127);
    render(&mut synth, BLOCK);
    assert_eq!(VoiceState::Playing, synth.voice(0).unwrap().state());

    synth.note_on(0, 0, 42, 127);
    assert_eq!(VoiceState::Releasing, synth.voice(0).unwrap().state());
    assert_eq!(VoiceState::Playing, synth.voice(1).unwrap().state());
}

#[test]
fn test_queued_events() {
    let mut synth = synth_with(4, vec![Region::new(TONE)]);
    let sender = synth.event_sender();
    assert!(sender.send_midi(10, &[0x90, 60, 100]));
    assert_eq!(0, synth.num_active_voices());

    let output = render(&mut synth, BLOCK);
    assert_eq!(Some(10), first_non_silent(output.channel(0), 1e-6));
    assert_eq!(1, synth.num_active_voices());

    // A note on with zero velocity is a note off.
    assert!(sender.send(SynthEvent::NoteOn {
        delay: 0,
        channel: 0,
        note: 60,
        velocity: 0,
    }));
    render(&mut synth, BLOCK);
    assert_eq!(0, synth.num_active_voices());
}

#[test]
fn test_full_queue_drops_events() {
    init_logging();
    let mut synth = Synth::new(config(4).with_event_queue_size(1)).unwrap();
    let sender = synth.event_sender();
    assert!(sender.send_midi(0, &[0x90, 60, 100]));
    assert!(!sender.send_midi(0, &[0x90, 62, 100]));
    assert_eq!(1, synth.stats().events_dropped);
    render(&mut synth, BLOCK);
    assert!(sender.send_midi(0, &[0x90, 64, 100]));
}

#[test]
fn test_volume() {
    let mut synth = synth_with(4, vec![Region::new(TONE)]);
    synth.set_volume(-6.0);
    synth.note_on(0, 0, 60, 127);
    let output = render(&mut synth, BLOCK);
    assert!((output.channel(0)[10] - 0.5 * 0.501_187).abs() < 1e-4);
}

#[test]
fn test_allocation_accounting() {
    let mut synth = synth_with(4, vec![Region::new(TONE)]);
    // Four voice scratch buffers and the tone.
    assert_eq!(5, synth.allocated_buffers());
    let bytes = synth.allocated_bytes();
    assert!(bytes >= RATE as usize * 4);

    synth.set_num_voices(8);
    assert_eq!(8, synth.num_voices());
    assert_eq!(9, synth.allocated_buffers());
    assert!(synth.allocated_bytes() > bytes);

    // Registered samples stay in the pool across instruments.
    synth.set_instrument(Instrument::default());
    assert_eq!(9, synth.allocated_buffers());
}

#[test]
fn test_setters_reload_samples() {
    let mut synth = synth_with(2, vec![Region::new(TONE)]);
    synth.set_oversampling(crate::audio::Oversampling::X2);
    assert!(synth.wait_until_loaded(Duration::from_secs(10)));
    let file = synth.sample_pool().id(Path::new(TONE)).unwrap();
    let entry = synth.sample_pool().entry(file).unwrap();
    assert_eq!(2 * RATE as usize, entry.capacity());
    assert!(entry.is_complete());

    synth.set_samples_per_block(64);
    synth.note_on(0, 0, 60, 127);
    let output = render(&mut synth, BLOCK);
    assert!((output.channel(0)[BLOCK - 1] - 0.5).abs() < 1e-2);
}
