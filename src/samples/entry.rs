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
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};

use crate::audio::sample_source::SampleSource;
use crate::audio::{AllocationGuard, BufferCounter, Oversampling, SampleFormat};

/// Entries keep at most this many channels. Extra channels are decoded and
/// discarded.
pub const MAX_STORED_CHANNELS: usize = 2;

/// What the container reported about a sample file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FileInformation {
    channels: u16,
    sample_rate: u32,
    frames: Option<u64>,
    sample_format: SampleFormat,
    bits_per_sample: u16,
    oversampling: Oversampling,
}

impl FileInformation {
    /// Reads the information of a possibly oversampled source. Rates and
    /// lengths are reported at the native rate of the file.
    pub fn from_source(source: &dyn SampleSource, oversampling: Oversampling) -> Self {
        let factor = oversampling.factor();
        Self {
            channels: source.channel_count(),
            sample_rate: source.sample_rate() / factor as u32,
            frames: source.frame_count().map(|frames| frames / factor as u64),
            sample_format: source.sample_format(),
            bits_per_sample: source.bits_per_sample(),
            oversampling,
        }
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    /// Native sample rate of the file.
    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Native length of the file in frames, if known.
    pub fn frames(&self) -> Option<u64> {
        self.frames
    }

    pub fn sample_format(&self) -> SampleFormat {
        self.sample_format
    }

    pub fn bits_per_sample(&self) -> u16 {
        self.bits_per_sample
    }

    pub fn oversampling(&self) -> Oversampling {
        self.oversampling
    }
}

/// Decoded data of one sample file.
///
/// A single loader writes an entry, any number of voices read it. Samples are
/// stored as the bits of an `f32` in atomic cells; a write publishes its frames
/// by raising `frames_ready` with release ordering, and readers load it with
/// acquire ordering before touching the cells.
pub struct SampleEntry {
    path: PathBuf,
    information: Option<FileInformation>,
    channels: Vec<Box<[AtomicU32]>>,
    preload_frames: usize,
    frames_ready: AtomicUsize,
    valid: AtomicBool,
    complete: AtomicBool,
    readers: AtomicUsize,
    _allocation: Option<AllocationGuard>,
}

impl SampleEntry {
    /// Allocates storage for `capacity` frames of the given file.
    pub(crate) fn new(
        path: PathBuf,
        information: FileInformation,
        capacity: usize,
        preload_frames: usize,
        counter: &BufferCounter,
    ) -> Self {
        let stored = (information.channels() as usize).clamp(1, MAX_STORED_CHANNELS);
        let channels: Vec<Box<[AtomicU32]>> = (0..stored)
            .map(|_| (0..capacity).map(|_| AtomicU32::new(0)).collect())
            .collect();
        let bytes = stored * capacity * std::mem::size_of::<AtomicU32>();
        Self {
            path,
            information: Some(information),
            channels,
            preload_frames: preload_frames.min(capacity),
            frames_ready: AtomicUsize::new(0),
            valid: AtomicBool::new(true),
            complete: AtomicBool::new(false),
            readers: AtomicUsize::new(0),
            _allocation: Some(counter.track(bytes)),
        }
    }

    /// An entry for a file that could not be opened. It never holds data.
    pub(crate) fn invalid(path: PathBuf) -> Self {
        Self {
            path,
            information: None,
            channels: Vec::new(),
            preload_frames: 0,
            frames_ready: AtomicUsize::new(0),
            valid: AtomicBool::new(false),
            complete: AtomicBool::new(true),
            readers: AtomicUsize::new(0),
            _allocation: None,
        }
    }

    /// Stores `frames` frames of planar data at `offset` and publishes them.
    /// Returns how many frames fit. Only the loader of this entry may call it,
    /// and offsets must follow each other.
    pub(crate) fn write(&self, offset: usize, planar: &[Vec<f32>], frames: usize) -> usize {
        let end = (offset + frames).min(self.capacity());
        if end <= offset || planar.is_empty() {
            return 0;
        }
        for (index, channel) in self.channels.iter().enumerate() {
            let source = &planar[index.min(planar.len() - 1)];
            for (cell, value) in channel[offset..end].iter().zip(source) {
                cell.store(value.to_bits(), Ordering::Relaxed);
            }
        }
        self.frames_ready.store(end, Ordering::Release);
        end - offset
    }

    pub(crate) fn mark_complete(&self) {
        self.complete.store(true, Ordering::Release);
    }

    pub(crate) fn mark_invalid(&self) {
        self.valid.store(false, Ordering::Release);
        self.complete.store(true, Ordering::Release);
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// File information, or None if the file could not be opened.
    pub fn information(&self) -> Option<&FileInformation> {
        self.information.as_ref()
    }

    pub fn is_valid(&self) -> bool {
        self.valid.load(Ordering::Acquire)
    }

    /// No more frames will be published.
    pub fn is_complete(&self) -> bool {
        self.complete.load(Ordering::Acquire)
    }

    /// Frames allocated for the entry, at the stored (oversampled) rate.
    pub fn capacity(&self) -> usize {
        self.channels.first().map(|c| c.len()).unwrap_or(0)
    }

    pub fn preload_frames(&self) -> usize {
        self.preload_frames
    }

    pub fn frames_ready(&self) -> usize {
        self.frames_ready.load(Ordering::Acquire)
    }

    /// Frames that will be playable once loading ends: the capacity while
    /// loading, what was actually published afterwards.
    pub fn total_frames(&self) -> usize {
        if self.is_complete() {
            self.frames_ready()
        } else {
            self.capacity()
        }
    }

    pub fn num_channels(&self) -> usize {
        self.channels.len()
    }

    pub(crate) fn add_reader(&self) {
        self.readers.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn remove_reader(&self) {
        let _ = self
            .readers
            .fetch_update(Ordering::Relaxed, Ordering::Relaxed, |n| n.checked_sub(1));
    }

    /// Voices currently playing this entry.
    pub fn readers(&self) -> usize {
        self.readers.load(Ordering::Relaxed)
    }

    /// A snapshot of the published data for one block of reads.
    pub fn reader(&self) -> SampleReader<'_> {
        let valid = self.is_valid();
        SampleReader {
            entry: self,
            ready: if valid { self.frames_ready() } else { 0 },
            complete: self.is_complete(),
        }
    }
}

impl fmt::Debug for SampleEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SampleEntry")
            .field("path", &self.path)
            .field("information", &self.information)
            .field("capacity", &self.capacity())
            .field("frames_ready", &self.frames_ready())
            .field("valid", &self.is_valid())
            .field("complete", &self.is_complete())
            .finish()
    }
}

/// Read access to the frames published when the reader was taken.
#[derive(Clone, Copy)]
pub struct SampleReader<'a> {
    entry: &'a SampleEntry,
    ready: usize,
    complete: bool,
}

impl SampleReader<'_> {
    /// Frames that can be read.
    pub fn frames(&self) -> usize {
        self.ready
    }

    /// Whether the readable frames are all the entry will ever have.
    pub fn is_complete(&self) -> bool {
        self.complete
    }

    /// One sample, or silence past the readable frames. Mono data is read for
    /// every channel.
    #[inline]
    pub fn sample(&self, channel: usize, frame: usize) -> f32 {
        if frame >= self.ready {
            return 0.0;
        }
        let channels = &self.entry.channels;
        let cells = &channels[channel.min(channels.len() - 1)];
        f32::from_bits(cells[frame].load(Ordering::Relaxed))
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::audio::sample_source::MemorySampleSource;

    fn information(channels: u16) -> FileInformation {
        let source = MemorySampleSource::new(vec![vec![0.0; 8]; channels as usize], 44100);
        FileInformation::from_source(&source, Oversampling::X1)
    }

    #[test]
    fn test_write_publishes_frames() {
        let counter = BufferCounter::new();
        let entry = SampleEntry::new(PathBuf::from("a.wav"), information(2), 8, 4, &counter);
        assert_eq!(1, counter.buffers());
        assert_eq!(2 * 8 * 4, counter.bytes());
        assert_eq!(0, entry.frames_ready());
        assert_eq!(0.0, entry.reader().sample(0, 0));

        let written = entry.write(0, &[vec![0.1, 0.2, 0.3], vec![-0.1, -0.2, -0.3]], 3);
        assert_eq!(3, written);
        let reader = entry.reader();
        assert_eq!(3, reader.frames());
        assert_eq!(0.2, reader.sample(0, 1));
        assert_eq!(-0.3, reader.sample(1, 2));
        // Past the published frames reads as silence.
        assert_eq!(0.0, reader.sample(0, 3));

        // Writes past the capacity are cut.
        assert_eq!(5, entry.write(3, &[vec![1.0; 10], vec![1.0; 10]], 10));
        assert_eq!(8, entry.frames_ready());
        assert!(!entry.is_complete());
        assert_eq!(8, entry.total_frames());

        drop(entry);
        assert_eq!(0, counter.buffers());
        assert_eq!(0, counter.bytes());
    }

    #[test]
    fn test_mono_reads_on_every_channel() {
        let counter = BufferCounter::new();
        let entry = SampleEntry::new(PathBuf::from("a.wav"), information(1), 4, 4, &counter);
        entry.write(0, &[vec![0.5, 0.25]], 2);
        let reader = entry.reader();
        assert_eq!(1, entry.num_channels());
        assert_eq!(0.25, reader.sample(0, 1));
        assert_eq!(0.25, reader.sample(1, 1));
    }

    #[test]
    fn test_complete_entry_reports_published_length() {
        let counter = BufferCounter::new();
        let entry = SampleEntry::new(PathBuf::from("a.wav"), information(2), 8, 8, &counter);
        entry.write(0, &[vec![0.5; 5], vec![0.5; 5]], 5);
        entry.mark_complete();
        assert_eq!(5, entry.total_frames());
        assert!(entry.reader().is_complete());
    }

    #[test]
    fn test_invalid_entry_is_silent() {
        let entry = SampleEntry::invalid(PathBuf::from("missing.wav"));
        assert!(!entry.is_valid());
        assert!(entry.is_complete());
        assert!(entry.information().is_none());
        assert_eq!(0, entry.reader().frames());
        assert_eq!(0.0, entry.reader().sample(1, 0));

        let counter = BufferCounter::new();
        let entry = SampleEntry::new(PathBuf::from("a.wav"), information(1), 4, 4, &counter);
        entry.write(0, &[vec![1.0; 4]], 4);
        entry.mark_invalid();
        assert_eq!(0, entry.reader().frames());
    }

    #[test]
    fn test_readers() {
        let entry = SampleEntry::invalid(PathBuf::from("a.wav"));
        entry.add_reader();
        entry.add_reader();
        entry.remove_reader();
        assert_eq!(1, entry.readers());
        entry.remove_reader();
        entry.remove_reader();
        assert_eq!(0, entry.readers());
    }
}
