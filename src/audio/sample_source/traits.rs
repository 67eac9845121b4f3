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
use std::time::Duration;

use super::error::SampleSourceError;
use crate::audio::SampleFormat;

/// A source of audio samples that processes chunks in planar format. Sources
/// are moved to a loader thread and driven from there only.
pub trait SampleSource: Send {
    /// Get the next chunk of samples from the source in planar format.
    /// Each inner Vec corresponds to one channel and is cleared, then filled
    /// with up to `max_frames` samples.
    /// Returns the number of frames written (0 = EOF).
    ///
    /// The output slice must have exactly channel_count() elements.
    fn next_chunk(
        &mut self,
        output: &mut [Vec<f32>],
        max_frames: usize,
    ) -> Result<usize, SampleSourceError>;

    fn channel_count(&self) -> u16;

    fn sample_rate(&self) -> u32;

    fn bits_per_sample(&self) -> u16;

    fn sample_format(&self) -> SampleFormat;

    /// Total number of frames, if the container reports it.
    fn frame_count(&self) -> Option<u64>;

    fn duration(&self) -> Option<Duration> {
        self.frame_count()
            .map(|frames| Duration::from_secs_f64(frames as f64 / self.sample_rate().max(1) as f64))
    }
}

/// Lets boxed sources be wrapped by generic adapters such as the oversampler.
impl SampleSource for Box<dyn SampleSource> {
    fn next_chunk(
        &mut self,
        output: &mut [Vec<f32>],
        max_frames: usize,
    ) -> Result<usize, SampleSourceError> {
        (**self).next_chunk(output, max_frames)
    }

    fn channel_count(&self) -> u16 {
        (**self).channel_count()
    }

    fn sample_rate(&self) -> u32 {
        (**self).sample_rate()
    }

    fn bits_per_sample(&self) -> u16 {
        (**self).bits_per_sample()
    }

    fn sample_format(&self) -> SampleFormat {
        (**self).sample_format()
    }

    fn frame_count(&self) -> Option<u64> {
        (**self).frame_count()
    }

    fn duration(&self) -> Option<Duration> {
        (**self).duration()
    }
}

/// Checks that a caller handed us one output Vec per channel.
pub(crate) fn check_channels(output: &[Vec<f32>], expected: u16) -> Result<(), SampleSourceError> {
    if output.len() != expected as usize {
        return Err(SampleSourceError::ChannelMismatch {
            expected: expected as usize,
            actual: output.len(),
        });
    }
    Ok(())
}
