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
use super::error::SampleSourceError;
use super::traits::{check_channels, SampleSource};
use crate::audio::SampleFormat;

/// Planar sample data held in memory. Used for generated or host-provided
/// sounds, which go through the same loading path as decoded files.
pub struct MemorySampleSource {
    channels: Vec<Vec<f32>>,
    current_frame: usize,
    sample_rate: u32,
}

impl MemorySampleSource {
    /// Creates a source from planar channel data. Channels are truncated to
    /// the length of the shortest one.
    pub fn new(mut channels: Vec<Vec<f32>>, sample_rate: u32) -> Self {
        let frames = channels.iter().map(Vec::len).min().unwrap_or(0);
        channels.iter_mut().for_each(|c| c.truncate(frames));
        Self {
            channels,
            current_frame: 0,
            sample_rate,
        }
    }

    fn total_frames(&self) -> usize {
        self.channels.first().map(Vec::len).unwrap_or(0)
    }
}

impl SampleSource for MemorySampleSource {
    fn next_chunk(
        &mut self,
        output: &mut [Vec<f32>],
        max_frames: usize,
    ) -> Result<usize, SampleSourceError> {
        check_channels(output, self.channel_count())?;

        let available = self.total_frames().saturating_sub(self.current_frame);
        let to_copy = available.min(max_frames);
        let range = self.current_frame..self.current_frame + to_copy;
        for (out, channel) in output.iter_mut().zip(&self.channels) {
            out.clear();
            out.extend_from_slice(&channel[range.clone()]);
        }
        self.current_frame += to_copy;

        Ok(to_copy)
    }

    fn channel_count(&self) -> u16 {
        self.channels.len() as u16
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn bits_per_sample(&self) -> u16 {
        32
    }

    fn sample_format(&self) -> SampleFormat {
        SampleFormat::Float
    }

    fn frame_count(&self) -> Option<u64> {
        Some(self.total_frames() as u64)
    }
}
