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
use rubato::{
    Resampler, SincFixedIn, SincInterpolationParameters, SincInterpolationType, WindowFunction,
};

use super::error::SampleSourceError;
use super::traits::{check_channels, SampleSource};
use crate::audio::SampleFormat;

/// Input block size for the sinc resampler.
const INPUT_BLOCK_SIZE: usize = 1024;

/// Zero-input rounds allowed to flush the resampler tail once the source ends.
const MAX_FLUSH_ROUNDS: usize = 4;

/// Raises the sample rate of a source by an integer factor with a band-limited
/// sinc resampler. The resampler's group delay is compensated, so output frame
/// `n * factor` lines up with input frame `n` and the stream is exactly
/// `factor` times as long as its source.
pub struct Oversampler<S: SampleSource> {
    source: S,
    factor: usize,
    resampler: SincFixedIn<f32>,
    /// Source frames waiting to be resampled (planar)
    input: Vec<Vec<f32>>,
    /// Reused buffer for reads from the source
    read_buffer: Vec<Vec<f32>>,
    /// Reused buffer for resampler output
    scratch: Vec<Vec<f32>>,
    /// Resampled frames ready for consumption (planar)
    fifo: Vec<Vec<f32>>,
    fifo_pos: usize,
    /// Leading output frames still to drop for delay compensation
    delay_left: usize,
    frames_in: u64,
    frames_out: u64,
    source_finished: bool,
    flush_rounds: usize,
}

impl<S: SampleSource> Oversampler<S> {
    pub fn new(source: S, factor: usize) -> Result<Self, SampleSourceError> {
        let channels = source.channel_count() as usize;
        let params = SincInterpolationParameters {
            sinc_len: 256,
            f_cutoff: 0.95,
            oversampling_factor: 128,
            interpolation: SincInterpolationType::Linear,
            window: WindowFunction::BlackmanHarris2,
        };
        let resampler =
            SincFixedIn::<f32>::new(factor as f64, 1.0, params, INPUT_BLOCK_SIZE, channels)
                .map_err(|e| SampleSourceError::OversamplingFailed {
                    factor,
                    reason: e.to_string(),
                })?;
        let scratch = resampler.output_buffer_allocate(true);
        let delay_left = resampler.output_delay();

        Ok(Self {
            source,
            factor,
            resampler,
            input: vec![Vec::with_capacity(2 * INPUT_BLOCK_SIZE); channels],
            read_buffer: vec![Vec::with_capacity(INPUT_BLOCK_SIZE); channels],
            scratch,
            fifo: vec![Vec::new(); channels],
            fifo_pos: 0,
            delay_left,
            frames_in: 0,
            frames_out: 0,
            source_finished: false,
            flush_rounds: 0,
        })
    }

    fn input_len(&self) -> usize {
        self.input.first().map(Vec::len).unwrap_or(0)
    }

    fn fifo_available(&self) -> usize {
        self.fifo
            .first()
            .map(|c| c.len().saturating_sub(self.fifo_pos))
            .unwrap_or(0)
    }

    fn exhausted(&self) -> bool {
        self.source_finished
            && self.input_len() == 0
            && (self.frames_out >= self.frames_in * self.factor as u64
                || self.flush_rounds >= MAX_FLUSH_ROUNDS)
    }

    /// Runs one resampler pass into the FIFO. Returns false once nothing more
    /// can be produced.
    fn fill_fifo(&mut self) -> Result<bool, SampleSourceError> {
        if self.exhausted() {
            return Ok(false);
        }

        let factor = self.factor;
        let failed = |e: rubato::ResampleError| SampleSourceError::OversamplingFailed {
            factor,
            reason: e.to_string(),
        };

        let needed = self.resampler.input_frames_next();
        while !self.source_finished && self.input_len() < needed {
            let missing = needed - self.input_len();
            let read = self.source.next_chunk(&mut self.read_buffer, missing)?;
            if read == 0 {
                self.source_finished = true;
                break;
            }
            self.frames_in += read as u64;
            for (input, chunk) in self.input.iter_mut().zip(&self.read_buffer) {
                input.extend_from_slice(chunk);
            }
        }

        let produced = if self.input_len() >= needed {
            let (consumed, produced) = self
                .resampler
                .process_into_buffer(&self.input, &mut self.scratch, None)
                .map_err(failed)?;
            self.input.iter_mut().for_each(|c| {
                c.drain(..consumed.min(c.len()));
            });
            produced
        } else {
            let (_, produced) = if self.input_len() > 0 {
                self.resampler.process_partial_into_buffer(
                    Some(self.input.as_slice()),
                    &mut self.scratch,
                    None,
                )
            } else {
                self.flush_rounds += 1;
                self.resampler.process_partial_into_buffer(
                    None::<&[Vec<f32>]>,
                    &mut self.scratch,
                    None,
                )
            }
            .map_err(failed)?;
            self.input.iter_mut().for_each(Vec::clear);
            produced
        };

        let skip = self.delay_left.min(produced);
        self.delay_left -= skip;
        let mut keep = produced - skip;
        if self.source_finished {
            let limit = (self.frames_in * factor as u64).saturating_sub(self.frames_out);
            keep = keep.min(limit as usize);
        }

        if self.fifo_pos > 0 {
            self.fifo.iter_mut().for_each(|c| {
                c.drain(..self.fifo_pos.min(c.len()));
            });
            self.fifo_pos = 0;
        }
        for (fifo, out) in self.fifo.iter_mut().zip(&self.scratch) {
            fifo.extend_from_slice(&out[skip..skip + keep]);
        }
        self.frames_out += keep as u64;

        Ok(true)
    }
}

impl<S: SampleSource> SampleSource for Oversampler<S> {
    fn next_chunk(
        &mut self,
        output: &mut [Vec<f32>],
        max_frames: usize,
    ) -> Result<usize, SampleSourceError> {
        check_channels(output, self.channel_count())?;
        output.iter_mut().for_each(Vec::clear);

        let mut written = 0;
        while written < max_frames {
            let available = self.fifo_available();
            if available == 0 {
                if !self.fill_fifo()? {
                    break;
                }
                continue;
            }

            let to_copy = available.min(max_frames - written);
            let range = self.fifo_pos..self.fifo_pos + to_copy;
            for (out, fifo) in output.iter_mut().zip(&self.fifo) {
                out.extend_from_slice(&fifo[range.clone()]);
            }
            self.fifo_pos += to_copy;
            written += to_copy;
        }

        Ok(written)
    }

    fn channel_count(&self) -> u16 {
        self.source.channel_count()
    }

    fn sample_rate(&self) -> u32 {
        self.source.sample_rate() * self.factor as u32
    }

    fn bits_per_sample(&self) -> u16 {
        32
    }

    fn sample_format(&self) -> SampleFormat {
        SampleFormat::Float
    }

    fn frame_count(&self) -> Option<u64> {
        self.source
            .frame_count()
            .map(|frames| frames * self.factor as u64)
    }
}
