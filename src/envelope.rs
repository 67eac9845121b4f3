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
//! Envelope generators.
//!
//! Every generator produces one gain value per sample and can also report a
//! single value standing for a whole block. The set of generators is closed,
//! so voices hold an [`Envelope`] and dispatch with a `match` instead of a
//! trait object.

mod adsr;
mod description;
mod linear;
mod multiplicative;

use serde::Deserialize;

pub use adsr::{AdsrEnvelope, AdsrParameters, AdsrState, RELEASE_THRESHOLD};
pub use description::{EgDescription, EgParameter, EgShape, LfoDescription};
pub use linear::LinearEnvelope;
pub use multiplicative::MultiplicativeEnvelope;

/// How voices evaluate their envelopes within a block.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnvelopeMode {
    /// One value per sample.
    #[default]
    PerSample,
    /// One value per block: the average of the per-sample values.
    Quantized,
}

pub trait EnvelopeGenerator {
    /// Advances by one sample and returns its value.
    fn next_value(&mut self) -> f32;

    /// Fills `output` with consecutive per-sample values.
    fn fill_block(&mut self, output: &mut [f32]) {
        for value in output.iter_mut() {
            *value = self.next_value();
        }
    }

    /// Advances by `frames` samples and returns the average of the values
    /// those samples would have had.
    fn next_quantized(&mut self, frames: usize) -> f32;

    /// Samples left before the envelope leaves its initial delay.
    fn remaining_delay(&self) -> usize;

    /// Starts the release after `delay` more samples.
    fn start_release(&mut self, delay: usize);

    fn is_released(&self) -> bool;

    /// The envelope outputs silence from now on.
    fn is_finished(&self) -> bool;

    /// Jumps to the finished state.
    fn finish(&mut self);
}

/// The envelope generators a voice can run.
#[derive(Debug, Clone)]
pub enum Envelope {
    Adsr(AdsrEnvelope),
    Linear(LinearEnvelope),
    Multiplicative(MultiplicativeEnvelope),
}

impl Envelope {
    /// Renders one block of values in the given mode. In quantized mode every
    /// value of the block is the block average.
    pub fn render(&mut self, mode: EnvelopeMode, output: &mut [f32]) {
        match mode {
            EnvelopeMode::PerSample => self.fill_block(output),
            EnvelopeMode::Quantized => {
                let value = self.next_quantized(output.len());
                output.fill(value);
            }
        }
    }
}

impl Default for Envelope {
    fn default() -> Self {
        Envelope::Adsr(AdsrEnvelope::default())
    }
}

macro_rules! dispatch {
    ($self:expr, $envelope:ident => $call:expr) => {
        match $self {
            Envelope::Adsr($envelope) => $call,
            Envelope::Linear($envelope) => $call,
            Envelope::Multiplicative($envelope) => $call,
        }
    };
}

impl EnvelopeGenerator for Envelope {
    fn next_value(&mut self) -> f32 {
        dispatch!(self, envelope => envelope.next_value())
    }

    fn fill_block(&mut self, output: &mut [f32]) {
        dispatch!(self, envelope => envelope.fill_block(output))
    }

    fn next_quantized(&mut self, frames: usize) -> f32 {
        dispatch!(self, envelope => envelope.next_quantized(frames))
    }

    fn remaining_delay(&self) -> usize {
        dispatch!(self, envelope => envelope.remaining_delay())
    }

    fn start_release(&mut self, delay: usize) {
        dispatch!(self, envelope => envelope.start_release(delay))
    }

    fn is_released(&self) -> bool {
        dispatch!(self, envelope => envelope.is_released())
    }

    fn is_finished(&self) -> bool {
        dispatch!(self, envelope => envelope.is_finished())
    }

    fn finish(&mut self) {
        dispatch!(self, envelope => envelope.finish())
    }
}

/// Envelopes made of segments whose sums have a closed form.
pub(crate) trait Segments {
    /// Samples left before a requested release starts. At the start of a
    /// sample a count of zero starts the release, any other count is
    /// decremented.
    fn pending_release(&mut self) -> &mut Option<usize>;

    fn enter_release(&mut self);

    /// Advances by up to `frames` samples without starting a pending release
    /// and returns the sum of their values.
    fn advance(&mut self, frames: usize) -> f64;

    fn current(&self) -> f32;
}

/// Average of the next `frames` values of a segmented envelope. The block is
/// walked in pieces that end where a pending release begins so that segment
/// sums never straddle the release point.
pub(crate) fn block_average<E: Segments>(envelope: &mut E, frames: usize) -> f32 {
    if frames == 0 {
        return envelope.current();
    }
    let mut sum = 0.0;
    let mut left = frames;
    while left > 0 {
        let chunk = match *envelope.pending_release() {
            Some(0) => {
                *envelope.pending_release() = None;
                envelope.enter_release();
                continue;
            }
            Some(countdown) => countdown.min(left),
            None => left,
        };
        sum += envelope.advance(chunk);
        if let Some(countdown) = envelope.pending_release().as_mut() {
            *countdown -= chunk;
        }
        left -= chunk;
    }
    (sum / frames as f64) as f32
}
