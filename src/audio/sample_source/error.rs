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
/// Errors raised while decoding or oversampling sample data.
#[derive(Debug, thiserror::Error)]
pub enum SampleSourceError {
    #[error("Oversampling x{factor} failed: {reason}")]
    OversamplingFailed { factor: usize, reason: String },

    #[error("Unsupported sample file {0}")]
    Unsupported(String),

    #[error("Output has {actual} channels, expected {expected}")]
    ChannelMismatch { expected: usize, actual: usize },

    #[error("Audio file error: {0}")]
    AudioError(#[from] symphonia::core::errors::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}
