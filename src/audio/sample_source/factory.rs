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
use std::path::Path;

use super::audio::AudioSampleSource;
use super::error::SampleSourceError;
use super::oversampler::Oversampler;
use super::traits::SampleSource;
use crate::audio::Oversampling;

/// Opens a sample file, oversampled by the given factor.
pub fn create_sample_source_from_file<P: AsRef<Path>>(
    path: P,
    oversampling: Oversampling,
) -> Result<Box<dyn SampleSource>, SampleSourceError> {
    let source = AudioSampleSource::from_file(path)?;
    oversample(Box::new(source), oversampling)
}

/// Wraps a source in an oversampler, or returns it untouched at x1.
pub fn oversample(
    source: Box<dyn SampleSource>,
    oversampling: Oversampling,
) -> Result<Box<dyn SampleSource>, SampleSourceError> {
    match oversampling.factor() {
        1 => Ok(source),
        factor => Ok(Box::new(Oversampler::new(source, factor)?)),
    }
}
