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
//! Sample pool: decoded sample data shared by every voice.
//!
//! Files are decoded on background loader threads. Each entry is allocated
//! for its full length up front and its first frames (the preload window) are
//! decoded before the entry is handed out, so voices can start immediately.
//! The render thread reads whatever has been published so far and never waits.

mod entry;
mod loader;
mod pool;

pub use entry::{FileInformation, SampleEntry, SampleReader};
pub use loader::LoaderPool;
pub use pool::{FileId, SamplePool};

use crate::audio::sample_source::SampleSourceError;

#[derive(Debug, thiserror::Error)]
pub enum SampleError {
    #[error("failed to start sample loader threads: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    #[error(transparent)]
    Source(#[from] SampleSourceError),
}
