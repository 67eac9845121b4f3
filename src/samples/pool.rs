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
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use super::entry::{FileInformation, SampleEntry};
use super::loader::{LoaderPool, Stream};
use super::SampleError;
use crate::audio::sample_source::{
    create_sample_source_from_file, oversample, MemorySampleSource, SampleSource,
    SampleSourceError,
};
use crate::audio::{BufferCounter, Oversampling};

/// Index of a sample in its pool.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FileId(usize);

impl FileId {
    pub fn index(self) -> usize {
        self.0
    }
}

/// Catalogue of the sample files referenced by the loaded instrument.
pub struct SamplePool {
    ids: HashMap<PathBuf, FileId>,
    entries: Vec<Arc<SampleEntry>>,
    loader: LoaderPool,
    /// Cancels the streams of the current entries. Replaced on clear.
    shutdown: Arc<AtomicBool>,
    preload_size: usize,
    oversampling: Oversampling,
    counter: BufferCounter,
}

impl SamplePool {
    pub fn new(
        loader_threads: usize,
        preload_size: usize,
        oversampling: Oversampling,
        counter: BufferCounter,
    ) -> Result<Self, SampleError> {
        Ok(Self {
            ids: HashMap::new(),
            entries: Vec::new(),
            loader: LoaderPool::new(loader_threads)?,
            shutdown: Arc::new(AtomicBool::new(false)),
            preload_size,
            oversampling,
            counter,
        })
    }

    /// Returns the id of a sample file, loading it on first reference.
    ///
    /// The preload window is decoded before this returns and the rest of the
    /// file is streamed in the background. A file that cannot be opened or
    /// decoded still gets an id; its entry is invalid and plays silence.
    pub fn load(&mut self, path: &Path) -> FileId {
        if let Some(id) = self.ids.get(path) {
            debug!(path = ?path, "Using cached sample");
            return *id;
        }

        let entry = match create_sample_source_from_file(path, self.oversampling) {
            Ok(source) => self.start(path.to_path_buf(), source),
            Err(e) => {
                warn!(path = ?path, err = %e, "Failed to open sample");
                Arc::new(SampleEntry::invalid(path.to_path_buf()))
            }
        };
        self.insert(path.to_path_buf(), entry)
    }

    /// Registers planar sample data under `name`. It goes through the same
    /// oversampling and streaming as files do.
    pub fn insert_memory(&mut self, name: &str, channels: Vec<Vec<f32>>, sample_rate: u32) -> FileId {
        let path = PathBuf::from(name);
        if let Some(id) = self.ids.get(&path) {
            debug!(name, "Sample name already registered");
            return *id;
        }

        let source = MemorySampleSource::new(channels, sample_rate);
        let entry = match oversample(Box::new(source), self.oversampling) {
            Ok(source) => self.start(path.clone(), source),
            Err(e) => {
                warn!(name, err = %e, "Failed to prepare in-memory sample");
                Arc::new(SampleEntry::invalid(path.clone()))
            }
        };
        self.insert(path, entry)
    }

    fn insert(&mut self, path: PathBuf, entry: Arc<SampleEntry>) -> FileId {
        let id = FileId(self.entries.len());
        self.entries.push(entry);
        self.ids.insert(path, id);
        id
    }

    /// Allocates the entry for a source, fills its preload window and hands
    /// the rest to the loader threads.
    fn start(&self, path: PathBuf, source: Box<dyn SampleSource>) -> Arc<SampleEntry> {
        let information = FileInformation::from_source(&*source, self.oversampling);
        let Some(frames) = source.frame_count() else {
            return self.load_unknown_length(path, source, information);
        };

        let capacity = frames as usize;
        let preload = self.preload_size.saturating_mul(self.oversampling.factor());
        let entry = Arc::new(SampleEntry::new(
            path,
            information,
            capacity,
            preload,
            &self.counter,
        ));

        let mut stream = Stream::new(source, entry.clone());
        if let Err(e) = stream.fill(preload) {
            warn!(path = ?entry.path(), err = %e, "Failed to decode sample");
            entry.mark_invalid();
            return entry;
        }
        if stream.is_finished() {
            entry.mark_complete();
            info!(
                path = ?entry.path(),
                channels = information.channels(),
                sample_rate = information.sample_rate(),
                frames = entry.frames_ready(),
                "Sample loaded"
            );
            return entry;
        }

        info!(
            path = ?entry.path(),
            channels = information.channels(),
            sample_rate = information.sample_rate(),
            frames = capacity,
            preloaded = entry.frames_ready(),
            "Sample preloaded, streaming the rest"
        );
        let shutdown = self.shutdown.clone();
        self.loader.spawn(move || stream.run(&shutdown));
        entry
    }

    /// Containers that do not report their length are decoded entirely
    /// before the entry is created.
    fn load_unknown_length(
        &self,
        path: PathBuf,
        mut source: Box<dyn SampleSource>,
        information: FileInformation,
    ) -> Arc<SampleEntry> {
        match decode_all(source.as_mut()) {
            Ok(planar) => {
                let frames = planar.first().map(Vec::len).unwrap_or(0);
                let entry = SampleEntry::new(path, information, frames, frames, &self.counter);
                entry.write(0, &planar, frames);
                entry.mark_complete();
                info!(path = ?entry.path(), frames, "Sample of unknown length loaded");
                Arc::new(entry)
            }
            Err(e) => {
                warn!(path = ?path, err = %e, "Failed to decode sample");
                Arc::new(SampleEntry::invalid(path))
            }
        }
    }

    pub fn entry(&self, id: FileId) -> Option<&Arc<SampleEntry>> {
        self.entries.get(id.0)
    }

    pub fn id(&self, path: &Path) -> Option<FileId> {
        self.ids.get(path).copied()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of sample files with a preload window in memory.
    pub fn num_preloaded_samples(&self) -> usize {
        self.entries.iter().filter(|e| e.is_valid()).count()
    }

    /// Drops every entry and cancels their streams.
    pub fn clear(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        self.shutdown = Arc::new(AtomicBool::new(false));
        self.entries.clear();
        self.ids.clear();
    }

    /// Waits for background streaming to finish. Returns whether it did
    /// within the timeout. For offline rendering and tests; the render thread
    /// only waits while freewheeling.
    pub fn wait_until_loaded(&self, timeout: Duration) -> bool {
        self.loader.wait_idle(timeout)
    }

    pub fn preload_size(&self) -> usize {
        self.preload_size
    }

    /// Applies to samples loaded afterwards.
    pub fn set_preload_size(&mut self, preload_size: usize) {
        self.preload_size = preload_size;
    }

    pub fn oversampling(&self) -> Oversampling {
        self.oversampling
    }

    /// Applies to samples loaded afterwards.
    pub fn set_oversampling(&mut self, oversampling: Oversampling) {
        self.oversampling = oversampling;
    }

    pub fn counter(&self) -> &BufferCounter {
        &self.counter
    }
}

impl Drop for SamplePool {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
    }
}

impl fmt::Debug for SamplePool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SamplePool")
            .field("entries", &self.entries.len())
            .field("preload_size", &self.preload_size)
            .field("oversampling", &self.oversampling)
            .field("loader", &self.loader)
            .finish()
    }
}

fn decode_all(source: &mut dyn SampleSource) -> Result<Vec<Vec<f32>>, SampleSourceError> {
    let channels = source.channel_count() as usize;
    let mut planar = vec![Vec::new(); channels];
    let mut chunk = vec![Vec::new(); channels];
    loop {
        let frames = source.next_chunk(&mut chunk, 4096)?;
        if frames == 0 {
            return Ok(planar);
        }
        for (all, part) in planar.iter_mut().zip(&chunk) {
            all.extend_from_slice(part);
        }
    }
}
