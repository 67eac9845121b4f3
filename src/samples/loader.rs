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
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, info, warn};

use super::entry::SampleEntry;
use super::SampleError;
use crate::audio::sample_source::{SampleSource, SampleSourceError};
use crate::thread_priority::configure_loader_thread_priority;

/// Frames decoded per chunk while streaming.
const STREAM_CHUNK_FRAMES: usize = 4096;

/// Background threads that stream sample data into pool entries.
pub struct LoaderPool {
    pool: rayon::ThreadPool,
    pending: Arc<Pending>,
}

#[derive(Default)]
struct Pending {
    jobs: Mutex<usize>,
    idle: Condvar,
}

/// Counts a job as finished when dropped, even if the job panicked.
struct JobGuard(Arc<Pending>);

impl Drop for JobGuard {
    fn drop(&mut self) {
        let mut jobs = self.0.jobs.lock();
        *jobs = jobs.saturating_sub(1);
        if *jobs == 0 {
            self.0.idle.notify_all();
        }
    }
}

impl LoaderPool {
    pub fn new(threads: usize) -> Result<Self, SampleError> {
        let threads = threads.max(1);
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(threads)
            .thread_name(|index| format!("polysampler-loader-{}", index))
            .start_handler(configure_loader_thread_priority)
            .build()?;
        debug!(threads, "Started sample loader threads");
        Ok(Self {
            pool,
            pending: Arc::new(Pending::default()),
        })
    }

    pub fn num_threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Jobs queued or running.
    pub fn pending_jobs(&self) -> usize {
        *self.pending.jobs.lock()
    }

    pub fn spawn<F>(&self, job: F)
    where
        F: FnOnce() + Send + 'static,
    {
        *self.pending.jobs.lock() += 1;
        let guard = JobGuard(self.pending.clone());
        self.pool.spawn(move || {
            let _guard = guard;
            job();
        });
    }

    /// Blocks until every job has finished or the timeout expires. Returns
    /// whether the pool went idle. Never call this from the render thread.
    pub fn wait_idle(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut jobs = self.pending.jobs.lock();
        while *jobs > 0 {
            if self.pending.idle.wait_until(&mut jobs, deadline).timed_out() {
                return *jobs == 0;
            }
        }
        true
    }
}

impl fmt::Debug for LoaderPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoaderPool")
            .field("threads", &self.num_threads())
            .field("pending_jobs", &self.pending_jobs())
            .finish()
    }
}

/// Decodes a source into an entry, chunk by chunk.
pub(crate) struct Stream {
    source: Box<dyn SampleSource>,
    entry: Arc<SampleEntry>,
    scratch: Vec<Vec<f32>>,
    position: usize,
    finished: bool,
}

impl Stream {
    pub(crate) fn new(source: Box<dyn SampleSource>, entry: Arc<SampleEntry>) -> Self {
        let channels = source.channel_count() as usize;
        Self {
            source,
            entry,
            scratch: vec![Vec::with_capacity(STREAM_CHUNK_FRAMES); channels],
            position: 0,
            finished: false,
        }
    }

    pub(crate) fn is_finished(&self) -> bool {
        self.finished
    }

    /// Decodes and publishes frames until `limit` frames are in the entry or
    /// the source ends.
    pub(crate) fn fill(&mut self, limit: usize) -> Result<(), SampleSourceError> {
        let limit = limit.min(self.entry.capacity());
        while !self.finished && self.position < limit {
            let wanted = (limit - self.position).min(STREAM_CHUNK_FRAMES);
            let frames = self.source.next_chunk(&mut self.scratch, wanted)?;
            if frames == 0 {
                self.finished = true;
                break;
            }
            self.position += self.entry.write(self.position, &self.scratch, frames);
        }
        if self.position >= self.entry.capacity() {
            self.finished = true;
        }
        Ok(())
    }

    /// Streams the rest of the source. Stops early when `shutdown` is set. A
    /// decoding error invalidates the entry for good.
    pub(crate) fn run(mut self, shutdown: &AtomicBool) {
        let started = Instant::now();
        while !self.finished {
            if shutdown.load(Ordering::Relaxed) {
                debug!(path = ?self.entry.path(), "Sample streaming cancelled");
                break;
            }
            let limit = self.position + STREAM_CHUNK_FRAMES;
            if let Err(e) = self.fill(limit) {
                warn!(
                    path = ?self.entry.path(),
                    frames = self.position,
                    err = %e,
                    "Error while streaming sample, invalidating it"
                );
                self.entry.mark_invalid();
                return;
            }
        }
        self.entry.mark_complete();
        info!(
            path = ?self.entry.path(),
            frames = self.position,
            elapsed_ms = started.elapsed().as_millis(),
            "Sample streamed"
        );
    }
}

#[cfg(test)]
mod test {
    use std::path::PathBuf;
    use std::sync::atomic::AtomicUsize;

    use super::*;
    use crate::audio::sample_source::MemorySampleSource;
    use crate::audio::{BufferCounter, Oversampling, SampleFormat};
    use crate::samples::FileInformation;

    #[test]
    fn test_wait_idle() {
        let pool = LoaderPool::new(2).unwrap();
        let done = Arc::new(AtomicUsize::new(0));
        for _ in 0..8 {
            let done = done.clone();
            pool.spawn(move || {
                std::thread::sleep(Duration::from_millis(5));
                done.fetch_add(1, Ordering::SeqCst);
            });
        }
        assert!(pool.wait_idle(Duration::from_secs(10)));
        assert_eq!(8, done.load(Ordering::SeqCst));
        assert_eq!(0, pool.pending_jobs());
    }

    #[test]
    fn test_wait_idle_times_out() {
        let pool = LoaderPool::new(1).unwrap();
        let (tx, rx) = crossbeam_channel::bounded::<()>(1);
        pool.spawn(move || {
            let _ = rx.recv_timeout(Duration::from_secs(5));
        });
        assert!(!pool.wait_idle(Duration::from_millis(20)));
        tx.send(()).unwrap();
        assert!(pool.wait_idle(Duration::from_secs(10)));
    }

    fn stream(frames: usize) -> Stream {
        let data: Vec<f32> = (0..frames).map(|i| i as f32).collect();
        let source = MemorySampleSource::new(vec![data], 48000);
        let information = FileInformation::from_source(&source, Oversampling::X1);
        let entry = Arc::new(SampleEntry::new(
            PathBuf::from("ramp"),
            information,
            frames,
            16,
            &BufferCounter::new(),
        ));
        Stream::new(Box::new(source), entry)
    }

    #[test]
    fn test_stream_fill_and_run() {
        let mut stream = stream(10_000);
        stream.fill(16).unwrap();
        let entry = stream.entry.clone();
        assert_eq!(16, entry.frames_ready());
        assert!(!stream.is_finished());

        stream.run(&AtomicBool::new(false));
        assert!(entry.is_complete());
        assert_eq!(10_000, entry.frames_ready());
        assert_eq!(9_999.0, entry.reader().sample(0, 9_999));
    }

    #[test]
    fn test_stream_cancelled() {
        let mut stream = stream(10_000);
        stream.fill(16).unwrap();
        let entry = stream.entry.clone();
        stream.run(&AtomicBool::new(true));
        assert!(entry.is_complete());
        assert_eq!(16, entry.frames_ready());
    }

    /// Yields one chunk of silence, then fails.
    struct TruncatedSource {
        frames: u64,
        reads: usize,
    }

    impl SampleSource for TruncatedSource {
        fn next_chunk(
            &mut self,
            output: &mut [Vec<f32>],
            max_frames: usize,
        ) -> Result<usize, SampleSourceError> {
            self.reads += 1;
            if self.reads > 1 {
                return Err(SampleSourceError::Unsupported("truncated".to_string()));
            }
            let frames = max_frames.min(16);
            for channel in output.iter_mut() {
                channel.clear();
                channel.resize(frames, 0.25);
            }
            Ok(frames)
        }

        fn channel_count(&self) -> u16 {
            1
        }

        fn sample_rate(&self) -> u32 {
            48000
        }

        fn bits_per_sample(&self) -> u16 {
            32
        }

        fn sample_format(&self) -> SampleFormat {
            SampleFormat::Float
        }

        fn frame_count(&self) -> Option<u64> {
            Some(self.frames)
        }
    }

    #[test]
    fn test_stream_error_invalidates_entry() {
        let source = TruncatedSource {
            frames: 10_000,
            reads: 0,
        };
        let information = FileInformation::from_source(&source, Oversampling::X1);
        let entry = Arc::new(SampleEntry::new(
            PathBuf::from("truncated"),
            information,
            10_000,
            16,
            &BufferCounter::new(),
        ));
        let mut stream = Stream::new(Box::new(source), entry.clone());
        stream.fill(16).unwrap();
        assert!(entry.is_valid());
        assert_eq!(16, entry.frames_ready());

        stream.run(&AtomicBool::new(false));
        assert!(!entry.is_valid());
        assert!(entry.is_complete());
        let reader = entry.reader();
        assert_eq!(0, reader.frames());
        assert_eq!(0.0, reader.sample(0, 0));
    }
}
