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
//! Owned planar sample storage and the borrowed views used to pass parts of it
//! around the render path.
//!
//! A buffer is a single allocation of `channels * capacity` samples. Channel `c`
//! lives at `data[c * capacity..]`, so a view only needs the backing slice, the
//! stride and a frame window. Creating, slicing and mixing views never allocates.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Errors raised when a view is requested outside its backing storage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, thiserror::Error)]
pub enum BufferError {
    #[error("Range {offset}+{length} exceeds {frames} frames")]
    Range {
        offset: usize,
        length: usize,
        frames: usize,
    },
}

fn check_range(frames: usize, offset: usize, length: usize) -> Result<(), BufferError> {
    match offset.checked_add(length) {
        Some(end) if end <= frames => Ok(()),
        _ => Err(BufferError::Range {
            offset,
            length,
            frames,
        }),
    }
}

/// Debug builds fail loudly on a bad range; optimized builds clamp it.
fn clamp_range(frames: usize, offset: usize, length: usize) -> (usize, usize) {
    debug_assert!(
        check_range(frames, offset, length).is_ok(),
        "view range {offset}+{length} exceeds {frames} frames"
    );
    let offset = offset.min(frames);
    (offset, length.min(frames - offset))
}

/// Shared tally of live buffers and the bytes they hold.
#[derive(Clone, Default)]
pub struct BufferCounter {
    inner: Arc<CounterState>,
}

#[derive(Default)]
struct CounterState {
    buffers: AtomicUsize,
    bytes: AtomicUsize,
}

impl BufferCounter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live counted allocations.
    pub fn buffers(&self) -> usize {
        self.inner.buffers.load(Ordering::Relaxed)
    }

    /// Total bytes held by live counted allocations.
    pub fn bytes(&self) -> usize {
        self.inner.bytes.load(Ordering::Relaxed)
    }

    /// Registers an allocation of `bytes`. The returned guard deregisters it on drop.
    pub fn track(&self, bytes: usize) -> AllocationGuard {
        self.inner.buffers.fetch_add(1, Ordering::Relaxed);
        self.inner.bytes.fetch_add(bytes, Ordering::Relaxed);
        AllocationGuard {
            state: self.inner.clone(),
            bytes,
        }
    }
}

impl fmt::Debug for BufferCounter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BufferCounter")
            .field("buffers", &self.buffers())
            .field("bytes", &self.bytes())
            .finish()
    }
}

/// Keeps an allocation registered with its [`BufferCounter`] while alive.
pub struct AllocationGuard {
    state: Arc<CounterState>,
    bytes: usize,
}

impl Drop for AllocationGuard {
    fn drop(&mut self) {
        self.state.buffers.fetch_sub(1, Ordering::Relaxed);
        self.state.bytes.fetch_sub(self.bytes, Ordering::Relaxed);
    }
}

/// Owned multichannel sample storage in planar layout.
pub struct AudioBuffer {
    data: Vec<f32>,
    channels: usize,
    capacity: usize,
    frames: usize,
    _allocation: Option<AllocationGuard>,
}

impl AudioBuffer {
    /// Creates a silent buffer holding `frames` frames per channel.
    pub fn new(channels: usize, frames: usize) -> Self {
        Self {
            data: vec![0.0; channels * frames],
            channels,
            capacity: frames,
            frames,
            _allocation: None,
        }
    }

    /// Creates a silent buffer whose allocation is reported to `counter`.
    pub fn with_counter(channels: usize, frames: usize, counter: &BufferCounter) -> Self {
        let mut buffer = Self::new(channels, frames);
        buffer._allocation = Some(counter.track(buffer.data.len() * std::mem::size_of::<f32>()));
        buffer
    }

    pub fn num_channels(&self) -> usize {
        self.channels
    }

    /// Number of frames in the current extent.
    pub fn num_frames(&self) -> usize {
        self.frames
    }

    /// Number of frames the buffer can hold without reallocating.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Changes the current extent. Requests beyond the capacity are clamped,
    /// so this is safe to call on the render path.
    pub fn set_num_frames(&mut self, frames: usize) -> usize {
        self.frames = frames.min(self.capacity);
        self.frames
    }

    pub fn channel(&self, channel: usize) -> &[f32] {
        let start = channel * self.capacity;
        &self.data[start..start + self.frames]
    }

    pub fn channel_mut(&mut self, channel: usize) -> &mut [f32] {
        let start = channel * self.capacity;
        &mut self.data[start..start + self.frames]
    }

    /// The first two channels, mutably at the same time.
    pub fn stereo_mut(&mut self) -> (&mut [f32], &mut [f32]) {
        assert!(self.channels >= 2, "stereo access to a {}-channel buffer", self.channels);
        let (left, right) = self.data.split_at_mut(self.capacity);
        (&mut left[..self.frames], &mut right[..self.frames])
    }

    /// Zeroes the current extent.
    pub fn clear(&mut self) {
        self.span_mut().fill(0.0);
    }

    pub fn span(&self) -> AudioSpan<'_> {
        AudioSpan {
            data: &self.data,
            stride: self.capacity,
            channels: self.channels,
            offset: 0,
            frames: self.frames,
        }
    }

    pub fn span_mut(&mut self) -> AudioSpanMut<'_> {
        AudioSpanMut {
            data: &mut self.data,
            stride: self.capacity,
            channels: self.channels,
            offset: 0,
            frames: self.frames,
        }
    }

    pub fn subspan(&self, offset: usize, length: usize) -> AudioSpan<'_> {
        self.span().subspan(offset, length)
    }

    pub fn subspan_mut(&mut self, offset: usize, length: usize) -> AudioSpanMut<'_> {
        self.span_mut().into_subspan(offset, length)
    }

    pub fn try_subspan(&self, offset: usize, length: usize) -> Result<AudioSpan<'_>, BufferError> {
        self.span().try_subspan(offset, length)
    }
}

impl fmt::Debug for AudioBuffer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AudioBuffer")
            .field("channels", &self.channels)
            .field("frames", &self.frames)
            .field("capacity", &self.capacity)
            .finish()
    }
}

/// Read-only view over a window of frames of every channel of a buffer.
#[derive(Clone, Copy)]
pub struct AudioSpan<'a> {
    data: &'a [f32],
    stride: usize,
    channels: usize,
    offset: usize,
    frames: usize,
}

impl<'a> AudioSpan<'a> {
    pub fn num_channels(&self) -> usize {
        self.channels
    }

    pub fn num_frames(&self) -> usize {
        self.frames
    }

    pub fn channel(&self, channel: usize) -> &'a [f32] {
        let start = channel * self.stride + self.offset;
        &self.data[start..start + self.frames]
    }

    /// A view on `length` frames starting at `offset`, relative to this view.
    pub fn subspan(&self, offset: usize, length: usize) -> AudioSpan<'a> {
        let (offset, length) = clamp_range(self.frames, offset, length);
        AudioSpan {
            offset: self.offset + offset,
            frames: length,
            ..*self
        }
    }

    pub fn try_subspan(&self, offset: usize, length: usize) -> Result<AudioSpan<'a>, BufferError> {
        check_range(self.frames, offset, length)?;
        Ok(self.subspan(offset, length))
    }

    pub fn first(&self, length: usize) -> AudioSpan<'a> {
        self.subspan(0, length.min(self.frames))
    }
}

/// Mutable view over a window of frames of every channel of a buffer.
pub struct AudioSpanMut<'a> {
    data: &'a mut [f32],
    stride: usize,
    channels: usize,
    offset: usize,
    frames: usize,
}

impl<'a> AudioSpanMut<'a> {
    pub fn num_channels(&self) -> usize {
        self.channels
    }

    pub fn num_frames(&self) -> usize {
        self.frames
    }

    pub fn channel(&self, channel: usize) -> &[f32] {
        let start = channel * self.stride + self.offset;
        &self.data[start..start + self.frames]
    }

    pub fn channel_mut(&mut self, channel: usize) -> &mut [f32] {
        let start = channel * self.stride + self.offset;
        &mut self.data[start..start + self.frames]
    }

    pub fn as_span(&self) -> AudioSpan<'_> {
        AudioSpan {
            data: &*self.data,
            stride: self.stride,
            channels: self.channels,
            offset: self.offset,
            frames: self.frames,
        }
    }

    /// Reborrows a sub-range of this view.
    pub fn subspan_mut(&mut self, offset: usize, length: usize) -> AudioSpanMut<'_> {
        let (offset, length) = clamp_range(self.frames, offset, length);
        AudioSpanMut {
            data: &mut *self.data,
            stride: self.stride,
            channels: self.channels,
            offset: self.offset + offset,
            frames: length,
        }
    }

    /// Narrows this view to a sub-range, keeping the original borrow.
    pub fn into_subspan(self, offset: usize, length: usize) -> AudioSpanMut<'a> {
        let (offset, length) = clamp_range(self.frames, offset, length);
        AudioSpanMut {
            offset: self.offset + offset,
            frames: length,
            ..self
        }
    }

    pub fn try_subspan_mut(
        &mut self,
        offset: usize,
        length: usize,
    ) -> Result<AudioSpanMut<'_>, BufferError> {
        check_range(self.frames, offset, length)?;
        Ok(self.subspan_mut(offset, length))
    }

    pub fn fill(&mut self, value: f32) {
        for channel in 0..self.channels {
            self.channel_mut(channel).fill(value);
        }
    }

    pub fn apply_gain(&mut self, gain: f32) {
        for channel in 0..self.channels {
            self.channel_mut(channel).iter_mut().for_each(|s| *s *= gain);
        }
    }

    /// Sums the overlapping channels and frames of `source` into this view.
    pub fn add_from(&mut self, source: &AudioSpan<'_>) {
        let channels = self.channels.min(source.num_channels());
        let frames = self.frames.min(source.num_frames());
        for channel in 0..channels {
            let src = &source.channel(channel)[..frames];
            for (dst, src) in self.channel_mut(channel)[..frames].iter_mut().zip(src) {
                *dst += *src;
            }
        }
    }

    /// Copies the overlapping channels and frames of `source` into this view.
    pub fn copy_from(&mut self, source: &AudioSpan<'_>) {
        let channels = self.channels.min(source.num_channels());
        let frames = self.frames.min(source.num_frames());
        for channel in 0..channels {
            self.channel_mut(channel)[..frames].copy_from_slice(&source.channel(channel)[..frames]);
        }
    }
}
