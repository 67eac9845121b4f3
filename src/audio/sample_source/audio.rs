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
use std::fs::File;
use std::path::Path;

use symphonia::core::audio::{AudioBuffer, AudioBufferRef, Signal};
use symphonia::core::codecs::{
    Decoder, DecoderOptions, CODEC_TYPE_NULL, CODEC_TYPE_PCM_F32BE, CODEC_TYPE_PCM_F32LE,
    CODEC_TYPE_PCM_F64BE, CODEC_TYPE_PCM_F64LE,
};
use symphonia::core::conv::FromSample;
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::{FormatOptions, FormatReader};
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;
use symphonia::core::sample::Sample;
use symphonia::default::{get_codecs, get_probe};
use tracing::warn;

use super::error::SampleSourceError;
use super::traits::{check_channels, SampleSource};
use crate::audio::SampleFormat;

/// Decodes audio files (WAV, FLAC, Ogg/Vorbis, MP3, ...) with symphonia and
/// hands out planar f32 frames scaled to [-1, 1].
pub struct AudioSampleSource {
    format_reader: Box<dyn FormatReader>,
    decoder: Box<dyn Decoder>,
    track_id: u32,
    finished: bool,
    /// Frames of the last decoded packet, planar, not yet handed out.
    pending: Vec<Vec<f32>>,
    pending_pos: usize,
    channels: u16,
    sample_rate: u32,
    bits_per_sample: u16,
    sample_format: SampleFormat,
    frame_count: Option<u64>,
}

impl AudioSampleSource {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self, SampleSourceError> {
        // Include the path in open errors so the log names the missing file.
        let path = path.as_ref();
        let file = File::open(path).map_err(|e| {
            SampleSourceError::IoError(std::io::Error::new(
                e.kind(),
                format!("{}: {}", path.display(), e),
            ))
        })?;
        let mss = MediaSourceStream::new(Box::new(file), Default::default());

        let mut hint = Hint::new();
        if let Some(extension) = path.extension().and_then(|ext| ext.to_str()) {
            hint.with_extension(extension);
        }

        let probed = get_probe()
            .format(
                &hint,
                mss,
                &FormatOptions::default(),
                &MetadataOptions::default(),
            )
            .map_err(|e| SampleSourceError::Unsupported(format!("'{}': {}", path.display(), e)))?;
        let format_reader = probed.format;

        let track = format_reader
            .tracks()
            .iter()
            .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
            .ok_or_else(|| {
                SampleSourceError::Unsupported(format!("'{}': no audio track", path.display()))
            })?;
        let track_id = track.id;
        let params = &track.codec_params;

        let sample_rate = params.sample_rate.ok_or_else(|| {
            SampleSourceError::Unsupported(format!("'{}': unknown sample rate", path.display()))
        })?;
        let sample_format = match params.codec {
            CODEC_TYPE_PCM_F32LE | CODEC_TYPE_PCM_F32BE | CODEC_TYPE_PCM_F64LE
            | CODEC_TYPE_PCM_F64BE => SampleFormat::Float,
            _ => SampleFormat::Int,
        };
        let bits_per_sample = params.bits_per_sample.unwrap_or(16) as u16;
        let frame_count = params.n_frames;
        let channels = params.channels.map(|c| c.count() as u16).unwrap_or(0);

        let decoder = get_codecs()
            .make(params, &DecoderOptions::default())
            .map_err(|e| SampleSourceError::Unsupported(format!("'{}': {}", path.display(), e)))?;

        let mut source = Self {
            format_reader,
            decoder,
            track_id,
            finished: false,
            pending: vec![Vec::new(); channels as usize],
            pending_pos: 0,
            channels,
            sample_rate,
            bits_per_sample,
            sample_format,
            frame_count,
        };

        // Some containers leave the channel layout to the codec. Decode the
        // first packet to learn it and keep the frames for the first read.
        if channels == 0 {
            if !source.decode_next()? {
                return Err(SampleSourceError::Unsupported(format!(
                    "'{}': no decodable audio",
                    path.display()
                )));
            }
            source.channels = source.pending.len() as u16;
        }

        Ok(source)
    }

    fn pending_frames(&self) -> usize {
        self.pending
            .first()
            .map(|c| c.len().saturating_sub(self.pending_pos))
            .unwrap_or(0)
    }

    /// Decodes the next packet of our track into `pending`. Returns false at
    /// the end of the stream.
    fn decode_next(&mut self) -> Result<bool, SampleSourceError> {
        loop {
            let packet = match self.format_reader.next_packet() {
                Ok(packet) => packet,
                Err(SymphoniaError::ResetRequired) => {
                    self.decoder.reset();
                    continue;
                }
                Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                    return Ok(false)
                }
                // Some demuxers report the end of the stream as a decode error.
                Err(SymphoniaError::DecodeError(_)) => return Ok(false),
                Err(e) => return Err(e.into()),
            };
            if packet.track_id() != self.track_id {
                continue;
            }

            let frames = match self.decoder.decode(&packet) {
                Ok(decoded) => copy_planar(decoded, &mut self.pending),
                Err(SymphoniaError::DecodeError(e)) => {
                    warn!(error = e, "Skipping undecodable packet");
                    continue;
                }
                Err(SymphoniaError::ResetRequired) => {
                    self.decoder.reset();
                    match self.decoder.decode(&packet) {
                        Ok(decoded) => copy_planar(decoded, &mut self.pending),
                        Err(e) => return Err(e.into()),
                    }
                }
                Err(e) => return Err(e.into()),
            };
            self.pending_pos = 0;

            // Header packets (e.g. Vorbis) decode to zero frames.
            if frames > 0 {
                return Ok(true);
            }
        }
    }
}

impl SampleSource for AudioSampleSource {
    fn next_chunk(
        &mut self,
        output: &mut [Vec<f32>],
        max_frames: usize,
    ) -> Result<usize, SampleSourceError> {
        check_channels(output, self.channels)?;
        output.iter_mut().for_each(Vec::clear);

        let mut written = 0;
        while written < max_frames {
            let available = self.pending_frames();
            if available == 0 {
                if self.finished || !self.decode_next()? {
                    self.finished = true;
                    break;
                }
                continue;
            }

            let to_copy = available.min(max_frames - written);
            let range = self.pending_pos..self.pending_pos + to_copy;
            for (out, channel) in output.iter_mut().zip(&self.pending) {
                out.extend_from_slice(&channel[range.clone()]);
            }
            self.pending_pos += to_copy;
            written += to_copy;
        }

        Ok(written)
    }

    fn channel_count(&self) -> u16 {
        self.channels
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    fn bits_per_sample(&self) -> u16 {
        self.bits_per_sample
    }

    fn sample_format(&self) -> SampleFormat {
        self.sample_format
    }

    fn frame_count(&self) -> Option<u64> {
        self.frame_count
    }
}

/// Converts a decoded packet of any sample type to planar f32. Returns the
/// number of frames in the packet.
fn copy_planar(decoded: AudioBufferRef<'_>, output: &mut Vec<Vec<f32>>) -> usize {
    match decoded {
        AudioBufferRef::U8(buf) => copy_planes(&buf, output),
        AudioBufferRef::U16(buf) => copy_planes(&buf, output),
        AudioBufferRef::U24(buf) => copy_planes(&buf, output),
        AudioBufferRef::U32(buf) => copy_planes(&buf, output),
        AudioBufferRef::S8(buf) => copy_planes(&buf, output),
        AudioBufferRef::S16(buf) => copy_planes(&buf, output),
        AudioBufferRef::S24(buf) => copy_planes(&buf, output),
        AudioBufferRef::S32(buf) => copy_planes(&buf, output),
        AudioBufferRef::F32(buf) => copy_planes(&buf, output),
        AudioBufferRef::F64(buf) => copy_planes(&buf, output),
    }
}

fn copy_planes<S>(buf: &AudioBuffer<S>, output: &mut Vec<Vec<f32>>) -> usize
where
    S: Sample,
    f32: FromSample<S>,
{
    let planes = buf.planes();
    let planes = planes.planes();
    output.resize_with(planes.len(), Vec::new);
    for (out, plane) in output.iter_mut().zip(planes) {
        out.clear();
        out.extend(plane.iter().map(|&s| f32::from_sample(s)));
    }
    buf.frames()
}
