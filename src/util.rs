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

pub fn filename_display(path: &Path) -> &str {
    path.file_name()
        .and_then(|f| f.to_str())
        .unwrap_or("unreadable file name")
}

/// Converts decibels to a linear gain factor.
#[inline]
pub fn db_to_gain(db: f32) -> f32 {
    10f32.powf(db * 0.05)
}

/// Converts a linear gain factor to decibels. Silence maps to negative infinity.
#[inline]
pub fn gain_to_db(gain: f32) -> f32 {
    20.0 * gain.log10()
}

/// Converts a pitch offset in cents to a frequency ratio.
#[inline]
pub fn cents_to_ratio(cents: f32) -> f64 {
    2f64.powf(cents as f64 / 1200.0)
}

/// Converts a duration in seconds to a whole number of frames.
#[inline]
pub fn seconds_to_frames(seconds: f32, sample_rate: f32) -> usize {
    (seconds * sample_rate).round().max(0.0) as usize
}

/// Maps a 7-bit MIDI value onto [0, 1].
#[inline]
pub fn normalize_7bits(value: u8) -> f32 {
    value.min(127) as f32 / 127.0
}

/// Maps a 14-bit signed pitch bend onto [-1, 1].
#[inline]
pub fn normalize_bend(bend: i16) -> f32 {
    if bend < 0 {
        bend as f32 / 8192.0
    } else {
        bend as f32 / 8191.0
    }
}

#[cfg(test)]
mod test {
    use std::path::Path;

    use super::*;

    #[test]
    fn test_filename_display() {
        assert_eq!("piano.wav", filename_display(Path::new("/samples/piano.wav")));
    }

    #[test]
    fn test_gain_conversions() {
        assert!((db_to_gain(0.0) - 1.0).abs() < 1e-6);
        assert!((db_to_gain(-6.0) - 0.501_187).abs() < 1e-5);
        assert!((gain_to_db(db_to_gain(-12.5)) + 12.5).abs() < 1e-4);
        assert_eq!(f32::NEG_INFINITY, gain_to_db(0.0));
    }

    #[test]
    fn test_pitch_conversions() {
        assert!((cents_to_ratio(1200.0) - 2.0).abs() < 1e-12);
        assert!((cents_to_ratio(-1200.0) - 0.5).abs() < 1e-12);
        assert!((cents_to_ratio(700.0) - 1.498_307).abs() < 1e-6);
    }

    #[test]
    fn test_normalization() {
        assert_eq!(0.0, normalize_7bits(0));
        assert_eq!(1.0, normalize_7bits(127));
        assert_eq!(1.0, normalize_7bits(200));
        assert_eq!(-1.0, normalize_bend(-8192));
        assert_eq!(1.0, normalize_bend(8191));
        assert_eq!(0.0, normalize_bend(0));
        assert_eq!(480, seconds_to_frames(0.01, 48000.0));
        assert_eq!(0, seconds_to_frames(-1.0, 48000.0));
    }
}
