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
use std::{error::Error, fmt, str::FromStr};

use serde::Deserialize;

/// Sample format of a decoded file, as reported by the container.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleFormat {
    /// Integer samples (e.g., 16-bit, 24-bit, 32-bit)
    Int,
    /// Floating point samples (e.g., 32-bit float, 64-bit float)
    Float,
}

impl SampleFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            SampleFormat::Float => "float",
            SampleFormat::Int => "int",
        }
    }
}

impl fmt::Display for SampleFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Integer factor applied to sample data when it is loaded. Oversampled
/// material is interpolated with less aliasing at high pitch ratios, at the
/// price of proportionally more memory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Oversampling {
    #[default]
    X1,
    X2,
    X4,
    X8,
}

impl Oversampling {
    /// The numeric oversampling factor.
    pub fn factor(self) -> usize {
        match self {
            Oversampling::X1 => 1,
            Oversampling::X2 => 2,
            Oversampling::X4 => 4,
            Oversampling::X8 => 8,
        }
    }

    /// Returns the oversampling matching the given factor, if it is supported.
    pub fn from_factor(factor: usize) -> Option<Self> {
        match factor {
            1 => Some(Oversampling::X1),
            2 => Some(Oversampling::X2),
            4 => Some(Oversampling::X4),
            8 => Some(Oversampling::X8),
            _ => None,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Oversampling::X1 => "x1",
            Oversampling::X2 => "x2",
            Oversampling::X4 => "x4",
            Oversampling::X8 => "x8",
        }
    }
}

impl FromStr for Oversampling {
    type Err = Box<dyn Error>;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let digits = s.trim_start_matches(['x', 'X']);
        digits
            .parse::<usize>()
            .ok()
            .and_then(Oversampling::from_factor)
            .ok_or_else(|| format!("Unsupported oversampling factor: {}", s).into())
    }
}

impl fmt::Display for Oversampling {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sample_format_display() {
        assert_eq!(format!("{}", SampleFormat::Float), "float");
        assert_eq!(format!("{}", SampleFormat::Int), "int");
    }

    #[test]
    fn test_oversampling_from_str() {
        assert_eq!(Oversampling::from_str("x1").unwrap(), Oversampling::X1);
        assert_eq!(Oversampling::from_str("X4").unwrap(), Oversampling::X4);
        assert_eq!(Oversampling::from_str("8").unwrap(), Oversampling::X8);
        assert!(Oversampling::from_str("x3").is_err());
        assert!(Oversampling::from_str("").is_err());
    }

    #[test]
    fn test_oversampling_factor() {
        for factor in [1, 2, 4, 8] {
            let oversampling = Oversampling::from_factor(factor).unwrap();
            assert_eq!(factor, oversampling.factor());
            assert_eq!(
                oversampling,
                Oversampling::from_str(oversampling.as_str()).unwrap()
            );
        }
        assert_eq!(None, Oversampling::from_factor(16));
    }
}
