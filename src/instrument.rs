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
use std::collections::BTreeSet;
use std::fmt;
use std::path::{Path, PathBuf};

use crate::config::{self, ConfigError};
use crate::curve::CurveSet;
use crate::region::Region;

/// An immutable set of regions along with the curves they refer to. Voices
/// refer to regions by their index in this set.
#[derive(Clone, Default)]
pub struct Instrument {
    regions: Vec<Region>,
    num_groups: usize,
    num_masters: usize,
    curves: CurveSet,
    unknown: BTreeSet<String>,
    root: PathBuf,
    /// The file the instrument was loaded from.
    source: Option<PathBuf>,
}

impl Instrument {
    /// Creates an instrument from regions whose samples are relative to the
    /// current directory.
    pub fn new(regions: Vec<Region>) -> Self {
        let unknown = regions
            .iter()
            .flat_map(|region| region.unknown_directives().map(str::to_string))
            .collect();
        Self {
            regions,
            unknown,
            ..Default::default()
        }
    }

    pub(crate) fn from_parts(
        regions: Vec<Region>,
        num_groups: usize,
        num_masters: usize,
        curves: CurveSet,
        unknown: BTreeSet<String>,
        root: PathBuf,
    ) -> Self {
        Self {
            regions,
            num_groups,
            num_masters,
            curves,
            unknown,
            root,
            source: None,
        }
    }

    /// Loads an instrument from a YAML file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        config::load_instrument(path)
    }

    pub fn with_curves(mut self, curves: CurveSet) -> Self {
        self.curves = curves;
        self
    }

    pub fn with_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.root = root.into();
        self
    }

    pub fn with_source(mut self, path: impl Into<PathBuf>) -> Self {
        self.source = Some(path.into());
        self
    }

    pub fn regions(&self) -> &[Region] {
        &self.regions
    }

    pub fn region(&self, index: usize) -> Option<&Region> {
        self.regions.get(index)
    }

    pub fn num_regions(&self) -> usize {
        self.regions.len()
    }

    pub fn num_groups(&self) -> usize {
        self.num_groups
    }

    pub fn num_masters(&self) -> usize {
        self.num_masters
    }

    pub fn curves(&self) -> &CurveSet {
        &self.curves
    }

    pub fn num_curves(&self) -> usize {
        self.curves.len()
    }

    /// Directives that were present in the description but not understood,
    /// in sorted order.
    pub fn unknown_directives(&self) -> impl Iterator<Item = &str> {
        self.unknown.iter().map(String::as_str)
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    /// Where the sample of a region is found on disk. In-memory sample names
    /// resolve the same way and are matched by the pool before touching disk.
    pub fn sample_path(&self, region: &Region) -> PathBuf {
        self.root.join(&region.sample)
    }
}

impl fmt::Debug for Instrument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instrument")
            .field("regions", &self.regions.len())
            .field("groups", &self.num_groups)
            .field("masters", &self.num_masters)
            .field("curves", &self.curves.len())
            .field("root", &self.root)
            .field("source", &self.source)
            .finish()
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::curve::Curve;

    #[test]
    fn test_new() {
        let mut region = Region::new("kick.wav");
        region.key_range = (36, 36).into();
        let instrument = Instrument::new(vec![region, Region::new("snare.wav")])
            .with_root("/kits/acoustic");

        assert_eq!(2, instrument.num_regions());
        assert_eq!(0, instrument.num_groups());
        assert_eq!(0, instrument.num_curves());
        assert_eq!(0, instrument.unknown_directives().count());
        assert!(instrument.region(2).is_none());
        assert_eq!(
            Path::new("/kits/acoustic/snare.wav"),
            instrument.sample_path(instrument.region(1).unwrap())
        );
    }

    #[test]
    fn test_with_curves() {
        let mut curves = CurveSet::new();
        curves.insert(3, Curve::linear());
        let instrument = Instrument::new(vec![]).with_curves(curves);
        assert_eq!(1, instrument.num_curves());
        assert!(instrument.curves().get(3).is_some());
    }
}
