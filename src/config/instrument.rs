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
//! YAML instrument descriptions.
//!
//! An instrument file lists regions, optionally nested in groups and masters.
//! Keys set on an outer level apply to every region inside it unless a region
//! sets them itself; nested mappings such as envelopes merge key by key.
//! Values are taken as they are: no range checking happens here.
//!
//! ```yaml
//! default_path: samples/
//! global:
//!   amp_eg: { release: 0.3 }
//! curves:
//!   - index: 1
//!     points: [[0, 0.0], [64, 0.8]]
//! groups:
//!   - settings: { group: 1, off_by: 2 }
//!     regions:
//!       - { sample: hat_closed.wav, key_range: [42, 42] }
//! regions:
//!   - { sample: piano_c4.wav, pitch_keycenter: 60 }
//! ```

use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

use serde::Deserialize;
use serde_yml::{Mapping, Value};
use tracing::info;

use super::ConfigError;
use crate::curve::{Curve, CurveSet};
use crate::instrument::Instrument;
use crate::region::Region;

/// A YAML representation of an instrument.
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct InstrumentFile {
    /// Directory sample paths are relative to, itself relative to the
    /// instrument file.
    default_path: Option<String>,
    /// Settings applied to every region.
    global: Mapping,
    curves: Vec<CurveDefinition>,
    masters: Vec<MasterSection>,
    groups: Vec<GroupSection>,
    regions: Vec<Mapping>,
}

#[derive(Debug, Deserialize)]
struct CurveDefinition {
    index: u8,
    points: Vec<(u8, f32)>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct MasterSection {
    settings: Mapping,
    groups: Vec<GroupSection>,
    regions: Vec<Mapping>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
struct GroupSection {
    settings: Mapping,
    regions: Vec<Mapping>,
}

impl InstrumentFile {
    pub fn parse(yaml: &str) -> Result<Self, serde_yml::Error> {
        serde_yml::from_str(yaml)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::parse(&contents).map_err(|source| ConfigError::Yaml {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn default_path(&self) -> Option<&str> {
        self.default_path.as_deref()
    }

    /// Flattens the levels into regions. Sample paths are resolved against
    /// `base` and the default path.
    pub fn into_instrument(self, base: &Path) -> Result<Instrument, ConfigError> {
        let root = match &self.default_path {
            Some(default_path) => base.join(default_path),
            None => base.to_path_buf(),
        };

        let mut curves = CurveSet::new();
        for curve in &self.curves {
            curves.insert(curve.index, Curve::from_points(&curve.points));
        }

        let mut mappings: Vec<Mapping> = Vec::new();
        let mut num_groups = 0;
        let empty = Mapping::new();
        for master in &self.masters {
            let master_settings = merged(&self.global, &master.settings);
            collect(&master_settings, &empty, &master.regions, &mut mappings);
            for group in &master.groups {
                collect(&master_settings, &group.settings, &group.regions, &mut mappings);
                num_groups += 1;
            }
        }
        for group in &self.groups {
            collect(&self.global, &group.settings, &group.regions, &mut mappings);
            num_groups += 1;
        }
        collect(&self.global, &empty, &self.regions, &mut mappings);

        let regions = mappings
            .into_iter()
            .enumerate()
            .map(|(index, mapping)| {
                serde_yml::from_value::<Region>(Value::Mapping(mapping))
                    .map_err(|source| ConfigError::Region { index, source })
            })
            .collect::<Result<Vec<Region>, ConfigError>>()?;

        let unknown: BTreeSet<String> = regions
            .iter()
            .flat_map(|region| region.unknown_directives().map(str::to_string))
            .collect();
        for directive in &unknown {
            info!(directive = %directive, "Ignoring unknown directive");
        }

        Ok(Instrument::from_parts(
            regions,
            num_groups,
            self.masters.len(),
            curves,
            unknown,
            root,
        ))
    }
}

/// Region mappings of one level, with outer settings applied.
fn collect(outer: &Mapping, settings: &Mapping, regions: &[Mapping], into: &mut Vec<Mapping>) {
    let inherited = merged(outer, settings);
    into.extend(regions.iter().map(|region| merged(&inherited, region)));
}

/// `overlay` applied on top of `base`. Nested mappings merge key by key.
fn merged(base: &Mapping, overlay: &Mapping) -> Mapping {
    let mut result = base.clone();
    for (key, value) in overlay {
        let combined = match (result.get(key), value) {
            (Some(Value::Mapping(inner)), Value::Mapping(outer)) => {
                Value::Mapping(merged(inner, outer))
            }
            _ => value.clone(),
        };
        result.insert(key.clone(), combined);
    }
    result
}

/// Loads an instrument file, resolving samples against its directory.
pub fn load_instrument(path: &Path) -> Result<Instrument, ConfigError> {
    let base = path.parent().map(PathBuf::from).unwrap_or_default();
    let instrument = InstrumentFile::from_file(path)?
        .into_instrument(&base)?
        .with_source(path);
    info!(
        path = ?path,
        regions = instrument.num_regions(),
        groups = instrument.num_groups(),
        masters = instrument.num_masters(),
        curves = instrument.num_curves(),
        "Instrument loaded"
    );
    Ok(instrument)
}

#[cfg(test)]
mod test {
    use std::path::Path;

    use super::*;
    use crate::region::{Range, TriggerType};

    const INSTRUMENT: &str = r#"
default_path: samples
global:
  volume: -3
  amp_eg: { release: 0.5, attack: 0.01 }
curves:
  - index: 2
    points: [[0, 1.0], [127, 0.0]]
masters:
  - settings: { pan: -20 }
    groups:
      - settings: { group: 1, amp_eg: { release: 0.1 } }
        regions:
          - { sample: a.wav, key_range: [60, 60] }
          - { sample: b.wav, key_range: [61, 61], volume: 0 }
groups:
  - settings: { trigger: release, rt_decay: 3 }
    regions:
      - { sample: rel.wav, lovel: 1 }
regions:
  - sample: solo.wav
    amp_velcurve: 2
    mystery: true
"#;

    fn instrument() -> Instrument {
        InstrumentFile::parse(INSTRUMENT)
            .unwrap()
            .into_instrument(Path::new("/instruments"))
            .unwrap()
    }

    #[test]
    fn test_counts() {
        let instrument = instrument();
        assert_eq!(4, instrument.num_regions());
        assert_eq!(2, instrument.num_groups());
        assert_eq!(1, instrument.num_masters());
        assert_eq!(1, instrument.num_curves());
        assert!(instrument.curves().get(2).is_some());
    }

    #[test]
    fn test_inheritance() {
        let instrument = instrument();
        let cc = [0u8; 128];

        let a = instrument.region(0).unwrap();
        assert_eq!("a.wav", a.sample);
        assert_eq!(-3.0, a.volume);
        assert_eq!(-20.0, a.pan);
        assert_eq!(1, a.group);
        assert_eq!(Range::new(60, 60), a.key_range);
        // The group overrides the release but keeps the global attack.
        assert!((a.amp_eg.release(&cc, 0) - 0.1).abs() < 1e-6);
        assert!((a.amp_eg.attack(&cc, 0) - 0.01).abs() < 1e-6);

        let b = instrument.region(1).unwrap();
        assert_eq!(0.0, b.volume);

        let release = instrument.region(2).unwrap();
        assert_eq!(TriggerType::Release, release.trigger);
        assert_eq!(3.0, release.rt_decay);
        assert_eq!(0.0, release.pan);

        let solo = instrument.region(3).unwrap();
        assert_eq!(Some(2), solo.amp_velcurve);
        assert!((solo.amp_eg.release(&cc, 0) - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_sample_paths() {
        let instrument = instrument();
        let region = instrument.region(0).unwrap();
        assert_eq!(
            Path::new("/instruments/samples/a.wav"),
            instrument.sample_path(region)
        );
    }

    #[test]
    fn test_unknown_directives() {
        let instrument = instrument();
        let unknown: Vec<&str> = instrument.unknown_directives().collect();
        assert_eq!(vec!["lovel", "mystery"], unknown);
    }

    #[test]
    fn test_invalid_region() {
        let result = InstrumentFile::parse("regions:\n  - { sample: a.wav, key_range: loud }")
            .unwrap()
            .into_instrument(Path::new("."));
        assert!(matches!(result, Err(ConfigError::Region { index: 0, .. })));
    }

    #[test]
    fn test_load_instrument() {
        let tempdir = tempfile::tempdir().unwrap();
        let path = tempdir.path().join("kit.yaml");
        fs::write(&path, "regions:\n  - { sample: kick.wav }\n").unwrap();
        let instrument = load_instrument(&path).unwrap();
        assert_eq!(tempdir.path().join("kick.wav"), instrument.sample_path(instrument.region(0).unwrap()));
        assert_eq!(Some(path.as_path()), instrument.source());

        let missing = load_instrument(&tempdir.path().join("missing.yaml"));
        assert!(matches!(missing, Err(ConfigError::Io { .. })));
    }
}
