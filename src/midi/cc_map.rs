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
use std::collections::BTreeMap;

use serde::Deserialize;

/// Sparse, sorted table from controller number to a value, with a fallback
/// for controllers that are not bound.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(from = "BTreeMap<u8, T>")]
#[serde(bound(deserialize = "T: Deserialize<'de> + Default"))]
pub struct CCMap<T> {
    entries: Vec<(u8, T)>,
    default: T,
}

impl<T> CCMap<T> {
    pub fn new(default: T) -> Self {
        Self {
            entries: Vec::new(),
            default,
        }
    }

    fn find(&self, cc: u8) -> Result<usize, usize> {
        self.entries.binary_search_by_key(&cc, |(key, _)| *key)
    }

    /// Binds `value` to `cc`, replacing any previous binding.
    pub fn insert(&mut self, cc: u8, value: T) {
        match self.find(cc) {
            Ok(index) => self.entries[index].1 = value,
            Err(index) => self.entries.insert(index, (cc, value)),
        }
    }

    pub fn get(&self, cc: u8) -> Option<&T> {
        self.find(cc).ok().map(|index| &self.entries[index].1)
    }

    pub fn get_with_default(&self, cc: u8) -> &T {
        self.get(cc).unwrap_or(&self.default)
    }

    pub fn contains(&self, cc: u8) -> bool {
        self.find(cc).is_ok()
    }

    pub fn default_value(&self) -> &T {
        &self.default
    }

    /// Bound controllers in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = (u8, &T)> {
        self.entries.iter().map(|(cc, value)| (*cc, value))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<T: Default> Default for CCMap<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: Default> From<BTreeMap<u8, T>> for CCMap<T> {
    fn from(map: BTreeMap<u8, T>) -> Self {
        Self {
            entries: map.into_iter().collect(),
            default: T::default(),
        }
    }
}

impl<T: Default> FromIterator<(u8, T)> for CCMap<T> {
    fn from_iter<I: IntoIterator<Item = (u8, T)>>(iter: I) -> Self {
        let mut map = Self::default();
        for (cc, value) in iter {
            map.insert(cc, value);
        }
        map
    }
}
