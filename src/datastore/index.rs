//! In-memory key directory
//!
//! Maps every live key to the location of its most recent record. The map is
//! owned by the engine and mutated only under the engine's exclusive lock, so
//! it needs no internal synchronization.

use std::collections::{HashMap, HashSet};

/// Where a key's newest record lives
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Location {
    /// In the active log, at the given byte offset
    Active { offset: u64 },

    /// In sealed segment `id`, at the given byte offset
    Segment { id: u64, offset: u64 },
}

/// Key → location directory
///
/// Inserting a key overwrites whatever location it had before, so a fresh
/// active-log write automatically shadows any older segment entry.
#[derive(Debug, Default)]
pub struct KeyDir {
    map: HashMap<String, Location>,
}

impl KeyDir {
    /// Create an empty directory
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a key's location
    pub fn get(&self, key: &str) -> Option<Location> {
        self.map.get(key).copied()
    }

    /// Insert or overwrite a key's location
    pub fn insert(&mut self, key: String, location: Location) {
        self.map.insert(key, location);
    }

    /// Remove a key
    pub fn remove(&mut self, key: &str) -> Option<Location> {
        self.map.remove(key)
    }

    /// Number of live keys
    pub fn len(&self) -> usize {
        self.map.len()
    }

    /// Whether the directory is empty
    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Repoint every active-log entry into sealed segment `id`
    ///
    /// Offsets carry over unchanged because sealing only renames the file.
    pub fn seal_active(&mut self, id: u64) {
        for location in self.map.values_mut() {
            if let Location::Active { offset } = *location {
                *location = Location::Segment { id, offset };
            }
        }
    }

    /// Commit a merge: repoint keys still living in one of the input
    /// segments to their new offset in `merged_id`
    ///
    /// Entries that point at the active log (or at a segment outside the
    /// input set) are newer than the merge inputs and are left alone.
    pub fn retarget_merged(
        &mut self,
        inputs: &HashSet<u64>,
        merged_offsets: &HashMap<String, u64>,
        merged_id: u64,
    ) {
        for (key, new_offset) in merged_offsets {
            if let Some(location) = self.map.get_mut(key) {
                if let Location::Segment { id, .. } = *location {
                    if inputs.contains(&id) {
                        *location = Location::Segment {
                            id: merged_id,
                            offset: *new_offset,
                        };
                    }
                }
            }
        }
    }
}
