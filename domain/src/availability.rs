//! Per-person availability and the shared store
//!
//! An [`AvailabilityMap`] holds one person's free/busy answer for every date
//! in the current cycle's window. The [`AvailabilityStore`] maps person names
//! to their maps; a person with no entry has given no usable data ("unknown").
//!
//! Invariant: every map present in the store uses the same label set, derived
//! once per cycle from the contact day. Callers may treat any one map's keys
//! as representative of the whole store.

use crate::cycle::{CycleWindow, DateLabel};
use crate::roster::Roster;
use std::collections::{BTreeMap, HashMap};

/// One person's per-date availability. Keyed by [`DateLabel`], so iteration
/// is chronological.
pub type AvailabilityMap = BTreeMap<DateLabel, bool>;

/// Build the all-false map covering a window.
pub fn blank_map(window: &CycleWindow) -> AvailabilityMap {
    window.labels().into_iter().map(|l| (l, false)).collect()
}

/// All collected availability for the current cycle.
#[derive(Debug, Clone, Default)]
pub struct AvailabilityStore {
    entries: HashMap<String, AvailabilityMap>,
}

impl AvailabilityStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Drop every entry. Called at the start of a new cycle's contact phase.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Seed a person with the all-false map for the window.
    pub fn seed(&mut self, person: &str, window: &CycleWindow) {
        self.entries.insert(person.to_string(), blank_map(window));
    }

    /// Replace a person's map wholesale.
    pub fn insert(&mut self, person: &str, map: AvailabilityMap) {
        self.entries.insert(person.to_string(), map);
    }

    /// Seed a person with an all-false map over an explicit label set.
    pub fn seed_labels(&mut self, person: &str, labels: impl IntoIterator<Item = DateLabel>) {
        self.entries.insert(
            person.to_string(),
            labels.into_iter().map(|l| (l, false)).collect(),
        );
    }

    /// Make sure a person's map covers the given labels, without touching
    /// values already collected. Used when rebuilding from durable records.
    pub fn ensure_labels(&mut self, person: &str, labels: impl IntoIterator<Item = DateLabel>) {
        let map = self.entries.entry(person.to_string()).or_default();
        for label in labels {
            map.entry(label).or_insert(false);
        }
    }

    /// Set one date for a person. Returns false if the person has no entry
    /// or the label is outside their map.
    pub fn set(&mut self, person: &str, label: DateLabel, available: bool) -> bool {
        match self.entries.get_mut(person).and_then(|m| m.get_mut(&label)) {
            Some(slot) => {
                *slot = available;
                true
            }
            None => false,
        }
    }

    /// Reset every date for a person to unavailable (the "no dates" answer).
    pub fn reset(&mut self, person: &str) {
        if let Some(map) = self.entries.get_mut(person) {
            for slot in map.values_mut() {
                *slot = false;
            }
        }
    }

    pub fn get(&self, person: &str) -> Option<&AvailabilityMap> {
        self.entries.get(person)
    }

    /// Drop a person's entry, degrading them to "unknown".
    pub fn remove(&mut self, person: &str) -> Option<AvailabilityMap> {
        self.entries.remove(person)
    }

    pub fn contains(&self, person: &str) -> bool {
        self.entries.contains_key(person)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &AvailabilityMap)> {
        self.entries.iter()
    }

    /// The label set shared by every map in the store, from any one entry.
    pub fn canonical_labels(&self) -> Option<Vec<DateLabel>> {
        self.entries
            .values()
            .next()
            .map(|map| map.keys().copied().collect())
    }

    /// Remove and return (in roster order) every person whose map is absent
    /// or has no free day, i.e. the persons with no usable response.
    pub fn split_unknowns(&mut self, roster: &Roster) -> Vec<String> {
        let mut unknowns = Vec::new();
        for person in roster.iter() {
            let usable = self
                .entries
                .get(&person.name)
                .is_some_and(|map| map.values().any(|&free| free));
            if !usable {
                self.entries.remove(&person.name);
                unknowns.push(person.name.clone());
            }
        }
        unknowns
    }
}
