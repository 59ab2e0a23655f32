//! Schedule alignment
//!
//! [`align`] is the pure core: given everyone's availability and a quorum
//! threshold `n`, it returns the days at least `n` people are free, in
//! chronological order. [`resolve`] wraps it in the decaying-quorum search:
//! start at everyone and walk down until some day qualifies, preferring the
//! largest group that can agree on at least one day over any particular date.

use crate::availability::AvailabilityStore;
use crate::cycle::DateLabel;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A date together with the people free on it. Derived by [`align`], never
/// mutated afterwards.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Day {
    pub label: DateLabel,
    /// Names of the people free on this day, sorted.
    pub people: Vec<String>,
}

/// The result a cycle reports back to every person.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Outcome {
    /// Qualifying days, chronological.
    pub days: Vec<Day>,
    /// Persons with no usable response, in roster order.
    pub unknowns: Vec<String>,
    /// The quorum the days satisfy; 0 when no day worked at any quorum.
    pub quorum: usize,
    /// Total roster size, for the "n/total people available" fraction.
    pub roster_size: usize,
}

/// Days on which at least `n` people are free.
///
/// The canonical date set is taken from any one map in the store; every map
/// of a cycle shares the same label set. Output is sorted chronologically and
/// contains each label at most once; each day's people list is sorted.
pub fn align(store: &AvailabilityStore, n: usize) -> Vec<Day> {
    let Some(labels) = store.canonical_labels() else {
        return Vec::new();
    };

    let mut people_by_label: BTreeMap<DateLabel, Vec<String>> =
        labels.into_iter().map(|l| (l, Vec::new())).collect();

    for (name, map) in store.iter() {
        for (label, &free) in map {
            if free && let Some(people) = people_by_label.get_mut(label) {
                people.push(name.clone());
            }
        }
    }

    people_by_label
        .into_iter()
        .filter(|(_, people)| people.len() >= n)
        .map(|(label, mut people)| {
            people.sort_unstable();
            Day { label, people }
        })
        .collect()
}

/// Decaying-quorum search over `n = total, total-1, ..., 1`.
///
/// Returns the first non-empty alignment together with the `n` that produced
/// it, or `(vec![], 0)` when even `n = 1` finds nothing.
pub fn resolve(store: &AvailabilityStore, total: usize) -> (Vec<Day>, usize) {
    for n in (1..=total).rev() {
        let days = align(store, n);
        if !days.is_empty() {
            return (days, n);
        }
    }
    (Vec::new(), 0)
}
