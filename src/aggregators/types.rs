//! Data types used by the aggregation pipeline.

use std::collections::{BTreeMap, BTreeSet};
use std::ops::AddAssign;

/// Two-level running totals: `outer -> (inner -> total)`.
///
/// Iteration is ordered by `(outer, inner)` so reports are reproducible.
/// Repeated pairs add up; nothing is ever overwritten.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateMapping<V> {
    cells: BTreeMap<String, BTreeMap<String, V>>,
}

impl<V> Default for AggregateMapping<V> {
    fn default() -> Self {
        Self {
            cells: BTreeMap::new(),
        }
    }
}

impl<V: Copy + AddAssign + Default> AggregateMapping<V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds `value` to the `(outer, inner)` cell, creating it at zero first.
    pub fn accumulate(&mut self, outer: &str, inner: &str, value: V) {
        let row = self
            .cells
            .entry(outer.to_string())
            .or_insert_with(BTreeMap::new);
        *row.entry(inner.to_string()).or_insert_with(V::default) += value;
    }

    /// Folds every cell of `other` into `self`.
    pub fn merge(&mut self, other: &AggregateMapping<V>) {
        for (outer, inner, value) in other.iter() {
            self.accumulate(outer, inner, value);
        }
    }

    pub fn get(&self, outer: &str, inner: &str) -> Option<V> {
        self.cells.get(outer)?.get(inner).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str, V)> {
        self.cells.iter().flat_map(|(outer, row)| {
            row.iter()
                .map(move |(inner, value)| (outer.as_str(), inner.as_str(), *value))
        })
    }

    /// Number of `(outer, inner)` cells.
    pub fn len(&self) -> usize {
        self.cells.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }
}

/// Transaction totals keyed by `YYYY-MM-DD`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DailyTotals {
    days: BTreeMap<String, i64>,
}

impl DailyTotals {
    pub fn accumulate(&mut self, date: &str, total: i64) {
        *self.days.entry(date.to_string()).or_insert(0) += total;
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, i64)> {
        self.days.iter().map(|(d, t)| (d.as_str(), *t))
    }

    pub fn len(&self) -> usize {
        self.days.len()
    }

    pub fn is_empty(&self) -> bool {
        self.days.is_empty()
    }
}

/// Raw location names that could not be resolved to a commune, reported once
/// at the end of a run.
pub type ErrorSet = BTreeSet<String>;
