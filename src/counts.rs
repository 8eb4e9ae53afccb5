//! Per-file qualifying-note counters and their merge.

use itertools::Itertools;
use std::collections::BTreeMap;

use crate::Mrn;

/// A count of qualifying notes per MRN.
///
/// One of these is produced per batch file and merged into a running total by
/// the reducer. B-tree so iteration order is predictable (ascending MRN).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Counts {
    els: BTreeMap<Mrn, u64>,
}

impl Counts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one qualifying note for `mrn`.
    pub fn record(&mut self, mrn: Mrn) {
        *self.els.entry(mrn).or_insert(0) += 1;
    }

    /// Pointwise sum; MRNs present in only one side pass through unchanged.
    pub fn merge(&mut self, other: Counts) {
        for (mrn, n) in other.els {
            *self.els.entry(mrn).or_insert(0) += n;
        }
    }

    /// Sum over all MRNs.
    pub fn total(&self) -> u64 {
        self.els.values().sum()
    }

    pub fn get(&self, mrn: Mrn) -> u64 {
        self.els.get(&mrn).copied().unwrap_or(0)
    }

    pub fn len(&self) -> usize {
        self.els.len()
    }

    pub fn is_empty(&self) -> bool {
        self.els.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Mrn, u64)> + '_ {
        self.els.iter().map(|(mrn, n)| (*mrn, *n))
    }

    /// Consume into (mrn, count) pairs sorted by count descending.
    ///
    /// The sort is stable over ascending-MRN input, so equal counts come out
    /// in ascending MRN order.
    pub fn into_sorted(self) -> Vec<(Mrn, u64)> {
        self.els
            .into_iter()
            .sorted_by(|a, b| b.1.cmp(&a.1))
            .collect()
    }
}

impl FromIterator<Mrn> for Counts {
    fn from_iter<T: IntoIterator<Item = Mrn>>(iter: T) -> Self {
        let mut counts = Counts::new();
        for mrn in iter {
            counts.record(mrn);
        }
        counts
    }
}
