//! # Field-Set Comparison
//!
//! Scores one target record against a list of candidates over a key-set.

use crate::config::DEFAULT_RATIO_PRECISION;
use crate::error::Result;
use crate::model::{FieldKey, KeySet, Record};
use crate::similarity::{canonical_repr, content_hash, similarity};
use rustc_hash::FxHashSet;

/// Aggregate score of one candidate against the comparator's target record.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CandidateScore {
    pub ratio: f64,
    /// Position of the candidate in the compared slice
    pub index: usize,
    /// [`content_hash`] of the candidate over the comparator's key-set
    pub hash: u64,
}

/// Round `ratio` to `precision` decimal digits; `None` keeps full precision.
///
/// Precisions beyond what an `f64` can scale leave the ratio untouched.
pub fn round_ratio(ratio: f64, precision: Option<u32>) -> f64 {
    let Some(digits) = precision else {
        return ratio;
    };
    let factor = match i32::try_from(digits) {
        Ok(digits) => 10f64.powi(digits),
        Err(_) => f64::INFINITY,
    };
    if !factor.is_finite() {
        return ratio;
    }
    (ratio * factor).round() / factor
}

/// Compares a target record against candidates field by field.
#[derive(Debug, Clone)]
pub struct FieldSetComparator<'a> {
    record: &'a Record,
    keys: KeySet,
    precision: Option<u32>,
}

impl<'a> FieldSetComparator<'a> {
    /// Compare over all of `record`'s keys with the default precision.
    pub fn new(record: &'a Record) -> Self {
        Self {
            record,
            keys: KeySet::of(record),
            precision: Some(DEFAULT_RATIO_PRECISION),
        }
    }

    /// Compare over `keys` (or all keys when `None`).
    ///
    /// # Errors
    /// Fails when an explicit key is not a field of `record`.
    pub fn with_keys(record: &'a Record, keys: Option<&[FieldKey]>) -> Result<Self> {
        Ok(Self {
            record,
            keys: KeySet::for_record(record, keys)?,
            precision: Some(DEFAULT_RATIO_PRECISION),
        })
    }

    pub fn precision(mut self, precision: Option<u32>) -> Self {
        self.precision = precision;
        self
    }

    pub fn keys(&self) -> &KeySet {
        &self.keys
    }

    /// Score every candidate whose index is not in `exclude`.
    ///
    /// A field missing from a candidate contributes 0.0. The ratio is the mean
    /// over the key-set, so an empty key-set scores every candidate 0.0.
    /// Results follow candidate order.
    pub fn compare(&self, candidates: &[Record], exclude: &FxHashSet<usize>) -> Vec<CandidateScore> {
        if candidates.is_empty() {
            return Vec::new();
        }

        let mut totals = vec![0.0f64; candidates.len()];
        for key in &self.keys {
            let Some(own) = self.record.get(key) else {
                continue;
            };
            let own = canonical_repr(own);
            for (index, candidate) in candidates.iter().enumerate() {
                if exclude.contains(&index) {
                    continue;
                }
                if let Some(value) = candidate.get(key) {
                    totals[index] += similarity(&own, &canonical_repr(value));
                }
            }
        }

        let key_count = self.keys.len();
        totals
            .into_iter()
            .enumerate()
            .filter(|(index, _)| !exclude.contains(index))
            .map(|(index, total)| {
                let mean = if key_count == 0 {
                    0.0
                } else {
                    total / key_count as f64
                };
                CandidateScore {
                    ratio: round_ratio(mean, self.precision),
                    index,
                    hash: content_hash(&candidates[index], &self.keys),
                }
            })
            .collect()
    }

    /// [`compare`](Self::compare) without exclusions.
    pub fn compare_all(&self, candidates: &[Record]) -> Vec<CandidateScore> {
        self.compare(candidates, &FxHashSet::default())
    }
}
