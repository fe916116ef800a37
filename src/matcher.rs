//! # Record Matcher
//!
//! Greedy similarity-based pairing of incoming records with stored records.
//!
//! Every incoming row is scored against the stored columns with a
//! [`FieldSetComparator`]. Exact pairs found during that pass are taken
//! immediately and their row and column excluded. Afterwards the highest
//! remaining ratio is accepted round by round, dropping tied pairs that share a
//! row or column with an already accepted one, until no positive ratio is left.
//! The result is locally greedy, not a globally optimal assignment.

use crate::compare::FieldSetComparator;
use crate::config::DEFAULT_RATIO_PRECISION;
use crate::error::{ReconcileError, Result};
use crate::model::{FieldKey, Record};
use rustc_hash::FxHashSet;
use serde::{Deserialize, Serialize};
use std::fmt;
use tracing::{debug, instrument, trace};

/// Classification of a matched or unmatched record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    Unchanged,
    Update,
    Insert,
    Delete,
}

impl MatchKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchKind::Unchanged => "unchanged",
            MatchKind::Update => "update",
            MatchKind::Insert => "insert",
            MatchKind::Delete => "delete",
        }
    }
}

impl fmt::Display for MatchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coordinates of a pairing. Inserts have no stored index, deletes no
/// incoming index.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MatchPair {
    pub incoming: Option<usize>,
    pub stored: Option<usize>,
    pub ratio: f64,
}

impl MatchPair {
    fn matched(incoming: usize, stored: usize, ratio: f64) -> Self {
        Self {
            incoming: Some(incoming),
            stored: Some(stored),
            ratio,
        }
    }

    fn insert(incoming: usize, ratio: f64) -> Self {
        Self {
            incoming: Some(incoming),
            stored: None,
            ratio,
        }
    }

    fn delete(stored: usize, ratio: f64) -> Self {
        Self {
            incoming: None,
            stored: Some(stored),
            ratio,
        }
    }
}

/// Matcher output, one ordered list per [`MatchKind`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MatchBuckets {
    pub unchanged: Vec<MatchPair>,
    pub update: Vec<MatchPair>,
    pub insert: Vec<MatchPair>,
    pub delete: Vec<MatchPair>,
}

impl MatchBuckets {
    pub fn bucket(&self, kind: MatchKind) -> &[MatchPair] {
        match kind {
            MatchKind::Unchanged => &self.unchanged,
            MatchKind::Update => &self.update,
            MatchKind::Insert => &self.insert,
            MatchKind::Delete => &self.delete,
        }
    }

    /// All pairs tagged with their kind, bucket by bucket.
    pub fn pairs(&self) -> impl Iterator<Item = (MatchKind, &MatchPair)> {
        [
            MatchKind::Unchanged,
            MatchKind::Update,
            MatchKind::Insert,
            MatchKind::Delete,
        ]
        .into_iter()
        .flat_map(move |kind| self.bucket(kind).iter().map(move |pair| (kind, pair)))
    }

    pub fn len(&self) -> usize {
        self.unchanged.len() + self.update.len() + self.insert.len() + self.delete.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Normalizes a raw record into its comparable form.
pub type PrepareFn<'a> = Box<dyn Fn(&Record) -> Record + Send + Sync + 'a>;

/// Pairs `incoming` records with `stored` records by similarity.
pub struct RecordMatcher<'a> {
    stored: &'a [Record],
    incoming: &'a [Record],
    keys: Option<Vec<FieldKey>>,
    precision: Option<u32>,
    prepare_stored: Option<PrepareFn<'a>>,
    prepare_incoming: Option<PrepareFn<'a>>,
}

impl<'a> RecordMatcher<'a> {
    pub fn new(stored: &'a [Record], incoming: &'a [Record]) -> Self {
        Self {
            stored,
            incoming,
            keys: None,
            precision: Some(DEFAULT_RATIO_PRECISION),
            prepare_stored: None,
            prepare_incoming: None,
        }
    }

    /// Compare only over `keys`, which every incoming record must contain.
    pub fn with_keys(mut self, keys: Vec<FieldKey>) -> Self {
        self.keys = Some(keys);
        self
    }

    pub fn with_precision(mut self, precision: Option<u32>) -> Self {
        self.precision = precision;
        self
    }

    pub fn with_prepare_stored(mut self, prepare: PrepareFn<'a>) -> Self {
        self.prepare_stored = Some(prepare);
        self
    }

    pub fn with_prepare_incoming(mut self, prepare: PrepareFn<'a>) -> Self {
        self.prepare_incoming = Some(prepare);
        self
    }

    /// Run the matcher and classify every record.
    ///
    /// # Errors
    /// Fails when explicit keys are missing from an incoming record, or when
    /// tied maxima turn out to carry different ratios.
    #[instrument(
        skip(self),
        level = "debug",
        fields(stored = self.stored.len(), incoming = self.incoming.len())
    )]
    pub fn run(&self) -> Result<MatchBuckets> {
        if self.stored.is_empty() || self.incoming.is_empty() {
            return Ok(MatchBuckets {
                insert: (0..self.incoming.len())
                    .map(|u| MatchPair::insert(u, 1.0))
                    .collect(),
                delete: (0..self.stored.len())
                    .map(|s| MatchPair::delete(s, 1.0))
                    .collect(),
                ..MatchBuckets::default()
            });
        }

        let stored = prepare_all(self.stored, self.prepare_stored.as_ref());
        let incoming = prepare_all(self.incoming, self.prepare_incoming.as_ref());

        let mut state = MatchState::new(incoming.len(), stored.len());
        let exact = state.score(&incoming, &stored, self.keys.as_deref(), self.precision)?;
        debug!(exact = exact.len(), "ratio pass complete");

        let mut accepted: Vec<Cell> = Vec::new();
        let mut round = exact;
        let mut round_no = 0usize;
        loop {
            if round.is_empty() {
                round = state.maxima();
                if round.is_empty() {
                    break;
                }
            }
            let resolved = resolve_ambiguity(std::mem::take(&mut round))?;
            round_no += 1;
            debug!(
                round = round_no,
                accepted = resolved.len(),
                ratio = resolved[0].ratio,
                "accepted maxima"
            );
            for cell in &resolved {
                state.exclude(cell);
            }
            accepted.extend(resolved);
        }

        Ok(state.classify(accepted))
    }
}

fn prepare_all(records: &[Record], prepare: Option<&PrepareFn<'_>>) -> Vec<Record> {
    match prepare {
        Some(prepare) => records.iter().map(|record| prepare(record)).collect(),
        None => records.to_vec(),
    }
}

/// One scored (incoming row, stored column) pair.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) struct Cell {
    pub row: usize,
    pub col: usize,
    pub ratio: f64,
}

/// Dense ratio matrix plus the rows and columns already taken.
struct MatchState {
    rows: usize,
    cols: usize,
    ratios: Vec<Option<f64>>,
    excluded_rows: FxHashSet<usize>,
    excluded_cols: FxHashSet<usize>,
}

impl MatchState {
    fn new(rows: usize, cols: usize) -> Self {
        Self {
            rows,
            cols,
            ratios: vec![None; rows * cols],
            excluded_rows: FxHashSet::default(),
            excluded_cols: FxHashSet::default(),
        }
    }

    /// Fill the matrix row by row; the first exact ratio of a row claims its
    /// row and column for the rest of the pass.
    fn score(
        &mut self,
        incoming: &[Record],
        stored: &[Record],
        keys: Option<&[FieldKey]>,
        precision: Option<u32>,
    ) -> Result<Vec<Cell>> {
        let mut exact = Vec::new();
        for (row, record) in incoming.iter().enumerate() {
            let comparator = FieldSetComparator::with_keys(record, keys)?.precision(precision);
            for score in comparator.compare(stored, &self.excluded_cols) {
                self.ratios[row * self.cols + score.index] = Some(score.ratio);
                if score.ratio == 1.0 && !self.excluded_rows.contains(&row) {
                    let cell = Cell {
                        row,
                        col: score.index,
                        ratio: score.ratio,
                    };
                    self.exclude(&cell);
                    exact.push(cell);
                }
            }
        }
        Ok(exact)
    }

    fn exclude(&mut self, cell: &Cell) {
        self.excluded_rows.insert(cell.row);
        self.excluded_cols.insert(cell.col);
    }

    /// All open cells sharing the highest positive ratio, in row-major order.
    fn maxima(&self) -> Vec<Cell> {
        let mut best = 0.0f64;
        let mut maxima = Vec::new();
        for row in (0..self.rows).filter(|r| !self.excluded_rows.contains(r)) {
            for col in (0..self.cols).filter(|c| !self.excluded_cols.contains(c)) {
                let Some(ratio) = self.ratios[row * self.cols + col] else {
                    continue;
                };
                if ratio <= 0.0 || ratio < best {
                    continue;
                }
                if ratio > best {
                    best = ratio;
                    maxima.clear();
                }
                maxima.push(Cell { row, col, ratio });
            }
        }
        maxima
    }

    fn classify(&self, accepted: Vec<Cell>) -> MatchBuckets {
        let mut buckets = MatchBuckets::default();
        for cell in accepted {
            let pair = MatchPair::matched(cell.row, cell.col, cell.ratio);
            if cell.ratio == 1.0 {
                buckets.unchanged.push(pair);
            } else {
                buckets.update.push(pair);
            }
        }
        buckets.insert = (0..self.rows)
            .filter(|row| !self.excluded_rows.contains(row))
            .map(|row| MatchPair::insert(row, 0.0))
            .collect();
        buckets.delete = (0..self.cols)
            .filter(|col| !self.excluded_cols.contains(col))
            .map(|col| MatchPair::delete(col, 0.0))
            .collect();
        buckets
    }
}

/// Reduce tied maxima to a conflict-free subset.
///
/// The first live cell is accepted and every later cell sharing its row or
/// column is discarded; repeat with the next live cell. Discarded cells must
/// carry the accepted cell's ratio.
pub(crate) fn resolve_ambiguity(maxima: Vec<Cell>) -> Result<Vec<Cell>> {
    let mut live = vec![true; maxima.len()];
    let mut accepted = Vec::with_capacity(maxima.len());

    for i in 0..maxima.len() {
        if !live[i] {
            continue;
        }
        let first = maxima[i];
        for j in (i + 1)..maxima.len() {
            let other = maxima[j];
            if !live[j] || (other.row != first.row && other.col != first.col) {
                continue;
            }
            if other.ratio != first.ratio {
                return Err(ReconcileError::UnequalTie {
                    incoming: other.row,
                    stored: other.col,
                    accepted: first.ratio,
                    conflicting: other.ratio,
                });
            }
            trace!(row = other.row, col = other.col, "discarding ambiguous pair");
            live[j] = false;
        }
        accepted.push(first);
    }

    Ok(accepted)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn protocols(names: &[&str]) -> Vec<Record> {
        names
            .iter()
            .map(|name| Record::from_pairs([("k", *name)]))
            .collect()
    }

    fn cell(row: usize, col: usize, ratio: f64) -> Cell {
        Cell { row, col, ratio }
    }

    #[test]
    fn test_protocol_names_example() {
        let stored = protocols(&["ltp", "udp", "smtp", "tftp", "sftp", "umtp"]);
        let incoming = protocols(&["https", "stp", "udp", "utp"]);
        let buckets = RecordMatcher::new(&stored, &incoming).run().unwrap();

        assert_eq!(buckets.unchanged, vec![MatchPair::matched(2, 1, 1.0)]);
        assert_eq!(
            buckets.update,
            vec![
                MatchPair::matched(1, 2, 0.9091),
                MatchPair::matched(3, 5, 0.9091),
                MatchPair::matched(0, 3, 0.7692),
            ]
        );
        assert!(buckets.insert.is_empty());
        let deleted: Vec<_> = buckets.delete.iter().map(|p| p.stored).collect();
        assert_eq!(deleted, vec![Some(0), Some(4)]);
    }

    #[test]
    fn test_unscalable_precision_matches_like_full_precision() {
        let stored = protocols(&["udp", "utp"]);
        let incoming = protocols(&["udp"]);
        let buckets = RecordMatcher::new(&stored, &incoming)
            .with_precision(Some(400))
            .run()
            .unwrap();
        assert_eq!(buckets.unchanged, vec![MatchPair::matched(0, 0, 1.0)]);
        assert_eq!(buckets.delete.len(), 1);
    }

    #[test]
    fn test_empty_stored_inserts_everything() {
        let incoming = protocols(&["a", "b"]);
        let buckets = RecordMatcher::new(&[], &incoming).run().unwrap();
        assert_eq!(
            buckets.insert,
            vec![MatchPair::insert(0, 1.0), MatchPair::insert(1, 1.0)]
        );
        assert!(buckets.delete.is_empty() && buckets.update.is_empty());
    }

    #[test]
    fn test_empty_incoming_deletes_everything() {
        let stored = protocols(&["a"]);
        let buckets = RecordMatcher::new(&stored, &[]).run().unwrap();
        assert_eq!(buckets.delete, vec![MatchPair::delete(0, 1.0)]);
        assert!(buckets.insert.is_empty());
    }

    #[test]
    fn test_unrelated_records_are_not_paired() {
        let stored = protocols(&["aaa"]);
        let incoming = vec![Record::from_pairs([("other", "zzz")])];
        let buckets = RecordMatcher::new(&stored, &incoming).run().unwrap();
        assert_eq!(buckets.insert.len(), 1);
        assert_eq!(buckets.delete.len(), 1);
        assert!(buckets.update.is_empty());
    }

    #[test]
    fn test_duplicates_pair_one_to_one() {
        let stored = protocols(&["udp", "udp"]);
        let incoming = protocols(&["udp", "udp", "udp"]);
        let buckets = RecordMatcher::new(&stored, &incoming).run().unwrap();
        assert_eq!(
            buckets.unchanged,
            vec![MatchPair::matched(0, 0, 1.0), MatchPair::matched(1, 1, 1.0)]
        );
        assert_eq!(buckets.insert, vec![MatchPair::insert(2, 0.0)]);
    }

    #[test]
    fn test_prepare_hooks_apply_per_side() {
        let stored = vec![Record::from_pairs([("k", "UDP")])];
        let incoming = protocols(&["udp"]);
        let lower: PrepareFn<'_> = Box::new(|record: &Record| {
            let mut out = record.clone();
            for (_, value) in out.iter_mut() {
                if let Some(text) = value.as_str() {
                    *value = text.to_lowercase().into();
                }
            }
            out
        });
        let buckets = RecordMatcher::new(&stored, &incoming)
            .with_prepare_stored(lower)
            .run()
            .unwrap();
        assert_eq!(buckets.unchanged.len(), 1);
    }

    #[test]
    fn test_explicit_keys_must_exist_on_incoming() {
        let stored = protocols(&["udp"]);
        let incoming = protocols(&["udp"]);
        let err = RecordMatcher::new(&stored, &incoming)
            .with_keys(vec![FieldKey::from("missing")])
            .run()
            .unwrap_err();
        assert!(matches!(err, ReconcileError::UnknownKey { .. }));
    }

    #[test]
    fn test_resolve_ambiguity_keeps_first_of_each_conflict() {
        let maxima = vec![cell(0, 0, 0.8), cell(0, 1, 0.8), cell(1, 0, 0.8), cell(1, 1, 0.8)];
        let resolved = resolve_ambiguity(maxima).unwrap();
        assert_eq!(resolved, vec![cell(0, 0, 0.8), cell(1, 1, 0.8)]);
    }

    #[test]
    fn test_resolve_ambiguity_rejects_unequal_ties() {
        let maxima = vec![cell(0, 0, 0.8), cell(0, 1, 0.7)];
        let err = resolve_ambiguity(maxima).unwrap_err();
        assert!(matches!(err, ReconcileError::UnequalTie { .. }));
    }

    #[test]
    fn test_pairs_iterates_all_buckets() {
        let stored = protocols(&["ltp", "udp", "smtp", "tftp", "sftp", "umtp"]);
        let incoming = protocols(&["https", "stp", "udp", "utp"]);
        let buckets = RecordMatcher::new(&stored, &incoming).run().unwrap();
        let kinds: Vec<MatchKind> = buckets.pairs().map(|(kind, _)| kind).collect();
        assert_eq!(kinds.len(), buckets.len());
        assert_eq!(kinds.first(), Some(&MatchKind::Unchanged));
        assert_eq!(kinds.last(), Some(&MatchKind::Delete));
    }
}
