//! # Update-Set Preparation
//!
//! Turns stored and incoming record collections into the list of records a
//! caller should persist. A returned record without a primary key is an insert;
//! one carrying a primary key updates the stored record with that identity.

use crate::compare::FieldSetComparator;
use crate::config::{ReconcileConfig, ThresholdBand};
use crate::error::{ReconcileError, Result};
use crate::matcher::{MatchBuckets, PrepareFn, RecordMatcher};
use crate::model::{FieldKey, Record, Value};
use rayon::prelude::*;
use tracing::{debug, instrument, warn};

/// Drop sequence fields and reduce nested records to their primary-key value.
///
/// A nested record without a primary key becomes null.
pub fn prepare_record(record: &Record, primary_key: &FieldKey) -> Record {
    let mut prepared = Record::new();
    for (key, value) in record.iter() {
        match value {
            Value::List(_) => {}
            Value::Record(nested) => {
                let id = nested.get(primary_key).cloned().unwrap_or(Value::Null);
                prepared.insert(key.clone(), id);
            }
            scalar => {
                prepared.insert(key.clone(), scalar.clone());
            }
        }
    }
    prepared
}

/// [`prepare_record`] without the primary-key field, for scoring.
fn comparable(record: &Record, primary_key: &FieldKey) -> Record {
    let mut prepared = prepare_record(record, primary_key);
    prepared.remove(primary_key);
    prepared
}

fn has_identity(value: Option<&Value>) -> bool {
    !matches!(value, None | Some(Value::Null))
}

/// Classifies each incoming record by its best stored candidate only.
///
/// Ratios inside the band become updates of that candidate. Everything else
/// is passed through as unchanged or a fresh insert, keeping any primary key
/// the caller supplied. Deletions are never produced.
#[derive(Debug, Clone)]
pub struct ThresholdPreparer {
    primary_key: FieldKey,
    precision: Option<u32>,
    band: ThresholdBand,
}

impl Default for ThresholdPreparer {
    fn default() -> Self {
        Self::from_config(&ReconcileConfig::default())
    }
}

impl ThresholdPreparer {
    pub fn from_config(config: &ReconcileConfig) -> Self {
        Self {
            primary_key: FieldKey::from(config.matching.primary_key.as_str()),
            precision: config.matching.precision,
            band: config.threshold,
        }
    }

    pub fn with_band(mut self, band: ThresholdBand) -> Self {
        self.band = band;
        self
    }

    #[instrument(
        skip(self, stored, incoming),
        level = "debug",
        fields(stored = stored.len(), incoming = incoming.len())
    )]
    pub fn prepare(&self, stored: &[Record], incoming: &[Record]) -> Vec<Record> {
        let candidates: Vec<Record> = stored
            .iter()
            .map(|record| comparable(record, &self.primary_key))
            .collect();

        let mut updates = 0usize;
        let prepared: Vec<Record> = incoming
            .iter()
            .enumerate()
            .map(|(index, record)| {
                let mut prepared = prepare_record(record, &self.primary_key);
                let target = comparable(record, &self.primary_key);
                if target.is_empty() {
                    warn!(incoming = index, "record has no comparable fields");
                    return prepared;
                }

                let best = FieldSetComparator::new(&target)
                    .precision(self.precision)
                    .compare_all(&candidates)
                    .into_iter()
                    .fold(None, |best: Option<(f64, usize)>, score| match best {
                        Some((ratio, _)) if ratio >= score.ratio => best,
                        _ => Some((score.ratio, score.index)),
                    });

                if let Some((ratio, matched)) = best {
                    if self.band.contains(ratio) {
                        match stored[matched].get(&self.primary_key) {
                            Some(id) if has_identity(Some(id)) => {
                                prepared.insert(self.primary_key.clone(), id.clone());
                                updates += 1;
                            }
                            _ => warn!(
                                incoming = index,
                                stored = matched,
                                "best candidate has no primary key"
                            ),
                        }
                    }
                }
                prepared
            })
            .collect();

        debug!(updates, "threshold preparation complete");
        prepared
    }
}

/// Runs the full [`RecordMatcher`] and surfaces its insert and update buckets.
///
/// Unchanged and deleted records are not returned; callers that handle
/// deletions should use [`MatchingPreparer::plan`].
#[derive(Debug, Clone)]
pub struct MatchingPreparer {
    primary_key: FieldKey,
    precision: Option<u32>,
    keys: Option<Vec<FieldKey>>,
}

impl Default for MatchingPreparer {
    fn default() -> Self {
        Self::from_config(&ReconcileConfig::default())
    }
}

impl MatchingPreparer {
    pub fn from_config(config: &ReconcileConfig) -> Self {
        Self {
            primary_key: FieldKey::from(config.matching.primary_key.as_str()),
            precision: config.matching.precision,
            keys: None,
        }
    }

    pub fn with_keys(mut self, keys: Vec<FieldKey>) -> Self {
        self.keys = Some(keys);
        self
    }

    fn hook(&self) -> PrepareFn<'_> {
        Box::new(move |record: &Record| comparable(record, &self.primary_key))
    }

    /// Matcher buckets over the prepared, primary-key-free records.
    pub fn plan(&self, stored: &[Record], incoming: &[Record]) -> Result<MatchBuckets> {
        let mut matcher = RecordMatcher::new(stored, incoming)
            .with_precision(self.precision)
            .with_prepare_stored(self.hook())
            .with_prepare_incoming(self.hook());
        if let Some(keys) = &self.keys {
            matcher = matcher.with_keys(keys.clone());
        }
        matcher.run()
    }

    /// Inserts (no primary key) followed by updates (stored primary key).
    ///
    /// # Errors
    /// Returns [`ReconcileError::MissingPrimaryKey`] when a matched stored
    /// record has no primary-key value.
    #[instrument(
        skip(self, stored, incoming),
        level = "debug",
        fields(stored = stored.len(), incoming = incoming.len())
    )]
    pub fn prepare(&self, stored: &[Record], incoming: &[Record]) -> Result<Vec<Record>> {
        let buckets = self.plan(stored, incoming)?;
        let mut prepared = Vec::with_capacity(buckets.insert.len() + buckets.update.len());

        for pair in &buckets.insert {
            let Some(u) = pair.incoming else { continue };
            let mut record = prepare_record(&incoming[u], &self.primary_key);
            record.remove(&self.primary_key);
            prepared.push(record);
        }

        for pair in &buckets.update {
            let (Some(u), Some(s)) = (pair.incoming, pair.stored) else {
                continue;
            };
            let id = stored[s]
                .get(&self.primary_key)
                .filter(|id| has_identity(Some(id)))
                .ok_or_else(|| ReconcileError::MissingPrimaryKey {
                    incoming: u,
                    stored: s,
                    primary_key: self.primary_key.to_string(),
                })?;
            let mut record = prepare_record(&incoming[u], &self.primary_key);
            record.insert(self.primary_key.clone(), id.clone());
            prepared.push(record);
        }

        debug!(
            inserts = buckets.insert.len(),
            updates = buckets.update.len(),
            unchanged = buckets.unchanged.len(),
            "matching preparation complete"
        );
        Ok(prepared)
    }

    /// Prepare independent `(stored, incoming)` groups in parallel.
    ///
    /// Results keep the order of `batches`.
    pub fn prepare_batches(&self, batches: &[(Vec<Record>, Vec<Record>)]) -> Vec<Result<Vec<Record>>> {
        batches
            .par_iter()
            .map(|(stored, incoming)| self.prepare(stored, incoming))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn person(id: Option<i64>, name: &str, city: &str) -> Record {
        let mut record = Record::new();
        if let Some(id) = id {
            record.insert("id", id);
        }
        record.insert("name", name);
        record.insert("city", city);
        record
    }

    #[test]
    fn test_prepare_record_flattens_and_strips() {
        let mut record = Record::from_pairs([("id", 1)]);
        record.insert("owner", Record::from_pairs([("id", Value::Int(7)), ("name", "x".into())]));
        record.insert("orphan", Record::from_pairs([("name", "y")]));
        record.insert("children", vec![Value::Int(1), Value::Int(2)]);

        let prepared = prepare_record(&record, &FieldKey::from("id"));
        assert_eq!(prepared.field("owner"), Some(&Value::Int(7)));
        assert_eq!(prepared.field("orphan"), Some(&Value::Null));
        assert!(prepared.field("children").is_none());
        assert_eq!(prepared.field("id"), Some(&Value::Int(1)));
    }

    #[test]
    fn test_matching_preparer_inserts_and_updates() {
        let stored = vec![
            person(Some(10), "Alice Smith", "Oslo"),
            person(Some(11), "Bob Jones", "Bergen"),
        ];
        let incoming = vec![
            person(None, "Alice Smith", "Oslo"),
            person(None, "Bob Jones", "Bergen!"),
            person(None, "Zed Qux", "Tromsø"),
        ];
        let prepared = MatchingPreparer::default().prepare(&stored, &incoming).unwrap();

        assert_eq!(prepared.len(), 2);
        assert!(prepared[0].field("id").is_none());
        assert_eq!(prepared[0].field("name"), Some(&Value::from("Zed Qux")));
        assert_eq!(prepared[1].field("id"), Some(&Value::Int(11)));
        assert_eq!(prepared[1].field("city"), Some(&Value::from("Bergen!")));
    }

    #[test]
    fn test_matching_preparer_ignores_incoming_primary_keys() {
        let stored = vec![person(Some(10), "Alice", "Oslo")];
        let incoming = vec![person(Some(99), "Alice", "Oslo")];
        let plan = MatchingPreparer::default().plan(&stored, &incoming).unwrap();
        assert_eq!(plan.unchanged.len(), 1);
    }

    #[test]
    fn test_matching_preparer_requires_stored_primary_key() {
        let stored = vec![person(None, "Alice Smith", "Oslo")];
        let incoming = vec![person(None, "Alice Smith", "Oslo!")];
        let err = MatchingPreparer::default()
            .prepare(&stored, &incoming)
            .unwrap_err();
        assert!(matches!(err, ReconcileError::MissingPrimaryKey { stored: 0, .. }));
    }

    #[test]
    fn test_threshold_preparer_bands() {
        let stored = vec![
            person(Some(1), "Alice Smith", "Oslo"),
            person(Some(2), "Bob Jones", "Bergen"),
        ];
        let incoming = vec![
            person(None, "Alice Smith", "Oslo"),
            person(None, "Bob Jones", "Bergenn"),
            person(Some(5), "Zed", "Qux"),
        ];
        let prepared = ThresholdPreparer::default().prepare(&stored, &incoming);

        assert_eq!(prepared.len(), 3);
        // Exact match: passed through without stored identity.
        assert!(prepared[0].field("id").is_none());
        // Inside the band: takes the stored identity.
        assert_eq!(prepared[1].field("id"), Some(&Value::Int(2)));
        // Below the band: fresh insert keeps its own key.
        assert_eq!(prepared[2].field("id"), Some(&Value::Int(5)));
    }

    #[test]
    fn test_threshold_preparer_without_stored_records() {
        let incoming = vec![person(None, "Alice", "Oslo")];
        let prepared = ThresholdPreparer::default().prepare(&[], &incoming);
        assert_eq!(prepared, vec![person(None, "Alice", "Oslo")]);
    }

    #[test]
    fn test_prepare_batches_keeps_order() {
        let batches = vec![
            (vec![], vec![person(None, "A", "x")]),
            (vec![person(Some(3), "B", "y")], vec![]),
        ];
        let results = MatchingPreparer::default().prepare_batches(&batches);
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].as_ref().unwrap().len(), 1);
        assert!(results[1].as_ref().unwrap().is_empty());
    }
}
