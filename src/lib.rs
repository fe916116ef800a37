//! # Reconcile
//!
//! Fuzzy record reconciliation and date-range matching.
//!
//! Given the records currently stored and an incoming collection meant to
//! replace them, the engine pairs records by field similarity rather than by
//! identity and classifies each one as unchanged, updated, inserted or
//! deleted. A companion module partitions date ranges by overlap and finds the
//! range that best covers a query range.

pub mod compare;
pub mod config;
pub mod crossing;
pub mod error;
pub mod matcher;
pub mod model;
pub mod prepare;
pub mod similarity;
pub mod temporal;

// Re-export main types for convenience
pub use compare::{CandidateScore, FieldSetComparator};
pub use config::{ReconcileConfig, ThresholdBand};
pub use crossing::{best_match, split, Crossing, CrossingMatch, DateRangeCrossing, DateRangeMatcher, Split};
pub use error::{ReconcileError, Result};
pub use matcher::{MatchBuckets, MatchKind, MatchPair, RecordMatcher};
pub use model::{FieldKey, KeySet, Record, Value};
pub use prepare::{prepare_record, MatchingPreparer, ThresholdPreparer};
pub use similarity::{canonical_repr, content_hash, similarity};
pub use temporal::{is_crossed, Interval, Ranged};
