//! Error types shared by the reconciliation and date-range modules.

use crate::model::FieldKey;
use thiserror::Error;

/// Errors reported by the engine.
///
/// `UnknownKey`, `InvertedRange` and `DateParse` are caused by bad input.
/// `UnequalTie` and `MissingPrimaryKey` signal a broken internal invariant
/// and should never be silenced by callers.
#[derive(Debug, Error)]
pub enum ReconcileError {
    #[error("key {key} is not a field of the target record")]
    UnknownKey { key: FieldKey },

    #[error("invalid date range: begin ({begin}) is after end ({end})")]
    InvertedRange { begin: String, end: String },

    #[error(transparent)]
    DateParse(#[from] time::error::Parse),

    #[error(
        "ambiguous maxima ({incoming}, {stored}) share a row or column with unequal ratios {accepted} and {conflicting}"
    )]
    UnequalTie {
        incoming: usize,
        stored: usize,
        accepted: f64,
        conflicting: f64,
    },

    #[error("stored record {stored} matched incoming record {incoming} but has no `{primary_key}` value")]
    MissingPrimaryKey {
        incoming: usize,
        stored: usize,
        primary_key: String,
    },

    #[error("configuration error: {0}")]
    Config(String),
}

impl From<figment::Error> for ReconcileError {
    fn from(e: figment::Error) -> Self {
        Self::Config(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, ReconcileError>;
