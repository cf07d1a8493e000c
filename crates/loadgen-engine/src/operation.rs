//! Operation kinds, intents, and results.

use crate::error::{ConfigError, OperationError};
use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::RangeInclusive;
use std::str::FromStr;

/// Range that Write values are drawn from.
pub const WRITE_VALUE_RANGE: RangeInclusive<f64> = 1.0..=100.0;

/// Kind of operation a worker issues in one iteration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationKind {
    Read,
    Write,
}

impl OperationKind {
    /// Every kind, in declaration order.
    pub const ALL: [OperationKind; 2] = [OperationKind::Read, OperationKind::Write];

    pub fn as_str(&self) -> &'static str {
        match self {
            OperationKind::Read => "read",
            OperationKind::Write => "write",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OperationKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let name = s.trim();
        OperationKind::ALL
            .into_iter()
            .find(|kind| kind.as_str().eq_ignore_ascii_case(name))
            .ok_or_else(|| ConfigError::UnknownOperation(name.to_string()))
    }
}

/// Aggregate queries a Read can issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateQuery {
    /// Group rows by worker id and return the largest group with its
    /// count, average, maximum and minimum value.
    TopWorker,
}

/// A synthetic row produced by a Write.
#[derive(Debug, Clone, PartialEq)]
pub struct SyntheticRow {
    pub worker_id: usize,
    pub iteration: u64,
    pub value: f64,
    pub recorded_at: DateTime<Utc>,
}

/// What a worker asks the backend to do for one iteration.
#[derive(Debug, Clone, PartialEq)]
pub enum OperationIntent {
    Read {
        worker_id: usize,
        iteration: u64,
        query: AggregateQuery,
    },
    Write(SyntheticRow),
}

impl OperationIntent {
    /// Build the intent for `kind`, drawing any random inputs from `rng`.
    pub fn generate<R: Rng + ?Sized>(
        kind: OperationKind,
        worker_id: usize,
        iteration: u64,
        rng: &mut R,
    ) -> Self {
        match kind {
            OperationKind::Read => OperationIntent::Read {
                worker_id,
                iteration,
                query: AggregateQuery::TopWorker,
            },
            OperationKind::Write => OperationIntent::Write(SyntheticRow {
                worker_id,
                iteration,
                value: rng.gen_range(WRITE_VALUE_RANGE),
                recorded_at: Utc::now(),
            }),
        }
    }

    pub fn kind(&self) -> OperationKind {
        match self {
            OperationIntent::Read { .. } => OperationKind::Read,
            OperationIntent::Write(_) => OperationKind::Write,
        }
    }

    pub fn worker_id(&self) -> usize {
        match self {
            OperationIntent::Read { worker_id, .. } => *worker_id,
            OperationIntent::Write(row) => row.worker_id,
        }
    }

    pub fn iteration(&self) -> u64 {
        match self {
            OperationIntent::Read { iteration, .. } => *iteration,
            OperationIntent::Write(row) => row.iteration,
        }
    }
}

/// The largest per-worker group returned by a Read.
#[derive(Debug, Clone, PartialEq)]
pub struct AggregateRow {
    pub worker_id: usize,
    pub count: i64,
    pub avg: f64,
    pub max: f64,
    pub min: f64,
}

/// Data returned by a successful operation.
#[derive(Debug, Clone, PartialEq)]
pub enum OperationPayload {
    /// `None` when the table holds no rows yet.
    Aggregate(Option<AggregateRow>),
    Inserted(SyntheticRow),
}

impl fmt::Display for OperationPayload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OperationPayload::Aggregate(None) => write!(f, "result: no rows"),
            OperationPayload::Aggregate(Some(row)) => write!(
                f,
                "result: worker {} count={} avg={:.2} max={:.2} min={:.2}",
                row.worker_id, row.count, row.avg, row.max, row.min
            ),
            OperationPayload::Inserted(row) => write!(f, "value: {}", row.value),
        }
    }
}

/// Result of one iteration, as reported to observers.
#[derive(Debug, Clone, PartialEq)]
pub struct OperationResult {
    pub kind: OperationKind,
    pub iteration: u64,
    pub success: bool,
    pub error: Option<String>,
    pub payload: Option<OperationPayload>,
}

impl OperationResult {
    pub fn succeeded(kind: OperationKind, iteration: u64, payload: OperationPayload) -> Self {
        Self {
            kind,
            iteration,
            success: true,
            error: None,
            payload: Some(payload),
        }
    }

    pub fn failed(kind: OperationKind, iteration: u64, error: &OperationError) -> Self {
        Self {
            kind,
            iteration,
            success: false,
            error: Some(error.to_string()),
            payload: None,
        }
    }
}
