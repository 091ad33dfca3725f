//! Named aggregate counters exposed by a running or finished job.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Snapshot of a job's accumulators, keyed by name.
pub type Accumulators = BTreeMap<String, Accumulator>;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum Accumulator {
    Long(i64),
    Double(f64),
}

impl Accumulator {
    /// Fold `other` into `self`. Mixed kinds widen to `Double`.
    pub fn merge(self, other: Accumulator) -> Accumulator {
        match (self, other) {
            (Accumulator::Long(a), Accumulator::Long(b)) => Accumulator::Long(a.saturating_add(b)),
            (a, b) => Accumulator::Double(a.as_f64() + b.as_f64()),
        }
    }

    pub fn as_f64(self) -> f64 {
        match self {
            Accumulator::Long(v) => v as f64,
            Accumulator::Double(v) => v,
        }
    }

    pub fn as_i64(self) -> Option<i64> {
        match self {
            Accumulator::Long(v) => Some(v),
            Accumulator::Double(_) => None,
        }
    }
}

impl fmt::Display for Accumulator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Accumulator::Long(v) => write!(f, "{v}"),
            Accumulator::Double(v) => write!(f, "{v:.4}"),
        }
    }
}
