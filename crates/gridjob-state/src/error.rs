//! Registry store failures.

use std::fmt;

use thiserror::Error;

pub type StateResult<T> = Result<T, StateError>;

/// The redb call that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Open,
    Transaction,
    Table,
    Read,
    Write,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Stage::Open => "open",
            Stage::Transaction => "transaction",
            Stage::Table => "table",
            Stage::Read => "read",
            Stage::Write => "write",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Error)]
pub enum StateError {
    #[error("registry {stage} failed: {message}")]
    Storage { stage: Stage, message: String },

    /// A stored record could not be encoded or decoded.
    #[error("registry record codec: {0}")]
    Codec(#[from] serde_json::Error),
}

impl StateError {
    pub fn storage(stage: Stage, err: impl fmt::Display) -> Self {
        StateError::Storage {
            stage,
            message: err.to_string(),
        }
    }
}
