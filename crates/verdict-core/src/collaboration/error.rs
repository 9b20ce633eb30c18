//! Error types for the remediation round.

use std::fmt;

use serde::{Deserialize, Serialize};

/// One of the two remediation procedures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Procedure {
    EvidenceMediation,
    AdversarialValidation,
}

impl Procedure {
    pub fn as_str(self) -> &'static str {
        match self {
            Procedure::EvidenceMediation => "evidence_mediation",
            Procedure::AdversarialValidation => "adversarial_validation",
        }
    }
}

impl fmt::Display for Procedure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A remediation procedure that produced nothing usable.
///
/// Always recovered by the coordinator: the procedure's result list becomes
/// empty and its sibling is unaffected.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum CollaborationError {
    #[error("{procedure}: all {attempted} agent calls failed (last: {last_error})")]
    AllCallsFailed {
        procedure: Procedure,
        attempted: usize,
        last_error: String,
    },

    #[error("{procedure} task panicked: {detail}")]
    Panicked {
        procedure: Procedure,
        detail: String,
    },

    #[error("{procedure} task was cancelled")]
    Cancelled { procedure: Procedure },
}

impl CollaborationError {
    pub fn procedure(&self) -> Procedure {
        match self {
            CollaborationError::AllCallsFailed { procedure, .. }
            | CollaborationError::Panicked { procedure, .. }
            | CollaborationError::Cancelled { procedure } => *procedure,
        }
    }
}
