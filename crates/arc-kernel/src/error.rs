//! Error surface of the kernel.
//!
//! Three classes, kept distinct on purpose: structural validation errors
//! (enumerable, raised at registration), operational-sequencing errors
//! (caller-contract violations, surfaced immediately), and soft
//! diagnostics, which are returned as data next to successful results and
//! never raised. Nothing retries automatically.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Complete outcome of validating one arc definition. `errors` blocks
/// registration; `warnings` are suspicious-but-legal designs the caller
/// may treat as fatal or not.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct ValidationReport {
    pub arc_id: String,
    pub errors: Vec<String>,
    pub warnings: Vec<String>,
}

impl ValidationReport {
    pub fn new(arc_id: &str) -> Self {
        Self {
            arc_id: arc_id.to_string(),
            errors: Vec::new(),
            warnings: Vec::new(),
        }
    }

    pub fn error(&mut self, message: impl Into<String>) {
        self.errors.push(message.into());
    }

    pub fn warning(&mut self, message: impl Into<String>) {
        self.warnings.push(message.into());
    }

    pub fn is_valid(&self) -> bool {
        self.errors.is_empty()
    }
}

impl fmt::Display for ValidationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "arc {}: {} error(s), {} warning(s)",
            self.arc_id,
            self.errors.len(),
            self.warnings.len()
        )?;
        for e in &self.errors {
            write!(f, "; {e}")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum EngineError {
    #[error("arc {0} is already registered")]
    DuplicateArc(String),

    #[error("arc definition failed validation: {0}")]
    ValidationFailed(ValidationReport),

    #[error("arc {0} is not registered")]
    UnknownArc(String),

    #[error("arc {arc_id} has no resolution mode {mode_id}")]
    UnknownMode { arc_id: String, mode_id: String },

    #[error("no loop is active")]
    NoActiveLoop,

    #[error("loop {0} is already active; finalize it first")]
    LoopAlreadyActive(String),

    #[error("arc {0} declares no looper constraint")]
    NoLooperConstraint(String),

    #[error("snapshot schema version {0} is not supported")]
    UnsupportedSnapshot(String),
}
