//! Drift report types for quota reconciliation.
//!
//! Reconciliation recounts each user's active listings and overwrites the
//! stored counter with the recount. It never adjusts relatively.

use serde::{Deserialize, Serialize};

use crate::types::UserId;

/// Whether a reconciliation run writes its fixes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ReconcileMode {
    #[default]
    Apply,
    /// Report drift without writing.
    DryRun,
}

/// Recorded and recounted values for one user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecountOutcome {
    pub recorded: i32,
    pub actual: i32,
    /// The stored counter was overwritten with `actual`.
    pub repaired: bool,
}

impl RecountOutcome {
    #[must_use]
    pub const fn drifted(&self) -> bool {
        self.recorded != self.actual
    }
}

/// A user whose counter disagreed with the recount.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DriftRecord {
    pub user_id: UserId,
    pub recorded: i32,
    pub actual: i32,
    pub repaired: bool,
}

/// Summary of a reconciliation run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconcileReport {
    pub mode: ReconcileMode,
    pub scanned: usize,
    pub fixed: usize,
    pub already_correct: usize,
    pub failed: usize,
    pub drift: Vec<DriftRecord>,
}

impl ReconcileReport {
    #[must_use]
    pub fn new(mode: ReconcileMode) -> Self {
        Self {
            mode,
            ..Self::default()
        }
    }

    /// Record a successful recount.
    pub fn record(&mut self, user_id: UserId, outcome: RecountOutcome) {
        self.scanned += 1;
        if !outcome.drifted() {
            self.already_correct += 1;
            return;
        }
        if outcome.repaired {
            self.fixed += 1;
        }
        self.drift.push(DriftRecord {
            user_id,
            recorded: outcome.recorded,
            actual: outcome.actual,
            repaired: outcome.repaired,
        });
    }

    /// Record a user whose recount failed.
    pub const fn record_failure(&mut self) {
        self.scanned += 1;
        self.failed += 1;
    }

    /// Users whose counters disagreed, repaired or not.
    #[must_use]
    pub fn drifted(&self) -> usize {
        self.drift.len()
    }
}
