//! Quota counter reconciliation.
//!
//! Recounts every quota holder's active listings and overwrites counters
//! that drifted from the recount. Runs out of band (CLI or scheduled job),
//! never on the request path.
//!
//! A failure on one user is logged and counted; the run moves on to the
//! next user. Each user is recounted in its own transaction, so an
//! interrupted run leaves finished users repaired and the rest untouched.
//! Running again is always safe.

use async_trait::async_trait;
use sqlx::PgPool;

use marketboard_core::UserId;
use marketboard_core::reconcile::{ReconcileMode, ReconcileReport, RecountOutcome};

use crate::db::{QuotaRepository, RepositoryError};

/// Storage needed by the reconciler.
#[async_trait]
pub trait QuotaLedger: Send + Sync {
    /// Users with a quota counter, optionally restricted to one user.
    async fn quota_holders(&self, only: Option<UserId>) -> Result<Vec<UserId>, RepositoryError>;

    /// Recount one user and, in `Apply` mode, overwrite a drifted counter.
    async fn recount(
        &self,
        user_id: UserId,
        mode: ReconcileMode,
    ) -> Result<RecountOutcome, RepositoryError>;
}

/// `PostgreSQL` ledger.
#[derive(Debug, Clone)]
pub struct PgQuotaLedger {
    pool: PgPool,
}

impl PgQuotaLedger {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Create counters for listing owners that have none.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError::Database` if the insert fails.
    pub async fn seed_missing(&self) -> Result<u64, RepositoryError> {
        let seeded = QuotaRepository::new(&self.pool).seed_missing().await?;
        if seeded > 0 {
            tracing::info!(seeded, "Created missing quota counters");
        }
        Ok(seeded)
    }
}

#[async_trait]
impl QuotaLedger for PgQuotaLedger {
    async fn quota_holders(&self, only: Option<UserId>) -> Result<Vec<UserId>, RepositoryError> {
        QuotaRepository::new(&self.pool).holders(only).await
    }

    async fn recount(
        &self,
        user_id: UserId,
        mode: ReconcileMode,
    ) -> Result<RecountOutcome, RepositoryError> {
        QuotaRepository::new(&self.pool).recount(user_id, mode).await
    }
}

/// Runs reconciliation over a [`QuotaLedger`].
pub struct Reconciler<L> {
    ledger: L,
    mode: ReconcileMode,
}

impl<L: QuotaLedger> Reconciler<L> {
    #[must_use]
    pub const fn new(ledger: L, mode: ReconcileMode) -> Self {
        Self { ledger, mode }
    }

    /// The underlying ledger.
    pub const fn ledger(&self) -> &L {
        &self.ledger
    }

    /// Reconcile every quota holder, or only `only`.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError` only if the list of users cannot be read.
    /// Per-user failures are reported in `ReconcileReport::failed`.
    pub async fn run(&self, only: Option<UserId>) -> Result<ReconcileReport, RepositoryError> {
        let users = self.ledger.quota_holders(only).await?;
        let mut report = ReconcileReport::new(self.mode);

        tracing::info!(users = users.len(), mode = ?self.mode, "Reconciling quota counters");

        for user_id in users {
            match self.ledger.recount(user_id, self.mode).await {
                Ok(outcome) => {
                    if outcome.drifted() {
                        tracing::warn!(
                            user_id = %user_id,
                            recorded = outcome.recorded,
                            actual = outcome.actual,
                            repaired = outcome.repaired,
                            "Quota counter drift"
                        );
                    }
                    report.record(user_id, outcome);
                }
                Err(e) => {
                    tracing::error!(user_id = %user_id, error = %e, "Quota recount failed");
                    report.record_failure();
                }
            }
        }

        tracing::info!(
            scanned = report.scanned,
            fixed = report.fixed,
            already_correct = report.already_correct,
            failed = report.failed,
            "Reconciliation complete"
        );

        Ok(report)
    }
}
