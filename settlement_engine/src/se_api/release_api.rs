use std::fmt::Debug;

use chrono::Utc;
use log::*;

use crate::{
    db_types::{FundRelease, ReleaseTrigger, SubOrderId, WalletTransaction},
    events::{EventProducers, FundsReleasedEvent, ReleaseReversedEvent},
    se_api::{ReleaseQueryFilter, SweepSummary},
    traits::{EvaluationOutcome, ReleaseOutcome, SettlementDatabase, SettlementError},
};

/// `ReleaseApi` drives the fund release lifecycle.
///
/// ```text
///             retry
///           +--------------------+
///           v                    |
/// Pending -> Ready -> Processing -> Released -> Reversed
///    |         |          |
///    +---------+----------+--> Failed
/// ```
/// `Processing` is only ever held inside a payout transaction; by the time any call returns, a
/// release is in one of the other five states.
pub struct ReleaseApi<B> {
    db: B,
    producers: EventProducers,
}

impl<B> Debug for ReleaseApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ReleaseApi")
    }
}

impl<B> ReleaseApi<B> {
    pub fn new(db: B, producers: EventProducers) -> Self {
        Self { db, producers }
    }
}

impl<B> ReleaseApi<B>
where B: SettlementDatabase
{
    /// Re-checks a pending release's conditions and schedule. This is also what a status query
    /// goes through, so a release whose hold period lapsed since the last write flips to `Ready`
    /// the first time anyone looks at it.
    pub async fn evaluate(&self, sub_order_id: &SubOrderId) -> Result<EvaluationOutcome, SettlementError> {
        self.db.evaluate_release(sub_order_id).await
    }

    /// Pays out a `Ready` release. Exactly one wallet credit is ever written per release; a
    /// repeat call reports [`ReleaseOutcome::AlreadyReleased`] with the original entry.
    pub async fn release(&self, sub_order_id: &SubOrderId, actor: &str) -> Result<ReleaseOutcome, SettlementError> {
        let outcome = self.db.release_funds(sub_order_id, ReleaseTrigger::AdminApproved, actor).await?;
        self.call_funds_released_hook(&outcome).await;
        Ok(outcome)
    }

    /// Pays out regardless of unmet conditions or schedule. The caller is expected to have
    /// checked that the actor holds the super-admin role.
    pub async fn force_release(&self, sub_order_id: &SubOrderId, actor: &str) -> Result<ReleaseOutcome, SettlementError> {
        warn!("🔄️💰️ Forced release of {sub_order_id} requested by {actor}");
        let outcome = self.db.force_release(sub_order_id, actor).await?;
        self.call_funds_released_hook(&outcome).await;
        Ok(outcome)
    }

    /// Marks a release `Failed` with a reason. The escrowed amount comes off the store's pending
    /// balance until someone retries.
    pub async fn fail(&self, sub_order_id: &SubOrderId, reason: &str) -> Result<FundRelease, SettlementError> {
        if reason.trim().is_empty() {
            return Err(SettlementError::ValidationError("A reason is required to fail a release".to_string()));
        }
        self.db.fail_release(sub_order_id, reason).await
    }

    /// Puts a `Failed` release back in line for payout.
    pub async fn retry(&self, sub_order_id: &SubOrderId) -> Result<FundRelease, SettlementError> {
        self.db.retry_release(sub_order_id).await
    }

    /// Claws back an erroneous payout with a compensating debit.
    pub async fn reverse(
        &self,
        sub_order_id: &SubOrderId,
        reason: &str,
        actor: &str,
    ) -> Result<(FundRelease, WalletTransaction), SettlementError> {
        if reason.trim().is_empty() {
            return Err(SettlementError::ValidationError("A reason is required to reverse a release".to_string()));
        }
        let (release, transaction) = self.db.reverse_release(sub_order_id, reason, actor).await?;
        for emitter in &self.producers.release_reversed_producer {
            let event = ReleaseReversedEvent::new(release.clone(), transaction.clone());
            emitter.publish_event(event).await;
        }
        Ok((release, transaction))
    }

    async fn call_funds_released_hook(&self, outcome: &ReleaseOutcome) {
        if !outcome.is_new() {
            return;
        }
        if let ReleaseOutcome::Released { release, transaction } = outcome {
            for emitter in &self.producers.funds_released_producer {
                debug!("🔄️💰️ Notifying funds released hook subscribers");
                let event = FundsReleasedEvent::new(release.clone(), transaction.clone());
                emitter.publish_event(event).await;
            }
        }
    }
}

impl<B> ReleaseApi<B>
where B: SettlementDatabase
{
    /// One pass of the scheduled sweep: re-evaluate due pending releases, then pay out whatever
    /// is ready. Individual failures are logged and counted; the sweep carries on.
    pub async fn run_scheduled_sweep(&self, limit: i64) -> Result<SweepSummary, SettlementError> {
        let now = Utc::now();
        let mut summary = self.run_evaluation_sweep(limit).await?;
        let ready = self
            .db
            .ready_releases(now, limit)
            .await
            .map_err(|e| SettlementError::DatabaseError(e.to_string()))?;
        for release in ready {
            match self.db.release_funds(&release.sub_order_id, ReleaseTrigger::ScheduledSweep, "sweeper").await {
                Ok(outcome) => {
                    if outcome.is_new() {
                        summary.released += 1;
                        self.call_funds_released_hook(&outcome).await;
                    }
                },
                Err(SettlementError::ConcurrencyConflict(msg)) => {
                    debug!("🕰️ Skipping contended release for {}: {msg}", release.sub_order_id);
                },
                Err(e) => {
                    summary.failures += 1;
                    error!("🕰️ Payout failed for {}: {e}", release.sub_order_id);
                    if let Err(fail_err) =
                        self.db.fail_release(&release.sub_order_id, &format!("sweep payout failed: {e}")).await
                    {
                        error!("🕰️ Could not mark release for {} failed: {fail_err}", release.sub_order_id);
                    }
                },
            }
        }
        Ok(summary)
    }

    /// The evaluation half of the sweep on its own: re-checks due pending releases and flips the
    /// satisfied ones to `Ready`, but pays nothing out. This is what runs when auto-release is
    /// switched off and every payout needs an operator's approval.
    pub async fn run_evaluation_sweep(&self, limit: i64) -> Result<SweepSummary, SettlementError> {
        let now = Utc::now();
        let mut summary = SweepSummary::default();
        let due = self
            .db
            .due_pending_releases(now, limit)
            .await
            .map_err(|e| SettlementError::DatabaseError(e.to_string()))?;
        for release in due {
            summary.evaluated += 1;
            match self.db.evaluate_release(&release.sub_order_id).await {
                Ok(outcome) if outcome.became_ready => summary.became_ready += 1,
                Ok(outcome) => {
                    trace!(
                        "🕰️ Release for {} is due but still waiting on {:?}",
                        release.sub_order_id,
                        outcome.release.unmet_conditions()
                    );
                },
                Err(e) => {
                    summary.failures += 1;
                    error!("🕰️ Could not evaluate release for {}: {e}", release.sub_order_id);
                },
            }
        }
        Ok(summary)
    }

    /// Releases that are ready and due right now, for operator dashboards. A pure read.
    pub async fn ready_for_payout(&self, limit: i64) -> Result<Vec<FundRelease>, SettlementError> {
        self.db
            .ready_releases(Utc::now(), limit)
            .await
            .map_err(|e| SettlementError::DatabaseError(e.to_string()))
    }

    /// Searches releases. Exposed here as well as on [`crate::LedgerApi`] because the sweeper's
    /// operator tooling usually holds a `ReleaseApi` only.
    pub async fn search(&self, query: ReleaseQueryFilter) -> Result<Vec<FundRelease>, SettlementError> {
        trace!("🔄️💰️ Searching releases: {query}");
        self.db.search_releases(query).await.map_err(|e| SettlementError::DatabaseError(e.to_string()))
    }

    /// Fetches a release without evaluating it. Use [`Self::evaluate`] when the caller wants the
    /// lazy `Pending -> Ready` flip to happen.
    pub async fn fetch(&self, sub_order_id: &SubOrderId) -> Result<Option<FundRelease>, SettlementError> {
        self.db.fetch_release(sub_order_id).await.map_err(|e| SettlementError::DatabaseError(e.to_string()))
    }
}
