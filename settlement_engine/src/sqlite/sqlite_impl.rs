//! `SqliteDatabase` is the concrete SQLite backend for the settlement engine.
//!
//! It implements every trait in the [`crate::traits`] module. The multi-step flows (payment
//! clearing, payouts, refunds, withdrawal transitions) each run inside a single transaction, so
//! a crash or a lost race leaves the ledger exactly as it was before the call.

use std::fmt::Debug;

use chrono::{DateTime, Duration, Utc};
use log::*;
use msl_common::Money;
use sqlx::SqlitePool;

use super::db::{auth, db_url, new_pool, orders, releases, returns, stores, wallets, withdrawals};
use crate::{
    db_types::{
        AdminUser,
        ConfirmationKind,
        DeliveryStatus,
        Dispute,
        DisputeKind,
        EntryType,
        FundRelease,
        NewFundRelease,
        NewOrder,
        NewWithdrawal,
        Order,
        OrderId,
        PaymentStatus,
        RelatedDocument,
        ReleaseStatus,
        ReleaseTrigger,
        ReturnRequest,
        ReturnStatus,
        Role,
        Roles,
        Store,
        StoreTier,
        SubOrder,
        SubOrderId,
        SubOrderStatusEntry,
        TransactionSource,
        Wallet,
        WalletTransaction,
        WithdrawalRequest,
        WithdrawalStatus,
        WithdrawalStatusEntry,
    },
    helpers::{add_business_days, public_holidays},
    policies::{compute_settlement, ReleasePolicy},
    se_api::{FullOrder, FullSubOrder, OrderQueryFilter, ReleaseQueryFilter, WithdrawalQueryFilter},
    traits::{
        AuthApiError,
        AuthManagement,
        EvaluationOutcome,
        LedgerManagement,
        LedgerQueryError,
        ReleaseOutcome,
        ReturnUpdate,
        SettlementDatabase,
        SettlementError,
        WalletLedger,
        WalletLedgerError,
        WithdrawalError,
        WithdrawalManagement,
    },
};

#[derive(Clone)]
pub struct SqliteDatabase {
    url: String,
    pool: SqlitePool,
}

impl Debug for SqliteDatabase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "SqliteDatabase ({:?})", self.pool)
    }
}

impl SettlementDatabase for SqliteDatabase {
    fn url(&self) -> &str {
        self.url.as_str()
    }

    async fn register_store(&self, store_id: &str, name: &str) -> Result<Store, SettlementError> {
        let mut tx = self.pool.begin().await?;
        let store = stores::register_store(store_id, name, &mut tx).await?;
        tx.commit().await?;
        Ok(store)
    }

    async fn process_store_verified(&self, store_id: &str) -> Result<Store, SettlementError> {
        let mut tx = self.pool.begin().await?;
        let store = stores::mark_verified(store_id, &mut tx).await?;
        tx.commit().await?;
        Ok(store)
    }

    async fn insert_order(&self, order: NewOrder) -> Result<(Order, bool), SettlementError> {
        let mut tx = self.pool.begin().await?;
        let (order, inserted) = orders::idempotent_insert(order, &mut tx).await?;
        tx.commit().await?;
        if inserted {
            debug!("🗃️ Order {} has been saved in the DB with id {}", order.order_id, order.id);
        }
        Ok((order, inserted))
    }

    /// Takes a cleared payment and, in a single atomic transaction,
    /// * marks the order `Paid`,
    /// * computes the frozen settlement for every sub-order from the store's current tier policy,
    /// * schedules each release at placement time plus the policy's business days,
    /// * escrows each payout on the store wallet's pending balance.
    ///
    /// A repeat call for an already paid order returns the existing releases without touching
    /// anything.
    async fn process_payment_cleared(&self, order_id: &OrderId) -> Result<(Order, Vec<FundRelease>), SettlementError> {
        let holidays = public_holidays();
        let mut tx = self.pool.begin().await?;
        let order = match orders::set_payment_status(order_id, PaymentStatus::Pending, PaymentStatus::Paid, &mut tx)
            .await?
        {
            Some(order) => order,
            None => {
                let order = orders::fetch_order_by_order_id(order_id, &mut tx)
                    .await?
                    .ok_or_else(|| SettlementError::OrderNotFound(order_id.clone()))?;
                return match order.payment_status {
                    PaymentStatus::Paid => {
                        let existing = releases::fetch_releases_for_order(order_id, &mut tx).await?;
                        debug!("🔄️💰️ Order {order_id} is already paid. Returning its {} releases", existing.len());
                        Ok((order, existing))
                    },
                    status => Err(SettlementError::invalid_transition(
                        format!("Order {order_id}"),
                        status,
                        PaymentStatus::Paid,
                    )),
                };
            },
        };
        let subs = orders::sub_orders_for_order(order_id, &mut tx).await?;
        let mut created = Vec::with_capacity(subs.len());
        for sub in subs {
            let store = stores::fetch_store(&sub.store_id, &mut tx).await?.ok_or_else(|| {
                SettlementError::ValidationError(format!("Store {} is not registered", sub.store_id))
            })?;
            let policy = stores::fetch_policy(store.tier, &mut tx).await?;
            let settlement = compute_settlement(sub.total_amount, sub.shipping_price, &policy, store.verification_status);
            let scheduled = add_business_days(order.placed_at, policy.business_days_required, &holidays);
            let release = releases::insert_release(
                NewFundRelease {
                    sub_order_id: sub.sub_order_id.clone(),
                    order_id: order_id.clone(),
                    store_id: sub.store_id.clone(),
                    settlement,
                    rules: policy.rules_for(store.verification_status),
                    verification_complete: store.verification_status.is_verified(),
                    scheduled_release_time: scheduled,
                },
                &mut tx,
            )
            .await?;
            wallets::adjust_pending(&sub.store_id, settlement.payout(), &mut tx).await?;
            created.push(release);
        }
        tx.commit().await?;
        info!("🔄️💰️ Payment cleared for {order_id}. {} fund releases scheduled", created.len());
        Ok((order, created))
    }

    async fn process_payment_failed(&self, order_id: &OrderId) -> Result<Order, SettlementError> {
        let mut tx = self.pool.begin().await?;
        match orders::set_payment_status(order_id, PaymentStatus::Pending, PaymentStatus::Failed, &mut tx).await? {
            Some(order) => {
                tx.commit().await?;
                info!("🔄️❌️ Payment failed for {order_id}");
                Ok(order)
            },
            None => {
                let order = orders::fetch_order_by_order_id(order_id, &mut tx)
                    .await?
                    .ok_or_else(|| SettlementError::OrderNotFound(order_id.clone()))?;
                match order.payment_status {
                    PaymentStatus::Failed => Ok(order),
                    status => Err(SettlementError::invalid_transition(
                        format!("Order {order_id}"),
                        status,
                        PaymentStatus::Failed,
                    )),
                }
            },
        }
    }

    /// A storefront-level refund of the whole order. Releases that have not paid out yet are
    /// failed and their escrow removed; released sub-orders are left for per-sub-order reversal,
    /// since the money is already in a wallet.
    async fn process_payment_refunded(&self, order_id: &OrderId) -> Result<Order, SettlementError> {
        let mut tx = self.pool.begin().await?;
        let order = match orders::set_payment_status(order_id, PaymentStatus::Paid, PaymentStatus::Refunded, &mut tx)
            .await?
        {
            Some(order) => order,
            None => {
                let order = orders::fetch_order_by_order_id(order_id, &mut tx)
                    .await?
                    .ok_or_else(|| SettlementError::OrderNotFound(order_id.clone()))?;
                return match order.payment_status {
                    PaymentStatus::Refunded => Ok(order),
                    status => Err(SettlementError::invalid_transition(
                        format!("Order {order_id}"),
                        status,
                        PaymentStatus::Refunded,
                    )),
                };
            },
        };
        let order_releases = releases::fetch_releases_for_order(order_id, &mut tx).await?;
        for release in order_releases {
            if matches!(release.status, ReleaseStatus::Pending | ReleaseStatus::Ready) &&
                releases::mark_failed(&release.sub_order_id, "order payment refunded", &mut tx).await?.is_some()
            {
                wallets::adjust_pending(&release.store_id, -release.settlement.payout(), &mut tx).await?;
            }
        }
        tx.commit().await?;
        warn!("🔄️❌️ Order {order_id} refunded. Unreleased settlements have been cancelled");
        Ok(order)
    }

    async fn update_delivery_status(
        &self,
        sub_order_id: &SubOrderId,
        status: DeliveryStatus,
        note: Option<String>,
    ) -> Result<SubOrder, SettlementError> {
        let mut tx = self.pool.begin().await?;
        let sub = orders::update_delivery_status(sub_order_id, status, note, &mut tx).await?;
        tx.commit().await?;
        Ok(sub)
    }

    async fn confirm_delivery(
        &self,
        sub_order_id: &SubOrderId,
        kind: ConfirmationKind,
    ) -> Result<(SubOrder, bool), SettlementError> {
        let mut tx = self.pool.begin().await?;
        let (sub, confirmed) = orders::confirm_delivery(sub_order_id, kind, &mut tx).await?;
        if confirmed {
            releases::set_delivery_confirmed(sub_order_id, &mut tx).await?;
        }
        tx.commit().await?;
        if confirmed {
            debug!("🔄️✅️ Delivery of {sub_order_id} confirmed ({kind})");
        }
        Ok((sub, confirmed))
    }

    async fn auto_confirm_deliveries(&self, grace_days: i64, limit: i64) -> Result<Vec<SubOrder>, SettlementError> {
        let cutoff = Utc::now() - Duration::days(grace_days);
        let mut tx = self.pool.begin().await?;
        let candidates = orders::unconfirmed_delivered_before(cutoff, limit, &mut tx).await?;
        let mut confirmed = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            let (sub, done) = orders::confirm_delivery(&candidate.sub_order_id, ConfirmationKind::Auto, &mut tx).await?;
            if done {
                releases::set_delivery_confirmed(&sub.sub_order_id, &mut tx).await?;
                confirmed.push(sub);
            }
        }
        tx.commit().await?;
        if !confirmed.is_empty() {
            info!("🕰️ Auto-confirmed delivery on {} sub-orders", confirmed.len());
        }
        Ok(confirmed)
    }

    async fn evaluate_release(&self, sub_order_id: &SubOrderId) -> Result<EvaluationOutcome, SettlementError> {
        let now = Utc::now();
        let mut tx = self.pool.begin().await?;
        let release = releases::fetch_release(sub_order_id, &mut tx)
            .await?
            .ok_or_else(|| SettlementError::ReleaseNotFound(sub_order_id.clone()))?;
        if release.status != ReleaseStatus::Pending {
            return Ok(EvaluationOutcome { release, became_ready: false });
        }
        let mut newly_met = Vec::new();
        let conditions = &release.conditions;
        if release.rules.require_buyer_protection && !conditions.buyer_protection_expired {
            let sub = orders::fetch_sub_order(sub_order_id, &mut tx)
                .await?
                .ok_or_else(|| SettlementError::SubOrderNotFound(sub_order_id.clone()))?;
            if let Some(delivered_at) = sub.delivered_at {
                if delivered_at + Duration::days(release.rules.buyer_protection_days) <= now {
                    newly_met.push("buyer_protection_expired");
                }
            }
        }
        if release.rules.require_dispute_checks {
            if !conditions.no_active_returns && returns::active_return_count(sub_order_id, &mut tx).await? == 0 {
                newly_met.push("no_active_returns");
            }
            if !conditions.no_active_disputes &&
                returns::open_dispute_count(sub_order_id, DisputeKind::Dispute, &mut tx).await? == 0
            {
                newly_met.push("no_active_disputes");
            }
            if !conditions.no_chargebacks &&
                returns::open_dispute_count(sub_order_id, DisputeKind::Chargeback, &mut tx).await? == 0
            {
                newly_met.push("no_chargebacks");
            }
        }
        let release = if newly_met.is_empty() {
            release
        } else {
            releases::set_condition_flags(sub_order_id, &newly_met, &mut tx).await?;
            releases::fetch_release(sub_order_id, &mut tx)
                .await?
                .ok_or_else(|| SettlementError::ReleaseNotFound(sub_order_id.clone()))?
        };
        if release.conditions_met() && release.is_due(now) {
            if let Some(ready) = releases::mark_ready(sub_order_id, &mut tx).await? {
                tx.commit().await?;
                info!("🔄️✅️ Release for {sub_order_id} is ready for payout");
                return Ok(EvaluationOutcome { release: ready, became_ready: true });
            }
        }
        tx.commit().await?;
        Ok(EvaluationOutcome { release, became_ready: false })
    }

    async fn release_funds(
        &self,
        sub_order_id: &SubOrderId,
        trigger: ReleaseTrigger,
        actor: &str,
    ) -> Result<ReleaseOutcome, SettlementError> {
        self.do_release(sub_order_id, &[ReleaseStatus::Ready], trigger, actor).await
    }

    async fn force_release(&self, sub_order_id: &SubOrderId, actor: &str) -> Result<ReleaseOutcome, SettlementError> {
        self.do_release(sub_order_id, &[ReleaseStatus::Pending, ReleaseStatus::Ready], ReleaseTrigger::AdminForced, actor)
            .await
    }

    async fn fail_release(&self, sub_order_id: &SubOrderId, reason: &str) -> Result<FundRelease, SettlementError> {
        let mut tx = self.pool.begin().await?;
        match releases::mark_failed(sub_order_id, reason, &mut tx).await? {
            Some(release) => {
                wallets::adjust_pending(&release.store_id, -release.settlement.payout(), &mut tx).await?;
                tx.commit().await?;
                warn!("🚨️ Release for {sub_order_id} marked failed: {reason}");
                Ok(release)
            },
            None => {
                let release = releases::fetch_release(sub_order_id, &mut tx)
                    .await?
                    .ok_or_else(|| SettlementError::ReleaseNotFound(sub_order_id.clone()))?;
                Err(SettlementError::invalid_transition(
                    format!("Release for {sub_order_id}"),
                    release.status,
                    ReleaseStatus::Failed,
                ))
            },
        }
    }

    async fn retry_release(&self, sub_order_id: &SubOrderId) -> Result<FundRelease, SettlementError> {
        let mut tx = self.pool.begin().await?;
        let release = releases::fetch_release(sub_order_id, &mut tx)
            .await?
            .ok_or_else(|| SettlementError::ReleaseNotFound(sub_order_id.clone()))?;
        let order = orders::fetch_order_by_order_id(&release.order_id, &mut tx)
            .await?
            .ok_or_else(|| SettlementError::OrderNotFound(release.order_id.clone()))?;
        if order.payment_status != PaymentStatus::Paid {
            return Err(SettlementError::ValidationError(format!(
                "Order {} is no longer paid, so its releases cannot be retried",
                order.order_id
            )));
        }
        let refunded = returns::returns_for_sub_order(sub_order_id, &mut tx)
            .await?
            .iter()
            .any(|r| r.status == ReturnStatus::Refunded);
        if refunded {
            return Err(SettlementError::ValidationError(format!(
                "Sub-order {sub_order_id} has a refunded return, so its release cannot be retried"
            )));
        }
        match releases::mark_retried(sub_order_id, &mut tx).await? {
            Some(release) => {
                wallets::adjust_pending(&release.store_id, release.settlement.payout(), &mut tx).await?;
                tx.commit().await?;
                info!("🔄️ Release for {sub_order_id} is back to ready after failure");
                Ok(release)
            },
            None => Err(SettlementError::invalid_transition(
                format!("Release for {sub_order_id}"),
                release.status,
                ReleaseStatus::Ready,
            )),
        }
    }

    async fn reverse_release(
        &self,
        sub_order_id: &SubOrderId,
        reason: &str,
        actor: &str,
    ) -> Result<(FundRelease, WalletTransaction), SettlementError> {
        let mut tx = self.pool.begin().await?;
        let release = match releases::mark_reversed(sub_order_id, reason, &mut tx).await? {
            Some(release) => release,
            None => {
                let release = releases::fetch_release(sub_order_id, &mut tx)
                    .await?
                    .ok_or_else(|| SettlementError::ReleaseNotFound(sub_order_id.clone()))?;
                return Err(SettlementError::invalid_transition(
                    format!("Release for {sub_order_id}"),
                    release.status,
                    ReleaseStatus::Reversed,
                ));
            },
        };
        let payout = release.settlement.payout();
        let wallet = wallets::reverse_payout(&release.store_id, payout, &mut tx).await?;
        let entry = wallets::insert_transaction(
            wallet.id,
            EntryType::Debit,
            payout,
            wallet.balance,
            TransactionSource::Adjustment,
            Some(RelatedDocument::fund_release(sub_order_id)),
            Some(format!("reversal by {actor}: {reason}")),
            &mut tx,
        )
        .await?;
        tx.commit().await?;
        warn!("🔄️↩️ Release for {sub_order_id} reversed by {actor}: {reason}. {payout} debited from {}", release.store_id);
        Ok((release, entry))
    }

    async fn request_return(&self, sub_order_id: &SubOrderId, reason: &str) -> Result<ReturnRequest, SettlementError> {
        let mut tx = self.pool.begin().await?;
        orders::fetch_sub_order(sub_order_id, &mut tx)
            .await?
            .ok_or_else(|| SettlementError::SubOrderNotFound(sub_order_id.clone()))?;
        let request = returns::insert_return(sub_order_id, reason, &mut tx).await?;
        tx.commit().await?;
        Ok(request)
    }

    async fn update_return_status(&self, return_id: i64, status: ReturnStatus) -> Result<ReturnUpdate, SettlementError> {
        let mut tx = self.pool.begin().await?;
        let current = returns::fetch_return(return_id, &mut tx)
            .await?
            .ok_or(SettlementError::ReturnNotFound(return_id))?;
        let release = if status == ReturnStatus::Refunded {
            releases::fetch_release(&current.sub_order_id, &mut tx).await?
        } else {
            None
        };
        if release.as_ref().map_or(false, |r| r.status == ReleaseStatus::Processing) {
            return Err(SettlementError::ConcurrencyConflict(format!(
                "The release for {} is mid-payout. Retry the refund shortly",
                current.sub_order_id
            )));
        }
        let refund_amount = release.as_ref().map(|r| r.settlement.payout());
        let request = returns::set_return_status(return_id, status, refund_amount, &mut tx).await?.ok_or_else(|| {
            SettlementError::invalid_transition(format!("Return {return_id}"), current.status, status)
        })?;
        let mut refund = None;
        if let Some(release) = release {
            let payout = release.settlement.payout();
            match release.status {
                ReleaseStatus::Released => {
                    let (_, entry) = wallets::debit(
                        &release.store_id,
                        payout,
                        TransactionSource::Refund,
                        Some(RelatedDocument::return_request(return_id)),
                        Some(format!("refund for return #{return_id} on {}", release.sub_order_id)),
                        &mut tx,
                    )
                    .await?;
                    refund = Some(entry);
                },
                ReleaseStatus::Pending | ReleaseStatus::Ready => {
                    releases::mark_failed(&release.sub_order_id, &format!("return #{return_id} refunded"), &mut tx)
                        .await?;
                    wallets::adjust_pending(&release.store_id, -payout, &mut tx).await?;
                },
                ReleaseStatus::Failed | ReleaseStatus::Reversed | ReleaseStatus::Processing => {},
            }
        }
        tx.commit().await?;
        if status == ReturnStatus::Refunded {
            info!("🛒️ Return #{return_id} refunded on {}", request.sub_order_id);
        }
        Ok(ReturnUpdate { request, refund })
    }

    async fn open_dispute(
        &self,
        sub_order_id: &SubOrderId,
        kind: DisputeKind,
        reason: &str,
    ) -> Result<Dispute, SettlementError> {
        let mut tx = self.pool.begin().await?;
        orders::fetch_sub_order(sub_order_id, &mut tx)
            .await?
            .ok_or_else(|| SettlementError::SubOrderNotFound(sub_order_id.clone()))?;
        let dispute = returns::insert_dispute(sub_order_id, kind, reason, &mut tx).await?;
        tx.commit().await?;
        Ok(dispute)
    }

    async fn resolve_dispute(&self, dispute_id: i64) -> Result<Dispute, SettlementError> {
        let mut tx = self.pool.begin().await?;
        match returns::resolve_dispute(dispute_id, &mut tx).await? {
            Some(dispute) => {
                tx.commit().await?;
                Ok(dispute)
            },
            None => {
                let dispute = returns::fetch_dispute(dispute_id, &mut tx)
                    .await?
                    .ok_or(SettlementError::DisputeNotFound(dispute_id))?;
                debug!("⚖️ Dispute #{dispute_id} was already resolved");
                Ok(dispute)
            },
        }
    }

    async fn close(&mut self) -> Result<(), SettlementError> {
        self.pool.close().await;
        Ok(())
    }
}

impl WalletLedger for SqliteDatabase {
    async fn fetch_wallet(&self, store_id: &str) -> Result<Option<Wallet>, WalletLedgerError> {
        let mut conn = self.pool.acquire().await?;
        wallets::fetch_wallet(store_id, &mut conn).await
    }

    async fn fetch_or_create_wallet(&self, store_id: &str) -> Result<Wallet, WalletLedgerError> {
        let mut tx = self.pool.begin().await?;
        sqlx::query("INSERT OR IGNORE INTO stores (store_id, name) VALUES ($1, $2)")
            .bind(store_id)
            .bind(store_id)
            .execute(&mut *tx)
            .await?;
        let wallet = wallets::insert_wallet_for_store(store_id, &mut tx).await?;
        tx.commit().await?;
        Ok(wallet)
    }

    async fn credit_wallet(
        &self,
        store_id: &str,
        amount: Money,
        source: TransactionSource,
        related: Option<RelatedDocument>,
        note: Option<String>,
    ) -> Result<(Wallet, WalletTransaction), WalletLedgerError> {
        let mut tx = self.pool.begin().await?;
        let result = wallets::credit(store_id, amount, source, related, note, &mut tx).await?;
        tx.commit().await?;
        Ok(result)
    }

    async fn debit_wallet(
        &self,
        store_id: &str,
        amount: Money,
        source: TransactionSource,
        related: Option<RelatedDocument>,
        note: Option<String>,
    ) -> Result<(Wallet, WalletTransaction), WalletLedgerError> {
        let mut tx = self.pool.begin().await?;
        let result = wallets::debit(store_id, amount, source, related, note, &mut tx).await?;
        tx.commit().await?;
        Ok(result)
    }

    async fn wallet_history(&self, store_id: &str) -> Result<Vec<WalletTransaction>, WalletLedgerError> {
        let mut conn = self.pool.acquire().await?;
        wallets::history(store_id, &mut conn).await
    }

    async fn replay_balance(&self, store_id: &str) -> Result<Money, WalletLedgerError> {
        let mut conn = self.pool.acquire().await?;
        wallets::replay_balance(store_id, &mut conn).await
    }
}

impl WithdrawalManagement for SqliteDatabase {
    async fn create_withdrawal(
        &self,
        request: NewWithdrawal,
        request_ref: &str,
        actor: &str,
    ) -> Result<(WithdrawalRequest, WalletTransaction), WithdrawalError> {
        let mut tx = self.pool.begin().await?;
        let (_, entry) = wallets::debit(
            &request.store_id,
            request.requested_amount,
            TransactionSource::Withdrawal,
            Some(RelatedDocument::withdrawal(request_ref)),
            Some(format!("withdrawal request {request_ref}")),
            &mut tx,
        )
        .await?;
        let request = withdrawals::insert_request(&request, request_ref, &mut tx).await?;
        withdrawals::append_status(request.id, WithdrawalStatus::Pending, actor, Some("request created".to_string()), &mut tx)
            .await?;
        tx.commit().await?;
        info!(
            "🔄️🏦️ Withdrawal {request_ref} created. {} held from {}'s wallet",
            request.requested_amount, request.store_id
        );
        Ok((request, entry))
    }

    async fn start_review(&self, request_ref: &str, actor: &str) -> Result<WithdrawalRequest, WithdrawalError> {
        self.withdrawal_transition(request_ref, &[WithdrawalStatus::Pending], WithdrawalStatus::UnderReview, actor, None)
            .await
    }

    async fn approve_withdrawal(
        &self,
        request_ref: &str,
        transaction_reference: &str,
        actor: &str,
    ) -> Result<WithdrawalRequest, WithdrawalError> {
        let reference = transaction_reference.trim();
        if reference.is_empty() {
            return Err(WithdrawalError::ValidationError(
                "A bank transaction reference is required to approve a withdrawal".to_string(),
            ));
        }
        let mut tx = self.pool.begin().await?;
        let request = match withdrawals::approve(request_ref, reference, &mut tx).await? {
            Some(request) => request,
            None => {
                let request = withdrawals::fetch_by_ref(request_ref, &mut tx)
                    .await?
                    .ok_or_else(|| WithdrawalError::RequestNotFound(request_ref.to_string()))?;
                return Err(WithdrawalError::InvalidStateTransition {
                    request_ref: request_ref.to_string(),
                    from: request.status,
                    to: WithdrawalStatus::Approved,
                });
            },
        };
        withdrawals::append_status(
            request.id,
            WithdrawalStatus::Approved,
            actor,
            Some(format!("bank reference {reference}")),
            &mut tx,
        )
        .await?;
        tx.commit().await?;
        info!("🔄️🏦️ Withdrawal {request_ref} approved by {actor}");
        Ok(request)
    }

    async fn begin_processing(&self, request_ref: &str, actor: &str) -> Result<WithdrawalRequest, WithdrawalError> {
        self.withdrawal_transition(request_ref, &[WithdrawalStatus::Approved], WithdrawalStatus::Processing, actor, None)
            .await
    }

    async fn complete_withdrawal(&self, request_ref: &str, actor: &str) -> Result<WithdrawalRequest, WithdrawalError> {
        self.withdrawal_transition(
            request_ref,
            &[WithdrawalStatus::Approved, WithdrawalStatus::Processing],
            WithdrawalStatus::Completed,
            actor,
            None,
        )
        .await
    }

    async fn fail_withdrawal(
        &self,
        request_ref: &str,
        reason: &str,
        actor: &str,
    ) -> Result<WithdrawalRequest, WithdrawalError> {
        self.withdrawal_transition(
            request_ref,
            &[WithdrawalStatus::Approved, WithdrawalStatus::Processing],
            WithdrawalStatus::Failed,
            actor,
            Some(reason.to_string()),
        )
        .await
    }

    async fn retry_withdrawal(&self, request_ref: &str, actor: &str) -> Result<WithdrawalRequest, WithdrawalError> {
        self.withdrawal_transition(
            request_ref,
            &[WithdrawalStatus::Failed],
            WithdrawalStatus::Processing,
            actor,
            Some("retrying payout".to_string()),
        )
        .await
    }

    async fn reject_withdrawal(
        &self,
        request_ref: &str,
        reason: &str,
        actor: &str,
    ) -> Result<(WithdrawalRequest, WalletTransaction), WithdrawalError> {
        if reason.trim().is_empty() {
            return Err(WithdrawalError::ValidationError(
                "A reason is required to reject a withdrawal".to_string(),
            ));
        }
        let mut tx = self.pool.begin().await?;
        let request = match withdrawals::reject(request_ref, reason, &mut tx).await? {
            Some(request) => request,
            None => {
                let request = withdrawals::fetch_by_ref(request_ref, &mut tx)
                    .await?
                    .ok_or_else(|| WithdrawalError::RequestNotFound(request_ref.to_string()))?;
                return Err(WithdrawalError::InvalidStateTransition {
                    request_ref: request_ref.to_string(),
                    from: request.status,
                    to: WithdrawalStatus::Rejected,
                });
            },
        };
        let (_, entry) = wallets::credit(
            &request.store_id,
            request.requested_amount,
            TransactionSource::Withdrawal,
            Some(RelatedDocument::withdrawal(request_ref)),
            Some(format!("withdrawal {request_ref} rejected: {reason}")),
            &mut tx,
        )
        .await?;
        withdrawals::append_status(request.id, WithdrawalStatus::Rejected, actor, Some(reason.to_string()), &mut tx)
            .await?;
        tx.commit().await?;
        info!(
            "🔄️🏦️ Withdrawal {request_ref} rejected by {actor}: {reason}. {} returned to {}'s wallet",
            request.requested_amount, request.store_id
        );
        Ok((request, entry))
    }
}

impl LedgerManagement for SqliteDatabase {
    async fn fetch_order(&self, order_id: &OrderId) -> Result<Option<Order>, LedgerQueryError> {
        let mut conn = self.pool.acquire().await?;
        let order = orders::fetch_order_by_order_id(order_id, &mut conn).await?;
        Ok(order)
    }

    async fn fetch_order_by_idempotency_key(&self, key: &str) -> Result<Option<Order>, LedgerQueryError> {
        let mut conn = self.pool.acquire().await?;
        let order = orders::fetch_order_by_idempotency_key(key, &mut conn).await?;
        Ok(order)
    }

    async fn fetch_full_order(&self, order_id: &OrderId) -> Result<Option<FullOrder>, LedgerQueryError> {
        let mut conn = self.pool.acquire().await?;
        let order = match orders::fetch_order_by_order_id(order_id, &mut conn).await? {
            Some(order) => order,
            None => return Ok(None),
        };
        let subs = orders::sub_orders_for_order(order_id, &mut conn).await?;
        let mut sub_orders = Vec::with_capacity(subs.len());
        for sub in subs {
            let items = orders::line_items_for_sub_order(&sub.sub_order_id, &mut conn).await?;
            let history = orders::status_history(&sub.sub_order_id, &mut conn).await?;
            let release = releases::fetch_release(&sub.sub_order_id, &mut conn).await?;
            let returns = returns::returns_for_sub_order(&sub.sub_order_id, &mut conn).await?;
            let disputes = returns::disputes_for_sub_order(&sub.sub_order_id, &mut conn).await?;
            sub_orders.push(FullSubOrder { sub_order: sub, items, history, release, returns, disputes });
        }
        Ok(Some(FullOrder { order, sub_orders }))
    }

    async fn search_orders(&self, query: OrderQueryFilter) -> Result<Vec<Order>, LedgerQueryError> {
        let mut conn = self.pool.acquire().await?;
        let orders = orders::search_orders(query, &mut conn).await?;
        Ok(orders)
    }

    async fn fetch_sub_order(&self, sub_order_id: &SubOrderId) -> Result<Option<SubOrder>, LedgerQueryError> {
        let mut conn = self.pool.acquire().await?;
        let sub = orders::fetch_sub_order(sub_order_id, &mut conn).await?;
        Ok(sub)
    }

    async fn sub_order_history(
        &self,
        sub_order_id: &SubOrderId,
    ) -> Result<Vec<SubOrderStatusEntry>, LedgerQueryError> {
        let mut conn = self.pool.acquire().await?;
        let history = orders::status_history(sub_order_id, &mut conn).await?;
        Ok(history)
    }

    async fn fetch_release(&self, sub_order_id: &SubOrderId) -> Result<Option<FundRelease>, LedgerQueryError> {
        let mut conn = self.pool.acquire().await?;
        let release = releases::fetch_release(sub_order_id, &mut conn).await?;
        Ok(release)
    }

    async fn search_releases(&self, query: ReleaseQueryFilter) -> Result<Vec<FundRelease>, LedgerQueryError> {
        let mut conn = self.pool.acquire().await?;
        let found = releases::search_releases(query, &mut conn).await?;
        Ok(found)
    }

    async fn ready_releases(&self, now: DateTime<Utc>, limit: i64) -> Result<Vec<FundRelease>, LedgerQueryError> {
        let mut conn = self.pool.acquire().await?;
        let ready = releases::ready_releases(now, limit, &mut conn).await?;
        Ok(ready)
    }

    async fn due_pending_releases(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<FundRelease>, LedgerQueryError> {
        let mut conn = self.pool.acquire().await?;
        let due = releases::due_pending_releases(now, limit, &mut conn).await?;
        Ok(due)
    }

    async fn fetch_withdrawal(&self, request_ref: &str) -> Result<Option<WithdrawalRequest>, LedgerQueryError> {
        let mut conn = self.pool.acquire().await?;
        let request = withdrawals::fetch_by_ref(request_ref, &mut conn).await?;
        Ok(request)
    }

    async fn withdrawal_history(&self, withdrawal_id: i64) -> Result<Vec<WithdrawalStatusEntry>, LedgerQueryError> {
        let mut conn = self.pool.acquire().await?;
        let history = withdrawals::history(withdrawal_id, &mut conn).await?;
        Ok(history)
    }

    async fn search_withdrawals(&self, query: WithdrawalQueryFilter) -> Result<Vec<WithdrawalRequest>, LedgerQueryError> {
        let mut conn = self.pool.acquire().await?;
        let found = withdrawals::search(query, &mut conn).await?;
        Ok(found)
    }

    async fn fetch_store(&self, store_id: &str) -> Result<Option<Store>, LedgerQueryError> {
        let mut conn = self.pool.acquire().await?;
        let store = stores::fetch_store(store_id, &mut conn).await?;
        Ok(store)
    }

    async fn fetch_policy(&self, tier: StoreTier) -> Result<ReleasePolicy, LedgerQueryError> {
        let mut conn = self.pool.acquire().await?;
        let policy = stores::fetch_policy(tier, &mut conn).await?;
        Ok(policy)
    }

    async fn returns_for_sub_order(&self, sub_order_id: &SubOrderId) -> Result<Vec<ReturnRequest>, LedgerQueryError> {
        let mut conn = self.pool.acquire().await?;
        let found = returns::returns_for_sub_order(sub_order_id, &mut conn).await?;
        Ok(found)
    }

    async fn disputes_for_sub_order(&self, sub_order_id: &SubOrderId) -> Result<Vec<Dispute>, LedgerQueryError> {
        let mut conn = self.pool.acquire().await?;
        let found = returns::disputes_for_sub_order(sub_order_id, &mut conn).await?;
        Ok(found)
    }
}

impl AuthManagement for SqliteDatabase {
    async fn fetch_admin_user(&self, username: &str) -> Result<Option<AdminUser>, AuthApiError> {
        let mut conn = self.pool.acquire().await?;
        auth::fetch_admin_user(username, &mut conn).await
    }

    async fn create_admin_user(
        &self,
        username: &str,
        api_key_hash: &str,
        roles: &[Role],
    ) -> Result<AdminUser, AuthApiError> {
        let mut tx = self.pool.begin().await?;
        let user = auth::insert_admin_user(username, api_key_hash, &mut tx).await?;
        auth::assign_roles(username, roles, &mut tx).await?;
        tx.commit().await?;
        info!("🧑️ Admin user {username} created with {} roles", roles.len());
        Ok(user)
    }

    async fn fetch_roles_for_user(&self, username: &str) -> Result<Roles, AuthApiError> {
        let mut conn = self.pool.acquire().await?;
        auth::fetch_roles(username, &mut conn).await
    }

    async fn assign_roles(&self, username: &str, roles: &[Role]) -> Result<(), AuthApiError> {
        let mut tx = self.pool.begin().await?;
        auth::assign_roles(username, roles, &mut tx).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn revoke_roles(&self, username: &str, roles: &[Role]) -> Result<(), AuthApiError> {
        let mut tx = self.pool.begin().await?;
        auth::revoke_roles(username, roles, &mut tx).await?;
        tx.commit().await?;
        Ok(())
    }

    async fn admin_user_count(&self) -> Result<i64, AuthApiError> {
        let mut conn = self.pool.acquire().await?;
        auth::admin_user_count(&mut conn).await
    }
}

impl SqliteDatabase {
    /// Creates a new database API object against the URL from the environment.
    pub async fn new(max_connections: u32) -> Result<Self, sqlx::Error> {
        let url = db_url();
        SqliteDatabase::new_with_url(url.as_str(), max_connections).await
    }

    pub async fn new_with_url(url: &str, max_connections: u32) -> Result<Self, sqlx::Error> {
        trace!("🗃️ Creating new database connection pool with url {url}");
        let pool = new_pool(url, max_connections).await?;
        let url = url.to_string();
        Ok(Self { url, pool })
    }

    /// Returns a reference to the database connection pool.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// The shared payout path. Claims the release by moving it to `Processing` from one of the
    /// `from` states, credits the wallet exactly once, and marks the release `Released`, all in
    /// one transaction. A release that is already `Released` is reported as such, with the
    /// original credit attached.
    async fn do_release(
        &self,
        sub_order_id: &SubOrderId,
        from: &[ReleaseStatus],
        trigger: ReleaseTrigger,
        actor: &str,
    ) -> Result<ReleaseOutcome, SettlementError> {
        let mut tx = self.pool.begin().await?;
        let release = match releases::begin_processing(sub_order_id, from, &mut tx).await? {
            Some(release) => release,
            None => {
                let release = releases::fetch_release(sub_order_id, &mut tx)
                    .await?
                    .ok_or_else(|| SettlementError::ReleaseNotFound(sub_order_id.clone()))?;
                return match release.status {
                    ReleaseStatus::Released => {
                        let transaction = releases::release_credit_transaction(&release, &mut tx).await?;
                        debug!("🔄️💰️ {sub_order_id} was already released. Reporting the original outcome");
                        Ok(ReleaseOutcome::AlreadyReleased { release, transaction })
                    },
                    ReleaseStatus::Processing => Err(SettlementError::ConcurrencyConflict(format!(
                        "The release for {sub_order_id} is being processed by another call"
                    ))),
                    status => Err(SettlementError::invalid_transition(
                        format!("Release for {sub_order_id}"),
                        status,
                        ReleaseStatus::Processing,
                    )),
                };
            },
        };
        let payout = release.settlement.payout();
        let wallet = wallets::settle_payout(&release.store_id, payout, &mut tx).await?;
        let entry = wallets::insert_transaction(
            wallet.id,
            EntryType::Credit,
            payout,
            wallet.balance,
            TransactionSource::Order,
            Some(RelatedDocument::fund_release(sub_order_id)),
            Some(format!("settlement for sub-order {sub_order_id}")),
            &mut tx,
        )
        .await?;
        let release = releases::mark_released(sub_order_id, trigger, actor, &mut tx).await?.ok_or_else(|| {
            SettlementError::DatabaseError(format!("The release for {sub_order_id} vanished mid-payout"))
        })?;
        tx.commit().await?;
        info!("🔄️💰️ Released {payout} to store {} for {sub_order_id} ({trigger} by {actor})", release.store_id);
        Ok(ReleaseOutcome::Released { release, transaction: entry })
    }

    async fn withdrawal_transition(
        &self,
        request_ref: &str,
        from: &[WithdrawalStatus],
        to: WithdrawalStatus,
        actor: &str,
        note: Option<String>,
    ) -> Result<WithdrawalRequest, WithdrawalError> {
        let mut tx = self.pool.begin().await?;
        let request = match withdrawals::update_status(request_ref, from, to, &mut tx).await? {
            Some(request) => request,
            None => {
                let request = withdrawals::fetch_by_ref(request_ref, &mut tx)
                    .await?
                    .ok_or_else(|| WithdrawalError::RequestNotFound(request_ref.to_string()))?;
                return Err(WithdrawalError::InvalidStateTransition {
                    request_ref: request_ref.to_string(),
                    from: request.status,
                    to,
                });
            },
        };
        withdrawals::append_status(request.id, to, actor, note, &mut tx).await?;
        tx.commit().await?;
        debug!("🔄️🏦️ Withdrawal {request_ref} moved to {to} by {actor}");
        Ok(request)
    }
}
