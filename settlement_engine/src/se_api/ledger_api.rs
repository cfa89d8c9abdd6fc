use std::fmt::Debug;

use chrono::{DateTime, Utc};
use log::*;

use crate::{
    db_types::{
        Dispute,
        FundRelease,
        Order,
        OrderId,
        ReturnRequest,
        Store,
        StoreTier,
        SubOrder,
        SubOrderId,
        SubOrderStatusEntry,
        WithdrawalRequest,
        WithdrawalStatusEntry,
    },
    policies::ReleasePolicy,
    se_api::{FullOrder, OrderQueryFilter, ReleaseQueryFilter, WithdrawalQueryFilter},
    traits::{LedgerManagement, LedgerQueryError},
};

/// `LedgerApi` is the read-only view over orders, releases, withdrawals and stores. Every method
/// here is a pure query, which makes the whole API safe to hand to read-only admin roles.
pub struct LedgerApi<B> {
    db: B,
}

impl<B> Debug for LedgerApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "LedgerApi")
    }
}

impl<B> LedgerApi<B> {
    pub fn new(db: B) -> Self {
        Self { db }
    }
}

impl<B> LedgerApi<B>
where B: LedgerManagement
{
    pub async fn fetch_order(&self, order_id: &OrderId) -> Result<Option<Order>, LedgerQueryError> {
        self.db.fetch_order(order_id).await
    }

    pub async fn fetch_order_by_idempotency_key(&self, key: &str) -> Result<Option<Order>, LedgerQueryError> {
        self.db.fetch_order_by_idempotency_key(key).await
    }

    pub async fn fetch_full_order(&self, order_id: &OrderId) -> Result<Option<FullOrder>, LedgerQueryError> {
        self.db.fetch_full_order(order_id).await
    }

    pub async fn search_orders(&self, query: OrderQueryFilter) -> Result<Vec<Order>, LedgerQueryError> {
        trace!("💻️ Searching orders. {query}");
        self.db.search_orders(query).await
    }

    pub async fn fetch_sub_order(&self, sub_order_id: &SubOrderId) -> Result<Option<SubOrder>, LedgerQueryError> {
        self.db.fetch_sub_order(sub_order_id).await
    }

    pub async fn sub_order_history(
        &self,
        sub_order_id: &SubOrderId,
    ) -> Result<Vec<SubOrderStatusEntry>, LedgerQueryError> {
        self.db.sub_order_history(sub_order_id).await
    }

    pub async fn fetch_release(&self, sub_order_id: &SubOrderId) -> Result<Option<FundRelease>, LedgerQueryError> {
        self.db.fetch_release(sub_order_id).await
    }

    pub async fn search_releases(&self, query: ReleaseQueryFilter) -> Result<Vec<FundRelease>, LedgerQueryError> {
        trace!("💻️ Searching fund releases. {query}");
        self.db.search_releases(query).await
    }

    pub async fn ready_releases(&self, now: DateTime<Utc>, limit: i64) -> Result<Vec<FundRelease>, LedgerQueryError> {
        self.db.ready_releases(now, limit).await
    }

    pub async fn due_pending_releases(
        &self,
        now: DateTime<Utc>,
        limit: i64,
    ) -> Result<Vec<FundRelease>, LedgerQueryError> {
        self.db.due_pending_releases(now, limit).await
    }

    pub async fn fetch_withdrawal(&self, request_ref: &str) -> Result<Option<WithdrawalRequest>, LedgerQueryError> {
        self.db.fetch_withdrawal(request_ref).await
    }

    pub async fn withdrawal_history(&self, withdrawal_id: i64) -> Result<Vec<WithdrawalStatusEntry>, LedgerQueryError> {
        self.db.withdrawal_history(withdrawal_id).await
    }

    pub async fn search_withdrawals(
        &self,
        query: WithdrawalQueryFilter,
    ) -> Result<Vec<WithdrawalRequest>, LedgerQueryError> {
        trace!("💻️ Searching withdrawal requests. {query}");
        self.db.search_withdrawals(query).await
    }

    pub async fn fetch_store(&self, store_id: &str) -> Result<Option<Store>, LedgerQueryError> {
        self.db.fetch_store(store_id).await
    }

    pub async fn fetch_policy(&self, tier: StoreTier) -> Result<ReleasePolicy, LedgerQueryError> {
        self.db.fetch_policy(tier).await
    }

    pub async fn returns_for_sub_order(&self, sub_order_id: &SubOrderId) -> Result<Vec<ReturnRequest>, LedgerQueryError> {
        self.db.returns_for_sub_order(sub_order_id).await
    }

    pub async fn disputes_for_sub_order(&self, sub_order_id: &SubOrderId) -> Result<Vec<Dispute>, LedgerQueryError> {
        self.db.disputes_for_sub_order(sub_order_id).await
    }
}
