use chrono::{DateTime, Utc};
use thiserror::Error;

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
};

#[derive(Debug, Clone, Error)]
pub enum LedgerQueryError {
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error("No release policy is configured for tier {0}")]
    PolicyNotFound(StoreTier),
}

impl From<sqlx::Error> for LedgerQueryError {
    fn from(e: sqlx::Error) -> Self {
        Self::DatabaseError(e.to_string())
    }
}

impl From<super::SettlementError> for LedgerQueryError {
    fn from(e: super::SettlementError) -> Self {
        match e {
            super::SettlementError::PolicyNotFound(tier) => Self::PolicyNotFound(tier),
            e => Self::DatabaseError(e.to_string()),
        }
    }
}

impl From<super::WithdrawalError> for LedgerQueryError {
    fn from(e: super::WithdrawalError) -> Self {
        Self::DatabaseError(e.to_string())
    }
}

/// Read-only access to the ledger. Nothing in here mutates state, so these methods are safe to
/// expose to read-only admin roles.
#[allow(async_fn_in_trait)]
pub trait LedgerManagement: Clone {
    async fn fetch_order(&self, order_id: &OrderId) -> Result<Option<Order>, LedgerQueryError>;

    async fn fetch_order_by_idempotency_key(&self, key: &str) -> Result<Option<Order>, LedgerQueryError>;

    /// The order with its sub-orders, line items and status histories attached.
    async fn fetch_full_order(&self, order_id: &OrderId) -> Result<Option<FullOrder>, LedgerQueryError>;

    async fn search_orders(&self, query: OrderQueryFilter) -> Result<Vec<Order>, LedgerQueryError>;

    async fn fetch_sub_order(&self, sub_order_id: &SubOrderId) -> Result<Option<SubOrder>, LedgerQueryError>;

    async fn sub_order_history(&self, sub_order_id: &SubOrderId)
        -> Result<Vec<SubOrderStatusEntry>, LedgerQueryError>;

    async fn fetch_release(&self, sub_order_id: &SubOrderId) -> Result<Option<FundRelease>, LedgerQueryError>;

    async fn search_releases(&self, query: ReleaseQueryFilter) -> Result<Vec<FundRelease>, LedgerQueryError>;

    /// Releases that are `Ready` and due at `now`, oldest schedule first, at most `limit` rows.
    /// A pure read; evaluating and releasing are separate, explicitly invoked steps.
    async fn ready_releases(&self, now: DateTime<Utc>, limit: i64) -> Result<Vec<FundRelease>, LedgerQueryError>;

    /// Releases still `Pending` whose scheduled time has passed, i.e. candidates for the next
    /// evaluation sweep.
    async fn due_pending_releases(&self, now: DateTime<Utc>, limit: i64)
        -> Result<Vec<FundRelease>, LedgerQueryError>;

    async fn fetch_withdrawal(&self, request_ref: &str) -> Result<Option<WithdrawalRequest>, LedgerQueryError>;

    async fn withdrawal_history(&self, withdrawal_id: i64) -> Result<Vec<WithdrawalStatusEntry>, LedgerQueryError>;

    async fn search_withdrawals(&self, query: WithdrawalQueryFilter) -> Result<Vec<WithdrawalRequest>, LedgerQueryError>;

    async fn fetch_store(&self, store_id: &str) -> Result<Option<Store>, LedgerQueryError>;

    /// The latest policy version for a tier.
    async fn fetch_policy(&self, tier: StoreTier) -> Result<ReleasePolicy, LedgerQueryError>;

    async fn returns_for_sub_order(&self, sub_order_id: &SubOrderId) -> Result<Vec<ReturnRequest>, LedgerQueryError>;

    async fn disputes_for_sub_order(&self, sub_order_id: &SubOrderId) -> Result<Vec<Dispute>, LedgerQueryError>;
}
