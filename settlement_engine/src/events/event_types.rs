use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::db_types::{FundRelease, Order, WalletTransaction, WithdrawalRequest};

/// Fired when an order's payment clears and its fund release schedule has been written.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderPaidEvent {
    pub order: Order,
    pub releases: Vec<FundRelease>,
}

impl OrderPaidEvent {
    pub fn new(order: Order, releases: Vec<FundRelease>) -> Self {
        Self { order, releases }
    }
}

/// Fired after a settlement payout lands in a store wallet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FundsReleasedEvent {
    pub release: FundRelease,
    pub transaction: WalletTransaction,
}

impl FundsReleasedEvent {
    pub fn new(release: FundRelease, transaction: WalletTransaction) -> Self {
        Self { release, transaction }
    }
}

/// Fired when a released settlement is clawed back.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReleaseReversedEvent {
    pub release: FundRelease,
    pub transaction: WalletTransaction,
}

impl ReleaseReversedEvent {
    pub fn new(release: FundRelease, transaction: WalletTransaction) -> Self {
        Self { release, transaction }
    }
}

/// Fired when an operator approves a withdrawal for payment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawalApprovedEvent {
    pub request: WithdrawalRequest,
}

impl WithdrawalApprovedEvent {
    pub fn new(request: WithdrawalRequest) -> Self {
        Self { request }
    }
}

/// Fired when a withdrawal is rejected and the held amount returned to the wallet.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WithdrawalRejectedEvent {
    pub request: WithdrawalRequest,
    pub reason: String,
}

impl WithdrawalRejectedEvent {
    pub fn new(request: WithdrawalRequest, reason: String) -> Self {
        Self { request, reason }
    }
}

/// Fired for every permission-gated admin action that changes a release or withdrawal, after the
/// change has committed. `before` is absent when the prior status could not be observed, which
/// can happen if the record was being modified concurrently.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub admin: String,
    pub action: String,
    pub resource: String,
    pub before: Option<String>,
    pub after: String,
    pub recorded_at: DateTime<Utc>,
}

impl AuditEvent {
    pub fn new(admin: &str, action: &str, resource: String, before: Option<String>, after: String) -> Self {
        Self {
            admin: admin.to_string(),
            action: action.to_string(),
            resource,
            before,
            after,
            recorded_at: Utc::now(),
        }
    }
}
