use std::fmt::Display;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::db_types::{
    Dispute,
    FundRelease,
    LineItem,
    Order,
    OrderId,
    PaymentStatus,
    ReleaseStatus,
    ReturnRequest,
    SubOrder,
    SubOrderStatusEntry,
    WithdrawalStatus,
};
use msl_common::Money;

//--------------------------------------     Query filters       -------------------------------------------------------

/// Filter for order searches. `limit` caps the result set but does not count as a predicate, so a
/// filter carrying only a limit is still "empty".
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OrderQueryFilter {
    pub customer_id: Option<String>,
    pub payment_status: Option<PaymentStatus>,
    pub since: Option<DateTime<Utc>>,
    pub until: Option<DateTime<Utc>>,
    pub limit: Option<i64>,
}

impl OrderQueryFilter {
    pub fn with_customer_id(mut self, customer_id: String) -> Self {
        self.customer_id = Some(customer_id);
        self
    }

    pub fn with_payment_status(mut self, status: PaymentStatus) -> Self {
        self.payment_status = Some(status);
        self
    }

    pub fn since(mut self, since: DateTime<Utc>) -> Self {
        self.since = Some(since);
        self
    }

    pub fn until(mut self, until: DateTime<Utc>) -> Self {
        self.until = Some(until);
        self
    }

    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.customer_id.is_none() && self.payment_status.is_none() && self.since.is_none() && self.until.is_none()
    }
}

impl Display for OrderQueryFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_empty() {
            write!(f, "No filters.")?;
            return Ok(());
        }
        if let Some(customer_id) = &self.customer_id {
            write!(f, "customer_id: {customer_id}. ")?;
        }
        if let Some(status) = &self.payment_status {
            write!(f, "payment_status: {status}. ")?;
        }
        if let Some(since) = &self.since {
            write!(f, "since {since}. ")?;
        }
        if let Some(until) = &self.until {
            write!(f, "until {until}. ")?;
        }
        Ok(())
    }
}

/// Filter for fund release searches.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ReleaseQueryFilter {
    pub store_id: Option<String>,
    pub order_id: Option<OrderId>,
    #[serde(default)]
    pub statuses: Vec<ReleaseStatus>,
    pub due_before: Option<DateTime<Utc>>,
    pub limit: Option<i64>,
}

impl ReleaseQueryFilter {
    pub fn with_store_id(mut self, store_id: String) -> Self {
        self.store_id = Some(store_id);
        self
    }

    pub fn with_order_id(mut self, order_id: OrderId) -> Self {
        self.order_id = Some(order_id);
        self
    }

    pub fn with_status(mut self, status: ReleaseStatus) -> Self {
        self.statuses.push(status);
        self
    }

    pub fn due_before(mut self, due_before: DateTime<Utc>) -> Self {
        self.due_before = Some(due_before);
        self
    }

    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.store_id.is_none() && self.order_id.is_none() && self.statuses.is_empty() && self.due_before.is_none()
    }
}

impl Display for ReleaseQueryFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_empty() {
            write!(f, "No filters.")?;
            return Ok(());
        }
        if let Some(store_id) = &self.store_id {
            write!(f, "store_id: {store_id}. ")?;
        }
        if let Some(order_id) = &self.order_id {
            write!(f, "order_id: {order_id}. ")?;
        }
        if !self.statuses.is_empty() {
            let statuses = self.statuses.iter().map(|s| s.to_string()).collect::<Vec<String>>().join(",");
            write!(f, "statuses: [{statuses}]. ")?;
        }
        if let Some(due_before) = &self.due_before {
            write!(f, "due before {due_before}. ")?;
        }
        Ok(())
    }
}

/// Filter for withdrawal request searches.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct WithdrawalQueryFilter {
    pub store_id: Option<String>,
    #[serde(default)]
    pub statuses: Vec<WithdrawalStatus>,
    pub since: Option<DateTime<Utc>>,
    pub limit: Option<i64>,
}

impl WithdrawalQueryFilter {
    pub fn with_store_id(mut self, store_id: String) -> Self {
        self.store_id = Some(store_id);
        self
    }

    pub fn with_status(mut self, status: WithdrawalStatus) -> Self {
        self.statuses.push(status);
        self
    }

    pub fn since(mut self, since: DateTime<Utc>) -> Self {
        self.since = Some(since);
        self
    }

    pub fn with_limit(mut self, limit: i64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.store_id.is_none() && self.statuses.is_empty() && self.since.is_none()
    }
}

impl Display for WithdrawalQueryFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_empty() {
            write!(f, "No filters.")?;
            return Ok(());
        }
        if let Some(store_id) = &self.store_id {
            write!(f, "store_id: {store_id}. ")?;
        }
        if !self.statuses.is_empty() {
            let statuses = self.statuses.iter().map(|s| s.to_string()).collect::<Vec<String>>().join(",");
            write!(f, "statuses: [{statuses}]. ")?;
        }
        if let Some(since) = &self.since {
            write!(f, "since {since}. ")?;
        }
        Ok(())
    }
}

//--------------------------------------     Composite views       -----------------------------------------------------

/// A sub-order with everything hanging off it: line items, the append-only status history, and the
/// fund release record if payment has cleared.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FullSubOrder {
    pub sub_order: SubOrder,
    pub items: Vec<LineItem>,
    pub history: Vec<SubOrderStatusEntry>,
    pub release: Option<FundRelease>,
    pub returns: Vec<ReturnRequest>,
    pub disputes: Vec<Dispute>,
}

/// An order and all of its sub-orders, fully hydrated.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FullOrder {
    pub order: Order,
    pub sub_orders: Vec<FullSubOrder>,
}

/// What a scheduled sweep did: how many due pending releases were re-evaluated, how many of
/// those became ready, and how many payouts went out. Per-release failures are logged and
/// counted rather than aborting the sweep.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct SweepSummary {
    pub evaluated: usize,
    pub became_ready: usize,
    pub released: usize,
    pub failures: usize,
}

impl Display for SweepSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} evaluated, {} newly ready, {} released, {} failures",
            self.evaluated, self.became_ready, self.released, self.failures
        )
    }
}

/// The result of replaying a wallet's ledger against its stored balance. `consistent` is true when
/// the two agree; anything else means an entry was written outside the ledger API and needs a
/// human.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalletReconciliation {
    pub store_id: String,
    pub stored_balance: Money,
    pub replayed_balance: Money,
    pub consistent: bool,
}

impl WalletReconciliation {
    pub fn new(store_id: String, stored_balance: Money, replayed_balance: Money) -> Self {
        let consistent = stored_balance == replayed_balance;
        Self { store_id, stored_balance, replayed_balance, consistent }
    }
}

impl Display for WalletReconciliation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.consistent {
            write!(f, "Wallet for {} is consistent at {}", self.store_id, self.stored_balance)
        } else {
            write!(
                f,
                "Wallet for {} is INCONSISTENT: stored {} vs replayed {}",
                self.store_id, self.stored_balance, self.replayed_balance
            )
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn a_limit_on_its_own_is_still_an_empty_filter() {
        let q = OrderQueryFilter::default().with_limit(50);
        assert!(q.is_empty());
        let q = q.with_payment_status(PaymentStatus::Paid);
        assert!(!q.is_empty());
    }

    #[test]
    fn filters_describe_themselves() {
        let q = ReleaseQueryFilter::default()
            .with_store_id("alice-emporium".to_string())
            .with_status(ReleaseStatus::Ready)
            .with_status(ReleaseStatus::Pending);
        assert_eq!(q.to_string(), "store_id: alice-emporium. statuses: [Ready,Pending]. ");
        assert_eq!(WithdrawalQueryFilter::default().to_string(), "No filters.");
    }

    #[test]
    fn reconciliation_flags_a_mismatch() {
        let ok = WalletReconciliation::new("s1".into(), Money::from(1000), Money::from(1000));
        assert!(ok.consistent);
        let bad = WalletReconciliation::new("s1".into(), Money::from(1000), Money::from(900));
        assert!(!bad.consistent);
        assert!(bad.to_string().contains("INCONSISTENT"));
    }
}
