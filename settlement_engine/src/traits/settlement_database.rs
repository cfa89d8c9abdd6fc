use thiserror::Error;

use crate::{
    db_types::{
        ConfirmationKind,
        DeliveryStatus,
        Dispute,
        DisputeKind,
        FundRelease,
        NewOrder,
        Order,
        OrderId,
        OrderValidationError,
        ReleaseTrigger,
        ReturnRequest,
        ReturnStatus,
        Store,
        StoreTier,
        SubOrder,
        SubOrderId,
        WalletTransaction,
    },
    traits::{
        is_lock_contention,
        EvaluationOutcome,
        LedgerManagement,
        ReleaseOutcome,
        ReturnUpdate,
        WalletLedger,
        WalletLedgerError,
    },
};

#[derive(Debug, Clone, Error)]
pub enum SettlementError {
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error(transparent)]
    WalletError(#[from] WalletLedgerError),
    #[error(transparent)]
    InvalidOrder(#[from] OrderValidationError),
    #[error("Order {0} not found")]
    OrderNotFound(OrderId),
    #[error("Sub-order {0} not found")]
    SubOrderNotFound(SubOrderId),
    #[error("No fund release exists for sub-order {0}")]
    ReleaseNotFound(SubOrderId),
    #[error("Return request {0} not found")]
    ReturnNotFound(i64),
    #[error("Dispute {0} not found")]
    DisputeNotFound(i64),
    #[error("No release policy is configured for tier {0}")]
    PolicyNotFound(StoreTier),
    #[error("Invalid request: {0}")]
    ValidationError(String),
    #[error("{entity} cannot move from {from} to {to}")]
    InvalidStateTransition { entity: String, from: String, to: String },
    #[error("The ledger is contended, try again: {0}")]
    ConcurrencyConflict(String),
}

impl SettlementError {
    pub fn invalid_transition<E, F, T>(entity: E, from: F, to: T) -> Self
    where
        E: ToString,
        F: ToString,
        T: ToString,
    {
        Self::InvalidStateTransition { entity: entity.to_string(), from: from.to_string(), to: to.to_string() }
    }
}

impl From<sqlx::Error> for SettlementError {
    fn from(e: sqlx::Error) -> Self {
        if is_lock_contention(&e) {
            Self::ConcurrencyConflict(e.to_string())
        } else {
            Self::DatabaseError(e.to_string())
        }
    }
}

/// The escrow flows: order intake, payment, fulfilment, fund releases, returns and disputes.
///
/// Every method that moves state does so in a single database transaction, with status updates
/// guarded on the expected current state so that concurrent callers serialize cleanly. One
/// winner performs the change; losers get [`SettlementError::InvalidStateTransition`] or an
/// idempotent "already done" result, never a second side effect.
#[allow(async_fn_in_trait)]
pub trait SettlementDatabase: Clone + WalletLedger + LedgerManagement {
    /// The database URL for this backend.
    fn url(&self) -> &str;

    /// Fetches the store record, creating an unverified Standard-tier store and its wallet on
    /// first contact.
    async fn register_store(&self, store_id: &str, name: &str) -> Result<Store, SettlementError>;

    /// Marks a store's verification as complete and flips the matching condition flag on its
    /// unreleased settlements. Safe to call repeatedly.
    async fn process_store_verified(&self, store_id: &str) -> Result<Store, SettlementError>;

    /// Inserts a new order aggregate with its sub-orders and line items.
    ///
    /// Idempotent on the idempotency key: a redelivered order comes back with `false` and no new
    /// rows. The boolean is `true` when this call inserted the order.
    async fn insert_order(&self, order: NewOrder) -> Result<(Order, bool), SettlementError>;

    /// Handles payment confirmation for an order.
    ///
    /// Marks the order `Paid` and creates one fund release per sub-order, with commission and
    /// rules frozen from the policy in force and the schedule counted in business days from the
    /// placement date. The escrowed value lands on each store's `pending` balance. Calling this
    /// again for a paid order returns the existing releases without touching anything.
    async fn process_payment_cleared(&self, order_id: &OrderId) -> Result<(Order, Vec<FundRelease>), SettlementError>;

    async fn process_payment_failed(&self, order_id: &OrderId) -> Result<Order, SettlementError>;

    async fn process_payment_refunded(&self, order_id: &OrderId) -> Result<Order, SettlementError>;

    /// Moves a sub-order's fulfilment forward. Transitions that would move backwards are
    /// rejected. Reaching `Delivered` stamps `delivered_at` and appends a history entry.
    async fn update_delivery_status(
        &self,
        sub_order_id: &SubOrderId,
        status: DeliveryStatus,
        note: Option<String>,
    ) -> Result<SubOrder, SettlementError>;

    /// Records delivery confirmation, manual or automatic, whichever arrives first. The boolean
    /// is `true` when this call performed the confirmation; a repeat call is a no-op.
    async fn confirm_delivery(
        &self,
        sub_order_id: &SubOrderId,
        kind: ConfirmationKind,
    ) -> Result<(SubOrder, bool), SettlementError>;

    /// Auto-confirms delivered sub-orders whose confirmation grace period has lapsed without the
    /// customer confirming. Returns the sub-orders confirmed by this sweep.
    async fn auto_confirm_deliveries(&self, grace_days: i64, limit: i64) -> Result<Vec<SubOrder>, SettlementError>;

    /// Re-checks a release's conditions and schedule, flipping newly satisfied flags and moving
    /// `Pending` to `Ready` when everything is in place. Flags only ever move from unmet to met.
    async fn evaluate_release(&self, sub_order_id: &SubOrderId) -> Result<EvaluationOutcome, SettlementError>;

    /// Pays out a `Ready` release: credits the store wallet once, moves the escrowed value off
    /// `pending` and marks the release `Released`.
    ///
    /// ```text
    /// Ready -> Processing -> Released
    /// ```
    /// Releasing an already released sub-order reports the original outcome instead of crediting
    /// twice.
    async fn release_funds(
        &self,
        sub_order_id: &SubOrderId,
        trigger: ReleaseTrigger,
        actor: &str,
    ) -> Result<ReleaseOutcome, SettlementError>;

    /// Pays out regardless of unmet conditions or schedule. Restricted to super-admins at the
    /// API layer; the trigger is recorded as `AdminForced`.
    async fn force_release(&self, sub_order_id: &SubOrderId, actor: &str) -> Result<ReleaseOutcome, SettlementError>;

    /// Marks a `Pending` or `Ready` release `Failed` with a reason, e.g. when the payout hook
    /// reports a downstream problem.
    async fn fail_release(&self, sub_order_id: &SubOrderId, reason: &str) -> Result<FundRelease, SettlementError>;

    /// Puts a `Failed` release back to `Ready` for another attempt.
    async fn retry_release(&self, sub_order_id: &SubOrderId) -> Result<FundRelease, SettlementError>;

    /// Compensates an erroneous payout: debits the wallet by the released amount and marks the
    /// release `Reversed`. Fails with insufficient funds when the store has already spent the
    /// money.
    async fn reverse_release(
        &self,
        sub_order_id: &SubOrderId,
        reason: &str,
        actor: &str,
    ) -> Result<(FundRelease, WalletTransaction), SettlementError>;

    /// Opens a return for a sub-order. An active return blocks release under dispute-checking
    /// policies.
    async fn request_return(&self, sub_order_id: &SubOrderId, reason: &str) -> Result<ReturnRequest, SettlementError>;

    /// Moves a return through `Requested -> Approved/Rejected -> InTransit -> Received ->
    /// Refunded`. Refunding a sub-order whose funds were already released debits the store by
    /// the settlement payout as a `Refund` ledger entry.
    async fn update_return_status(&self, return_id: i64, status: ReturnStatus) -> Result<ReturnUpdate, SettlementError>;

    async fn open_dispute(
        &self,
        sub_order_id: &SubOrderId,
        kind: DisputeKind,
        reason: &str,
    ) -> Result<Dispute, SettlementError>;

    async fn resolve_dispute(&self, dispute_id: i64) -> Result<Dispute, SettlementError>;

    async fn close(&mut self) -> Result<(), SettlementError>;
}
