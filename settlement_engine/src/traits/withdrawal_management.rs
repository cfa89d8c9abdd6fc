use thiserror::Error;

use crate::{
    db_types::{NewWithdrawal, WalletTransaction, WithdrawalRequest, WithdrawalStatus},
    traits::{is_lock_contention, WalletLedgerError},
};

#[derive(Debug, Clone, Error)]
pub enum WithdrawalError {
    #[error("Database error: {0}")]
    DatabaseError(String),
    #[error(transparent)]
    WalletError(#[from] WalletLedgerError),
    #[error("No withdrawal request matches {0}")]
    RequestNotFound(String),
    #[error("Invalid withdrawal request: {0}")]
    ValidationError(String),
    #[error("Withdrawal {request_ref} cannot move from {from} to {to}")]
    InvalidStateTransition { request_ref: String, from: WithdrawalStatus, to: WithdrawalStatus },
    #[error("The ledger is contended, try again: {0}")]
    ConcurrencyConflict(String),
}

impl From<sqlx::Error> for WithdrawalError {
    fn from(e: sqlx::Error) -> Self {
        if is_lock_contention(&e) {
            Self::ConcurrencyConflict(e.to_string())
        } else {
            Self::DatabaseError(e.to_string())
        }
    }
}

/// Withdrawal request flows.
///
/// Funds leave the wallet the moment a request is created and only come back through an explicit
/// rejection, so a store can never double-spend a balance it has asked to pay out. Every
/// transition appends a status history entry in the same transaction, which keeps the request's
/// status equal to the head of its history at all times. Transitions are guarded on the current
/// status: when an approval and a rejection race, exactly one wins and the other gets
/// [`WithdrawalError::InvalidStateTransition`].
#[allow(async_fn_in_trait)]
pub trait WithdrawalManagement: Clone {
    /// Creates a request and debits the wallet by the requested amount in the same transaction.
    async fn create_withdrawal(
        &self,
        request: NewWithdrawal,
        request_ref: &str,
        actor: &str,
    ) -> Result<(WithdrawalRequest, WalletTransaction), WithdrawalError>;

    /// `Pending -> UnderReview`.
    async fn start_review(&self, request_ref: &str, actor: &str) -> Result<WithdrawalRequest, WithdrawalError>;

    /// `Pending | UnderReview -> Approved`. The bank transaction reference is mandatory and
    /// recorded on the request; no funds move here, the debit already happened at creation.
    async fn approve_withdrawal(
        &self,
        request_ref: &str,
        transaction_reference: &str,
        actor: &str,
    ) -> Result<WithdrawalRequest, WithdrawalError>;

    /// `Approved -> Processing`, taken when the payout is handed to the bank rail.
    async fn begin_processing(&self, request_ref: &str, actor: &str) -> Result<WithdrawalRequest, WithdrawalError>;

    /// `Approved | Processing -> Completed`.
    async fn complete_withdrawal(&self, request_ref: &str, actor: &str) -> Result<WithdrawalRequest, WithdrawalError>;

    /// `Approved | Processing -> Failed` with the downstream reason.
    async fn fail_withdrawal(
        &self,
        request_ref: &str,
        reason: &str,
        actor: &str,
    ) -> Result<WithdrawalRequest, WithdrawalError>;

    /// `Failed -> Processing` for another attempt against the bank rail.
    async fn retry_withdrawal(&self, request_ref: &str, actor: &str) -> Result<WithdrawalRequest, WithdrawalError>;

    /// Rejects any not-yet-completed request with a mandatory reason and credits the requested
    /// amount back to the wallet in the same transaction.
    async fn reject_withdrawal(
        &self,
        request_ref: &str,
        reason: &str,
        actor: &str,
    ) -> Result<(WithdrawalRequest, WalletTransaction), WithdrawalError>;
}
