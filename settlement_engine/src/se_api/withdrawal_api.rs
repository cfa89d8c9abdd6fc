use std::fmt::Debug;

use log::*;
use msl_common::Money;

use crate::{
    db_types::{BankDetails, NewWithdrawal, WalletTransaction, WithdrawalRequest},
    events::{EventProducers, WithdrawalApprovedEvent, WithdrawalRejectedEvent},
    helpers::{is_valid_account_number, is_valid_transaction_reference, new_request_ref},
    policies::WithdrawalFeePolicy,
    traits::{WithdrawalError, WithdrawalManagement},
};

/// `WithdrawalApi` creates and adjudicates store withdrawal requests.
///
/// The money model is deliberately simple: the requested amount is debited from the wallet the
/// moment the request is created, so a store can never double-spend a balance by queueing
/// requests. Rejection is the only transition that puts the money back.
pub struct WithdrawalApi<B> {
    db: B,
    producers: EventProducers,
    fee_policy: WithdrawalFeePolicy,
}

impl<B> Debug for WithdrawalApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "WithdrawalApi")
    }
}

impl<B> WithdrawalApi<B> {
    pub fn new(db: B, producers: EventProducers) -> Self {
        Self { db, producers, fee_policy: WithdrawalFeePolicy::default() }
    }

    pub fn with_fee_policy(mut self, fee_policy: WithdrawalFeePolicy) -> Self {
        self.fee_policy = fee_policy;
        self
    }
}

impl<B> WithdrawalApi<B>
where B: WithdrawalManagement
{
    /// Creates a withdrawal request for `amount`, debiting the store wallet immediately. The
    /// request reference is generated here and returned on the request record.
    pub async fn create(
        &self,
        store_id: &str,
        amount: Money,
        bank_details: BankDetails,
        actor: &str,
    ) -> Result<(WithdrawalRequest, WalletTransaction), WithdrawalError> {
        if amount.is_negative() || amount.is_zero() {
            return Err(WithdrawalError::ValidationError("The withdrawal amount must be positive".to_string()));
        }
        if !is_valid_account_number(&bank_details.account_number) {
            return Err(WithdrawalError::ValidationError(format!(
                "{} is not a valid NUBAN account number",
                bank_details.account_number
            )));
        }
        if bank_details.bank_name.trim().is_empty() || bank_details.account_name.trim().is_empty() {
            return Err(WithdrawalError::ValidationError(
                "Bank name and account name are both required".to_string(),
            ));
        }
        let processing_fee = self.fee_policy.fee_for(amount);
        let net_amount = self.fee_policy.net_for(amount);
        if net_amount.is_negative() || net_amount.is_zero() {
            return Err(WithdrawalError::ValidationError(format!(
                "A withdrawal of {amount} does not cover the {processing_fee} processing fee"
            )));
        }
        let request_ref = new_request_ref();
        let new = NewWithdrawal {
            store_id: store_id.to_string(),
            requested_amount: amount,
            processing_fee,
            net_amount,
            bank_details,
        };
        self.db.create_withdrawal(new, &request_ref, actor).await
    }

    /// `Pending -> UnderReview`, claimed by an operator.
    pub async fn start_review(&self, request_ref: &str, actor: &str) -> Result<WithdrawalRequest, WithdrawalError> {
        self.db.start_review(request_ref, actor).await
    }

    /// Approves a request for payment. The bank transaction reference must match the bank's
    /// reference format; approval without one is not possible.
    pub async fn approve(
        &self,
        request_ref: &str,
        transaction_reference: &str,
        actor: &str,
    ) -> Result<WithdrawalRequest, WithdrawalError> {
        if !is_valid_transaction_reference(transaction_reference) {
            return Err(WithdrawalError::ValidationError(format!(
                "{transaction_reference} is not a plausible bank transaction reference"
            )));
        }
        let request = self.db.approve_withdrawal(request_ref, transaction_reference, actor).await?;
        for emitter in &self.producers.withdrawal_approved_producer {
            debug!("🔄️🏦️ Notifying withdrawal approved hook subscribers");
            emitter.publish_event(WithdrawalApprovedEvent::new(request.clone())).await;
        }
        Ok(request)
    }

    pub async fn begin_processing(&self, request_ref: &str, actor: &str) -> Result<WithdrawalRequest, WithdrawalError> {
        self.db.begin_processing(request_ref, actor).await
    }

    pub async fn complete(&self, request_ref: &str, actor: &str) -> Result<WithdrawalRequest, WithdrawalError> {
        self.db.complete_withdrawal(request_ref, actor).await
    }

    pub async fn fail(&self, request_ref: &str, reason: &str, actor: &str) -> Result<WithdrawalRequest, WithdrawalError> {
        self.db.fail_withdrawal(request_ref, reason, actor).await
    }

    pub async fn retry(&self, request_ref: &str, actor: &str) -> Result<WithdrawalRequest, WithdrawalError> {
        self.db.retry_withdrawal(request_ref, actor).await
    }

    /// Rejects a request with a mandatory reason, returning the held amount to the wallet.
    pub async fn reject(
        &self,
        request_ref: &str,
        reason: &str,
        actor: &str,
    ) -> Result<(WithdrawalRequest, WalletTransaction), WithdrawalError> {
        let (request, transaction) = self.db.reject_withdrawal(request_ref, reason, actor).await?;
        for emitter in &self.producers.withdrawal_rejected_producer {
            debug!("🔄️🏦️ Notifying withdrawal rejected hook subscribers");
            emitter.publish_event(WithdrawalRejectedEvent::new(request.clone(), reason.to_string())).await;
        }
        Ok((request, transaction))
    }
}
