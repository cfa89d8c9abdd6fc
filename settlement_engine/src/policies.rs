//! Release and fee policies.
//!
//! Policies are versioned rows in the `release_policies` table, keyed by store tier. The values
//! seeded by the migrations are the constructors below, so changing a fee means inserting a new
//! version rather than editing history. A settlement snapshots the policy in force at creation
//! and is never recomputed afterwards.

use chrono::{DateTime, Utc};
use msl_common::Money;
use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use crate::db_types::{ReleaseRules, Settlement, StoreTier, VerificationStatus};

/// Extra commission charged while a store has not completed verification, in basis points.
pub const UNVERIFIED_FEE_SURCHARGE_BPS: i64 = 100;

//--------------------------------------    ReleasePolicy       ---------------------------------------------------

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct ReleasePolicy {
    pub id: i64,
    pub store_tier: StoreTier,
    pub version: i64,
    /// Commission percentage in basis points, applied to the sub-order item value.
    pub percentage_fee: i64,
    /// Flat commission component in minor units.
    pub flat_fee: Money,
    pub business_days_required: i64,
    pub delivery_required: bool,
    pub buyer_protection_days: i64,
    pub require_buyer_protection: bool,
    pub require_dispute_checks: bool,
    pub created_at: DateTime<Utc>,
}

impl ReleasePolicy {
    fn seed(tier: StoreTier, percentage_fee: i64, flat_fee: i64, business_days: i64) -> Self {
        Self {
            id: 0,
            store_tier: tier,
            version: 1,
            percentage_fee,
            flat_fee: Money::from(flat_fee),
            business_days_required: business_days,
            delivery_required: true,
            buyer_protection_days: 7,
            require_buyer_protection: false,
            require_dispute_checks: false,
            created_at: DateTime::<Utc>::MIN_UTC,
        }
    }

    /// 7.5% + ₦100, funds held for 7 business days.
    pub fn standard() -> Self {
        Self::seed(StoreTier::Standard, 750, 10_000, 7)
    }

    /// 5% + ₦75, funds held for 5 business days.
    pub fn silver() -> Self {
        Self::seed(StoreTier::Silver, 500, 7_500, 5)
    }

    /// 2.5% + ₦50, funds held for 3 business days.
    pub fn gold() -> Self {
        Self::seed(StoreTier::Gold, 250, 5_000, 3)
    }

    pub fn seed_for(tier: StoreTier) -> Self {
        match tier {
            StoreTier::Standard => Self::standard(),
            StoreTier::Silver => Self::silver(),
            StoreTier::Gold => Self::gold(),
        }
    }

    /// The commission rate a store on this policy actually pays, including the unverified
    /// surcharge where it applies.
    pub fn effective_bps(&self, verification: VerificationStatus) -> i64 {
        if verification.is_verified() {
            self.percentage_fee
        } else {
            self.percentage_fee + UNVERIFIED_FEE_SURCHARGE_BPS
        }
    }

    /// Freezes this policy into the rule snapshot stored on a fund release.
    pub fn rules_for(&self, verification: VerificationStatus) -> ReleaseRules {
        ReleaseRules {
            store_tier: self.store_tier,
            verification_status: verification,
            business_days_required: self.business_days_required,
            delivery_required: self.delivery_required,
            buyer_protection_days: self.buyer_protection_days,
            require_buyer_protection: self.require_buyer_protection,
            require_dispute_checks: self.require_dispute_checks,
        }
    }
}

/// Computes the frozen settlement for a sub-order. Commission is a pure function of the item
/// value, the tier policy and the store's verification status. Shipping is passed through to the
/// store untouched, and commission can never exceed the item value itself.
pub fn compute_settlement(
    total_amount: Money,
    shipping_price: Money,
    policy: &ReleasePolicy,
    verification: VerificationStatus,
) -> Settlement {
    let bps = policy.effective_bps(verification);
    let mut commission = total_amount.apply_bps(bps) + policy.flat_fee;
    if commission > total_amount {
        commission = total_amount;
    }
    Settlement {
        amount: total_amount - commission,
        shipping_price,
        commission,
        percentage_fee: bps,
        flat_fee: policy.flat_fee,
    }
}

//--------------------------------------  WithdrawalFeePolicy   ---------------------------------------------------

/// Fee charged when a store withdraws funds to its bank account. ₦50 flat plus 1% by default.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct WithdrawalFeePolicy {
    pub flat_fee: Money,
    pub percentage_fee: i64,
}

impl Default for WithdrawalFeePolicy {
    fn default() -> Self {
        Self { flat_fee: Money::from(5_000), percentage_fee: 100 }
    }
}

impl WithdrawalFeePolicy {
    pub fn new(flat_fee: Money, percentage_fee: i64) -> Self {
        Self { flat_fee, percentage_fee }
    }

    pub fn fee_for(&self, amount: Money) -> Money {
        amount.apply_bps(self.percentage_fee) + self.flat_fee
    }

    /// What actually reaches the bank account after fees.
    pub fn net_for(&self, amount: Money) -> Money {
        amount - self.fee_for(amount)
    }
}
