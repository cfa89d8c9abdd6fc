use std::fmt::Display;

use msl_common::Money;
use serde::{Deserialize, Serialize};
use settlement_engine::db_types::{BankDetails, DeliveryStatus, DisputeKind, ReturnStatus, Role, SubOrderId};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JsonResponse {
    pub success: bool,
    pub message: String,
}

impl JsonResponse {
    pub fn success<S: Display>(message: S) -> Self {
        Self { success: true, message: message.to_string() }
    }

    pub fn failure<S: Display>(message: S) -> Self {
        Self { success: false, message: message.to_string() }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoleUpdateRequest {
    pub username: String,
    #[serde(default)]
    pub apply: Vec<Role>,
    #[serde(default)]
    pub revoke: Vec<Role>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginParams {
    pub username: String,
    pub api_key: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewAdminParams {
    pub username: String,
    pub api_key: String,
    pub roles: Vec<Role>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreRegistration {
    pub store_id: String,
    pub name: String,
}

/// Payment webhooks carry only the marketplace order id. The ledger already holds the order from
/// the order-created webhook, so everything else is redundant.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaymentWebhook {
    pub order_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreVerifiedParams {
    pub store_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryUpdateParams {
    pub sub_order_id: SubOrderId,
    pub status: DeliveryStatus,
    pub note: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConfirmDeliveryParams {
    pub sub_order_id: SubOrderId,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReturnRequestParams {
    pub sub_order_id: SubOrderId,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReturnStatusParams {
    pub status: ReturnStatus,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DisputeParams {
    pub sub_order_id: SubOrderId,
    pub kind: DisputeKind,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdjustmentParams {
    pub store_id: String,
    pub amount: Money,
    pub note: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WithdrawalRequestParams {
    pub store_id: String,
    pub amount: Money,
    pub bank_details: BankDetails,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ApproveWithdrawalParams {
    pub transaction_reference: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReasonParams {
    pub reason: String,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct LimitQuery {
    pub limit: Option<i64>,
}
