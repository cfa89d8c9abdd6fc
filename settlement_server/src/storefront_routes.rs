//! Storefront webhook handlers.
//!
//! The marketplace storefront notifies the ledger of everything that happens on the shop floor:
//! new orders, payment outcomes, delivery progress, confirmations, return requests, store
//! onboarding and seller withdrawal requests. Every call is signed with the shared HMAC secret
//! and, optionally, restricted to a whitelist of storefront IPs; both checks happen in the
//! middleware wrapping this scope before a handler runs.
//!
//! Webhook responses must always be in the 200 range, otherwise the storefront will retry the
//! delivery. Failures are reported in the response body instead.

use actix_web::{web, HttpResponse};
use log::{debug, info, warn};
use settlement_engine::{
    db_types::{ConfirmationKind, NewOrder, OrderId},
    OrderFlowApi,
    SettlementDatabase,
    SettlementError,
    WithdrawalApi,
    WithdrawalError,
    WithdrawalManagement,
};

use crate::{
    data_objects::{
        ConfirmDeliveryParams,
        DeliveryUpdateParams,
        JsonResponse,
        PaymentWebhook,
        ReturnRequestParams,
        StoreRegistration,
        StoreVerifiedParams,
        WithdrawalRequestParams,
    },
    route,
};

/// Actor recorded on ledger entries that originate from storefront webhooks rather than a
/// back-office admin.
const STOREFRONT_ACTOR: &str = "storefront";

//----------------------------------------------   Orders  ----------------------------------------------------

route!(order_created => Post "/webhook/order_created" impl SettlementDatabase);
/// Captures a new order in the ledger. The storefront retries deliveries, so an order that
/// already exists (matched on the idempotency key) is reported as a success.
pub async fn order_created<B: SettlementDatabase>(
    body: web::Json<NewOrder>,
    api: web::Data<OrderFlowApi<B>>,
) -> HttpResponse {
    let order = body.into_inner();
    info!("🛍️️ Order created webhook for {}", order.order_id);
    let result = match api.process_new_order(order.clone()).await {
        Ok((saved, true)) => {
            info!("🛍️️ Order {} captured with {} sub-orders.", saved.order_id, order.sub_orders.len());
            JsonResponse::success("Order processed successfully.")
        },
        Ok((saved, false)) => {
            info!("🛍️️ Order {} already exists.", saved.order_id);
            JsonResponse::success("Order already exists.")
        },
        Err(SettlementError::InvalidOrder(e)) => {
            warn!("🛍️️ Order {} failed validation. {e}", order.order_id);
            JsonResponse::failure(e)
        },
        Err(SettlementError::DatabaseError(e)) => {
            warn!("🛍️️ Could not capture order {}. {e}", order.order_id);
            JsonResponse::failure(e)
        },
        Err(e) => {
            warn!("🛍️️ Unexpected error while handling incoming order notification. {e}");
            JsonResponse::failure("Unexpected error handling order.")
        },
    };
    HttpResponse::Ok().json(result)
}

//----------------------------------------------   Payments  ----------------------------------------------------

route!(payment_cleared => Post "/webhook/payment_cleared" impl SettlementDatabase);
/// Marks an order paid and schedules a fund release for every sub-order. Redelivered webhooks
/// are harmless; the scheduled releases are only created once.
pub async fn payment_cleared<B: SettlementDatabase>(
    body: web::Json<PaymentWebhook>,
    api: web::Data<OrderFlowApi<B>>,
) -> HttpResponse {
    let order_id = OrderId::from(body.into_inner().order_id);
    info!("🛍️️ Payment cleared webhook for order {order_id}");
    let result = match api.process_payment_cleared(&order_id).await {
        Ok((order, releases)) => {
            info!("🛍️️ Order {} is paid. {} fund releases scheduled.", order.order_id, releases.len());
            JsonResponse::success("Payment recorded.")
        },
        Err(e) => webhook_failure("payment cleared", &order_id, e),
    };
    HttpResponse::Ok().json(result)
}

route!(payment_failed => Post "/webhook/payment_failed" impl SettlementDatabase);
pub async fn payment_failed<B: SettlementDatabase>(
    body: web::Json<PaymentWebhook>,
    api: web::Data<OrderFlowApi<B>>,
) -> HttpResponse {
    let order_id = OrderId::from(body.into_inner().order_id);
    info!("🛍️️ Payment failed webhook for order {order_id}");
    let result = match api.process_payment_failed(&order_id).await {
        Ok(order) => {
            info!("🛍️️ Order {} marked as payment-failed.", order.order_id);
            JsonResponse::success("Payment failure recorded.")
        },
        Err(e) => webhook_failure("payment failed", &order_id, e),
    };
    HttpResponse::Ok().json(result)
}

route!(payment_refunded => Post "/webhook/payment_refunded" impl SettlementDatabase);
pub async fn payment_refunded<B: SettlementDatabase>(
    body: web::Json<PaymentWebhook>,
    api: web::Data<OrderFlowApi<B>>,
) -> HttpResponse {
    let order_id = OrderId::from(body.into_inner().order_id);
    info!("🛍️️ Payment refunded webhook for order {order_id}");
    let result = match api.process_payment_refunded(&order_id).await {
        Ok(order) => {
            info!("🛍️️ Order {} marked as refunded.", order.order_id);
            JsonResponse::success("Refund recorded.")
        },
        Err(e) => webhook_failure("payment refunded", &order_id, e),
    };
    HttpResponse::Ok().json(result)
}

fn webhook_failure(webhook: &str, order_id: &OrderId, e: SettlementError) -> JsonResponse {
    match e {
        SettlementError::OrderNotFound(id) => {
            warn!("🛍️️ Received a {webhook} webhook for unknown order {id}.");
            JsonResponse::failure(format!("Order {id} does not exist."))
        },
        SettlementError::InvalidStateTransition { entity, from, to } => {
            info!("🛍️️ Ignoring {webhook} webhook for {order_id}: {entity} cannot move from {from} to {to}.");
            JsonResponse::failure(format!("{entity} cannot move from {from} to {to}."))
        },
        SettlementError::DatabaseError(e) => {
            warn!("🛍️️ Could not process {webhook} webhook for {order_id}. {e}");
            JsonResponse::failure(e)
        },
        e => {
            warn!("🛍️️ Unexpected error handling {webhook} webhook for {order_id}. {e}");
            JsonResponse::failure("Unexpected error handling payment webhook.")
        },
    }
}

//----------------------------------------------   Deliveries  ----------------------------------------------------

route!(delivery_update => Post "/webhook/delivery_update" impl SettlementDatabase);
/// Advances a sub-order along the delivery pipeline. Stale updates (a status the sub-order has
/// already passed) are reported back as failures but never retried into place.
pub async fn delivery_update<B: SettlementDatabase>(
    body: web::Json<DeliveryUpdateParams>,
    api: web::Data<OrderFlowApi<B>>,
) -> HttpResponse {
    let DeliveryUpdateParams { sub_order_id, status, note } = body.into_inner();
    info!("🛍️️ Delivery update webhook for {sub_order_id}: {status}");
    let result = match api.update_delivery_status(&sub_order_id, status, note).await {
        Ok(sub_order) => {
            debug!("🛍️️ Sub-order {} is now {}.", sub_order.sub_order_id, sub_order.delivery_status);
            JsonResponse::success(format!("Delivery status is {status}."))
        },
        Err(SettlementError::SubOrderNotFound(id)) => {
            warn!("🛍️️ Delivery update for unknown sub-order {id}.");
            JsonResponse::failure(format!("Sub-order {id} does not exist."))
        },
        Err(SettlementError::InvalidStateTransition { entity, from, to }) => {
            info!("🛍️️ Ignoring stale delivery update for {sub_order_id}: {entity} cannot move from {from} to {to}.");
            JsonResponse::failure(format!("{entity} cannot move from {from} to {to}."))
        },
        Err(e) => {
            warn!("🛍️️ Could not update delivery status for {sub_order_id}. {e}");
            JsonResponse::failure("Unexpected error handling delivery update.")
        },
    };
    HttpResponse::Ok().json(result)
}

route!(delivery_confirmed => Post "/webhook/delivery_confirmed" impl SettlementDatabase);
/// Records the buyer's confirmation of receipt. This is what starts the settlement clock for the
/// sub-order. Confirming twice is a no-op.
pub async fn delivery_confirmed<B: SettlementDatabase>(
    body: web::Json<ConfirmDeliveryParams>,
    api: web::Data<OrderFlowApi<B>>,
) -> HttpResponse {
    let ConfirmDeliveryParams { sub_order_id } = body.into_inner();
    info!("🛍️️ Delivery confirmed webhook for {sub_order_id}");
    let result = match api.confirm_delivery(&sub_order_id, ConfirmationKind::Manual).await {
        Ok((sub_order, true)) => {
            info!("🛍️️ Sub-order {} confirmed by the buyer.", sub_order.sub_order_id);
            JsonResponse::success("Delivery confirmed.")
        },
        Ok((sub_order, false)) => {
            info!("🛍️️ Sub-order {} was already confirmed.", sub_order.sub_order_id);
            JsonResponse::success("Delivery was already confirmed.")
        },
        Err(SettlementError::SubOrderNotFound(id)) => {
            warn!("🛍️️ Delivery confirmation for unknown sub-order {id}.");
            JsonResponse::failure(format!("Sub-order {id} does not exist."))
        },
        Err(e) => {
            warn!("🛍️️ Could not confirm delivery for {sub_order_id}. {e}");
            JsonResponse::failure("Unexpected error handling delivery confirmation.")
        },
    };
    HttpResponse::Ok().json(result)
}

//----------------------------------------------   Returns  ----------------------------------------------------

route!(return_requested => Post "/webhook/return_requested" impl SettlementDatabase);
/// Opens a return request against a sub-order. An active return blocks the sub-order's fund
/// release until an admin adjudicates it.
pub async fn return_requested<B: SettlementDatabase>(
    body: web::Json<ReturnRequestParams>,
    api: web::Data<OrderFlowApi<B>>,
) -> HttpResponse {
    let ReturnRequestParams { sub_order_id, reason } = body.into_inner();
    info!("🛍️️ Return requested webhook for {sub_order_id}");
    let result = match api.request_return(&sub_order_id, &reason).await {
        Ok(request) => {
            info!("🛍️️ Return {} opened against {}.", request.id, request.sub_order_id);
            JsonResponse::success(format!("Return {} opened.", request.id))
        },
        Err(SettlementError::SubOrderNotFound(id)) => {
            warn!("🛍️️ Return request for unknown sub-order {id}.");
            JsonResponse::failure(format!("Sub-order {id} does not exist."))
        },
        Err(SettlementError::ValidationError(s)) => {
            warn!("🛍️️ Invalid return request for {sub_order_id}. {s}");
            JsonResponse::failure(s)
        },
        Err(e) => {
            warn!("🛍️️ Could not open return for {sub_order_id}. {e}");
            JsonResponse::failure("Unexpected error handling return request.")
        },
    };
    HttpResponse::Ok().json(result)
}

//----------------------------------------------   Stores  ----------------------------------------------------

route!(store_created => Post "/webhook/store_created" impl SettlementDatabase);
/// Registers a store and opens its wallet. Registration is idempotent.
pub async fn store_created<B: SettlementDatabase>(
    body: web::Json<StoreRegistration>,
    api: web::Data<OrderFlowApi<B>>,
) -> HttpResponse {
    let StoreRegistration { store_id, name } = body.into_inner();
    info!("🛍️️ Store created webhook for {store_id} ({name})");
    let result = match api.register_store(&store_id, &name).await {
        Ok(store) => JsonResponse::success(format!("Store {} registered.", store.store_id)),
        Err(e) => {
            warn!("🛍️️ Could not register store {store_id}. {e}");
            JsonResponse::failure("Unexpected error registering store.")
        },
    };
    HttpResponse::Ok().json(result)
}

route!(store_verified => Post "/webhook/store_verified" impl SettlementDatabase);
/// Marks a store as KYC-verified. Verification never gates payouts; it is a reporting flag that
/// is snapshotted onto unreleased settlements.
pub async fn store_verified<B: SettlementDatabase>(
    body: web::Json<StoreVerifiedParams>,
    api: web::Data<OrderFlowApi<B>>,
) -> HttpResponse {
    let StoreVerifiedParams { store_id } = body.into_inner();
    info!("🛍️️ Store verified webhook for {store_id}");
    let result = match api.process_store_verified(&store_id).await {
        Ok(store) => JsonResponse::success(format!("Store {} is verified.", store.store_id)),
        Err(SettlementError::ValidationError(s)) => {
            warn!("🛍️️ Verification webhook rejected. {s}");
            JsonResponse::failure(s)
        },
        Err(e) => {
            warn!("🛍️️ Could not verify store {store_id}. {e}");
            JsonResponse::failure("Unexpected error verifying store.")
        },
    };
    HttpResponse::Ok().json(result)
}

//----------------------------------------------   Withdrawals  ----------------------------------------------------

route!(request_withdrawal => Post "/withdrawal" impl WithdrawalManagement);
/// Creates a withdrawal request on behalf of a seller. The requested amount is debited from the
/// store wallet immediately and held until an admin adjudicates the request. The generated
/// request reference comes back in the response body.
pub async fn request_withdrawal<B: WithdrawalManagement>(
    body: web::Json<WithdrawalRequestParams>,
    api: web::Data<WithdrawalApi<B>>,
) -> HttpResponse {
    let WithdrawalRequestParams { store_id, amount, bank_details } = body.into_inner();
    info!("🛍️️ Withdrawal request for {amount} from store {store_id}");
    let result = match api.create(&store_id, amount, bank_details, STOREFRONT_ACTOR).await {
        Ok((request, _)) => {
            info!("🛍️️ Withdrawal {} created for store {}. Net payout {}.", request.request_ref, store_id, request.net_amount);
            JsonResponse::success(request.request_ref)
        },
        Err(WithdrawalError::ValidationError(s)) => {
            warn!("🛍️️ Invalid withdrawal request from store {store_id}. {s}");
            JsonResponse::failure(s)
        },
        Err(WithdrawalError::WalletError(e)) => {
            info!("🛍️️ Withdrawal request from store {store_id} refused. {e}");
            JsonResponse::failure(e)
        },
        Err(e) => {
            warn!("🛍️️ Unexpected error handling withdrawal request from store {store_id}. {e}");
            JsonResponse::failure("Unexpected error handling withdrawal request.")
        },
    };
    HttpResponse::Ok().json(result)
}
