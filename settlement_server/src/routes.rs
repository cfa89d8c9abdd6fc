//! Request handler definitions
//!
//! Define each route and its handler here.
//! Handlers that are more than a line or two MUST go into a separate module. Keep this module neat and tidy 🙏
//!
//! A note about performance:
//! Since each worker thread processes its requests sequentially, handlers which block the current thread will cause the
//! current worker to stop processing new requests. For this reason, any long, non-cpu-bound operation (e.g. I/O,
//! database operations, etc.) should be expressed as futures or asynchronous functions. Async handlers get executed
//! concurrently by worker threads and thus don't block execution.

use actix_web::{get, web, HttpResponse, Responder};
use log::*;
use serde_json::json;
use settlement_engine::{
    db_types::{OrderId, ReleaseStatus, Role, SubOrderId},
    events::{AuditEvent, EventProducers},
    objects::{OrderQueryFilter, ReleaseQueryFilter, WithdrawalQueryFilter},
    AuthApi,
    AuthManagement,
    LedgerApi,
    LedgerManagement,
    OrderFlowApi,
    ReleaseApi,
    SettlementDatabase,
    WalletApi,
    WalletLedger,
    WithdrawalApi,
    WithdrawalManagement,
};

use crate::{
    auth::{JwtClaims, TokenIssuer},
    config::DEFAULT_SWEEP_LIMIT,
    data_objects::{
        AdjustmentParams,
        ApproveWithdrawalParams,
        DisputeParams,
        JsonResponse,
        LimitQuery,
        LoginParams,
        NewAdminParams,
        ReasonParams,
        ReturnStatusParams,
        RoleUpdateRequest,
    },
    errors::ServerError,
    helpers::publish_audit,
};

// Web-actix cannot handle generics in handlers, so it's implemented manually using the `route!` macro
#[macro_export]
macro_rules! route {
    ($name:ident => $method:ident $path:literal impl $($bounds:ty),+) => {
        paste::paste! { pub struct [<$name:camel Route>]< $( [< T $bounds:camel> ],)+ >( $( core::marker::PhantomData<fn() -> [< T $bounds:camel> ] >,)+ );}
        paste::paste! { impl< $( [< T $bounds:camel> ],)+ > [<$name:camel Route>]< $( [< T $bounds:camel> ],)+ > {
            #[allow(clippy::new_without_default)]
            pub fn new() -> Self {
                Self($( core::marker::PhantomData::<fn() -> [< T $bounds:camel> ] >,)+)
            }
        }}
        paste::paste! { impl<$( [< T $bounds:camel >] , )+> actix_web::dev::HttpServiceFactory for [<$name:camel Route>]<$([<T $bounds:camel>],)+>
        where
            $([<T $bounds:camel>]: $bounds + 'static,)+
        {
            fn register(self, config: &mut actix_web::dev::AppService) {
                let res = actix_web::Resource::new($path)
                    .name(stringify!($name))
                    .guard(actix_web::guard::$method())
                    .to($name::< $( [< T $bounds:camel >], )+>);
                actix_web::dev::HttpServiceFactory::register(res, config);
            }
        }}
    };

    ($name:ident => $method:ident $path:literal impl $($bounds:ty),+ where requires [$($roles:ty),*])  => {
        paste::paste! { pub struct [<$name:camel Route>]<A>(core::marker::PhantomData<fn() -> A>);}
        paste::paste! { impl<A> [<$name:camel Route>]<A> {
            #[allow(clippy::new_without_default)]
            pub fn new() -> Self {
                Self(core::marker::PhantomData::<fn() -> A>)
            }
        }}
        paste::paste! { impl<A> actix_web::dev::HttpServiceFactory for [<$name:camel Route>]<A>
        where
            A: $($bounds +)+ 'static,
        {
            fn register(self, config: &mut actix_web::dev::AppService) {
                let res = actix_web::Resource::new($path)
                    .name(stringify!($name))
                    .guard(actix_web::guard::$method())
                    .to($name::<A>)
                    .wrap($crate::middleware::AclMiddlewareFactory::new(&[$($roles),+]));
                actix_web::dev::HttpServiceFactory::register(res, config);
            }
        }}
    };
}

// ----------------------------------------------   Health  ----------------------------------------------------
#[get("/health")]
pub async fn health() -> impl Responder {
    trace!("💻️ Received health check request");
    HttpResponse::Ok().body("👍️\n")
}

//----------------------------------------------   Auth  ----------------------------------------------------
route!(auth => Post "/auth" impl AuthManagement);
/// Route handler for the auth endpoint
///
/// This route is used to authenticate an admin user and issue a JWT token.
///
/// Admins supply their username and API key in a JSON body. The key is checked against the stored
/// hash and, if it matches, the server issues a JWT carrying the admin's roles. The JWT is valid
/// for a relatively short period and will NOT refresh.
pub async fn auth<A>(
    body: web::Json<LoginParams>,
    api: web::Data<AuthApi<A>>,
    signer: web::Data<TokenIssuer>,
) -> Result<HttpResponse, ServerError>
where
    A: AuthManagement,
{
    let LoginParams { username, api_key } = body.into_inner();
    trace!("💻️ Received auth request from {username}");
    let roles = api.authenticate_api_key(&username, &api_key).await.map_err(|e| {
        debug!("💻️ Could not authenticate {username}. {e}");
        ServerError::from(e)
    })?;
    let access_token = signer.issue_token(&username, roles, None)?;
    trace!("💻️ Issued access token for {username}");
    Ok(HttpResponse::Ok().content_type("application/json").body(access_token))
}

//----------------------------------------------  Check Token  ----------------------------------------------------
#[get("/check_token")]
pub async fn check_token(claims: JwtClaims) -> Result<HttpResponse, ServerError> {
    debug!("💻️ GET check_token for {}", claims.sub);
    Ok(HttpResponse::Ok().body("Token is valid."))
}

//----------------------------------------------   Wallets  ----------------------------------------------------

route!(wallet_balance => Get "/wallet/{store_id}/balance" impl WalletLedger where requires [Role::ReadOnly]);
pub async fn wallet_balance<B: WalletLedger>(
    path: web::Path<String>,
    api: web::Data<WalletApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let store_id = path.into_inner();
    debug!("💻️ GET wallet balance for {store_id}");
    let wallet = api
        .balance(&store_id)
        .await?
        .ok_or_else(|| ServerError::NoRecordFound(format!("No wallet exists for store {store_id}")))?;
    Ok(HttpResponse::Ok().json(wallet))
}

route!(wallet_history => Get "/wallet/{store_id}/history" impl WalletLedger where requires [Role::ReadOnly]);
/// The full transaction ledger for a store wallet, oldest entry first.
pub async fn wallet_history<B: WalletLedger>(
    path: web::Path<String>,
    api: web::Data<WalletApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let store_id = path.into_inner();
    debug!("💻️ GET wallet history for {store_id}");
    let history = api.history(&store_id).await?;
    Ok(HttpResponse::Ok().json(history))
}

route!(wallet_reconcile => Get "/wallet/{store_id}/reconcile" impl WalletLedger where requires [Role::ReadOnly]);
/// Replays the wallet's ledger and compares it with the stored balance. Useful when
/// troubleshooting a balance a store disputes.
pub async fn wallet_reconcile<B: WalletLedger>(
    path: web::Path<String>,
    api: web::Data<WalletApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let store_id = path.into_inner();
    debug!("💻️ GET wallet reconciliation for {store_id}");
    let reconciliation = api.reconcile(&store_id).await?;
    Ok(HttpResponse::Ok().json(reconciliation))
}

route!(credit_wallet => Post "/wallet/credit" impl WalletLedger where requires [Role::Write]);
/// Credits a store wallet outside the normal settlement flows. A note explaining the adjustment
/// is mandatory and lands in the ledger entry.
pub async fn credit_wallet<B: WalletLedger>(
    claims: JwtClaims,
    body: web::Json<AdjustmentParams>,
    api: web::Data<WalletApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let AdjustmentParams { store_id, amount, note } = body.into_inner();
    info!("💻️ Manual credit of {amount} to store {store_id} requested by {}", claims.sub);
    let (wallet, transaction) = api.credit_adjustment(&store_id, amount, &note, &claims.sub).await?;
    Ok(HttpResponse::Ok().json(json!({ "wallet": wallet, "transaction": transaction })))
}

route!(debit_wallet => Post "/wallet/debit" impl WalletLedger where requires [Role::Write]);
/// Debits a store wallet outside the normal settlement flows, subject to the overdraft guard.
pub async fn debit_wallet<B: WalletLedger>(
    claims: JwtClaims,
    body: web::Json<AdjustmentParams>,
    api: web::Data<WalletApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let AdjustmentParams { store_id, amount, note } = body.into_inner();
    info!("💻️ Manual debit of {amount} from store {store_id} requested by {}", claims.sub);
    let (wallet, transaction) = api.debit_adjustment(&store_id, amount, &note, &claims.sub).await?;
    Ok(HttpResponse::Ok().json(json!({ "wallet": wallet, "transaction": transaction })))
}

//----------------------------------------------   Orders  ----------------------------------------------------

route!(order_by_id => Get "/order/{order_id}" impl LedgerManagement where requires [Role::ReadOnly]);
pub async fn order_by_id<B: LedgerManagement>(
    path: web::Path<OrderId>,
    api: web::Data<LedgerApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let order_id = path.into_inner();
    debug!("💻️ GET order_by_id({order_id})");
    let order = api
        .fetch_order(&order_id)
        .await?
        .ok_or_else(|| ServerError::NoRecordFound(format!("No order with id {order_id}")))?;
    Ok(HttpResponse::Ok().json(order))
}

route!(full_order => Get "/order/{order_id}/full" impl LedgerManagement where requires [Role::ReadOnly]);
/// An order with all of its sub-orders hydrated: line items, status history, releases, returns
/// and disputes. This is the one-stop view for support queries.
pub async fn full_order<B: LedgerManagement>(
    path: web::Path<OrderId>,
    api: web::Data<LedgerApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let order_id = path.into_inner();
    debug!("💻️ GET full order for {order_id}");
    let order = api
        .fetch_full_order(&order_id)
        .await?
        .ok_or_else(|| ServerError::NoRecordFound(format!("No order with id {order_id}")))?;
    Ok(HttpResponse::Ok().json(order))
}

route!(orders_search => Get "/search/orders" impl LedgerManagement where requires [Role::ReadOnly]);
pub async fn orders_search<B: LedgerManagement>(
    query: web::Query<OrderQueryFilter>,
    api: web::Data<LedgerApi<B>>,
) -> Result<HttpResponse, ServerError> {
    debug!("💻️ GET orders search for [{query}]");
    let query = query.into_inner();
    let orders = api.search_orders(query).await?;
    Ok(HttpResponse::Ok().json(orders))
}

route!(sub_order => Get "/suborder/{sub_order_id}" impl LedgerManagement where requires [Role::ReadOnly]);
pub async fn sub_order<B: LedgerManagement>(
    path: web::Path<SubOrderId>,
    api: web::Data<LedgerApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let sub_order_id = path.into_inner();
    debug!("💻️ GET sub-order {sub_order_id}");
    let sub_order = api
        .fetch_sub_order(&sub_order_id)
        .await?
        .ok_or_else(|| ServerError::NoRecordFound(format!("No sub-order with id {sub_order_id}")))?;
    Ok(HttpResponse::Ok().json(sub_order))
}

route!(sub_order_history => Get "/suborder/{sub_order_id}/history" impl LedgerManagement where requires [Role::ReadOnly]);
/// The append-only status trail for a sub-order, oldest entry first.
pub async fn sub_order_history<B: LedgerManagement>(
    path: web::Path<SubOrderId>,
    api: web::Data<LedgerApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let sub_order_id = path.into_inner();
    debug!("💻️ GET sub-order history for {sub_order_id}");
    let history = api.sub_order_history(&sub_order_id).await?;
    Ok(HttpResponse::Ok().json(history))
}

route!(store => Get "/store/{store_id}" impl LedgerManagement where requires [Role::ReadOnly]);
pub async fn store<B: LedgerManagement>(
    path: web::Path<String>,
    api: web::Data<LedgerApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let store_id = path.into_inner();
    debug!("💻️ GET store {store_id}");
    let store = api
        .fetch_store(&store_id)
        .await?
        .ok_or_else(|| ServerError::NoRecordFound(format!("No store with id {store_id}")))?;
    Ok(HttpResponse::Ok().json(store))
}

//----------------------------------------------   Releases  ----------------------------------------------------

route!(release_status => Get "/release/{sub_order_id}" impl SettlementDatabase where requires [Role::ReadOnly]);
/// Route handler for the release status endpoint
///
/// Reading a release's status re-evaluates its conditions against the clock first, so a pending
/// release whose settlement date has arrived flips to `Ready` on this read instead of waiting for
/// the next scheduled sweep. The response reports the release record and whether this particular
/// read performed the flip.
pub async fn release_status<B: SettlementDatabase>(
    path: web::Path<SubOrderId>,
    api: web::Data<ReleaseApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let sub_order_id = path.into_inner();
    debug!("💻️ GET release status for {sub_order_id}");
    let outcome = api.evaluate(&sub_order_id).await.map_err(|e| {
        debug!("💻️ Could not evaluate release for {sub_order_id}. {e}");
        e
    })?;
    Ok(HttpResponse::Ok().json(outcome))
}

route!(ready_releases => Get "/releases/ready" impl SettlementDatabase where requires [Role::ReadOnly]);
/// All releases that are ready for payout, due-date order. Pagination is supported via the
/// `limit` query parameter.
pub async fn ready_releases<B: SettlementDatabase>(
    query: web::Query<LimitQuery>,
    api: web::Data<ReleaseApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let limit = query.limit.unwrap_or(DEFAULT_SWEEP_LIMIT);
    debug!("💻️ GET ready releases (limit {limit})");
    let releases = api.ready_for_payout(limit).await?;
    Ok(HttpResponse::Ok().json(releases))
}

route!(releases_search => Get "/search/releases" impl SettlementDatabase where requires [Role::ReadOnly]);
pub async fn releases_search<B: SettlementDatabase>(
    query: web::Query<ReleaseQueryFilter>,
    api: web::Data<ReleaseApi<B>>,
) -> Result<HttpResponse, ServerError> {
    debug!("💻️ GET releases search for [{query}]");
    let query = query.into_inner();
    let releases = api.search(query).await?;
    Ok(HttpResponse::Ok().json(releases))
}

route!(release_funds => Post "/release/{sub_order_id}" impl SettlementDatabase where requires [Role::Write]);
/// Pays a ready release out to the store wallet. Repeating the call reports the original payout
/// instead of crediting twice.
pub async fn release_funds<B: SettlementDatabase>(
    claims: JwtClaims,
    path: web::Path<SubOrderId>,
    api: web::Data<ReleaseApi<B>>,
    producers: web::Data<EventProducers>,
) -> Result<HttpResponse, ServerError> {
    let sub_order_id = path.into_inner();
    info!("💻️ Release funds request for {sub_order_id} by {}", claims.sub);
    let outcome = api.release(&sub_order_id, &claims.sub).await.map_err(|e| {
        debug!("💻️ Could not release funds for {sub_order_id}. {e}");
        e
    })?;
    let before = if outcome.is_new() { ReleaseStatus::Ready } else { ReleaseStatus::Released };
    let audit = AuditEvent::new(
        &claims.sub,
        "release_funds",
        format!("release:{sub_order_id}"),
        Some(before.to_string()),
        outcome.release().status.to_string(),
    );
    publish_audit(&producers, audit).await;
    Ok(HttpResponse::Ok().json(outcome))
}

route!(force_release => Post "/release/{sub_order_id}/force" impl SettlementDatabase where requires [Role::SuperAdmin]);
/// Releases funds for a sub-order even though its conditions are not met. The release is marked
/// as forced and the actor is recorded.
pub async fn force_release<B: SettlementDatabase>(
    claims: JwtClaims,
    path: web::Path<SubOrderId>,
    api: web::Data<ReleaseApi<B>>,
    producers: web::Data<EventProducers>,
) -> Result<HttpResponse, ServerError> {
    let sub_order_id = path.into_inner();
    info!("💻️ FORCED release request for {sub_order_id} by {}", claims.sub);
    let before = api.fetch(&sub_order_id).await.ok().flatten().map(|r| r.status.to_string());
    let outcome = api.force_release(&sub_order_id, &claims.sub).await.map_err(|e| {
        debug!("💻️ Could not force release for {sub_order_id}. {e}");
        e
    })?;
    let audit = AuditEvent::new(
        &claims.sub,
        "force_release",
        format!("release:{sub_order_id}"),
        before,
        outcome.release().status.to_string(),
    );
    publish_audit(&producers, audit).await;
    Ok(HttpResponse::Ok().json(outcome))
}

route!(fail_release => Post "/release/{sub_order_id}/fail" impl SettlementDatabase where requires [Role::Write]);
pub async fn fail_release<B: SettlementDatabase>(
    claims: JwtClaims,
    path: web::Path<SubOrderId>,
    body: web::Json<ReasonParams>,
    api: web::Data<ReleaseApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let sub_order_id = path.into_inner();
    let ReasonParams { reason } = body.into_inner();
    info!("💻️ Mark release failed for {sub_order_id} by {}. Reason: {reason}", claims.sub);
    let release = api.fail(&sub_order_id, &reason).await?;
    Ok(HttpResponse::Ok().json(release))
}

route!(retry_release => Post "/release/{sub_order_id}/retry" impl SettlementDatabase where requires [Role::Write]);
pub async fn retry_release<B: SettlementDatabase>(
    claims: JwtClaims,
    path: web::Path<SubOrderId>,
    api: web::Data<ReleaseApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let sub_order_id = path.into_inner();
    info!("💻️ Retry release for {sub_order_id} by {}", claims.sub);
    let release = api.retry(&sub_order_id).await?;
    Ok(HttpResponse::Ok().json(release))
}

route!(reverse_release => Post "/release/{sub_order_id}/reverse" impl SettlementDatabase where requires [Role::SuperAdmin]);
/// Claws a released payout back out of the store wallet. A reason is mandatory and a reversal
/// event fires so downstream systems can react.
pub async fn reverse_release<B: SettlementDatabase>(
    claims: JwtClaims,
    path: web::Path<SubOrderId>,
    body: web::Json<ReasonParams>,
    api: web::Data<ReleaseApi<B>>,
    producers: web::Data<EventProducers>,
) -> Result<HttpResponse, ServerError> {
    let sub_order_id = path.into_inner();
    let ReasonParams { reason } = body.into_inner();
    info!("💻️ Reverse release request for {sub_order_id} by {}. Reason: {reason}", claims.sub);
    let (release, transaction) = api.reverse(&sub_order_id, &reason, &claims.sub).await.map_err(|e| {
        debug!("💻️ Could not reverse release for {sub_order_id}. {e}");
        e
    })?;
    let audit = AuditEvent::new(
        &claims.sub,
        "reverse_release",
        format!("release:{sub_order_id}"),
        Some(ReleaseStatus::Released.to_string()),
        release.status.to_string(),
    );
    publish_audit(&producers, audit).await;
    Ok(HttpResponse::Ok().json(json!({ "release": release, "transaction": transaction })))
}

route!(run_sweep => Post "/sweep" impl SettlementDatabase where requires [Role::Write]);
/// Triggers a settlement sweep immediately instead of waiting for the scheduled one.
pub async fn run_sweep<B: SettlementDatabase>(
    claims: JwtClaims,
    query: web::Query<LimitQuery>,
    api: web::Data<ReleaseApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let limit = query.limit.unwrap_or(DEFAULT_SWEEP_LIMIT);
    info!("💻️ Manual settlement sweep triggered by {} (limit {limit})", claims.sub);
    let summary = api.run_scheduled_sweep(limit).await?;
    info!("💻️ Sweep complete. {summary}");
    Ok(HttpResponse::Ok().json(summary))
}

//----------------------------------------   Returns and disputes  ----------------------------------------------

route!(update_return => Post "/return/{return_id}/status" impl SettlementDatabase where requires [Role::Write]);
/// Advances a return through its lifecycle. Moving it to `Refunded` settles up with the store:
/// a released payout is debited back, an unreleased one is cancelled.
pub async fn update_return<B: SettlementDatabase>(
    claims: JwtClaims,
    path: web::Path<i64>,
    body: web::Json<ReturnStatusParams>,
    api: web::Data<OrderFlowApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let return_id = path.into_inner();
    let ReturnStatusParams { status } = body.into_inner();
    info!("💻️ Update return {return_id} to {status} by {}", claims.sub);
    let update = api.update_return_status(return_id, status).await.map_err(|e| {
        debug!("💻️ Could not update return {return_id}. {e}");
        e
    })?;
    Ok(HttpResponse::Ok().json(update))
}

route!(open_dispute => Post "/dispute" impl SettlementDatabase where requires [Role::Write]);
/// Opens a dispute or chargeback against a sub-order. An open dispute blocks the sub-order's
/// release until it is resolved.
pub async fn open_dispute<B: SettlementDatabase>(
    claims: JwtClaims,
    body: web::Json<DisputeParams>,
    api: web::Data<OrderFlowApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let DisputeParams { sub_order_id, kind, reason } = body.into_inner();
    info!("💻️ Open {kind} against {sub_order_id} by {}. Reason: {reason}", claims.sub);
    let dispute = api.open_dispute(&sub_order_id, kind, &reason).await?;
    Ok(HttpResponse::Ok().json(dispute))
}

route!(resolve_dispute => Post "/dispute/{dispute_id}/resolve" impl SettlementDatabase where requires [Role::Write]);
pub async fn resolve_dispute<B: SettlementDatabase>(
    claims: JwtClaims,
    path: web::Path<i64>,
    api: web::Data<OrderFlowApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let dispute_id = path.into_inner();
    info!("💻️ Resolve dispute {dispute_id} by {}", claims.sub);
    let dispute = api.resolve_dispute(dispute_id).await?;
    Ok(HttpResponse::Ok().json(dispute))
}

//----------------------------------------------   Withdrawals  ----------------------------------------------------

route!(withdrawal => Get "/withdrawal/{request_ref}" impl LedgerManagement where requires [Role::ReadOnly]);
pub async fn withdrawal<B: LedgerManagement>(
    path: web::Path<String>,
    api: web::Data<LedgerApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let request_ref = path.into_inner();
    debug!("💻️ GET withdrawal {request_ref}");
    let request = api
        .fetch_withdrawal(&request_ref)
        .await?
        .ok_or_else(|| ServerError::NoRecordFound(format!("No withdrawal request {request_ref}")))?;
    Ok(HttpResponse::Ok().json(request))
}

route!(withdrawal_audit => Get "/withdrawal/{request_ref}/history" impl LedgerManagement where requires [Role::ReadOnly]);
/// The append-only adjudication trail for a withdrawal request, oldest entry first.
pub async fn withdrawal_audit<B: LedgerManagement>(
    path: web::Path<String>,
    api: web::Data<LedgerApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let request_ref = path.into_inner();
    debug!("💻️ GET withdrawal history for {request_ref}");
    let request = api
        .fetch_withdrawal(&request_ref)
        .await?
        .ok_or_else(|| ServerError::NoRecordFound(format!("No withdrawal request {request_ref}")))?;
    let history = api.withdrawal_history(request.id).await?;
    Ok(HttpResponse::Ok().json(history))
}

route!(withdrawals_search => Get "/search/withdrawals" impl LedgerManagement where requires [Role::ReadOnly]);
pub async fn withdrawals_search<B: LedgerManagement>(
    query: web::Query<WithdrawalQueryFilter>,
    api: web::Data<LedgerApi<B>>,
) -> Result<HttpResponse, ServerError> {
    debug!("💻️ GET withdrawals search for [{query}]");
    let query = query.into_inner();
    let withdrawals = api.search_withdrawals(query).await?;
    Ok(HttpResponse::Ok().json(withdrawals))
}

route!(review_withdrawal => Post "/withdrawal/{request_ref}/review" impl WithdrawalManagement where requires [Role::Write]);
pub async fn review_withdrawal<B: WithdrawalManagement>(
    claims: JwtClaims,
    path: web::Path<String>,
    api: web::Data<WithdrawalApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let request_ref = path.into_inner();
    info!("💻️ Start review of withdrawal {request_ref} by {}", claims.sub);
    let request = api.start_review(&request_ref, &claims.sub).await?;
    Ok(HttpResponse::Ok().json(request))
}

route!(approve_withdrawal => Post "/withdrawal/{request_ref}/approve" impl WithdrawalManagement, LedgerManagement where requires [Role::Write]);
/// Approves a withdrawal for payout. The bank transaction reference under which the transfer
/// will be made is mandatory and is recorded on the request.
pub async fn approve_withdrawal<B: WithdrawalManagement + LedgerManagement>(
    claims: JwtClaims,
    path: web::Path<String>,
    body: web::Json<ApproveWithdrawalParams>,
    api: web::Data<WithdrawalApi<B>>,
    ledger: web::Data<LedgerApi<B>>,
    producers: web::Data<EventProducers>,
) -> Result<HttpResponse, ServerError> {
    let request_ref = path.into_inner();
    let ApproveWithdrawalParams { transaction_reference } = body.into_inner();
    info!("💻️ Approve withdrawal {request_ref} by {} under {transaction_reference}", claims.sub);
    let before = ledger.fetch_withdrawal(&request_ref).await.ok().flatten().map(|r| r.status.to_string());
    let request = api.approve(&request_ref, &transaction_reference, &claims.sub).await.map_err(|e| {
        debug!("💻️ Could not approve withdrawal {request_ref}. {e}");
        e
    })?;
    let audit = AuditEvent::new(
        &claims.sub,
        "approve_withdrawal",
        format!("withdrawal:{request_ref}"),
        before,
        request.status.to_string(),
    );
    publish_audit(&producers, audit).await;
    Ok(HttpResponse::Ok().json(request))
}

route!(process_withdrawal => Post "/withdrawal/{request_ref}/processing" impl WithdrawalManagement where requires [Role::Write]);
pub async fn process_withdrawal<B: WithdrawalManagement>(
    claims: JwtClaims,
    path: web::Path<String>,
    api: web::Data<WithdrawalApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let request_ref = path.into_inner();
    info!("💻️ Begin processing withdrawal {request_ref} by {}", claims.sub);
    let request = api.begin_processing(&request_ref, &claims.sub).await?;
    Ok(HttpResponse::Ok().json(request))
}

route!(complete_withdrawal => Post "/withdrawal/{request_ref}/complete" impl WithdrawalManagement where requires [Role::Write]);
pub async fn complete_withdrawal<B: WithdrawalManagement>(
    claims: JwtClaims,
    path: web::Path<String>,
    api: web::Data<WithdrawalApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let request_ref = path.into_inner();
    info!("💻️ Complete withdrawal {request_ref} by {}", claims.sub);
    let request = api.complete(&request_ref, &claims.sub).await?;
    Ok(HttpResponse::Ok().json(request))
}

route!(fail_withdrawal => Post "/withdrawal/{request_ref}/fail" impl WithdrawalManagement where requires [Role::Write]);
/// Records a failed bank transfer. The held funds stay on the request so the payout can be
/// retried; only a rejection refunds the wallet.
pub async fn fail_withdrawal<B: WithdrawalManagement>(
    claims: JwtClaims,
    path: web::Path<String>,
    body: web::Json<ReasonParams>,
    api: web::Data<WithdrawalApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let request_ref = path.into_inner();
    let ReasonParams { reason } = body.into_inner();
    info!("💻️ Mark withdrawal {request_ref} failed by {}. Reason: {reason}", claims.sub);
    let request = api.fail(&request_ref, &reason, &claims.sub).await?;
    Ok(HttpResponse::Ok().json(request))
}

route!(retry_withdrawal => Post "/withdrawal/{request_ref}/retry" impl WithdrawalManagement where requires [Role::Write]);
pub async fn retry_withdrawal<B: WithdrawalManagement>(
    claims: JwtClaims,
    path: web::Path<String>,
    api: web::Data<WithdrawalApi<B>>,
) -> Result<HttpResponse, ServerError> {
    let request_ref = path.into_inner();
    info!("💻️ Retry withdrawal {request_ref} by {}", claims.sub);
    let request = api.retry(&request_ref, &claims.sub).await?;
    Ok(HttpResponse::Ok().json(request))
}

route!(reject_withdrawal => Post "/withdrawal/{request_ref}/reject" impl WithdrawalManagement, LedgerManagement where requires [Role::Write]);
/// Rejects a withdrawal request with a mandatory reason, returning the held amount to the store
/// wallet.
pub async fn reject_withdrawal<B: WithdrawalManagement + LedgerManagement>(
    claims: JwtClaims,
    path: web::Path<String>,
    body: web::Json<ReasonParams>,
    api: web::Data<WithdrawalApi<B>>,
    ledger: web::Data<LedgerApi<B>>,
    producers: web::Data<EventProducers>,
) -> Result<HttpResponse, ServerError> {
    let request_ref = path.into_inner();
    let ReasonParams { reason } = body.into_inner();
    info!("💻️ Reject withdrawal {request_ref} by {}. Reason: {reason}", claims.sub);
    let before = ledger.fetch_withdrawal(&request_ref).await.ok().flatten().map(|r| r.status.to_string());
    let (request, transaction) = api.reject(&request_ref, &reason, &claims.sub).await.map_err(|e| {
        debug!("💻️ Could not reject withdrawal {request_ref}. {e}");
        e
    })?;
    let audit = AuditEvent::new(
        &claims.sub,
        "reject_withdrawal",
        format!("withdrawal:{request_ref}"),
        before,
        request.status.to_string(),
    );
    publish_audit(&producers, audit).await;
    Ok(HttpResponse::Ok().json(json!({ "request": request, "refund": transaction })))
}

//----------------------------------------------   SuperAdmin  ----------------------------------------------------

route!(update_roles => Post "/roles" impl AuthManagement where requires [Role::SuperAdmin]);
pub async fn update_roles<B: AuthManagement>(
    api: web::Data<AuthApi<B>>,
    body: web::Json<Vec<RoleUpdateRequest>>,
) -> Result<HttpResponse, ServerError> {
    for acl_request in body.into_inner() {
        let RoleUpdateRequest { username, apply, revoke } = acl_request;
        debug!("💻️ POST update roles for {username}");
        api.assign_roles(&username, &apply).await?;
        api.revoke_roles(&username, &revoke).await?;
    }
    Ok(HttpResponse::Ok().finish())
}

route!(create_admin => Post "/admins" impl AuthManagement where requires [Role::SuperAdmin]);
/// Creates a new admin user with the given roles. The API key is hashed before storage; only
/// the id and username come back.
pub async fn create_admin<B: AuthManagement>(
    api: web::Data<AuthApi<B>>,
    body: web::Json<NewAdminParams>,
) -> Result<HttpResponse, ServerError> {
    let NewAdminParams { username, api_key, roles } = body.into_inner();
    info!("💻️ POST create admin user {username}");
    let admin = api.create_admin_user(&username, &api_key, &roles).await.map_err(|e| {
        debug!("💻️ Could not create admin user {username}. {e}");
        e
    })?;
    Ok(HttpResponse::Ok().json(JsonResponse::success(format!("Admin user {} created with id {}", admin.username, admin.id))))
}
