use std::time::Duration;

use actix_web::{
    dev::{Server, Service},
    http::KeepAlive,
    middleware::Logger,
    web,
    App,
    HttpServer,
};
use futures::{future::ok, FutureExt};
use log::*;
use settlement_engine::{
    db_types::Role,
    events::{EventHandlers, EventHooks, EventProducers},
    AuthApi,
    LedgerApi,
    OrderFlowApi,
    ReleaseApi,
    SqliteDatabase,
    WalletApi,
    WithdrawalApi,
};

use crate::{
    auth::TokenIssuer,
    config::{BootstrapAdmin, ServerConfig},
    errors::{AuthError, ServerError, ServerError::AuthenticationError},
    helpers::get_remote_ip,
    middleware::{HmacMiddlewareFactory, JwtMiddlewareFactory},
    routes::{
        check_token,
        health,
        ApproveWithdrawalRoute,
        AuthRoute,
        CompleteWithdrawalRoute,
        CreateAdminRoute,
        CreditWalletRoute,
        DebitWalletRoute,
        FailReleaseRoute,
        FailWithdrawalRoute,
        ForceReleaseRoute,
        FullOrderRoute,
        OpenDisputeRoute,
        OrderByIdRoute,
        OrdersSearchRoute,
        ProcessWithdrawalRoute,
        ReadyReleasesRoute,
        RejectWithdrawalRoute,
        ReleaseFundsRoute,
        ReleaseStatusRoute,
        ReleasesSearchRoute,
        ResolveDisputeRoute,
        RetryReleaseRoute,
        RetryWithdrawalRoute,
        ReverseReleaseRoute,
        ReviewWithdrawalRoute,
        RunSweepRoute,
        StoreRoute,
        SubOrderHistoryRoute,
        SubOrderRoute,
        UpdateReturnRoute,
        UpdateRolesRoute,
        WalletBalanceRoute,
        WalletHistoryRoute,
        WalletReconcileRoute,
        WithdrawalAuditRoute,
        WithdrawalRoute,
        WithdrawalsSearchRoute,
    },
    storefront_routes::{
        DeliveryConfirmedRoute,
        DeliveryUpdateRoute,
        OrderCreatedRoute,
        PaymentClearedRoute,
        PaymentFailedRoute,
        PaymentRefundedRoute,
        RequestWithdrawalRoute,
        ReturnRequestedRoute,
        StoreCreatedRoute,
        StoreVerifiedRoute,
    },
    sweeper::start_sweeper,
};

/// Header carrying the base64-encoded HMAC-SHA256 signature of a storefront webhook body.
pub const HMAC_HEADER: &str = "x-msl-hmac-sha256";

const EVENT_BUFFER_SIZE: usize = 25;

pub async fn run_server(config: ServerConfig) -> Result<(), ServerError> {
    let db = SqliteDatabase::new_with_url(&config.database_url, 25)
        .await
        .map_err(|e| ServerError::InitializeError(e.to_string()))?;
    if let Some(admin) = &config.bootstrap_admin {
        seed_bootstrap_admin(&db, admin).await;
    }
    let producers = start_event_log_handlers().await;
    start_sweeper(db.clone(), producers.clone(), config.sweeper);
    let srv = create_server_instance(config, db, producers)?;
    srv.await.map_err(|e| ServerError::Unspecified(e.to_string()))
}

/// Creates the configured bootstrap admin, but only on a database that has no admin accounts at
/// all. Seeding problems are logged and the server starts anyway; an operator can still create
/// accounts through the API once an admin exists by other means.
async fn seed_bootstrap_admin(db: &SqliteDatabase, admin: &BootstrapAdmin) {
    let api = AuthApi::new(db.clone());
    match api.admin_user_count().await {
        Ok(0) => {
            let roles = [Role::ReadOnly, Role::Write, Role::SuperAdmin];
            match api.create_admin_user(&admin.username, admin.api_key.reveal(), &roles).await {
                Ok(user) => info!("🔑️ Bootstrap admin {} created with full roles.", user.username),
                Err(e) => error!("🔑️ Could not create the bootstrap admin. {e}"),
            }
        },
        Ok(_) => debug!("🔑️ Admin accounts already exist. The bootstrap admin was not touched."),
        Err(e) => error!("🔑️ Could not count admin accounts. {e}"),
    }
}

/// Subscribes logging handlers to every settlement event and starts them, so that each notable
/// money movement leaves a line in the log even when no external integration is listening. Admin
/// actions additionally land as JSON lines under the `audit` log target.
async fn start_event_log_handlers() -> EventProducers {
    let mut hooks = EventHooks::default();
    hooks.on_order_paid(|ev| {
        Box::pin(async move {
            info!(
                "🪝️ Order {} paid in full. {} fund release(s) scheduled.",
                ev.order.order_id,
                ev.releases.len()
            );
        })
    });
    hooks.on_funds_released(|ev| {
        Box::pin(async move {
            info!(
                "🪝️ Released {} to store {} for sub-order {}.",
                ev.transaction.amount, ev.release.store_id, ev.release.sub_order_id
            );
        })
    });
    hooks.on_release_reversed(|ev| {
        Box::pin(async move {
            info!(
                "🪝️ Reversed release for sub-order {}. {} clawed back from store {}.",
                ev.release.sub_order_id, ev.transaction.amount, ev.release.store_id
            );
        })
    });
    hooks.on_withdrawal_approved(|ev| {
        Box::pin(async move {
            info!(
                "🪝️ Withdrawal {} for store {} approved. {} is on its way to the bank.",
                ev.request.request_ref, ev.request.store_id, ev.request.net_amount
            );
        })
    });
    hooks.on_withdrawal_rejected(|ev| {
        Box::pin(async move {
            info!("🪝️ Withdrawal {} was rejected. Reason: {}", ev.request.request_ref, ev.reason);
        })
    });
    hooks.on_audit(|ev| {
        Box::pin(async move {
            match serde_json::to_string(&ev) {
                Ok(line) => info!(target: "audit", "{line}"),
                Err(e) => warn!("🪝️ An audit event could not be serialized: {e}"),
            }
        })
    });
    let handlers = EventHandlers::new(EVENT_BUFFER_SIZE, hooks);
    let producers = handlers.producers();
    handlers.start_handlers().await;
    producers
}

pub fn create_server_instance(
    config: ServerConfig,
    db: SqliteDatabase,
    producers: EventProducers,
) -> Result<Server, ServerError> {
    let srv = HttpServer::new(move || {
        let order_flow_api = OrderFlowApi::new(db.clone(), producers.clone());
        let release_api = ReleaseApi::new(db.clone(), producers.clone());
        let withdrawal_api = WithdrawalApi::new(db.clone(), producers.clone());
        let wallet_api = WalletApi::new(db.clone());
        let ledger_api = LedgerApi::new(db.clone());
        let auth_api = AuthApi::new(db.clone());
        let jwt_signer = TokenIssuer::new(&config.auth);
        let app = App::new()
            .wrap(Logger::new("%t (%D ms) %s %a %{Host}i %U").log_target("msl::access_log"))
            .app_data(web::Data::new(order_flow_api))
            .app_data(web::Data::new(release_api))
            .app_data(web::Data::new(withdrawal_api))
            .app_data(web::Data::new(wallet_api))
            .app_data(web::Data::new(ledger_api))
            .app_data(web::Data::new(auth_api))
            .app_data(web::Data::new(jwt_signer.clone()))
            .app_data(web::Data::new(producers.clone()));
        // Routes that require authentication
        let auth_scope = web::scope("/api")
            .wrap(JwtMiddlewareFactory::new(jwt_signer))
            .service(check_token)
            .service(UpdateRolesRoute::<SqliteDatabase>::new())
            .service(CreateAdminRoute::<SqliteDatabase>::new())
            .service(WalletBalanceRoute::<SqliteDatabase>::new())
            .service(WalletHistoryRoute::<SqliteDatabase>::new())
            .service(WalletReconcileRoute::<SqliteDatabase>::new())
            .service(CreditWalletRoute::<SqliteDatabase>::new())
            .service(DebitWalletRoute::<SqliteDatabase>::new())
            .service(OrderByIdRoute::<SqliteDatabase>::new())
            .service(FullOrderRoute::<SqliteDatabase>::new())
            .service(OrdersSearchRoute::<SqliteDatabase>::new())
            .service(SubOrderRoute::<SqliteDatabase>::new())
            .service(SubOrderHistoryRoute::<SqliteDatabase>::new())
            .service(StoreRoute::<SqliteDatabase>::new())
            .service(ReleaseStatusRoute::<SqliteDatabase>::new())
            .service(ReadyReleasesRoute::<SqliteDatabase>::new())
            .service(ReleasesSearchRoute::<SqliteDatabase>::new())
            .service(ReleaseFundsRoute::<SqliteDatabase>::new())
            .service(ForceReleaseRoute::<SqliteDatabase>::new())
            .service(FailReleaseRoute::<SqliteDatabase>::new())
            .service(RetryReleaseRoute::<SqliteDatabase>::new())
            .service(ReverseReleaseRoute::<SqliteDatabase>::new())
            .service(RunSweepRoute::<SqliteDatabase>::new())
            .service(UpdateReturnRoute::<SqliteDatabase>::new())
            .service(OpenDisputeRoute::<SqliteDatabase>::new())
            .service(ResolveDisputeRoute::<SqliteDatabase>::new())
            .service(WithdrawalRoute::<SqliteDatabase>::new())
            .service(WithdrawalAuditRoute::<SqliteDatabase>::new())
            .service(WithdrawalsSearchRoute::<SqliteDatabase>::new())
            .service(ReviewWithdrawalRoute::<SqliteDatabase>::new())
            .service(ApproveWithdrawalRoute::<SqliteDatabase>::new())
            .service(ProcessWithdrawalRoute::<SqliteDatabase>::new())
            .service(CompleteWithdrawalRoute::<SqliteDatabase>::new())
            .service(FailWithdrawalRoute::<SqliteDatabase>::new())
            .service(RetryWithdrawalRoute::<SqliteDatabase>::new())
            .service(RejectWithdrawalRoute::<SqliteDatabase>::new());
        let use_x_forwarded_for = config.use_x_forwarded_for;
        let use_forwarded = config.use_forwarded;
        let storefront_whitelist = config.storefront.whitelist.clone();
        let storefront_scope = web::scope("/storefront")
            .wrap(HmacMiddlewareFactory::new(
                HMAC_HEADER,
                config.storefront.hmac_secret.clone(),
                config.storefront.hmac_checks,
            ))
            .wrap_fn(move |req, srv| {
                let peer_ip = get_remote_ip(req.request(), use_x_forwarded_for, use_forwarded);
                let whitelisted = match (peer_ip, &storefront_whitelist) {
                    (Some(ip), Some(whitelist)) => {
                        info!("Storefront webhook from {ip}");
                        whitelist.contains(&ip)
                    },
                    (_, None) => true,
                    (None, Some(_)) => {
                        warn!("No IP address found in storefront webhook request, denying access.");
                        false
                    },
                };
                if whitelisted {
                    srv.call(req).boxed_local()
                } else {
                    ok(req.error_response(AuthenticationError(AuthError::ForbiddenPeer))).boxed_local()
                }
            })
            .service(OrderCreatedRoute::<SqliteDatabase>::new())
            .service(PaymentClearedRoute::<SqliteDatabase>::new())
            .service(PaymentFailedRoute::<SqliteDatabase>::new())
            .service(PaymentRefundedRoute::<SqliteDatabase>::new())
            .service(DeliveryUpdateRoute::<SqliteDatabase>::new())
            .service(DeliveryConfirmedRoute::<SqliteDatabase>::new())
            .service(ReturnRequestedRoute::<SqliteDatabase>::new())
            .service(StoreCreatedRoute::<SqliteDatabase>::new())
            .service(StoreVerifiedRoute::<SqliteDatabase>::new())
            .service(RequestWithdrawalRoute::<SqliteDatabase>::new());
        app.service(auth_scope)
            .service(health)
            .service(AuthRoute::<SqliteDatabase>::new())
            .service(storefront_scope)
    })
    .keep_alive(KeepAlive::Timeout(Duration::from_secs(600)))
    .bind((config.host.as_str(), config.port))?
    .run();
    Ok(srv)
}
