use log::*;
use settlement_engine::{
    db_types::SubOrder,
    events::EventProducers,
    OrderFlowApi,
    ReleaseApi,
    SqliteDatabase,
};
use tokio::task::JoinHandle;

use crate::config::SweeperConfig;

/// Starts the settlement sweeper. Do not await the returned JoinHandle, as it will run
/// indefinitely.
///
/// Each pass does two things, in order:
/// 1. Auto-confirms sub-orders that were delivered more than the grace period ago without the
///    buyer confirming, which starts their settlement clock.
/// 2. Re-evaluates due pending releases and, unless auto-release is disabled, pays out
///    everything that is ready.
pub fn start_sweeper(db: SqliteDatabase, producers: EventProducers, config: SweeperConfig) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut timer = tokio::time::interval(std::time::Duration::from_secs(config.interval_secs));
        let order_api = OrderFlowApi::new(db.clone(), producers.clone());
        let release_api = ReleaseApi::new(db, producers);
        let payouts = if config.auto_release { "automatic" } else { "operator approved" };
        info!(
            "🕰️ Settlement sweeper started. Interval: {}s. Grace period: {} days. Payouts: {payouts}.",
            config.interval_secs, config.auto_confirm_grace_days
        );
        loop {
            timer.tick().await;
            info!("🕰️ Running settlement sweep");
            match order_api.auto_confirm_deliveries(config.auto_confirm_grace_days, config.limit).await {
                Ok(confirmed) if confirmed.is_empty() => {
                    debug!("🕰️ No deliveries were due for auto-confirmation");
                },
                Ok(confirmed) => {
                    info!("🕰️ {} deliveries auto-confirmed: {}", confirmed.len(), sub_order_list(&confirmed));
                },
                Err(e) => {
                    error!("🕰️ Error auto-confirming deliveries: {e}");
                },
            }
            let result = if config.auto_release {
                release_api.run_scheduled_sweep(config.limit).await
            } else {
                release_api.run_evaluation_sweep(config.limit).await
            };
            match result {
                Ok(summary) => {
                    info!("🕰️ Sweep complete. {summary}");
                },
                Err(e) => {
                    error!("🕰️ Error running settlement sweep: {e}");
                },
            }
        }
    })
}

fn sub_order_list(sub_orders: &[SubOrder]) -> String {
    sub_orders
        .iter()
        .map(|s| format!("[{}] store: {}", s.sub_order_id, s.store_id))
        .collect::<Vec<String>>()
        .join(", ")
}
