use std::fmt::Debug;

use log::*;

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
        ReturnRequest,
        ReturnStatus,
        Store,
        SubOrder,
        SubOrderId,
    },
    events::{EventProducers, OrderPaidEvent},
    traits::{ReturnUpdate, SettlementDatabase, SettlementError},
};

/// `OrderFlowApi` is the entry point for everything the storefront reports: order placement,
/// payment outcomes, fulfilment progress, returns and disputes. Money only ever moves through
/// the flows in here and in [`crate::ReleaseApi`]; nothing writes wallet balances directly.
pub struct OrderFlowApi<B> {
    db: B,
    producers: EventProducers,
}

impl<B> Debug for OrderFlowApi<B> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "OrderFlowApi")
    }
}

impl<B> OrderFlowApi<B> {
    pub fn new(db: B, producers: EventProducers) -> Self {
        Self { db, producers }
    }
}

impl<B> OrderFlowApi<B>
where B: SettlementDatabase
{
    /// Registers a store so it can appear on orders and accrue settlements.
    pub async fn register_store(&self, store_id: &str, name: &str) -> Result<Store, SettlementError> {
        self.db.register_store(store_id, name).await
    }

    /// Marks a store as verified. Open releases lose the unverified commission surcharge only on
    /// orders placed after this point; already frozen settlements stay as they are.
    pub async fn process_store_verified(&self, store_id: &str) -> Result<Store, SettlementError> {
        self.db.process_store_verified(store_id).await
    }

    /// Submits an order snapshot from the storefront.
    ///
    /// Replays are detected by the idempotency key: the boolean is `true` when this call created
    /// the order and `false` when an identical submission had already been recorded.
    pub async fn process_new_order(&self, order: NewOrder) -> Result<(Order, bool), SettlementError> {
        let (order, inserted) = self.db.insert_order(order).await?;
        if inserted {
            debug!("🔄️📦️ Order [{}] recorded, awaiting payment", order.order_id);
        } else {
            debug!("🔄️📦️ Order [{}] was a replay of a known idempotency key", order.order_id);
        }
        Ok((order, inserted))
    }

    /// Reacts to the payment gateway reporting a successful charge. This is the moment the
    /// settlement terms are frozen: commission, payout and release schedule are computed for
    /// every sub-order and the amounts go into escrow on the stores' pending balances.
    pub async fn process_payment_cleared(&self, order_id: &OrderId) -> Result<(Order, Vec<FundRelease>), SettlementError> {
        let (order, releases) = self.db.process_payment_cleared(order_id).await?;
        self.call_order_paid_hook(&order, &releases).await;
        debug!("🔄️💰️ Payment processing for [{order_id}] complete. {} releases scheduled", releases.len());
        Ok((order, releases))
    }

    /// Records a failed charge. The order stays queryable but never produces settlements.
    pub async fn process_payment_failed(&self, order_id: &OrderId) -> Result<Order, SettlementError> {
        self.db.process_payment_failed(order_id).await
    }

    /// Records a storefront-level refund of a paid order, cancelling any settlements that have
    /// not paid out yet.
    pub async fn process_payment_refunded(&self, order_id: &OrderId) -> Result<Order, SettlementError> {
        self.db.process_payment_refunded(order_id).await
    }

    /// Moves a sub-order's fulfilment status forward.
    pub async fn update_delivery_status(
        &self,
        sub_order_id: &SubOrderId,
        status: DeliveryStatus,
        note: Option<String>,
    ) -> Result<SubOrder, SettlementError> {
        self.db.update_delivery_status(sub_order_id, status, note).await
    }

    /// Records delivery confirmation. Manual (customer) and automatic (grace period lapsed)
    /// confirmation race benignly; whichever lands first wins and the other becomes a no-op.
    pub async fn confirm_delivery(
        &self,
        sub_order_id: &SubOrderId,
        kind: ConfirmationKind,
    ) -> Result<(SubOrder, bool), SettlementError> {
        self.db.confirm_delivery(sub_order_id, kind).await
    }

    /// Sweeps delivered-but-unconfirmed sub-orders older than the grace period and confirms them
    /// automatically.
    pub async fn auto_confirm_deliveries(&self, grace_days: i64, limit: i64) -> Result<Vec<SubOrder>, SettlementError> {
        self.db.auto_confirm_deliveries(grace_days, limit).await
    }

    pub async fn request_return(&self, sub_order_id: &SubOrderId, reason: &str) -> Result<ReturnRequest, SettlementError> {
        if reason.trim().is_empty() {
            return Err(SettlementError::ValidationError("A reason is required to open a return".to_string()));
        }
        self.db.request_return(sub_order_id, reason).await
    }

    /// Advances a return through its lifecycle. The `Refunded` step settles up with the store:
    /// a released payout is debited back, an unreleased one is cancelled.
    pub async fn update_return_status(&self, return_id: i64, status: ReturnStatus) -> Result<ReturnUpdate, SettlementError> {
        self.db.update_return_status(return_id, status).await
    }

    pub async fn open_dispute(
        &self,
        sub_order_id: &SubOrderId,
        kind: DisputeKind,
        reason: &str,
    ) -> Result<Dispute, SettlementError> {
        if reason.trim().is_empty() {
            return Err(SettlementError::ValidationError("A reason is required to open a dispute".to_string()));
        }
        self.db.open_dispute(sub_order_id, kind, reason).await
    }

    pub async fn resolve_dispute(&self, dispute_id: i64) -> Result<Dispute, SettlementError> {
        self.db.resolve_dispute(dispute_id).await
    }

    async fn call_order_paid_hook(&self, order: &Order, releases: &[FundRelease]) {
        for emitter in &self.producers.order_paid_producer {
            debug!("🔄️📦️ Notifying order paid hook subscribers");
            let event = OrderPaidEvent::new(order.clone(), releases.to_vec());
            emitter.publish_event(event).await;
        }
    }
}
