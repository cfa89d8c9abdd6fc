use std::{future::Future, pin::Pin, sync::Arc};

use crate::events::{
    AuditEvent,
    EventHandler,
    EventProducer,
    FundsReleasedEvent,
    Handler,
    OrderPaidEvent,
    ReleaseReversedEvent,
    WithdrawalApprovedEvent,
    WithdrawalRejectedEvent,
};

#[derive(Default, Clone)]
pub struct EventProducers {
    pub order_paid_producer: Vec<EventProducer<OrderPaidEvent>>,
    pub funds_released_producer: Vec<EventProducer<FundsReleasedEvent>>,
    pub release_reversed_producer: Vec<EventProducer<ReleaseReversedEvent>>,
    pub withdrawal_approved_producer: Vec<EventProducer<WithdrawalApprovedEvent>>,
    pub withdrawal_rejected_producer: Vec<EventProducer<WithdrawalRejectedEvent>>,
    pub audit_producer: Vec<EventProducer<AuditEvent>>,
}

pub struct EventHandlers {
    pub on_order_paid: Option<EventHandler<OrderPaidEvent>>,
    pub on_funds_released: Option<EventHandler<FundsReleasedEvent>>,
    pub on_release_reversed: Option<EventHandler<ReleaseReversedEvent>>,
    pub on_withdrawal_approved: Option<EventHandler<WithdrawalApprovedEvent>>,
    pub on_withdrawal_rejected: Option<EventHandler<WithdrawalRejectedEvent>>,
    pub on_audit: Option<EventHandler<AuditEvent>>,
}

impl EventHandlers {
    pub fn new(buffer_size: usize, hooks: EventHooks) -> Self {
        let on_order_paid = hooks.on_order_paid.map(|f| EventHandler::new(buffer_size, f));
        let on_funds_released = hooks.on_funds_released.map(|f| EventHandler::new(buffer_size, f));
        let on_release_reversed = hooks.on_release_reversed.map(|f| EventHandler::new(buffer_size, f));
        let on_withdrawal_approved = hooks.on_withdrawal_approved.map(|f| EventHandler::new(buffer_size, f));
        let on_withdrawal_rejected = hooks.on_withdrawal_rejected.map(|f| EventHandler::new(buffer_size, f));
        let on_audit = hooks.on_audit.map(|f| EventHandler::new(buffer_size, f));
        Self {
            on_order_paid,
            on_funds_released,
            on_release_reversed,
            on_withdrawal_approved,
            on_withdrawal_rejected,
            on_audit,
        }
    }

    pub fn producers(&self) -> EventProducers {
        let mut result = EventProducers::default();
        if let Some(handler) = &self.on_order_paid {
            result.order_paid_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_funds_released {
            result.funds_released_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_release_reversed {
            result.release_reversed_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_withdrawal_approved {
            result.withdrawal_approved_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_withdrawal_rejected {
            result.withdrawal_rejected_producer.push(handler.subscribe());
        }
        if let Some(handler) = &self.on_audit {
            result.audit_producer.push(handler.subscribe());
        }
        result
    }

    pub async fn start_handlers(self) {
        if let Some(handler) = self.on_order_paid {
            tokio::spawn(async move {
                handler.start_handler().await;
            });
        }
        if let Some(handler) = self.on_funds_released {
            tokio::spawn(async move {
                handler.start_handler().await;
            });
        }
        if let Some(handler) = self.on_release_reversed {
            tokio::spawn(async move {
                handler.start_handler().await;
            });
        }
        if let Some(handler) = self.on_withdrawal_approved {
            tokio::spawn(async move {
                handler.start_handler().await;
            });
        }
        if let Some(handler) = self.on_withdrawal_rejected {
            tokio::spawn(async move {
                handler.start_handler().await;
            });
        }
        if let Some(handler) = self.on_audit {
            tokio::spawn(async move {
                handler.start_handler().await;
            });
        }
    }
}

#[derive(Default, Clone)]
pub struct EventHooks {
    pub on_order_paid: Option<Handler<OrderPaidEvent>>,
    pub on_funds_released: Option<Handler<FundsReleasedEvent>>,
    pub on_release_reversed: Option<Handler<ReleaseReversedEvent>>,
    pub on_withdrawal_approved: Option<Handler<WithdrawalApprovedEvent>>,
    pub on_withdrawal_rejected: Option<Handler<WithdrawalRejectedEvent>>,
    pub on_audit: Option<Handler<AuditEvent>>,
}

impl EventHooks {
    pub fn on_order_paid<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(OrderPaidEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_order_paid = Some(Arc::new(f));
        self
    }

    pub fn on_funds_released<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(FundsReleasedEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_funds_released = Some(Arc::new(f));
        self
    }

    pub fn on_release_reversed<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(ReleaseReversedEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_release_reversed = Some(Arc::new(f));
        self
    }

    pub fn on_withdrawal_approved<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(WithdrawalApprovedEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_withdrawal_approved = Some(Arc::new(f));
        self
    }

    pub fn on_withdrawal_rejected<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(WithdrawalRejectedEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_withdrawal_rejected = Some(Arc::new(f));
        self
    }

    pub fn on_audit<F>(&mut self, f: F) -> &mut Self
    where F: (Fn(AuditEvent) -> Pin<Box<dyn Future<Output = ()> + Send>>) + Send + Sync + 'static {
        self.on_audit = Some(Arc::new(f));
        self
    }
}
