//! Stateless pub-sub plumbing for ledger events.
//!
//! Components register async hooks for the events they care about (funds released, withdrawal
//! rejected, and so on) and the APIs publish into the channel after the database transaction has
//! committed. Handlers receive the event payload and nothing else; they cannot reach back into
//! engine state.

use std::{
    future::Future,
    pin::Pin,
    sync::{
        atomic::{AtomicI64, Ordering},
        Arc,
    },
};

use log::*;
use tokio::sync::mpsc;

pub type Handler<E> = Arc<dyn Fn(E) -> Pin<Box<dyn Future<Output = ()> + Send>> + Send + Sync>;

pub struct EventHandler<E: Send + Sync + 'static> {
    receiver: mpsc::Receiver<E>,
    sender: mpsc::Sender<E>,
    hook: Handler<E>,
}

impl<E: Send + Sync + 'static> EventHandler<E> {
    pub fn new(buffer_size: usize, hook: Handler<E>) -> Self {
        let (sender, receiver) = mpsc::channel(buffer_size);
        Self { receiver, sender, hook }
    }

    /// Hands out a new producer for this channel. Producers are cheap clones of the sender half.
    pub fn subscribe(&self) -> EventProducer<E> {
        EventProducer::new(self.sender.clone())
    }

    /// Runs the dispatch loop until every producer has been dropped, then waits for any hook
    /// invocations that are still in flight.
    pub async fn start_handler(mut self) {
        debug!("📬️ Event handler running");
        // The handler holds its own sender so that subscribe() keeps working after start. Drop it
        // here, otherwise the recv loop never ends.
        drop(self.sender);
        let in_flight = Arc::new(AtomicI64::new(0));
        while let Some(event) = self.receiver.recv().await {
            trace!("📬️ Dispatching event");
            let hook = Arc::clone(&self.hook);
            in_flight.fetch_add(1, Ordering::SeqCst);
            let counter = Arc::clone(&in_flight);
            tokio::spawn(async move {
                (hook)(event).await;
                counter.fetch_sub(1, Ordering::SeqCst);
                trace!("📬️ Event hook completed");
            });
        }
        while in_flight.load(Ordering::SeqCst) > 0 {
            debug!("📬️ Draining {} in-flight event hooks", in_flight.load(Ordering::SeqCst));
            tokio::time::sleep(tokio::time::Duration::from_millis(250)).await;
        }
        debug!("📬️ Event handler has shut down");
    }
}

#[derive(Clone)]
pub struct EventProducer<E: Send + Sync> {
    sender: mpsc::Sender<E>,
}

impl<E: Send + Sync> EventProducer<E> {
    pub fn new(sender: mpsc::Sender<E>) -> Self {
        Self { sender }
    }

    /// Publishing never fails from the caller's point of view. A closed channel is logged and
    /// swallowed so that ledger writes are not held hostage by a dead subscriber.
    pub async fn publish_event(&self, event: E) {
        if let Err(e) = self.sender.send(event).await {
            error!("📬️ Could not publish event: {e}");
        }
    }
}

#[cfg(test)]
mod test {
    use std::sync::atomic::AtomicI64;

    use super::*;

    #[tokio::test]
    async fn every_published_event_reaches_the_hook() {
        let _ = env_logger::try_init();
        let total = Arc::new(AtomicI64::new(0));
        let tally = Arc::clone(&total);
        let hook = Arc::new(move |amount: i64| {
            let tally = Arc::clone(&tally);
            Box::pin(async move {
                tokio::time::sleep(tokio::time::Duration::from_millis(20)).await;
                tally.fetch_add(amount, Ordering::SeqCst);
            }) as Pin<Box<dyn Future<Output = ()> + Send>>
        });
        let handler = EventHandler::new(2, hook);
        let credits = handler.subscribe();
        let debits = handler.subscribe();
        tokio::spawn(async move {
            for _ in 0..10 {
                credits.publish_event(500).await;
            }
        });
        tokio::spawn(async move {
            for _ in 0..10 {
                debits.publish_event(-200).await;
            }
        });
        handler.start_handler().await;
        assert_eq!(total.load(Ordering::SeqCst), 3000);
    }
}
