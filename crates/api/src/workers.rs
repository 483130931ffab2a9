//! Background consumers running beside the HTTP server.

use std::sync::Arc;

use consumers::{
    EventHandler, InventoryReconciler, InvoicePaymentConsumer, Mailer, NotificationDispatcher,
    QueueWorker,
};
use event_bus::topology::queues;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::config::Config;
use crate::state::AppState;

/// Spawns one worker per durable queue the process consumes. Each stops
/// once `shutdown` turns true, after settling the message in hand.
pub fn spawn_workers<M>(
    state: &Arc<AppState>,
    config: &Config,
    mailer: M,
    shutdown: &watch::Receiver<bool>,
) -> Vec<JoinHandle<()>>
where
    M: Mailer + Clone + 'static,
{
    let spawner = Spawner {
        state,
        max_deliveries: config.consumer_max_deliveries,
        shutdown,
    };
    let dispatcher =
        || NotificationDispatcher::new(mailer.clone()).with_reset_url(&config.password_reset_url);

    vec![
        spawner.spawn(
            queues::PRODUCT_ORDER,
            InventoryReconciler::new(state.inventory.clone(), state.processed.clone()),
        ),
        spawner.spawn(
            queues::INVOICE_PAYMENT,
            InvoicePaymentConsumer::new(state.invoices.clone()),
        ),
        spawner.spawn(queues::EMAIL_PAYMENT, dispatcher()),
        spawner.spawn(queues::EMAIL_INVOICE, dispatcher()),
        spawner.spawn(queues::EMAIL_AUTH, dispatcher()),
    ]
}

struct Spawner<'a> {
    state: &'a Arc<AppState>,
    max_deliveries: u32,
    shutdown: &'a watch::Receiver<bool>,
}

impl Spawner<'_> {
    fn spawn<H: EventHandler + 'static>(&self, queue: &str, handler: H) -> JoinHandle<()> {
        let worker = QueueWorker::new(self.state.bus.clone(), queue, handler)
            .with_max_deliveries(self.max_deliveries);
        let shutdown = self.shutdown.clone();
        tokio::spawn(async move { worker.run(shutdown).await })
    }
}
