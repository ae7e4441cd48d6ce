use std::sync::Arc;

use crate::messaging::EventPublisher;
use crate::metrics::Metrics;
use crate::service::OrderService;
use crate::store::{OrderStore, OutboxStore};

/// Long-lived handles shared by every request. Built once at startup and
/// handed to actix as `web::Data`.
#[derive(Clone)]
pub struct AppState {
    pub orders: OrderService,
    pub publisher: EventPublisher,
    pub outbox: Arc<dyn OutboxStore>,
    pub store: Arc<dyn OrderStore>,
    pub metrics: Arc<Metrics>,
}
