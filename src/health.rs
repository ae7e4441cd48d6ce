use actix_web::{web, HttpResponse};
use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::state::AppState;
use crate::utils::CircuitState;

// ============================================================================
// Health Checks
// ============================================================================
//
// /health is liveness only. /health/ready asks each dependency:
//
// - store:  a round trip through `OrderStore::ping`
// - broker: the channel's circuit breaker state
//
// An open breaker only degrades readiness; orders are still accepted and
// their events wait in the outbox.
//
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", content = "reason", rename_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Degraded(String),
    Unhealthy(String),
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        matches!(self, HealthStatus::Healthy)
    }

    pub fn is_unhealthy(&self) -> bool {
        matches!(self, HealthStatus::Unhealthy(_))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct ComponentHealth {
    pub name: String,
    pub status: HealthStatus,
    pub last_check: DateTime<Utc>,
}

impl ComponentHealth {
    pub fn new(name: impl Into<String>, status: HealthStatus) -> Self {
        Self {
            name: name.into(),
            status,
            last_check: Utc::now(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ReadinessReport {
    pub status: &'static str,
    pub components: Vec<ComponentHealth>,
}

impl ReadinessReport {
    pub fn from_components(components: Vec<ComponentHealth>) -> Self {
        let status = if components.iter().any(|c| c.status.is_unhealthy()) {
            "unavailable"
        } else if components.iter().all(|c| c.status.is_healthy()) {
            "ready"
        } else {
            "degraded"
        };
        Self { status, components }
    }

    pub fn is_ready(&self) -> bool {
        self.status != "unavailable"
    }
}

fn broker_health(state: CircuitState) -> HealthStatus {
    match state {
        CircuitState::Closed => HealthStatus::Healthy,
        CircuitState::HalfOpen => HealthStatus::Degraded("circuit breaker probing".into()),
        CircuitState::Open => {
            HealthStatus::Degraded("circuit breaker open, events deferred to outbox".into())
        }
    }
}

pub async fn liveness() -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({ "status": "healthy" }))
}

pub async fn readiness(state: web::Data<AppState>) -> HttpResponse {
    let store = match state.store.ping().await {
        Ok(()) => HealthStatus::Healthy,
        Err(e) => {
            tracing::warn!(error = %e, "Store health check failed");
            HealthStatus::Unhealthy("store unreachable".into())
        }
    };
    let broker = broker_health(state.publisher.channel().circuit_state().await);

    let report = ReadinessReport::from_components(vec![
        ComponentHealth::new("store", store),
        ComponentHealth::new("broker", broker),
    ]);

    if report.is_ready() {
        HttpResponse::Ok().json(report)
    } else {
        HttpResponse::ServiceUnavailable().json(report)
    }
}
