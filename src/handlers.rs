use actix_web::error::InternalError;
use actix_web::{web, HttpResponse};
use serde::Deserialize;
use validator::Validate;

use crate::errors::OrderError;
use crate::health;
use crate::metrics::metrics_handler;
use crate::models::{
    ApiResponse, CreateOrderRequest, ListOrdersQuery, OrderCreatedResponse, OrderStatus,
    UpdateOrderRequest, UpdateOrderStatusRequest,
};
use crate::state::AppState;
use crate::store::ORDER_CREATED;

// ============================================================================
// HTTP Handlers
// ============================================================================

pub const PUBLISH_DEFERRED_MESSAGE: &str = "order created; event publication deferred";
const CREATE_FAILED_MESSAGE: &str = "Failed to create order";
const DEFAULT_DEAD_LETTER_LIMIT: i64 = 50;

/// Routes plus extractor configs that turn malformed input into the
/// standard 400 error envelope.
pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.app_data(web::JsonConfig::default().error_handler(|err, _req| {
        let response = HttpResponse::BadRequest().json(ApiResponse::error(err.to_string()));
        InternalError::from_response(err, response).into()
    }))
    .app_data(web::QueryConfig::default().error_handler(|err, _req| {
        let response = HttpResponse::BadRequest().json(ApiResponse::error(err.to_string()));
        InternalError::from_response(err, response).into()
    }))
    .app_data(web::PathConfig::default().error_handler(|err, _req| {
        let response = HttpResponse::BadRequest().json(ApiResponse::error("invalid order id"));
        InternalError::from_response(err, response).into()
    }))
    .route("/api/orders", web::post().to(create_order))
    .route("/api/orders", web::get().to(list_orders))
    .route("/api/orders/{id}", web::get().to(get_order))
    .route("/api/orders/{id}", web::put().to(update_order))
    .route("/api/orders/{id}", web::delete().to(delete_order))
    .route("/api/orders/{id}/status", web::patch().to(update_order_status))
    .route("/api/outbox/dead-letters", web::get().to(list_dead_letters))
    .route("/health", web::get().to(health::liveness))
    .route("/health/ready", web::get().to(health::readiness))
    .route("/metrics", web::get().to(metrics_handler));
}

/// Persist the order, then publish `order_created`. A failed publish does
/// not fail the request: the outbox entry stays pending for the relay.
pub async fn create_order(
    state: web::Data<AppState>,
    body: web::Json<CreateOrderRequest>,
) -> Result<HttpResponse, OrderError> {
    let request = body.into_inner();
    request.validate()?;

    let order = match state.orders.create(request).await {
        Ok(order) => order,
        Err(OrderError::Persistence(e)) => {
            tracing::error!(error = %e, "Failed to create order");
            return Ok(HttpResponse::InternalServerError()
                .json(ApiResponse::error(CREATE_FAILED_MESSAGE)));
        }
        Err(e) => return Err(e),
    };

    let created = ApiResponse::success(OrderCreatedResponse {
        status: order.status,
        id: order.id,
    });

    match state.publisher.publish_order_created(&order).await {
        Ok(event) => {
            state.metrics.record_publish(&event.event_type, "immediate", true);
            if let Err(e) = state.outbox.mark_published(order.id, ORDER_CREATED).await {
                // Entry stays pending; the relay will send a duplicate.
                tracing::warn!(
                    order_id = order.id,
                    error = %e,
                    "Published event but could not mark outbox entry"
                );
            }
            Ok(HttpResponse::Created().json(created))
        }
        Err(e) => {
            state.metrics.record_publish(ORDER_CREATED, "immediate", false);
            state.metrics.events_deferred.inc();
            tracing::warn!(
                order_id = order.id,
                error = %e,
                "⚠️ Event publish failed, deferring to outbox relay"
            );

            if let Err(store_err) = state
                .outbox
                .record_failure(order.id, ORDER_CREATED, &e.to_string())
                .await
            {
                tracing::warn!(order_id = order.id, error = %store_err, "Could not record publish failure");
            }

            Ok(HttpResponse::Created().json(created.with_message(PUBLISH_DEFERRED_MESSAGE)))
        }
    }
}

pub async fn get_order(
    state: web::Data<AppState>,
    path: web::Path<i64>,
) -> Result<HttpResponse, OrderError> {
    let order = state.orders.get(path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(order)))
}

pub async fn list_orders(
    state: web::Data<AppState>,
    query: web::Query<ListOrdersQuery>,
) -> Result<HttpResponse, OrderError> {
    let query = query.into_inner();

    let status = match query.status.as_deref() {
        None | Some("") => None,
        Some(raw) => Some(
            raw.parse::<OrderStatus>()
                .map_err(|e| OrderError::Validation(e.to_string()))?,
        ),
    };

    let orders = state
        .orders
        .list(query.limit.unwrap_or(0), query.offset.unwrap_or(0), status)
        .await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(orders)))
}

pub async fn update_order(
    state: web::Data<AppState>,
    path: web::Path<i64>,
    body: web::Json<UpdateOrderRequest>,
) -> Result<HttpResponse, OrderError> {
    let request = body.into_inner();
    request.validate()?;

    let order = state.orders.update(path.into_inner(), request.into()).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(order)))
}

pub async fn update_order_status(
    state: web::Data<AppState>,
    path: web::Path<i64>,
    body: web::Json<UpdateOrderStatusRequest>,
) -> Result<HttpResponse, OrderError> {
    let order = state
        .orders
        .update_status_str(path.into_inner(), &body.status)
        .await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(order)))
}

pub async fn delete_order(
    state: web::Data<AppState>,
    path: web::Path<i64>,
) -> Result<HttpResponse, OrderError> {
    let id = path.into_inner();
    state.orders.delete(id).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::ok("order deleted")))
}

#[derive(Debug, Deserialize)]
pub struct DeadLetterQuery {
    pub limit: Option<u32>,
}

pub async fn list_dead_letters(
    state: web::Data<AppState>,
    query: web::Query<DeadLetterQuery>,
) -> Result<HttpResponse, OrderError> {
    let limit = match query.limit {
        None | Some(0) => DEFAULT_DEAD_LETTER_LIMIT,
        Some(limit) => i64::from(limit),
    };
    let dead_letters = state.outbox.dead_letters(limit).await?;
    Ok(HttpResponse::Ok().json(ApiResponse::success(dead_letters)))
}
