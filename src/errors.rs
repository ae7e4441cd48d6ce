use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};

use crate::messaging::PublishError;
use crate::models::ApiResponse;
use crate::pricing::PricingError;
use crate::store::StoreError;

// ============================================================================
// Order Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
pub enum OrderError {
    #[error("Order not found: {0}")]
    NotFound(i64),

    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Persistence failure: {0}")]
    Persistence(#[from] StoreError),

    #[error("Publish failure: {0}")]
    Publish(#[from] PublishError),

    #[error("Pricing failure: {0}")]
    Pricing(#[from] PricingError),
}

impl From<validator::ValidationErrors> for OrderError {
    fn from(errors: validator::ValidationErrors) -> Self {
        OrderError::Validation(errors.to_string())
    }
}

impl ResponseError for OrderError {
    fn status_code(&self) -> StatusCode {
        match self {
            OrderError::NotFound(_) => StatusCode::NOT_FOUND,
            OrderError::Validation(_) => StatusCode::BAD_REQUEST,
            OrderError::Persistence(_) | OrderError::Publish(_) | OrderError::Pricing(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    fn error_response(&self) -> HttpResponse {
        let message = match self {
            OrderError::NotFound(_) => "order not found".to_string(),
            OrderError::Validation(msg) => msg.clone(),
            OrderError::Persistence(_) | OrderError::Publish(_) | OrderError::Pricing(_) => {
                // Storage and broker internals stay in the logs.
                tracing::error!(error = %self, "Request failed with internal error");
                "internal server error".to_string()
            }
        };

        HttpResponse::build(self.status_code()).json(ApiResponse::error(message))
    }
}
