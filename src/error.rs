use axum::{
    extract::rejection::{FormRejection, JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::Serialize;
use thiserror::Error;

use crate::models::PledgeError;
use crate::payments::WebhookError;

pub type Result<T> = std::result::Result<T, AppError>;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    BadRequest(String),

    #[error(transparent)]
    InvalidPledge(#[from] PledgeError),

    #[error(transparent)]
    Webhook(#[from] WebhookError),

    /// Stripe answered, but refused the request.
    #[error("Payment provider error: {0}")]
    PaymentProvider(String),

    /// Stripe could not be reached, or sent something unreadable. The
    /// detail goes to the log only.
    #[error("Payment provider unavailable: {0}")]
    PaymentProviderUnavailable(String),

    #[error("Payment provider did not respond in time")]
    PaymentProviderTimeout,

    #[error("Internal error: {0}")]
    Internal(String),
}

#[derive(Serialize)]
struct ErrorBody {
    error: String,
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::BadRequest(_) | AppError::InvalidPledge(_) | AppError::Webhook(_) => {
                StatusCode::BAD_REQUEST
            }
            AppError::PaymentProvider(_) | AppError::PaymentProviderUnavailable(_) => {
                StatusCode::BAD_GATEWAY
            }
            AppError::PaymentProviderTimeout => StatusCode::GATEWAY_TIMEOUT,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Message safe to show to a donor.
    pub fn public_message(&self) -> String {
        match self {
            AppError::Internal(_) => "Something went wrong. Please try again later.".to_string(),
            AppError::PaymentProviderUnavailable(_) => {
                "The payment provider could not be reached. Please try again.".to_string()
            }
            AppError::PaymentProviderTimeout => {
                "The payment provider did not respond. Please try again.".to_string()
            }
            other => other.to_string(),
        }
    }

    /// Log at `error` for server-side failures, `warn` for everything the caller got wrong.
    pub fn log(&self) {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!(status = status.as_u16(), "{}", self);
        } else {
            tracing::warn!(status = status.as_u16(), "{}", self);
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        self.log();

        let status = self.status();
        let body = axum::Json(ErrorBody {
            error: self.public_message(),
        });
        (status, body).into_response()
    }
}

impl From<reqwest::Error> for AppError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            AppError::PaymentProviderTimeout
        } else {
            AppError::PaymentProviderUnavailable(e.to_string())
        }
    }
}

impl From<JsonRejection> for AppError {
    fn from(rejection: JsonRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}

impl From<FormRejection> for AppError {
    fn from(rejection: FormRejection) -> Self {
        AppError::BadRequest(rejection.body_text())
    }
}
