use actix_web::{http::StatusCode, HttpResponse, ResponseError};
use serde_json::json;
use std::time::{SystemTime, UNIX_EPOCH};
mod api;
mod app;
pub mod auth;
pub mod gate;
pub mod ledger;
mod lock;
mod service;
pub mod setting;

pub use {
    app::*,
    gate::CardView,
    service::{CreatedCard, Initiated, Service},
};

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    DbErr(#[from] sea_orm::DbErr),
    #[error(transparent)]
    Config(#[from] config::ConfigError),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Auth(#[from] auth::AuthError),
    #[error("{0}")]
    Message(String),
    #[error("{0}")]
    Str(&'static str),
    #[error("{0}")]
    InvalidParam(String),
    #[error("{0} not found")]
    NotFound(&'static str),
    #[error("Unauthorized")]
    Unauthorized,
    #[error("Not a member of the event")]
    NotAMember,
    #[error("The amount must be greater than zero and within the contribution limit")]
    InvalidAmount,
    #[error("Unknown contribution reference")]
    UnknownReference,
    #[error("The confirmation does not match the contribution: {0}")]
    AmountMismatch(String),
    #[error("Payment processor unavailable: {0}")]
    GatewayUnavailable(String),
    #[error("Payment processor rejected the request: {0}")]
    GatewayRejected(String),
    #[error("The contribution is still being processed")]
    ContributionPending,
    #[error("The contribution failed: {0}")]
    ContributionFailed(String),
    #[error("Card {0} balance diverges from the ledger")]
    Inconsistent(i64),
}

impl From<card_gateway::Error> for Error {
    fn from(err: card_gateway::Error) -> Self {
        if err.is_transient() {
            Error::GatewayUnavailable(err.to_string())
        } else {
            Error::GatewayRejected(err.to_string())
        }
    }
}

impl Error {
    /// stable error kind for api clients
    pub fn code(&self) -> &'static str {
        match self {
            Error::NotFound(_) => "not_found",
            Error::Unauthorized | Error::Auth(_) => "unauthorized",
            Error::NotAMember => "not_a_member",
            Error::InvalidAmount => "invalid_amount",
            Error::InvalidParam(_) | Error::Json(_) => "invalid_param",
            Error::UnknownReference => "unknown_reference",
            Error::AmountMismatch(_) => "amount_mismatch",
            Error::GatewayUnavailable(_) => "gateway_unavailable",
            Error::GatewayRejected(_) => "gateway_rejected",
            Error::ContributionPending => "contribution_pending",
            Error::ContributionFailed(_) => "contribution_failed",
            Error::Inconsistent(_) => "inconsistent",
            _ => "internal",
        }
    }
}

impl ResponseError for Error {
    fn status_code(&self) -> StatusCode {
        match self {
            Error::NotFound(_) | Error::UnknownReference => StatusCode::NOT_FOUND,
            Error::Unauthorized | Error::Auth(_) => StatusCode::UNAUTHORIZED,
            Error::NotAMember => StatusCode::FORBIDDEN,
            Error::InvalidAmount | Error::InvalidParam(_) | Error::Json(_) => {
                StatusCode::BAD_REQUEST
            }
            Error::AmountMismatch(_) | Error::ContributionPending => StatusCode::CONFLICT,
            Error::GatewayRejected(_) | Error::ContributionFailed(_) => {
                StatusCode::PAYMENT_REQUIRED
            }
            Error::GatewayUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Creates full response for error.
    fn error_response(&self) -> HttpResponse {
        HttpResponse::build(self.status_code()).json(json!({
            "error": true,
            "code": self.code(),
            "status_code": self.status_code().as_u16(),
            "message": self.to_string()
        }))
    }
}

pub type Result<T, E = Error> = core::result::Result<T, E>;

pub fn now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
