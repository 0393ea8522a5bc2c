#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Http(#[from] reqwest::Error),
    #[error("processor unavailable: {0}")]
    Unavailable(String),
    #[error("processor rejected: {0}")]
    Rejected(String),
    #[error("invalid: {0}")]
    Invalid(String),
    #[error("charge not found")]
    ChargeNotFound,
}

impl Error {
    /// Whether the caller may retry the same request later.
    /// A transient error says nothing about whether the processor acted on the request.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Unavailable(_) | Error::Io(_) => true,
            Error::Http(e) => {
                e.is_timeout()
                    || e.is_connect()
                    || e.is_request()
                    || e.status()
                        .map(|s| s.is_server_error() || s.as_u16() == 429)
                        .unwrap_or(true)
            }
            _ => false,
        }
    }
}

pub type Result<T, E = Error> = core::result::Result<T, E>;

pub mod processor;
pub use processor::{CardIssuer, Charges};

pub mod marqeta;
pub use marqeta::Marqeta;

pub mod stripe;
pub use stripe::Stripe;

pub mod sandbox;
pub use sandbox::Sandbox;

/// Map a processor http response status onto the error taxonomy.
pub(crate) async fn check_status(res: reqwest::Response) -> Result<reqwest::Response> {
    let status = res.status();
    if status.is_success() {
        return Ok(res);
    }
    let body = res.text().await.unwrap_or_default();
    if status.as_u16() == 404 {
        Err(Error::ChargeNotFound)
    } else if status.is_server_error() || status.as_u16() == 429 {
        Err(Error::Unavailable(format!("{}: {}", status, body)))
    } else {
        Err(Error::Rejected(format!("{}: {}", status, body)))
    }
}
