use thiserror::Error;

#[derive(Debug, Error)]
pub enum CourierError {
    #[error("tracking number not found")]
    NotFound,
    #[error("carrier request failed: {0}")]
    Http(String),
    #[error("unexpected carrier response: {0}")]
    UnexpectedResponse(String),
    #[error("carrier request timed out")]
    Timeout,
    #[error("carrier {0} is not configured")]
    NotConfigured(String),
    #[error("{0}")]
    Unsupported(&'static str),
    #[error("invalid webhook payload: {0}")]
    InvalidWebhook(String),
}

impl From<reqwest::Error> for CourierError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            CourierError::Timeout
        } else if e.is_decode() {
            CourierError::UnexpectedResponse(e.to_string())
        } else {
            CourierError::Http(e.to_string())
        }
    }
}
