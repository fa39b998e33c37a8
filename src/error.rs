use thiserror::Error;
use tracing::error;

/// Failures that end (or prevent) a call session, plus the persistence and
/// configuration errors the session absorbs and logs.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("no active business owns number {0}")]
    NoOwnerForNumber(String),

    #[error("transport error: {0}")]
    Transport(&'static str),

    #[error("database error: {0}")]
    Persistence(#[from] sqlx::Error),

    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Service(#[from] ServiceError),
}

/// Failures of the speech-recognition, completion, synthesis and notification
/// backends. Callers degrade on every variant; none of them end a call.
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("{service} request failed: {source}")]
    Http {
        service: &'static str,
        #[source]
        source: reqwest::Error,
    },

    #[error("{service} returned status {status}: {body}")]
    Status {
        service: &'static str,
        status: http::StatusCode,
        body: String,
    },

    #[error("{service} response could not be decoded: {reason}")]
    Decode {
        service: &'static str,
        reason: String,
    },

    #[error("{service} returned no content")]
    Empty { service: &'static str },

    #[error("{service} timed out after {millis}ms")]
    Timeout { service: &'static str, millis: u128 },
}

impl ServiceError {
    pub fn http(service: &'static str) -> impl FnOnce(reqwest::Error) -> Self {
        move |source| {
            error!(error=%source, service, "failed to send request");
            ServiceError::Http { service, source }
        }
    }
}

/// Check a response's status, turning any non-success into `ServiceError::Status`
/// with the body text attached for the log.
pub async fn check_status(
    service: &'static str,
    resp: reqwest::Response,
) -> Result<reqwest::Response, ServiceError> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }
    let body = resp.text().await.unwrap_or_default();
    error!(service, status=%status, body=%body, "service returned an error status");
    Err(ServiceError::Status {
        service,
        status,
        body,
    })
}

pub async fn handle_error(e: impl std::error::Error) {
    error!("ERROR: {e}")
}
