use kube::core::ErrorResponse;

/// Failure of a single call against the object store.
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("not found: {0}")]
    NotFound(String),
    #[error("no matching type registered: {0}")]
    NoMatchingType(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("rejected: {0}")]
    Rejected(String),
    #[error("store unavailable: {0}")]
    Unavailable(String),
    #[error("operation cancelled")]
    Cancelled,
    #[error("serialization error: {0}")]
    Serde(String),
}

/// How a failure should be retried by the controller runtime.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorClass {
    Transient,
    Conflict,
    Permanent,
}

impl StoreError {
    pub fn class(&self) -> ErrorClass {
        match self {
            StoreError::Conflict(_) => ErrorClass::Conflict,
            StoreError::Rejected(_) | StoreError::Serde(_) => {
                ErrorClass::Permanent
            }
            StoreError::NotFound(_)
            | StoreError::NoMatchingType(_)
            | StoreError::Unavailable(_)
            | StoreError::Cancelled => ErrorClass::Transient,
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serde(e.to_string())
    }
}

impl From<kube::Error> for StoreError {
    fn from(e: kube::Error) -> Self {
        match e {
            kube::Error::Api(resp) => from_api_response(resp),
            kube::Error::SerdeError(e) => StoreError::Serde(e.to_string()),
            other => StoreError::Unavailable(other.to_string()),
        }
    }
}

fn from_api_response(resp: ErrorResponse) -> StoreError {
    match resp.code {
        404 => StoreError::NotFound(resp.message),
        409 => StoreError::Conflict(resp.message),
        400 | 401 | 403 | 422 => StoreError::Rejected(resp.message),
        // 429 and 5xx fall through with network failures
        _ => StoreError::Unavailable(format!("{} ({})", resp.message, resp.code)),
    }
}
