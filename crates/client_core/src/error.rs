use thiserror::Error;

pub const LOCAL_ERROR_PREFIX: &str = "(Local Error)";

/// The five calls the collection resource supports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    ListAll,
    GetOne,
    Create,
    Update,
    Remove,
}

impl Operation {
    pub fn name(self) -> &'static str {
        match self {
            Self::ListAll => "list_all",
            Self::GetOne => "get_one",
            Self::Create => "create",
            Self::Update => "update",
            Self::Remove => "remove",
        }
    }

    /// Context shown after the local error prefix when the call never
    /// produced a usable server response.
    pub fn local_failure_context(self) -> &'static str {
        match self {
            Self::ListAll => "Failed to fetch users",
            Self::GetOne => "Failed to fetch one user",
            Self::Create => "Failed to create user",
            Self::Update => "Failed to update user",
            Self::Remove => "Failed to delete user(s)",
        }
    }
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("{0}")]
    Transport(#[from] reqwest::Error),
    #[error("malformed response body: {0}")]
    MalformedBody(#[from] serde_json::Error),
    #[error("invalid directory url: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("directory url cannot carry a collection path: {0}")]
    UnsupportedBaseUrl(String),
    #[error("user record has no identifier")]
    MissingIdentifier,
    #[error("{status}: {message}")]
    Remote { status: String, message: String },
}

impl ClientError {
    /// Collapses the error into the uniform failure shape. Server-reported
    /// failures keep the server's status label; everything else is local.
    pub fn into_failure(self, operation: Operation) -> OperationFailure {
        match self {
            Self::Remote { status, message } => OperationFailure::new(status, message),
            other => OperationFailure::local(operation, other.to_string()),
        }
    }
}

/// Failure half of every remote call. Renders as `"<status>: <message>"`.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{status}: {message}")]
pub struct OperationFailure {
    pub status: String,
    pub message: String,
}

impl OperationFailure {
    pub fn new(status: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            status: status.into(),
            message: message.into(),
        }
    }

    pub fn local(operation: Operation, message: impl Into<String>) -> Self {
        Self::new(
            format!("{LOCAL_ERROR_PREFIX} {}", operation.local_failure_context()),
            message,
        )
    }

    pub fn is_local(&self) -> bool {
        self.status.starts_with(LOCAL_ERROR_PREFIX)
    }
}

/// What every remote call resolves to, regardless of verb.
#[derive(Debug, Clone, PartialEq)]
pub enum OperationOutcome<T> {
    Success(T),
    Failure(OperationFailure),
}

impl<T> OperationOutcome<T> {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    pub fn failure(&self) -> Option<&OperationFailure> {
        match self {
            Self::Success(_) => None,
            Self::Failure(failure) => Some(failure),
        }
    }

    pub fn into_result(self) -> Result<T, OperationFailure> {
        match self {
            Self::Success(value) => Ok(value),
            Self::Failure(failure) => Err(failure),
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> OperationOutcome<U> {
        match self {
            Self::Success(value) => OperationOutcome::Success(f(value)),
            Self::Failure(failure) => OperationOutcome::Failure(failure),
        }
    }
}

impl<T> From<Result<T, OperationFailure>> for OperationOutcome<T> {
    fn from(value: Result<T, OperationFailure>) -> Self {
        match value {
            Ok(value) => Self::Success(value),
            Err(failure) => Self::Failure(failure),
        }
    }
}
