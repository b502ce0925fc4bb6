use async_trait::async_trait;
use reqwest::{header, Client, RequestBuilder, StatusCode};
use serde::de::DeserializeOwned;
use serde_json::Value;
use shared::{
    domain::UserId,
    error::{value_text, RelayErrorBody},
    protocol::{UserPage, UserRecord},
};
use tracing::{debug, warn};
use url::Url;

use crate::error::{ClientError, Operation, OperationOutcome};

pub const DEFAULT_RELAY_URL: &str = "http://127.0.0.1:8005";
pub const DEFAULT_COLLECTION_PATH: &str = "/api/systemusers";

/// Where the relay's user collection lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DirectoryClientConfig {
    pub base_url: String,
    pub collection_path: String,
}

impl DirectoryClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            ..Self::default()
        }
    }
}

impl Default for DirectoryClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_RELAY_URL.into(),
            collection_path: DEFAULT_COLLECTION_PATH.into(),
        }
    }
}

/// The remote user collection. Implementations never panic or return early
/// with an error: every call resolves to an [`OperationOutcome`] and touches
/// no local state.
#[async_trait]
pub trait UserDirectory: Send + Sync {
    async fn list_all(&self) -> OperationOutcome<UserPage>;
    async fn get_one(&self, id: &UserId) -> OperationOutcome<UserRecord>;
    async fn create(&self, record: &UserRecord) -> OperationOutcome<UserRecord>;
    async fn update(&self, record: &UserRecord) -> OperationOutcome<UserRecord>;
    async fn remove(&self, id: &UserId) -> OperationOutcome<UserRecord>;
}

/// [`UserDirectory`] over HTTP against the relay.
pub struct HttpUserDirectory {
    http: Client,
    collection_url: Url,
}

impl HttpUserDirectory {
    pub fn new(config: &DirectoryClientConfig) -> Result<Self, ClientError> {
        Self::with_client(Client::new(), config)
    }

    pub fn with_client(http: Client, config: &DirectoryClientConfig) -> Result<Self, ClientError> {
        let mut collection_url = Url::parse(config.base_url.trim())?;
        if collection_url.cannot_be_a_base() {
            return Err(ClientError::UnsupportedBaseUrl(config.base_url.clone()));
        }
        collection_url.set_path(config.collection_path.trim_end_matches('/'));
        Ok(Self {
            http,
            collection_url,
        })
    }

    pub fn collection_url(&self) -> &Url {
        &self.collection_url
    }

    fn member_url(&self, id: &UserId) -> Result<Url, ClientError> {
        if id.as_str().is_empty() {
            return Err(ClientError::MissingIdentifier);
        }
        let mut url = self.collection_url.clone();
        url.path_segments_mut()
            .map_err(|_| ClientError::UnsupportedBaseUrl(self.collection_url.to_string()))?
            .pop_if_empty()
            .push(id.as_str());
        Ok(url)
    }

    async fn send<T: DeserializeOwned>(&self, request: RequestBuilder) -> Result<T, ClientError> {
        let response = request
            .header(header::ACCEPT, "application/json")
            .send()
            .await?;
        let status = response.status();
        let body = response.bytes().await?;
        decode_response(status, &body)
    }

    async fn run_list_all(&self) -> Result<UserPage, ClientError> {
        self.send(self.http.get(self.collection_url.clone())).await
    }

    async fn run_get_one(&self, id: &UserId) -> Result<UserRecord, ClientError> {
        let url = self.member_url(id)?;
        self.send(self.http.get(url)).await
    }

    async fn run_create(&self, record: &UserRecord) -> Result<UserRecord, ClientError> {
        self.send(self.http.post(self.collection_url.clone()).json(record))
            .await
    }

    async fn run_update(&self, record: &UserRecord) -> Result<UserRecord, ClientError> {
        let id = record.id.as_ref().ok_or(ClientError::MissingIdentifier)?;
        let url = self.member_url(id)?;
        self.send(self.http.put(url).json(record)).await
    }

    async fn run_remove(&self, id: &UserId) -> Result<UserRecord, ClientError> {
        let url = self.member_url(id)?;
        self.send(self.http.delete(url)).await
    }
}

#[async_trait]
impl UserDirectory for HttpUserDirectory {
    async fn list_all(&self) -> OperationOutcome<UserPage> {
        settle(Operation::ListAll, self.run_list_all().await)
    }

    async fn get_one(&self, id: &UserId) -> OperationOutcome<UserRecord> {
        debug!(user_id = %id, "directory: fetching one user");
        settle(Operation::GetOne, self.run_get_one(id).await)
    }

    async fn create(&self, record: &UserRecord) -> OperationOutcome<UserRecord> {
        debug!(username = record.username().unwrap_or_default(), "directory: creating user");
        settle(Operation::Create, self.run_create(record).await)
    }

    async fn update(&self, record: &UserRecord) -> OperationOutcome<UserRecord> {
        debug!(
            user_id = record.id.as_ref().map(UserId::as_str).unwrap_or_default(),
            "directory: updating user"
        );
        settle(Operation::Update, self.run_update(record).await)
    }

    async fn remove(&self, id: &UserId) -> OperationOutcome<UserRecord> {
        debug!(user_id = %id, "directory: deleting user");
        settle(Operation::Remove, self.run_remove(id).await)
    }
}

fn settle<T>(operation: Operation, result: Result<T, ClientError>) -> OperationOutcome<T> {
    match result {
        Ok(value) => OperationOutcome::Success(value),
        Err(err) => {
            let failure = err.into_failure(operation);
            warn!(
                operation = operation.name(),
                status = %failure.status,
                message = %failure.message,
                "directory: call failed"
            );
            OperationOutcome::Failure(failure)
        }
    }
}

/// A body with an `error` member is a server failure whatever the status
/// code; a non-2xx body without it is labelled with the numeric status.
pub(crate) fn decode_response<T: DeserializeOwned>(
    status: StatusCode,
    body: &[u8],
) -> Result<T, ClientError> {
    let parsed = serde_json::from_slice::<Value>(body);

    if let Ok(value) = &parsed {
        if let Some(error) = value.get("error").filter(|error| !error.is_null()) {
            let status = match serde_json::from_value::<RelayErrorBody>(value.clone()) {
                Ok(relay_error) => relay_error.status_label(),
                Err(_) => value_text(error),
            };
            let message = value.get("message").map(value_text).unwrap_or_default();
            return Err(ClientError::Remote { status, message });
        }
    }

    if !status.is_success() {
        let text = String::from_utf8_lossy(body).trim().to_string();
        let message = if text.is_empty() {
            status.canonical_reason().unwrap_or_default().to_string()
        } else {
            text
        };
        return Err(ClientError::Remote {
            status: status.as_u16().to_string(),
            message,
        });
    }

    Ok(serde_json::from_value(parsed?)?)
}

#[cfg(test)]
#[path = "tests/directory_tests.rs"]
mod tests;
