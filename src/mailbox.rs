//! The single-slot, consume-once mailbox for external commands.
//!
//! A mailbox holds at most one pending [`ExternalCommand`]. Posting replaces
//! anything not yet taken; taking clears the slot.

use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use reqwest::Client as ReqwestClient;
use url::Url;

use crate::client::process_error_response;
use crate::types::{ExternalCommand, MailboxEnvelope};
use crate::{Error, Result};

/// Storage for at most one pending command.
#[async_trait::async_trait]
pub trait Mailbox: Send + Sync {
    /// Remove and return the pending command, if any.
    async fn take(&self) -> Result<Option<ExternalCommand>>;

    /// Store `command`, overwriting any command not yet taken.
    async fn post(&self, command: ExternalCommand) -> Result<()>;
}

/// In-process mailbox.
#[derive(Debug, Default)]
pub struct SlotMailbox {
    slot: Mutex<Option<ExternalCommand>>,
}

impl SlotMailbox {
    /// Create an empty mailbox.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns true if a command is waiting.
    pub fn is_pending(&self) -> bool {
        self.slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }
}

#[async_trait::async_trait]
impl Mailbox for SlotMailbox {
    async fn take(&self) -> Result<Option<ExternalCommand>> {
        Ok(self
            .slot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take())
    }

    async fn post(&self, command: ExternalCommand) -> Result<()> {
        *self.slot.lock().unwrap_or_else(PoisonError::into_inner) = Some(command);
        Ok(())
    }
}

/// Mailbox exposed by a remote endpoint.
///
/// `GET` returns `{data}` and clears the slot; `POST` stores a command.
#[derive(Debug, Clone)]
pub struct HttpMailbox {
    client: ReqwestClient,
    url: Url,
}

impl HttpMailbox {
    /// Create a mailbox client for `url`, e.g. `http://localhost:5173/api/external-send`.
    pub fn new(url: &str, timeout: Duration) -> Result<Self> {
        let url = Url::parse(url)?;
        let client = ReqwestClient::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| {
                Error::http_client(
                    format!("Failed to build HTTP client: {e}"),
                    Some(Box::new(e)),
                )
            })?;
        Ok(Self { client, url })
    }

    /// The endpoint this mailbox talks to.
    pub fn url(&self) -> &Url {
        &self.url
    }
}

fn transport_error(e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::timeout(format!("Mailbox request timed out: {e}"), None)
    } else if e.is_connect() {
        Error::connection(format!("Mailbox connection error: {e}"), Some(Box::new(e)))
    } else {
        Error::http_client(format!("Mailbox request failed: {e}"), Some(Box::new(e)))
    }
}

#[async_trait::async_trait]
impl Mailbox for HttpMailbox {
    async fn take(&self) -> Result<Option<ExternalCommand>> {
        let response = self
            .client
            .get(self.url.clone())
            .send()
            .await
            .map_err(transport_error)?;
        if !response.status().is_success() {
            return Err(process_error_response(response).await);
        }
        let envelope: MailboxEnvelope = response.json().await.map_err(|e| {
            Error::serialization(
                format!("Failed to parse mailbox response: {e}"),
                Some(Box::new(e)),
            )
        })?;
        Ok(envelope.data)
    }

    async fn post(&self, command: ExternalCommand) -> Result<()> {
        let response = self
            .client
            .post(self.url.clone())
            .json(&command)
            .send()
            .await
            .map_err(transport_error)?;
        if !response.status().is_success() {
            return Err(process_error_response(response).await);
        }
        Ok(())
    }
}
