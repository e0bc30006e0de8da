//! Shared JSON-over-POST client for the local services.

use std::time::Duration;

use reqwest::{Client, ClientBuilder};
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use super::error::RemoteError;
use crate::user_agent;

/// Default connect timeout in seconds.
pub const CONNECT_TIMEOUT_SECS: u64 = 5;

/// Default whole-request timeout in seconds.
pub const READ_TIMEOUT_SECS: u64 = 30;

/// Thin wrapper over a `reqwest::Client` configured for the local services.
#[derive(Debug, Clone)]
pub struct ServiceClient {
    client: Client,
}

impl ServiceClient {
    /// Builds a client with default timeouts.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError::ClientBuild`] if the TLS backend fails to initialize.
    pub fn new() -> Result<Self, RemoteError> {
        Self::with_timeouts(CONNECT_TIMEOUT_SECS, READ_TIMEOUT_SECS)
    }

    /// Builds a client with explicit timeouts.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError::ClientBuild`] if the TLS backend fails to initialize.
    pub fn with_timeouts(
        connect_timeout_secs: u64,
        read_timeout_secs: u64,
    ) -> Result<Self, RemoteError> {
        let client = base_client_builder(connect_timeout_secs, read_timeout_secs)
            .build()
            .map_err(RemoteError::ClientBuild)?;
        Ok(Self { client })
    }

    /// POSTs a JSON body and decodes a JSON response.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError`] on transport failure, non-2xx status or an
    /// undecodable body.
    pub async fn post_json<B, R>(&self, endpoint: &str, body: &B) -> Result<R, RemoteError>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let response = self.send(endpoint, body).await?;
        response
            .json::<R>()
            .await
            .map_err(|e| RemoteError::decode(endpoint, e))
    }

    /// POSTs a JSON body and ignores the response body.
    ///
    /// # Errors
    ///
    /// Returns [`RemoteError`] on transport failure or non-2xx status.
    pub async fn post_json_unit<B>(&self, endpoint: &str, body: &B) -> Result<(), RemoteError>
    where
        B: Serialize + ?Sized,
    {
        self.send(endpoint, body).await.map(|_| ())
    }

    async fn send<B>(&self, endpoint: &str, body: &B) -> Result<reqwest::Response, RemoteError>
    where
        B: Serialize + ?Sized,
    {
        debug!(endpoint, "POST");
        let response = self
            .client
            .post(endpoint)
            .json(body)
            .send()
            .await
            .map_err(|e| RemoteError::transport(endpoint, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(RemoteError::http_status(endpoint, status.as_u16()));
        }
        Ok(response)
    }
}

fn base_client_builder(connect_timeout_secs: u64, read_timeout_secs: u64) -> ClientBuilder {
    Client::builder()
        .connect_timeout(Duration::from_secs(connect_timeout_secs))
        .timeout(Duration::from_secs(read_timeout_secs))
        .gzip(true)
        .user_agent(user_agent::default_service_user_agent())
}
