//! Client for the remote download ledger.
//!
//! The ledger records which content has been downloaded. Every endpoint is
//! `POST {base_url}/{platform}/{operation}` with a JSON body.
//!
//! Reads fold failures into `None`: an unreachable ledger means "unknown",
//! never "nothing missing". Writes return [`LedgerError`] for the caller to
//! log.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, instrument, warn};

use super::error::{LedgerError, RemoteError};
use super::http_client::ServiceClient;
use crate::descriptor::{ContentId, ResourceDescriptor, ResourceInfo};
use crate::download::DownloadMetadata;

/// Content record posted after a content page finished downloading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerEntry {
    /// Content id.
    pub note_id: ContentId,
    /// Author display name.
    pub name: String,
    /// Content title.
    pub title: String,
    /// Content page URL.
    pub url: String,
    /// Always true for entries written after a download.
    pub download: bool,
    /// Files of the content.
    pub files: Vec<ResourceDescriptor>,
}

impl LedgerEntry {
    /// Builds an entry from extraction output; `None` without a content id.
    #[must_use]
    pub fn from_info(info: &ResourceInfo, page_url: &str) -> Option<Self> {
        let note_id = info.content_id.clone()?;
        Some(Self {
            note_id,
            name: info.author_name.clone(),
            title: info.title.clone(),
            url: page_url.to_string(),
            download: true,
            files: info.files.clone(),
        })
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct MissingIdsRequest<'a> {
    note_ids: &'a [ContentId],
}

/// Ledger operations used by the orchestrator and the tab phase.
#[async_trait]
pub trait Ledger: Send + Sync {
    /// Returns the subset of `ids` the ledger has not recorded.
    ///
    /// `None` when the ledger is unreachable or answers with garbage.
    async fn find_missing_ids(&self, ids: &[ContentId]) -> Option<Vec<ContentId>>;

    /// Returns the subset of `ids` the ledger has recorded.
    async fn includes(&self, ids: &[ContentId]) -> Option<Vec<ContentId>>;

    /// Records a downloaded content page.
    async fn save_one(&self, entry: &LedgerEntry) -> Result<(), LedgerError>;

    /// Records metadata of one downloaded file.
    async fn save_file(&self, metadata: &DownloadMetadata) -> Result<(), LedgerError>;
}

/// HTTP implementation of [`Ledger`].
#[derive(Debug, Clone)]
pub struct LedgerClient {
    client: ServiceClient,
    base_url: String,
    platform: String,
}

impl LedgerClient {
    /// Creates a client for `base_url` and the given platform segment.
    pub fn new(
        client: ServiceClient,
        base_url: impl Into<String>,
        platform: impl Into<String>,
    ) -> Self {
        let base_url: String = base_url.into();
        Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
            platform: platform.into(),
        }
    }

    /// Returns the full URL of an operation.
    #[must_use]
    pub fn endpoint(&self, operation: &str) -> String {
        format!("{}/{}/{operation}", self.base_url, self.platform)
    }

    async fn query_ids<B>(&self, operation: &str, body: &B) -> Option<Vec<ContentId>>
    where
        B: Serialize + Sync + ?Sized,
    {
        let endpoint = self.endpoint(operation);
        match self
            .client
            .post_json::<B, Vec<ContentId>>(&endpoint, body)
            .await
        {
            Ok(ids) => Some(ids),
            Err(error) => {
                warn!(endpoint = %endpoint, error = %error, "ledger unreachable");
                None
            }
        }
    }
}

#[async_trait]
impl Ledger for LedgerClient {
    #[instrument(skip(self, ids), fields(count = ids.len()))]
    async fn find_missing_ids(&self, ids: &[ContentId]) -> Option<Vec<ContentId>> {
        let missing = self
            .query_ids("findMissingIds", &MissingIdsRequest { note_ids: ids })
            .await?;
        debug!(missing = missing.len(), "ledger missing ids");
        Some(missing)
    }

    #[instrument(skip(self, ids), fields(count = ids.len()))]
    async fn includes(&self, ids: &[ContentId]) -> Option<Vec<ContentId>> {
        self.query_ids("includes", ids).await
    }

    #[instrument(skip(self, entry), fields(content_id = %entry.note_id))]
    async fn save_one(&self, entry: &LedgerEntry) -> Result<(), LedgerError> {
        self.client
            .post_json_unit(&self.endpoint("saveOne"), entry)
            .await
            .map_err(|source: RemoteError| LedgerError::SaveContentFailed {
                content_id: entry.note_id.to_string(),
                source,
            })
    }

    #[instrument(skip(self, metadata), fields(url = %metadata.source_url))]
    async fn save_file(&self, metadata: &DownloadMetadata) -> Result<(), LedgerError> {
        self.client
            .post_json_unit(&self.endpoint("saveFile"), metadata)
            .await
            .map_err(|source| LedgerError::SaveMetadataFailed {
                source_url: metadata.source_url.clone(),
                source,
            })
    }
}
