//! Existence check against the local path service.
//!
//! The service receives the candidate descriptors together with the
//! downloads location and answers with the subset that is absent on disk.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, instrument, warn};

use super::http_client::ServiceClient;
use crate::descriptor::ResourceDescriptor;
use crate::host::Notifier;

/// Notification shown when the service cannot be reached.
pub const SERVICE_DOWN_MESSAGE: &str = "existence check service is not running";

/// Filters descriptors down to the files not yet on disk.
#[async_trait]
pub trait ExistenceCheck: Send + Sync {
    /// Returns the descriptors whose files are absent.
    ///
    /// Never fails: an unavailable check yields an empty list.
    async fn filter_existing(&self, descriptors: Vec<ResourceDescriptor>)
    -> Vec<ResourceDescriptor>;
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LocatedDescriptor<'a> {
    #[serde(flatten)]
    descriptor: &'a ResourceDescriptor,
    downloads_location: &'a str,
}

#[derive(Deserialize)]
struct ExistenceResponse {
    #[serde(default)]
    result: Value,
}

/// HTTP implementation of [`ExistenceCheck`].
pub struct ExistenceFilter {
    client: ServiceClient,
    endpoint: String,
    downloads_location: String,
    notifier: Arc<dyn Notifier>,
}

impl std::fmt::Debug for ExistenceFilter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExistenceFilter")
            .field("endpoint", &self.endpoint)
            .field("downloads_location", &self.downloads_location)
            .finish_non_exhaustive()
    }
}

impl ExistenceFilter {
    /// Creates a filter posting to `endpoint`.
    pub fn new(
        client: ServiceClient,
        endpoint: impl Into<String>,
        downloads_location: impl Into<String>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        Self {
            client,
            endpoint: endpoint.into(),
            downloads_location: downloads_location.into(),
            notifier,
        }
    }
}

#[async_trait]
impl ExistenceCheck for ExistenceFilter {
    #[instrument(skip(self, descriptors), fields(count = descriptors.len(), endpoint = %self.endpoint))]
    async fn filter_existing(
        &self,
        descriptors: Vec<ResourceDescriptor>,
    ) -> Vec<ResourceDescriptor> {
        if descriptors.is_empty() {
            return Vec::new();
        }

        let body: Vec<LocatedDescriptor<'_>> = descriptors
            .iter()
            .map(|descriptor| LocatedDescriptor {
                descriptor,
                downloads_location: &self.downloads_location,
            })
            .collect();

        let response = match self
            .client
            .post_json::<_, ExistenceResponse>(&self.endpoint, &body)
            .await
        {
            Ok(response) => response,
            Err(error) => {
                warn!(error = %error, "existence check failed");
                self.notifier.notify(SERVICE_DOWN_MESSAGE);
                return Vec::new();
            }
        };

        let absent = parse_result(response.result);
        debug!(requested = descriptors.len(), absent = absent.len(), "existence check done");
        absent
    }
}

/// Decodes the `result` array, dropping entries that are not descriptors.
fn parse_result(result: Value) -> Vec<ResourceDescriptor> {
    let Value::Array(items) = result else {
        debug!("existence result is not an array");
        return Vec::new();
    };

    items
        .into_iter()
        .filter_map(|item| match serde_json::from_value(item) {
            Ok(descriptor) => Some(descriptor),
            Err(error) => {
                warn!(error = %error, "dropping malformed existence result entry");
                None
            }
        })
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::descriptor::ResourceKind;

    #[test]
    fn test_request_item_flattens_descriptor() {
        let descriptor =
            ResourceDescriptor::new(ResourceKind::Video, "https://cdn/v.mp4", "bob/v.mp4");
        let item = LocatedDescriptor {
            descriptor: &descriptor,
            downloads_location: "/data/downloads",
        };
        let json = serde_json::to_value(&item).unwrap();
        assert_eq!(json["url"], "https://cdn/v.mp4");
        assert_eq!(json["type"], "video");
        assert_eq!(json["downloadsLocation"], "/data/downloads");
    }

    #[test]
    fn test_parse_result_non_array_is_empty() {
        assert!(parse_result(serde_json::json!({ "oops": true })).is_empty());
        assert!(parse_result(Value::Null).is_empty());
    }

    #[test]
    fn test_parse_result_strips_location_and_skips_garbage() {
        let result = serde_json::json!([
            { "type": "note", "url": "https://cdn/a.jpg", "filename": "a/a.jpg", "downloadsLocation": "/d" },
            { "nope": 1 }
        ]);
        let parsed = parse_result(result);
        assert_eq!(parsed.len(), 1);
        assert_eq!(parsed[0].url, "https://cdn/a.jpg");
    }
}
