//! Error types for the remote ledger and existence-check services.

use thiserror::Error;

/// Errors from one HTTP exchange with a local service.
#[derive(Debug, Error)]
pub enum RemoteError {
    /// Connection refused, timeout, TLS failure.
    #[error("request to {endpoint} failed: {source}")]
    Transport {
        /// Endpoint URL.
        endpoint: String,
        /// Underlying client error.
        #[source]
        source: reqwest::Error,
    },

    /// Service answered with a non-success status.
    #[error("HTTP {status} from {endpoint}")]
    HttpStatus {
        /// Endpoint URL.
        endpoint: String,
        /// Status code.
        status: u16,
    },

    /// Response body did not decode.
    #[error("invalid response from {endpoint}: {source}")]
    Decode {
        /// Endpoint URL.
        endpoint: String,
        /// Underlying client error.
        #[source]
        source: reqwest::Error,
    },

    /// The HTTP client could not be built.
    #[error("failed to build HTTP client: {0}")]
    ClientBuild(#[source] reqwest::Error),
}

impl RemoteError {
    /// Creates a transport error.
    pub fn transport(endpoint: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Transport {
            endpoint: endpoint.into(),
            source,
        }
    }

    /// Creates an HTTP status error.
    pub fn http_status(endpoint: impl Into<String>, status: u16) -> Self {
        Self::HttpStatus {
            endpoint: endpoint.into(),
            status,
        }
    }

    /// Creates a decode error.
    pub fn decode(endpoint: impl Into<String>, source: reqwest::Error) -> Self {
        Self::Decode {
            endpoint: endpoint.into(),
            source,
        }
    }
}

/// Errors from ledger writes.
#[derive(Debug, Error)]
pub enum LedgerError {
    /// Saving file metadata failed.
    #[error("failed to save file metadata for {source_url}: {source}")]
    SaveMetadataFailed {
        /// Media URL of the file.
        source_url: String,
        /// Underlying failure.
        #[source]
        source: RemoteError,
    },

    /// Saving the content record failed.
    #[error("failed to save content {content_id}: {source}")]
    SaveContentFailed {
        /// Content id.
        content_id: String,
        /// Underlying failure.
        #[source]
        source: RemoteError,
    },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_status_display() {
        let error = RemoteError::http_status("http://localhost:3000/douyin/saveFile", 500);
        let msg = error.to_string();
        assert!(msg.contains("500"), "Expected status in: {msg}");
        assert!(msg.contains("/douyin/saveFile"), "Expected endpoint in: {msg}");
    }

    #[test]
    fn test_ledger_error_display_names_url() {
        let error = LedgerError::SaveMetadataFailed {
            source_url: "https://cdn.example.com/a.mp4".to_string(),
            source: RemoteError::http_status("http://localhost:3000/douyin/saveFile", 503),
        };
        let msg = error.to_string();
        assert!(msg.contains("a.mp4"), "Expected URL in: {msg}");
        assert!(msg.contains("503"), "Expected cause in: {msg}");
    }
}
