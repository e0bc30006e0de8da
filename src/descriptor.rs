//! Resource descriptors and content identifiers.
//!
//! A [`ResourceDescriptor`] describes one downloadable file discovered on a
//! content page. Descriptors are produced by a page extractor, posted as-is
//! to the existence-check service, and consumed by the download driver.

use std::fmt;

use serde::{Deserialize, Serialize};
use url::Url;

/// Path prefix of video content pages.
const VIDEO_PATH_PREFIX: &str = "/video";

/// Path prefix of note (image gallery) content pages.
const NOTE_PATH_PREFIX: &str = "/note";

/// Kind of content a descriptor belongs to.
///
/// The kind selects the recovery strategy applied when a download fails.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    /// A video file; alternate sources may exist for the same content.
    Video,
    /// One image of a note (image gallery).
    Note,
}

impl ResourceKind {
    /// Returns the kind served by a content page path, if any.
    #[must_use]
    pub fn from_page_path(path: &str) -> Option<Self> {
        if path.starts_with(VIDEO_PATH_PREFIX) {
            Some(Self::Video)
        } else if path.starts_with(NOTE_PATH_PREFIX) {
            Some(Self::Note)
        } else {
            None
        }
    }

    /// Returns the stable lowercase label.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Video => "video",
            Self::Note => "note",
        }
    }
}

/// Opaque identifier of one piece of site content.
///
/// Parsed from the second path segment of a canonical content URL such as
/// `https://host/video/6852149717439089928`. Used as the ledger key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentId(String);

impl ContentId {
    /// Wraps a raw identifier.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Returns the identifier as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Derives the content id from a content page URL.
    ///
    /// Returns `None` when the URL does not parse or has no non-empty
    /// second path segment.
    #[must_use]
    pub fn from_url(url: &str) -> Option<Self> {
        let parsed = Url::parse(url).ok()?;
        let mut segments = parsed.path_segments()?;
        segments.next()?;
        let id = segments.next()?;
        (!id.is_empty()).then(|| Self(id.to_string()))
    }
}

impl fmt::Display for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Returns true if the URL points at a video or note content page.
#[must_use]
pub fn is_content_page(url: &str) -> bool {
    Url::parse(url)
        .ok()
        .and_then(|u| ResourceKind::from_page_path(u.path()))
        .is_some()
}

/// One downloadable file and its provenance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResourceDescriptor {
    /// Content kind.
    #[serde(rename = "type")]
    pub kind: ResourceKind,
    /// Media URL to download.
    pub url: String,
    /// Relative save path handed to the download manager (`author/file.ext`).
    pub filename: String,
    /// Bare file name without the author directory.
    #[serde(default)]
    pub file_name: String,
    /// Content this file belongs to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content_id: Option<ContentId>,
    /// Author display name.
    #[serde(default)]
    pub author_name: String,
    /// Content title.
    #[serde(default)]
    pub title: String,
    /// Tab the descriptor was extracted from.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tab_id: Option<i64>,
    /// Content page the file was found on.
    #[serde(default)]
    pub source_page_url: String,
    /// Platform label recorded in the ledger; the driver default applies when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source_platform: Option<String>,
    /// Sibling candidates for the same content, used for retry substitution.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub alternate_sources: Vec<ResourceDescriptor>,
}

impl ResourceDescriptor {
    /// Creates a descriptor with only the required fields set.
    ///
    /// `file_name` defaults to the last segment of `filename`.
    #[must_use]
    pub fn new(kind: ResourceKind, url: impl Into<String>, filename: impl Into<String>) -> Self {
        let filename = filename.into();
        let file_name = filename
            .rsplit(['/', '\\'])
            .next()
            .unwrap_or_default()
            .to_string();
        Self {
            kind,
            url: url.into(),
            filename,
            file_name,
            content_id: None,
            author_name: String::new(),
            title: String::new(),
            tab_id: None,
            source_page_url: String::new(),
            source_platform: None,
            alternate_sources: Vec::new(),
        }
    }

    /// Sets the content id.
    #[must_use]
    pub fn with_content_id(mut self, id: ContentId) -> Self {
        self.content_id = Some(id);
        self
    }

    /// Sets author and title.
    #[must_use]
    pub fn with_author_and_title(
        mut self,
        author_name: impl Into<String>,
        title: impl Into<String>,
    ) -> Self {
        self.author_name = author_name.into();
        self.title = title.into();
        self
    }

    /// Sets the source page URL.
    #[must_use]
    pub fn with_source_page(mut self, url: impl Into<String>) -> Self {
        self.source_page_url = url.into();
        self
    }

    /// Sets the alternate sources.
    #[must_use]
    pub fn with_alternates(mut self, alternates: Vec<ResourceDescriptor>) -> Self {
        self.alternate_sources = alternates;
        self
    }

    /// Returns a copy saved under a different relative path.
    #[must_use]
    pub fn renamed(&self, filename: impl Into<String>) -> Self {
        Self {
            filename: filename.into(),
            ..self.clone()
        }
    }
}

/// Normalized extraction result for one content page.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ResourceInfo {
    /// Content id of the page, when derivable.
    pub content_id: Option<ContentId>,
    /// Author display name.
    pub author_name: String,
    /// Content title.
    pub title: String,
    /// Files to download.
    pub files: Vec<ResourceDescriptor>,
}
