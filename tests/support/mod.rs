//! In-process fakes of the host capabilities and remote services.

#![allow(dead_code)]
#![allow(clippy::unwrap_used)]

pub mod services;

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicI64, AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use harvester_core::pipeline::TitleWaitConfig;
use harvester_core::remote::LedgerEntry;
use harvester_core::{
    ContentId, Database, DownloadDelta, DownloadDriver, DownloadEngine, DownloadHost, DownloadId,
    DownloadMetadata, DownloadRequest, ExistenceCheck, ExtractError, HostError, Ledger,
    LedgerError, ListingPage, ListingSnapshot, NativeState, Notifier, ResourceDescriptor,
    ResourceExtractor, ResourceInfo, ResourceKind, RetryPolicy, StateStore, StopFlag, Tab,
    TabDownloader, TabHost, TabId,
};
use tokio::sync::mpsc;

// ==================== Download Host ====================

/// How the fake host answers one download request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Script {
    Complete,
    Interrupt,
    Reject(String),
}

type ScriptFn = Box<dyn Fn(&DownloadRequest) -> Script + Send + Sync>;

/// Native download fake that reports terminal events after a delay.
pub struct FakeDownloadHost {
    events: mpsc::UnboundedSender<DownloadDelta>,
    script: ScriptFn,
    delay: Duration,
    next_id: AtomicU64,
    active: Arc<AtomicUsize>,
    max_active: Arc<AtomicUsize>,
    requests: Mutex<Vec<DownloadRequest>>,
}

impl FakeDownloadHost {
    pub fn new(
        delay: Duration,
        script: impl Fn(&DownloadRequest) -> Script + Send + Sync + 'static,
    ) -> (Arc<Self>, mpsc::UnboundedReceiver<DownloadDelta>) {
        let (tx, rx) = mpsc::unbounded_channel();
        let host = Arc::new(Self {
            events: tx,
            script: Box::new(script),
            delay,
            next_id: AtomicU64::new(0),
            active: Arc::new(AtomicUsize::new(0)),
            max_active: Arc::new(AtomicUsize::new(0)),
            requests: Mutex::new(Vec::new()),
        });
        (host, rx)
    }

    pub fn completing(delay: Duration) -> (Arc<Self>, mpsc::UnboundedReceiver<DownloadDelta>) {
        Self::new(delay, |_| Script::Complete)
    }

    pub fn requests(&self) -> Vec<DownloadRequest> {
        self.requests.lock().unwrap().clone()
    }

    pub fn max_active(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl DownloadHost for FakeDownloadHost {
    async fn start_download(&self, request: &DownloadRequest) -> Result<DownloadId, HostError> {
        self.requests.lock().unwrap().push(request.clone());
        let state = match (self.script)(request) {
            Script::Reject(message) => return Err(HostError::new(message)),
            Script::Complete => NativeState::Complete,
            Script::Interrupt => NativeState::Interrupted,
        };

        let id = DownloadId(self.next_id.fetch_add(1, Ordering::SeqCst) + 1);
        let now = self.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active.fetch_max(now, Ordering::SeqCst);

        let events = self.events.clone();
        let active = Arc::clone(&self.active);
        let delay = self.delay;
        let filename = request.filename.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            active.fetch_sub(1, Ordering::SeqCst);
            let _ = events.send(DownloadDelta {
                id,
                state: Some(state),
                filename: Some(format!("/downloads/{filename}")),
                file_size: Some(1024),
                error: None,
            });
        });
        Ok(id)
    }
}

/// Creates a driver over `host` with its event pump running.
pub fn spawn_driver(
    host: Arc<FakeDownloadHost>,
    events: mpsc::UnboundedReceiver<DownloadDelta>,
) -> Arc<DownloadDriver> {
    let driver = Arc::new(DownloadDriver::new(host, "douyin"));
    driver.spawn_event_pump(events);
    driver
}

// ==================== Existence Check ====================

/// Existence check that treats `present` filenames as already on disk.
#[derive(Default)]
pub struct FakeExistence {
    present: Mutex<HashSet<String>>,
    calls: Mutex<Vec<Vec<String>>>,
}

impl FakeExistence {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_present(filenames: &[&str]) -> Arc<Self> {
        let check = Self::default();
        check
            .present
            .lock()
            .unwrap()
            .extend(filenames.iter().map(|f| (*f).to_string()));
        Arc::new(check)
    }

    /// Filenames of every call, in call order.
    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ExistenceCheck for FakeExistence {
    async fn filter_existing(
        &self,
        descriptors: Vec<ResourceDescriptor>,
    ) -> Vec<ResourceDescriptor> {
        self.calls
            .lock()
            .unwrap()
            .push(descriptors.iter().map(|d| d.filename.clone()).collect());
        let present = self.present.lock().unwrap();
        descriptors
            .into_iter()
            .filter(|d| !present.contains(&d.filename))
            .collect()
    }
}

// ==================== Tabs ====================

/// Tab host fake. Every opened tab renders its title immediately unless
/// registered as unrendered; focusing renders it.
#[derive(Default)]
pub struct FakeTabs {
    next_id: AtomicI64,
    open: Mutex<Vec<Tab>>,
    titles: Mutex<HashMap<TabId, String>>,
    fail_urls: Mutex<HashSet<String>>,
    opened: Mutex<Vec<String>>,
    closed: Mutex<Vec<TabId>>,
    focused: Mutex<Vec<TabId>>,
}

impl FakeTabs {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Adds an already open tab.
    pub fn add_tab(&self, url: &str, title: &str) -> Tab {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst) + 1;
        let mut tab = Tab::new(id, url);
        tab.title = Some(title.to_string());
        self.titles.lock().unwrap().insert(id, title.to_string());
        self.open.lock().unwrap().push(tab.clone());
        tab
    }

    pub fn fail_open(&self, url: &str) {
        self.fail_urls.lock().unwrap().insert(url.to_string());
    }

    pub fn opened(&self) -> Vec<String> {
        self.opened.lock().unwrap().clone()
    }

    pub fn closed(&self) -> Vec<TabId> {
        self.closed.lock().unwrap().clone()
    }

    pub fn focused(&self) -> Vec<TabId> {
        self.focused.lock().unwrap().clone()
    }

    pub fn open_count(&self) -> usize {
        self.open.lock().unwrap().len()
    }
}

#[async_trait]
impl TabHost for FakeTabs {
    async fn open_tab(&self, url: &str, _active: bool) -> Result<Tab, HostError> {
        if self.fail_urls.lock().unwrap().contains(url) {
            return Err(HostError::new(format!("cannot open {url}")));
        }
        self.opened.lock().unwrap().push(url.to_string());
        Ok(self.add_tab(url, "Rendered content"))
    }

    async fn close_tab(&self, tab_id: TabId) -> Result<(), HostError> {
        self.closed.lock().unwrap().push(tab_id);
        self.open.lock().unwrap().retain(|t| t.id != Some(tab_id));
        Ok(())
    }

    async fn focus_tab(&self, tab_id: TabId) -> Result<(), HostError> {
        self.focused.lock().unwrap().push(tab_id);
        self.titles
            .lock()
            .unwrap()
            .insert(tab_id, "Rendered content".to_string());
        Ok(())
    }

    async fn list_tabs(&self) -> Result<Vec<Tab>, HostError> {
        Ok(self.open.lock().unwrap().clone())
    }

    async fn document_title(&self, tab: &Tab) -> Result<Option<String>, HostError> {
        let titles = self.titles.lock().unwrap();
        Ok(tab.id.and_then(|id| titles.get(&id).cloned()))
    }
}

// ==================== Listing ====================

/// Listing page whose visible links grow only when scrolled.
pub struct FakeListing {
    pages: Vec<ListingSnapshot>,
    position: AtomicUsize,
    scans: AtomicUsize,
    fail_after: Option<usize>,
}

impl FakeListing {
    /// `pages[n]` is what a scan sees after `n` scrolls; the last page repeats.
    pub fn new(pages: Vec<ListingSnapshot>) -> Arc<Self> {
        Arc::new(Self {
            pages,
            position: AtomicUsize::new(0),
            scans: AtomicUsize::new(0),
            fail_after: None,
        })
    }

    /// Listing of `counts[n]` links after `n` scrolls.
    pub fn growing(counts: &[usize], reported_total: Option<usize>) -> Arc<Self> {
        Self::new(
            counts
                .iter()
                .map(|&count| ListingSnapshot {
                    reported_total,
                    links: content_links(count),
                })
                .collect(),
        )
    }

    /// Listing whose scans fail after `scans` successful ones.
    pub fn failing_after(counts: &[usize], scans: usize) -> Arc<Self> {
        let mut listing = Arc::into_inner(Self::growing(counts, None)).unwrap();
        listing.fail_after = Some(scans);
        Arc::new(listing)
    }

    pub fn scrolls(&self) -> usize {
        self.position.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ListingPage for FakeListing {
    async fn scan(&self, _tab: &Tab) -> Result<ListingSnapshot, HostError> {
        let scans = self.scans.fetch_add(1, Ordering::SeqCst);
        if self.fail_after.is_some_and(|limit| scans >= limit) {
            return Err(HostError::new("script injection failed"));
        }
        let index = self.position.load(Ordering::SeqCst).min(self.pages.len() - 1);
        Ok(self.pages[index].clone())
    }

    async fn scroll_to_end(&self, _tab: &Tab) -> Result<(), HostError> {
        self.position.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Video links with ids `1..=count`.
pub fn content_links(count: usize) -> Vec<String> {
    (1..=count).map(video_url).collect()
}

pub fn video_url(id: usize) -> String {
    format!("https://www.example.com/video/{id}")
}

// ==================== Extractor ====================

/// Extractor producing one file per content page, named after its id.
#[derive(Default)]
pub struct FakeExtractor {
    blocked: Mutex<HashSet<String>>,
    extra_files: Mutex<HashMap<String, usize>>,
    extracted: Mutex<Vec<String>>,
}

impl FakeExtractor {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Pages at `url` show a verification challenge.
    pub fn block(&self, url: &str) {
        self.blocked.lock().unwrap().insert(url.to_string());
    }

    /// Pages at `url` carry `count` files.
    pub fn set_file_count(&self, url: &str, count: usize) {
        self.extra_files
            .lock()
            .unwrap()
            .insert(url.to_string(), count);
    }

    pub fn extracted(&self) -> Vec<String> {
        self.extracted.lock().unwrap().clone()
    }
}

/// Filename the fake extractor gives file `index` of content `id`.
pub fn file_name_for(id: &str, index: usize) -> String {
    format!("author/title_{id}_{index}.mp4")
}

#[async_trait]
impl ResourceExtractor for FakeExtractor {
    async fn extract(&self, tab: &Tab) -> Result<ResourceInfo, ExtractError> {
        self.extracted.lock().unwrap().push(tab.url.clone());
        if self.blocked.lock().unwrap().contains(&tab.url) {
            return Err(ExtractError::Blocked {
                url: tab.url.clone(),
            });
        }
        let Some(id) = ContentId::from_url(&tab.url) else {
            return Err(ExtractError::Unsupported {
                url: tab.url.clone(),
            });
        };
        let kind = if tab.url.contains("/note/") {
            ResourceKind::Note
        } else {
            ResourceKind::Video
        };
        let count = self
            .extra_files
            .lock()
            .unwrap()
            .get(&tab.url)
            .copied()
            .unwrap_or(1);

        let files = (0..count)
            .map(|index| {
                ResourceDescriptor::new(
                    kind,
                    format!("https://cdn.example.com/{id}/{index}.mp4"),
                    file_name_for(id.as_str(), index),
                )
                .with_content_id(id.clone())
                .with_author_and_title("author", format!("title {id}"))
                .with_source_page(&tab.url)
            })
            .collect();

        Ok(ResourceInfo {
            content_id: Some(id.clone()),
            author_name: "author".to_string(),
            title: format!("title {id}"),
            files,
        })
    }
}

// ==================== Ledger ====================

/// Ledger fake answering with a fixed missing list and recording writes.
#[derive(Default)]
pub struct RecordingLedger {
    missing: Option<Vec<ContentId>>,
    queries: Mutex<Vec<Vec<ContentId>>>,
    entries: Mutex<Vec<LedgerEntry>>,
    files: Mutex<Vec<DownloadMetadata>>,
}

impl RecordingLedger {
    /// Ledger that reports `missing` for any query.
    pub fn answering(missing: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            missing: Some(missing.iter().map(|id| ContentId::new(*id)).collect()),
            ..Self::default()
        })
    }

    /// Ledger that cannot be reached.
    pub fn unreachable() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn queries(&self) -> Vec<Vec<ContentId>> {
        self.queries.lock().unwrap().clone()
    }

    pub fn entries(&self) -> Vec<LedgerEntry> {
        self.entries.lock().unwrap().clone()
    }

    pub fn files(&self) -> Vec<DownloadMetadata> {
        self.files.lock().unwrap().clone()
    }
}

#[async_trait]
impl Ledger for RecordingLedger {
    async fn find_missing_ids(&self, ids: &[ContentId]) -> Option<Vec<ContentId>> {
        self.queries.lock().unwrap().push(ids.to_vec());
        self.missing.clone()
    }

    async fn includes(&self, _ids: &[ContentId]) -> Option<Vec<ContentId>> {
        None
    }

    async fn save_one(&self, entry: &LedgerEntry) -> Result<(), LedgerError> {
        self.entries.lock().unwrap().push(entry.clone());
        Ok(())
    }

    async fn save_file(&self, metadata: &DownloadMetadata) -> Result<(), LedgerError> {
        self.files.lock().unwrap().push(metadata.clone());
        Ok(())
    }
}

// ==================== Notifier ====================

#[derive(Default)]
pub struct RecordingNotifier {
    messages: Mutex<Vec<String>>,
}

impl RecordingNotifier {
    pub fn messages(&self) -> Vec<String> {
        self.messages.lock().unwrap().clone()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, message: &str) {
        self.messages.lock().unwrap().push(message.to_string());
    }
}

// ==================== Harness ====================

/// Every fake wired into a tab downloader over an in-memory state store.
pub struct Harness {
    pub host: Arc<FakeDownloadHost>,
    pub tabs: Arc<FakeTabs>,
    pub extractor: Arc<FakeExtractor>,
    pub existence: Arc<FakeExistence>,
    pub ledger: Arc<RecordingLedger>,
    pub store: StateStore,
    pub stop: StopFlag,
    pub engine: Arc<DownloadEngine>,
    pub downloader: Arc<TabDownloader>,
}

impl Harness {
    pub async fn new(ledger: Arc<RecordingLedger>) -> Self {
        Self::with_existence(ledger, FakeExistence::new()).await
    }

    pub async fn with_existence(
        ledger: Arc<RecordingLedger>,
        existence: Arc<FakeExistence>,
    ) -> Self {
        Self::build(ledger, existence, |_| Script::Complete).await
    }

    pub async fn build(
        ledger: Arc<RecordingLedger>,
        existence: Arc<FakeExistence>,
        script: impl Fn(&DownloadRequest) -> Script + Send + Sync + 'static,
    ) -> Self {
        let (host, events) = FakeDownloadHost::new(Duration::from_millis(5), script);
        let driver = spawn_driver(Arc::clone(&host), events);
        let retry = Arc::new(RetryPolicy::new(existence.clone()));
        let engine = Arc::new(DownloadEngine::new(2, driver, retry).unwrap());

        let store = StateStore::new(Database::new_in_memory().await.unwrap());
        let stop = StopFlag::new(store.clone());
        let tabs = FakeTabs::new();
        let extractor = FakeExtractor::new();

        let downloader = TabDownloader::new(
            tabs.clone(),
            extractor.clone(),
            existence.clone(),
            Arc::clone(&engine),
            ledger.clone(),
            stop.clone(),
        )
        .with_title_wait(TitleWaitConfig {
            host_prefix: "example.com".to_string(),
            timeout: Duration::from_millis(50),
            poll: Duration::from_millis(5),
        });

        Self {
            host,
            tabs,
            extractor,
            existence,
            ledger,
            store,
            stop,
            engine,
            downloader: Arc::new(downloader),
        }
    }
}
