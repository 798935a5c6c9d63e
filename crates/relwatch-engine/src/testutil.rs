//! Shared test doubles for the engine.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;

use relwatch_core::error::SourceError;
use relwatch_core::traits::{Channel, ReleaseSource};
use relwatch_core::types::{ChannelKind, Notification, Outcome, Release, RepoId};
use relwatch_store::StateStore;

pub fn temp_store(name: &str) -> (StateStore, std::path::PathBuf) {
    let dir = std::env::temp_dir().join(format!("relwatch-engine-{name}"));
    std::fs::remove_dir_all(&dir).ok();
    std::fs::create_dir_all(&dir).ok();
    let store = StateStore::open(&dir.join("state.db")).unwrap();
    (store, dir)
}

pub fn release(repo: &str, tag: &str) -> Release {
    let repo = RepoId::parse(repo).unwrap();
    Release {
        html_url: format!("https://github.com/{repo}/releases/tag/{tag}"),
        repo,
        tag: tag.to_string(),
        title: format!("Release {tag}"),
        body: "notes".into(),
        published_at: Utc::now(),
    }
}

/// Source serving canned newest-first pages. Repos without a page error with
/// a network failure. An optional delay simulates a slow upstream.
pub struct StaticSource {
    pages: HashMap<String, Vec<Release>>,
    delay: Option<Duration>,
}

impl StaticSource {
    pub fn new() -> Self {
        Self {
            pages: HashMap::new(),
            delay: None,
        }
    }

    pub fn with_page(mut self, repo: &RepoId, page: Vec<Release>) -> Self {
        self.pages.insert(repo.to_string(), page);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }
}

#[async_trait]
impl ReleaseSource for StaticSource {
    async fn list_releases(&self, repo: &RepoId) -> Result<Vec<Release>, SourceError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.pages
            .get(&repo.to_string())
            .cloned()
            .ok_or_else(|| SourceError::Network(format!("no page for {repo}")))
    }

    async fn repo_exists(&self, repo: &RepoId) -> Result<bool, SourceError> {
        Ok(self.pages.contains_key(&repo.to_string()))
    }
}

/// Channel that records the tags it was asked to send.
pub struct RecordingChannel {
    kind: ChannelKind,
    configured: bool,
    fail_always: bool,
    fail_next: AtomicBool,
    sent: Mutex<Vec<String>>,
}

impl RecordingChannel {
    pub fn new(kind: ChannelKind) -> Self {
        Self {
            kind,
            configured: true,
            fail_always: false,
            fail_next: AtomicBool::new(false),
            sent: Mutex::new(Vec::new()),
        }
    }

    pub fn unconfigured(mut self) -> Self {
        self.configured = false;
        self
    }

    pub fn failing(mut self) -> Self {
        self.fail_always = true;
        self
    }

    /// Fail the first attempt only; retries succeed.
    pub fn failing_once(self) -> Self {
        self.fail_next.store(true, Ordering::SeqCst);
        self
    }

    pub fn sent(&self) -> Vec<String> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Channel for RecordingChannel {
    fn kind(&self) -> ChannelKind {
        self.kind
    }

    fn is_configured(&self) -> bool {
        self.configured
    }

    async fn send(&self, notification: &Notification) -> Outcome {
        if self.fail_always || self.fail_next.swap(false, Ordering::SeqCst) {
            return Outcome::Failed("injected failure".into());
        }
        self.sent
            .lock()
            .unwrap()
            .push(notification.release.tag.clone());
        Outcome::Delivered
    }

    async fn send_test(&self) -> Outcome {
        if self.fail_always {
            return Outcome::Failed("injected failure".into());
        }
        Outcome::Delivered
    }
}
