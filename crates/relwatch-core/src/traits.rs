//! Capability traits at the engine's seams.

use async_trait::async_trait;

use crate::error::SourceError;
use crate::types::{ChannelKind, Notification, Outcome, Release, RepoId};

/// A notification transport. Message formatting (length limits, markup
/// dialect) is channel-local and does not affect engine contracts.
#[async_trait]
pub trait Channel: Send + Sync {
    fn kind(&self) -> ChannelKind;

    /// Whether credentials/targets are present. Unconfigured channels are
    /// skipped with a distinct outcome, never attempted.
    fn is_configured(&self) -> bool;

    async fn send(&self, notification: &Notification) -> Outcome;

    /// Send a test message so users can verify credentials from the dashboard.
    async fn send_test(&self) -> Outcome;
}

/// Lists releases for a repository.
#[async_trait]
pub trait ReleaseSource: Send + Sync {
    /// Fetch the most recent releases, newest-first. The detector depends on
    /// this ordering.
    async fn list_releases(&self, repo: &RepoId) -> std::result::Result<Vec<Release>, SourceError>;

    /// Probe whether the repository exists and is accessible.
    async fn repo_exists(&self, repo: &RepoId) -> std::result::Result<bool, SourceError>;
}
