//! Cycle dispatcher: fetch, detect, route, deliver, persist.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::future::join_all;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use relwatch_core::traits::{Channel, ReleaseSource};
use relwatch_core::types::{ChannelKind, ChannelToggles, Notification, Outcome, Release};
use relwatch_store::StateStore;

use crate::detector::{Detection, detect_new};
use crate::router::resolve_channels;

/// Delivery policy for a cycle.
#[derive(Debug, Clone)]
pub struct DispatchOptions {
    /// Fallback toggles for projects with no tags.
    pub default_toggles: ChannelToggles,
    /// Cap on a single send attempt.
    pub delivery_timeout: Duration,
    /// One immediate retry after a failed attempt.
    pub retry_once: bool,
}

impl Default for DispatchOptions {
    fn default() -> Self {
        Self {
            default_toggles: ChannelToggles::all_enabled(),
            delivery_timeout: Duration::from_secs(10),
            retry_once: true,
        }
    }
}

/// Per-project summary of one cycle.
#[derive(Debug, Clone, Serialize)]
pub struct ProjectReport {
    pub repo: String,
    pub new_releases: usize,
    pub delivered: usize,
    pub failed: usize,
    /// Sends skipped because the channel had no credentials.
    pub skipped: usize,
    pub gap: bool,
    pub bootstrapped: bool,
    pub error: Option<String>,
}

impl ProjectReport {
    fn new(repo: String) -> Self {
        Self {
            repo,
            new_releases: 0,
            delivered: 0,
            failed: 0,
            skipped: 0,
            gap: false,
            bootstrapped: false,
            error: None,
        }
    }
}

/// Summary of one full cycle across all projects.
#[derive(Debug, Clone, Serialize)]
pub struct CycleReport {
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    /// Set when the cycle itself could not run (store failure listing
    /// projects). Per-project failures live in the project reports instead.
    pub error: Option<String>,
    pub projects: Vec<ProjectReport>,
}

impl CycleReport {
    pub fn delivered(&self) -> usize {
        self.projects.iter().map(|p| p.delivered).sum()
    }

    pub fn failed(&self) -> usize {
        self.projects.iter().map(|p| p.failed).sum()
    }

    pub fn errors(&self) -> usize {
        self.projects.iter().filter(|p| p.error.is_some()).count()
    }
}

/// Runs one cycle end to end. A failure in one project or one channel never
/// blocks the others.
pub struct Dispatcher {
    store: Arc<StateStore>,
    source: Arc<dyn ReleaseSource>,
    channels: HashMap<ChannelKind, Arc<dyn Channel>>,
    options: DispatchOptions,
}

impl Dispatcher {
    pub fn new(
        store: Arc<StateStore>,
        source: Arc<dyn ReleaseSource>,
        channels: Vec<Arc<dyn Channel>>,
        options: DispatchOptions,
    ) -> Self {
        let channels = channels.into_iter().map(|c| (c.kind(), c)).collect();
        Self {
            store,
            source,
            channels,
            options,
        }
    }

    pub fn channel(&self, kind: ChannelKind) -> Option<&Arc<dyn Channel>> {
        self.channels.get(&kind)
    }

    /// Check every tracked project once. Projects run sequentially so the
    /// source sees at most one request at a time; channel fan-out within a
    /// release runs concurrently.
    pub async fn run_cycle(&self) -> CycleReport {
        let started_at = Utc::now();
        let projects = match self.store.list_projects() {
            Ok(projects) => projects,
            Err(e) => {
                error!("cycle aborted, could not list projects: {e}");
                return CycleReport {
                    started_at,
                    finished_at: Utc::now(),
                    error: Some(e.to_string()),
                    projects: Vec::new(),
                };
            }
        };

        info!("🔄 starting check cycle for {} project(s)", projects.len());
        let mut reports = Vec::with_capacity(projects.len());
        for project in &projects {
            reports.push(self.process_project(project).await);
        }

        let report = CycleReport {
            started_at,
            finished_at: Utc::now(),
            error: None,
            projects: reports,
        };
        info!(
            "✅ cycle finished: {} delivered, {} failed, {} project error(s)",
            report.delivered(),
            report.failed(),
            report.errors()
        );
        report
    }

    async fn process_project(&self, project: &relwatch_core::types::TrackedProject) -> ProjectReport {
        let mut report = ProjectReport::new(project.repo.to_string());

        let fetched = match self.source.list_releases(&project.repo).await {
            Ok(fetched) => fetched,
            Err(e) => {
                warn!("⚠️ fetch failed for {}: {e}", project.repo);
                report.error = Some(e.to_string());
                return report;
            }
        };

        let new_releases = match detect_new(project.marker.as_deref(), &fetched) {
            Detection::UpToDate => {
                debug!("{} is up to date", project.repo);
                return report;
            }
            Detection::Bootstrap { baseline } => {
                info!("📌 {} bootstrapped at {baseline}", project.repo);
                report.bootstrapped = true;
                if let Err(e) = self.seed_history(project.id, &fetched, &baseline) {
                    report.error = Some(e.to_string());
                }
                return report;
            }
            Detection::New { releases } => releases,
            Detection::Gap { releases } => {
                warn!(
                    "⚠️ marker {:?} not found in page for {}, treating {} release(s) as new",
                    project.marker,
                    project.repo,
                    releases.len()
                );
                report.gap = true;
                releases
            }
        };

        report.new_releases = new_releases.len();
        let kinds = resolve_channels(&project.tags, self.options.default_toggles);
        if kinds.is_empty() {
            debug!("no channels enabled for {}", project.repo);
        }

        for release in &new_releases {
            // History write failure must not block delivery.
            if let Err(e) = self.store.record_release(project.id, release) {
                warn!("could not record {}@{}: {e}", project.repo, release.tag);
            }
            for (kind, outcome) in self.fan_out(release, &kinds).await {
                match outcome {
                    Outcome::Delivered => {
                        info!("📨 {} {} delivered via {kind}", project.repo, release.tag);
                        report.delivered += 1;
                    }
                    Outcome::Failed(reason) => {
                        warn!(
                            "❌ {} {} failed via {kind}: {reason}",
                            project.repo, release.tag
                        );
                        report.failed += 1;
                    }
                    Outcome::NotConfigured => {
                        debug!("{kind} not configured, skipping {}", project.repo);
                        report.skipped += 1;
                    }
                }
            }
        }

        // The marker advances once all fan-out for the batch has completed,
        // whatever the channel outcomes. Failed sends are not replayed.
        if let Some(newest) = new_releases.last()
            && let Err(e) = self.store.set_marker(project.id, &newest.tag)
        {
            error!("could not advance marker for {}: {e}", project.repo);
            report.error = Some(e.to_string());
        }

        report
    }

    /// All enabled channels attempt the release concurrently. Every resolved
    /// kind yields an outcome, so report totals always add up; a kind with no
    /// registered channel counts as not configured.
    async fn fan_out(
        &self,
        release: &Release,
        kinds: &[ChannelKind],
    ) -> Vec<(ChannelKind, Outcome)> {
        let attempts = kinds.iter().map(|kind| {
            let channel = self.channels.get(kind).cloned();
            let release = release.clone();
            async move {
                let outcome = match channel {
                    Some(channel) => self.deliver(channel, release).await,
                    None => Outcome::NotConfigured,
                };
                (*kind, outcome)
            }
        });
        join_all(attempts).await
    }

    async fn deliver(&self, channel: Arc<dyn Channel>, release: Release) -> Outcome {
        if !channel.is_configured() {
            return Outcome::NotConfigured;
        }
        let notification = Notification {
            channel: channel.kind(),
            release,
        };

        let first = self.attempt(&channel, &notification).await;
        match first {
            Outcome::Failed(_) if self.options.retry_once => {
                debug!("retrying {} once", channel.kind());
                self.attempt(&channel, &notification).await
            }
            other => other,
        }
    }

    async fn attempt(&self, channel: &Arc<dyn Channel>, notification: &Notification) -> Outcome {
        match tokio::time::timeout(self.options.delivery_timeout, channel.send(notification)).await
        {
            Ok(outcome) => outcome,
            Err(_) => Outcome::Failed(format!(
                "delivery timed out after {:?}",
                self.options.delivery_timeout
            )),
        }
    }

    /// Record the current page as already-seen history and set the marker,
    /// with no notifications. Used on first sighting of a project.
    pub async fn bootstrap_project(
        &self,
        project_id: i64,
        repo: &relwatch_core::types::RepoId,
    ) -> relwatch_core::Result<usize> {
        let fetched = self.source.list_releases(repo).await?;
        let Some(newest) = fetched.first() else {
            return Ok(0);
        };
        let baseline = newest.tag.clone();
        self.seed_history(project_id, &fetched, &baseline)?;
        info!("📌 {repo} bootstrapped at {baseline}");
        Ok(fetched.len())
    }

    fn seed_history(
        &self,
        project_id: i64,
        fetched: &[Release],
        baseline: &str,
    ) -> relwatch_core::Result<()> {
        for release in fetched {
            self.store.record_release(project_id, release)?;
        }
        self.store.set_marker(project_id, baseline)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testutil::{RecordingChannel, StaticSource, release, temp_store};
    use relwatch_core::types::RepoId;

    fn options() -> DispatchOptions {
        DispatchOptions {
            default_toggles: ChannelToggles::all_enabled(),
            delivery_timeout: Duration::from_secs(1),
            retry_once: false,
        }
    }

    #[tokio::test]
    async fn test_bootstrap_seeds_marker_without_notifying() {
        let (store, dir) = temp_store("dispatch-bootstrap");
        let store = Arc::new(store);
        let repo = RepoId::new("acme", "widget");
        let id = store.add_project(&repo).unwrap().unwrap();

        let source = StaticSource::new().with_page(
            &repo,
            vec![release("acme/widget", "v1.1"), release("acme/widget", "v1.0")],
        );
        let telegram = Arc::new(RecordingChannel::new(ChannelKind::Telegram));
        let dispatcher = Dispatcher::new(
            store.clone(),
            Arc::new(source),
            vec![telegram.clone()],
            options(),
        );

        let report = dispatcher.run_cycle().await;
        assert!(report.projects[0].bootstrapped);
        assert_eq!(report.delivered(), 0);
        assert!(telegram.sent().is_empty());
        assert_eq!(store.marker(id).unwrap(), Some("v1.1".into()));
        // The page landed in history.
        assert_eq!(store.recent_releases(10).unwrap().len(), 2);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_new_releases_delivered_oldest_first_and_marker_advances() {
        let (store, dir) = temp_store("dispatch-new");
        let store = Arc::new(store);
        let repo = RepoId::new("acme", "widget");
        let id = store.add_project(&repo).unwrap().unwrap();
        store.set_marker(id, "v1.0").unwrap();

        let source = StaticSource::new().with_page(
            &repo,
            vec![
                release("acme/widget", "v1.2"),
                release("acme/widget", "v1.1"),
                release("acme/widget", "v1.0"),
            ],
        );
        let telegram = Arc::new(RecordingChannel::new(ChannelKind::Telegram));
        let discord = Arc::new(RecordingChannel::new(ChannelKind::Discord));
        let dispatcher = Dispatcher::new(
            store.clone(),
            Arc::new(source),
            vec![telegram.clone(), discord.clone()],
            options(),
        );

        let report = dispatcher.run_cycle().await;
        assert_eq!(report.projects[0].new_releases, 2);
        assert_eq!(report.delivered(), 4);
        assert_eq!(report.failed(), 0);
        assert_eq!(telegram.sent(), vec!["v1.1", "v1.2"]);
        assert_eq!(discord.sent(), vec!["v1.1", "v1.2"]);
        assert_eq!(store.marker(id).unwrap(), Some("v1.2".into()));
        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_channel_failure_does_not_block_others_or_marker() {
        let (store, dir) = temp_store("dispatch-isolation");
        let store = Arc::new(store);
        let repo = RepoId::new("acme", "widget");
        let id = store.add_project(&repo).unwrap().unwrap();
        store.set_marker(id, "v1.0").unwrap();

        let source = StaticSource::new().with_page(
            &repo,
            vec![release("acme/widget", "v1.1"), release("acme/widget", "v1.0")],
        );
        let telegram = Arc::new(RecordingChannel::new(ChannelKind::Telegram).failing());
        let discord = Arc::new(RecordingChannel::new(ChannelKind::Discord));
        let dispatcher = Dispatcher::new(
            store.clone(),
            Arc::new(source),
            vec![telegram, discord.clone()],
            options(),
        );

        let report = dispatcher.run_cycle().await;
        assert_eq!(report.delivered(), 1);
        assert_eq!(report.failed(), 1);
        assert_eq!(discord.sent(), vec!["v1.1"]);
        // Failed sends are not replayed next cycle.
        assert_eq!(store.marker(id).unwrap(), Some("v1.1".into()));
        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_fetch_failure_is_isolated_per_project() {
        let (store, dir) = temp_store("dispatch-fetch-fail");
        let store = Arc::new(store);
        let broken = RepoId::new("acme", "broken");
        let healthy = RepoId::new("acme", "widget");
        store.add_project(&broken).unwrap().unwrap();
        let healthy_id = store.add_project(&healthy).unwrap().unwrap();
        store.set_marker(healthy_id, "v1.0").unwrap();

        // No page registered for acme/broken, so its fetch errors.
        let source = StaticSource::new().with_page(
            &healthy,
            vec![release("acme/widget", "v1.1"), release("acme/widget", "v1.0")],
        );
        let telegram = Arc::new(RecordingChannel::new(ChannelKind::Telegram));
        let dispatcher = Dispatcher::new(
            store.clone(),
            Arc::new(source),
            vec![telegram.clone()],
            options(),
        );

        let report = dispatcher.run_cycle().await;
        assert!(report.projects[0].error.is_some());
        assert_eq!(report.projects[1].delivered, 1);
        assert_eq!(store.marker(healthy_id).unwrap(), Some("v1.1".into()));
        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_unconfigured_channel_is_skipped_not_failed() {
        let (store, dir) = temp_store("dispatch-unconfigured");
        let store = Arc::new(store);
        let repo = RepoId::new("acme", "widget");
        let id = store.add_project(&repo).unwrap().unwrap();
        store.set_marker(id, "v1.0").unwrap();

        let source = StaticSource::new().with_page(
            &repo,
            vec![release("acme/widget", "v1.1"), release("acme/widget", "v1.0")],
        );
        let telegram = Arc::new(RecordingChannel::new(ChannelKind::Telegram).unconfigured());
        let dispatcher = Dispatcher::new(
            store.clone(),
            Arc::new(source),
            vec![telegram.clone()],
            options(),
        );

        let report = dispatcher.run_cycle().await;
        assert_eq!(report.delivered(), 0);
        assert_eq!(report.failed(), 0);
        // Unconfigured telegram plus unregistered discord both count as skips.
        assert_eq!(report.projects[0].skipped, 2);
        assert!(telegram.sent().is_empty());
        // Skips still advance the marker.
        assert_eq!(store.marker(id).unwrap(), Some("v1.1".into()));
        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_cycle_error_surfaces_when_project_listing_fails() {
        let (store, dir) = temp_store("dispatch-store-dead");
        let store = Arc::new(store);
        store
            .add_project(&RepoId::new("acme", "widget"))
            .unwrap()
            .unwrap();

        // Pull the projects table out from under the open connection.
        let raw = rusqlite::Connection::open(dir.join("state.db")).unwrap();
        raw.execute_batch("DROP TABLE projects").unwrap();

        let dispatcher = Dispatcher::new(
            store,
            Arc::new(StaticSource::new()),
            vec![Arc::new(RecordingChannel::new(ChannelKind::Telegram))],
            options(),
        );

        let report = dispatcher.run_cycle().await;
        assert!(report.error.as_deref().unwrap().contains("no such table"));
        assert!(report.projects.is_empty());
        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_marker_write_failure_isolated_to_project() {
        let (store, dir) = temp_store("dispatch-marker-fail");
        let store = Arc::new(store);
        let doomed = RepoId::new("acme", "doomed");
        let healthy = RepoId::new("acme", "widget");
        let doomed_id = store.add_project(&doomed).unwrap().unwrap();
        store.set_marker(doomed_id, "v1.0").unwrap();
        let healthy_id = store.add_project(&healthy).unwrap().unwrap();
        store.set_marker(healthy_id, "v1.0").unwrap();

        let source = StaticSource::new()
            .with_page(
                &doomed,
                vec![release("acme/doomed", "v1.1"), release("acme/doomed", "v1.0")],
            )
            .with_page(
                &healthy,
                vec![release("acme/widget", "v1.1"), release("acme/widget", "v1.0")],
            )
            .with_delay(Duration::from_millis(200));
        let telegram = Arc::new(RecordingChannel::new(ChannelKind::Telegram));
        let dispatcher = Arc::new(Dispatcher::new(
            store.clone(),
            Arc::new(source),
            vec![telegram.clone()],
            options(),
        ));

        let cycle = {
            let dispatcher = dispatcher.clone();
            tokio::spawn(async move { dispatcher.run_cycle().await })
        };
        // While the doomed project's fetch is in flight, a second handle
        // deletes its row, so the marker write at the end of its step fails.
        tokio::time::sleep(Duration::from_millis(50)).await;
        let second = relwatch_store::StateStore::open(&dir.join("state.db")).unwrap();
        second.remove_project(&doomed).unwrap();

        let report = cycle.await.unwrap();
        assert!(
            report.projects[0]
                .error
                .as_deref()
                .unwrap()
                .contains("no such project")
        );
        // The failure stays inside that project's step.
        assert!(report.error.is_none());
        assert_eq!(report.projects[1].delivered, 1);
        assert_eq!(store.marker(healthy_id).unwrap(), Some("v1.1".into()));
        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_unregistered_channel_counts_as_skip() {
        let (store, dir) = temp_store("dispatch-unregistered");
        let store = Arc::new(store);
        let repo = RepoId::new("acme", "widget");
        let id = store.add_project(&repo).unwrap().unwrap();
        store.set_marker(id, "v1.0").unwrap();

        let source = StaticSource::new().with_page(
            &repo,
            vec![release("acme/widget", "v1.1"), release("acme/widget", "v1.0")],
        );
        // Both kinds resolve, only telegram is registered.
        let telegram = Arc::new(RecordingChannel::new(ChannelKind::Telegram));
        let dispatcher = Dispatcher::new(
            store.clone(),
            Arc::new(source),
            vec![telegram.clone()],
            options(),
        );

        let report = dispatcher.run_cycle().await;
        assert_eq!(report.delivered(), 1);
        assert_eq!(report.projects[0].skipped, 1);
        assert_eq!(telegram.sent(), vec!["v1.1"]);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_retry_once_recovers_transient_failure() {
        let (store, dir) = temp_store("dispatch-retry");
        let store = Arc::new(store);
        let repo = RepoId::new("acme", "widget");
        let id = store.add_project(&repo).unwrap().unwrap();
        store.set_marker(id, "v1.0").unwrap();

        let source = StaticSource::new().with_page(
            &repo,
            vec![release("acme/widget", "v1.1"), release("acme/widget", "v1.0")],
        );
        let telegram = Arc::new(RecordingChannel::new(ChannelKind::Telegram).failing_once());
        let mut opts = options();
        opts.retry_once = true;
        let dispatcher = Dispatcher::new(
            store.clone(),
            Arc::new(source),
            vec![telegram.clone()],
            opts,
        );

        let report = dispatcher.run_cycle().await;
        assert_eq!(report.delivered(), 1);
        assert_eq!(report.failed(), 0);
        assert_eq!(telegram.sent(), vec!["v1.1"]);
        std::fs::remove_dir_all(&dir).ok();
    }

    #[tokio::test]
    async fn test_tag_toggles_route_to_subset() {
        let (store, dir) = temp_store("dispatch-routing");
        let store = Arc::new(store);
        let repo = RepoId::new("acme", "widget");
        let id = store.add_project(&repo).unwrap().unwrap();
        store.set_marker(id, "v1.0").unwrap();
        let tag_id = store.create_tag("infra", "#00aaff").unwrap().unwrap();
        store
            .set_tag_channel(tag_id, ChannelKind::Discord, false)
            .unwrap();
        store.assign_tag(id, tag_id).unwrap();

        let source = StaticSource::new().with_page(
            &repo,
            vec![release("acme/widget", "v1.1"), release("acme/widget", "v1.0")],
        );
        let telegram = Arc::new(RecordingChannel::new(ChannelKind::Telegram));
        let discord = Arc::new(RecordingChannel::new(ChannelKind::Discord));
        let dispatcher = Dispatcher::new(
            store.clone(),
            Arc::new(source),
            vec![telegram.clone(), discord.clone()],
            options(),
        );

        dispatcher.run_cycle().await;
        assert_eq!(telegram.sent(), vec!["v1.1"]);
        assert!(discord.sent().is_empty());
        std::fs::remove_dir_all(&dir).ok();
    }
}
