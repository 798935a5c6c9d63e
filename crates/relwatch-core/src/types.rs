//! Core data model: repositories, releases, tags, and notifications.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Identity of an external repository (owner/name).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RepoId {
    pub owner: String,
    pub name: String,
}

impl RepoId {
    pub fn new(owner: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            name: name.into(),
        }
    }

    /// Parse "owner/name". Returns None when either side is empty.
    pub fn parse(s: &str) -> Option<Self> {
        let (owner, name) = s.trim().split_once('/')?;
        if owner.is_empty() || name.is_empty() {
            return None;
        }
        Some(Self::new(owner, name))
    }
}

impl fmt::Display for RepoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

/// A published release as fetched from the source. Immutable external fact:
/// never mutated after fetch, identified by its git tag.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Release {
    pub repo: RepoId,
    /// Release identifier (git tag). Sole dedup key: a release edited after
    /// publication keeps its tag and is not re-notified.
    pub tag: String,
    pub title: String,
    /// Release notes, markdown.
    pub body: String,
    pub html_url: String,
    pub published_at: DateTime<Utc>,
}

/// Notification transports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChannelKind {
    Telegram,
    Discord,
}

impl ChannelKind {
    pub const ALL: [ChannelKind; 2] = [ChannelKind::Telegram, ChannelKind::Discord];

    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelKind::Telegram => "telegram",
            ChannelKind::Discord => "discord",
        }
    }
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ChannelKind {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s {
            "telegram" => Ok(ChannelKind::Telegram),
            "discord" => Ok(ChannelKind::Discord),
            other => Err(format!("unknown channel kind '{other}'")),
        }
    }
}

/// Per-channel enablement map. A tag carries one of these; a project's
/// effective set is the OR across its tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelToggles {
    pub telegram: bool,
    pub discord: bool,
}

impl ChannelToggles {
    pub fn all_enabled() -> Self {
        Self {
            telegram: true,
            discord: true,
        }
    }

    pub fn none() -> Self {
        Self {
            telegram: false,
            discord: false,
        }
    }

    pub fn enabled(&self, kind: ChannelKind) -> bool {
        match kind {
            ChannelKind::Telegram => self.telegram,
            ChannelKind::Discord => self.discord,
        }
    }

    pub fn set(&mut self, kind: ChannelKind, on: bool) {
        match kind {
            ChannelKind::Telegram => self.telegram = on,
            ChannelKind::Discord => self.discord = on,
        }
    }

    pub fn union(self, other: Self) -> Self {
        Self {
            telegram: self.telegram || other.telegram,
            discord: self.discord || other.discord,
        }
    }

    pub fn enabled_kinds(&self) -> Vec<ChannelKind> {
        ChannelKind::ALL
            .into_iter()
            .filter(|kind| self.enabled(*kind))
            .collect()
    }
}

impl Default for ChannelToggles {
    fn default() -> Self {
        Self::all_enabled()
    }
}

/// A user-defined label grouping tracked projects, with per-channel
/// notification toggles.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tag {
    pub id: i64,
    pub name: String,
    /// Display color for the dashboard, hex string.
    pub color: String,
    pub channels: ChannelToggles,
    pub created_at: DateTime<Utc>,
}

/// A repository under watch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackedProject {
    pub id: i64,
    pub repo: RepoId,
    pub tags: Vec<Tag>,
    /// Identifier of the most recent release already processed — the dedup
    /// watermark. Only moves forward; written only by the dispatcher.
    pub marker: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// One release bound for one channel. Constructed during fan-out, consumed by
/// the channel; never persisted.
#[derive(Debug, Clone)]
pub struct Notification {
    pub release: Release,
    pub channel: ChannelKind,
}

/// Result of a single delivery attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    Delivered,
    Failed(String),
    /// The channel has no valid credentials/target; the send was never
    /// attempted.
    NotConfigured,
}
