//! # Relwatch GitHub
//! GitHub release source — lists releases for a repository, newest-first.

use async_trait::async_trait;
use serde::Deserialize;

use relwatch_core::error::SourceError;
use relwatch_core::traits::ReleaseSource;
use relwatch_core::types::{Release, RepoId};

const API_BASE: &str = "https://api.github.com";
const USER_AGENT: &str = concat!("relwatch/", env!("CARGO_PKG_VERSION"));

/// GitHub API client. Cheap to clone; the inner reqwest client pools
/// connections.
#[derive(Clone)]
pub struct GithubClient {
    client: reqwest::Client,
    token: Option<String>,
    per_page: u8,
}

impl GithubClient {
    pub fn new(token: Option<String>, per_page: u8) -> Self {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());
        Self {
            client,
            token: token.filter(|t| !t.is_empty()),
            per_page,
        }
    }

    fn get(&self, url: &str) -> reqwest::RequestBuilder {
        let mut req = self
            .client
            .get(url)
            .header("Accept", "application/vnd.github.v3+json")
            .header("User-Agent", USER_AGENT);
        if let Some(token) = &self.token {
            req = req.bearer_auth(token);
        }
        req
    }

    fn classify(status: reqwest::StatusCode) -> SourceError {
        match status.as_u16() {
            404 => SourceError::NotFound,
            // GitHub reports rate limiting as 403 with an X-RateLimit header,
            // or as 429 on secondary limits.
            403 | 429 => SourceError::RateLimited,
            code => SourceError::Network(format!("unexpected status {code}")),
        }
    }
}

/// Release entry as returned by the GitHub API.
#[derive(Debug, Deserialize)]
struct ApiRelease {
    #[serde(default)]
    tag_name: String,
    name: Option<String>,
    body: Option<String>,
    html_url: Option<String>,
    published_at: Option<chrono::DateTime<chrono::Utc>>,
    #[serde(default)]
    draft: bool,
}

impl ApiRelease {
    fn into_release(self, repo: &RepoId) -> Release {
        Release {
            repo: repo.clone(),
            title: self
                .name
                .filter(|n| !n.is_empty())
                .unwrap_or_else(|| self.tag_name.clone()),
            tag: self.tag_name,
            body: self.body.unwrap_or_default(),
            html_url: self.html_url.unwrap_or_default(),
            published_at: self.published_at.unwrap_or_else(chrono::Utc::now),
        }
    }
}

#[async_trait]
impl ReleaseSource for GithubClient {
    async fn list_releases(&self, repo: &RepoId) -> Result<Vec<Release>, SourceError> {
        let url = format!("{API_BASE}/repos/{}/{}/releases", repo.owner, repo.name);
        let response = self
            .get(&url)
            .query(&[("per_page", self.per_page.to_string())])
            .send()
            .await
            .map_err(|e| SourceError::Network(format!("releases fetch failed: {e}")))?;

        if !response.status().is_success() {
            return Err(Self::classify(response.status()));
        }

        let items: Vec<ApiRelease> = response
            .json()
            .await
            .map_err(|e| SourceError::Network(format!("invalid releases payload: {e}")))?;

        // The API returns newest-first. Drafts have no stable identifier yet
        // and are skipped; prereleases are kept (they are published facts).
        Ok(items
            .into_iter()
            .filter(|r| !r.draft && !r.tag_name.is_empty())
            .map(|r| r.into_release(repo))
            .collect())
    }

    async fn repo_exists(&self, repo: &RepoId) -> Result<bool, SourceError> {
        let url = format!("{API_BASE}/repos/{}/{}", repo.owner, repo.name);
        let response = self
            .get(&url)
            .send()
            .await
            .map_err(|e| SourceError::Network(format!("repository probe failed: {e}")))?;

        match response.status().as_u16() {
            200 => Ok(true),
            404 => Ok(false),
            403 | 429 => Err(SourceError::RateLimited),
            code => Err(SourceError::Network(format!("unexpected status {code}"))),
        }
    }
}
