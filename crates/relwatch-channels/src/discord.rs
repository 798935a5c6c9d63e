//! Discord delivery — release announcements as webhook embeds.

use async_trait::async_trait;

use relwatch_core::config::DiscordChannelConfig;
use relwatch_core::traits::Channel;
use relwatch_core::types::{ChannelKind, Notification, Outcome, Release};

/// Discord caps embed descriptions at 4096 chars; release bodies are cut
/// well below that.
const BODY_LIMIT: usize = 1000;

/// Embed accent color (GitHub purple).
const EMBED_COLOR: u32 = 5_814_783;

pub struct DiscordChannel {
    config: Option<DiscordChannelConfig>,
    client: reqwest::Client,
}

impl DiscordChannel {
    pub fn new(config: Option<DiscordChannelConfig>) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    fn webhook_url(&self) -> Option<&str> {
        let cfg = self.config.as_ref()?;
        if !cfg.enabled || cfg.webhook_url.is_empty() {
            return None;
        }
        Some(&cfg.webhook_url)
    }

    /// Render a release as a Discord embed.
    pub fn build_embed(release: &Release) -> serde_json::Value {
        let mut embed = serde_json::json!({
            "title": format!("🚀 {}", release.title),
            "url": release.html_url,
            "color": EMBED_COLOR,
            "fields": [
                {
                    "name": "📦 Repository",
                    "value": format!("[{}](https://github.com/{})", release.repo, release.repo),
                    "inline": true,
                },
                {
                    "name": "🏷️ Tag",
                    "value": release.tag,
                    "inline": true,
                },
            ],
            "footer": { "text": "Relwatch" },
        });
        if !release.body.is_empty() {
            embed["description"] = serde_json::Value::String(truncate(&release.body, BODY_LIMIT));
        }
        embed
    }

    async fn post_embed(&self, url: &str, embed: serde_json::Value) -> Outcome {
        let response = self
            .client
            .post(url)
            .json(&serde_json::json!({ "embeds": [embed] }))
            .timeout(std::time::Duration::from_secs(30))
            .send()
            .await;

        match response {
            Err(e) => Outcome::Failed(format!("discord send failed: {e}")),
            Ok(resp) if resp.status().is_success() => Outcome::Delivered,
            Ok(resp) => {
                let status = resp.status();
                let body = resp.text().await.unwrap_or_default();
                Outcome::Failed(format!("discord webhook error {status}: {body}"))
            }
        }
    }
}

#[async_trait]
impl Channel for DiscordChannel {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Discord
    }

    fn is_configured(&self) -> bool {
        self.webhook_url().is_some()
    }

    async fn send(&self, notification: &Notification) -> Outcome {
        let Some(url) = self.webhook_url() else {
            return Outcome::NotConfigured;
        };
        let embed = Self::build_embed(&notification.release);
        self.post_embed(url, embed).await
    }

    async fn send_test(&self) -> Outcome {
        let Some(url) = self.webhook_url() else {
            return Outcome::NotConfigured;
        };
        let embed = serde_json::json!({
            "title": "✅ Test Notification",
            "description": "Relwatch: test notification successful!",
            "color": EMBED_COLOR,
            "footer": { "text": "Relwatch" },
        });
        self.post_embed(url, embed).await
    }
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    let cut: String = s.chars().take(max_chars).collect();
    format!("{cut}...")
}

#[cfg(test)]
mod tests {
    use super::*;
    use relwatch_core::types::RepoId;

    fn release_with_body(body: &str) -> Release {
        Release {
            repo: RepoId::new("acme", "widget"),
            tag: "v2.0.0".into(),
            title: "Widget 2.0".into(),
            body: body.into(),
            html_url: "https://github.com/acme/widget/releases/tag/v2.0.0".into(),
            published_at: chrono::Utc::now(),
        }
    }

    #[test]
    fn test_embed_fields() {
        let embed = DiscordChannel::build_embed(&release_with_body("changelog"));
        assert_eq!(embed["title"], "🚀 Widget 2.0");
        assert_eq!(embed["fields"][1]["value"], "v2.0.0");
        assert_eq!(embed["description"], "changelog");
        assert!(
            embed["fields"][0]["value"]
                .as_str()
                .unwrap()
                .contains("github.com/acme/widget")
        );
    }

    #[test]
    fn test_empty_body_omits_description() {
        let embed = DiscordChannel::build_embed(&release_with_body(""));
        assert!(embed.get("description").is_none());
    }

    #[test]
    fn test_long_body_truncated() {
        let embed = DiscordChannel::build_embed(&release_with_body(&"x".repeat(3000)));
        let description = embed["description"].as_str().unwrap();
        assert!(description.ends_with("..."));
        assert!(description.chars().count() <= BODY_LIMIT + 3);
    }

    #[test]
    fn test_unconfigured_channel() {
        assert!(!DiscordChannel::new(None).is_configured());
        let disabled = DiscordChannel::new(Some(DiscordChannelConfig {
            enabled: false,
            webhook_url: "https://discord.com/api/webhooks/x/y".into(),
        }));
        assert!(!disabled.is_configured());
        let configured = DiscordChannel::new(Some(DiscordChannelConfig {
            enabled: true,
            webhook_url: "https://discord.com/api/webhooks/x/y".into(),
        }));
        assert!(configured.is_configured());
    }
}
