//! Telegram delivery — release announcements via Bot API `sendMessage`.

use async_trait::async_trait;

use relwatch_core::config::TelegramChannelConfig;
use relwatch_core::traits::Channel;
use relwatch_core::types::{ChannelKind, Notification, Outcome, Release};

/// Telegram Markdown caps messages at 4096 chars; release bodies are cut
/// well below that so the header and link always fit.
const BODY_LIMIT: usize = 500;

pub struct TelegramChannel {
    config: Option<TelegramChannelConfig>,
    client: reqwest::Client,
}

impl TelegramChannel {
    pub fn new(config: Option<TelegramChannelConfig>) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    fn credentials(&self) -> Option<(&str, &str)> {
        let cfg = self.config.as_ref()?;
        if !cfg.enabled || cfg.bot_token.is_empty() || cfg.chat_id.is_empty() {
            return None;
        }
        Some((&cfg.bot_token, &cfg.chat_id))
    }

    fn api_url(token: &str) -> String {
        format!("https://api.telegram.org/bot{token}/sendMessage")
    }

    /// Render a release for Telegram's Markdown dialect.
    pub fn format_message(release: &Release) -> String {
        let mut message = format!(
            "🚀 *New Release!*\n\n📦 *{}*\n🏷️ *{}*\n🔗 [View Release]({})",
            release.repo, release.title, release.html_url
        );
        if !release.body.is_empty() {
            let body = escape_markdown(&truncate(&release.body, BODY_LIMIT));
            message.push_str("\n\n📝 ");
            message.push_str(&body);
        }
        message
    }

    async fn post_message(&self, token: &str, chat_id: &str, text: &str) -> Outcome {
        let response = self
            .client
            .post(Self::api_url(token))
            .json(&serde_json::json!({
                "chat_id": chat_id,
                "text": text,
                "parse_mode": "Markdown",
                "disable_web_page_preview": false,
            }))
            .timeout(std::time::Duration::from_secs(30))
            .send()
            .await;

        match response {
            Err(e) => Outcome::Failed(format!("telegram send failed: {e}")),
            Ok(resp) if resp.status().is_success() => Outcome::Delivered,
            Ok(resp) => {
                let status = resp.status();
                // Telegram returns {ok:false, description:...} on errors.
                let description = resp
                    .json::<serde_json::Value>()
                    .await
                    .ok()
                    .and_then(|v| v["description"].as_str().map(String::from))
                    .unwrap_or_default();
                Outcome::Failed(format!("telegram api error {status}: {description}"))
            }
        }
    }
}

#[async_trait]
impl Channel for TelegramChannel {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Telegram
    }

    fn is_configured(&self) -> bool {
        self.credentials().is_some()
    }

    async fn send(&self, notification: &Notification) -> Outcome {
        let Some((token, chat_id)) = self.credentials() else {
            return Outcome::NotConfigured;
        };
        let text = Self::format_message(&notification.release);
        self.post_message(token, chat_id, &text).await
    }

    async fn send_test(&self) -> Outcome {
        let Some((token, chat_id)) = self.credentials() else {
            return Outcome::NotConfigured;
        };
        self.post_message(token, chat_id, "✅ Relwatch: test notification successful!")
            .await
    }
}

/// Escape Telegram Markdown (v1) special characters.
fn escape_markdown(s: &str) -> String {
    s.replace('_', "\\_")
        .replace('*', "\\*")
        .replace('[', "\\[")
        .replace('`', "\\`")
}

fn truncate(s: &str, max_chars: usize) -> String {
    if s.chars().count() <= max_chars {
        return s.to_string();
    }
    let cut: String = s.chars().take(max_chars).collect();
    format!("{cut}...")
}
