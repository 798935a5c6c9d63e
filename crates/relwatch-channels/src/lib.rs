//! # Relwatch Channels
//! Delivery channel implementations: Telegram Bot API and Discord webhooks.

pub mod discord;
pub mod telegram;

pub use discord::DiscordChannel;
pub use telegram::TelegramChannel;

use std::sync::Arc;

use relwatch_core::RelwatchConfig;
use relwatch_core::traits::Channel;

/// Build the channel set from configuration. Channels with missing
/// credentials are still present; they report NotConfigured instead of
/// attempting a send.
pub fn channels_from_config(config: &RelwatchConfig) -> Vec<Arc<dyn Channel>> {
    vec![
        Arc::new(TelegramChannel::new(config.notifications.telegram.clone())),
        Arc::new(DiscordChannel::new(config.notifications.discord.clone())),
    ]
}
