//! Tag-based channel routing.

use relwatch_core::types::{ChannelKind, ChannelToggles, Tag};

/// Channels a project's notifications go to.
///
/// A tagged project gets the OR of its tags' toggles, so adding a tag can
/// only widen delivery. An untagged project falls back to the configured
/// default set.
pub fn resolve_channels(tags: &[Tag], default_toggles: ChannelToggles) -> Vec<ChannelKind> {
    if tags.is_empty() {
        return default_toggles.enabled_kinds();
    }
    tags.iter()
        .fold(ChannelToggles::none(), |acc, tag| acc.union(tag.channels))
        .enabled_kinds()
}
