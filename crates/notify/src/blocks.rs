//! Hierarchical block/preference resolution.
//!
//! Evaluation order: Global → MandatoryRule → Organization → Hub → User.
//! A global block suppresses a channel for everyone; an admin-defined
//! mandatory channel bypasses org/hub/user blocks; the user level is
//! consulted only when every matching rule permits user opt-out.
//!
//! The evaluation itself ([`BlockSnapshot::resolve`]) is a pure function
//! over pre-fetched rows, so precedence and quiet-hours behavior are
//! unit-testable without a database. [`BlockResolver`] does the fetching.

use chrono::NaiveTime;

use tavola_core::channel::channels_from_json;
use tavola_core::types::DbId;
use tavola_core::{event_type, ChannelType};
use tavola_db::models::block::{
    EventTypeNotificationRule, GlobalNotificationBlock, HubNotificationBlock,
    OrganizationNotificationBlock, UserNotificationBlock,
};
use tavola_db::repositories::BlockRepo;
use tavola_db::DbPool;

/// Where a recipient sits in the block hierarchy.
#[derive(Debug, Clone, Default)]
pub struct RecipientScope {
    /// `restaurant` / `agency`, when the recipient belongs to one.
    pub org_type: Option<&'static str>,
    pub org_id: Option<DbId>,
    /// `restaurant_hub` / `agency_hub`, when the recipient's org is in one.
    pub hub_type: Option<&'static str>,
    pub hub_id: Option<DbId>,
    pub user_id: DbId,
}

/// The block rows relevant to one recipient, fetched in a single pass.
#[derive(Debug, Clone, Default)]
pub struct BlockSnapshot {
    pub global: Vec<GlobalNotificationBlock>,
    pub rules: Vec<EventTypeNotificationRule>,
    pub org: Vec<OrganizationNotificationBlock>,
    pub hub: Vec<HubNotificationBlock>,
    pub user: Vec<UserNotificationBlock>,
}

/// Whether a `blocked_channels` column suppresses the given channel.
///
/// An empty list means every channel is blocked.
fn blocks_channel(blocked_channels: &serde_json::Value, channel: ChannelType) -> bool {
    let list = channels_from_json(blocked_channels);
    list.is_empty() || list.contains(&channel)
}

/// Whether `now` falls inside a quiet-hours window.
///
/// A window crossing midnight (`22:00`–`07:00`) covers both the late
/// evening and the early morning. Blocks without quiet hours apply around
/// the clock.
fn within_quiet_hours(
    start: Option<NaiveTime>,
    end: Option<NaiveTime>,
    now: NaiveTime,
) -> bool {
    match (start, end) {
        (Some(start), Some(end)) if start <= end => now >= start && now < end,
        (Some(start), Some(end)) => now >= start || now < end,
        _ => true,
    }
}

impl BlockSnapshot {
    /// Resolve the channels an event may use for this recipient.
    ///
    /// Returns `mandatory(event_type) ∪ (candidates − blocked)`, preserving
    /// candidate order and appending mandatory channels not already present.
    pub fn resolve(
        &self,
        event_type: &str,
        candidates: &[ChannelType],
        now: NaiveTime,
    ) -> Vec<ChannelType> {
        let mandatory = self.mandatory_channels(event_type);
        let user_can_disable = self.user_can_disable(event_type);

        let mut resolved: Vec<ChannelType> = candidates
            .iter()
            .copied()
            .filter(|&channel| self.allows(event_type, channel, user_can_disable, now))
            .collect();
        for channel in mandatory {
            // Mandatory channels bypass org/hub/user blocks but not a
            // global block.
            if !resolved.contains(&channel) && !self.globally_blocked(event_type, channel) {
                resolved.push(channel);
            }
        }
        resolved
    }

    fn allows(
        &self,
        event_type: &str,
        channel: ChannelType,
        user_can_disable: bool,
        now: NaiveTime,
    ) -> bool {
        if self.globally_blocked(event_type, channel) {
            return false;
        }
        if self.mandatory_channels(event_type).contains(&channel) {
            return true;
        }
        let org_blocked = self.org.iter().any(|b| {
            event_type::matches_pattern(&b.event_type_pattern, event_type)
                && blocks_channel(&b.blocked_channels, channel)
                && within_quiet_hours(b.quiet_hours_start, b.quiet_hours_end, now)
        });
        if org_blocked {
            return false;
        }
        let hub_blocked = self.hub.iter().any(|b| {
            event_type::matches_pattern(&b.event_type_pattern, event_type)
                && blocks_channel(&b.blocked_channels, channel)
                && within_quiet_hours(b.quiet_hours_start, b.quiet_hours_end, now)
        });
        if hub_blocked {
            return false;
        }
        if user_can_disable {
            let user_blocked = self.user.iter().any(|b| {
                event_type::matches_pattern(&b.event_type_pattern, event_type)
                    && blocks_channel(&b.blocked_channels, channel)
                    && within_quiet_hours(b.quiet_hours_start, b.quiet_hours_end, now)
            });
            if user_blocked {
                return false;
            }
        }
        true
    }

    fn globally_blocked(&self, event_type: &str, channel: ChannelType) -> bool {
        self.global.iter().any(|b| {
            event_type::matches_pattern(&b.event_type_pattern, event_type)
                && blocks_channel(&b.blocked_channels, channel)
        })
    }

    fn mandatory_channels(&self, event_type: &str) -> Vec<ChannelType> {
        let mut channels = Vec::new();
        for rule in &self.rules {
            if event_type::matches_pattern(&rule.event_type_pattern, event_type) {
                for channel in channels_from_json(&rule.mandatory_channels) {
                    if !channels.contains(&channel) {
                        channels.push(channel);
                    }
                }
            }
        }
        channels
    }

    fn user_can_disable(&self, event_type: &str) -> bool {
        self.rules
            .iter()
            .filter(|r| event_type::matches_pattern(&r.event_type_pattern, event_type))
            .all(|r| r.user_can_disable)
    }
}

/// Loads block snapshots for recipients.
pub struct BlockResolver;

impl BlockResolver {
    /// Fetch every block row relevant to one recipient scope.
    pub async fn snapshot(
        pool: &DbPool,
        scope: &RecipientScope,
    ) -> Result<BlockSnapshot, sqlx::Error> {
        let global = BlockRepo::active_global_blocks(pool).await?;
        let rules = BlockRepo::active_rules(pool).await?;
        let org = match (scope.org_type, scope.org_id) {
            (Some(org_type), Some(org_id)) => {
                BlockRepo::active_org_blocks(pool, org_type, org_id).await?
            }
            _ => Vec::new(),
        };
        let hub = match (scope.hub_type, scope.hub_id) {
            (Some(hub_type), Some(hub_id)) => {
                BlockRepo::active_hub_blocks(pool, hub_type, hub_id).await?
            }
            _ => Vec::new(),
        };
        let user = BlockRepo::active_user_blocks(pool, scope.user_id).await?;
        Ok(BlockSnapshot { global, rules, org, hub, user })
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    fn noon() -> NaiveTime {
        NaiveTime::from_hms_opt(12, 0, 0).unwrap()
    }

    fn global_block(pattern: &str, channels: serde_json::Value) -> GlobalNotificationBlock {
        GlobalNotificationBlock {
            id: 1,
            event_type_pattern: pattern.to_string(),
            blocked_channels: channels,
            active: true,
            starts_at: None,
            ends_at: None,
            created_at: Utc::now(),
        }
    }

    fn user_block(pattern: &str, channels: serde_json::Value) -> UserNotificationBlock {
        UserNotificationBlock {
            id: 1,
            user_id: 10,
            event_type_pattern: pattern.to_string(),
            blocked_channels: channels,
            quiet_hours_start: None,
            quiet_hours_end: None,
            active: true,
            created_at: Utc::now(),
        }
    }

    fn org_block(pattern: &str, channels: serde_json::Value) -> OrganizationNotificationBlock {
        OrganizationNotificationBlock {
            id: 1,
            org_type: "restaurant".to_string(),
            org_id: 7,
            event_type_pattern: pattern.to_string(),
            blocked_channels: channels,
            quiet_hours_start: None,
            quiet_hours_end: None,
            active: true,
            created_at: Utc::now(),
        }
    }

    fn rule(pattern: &str, mandatory: serde_json::Value, user_can_disable: bool)
        -> EventTypeNotificationRule
    {
        EventTypeNotificationRule {
            id: 1,
            event_type_pattern: pattern.to_string(),
            mandatory_channels: mandatory,
            user_can_disable,
            created_at: Utc::now(),
        }
    }

    const CANDIDATES: [ChannelType; 2] = [ChannelType::Websocket, ChannelType::Email];

    #[test]
    fn no_blocks_passes_all_candidates() {
        let snapshot = BlockSnapshot::default();
        assert_eq!(snapshot.resolve("NEW_ORDER", &CANDIDATES, noon()), CANDIDATES.to_vec());
    }

    #[test]
    fn empty_blocked_channels_blocks_everything() {
        let snapshot = BlockSnapshot {
            user: vec![user_block("NEW_ORDER", serde_json::json!([]))],
            ..Default::default()
        };
        assert!(snapshot.resolve("NEW_ORDER", &CANDIDATES, noon()).is_empty());
        // Other event types are untouched.
        assert_eq!(
            snapshot.resolve("RESERVATION_REQUESTED", &CANDIDATES, noon()),
            CANDIDATES.to_vec()
        );
    }

    #[test]
    fn wildcard_pattern_blocks_the_family() {
        let snapshot = BlockSnapshot {
            user: vec![user_block("RESERVATION_*", serde_json::json!(["EMAIL"]))],
            ..Default::default()
        };
        let resolved = snapshot.resolve("RESERVATION_CANCELLED", &CANDIDATES, noon());
        assert_eq!(resolved, vec![ChannelType::Websocket]);
    }

    #[test]
    fn global_block_beats_everything_including_mandatory() {
        let snapshot = BlockSnapshot {
            global: vec![global_block("*", serde_json::json!(["EMAIL"]))],
            rules: vec![rule("NEW_ORDER", serde_json::json!(["EMAIL"]), true)],
            ..Default::default()
        };
        assert_eq!(
            snapshot.resolve("NEW_ORDER", &CANDIDATES, noon()),
            vec![ChannelType::Websocket]
        );
    }

    #[test]
    fn mandatory_channel_bypasses_user_block() {
        let snapshot = BlockSnapshot {
            rules: vec![rule("NEW_ORDER", serde_json::json!(["EMAIL"]), true)],
            user: vec![user_block("NEW_ORDER", serde_json::json!(["EMAIL"]))],
            ..Default::default()
        };
        assert!(snapshot
            .resolve("NEW_ORDER", &CANDIDATES, noon())
            .contains(&ChannelType::Email));
    }

    #[test]
    fn mandatory_channel_is_added_even_when_not_preferred() {
        let snapshot = BlockSnapshot {
            rules: vec![rule("NEW_ORDER", serde_json::json!(["SMS"]), true)],
            ..Default::default()
        };
        let resolved = snapshot.resolve("NEW_ORDER", &CANDIDATES, noon());
        assert_eq!(
            resolved,
            vec![ChannelType::Websocket, ChannelType::Email, ChannelType::Sms]
        );
    }

    #[test]
    fn org_block_beats_user_preference() {
        let snapshot = BlockSnapshot {
            org: vec![org_block("NEW_ORDER", serde_json::json!(["EMAIL"]))],
            ..Default::default()
        };
        assert_eq!(
            snapshot.resolve("NEW_ORDER", &CANDIDATES, noon()),
            vec![ChannelType::Websocket]
        );
    }

    #[test]
    fn user_block_ignored_when_rule_forbids_opt_out() {
        let snapshot = BlockSnapshot {
            rules: vec![rule("NEW_ORDER", serde_json::json!([]), false)],
            user: vec![user_block("NEW_ORDER", serde_json::json!(["EMAIL"]))],
            ..Default::default()
        };
        assert_eq!(snapshot.resolve("NEW_ORDER", &CANDIDATES, noon()), CANDIDATES.to_vec());
    }

    #[test]
    fn quiet_hours_suppress_only_inside_the_window() {
        let mut block = user_block("NEW_ORDER", serde_json::json!(["EMAIL"]));
        block.quiet_hours_start = NaiveTime::from_hms_opt(22, 0, 0);
        block.quiet_hours_end = NaiveTime::from_hms_opt(7, 0, 0);
        let snapshot = BlockSnapshot { user: vec![block], ..Default::default() };

        // Midnight is inside the window crossing midnight.
        let midnight = NaiveTime::from_hms_opt(0, 30, 0).unwrap();
        assert_eq!(
            snapshot.resolve("NEW_ORDER", &CANDIDATES, midnight),
            vec![ChannelType::Websocket]
        );
        // Noon is outside; the block does not apply.
        assert_eq!(snapshot.resolve("NEW_ORDER", &CANDIDATES, noon()), CANDIDATES.to_vec());
    }

    #[test]
    fn quiet_hours_window_without_midnight_crossing() {
        assert!(within_quiet_hours(
            NaiveTime::from_hms_opt(9, 0, 0),
            NaiveTime::from_hms_opt(17, 0, 0),
            noon()
        ));
        assert!(!within_quiet_hours(
            NaiveTime::from_hms_opt(9, 0, 0),
            NaiveTime::from_hms_opt(11, 0, 0),
            noon()
        ));
    }
}
