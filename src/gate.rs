//! Subscription gating for exclusive content, events and tracks.

use chrono::{DateTime, Utc};

use crate::models::{SubscriptionStatus, UserSubscription};

/// Gating fields carried by a piece of artist content.
#[derive(Debug, Clone, Copy)]
pub struct Gate<'a> {
    pub is_public: bool,
    pub minimum_tier_id: Option<&'a str>,
}

impl<'a> Gate<'a> {
    pub fn new(is_public: bool, minimum_tier_id: Option<&'a str>) -> Self {
        Self {
            is_public,
            minimum_tier_id,
        }
    }
}

/// Whether a subscription still entitles its holder to gated content.
///
/// Canceled subscriptions keep access until the paid period runs out.
pub fn subscription_entitles(sub: &UserSubscription, now: DateTime<Utc>) -> bool {
    matches!(
        sub.status,
        SubscriptionStatus::Active | SubscriptionStatus::Canceled
    ) && now <= sub.current_period_end
}

/// The gate predicate. `subscription` is the caller's subscription to the content's artist,
/// `None` for anonymous callers or callers without one.
pub fn can_access(gate: Gate<'_>, subscription: Option<&UserSubscription>, now: DateTime<Utc>) -> bool {
    if gate.is_public || gate.minimum_tier_id.is_none() {
        return true;
    }

    match subscription {
        Some(sub) => {
            subscription_entitles(sub, now)
                && gate
                    .minimum_tier_id
                    .map_or(true, |tier| sub.tier_id == tier)
        }
        None => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn subscription(status: SubscriptionStatus, tier: &str, end: DateTime<Utc>) -> UserSubscription {
        UserSubscription {
            id: "sub".to_string(),
            user_id: "user".to_string(),
            artist_id: "artist".to_string(),
            tier_id: tier.to_string(),
            status,
            current_period_start: end - Duration::days(30),
            current_period_end: end,
            auto_renew: true,
            canceled_at: None,
            cancel_reason: None,
            created_at: end - Duration::days(30),
            updated_at: end - Duration::days(30),
        }
    }

    #[test]
    fn public_or_ungated_content_is_open_to_everyone() {
        let now = Utc::now();
        assert!(can_access(Gate::new(true, Some("gold")), None, now));
        assert!(can_access(Gate::new(false, None), None, now));
    }

    #[test]
    fn anonymous_callers_are_denied_gated_content() {
        assert!(!can_access(Gate::new(false, Some("gold")), None, Utc::now()));
    }

    #[test]
    fn active_subscription_needs_matching_tier() {
        let now = Utc::now();
        let sub = subscription(SubscriptionStatus::Active, "gold", now + Duration::days(10));
        assert!(can_access(Gate::new(false, Some("gold")), Some(&sub), now));
        assert!(!can_access(Gate::new(false, Some("silver")), Some(&sub), now));
    }

    #[test]
    fn canceled_subscription_holds_until_period_end() {
        let now = Utc::now();
        let end = now + Duration::days(3);
        let sub = subscription(SubscriptionStatus::Canceled, "gold", end);
        let gate = Gate::new(false, Some("gold"));

        assert!(can_access(gate, Some(&sub), now));
        assert!(can_access(gate, Some(&sub), end));
        assert!(!can_access(gate, Some(&sub), end + Duration::seconds(1)));
    }

    #[test]
    fn paused_and_past_due_are_denied() {
        let now = Utc::now();
        let end = now + Duration::days(3);
        let gate = Gate::new(false, Some("gold"));
        for status in [SubscriptionStatus::Paused, SubscriptionStatus::PastDue] {
            let sub = subscription(status, "gold", end);
            assert!(!can_access(gate, Some(&sub), now));
        }
    }

    #[test]
    fn expired_active_subscription_is_denied() {
        let now = Utc::now();
        let sub = subscription(SubscriptionStatus::Active, "gold", now - Duration::minutes(1));
        assert!(!subscription_entitles(&sub, now));
        assert!(!can_access(Gate::new(false, Some("gold")), Some(&sub), now));
    }
}
