use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use sqlx::FromRow;

pub const MIN_TIER_PRICE: f64 = 0.99;
pub const MAX_TIER_PRICE: f64 = 99.99;
pub const MAX_ACTIVE_TIERS: i64 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "lowercase")]
#[sqlx(rename_all = "lowercase")]
pub enum TierStatus {
    Active,
    Retired,
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct SubscriptionTier {
    pub id: String,
    pub artist_id: String,
    pub name: String,
    pub description: Option<String>,
    pub price: f64,
    #[sqlx(rename = "tier_order")]
    pub order: i64,
    pub benefits: Json<Vec<String>>,
    pub status: TierStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct CreateTier {
    pub name: String,
    pub description: Option<String>,
    pub price: f64,
    pub order: i64,
    #[serde(default)]
    pub benefits: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct UpdateTier {
    pub name: Option<String>,
    pub description: Option<String>,
    pub price: Option<f64>,
    pub order: Option<i64>,
    pub benefits: Option<Vec<String>>,
}

impl UpdateTier {
    pub fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.description.is_none()
            && self.price.is_none()
            && self.order.is_none()
            && self.benefits.is_none()
    }
}

pub fn price_in_bounds(price: f64) -> bool {
    price.is_finite() && (MIN_TIER_PRICE..=MAX_TIER_PRICE).contains(&price)
}

pub fn order_in_bounds(order: i64) -> bool {
    (1..=MAX_ACTIVE_TIERS).contains(&order)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[serde(rename_all = "snake_case")]
#[sqlx(rename_all = "snake_case")]
pub enum SubscriptionStatus {
    Active,
    Canceled,
    Paused,
    PastDue,
}

impl SubscriptionStatus {
    /// Statuses that block opening another subscription to the same artist.
    pub fn is_ongoing(self) -> bool {
        matches!(self, SubscriptionStatus::Active | SubscriptionStatus::Paused)
    }
}

#[derive(Debug, Clone, Serialize, FromRow)]
pub struct UserSubscription {
    pub id: String,
    pub user_id: String,
    pub artist_id: String,
    pub tier_id: String,
    pub status: SubscriptionStatus,
    pub current_period_start: DateTime<Utc>,
    pub current_period_end: DateTime<Utc>,
    pub auto_renew: bool,
    pub canceled_at: Option<DateTime<Utc>>,
    pub cancel_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Deserialize)]
pub struct SubscribeRequest {
    pub artist_id: String,
    pub tier_id: String,
}

#[derive(Debug, Default, Deserialize)]
pub struct CancelSubscriptionRequest {
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ChangeTierRequest {
    pub tier_id: String,
}

#[derive(Debug, Serialize, FromRow)]
pub struct Subscriber {
    pub subscription_id: String,
    pub user_id: String,
    pub username: String,
    pub tier_id: String,
    pub status: SubscriptionStatus,
    pub current_period_end: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn price_bounds_are_inclusive() {
        assert!(price_in_bounds(0.99));
        assert!(price_in_bounds(99.99));
        assert!(price_in_bounds(4.99));
        assert!(!price_in_bounds(0.98));
        assert!(!price_in_bounds(100.0));
        assert!(!price_in_bounds(f64::NAN));
    }

    #[test]
    fn order_bounds() {
        assert!(order_in_bounds(1));
        assert!(order_in_bounds(3));
        assert!(!order_in_bounds(0));
        assert!(!order_in_bounds(4));
    }

    #[test]
    fn only_active_and_paused_block_resubscribing() {
        assert!(SubscriptionStatus::Active.is_ongoing());
        assert!(SubscriptionStatus::Paused.is_ongoing());
        assert!(!SubscriptionStatus::Canceled.is_ongoing());
        assert!(!SubscriptionStatus::PastDue.is_ongoing());
    }

    #[test]
    fn status_serializes_snake_case() {
        let json = serde_json::to_string(&SubscriptionStatus::PastDue).unwrap();
        assert_eq!(json, "\"past_due\"");
    }
}
