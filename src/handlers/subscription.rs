use actix_web::{web, HttpResponse};
use chrono::{DateTime, Duration, Months, Utc};
use sqlx::types::Json;
use sqlx::SqlitePool;

use crate::auth::AuthContext;
use crate::config::AppState;
use crate::error::{AppError, Result};
use crate::models::{
    order_in_bounds, price_in_bounds, CancelSubscriptionRequest, ChangeTierRequest, CreateTier,
    MessageResponse, SubscribeRequest, Subscriber, SubscriptionStatus, SubscriptionTier,
    TierStatus, UpdateTier, UserSubscription, MAX_ACTIVE_TIERS, MAX_TIER_PRICE, MIN_TIER_PRICE,
};
use crate::store::{
    fetch_artist, fetch_tier, find_subscription, new_id, require_artist_member,
    require_artist_owner,
};

/// End of a billing period starting at `start`: one calendar month later.
pub fn period_end(start: DateTime<Utc>) -> DateTime<Utc> {
    start
        .checked_add_months(Months::new(1))
        .unwrap_or_else(|| start + Duration::days(30))
}

fn check_price(price: f64) -> Result<()> {
    if !price_in_bounds(price) {
        return Err(AppError::Validation {
            message: format!(
                "Price must be between {:.2} and {:.2}",
                MIN_TIER_PRICE, MAX_TIER_PRICE
            ),
            fields: vec!["price".to_string()],
        });
    }
    Ok(())
}

fn check_order(order: i64) -> Result<()> {
    if !order_in_bounds(order) {
        return Err(AppError::Validation {
            message: format!("Order must be between 1 and {}", MAX_ACTIVE_TIERS),
            fields: vec!["order".to_string()],
        });
    }
    Ok(())
}

async fn order_taken(pool: &SqlitePool, artist_id: &str, order: i64, except_id: Option<&str>) -> Result<bool> {
    let taken = sqlx::query_scalar::<_, String>(
        "SELECT id FROM subscription_tiers WHERE artist_id = ? AND tier_order = ? AND status = 'active'",
    )
    .bind(artist_id)
    .bind(order)
    .fetch_all(pool)
    .await?;
    Ok(taken.iter().any(|id| Some(id.as_str()) != except_id))
}

/// Loads a tier and checks it belongs to the artist in the path.
async fn fetch_artist_tier(pool: &SqlitePool, artist_id: &str, tier_id: &str) -> Result<SubscriptionTier> {
    let tier = fetch_tier(pool, tier_id).await?;
    if tier.artist_id != artist_id {
        return Err(AppError::not_found("Subscription tier"));
    }
    Ok(tier)
}

pub async fn list_tiers(path: web::Path<String>, state: web::Data<AppState>) -> Result<HttpResponse> {
    let artist = fetch_artist(&state.db_pool, &path.into_inner()).await?;
    let tiers = sqlx::query_as::<_, SubscriptionTier>(
        "SELECT * FROM subscription_tiers WHERE artist_id = ? AND status = 'active'
         ORDER BY tier_order ASC",
    )
    .bind(&artist.id)
    .fetch_all(&state.db_pool)
    .await?;

    Ok(HttpResponse::Ok().json(tiers))
}

pub async fn create_tier(
    ctx: AuthContext,
    path: web::Path<String>,
    req: web::Json<CreateTier>,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    let artist = fetch_artist(&state.db_pool, &path.into_inner()).await?;
    require_artist_owner(&state.db_pool, &ctx, &artist.id).await?;
    let req = req.into_inner();

    let name = req.name.trim();
    if name.is_empty() {
        return Err(AppError::missing_fields(vec!["name".to_string()]));
    }
    check_price(req.price)?;
    check_order(req.order)?;

    let active = sqlx::query_scalar::<_, i64>(
        "SELECT COUNT(*) FROM subscription_tiers WHERE artist_id = ? AND status = 'active'",
    )
    .bind(&artist.id)
    .fetch_one(&state.db_pool)
    .await?;
    if active >= MAX_ACTIVE_TIERS {
        return Err(AppError::BadRequest(format!(
            "An artist can have at most {} active tiers",
            MAX_ACTIVE_TIERS
        )));
    }
    if order_taken(&state.db_pool, &artist.id, req.order, None).await? {
        return Err(AppError::Conflict(format!(
            "Another active tier already uses order {}",
            req.order
        )));
    }

    let tier_id = new_id();
    let now = Utc::now();
    sqlx::query(
        "INSERT INTO subscription_tiers (id, artist_id, name, description, price, tier_order,
            benefits, status, created_at, updated_at)
         VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
    )
    .bind(&tier_id)
    .bind(&artist.id)
    .bind(name)
    .bind(&req.description)
    .bind(req.price)
    .bind(req.order)
    .bind(Json(&req.benefits))
    .bind(TierStatus::Active)
    .bind(now)
    .bind(now)
    .execute(&state.db_pool)
    .await?;

    tracing::info!(tier_id = %tier_id, artist_id = %artist.id, "Subscription tier created");
    let tier = fetch_tier(&state.db_pool, &tier_id).await?;
    Ok(HttpResponse::Created().json(tier))
}

pub async fn update_tier(
    ctx: AuthContext,
    path: web::Path<(String, String)>,
    req: web::Json<UpdateTier>,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    if req.is_empty() {
        return Err(AppError::BadRequest("No fields to update".to_string()));
    }

    let (artist_id, tier_id) = path.into_inner();
    require_artist_owner(&state.db_pool, &ctx, &artist_id).await?;
    let mut tier = fetch_artist_tier(&state.db_pool, &artist_id, &tier_id).await?;
    if tier.status == TierStatus::Retired {
        return Err(AppError::BadRequest("Retired tiers cannot be changed".to_string()));
    }
    let req = req.into_inner();

    if let Some(name) = req.name.as_deref().map(str::trim) {
        if name.is_empty() {
            return Err(AppError::BadRequest("Tier name cannot be empty".to_string()));
        }
        tier.name = name.to_string();
    }
    if let Some(description) = req.description {
        tier.description = Some(description);
    }
    if let Some(price) = req.price {
        check_price(price)?;
        tier.price = price;
    }
    if let Some(order) = req.order {
        check_order(order)?;
        if order_taken(&state.db_pool, &artist_id, order, Some(&tier.id)).await? {
            return Err(AppError::Conflict(format!(
                "Another active tier already uses order {}",
                order
            )));
        }
        tier.order = order;
    }
    if let Some(benefits) = req.benefits {
        tier.benefits = Json(benefits);
    }

    sqlx::query(
        "UPDATE subscription_tiers SET name = ?, description = ?, price = ?, tier_order = ?,
            benefits = ?, updated_at = ?
         WHERE id = ?",
    )
    .bind(&tier.name)
    .bind(&tier.description)
    .bind(tier.price)
    .bind(tier.order)
    .bind(&tier.benefits)
    .bind(Utc::now())
    .bind(&tier.id)
    .execute(&state.db_pool)
    .await?;

    let tier = fetch_tier(&state.db_pool, &tier.id).await?;
    Ok(HttpResponse::Ok().json(tier))
}

/// Retires a tier. Existing subscriptions keep pointing at it.
pub async fn delete_tier(
    ctx: AuthContext,
    path: web::Path<(String, String)>,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    let (artist_id, tier_id) = path.into_inner();
    require_artist_owner(&state.db_pool, &ctx, &artist_id).await?;
    let tier = fetch_artist_tier(&state.db_pool, &artist_id, &tier_id).await?;
    if tier.status == TierStatus::Retired {
        return Err(AppError::BadRequest("Tier is already retired".to_string()));
    }

    sqlx::query("UPDATE subscription_tiers SET status = ?, updated_at = ? WHERE id = ?")
        .bind(TierStatus::Retired)
        .bind(Utc::now())
        .bind(&tier.id)
        .execute(&state.db_pool)
        .await?;

    tracing::info!(tier_id = %tier.id, "Subscription tier retired");
    Ok(HttpResponse::Ok().json(MessageResponse::new("Tier retired")))
}

pub async fn subscribe(
    ctx: AuthContext,
    req: web::Json<SubscribeRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    let pool = &state.db_pool;
    let artist = fetch_artist(pool, &req.artist_id).await?;
    if !artist.accepts_subscriptions {
        return Err(AppError::BadRequest(
            "This artist does not accept subscriptions".to_string(),
        ));
    }

    let tier = fetch_tier(pool, &req.tier_id).await?;
    if tier.artist_id != artist.id {
        return Err(AppError::BadRequest(
            "Tier does not belong to this artist".to_string(),
        ));
    }
    if tier.status != TierStatus::Active {
        return Err(AppError::BadRequest("Tier is no longer available".to_string()));
    }

    let existing = find_subscription(pool, &ctx.user_id, &artist.id).await?;
    if matches!(&existing, Some(sub) if sub.status.is_ongoing()) {
        return Err(already_subscribed());
    }

    let now = Utc::now();
    let end = period_end(now);
    let mut tx = pool.begin().await?;

    let subscription_id = match existing {
        Some(sub) => {
            // Guarded on status so a concurrent reactivation counts only once.
            let reactivated = sqlx::query(
                "UPDATE user_subscriptions SET tier_id = ?, status = ?, current_period_start = ?,
                    current_period_end = ?, auto_renew = 1, canceled_at = NULL,
                    cancel_reason = NULL, updated_at = ?
                 WHERE id = ? AND status NOT IN (?, ?)",
            )
            .bind(&tier.id)
            .bind(SubscriptionStatus::Active)
            .bind(now)
            .bind(end)
            .bind(now)
            .bind(&sub.id)
            .bind(SubscriptionStatus::Active)
            .bind(SubscriptionStatus::Paused)
            .execute(&mut *tx)
            .await?;
            if reactivated.rows_affected() == 0 {
                return Err(already_subscribed());
            }
            sub.id
        }
        None => {
            let id = new_id();
            sqlx::query(
                "INSERT INTO user_subscriptions (id, user_id, artist_id, tier_id, status,
                    current_period_start, current_period_end, auto_renew, created_at, updated_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?, 1, ?, ?)",
            )
            .bind(&id)
            .bind(&ctx.user_id)
            .bind(&artist.id)
            .bind(&tier.id)
            .bind(SubscriptionStatus::Active)
            .bind(now)
            .bind(end)
            .bind(now)
            .bind(now)
            .execute(&mut *tx)
            .await
            .map_err(|e| match e {
                sqlx::Error::Database(db) if db.is_unique_violation() => already_subscribed(),
                other => AppError::Database(other),
            })?;
            id
        }
    };

    sqlx::query("UPDATE artists SET subscriber_count = subscriber_count + 1 WHERE id = ?")
        .bind(&artist.id)
        .execute(&mut *tx)
        .await?;
    tx.commit().await?;

    tracing::info!(
        subscription_id = %subscription_id,
        artist_id = %artist.id,
        tier_id = %tier.id,
        "Subscription started"
    );
    let subscription = fetch_subscription(pool, &subscription_id).await?;
    Ok(HttpResponse::Created().json(subscription))
}

fn already_subscribed() -> AppError {
    AppError::BadRequest("You already have a subscription to this artist".to_string())
}

async fn fetch_subscription(pool: &SqlitePool, id: &str) -> Result<UserSubscription> {
    sqlx::query_as::<_, UserSubscription>("SELECT * FROM user_subscriptions WHERE id = ?")
        .bind(id)
        .fetch_optional(pool)
        .await?
        .ok_or_else(|| AppError::not_found("Subscription"))
}

async fn fetch_own_subscription(pool: &SqlitePool, id: &str, ctx: &AuthContext) -> Result<UserSubscription> {
    let sub = fetch_subscription(pool, id).await?;
    if !ctx.is(&sub.user_id) && !ctx.is_admin {
        return Err(AppError::Forbidden(
            "Not authorized to access this subscription".to_string(),
        ));
    }
    Ok(sub)
}

/// Cancels at period end: access continues until `current_period_end`.
pub async fn cancel_subscription(
    ctx: AuthContext,
    path: web::Path<String>,
    req: Option<web::Json<CancelSubscriptionRequest>>,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    let pool = &state.db_pool;
    let sub = fetch_own_subscription(pool, &path.into_inner(), &ctx).await?;
    if !sub.status.is_ongoing() {
        return Err(AppError::BadRequest(
            "Subscription is not active".to_string(),
        ));
    }
    let reason = req.and_then(|r| r.into_inner().reason);
    let now = Utc::now();

    let mut tx = pool.begin().await?;
    sqlx::query(
        "UPDATE user_subscriptions SET status = ?, auto_renew = 0, canceled_at = ?,
            cancel_reason = ?, updated_at = ?
         WHERE id = ?",
    )
    .bind(SubscriptionStatus::Canceled)
    .bind(now)
    .bind(&reason)
    .bind(now)
    .bind(&sub.id)
    .execute(&mut *tx)
    .await?;
    sqlx::query(
        "UPDATE artists SET subscriber_count = MAX(subscriber_count - 1, 0) WHERE id = ?",
    )
    .bind(&sub.artist_id)
    .execute(&mut *tx)
    .await?;
    tx.commit().await?;

    tracing::info!(subscription_id = %sub.id, "Subscription canceled");
    let sub = fetch_subscription(pool, &sub.id).await?;
    Ok(HttpResponse::Ok().json(sub))
}

pub async fn change_tier(
    ctx: AuthContext,
    path: web::Path<String>,
    req: web::Json<ChangeTierRequest>,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    let pool = &state.db_pool;
    let sub = fetch_own_subscription(pool, &path.into_inner(), &ctx).await?;
    if !sub.status.is_ongoing() {
        return Err(AppError::BadRequest(
            "Only active or paused subscriptions can change tier".to_string(),
        ));
    }

    let tier = fetch_tier(pool, &req.tier_id).await?;
    if tier.artist_id != sub.artist_id {
        return Err(AppError::BadRequest(
            "Tier does not belong to this artist".to_string(),
        ));
    }
    if tier.status != TierStatus::Active {
        return Err(AppError::BadRequest("Tier is no longer available".to_string()));
    }
    if tier.id == sub.tier_id {
        return Err(AppError::BadRequest("Already subscribed to this tier".to_string()));
    }

    sqlx::query("UPDATE user_subscriptions SET tier_id = ?, updated_at = ? WHERE id = ?")
        .bind(&tier.id)
        .bind(Utc::now())
        .bind(&sub.id)
        .execute(pool)
        .await?;

    let sub = fetch_subscription(pool, &sub.id).await?;
    Ok(HttpResponse::Ok().json(sub))
}

async fn transition(
    ctx: &AuthContext,
    id: &str,
    state: &AppState,
    from: SubscriptionStatus,
    to: SubscriptionStatus,
) -> Result<UserSubscription> {
    let pool = &state.db_pool;
    let sub = fetch_own_subscription(pool, id, ctx).await?;
    if sub.status != from {
        let required = match from {
            SubscriptionStatus::Active => "active",
            SubscriptionStatus::Paused => "paused",
            SubscriptionStatus::Canceled => "canceled",
            SubscriptionStatus::PastDue => "past due",
        };
        return Err(AppError::BadRequest(format!(
            "Subscription must be {} for this action",
            required
        )));
    }

    sqlx::query("UPDATE user_subscriptions SET status = ?, updated_at = ? WHERE id = ?")
        .bind(to)
        .bind(Utc::now())
        .bind(&sub.id)
        .execute(pool)
        .await?;
    fetch_subscription(pool, &sub.id).await
}

pub async fn pause_subscription(
    ctx: AuthContext,
    path: web::Path<String>,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    let sub = transition(
        &ctx,
        &path.into_inner(),
        &state,
        SubscriptionStatus::Active,
        SubscriptionStatus::Paused,
    )
    .await?;
    Ok(HttpResponse::Ok().json(sub))
}

pub async fn resume_subscription(
    ctx: AuthContext,
    path: web::Path<String>,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    let sub = transition(
        &ctx,
        &path.into_inner(),
        &state,
        SubscriptionStatus::Paused,
        SubscriptionStatus::Active,
    )
    .await?;
    Ok(HttpResponse::Ok().json(sub))
}

pub async fn list_my_subscriptions(ctx: AuthContext, state: web::Data<AppState>) -> Result<HttpResponse> {
    let subs = sqlx::query_as::<_, UserSubscription>(
        "SELECT * FROM user_subscriptions WHERE user_id = ? ORDER BY created_at DESC",
    )
    .bind(&ctx.user_id)
    .fetch_all(&state.db_pool)
    .await?;
    Ok(HttpResponse::Ok().json(subs))
}

pub async fn get_subscription(
    ctx: AuthContext,
    path: web::Path<String>,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    let sub = fetch_own_subscription(&state.db_pool, &path.into_inner(), &ctx).await?;
    Ok(HttpResponse::Ok().json(sub))
}

pub async fn artist_subscribers(
    ctx: AuthContext,
    path: web::Path<String>,
    state: web::Data<AppState>,
) -> Result<HttpResponse> {
    let artist = fetch_artist(&state.db_pool, &path.into_inner()).await?;
    require_artist_member(&state.db_pool, &ctx, &artist.id).await?;

    let subscribers = sqlx::query_as::<_, Subscriber>(
        "SELECT s.id AS subscription_id, s.user_id, u.username, s.tier_id, s.status,
            s.current_period_end
         FROM user_subscriptions s JOIN users u ON u.id = s.user_id
         WHERE s.artist_id = ?
         ORDER BY s.created_at DESC",
    )
    .bind(&artist.id)
    .fetch_all(&state.db_pool)
    .await?;

    Ok(HttpResponse::Ok().json(subscribers))
}
