
use actix_web::http::StatusCode;
use actix_web::test::TestRequest;
use chrono::{Duration, Utc};
use serde_json::{json, Value};
use test_helpers::*;

fn tier(name: &str, price: f64, order: i64) -> Value {
    json!({ "name": name, "price": price, "order": order, "benefits": ["Early access"] })
}

#[actix_web::test]
async fn an_artist_has_at_most_three_active_tiers() {
    let ctx = TestCtx::new().await;
    let app = ctx.app().await;
    let owner = register(&app, "owner").await;
    let artist = create_artist(&app, &owner, "Tiered", true).await;
    let uri = format!("/api/artists/{}/tiers", artist["id"].as_str().unwrap());

    let mut tier_ids = Vec::new();
    for (order, price) in [(1, 2.99), (2, 9.99), (3, 24.99)] {
        let (status, body) = send(&app, post(&uri, &owner, tier(&format!("Tier {}", order), price, order))).await;
        assert_eq!(status, StatusCode::CREATED, "{}", body);
        tier_ids.push(body["id"].as_str().unwrap().to_string());
    }

    let (status, _) = send(&app, post(&uri, &owner, tier("Fourth", 4.99, 3))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&app, delete(&format!("{}/{}", uri, tier_ids[1]), &owner)).await;
    assert_eq!(status, StatusCode::OK);

    let (_, listed) = send(&app, get(&uri, &owner)).await;
    let names: Vec<&str> = listed
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["name"].as_str().unwrap())
        .collect();
    assert_eq!(names, ["Tier 1", "Tier 3"]);

    // The retired tier freed its order slot.
    let (status, body) = send(&app, post(&uri, &owner, tier("Replacement", 12.0, 2))).await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
}

#[actix_web::test]
async fn tier_price_and_order_are_bounded() {
    let ctx = TestCtx::new().await;
    let app = ctx.app().await;
    let owner = register(&app, "owner").await;
    let fan = register(&app, "fan").await;
    let artist = create_artist(&app, &owner, "Bounded", true).await;
    let uri = format!("/api/artists/{}/tiers", artist["id"].as_str().unwrap());

    for bad in [tier("Cheap", 0.5, 1), tier("Pricey", 150.0, 1), tier("Order", 5.0, 4)] {
        let (status, _) = send(&app, post(&uri, &owner, bad)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    send(&app, post(&uri, &owner, tier("Base", 5.0, 1))).await;
    let (status, _) = send(&app, post(&uri, &owner, tier("Same order", 6.0, 1))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&app, post(&uri, &fan, tier("Not mine", 5.0, 2))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
}

#[actix_web::test]
async fn one_ongoing_subscription_per_artist() {
    let ctx = TestCtx::new().await;
    let app = ctx.app().await;
    let owner = register(&app, "owner").await;
    let fan = register(&app, "fan").await;
    let artist = create_artist(&app, &owner, "Subscribable", true).await;
    let artist_id = artist["id"].as_str().unwrap();
    let tiers_uri = format!("/api/artists/{}/tiers", artist_id);
    let (_, basic) = send(&app, post(&tiers_uri, &owner, tier("Basic", 3.0, 1))).await;
    let (_, plus) = send(&app, post(&tiers_uri, &owner, tier("Plus", 8.0, 2))).await;

    let subscribe = |tier: &Value| json!({ "artist_id": artist_id, "tier_id": tier["id"] });

    let (status, sub) = send(&app, post("/api/subscriptions", &fan, subscribe(&basic))).await;
    assert_eq!(status, StatusCode::CREATED, "{}", sub);
    assert_eq!(sub["status"], "active");
    let sub_id = sub["id"].as_str().unwrap().to_string();

    let (status, _) = send(&app, post("/api/subscriptions", &fan, subscribe(&plus))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, paused) = send(
        &app,
        post(&format!("/api/subscriptions/{}/pause", sub_id), &fan, json!({})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(paused["status"], "paused");
    let (status, _) = send(&app, post("/api/subscriptions", &fan, subscribe(&plus))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    send(&app, post(&format!("/api/subscriptions/{}/resume", sub_id), &fan, json!({}))).await;
    let (status, canceled) = send(
        &app,
        post(
            &format!("/api/subscriptions/{}/cancel", sub_id),
            &fan,
            json!({ "reason": "Too expensive" }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(canceled["status"], "canceled");
    assert_eq!(canceled["cancel_reason"], "Too expensive");

    let (status, renewed) = send(&app, post("/api/subscriptions", &fan, subscribe(&plus))).await;
    assert_eq!(status, StatusCode::CREATED, "{}", renewed);
    assert_eq!(renewed["status"], "active");
    assert_eq!(renewed["tier_id"], plus["id"]);

    let (_, mine) = send(&app, get("/api/subscriptions", &fan)).await;
    assert_eq!(mine.as_array().unwrap().len(), 1);

    let (_, detail) = send(&app, get(&format!("/api/artists/{}", artist_id), &fan)).await;
    assert_eq!(detail["subscriber_count"], 1);
}

#[actix_web::test]
async fn artists_without_subscriptions_refuse_subscribers() {
    let ctx = TestCtx::new().await;
    let app = ctx.app().await;
    let owner = register(&app, "owner").await;
    let fan = register(&app, "fan").await;
    let artist = create_artist(&app, &owner, "Closed", false).await;
    let artist_id = artist["id"].as_str().unwrap();
    let (_, basic) = send(
        &app,
        post(&format!("/api/artists/{}/tiers", artist_id), &owner, tier("Basic", 3.0, 1)),
    )
    .await;

    let (status, _) = send(
        &app,
        post("/api/subscriptions", &fan, json!({ "artist_id": artist_id, "tier_id": basic["id"] })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn canceled_subscribers_keep_access_until_period_end() {
    let ctx = TestCtx::new().await;
    let app = ctx.app().await;
    let owner = register(&app, "owner").await;
    let fan = register(&app, "fan").await;
    let artist = create_artist(&app, &owner, "Gatekeepers", true).await;
    let artist_id = artist["id"].as_str().unwrap();
    let (_, basic) = send(
        &app,
        post(&format!("/api/artists/{}/tiers", artist_id), &owner, tier("Basic", 3.0, 1)),
    )
    .await;

    let (status, content) = send(
        &app,
        post(
            "/api/exclusive-content",
            &owner,
            json!({
                "artist_id": artist_id,
                "title": "Studio diary",
                "content_type": "video",
                "content_url": "https://cdn.example.com/diary.mp4",
                "minimum_tier_id": basic["id"],
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{}", content);
    let content_uri = format!("/api/exclusive-content/{}", content["id"].as_str().unwrap());

    let (status, _) = send(&app, get(&content_uri, &fan)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = send(&app, TestRequest::get().uri(&content_uri)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (_, sub) = send(
        &app,
        post("/api/subscriptions", &fan, json!({ "artist_id": artist_id, "tier_id": basic["id"] })),
    )
    .await;
    let sub_id = sub["id"].as_str().unwrap();
    send(&app, post(&format!("/api/subscriptions/{}/cancel", sub_id), &fan, json!({}))).await;

    let (status, body) = send(&app, get(&content_uri, &fan)).await;
    assert_eq!(status, StatusCode::OK, "{}", body);
    assert_eq!(body["locked"], false);
    assert_eq!(body["content_url"], "https://cdn.example.com/diary.mp4");

    sqlx::query("UPDATE user_subscriptions SET current_period_end = ? WHERE id = ?")
        .bind(Utc::now() - Duration::days(1))
        .bind(sub_id)
        .execute(ctx.pool())
        .await
        .unwrap();

    let (status, _) = send(&app, get(&content_uri, &fan)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (_, listed) = send(&app, get(&format!("/api/artists/{}/exclusive-content", artist_id), &fan)).await;
    assert_eq!(listed[0]["locked"], true);
    assert!(listed[0]["content_url"].is_null());

    // Members of the artist always see their own content.
    let (status, _) = send(&app, get(&content_uri, &owner)).await;
    assert_eq!(status, StatusCode::OK);
}

#[actix_web::test]
async fn minimum_tier_must_be_the_artists_own() {
    let ctx = TestCtx::new().await;
    let app = ctx.app().await;
    let owner = register(&app, "owner").await;
    let other = register(&app, "other").await;
    let artist = create_artist(&app, &owner, "Mine", true).await;
    let rival = create_artist(&app, &other, "Theirs", true).await;
    let (_, rival_tier) = send(
        &app,
        post(
            &format!("/api/artists/{}/tiers", rival["id"].as_str().unwrap()),
            &other,
            tier("Rival", 3.0, 1),
        ),
    )
    .await;

    let (status, body) = send(
        &app,
        post(
            "/api/exclusive-content",
            &owner,
            json!({
                "artist_id": artist["id"],
                "title": "Borrowed tier",
                "content_type": "text",
                "minimum_tier_id": rival_tier["id"],
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["fields"], json!(["minimum_tier_id"]));
}

#[actix_web::test]
async fn simultaneous_subscribes_open_one_subscription() {
    let ctx = TestCtx::new().await;
    let app = ctx.app().await;
    let owner = register(&app, "owner").await;
    let fan = register(&app, "fan").await;
    let artist = create_artist(&app, &owner, "Rush Hour", true).await;
    let artist_id = artist["id"].as_str().unwrap();
    let (_, basic) = send(
        &app,
        post(&format!("/api/artists/{}/tiers", artist_id), &owner, tier("Basic", 3.0, 1)),
    )
    .await;
    let body = json!({ "artist_id": artist_id, "tier_id": basic["id"] });

    let (first, second) = futures::join!(
        send(&app, post("/api/subscriptions", &fan, body.clone())),
        send(&app, post("/api/subscriptions", &fan, body.clone())),
    );
    let mut statuses = [first.0, second.0];
    statuses.sort();
    assert_eq!(statuses, [StatusCode::CREATED, StatusCode::BAD_REQUEST], "{} {}", first.1, second.1);

    let (_, detail) = send(&app, get(&format!("/api/artists/{}", artist_id), &fan)).await;
    assert_eq!(detail["subscriber_count"], 1);
}
