
use actix_web::http::StatusCode;
use serde_json::{json, Value};
use test_helpers::*;

async fn profile<S>(app: &S, viewer: &Session, user_id: &str) -> Value
where
    S: actix_web::dev::Service<
        actix_http::Request,
        Response = actix_web::dev::ServiceResponse,
        Error = actix_web::Error,
    >,
{
    let (status, body) = send(app, get(&format!("/api/users/{}", user_id), viewer)).await;
    assert_eq!(status, StatusCode::OK);
    body
}

#[actix_web::test]
async fn following_an_artist_twice_counts_once() {
    let ctx = TestCtx::new().await;
    let app = ctx.app().await;
    let owner = register(&app, "owner").await;
    let fan = register(&app, "fan").await;
    let artist = create_artist(&app, &owner, "Loud Band", false).await;
    let uri = format!("/api/follows/artists/{}", artist["id"].as_str().unwrap());

    let (status, _) = send(&app, post(&uri, &fan, json!({}))).await;
    assert_eq!(status, StatusCode::OK);
    let (status, body) = send(&app, post(&uri, &fan, json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{}", body);

    let (_, detail) = send(
        &app,
        get(&format!("/api/artists/{}", artist["id"].as_str().unwrap()), &fan),
    )
    .await;
    assert_eq!(detail["follower_count"], 1);
    assert_eq!(profile(&app, &fan, &fan.id).await["following_count"], 1);

    let (_, following) = send(&app, get("/api/follows/following", &fan)).await;
    assert_eq!(following["artists"].as_array().unwrap().len(), 1);
    assert!(following["users"].as_array().unwrap().is_empty());
}

#[actix_web::test]
async fn unfollowing_without_following_changes_nothing() {
    let ctx = TestCtx::new().await;
    let app = ctx.app().await;
    let ana = register(&app, "ana").await;
    let ben = register(&app, "ben").await;
    let artist = create_artist(&app, &ben, "Quiet Band", false).await;

    let (status, _) = send(&app, delete(&format!("/api/follows/users/{}", ben.id), &ana)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let (status, _) = send(
        &app,
        delete(&format!("/api/follows/artists/{}", artist["id"].as_str().unwrap()), &ana),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    assert_eq!(profile(&app, &ana, &ana.id).await["following_count"], 0);
    assert_eq!(profile(&app, &ana, &ben.id).await["follower_count"], 0);
}

#[actix_web::test]
async fn user_follow_round_trip_and_self_follow() {
    let ctx = TestCtx::new().await;
    let app = ctx.app().await;
    let ana = register(&app, "ana").await;
    let ben = register(&app, "ben").await;
    let uri = format!("/api/follows/users/{}", ben.id);

    let (status, _) = send(&app, post(&format!("/api/follows/users/{}", ana.id), &ana, json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&app, post(&uri, &ana, json!({}))).await;
    assert_eq!(status, StatusCode::OK);
    let (status, _) = send(&app, post(&uri, &ana, json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(profile(&app, &ana, &ben.id).await["follower_count"], 1);

    let (_, followers) = send(&app, get(&format!("/api/users/{}/followers", ben.id), &ana)).await;
    assert_eq!(followers[0]["username"], "ana");

    let (status, _) = send(&app, delete(&uri, &ana)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(profile(&app, &ana, &ben.id).await["follower_count"], 0);
    assert_eq!(profile(&app, &ana, &ana.id).await["following_count"], 0);
}

#[actix_web::test]
async fn folder_cycles_are_rejected_at_any_depth() {
    let ctx = TestCtx::new().await;
    let app = ctx.app().await;
    let ana = register(&app, "ana").await;

    // Chain f0 <- f1 <- f2 <- f3 <- f4, each folder nested under the previous one.
    let mut ids: Vec<String> = Vec::new();
    for depth in 0..5 {
        let mut body = json!({ "name": format!("level {}", depth) });
        if let Some(parent) = ids.last() {
            body["parent_id"] = json!(parent);
        }
        let (status, folder) = send(&app, post("/api/folders", &ana, body)).await;
        assert_eq!(status, StatusCode::CREATED, "{}", folder);
        ids.push(folder["id"].as_str().unwrap().to_string());
    }

    let root_uri = format!("/api/folders/{}", ids[0]);
    for descendant in &ids {
        let (status, body) = send(&app, put(&root_uri, &ana, json!({ "parent_id": descendant }))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST, "moving under {}: {}", descendant, body);
    }

    let (status, _) = send(
        &app,
        put(&format!("/api/folders/{}", ids[2]), &ana, json!({ "parent_id": ids[4] })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Moving a subtree sideways is fine.
    let (status, moved) = send(
        &app,
        put(&format!("/api/folders/{}", ids[3]), &ana, json!({ "parent_id": ids[0] })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(moved["parent_id"], ids[0].as_str());

    let (status, _) = send(
        &app,
        put(&format!("/api/folders/{}", ids[1]), &ana, json!({ "parent_id": "missing" })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[actix_web::test]
async fn deleting_a_folder_moves_its_contents_up() {
    let ctx = TestCtx::new().await;
    let app = ctx.app().await;
    let ana = register(&app, "ana").await;

    let (_, outer) = send(&app, post("/api/folders", &ana, json!({ "name": "Outer" }))).await;
    let outer_id = outer["id"].as_str().unwrap();
    let (_, inner) = send(
        &app,
        post("/api/folders", &ana, json!({ "name": "Inner", "parent_id": outer_id })),
    )
    .await;
    let inner_id = inner["id"].as_str().unwrap();
    let (_, playlist) = send(
        &app,
        post("/api/playlists", &ana, json!({ "name": "Filed", "folder_id": inner_id })),
    )
    .await;

    let (status, _) = send(&app, delete(&format!("/api/folders/{}", inner_id), &ana)).await;
    assert_eq!(status, StatusCode::OK);

    let (_, moved) = send(
        &app,
        get(&format!("/api/playlists/{}", playlist["id"].as_str().unwrap()), &ana),
    )
    .await;
    assert_eq!(moved["folder_id"], outer_id);

    let (status, tree) = send(&app, get("/api/folders", &ana)).await;
    assert_eq!(status, StatusCode::OK);
    let folders = tree["folders"].as_array().unwrap();
    assert_eq!(folders.len(), 1);
    assert_eq!(folders[0]["playlist_ids"][0], playlist["id"]);
}

#[actix_web::test]
async fn folders_belong_to_their_owner() {
    let ctx = TestCtx::new().await;
    let app = ctx.app().await;
    let ana = register(&app, "ana").await;
    let ben = register(&app, "ben").await;

    let (_, folder) = send(&app, post("/api/folders", &ana, json!({ "name": "Mine" }))).await;
    let (status, _) = send(
        &app,
        get(&format!("/api/folders/{}", folder["id"].as_str().unwrap()), &ben),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(
        &app,
        post("/api/folders", &ben, json!({ "name": "Sneaky", "parent_id": folder["id"] })),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}
