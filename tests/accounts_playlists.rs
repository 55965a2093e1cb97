
use actix_web::http::StatusCode;
use actix_web::test::TestRequest;
use serde_json::json;
use test_helpers::*;

#[actix_web::test]
async fn duplicate_registration_is_rejected() {
    let ctx = TestCtx::new().await;
    let app = ctx.app().await;
    register(&app, "ana").await;

    let (status, body) = send(
        &app,
        TestRequest::post().uri("/api/auth/register").set_json(json!({
            "username": "ana",
            "email": "someone-else@example.com",
            "password": "another password",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("Username"));

    let (status, _) = send(
        &app,
        TestRequest::post().uri("/api/auth/register").set_json(json!({
            "username": "ana2",
            "email": "ANA@example.com",
            "password": "another password",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn registration_lists_missing_fields() {
    let ctx = TestCtx::new().await;
    let app = ctx.app().await;

    let (status, body) = send(
        &app,
        TestRequest::post()
            .uri("/api/auth/register")
            .set_json(json!({ "username": "ana" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["fields"], json!(["email", "password"]));
}

#[actix_web::test]
async fn login_accepts_username_or_email() {
    let ctx = TestCtx::new().await;
    let app = ctx.app().await;
    register(&app, "ana").await;

    for identifier in ["ana", "ana@example.com"] {
        let (status, body) = send(
            &app,
            TestRequest::post().uri("/api/auth/login").set_json(json!({
                "username": identifier,
                "password": "correct horse battery",
            })),
        )
        .await;
        assert_eq!(status, StatusCode::OK, "login as {}", identifier);
        assert!(body["token"].is_string());
        assert!(body["user"].get("password_hash").is_none());
    }

    let (status, _) = send(
        &app,
        TestRequest::post().uri("/api/auth/login").set_json(json!({
            "username": "ana",
            "password": "wrong",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[actix_web::test]
async fn protected_routes_need_a_valid_token() {
    let ctx = TestCtx::new().await;
    let app = ctx.app().await;

    let (status, _) = send(&app, TestRequest::get().uri("/api/auth/me")).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let forged = Session {
        id: "nobody".to_string(),
        token: "not-a-jwt".to_string(),
    };
    let (status, _) = send(&app, get("/api/auth/me", &forged)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[actix_web::test]
async fn liked_songs_is_created_and_protected() {
    let ctx = TestCtx::new().await;
    let app = ctx.app().await;
    let ana = register(&app, "ana").await;

    let (status, playlists) = send(&app, get("/api/playlists", &ana)).await;
    assert_eq!(status, StatusCode::OK);
    let playlists = playlists.as_array().unwrap();
    assert_eq!(playlists.len(), 1);
    let liked = &playlists[0];
    assert_eq!(liked["name"], "Liked Songs");
    assert_eq!(liked["is_system"], true);
    assert_eq!(liked["is_public"], false);

    let id = liked["id"].as_str().unwrap();
    let (status, _) = send(&app, delete(&format!("/api/playlists/{}", id), &ana)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(
        &app,
        put(&format!("/api/playlists/{}", id), &ana, json!({ "name": "Faves" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (_, playlists) = send(&app, get("/api/playlists", &ana)).await;
    assert_eq!(playlists.as_array().unwrap().len(), 1);
}

#[actix_web::test]
async fn playlist_tracks_keep_totals_in_step() {
    let ctx = TestCtx::new().await;
    let app = ctx.app().await;
    let ana = register(&app, "ana").await;
    let artist = create_artist(&app, &ana, "The Testers", false).await;
    let artist_id = artist["id"].as_str().unwrap();

    let first = upload_track(&app, &ana, &[("artist_id", artist_id), ("title", "One"), ("duration", "200")]).await;
    let second = upload_track(&app, &ana, &[("artist_id", artist_id), ("title", "Two"), ("duration", "95")]).await;
    let first_id = first["id"].as_str().unwrap();
    let second_id = second["id"].as_str().unwrap();

    let (status, playlist) = send(&app, post("/api/playlists", &ana, json!({ "name": "Mix" }))).await;
    assert_eq!(status, StatusCode::CREATED);
    let uri = format!("/api/playlists/{}/tracks", playlist["id"].as_str().unwrap());

    for track_id in [first_id, second_id] {
        let (status, _) = send(&app, post(&uri, &ana, json!({ "track_id": track_id }))).await;
        assert_eq!(status, StatusCode::OK);
    }
    let (status, body) = send(&app, post(&uri, &ana, json!({ "track_id": first_id }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST, "{}", body);

    let (_, detail) = send(&app, get(&uri.replace("/tracks", ""), &ana)).await;
    assert_eq!(detail["track_count"], 2);
    assert_eq!(detail["total_duration"], 295);
    assert_eq!(detail["tracks"][0]["position"], 1);
    assert_eq!(detail["tracks"][1]["position"], 2);

    let (status, after) = send(&app, delete(&format!("{}/{}", uri, first_id), &ana)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(after["track_count"], 1);
    assert_eq!(after["total_duration"], 95);

    let (_, detail) = send(&app, get(&uri.replace("/tracks", ""), &ana)).await;
    assert_eq!(detail["tracks"][0]["track_id"], second_id);
    assert_eq!(detail["tracks"][0]["position"], 1);

    let (status, _) = send(&app, delete(&format!("{}/{}", uri, first_id), &ana)).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[actix_web::test]
async fn private_playlists_are_hidden_from_others() {
    let ctx = TestCtx::new().await;
    let app = ctx.app().await;
    let ana = register(&app, "ana").await;
    let ben = register(&app, "ben").await;

    let (_, private) = send(&app, post("/api/playlists", &ana, json!({ "name": "Secret" }))).await;
    let (_, shared) = send(
        &app,
        post("/api/playlists", &ana, json!({ "name": "Shared", "is_public": true })),
    )
    .await;

    let (status, _) = send(
        &app,
        get(&format!("/api/playlists/{}", private["id"].as_str().unwrap()), &ben),
    )
    .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let follow_uri = format!("/api/playlists/{}/follow", shared["id"].as_str().unwrap());
    let (status, toggled) = send(&app, post(&follow_uri, &ben, json!({}))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(toggled["following"], true);
    assert_eq!(toggled["follower_count"], 1);

    let (_, toggled) = send(&app, post(&follow_uri, &ben, json!({}))).await;
    assert_eq!(toggled["following"], false);
    assert_eq!(toggled["follower_count"], 0);

    let (status, _) = send(&app, post(&follow_uri, &ana, json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[actix_web::test]
async fn duplicate_copies_tracks_into_a_private_playlist() {
    let ctx = TestCtx::new().await;
    let app = ctx.app().await;
    let ana = register(&app, "ana").await;
    let artist = create_artist(&app, &ana, "Copycats", false).await;
    let track = upload_track(
        &app,
        &ana,
        &[("artist_id", artist["id"].as_str().unwrap()), ("duration", "60")],
    )
    .await;
    assert_eq!(track["title"], "demo");

    let (_, original) = send(
        &app,
        post("/api/playlists", &ana, json!({ "name": "Road Trip", "is_public": true })),
    )
    .await;
    let id = original["id"].as_str().unwrap();
    send(
        &app,
        post(&format!("/api/playlists/{}/tracks", id), &ana, json!({ "track_id": track["id"] })),
    )
    .await;

    let (status, copy) = send(
        &app,
        authed(TestRequest::post().uri(&format!("/api/playlists/{}/duplicate", id)), &ana),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{}", copy);
    assert_eq!(copy["name"], "Road Trip (Copy)");
    assert_eq!(copy["is_public"], false);
    assert_eq!(copy["track_count"], 1);
    assert_eq!(copy["total_duration"], 60);
}

#[actix_web::test]
async fn deleting_a_track_renumbers_playlists_holding_it() {
    let ctx = TestCtx::new().await;
    let app = ctx.app().await;
    let ana = register(&app, "ana").await;
    let artist = create_artist(&app, &ana, "Gapless", false).await;
    let artist_id = artist["id"].as_str().unwrap();

    let mut track_ids = Vec::new();
    for title in ["A", "B", "C"] {
        let track = upload_track(&app, &ana, &[("artist_id", artist_id), ("title", title), ("duration", "10")]).await;
        track_ids.push(track["id"].as_str().unwrap().to_string());
    }

    let (_, playlist) = send(&app, post("/api/playlists", &ana, json!({ "name": "Set" }))).await;
    let playlist_uri = format!("/api/playlists/{}", playlist["id"].as_str().unwrap());
    for track_id in &track_ids {
        send(&app, post(&format!("{}/tracks", playlist_uri), &ana, json!({ "track_id": track_id }))).await;
    }

    let (status, _) = send(&app, delete(&format!("/api/tracks/{}", track_ids[1]), &ana)).await;
    assert_eq!(status, StatusCode::OK);

    let (_, detail) = send(&app, get(&playlist_uri, &ana)).await;
    assert_eq!(detail["track_count"], 2);
    assert_eq!(detail["total_duration"], 20);
    let entries: Vec<(&str, i64)> = detail["tracks"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| (t["track_id"].as_str().unwrap(), t["position"].as_i64().unwrap()))
        .collect();
    assert_eq!(entries, [(track_ids[0].as_str(), 1), (track_ids[2].as_str(), 2)]);
}
