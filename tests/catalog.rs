
use actix_web::http::{header, StatusCode};
use actix_web::test::TestRequest;
use serde_json::json;
use test_helpers::*;

#[actix_web::test]
async fn album_upload_flow_orders_tracks_by_number() {
    let ctx = TestCtx::new().await;
    let app = ctx.app().await;
    let owner = register(&app, "owner").await;
    let artist = create_artist(&app, &owner, "Night Drive", false).await;
    let artist_id = artist["id"].as_str().unwrap();

    let (status, album) = send(
        &app,
        post(
            "/api/albums",
            &owner,
            json!({
                "title": "Late Hours",
                "artist_id": artist_id,
                "release_date": "2024-03-01",
                "genre": "Synthwave",
            }),
        ),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{}", album);
    assert_eq!(album["album_type"], "album");
    let album_id = album["id"].as_str().unwrap();

    for (number, title, duration) in [("3", "Outro", "90"), ("1", "Intro", "60"), ("2", "Highway", "240")] {
        let track = upload_track(
            &app,
            &owner,
            &[
                ("artist_id", artist_id),
                ("album_id", album_id),
                ("track_number", number),
                ("title", title),
                ("duration", duration),
            ],
        )
        .await;
        assert_eq!(track["genre"], "Synthwave");
        assert_eq!(track["release_date"], "2024-03-01");
        assert!(track["file_url"].as_str().unwrap().starts_with("/uploads/audio/"));
    }

    let (status, detail) = send(&app, TestRequest::get().uri(&format!("/api/albums/{}", album_id))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(detail["artist_name"], "Night Drive");
    assert_eq!(detail["total_duration"], 390);
    let titles: Vec<&str> = detail["tracks"]
        .as_array()
        .unwrap()
        .iter()
        .map(|t| t["title"].as_str().unwrap())
        .collect();
    assert_eq!(titles, ["Intro", "Highway", "Outro"]);
}

#[actix_web::test]
async fn album_creation_reports_missing_fields() {
    let ctx = TestCtx::new().await;
    let app = ctx.app().await;
    let owner = register(&app, "owner").await;

    let (status, body) = send(&app, post("/api/albums", &owner, json!({ "genre": "Jazz" }))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["fields"], json!(["title", "artist_id", "release_date"]));
}

#[actix_web::test]
async fn uploads_are_limited_to_artist_members_and_audio() {
    let ctx = TestCtx::new().await;
    let app = ctx.app().await;
    let owner = register(&app, "owner").await;
    let stranger = register(&app, "stranger").await;
    let artist = create_artist(&app, &owner, "Members Only", false).await;
    let artist_id = artist["id"].as_str().unwrap();

    let body = multipart(
        &[("artist_id", artist_id)],
        Some(("file", "song.mp3", "audio/mpeg", &b"bytes"[..])),
    );
    let (status, _) = send(&app, post_multipart("/api/tracks", &stranger, body)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let body = multipart(
        &[("artist_id", artist_id)],
        Some(("file", "notes.txt", "text/plain", &b"bytes"[..])),
    );
    let (status, _) = send(&app, post_multipart("/api/tracks", &owner, body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let body = multipart(&[("artist_id", artist_id)], None);
    let (status, _) = send(&app, post_multipart("/api/tracks", &owner, body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    // Nothing to name the artist by: no id and no tags.
    let body = multipart(&[], Some(("file", "song.mp3", "audio/mpeg", &b"bytes"[..])));
    let (status, body) = send(&app, post_multipart("/api/tracks", &owner, body)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["fields"], json!(["artist_id"]));
}

#[actix_web::test]
async fn plays_count_listeners_once() {
    let ctx = TestCtx::new().await;
    let app = ctx.app().await;
    let owner = register(&app, "owner").await;
    let fan = register(&app, "fan").await;
    let artist = create_artist(&app, &owner, "Replay", false).await;
    let artist_id = artist["id"].as_str().unwrap();
    let track = upload_track(&app, &owner, &[("artist_id", artist_id), ("title", "Loop")]).await;
    let play_uri = format!("/api/tracks/{}/play", track["id"].as_str().unwrap());

    for expected in 1..=2 {
        let (status, body) = send(&app, post(&play_uri, &fan, json!({}))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["play_count"], expected);
    }
    let (_, body) = send(&app, TestRequest::post().uri(&play_uri)).await;
    assert_eq!(body["play_count"], 3);

    let (_, detail) = send(&app, TestRequest::get().uri(&format!("/api/artists/{}", artist_id))).await;
    assert_eq!(detail["total_plays"], 3);
    assert_eq!(detail["listener_count"], 1);
}

#[actix_web::test]
async fn exclusive_tracks_are_locked_for_outsiders() {
    let ctx = TestCtx::new().await;
    let app = ctx.app().await;
    let owner = register(&app, "owner").await;
    let fan = register(&app, "fan").await;
    let artist = create_artist(&app, &owner, "Vault", true).await;
    let track = upload_track(
        &app,
        &owner,
        &[("artist_id", artist["id"].as_str().unwrap()), ("is_exclusive", "true")],
    )
    .await;
    let track_uri = format!("/api/tracks/{}", track["id"].as_str().unwrap());

    let (_, seen) = send(&app, get(&track_uri, &fan)).await;
    assert_eq!(seen["locked"], true);
    assert_eq!(seen["file_url"], "");

    let (status, _) = send(&app, post(&format!("{}/play", track_uri), &fan, json!({}))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    let (status, _) = send(&app, get(&format!("{}/stream", track_uri), &fan)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (_, seen) = send(&app, get(&track_uri, &owner)).await;
    assert_eq!(seen["locked"], false);
}

#[actix_web::test]
async fn search_requires_a_query_and_finds_across_kinds() {
    let ctx = TestCtx::new().await;
    let app = ctx.app().await;
    let owner = register(&app, "owner").await;
    let artist = create_artist(&app, &owner, "Blue Lagoon", false).await;
    upload_track(
        &app,
        &owner,
        &[("artist_id", artist["id"].as_str().unwrap()), ("title", "Blue Monday")],
    )
    .await;
    send(
        &app,
        post("/api/playlists", &owner, json!({ "name": "Blue hour", "is_public": true })),
    )
    .await;
    send(&app, post("/api/playlists", &owner, json!({ "name": "Blue secrets" }))).await;

    let (status, body) = send(&app, TestRequest::get().uri("/api/search/tracks?q=")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["fields"], json!(["q"]));

    let (status, results) = send(&app, TestRequest::get().uri("/api/search?q=blue")).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(results["totals"]["tracks"], 1);
    assert_eq!(results["totals"]["artists"], 1);
    assert_eq!(results["totals"]["playlists"], 1);
    assert_eq!(results["tracks"][0]["title"], "Blue Monday");

    let (_, page) = send(&app, TestRequest::get().uri("/api/search/artists?q=lagoon")).await;
    assert_eq!(page["total"], 1);
    assert_eq!(page["items"][0]["name"], "Blue Lagoon");
}

#[actix_web::test]
async fn distributor_uploads_need_the_key_and_the_role() {
    let ctx = TestCtx::new().await;
    let app = ctx.app().await;
    let dist = register(&app, "label").await;

    let upload = |session: &Session, key: Option<&str>| {
        let body = multipart(
            &[("artist_name", "Signed Act"), ("album_title", "Debut"), ("duration", "180")],
            Some(("file", "single.mp3", "audio/mpeg", &b"bytes"[..])),
        );
        let req = post_multipart("/api/distributor/upload", session, body);
        match key {
            Some(key) => req.insert_header(("X-API-Key", key.to_string())),
            None => req,
        }
    };

    let (status, _) = send(&app, upload(&dist, None)).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    let (status, _) = send(&app, upload(&dist, Some("test-distributor-key"))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    sqlx::query("UPDATE users SET is_distributor = 1 WHERE id = ?")
        .bind(&dist.id)
        .execute(ctx.pool())
        .await
        .unwrap();
    // Roles are read from the token, so sign in again.
    let (_, login) = send(
        &app,
        TestRequest::post().uri("/api/auth/login").set_json(json!({
            "username": "label",
            "password": "correct horse battery",
        })),
    )
    .await;
    let dist = Session {
        id: dist.id.clone(),
        token: login["token"].as_str().unwrap().to_string(),
    };

    let (status, track) = send(&app, upload(&dist, Some("test-distributor-key"))).await;
    assert_eq!(status, StatusCode::CREATED, "{}", track);
    assert_eq!(track["distributor_name"], "Independent Distributor");
    assert_eq!(track["duration"], 180);
    assert_eq!(track["title"], "single");
    assert!(track["album_id"].is_string());

    let (status, listed) = send(
        &app,
        get("/api/distributor/tracks", &dist).insert_header(("X-API-Key", "test-distributor-key")),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed["total"], 1);

    let (_, artists) = send(&app, TestRequest::get().uri("/api/search/artists?q=signed")).await;
    assert_eq!(artists["items"][0]["name"], "Signed Act");
}

#[actix_web::test]
async fn admins_manage_users() {
    let ctx = TestCtx::new().await;
    let app = ctx.app().await;
    let admin = register(&app, "admin").await;
    let ana = register(&app, "ana").await;
    let ben = register(&app, "ben").await;

    let (status, _) = send(&app, get("/api/admin/stats", &ana)).await;
    assert_eq!(status, StatusCode::FORBIDDEN);

    sqlx::query("UPDATE users SET is_admin = 1 WHERE id = ?")
        .bind(&admin.id)
        .execute(ctx.pool())
        .await
        .unwrap();
    let (_, login) = send(
        &app,
        TestRequest::post()
            .uri("/api/auth/login")
            .insert_header((header::CONTENT_TYPE, "application/json"))
            .set_payload(r#"{"email":"admin@example.com","password":"correct horse battery"}"#),
    )
    .await;
    let admin = Session {
        id: admin.id.clone(),
        token: login["token"].as_str().unwrap().to_string(),
    };

    send(&app, post(&format!("/api/follows/users/{}", ana.id), &ben, json!({}))).await;

    let (status, _) = send(&app, delete(&format!("/api/admin/users/{}", admin.id), &admin)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&app, delete(&format!("/api/admin/users/{}", ben.id), &admin)).await;
    assert_eq!(status, StatusCode::OK);

    let (_, profile) = send(&app, get(&format!("/api/users/{}", ana.id), &ana)).await;
    assert_eq!(profile["follower_count"], 0);

    let (status, stats) = send(&app, get("/api/admin/stats", &admin)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(stats["users"], 2);
    // Liked Songs of the two remaining users.
    assert_eq!(stats["playlists"], 2);

    let (status, updated) = send(
        &app,
        put(&format!("/api/admin/users/{}/roles", ana.id), &admin, json!({ "is_artist": true })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["is_artist"], true);
}

fn part(body: &mut Vec<u8>, name: &str, file: Option<&str>, value: &[u8]) {
    let disposition = match file {
        Some(filename) => format!(
            "form-data; name=\"{}\"; filename=\"{}\"\r\nContent-Type: audio/mpeg",
            name, filename
        ),
        None => format!("form-data; name=\"{}\"", name),
    };
    body.extend_from_slice(format!("--{}\r\nContent-Disposition: {}\r\n\r\n", BOUNDARY, disposition).as_bytes());
    body.extend_from_slice(value);
    body.extend_from_slice(b"\r\n");
}

#[actix_web::test]
async fn rejected_uploads_leave_no_files_behind() {
    let ctx = TestCtx::new().await;
    let app = ctx.app().await;
    let owner = register(&app, "owner").await;
    let artist = create_artist(&app, &owner, "Tidy", false).await;
    let artist_id = artist["id"].as_str().unwrap();
    let audio_dir = ctx.state.config.audio_dir();

    let mut two_files = Vec::new();
    part(&mut two_files, "artist_id", None, artist_id.as_bytes());
    part(&mut two_files, "file", Some("a.mp3"), b"first");
    part(&mut two_files, "file", Some("b.mp3"), b"second");
    two_files.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());

    let mut bad_text_after_file = Vec::new();
    part(&mut bad_text_after_file, "file", Some("a.mp3"), b"first");
    part(&mut bad_text_after_file, "title", None, &[0xff, 0xfe, 0xfd]);
    bad_text_after_file.extend_from_slice(format!("--{}--\r\n", BOUNDARY).as_bytes());

    for body in [two_files, bad_text_after_file] {
        let (status, _) = send(&app, post_multipart("/api/tracks", &owner, body)).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);

        let left: Vec<_> = match std::fs::read_dir(&audio_dir) {
            Ok(entries) => entries.map(|e| e.unwrap().file_name()).collect(),
            Err(_) => Vec::new(),
        };
        assert!(left.is_empty(), "files left behind: {:?}", left);
    }
}

#[actix_web::test]
async fn huge_page_numbers_are_capped() {
    let ctx = TestCtx::new().await;
    let app = ctx.app().await;

    let (status, page) = send(
        &app,
        TestRequest::get().uri("/api/albums?page=9223372036854775807&limit=100"),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{}", page);
    assert_eq!(page["items"], json!([]));
    assert_eq!(page["page"], 1_000_000);
}
