mod common;

use std::sync::Arc;

use common::{jpeg_bytes, png_bytes, seed_event, setup, spawn_server, wait_for_condition, MockProvider};
use faceswap_backend::models::ProcessStatus;
use faceswap_backend::pipeline::geometry::RawBox;
use reqwest::multipart::{Form, Part};

fn file_form(name: &str, bytes: Vec<u8>) -> Form {
    Form::new().part("file", Part::bytes(bytes).file_name(name.to_string()))
}

fn one_face() -> Arc<MockProvider> {
    Arc::new(MockProvider::new(vec![RawBox { x: 20, y: 20, width: 30, height: 30 }]))
}

#[tokio::test]
async fn test_health_endpoint() {
    let env = setup(one_face());
    let base = spawn_server(env.state.clone()).await;

    let resp = reqwest::get(format!("{}/health", base)).await.unwrap();
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "ok");
    assert!(body["version"].is_string());
    assert_eq!(body["queues"]["face"], 0);
}

#[tokio::test]
async fn upload_then_poll_until_completed() {
    let env = setup(one_face());
    let event_id = seed_event(&env.pool, false);
    let base = spawn_server(env.state.clone()).await;
    let client = reqwest::Client::new();

    let resp = client.get(format!("{}/api/events/{}/status", base, event_id)).send().await.unwrap();
    assert_eq!(resp.status(), 404);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "not_found");
    assert_eq!(body["message"], "No image uploaded");

    let resp = client
        .put(format!("{}/api/events/{}/picture", base, event_id))
        .multipart(file_form("party.png", png_bytes(200, 120)))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 202);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["event_id"], event_id);

    let processor = env.pipeline.processor().clone();
    let done = wait_for_condition(
        || matches!(processor.status(event_id), ProcessStatus::Completed { .. }),
        100,
        50,
    )
    .await;
    assert!(done);

    let body: serde_json::Value = client
        .get(format!("{}/api/events/{}/status", base, event_id))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["status"], "completed");
    assert_eq!(body["faces_count"], 1);
    assert_eq!(body["message"], "Processing completed, 1 faces detected");

    let body: serde_json::Value = client
        .get(format!("{}/api/events/{}/faces", base, event_id))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["faces"], serde_json::json!(["face_1.jpg"]));

    let meta: serde_json::Value = client
        .get(format!("{}/api/events/{}/faces/metadata", base, event_id))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(meta["faces"][0]["coordinates"], serde_json::json!({ "x1": 10, "y1": 10, "x2": 60, "y2": 60 }));

    let pic: serde_json::Value = client
        .get(format!("{}/api/events/{}/picture/metadata", base, event_id))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(pic["pic_info"]["width"], 200);

    let resp = client.get(format!("{}/api/events/{}/faces/face_1.jpg", base, event_id)).send().await.unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.headers()["content-type"], "image/jpeg");

    let resp = client.get(format!("{}/api/events/{}/picture", base, event_id)).send().await.unwrap();
    assert_eq!(resp.headers()["content-type"], "image/png");
}

#[tokio::test]
async fn upload_rejects_unknown_event_and_bad_extension() {
    let env = setup(one_face());
    let event_id = seed_event(&env.pool, true);
    let base = spawn_server(env.state.clone()).await;
    let client = reqwest::Client::new();

    let resp = client
        .put(format!("{}/api/events/{}/picture", base, event_id + 50))
        .multipart(file_form("a.jpg", jpeg_bytes(10, 10)))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 404);

    let resp = client
        .put(format!("{}/api/events/{}/picture", base, event_id))
        .multipart(file_form("a.gif", vec![1, 2, 3]))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["error"], "Only jpg, jpeg, png allowed");

    let resp = client.get(format!("{}/api/events/abc/status", base)).send().await.unwrap();
    assert_eq!(resp.status(), 400);
}

#[tokio::test]
async fn manual_face_add_and_delete_over_http() {
    let env = setup(one_face());
    let event_id = seed_event(&env.pool, false);
    env.pipeline.processor().save_original(event_id, &png_bytes(100, 100)).unwrap();
    let base = spawn_server(env.state.clone()).await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{}/api/events/{}/faces", base, event_id))
        .json(&serde_json::json!({ "x1": -5, "y1": 10, "x2": 40, "y2": 500, "face_id": "guest" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 201);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["face_info"]["filename"], "guest.jpg");
    assert_eq!(body["face_info"]["manual"], true);
    assert_eq!(body["face_info"]["coordinates"], serde_json::json!({ "x1": 0, "y1": 10, "x2": 40, "y2": 100 }));

    let resp = client
        .post(format!("{}/api/events/{}/faces", base, event_id))
        .json(&serde_json::json!({ "x1": 10 }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    let resp = client
        .post(format!("{}/api/events/{}/faces", base, event_id))
        .json(&serde_json::json!({ "x1": 50, "y1": 50, "x2": 50, "y2": 90 }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);

    let resp = client.delete(format!("{}/api/events/{}/faces/guest.jpg", base, event_id)).send().await.unwrap();
    assert_eq!(resp.status(), 200);
    let resp = client.delete(format!("{}/api/events/{}/faces/guest.jpg", base, event_id)).send().await.unwrap();
    assert_eq!(resp.status(), 200);
    let record = env.pipeline.processor().store().load(event_id).unwrap().unwrap();
    assert!(record.faces.is_empty());

    let resp = client
        .delete(format!("{}/api/events/{}/faces/..%2Fmetadata.json", base, event_id))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    assert!(env.paths.metadata(event_id).exists());
}

#[tokio::test]
async fn avatar_routes_require_open_event() {
    let env = setup(one_face());
    let closed = seed_event(&env.pool, false);
    let open = seed_event(&env.pool, true);
    let base = spawn_server(env.state.clone()).await;
    let client = reqwest::Client::new();

    let resp = client
        .post(format!("{}/api/events/{}/faces/face_1.jpg/avatar", base, closed))
        .multipart(file_form("me.png", png_bytes(8, 8)))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 403);

    let resp = client
        .post(format!("{}/api/events/{}/faces/face_1.jpg/avatar", base, open))
        .multipart(file_form("me.png", png_bytes(8, 8)))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["filename"], "face_1.png");

    let resp = client.get(format!("{}/api/events/{}/avatars/face_1.png", base, open)).send().await.unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.headers()["content-type"], "image/png");

    let resp = client
        .post(format!("{}/api/events/{}/faces/face_1.jpg/qq-avatar", base, closed))
        .json(&serde_json::json!({ "qqNumber": "10001" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 403);
}

#[tokio::test]
async fn qq_profile_and_nickname_lookups() {
    let env = setup(one_face());
    let event_id = seed_event(&env.pool, true);
    let base = spawn_server(env.state.clone()).await;
    let client = reqwest::Client::new();

    let body: serde_json::Value = client
        .get(format!("{}/api/events/{}/faces/face_2.jpg/qq-profile", base, event_id))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert!(body["qq_number"].is_null());
    assert_eq!(body["filename"], "face_2.jpg");

    let resp = client
        .post(format!("{}/api/events/{}/faces/face_2.jpg/qq-avatar", base, event_id))
        .json(&serde_json::json!({ "qqNumber": "10001" }))
        .send()
        .await
        .unwrap();
    assert_eq!(resp.status(), 202);

    let sidecar = env.paths.avatar_sidecar(event_id, "face_2");
    assert!(wait_for_condition(|| sidecar.exists(), 100, 20).await);

    let body: serde_json::Value = client
        .get(format!("{}/api/events/{}/faces/face_2.jpg/qq-profile", base, event_id))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["qq_number"], "10001");

    let body: serde_json::Value = client
        .get(format!("{}/api/events/{}/qq-profiles/10001", base, event_id))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["nickname"], "Pony");
    assert_eq!(body["success"], true);

    let resp = client.get(format!("{}/api/events/{}/qq-profiles/20002", base, event_id)).send().await.unwrap();
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["nickname"], "QQ用户20002");
    assert_eq!(body["success"], false);
}

#[tokio::test]
async fn activity_log_is_listed_newest_first() {
    let env = setup(one_face());
    let event_id = seed_event(&env.pool, true);
    env.pipeline.processor().save_original(event_id, &png_bytes(50, 50)).unwrap();
    env.pipeline
        .processor()
        .add_manual_face(event_id, faceswap_backend::pipeline::face::ManualFace { x1: 0, y1: 0, x2: 10, y2: 10, face_id: None })
        .unwrap();
    env.pipeline.processor().delete_face(event_id, "nope.jpg").unwrap();
    let base = spawn_server(env.state.clone()).await;

    let body: serde_json::Value = reqwest::get(format!("{}/api/logs?per_page=500", base))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["per_page"], 20);
    assert_eq!(body["total"], 2);
    assert_eq!(body["logs"][0]["action"], "face deleted");
    assert_eq!(body["logs"][1]["action"], "manual face added");

    let body: serde_json::Value = reqwest::get(format!("{}/api/logs?module=image", base))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(body["total"], 1);
}
