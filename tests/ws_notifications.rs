//! WebSocket notification feed tests. Connect to /ws/notifications and assert snapshot + push.

use futures_util::StreamExt;
use screening_match_engine::{api, EngineConfig};
use std::net::SocketAddr;
use std::time::Duration;

async fn spawn_app() -> (SocketAddr, tokio::task::JoinHandle<()>) {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let app = api::create_router(EngineConfig::seeded(3));
    let handle = tokio::spawn(async move {
        axum::serve(listener, app.into_make_service()).await.unwrap();
    });
    tokio::time::sleep(Duration::from_millis(50)).await;
    (addr, handle)
}

async fn post(client: &reqwest::Client, addr: SocketAddr, path: &str, body: serde_json::Value) -> reqwest::Response {
    client
        .post(format!("http://{}{}", addr, path))
        .json(&body)
        .send()
        .await
        .unwrap()
}

async fn enqueue_and_fund(client: &reqwest::Client, addr: SocketAddr, patient_id: u64) {
    let r = post(
        client,
        addr,
        "/waitlist",
        serde_json::json!({
            "patient_id": patient_id,
            "screening_type_id": 2,
            "region": "Kano",
            "estimated_cost": "35"
        }),
    )
    .await;
    assert_eq!(r.status(), 200);
    let r = post(
        client,
        addr,
        "/campaigns",
        serde_json::json!({
            "donor_id": 1,
            "title": "Kano outreach",
            "regions": ["kano"],
            "initial_amount": "35"
        }),
    )
    .await;
    assert_eq!(r.status(), 200);
}

async fn next_json<S>(ws: &mut S) -> serde_json::Value
where
    S: StreamExt<Item = Result<tokio_tungstenite::tungstenite::Message, tokio_tungstenite::tungstenite::Error>>
        + Unpin,
{
    let raw = tokio::time::timeout(Duration::from_secs(5), ws.next())
        .await
        .expect("message within timeout")
        .expect("one message")
        .expect("ws recv");
    let text = raw.into_text().expect("text frame");
    serde_json::from_str(&text).expect("json")
}

#[tokio::test]
async fn ws_sends_empty_snapshot_on_connect() {
    let (addr, _handle) = spawn_app().await;
    let url = format!("ws://{}/ws/notifications?patient_id=9", addr);
    let (mut ws, _) = tokio_tungstenite::connect_async(&url).await.expect("connect");
    let snapshot = next_json(&mut ws).await;
    assert_eq!(snapshot["type"], "snapshot");
    assert_eq!(snapshot["patient_id"], 9);
    assert_eq!(snapshot["notifications"], serde_json::json!([]));
}

#[tokio::test]
async fn ws_snapshot_contains_existing_notifications() {
    let (addr, _handle) = spawn_app().await;
    let client = reqwest::Client::new();
    enqueue_and_fund(&client, addr, 4).await;
    let r = post(&client, addr, "/matching/run", serde_json::json!({})).await;
    assert_eq!(r.status(), 200);

    let url = format!("ws://{}/ws/notifications?patient_id=4", addr);
    let (mut ws, _) = tokio_tungstenite::connect_async(&url).await.expect("connect");
    let snapshot = next_json(&mut ws).await;
    assert_eq!(snapshot["type"], "snapshot");
    let notifications = snapshot["notifications"].as_array().unwrap();
    assert_eq!(notifications.len(), 1);
    assert_eq!(notifications[0]["kind"], "MatchFound");
}

#[tokio::test]
async fn ws_pushes_match_found_after_matching_run() {
    let (addr, _handle) = spawn_app().await;
    let client = reqwest::Client::new();
    enqueue_and_fund(&client, addr, 5).await;
    // A second patient whose notifications must not reach this feed.
    let r = post(
        &client,
        addr,
        "/waitlist",
        serde_json::json!({
            "patient_id": 6,
            "screening_type_id": 2,
            "region": "Lagos",
            "estimated_cost": "10"
        }),
    )
    .await;
    assert_eq!(r.status(), 200);
    let r = post(&client, addr, "/pool/donate", serde_json::json!({ "donor_id": 2, "amount": "10" })).await;
    assert_eq!(r.status(), 200);

    let url = format!("ws://{}/ws/notifications?patient_id=5", addr);
    let (mut ws, _) = tokio_tungstenite::connect_async(&url).await.expect("connect");
    let snapshot = next_json(&mut ws).await;
    assert_eq!(snapshot["notifications"], serde_json::json!([]));

    let r = post(&client, addr, "/matching/run", serde_json::json!({})).await;
    assert_eq!(r.status(), 200);
    let summary: serde_json::Value = r.json().await.unwrap();
    assert_eq!(summary["per_type"][0]["matched"], 2);

    let pushed = next_json(&mut ws).await;
    assert_eq!(pushed["type"], "notification");
    assert_eq!(pushed["notification"]["patient_id"], 5);
    assert_eq!(pushed["notification"]["kind"], "MatchFound");
    assert!(pushed["notification"]["allocation_id"].is_u64());
}
