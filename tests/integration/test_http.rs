//! Integration tests for the HTTP surface and the upgrade handshake.

use futures::SinkExt;
use lesson_relay::{create_router, AppState, ClientEvent, Config, LessonSession};
use serde_json::Value;
use tokio_tungstenite::connect_async;
use tungstenite::Message;

async fn spawn_test_server() -> String {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("Failed to bind");
    let addr = listener.local_addr().expect("Failed to get local addr");

    let router = create_router(AppState::new(Config::default()));
    tokio::spawn(async move {
        axum::serve(listener, router).await.expect("Server failed");
    });

    addr.to_string()
}

async fn get_json(url: &str) -> (reqwest::StatusCode, Value) {
    let response = reqwest::get(url).await.expect("Request failed");
    let status = response.status();
    let body = response.json::<Value>().await.expect("Invalid JSON body");
    (status, body)
}

#[tokio::test]
async fn test_health_reports_connections_and_sessions() {
    let addr = spawn_test_server().await;

    let (status, body) = get_json(&format!("http://{addr}/api/health")).await;
    assert_eq!(status, reqwest::StatusCode::OK);
    assert_eq!(body["status"], "ok");
    assert_eq!(body["connections"], 0);
    assert_eq!(body["liveSessions"], 0);
    assert_eq!(body["rooms"], 0);

    let (mut teacher, _) = connect_async(format!("ws://{addr}/ws?userId=frizzle&role=teacher"))
        .await
        .expect("Failed to connect");
    let start = serde_json::to_string(&ClientEvent::start_lesson("algebra-1", "Linear", 6))
        .expect("Failed to serialize");
    teacher
        .send(Message::Text(start))
        .await
        .expect("Failed to send");

    // The start is processed asynchronously; poll until it shows up
    let mut live = 0;
    for _ in 0..50 {
        let (_, body) = get_json(&format!("http://{addr}/api/health")).await;
        live = body["liveSessions"].as_u64().unwrap_or_default();
        if live == 1 {
            assert_eq!(body["connections"], 1);
            assert_eq!(body["rooms"], 1);
            break;
        }
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
    }
    assert_eq!(live, 1);

    let (status, body) = get_json(&format!("http://{addr}/api/sessions/frizzle")).await;
    assert_eq!(status, reqwest::StatusCode::OK);
    let session: LessonSession = serde_json::from_value(body).expect("Not a session");
    assert_eq!(session.current_step, 1);
    assert_eq!(session.total_steps, 6);
    assert!(session.is_live());
}

#[tokio::test]
async fn test_unknown_session_is_404() {
    let addr = spawn_test_server().await;

    let (status, body) = get_json(&format!("http://{addr}/api/sessions/nobody")).await;

    assert_eq!(status, reqwest::StatusCode::NOT_FOUND);
    assert!(body["error"]
        .as_str()
        .is_some_and(|msg| msg.contains("nobody")));
}

#[tokio::test]
async fn test_upgrade_without_identity_is_refused() {
    let addr = spawn_test_server().await;

    let err = connect_async(format!("ws://{addr}/ws?role=teacher"))
        .await
        .expect_err("Upgrade should be refused");

    match err {
        tungstenite::Error::Http(response) => {
            assert_eq!(response.status(), 401);
        }
        other => panic!("Expected HTTP 401, got: {other:?}"),
    }
}

#[tokio::test]
async fn test_upgrade_with_unknown_role_is_refused() {
    let addr = spawn_test_server().await;

    let result = connect_async(format!("ws://{addr}/ws?userId=frizzle&role=admin")).await;

    assert!(
        matches!(&result, Err(tungstenite::Error::Http(response)) if response.status() == 401),
        "Expected HTTP 401"
    );
}
