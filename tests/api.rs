//! API endpoint integration tests

use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::{broadcast, mpsc, watch};
use tower::ServiceExt;
use voice_satellite::ControllerState;
use voice_satellite::api::websocket::PeerOutgoing;
use voice_satellite::api::{ApiServer, ApiState, ControlCommand, ControlHandle};

struct TestApi {
    router: axum::Router,
    commands: mpsc::Receiver<ControlCommand>,
    status: watch::Sender<ControllerState>,
    control: ControlHandle,
}

fn test_state() -> (ApiState, mpsc::Receiver<ControlCommand>) {
    let (commands_tx, commands) = mpsc::channel(8);
    let (_, status_rx) = watch::channel(ControllerState::Idle);
    let (events, _) = broadcast::channel(8);

    let state = ApiState {
        name: "kitchen".to_string(),
        commands: commands_tx,
        control: ControlHandle::new(),
        status: status_rx,
        events,
    };
    (state, commands)
}

/// Build a test API router
fn build_test_api() -> TestApi {
    let (commands_tx, commands) = mpsc::channel(8);
    let (status, status_rx) = watch::channel(ControllerState::Idle);
    let (events, _) = broadcast::channel(8);
    let control = ControlHandle::new();

    let state = ApiState {
        name: "kitchen".to_string(),
        commands: commands_tx,
        control: control.clone(),
        status: status_rx,
        events,
    };

    TestApi {
        router: ApiServer::new(state, 0).router(),
        commands,
        status,
        control,
    }
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

fn post_json(uri: &str, body: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

#[tokio::test]
async fn test_health_endpoint() {
    let api = build_test_api();

    let response = api
        .router
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let json = body_json(response).await;
    assert_eq!(json["status"], "ok");
    assert_eq!(json["name"], "kitchen");
    assert_eq!(json["state"], "idle");
    assert_eq!(json["connected"], false);
}

#[tokio::test]
async fn test_health_reflects_state_and_peer() {
    let api = build_test_api();
    let (peer, _peer_rx) = mpsc::channel::<PeerOutgoing>(4);
    assert!(api.control.attach(peer));
    api.status
        .send(ControllerState::StreamingMicrophone)
        .unwrap();

    let response = api
        .router
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    let json = body_json(response).await;
    assert_eq!(json["state"], "streaming_microphone");
    assert_eq!(json["connected"], true);
}

#[tokio::test]
async fn test_assist_start_enqueues_command() {
    let mut api = build_test_api();

    let response = api
        .router
        .oneshot(post_json("/assist/start", r#"{"continuous":true}"#))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::ACCEPTED);
    assert_eq!(
        api.commands.recv().await.unwrap(),
        ControlCommand::Start {
            continuous: true,
            silence_detection: true,
        }
    );
}

#[tokio::test]
async fn test_assist_stop_enqueues_command() {
    let mut api = build_test_api();

    let response = api
        .router
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/assist/stop")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::ACCEPTED);
    assert_eq!(api.commands.recv().await.unwrap(), ControlCommand::Stop);
}

#[tokio::test]
async fn test_assist_start_when_daemon_stopped() {
    let TestApi {
        router, commands, ..
    } = build_test_api();
    drop(commands);

    let response = router
        .oneshot(post_json("/assist/start", "{}"))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::SERVICE_UNAVAILABLE);
}

#[tokio::test]
async fn test_assist_start_rejects_bad_body() {
    let api = build_test_api();

    let response = api
        .router
        .oneshot(post_json("/assist/start", "{not json"))
        .await
        .unwrap();

    assert!(response.status().is_client_error());
}

#[tokio::test]
async fn test_event_stream_requires_websocket_upgrade() {
    let api = build_test_api();

    let response = api
        .router
        .oneshot(Request::builder().uri("/events").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert!(response.status().is_client_error());
}

#[tokio::test]
async fn test_bind_fails_when_port_is_taken() {
    let taken = tokio::net::TcpListener::bind("0.0.0.0:0").await.unwrap();
    let port = taken.local_addr().unwrap().port();
    let (state, _commands) = test_state();

    let result = ApiServer::new(state, port).bind().await;

    assert!(matches!(result, Err(voice_satellite::Error::Control(_))));
}

#[tokio::test]
async fn test_bound_server_answers_health() {
    let (state, _commands) = test_state();
    let bound = ApiServer::new(state, 0).bind().await.unwrap();
    let port = bound.local_addr().unwrap().port();
    let server = bound.spawn();

    let mut stream = tokio::net::TcpStream::connect(("127.0.0.1", port))
        .await
        .unwrap();
    stream
        .write_all(b"GET /health HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n")
        .await
        .unwrap();
    let mut response = String::new();
    stream.read_to_string(&mut response).await.unwrap();

    assert!(response.starts_with("HTTP/1.1 200"), "{response}");
    assert!(response.contains("\"name\":\"kitchen\""));
    server.abort();
}
