//! HttpApi and WsConnector against an in-process mock of the chat server.

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Multipart, Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;

use lingomatch_core::api::{HttpApi, MatchingApi, CSRF_HEADER};
use lingomatch_core::config::ClientConfig;
use lingomatch_core::error::Error;
use lingomatch_core::models::{
    ChatMode, Gender, MatchingPreferences, ReportRequest, ReportType, StartMatchingResponse,
};
use lingomatch_core::protocol::SignalMessage;
use lingomatch_core::transport::{SignalConnector, TransportEvent, WsConnector};

const TOKEN: &str = "tok123";

#[derive(Default)]
struct Recorded {
    start_bodies: Vec<Value>,
    left: Vec<String>,
    report_fields: Vec<(String, Option<String>, usize)>,
    ws_cookies: Vec<String>,
}

type Shared = Arc<Mutex<Recorded>>;

fn csrf_ok(headers: &HeaderMap) -> bool {
    headers.get(CSRF_HEADER).and_then(|v| v.to_str().ok()) == Some(TOKEN)
}

async fn root() -> impl IntoResponse {
    (
        [(header::SET_COOKIE, format!("csrftoken={}; Path=/", TOKEN))],
        "ok",
    )
}

async fn start(State(state): State<Shared>, headers: HeaderMap, Json(body): Json<Value>) -> Response {
    if !csrf_ok(&headers) {
        return (StatusCode::FORBIDDEN, "CSRF verification failed").into_response();
    }
    state.lock().start_bodies.push(body);
    Json(json!({"status": "queued", "position": 3, "queue_size": 10})).into_response()
}

async fn stop(headers: HeaderMap) -> Response {
    if !csrf_ok(&headers) {
        return StatusCode::FORBIDDEN.into_response();
    }
    (StatusCode::INTERNAL_SERVER_ERROR, "boom").into_response()
}

async fn leave(State(state): State<Shared>, Path(id): Path<String>) -> Response {
    state.lock().left.push(id);
    Json(json!({"message": "Left conversation"})).into_response()
}

async fn connection_request() -> Response {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({"error": "You are already following this user"})),
    )
        .into_response()
}

async fn connection_respond(Json(body): Json<Value>) -> Response {
    let message = if body["accept"] == json!(true) {
        "Connection accepted"
    } else {
        "Connection rejected"
    };
    Json(json!({ "message": message })).into_response()
}

async fn report(State(state): State<Shared>, headers: HeaderMap, mut multipart: Multipart) -> Response {
    if !csrf_ok(&headers) {
        return StatusCode::FORBIDDEN.into_response();
    }
    while let Ok(Some(field)) = multipart.next_field().await {
        let name = field.name().unwrap_or_default().to_string();
        let file_name = field.file_name().map(|s| s.to_string());
        let len = field.bytes().await.map(|b| b.len()).unwrap_or(0);
        state.lock().report_fields.push((name, file_name, len));
    }
    (StatusCode::CREATED, Json(json!({"message": "Report submitted"}))).into_response()
}

async fn matching_ws(State(state): State<Shared>, headers: HeaderMap, ws: WebSocketUpgrade) -> Response {
    if let Some(cookie) = headers.get(header::COOKIE).and_then(|v| v.to_str().ok()) {
        state.lock().ws_cookies.push(cookie.to_string());
    }
    ws.on_upgrade(echo)
}

async fn echo(mut socket: WebSocket) {
    let greeting = json!({"type": "queue_update", "position": 2, "queue_size": 5}).to_string();
    if socket.send(Message::Text(greeting)).await.is_err() {
        return;
    }
    let _ = socket.send(Message::Text("not json".to_string())).await;
    while let Some(Ok(msg)) = socket.recv().await {
        match msg {
            Message::Text(text) => {
                if socket.send(Message::Text(text)).await.is_err() {
                    break;
                }
            }
            Message::Close(_) => break,
            _ => {}
        }
    }
}

async fn spawn_server() -> (ClientConfig, Shared) {
    let state: Shared = Arc::new(Mutex::new(Recorded::default()));
    let app = Router::new()
        .route("/", get(root))
        .route("/api/chat/matching/start/", post(start))
        .route("/api/chat/matching/stop/", post(stop))
        .route("/api/chat/conversations/:id/leave/", post(leave))
        .route("/api/chat/anonymous/connection-request/", post(connection_request))
        .route("/api/chat/anonymous/connection-respond/", post(connection_respond))
        .route("/api/chat/report/", post(report))
        .route("/ws/matching/", get(matching_ws))
        .with_state(state.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    let mut config = ClientConfig::default();
    config.server.host = "127.0.0.1".to_string();
    config.server.port = port;
    config.server.use_tls = false;
    config.server.session_cookie = Some("sess42".to_string());
    (config, state)
}

#[tokio::test]
async fn test_start_matching_fetches_csrf_and_parses_queue() {
    let (config, state) = spawn_server().await;
    let api = HttpApi::new(&config).unwrap();
    assert!(api.csrf_token().is_none());

    let prefs = MatchingPreferences::new(Gender::Male, "br", ChatMode::Video);
    let response = api.start_matching(&prefs).await.unwrap();

    assert_eq!(
        response,
        StartMatchingResponse::Queued {
            position: 3,
            queue_size: 10
        }
    );
    assert_eq!(api.csrf_token().as_deref(), Some(TOKEN));
    assert_eq!(
        state.lock().start_bodies,
        vec![json!({"preferred_gender": "male", "preferred_country": "BR", "chat_mode": "video"})]
    );
}

#[tokio::test]
async fn test_error_statuses() {
    let (config, state) = spawn_server().await;
    let api = HttpApi::new(&config).unwrap();

    match api.send_connection_request("42").await {
        Err(Error::Rejected(reason)) => assert_eq!(reason, "You are already following this user"),
        other => panic!("expected a refusal, got {:?}", other),
    }
    assert!(matches!(api.stop_matching().await, Err(Error::Http(_))));

    api.leave_conversation("42").await.unwrap();
    assert_eq!(state.lock().left, vec!["42".to_string()]);

    let notice = api.respond_connection_request("r1", true).await.unwrap();
    assert_eq!(notice.message, "Connection accepted");
}

#[tokio::test]
async fn test_report_is_multipart_with_png() {
    let (config, state) = spawn_server().await;
    let api = HttpApi::new(&config).unwrap();

    api.submit_report(ReportRequest {
        reported_user: "8".to_string(),
        conversation: "42".to_string(),
        report_type: ReportType::Underage,
        description: "looks under 13".to_string(),
        video_frame: Some(vec![0x89, b'P', b'N', b'G']),
    })
    .await
    .unwrap();

    let fields = state.lock().report_fields.clone();
    let names: Vec<&str> = fields.iter().map(|(n, _, _)| n.as_str()).collect();
    assert_eq!(
        names,
        vec!["reported_user", "conversation", "report_type", "description", "video_frame"]
    );
    assert_eq!(fields[4].1.as_deref(), Some("video_frame.png"));
    assert_eq!(fields[4].2, 4);
}

#[tokio::test]
async fn test_ws_connector_round_trip() {
    let (config, state) = spawn_server().await;
    let connector = WsConnector::new(config.server.session_cookie.as_deref());

    let (transport, mut events) = connector.connect(&config.ws_url("/ws/matching/")).await.unwrap();

    assert_eq!(events.recv().await, Some(TransportEvent::Open));
    // The malformed frame in between is dropped.
    assert_eq!(
        events.recv().await,
        Some(TransportEvent::Message(SignalMessage::QueueUpdate {
            position: 2,
            queue_size: 5
        }))
    );
    assert_eq!(state.lock().ws_cookies, vec!["sessionid=sess42".to_string()]);

    assert!(transport.send(&SignalMessage::Ready {
        peer_id: "abc".to_string()
    }));
    let echoed = tokio::time::timeout(Duration::from_secs(5), events.recv())
        .await
        .unwrap();
    assert_eq!(
        echoed,
        Some(TransportEvent::Message(SignalMessage::Ready {
            peer_id: "abc".to_string()
        }))
    );

    transport.close();
    assert!(!transport.is_connected());
    assert!(!transport.send(&SignalMessage::chat("late")));
}
