// Integration tests for the polling relay
// Each test binds a real server on an ephemeral port and talks to it over WebSocket

use futures::{SinkExt, StreamExt};
use polling_relay::api;
use polling_relay::config::CorsConfig;
use polling_relay::poll::{PollServer, DEFAULT_POLL_TIMEOUT};
use serde_json::{json, Value};
use std::net::SocketAddr;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::time::{timeout, Duration};
use tokio_tungstenite::tungstenite::client::IntoClientRequest;
use tokio_tungstenite::tungstenite::http::HeaderValue;
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

const ALLOWED_ORIGIN: &str = "http://localhost:3000";

fn spawn_server() -> SocketAddr {
    let cors = CorsConfig {
        allowed_origins: vec![ALLOWED_ORIGIN.to_string()],
    };
    let routes = api::routes(PollServer::start(DEFAULT_POLL_TIMEOUT), &cors);
    let (addr, serving) = warp::serve(routes).bind_ephemeral(([127, 0, 0, 1], 0));
    tokio::spawn(serving);
    addr
}

async fn connect(addr: SocketAddr) -> Socket {
    let (socket, _) = connect_async(format!("ws://{}/ws", addr))
        .await
        .expect("Failed to connect");
    socket
}

async fn emit(socket: &mut Socket, event: &str, data: Value) {
    let frame = if data.is_null() {
        json!({ "event": event })
    } else {
        json!({ "event": event, "data": data })
    };
    socket
        .send(Message::Text(frame.to_string()))
        .await
        .expect("Failed to send event");
}

/// Waits for the next event called `name`, skipping others
async fn expect_event(socket: &mut Socket, name: &str) -> Value {
    let wait = async {
        while let Some(message) = socket.next().await {
            if let Ok(Message::Text(text)) = message {
                let value: Value = serde_json::from_str(&text).unwrap();
                if value["event"] == name {
                    return value.get("data").cloned().unwrap_or(Value::Null);
                }
            }
        }
        panic!("Socket closed while waiting for {}", name);
    };

    timeout(Duration::from_secs(3), wait)
        .await
        .unwrap_or_else(|_| panic!("Timeout waiting for {}", name))
}

/// Joins as teacher and waits until the session has registered the role.
/// Kicking an absent name still rebroadcasts the roster, and events from one
/// connection are handled in order, so that broadcast marks the join as done.
async fn join_teacher(addr: SocketAddr) -> Socket {
    let mut socket = connect(addr).await;
    emit(&mut socket, "teacher-join", Value::Null).await;
    emit(&mut socket, "kick-student", json!("no such student")).await;
    expect_event(&mut socket, "student-list").await;
    socket
}

/// Joins a student and waits until the roster broadcast includes them
async fn join_student(addr: SocketAddr, name: &str) -> Socket {
    let mut socket = connect(addr).await;
    emit(&mut socket, "student-join", json!(name)).await;
    loop {
        let roster = expect_event(&mut socket, "student-list").await;
        if roster.as_array().unwrap().contains(&json!(name)) {
            return socket;
        }
    }
}

#[tokio::test]
async fn test_health_endpoint() {
    let addr = spawn_server();

    let resp = reqwest::get(format!("http://{}/", addr)).await.unwrap();
    assert_eq!(resp.status(), 200);
    assert_eq!(resp.text().await.unwrap(), "Polling backend is live");
}

#[tokio::test]
async fn test_poll_round_trip() {
    let addr = spawn_server();

    let mut teacher = join_teacher(addr).await;

    let mut ada = join_student(addr, "Ada").await;
    let mut alan = join_student(addr, "Alan").await;

    assert_eq!(expect_event(&mut teacher, "student-list").await, json!(["Ada"]));
    assert_eq!(
        expect_event(&mut teacher, "student-list").await,
        json!(["Ada", "Alan"])
    );

    let question = json!({"question": "2+2?", "options": ["3", "4"], "timer": 30});
    emit(&mut teacher, "create-question", question.clone()).await;

    assert_eq!(expect_event(&mut teacher, "new-question").await, question);
    assert_eq!(expect_event(&mut ada, "new-question").await, question);
    assert_eq!(expect_event(&mut alan, "new-question").await, question);

    emit(&mut ada, "submit-answer", json!("4")).await;
    assert_eq!(expect_event(&mut teacher, "live-update").await, json!({"Ada": "4"}));

    emit(&mut alan, "submit-answer", json!("3")).await;
    assert_eq!(
        expect_event(&mut teacher, "live-update").await,
        json!({"Ada": "4", "Alan": "3"})
    );
    assert_eq!(
        expect_event(&mut teacher, "show-results").await,
        json!({"Ada": "4", "Alan": "3"})
    );
    assert_eq!(
        expect_event(&mut ada, "show-results").await,
        json!({"Ada": "4", "Alan": "3"})
    );
}

#[tokio::test]
async fn test_poll_times_out() {
    let addr = spawn_server();

    let mut teacher = join_teacher(addr).await;
    let mut ada = join_student(addr, "Ada").await;
    let _alan = join_student(addr, "Alan").await;

    emit(&mut teacher, "create-question", json!({"question": "Q", "timer": 1})).await;
    expect_event(&mut ada, "new-question").await;
    emit(&mut ada, "submit-answer", json!("x")).await;

    assert_eq!(expect_event(&mut teacher, "show-results").await, json!({"Ada": "x"}));
}

#[tokio::test]
async fn test_kick_closes_student_socket() {
    let addr = spawn_server();

    let mut teacher = join_teacher(addr).await;
    let mut ada = join_student(addr, "Ada").await;
    let mut alan = join_student(addr, "Alan").await;

    emit(&mut teacher, "kick-student", json!("Ada")).await;

    assert_eq!(expect_event(&mut ada, "kicked").await, json!("Ada"));
    assert_eq!(expect_event(&mut alan, "student-list").await, json!(["Alan"]));

    let closed = timeout(Duration::from_secs(3), async {
        loop {
            match ada.next().await {
                None | Some(Ok(Message::Close(_))) | Some(Err(_)) => break,
                Some(Ok(_)) => continue,
            }
        }
    })
    .await;
    assert!(closed.is_ok(), "Kicked socket should be closed by the server");
}

/// Client-to-server text frame, masked as RFC 6455 requires
fn masked_text_frame(payload: &str) -> Vec<u8> {
    let payload = payload.as_bytes();
    assert!(payload.len() < 126, "short frames only");

    let mask = [0x12, 0x34, 0x56, 0x78];
    let mut frame = vec![0x81, 0x80 | payload.len() as u8];
    frame.extend_from_slice(&mask);
    frame.extend(payload.iter().enumerate().map(|(i, b)| b ^ mask[i % 4]));
    frame
}

#[tokio::test]
async fn test_kick_drops_client_that_ignores_close() {
    let addr = spawn_server();
    let mut teacher = join_teacher(addr).await;

    // Bare TCP client that upgrades, joins and then never answers anything
    let mut raw = TcpStream::connect(addr).await.unwrap();
    let handshake = format!(
        "GET /ws HTTP/1.1\r\n\
         Host: {}\r\n\
         Upgrade: websocket\r\n\
         Connection: Upgrade\r\n\
         Sec-WebSocket-Key: dGhlIHNhbXBsZSBub25jZQ==\r\n\
         Sec-WebSocket-Version: 13\r\n\r\n",
        addr
    );
    raw.write_all(handshake.as_bytes()).await.unwrap();

    let mut response = Vec::new();
    let mut buf = [0u8; 1024];
    while !response.windows(4).any(|w| w == b"\r\n\r\n") {
        let n = timeout(Duration::from_secs(3), raw.read(&mut buf))
            .await
            .expect("Timeout waiting for upgrade")
            .unwrap();
        assert!(n > 0, "Server closed before upgrading");
        response.extend_from_slice(&buf[..n]);
    }
    assert!(response.starts_with(b"HTTP/1.1 101"));

    let join = json!({"event": "student-join", "data": "Ada"}).to_string();
    raw.write_all(&masked_text_frame(&join)).await.unwrap();

    loop {
        let roster = expect_event(&mut teacher, "student-list").await;
        if roster.as_array().unwrap().contains(&json!("Ada")) {
            break;
        }
    }
    emit(&mut teacher, "kick-student", json!("Ada")).await;
    assert_eq!(expect_event(&mut teacher, "student-list").await, json!([]));

    // Read and discard until the server drops the TCP connection
    let dropped = timeout(Duration::from_secs(3), async {
        loop {
            match raw.read(&mut buf).await {
                Ok(0) | Err(_) => break,
                Ok(_) => continue,
            }
        }
    })
    .await;
    assert!(dropped.is_ok(), "Server should drop a kicked client that ignores the close frame");
}

#[tokio::test]
async fn test_malformed_frame_keeps_connection_open() {
    let addr = spawn_server();

    let mut socket = connect(addr).await;
    socket
        .send(Message::Text("not json".to_string()))
        .await
        .unwrap();
    emit(&mut socket, "student-join", json!("Ada")).await;

    assert_eq!(expect_event(&mut socket, "student-list").await, json!(["Ada"]));
}

#[tokio::test]
async fn test_disallowed_origin_is_rejected() {
    let addr = spawn_server();

    let mut request = format!("ws://{}/ws", addr).into_client_request().unwrap();
    request
        .headers_mut()
        .insert("origin", HeaderValue::from_static("https://elsewhere.example"));
    assert!(connect_async(request).await.is_err());

    let mut request = format!("ws://{}/ws", addr).into_client_request().unwrap();
    request
        .headers_mut()
        .insert("origin", HeaderValue::from_static(ALLOWED_ORIGIN));
    assert!(connect_async(request).await.is_ok());
}
