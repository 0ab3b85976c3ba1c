// Integration tests for the coderoom server
// These spin the real warp server on an ephemeral port, connect WebSocket
// clients and exercise the join/presence/code-change/run flows end to end.
// Run flows go through a stub executor served from the test itself.

use std::net::SocketAddr;
use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use serde_json::json;
use tokio::net::TcpStream;
use tokio::time::{timeout, Duration};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use warp::Filter;

use coderoom::api::routes;
use coderoom::collab::CollabServer;
use coderoom::executor::{ExecutorClient, ExecutorConfig};

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Serve a fixed executor response from an ephemeral port
async fn spawn_stub_executor(outcome: serde_json::Value) -> SocketAddr {
    let route = warp::path("execute")
        .and(warp::post())
        .map(move || warp::reply::json(&outcome));
    let (addr, server) = warp::serve(route).bind_ephemeral(([127, 0, 0, 1], 0));
    tokio::spawn(server);
    addr
}

/// Spin up a coderoom server against the given executor endpoint
async fn spawn_server(executor_url: String) -> SocketAddr {
    let executor = ExecutorClient::new(ExecutorConfig {
        base_url: executor_url,
        timeout_secs: 2,
    })
    .expect("failed to build executor client");
    let server = Arc::new(CollabServer::new(executor));

    let all_routes = routes::collab_websocket_route(server.clone())
        .or(routes::room_verify_route(server))
        .or(routes::collab_health_check())
        .or(routes::collab_config_endpoint());

    let (addr, server) = warp::serve(all_routes).bind_ephemeral(([127, 0, 0, 1], 0));
    tokio::spawn(server);
    addr
}

async fn spawn_server_without_executor() -> SocketAddr {
    // Nothing listens on port 1; run requests report transport failure
    spawn_server("http://127.0.0.1:1".to_string()).await
}

async fn ws_connect(addr: SocketAddr) -> WsStream {
    let url = format!("ws://{}/collab", addr);
    let (stream, _) = connect_async(&url).await.expect("WebSocket connect failed");
    stream
}

async fn send_json(ws: &mut WsStream, value: serde_json::Value) {
    ws.send(Message::Text(value.to_string()))
        .await
        .expect("failed to send message");
}

async fn recv_json(ws: &mut WsStream) -> serde_json::Value {
    loop {
        let msg = timeout(Duration::from_secs(5), ws.next())
            .await
            .expect("timed out waiting for message")
            .expect("stream ended")
            .expect("websocket error");
        if let Message::Text(text) = msg {
            return serde_json::from_str(&text).expect("invalid JSON from server");
        }
    }
}

async fn join(ws: &mut WsStream, room_id: &str, name: &str) -> serde_json::Value {
    send_json(
        ws,
        json!({"type": "join", "roomId": room_id, "displayName": name}),
    )
    .await;
    let ack = recv_json(ws).await;
    assert_eq!(ack["type"], "roomJoined", "expected join ack, got {}", ack);
    ack
}

#[tokio::test]
async fn test_health_endpoint() {
    let addr = spawn_server_without_executor().await;
    let url = format!("http://{}/collab/health", addr);

    let resp = reqwest::get(&url).await.unwrap();
    assert_eq!(resp.status(), 200, "Health endpoint should return 200 OK");

    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["service"], "Coderoom Server");
}

#[tokio::test]
async fn test_room_verify_endpoint() {
    let addr = spawn_server_without_executor().await;

    // Malformed id: rejected with a message the caller can surface
    let resp = reqwest::get(format!("http://{}/room/verify/x", addr))
        .await
        .unwrap();
    assert_eq!(resp.status(), 400);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert!(body["message"].as_str().unwrap().contains("Invalid room id"));

    // Well-formed but unknown: valid, does not exist yet
    let resp = reqwest::get(format!("http://{}/room/verify/fresh-room", addr))
        .await
        .unwrap();
    assert_eq!(resp.status(), 200);
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["exists"], false);

    // After a join the room exists
    let mut ws = ws_connect(addr).await;
    join(&mut ws, "fresh-room", "Ada").await;

    let resp = reqwest::get(format!("http://{}/room/verify/fresh-room", addr))
        .await
        .unwrap();
    let body: serde_json::Value = resp.json().await.unwrap();
    assert_eq!(body["exists"], true);
}

#[tokio::test]
async fn test_join_roster_convergence() {
    let addr = spawn_server_without_executor().await;

    let mut ws_a = ws_connect(addr).await;
    let ack_a = join(&mut ws_a, "room-conv", "Ada").await;
    let members = ack_a["members"].as_array().unwrap();
    assert_eq!(members.len(), 1);
    assert_eq!(members[0]["name"], "Ada");
    let id_a = ack_a["clientId"].as_str().unwrap().to_string();

    let mut ws_b = ws_connect(addr).await;
    let ack_b = join(&mut ws_b, "room-conv", "Brian").await;

    // New member's snapshot lists both, join order preserved
    let members = ack_b["members"].as_array().unwrap();
    let names: Vec<&str> = members.iter().map(|m| m["name"].as_str().unwrap()).collect();
    assert_eq!(names, ["Ada", "Brian"]);

    // Existing member is told exactly once about the newcomer
    let event = recv_json(&mut ws_a).await;
    assert_eq!(event["type"], "memberJoined");
    assert_eq!(event["member"]["name"], "Brian");
    assert_ne!(event["member"]["id"], id_a);
}

#[tokio::test]
async fn test_member_left_broadcast() {
    let addr = spawn_server_without_executor().await;

    let mut ws_a = ws_connect(addr).await;
    join(&mut ws_a, "room-leave", "Ada").await;

    let mut ws_b = ws_connect(addr).await;
    let ack_b = join(&mut ws_b, "room-leave", "Brian").await;
    let id_b = ack_b["clientId"].as_str().unwrap().to_string();

    let event = recv_json(&mut ws_a).await;
    assert_eq!(event["type"], "memberJoined");

    ws_b.close(None).await.unwrap();

    let event = recv_json(&mut ws_a).await;
    assert_eq!(event["type"], "memberLeft");
    assert_eq!(event["clientId"], id_b.as_str());
}

#[tokio::test]
async fn test_code_change_propagation_and_late_join_snapshot() {
    let addr = spawn_server_without_executor().await;

    let mut ws_a = ws_connect(addr).await;
    join(&mut ws_a, "room-code", "Ada").await;
    let mut ws_b = ws_connect(addr).await;
    join(&mut ws_b, "room-code", "Brian").await;
    recv_json(&mut ws_a).await; // MemberJoined(Brian)

    send_json(
        &mut ws_a,
        json!({"type": "codeChange", "roomId": "room-code", "code": "x=1", "languageTag": "Python"}),
    )
    .await;
    send_json(
        &mut ws_a,
        json!({"type": "codeChange", "roomId": "room-code", "code": "x=2", "languageTag": "Python"}),
    )
    .await;

    // Peer processes both in order and ends at the last write
    let event = recv_json(&mut ws_b).await;
    assert_eq!(event["type"], "codeChange");
    assert_eq!(event["code"], "x=1");
    let event = recv_json(&mut ws_b).await;
    assert_eq!(event["code"], "x=2");
    assert_eq!(event["languageTag"], "Python");

    // A peer that never saw the intermediate update converges through the
    // join snapshot
    let mut ws_c = ws_connect(addr).await;
    let ack_c = join(&mut ws_c, "room-code", "Grace").await;
    assert_eq!(ack_c["document"]["code"], "x=2");
    assert_eq!(ack_c["document"]["languageTag"], "Python");
}

#[tokio::test]
async fn test_run_success_round_trip() {
    let executor_addr = spawn_stub_executor(json!({
        "success": true,
        "output": "Hello World!\n",
        "startedAt": 1000u64,
        "endedAt": 1250u64,
    }))
    .await;
    let addr = spawn_server(format!("http://{}", executor_addr)).await;

    let mut ws = ws_connect(addr).await;
    join(&mut ws, "room-run", "Ada").await;

    send_json(
        &mut ws,
        json!({"type": "run", "code": "print(\"Hello World!\")", "extension": "py", "requestId": 7}),
    )
    .await;

    let result = recv_json(&mut ws).await;
    assert_eq!(result["type"], "runResult");
    assert_eq!(result["requestId"], 7);
    assert_eq!(result["success"], true);
    assert_eq!(result["output"], "Hello World!\n");
    assert_eq!(
        result["endedAt"].as_u64().unwrap() - result["startedAt"].as_u64().unwrap(),
        250
    );
}

#[tokio::test]
async fn test_run_failure_reports_stderr() {
    let executor_addr = spawn_stub_executor(json!({
        "success": false,
        "output": {"stderr": "NameError: name 'y' is not defined"},
    }))
    .await;
    let addr = spawn_server(format!("http://{}", executor_addr)).await;

    let mut ws = ws_connect(addr).await;
    join(&mut ws, "room-fail", "Ada").await;

    send_json(
        &mut ws,
        json!({"type": "run", "code": "print(y)", "extension": "py", "requestId": 1}),
    )
    .await;

    let result = recv_json(&mut ws).await;
    assert_eq!(result["type"], "runResult");
    assert_eq!(result["success"], false);
    assert_eq!(
        result["output"]["stderr"],
        "NameError: name 'y' is not defined"
    );
    assert!(result.get("startedAt").is_none());
    assert!(result.get("endedAt").is_none());
}

#[tokio::test]
async fn test_run_with_unreachable_executor_still_resolves() {
    let addr = spawn_server_without_executor().await;

    let mut ws = ws_connect(addr).await;
    join(&mut ws, "room-dead-exec", "Ada").await;

    send_json(
        &mut ws,
        json!({"type": "run", "code": "x", "extension": "c", "requestId": 2}),
    )
    .await;

    // The requester gets a terminal failed result instead of hanging
    let result = recv_json(&mut ws).await;
    assert_eq!(result["type"], "runResult");
    assert_eq!(result["requestId"], 2);
    assert_eq!(result["success"], false);
    assert!(
        result["output"]["stderr"]
            .as_str()
            .unwrap()
            .contains("Executor")
    );
}

#[tokio::test]
async fn test_run_with_unknown_extension_rejected() {
    // No executor is needed; the server resolves the request itself
    let addr = spawn_server_without_executor().await;

    let mut ws = ws_connect(addr).await;
    join(&mut ws, "room-bad-ext", "Ada").await;

    send_json(
        &mut ws,
        json!({"type": "run", "code": "x", "extension": "cobol", "requestId": 3}),
    )
    .await;

    let result = recv_json(&mut ws).await;
    assert_eq!(result["type"], "runResult");
    assert_eq!(result["requestId"], 3);
    assert_eq!(result["success"], false);
    assert!(
        result["output"]["stderr"]
            .as_str()
            .unwrap()
            .contains("cobol")
    );
}

#[tokio::test]
async fn test_invalid_room_id_join_rejected() {
    let addr = spawn_server_without_executor().await;

    let mut ws = ws_connect(addr).await;
    send_json(
        &mut ws,
        json!({"type": "join", "roomId": "x", "displayName": "Ada"}),
    )
    .await;

    let event = recv_json(&mut ws).await;
    assert_eq!(event["type"], "error");
    assert!(event["message"].as_str().unwrap().contains("Invalid room id"));
}

#[tokio::test]
async fn test_rooms_are_isolated() {
    let addr = spawn_server_without_executor().await;

    let mut ws_a = ws_connect(addr).await;
    join(&mut ws_a, "room-one", "Ada").await;
    let mut ws_b = ws_connect(addr).await;
    join(&mut ws_b, "room-two", "Brian").await;

    send_json(
        &mut ws_a,
        json!({"type": "codeChange", "roomId": "room-one", "code": "x=1", "languageTag": "Python"}),
    )
    .await;

    // Brian is in a different room and must see nothing; give the server a
    // moment, then confirm silence
    let quiet = timeout(Duration::from_millis(300), ws_b.next()).await;
    assert!(quiet.is_err(), "client in another room received traffic");
}
