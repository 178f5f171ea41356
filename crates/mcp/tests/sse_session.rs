//! End-to-end tests of the SSE transport against an in-process tool host.

use std::convert::Infallible;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::sse::{Event, Sse};
use axum::routing::{get, post};
use axum::{Json, Router};
use mcp::{Connector, Error, Session, SseConnector};
use serde_json::{Map, Value, json};
use tokio::sync::mpsc;
use tokio_stream::wrappers::UnboundedReceiverStream;

type EventSender = mpsc::UnboundedSender<Result<Event, Infallible>>;

#[derive(Clone, Default)]
struct Host {
    stream: Arc<Mutex<Option<EventSender>>>,
    announce_endpoint: bool,
}

async fn open_stream(
    State(host): State<Host>,
) -> Sse<UnboundedReceiverStream<Result<Event, Infallible>>> {
    let (tx, rx) = mpsc::unbounded_channel();
    if host.announce_endpoint {
        tx.send(Ok(Event::default()
            .event("endpoint")
            .data("/messages/?session_id=test")))
            .unwrap();
    }
    *host.stream.lock().unwrap() = Some(tx);
    Sse::new(UnboundedReceiverStream::new(rx))
}

async fn receive_message(State(host): State<Host>, Json(message): Json<Value>) -> StatusCode {
    let Some(id) = message.get("id").cloned() else {
        return StatusCode::ACCEPTED;
    };

    let result = match message["method"].as_str() {
        Some("initialize") => json!({
            "protocolVersion": "2024-11-05",
            "capabilities": {"tools": {"listChanged": false}},
            "serverInfo": {"name": "club-ai-hub", "version": "0.1.0"}
        }),
        Some("tools/list") => json!({"tools": [{
            "name": "search_members",
            "description": "Search members by keyword",
            "inputSchema": {"type": "object", "properties": {"keyword": {"type": "string"}}}
        }]}),
        Some("tools/call") => {
            let keyword = message["params"]["arguments"]["keyword"].clone();
            json!({
                "content": [{"type": "text", "text": format!("found {keyword}")}],
                "structuredContent": [{"id": "1", "name": keyword}]
            })
        }
        _ => return StatusCode::BAD_REQUEST,
    };

    let response = json!({"jsonrpc": "2.0", "id": id, "result": result});
    if let Some(tx) = host.stream.lock().unwrap().as_ref() {
        let _ = tx.send(Ok(Event::default().event("message").data(response.to_string())));
    }
    StatusCode::ACCEPTED
}

async fn spawn_host(announce_endpoint: bool) -> (String, Host) {
    let host = Host {
        announce_endpoint,
        ..Default::default()
    };
    let app = Router::new()
        .route("/sse", get(open_stream))
        .route("/messages/", post(receive_message))
        .with_state(host.clone());

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });

    (format!("http://{addr}/sse"), host)
}

async fn wait_for_stream_close(host: &Host) -> bool {
    for _ in 0..50 {
        let closed = host
            .stream
            .lock()
            .unwrap()
            .as_ref()
            .is_none_or(|tx| tx.is_closed());
        if closed {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    false
}

#[tokio::test]
async fn session_lists_and_calls_tools() {
    let (url, host) = spawn_host(true).await;
    let connector = SseConnector::new(&url);
    assert_eq!(connector.endpoint(), url);

    let session = Session::open(&connector, Duration::from_secs(5))
        .await
        .unwrap();
    assert_eq!(
        session.server_info().unwrap().server_info.name,
        "club-ai-hub"
    );

    let tools = session.list_tools().await.unwrap();
    assert_eq!(tools.len(), 1);
    assert_eq!(tools[0].name, "search_members");

    let mut args = Map::new();
    args.insert("keyword".into(), json!("Alice"));
    let result = session.call_tool("search_members", args).await.unwrap();
    assert_eq!(
        result.structured_content.unwrap(),
        json!([{"id": "1", "name": "Alice"}])
    );

    session.close();
    assert!(wait_for_stream_close(&host).await);
}

#[tokio::test]
async fn concurrent_calls_are_correlated() {
    let (url, _host) = spawn_host(true).await;
    let connector = SseConnector::new(url);
    let session = Session::open(&connector, Duration::from_secs(5))
        .await
        .unwrap();

    let calls = ["Alice", "Bob", "Charlie"].map(|name| {
        let mut args = Map::new();
        args.insert("keyword".into(), json!(name));
        session.call_tool("search_members", args)
    });
    let results = futures::future::join_all(calls).await;

    let names: Vec<_> = results
        .into_iter()
        .map(|r| r.unwrap().structured_content.unwrap()[0]["name"].clone())
        .collect();
    assert_eq!(names, [json!("Alice"), json!("Bob"), json!("Charlie")]);
}

#[tokio::test]
async fn unreachable_host_is_a_connectivity_error() {
    let connector = SseConnector::new("http://127.0.0.1:1/sse");
    let err = Session::open(&connector, Duration::from_secs(5))
        .await
        .err()
        .unwrap();
    assert!(err.is_connectivity(), "{err}");
    assert!(matches!(err, Error::Connect { .. }));
}

#[tokio::test]
async fn silent_host_times_out_and_releases_stream() {
    let (url, host) = spawn_host(false).await;
    let connector = SseConnector::new(url);

    let err = Session::open(&connector, Duration::from_millis(300))
        .await
        .err()
        .unwrap();
    assert!(matches!(err, Error::Timeout(_)));
    assert!(wait_for_stream_close(&host).await);
}

#[tokio::test]
async fn requests_after_stream_end_fail_fast() {
    let (url, host) = spawn_host(true).await;
    let connector = SseConnector::new(url).with_request_timeout(Duration::from_secs(30));
    let session = Session::open(&connector, Duration::from_secs(5))
        .await
        .unwrap();

    // Dropping the sender ends the event stream from the host side.
    host.stream.lock().unwrap().take();
    tokio::time::sleep(Duration::from_millis(300)).await;

    let outcome = tokio::time::timeout(
        Duration::from_secs(2),
        session.call_tool("search_members", Map::new()),
    )
    .await
    .expect("request should not wait for the request timeout");
    assert!(matches!(outcome, Err(Error::Disconnected)), "{outcome:?}");
}
