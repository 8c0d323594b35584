#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum_test::TestServer;

use sockjs_server::config::ServiceOptions;
use sockjs_server::handler::{CloseHandler, EchoHandler};
use sockjs_server::routes::{self, SockJsService};
use sockjs_server::transport::Transport;

/// Streaming responses in tests are cut off after this many bytes.
pub const TEST_MAX_BYTES: usize = 4096;

/// Heartbeat interval of the services built by [`heartbeat_services`].
pub const TEST_HEARTBEAT: Duration = Duration::from_millis(200);

pub fn test_options() -> ServiceOptions {
    ServiceOptions {
        max_bytes_streaming: TEST_MAX_BYTES,
        ..ServiceOptions::default()
    }
}

/// The four services the protocol test suite expects.
pub fn test_services() -> Vec<SockJsService> {
    vec![
        SockJsService::new("/echo", test_options(), Arc::new(EchoHandler)),
        SockJsService::new("/close", test_options(), Arc::new(CloseHandler)),
        SockJsService::new(
            "/disabled_websocket_echo",
            test_options().with_disabled_transport(Transport::WebSocket),
            Arc::new(EchoHandler),
        ),
        SockJsService::new(
            "/cookie_needed_echo",
            test_options().with_cookie_needed(true),
            Arc::new(EchoHandler),
        ),
    ]
}

/// An echo service at `/echo` that sends heartbeats every
/// [`TEST_HEARTBEAT`].
pub fn heartbeat_services() -> Vec<SockJsService> {
    let options = ServiceOptions {
        heartbeat_interval: TEST_HEARTBEAT,
        ..test_options()
    };
    vec![SockJsService::new("/echo", options, Arc::new(EchoHandler))]
}

pub fn test_app() -> Router {
    routes::router(&test_services())
}

/// In-process server for request/response endpoints.
pub fn test_server() -> TestServer {
    TestServer::new(test_app()).expect("test server")
}

/// Start a real TCP server for streaming and websocket tests. The server
/// runs in the background.
pub async fn start_server() -> SocketAddr {
    start_server_with(test_services()).await
}

/// Like [`start_server`], serving `services` instead of the standard four.
pub async fn start_server_with(services: Vec<SockJsService>) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
        .await
        .expect("bind");
    let addr = listener.local_addr().unwrap();
    let app = routes::router(&services);

    tokio::spawn(async move {
        axum::serve(
            listener,
            app.into_make_service_with_connect_info::<SocketAddr>(),
        )
        .await
        .unwrap();
    });

    addr
}

/// A session id no other test uses.
pub fn new_session_id() -> String {
    uuid::Uuid::new_v4().to_string()
}

/// `<prefix>/000/<session>/<transport>`.
pub fn session_path(prefix: &str, session_id: &str, transport: &str) -> String {
    format!("{prefix}/000/{session_id}/{transport}")
}

/// Read chunks into `body` until `done` holds. Returns false if the
/// response ended first.
pub async fn read_until(
    resp: &mut reqwest::Response,
    body: &mut String,
    done: impl Fn(&str) -> bool,
) -> bool {
    while !done(body) {
        let chunk = tokio::time::timeout(Duration::from_secs(5), resp.chunk())
            .await
            .expect("timeout waiting for chunk")
            .expect("chunk read error");
        match chunk {
            Some(bytes) => body.push_str(std::str::from_utf8(&bytes).expect("utf-8 chunk")),
            None => return false,
        }
    }
    true
}

/// Wait for the response body to end, collecting what is left.
pub async fn read_to_end(resp: &mut reqwest::Response, body: &mut String) {
    let ended = !read_until(resp, body, |_| false).await;
    assert!(ended);
}
