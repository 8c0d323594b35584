use std::net::SocketAddr;
use std::path::Path;
use std::sync::Arc;

use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use sockjs_server::config::{Config, ServiceOptions};
use sockjs_server::handler::{CloseHandler, EchoHandler};
use sockjs_server::routes::{self, SockJsService};
use sockjs_server::transport::Transport;

#[tokio::main]
async fn main() {
    // Load .env file (silently skip if missing, env vars may be set externally)
    if dotenvy::dotenv().is_err() {
        let env_path = Path::new(env!("CARGO_MANIFEST_DIR")).join(".env");
        let _ = dotenvy::from_path(env_path);
    }

    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = Config::from_env();
    let port = config.port;
    let base = ServiceOptions::from_config(&config);

    tracing::info!(
        heartbeat_ms = config.heartbeat_interval.as_millis() as u64,
        disconnect_timeout_ms = config.disconnect_timeout.as_millis() as u64,
        max_bytes_streaming = config.max_bytes_streaming,
        disabled_transports = ?config.disabled_transports,
        "sockjs-server configured"
    );

    let services = vec![
        SockJsService::new("/echo", base.clone(), Arc::new(EchoHandler)),
        SockJsService::new("/close", base.clone(), Arc::new(CloseHandler)),
        SockJsService::new(
            "/disabled_websocket_echo",
            base.clone().with_disabled_transport(Transport::WebSocket),
            Arc::new(EchoHandler),
        ),
        SockJsService::new(
            "/cookie_needed_echo",
            base.with_cookie_needed(true),
            Arc::new(EchoHandler),
        ),
    ];
    for service in &services {
        tracing::info!(prefix = service.prefix(), "mounting service");
        service.start_sweeper();
    }

    let app = routes::router(&services).layer(TraceLayer::new_for_http());

    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    tracing::info!(%addr, "sockjs-server listening");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("failed to bind");
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
        .with_graceful_shutdown(shutdown_signal(services))
        .await
        .expect("server error");
}

/// Wait for Ctrl-C, then close every session so open streaming responses
/// end and the server can drain.
async fn shutdown_signal(services: Vec<SockJsService>) {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(%err, "failed to listen for Ctrl-C");
        return;
    }
    tracing::info!("shutting down");
    for service in &services {
        service.registry().shutdown();
    }
}
