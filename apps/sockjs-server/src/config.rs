use std::collections::HashSet;
use std::time::Duration;

use crate::transport::Transport;

/// Default URL of the SockJS client library loaded by the iframe page.
pub const DEFAULT_LIBRARY_URL: &str = "//cdn.jsdelivr.net/npm/sockjs-client@1/dist/sockjs.min.js";

/// Server configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Port the HTTP server binds to.
    pub port: u16,
    /// Idle time before a waiting receiver is sent a heartbeat frame.
    pub heartbeat_interval: Duration,
    /// How long a session may sit without a receiver before it is evicted.
    pub disconnect_timeout: Duration,
    /// Bytes written on one streaming response before it is cut off.
    pub max_bytes_streaming: usize,
    /// Client library URL embedded in the iframe page.
    pub library_url: String,
    /// Transports switched off on every service, from a comma separated
    /// list such as `websocket,jsonp`.
    pub disabled_transports: HashSet<Transport>,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Every variable is optional; unset or unparsable values fall back to
    /// the protocol defaults.
    pub fn from_env() -> Self {
        Self {
            port: parsed_var("PORT").unwrap_or(8081),
            heartbeat_interval: Duration::from_millis(
                parsed_var("SOCKJS_HEARTBEAT_MS").unwrap_or(25_000),
            ),
            disconnect_timeout: Duration::from_millis(
                parsed_var("SOCKJS_DISCONNECT_TIMEOUT_MS").unwrap_or(5_000),
            ),
            max_bytes_streaming: parsed_var("SOCKJS_MAX_BYTES_STREAMING").unwrap_or(128 * 1024),
            library_url: std::env::var("SOCKJS_LIBRARY_URL")
                .ok()
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| DEFAULT_LIBRARY_URL.to_string()),
            disabled_transports: std::env::var("SOCKJS_DISABLED_TRANSPORTS")
                .map(|v| parse_transports(&v))
                .unwrap_or_default(),
        }
    }
}

fn parse_transports(list: &str) -> HashSet<Transport> {
    list.split(',')
        .filter(|name| !name.trim().is_empty())
        .filter_map(|name| match name.parse::<Transport>() {
            Ok(transport) => Some(transport),
            Err(e) => {
                tracing::warn!(error = %e, "ignoring SOCKJS_DISABLED_TRANSPORTS entry");
                None
            }
        })
        .collect()
}

fn parsed_var<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|v| v.parse().ok())
}

/// Per-service protocol options.
#[derive(Debug, Clone)]
pub struct ServiceOptions {
    /// Transports whose endpoints are not served. Disabling
    /// [`Transport::WebSocket`] also reports `websocket: false` on `/info`.
    pub disabled_transports: HashSet<Transport>,
    /// Set the `JSESSIONID` cookie on session responses.
    pub cookie_needed: bool,
    pub heartbeat_interval: Duration,
    pub disconnect_timeout: Duration,
    pub max_bytes_streaming: usize,
    pub library_url: String,
}

impl Default for ServiceOptions {
    fn default() -> Self {
        Self {
            disabled_transports: HashSet::new(),
            cookie_needed: false,
            heartbeat_interval: Duration::from_secs(25),
            disconnect_timeout: Duration::from_secs(5),
            max_bytes_streaming: 128 * 1024,
            library_url: DEFAULT_LIBRARY_URL.to_string(),
        }
    }
}

impl ServiceOptions {
    pub fn from_config(config: &Config) -> Self {
        Self {
            heartbeat_interval: config.heartbeat_interval,
            disconnect_timeout: config.disconnect_timeout,
            max_bytes_streaming: config.max_bytes_streaming,
            library_url: config.library_url.clone(),
            disabled_transports: config.disabled_transports.clone(),
            ..Self::default()
        }
    }

    pub fn with_disabled_transport(mut self, transport: Transport) -> Self {
        self.disabled_transports.insert(transport);
        self
    }

    pub fn is_enabled(&self, transport: Transport) -> bool {
        !self.disabled_transports.contains(&transport)
    }

    pub fn with_cookie_needed(mut self, needed: bool) -> Self {
        self.cookie_needed = needed;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transport_list_skips_unknown_names() {
        let disabled = parse_transports("websocket, jsonp,,carrier-pigeon");
        assert_eq!(
            disabled,
            HashSet::from([Transport::WebSocket, Transport::Jsonp])
        );
        assert!(parse_transports("").is_empty());
    }

    #[test]
    fn disabled_transports_are_not_enabled() {
        let options = ServiceOptions::default().with_disabled_transport(Transport::HtmlFile);
        assert!(!options.is_enabled(Transport::HtmlFile));
        assert!(options.is_enabled(Transport::Xhr));
        assert!(options.is_enabled(Transport::WebSocket));
    }
}
