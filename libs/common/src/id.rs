use ulid::Ulid;

/// Server-generated identifiers: a short kind prefix, an underscore, then a
/// ULID, e.g. `rcv_01J9Z3M4X8Q2N5R7T0V6W1Y3ZB`.
///
/// ```
/// let id = sockjs_common::id::prefixed_ulid(sockjs_common::id::prefix::SOCKET);
/// assert!(id.starts_with("sock_"));
/// ```
pub fn prefixed_ulid(prefix: &str) -> String {
    format!("{prefix}_{}", Ulid::new())
}

pub mod prefix {
    /// Application-facing socket handles.
    pub const SOCKET: &str = "sock";
    /// A single receiving connection (one poll, one stream, one websocket).
    pub const RECEIVER: &str = "rcv";
    /// Sessions opened through the raw websocket endpoint, which carry no
    /// client-chosen id.
    pub const RAW_SESSION: &str = "raw";
}
