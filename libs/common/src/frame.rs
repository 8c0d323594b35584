//! SockJS frames and their wire text.

use crate::escape::write_json_string;

/// Code and reason carried by a close frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseReason {
    pub code: u16,
    pub reason: String,
}

impl CloseReason {
    pub fn new(code: u16, reason: impl Into<String>) -> Self {
        Self {
            code,
            reason: reason.into(),
        }
    }

    /// `3000 "Go away!"`, the conventional application close.
    pub fn go_away() -> Self {
        Self::new(close_code::GO_AWAY, "Go away!")
    }

    /// Reply given to a receiver that lost the race for a session.
    pub fn another_connection_open() -> Self {
        Self::new(close_code::ANOTHER_CONNECTION_OPEN, "Another connection still open")
    }

    /// Recorded when a receiver vanished without finishing its response.
    pub fn connection_interrupted() -> Self {
        Self::new(close_code::CONNECTION_INTERRUPTED, "Connection interrupted")
    }
}

/// Close codes with protocol meaning.
pub mod close_code {
    pub const NORMAL_CLOSURE: u16 = 1000;
    pub const CONNECTION_INTERRUPTED: u16 = 1002;
    pub const ANOTHER_CONNECTION_OPEN: u16 = 2010;
    pub const GO_AWAY: u16 = 3000;
}

/// One protocol envelope, before transport wrapping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame {
    Open,
    Heartbeat,
    Array(Vec<String>),
    Close(CloseReason),
}

impl Frame {
    pub fn close(code: u16, reason: impl Into<String>) -> Self {
        Frame::Close(CloseReason::new(code, reason))
    }

    /// Render the frame as SockJS wire text (`o`, `h`, `a[...]`, `c[...]`).
    pub fn encode(&self) -> String {
        match self {
            Frame::Open => "o".to_string(),
            Frame::Heartbeat => "h".to_string(),
            Frame::Array(messages) => {
                let mut out = String::with_capacity(
                    3 + messages.iter().map(|m| m.len() + 3).sum::<usize>(),
                );
                out.push_str("a[");
                for (i, message) in messages.iter().enumerate() {
                    if i > 0 {
                        out.push(',');
                    }
                    write_json_string(&mut out, message);
                }
                out.push(']');
                out
            }
            Frame::Close(close) => {
                let mut out = format!("c[{},", close.code);
                write_json_string(&mut out, &close.reason);
                out.push(']');
                out
            }
        }
    }
}
