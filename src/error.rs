use std::io;
use std::net::SocketAddr;

use thiserror::Error;

/// Startup failures. All of them are fatal: the caller logs the message and
/// exits, there is no retry and no fallback port.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("cannot bind {addr}: permission denied (ports below 1024 need root)")]
    BindPermission { addr: SocketAddr },

    #[error("cannot bind {addr}: {source}")]
    Bind { addr: SocketAddr, source: io::Error },

    #[error("cannot set up the listening socket: {0}")]
    Socket(io::Error),
}

/// Failure of a single upstream exchange.
#[derive(Debug, Error)]
pub enum ForwardError {
    /// No reply arrived inside the wait window. An expected outcome under
    /// packet loss or an unresponsive upstream, not a fault of ours.
    #[error("upstream did not reply within {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("upstream socket error: {0}")]
    Io(#[from] io::Error),
}

/// Failure inside one query's handling. Every variant is contained at the
/// worker boundary: the query is dropped and logged, and nothing propagates
/// to the listener.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("malformed query ({size} bytes): {reason}")]
    MalformedQuery { size: usize, reason: String },

    #[error("malformed upstream reply ({size} bytes): {reason}")]
    MalformedReply { size: usize, reason: String },

    #[error("socket error: {0}")]
    Io(#[from] io::Error),
}
