use std::net::SocketAddr;
use std::time::Duration;

/// Runtime settings, built once at startup and passed by value into the
/// server, workers and forwarder. Nothing reads configuration from global
/// state.
#[derive(Debug, Clone)]
pub struct Config {
    /// Address the client-facing UDP socket binds to.
    pub bind_addr: SocketAddr,
    /// The single upstream resolver cache misses are forwarded to.
    pub upstream_addr: SocketAddr,
    /// How long one upstream exchange may wait for its reply.
    pub upstream_timeout: Duration,
    /// Cache lifetime in seconds for replies without answer records.
    pub default_ttl: u64,
    /// Number of worker threads draining the listener's queue.
    pub workers: usize,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            bind_addr: ([0, 0, 0, 0], 53).into(),
            upstream_addr: ([8, 8, 8, 8], 53).into(),
            upstream_timeout: Duration::from_secs(3),
            default_ttl: 60,
            workers: 8,
        }
    }
}
