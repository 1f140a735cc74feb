use std::io;
use std::net::UdpSocket;

use log::debug;

use crate::config::Config;
use crate::error::ForwardError;

// Upstream replies are not bounded by the classic 512-byte query budget
// (EDNS), so receive into something roomier.
const REPLY_BUFFER_SIZE: usize = 4096;

/// Relays `query` verbatim to the configured upstream resolver and waits for
/// exactly one reply datagram.
///
/// A fresh socket is bound per call and dropped on every exit path; there is
/// no pooling and no retry. Waiting is bounded by `config.upstream_timeout`,
/// and running into it is reported as `ForwardError::Timeout`.
pub fn forward(query: &[u8], config: &Config) -> Result<Vec<u8>, ForwardError> {
    let socket = UdpSocket::bind(("0.0.0.0", 0))?;
    socket.set_read_timeout(Some(config.upstream_timeout))?;

    socket.send_to(query, config.upstream_addr)?;

    let mut buf = vec![0u8; REPLY_BUFFER_SIZE];
    match socket.recv_from(&mut buf) {
        Ok((size, _src)) => {
            debug!("upstream {} replied with {} bytes", config.upstream_addr, size);
            buf.truncate(size);
            Ok(buf)
        }
        Err(e) if e.kind() == io::ErrorKind::WouldBlock || e.kind() == io::ErrorKind::TimedOut => {
            Err(ForwardError::Timeout {
                timeout_ms: config.upstream_timeout.as_millis() as u64,
            })
        }
        Err(e) => Err(ForwardError::Io(e)),
    }
}
