use std::convert::TryFrom;
use std::net::{SocketAddr, UdpSocket};
use std::time::Duration;

use log::{debug, warn};

use dnsparse::{patch_id, DnsPacket};

use crate::cache::{CacheKey, ResponseCache};
use crate::config::Config;
use crate::error::{ForwardError, HandlerError};
use crate::forwarder;

/// Terminal states of one query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    /// A reply datagram went out to the source address.
    Replied,
    /// The query was dropped and the client got nothing. Indistinguishable
    /// from packet loss on their side, so their own retry logic applies.
    Dropped,
}

/// Runs one query through the full pipeline: parse, cache lookup, forward on
/// miss, cache the result, reply.
///
/// An upstream timeout is an expected outcome and maps to `Ok(Dropped)`.
/// Everything else that goes wrong surfaces as a `HandlerError` for the
/// caller to log; no reply is sent in that case and nothing is cached.
pub fn handle_query(
    raw: &[u8],
    source: SocketAddr,
    reply_socket: &UdpSocket,
    cache: &ResponseCache,
    config: &Config,
) -> Result<Outcome, HandlerError> {
    let query = DnsPacket::try_from(raw).map_err(|reason| HandlerError::MalformedQuery {
        size: raw.len(),
        reason,
    })?;

    let key: CacheKey = match (query.qname(), query.qtype()) {
        (Some(name), Some(qtype)) => (name, qtype),
        _ => {
            return Err(HandlerError::MalformedQuery {
                size: raw.len(),
                reason: "empty question section".to_string(),
            })
        }
    };

    if let Some(mut cached) = cache.lookup(&key) {
        debug!("cache hit for {} ({:?})", key.0, key.1);
        // Serve the stored bytes untouched except for the transaction id,
        // which must match this client's query. Stored answer TTLs are
        // replayed as-is.
        patch_id(&mut cached, query.header.id).map_err(|e| HandlerError::MalformedReply {
            size: cached.len(),
            reason: e.to_string(),
        })?;
        reply_socket.send_to(&cached, source)?;
        return Ok(Outcome::Replied);
    }

    debug!("cache miss for {} ({:?}), forwarding", key.0, key.1);
    let reply = match forwarder::forward(raw, config) {
        Ok(bytes) => bytes,
        Err(ForwardError::Timeout { timeout_ms }) => {
            warn!(
                "upstream timeout after {}ms for {} ({:?}), dropping query from {}",
                timeout_ms, key.0, key.1, source
            );
            return Ok(Outcome::Dropped);
        }
        Err(ForwardError::Io(e)) => return Err(HandlerError::Io(e)),
    };

    let parsed = DnsPacket::try_from(&reply[..]).map_err(|reason| HandlerError::MalformedReply {
        size: reply.len(),
        reason,
    })?;

    // Cache for the shortest answer TTL, or the configured default when the
    // reply carries no answers at all.
    let ttl = parsed
        .min_answer_ttl()
        .map(u64::from)
        .unwrap_or(config.default_ttl);
    debug!(
        "caching {} ({:?}) for {}s, rescode {:?}",
        key.0,
        key.1,
        ttl,
        parsed.rescode()
    );
    cache.store(key, reply.clone(), Duration::from_secs(ttl));

    // The upstream saw the client's original bytes, so its reply already
    // carries the client's transaction id; send it through unmodified.
    reply_socket.send_to(&reply, source)?;

    Ok(Outcome::Replied)
}
