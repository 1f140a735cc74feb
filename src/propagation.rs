use std::convert::TryFrom;
use std::net::{Ipv4Addr, UdpSocket};
use std::time::{Duration, Instant};

use log::debug;

use dnsparse::{write_packet, DnsHeader, DnsPacket, DnsQuestion, QueryType};

use crate::MAX_PACKET_SIZE;

/// Public resolvers probed by the propagation check, label first.
pub const GLOBAL_SERVERS: [(&str, &str); 20] = [
    ("Google Primary", "8.8.8.8"),
    ("Google Secondary", "8.8.4.4"),
    ("Cloudflare", "1.1.1.1"),
    ("Quad9", "9.9.9.9"),
    ("OpenDNS Primary", "208.67.222.222"),
    ("OpenDNS Secondary", "208.67.220.220"),
    ("Level3 Primary", "4.2.2.1"),
    ("Level3 Secondary", "4.2.2.2"),
    ("AdGuard", "94.140.14.14"),
    ("Comodo", "8.26.56.26"),
    ("ControlD", "76.76.2.0"),
    ("NextDNS", "45.90.28.190"),
    ("CleanBrowsing", "185.228.168.9"),
    ("Yandex", "77.88.8.8"),
    ("Neustar", "156.154.70.1"),
    ("Mullvad", "194.242.2.2"),
    ("Hurricane Electric", "74.82.42.42"),
    ("PuntCAT", "109.69.8.51"),
    ("Verisign Primary", "64.6.64.6"),
    ("Verisign Secondary", "64.6.65.6"),
];

const PROBE_TIMEOUT: Duration = Duration::from_secs(2);

fn build_probe(domain: &str) -> anyhow::Result<Vec<u8>> {
    let header = DnsHeader::builder()
        .id(rand::random())
        .questions(1)
        .recursion_desired(true)
        .build();
    let question = DnsQuestion {
        name: domain.to_string(),
        qtype: QueryType::A,
    };
    let packet = DnsPacket::builder()
        .header(header)
        .questions(vec![question])
        .build();

    let mut buf = vec![0u8; MAX_PACKET_SIZE];
    let size = write_packet(&mut buf, &packet)?;
    buf.truncate(size);

    Ok(buf)
}

// One probe against one resolver: first answered A record plus round-trip
// latency. Any failure (timeout, socket error, unparseable or empty reply)
// bubbles up and the caller renders the resolver as down.
fn probe(domain: &str, resolver: &str) -> anyhow::Result<(Ipv4Addr, Duration)> {
    let socket = UdpSocket::bind(("0.0.0.0", 0))?;
    socket.set_read_timeout(Some(PROBE_TIMEOUT))?;

    let query = build_probe(domain)?;
    let started = Instant::now();
    socket.send_to(&query, (resolver, 53))?;

    let mut buf = vec![0u8; 4096];
    let (size, _src) = socket.recv_from(&mut buf)?;
    let latency = started.elapsed();

    let reply = DnsPacket::try_from(&buf[..size]).map_err(anyhow::Error::msg)?;
    if !reply.has_answers() {
        anyhow::bail!("{:?} reply with no answers", reply.rescode());
    }
    let addr = reply
        .first_a_record()
        .ok_or_else(|| anyhow::anyhow!("no A record in the reply"))?;

    Ok((addr, latency))
}

/// Queries every resolver in `GLOBAL_SERVERS` for `domain`'s A record and
/// prints one fixed-width report row per resolver. Purely informational;
/// shares nothing with the proxy.
pub fn run_propagation_test(domain: &str) {
    println!("\n--- Propagation Test: {} ---", domain);
    println!("{:<20} | {:<15} | {}", "Provider", "Status/IP", "Latency");
    println!("{}", "-".repeat(55));

    for (name, resolver) in GLOBAL_SERVERS.iter() {
        match probe(domain, resolver) {
            Ok((addr, latency)) => {
                let millis = latency.as_secs_f64() * 1000.0;
                println!("{:<20} | {:<15} | {:.2}ms", name, addr.to_string(), millis);
            }
            Err(e) => {
                debug!("{} ({}) probe failed: {}", name, resolver, e);
                println!("{:<20} | {:<15} | N/A", name, "SERVER DOWN");
            }
        }
    }
    println!("{}", "-".repeat(55));
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn probe_query_carries_the_domain_and_a_type() {
        let buf = build_probe("example.com").unwrap();
        let packet = DnsPacket::try_from(&buf[..]).unwrap();

        assert_eq!(Some("example.com".to_string()), packet.qname());
        assert_eq!(Some(QueryType::A), packet.qtype());
        assert!(packet.header.recursion_desired);
    }

    #[test]
    fn resolver_table_holds_twenty_valid_addresses() {
        assert_eq!(20, GLOBAL_SERVERS.len());
        for (_, resolver) in GLOBAL_SERVERS.iter() {
            assert!(resolver.parse::<Ipv4Addr>().is_ok(), "bad ip: {}", resolver);
        }
    }
}
