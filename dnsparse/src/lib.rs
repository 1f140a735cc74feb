mod parser;
mod types;
mod writer;

pub use types::{DnsHeader, DnsPacket, DnsQuestion, DnsRecord, QueryType, ResponseCode};

pub use parser::packet as dns_packet_parser;
pub use writer::{patch_id, write as write_packet};
