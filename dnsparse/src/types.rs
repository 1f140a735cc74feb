use std::net::{Ipv4Addr, Ipv6Addr};
use typed_builder::TypedBuilder;

// A DNS message (RFC 1035 section 4.1): a fixed 12-byte header followed by
// four variable-length sections. The header's count fields say how many
// entries each section carries.
//
//     +---------------------+
//     |        Header       |
//     +---------------------+
//     |       Question      | what is being asked
//     +---------------------+
//     |        Answer       | RRs answering the question
//     +---------------------+
//     |      Authority      | RRs pointing toward an authority
//     +---------------------+
//     |      Additional     | extra RRs (e.g. glue, EDNS)
//     +---------------------+
#[derive(Clone, Debug, PartialEq, Eq, TypedBuilder)]
pub struct DnsPacket {
    pub header: DnsHeader,

    #[builder(default = vec![])]
    pub questions: Vec<DnsQuestion>,
    #[builder(default = vec![])]
    pub answers: Vec<DnsRecord>,
    #[builder(default = vec![])]
    pub authorities: Vec<DnsRecord>,
    #[builder(default = vec![])]
    pub resources: Vec<DnsRecord>,
}

// Header layout:
//                                  1  1  1  1  1  1
//    0  1  2  3  4  5  6  7  8  9  0  1  2  3  4  5
//  +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
//  |                      ID                       |
//  +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
//  |QR|   Opcode  |AA|TC|RD|RA|   Z    |   RCODE   |
//  +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
//  |                    QDCOUNT                    |
//  +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
//  |                    ANCOUNT                    |
//  +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
//  |                    NSCOUNT                    |
//  +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
//  |                    ARCOUNT                    |
//  +--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+--+
#[derive(Clone, Debug, PartialEq, Eq, TypedBuilder)]
pub struct DnsHeader {
    // Correlates a reply with the query that caused it. UDP is stateless, so
    // a requester only accepts replies carrying the id it sent.
    pub id: u16,

    // QR: 0 for queries, 1 for responses.
    #[builder(default = false)]
    pub response: bool,

    // Kind of query: 0 standard, 1 inverse, 2 server status.
    #[builder(default = 0)]
    pub opcode: u8,
    // AA: the responder is authoritative for the queried name.
    #[builder(default = false)]
    pub authoritative_answer: bool,
    // TC: the message was cut off by the transport size limit.
    #[builder(default = false)]
    pub truncated_message: bool,
    // RD: set in a query, copied into the response.
    #[builder(default = false)]
    pub recursion_desired: bool,

    // RA: the responder supports recursive queries.
    #[builder(default = false)]
    pub recursion_available: bool,
    // Reserved bit, nowadays used by DNSSEC.
    #[builder(default = false)]
    pub z: bool,
    #[builder(default = false)]
    pub authed_data: bool,
    #[builder(default = false)]
    pub checking_disabled: bool,
    #[builder(default = ResponseCode::NOERROR)]
    pub rescode: ResponseCode, // 4 bits on the wire

    // Entry counts for the four sections.
    #[builder(default = 0)]
    pub questions: u16,
    #[builder(default = 0)]
    pub answers: u16,
    #[builder(default = 0)]
    pub authoritative_entries: u16,
    #[builder(default = 0)]
    pub resource_entries: u16,
}

impl DnsHeader {
    pub fn flags(&self) -> u16 {
        (self.rescode as u16)
            | ((self.checking_disabled as u16) << 4)
            | ((self.authed_data as u16) << 5)
            | ((self.z as u16) << 6)
            | ((self.recursion_available as u16) << 7)
            | ((self.recursion_desired as u16) << 8)
            | ((self.truncated_message as u16) << 9)
            | ((self.authoritative_answer as u16) << 10)
            | ((self.opcode as u16) << 11)
            | ((self.response as u16) << 15)
    }
}

// The RCODE field of a response header.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ResponseCode {
    NOERROR = 0,
    // The server could not interpret the query.
    FORMERR = 1,
    // The server failed while processing the query.
    SERVFAIL = 2,
    // The queried name does not exist (authoritative answers only).
    NXDOMAIN = 3,
    NOTIMP = 4,
    REFUSED = 5,
}

impl ResponseCode {
    pub fn from_num(num: u8) -> ResponseCode {
        match num {
            1 => ResponseCode::FORMERR,
            2 => ResponseCode::SERVFAIL,
            3 => ResponseCode::NXDOMAIN,
            4 => ResponseCode::NOTIMP,
            5 => ResponseCode::REFUSED,
            _ => ResponseCode::NOERROR,
        }
    }
}

// One entry of the question section: the name being resolved and the record
// type asked for. The class field is always IN here and is not represented.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DnsQuestion {
    pub name: String,
    pub qtype: QueryType,
}

#[derive(PartialEq, Eq, Debug, Clone, Hash, Copy)]
pub enum QueryType {
    UNKNOWN(u16),
    A,
    CNAME,
    NS,
    MX,
    AAAA,
}

impl QueryType {
    pub fn to_num(self) -> u16 {
        match self {
            QueryType::UNKNOWN(x) => x,
            QueryType::A => 1,
            QueryType::NS => 2,
            QueryType::CNAME => 5,
            QueryType::MX => 15,
            QueryType::AAAA => 28,
        }
    }

    pub fn from_num(num: u16) -> QueryType {
        match num {
            1 => QueryType::A,
            2 => QueryType::NS,
            5 => QueryType::CNAME,
            15 => QueryType::MX,
            28 => QueryType::AAAA,
            _ => QueryType::UNKNOWN(num),
        }
    }
}

// A resource record, as found in the answer, authority and additional
// sections. Every variant carries the record's own TTL in seconds. Types we
// do not decode are kept as UNKNOWN so a packet with exotic records still
// parses.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DnsRecord {
    A {
        domain: String,
        addr: Ipv4Addr,
        ttl: u32,
    },
    NS {
        domain: String,
        host: String,
        ttl: u32,
    },
    CNAME {
        domain: String,
        host: String,
        ttl: u32,
    },
    MX {
        domain: String,
        priority: u16,
        host: String,
        ttl: u32,
    },
    AAAA {
        domain: String,
        addr: Ipv6Addr,
        ttl: u32,
    },
    UNKNOWN {
        domain: String,
        qtype: u16,
        data_len: u16,
        ttl: u32,
    },
}

impl DnsRecord {
    pub fn ttl(&self) -> u32 {
        match *self {
            DnsRecord::A { ttl, .. }
            | DnsRecord::NS { ttl, .. }
            | DnsRecord::CNAME { ttl, .. }
            | DnsRecord::MX { ttl, .. }
            | DnsRecord::AAAA { ttl, .. }
            | DnsRecord::UNKNOWN { ttl, .. } => ttl,
        }
    }
}

impl DnsPacket {
    pub fn first_question(&self) -> Option<&DnsQuestion> {
        self.questions.get(0)
    }

    pub fn qname(&self) -> Option<String> {
        self.first_question().map(|q| q.name.clone())
    }

    pub fn qtype(&self) -> Option<QueryType> {
        self.first_question().map(|q| q.qtype)
    }

    pub fn rescode(&self) -> ResponseCode {
        self.header.rescode
    }

    pub fn has_answers(&self) -> bool {
        !self.answers.is_empty()
    }

    /// Smallest TTL across the answer section, `None` when there are no
    /// answers. This is the longest a response may be served from a cache
    /// before any of its records goes stale.
    pub fn min_answer_ttl(&self) -> Option<u32> {
        self.answers.iter().map(DnsRecord::ttl).min()
    }

    /// First A record of the answer section, if any.
    pub fn first_a_record(&self) -> Option<Ipv4Addr> {
        self.answers.iter().find_map(|r| match r {
            DnsRecord::A { addr, .. } => Some(*addr),
            _ => None,
        })
    }
}
