use std::{
    convert::TryFrom,
    net::{Ipv4Addr, Ipv6Addr},
};

use crate::types::{DnsHeader, DnsPacket, DnsQuestion, DnsRecord, QueryType, ResponseCode};
use log::trace;
use nom::{
    bytes::complete::take as take_bytes,
    error::{ErrorKind, ParseError},
    multi::count,
    number::complete::{be_u16, be_u32, be_u8},
    IResult,
};

// Top two bits of a length byte mark a compression pointer (RFC 1035 4.1.4).
const POINTER_MASK: u8 = 0xc0;
// Bound on pointer chases per name, so a crafted loop cannot hang us.
const MAX_JUMPS: usize = 8;

fn parse_failure<'a, E>(input: &'a [u8]) -> nom::Err<E>
where
    E: ParseError<&'a [u8]>,
{
    nom::Err::Error(E::from_error_kind(input, ErrorKind::Verify))
}

fn ipv4<'a, E>(input: &'a [u8]) -> IResult<&'a [u8], Ipv4Addr, E>
where
    E: ParseError<&'a [u8]>,
{
    let (rest, octets) = take_bytes(4usize)(input)?;
    Ok((rest, Ipv4Addr::new(octets[0], octets[1], octets[2], octets[3])))
}

fn ipv6<'a, E>(input: &'a [u8]) -> IResult<&'a [u8], Ipv6Addr, E>
where
    E: ParseError<&'a [u8]>,
{
    let (rest, a) = be_u16(input)?;
    let (rest, b) = be_u16(rest)?;
    let (rest, c) = be_u16(rest)?;
    let (rest, d) = be_u16(rest)?;
    let (rest, e) = be_u16(rest)?;
    let (rest, f) = be_u16(rest)?;
    let (rest, g) = be_u16(rest)?;
    let (rest, h) = be_u16(rest)?;

    Ok((rest, Ipv6Addr::new(a, b, c, d, e, f, g, h)))
}

// Decodes a possibly-compressed domain name. `original` is the whole packet,
// needed because pointers are absolute offsets from its start. The caller's
// cursor resumes right after the name as it appears in `input`; pointer
// targets are chased without advancing it.
fn domain_name<'a, E>(original: &'a [u8]) -> impl FnMut(&'a [u8]) -> IResult<&'a [u8], String, E>
where
    E: ParseError<&'a [u8]>,
{
    move |input| {
        let mut labels: Vec<String> = Vec::new();
        let mut cursor = input;
        let mut resume = None;
        let mut jumps = 0;

        loop {
            let (after_len, len) = be_u8(cursor)?;

            if len == 0 {
                let rest = resume.unwrap_or(after_len);
                return Ok((rest, labels.join(".")));
            }

            if len & POINTER_MASK == POINTER_MASK {
                let (after_ptr, low) = be_u8(after_len)?;
                if resume.is_none() {
                    resume = Some(after_ptr);
                }
                jumps += 1;
                if jumps > MAX_JUMPS {
                    return Err(parse_failure(input));
                }
                let offset = usize::from(len & !POINTER_MASK) << 8 | usize::from(low);
                trace!("name pointer to offset {:#x}", offset);
                cursor = match original.get(offset..) {
                    Some(target) => target,
                    None => return Err(parse_failure(input)),
                };
            } else {
                let (after_label, label) = take_bytes(usize::from(len))(after_len)?;
                labels.push(String::from_utf8_lossy(label).into_owned());
                cursor = after_label;
            }
        }
    }
}

fn header<'a, E>(input: &'a [u8]) -> IResult<&'a [u8], DnsHeader, E>
where
    E: ParseError<&'a [u8]>,
{
    // network order is big endian
    let (rest, id) = be_u16(input)?;
    let (rest, flags_hi) = be_u8(rest)?;
    let (rest, flags_lo) = be_u8(rest)?;

    let (rest, questions) = be_u16(rest)?;
    let (rest, answers) = be_u16(rest)?;
    let (rest, authoritative_entries) = be_u16(rest)?;
    let (rest, resource_entries) = be_u16(rest)?;

    let dns_header = DnsHeader {
        id,

        response: flags_hi & (1 << 7) > 0,
        opcode: (flags_hi >> 3) & 0x0f,
        authoritative_answer: flags_hi & (1 << 2) > 0,
        truncated_message: flags_hi & (1 << 1) > 0,
        recursion_desired: flags_hi & 1 > 0,

        recursion_available: flags_lo & (1 << 7) > 0,
        z: flags_lo & (1 << 6) > 0,
        authed_data: flags_lo & (1 << 5) > 0,
        checking_disabled: flags_lo & (1 << 4) > 0,
        rescode: ResponseCode::from_num(flags_lo & 0x0f),

        questions,
        answers,
        authoritative_entries,
        resource_entries,
    };

    Ok((rest, dns_header))
}

fn question<'a, E>(original: &'a [u8]) -> impl FnMut(&'a [u8]) -> IResult<&'a [u8], DnsQuestion, E>
where
    E: ParseError<&'a [u8]>,
{
    move |input| {
        let (rest, name) = domain_name(original)(input)?;
        let (rest, qtype) = be_u16(rest)?;
        let (rest, _qclass) = be_u16(rest)?;

        let question = DnsQuestion {
            name,
            qtype: QueryType::from_num(qtype),
        };

        Ok((rest, question))
    }
}

fn record<'a, E>(original: &'a [u8]) -> impl FnMut(&'a [u8]) -> IResult<&'a [u8], DnsRecord, E>
where
    E: ParseError<&'a [u8]>,
{
    move |input| {
        let (rest, domain) = domain_name(original)(input)?;
        let (rest, type_num) = be_u16(rest)?;
        let (rest, _class) = be_u16(rest)?;
        let (rest, ttl) = be_u32(rest)?;
        let (rest, data_len) = be_u16(rest)?;
        let (rest, rdata) = take_bytes(usize::from(data_len))(rest)?;

        let record = match QueryType::from_num(type_num) {
            QueryType::A => {
                let (_rest, addr) = ipv4(rdata)?;
                DnsRecord::A { domain, addr, ttl }
            }
            QueryType::NS => {
                let (_rest, host) = domain_name(original)(rdata)?;
                DnsRecord::NS { domain, host, ttl }
            }
            QueryType::CNAME => {
                let (_rest, host) = domain_name(original)(rdata)?;
                DnsRecord::CNAME { domain, host, ttl }
            }
            QueryType::MX => {
                let (mx_rest, priority) = be_u16(rdata)?;
                let (_rest, host) = domain_name(original)(mx_rest)?;
                DnsRecord::MX {
                    domain,
                    priority,
                    host,
                    ttl,
                }
            }
            QueryType::AAAA => {
                let (_rest, addr) = ipv6(rdata)?;
                DnsRecord::AAAA { domain, addr, ttl }
            }
            QueryType::UNKNOWN(qtype) => DnsRecord::UNKNOWN {
                domain,
                qtype,
                data_len,
                ttl,
            },
        };

        Ok((rest, record))
    }
}

pub fn packet<'a>(input: &'a [u8], original: &'a [u8]) -> IResult<&'a [u8], DnsPacket> {
    let (rest, header) = header(input)?;
    let (rest, questions) = count(question(original), header.questions as usize)(rest)?;
    let (rest, answers) = count(record(original), header.answers as usize)(rest)?;
    let (rest, authorities) = count(record(original), header.authoritative_entries as usize)(rest)?;
    let (rest, resources) = count(record(original), header.resource_entries as usize)(rest)?;

    let dns_packet = DnsPacket {
        header,
        questions,
        answers,
        authorities,
        resources,
    };

    Ok((rest, dns_packet))
}

impl<'a> TryFrom<&'a [u8]> for DnsPacket {
    type Error = String;

    fn try_from(value: &'a [u8]) -> Result<Self, Self::Error> {
        match packet(value, value) {
            Ok(([], parsed)) => Ok(parsed),
            Ok((trailing, _)) => Err(format!(
                "{} trailing bytes after the last counted record",
                trailing.len()
            )),
            Err(e) => Err(format!("malformed packet: {:?}", e)),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use pretty_assertions::assert_eq;

    fn domain(input: &[u8]) -> IResult<&[u8], String> {
        super::domain_name(input)(input)
    }

    fn header(input: &[u8]) -> IResult<&[u8], DnsHeader> {
        super::header(input)
    }

    #[rustfmt::skip]
    fn example_query() -> [u8; 29] {
        [
            0x1a, 0x2b, // identifier
            0x01, 0x00, // flags (RD)
            0x00, 0x01, // question count
            0x00, 0x00, // answer count
            0x00, 0x00, // authority count
            0x00, 0x00, // additional count
            0x07, 0x65, 0x78, 0x61, 0x6d, 0x70, 0x6c, 0x65, 0x03, 0x63, 0x6f, 0x6d, 0x00, // example.com
            0x00, 0x01, // query type
            0x00, 0x01, // query class
        ]
    }

    #[rustfmt::skip]
    fn example_answer() -> [u8; 45] {
        [
            0x1a, 0x2b, // identifier
            0x81, 0x80, // flags (QR, RD, RA)
            0x00, 0x01, // question count
            0x00, 0x01, // answer count
            0x00, 0x00, // authority count
            0x00, 0x00, // additional count
            0x07, 0x65, 0x78, 0x61, 0x6d, 0x70, 0x6c, 0x65, 0x03, 0x63, 0x6f, 0x6d, 0x00, // example.com
            0x00, 0x01, // query type
            0x00, 0x01, // query class
            0xc0, 0x0c, // name (pointer to offset 12)
            0x00, 0x01, // record type
            0x00, 0x01, // record class
            0x00, 0x00, 0x00, 0x78, // ttl (120)
            0x00, 0x04, // rdata length
            0x5d, 0xb8, 0xd8, 0x22, // 93.184.216.34
        ]
    }

    // www.example.com resolving through a CNAME whose rdata itself ends in a
    // pointer, and a second answer whose name points into that rdata.
    #[rustfmt::skip]
    fn chained_cname_answer() -> [u8; 67] {
        [
            0x03, 0x32, // identifier
            0x81, 0x80, // flags (QR, RD, RA)
            0x00, 0x01, // question count
            0x00, 0x02, // answer count
            0x00, 0x00, // authority count
            0x00, 0x00, // additional count
            0x03, 0x77, 0x77, 0x77, // www
            0x07, 0x65, 0x78, 0x61, 0x6d, 0x70, 0x6c, 0x65, // example
            0x03, 0x63, 0x6f, 0x6d, 0x00, // com
            0x00, 0x01, // query type
            0x00, 0x01, // query class
            // answer 1: CNAME www.example.com -> cdn.example.com
            0xc0, 0x0c, // name (pointer to offset 12)
            0x00, 0x05, // record type
            0x00, 0x01, // record class
            0x00, 0x00, 0x00, 0x3c, // ttl (60)
            0x00, 0x06, // rdata length
            0x03, 0x63, 0x64, 0x6e, 0xc0, 0x10, // cdn + pointer to example.com
            // answer 2: A cdn.example.com
            0xc0, 0x2d, // name (pointer into answer 1 rdata)
            0x00, 0x01, // record type
            0x00, 0x01, // record class
            0x00, 0x00, 0x00, 0x78, // ttl (120)
            0x00, 0x04, // rdata length
            0x5d, 0xb8, 0xd8, 0x22, // 93.184.216.34
        ]
    }

    fn example_query_header() -> DnsHeader {
        DnsHeader {
            id: 6699,

            response: false,
            opcode: 0,
            authoritative_answer: false,
            truncated_message: false,
            recursion_desired: true,

            recursion_available: false,
            z: false,
            authed_data: false,
            checking_disabled: false,
            rescode: ResponseCode::NOERROR,

            questions: 1,
            answers: 0,
            authoritative_entries: 0,
            resource_entries: 0,
        }
    }

    #[test]
    fn header_parsing_works() {
        let buf = example_query();
        let (_, result) = header(&buf[..12]).unwrap();

        assert_eq!(example_query_header(), result);
    }

    #[test]
    fn domain_name_parsing_works() {
        let buf = example_query();
        let (rest, result) = domain(&buf[12..]).unwrap();

        assert_eq!("example.com", result);
        assert_eq!(4, rest.len());
    }

    #[test]
    fn query_parses_completely() {
        let buf = example_query();
        let packet = DnsPacket::try_from(&buf[..]).unwrap();

        assert_eq!(example_query_header(), packet.header);
        assert_eq!(
            vec![DnsQuestion {
                name: "example.com".to_string(),
                qtype: QueryType::A,
            }],
            packet.questions
        );
        assert!(packet.answers.is_empty());
    }

    #[test]
    fn compressed_answer_parses() {
        let buf = example_answer();
        let packet = DnsPacket::try_from(&buf[..]).unwrap();

        assert_eq!(6699, packet.header.id);
        assert!(packet.header.response);
        assert_eq!(
            vec![DnsRecord::A {
                domain: "example.com".to_string(),
                addr: Ipv4Addr::new(93, 184, 216, 34),
                ttl: 120,
            }],
            packet.answers
        );
    }

    #[test]
    fn chained_pointers_resolve() {
        let buf = chained_cname_answer();
        let packet = DnsPacket::try_from(&buf[..]).unwrap();

        assert_eq!(
            vec![
                DnsRecord::CNAME {
                    domain: "www.example.com".to_string(),
                    host: "cdn.example.com".to_string(),
                    ttl: 60,
                },
                DnsRecord::A {
                    domain: "cdn.example.com".to_string(),
                    addr: Ipv4Addr::new(93, 184, 216, 34),
                    ttl: 120,
                },
            ],
            packet.answers
        );
    }

    #[test]
    fn truncated_packet_is_an_error() {
        let buf = example_query();
        let result = DnsPacket::try_from(&buf[..20]);

        assert!(result.is_err());
    }

    #[test]
    fn trailing_bytes_are_an_error() {
        let mut buf = example_query().to_vec();
        buf.push(0x00);
        let result = DnsPacket::try_from(&buf[..]);

        assert!(result.is_err());
    }

    #[test]
    fn pointer_loop_is_an_error() {
        #[rustfmt::skip]
        let buf: [u8; 18] = [
            0x00, 0x01, // identifier
            0x00, 0x00, // flags
            0x00, 0x01, // question count
            0x00, 0x00, // answer count
            0x00, 0x00, // authority count
            0x00, 0x00, // additional count
            0xc0, 0x0c, // name pointing at itself
            0x00, 0x01, // query type
            0x00, 0x01, // query class
        ];
        let result = DnsPacket::try_from(&buf[..]);

        assert!(result.is_err());
    }
}
