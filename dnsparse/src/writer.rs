use log::warn;

use crate::types::{DnsHeader, DnsPacket, DnsQuestion, DnsRecord, QueryType};

// Labels are capped at 63 bytes so the top two bits of a length byte stay
// free for compression pointers.
const MAX_LABEL_LEN: usize = 0x3f;
const HEADER_LEN: usize = 12;

// Append-only cursor over a caller-supplied buffer. The buffer's length is
// the packet size budget; running past it is an error, not a grow.
struct PacketBuffer<'a> {
    buf: &'a mut [u8],
    pos: usize,
}

impl<'a> PacketBuffer<'a> {
    fn new(buf: &'a mut [u8]) -> PacketBuffer<'a> {
        PacketBuffer { buf, pos: 0 }
    }

    fn write_u8(&mut self, val: u8) -> anyhow::Result<()> {
        if self.pos >= self.buf.len() {
            anyhow::bail!("packet exceeds the {} byte buffer", self.buf.len())
        }
        self.buf[self.pos] = val;
        self.pos += 1;
        Ok(())
    }

    fn write_u16(&mut self, val: u16) -> anyhow::Result<()> {
        self.write_u8((val >> 8) as u8)?;
        self.write_u8((val & 0xff) as u8)?;

        Ok(())
    }

    fn write_u32(&mut self, val: u32) -> anyhow::Result<()> {
        self.write_u16((val >> 16) as u16)?;
        self.write_u16((val & 0xffff) as u16)?;

        Ok(())
    }

    fn write_name(&mut self, name: &str) -> anyhow::Result<()> {
        for label in name.split('.') {
            if label.len() > MAX_LABEL_LEN {
                anyhow::bail!("label exceeds {} characters: {}", MAX_LABEL_LEN, label)
            }

            self.write_u8(label.len() as u8)?;
            for b in label.as_bytes() {
                self.write_u8(*b)?;
            }
        }

        self.write_u8(0)?;

        Ok(())
    }

    // Backpatch a length field once its value is known.
    fn set_u16(&mut self, pos: usize, val: u16) -> anyhow::Result<()> {
        if pos + 1 >= self.buf.len() {
            anyhow::bail!("backpatch position {} out of bounds", pos)
        }
        self.buf[pos] = (val >> 8) as u8;
        self.buf[pos + 1] = (val & 0xff) as u8;

        Ok(())
    }
}

/// Serializes `packet` into `buf` and returns the number of bytes written.
/// Names are always written in full; no compression pointers are emitted.
pub fn write(buf: &mut [u8], packet: &DnsPacket) -> anyhow::Result<usize> {
    let mut buffer = PacketBuffer::new(buf);

    write_header(&packet.header, &mut buffer)?;

    for question in &packet.questions {
        write_question(question, &mut buffer)?;
    }

    for rec in &packet.answers {
        write_record(rec, &mut buffer)?;
    }
    for rec in &packet.authorities {
        write_record(rec, &mut buffer)?;
    }
    for rec in &packet.resources {
        write_record(rec, &mut buffer)?;
    }

    Ok(buffer.pos)
}

/// Overwrites the transaction id of an already-encoded packet in place.
/// Every byte past the id field is left untouched.
pub fn patch_id(buf: &mut [u8], id: u16) -> anyhow::Result<()> {
    if buf.len() < HEADER_LEN {
        anyhow::bail!("packet shorter than a DNS header ({} bytes)", buf.len())
    }
    buf[0] = (id >> 8) as u8;
    buf[1] = (id & 0xff) as u8;

    Ok(())
}

fn write_header(header: &DnsHeader, buffer: &mut PacketBuffer) -> anyhow::Result<()> {
    buffer.write_u16(header.id)?;
    buffer.write_u16(header.flags())?;
    buffer.write_u16(header.questions)?;
    buffer.write_u16(header.answers)?;
    buffer.write_u16(header.authoritative_entries)?;
    buffer.write_u16(header.resource_entries)?;

    Ok(())
}

fn write_question(question: &DnsQuestion, buffer: &mut PacketBuffer) -> anyhow::Result<()> {
    buffer.write_name(&question.name)?;
    buffer.write_u16(question.qtype.to_num())?;
    buffer.write_u16(1)?;

    Ok(())
}

fn write_record(record: &DnsRecord, buffer: &mut PacketBuffer) -> anyhow::Result<()> {
    match *record {
        DnsRecord::A {
            ref domain,
            ref addr,
            ttl,
        } => {
            buffer.write_name(domain)?;
            buffer.write_u16(QueryType::A.to_num())?;
            buffer.write_u16(1)?;
            buffer.write_u32(ttl)?;
            buffer.write_u16(4)?;

            for octet in &addr.octets() {
                buffer.write_u8(*octet)?;
            }
        }
        DnsRecord::NS {
            ref domain,
            ref host,
            ttl,
        } => {
            buffer.write_name(domain)?;
            buffer.write_u16(QueryType::NS.to_num())?;
            buffer.write_u16(1)?;
            buffer.write_u32(ttl)?;
            write_host_rdata(host, None, buffer)?;
        }
        DnsRecord::CNAME {
            ref domain,
            ref host,
            ttl,
        } => {
            buffer.write_name(domain)?;
            buffer.write_u16(QueryType::CNAME.to_num())?;
            buffer.write_u16(1)?;
            buffer.write_u32(ttl)?;
            write_host_rdata(host, None, buffer)?;
        }
        DnsRecord::MX {
            ref domain,
            priority,
            ref host,
            ttl,
        } => {
            buffer.write_name(domain)?;
            buffer.write_u16(QueryType::MX.to_num())?;
            buffer.write_u16(1)?;
            buffer.write_u32(ttl)?;
            write_host_rdata(host, Some(priority), buffer)?;
        }
        DnsRecord::AAAA {
            ref domain,
            ref addr,
            ttl,
        } => {
            buffer.write_name(domain)?;
            buffer.write_u16(QueryType::AAAA.to_num())?;
            buffer.write_u16(1)?;
            buffer.write_u32(ttl)?;
            buffer.write_u16(16)?;

            for segment in &addr.segments() {
                buffer.write_u16(*segment)?;
            }
        }
        DnsRecord::UNKNOWN { .. } => {
            warn!("skipping unencodable record: {:?}", record);
        }
    }

    Ok(())
}

// Variable-length rdata holding a host name (and for MX, a priority): the
// length field is reserved first and backpatched once the name is written.
fn write_host_rdata(
    host: &str,
    priority: Option<u16>,
    buffer: &mut PacketBuffer,
) -> anyhow::Result<()> {
    let len_pos = buffer.pos;
    buffer.write_u16(0)?;

    if let Some(priority) = priority {
        buffer.write_u16(priority)?;
    }
    buffer.write_name(host)?;

    let rdata_len = buffer.pos - (len_pos + 2);
    buffer.set_u16(len_pos, rdata_len as u16)?;

    Ok(())
}

#[cfg(test)]
mod test {
    use pretty_assertions::assert_eq;
    use std::convert::TryFrom;
    use std::net::Ipv4Addr;

    use crate::types::ResponseCode;

    use super::*;

    #[rustfmt::skip]
    fn example_reply() -> [u8; 56] {
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
            // the answer name is written in full rather than compressed
            0x07, 0x65, 0x78, 0x61, 0x6d, 0x70, 0x6c, 0x65, 0x03, 0x63, 0x6f, 0x6d, 0x00, // example.com
            0x00, 0x01, // record type
            0x00, 0x01, // record class
            0x00, 0x00, 0x00, 0x78, // ttl (120)
            0x00, 0x04, // rdata length
            0x5d, 0xb8, 0xd8, 0x22, // 93.184.216.34
        ]
    }

    fn example_reply_packet() -> DnsPacket {
        let header = DnsHeader::builder()
            .id(6699)
            .response(true)
            .recursion_desired(true)
            .recursion_available(true)
            .rescode(ResponseCode::NOERROR)
            .questions(1)
            .answers(1)
            .build();
        let question = DnsQuestion {
            name: "example.com".to_string(),
            qtype: QueryType::A,
        };
        let record = DnsRecord::A {
            domain: "example.com".to_string(),
            addr: Ipv4Addr::new(93, 184, 216, 34),
            ttl: 120,
        };

        DnsPacket::builder()
            .header(header)
            .questions(vec![question])
            .answers(vec![record])
            .build()
    }

    #[test]
    fn writing_works() {
        let mut buf = vec![0u8; 512];
        let size = write(&mut buf, &example_reply_packet()).unwrap();

        assert_eq!(&example_reply()[..], &buf[..size]);
    }

    #[test]
    fn written_cname_parses_back() {
        let header = DnsHeader::builder().id(9).response(true).answers(1).build();
        let record = DnsRecord::CNAME {
            domain: "www.example.com".to_string(),
            host: "cdn.example.com".to_string(),
            ttl: 60,
        };
        let packet = DnsPacket::builder()
            .header(header)
            .answers(vec![record.clone()])
            .build();

        let mut buf = vec![0u8; 512];
        let size = write(&mut buf, &packet).unwrap();
        let parsed = DnsPacket::try_from(&buf[..size]).unwrap();

        assert_eq!(vec![record], parsed.answers);
    }

    #[test]
    fn oversized_label_is_rejected() {
        let header = DnsHeader::builder().id(1).questions(1).build();
        let question = DnsQuestion {
            name: "a".repeat(64),
            qtype: QueryType::A,
        };
        let packet = DnsPacket::builder()
            .header(header)
            .questions(vec![question])
            .build();

        let mut buf = vec![0u8; 512];

        assert!(write(&mut buf, &packet).is_err());
    }

    #[test]
    fn undersized_buffer_is_rejected() {
        let mut buf = vec![0u8; 8];

        assert!(write(&mut buf, &example_reply_packet()).is_err());
    }

    #[test]
    fn patch_id_rewrites_only_the_id_field() {
        let mut buf = example_reply().to_vec();
        patch_id(&mut buf, 0xbeef).unwrap();

        assert_eq!(&[0xbe, 0xef][..], &buf[..2]);
        assert_eq!(&example_reply()[2..], &buf[2..]);
    }

    #[test]
    fn patch_id_needs_a_full_header() {
        let mut buf = vec![0u8; 4];

        assert!(patch_id(&mut buf, 1).is_err());
    }
}
