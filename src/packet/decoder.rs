//! DNS response decoder.

use std::{fmt, mem::size_of, net::Ipv4Addr};

use bytemuck::AnyBitPattern;

use crate::{
    hex::Hex,
    num::{U16, U32},
};

use super::{
    name::{DomainName, Label},
    Class, Error, Header, Question, Type,
};

/// Cursor over a DNS message.
///
/// The reader always keeps the whole message around, not just the unread part, because compressed
/// domain names refer back to earlier data by absolute offset.
#[derive(Debug, Clone)]
pub(crate) struct Reader<'a> {
    /// The buffer containing the whole DNS message.
    full_buf: &'a [u8],
    /// The current reader position in the buffer.
    pos: usize,
}

impl<'a> Reader<'a> {
    pub(crate) fn new(buf: &'a [u8]) -> Self {
        Self::at(buf, 0)
    }

    /// Creates a reader over the message `buf` that starts reading at byte `pos`.
    pub(crate) fn at(buf: &'a [u8], pos: usize) -> Self {
        Self { full_buf: buf, pos }
    }

    pub(crate) fn pos(&self) -> usize {
        self.pos
    }

    /// Returns the unread part of the message.
    pub(crate) fn buf(&self) -> &'a [u8] {
        self.full_buf.get(self.pos..).unwrap_or_default()
    }

    pub(crate) fn read_obj<T: AnyBitPattern>(&mut self) -> Result<T, Error> {
        let bytes = self.buf().get(..size_of::<T>()).ok_or(Error::Eof)?;
        self.pos += size_of::<T>();
        Ok(bytemuck::pod_read_unaligned(bytes))
    }

    fn peek_u8(&self) -> Result<u8, Error> {
        self.full_buf.get(self.pos).copied().ok_or(Error::Eof)
    }

    pub(crate) fn read_slice(&mut self, len: usize) -> Result<&'a [u8], Error> {
        let end = self.pos.checked_add(len).ok_or(Error::Eof)?;
        match self.full_buf.get(self.pos..end) {
            Some(slice) => {
                self.pos = end;
                Ok(slice)
            }
            None => Err(Error::Eof),
        }
    }

    pub(crate) fn read_u16(&mut self) -> Result<u16, Error> {
        Ok(self.read_obj::<U16>()?.get())
    }

    pub(crate) fn read_u32(&mut self) -> Result<u32, Error> {
        Ok(self.read_obj::<U32>()?.get())
    }

    /// Reads a `<domain-name>` value, following compression pointers.
    ///
    /// The reader is advanced past the name as it appears at the current position: if the name
    /// ends in a pointer, that is up to and including the 2 pointer bytes, no matter how long the
    /// name they point to is.
    pub(crate) fn read_domain_name(&mut self) -> Result<DomainName, Error> {
        let mut domain_name = DomainName::ROOT;
        // Position after the first pointer we followed.
        let mut end = None;
        let mut min_pos = self.pos;
        let mut copy = self.clone();
        loop {
            let length = copy.peek_u8()?;
            match length & 0b1100_0000 {
                0b1100_0000 => {
                    // 16-bit pointer to somewhere else in the message.
                    let ptr = usize::from(copy.read_u16()? & 0b0011_1111_1111_1111);
                    if ptr >= min_pos {
                        // Pointers must point strictly backwards, to an earlier part of the
                        // message than anything read for this name so far. This rules out loops.
                        return Err(Error::PointerLoop);
                    }
                    end.get_or_insert(copy.pos);
                    min_pos = ptr;
                    copy.pos = ptr;
                }
                0b0000_0000 => {
                    copy.pos += 1;

                    // Length byte followed by a label of that many bytes.
                    let length = usize::from(length);
                    if length == 0 {
                        break;
                    }
                    let label = copy.read_slice(length)?;
                    domain_name.push_label(Label::try_new(label)?);
                }
                _ => return Err(Error::InvalidValue), // anything but 00 and 11 in MSb is reserved
            }
        }

        self.pos = end.unwrap_or(copy.pos);
        Ok(domain_name)
    }

    fn read_question(&mut self) -> Result<Question, Error> {
        let name = self.read_domain_name()?;
        let ty = Type(self.read_u16()?);
        let class = Class(self.read_u16()?);
        Ok(Question::new(name).ty(ty).class(class))
    }

    fn read_resource_record(&mut self) -> Result<ResourceRecord, Error> {
        let name = self.read_domain_name()?;
        let ty = Type(self.read_u16()?);
        let class = Class(self.read_u16()?);
        let ttl = self.read_u32()?;
        let rdlength = self.read_u16()?;
        let rdata = self.read_slice(usize::from(rdlength))?;
        Ok(ResourceRecord {
            name,
            ty,
            class,
            ttl,
            rdata: rdata.into(),
        })
    }
}

/// Decodes the domain name starting at byte `offset` of the DNS message `msg`.
///
/// `msg` must be the entire message, since compression pointers in the name refer to absolute
/// offsets within it. Returns the name and the number of bytes it occupies at `offset`. For a name
/// that ends in a compression pointer, that count stops after the 2 pointer bytes.
pub fn decode_name(msg: &[u8], offset: usize) -> Result<(DomainName, usize), Error> {
    let mut r = Reader::at(msg, offset);
    let name = r.read_domain_name()?;
    Ok((name, r.pos() - offset))
}

impl Question {
    /// Decodes a question starting at byte `offset` of the DNS message `msg`.
    ///
    /// Returns the question and the number of bytes it occupies.
    pub fn decode(msg: &[u8], offset: usize) -> Result<(Self, usize), Error> {
        let mut r = Reader::at(msg, offset);
        let question = r.read_question()?;
        Ok((question, r.pos() - offset))
    }
}

/// A Resource Record from the *Answer*, *Authority*, or *Additional Records* section.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceRecord {
    name: DomainName,
    ty: Type,
    class: Class,
    ttl: u32,
    rdata: Box<[u8]>,
}

impl ResourceRecord {
    /// Decodes a resource record starting at byte `offset` of the DNS message `msg`.
    ///
    /// Returns the record and the number of bytes it occupies. The record data is not interpreted.
    pub fn decode(msg: &[u8], offset: usize) -> Result<(Self, usize), Error> {
        let mut r = Reader::at(msg, offset);
        let rr = r.read_resource_record()?;
        Ok((rr, r.pos() - offset))
    }

    #[inline]
    pub fn name(&self) -> &DomainName {
        &self.name
    }

    #[inline]
    pub fn ty(&self) -> Type {
        self.ty
    }

    #[inline]
    pub fn class(&self) -> Class {
        self.class
    }

    /// Returns the entry's Time To Live, in seconds.
    #[inline]
    pub fn ttl(&self) -> u32 {
        self.ttl
    }

    /// Returns the raw record data.
    #[inline]
    pub fn rdata(&self) -> &[u8] {
        &self.rdata
    }

    /// If this is an internet-class `A` record, returns the IPv4 address it contains.
    ///
    /// Returns `None` for any other kind of record, and for `A` records whose data is not exactly
    /// 4 bytes long.
    pub fn ipv4_addr(&self) -> Option<Ipv4Addr> {
        if self.ty != Type::A || self.class != Class::IN {
            return None;
        }
        let octets = <[u8; 4]>::try_from(&*self.rdata).ok()?;
        Some(Ipv4Addr::from(octets))
    }
}

impl fmt::Display for ResourceRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {} {} ", self.name, self.ttl, self.class, self.ty)?;
        match self.ipv4_addr() {
            Some(addr) => write!(f, "{}", addr),
            None => write!(f, "\\# {} {}", self.rdata.len(), Hex(&self.rdata)),
        }
    }
}

/// A fully decoded DNS message.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    header: Header,
    questions: Vec<Question>,
    answers: Vec<ResourceRecord>,
    authorities: Vec<ResourceRecord>,
    additionals: Vec<ResourceRecord>,
}

impl Packet {
    /// Decodes the DNS message in `msg`.
    ///
    /// The header's section counts determine how many entries are decoded from each section. If
    /// the message is truncated, or the entries don't add up to exactly the length of `msg`, the
    /// whole message is rejected.
    pub fn decode(msg: &[u8]) -> Result<Self, Error> {
        let mut r = Reader::new(msg);
        let header = r.read_obj::<Header>()?;
        log::trace!("header: {:?}", header);

        let questions = (0..header.question_count())
            .map(|_| r.read_question())
            .collect::<Result<Vec<_>, _>>()?;
        let mut read_rrs = |count: u16| {
            (0..count)
                .map(|_| r.read_resource_record())
                .collect::<Result<Vec<_>, _>>()
        };
        let answers = read_rrs(header.answer_count())?;
        let authorities = read_rrs(header.authority_count())?;
        let additionals = read_rrs(header.additional_count())?;

        if r.pos() != msg.len() {
            log::debug!(
                "{} bytes left after decoding all sections: {}",
                msg.len() - r.pos(),
                Hex(r.buf()),
            );
            return Err(Error::TrailingData);
        }

        Ok(Self {
            header,
            questions,
            answers,
            authorities,
            additionals,
        })
    }

    #[inline]
    pub fn header(&self) -> &Header {
        &self.header
    }

    /// Returns the entries of the *Question* section.
    #[inline]
    pub fn questions(&self) -> &[Question] {
        &self.questions
    }

    /// Returns the records of the *Answer* section.
    #[inline]
    pub fn answers(&self) -> &[ResourceRecord] {
        &self.answers
    }

    /// Returns the records of the *Authority* section.
    #[inline]
    pub fn authorities(&self) -> &[ResourceRecord] {
        &self.authorities
    }

    /// Returns the records of the *Additional Records* section.
    #[inline]
    pub fn additionals(&self) -> &[ResourceRecord] {
        &self.additionals
    }

    /// Returns the IPv4 addresses of all `A` records in the *Answer* section, in message order.
    pub fn ipv4_answers(&self) -> impl Iterator<Item = Ipv4Addr> + '_ {
        self.answers.iter().filter_map(ResourceRecord::ipv4_addr)
    }
}

impl fmt::Display for Packet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            ";; id: {}, flags: {:#06x}, rcode: {}",
            self.header.id(),
            self.header.flags(),
            self.header.rcode(),
        )?;
        writeln!(f, ";; QUESTION ({})", self.questions.len())?;
        for q in &self.questions {
            writeln!(f, "{}", q)?;
        }
        let sections = [
            ("ANSWER", &self.answers),
            ("AUTHORITY", &self.authorities),
            ("ADDITIONAL", &self.additionals),
        ];
        for (title, rrs) in sections {
            writeln!(f, ";; {} ({})", title, rrs.len())?;
            for rr in rrs {
                writeln!(f, "{}", rr)?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use expect_test::expect;

    use crate::hex;

    use super::*;

    /// Real response for `www.example.com`.
    const EXAMPLE_COM: &[u8] = &[
        218, 140, 129, 128, 0, 1, 0, 1, 0, 0, 0, 0, 3, 119, 119, 119, 7, 101, 120, 97, 109, 112,
        108, 101, 3, 99, 111, 109, 0, 0, 1, 0, 1, 192, 12, 0, 1, 0, 1, 0, 0, 21, 216, 0, 4, 93, 184,
        216, 34,
    ];

    /// Real response for `kamyshev.me`, with 2 answers that both use a pointer to the question.
    const KAMYSHEV_ME: &[u8] = &[
        198, 243, 129, 128, 0, 1, 0, 2, 0, 0, 0, 0, 8, 107, 97, 109, 121, 115, 104, 101, 118, 2, 109,
        101, 0, 0, 1, 0, 1, 192, 12, 0, 1, 0, 1, 0, 0, 1, 44, 0, 4, 188, 114, 97, 3, 192, 12, 0, 1,
        0, 1, 0, 0, 1, 44, 0, 4, 188, 114, 96, 3,
    ];

    #[test]
    fn decode_domain_name() {
        let msg = [
            7, b'e', b'x', b'a', b'm', b'p', b'l', b'e', 3, b'c', b'o', b'm', 0,
        ];
        let (name, len) = decode_name(&msg, 0).unwrap();
        assert_eq!(name.to_string(), "example.com");
        assert_eq!(name.to_dotted_bytes(), b"example.com");
        assert_eq!(len, msg.len());

        let (name, len) = decode_name(&[0], 0).unwrap();
        assert_eq!(name, DomainName::ROOT);
        assert_eq!(len, 1);
    }

    #[test]
    fn decode_domain_name_pointer() {
        let msg = [
            b'_', // never read
            3,
            b'c',
            b'o',
            b'm',
            0, // "com."
            7,
            b'e',
            b'x',
            b'a',
            b'm',
            b'p',
            b'l',
            b'e',
            // ptr to 1:
            0b1100_0000,
            1,
        ];
        let mut r = Reader::at(&msg, 1);
        let name = r.read_domain_name().unwrap();
        assert_eq!(name.to_string(), "com");
        let name = r.read_domain_name().unwrap();
        assert_eq!(name.to_string(), "example.com");
        assert_eq!(r.read_obj::<u8>(), Err(Error::Eof), "should be at EOF");
    }

    #[test]
    fn pointer_consumes_two_bytes() {
        // The first answer name is a bare pointer to the question name at offset 12, which is 13
        // bytes long.
        let (name, len) = decode_name(KAMYSHEV_ME, 29).unwrap();
        assert_eq!(name.to_string(), "kamyshev.me");
        assert_eq!(len, 2);

        // Label followed by a pointer into the middle of the question name.
        let mut msg = EXAMPLE_COM[..33].to_vec();
        msg.extend_from_slice(&[4, b'm', b'a', b'i', b'l', 0xc0, 16]);
        let (name, len) = decode_name(&msg, 33).unwrap();
        assert_eq!(name.to_string(), "mail.example.com");
        assert_eq!(len, 7);
    }

    #[test]
    fn decode_domain_name_pointer_oob() {
        assert_eq!(decode_name(&[0xff, 0xff], 0), Err(Error::PointerLoop));
        assert_eq!(decode_name(&[0xc0], 0), Err(Error::Eof));
    }

    #[test]
    fn decode_domain_name_dos() {
        // pointer to self:
        assert_eq!(decode_name(&[0b1100_0000, 0], 0), Err(Error::PointerLoop));

        // fallthrough, then pointer to 0:
        let msg = [1, b'a', 0b1100_0000, 0];
        assert_eq!(decode_name(&msg, 2), Err(Error::PointerLoop));

        // two pointers pointing at each other:
        let msg = [0, 0, 0xc0, 4, 0xc0, 2];
        assert_eq!(decode_name(&msg, 4), Err(Error::PointerLoop));
    }

    #[test]
    fn decode_domain_name_malformed() {
        // label runs past the end
        assert_eq!(decode_name(&[5, b'a', b'b'], 0), Err(Error::Eof));
        // missing terminator
        assert_eq!(decode_name(&[1, b'a'], 0), Err(Error::Eof));
        // offset past the end
        assert_eq!(decode_name(&[0], 3), Err(Error::Eof));
        // reserved label types
        assert_eq!(decode_name(&[0x40, 0], 0), Err(Error::InvalidValue));
        assert_eq!(decode_name(&[0x80, 0], 0), Err(Error::InvalidValue));
    }

    #[test]
    fn encoded_names_decode_to_the_same_text() {
        let long = "x".repeat(63);
        for text in ["google.com", "www.example.com", "a.b.c.d.e", long.as_str()] {
            let name = DomainName::from_str(text).unwrap();
            let wire = crate::packet::encoder::encode_name(&name);
            let (decoded, len) = decode_name(&wire, 0).unwrap();
            assert_eq!(decoded.to_string(), text);
            assert_eq!(len, wire.len());
        }
    }

    #[test]
    fn decode_question() {
        let (q, len) = Question::decode(EXAMPLE_COM, Header::LEN).unwrap();
        assert_eq!(len, 17 + 4);
        assert_eq!(q.name().to_string(), "www.example.com");
        assert_eq!(q.qtype(), Type::A);
        assert_eq!(q.qclass(), Class::IN);

        assert_eq!(Question::decode(&EXAMPLE_COM[..31], Header::LEN), Err(Error::Eof));
    }

    #[test]
    fn decode_resource_record() {
        let (rr, len) = ResourceRecord::decode(EXAMPLE_COM, 33).unwrap();
        assert_eq!(len, 2 + 10 + 4);
        assert_eq!(rr.name().to_string(), "www.example.com");
        assert_eq!(rr.ty(), Type::A);
        assert_eq!(rr.class(), Class::IN);
        assert_eq!(rr.ttl(), 5592);
        assert_eq!(rr.rdata(), [93, 184, 216, 34]);
        assert_eq!(rr.ipv4_addr(), Some(Ipv4Addr::new(93, 184, 216, 34)));

        // rdata runs past the end
        assert_eq!(
            ResourceRecord::decode(&EXAMPLE_COM[..48], 33),
            Err(Error::Eof)
        );
        // fixed fields run past the end
        assert_eq!(
            ResourceRecord::decode(&EXAMPLE_COM[..40], 33),
            Err(Error::Eof)
        );
    }

    #[test]
    fn opaque_rdata() {
        // AAAA record, with a pointer to a name at offset 12
        let msg = hex::parse(concat!(
            "000081800000000000000000",
            "076578616d706c6503636f6d00",
            "c00c001c00010000012c0010",
            "2606280000000000000000000000beef",
        ));
        let (rr, len) = ResourceRecord::decode(&msg, 25).unwrap();
        assert_eq!(len, msg.len() - 25);
        assert_eq!(rr.ty(), Type::AAAA);
        assert_eq!(rr.rdata().len(), 16);
        assert_eq!(rr.ipv4_addr(), None);
        assert_eq!(
            rr.to_string(),
            "example.com 300 IN AAAA \\# 16 2606280000000000000000000000beef"
        );
    }

    #[test]
    fn decode_packet() {
        let packet = Packet::decode(EXAMPLE_COM).unwrap();

        let h = packet.header();
        assert_eq!(h.id(), 55948);
        assert_eq!(h.flags(), 33152);
        assert_eq!(h.question_count(), 1);
        assert_eq!(h.answer_count(), 1);
        assert_eq!(h.authority_count(), 0);
        assert_eq!(h.additional_count(), 0);

        assert_eq!(packet.questions().len(), 1);
        let q = &packet.questions()[0];
        assert_eq!(q.name().to_dotted_bytes(), b"www.example.com");
        assert_eq!(q.qtype(), Type::A);
        assert_eq!(q.qclass(), Class::IN);

        assert_eq!(packet.answers().len(), 1);
        let ans = &packet.answers()[0];
        assert_eq!(ans.name().to_dotted_bytes(), b"www.example.com");
        assert_eq!(ans.ty(), Type::A);
        assert_eq!(ans.class(), Class::IN);
        assert_eq!(ans.ttl(), 5592);
        assert_eq!(ans.rdata(), [93, 184, 216, 34]);

        assert!(packet.authorities().is_empty());
        assert!(packet.additionals().is_empty());
    }

    #[test]
    fn decode_compressed_packet() {
        let packet = Packet::decode(KAMYSHEV_ME).unwrap();
        assert_eq!(packet.header().id(), 50931);
        assert_eq!(packet.answers().len(), 2);
        assert_eq!(packet.answers()[0].name(), packet.questions()[0].name());
        assert_eq!(packet.answers()[1].name(), packet.questions()[0].name());

        expect![[r#"
            ;; id: 50931, flags: 0x8180, rcode: NO_ERROR
            ;; QUESTION (1)
            kamyshev.me IN A
            ;; ANSWER (2)
            kamyshev.me 300 IN A 188.114.97.3
            kamyshev.me 300 IN A 188.114.96.3
            ;; AUTHORITY (0)
            ;; ADDITIONAL (0)
        "#]]
        .assert_eq(&packet.to_string());

        let addrs = packet.ipv4_answers().collect::<Vec<_>>();
        assert_eq!(
            addrs,
            [Ipv4Addr::new(188, 114, 97, 3), Ipv4Addr::new(188, 114, 96, 3)]
        );
        let dotted = addrs.iter().map(|ip| ip.to_string()).collect::<Vec<_>>();
        assert_eq!(dotted, ["188.114.97.3", "188.114.96.3"]);
    }

    #[test]
    fn decode_packet_with_all_sections() {
        // 1 question, 1 answer, 1 authority, 1 additional; all record names are pointers.
        let msg = hex::parse(concat!(
            "abcd8180", "0001", "0001", "0001", "0001",
            "076578616d706c6503636f6d00", "00010001",
            "c00c", "0001", "0001", "0000003c", "0004", "01020304",
            "c00c", "0002", "0001", "0000003c", "0005", "026e73c00c",
            "c039", "0001", "0001", "0000003c", "0004", "05060708",
        ));
        let packet = Packet::decode(&msg).unwrap();
        assert_eq!(packet.answers().len(), 1);
        assert_eq!(packet.authorities().len(), 1);
        assert_eq!(packet.additionals().len(), 1);

        let ns = &packet.authorities()[0];
        assert_eq!(ns.ty(), Type::NS);
        // the NS data is itself a compressed name
        let rdata_offset = msg.len() - 16 - 5;
        let (target, _) = decode_name(&msg, rdata_offset).unwrap();
        assert_eq!(target.to_string(), "ns.example.com");

        let glue = &packet.additionals()[0];
        assert_eq!(glue.name().to_string(), "ns.example.com");
        assert_eq!(glue.ipv4_addr(), Some(Ipv4Addr::new(5, 6, 7, 8)));

        assert_eq!(
            packet.ipv4_answers().collect::<Vec<_>>(),
            [Ipv4Addr::new(1, 2, 3, 4)]
        );
    }

    #[test]
    fn counts_must_cover_message() {
        // trailing garbage after the declared sections
        let mut msg = EXAMPLE_COM.to_vec();
        msg.push(0);
        assert_eq!(Packet::decode(&msg), Err(Error::TrailingData));

        // header claims fewer answers than present
        let mut msg = KAMYSHEV_ME.to_vec();
        msg[7] = 1;
        assert_eq!(Packet::decode(&msg), Err(Error::TrailingData));

        // header claims more answers than present
        let mut msg = EXAMPLE_COM.to_vec();
        msg[7] = 2;
        assert_eq!(Packet::decode(&msg), Err(Error::Eof));

        // truncated header
        assert_eq!(Packet::decode(&EXAMPLE_COM[..5]), Err(Error::Eof));
    }
}
