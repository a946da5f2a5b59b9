//! DNS query encoder.
//!
//! Only queries are ever encoded, so names are always written in full: the encoder never emits
//! compression pointers.

use bytemuck::NoUninit;

use crate::num;

use super::{name::DomainName, Header, Question, Type};

/// Growable buffer that DNS message fields are appended to.
pub(crate) struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    pub(crate) fn with_capacity(capacity: usize) -> Self {
        Self {
            buf: Vec::with_capacity(capacity),
        }
    }

    pub(crate) fn into_inner(self) -> Vec<u8> {
        self.buf
    }

    pub(crate) fn write_slice(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    pub(crate) fn write_obj<T: NoUninit>(&mut self, obj: T) {
        self.write_slice(bytemuck::bytes_of(&obj))
    }

    pub(crate) fn write_u8(&mut self, b: u8) {
        num::put_number(&mut self.buf, b.into(), 1);
    }

    pub(crate) fn write_u16(&mut self, v: u16) {
        num::put_number(&mut self.buf, v.into(), 2);
    }

    pub(crate) fn write_domain_name(&mut self, name: &DomainName) {
        for label in name {
            // `Label` guarantees that the length fits in the 6 available bits.
            self.write_u8(label.as_bytes().len() as u8);
            self.write_slice(label.as_bytes());
        }
        // Implicit root label at the end.
        self.write_u8(0);
    }
}

/// Encodes a domain name in uncompressed wire format.
///
/// ```
/// # use dnsquery::packet::{encoder::encode_name, name::DomainName};
/// let name = DomainName::from_str("google.com").unwrap();
/// assert_eq!(encode_name(&name), b"\x06google\x03com\x00");
/// ```
pub fn encode_name(name: &DomainName) -> Vec<u8> {
    let mut w = Writer::with_capacity(name.wire_len());
    w.write_domain_name(name);
    w.into_inner()
}

impl Question {
    pub(crate) fn encode(&self, w: &mut Writer) {
        w.write_domain_name(self.name());
        w.write_u16(self.qtype().0);
        w.write_u16(self.qclass().0);
    }

    fn wire_len(&self) -> usize {
        self.name().wire_len() + 4
    }

    /// Returns the wire representation of this question.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut w = Writer::with_capacity(self.wire_len());
        self.encode(&mut w);
        w.into_inner()
    }
}

/// Encodes a complete query message asking for records of type `ty` pertaining to `name`.
///
/// The message has a single question in the [`Class::IN`] class, and the *Recursion Desired* flag
/// set. Its transaction ID is drawn from `rng`; the ID only needs to be unpredictable enough to
/// tell concurrent queries apart, so it is not cryptographically secure.
///
/// [`Class::IN`]: super::Class::IN
pub fn build_query(rng: &mut fastrand::Rng, name: &DomainName, ty: Type) -> Vec<u8> {
    let mut header = Header::default();
    header.set_id(rng.u16(..));
    header.set_recursion_desired(true);
    header.set_question_count(1);

    let question = Question::new(name.clone()).ty(ty);

    let mut w = Writer::with_capacity(Header::LEN + question.wire_len());
    header.encode(&mut w);
    question.encode(&mut w);
    w.into_inner()
}
