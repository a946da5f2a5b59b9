//! DNS message encoder and decoder.
//!
//! The codec is pure: it only transforms in-memory buffers and never performs I/O, so all of it can
//! be used from any number of threads at once.

#[macro_use]
mod macros;
pub mod decoder;
pub mod encoder;
mod error;
pub mod name;

use core::fmt;

use bitflags::bitflags;

use crate::num::U16;

pub use error::Error;

use self::{decoder::Reader, encoder::Writer, name::DomainName};

ffi_enum! {
    /// Server response codes.
    pub enum RCode: u8 {
        /// No error.
        NO_ERROR = 0,
        /// The query sent by the client was erroneous.
        FORM_ERR = 1,
        /// A server-side error prevented processing of the query.
        SERV_FAIL = 2,
        /// Signifies that the queried domain name does not exist.
        ///
        /// May only be sent by an authoritative name server.
        NX_DOMAIN = 3,
        /// The requested query type is not supported by the server.
        NOT_IMP = 4,
        /// The server refused to answer the query for policy reasons.
        REFUSED = 5,
    }
}

ffi_enum! {
    /// Resource Record types.
    ///
    /// Only [`Type::A`] records are interpreted by this library, the other types are listed so that
    /// decoded records print nicely. See [RFC 1035] for their meaning.
    ///
    /// [RFC 1035]: https://datatracker.ietf.org/doc/html/rfc1035
    pub enum Type: u16 {
        /// IPv4 host address.
        A = 1,
        NS = 2,
        CNAME = 5,
        SOA = 6,
        PTR = 12,
        MX = 15,
        TXT = 16,
        AAAA = 28,
    }
}

impl Default for Type {
    #[inline]
    fn default() -> Self {
        Self::A
    }
}

ffi_enum! {
    /// Resource Record classes.
    pub enum Class: u16 {
        /// The Internet.
        IN = 1,
        /// CSNET.
        CS = 2,
        /// Chaosnet.
        CH = 3,
        /// Hesiod (basically, an LDAP precursor).
        HS = 4,
    }
}

impl Default for Class {
    #[inline]
    fn default() -> Self {
        Self::IN
    }
}

// Bit positions in the header flags are inverted, because RFC 1035 starts counting at the MSb.
const fn be_pos(pos: u16) -> u16 {
    15 - pos
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    #[repr(transparent)]
    struct HeaderFlags: u16 {
        /// If set, the message is a response to a query. If unset, it is a query.
        const QR = 1 << be_pos(0);
        const OPCODE = 0b1111 << be_pos(4);
        /// Set if this response was sent from a name server that is the authority for the queried
        /// domain name.
        const AA = 1 << be_pos(5);
        /// Set if the message was truncated because it is longer than the maximum allowed length of
        /// the transmission channel.
        const TC = 1 << be_pos(6);
        /// Recursion Desired: This bit can be set in a query to instruct recursive resolvers to
        /// perform a recursive query. The bit is copied to the response.
        const RD = 1 << be_pos(7);
        /// Recursion Available: This bit can be set in a response to indicate that the responding
        /// server support recursion.
        const RA = 1 << be_pos(8);
        const Z = 0b111 << be_pos(11);
        const RCODE = 0b1111;
    }
}

/// Packet header.
///
/// The in-memory representation is identical to the 12-byte wire format: six big-endian 16-bit
/// fields. The four counts describe how many entries the following sections contain, and the
/// decoder relies on them to know how many records to read.
#[derive(Clone, Copy, Default, PartialEq, Eq, bytemuck::Pod, bytemuck::Zeroable)]
#[repr(C, packed)]
pub struct Header {
    id: U16,
    flags: U16,
    qdcount: U16,
    ancount: U16,
    nscount: U16,
    arcount: U16,
}

impl Header {
    /// Length of the encoded header in bytes.
    pub const LEN: usize = 12;

    fn header_flags(&self) -> HeaderFlags {
        HeaderFlags::from_bits_retain(self.flags.get())
    }

    fn modify_flags(&mut self, with: impl FnOnce(&mut HeaderFlags)) {
        let mut flags = self.header_flags();
        with(&mut flags);
        self.flags = flags.bits().into();
    }

    /// Decodes a header from the first [`Header::LEN`] bytes of `buf`.
    ///
    /// Returns the header and the number of bytes consumed, which is always [`Header::LEN`].
    pub fn decode(buf: &[u8]) -> Result<(Self, usize), Error> {
        let mut r = Reader::new(buf);
        let header = r.read_obj::<Header>()?;
        Ok((header, r.pos()))
    }

    /// Returns the wire representation of this header.
    #[inline]
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::bytes_of(self)
    }

    pub(crate) fn encode(&self, w: &mut Writer) {
        w.write_obj(*self);
    }

    /// Returns the 16-bit packet ID.
    ///
    /// Servers will copy this ID to the corresponding response packet so that the client can
    /// identify responses to its queries.
    #[inline]
    pub fn id(&self) -> u16 {
        self.id.get()
    }

    #[inline]
    pub fn set_id(&mut self, id: u16) {
        self.id = id.into();
    }

    /// Returns the raw 16-bit flags field.
    #[inline]
    pub fn flags(&self) -> u16 {
        self.flags.get()
    }

    #[inline]
    pub fn set_flags(&mut self, flags: u16) {
        self.flags = flags.into();
    }

    #[inline]
    pub fn is_query(&self) -> bool {
        !self.is_response()
    }

    #[inline]
    pub fn is_response(&self) -> bool {
        self.header_flags().contains(HeaderFlags::QR)
    }

    /// Returns whether the truncation flag is set, indicating that the message was truncated to
    /// fit in the transport channel.
    pub fn is_truncated(&self) -> bool {
        self.header_flags().contains(HeaderFlags::TC)
    }

    pub fn is_recursion_desired(&self) -> bool {
        self.header_flags().contains(HeaderFlags::RD)
    }

    pub fn set_recursion_desired(&mut self, rd: bool) {
        self.modify_flags(|f| f.set(HeaderFlags::RD, rd));
    }

    pub fn is_recursion_available(&self) -> bool {
        self.header_flags().contains(HeaderFlags::RA)
    }

    pub fn is_authority(&self) -> bool {
        self.header_flags().contains(HeaderFlags::AA)
    }

    pub fn rcode(&self) -> RCode {
        RCode((self.header_flags() & HeaderFlags::RCODE).bits() as u8)
    }

    pub fn question_count(&self) -> u16 {
        self.qdcount.get()
    }

    pub fn answer_count(&self) -> u16 {
        self.ancount.get()
    }

    pub fn authority_count(&self) -> u16 {
        self.nscount.get()
    }

    pub fn additional_count(&self) -> u16 {
        self.arcount.get()
    }

    pub fn set_question_count(&mut self, qdcount: u16) {
        self.qdcount = qdcount.into();
    }

    pub fn set_answer_count(&mut self, ancount: u16) {
        self.ancount = ancount.into();
    }

    pub fn set_authority_count(&mut self, nscount: u16) {
        self.nscount = nscount.into();
    }

    pub fn set_additional_count(&mut self, arcount: u16) {
        self.arcount = arcount.into();
    }
}

impl fmt::Debug for Header {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Header")
            .field("id", &self.id())
            .field("flags", &self.header_flags())
            .field("qdcount", &self.qdcount.get())
            .field("ancount", &self.ancount.get())
            .field("nscount", &self.nscount.get())
            .field("arcount", &self.arcount.get())
            .finish()
    }
}

/// An entry of the *Question* section: the name, type and class a client is asking about.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Question {
    name: DomainName,
    ty: Type,
    class: Class,
}

impl Question {
    /// Creates a question asking for the [`Type::A`] records in the internet class
    /// ([`Class::IN`]) pertaining to `name`.
    #[inline]
    pub fn new(name: DomainName) -> Self {
        Self {
            name,
            ty: Type::default(),
            class: Class::default(),
        }
    }

    /// Sets the record type to query.
    #[inline]
    pub fn ty(self, ty: Type) -> Self {
        Self { ty, ..self }
    }

    /// Sets the record class to query.
    ///
    /// In almost all cases this can be left as the default value ([`Class::IN`]).
    #[inline]
    pub fn class(self, class: Class) -> Self {
        Self { class, ..self }
    }

    /// Returns the domain name that is being queried.
    #[inline]
    pub fn name(&self) -> &DomainName {
        &self.name
    }

    /// Returns the record type the client is interested in.
    #[inline]
    pub fn qtype(&self) -> Type {
        self.ty
    }

    /// Returns the record class the client is interested in.
    #[inline]
    pub fn qclass(&self) -> Class {
        self.class
    }
}

impl fmt::Display for Question {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {} {}", self.name, self.class, self.ty)
    }
}
