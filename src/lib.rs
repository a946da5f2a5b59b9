//! DNS query encoding and response decoding, plus a minimal UDP stub resolver.
//!
//! The [`packet`] module is a pure, I/O-free codec: it builds query messages and decodes response
//! messages, including compressed domain names. [`resolver::SyncResolver`] is a thin wrapper that
//! ships a query to a name server and decodes the single reply.

mod hex;
pub mod num;
pub mod packet;
pub mod resolver;

pub use packet::Error;

/// Size of DNS message buffers.
///
/// Messages sent over UDP are limited to 512 Bytes unless EDNS is used (which this crate doesn't).
pub const DNS_BUFFER_SIZE: usize = 512;
