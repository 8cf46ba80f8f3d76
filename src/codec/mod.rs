//! Binary framing of the client wire protocol. Both codecs are pure
//! functions over `&[u8]`/`Vec<u8>`, manual byte-pushing rather than a
//! `tokio_util::codec::Decoder`, since outer framing here needs to carry
//! the raw payload length explicitly on the wire.

pub mod message;
pub mod packet;

pub use message::{Message, MessageType};
pub use packet::{Packet, PacketType};
