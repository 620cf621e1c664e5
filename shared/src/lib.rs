//! Wire protocol shared by the relay server and its tooling.
//!
//! Every datagram carries one or more frames:
//! `PREAMBLE | TYPE | SIZE | PAYLOAD | CRC`. The [`framer`] module builds and
//! parses frames, [`packet`] holds the type-code table with the exact payload
//! length of every type, and [`message`] gives each type a typed body.

pub mod crc;
pub mod error;
pub mod framer;
pub mod message;
pub mod packet;
pub mod vector;

pub use crc::{crc16, crc16_mcrf4xx, CRC_SEED};
pub use error::WireError;
pub use framer::{
    encode_frame, DecodeState, Frame, FrameDecoder, FRAME_OVERHEAD, HEADER_SIZE,
    MAX_PACKET_SIZE, MAX_PAYLOAD_SIZE, PREAMBLE,
};
pub use message::{ClientId, Message, Role, SessionId, NO_CLIENT_ID};
pub use packet::PacketType;
pub use vector::{Vector2, VECTOR2_TAG, VECTOR2_WIRE_SIZE};

/// Port the relay listens on unless told otherwise.
pub const DEFAULT_PORT: u16 = 8080;
