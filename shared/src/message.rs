//! Typed view of every message in the relay protocol.
//!
//! Payload bodies are fixed-width little-endian fields, which is exactly what
//! bincode's default configuration produces for integers, floats and tuples.

use serde::de::DeserializeOwned;

use crate::error::WireError;
use crate::framer::{encode_frame, Frame};
use crate::packet::PacketType;
use crate::vector::Vector2;

pub type ClientId = u16;
pub type SessionId = u16;

/// Filler carried by COULD_NOT_CONNECT, which has no client id to report.
pub const NO_CLIENT_ID: ClientId = u16::MAX;

/// Seat a client occupies inside a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Main,
    Secondary,
}

impl Role {
    fn to_wire(self) -> u8 {
        match self {
            Role::Main => 0,
            Role::Secondary => 1,
        }
    }

    fn from_wire(value: u8) -> Self {
        if value == 0 {
            Role::Main
        } else {
            Role::Secondary
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Message {
    Connect,
    Connected {
        client_id: ClientId,
    },
    CouldNotConnect,
    Disconnect {
        client_id: ClientId,
    },
    CreateSession {
        client_id: ClientId,
    },
    AssignedToSession {
        session_id: SessionId,
        client_id: ClientId,
        role: Role,
    },
    CouldNotCreateSession,
    InformClientReady {
        session_id: SessionId,
        client_id: ClientId,
        ready: bool,
    },
    AssignToSession {
        session_id: SessionId,
        client_id: ClientId,
    },
    CouldNotAssignToSession {
        session_id: SessionId,
    },
    DisconnectFromSession {
        session_id: SessionId,
        client_id: ClientId,
    },
    SessionDisconnectStatus {
        session_id: SessionId,
        client_id: ClientId,
        success: bool,
    },
    SetReady {
        session_id: SessionId,
        client_id: ClientId,
        ready: bool,
    },
    GameStarted {
        session_id: SessionId,
    },
    SetBallPos {
        client_id: ClientId,
        position: Vector2,
        direction: Vector2,
    },
    InformBallPos {
        position: Vector2,
        direction: Vector2,
    },
    SetPlayerPos {
        client_id: ClientId,
        position: Vector2,
        direction: Vector2,
    },
    InformPlayerPos {
        client_id: ClientId,
        position: Vector2,
        direction: Vector2,
    },
    PointScored {
        session_id: SessionId,
        client_id: ClientId,
    },
    InformPointScored {
        session_id: SessionId,
        main_score: u32,
        secondary_score: u32,
        client_id: ClientId,
    },
    InformWon {
        session_id: SessionId,
        client_id: ClientId,
    },
    ImAlive,
    Disconnected,
}

fn read<T: DeserializeOwned>(payload: &[u8]) -> Result<T, WireError> {
    Ok(bincode::deserialize(payload)?)
}

impl Message {
    pub fn packet_type(&self) -> PacketType {
        match self {
            Message::Connect => PacketType::Connect,
            Message::Connected { .. } => PacketType::Connected,
            Message::CouldNotConnect => PacketType::CouldNotConnect,
            Message::Disconnect { .. } => PacketType::Disconnect,
            Message::CreateSession { .. } => PacketType::CreateSession,
            Message::AssignedToSession { .. } => PacketType::AssignedToSession,
            Message::CouldNotCreateSession => PacketType::CouldNotCreateSession,
            Message::InformClientReady { .. } => PacketType::InformClientReady,
            Message::AssignToSession { .. } => PacketType::AssignToSession,
            Message::CouldNotAssignToSession { .. } => PacketType::CouldNotAssignToSession,
            Message::DisconnectFromSession { .. } => PacketType::DisconnectFromSession,
            Message::SessionDisconnectStatus { .. } => PacketType::SessionDisconnectStatus,
            Message::SetReady { .. } => PacketType::SetReady,
            Message::GameStarted { .. } => PacketType::GameStarted,
            Message::SetBallPos { .. } => PacketType::SetBallPos,
            Message::InformBallPos { .. } => PacketType::InformBallPos,
            Message::SetPlayerPos { .. } => PacketType::SetPlayerPos,
            Message::InformPlayerPos { .. } => PacketType::InformPlayerPos,
            Message::PointScored { .. } => PacketType::PointScored,
            Message::InformPointScored { .. } => PacketType::InformPointScored,
            Message::InformWon { .. } => PacketType::InformWon,
            Message::ImAlive => PacketType::ImAlive,
            Message::Disconnected => PacketType::Disconnected,
        }
    }

    pub fn encode_payload(&self) -> Result<Vec<u8>, WireError> {
        let payload = match *self {
            Message::Connect
            | Message::CouldNotCreateSession
            | Message::ImAlive
            | Message::Disconnected => Vec::new(),
            Message::Connected { client_id }
            | Message::Disconnect { client_id }
            | Message::CreateSession { client_id } => bincode::serialize(&client_id)?,
            Message::CouldNotConnect => bincode::serialize(&NO_CLIENT_ID)?,
            Message::AssignedToSession {
                session_id,
                client_id,
                role,
            } => bincode::serialize(&(session_id, client_id, role.to_wire()))?,
            Message::InformClientReady {
                session_id,
                client_id,
                ready,
            }
            | Message::SetReady {
                session_id,
                client_id,
                ready,
            } => bincode::serialize(&(session_id, client_id, ready as u8))?,
            Message::SessionDisconnectStatus {
                session_id,
                client_id,
                success,
            } => bincode::serialize(&(session_id, client_id, success as u8))?,
            Message::AssignToSession {
                session_id,
                client_id,
            }
            | Message::DisconnectFromSession {
                session_id,
                client_id,
            }
            | Message::PointScored {
                session_id,
                client_id,
            }
            | Message::InformWon {
                session_id,
                client_id,
            } => bincode::serialize(&(session_id, client_id))?,
            Message::CouldNotAssignToSession { session_id }
            | Message::GameStarted { session_id } => bincode::serialize(&session_id)?,
            Message::SetBallPos {
                client_id,
                position,
                direction,
            }
            | Message::SetPlayerPos {
                client_id,
                position,
                direction,
            }
            | Message::InformPlayerPos {
                client_id,
                position,
                direction,
            } => bincode::serialize(&(client_id, position, direction))?,
            Message::InformBallPos {
                position,
                direction,
            } => bincode::serialize(&(position, direction))?,
            Message::InformPointScored {
                session_id,
                main_score,
                secondary_score,
                client_id,
            } => bincode::serialize(&(session_id, main_score, secondary_score, client_id))?,
        };

        debug_assert_eq!(payload.len(), self.packet_type().payload_size() as usize);
        Ok(payload)
    }

    /// Encodes the message as a complete, checksummed frame.
    pub fn encode(&self) -> Result<Vec<u8>, WireError> {
        encode_frame(self.packet_type().code(), &self.encode_payload()?)
    }

    /// Decodes a payload whose length must match the table entry for `kind`.
    pub fn decode(kind: PacketType, payload: &[u8]) -> Result<Self, WireError> {
        let expected = kind.payload_size();
        if payload.len() != expected as usize {
            return Err(WireError::SizeMismatch {
                kind,
                expected,
                actual: payload.len(),
            });
        }

        let message = match kind {
            PacketType::Connect => Message::Connect,
            PacketType::Connected => Message::Connected {
                client_id: read(payload)?,
            },
            PacketType::CouldNotConnect => Message::CouldNotConnect,
            PacketType::Disconnect => Message::Disconnect {
                client_id: read(payload)?,
            },
            PacketType::CreateSession => Message::CreateSession {
                client_id: read(payload)?,
            },
            PacketType::AssignedToSession => {
                let (session_id, client_id, role): (u16, u16, u8) = read(payload)?;
                Message::AssignedToSession {
                    session_id,
                    client_id,
                    role: Role::from_wire(role),
                }
            }
            PacketType::CouldNotCreateSession => Message::CouldNotCreateSession,
            PacketType::InformClientReady => {
                let (session_id, client_id, ready): (u16, u16, u8) = read(payload)?;
                Message::InformClientReady {
                    session_id,
                    client_id,
                    ready: ready != 0,
                }
            }
            PacketType::AssignToSession => {
                let (session_id, client_id) = read(payload)?;
                Message::AssignToSession {
                    session_id,
                    client_id,
                }
            }
            PacketType::CouldNotAssignToSession => Message::CouldNotAssignToSession {
                session_id: read(payload)?,
            },
            PacketType::DisconnectFromSession => {
                let (session_id, client_id) = read(payload)?;
                Message::DisconnectFromSession {
                    session_id,
                    client_id,
                }
            }
            PacketType::SessionDisconnectStatus => {
                let (session_id, client_id, status): (u16, u16, u8) = read(payload)?;
                Message::SessionDisconnectStatus {
                    session_id,
                    client_id,
                    success: status != 0,
                }
            }
            PacketType::SetReady => {
                let (session_id, client_id, ready): (u16, u16, u8) = read(payload)?;
                Message::SetReady {
                    session_id,
                    client_id,
                    ready: ready != 0,
                }
            }
            PacketType::GameStarted => Message::GameStarted {
                session_id: read(payload)?,
            },
            PacketType::SetBallPos => {
                let (client_id, position, direction) = read(payload)?;
                Message::SetBallPos {
                    client_id,
                    position,
                    direction,
                }
            }
            PacketType::InformBallPos => {
                let (position, direction) = read(payload)?;
                Message::InformBallPos {
                    position,
                    direction,
                }
            }
            PacketType::SetPlayerPos => {
                let (client_id, position, direction) = read(payload)?;
                Message::SetPlayerPos {
                    client_id,
                    position,
                    direction,
                }
            }
            PacketType::InformPlayerPos => {
                let (client_id, position, direction) = read(payload)?;
                Message::InformPlayerPos {
                    client_id,
                    position,
                    direction,
                }
            }
            PacketType::PointScored => {
                let (session_id, client_id) = read(payload)?;
                Message::PointScored {
                    session_id,
                    client_id,
                }
            }
            PacketType::InformPointScored => {
                let (session_id, main_score, secondary_score, client_id) = read(payload)?;
                Message::InformPointScored {
                    session_id,
                    main_score,
                    secondary_score,
                    client_id,
                }
            }
            PacketType::InformWon => {
                let (session_id, client_id) = read(payload)?;
                Message::InformWon {
                    session_id,
                    client_id,
                }
            }
            PacketType::ImAlive => Message::ImAlive,
            PacketType::Disconnected => Message::Disconnected,
        };

        Ok(message)
    }

    pub fn from_frame(frame: &Frame) -> Result<Self, WireError> {
        let kind = PacketType::try_from(frame.kind)?;
        Self::decode(kind, &frame.data)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::framer::FrameDecoder;

    fn every_message() -> Vec<Message> {
        let position = Vector2::new(120.0, 48.5);
        let direction = Vector2::new(-0.6, 0.8);

        vec![
            Message::Connect,
            Message::Connected { client_id: 7 },
            Message::CouldNotConnect,
            Message::Disconnect { client_id: 7 },
            Message::CreateSession { client_id: 7 },
            Message::AssignedToSession {
                session_id: 3,
                client_id: 7,
                role: Role::Secondary,
            },
            Message::CouldNotCreateSession,
            Message::InformClientReady {
                session_id: 3,
                client_id: 7,
                ready: true,
            },
            Message::AssignToSession {
                session_id: 3,
                client_id: 8,
            },
            Message::CouldNotAssignToSession { session_id: 3 },
            Message::DisconnectFromSession {
                session_id: 3,
                client_id: 8,
            },
            Message::SessionDisconnectStatus {
                session_id: 3,
                client_id: 8,
                success: true,
            },
            Message::SetReady {
                session_id: 3,
                client_id: 8,
                ready: false,
            },
            Message::GameStarted { session_id: 3 },
            Message::SetBallPos {
                client_id: 7,
                position,
                direction,
            },
            Message::InformBallPos {
                position,
                direction,
            },
            Message::SetPlayerPos {
                client_id: 8,
                position,
                direction,
            },
            Message::InformPlayerPos {
                client_id: 8,
                position,
                direction,
            },
            Message::PointScored {
                session_id: 3,
                client_id: 7,
            },
            Message::InformPointScored {
                session_id: 3,
                main_score: 1,
                secondary_score: 0,
                client_id: 7,
            },
            Message::InformWon {
                session_id: 3,
                client_id: 7,
            },
            Message::ImAlive,
            Message::Disconnected,
        ]
    }

    #[test]
    fn test_every_type_has_a_message() {
        let kinds: Vec<PacketType> = every_message().iter().map(Message::packet_type).collect();
        assert_eq!(kinds, PacketType::ALL.to_vec());
    }

    #[test]
    fn test_frames_survive_the_decoder() {
        let mut stream = Vec::new();
        for message in every_message() {
            let encoded = message.encode().unwrap();
            let declared = u16::from_le_bytes([encoded[4], encoded[5]]);
            assert_eq!(declared, message.packet_type().payload_size());
            stream.extend(encoded);
        }

        let frames = FrameDecoder::new().push(&stream);
        let decoded: Vec<Message> = frames
            .iter()
            .map(|frame| Message::from_frame(frame).unwrap())
            .collect();
        assert_eq!(decoded, every_message());
    }

    #[test]
    fn test_assigned_to_session_layout() {
        let payload = Message::AssignedToSession {
            session_id: 0x0102,
            client_id: 0x0304,
            role: Role::Main,
        }
        .encode_payload()
        .unwrap();

        assert_eq!(payload, vec![0x02, 0x01, 0x04, 0x03, 0x00]);
    }

    #[test]
    fn test_inform_point_scored_layout() {
        let payload = Message::InformPointScored {
            session_id: 2,
            main_score: 1,
            secondary_score: 256,
            client_id: 5,
        }
        .encode_payload()
        .unwrap();

        assert_eq!(payload, vec![2, 0, 1, 0, 0, 0, 0, 1, 0, 0, 5, 0]);
    }

    #[test]
    fn test_could_not_connect_carries_filler() {
        let payload = Message::CouldNotConnect.encode_payload().unwrap();
        assert_eq!(payload, vec![0xFF, 0xFF]);
    }

    #[test]
    fn test_decode_rejects_wrong_length() {
        let result = Message::decode(PacketType::CreateSession, &[1, 0, 0]);
        assert!(matches!(
            result,
            Err(WireError::SizeMismatch {
                kind: PacketType::CreateSession,
                expected: 2,
                actual: 3,
            })
        ));
    }

    #[test]
    fn test_from_frame_rejects_unknown_type() {
        let frame = Frame {
            kind: 99,
            size: 0,
            data: Vec::new(),
            crc: 0,
        };
        assert!(matches!(
            Message::from_frame(&frame),
            Err(WireError::UnknownType(99))
        ));
    }
}
