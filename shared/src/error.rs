use crate::packet::PacketType;

/// Failures while building or interpreting a frame.
#[derive(Debug, thiserror::Error)]
pub enum WireError {
    #[error("payload of {size} bytes exceeds the {max} byte limit")]
    PayloadTooLarge { size: usize, max: usize },
    #[error("unknown packet type {0}")]
    UnknownType(u8),
    #[error("{kind:?} expects {expected} payload bytes, got {actual}")]
    SizeMismatch {
        kind: PacketType,
        expected: u16,
        actual: usize,
    },
    #[error("payload codec failed: {0}")]
    Payload(#[from] bincode::Error),
}
