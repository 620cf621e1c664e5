use crate::error::WireError;

/// Every message kind the relay understands, keyed by its wire type code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum PacketType {
    Connect = 0,
    Connected = 1,
    CouldNotConnect = 2,
    Disconnect = 3,
    CreateSession = 4,
    AssignedToSession = 5,
    CouldNotCreateSession = 6,
    InformClientReady = 7,
    AssignToSession = 8,
    CouldNotAssignToSession = 9,
    DisconnectFromSession = 10,
    SessionDisconnectStatus = 11,
    SetReady = 12,
    GameStarted = 13,
    SetBallPos = 14,
    InformBallPos = 15,
    SetPlayerPos = 16,
    InformPlayerPos = 17,
    PointScored = 18,
    InformPointScored = 19,
    InformWon = 20,
    ImAlive = 21,
    Disconnected = 22,
}

impl PacketType {
    /// All packet types, indexed by type code.
    pub const ALL: [PacketType; 23] = [
        PacketType::Connect,
        PacketType::Connected,
        PacketType::CouldNotConnect,
        PacketType::Disconnect,
        PacketType::CreateSession,
        PacketType::AssignedToSession,
        PacketType::CouldNotCreateSession,
        PacketType::InformClientReady,
        PacketType::AssignToSession,
        PacketType::CouldNotAssignToSession,
        PacketType::DisconnectFromSession,
        PacketType::SessionDisconnectStatus,
        PacketType::SetReady,
        PacketType::GameStarted,
        PacketType::SetBallPos,
        PacketType::InformBallPos,
        PacketType::SetPlayerPos,
        PacketType::InformPlayerPos,
        PacketType::PointScored,
        PacketType::InformPointScored,
        PacketType::InformWon,
        PacketType::ImAlive,
        PacketType::Disconnected,
    ];

    pub fn from_code(code: u8) -> Option<Self> {
        Self::ALL.get(code as usize).copied()
    }

    pub fn code(self) -> u8 {
        self as u8
    }

    /// Exact payload length a frame of this type must declare.
    pub const fn payload_size(self) -> u16 {
        match self {
            PacketType::Connect => 0,
            PacketType::Connected => 2,
            PacketType::CouldNotConnect => 2,
            PacketType::Disconnect => 2,
            PacketType::CreateSession => 2,
            PacketType::AssignedToSession => 5,
            PacketType::CouldNotCreateSession => 0,
            PacketType::InformClientReady => 5,
            PacketType::AssignToSession => 4,
            PacketType::CouldNotAssignToSession => 2,
            PacketType::DisconnectFromSession => 4,
            PacketType::SessionDisconnectStatus => 5,
            PacketType::SetReady => 5,
            PacketType::GameStarted => 2,
            PacketType::SetBallPos => 26,
            PacketType::InformBallPos => 24,
            PacketType::SetPlayerPos => 26,
            PacketType::InformPlayerPos => 26,
            PacketType::PointScored => 4,
            PacketType::InformPointScored => 12,
            PacketType::InformWon => 4,
            PacketType::ImAlive => 0,
            PacketType::Disconnected => 0,
        }
    }

    /// True for the requests a client sends to the relay.
    pub fn is_request(self) -> bool {
        matches!(
            self,
            PacketType::Connect
                | PacketType::Disconnect
                | PacketType::CreateSession
                | PacketType::AssignToSession
                | PacketType::DisconnectFromSession
                | PacketType::SetReady
                | PacketType::SetBallPos
                | PacketType::SetPlayerPos
                | PacketType::PointScored
                | PacketType::ImAlive
        )
    }
}

impl TryFrom<u8> for PacketType {
    type Error = WireError;

    fn try_from(code: u8) -> Result<Self, Self::Error> {
        PacketType::from_code(code).ok_or(WireError::UnknownType(code))
    }
}
