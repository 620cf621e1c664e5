//! Fixed-size client and session slots.
//!
//! Slots are never allocated or freed; a slot index is its id for the life of
//! the process. Clients and sessions refer to each other by id only, so
//! breaking a link is a matter of clearing an `Option`.

use shared::{ClientId, Role, SessionId, Vector2};
use std::net::SocketAddr;
use std::time::{Duration, Instant};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Availability {
    Free,
    InUse,
}

/// One client slot
#[derive(Debug, Clone)]
pub struct Client {
    pub id: ClientId,
    pub availability: Availability,
    /// Set by the idle sweep; the slot may be reclaimed by the next connect.
    pub pending_eviction: bool,
    /// Endpoint bound at connect; only requests from here act for this client
    pub addr: Option<SocketAddr>,
    pub last_message: Instant,
    pub session: Option<SessionId>,
    pub ready: bool,
    pub score: u32,
    pub position: Vector2,
    pub direction: Vector2,
}

impl Client {
    pub fn new(id: ClientId, now: Instant) -> Self {
        Self {
            id,
            availability: Availability::Free,
            pending_eviction: false,
            addr: None,
            last_message: now,
            session: None,
            ready: false,
            score: 0,
            position: Vector2::ZERO,
            direction: Vector2::ZERO,
        }
    }

    pub fn is_in_use(&self) -> bool {
        self.availability == Availability::InUse
    }

    /// True if the slot is occupied and bound to `addr`.
    pub fn is_owned_by(&self, addr: SocketAddr) -> bool {
        self.is_in_use() && self.addr == Some(addr)
    }

    /// Records activity, which also cancels a pending eviction.
    pub fn touch(&mut self, now: Instant) {
        self.last_message = now;
        self.pending_eviction = false;
    }

    pub fn is_stale(&self, now: Instant, threshold: Duration) -> bool {
        now.saturating_duration_since(self.last_message) > threshold
    }

    pub(crate) fn occupy(&mut self, addr: SocketAddr, now: Instant) {
        *self = Self::new(self.id, now);
        self.availability = Availability::InUse;
        self.addr = Some(addr);
    }

    pub(crate) fn release(&mut self) {
        let last_message = self.last_message;
        *self = Self::new(self.id, last_message);
    }
}

/// One session slot pairing a main and a secondary client
#[derive(Debug, Clone)]
pub struct Session {
    pub id: SessionId,
    pub availability: Availability,
    pub main: Option<ClientId>,
    pub secondary: Option<ClientId>,
    pub game_active: bool,
    pub ball_position: Vector2,
    pub ball_direction: Vector2,
}

impl Session {
    pub fn new(id: SessionId) -> Self {
        Self {
            id,
            availability: Availability::Free,
            main: None,
            secondary: None,
            game_active: false,
            ball_position: Vector2::ZERO,
            ball_direction: Vector2::ZERO,
        }
    }

    pub fn is_in_use(&self) -> bool {
        self.availability == Availability::InUse
    }

    pub fn role_of(&self, client_id: ClientId) -> Option<Role> {
        if self.main == Some(client_id) {
            Some(Role::Main)
        } else if self.secondary == Some(client_id) {
            Some(Role::Secondary)
        } else {
            None
        }
    }

    /// The other member of the pairing, if both seats are taken.
    pub fn partner_of(&self, client_id: ClientId) -> Option<ClientId> {
        match self.role_of(client_id)? {
            Role::Main => self.secondary,
            Role::Secondary => self.main,
        }
    }

    pub fn members(&self) -> impl Iterator<Item = ClientId> {
        self.main.into_iter().chain(self.secondary)
    }

    pub(crate) fn open(&mut self, main: ClientId) {
        *self = Self::new(self.id);
        self.availability = Availability::InUse;
        self.main = Some(main);
    }

    pub(crate) fn release(&mut self) {
        *self = Self::new(self.id);
    }
}
