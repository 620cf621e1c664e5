//! Client and session state machine for the relay.
//!
//! Every handler tolerates duplicated and reordered requests: a request whose
//! effect has already happened re-sends the confirmation instead of failing,
//! because clients retry until they see the reply they expect.

use crate::config::ServerConfig;
use crate::pool::{Client, Session};
use log::{debug, info};
use shared::{ClientId, Message, Role, SessionId, Vector2};
use std::net::SocketAddr;
use std::time::{Duration, Instant};

/// A message the relay wants delivered to an endpoint.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub addr: SocketAddr,
    pub message: Message,
}

impl Reply {
    pub fn new(addr: SocketAddr, message: Message) -> Self {
        Self { addr, message }
    }
}

/// Owner of the client and session pools.
///
/// Callers serialize access; each call runs to completion before the next.
pub struct RelayState {
    clients: Vec<Client>,
    sessions: Vec<Session>,
    winning_score: u32,
}

impl RelayState {
    pub fn new(max_clients: usize, max_sessions: usize, winning_score: u32) -> Self {
        let now = Instant::now();
        Self {
            clients: (0..max_clients)
                .map(|id| Client::new(id as ClientId, now))
                .collect(),
            sessions: (0..max_sessions)
                .map(|id| Session::new(id as SessionId))
                .collect(),
            winning_score,
        }
    }

    pub fn from_config(config: &ServerConfig) -> Self {
        Self::new(
            config.client_capacity(),
            config.session_capacity(),
            config.winning_score,
        )
    }

    pub fn client(&self, client_id: ClientId) -> Option<&Client> {
        self.clients.get(client_id as usize)
    }

    pub fn session(&self, session_id: SessionId) -> Option<&Session> {
        self.sessions.get(session_id as usize)
    }

    pub fn connected_clients(&self) -> usize {
        self.clients.iter().filter(|c| c.is_in_use()).count()
    }

    pub fn open_sessions(&self) -> usize {
        self.sessions.iter().filter(|s| s.is_in_use()).count()
    }

    /// Applies one request and returns the replies it produced.
    pub fn handle(&mut self, message: Message, addr: SocketAddr, now: Instant) -> Vec<Reply> {
        let mut out = Vec::new();

        // A client id only counts when the request comes from the endpoint
        // that connected with it; an evicted endpoint may still be using it.
        if let Some(client_id) = requester(&message) {
            match self.clients.get_mut(client_id as usize) {
                Some(client) if client.is_owned_by(addr) => client.touch(now),
                _ => {
                    refuse_foreign(&message, client_id, addr, &mut out);
                    return out;
                }
            }
        }

        match message {
            Message::Connect => self.connect(addr, now, &mut out),
            Message::Disconnect { client_id } => self.disconnect(client_id, false, &mut out),
            Message::CreateSession { client_id } => self.create_session(client_id, addr, &mut out),
            Message::AssignToSession {
                session_id,
                client_id,
            } => self.assign_to_session(session_id, client_id, addr, &mut out),
            Message::DisconnectFromSession {
                session_id,
                client_id,
            } => self.disconnect_from_session(session_id, client_id, addr, &mut out),
            Message::SetReady {
                session_id,
                client_id,
                ready,
            } => self.set_ready(session_id, client_id, ready, &mut out),
            Message::SetBallPos {
                client_id,
                position,
                direction,
            } => self.set_ball_pos(client_id, position, direction, &mut out),
            Message::SetPlayerPos {
                client_id,
                position,
                direction,
            } => self.set_player_pos(client_id, position, direction, &mut out),
            Message::PointScored {
                session_id,
                client_id,
            } => self.point_scored(session_id, client_id, &mut out),
            Message::ImAlive => self.im_alive(addr, now, &mut out),
            other => debug!("Ignoring {:?} from {}", other.packet_type(), addr),
        }

        debug_assert!(self.invariants_hold(), "pool invariant broken");
        out
    }

    /// Marks idle clients for eviction and returns how many were newly marked.
    ///
    /// Nothing is freed here; a marked slot is reclaimed by the next connect
    /// that finds no free slot.
    pub fn mark_stale(&mut self, now: Instant, threshold: Duration) -> usize {
        let mut marked = 0;
        for client in &mut self.clients {
            if client.is_in_use() && !client.pending_eviction && client.is_stale(now, threshold) {
                client.pending_eviction = true;
                marked += 1;
            }
        }
        marked
    }

    /// Disconnects every client, notifying each one.
    pub fn disconnect_all(&mut self) -> Vec<Reply> {
        let mut out = Vec::new();
        let connected: Vec<ClientId> = self
            .clients
            .iter()
            .filter(|c| c.is_in_use())
            .map(|c| c.id)
            .collect();

        for client_id in connected {
            self.disconnect(client_id, true, &mut out);
        }
        out
    }

    fn connect(&mut self, addr: SocketAddr, now: Instant, out: &mut Vec<Reply>) {
        if let Some(client_id) = self.find_by_addr(addr) {
            debug!("Client {} at {} repeated its connect", client_id, addr);
            self.clients[client_id as usize].touch(now);
            out.push(Reply::new(addr, Message::Connected { client_id }));
            return;
        }

        let slot = self
            .clients
            .iter()
            .position(|c| !c.is_in_use())
            .or_else(|| {
                self.clients
                    .iter()
                    .position(|c| c.is_in_use() && c.pending_eviction)
            });

        let Some(index) = slot else {
            info!("Refusing connection from {}: no free client slots", addr);
            out.push(Reply::new(addr, Message::CouldNotConnect));
            return;
        };

        let client_id = index as ClientId;
        if self.clients[index].is_in_use() {
            info!("Evicting idle client {} to make room for {}", client_id, addr);
            self.disconnect(client_id, true, out);
        }

        self.clients[index].occupy(addr, now);
        info!("Client {} connected from {}", client_id, addr);
        out.push(Reply::new(addr, Message::Connected { client_id }));
    }

    /// Frees a client slot, first taking it out of its session.
    fn disconnect(&mut self, client_id: ClientId, notify: bool, out: &mut Vec<Reply>) {
        let Some(client) = self.live_client(client_id) else {
            debug!("Client {} already disconnected", client_id);
            return;
        };
        let (addr, session) = (client.addr, client.session);

        if let Some(session_id) = session {
            self.leave_session(session_id, client_id, false, out);
        }

        self.clients[client_id as usize].release();
        info!("Client {} disconnected", client_id);

        if notify {
            if let Some(addr) = addr {
                out.push(Reply::new(addr, Message::Disconnected));
            }
        }
    }

    fn create_session(&mut self, client_id: ClientId, addr: SocketAddr, out: &mut Vec<Reply>) {
        let Some(client) = self.live_client(client_id) else {
            return;
        };

        if let Some(session_id) = client.session {
            let role = self.sessions[session_id as usize]
                .role_of(client_id)
                .unwrap_or(Role::Main);
            out.push(Reply::new(
                addr,
                Message::AssignedToSession {
                    session_id,
                    client_id,
                    role,
                },
            ));
            return;
        }

        let Some(index) = self.sessions.iter().position(|s| !s.is_in_use()) else {
            info!("Client {} could not create a session: pool exhausted", client_id);
            out.push(Reply::new(addr, Message::CouldNotCreateSession));
            return;
        };

        let session_id = index as SessionId;
        self.sessions[index].open(client_id);
        let client = &mut self.clients[client_id as usize];
        client.session = Some(session_id);
        client.ready = false;

        info!("Client {} created session {}", client_id, session_id);
        out.push(Reply::new(
            addr,
            Message::AssignedToSession {
                session_id,
                client_id,
                role: Role::Main,
            },
        ));
    }

    fn assign_to_session(
        &mut self,
        session_id: SessionId,
        client_id: ClientId,
        addr: SocketAddr,
        out: &mut Vec<Reply>,
    ) {
        let refuse = Reply::new(addr, Message::CouldNotAssignToSession { session_id });

        let Some(client) = self.live_client(client_id) else {
            out.push(refuse);
            return;
        };
        let current_session = client.session;

        let Some(session) = self.live_session(session_id) else {
            out.push(refuse);
            return;
        };
        let (main, secondary) = (session.main, session.secondary);

        let confirm = |client_id, role| {
            Reply::new(
                addr,
                Message::AssignedToSession {
                    session_id,
                    client_id,
                    role,
                },
            )
        };

        match (main, secondary) {
            (Some(main), Some(secondary)) => {
                if client_id == main {
                    out.push(confirm(main, Role::Main));
                } else if client_id == secondary {
                    out.push(confirm(secondary, Role::Secondary));
                    out.push(confirm(main, Role::Main));
                } else {
                    debug!("Session {} is full, refusing client {}", session_id, client_id);
                    out.push(refuse);
                }
            }
            (Some(main), None) => {
                if client_id == main {
                    out.push(confirm(main, Role::Main));
                    return;
                }
                if current_session.is_some() {
                    debug!(
                        "Client {} already belongs to session {:?}",
                        client_id, current_session
                    );
                    out.push(refuse);
                    return;
                }

                self.sessions[session_id as usize].secondary = Some(client_id);
                let client = &mut self.clients[client_id as usize];
                client.session = Some(session_id);
                client.ready = false;

                info!(
                    "Client {} joined session {} as secondary to {}",
                    client_id, session_id, main
                );
                let paired = Message::AssignedToSession {
                    session_id,
                    client_id,
                    role: Role::Secondary,
                };
                self.send_to(main, paired.clone(), out);
                out.push(Reply::new(addr, paired));
                out.push(confirm(main, Role::Main));
            }
            _ => out.push(refuse),
        }
    }

    fn disconnect_from_session(
        &mut self,
        session_id: SessionId,
        client_id: ClientId,
        addr: SocketAddr,
        out: &mut Vec<Reply>,
    ) {
        let is_member = self
            .live_session(session_id)
            .is_some_and(|s| s.role_of(client_id).is_some());

        if !is_member {
            // Most likely a retry after a lost acknowledgement.
            out.push(Reply::new(
                addr,
                Message::SessionDisconnectStatus {
                    session_id,
                    client_id,
                    success: true,
                },
            ));
            return;
        }

        self.leave_session(session_id, client_id, true, out);
    }

    /// Removes `client_id` from its seat, promoting or notifying the partner.
    fn leave_session(
        &mut self,
        session_id: SessionId,
        client_id: ClientId,
        acknowledge: bool,
        out: &mut Vec<Reply>,
    ) {
        let Some(role) = self
            .live_session(session_id)
            .and_then(|s| s.role_of(client_id))
        else {
            return;
        };

        let leaver = &mut self.clients[client_id as usize];
        leaver.ready = false;
        leaver.session = None;

        if acknowledge {
            self.send_to(
                client_id,
                Message::SessionDisconnectStatus {
                    session_id,
                    client_id,
                    success: true,
                },
                out,
            );
        }

        let session = &mut self.sessions[session_id as usize];
        session.game_active = false;

        match role {
            Role::Main => match session.secondary.take() {
                Some(successor) => {
                    session.main = Some(successor);
                    self.clients[successor as usize].ready = false;
                    info!(
                        "Client {} left session {}, client {} promoted to main",
                        client_id, session_id, successor
                    );
                    self.send_to(
                        successor,
                        Message::AssignedToSession {
                            session_id,
                            client_id: successor,
                            role: Role::Main,
                        },
                        out,
                    );
                }
                None => {
                    session.release();
                    info!("Session {} closed", session_id);
                }
            },
            Role::Secondary => {
                session.secondary = None;
                info!("Client {} left session {}", client_id, session_id);
                if let Some(main) = session.main {
                    self.clients[main as usize].ready = false;
                    self.send_to(
                        main,
                        Message::SessionDisconnectStatus {
                            session_id,
                            client_id,
                            success: true,
                        },
                        out,
                    );
                }
            }
        }
    }

    fn set_ready(
        &mut self,
        session_id: SessionId,
        client_id: ClientId,
        ready: bool,
        out: &mut Vec<Reply>,
    ) {
        let bound = self
            .live_client(client_id)
            .is_some_and(|c| c.session == Some(session_id));
        if !bound {
            return;
        }

        let session = &self.sessions[session_id as usize];
        let members: Vec<ClientId> = session.members().collect();

        if session.game_active {
            for member in members {
                self.send_to(member, Message::GameStarted { session_id }, out);
            }
            return;
        }

        self.clients[client_id as usize].ready = ready;
        for &member in &members {
            self.send_to(
                member,
                Message::InformClientReady {
                    session_id,
                    client_id,
                    ready,
                },
                out,
            );
        }

        let session = &self.sessions[session_id as usize];
        let (Some(main), Some(secondary)) = (session.main, session.secondary) else {
            return;
        };
        if !(self.clients[main as usize].ready && self.clients[secondary as usize].ready) {
            return;
        }

        self.sessions[session_id as usize].game_active = true;
        self.clients[main as usize].score = 0;
        self.clients[secondary as usize].score = 0;

        info!("Session {} started a game", session_id);
        for member in [main, secondary] {
            self.send_to(member, Message::GameStarted { session_id }, out);
        }
    }

    fn set_ball_pos(
        &mut self,
        client_id: ClientId,
        position: Vector2,
        direction: Vector2,
        out: &mut Vec<Reply>,
    ) {
        let Some(session_id) = self.live_client(client_id).and_then(|c| c.session) else {
            return;
        };

        let session = &mut self.sessions[session_id as usize];
        if !session.game_active || session.main != Some(client_id) {
            return;
        }

        session.ball_position = position;
        session.ball_direction = direction;

        if let Some(secondary) = session.secondary {
            self.send_to(
                secondary,
                Message::InformBallPos {
                    position,
                    direction,
                },
                out,
            );
        }
    }

    fn set_player_pos(
        &mut self,
        client_id: ClientId,
        position: Vector2,
        direction: Vector2,
        out: &mut Vec<Reply>,
    ) {
        let Some(client) = self.live_client_mut(client_id) else {
            return;
        };
        let Some(session_id) = client.session else {
            return;
        };

        client.position = position;
        client.direction = direction;

        if let Some(partner) = self.sessions[session_id as usize].partner_of(client_id) {
            self.send_to(
                partner,
                Message::InformPlayerPos {
                    client_id,
                    position,
                    direction,
                },
                out,
            );
        }
    }

    fn point_scored(&mut self, session_id: SessionId, client_id: ClientId, out: &mut Vec<Reply>) {
        let Some(session) = self.live_session(session_id) else {
            return;
        };
        if !session.game_active || session.role_of(client_id).is_none() {
            return;
        }
        let (Some(main), Some(secondary)) = (session.main, session.secondary) else {
            return;
        };

        self.clients[client_id as usize].score += 1;
        let main_score = self.clients[main as usize].score;
        let secondary_score = self.clients[secondary as usize].score;

        if main_score >= self.winning_score || secondary_score >= self.winning_score {
            self.sessions[session_id as usize].game_active = false;
            self.clients[main as usize].ready = false;
            self.clients[secondary as usize].ready = false;

            info!(
                "Client {} won session {} ({}:{})",
                client_id, session_id, main_score, secondary_score
            );
            for member in [main, secondary] {
                self.send_to(
                    member,
                    Message::InformWon {
                        session_id,
                        client_id,
                    },
                    out,
                );
            }
        } else {
            self.send_to(
                secondary,
                Message::InformPointScored {
                    session_id,
                    main_score,
                    secondary_score,
                    client_id,
                },
                out,
            );
        }
    }

    fn im_alive(&mut self, addr: SocketAddr, now: Instant, out: &mut Vec<Reply>) {
        match self.find_by_addr(addr) {
            Some(client_id) => self.clients[client_id as usize].touch(now),
            None => out.push(Reply::new(addr, Message::Disconnected)),
        }
    }

    fn send_to(&self, client_id: ClientId, message: Message, out: &mut Vec<Reply>) {
        if let Some(addr) = self.client(client_id).and_then(|c| c.addr) {
            out.push(Reply::new(addr, message));
        }
    }

    fn find_by_addr(&self, addr: SocketAddr) -> Option<ClientId> {
        self.clients
            .iter()
            .find(|c| c.is_in_use() && c.addr == Some(addr))
            .map(|c| c.id)
    }

    fn live_client(&self, client_id: ClientId) -> Option<&Client> {
        self.client(client_id).filter(|c| c.is_in_use())
    }

    fn live_client_mut(&mut self, client_id: ClientId) -> Option<&mut Client> {
        self.clients
            .get_mut(client_id as usize)
            .filter(|c| c.is_in_use())
    }

    fn live_session(&self, session_id: SessionId) -> Option<&Session> {
        self.session(session_id).filter(|s| s.is_in_use())
    }

    /// Checks the cross-reference rules between clients and sessions.
    pub fn invariants_hold(&self) -> bool {
        let sessions_ok = self.sessions.iter().all(|session| {
            if !session.is_in_use() {
                return session.main.is_none()
                    && session.secondary.is_none()
                    && !session.game_active;
            }
            if session.main.is_none() {
                return false;
            }
            let members_agree = session.members().all(|member| {
                self.live_client(member)
                    .is_some_and(|c| c.session == Some(session.id))
            });
            let game_ok = !session.game_active
                || (session.secondary.is_some()
                    && session.members().all(|m| self.clients[m as usize].ready));
            members_agree && game_ok
        });

        let clients_ok = self.clients.iter().all(|client| {
            if !client.is_in_use() {
                return !client.pending_eviction && client.session.is_none();
            }
            client.session.map_or(true, |session_id| {
                self.live_session(session_id)
                    .is_some_and(|s| s.role_of(client.id).is_some())
            })
        });

        sessions_ok && clients_ok
    }
}

/// Answers a request naming a client id the sender does not hold.
///
/// Only the replies a non-member would get are sent; no state changes.
fn refuse_foreign(
    message: &Message,
    client_id: ClientId,
    addr: SocketAddr,
    out: &mut Vec<Reply>,
) {
    match *message {
        Message::AssignToSession { session_id, .. } => {
            out.push(Reply::new(addr, Message::CouldNotAssignToSession { session_id }));
        }
        Message::DisconnectFromSession { session_id, .. } => out.push(Reply::new(
            addr,
            Message::SessionDisconnectStatus {
                session_id,
                client_id,
                success: true,
            },
        )),
        _ => debug!(
            "Ignoring {:?} for client {} from {}: not its endpoint",
            message.packet_type(),
            client_id,
            addr
        ),
    }
}

/// Client id named by a request, if it names one.
fn requester(message: &Message) -> Option<ClientId> {
    match *message {
        Message::Disconnect { client_id }
        | Message::CreateSession { client_id }
        | Message::AssignToSession { client_id, .. }
        | Message::DisconnectFromSession { client_id, .. }
        | Message::SetReady { client_id, .. }
        | Message::SetBallPos { client_id, .. }
        | Message::SetPlayerPos { client_id, .. }
        | Message::PointScored { client_id, .. } => Some(client_id),
        _ => None,
    }
}
