//! Client session management: who is known, who is waiting, who went quiet.
//!
//! The registry owns every session keyed by its network endpoint. It ingests
//! decoded client messages, enforces the session-id and name policies,
//! tracks activity for the 2-second silence disconnect, and exposes the
//! waiting set from which round control snapshots its participants.
//!
//! All policy violations (stale session id, name collision, name mismatch,
//! out-of-range direction) drop the datagram silently: the server never
//! replies with an error and never punishes an endpoint for garbage input.

use crate::entity::Bug;
use log::{debug, info};
use shared::{ClientMessage, TurnDirection};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::net::{IpAddr, SocketAddr, SocketAddrV6};
use std::time::{Duration, Instant};

/// A session is disconnected once it has been silent for this long.
pub const DISCONNECT_TIMEOUT: Duration = Duration::from_millis(2000);

/// Endpoint identity of a client: IPv6 address plus UDP port. IPv4 peers are
/// stored as IPv4-mapped IPv6 addresses so one key type covers both stacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ClientId {
    address: std::net::Ipv6Addr,
    port: u16,
}

impl ClientId {
    pub fn from_addr(addr: SocketAddr) -> Self {
        let address = match addr.ip() {
            IpAddr::V4(v4) => v4.to_ipv6_mapped(),
            IpAddr::V6(v6) => v6,
        };
        ClientId {
            address,
            port: addr.port(),
        }
    }

    /// The address to send datagrams back to.
    pub fn socket_addr(&self) -> SocketAddr {
        SocketAddr::V6(SocketAddrV6::new(self.address, self.port, 0, 0))
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.socket_addr())
    }
}

/// Lifecycle state of a session.
///
/// `Waiting` and `Ready` are the lobby states; `Ready` additionally means the
/// client has pressed a turn key since entering the lobby. `Observing` is a
/// session with an empty name: it receives every broadcast but never plays.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Waiting,
    Ready,
    Playing,
    Observing,
    Eliminated,
    Disconnected,
}

/// Everything the server knows about one endpoint.
#[derive(Debug)]
pub struct Session {
    pub session_id: u64,
    pub name: String,
    pub state: SessionState,
    pub last_key: TurnDirection,
    pub last_seen: Instant,
    /// Present while this session's avatar is on the board.
    pub bug: Option<Bug>,
}

impl Session {
    fn new(session_id: u64, name: String, last_key: TurnDirection, now: Instant) -> Self {
        let state = if name.is_empty() {
            SessionState::Observing
        } else {
            SessionState::Waiting
        };
        Session {
            session_id,
            name,
            state,
            last_key,
            last_seen: now,
            bug: None,
        }
    }

    fn is_quiet(&self, now: Instant) -> bool {
        now.duration_since(self.last_seen) >= DISCONNECT_TIMEOUT
    }

    /// The lobby-side ready trigger: a waiting player that has steered at
    /// least once is ready to start.
    fn note_key(&mut self, key: TurnDirection) {
        self.last_key = key;
        if self.state == SessionState::Waiting && key != TurnDirection::Straight {
            self.state = SessionState::Ready;
        }
    }

    fn in_lobby(&self) -> bool {
        matches!(self.state, SessionState::Waiting | SessionState::Ready)
    }
}

/// What the registry did with an ingested datagram.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ingest {
    /// A fresh session was created; the first datagram gets no replay.
    Created,
    /// The datagram was accepted on an existing session; any logged events
    /// numbered at or past `replay_from` should be replayed to the sender.
    Accepted { replay_from: u32 },
    /// The datagram was silently dropped.
    Dropped,
}

/// The session registry.
pub struct Registry {
    sessions: HashMap<ClientId, Session>,
    /// FIFO of endpoints ordered by last activity; refreshed entries are
    /// removed and re-appended so the front is always the quietest.
    activity: VecDeque<ClientId>,
    /// Lobby membership in order of first entry; states are authoritative,
    /// so entries whose session left the lobby are filtered on read.
    waiting: Vec<ClientId>,
}

impl Registry {
    pub fn new() -> Self {
        Registry {
            sessions: HashMap::new(),
            activity: VecDeque::new(),
            waiting: Vec::new(),
        }
    }

    /// Processes one decoded client message from `endpoint`.
    ///
    /// Always sweeps for silent sessions first, then applies the session-id
    /// ladder: smaller is dropped, larger reconnects the endpoint in place,
    /// equal refreshes the steering intent (after a byte-exact name check).
    pub fn ingest(&mut self, endpoint: ClientId, message: &ClientMessage, now: Instant) -> Ingest {
        self.sweep(now);

        let Some(key) = TurnDirection::from_wire(message.turn_direction) else {
            debug!(
                "dropping datagram from {}: turn direction {} out of range",
                endpoint, message.turn_direction
            );
            return Ingest::Dropped;
        };

        let stored_id = match self.sessions.get(&endpoint) {
            Some(session) => session.session_id,
            None => return self.register(endpoint, message, key, now),
        };
        self.touch(endpoint, now);

        if message.session_id < stored_id {
            debug!(
                "dropping datagram from {}: stale session id {} (current {})",
                endpoint, message.session_id, stored_id
            );
            return Ingest::Dropped;
        }
        if message.session_id > stored_id {
            return self.reconnect(endpoint, message, key);
        }
        self.refresh(endpoint, message, key)
    }

    /// First datagram from an unknown endpoint.
    fn register(
        &mut self,
        endpoint: ClientId,
        message: &ClientMessage,
        key: TurnDirection,
        now: Instant,
    ) -> Ingest {
        if !message.player_name.is_empty() && self.name_in_use(&message.player_name, None) {
            debug!(
                "dropping datagram from {}: name {:?} already in use",
                endpoint, message.player_name
            );
            return Ingest::Dropped;
        }
        let mut session = Session::new(message.session_id, message.player_name.clone(), key, now);
        session.note_key(key);
        info!(
            "{} joined as {:?} ({:?})",
            endpoint, session.name, session.state
        );
        if session.in_lobby() {
            self.waiting.push(endpoint);
        }
        self.sessions.insert(endpoint, session);
        self.activity.push_back(endpoint);
        Ingest::Created
    }

    /// A larger session id replaces name and intent in place; the endpoint
    /// slot and any on-board avatar are preserved.
    fn reconnect(&mut self, endpoint: ClientId, message: &ClientMessage, key: TurnDirection) -> Ingest {
        if !message.player_name.is_empty()
            && self.name_in_use(&message.player_name, Some(endpoint))
        {
            debug!(
                "dropping reconnect from {}: name {:?} already in use",
                endpoint, message.player_name
            );
            return Ingest::Dropped;
        }
        let Some(session) = self.sessions.get_mut(&endpoint) else {
            return Ingest::Dropped;
        };
        let old_state = session.state;
        session.session_id = message.session_id;
        session.name = message.player_name.clone();
        session.state = if message.player_name.is_empty() {
            SessionState::Observing
        } else if old_state == SessionState::Ready {
            SessionState::Ready
        } else {
            SessionState::Waiting
        };
        session.note_key(key);
        let in_lobby = session.in_lobby();
        info!(
            "{} reconnected as {:?} (session {})",
            endpoint, session.name, message.session_id
        );
        match old_state {
            SessionState::Waiting | SessionState::Ready => {
                if !in_lobby {
                    self.waiting.retain(|e| *e != endpoint);
                }
            }
            _ => {
                if in_lobby {
                    self.waiting.push(endpoint);
                }
            }
        }
        Ingest::Accepted {
            replay_from: message.next_expected_event_no,
        }
    }

    /// Equal session id: the routine steering update.
    fn refresh(&mut self, endpoint: ClientId, message: &ClientMessage, key: TurnDirection) -> Ingest {
        let Some(session) = self.sessions.get_mut(&endpoint) else {
            return Ingest::Dropped;
        };
        if session.name.as_bytes() != message.player_name.as_bytes() {
            debug!(
                "dropping datagram from {}: name {:?} does not match {:?}",
                endpoint, message.player_name, session.name
            );
            return Ingest::Dropped;
        }
        session.note_key(key);
        Ingest::Accepted {
            replay_from: message.next_expected_event_no,
        }
    }

    /// Marks sessions disconnected while the quietest endpoint has been
    /// silent for [`DISCONNECT_TIMEOUT`]. Disconnection is monotone: only a
    /// reconnect with a strictly greater session id brings an endpoint back.
    pub fn sweep(&mut self, now: Instant) {
        while let Some(&oldest) = self.activity.front() {
            let stale = match self.sessions.get(&oldest) {
                Some(session) => session.is_quiet(now),
                None => true,
            };
            if !stale {
                break;
            }
            self.activity.pop_front();
            self.waiting.retain(|e| *e != oldest);
            if let Some(session) = self.sessions.get_mut(&oldest) {
                if session.state != SessionState::Disconnected {
                    info!("{} ({:?}) disconnected: silent for 2s", oldest, session.name);
                    session.state = SessionState::Disconnected;
                }
            }
        }
    }

    /// Refreshes the activity timestamp and requeues the endpoint at the back.
    fn touch(&mut self, endpoint: ClientId, now: Instant) {
        if let Some(session) = self.sessions.get_mut(&endpoint) {
            session.last_seen = now;
        }
        if let Some(pos) = self.activity.iter().position(|e| *e == endpoint) {
            self.activity.remove(pos);
        }
        self.activity.push_back(endpoint);
    }

    fn name_in_use(&self, name: &str, exclude: Option<ClientId>) -> bool {
        self.sessions.iter().any(|(endpoint, session)| {
            Some(*endpoint) != exclude
                && session.state != SessionState::Disconnected
                && session.name == name
        })
    }

    /// A round may start when at least two sessions wait and every one of
    /// them has signalled readiness by steering.
    pub fn round_ready(&self) -> bool {
        let mut waiting = 0usize;
        let mut ready = 0usize;
        for endpoint in &self.waiting {
            match self.sessions.get(endpoint).map(|s| s.state) {
                Some(SessionState::Waiting) => waiting += 1,
                Some(SessionState::Ready) => {
                    waiting += 1;
                    ready += 1;
                }
                _ => {}
            }
        }
        waiting >= 2 && ready == waiting
    }

    /// Snapshots up to `limit` lobby sessions, in order of first entry, and
    /// marks them as playing. Anyone over the limit stays for the next round.
    pub fn take_waiting(&mut self, limit: usize) -> Vec<ClientId> {
        let mut taken = Vec::new();
        let mut rest = Vec::new();
        for endpoint in std::mem::take(&mut self.waiting) {
            let eligible = self
                .sessions
                .get(&endpoint)
                .map(|s| s.in_lobby())
                .unwrap_or(false);
            if eligible && taken.len() < limit {
                if let Some(session) = self.sessions.get_mut(&endpoint) {
                    session.state = SessionState::Playing;
                }
                taken.push(endpoint);
            } else if eligible {
                rest.push(endpoint);
            }
        }
        self.waiting = rest;
        taken
    }

    /// Drops sessions that are disconnected, freeing their endpoints and
    /// names. Called between rounds; mid-round entries must survive so a
    /// participant's slot is never reused while its index is live.
    pub fn purge_disconnected(&mut self) {
        self.sessions
            .retain(|_, session| session.state != SessionState::Disconnected);
        let sessions = &self.sessions;
        self.activity.retain(|e| sessions.contains_key(e));
        self.waiting.retain(|e| sessions.contains_key(e));
    }

    /// Every endpoint the registry knows; the broadcast target set.
    pub fn endpoints(&self) -> impl Iterator<Item = ClientId> + '_ {
        self.sessions.keys().copied()
    }

    pub fn session(&self, endpoint: &ClientId) -> Option<&Session> {
        self.sessions.get(endpoint)
    }

    pub fn session_mut(&mut self, endpoint: &ClientId) -> Option<&mut Session> {
        self.sessions.get_mut(endpoint)
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}
