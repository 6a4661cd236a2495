//! UDP transport and the server's cooperative main loop.
//!
//! One task owns the socket, the registry and the game; there is no other
//! writer. The loop alternates between two phases: in the lobby it blocks on
//! the socket until the readiness predicate holds, and during a round it
//! waits on the socket only until the next turn deadline, so client input is
//! ingested with at most one turn of latency while the simulation keeps a
//! fixed rate. The event log stays single-writer by construction; do not
//! spawn helpers that touch it.

use crate::config::Options;
use crate::game::Game;
use crate::registry::{ClientId, Ingest, Registry};
use log::{debug, info, warn};
use shared::{ClientMessage, DatagramBuilder, Event};
use socket2::{Domain, Protocol, Socket, Type};
use std::io;
use std::net::{Ipv6Addr, SocketAddr, SocketAddrV6};
use std::time::{Duration, Instant};
use tokio::net::UdpSocket;
use tokio::time::{timeout_at, Instant as TokioInstant};

/// Client messages are at most 33 bytes; the headroom only exists so that
/// oversized datagrams arrive intact and fail decoding instead of being
/// silently truncated to a valid length.
const RECV_BUFFER_SIZE: usize = 64;

pub struct Server {
    socket: UdpSocket,
    registry: Registry,
    game: Game,
    turn_duration: Duration,
}

impl Server {
    /// Binds the dual-stack socket and assembles the server. IPv4 clients
    /// reach the IPv6 socket via mapped addresses, so one socket serves both
    /// stacks; `IPV6_V6ONLY` must be cleared before bind, hence `socket2`.
    pub async fn bind(options: &Options) -> io::Result<Server> {
        let socket = Socket::new(Domain::IPV6, Type::DGRAM, Some(Protocol::UDP))?;
        socket.set_only_v6(false)?;
        socket.set_reuse_address(true)?;
        let bind_addr = SocketAddrV6::new(Ipv6Addr::UNSPECIFIED, options.port, 0, 0);
        socket.bind(&bind_addr.into())?;
        socket.set_nonblocking(true)?;
        let socket = UdpSocket::from_std(socket.into())?;

        info!("listening on {}", socket.local_addr()?);
        info!(
            "board {}x{}, {} turns/sec, turning speed {}, seed {}",
            options.width, options.height, options.rounds_per_sec, options.turning_speed,
            options.seed
        );
        Ok(Server {
            socket,
            registry: Registry::new(),
            game: Game::new(options),
            turn_duration: Duration::from_millis(options.turn_duration_ms().max(1)),
        })
    }

    pub fn local_addr(&self) -> io::Result<SocketAddr> {
        self.socket.local_addr()
    }

    /// Runs the lobby/round loop forever. Per-datagram send and receive
    /// failures are logged and survived; only socket setup can fail fatally,
    /// and that happens in [`Server::bind`].
    pub async fn run(&mut self) -> io::Result<()> {
        let mut buf = [0u8; RECV_BUFFER_SIZE];
        loop {
            // Lobby: nothing to simulate, so block on the socket without a
            // deadline until enough players are ready.
            while !self.registry.round_ready() {
                let received = self.socket.recv_from(&mut buf).await;
                match received {
                    Ok((len, addr)) => self.handle_datagram(&buf[..len], addr).await,
                    Err(e) => warn!("recv failed: {}", e),
                }
            }

            self.game.start(&mut self.registry);
            self.broadcast_from(0).await;

            // Round: ingest until each turn deadline, then step and
            // broadcast the new log suffix.
            let mut deadline = TokioInstant::now() + self.turn_duration;
            while self.game.in_progress() {
                let received = timeout_at(deadline, self.socket.recv_from(&mut buf)).await;
                match received {
                    Ok(Ok((len, addr))) => self.handle_datagram(&buf[..len], addr).await,
                    Ok(Err(e)) => warn!("recv failed: {}", e),
                    Err(_deadline_hit) => {
                        let first = self.game.process_turn(&mut self.registry);
                        self.broadcast_from(first).await;
                        deadline += self.turn_duration;
                    }
                }
            }
        }
    }

    /// Decodes and ingests one datagram, replaying history to the sender
    /// when the registry accepted it and the log reaches its cursor.
    async fn handle_datagram(&mut self, data: &[u8], addr: SocketAddr) {
        let message = match ClientMessage::decode(data) {
            Ok(message) => message,
            Err(e) => {
                debug!("dropping {} bytes from {}: {}", data.len(), addr, e);
                return;
            }
        };
        let endpoint = ClientId::from_addr(addr);
        match self.registry.ingest(endpoint, &message, Instant::now()) {
            Ingest::Accepted { replay_from } => {
                let events = self.game.events_from(replay_from);
                if events.is_empty() {
                    return;
                }
                let datagrams = build_datagrams(self.game.game_id(), replay_from, events);
                self.send_all(&datagrams, endpoint).await;
            }
            Ingest::Created | Ingest::Dropped => {}
        }
    }

    /// Broadcasts the log suffix starting at `first` to every endpoint the
    /// registry knows, participants and observers alike.
    async fn broadcast_from(&mut self, first: usize) {
        let events = self.game.events_from(first as u32);
        if events.is_empty() {
            return;
        }
        let datagrams = build_datagrams(self.game.game_id(), first as u32, events);
        let targets: Vec<ClientId> = self.registry.endpoints().collect();
        for endpoint in targets {
            self.send_all(&datagrams, endpoint).await;
        }
    }

    /// A failed send skips that peer for this batch and never fails the
    /// server.
    async fn send_all(&self, datagrams: &[Vec<u8>], endpoint: ClientId) {
        for datagram in datagrams {
            if let Err(e) = self.socket.send_to(datagram, endpoint.socket_addr()).await {
                warn!("send to {} failed: {}", endpoint, e);
                return;
            }
        }
    }
}

/// Packs `events`, numbered from `first_no`, into broadcast datagrams.
fn build_datagrams(game_id: u32, first_no: u32, events: &[Event]) -> Vec<Vec<u8>> {
    let mut builder = DatagramBuilder::new(game_id);
    for (offset, event) in events.iter().enumerate() {
        if let Err(e) = builder.push(first_no + offset as u32, event) {
            // No event within protocol limits can overflow an empty datagram.
            warn!("dropping unpackable event {}: {}", first_no + offset as u32, e);
        }
    }
    builder.finish()
}
