//! Round control: the board, the event log, and the per-turn simulation.
//!
//! One `Game` lives for the whole process. Between rounds it is idle; a call
//! to [`Game::start`] snapshots the lobby into a participant vector, seeds
//! the avatars from the deterministic generator, and opens a fresh event
//! log. Each call to [`Game::process_turn`] advances every live avatar once
//! and appends the resulting facts to the log. The log is the single source
//! of truth: broadcasts and history replay both read it by index.

use crate::config::Options;
use crate::entity::Bug;
use crate::registry::{ClientId, Registry, SessionState};
use crate::rng::Rng;
use log::info;
use shared::{Event, MAX_PLAYERS};

/// The occupancy grid. A cell is painted at most once per round.
struct Board {
    width: u16,
    height: u16,
    cells: Vec<bool>,
}

impl Board {
    fn new(width: u16, height: u16) -> Self {
        Board {
            width,
            height,
            cells: vec![false; width as usize * height as usize],
        }
    }

    fn in_bounds(&self, (x, y): (i32, i32)) -> bool {
        x >= 0 && y >= 0 && x < self.width as i32 && y < self.height as i32
    }

    /// Callers check `in_bounds` first.
    fn painted(&self, (x, y): (i32, i32)) -> bool {
        self.cells[y as usize * self.width as usize + x as usize]
    }

    fn paint(&mut self, (x, y): (i32, i32)) {
        self.cells[y as usize * self.width as usize + x as usize] = true;
    }
}

/// One slot of the round's participant vector. The index in this vector is
/// the player number carried by every PIXEL and PLAYER_ELIMINATED event, so
/// slots are never removed or reordered while the round runs; a session
/// that disconnects or reconnects mid-round still occupies its slot.
struct Participant {
    endpoint: ClientId,
    eliminated: bool,
}

pub struct Game {
    width: u16,
    height: u16,
    turning_speed: u16,
    rng: Rng,
    board: Board,
    participants: Vec<Participant>,
    events: Vec<Event>,
    game_id: u32,
    in_progress: bool,
    still_playing: usize,
}

impl Game {
    pub fn new(options: &Options) -> Self {
        Game {
            width: options.width,
            height: options.height,
            turning_speed: options.turning_speed,
            rng: Rng::new(options.seed),
            board: Board::new(options.width, options.height),
            participants: Vec::new(),
            events: Vec::new(),
            game_id: 0,
            in_progress: false,
            still_playing: 0,
        }
    }

    pub fn in_progress(&self) -> bool {
        self.in_progress
    }

    /// Round id prefixed to every broadcast datagram.
    pub fn game_id(&self) -> u32 {
        self.game_id
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    /// The log suffix from `cursor` to the tail; empty when the log has no
    /// event numbered `cursor` yet. This is the replay source: asking twice
    /// for the same cursor yields the same events.
    pub fn events_from(&self, cursor: u32) -> &[Event] {
        let start = cursor as usize;
        if start >= self.events.len() {
            &[]
        } else {
            &self.events[start..]
        }
    }

    /// Starts a round from the current lobby.
    ///
    /// The generator is consumed in a fixed order (round id first, then
    /// x, y and heading for each participant in ascending name order), so a
    /// seed fully determines the initial log. The board and log are fresh;
    /// the previous round's history is discarded here and not before.
    pub fn start(&mut self, registry: &mut Registry) {
        registry.purge_disconnected();
        let mut snapshot = registry.take_waiting(MAX_PLAYERS);
        snapshot.sort_by(|a, b| {
            let name_a = registry.session(a).map(|s| s.name.as_str()).unwrap_or("");
            let name_b = registry.session(b).map(|s| s.name.as_str()).unwrap_or("");
            name_a.cmp(name_b)
        });

        self.game_id = self.rng.next();
        self.board = Board::new(self.width, self.height);
        self.events.clear();
        self.still_playing = snapshot.len();
        self.in_progress = true;

        let mut names = Vec::with_capacity(snapshot.len());
        for endpoint in &snapshot {
            let x = (self.rng.next() % self.width as u32) as f64 + 0.5;
            let y = (self.rng.next() % self.height as u32) as f64 + 0.5;
            let heading = (self.rng.next() % 360) as i32;
            if let Some(session) = registry.session_mut(endpoint) {
                session.bug = Some(Bug { x, y, heading });
                names.push(session.name.clone());
            }
        }
        info!(
            "round {:#010x} started with players {:?}",
            self.game_id, names
        );
        self.participants = snapshot
            .into_iter()
            .map(|endpoint| Participant {
                endpoint,
                eliminated: false,
            })
            .collect();
        self.events.push(Event::NewGame {
            width: self.width as u32,
            height: self.height as u32,
            names,
        });

        for index in 0..self.participants.len() {
            let endpoint = self.participants[index].endpoint;
            let cell = registry
                .session(&endpoint)
                .and_then(|s| s.bug.as_ref())
                .map(Bug::cell);
            if let Some(cell) = cell {
                self.occupy(index, cell, registry);
            }
        }
    }

    /// Advances every live avatar one turn in participant order and returns
    /// the index of the first event appended, which is the suffix to
    /// broadcast.
    ///
    /// A slot is skipped when its player was eliminated or its session is
    /// disconnected; a skipped avatar neither moves nor paints. An avatar
    /// that stays within its current cell emits nothing.
    pub fn process_turn(&mut self, registry: &mut Registry) -> usize {
        let first = self.events.len();
        for index in 0..self.participants.len() {
            if !self.in_progress {
                break;
            }
            if self.participants[index].eliminated {
                continue;
            }
            let endpoint = self.participants[index].endpoint;
            let entered = match registry.session_mut(&endpoint) {
                Some(session) if session.state != SessionState::Disconnected => {
                    let key = session.last_key;
                    match session.bug.as_mut() {
                        Some(bug) => {
                            let before = bug.cell();
                            bug.advance(key, self.turning_speed);
                            let after = bug.cell();
                            (before != after).then_some(after)
                        }
                        None => None,
                    }
                }
                _ => None,
            };
            if let Some(cell) = entered {
                self.occupy(index, cell, registry);
            }
        }
        first
    }

    /// A live avatar entered `cell`: paint it, or eliminate the player when
    /// the cell is off the board or already painted. The painted cell is
    /// left untouched on a collision.
    fn occupy(&mut self, index: usize, cell: (i32, i32), registry: &mut Registry) {
        if self.board.in_bounds(cell) && !self.board.painted(cell) {
            self.board.paint(cell);
            self.events.push(Event::Pixel {
                player: index as u8,
                x: cell.0 as u32,
                y: cell.1 as u32,
            });
        } else {
            self.eliminate(index, registry);
        }
    }

    fn eliminate(&mut self, index: usize, registry: &mut Registry) {
        self.events.push(Event::PlayerEliminated {
            player: index as u8,
        });
        self.participants[index].eliminated = true;
        self.still_playing -= 1;
        let endpoint = self.participants[index].endpoint;
        if let Some(session) = registry.session_mut(&endpoint) {
            info!("player {} ({:?}) eliminated", index, session.name);
            // A session that already reconnected into the lobby keeps its
            // lobby state; only an actively playing one is marked.
            if session.state == SessionState::Playing {
                session.state = SessionState::Eliminated;
            }
        }
        if self.still_playing == 1 {
            self.events.push(Event::GameOver);
            self.in_progress = false;
            info!("round {:#010x} over", self.game_id);
        }
    }
}
