//! Authoritative session state shared by every connection task
//!
//! One mutex guards the merged state mapping, the participant roster and the
//! connection registry. Every mutation happens inside a single lock scope, so
//! a broadcast never observes a half-applied action. The lock is never held
//! across socket I/O.

use crate::client_manager::{Client, ClientManager, FrameWriter};
use log::{debug, info, warn};
use serde_json::Value;
use shared::{lock_unpoisoned, PlayerEntry, StateMap, HOST_ID};
use std::net::SocketAddr;
use std::sync::{Arc, Mutex, MutexGuard};

const PLAYERS_KEY: &str = "players";
const READY_KEY: &str = "ready";
const SETUP_COMPLETE_KEY: &str = "setup_complete";
const GAME_STARTED_KEY: &str = "game_started";

pub const HOST_NAME: &str = "Host";

/// Result of accepting a connection into the session
#[derive(Debug)]
pub struct Registration {
    pub client: Arc<Client>,
    /// Number of live connections right after this one was added
    pub active_connections: usize,
}

/// Side effects of a merged action the caller must act on
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct MergeOutcome {
    /// The host set `game_started` to true in this action
    pub host_started_game: bool,
}

#[derive(Debug, Default)]
struct Session {
    state: StateMap,
    roster: Vec<PlayerEntry>,
    clients: ClientManager,
    /// Bumped on every change to the mapping or roster
    version: u64,
}

impl Session {
    fn game_started(&self) -> bool {
        self.state
            .get(GAME_STARTED_KEY)
            .and_then(Value::as_bool)
            .unwrap_or(false)
    }

    fn roster_entry(&mut self, id: u32) -> &mut PlayerEntry {
        if let Some(index) = self.roster.iter().position(|p| p.id == id) {
            return &mut self.roster[index];
        }
        info!("Adding participant {} to the roster", id);
        self.roster.push(PlayerEntry {
            id,
            name: format!("Player {}", id),
            ready: false,
        });
        let last = self.roster.len() - 1;
        &mut self.roster[last]
    }

    fn register_participant(&mut self, id: u32) {
        if id == HOST_ID && !self.roster.iter().any(|p| p.id == id) {
            self.roster.push(PlayerEntry {
                id,
                name: HOST_NAME.to_string(),
                ready: false,
            });
        }
    }
}

#[derive(Debug, Default)]
pub struct SessionStore {
    inner: Mutex<Session>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Session> {
        lock_unpoisoned(&self.inner)
    }

    /// Assigns the next participant id to a new connection, registers it and
    /// reports how many connections are live, all in one lock scope.
    pub fn accept_connection(&self, addr: SocketAddr, writer: FrameWriter) -> Registration {
        let mut session = self.lock();
        let client = session.clients.add_client(addr, writer);
        session.register_participant(client.id);
        session.version += 1;
        Registration {
            active_connections: session.clients.len(),
            client,
        }
    }

    /// Adds the host to the roster. Other participants only appear once they
    /// report `ready` or `setup_complete`.
    pub fn register_participant(&self, id: u32) {
        self.lock().register_participant(id);
    }

    /// Merges an action fragment into the session, last writer wins.
    ///
    /// A few keys are interpreted before the shallow merge:
    /// - `players` is dropped; the roster is owned by the server
    /// - `game_started` is only accepted from the host
    /// - `ready` updates the sender's roster entry while the game has not
    ///   started and the sender is still connected
    /// - a true `setup_complete` marks the sender ready
    pub fn merge_action(&self, participant_id: u32, mut fragment: StateMap) -> MergeOutcome {
        let mut outcome = MergeOutcome::default();
        let mut session = self.lock();
        session.version += 1;

        if fragment.remove(PLAYERS_KEY).is_some() {
            debug!("Ignoring roster override from participant {}", participant_id);
        }

        if let Some(started) = fragment.remove(GAME_STARTED_KEY) {
            if participant_id == HOST_ID {
                outcome.host_started_game = started.as_bool().unwrap_or(false);
                if outcome.host_started_game {
                    info!("Host started the game");
                }
                session.state.insert(GAME_STARTED_KEY.to_string(), started);
            } else {
                warn!(
                    "Participant {} is not the host, ignoring game_started",
                    participant_id
                );
            }
        }

        if let Some(ready) = fragment.get(READY_KEY).map(|v| v.as_bool().unwrap_or(false)) {
            if session.game_started() {
                debug!(
                    "Ignoring ready flag from participant {}: game already started",
                    participant_id
                );
            } else if session.clients.contains(participant_id) {
                session.roster_entry(participant_id).ready = ready;
            } else {
                warn!(
                    "Ignoring ready flag from disconnected participant {}",
                    participant_id
                );
            }
        }

        let setup_complete = fragment
            .get(SETUP_COMPLETE_KEY)
            .and_then(Value::as_bool)
            .unwrap_or(false);
        if setup_complete {
            session.roster_entry(participant_id).ready = true;
        }

        for (key, value) in fragment {
            session.state.insert(key, value);
        }

        outcome
    }

    /// Current authoritative state, roster included under `players`
    pub fn snapshot(&self) -> StateMap {
        self.versioned_snapshot().1
    }

    /// Snapshot plus the store version it was taken at, read in one lock
    /// scope. Later snapshots always carry a version at least as high.
    pub fn versioned_snapshot(&self) -> (u64, StateMap) {
        let session = self.lock();
        let mut state = session.state.clone();
        let roster = session
            .roster
            .iter()
            .map(|p| serde_json::json!({"id": p.id, "name": p.name, "ready": p.ready}))
            .collect();
        state.insert(PLAYERS_KEY.to_string(), Value::Array(roster));
        (session.version, state)
    }

    pub fn roster(&self) -> Vec<PlayerEntry> {
        self.lock().roster.clone()
    }

    pub fn is_game_started(&self) -> bool {
        self.lock().game_started()
    }

    pub fn remove_connection(&self, id: u32) -> bool {
        self.lock().clients.remove_client(id)
    }

    /// Point-in-time copy of the live connections
    pub fn connections(&self) -> Vec<Arc<Client>> {
        self.lock().clients.get_clients()
    }

    pub fn connection_count(&self) -> usize {
        self.lock().clients.len()
    }

    pub fn drain_connections(&self) -> Vec<Arc<Client>> {
        self.lock().clients.drain()
    }
}
