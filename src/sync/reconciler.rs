//! Remote entity table maintenance from peer events

use std::collections::BTreeMap;

use tracing::{debug, info, trace};

use crate::game::engine::{SPAWN_X, SPAWN_Y};
use crate::game::entity::{Color, Player};

use super::channel::PeerHandler;
use super::protocol::{PeerPresence, PlayerMove};

/// Remote players show the default cursor range
pub const REMOTE_MAX_RANGE: i32 = 4;

/// When a remote entry may come into existence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CreationPolicy {
    /// Only presence sync creates entries; moves from unknown peers are dropped
    #[default]
    PresenceOnly,
    /// A move from an unknown peer creates the entry at the reported position
    LazyOnMove,
}

/// One remote participant
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteEntry {
    pub player: Player,
    /// Presence ref captured when the entry was created or last synced
    pub presence_ref: Option<String>,
    /// Whether the peer was in the latest presence sync
    pub online: bool,
}

/// Remote players keyed by id
#[derive(Debug, Clone, Default)]
pub struct RemoteEntityTable {
    entries: BTreeMap<String, RemoteEntry>,
}

impl RemoteEntityTable {
    pub fn get(&self, id: &str) -> Option<&RemoteEntry> {
        self.entries.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &RemoteEntry)> {
        self.entries.iter()
    }

    pub fn players(&self) -> impl Iterator<Item = &Player> {
        self.entries.values().map(|entry| &entry.player)
    }

    /// Players of peers present in the latest sync
    pub fn online_players(&self) -> impl Iterator<Item = &Player> {
        self.entries
            .values()
            .filter(|entry| entry.online)
            .map(|entry| &entry.player)
    }

    fn remove_by_ref(&mut self, presence_ref: &str) -> Option<RemoteEntry> {
        let id = self
            .entries
            .iter()
            .find(|(_, entry)| entry.presence_ref.as_deref() == Some(presence_ref))
            .map(|(id, _)| id.clone())?;
        self.entries.remove(&id)
    }

    /// Entries created from movement carry no ref until a sync names them
    fn remove_unreferenced(&mut self, id: &str) -> Option<RemoteEntry> {
        match self.entries.get(id) {
            Some(entry) if entry.presence_ref.is_none() => self.entries.remove(id),
            _ => None,
        }
    }
}

/// Applies peer events to the remote entity table
#[derive(Debug)]
pub struct Reconciler {
    local_id: String,
    table: RemoteEntityTable,
    policy: CreationPolicy,
}

impl Reconciler {
    pub fn new(local_id: impl Into<String>, policy: CreationPolicy) -> Self {
        Self {
            local_id: local_id.into(),
            table: RemoteEntityTable::default(),
            policy,
        }
    }

    pub fn table(&self) -> &RemoteEntityTable {
        &self.table
    }

    pub fn policy(&self) -> CreationPolicy {
        self.policy
    }

    fn spawn(&mut self, id: &str, x: i32, y: i32, presence_ref: Option<String>) {
        let player = Player::new(id, x, y, Color::Yellow, REMOTE_MAX_RANGE);
        info!(peer_id = id, x, y, "remote player added");
        self.table.entries.insert(
            id.to_string(),
            RemoteEntry {
                player,
                presence_ref,
                online: true,
            },
        );
    }
}

impl PeerHandler for Reconciler {
    fn on_move(&mut self, msg: PlayerMove) {
        if msg.id == self.local_id {
            return;
        }
        if let Some(entry) = self.table.entries.get_mut(&msg.id) {
            trace!(peer_id = %msg.id, x = msg.x, y = msg.y, "remote player moved");
            entry.player.x = msg.x;
            entry.player.y = msg.y;
            return;
        }
        match self.policy {
            CreationPolicy::LazyOnMove => self.spawn(&msg.id, msg.x, msg.y, None),
            CreationPolicy::PresenceOnly => {
                debug!(peer_id = %msg.id, "move from unknown peer ignored");
            }
        }
    }

    fn on_sync(&mut self, peers: &[PeerPresence]) {
        self.table.entries.retain(|id, entry| {
            let keep = entry.presence_ref.is_some() || peers.iter().any(|peer| &peer.id == id);
            if !keep {
                info!(peer_id = %id, "remote player without presence removed");
            }
            keep
        });
        for entry in self.table.entries.values_mut() {
            entry.online = false;
        }

        for peer in peers {
            if peer.id == self.local_id {
                continue;
            }
            match self.table.entries.get_mut(&peer.id) {
                Some(entry) => {
                    entry.online = true;
                    if entry.presence_ref.as_deref() != Some(peer.presence_ref.as_str()) {
                        debug!(peer_id = %peer.id, presence_ref = %peer.presence_ref, "presence ref updated");
                        entry.presence_ref = Some(peer.presence_ref.clone());
                    }
                }
                None => self.spawn(&peer.id, SPAWN_X, SPAWN_Y, Some(peer.presence_ref.clone())),
            }
        }
    }

    fn on_join(&mut self, peers: &[PeerPresence]) {
        for peer in peers {
            debug!(peer_id = %peer.id, online_at = %peer.online_at, "peer joined");
            if let Some(entry) = self.table.entries.get_mut(&peer.id) {
                entry.online = true;
            }
        }
    }

    fn on_leave(&mut self, peers: &[PeerPresence]) {
        for peer in peers {
            let removed = self
                .table
                .remove_by_ref(&peer.presence_ref)
                .or_else(|| self.table.remove_unreferenced(&peer.id));
            match removed {
                Some(entry) => info!(peer_id = %entry.player.id, "remote player removed"),
                None => debug!(
                    peer_id = %peer.id,
                    presence_ref = %peer.presence_ref,
                    "leave for untracked presence ignored"
                ),
            }
        }
    }
}
