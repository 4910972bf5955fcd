//! Peer presence tracking. Any datagram that carries a user id refreshes
//! the sender's entry; entries silent past the expiry are swept out.

use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::debug;

#[derive(Debug, Clone, PartialEq)]
pub struct Peer {
    pub user_id: String,
    pub username: String,
    pub last_seen: Instant,
}

pub struct PeerTable {
    self_id: String,
    expiry: Duration,
    peers: HashMap<String, Peer>,
}

impl PeerTable {
    pub fn new(self_id: impl Into<String>, expiry: Duration) -> Self {
        Self {
            self_id: self_id.into(),
            expiry,
            peers: HashMap::new(),
        }
    }

    /// Refresh (or insert) a peer. Observing ourselves is a no-op: a
    /// device hearing its own reflection must not list itself.
    pub fn observe(&mut self, user_id: &str, username: &str, now: Instant) {
        if user_id == self.self_id {
            return;
        }

        self.peers
            .entry(user_id.to_string())
            .and_modify(|peer| {
                peer.last_seen = now;
                if !username.is_empty() {
                    peer.username = username.to_string();
                }
            })
            .or_insert_with(|| Peer {
                user_id: user_id.to_string(),
                username: if username.is_empty() {
                    user_id.to_string()
                } else {
                    username.to_string()
                },
                last_seen: now,
            });
    }

    /// Copy of every non-expired peer, in no particular order.
    pub fn snapshot(&self, now: Instant) -> Vec<Peer> {
        self.peers
            .values()
            .filter(|peer| now.duration_since(peer.last_seen) <= self.expiry)
            .cloned()
            .collect()
    }

    /// Display name for a peer, falling back to the raw id.
    pub fn username_of(&self, user_id: &str) -> String {
        self.peers
            .get(user_id)
            .map(|peer| peer.username.clone())
            .unwrap_or_else(|| user_id.to_string())
    }

    /// Drop expired entries; returns the peers that went away.
    pub fn sweep(&mut self, now: Instant) -> Vec<Peer> {
        let expiry = self.expiry;
        let mut lost = Vec::new();

        self.peers.retain(|_, peer| {
            if now.duration_since(peer.last_seen) > expiry {
                lost.push(peer.clone());
                false
            } else {
                true
            }
        });

        for peer in &lost {
            debug!("peer {} ({}) expired", peer.user_id, peer.username);
        }
        lost
    }

    pub fn contains(&self, user_id: &str) -> bool {
        self.peers.contains_key(user_id)
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table(expiry_ms: u64) -> PeerTable {
        PeerTable::new("self-id", Duration::from_millis(expiry_ms))
    }

    #[test]
    fn test_observe_and_snapshot() {
        let mut peers = table(10_000);
        let t0 = Instant::now();

        peers.observe("a1b2c3d4e", "Alice", t0);
        let snapshot = peers.snapshot(t0);
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].user_id, "a1b2c3d4e");
        assert_eq!(snapshot[0].username, "Alice");
    }

    #[test]
    fn test_self_observation_is_noop() {
        let mut peers = table(10_000);
        peers.observe("self-id", "Me", Instant::now());
        assert!(peers.is_empty());
    }

    #[test]
    fn test_expiry_after_silence() {
        let mut peers = table(10_000);
        let t0 = Instant::now();

        peers.observe("a1b2c3d4e", "Alice", t0);

        // 11 s of silence: absent from snapshot and removed by sweep.
        let t1 = t0 + Duration::from_secs(11);
        assert!(peers.snapshot(t1).is_empty());

        let lost = peers.sweep(t1);
        assert_eq!(lost.len(), 1);
        assert_eq!(lost[0].user_id, "a1b2c3d4e");
        assert!(!peers.contains("a1b2c3d4e"));
    }

    #[test]
    fn test_refresh_defers_expiry() {
        let mut peers = table(10_000);
        let t0 = Instant::now();

        peers.observe("a1b2c3d4e", "Alice", t0);
        peers.observe("a1b2c3d4e", "Alice", t0 + Duration::from_secs(8));

        let t1 = t0 + Duration::from_secs(15);
        assert_eq!(peers.snapshot(t1).len(), 1);
        assert!(peers.sweep(t1).is_empty());
    }

    #[test]
    fn test_empty_username_keeps_existing() {
        let mut peers = table(10_000);
        let t0 = Instant::now();

        peers.observe("a1b2c3d4e", "Alice", t0);
        // A chat datagram carries no username; the entry keeps the one
        // learned from heartbeats.
        peers.observe("a1b2c3d4e", "", t0 + Duration::from_secs(1));
        assert_eq!(peers.username_of("a1b2c3d4e"), "Alice");
    }

    #[test]
    fn test_unknown_peer_username_falls_back_to_id() {
        let peers = table(10_000);
        assert_eq!(peers.username_of("b2c3d4e5f"), "b2c3d4e5f");
    }
}
