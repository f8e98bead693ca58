//! Registry of usable peers and their in-flight request budgets.

use rand::{seq::SliceRandom, thread_rng};
use std::collections::HashMap;

/// A connected peer: the tip height it advertises and the number of
/// outstanding requests currently assigned to it.
#[derive(Clone, Debug)]
struct PeerState {
	height: u64,
	num_requests: usize,
}

/// Tracks known peers. A record exists iff the peer is considered usable;
/// removal is the single-strike penalty for exhausting request tries.
#[derive(Debug)]
pub(crate) struct PeerSet {
	peers: HashMap<String, PeerState>,
	max_requests_per_peer: usize,
}

impl PeerSet {
	pub fn new(max_requests_per_peer: usize) -> Self {
		Self {
			peers: HashMap::new(),
			max_requests_per_peer,
		}
	}

	/// Upserts a peer. A new peer starts with no assigned requests; an
	/// existing one only has its advertised height updated.
	pub fn set_height(&mut self, peer_id: &str, height: u64) {
		match self.peers.get_mut(peer_id) {
			Some(peer) => peer.height = height,
			None => {
				self.peers.insert(
					peer_id.to_owned(),
					PeerState {
						height,
						num_requests: 0,
					},
				);
			},
		}
	}

	/// Deletes the record. Workers still holding this id observe its absence
	/// through their normal failure path; no cross-reference is kept.
	pub fn remove(&mut self, peer_id: &str) {
		self.peers.remove(peer_id);
	}

	pub fn contains(&self, peer_id: &str) -> bool {
		self.peers.contains_key(peer_id)
	}

	/// Picks a peer that advertises at least `min_height` and is under its
	/// per-peer cap, incrementing its in-flight counter before returning.
	///
	/// The choice is randomized among eligible peers so that no single peer
	/// is starved or monopolized; callers must not rely on any order.
	pub fn pick_and_increment(&mut self, min_height: u64) -> Option<String> {
		let eligible: Vec<&String> = self
			.peers
			.iter()
			.filter(|(_, peer)| {
				peer.num_requests < self.max_requests_per_peer && peer.height >= min_height
			})
			.map(|(peer_id, _)| peer_id)
			.collect();

		let peer_id = eligible.choose(&mut thread_rng())?.to_string();
		if let Some(peer) = self.peers.get_mut(&peer_id) {
			peer.num_requests += 1;
		}
		Some(peer_id)
	}

	/// Releases one in-flight slot. Safe no-op if the peer is already gone.
	pub fn decrement(&mut self, peer_id: &str) {
		if let Some(peer) = self.peers.get_mut(peer_id) {
			peer.num_requests = peer.num_requests.saturating_sub(1);
		}
	}
}
