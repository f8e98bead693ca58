//! Per-height request worker.
//!
//! Each worker owns one height of the window: it reserves a peer slot, emits
//! the request, and observes delivery through the request table. A peer that
//! exhausts its tries is removed and reported on the timeouts channel, and the
//! height moves on to another peer.

use std::sync::Arc;
use tokio::time::sleep;
use tracing::{debug, warn};

use super::BlockPool;

pub(crate) async fn run(pool: Arc<BlockPool>, height: u64) {
	loop {
		// reserve a slot at a peer tall enough for this height
		let peer_id = loop {
			if !pool.is_running() {
				debug!(height, "Pool stopped, exiting request worker");
				return;
			}
			match pool.pick_peer(height) {
				Some(peer_id) => break peer_id,
				None => {
					debug!(height, "No peer available, backing off");
					sleep(pool.config().request_interval).await;
				},
			}
		};

		debug!(height, %peer_id, "Peer selected for request");
		pool.assign_peer(height, &peer_id);

		for _ in 0..pool.config().max_tries {
			if !pool.is_running() {
				debug!(height, "Pool stopped, exiting request worker");
				return;
			}

			pool.send_block_request(height, &peer_id).await;
			sleep(pool.config().request_timeout).await;

			if pool.has_block(height) {
				pool.decrement_peer(&peer_id);
				return;
			}
			// the consumer may have moved past this height while we waited
			if pool.status().base > height {
				pool.decrement_peer(&peer_id);
				return;
			}
		}

		warn!(height, %peer_id, "Peer exhausted its tries, removing it");
		pool.remove_peer(&peer_id);
		pool.send_peer_timeout(&peer_id).await;
	}
}
