//! Block pool coordinator.
//!
//! Owns the peer registry and the sliding request window, spawns one request
//! worker per in-flight height, and serves the ordered consumer API. The
//! network layer feeds it through [`BlockPool::add_block`] and the peer
//! lifecycle calls; fetch attempts and peer penalties leave through the two
//! caller-provided egress channels.

use color_eyre::Result;
use std::sync::{
	atomic::{AtomicBool, Ordering},
	Arc, Mutex,
};
use tokio::sync::mpsc;
use tokio::time::sleep;
use tracing::{debug, info, warn};

mod peers;
mod requests;
mod worker;

use crate::types::{Block, BlockRequest, PeerTimeout, PoolConfig, PoolStatus};
use peers::PeerSet;
use requests::RequestWindow;

pub struct BlockPool {
	config: PoolConfig,
	peers: Mutex<PeerSet>,
	requests: Mutex<RequestWindow>,
	block_requests_tx: mpsc::Sender<BlockRequest>,
	peer_timeouts_tx: mpsc::Sender<PeerTimeout>,
	running: AtomicBool,
}

impl BlockPool {
	/// Creates a pool that will fetch consecutive blocks starting at `start`,
	/// emitting fetch attempts and peer penalties on the given channels.
	pub fn new(
		start: u64,
		config: PoolConfig,
		block_requests_tx: mpsc::Sender<BlockRequest>,
		peer_timeouts_tx: mpsc::Sender<PeerTimeout>,
	) -> Result<Arc<Self>> {
		config.validate()?;
		Ok(Arc::new(Self {
			peers: Mutex::new(PeerSet::new(config.max_requests_per_peer)),
			requests: Mutex::new(RequestWindow::new(start)),
			config,
			block_requests_tx,
			peer_timeouts_tx,
			running: AtomicBool::new(false),
		}))
	}

	/// Starts the admission loop. Idempotent; a second call is a no-op.
	pub fn start(self: &Arc<Self>) {
		if self
			.running
			.compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
			.is_ok()
		{
			info!("Starting block pool");
			tokio::spawn(admission_loop(Arc::clone(self)));
		}
	}

	/// Stops the pool. Idempotent. Workers and the admission loop observe the
	/// flag at their next loop head and exit; egress sends become no-ops.
	pub fn stop(&self) {
		if self
			.running
			.compare_exchange(true, false, Ordering::SeqCst, Ordering::SeqCst)
			.is_ok()
		{
			info!("Stopping block pool");
		}
	}

	pub fn is_running(&self) -> bool {
		self.running.load(Ordering::SeqCst)
	}

	pub fn status(&self) -> PoolStatus {
		self.requests.lock().unwrap().status()
	}

	/// The two frontmost blocks, if delivered. The consumer peeks two at a
	/// time so the second block's commit can validate the first.
	pub fn peek_two(&self) -> (Option<Block>, Option<Block>) {
		self.requests.lock().unwrap().peek_two()
	}

	/// Pops the block at the base of the window, advancing it. The consumer
	/// must have validated the block via [`BlockPool::peek_two`] first;
	/// popping an undelivered base is an internal bug and panics.
	pub fn pop(&self) -> Block {
		self.requests.lock().unwrap().pop()
	}

	/// Invalidates the delivered block at `height` after failed validation.
	/// The peer that supplied it is removed from the registry and a fresh
	/// worker refetches the height from someone else.
	pub fn redo(self: &Arc<Self>, height: u64) {
		let peer_id = self.requests.lock().unwrap().reset(height);
		warn!(height, %peer_id, "Block rejected by consumer, refetching");
		self.peers.lock().unwrap().remove(&peer_id);
		tokio::spawn(worker::run(Arc::clone(self), height));
	}

	pub fn has_block(&self, height: u64) -> bool {
		self.requests.lock().unwrap().has_block(height)
	}

	/// Accepts a block delivered by the network layer on behalf of `peer_id`.
	/// Deliveries for untracked heights, from unassigned peers, or for
	/// already-filled slots are discarded.
	pub fn add_block(&self, block: Block, peer_id: &str) {
		let height = block.height;
		let accepted = self.requests.lock().unwrap().add_block(block, peer_id);
		if accepted {
			debug!(height, peer_id, "Block delivered");
		} else {
			debug!(height, peer_id, "Discarding stale or mismatched block delivery");
		}
	}

	/// Records the tip height a peer advertises, registering the peer if it
	/// is new.
	pub fn set_peer_height(&self, peer_id: &str, height: u64) {
		self.peers.lock().unwrap().set_height(peer_id, height);
	}

	/// Drops a peer from the registry. Workers holding it fail their retries
	/// and move on; requests it already fulfilled are unaffected.
	pub fn remove_peer(&self, peer_id: &str) {
		self.peers.lock().unwrap().remove(peer_id);
	}

	pub(crate) fn config(&self) -> &PoolConfig {
		&self.config
	}

	/// Whether a peer is currently registered as usable.
	pub fn has_peer(&self, peer_id: &str) -> bool {
		self.peers.lock().unwrap().contains(peer_id)
	}

	pub(crate) fn pick_peer(&self, min_height: u64) -> Option<String> {
		self.peers.lock().unwrap().pick_and_increment(min_height)
	}

	pub(crate) fn assign_peer(&self, height: u64, peer_id: &str) {
		self.requests.lock().unwrap().set_peer(height, peer_id);
	}

	pub(crate) fn decrement_peer(&self, peer_id: &str) {
		self.peers.lock().unwrap().decrement(peer_id);
	}

	fn next_height(&self) -> u64 {
		self.requests.lock().unwrap().next_height()
	}

	fn window_summary(&self) -> String {
		self.requests.lock().unwrap().summary()
	}

	/// Admits `height` at the top of the window and spawns its worker.
	fn make_request(self: &Arc<Self>, height: u64) {
		self.requests.lock().unwrap().insert(height);
		tokio::spawn(worker::run(Arc::clone(self), height));
	}

	pub(crate) async fn send_block_request(&self, height: u64, peer_id: &str) {
		if !self.is_running() {
			return;
		}
		let request = BlockRequest {
			height,
			peer_id: peer_id.to_owned(),
		};
		if self.block_requests_tx.send(request).await.is_err() {
			warn!(height, peer_id, "Block request receiver dropped");
		}
	}

	pub(crate) async fn send_peer_timeout(&self, peer_id: &str) {
		if !self.is_running() {
			return;
		}
		let timeout = PeerTimeout {
			peer_id: peer_id.to_owned(),
		};
		if self.peer_timeouts_tx.send(timeout).await.is_err() {
			warn!(peer_id, "Peer timeout receiver dropped");
		}
	}
}

/// Grows the window while the pending/total caps allow, one height per
/// iteration, backing off for a tick when saturated. Saturation is the
/// backpressure path: a consumer that stops popping freezes admission.
async fn admission_loop(pool: Arc<BlockPool>) {
	loop {
		if !pool.is_running() {
			break;
		}
		let PoolStatus {
			base,
			pending,
			total,
		} = pool.status();
		debug!(
			base,
			pending,
			total,
			window = pool.window_summary(),
			"Admission status"
		);
		if pending >= pool.config.max_pending_requests || total >= pool.config.max_total_requests {
			sleep(pool.config.request_interval).await;
		} else {
			pool.make_request(pool.next_height());
		}
	}
	debug!("Admission loop exited");
}
