//! Sliding window of block requests, keyed by height.
//!
//! Heights always form a contiguous range `[base, base + total)`. The base is
//! the next height the consumer will pop and only ever moves forward.

use std::collections::BTreeMap;
use std::fmt::Write;

use crate::types::{Block, PoolStatus};

/// One tracked height: the peer currently responsible for it, if any, and
/// the delivered block, once accepted.
#[derive(Debug, Default)]
struct RequestSlot {
	peer_id: Option<String>,
	block: Option<Block>,
}

#[derive(Debug)]
pub(crate) struct RequestWindow {
	base: u64,
	pending: usize,
	slots: BTreeMap<u64, RequestSlot>,
}

impl RequestWindow {
	pub fn new(start: u64) -> Self {
		Self {
			base: start,
			pending: 0,
			slots: BTreeMap::new(),
		}
	}

	pub fn status(&self) -> PoolStatus {
		PoolStatus {
			base: self.base,
			pending: self.pending,
			total: self.slots.len(),
		}
	}

	/// Height the next inserted request will cover.
	pub fn next_height(&self) -> u64 {
		self.base + self.slots.len() as u64
	}

	/// Inserts an empty, unassigned request at the top of the window.
	///
	/// The window grows contiguously; inserting any other height is an
	/// internal bug.
	pub fn insert(&mut self, height: u64) {
		assert_eq!(
			height,
			self.next_height(),
			"request window must grow contiguously"
		);
		self.slots.insert(height, RequestSlot::default());
		self.pending += 1;
	}

	/// The two frontmost blocks, if delivered. Either may be absent while the
	/// window catches up.
	pub fn peek_two(&self) -> (Option<Block>, Option<Block>) {
		let block_at = |height| {
			self.slots
				.get(&height)
				.and_then(|slot| slot.block.clone())
		};
		(block_at(self.base), block_at(self.base + 1))
	}

	/// Removes the request at the base and advances the window, handing the
	/// block to the consumer. The base block must have been delivered.
	pub fn pop(&mut self) -> Block {
		let block = self
			.slots
			.remove(&self.base)
			.and_then(|slot| slot.block)
			.unwrap_or_else(|| panic!("pop requires a delivered block at height {}", self.base));
		self.base += 1;
		block
	}

	/// Invalidates a delivered block so the height gets refetched, returning
	/// the peer that supplied it. Rejecting a block is only meaningful once
	/// one has arrived; calling this on an empty slot is an internal bug.
	pub fn reset(&mut self, height: u64) -> String {
		let slot = self
			.slots
			.get_mut(&height)
			.unwrap_or_else(|| panic!("cannot redo untracked height {height}"));
		assert!(
			slot.block.is_some(),
			"cannot redo height {height} before a block was delivered"
		);

		slot.block = None;
		self.pending += 1;
		slot.peer_id
			.take()
			.unwrap_or_else(|| panic!("delivered block at height {height} lost its peer"))
	}

	pub fn has_block(&self, height: u64) -> bool {
		self.slots
			.get(&height)
			.is_some_and(|slot| slot.block.is_some())
	}

	/// Records which peer a worker reserved for this height. No-op if the
	/// height was popped in the meantime.
	pub fn set_peer(&mut self, height: u64, peer_id: &str) {
		if let Some(slot) = self.slots.get_mut(&height) {
			slot.peer_id = Some(peer_id.to_owned());
		}
	}

	/// Accepts a delivered block if the height is still tracked, assigned to
	/// the delivering peer, and not yet filled. Returns whether the block was
	/// accepted; stale or mismatched deliveries are discarded.
	pub fn add_block(&mut self, block: Block, peer_id: &str) -> bool {
		let Some(slot) = self.slots.get_mut(&block.height) else {
			return false;
		};
		if slot.peer_id.as_deref() != Some(peer_id) {
			return false;
		}
		if slot.block.is_some() {
			return false;
		}
		slot.block = Some(block);
		self.pending -= 1;
		true
	}

	/// Compact fill-map of the window, for debug logging.
	pub fn summary(&self) -> String {
		let mut out = String::new();
		for (height, slot) in &self.slots {
			let _ = write!(out, "H({height}):B?({}) ", slot.block.is_some());
		}
		out
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use test_case::test_case;

	fn block(height: u64) -> Block {
		Block {
			height,
			hash: [height as u8; 32],
			parent_hash: [height.wrapping_sub(1) as u8; 32],
			data: vec![1, 2, 3],
		}
	}

	fn window_with_assigned(start: u64, count: u64) -> RequestWindow {
		let mut window = RequestWindow::new(start);
		for height in start..start + count {
			window.insert(height);
			window.set_peer(height, "alice");
		}
		window
	}

	#[test]
	fn window_grows_contiguously() {
		let mut window = RequestWindow::new(10);
		assert_eq!(window.next_height(), 10);
		window.insert(10);
		window.insert(11);
		assert_eq!(window.next_height(), 12);
		assert_eq!(window.status().pending, 2);
		assert_eq!(window.status().total, 2);
	}

	#[test]
	#[should_panic(expected = "contiguously")]
	fn inserting_a_gap_panics() {
		let mut window = RequestWindow::new(10);
		window.insert(12);
	}

	#[test]
	fn accepted_block_clears_pending() {
		let mut window = window_with_assigned(5, 1);
		assert!(window.add_block(block(5), "alice"));
		assert_eq!(window.status().pending, 0);
		assert!(window.has_block(5));
	}

	// only a block from the assigned peer, for a tracked and unfilled
	// height, is accepted
	#[test_case(7, "bob", false; "peer mismatch")]
	#[test_case(9, "alice", false; "untracked height")]
	#[test_case(8, "alice", true; "assigned and unfilled")]
	fn add_block_matching_rules(height: u64, peer_id: &str, accepted: bool) {
		let mut window = window_with_assigned(7, 2);
		assert_eq!(window.add_block(block(height), peer_id), accepted);
	}

	#[test]
	fn repeated_delivery_fills_exactly_once() {
		let mut window = window_with_assigned(3, 1);
		assert!(window.add_block(block(3), "alice"));
		assert!(!window.add_block(block(3), "alice"));
		assert_eq!(window.status().pending, 0);
	}

	#[test]
	fn pop_advances_base_and_returns_the_block() {
		let mut window = window_with_assigned(3, 2);
		window.add_block(block(3), "alice");

		let popped = window.pop();
		assert_eq!(popped.height, 3);
		assert_eq!(window.status(), PoolStatus { base: 4, pending: 1, total: 1 });
	}

	#[test]
	#[should_panic(expected = "delivered block")]
	fn pop_without_a_delivered_base_panics() {
		let mut window = window_with_assigned(3, 1);
		window.pop();
	}

	#[test]
	fn reset_clears_the_slot_and_returns_the_peer() {
		let mut window = window_with_assigned(0, 2);
		window.add_block(block(0), "alice");
		assert_eq!(window.status().pending, 1);

		let peer_id = window.reset(0);
		assert_eq!(peer_id, "alice");
		assert!(!window.has_block(0));
		assert_eq!(window.status().pending, 2);

		// a fresh assignment can fill the slot again
		window.set_peer(0, "bob");
		assert!(window.add_block(block(0), "bob"));
	}

	#[test]
	#[should_panic(expected = "before a block was delivered")]
	fn reset_of_an_unfilled_slot_panics() {
		let mut window = window_with_assigned(0, 1);
		window.reset(0);
	}

	#[test]
	fn set_peer_after_pop_is_a_no_op() {
		let mut window = window_with_assigned(0, 1);
		window.add_block(block(0), "alice");
		window.pop();

		window.set_peer(0, "bob");
		assert!(!window.add_block(block(0), "bob"));
	}

	#[test]
	fn peek_two_reports_partial_fill() {
		let mut window = window_with_assigned(0, 2);
		assert_eq!(window.peek_two(), (None, None));

		window.add_block(block(0), "alice");
		let (first, second) = window.peek_two();
		assert_eq!(first.map(|b| b.height), Some(0));
		assert!(second.is_none());
	}
}
