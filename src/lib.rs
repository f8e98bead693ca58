//! Parallel block-fetch coordinator for ordered blockchain synchronization.
//!
//! The [`pool::BlockPool`] fetches a sliding window of consecutive block
//! heights from a dynamic set of remote peers, in parallel, and hands the
//! blocks to a consumer strictly in height order.
//!
//! # Flow
//!
//! * The admission loop grows the window one height at a time, spawning a
//!   request worker per height while pending/total caps allow
//! * Each worker reserves a peer slot, emits a [`types::BlockRequest`] on the
//!   egress channel and waits for the network layer to deliver the block via
//!   [`pool::BlockPool::add_block`]
//! * Unresponsive peers are removed after a fixed number of tries and reported
//!   on the timeouts egress channel; the height is reassigned to another peer
//! * The consumer polls [`pool::BlockPool::peek_two`] and pops verified blocks
//!   off the bottom of the window; blocks that fail validation are recycled
//!   with [`pool::BlockPool::redo`]
//!
//! # Notes
//!
//! The coordinator does not validate, persist, or gossip blocks; those are
//! the caller's concern. It only schedules fetches and orders delivery.

pub mod pool;
pub mod types;

pub use pool::BlockPool;
pub use types::{Block, BlockRequest, PeerTimeout, PoolConfig, PoolStatus};
