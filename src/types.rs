//! Shared block pool structs and configuration.

use color_eyre::{eyre::eyre, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A block delivered by a peer, owned by the pool until popped by the consumer.
///
/// The pool treats the payload as opaque; validation is the consumer's concern.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
	pub height: u64,
	pub hash: [u8; 32],
	pub parent_hash: [u8; 32],
	pub data: Vec<u8>,
}

/// Egress message asking the network layer to request a block from a peer.
///
/// One message is emitted per fetch attempt, so the same height can appear
/// multiple times for the same or different peers.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlockRequest {
	pub height: u64,
	pub peer_id: String,
}

/// Egress message reporting a peer that exhausted its tries for some height.
///
/// The peer has already been dropped from the registry when this is emitted;
/// the receiver is expected to disconnect it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct PeerTimeout {
	pub peer_id: String,
}

/// Read-only snapshot of the sliding window, used for admission decisions
/// and observability.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct PoolStatus {
	/// Next height the consumer will pop; the low end of the window.
	pub base: u64,
	/// Requests with no delivered block yet.
	pub pending: usize,
	/// All tracked requests, filled or not.
	pub total: usize,
}

#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
	/// Cap on unfilled requests in the window (default: 50).
	pub max_pending_requests: usize,
	/// Cap on the window size, filled requests included (default: 100).
	pub max_total_requests: usize,
	/// Cap on concurrent requests assigned to a single peer (default: 20).
	pub max_requests_per_peer: usize,
	/// Tries at one peer before removing it and reassigning the height (default: 3).
	pub max_tries: usize,
	/// Admission tick and no-peer backoff (default: 500ms).
	#[serde(with = "duration_millis_format")]
	pub request_interval: Duration,
	/// Per-try wait before a request is re-issued (default: 1s).
	#[serde(with = "duration_millis_format")]
	pub request_timeout: Duration,
}

impl Default for PoolConfig {
	fn default() -> Self {
		Self {
			max_pending_requests: 50,
			max_total_requests: 100,
			max_requests_per_peer: 20,
			max_tries: 3,
			request_interval: Duration::from_millis(500),
			request_timeout: Duration::from_secs(1),
		}
	}
}

impl PoolConfig {
	pub fn validate(&self) -> Result<()> {
		if self.max_pending_requests == 0 {
			return Err(eyre!("max_pending_requests must be greater than zero"));
		}
		if self.max_total_requests == 0 {
			return Err(eyre!("max_total_requests must be greater than zero"));
		}
		if self.max_pending_requests > self.max_total_requests {
			return Err(eyre!(
				"max_pending_requests ({}) cannot exceed max_total_requests ({})",
				self.max_pending_requests,
				self.max_total_requests
			));
		}
		if self.max_requests_per_peer == 0 {
			return Err(eyre!("max_requests_per_peer must be greater than zero"));
		}
		if self.max_tries == 0 {
			return Err(eyre!("max_tries must be greater than zero"));
		}
		if self.request_interval.is_zero() || self.request_timeout.is_zero() {
			return Err(eyre!("request_interval and request_timeout must be non-zero"));
		}
		Ok(())
	}
}

pub mod duration_millis_format {
	use serde::{self, Deserialize, Deserializer, Serializer};
	use std::time::Duration;

	pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
	where
		S: Serializer,
	{
		serializer.serialize_u64(duration.as_millis() as u64)
	}

	pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
	where
		D: Deserializer<'de>,
	{
		let value = u64::deserialize(deserializer)?;
		Ok(Duration::from_millis(value))
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use test_case::test_case;

	#[test]
	fn default_config_is_valid() {
		PoolConfig::default().validate().unwrap();
	}

	#[test_case(PoolConfig { max_pending_requests: 0, ..Default::default() }; "zero pending cap")]
	#[test_case(PoolConfig { max_total_requests: 0, ..Default::default() }; "zero total cap")]
	#[test_case(PoolConfig { max_pending_requests: 101, ..Default::default() }; "pending cap above total cap")]
	#[test_case(PoolConfig { max_requests_per_peer: 0, ..Default::default() }; "zero per peer cap")]
	#[test_case(PoolConfig { max_tries: 0, ..Default::default() }; "zero tries")]
	#[test_case(PoolConfig { request_timeout: Duration::ZERO, ..Default::default() }; "zero timeout")]
	fn invalid_config_is_rejected(config: PoolConfig) {
		assert!(config.validate().is_err());
	}

	#[test]
	fn config_round_trips_durations_as_millis() {
		let config = PoolConfig::default();
		let json = serde_json::to_string(&config).unwrap();
		assert!(json.contains("\"request_interval\":500"));
		assert!(json.contains("\"request_timeout\":1000"));

		let decoded: PoolConfig = serde_json::from_str(&json).unwrap();
		assert_eq!(decoded.request_interval, Duration::from_millis(500));
		assert_eq!(decoded.request_timeout, Duration::from_secs(1));
	}
}
