// This file is Copyright its original authors, visible in version control
// history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

//! Various user-configurable channel limits and settings which ChannelManager
//! applies for you.

use core::time::Duration;

/// The largest channel value accepted by default, the pre-wumbo limit of 2^24 - 1 satoshis.
pub const MAX_FUNDING_SATOSHIS_NO_WUMBO: u64 = (1 << 24) - 1;

/// Optional channel limits which are applied during channel creation.
///
/// These limits apply both to channels we fund and to channels our counterparty asks us to
/// accept.
#[derive(Copy, Clone, Debug)]
pub struct ChannelHandshakeLimits {
	/// Minimum allowed satoshis when a channel is funded.
	///
	/// Default value: 1000.
	pub min_funding_satoshis: u64,
	/// Maximum allowed satoshis when a channel is funded.
	///
	/// Default value: [`MAX_FUNDING_SATOSHIS_NO_WUMBO`].
	pub max_funding_satoshis: u64,
}

impl Default for ChannelHandshakeLimits {
	fn default() -> Self {
		ChannelHandshakeLimits {
			min_funding_satoshis: 1000,
			max_funding_satoshis: MAX_FUNDING_SATOSHIS_NO_WUMBO,
		}
	}
}

/// Top-level config which holds ChannelHandshakeLimits and the timeout applied to our peers.
///
/// Default::default() provides sane defaults for most configurations.
#[derive(Copy, Clone, Debug)]
pub struct UserConfig {
	/// Limits applied to the channel value on open, in either direction.
	pub channel_handshake_limits: ChannelHandshakeLimits,
	/// How long we wait for our counterparty to answer any single request before failing the
	/// open or update it belongs to. The channel is released (and a provisional channel removed)
	/// once this elapses.
	///
	/// Default value: 30 seconds.
	pub peer_response_timeout: Duration,
}

impl Default for UserConfig {
	fn default() -> Self {
		UserConfig {
			channel_handshake_limits: ChannelHandshakeLimits::default(),
			peer_response_timeout: Duration::from_secs(30),
		}
	}
}
