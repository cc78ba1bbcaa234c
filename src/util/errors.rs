// This file is Copyright its original authors, visible in version control
// history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

//! Error types live here.

use bitcoin::secp256k1::PublicKey;

use core::fmt;

/// Indicates an error either on the client's part or in the exchange with the counterparty.
///
/// Every variant leaves the affected channel either absent (if it was still being opened) or at
/// its prior consistent state, so the call may simply be retried.
#[derive(Clone, PartialEq, Eq)]
pub enum APIError {
	/// Indicates the API was wholly misused (see err for more). Cases where these can be returned
	/// are documented, but generally indicates some precondition of a function was violated.
	APIMisuseError {
		/// A human-readable error message
		err: String,
	},
	/// The address a request came from (or was meant for) is not in our peer directory.
	UnknownPeer {
		/// The address which could not be resolved
		address: String,
	},
	/// A channel with this counterparty already exists (or is currently being opened).
	DuplicateChannel {
		/// The counterparty we already have a channel with
		counterparty_node_id: PublicKey,
	},
	/// No channel exists with this counterparty.
	ChannelNotFound {
		/// The counterparty we have no channel with
		counterparty_node_id: PublicKey,
	},
	/// We were unable to complete the request as the Channel required to do so is unable to
	/// complete the request right now. This can take many forms, including the channel still
	/// being opened or another update round holding it.
	ChannelUnavailable {
		/// A human-readable error message
		err: String,
	},
	/// A transaction or key we received failed validation.
	ValidationFailed {
		/// A human-readable error message
		err: String,
	},
	/// The locking script of an output could not be classified into a known pattern.
	ScriptClassificationFailed {
		/// A human-readable error message
		err: String,
	},
	/// The exchange with the counterparty could not be completed, either because the transport
	/// failed, the counterparty rejected the request or it did not answer in time.
	TransportFailure {
		/// A human-readable error message
		err: String,
	},
}

impl fmt::Debug for APIError {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		match *self {
			APIError::APIMisuseError { ref err } => write!(f, "Misuse error: {}", err),
			APIError::UnknownPeer { ref address } => write!(f, "Unknown peer at {}", address),
			APIError::DuplicateChannel { ref counterparty_node_id } => {
				write!(f, "Already have a channel with {}", counterparty_node_id)
			},
			APIError::ChannelNotFound { ref counterparty_node_id } => {
				write!(f, "No channel with {}", counterparty_node_id)
			},
			APIError::ChannelUnavailable { ref err } => write!(f, "Channel unavailable: {}", err),
			APIError::ValidationFailed { ref err } => write!(f, "Validation failed: {}", err),
			APIError::ScriptClassificationFailed { ref err } => {
				write!(f, "Script classification failed: {}", err)
			},
			APIError::TransportFailure { ref err } => write!(f, "Transport failure: {}", err),
		}
	}
}

impl fmt::Display for APIError {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		fmt::Debug::fmt(self, f)
	}
}

impl std::error::Error for APIError {}
