// This file is Copyright its original authors, visible in version control
// history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

//! Channel messages, the traits representing their inbound handler and outbound transport, and
//! the error type transports return.
//!
//! Messages are request/response pairs. Transactions travel in the encoded form produced by the
//! [`LedgerAdapter`], the wire encoding of the messages themselves is left to the transport.
//!
//! Note that a [`ChannelTransport`] is trusted to deliver replies from the peer it was asked to
//! reach, and inbound requests are attributed to a peer by the address they carry.
//!
//! [`LedgerAdapter`]: crate::chain::ledger::LedgerAdapter

use bitcoin::secp256k1::{PublicKey, SecretKey};

use crate::ln::peer_directory::Peer;
use crate::util::async_poll::AsyncResult;
use crate::util::errors::APIError;

use core::fmt;

/// An open_channel message to be sent to or received from a peer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OpenChannelRequest {
	/// The address the funder can be reached at
	pub address: String,
	/// The funder's node id, which is also its funding key
	pub public_key: PublicKey,
	/// The unsigned funding transaction
	pub funding_transaction: Vec<u8>,
	/// The refund transaction spending the funding output, unsigned
	pub refund_transaction: Vec<u8>,
}

/// The reply to an [`OpenChannelRequest`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OpenChannelResponse {
	/// The fundee's node id, which is also its funding key
	pub public_key: PublicKey,
	/// The funding transaction, as accepted by the fundee
	pub signed_funding_transaction: Vec<u8>,
	/// The refund transaction carrying the fundee's signature
	pub signed_refund_transaction: Vec<u8>,
}

/// A proposal for the next channel state.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UpdateTransactionRequest {
	/// The initiator's new commitment transaction, unsigned
	pub transaction: Vec<u8>,
	/// The address the initiator can be reached at
	pub address: String,
}

/// The reply to an [`UpdateTransactionRequest`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UpdatedTransactions {
	/// The proposed commitment transaction with the responder's signature
	pub signed_transaction: Vec<u8>,
	/// The responder's mirrored commitment transaction, to be signed by the initiator
	pub unsigned_transaction: Vec<u8>,
}

/// Completes an update round by handing over the initiator's signature on the responder's new
/// commitment along with the secret revoking the initiator's previous commitment.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RevealRevocationKeyRequest {
	/// The responder's mirrored commitment transaction with the initiator's signature
	pub signed_transaction: Vec<u8>,
	/// The secret revoking the initiator's superseded commitment transaction
	pub revocation_key: SecretKey,
	/// The address the initiator can be reached at
	pub address: String,
}

/// The reply to a [`RevealRevocationKeyRequest`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RevocationKey {
	/// The secret revoking the responder's superseded commitment transaction
	pub key: SecretKey,
}

/// A trait to describe an object which can receive channel messages.
///
/// Messages MAY be called in parallel when they originate from different peers. Calls concerning
/// a channel which is busy with another request fail rather than wait.
pub trait ChannelMessageHandler {
	/// Handle an incoming open_channel request, returning the fundee's signatures.
	fn handle_open_channel(
		&self, msg: &OpenChannelRequest,
	) -> Result<OpenChannelResponse, APIError>;
	/// Handle a proposal for the next channel state.
	fn handle_update_transaction(
		&self, msg: &UpdateTransactionRequest,
	) -> Result<UpdatedTransactions, APIError>;
	/// Handle the final message of an update round, returning our own revocation secret.
	fn handle_reveal_revocation_key(
		&self, msg: &RevealRevocationKeyRequest,
	) -> Result<RevocationKey, APIError>;
}

/// An error returned by a [`ChannelTransport`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransportError {
	/// The peer received the request and refused it.
	Rejected {
		/// The peer's reason, as reported by it
		err: String,
	},
	/// The request could not be delivered, or no reply came back.
	Disconnected {
		/// A human-readable error message
		err: String,
	},
}

impl fmt::Display for TransportError {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		match self {
			TransportError::Rejected { err } => write!(f, "Peer rejected request: {}", err),
			TransportError::Disconnected { err } => write!(f, "Peer unreachable: {}", err),
		}
	}
}

impl From<TransportError> for APIError {
	fn from(e: TransportError) -> Self {
		APIError::TransportFailure { err: e.to_string() }
	}
}

/// Delivers requests to a peer's [`ChannelMessageHandler`] and hands back the reply.
///
/// Implementations should not apply their own timeouts, the caller bounds every request.
pub trait ChannelTransport {
	/// Sends an [`OpenChannelRequest`] to `peer`.
	fn open_channel<'a>(
		&'a self, peer: &'a Peer, msg: OpenChannelRequest,
	) -> AsyncResult<'a, OpenChannelResponse, TransportError>;
	/// Sends an [`UpdateTransactionRequest`] to `peer`.
	fn update_transaction<'a>(
		&'a self, peer: &'a Peer, msg: UpdateTransactionRequest,
	) -> AsyncResult<'a, UpdatedTransactions, TransportError>;
	/// Sends a [`RevealRevocationKeyRequest`] to `peer`.
	fn reveal_revocation_key<'a>(
		&'a self, peer: &'a Peer, msg: RevealRevocationKeyRequest,
	) -> AsyncResult<'a, RevocationKey, TransportError>;
}
