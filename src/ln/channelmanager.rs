// This file is Copyright its original authors, visible in version control
// history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

//! The top-level channel management and payment tracking stuff lives here.
//!
//! The [`ChannelManager`] is the main chunk of logic implementing the channel protocol. It opens
//! channels with our peers, drives update rounds we initiate and answers those our peers
//! initiate through its [`ChannelMessageHandler`] implementation.
//!
//! Every update round runs with its channel locked, so rounds on one channel never interleave.
//! Requests from a peer which find the channel busy are refused rather than queued, which keeps
//! two peers initiating at once from deadlocking each other.

use bitcoin::secp256k1::{self, PublicKey, Secp256k1};
use bitcoin::transaction::Transaction;
use bitcoin::Txid;

use crate::chain::chaininterface::BroadcasterInterface;
use crate::chain::ledger::{FundingRequest, LedgerAdapter, ScriptType};
use crate::ln::chan_utils::ChannelRole;
use crate::ln::channel::{Channel, OutboundV1Channel};
use crate::ln::channel_id::ChannelId;
use crate::ln::msgs::{
	ChannelMessageHandler, ChannelTransport, OpenChannelRequest, OpenChannelResponse,
	RevealRevocationKeyRequest, RevocationKey, TransportError, UpdateTransactionRequest,
	UpdatedTransactions,
};
use crate::ln::peer_directory::{Peer, PeerDirectory};
use crate::ln::revocation::RevocationInfo;
use crate::sign::{EntropySource, NodeSigner};
use crate::util::config::UserConfig;
use crate::util::errors::APIError;
use crate::util::logger::{Logger, WithContext};

use core::future::Future;
use core::ops::Deref;
use std::collections::hash_map;
use std::collections::HashMap;
use std::sync::{Arc, RwLock};
use tokio::sync::Mutex;

/// Where a channel is in its lifecycle.
pub(super) enum ChannelPhase {
	/// We are opening this channel. The slot is held locked until the open completes.
	Opening,
	/// Both refund transactions are signed, the channel is at some state `n`.
	Funded(Channel),
}

type ChannelSlot = Arc<Mutex<ChannelPhase>>;

/// Details of a channel, as returned by [`ChannelManager::list_channels`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChannelDetails {
	/// The channel's ID, derived from its funding outpoint.
	pub channel_id: ChannelId,
	/// The node id of our counterparty.
	pub counterparty_node_id: PublicKey,
	/// Whether we funded the channel.
	pub role: ChannelRole,
	/// The number of completed update rounds.
	pub state: u64,
	/// The txid of the funding transaction.
	pub funding_txid: Txid,
	/// The channel value, ie the sum of both balances.
	pub channel_value_satoshis: u64,
	/// Our balance as of the current state.
	pub holder_balance_satoshis: u64,
	/// Our counterparty's balance as of the current state.
	pub counterparty_balance_satoshis: u64,
	/// How many of our counterparty's commitment transactions it has revoked.
	pub revoked_counterparty_commitments: usize,
}

impl ChannelDetails {
	fn from_channel(channel: &Channel) -> Self {
		ChannelDetails {
			channel_id: channel.channel_id(),
			counterparty_node_id: channel.counterparty_node_id(),
			role: channel.role(),
			state: channel.state(),
			funding_txid: channel.funding_outpoint().txid,
			channel_value_satoshis: channel.channel_value_satoshis(),
			holder_balance_satoshis: channel.holder_balance(),
			counterparty_balance_satoshis: channel.counterparty_balance(),
			revoked_counterparty_commitments: channel
				.revocation_registry()
				.counterparty_revocations()
				.count(),
		}
	}
}

// Removes a reserved slot from the channel map unless the open it was reserved for completed,
// including when the opening future is dropped midway.
struct ReservedChannelSlot<'a> {
	channels: &'a RwLock<HashMap<PublicKey, ChannelSlot>>,
	counterparty_node_id: PublicKey,
	slot: ChannelSlot,
	funded: bool,
}

impl<'a> Drop for ReservedChannelSlot<'a> {
	fn drop(&mut self) {
		if self.funded {
			return;
		}
		if let Ok(mut channels) = self.channels.write() {
			let ours = channels
				.get(&self.counterparty_node_id)
				.map_or(false, |slot| Arc::ptr_eq(slot, &self.slot));
			if ours {
				channels.remove(&self.counterparty_node_id);
			}
		}
	}
}

// Hands the inputs of a funding transaction back to the ledger unless it was broadcast.
struct UnbroadcastFunding<'a, LA: Deref>
where
	LA::Target: LedgerAdapter,
{
	ledger: &'a LA,
	transaction: Transaction,
	broadcast: bool,
}

impl<'a, LA: Deref> Drop for UnbroadcastFunding<'a, LA>
where
	LA::Target: LedgerAdapter,
{
	fn drop(&mut self) {
		if !self.broadcast {
			self.ledger.abandon_funding_transaction(&self.transaction);
		}
	}
}

/// Manages all of our channels, one per counterparty.
///
/// `ChannelManager` is parameterized by a number of components to achieve this.
/// - [`LedgerAdapter`] to build and sign funding transactions and (de)serialize transactions
/// - [`NodeSigner`] and [`EntropySource`] for our node key and fresh revocation keys, typically
///   a [`KeysManager`]
/// - [`ChannelTransport`] to reach our peers
/// - [`BroadcasterInterface`] to hand off funding transactions for broadcast
/// - [`PeerDirectory`] to resolve peers by node id or address
/// - [`Logger`] for logging operational information of varying degrees
///
/// [`KeysManager`]: crate::sign::KeysManager
pub struct ChannelManager<LA: Deref, K: Deref, CT: Deref, T: Deref, PD: Deref, L: Deref>
where
	LA::Target: LedgerAdapter,
	K::Target: NodeSigner + EntropySource,
	CT::Target: ChannelTransport,
	T::Target: BroadcasterInterface,
	PD::Target: PeerDirectory,
	L::Target: Logger,
{
	default_configuration: UserConfig,
	address: String,
	secp_ctx: Secp256k1<secp256k1::All>,
	our_network_pubkey: PublicKey,

	ledger: LA,
	keys_manager: K,
	transport: CT,
	tx_broadcaster: T,
	peer_directory: PD,
	logger: L,

	channels: RwLock<HashMap<PublicKey, ChannelSlot>>,
}

impl<LA: Deref, K: Deref, CT: Deref, T: Deref, PD: Deref, L: Deref>
	ChannelManager<LA, K, CT, T, PD, L>
where
	LA::Target: LedgerAdapter,
	K::Target: NodeSigner + EntropySource,
	CT::Target: ChannelTransport,
	T::Target: BroadcasterInterface,
	PD::Target: PeerDirectory,
	L::Target: Logger,
{
	/// Constructs a new `ChannelManager` to hold several channels and drive their protocol.
	///
	/// `address` is where our peers reach us. It is sent along with our requests so they can
	/// attribute them to us.
	pub fn new(
		ledger: LA, keys_manager: K, transport: CT, tx_broadcaster: T, peer_directory: PD,
		logger: L, config: UserConfig, address: String,
	) -> Self {
		let our_network_pubkey = keys_manager.get_node_id();
		ChannelManager {
			default_configuration: config,
			address,
			secp_ctx: Secp256k1::new(),
			our_network_pubkey,
			ledger,
			keys_manager,
			transport,
			tx_broadcaster,
			peer_directory,
			logger,
			channels: RwLock::new(HashMap::new()),
		}
	}

	/// Gets our node id.
	pub fn get_our_node_id(&self) -> PublicKey {
		self.our_network_pubkey
	}

	fn peer_for_node_id(&self, node_id: &PublicKey) -> Result<Peer, APIError> {
		self.peer_directory
			.peer_by_node_id(node_id)
			.ok_or_else(|| APIError::UnknownPeer { address: node_id.to_string() })
	}

	fn peer_for_address(&self, address: &str) -> Result<Peer, APIError> {
		self.peer_directory
			.peer_by_address(address)
			.ok_or_else(|| APIError::UnknownPeer { address: address.to_owned() })
	}

	fn channel_slot(&self, counterparty_node_id: &PublicKey) -> Result<ChannelSlot, APIError> {
		self.channels
			.read()
			.unwrap()
			.get(counterparty_node_id)
			.cloned()
			.ok_or(APIError::ChannelNotFound { counterparty_node_id: *counterparty_node_id })
	}

	/// Waits for a reply from `peer` for at most [`UserConfig::peer_response_timeout`].
	async fn await_reply<R, F: Future<Output = Result<R, TransportError>>>(
		&self, peer: &Peer, request: F,
	) -> Result<R, APIError> {
		let timeout = self.default_configuration.peer_response_timeout;
		match tokio::time::timeout(timeout, request).await {
			Ok(res) => res.map_err(APIError::from),
			Err(_) => Err(APIError::TransportFailure {
				err: format!("{} did not answer within {:?}", peer.address, timeout),
			}),
		}
	}

	/// Opens a channel of `channel_value_satoshis` with the given peer, funded from our
	/// [`LedgerAdapter`]. `fee_satoshis` is paid by each of the funding transaction and the
	/// refund transaction.
	///
	/// Returns the new channel's id once our counterparty signed the refund transaction and the
	/// funding transaction was handed to the [`BroadcasterInterface`]. We do not wait for it to
	/// confirm.
	///
	/// Fails with [`APIError::DuplicateChannel`] if we already have (or are opening) a channel
	/// with this peer. On any other failure no channel is left behind and the call may be
	/// retried.
	pub async fn create_channel(
		&self, their_network_key: PublicKey, channel_value_satoshis: u64, fee_satoshis: u64,
	) -> Result<ChannelId, APIError> {
		let limits = &self.default_configuration.channel_handshake_limits;
		if channel_value_satoshis < limits.min_funding_satoshis {
			return Err(APIError::APIMisuseError {
				err: format!(
					"Channel value must be at least {} sat, got {}",
					limits.min_funding_satoshis, channel_value_satoshis
				),
			});
		}
		if channel_value_satoshis > limits.max_funding_satoshis {
			return Err(APIError::APIMisuseError {
				err: format!(
					"Channel value must be at most {} sat, got {}",
					limits.max_funding_satoshis, channel_value_satoshis
				),
			});
		}
		let fee_budget_satoshis = fee_satoshis.checked_mul(2).ok_or_else(|| {
			APIError::APIMisuseError { err: format!("Fee of {} sat is out of range", fee_satoshis) }
		})?;
		let peer = self.peer_for_node_id(&their_network_key)?;

		let slot = Arc::new(Mutex::new(ChannelPhase::Opening));
		// Nobody else can see the slot yet, so this never fails.
		let mut phase = Arc::clone(&slot).try_lock_owned().map_err(|_| {
			APIError::ChannelUnavailable { err: "Failed to lock new channel".to_owned() }
		})?;
		let mut reservation = {
			let mut channels = self.channels.write().unwrap();
			match channels.entry(their_network_key) {
				hash_map::Entry::Occupied(_) => {
					return Err(APIError::DuplicateChannel {
						counterparty_node_id: their_network_key,
					})
				},
				hash_map::Entry::Vacant(entry) => {
					entry.insert(Arc::clone(&slot));
				},
			}
			ReservedChannelSlot {
				channels: &self.channels,
				counterparty_node_id: their_network_key,
				slot,
				funded: false,
			}
		};

		let logger = WithContext::from(&self.logger, Some(their_network_key), None);
		log_info!(
			logger,
			"Opening channel of {} sat with {}",
			channel_value_satoshis,
			peer.address
		);

		match self.fund_channel(&peer, channel_value_satoshis, fee_budget_satoshis).await {
			Ok(channel) => {
				let channel_id = channel.channel_id();
				*phase = ChannelPhase::Funded(channel);
				reservation.funded = true;
				let logger =
					WithContext::from(&self.logger, Some(their_network_key), Some(channel_id));
				log_info!(logger, "Channel with {} is open at state 0", peer.address);
				Ok(channel_id)
			},
			Err(e) => {
				log_warn!(
					logger,
					"Failed to open channel with {}, removing provisional channel: {}",
					peer.address,
					e
				);
				Err(e)
			},
		}
	}

	/// Builds the funding transaction and runs the open exchange, returning the channel once its
	/// funding transaction is signed and queued for broadcast.
	async fn fund_channel(
		&self, peer: &Peer, channel_value_satoshis: u64, fee_budget_satoshis: u64,
	) -> Result<Channel, APIError> {
		let mut funding = UnbroadcastFunding {
			ledger: &self.ledger,
			transaction: self.ledger.build_funding_transaction(&FundingRequest {
				channel_value_satoshis,
				fee_budget_satoshis,
				holder_funding_pubkey: self.our_network_pubkey,
				counterparty_funding_pubkey: peer.node_id,
			})?,
			broadcast: false,
		};
		let mut channel =
			self.negotiate_open(peer, &funding.transaction, channel_value_satoshis).await?;
		self.ledger.sign_funding_transaction(&mut funding.transaction)?;
		channel.set_funding_transaction(funding.transaction.clone())?;

		let logger =
			WithContext::from(&self.logger, Some(peer.node_id), Some(channel.channel_id()));
		log_debug!(logger, "Broadcasting funding {}", log_tx!(funding.transaction));
		self.tx_broadcaster.broadcast_transactions(&[&funding.transaction]);
		funding.broadcast = true;
		Ok(channel)
	}

	async fn negotiate_open(
		&self, peer: &Peer, funding_transaction: &Transaction, channel_value_satoshis: u64,
	) -> Result<Channel, APIError> {
		let outbound = OutboundV1Channel::new(
			self.our_network_pubkey,
			peer.node_id,
			funding_transaction.clone(),
			channel_value_satoshis,
			&self.keys_manager,
			&self.secp_ctx,
			&self.logger,
		)?;
		let msg = OpenChannelRequest {
			address: self.address.clone(),
			public_key: self.our_network_pubkey,
			funding_transaction: self.ledger.encode_transaction(outbound.funding_transaction()),
			refund_transaction: self.ledger.encode_transaction(outbound.refund_transaction()),
		};
		let logger =
			WithContext::from(&self.logger, Some(peer.node_id), Some(outbound.channel_id()));
		log_gossip!(logger, "Sending open_channel to {}", peer.address);
		let response = self.await_reply(peer, self.transport.open_channel(peer, msg)).await?;

		let signed_funding = self.ledger.decode_transaction(&response.signed_funding_transaction)?;
		let signed_refund = self.ledger.decode_transaction(&response.signed_refund_transaction)?;
		outbound.funding_signed(
			&response.public_key,
			&signed_funding,
			signed_refund,
			&self.keys_manager,
			&self.secp_ctx,
			&self.logger,
		)
	}

	/// Moves the channel with `counterparty_node_id` to a new state in which our balance is
	/// `holder_balance_satoshis`, returning the new state number.
	///
	/// We can only give funds away, our counterparty refuses any state lowering its balance. If
	/// the round fails before our revocation secret was sent both sides stay at their current
	/// state. Otherwise the round stays pending and is completed first thing on the next call,
	/// whose own round then follows. Either way the call may be retried.
	pub async fn update_state(
		&self, counterparty_node_id: PublicKey, holder_balance_satoshis: u64,
	) -> Result<u64, APIError> {
		self.run_update(counterparty_node_id, |_| Ok(holder_balance_satoshis)).await
	}

	/// Pays `amount_satoshis` to our counterparty over the channel, returning the new state
	/// number.
	pub async fn transfer(
		&self, counterparty_node_id: PublicKey, amount_satoshis: u64,
	) -> Result<u64, APIError> {
		self.run_update(counterparty_node_id, |channel| {
			channel.holder_balance().checked_sub(amount_satoshis).ok_or_else(|| {
				APIError::APIMisuseError {
					err: format!(
						"Cannot send {} sat with a balance of {} sat",
						amount_satoshis,
						channel.holder_balance()
					),
				}
			})
		})
		.await
	}

	/// Runs an update round on the channel, with the target balance computed once we hold the
	/// channel lock.
	async fn run_update<F>(
		&self, counterparty_node_id: PublicKey, target_balance: F,
	) -> Result<u64, APIError>
	where
		F: FnOnce(&Channel) -> Result<u64, APIError>,
	{
		let peer = self.peer_for_node_id(&counterparty_node_id)?;
		let slot = self.channel_slot(&counterparty_node_id)?;
		let mut phase = slot.lock().await;
		let channel = match &mut *phase {
			ChannelPhase::Funded(channel) => channel,
			ChannelPhase::Opening => {
				return Err(APIError::ChannelUnavailable {
					err: "Channel failed to open".to_owned(),
				})
			},
		};
		let logger =
			WithContext::from(&self.logger, Some(peer.node_id), Some(channel.channel_id()));
		if channel.unacknowledged_update().is_some() {
			log_debug!(
				logger,
				"Resending revocation key for state {} to {}",
				channel.state(),
				peer.address
			);
			if let Err(e) = self.exchange_revocation(&peer, channel).await {
				log_warn!(logger, "Update round with {} is still pending: {}", peer.address, e);
				return Err(e);
			}
			log_debug!(
				logger,
				"Completed pending update round with {}, now at state {}",
				peer.address,
				channel.state()
			);
		}

		let holder_balance = target_balance(channel)?;
		let proposal = channel.build_update_proposal(
			holder_balance,
			&self.keys_manager,
			&self.secp_ctx,
			&self.logger,
		)?;
		match self.update_round(&peer, channel, &proposal).await {
			Ok(()) => {
				log_debug!(
					logger,
					"Completed update round with {}, now at state {}",
					peer.address,
					channel.state()
				);
				Ok(channel.state())
			},
			Err(e) if channel.unacknowledged_update().is_some() => {
				log_warn!(
					logger,
					"Update round with {} is pending until it returns its revocation key: {}",
					peer.address,
					e
				);
				Err(e)
			},
			Err(e) => {
				channel.abandon_update_proposal(&proposal.compute_txid(), &self.logger);
				log_warn!(
					logger,
					"Update round with {} failed at state {}: {}",
					peer.address,
					channel.state(),
					e
				);
				Err(e)
			},
		}
	}

	async fn update_round(
		&self, peer: &Peer, channel: &mut Channel, proposal: &Transaction,
	) -> Result<(), APIError> {
		let msg = UpdateTransactionRequest {
			transaction: self.ledger.encode_transaction(proposal),
			address: self.address.clone(),
		};
		let reply = self.await_reply(peer, self.transport.update_transaction(peer, msg)).await?;
		let signed_proposal = self.ledger.decode_transaction(&reply.signed_transaction)?;
		let mirror = self.ledger.decode_transaction(&reply.unsigned_transaction)?;
		channel.counterparty_update_signed(
			proposal,
			&signed_proposal,
			mirror,
			&self.keys_manager,
			&self.secp_ctx,
		)?;

		// Our counterparty has signed the next state, so the current one may be revoked.
		self.exchange_revocation(peer, channel).await
	}

	/// Sends our revocation secret for the current state along with the commitment we signed for
	/// our counterparty, completing our pending update once its secret comes back.
	///
	/// Sending the same secret again is harmless, our counterparty answers with the secret it
	/// already disclosed if it committed the first time.
	async fn exchange_revocation(
		&self, peer: &Peer, channel: &mut Channel,
	) -> Result<(), APIError> {
		let signed_mirror = channel.unacknowledged_update().ok_or_else(|| {
			APIError::APIMisuseError { err: "No update is awaiting completion".to_owned() }
		})?;
		let msg = RevealRevocationKeyRequest {
			signed_transaction: self.ledger.encode_transaction(signed_mirror),
			revocation_key: channel.holder_revocation_secret()?,
			address: self.address.clone(),
		};
		let reply = self.await_reply(peer, self.transport.reveal_revocation_key(peer, msg)).await?;
		channel.complete_update(
			reply.key,
			&self.keys_manager,
			&self.ledger,
			&self.secp_ctx,
			&self.logger,
		)
	}

	/// Gets the details of all open channels. Channels still being opened are not included.
	pub async fn list_channels(&self) -> Vec<ChannelDetails> {
		let slots = self.channels.read().unwrap().values().cloned().collect::<Vec<_>>();
		let mut res = Vec::with_capacity(slots.len());
		for slot in slots {
			if let ChannelPhase::Funded(channel) = &*slot.lock().await {
				res.push(ChannelDetails::from_channel(channel));
			}
		}
		res
	}

	/// Gets the details of our channel with `counterparty_node_id`, waiting for any update round
	/// in progress to finish.
	pub async fn channel_details(
		&self, counterparty_node_id: &PublicKey,
	) -> Result<ChannelDetails, APIError> {
		let slot = self.channel_slot(counterparty_node_id)?;
		let phase = slot.lock().await;
		match &*phase {
			ChannelPhase::Funded(channel) => Ok(ChannelDetails::from_channel(channel)),
			ChannelPhase::Opening => {
				Err(APIError::ChannelNotFound { counterparty_node_id: *counterparty_node_id })
			},
		}
	}

	/// Checks whether `tx`, seen on chain, is a commitment transaction one of our counterparties
	/// revoked. If so, returns the counterparty along with the secret and output needed to claim
	/// its balance.
	///
	/// Revoked commitments whose counterparty balance is not locked behind the revocation key,
	/// such as the funder's view of the fundee's refund transaction, leave nothing to claim and
	/// are not reported.
	pub async fn find_revoked_commitment(
		&self, tx: &Transaction,
	) -> Option<(PublicKey, RevocationInfo)> {
		let txid = tx.compute_txid();
		let slots = self
			.channels
			.read()
			.unwrap()
			.iter()
			.map(|(counterparty_node_id, slot)| (*counterparty_node_id, Arc::clone(slot)))
			.collect::<Vec<_>>();
		for (counterparty_node_id, slot) in slots {
			if let ChannelPhase::Funded(channel) = &*slot.lock().await {
				let info = match channel.revoked_commitment_info(&txid) {
					Some(info) if info.script_type == ScriptType::P2wsh => info,
					_ => continue,
				};
				let logger = WithContext::from(
					&self.logger,
					Some(counterparty_node_id),
					Some(channel.channel_id()),
				);
				log_error!(logger, "Counterparty broadcast revoked commitment {}", txid);
				return Some((counterparty_node_id, info.clone()));
			}
		}
		None
	}

	#[cfg(test)]
	pub(super) async fn with_channel<R, F: FnOnce(&Channel) -> R>(
		&self, counterparty_node_id: &PublicKey, f: F,
	) -> Option<R> {
		let slot = self.channels.read().unwrap().get(counterparty_node_id).cloned()?;
		let phase = slot.lock().await;
		match &*phase {
			ChannelPhase::Funded(channel) => Some(f(channel)),
			ChannelPhase::Opening => None,
		}
	}

	/// Locks the channel with the peer at `address` for an inbound request, refusing to wait if
	/// it is busy.
	fn lock_channel_for_request(
		&self, address: &str,
	) -> Result<(Peer, tokio::sync::OwnedMutexGuard<ChannelPhase>), APIError> {
		let peer = self.peer_for_address(address)?;
		let slot = self.channel_slot(&peer.node_id)?;
		let phase = slot.try_lock_owned().map_err(|_| APIError::ChannelUnavailable {
			err: "Channel is busy with another request".to_owned(),
		})?;
		match &*phase {
			ChannelPhase::Funded(_) => Ok((peer, phase)),
			ChannelPhase::Opening => Err(channel_opening()),
		}
	}

	/// Answers an open request for a channel we already accepted a second time, for when our
	/// response never reached the funder. Any other open request from a peer we have a channel
	/// with is a duplicate.
	fn repeat_open_response(
		&self, peer: &Peer, slot: &ChannelSlot, funding_transaction: &Transaction,
		refund_transaction: &Transaction,
	) -> Result<OpenChannelResponse, APIError> {
		let duplicate = || APIError::DuplicateChannel { counterparty_node_id: peer.node_id };
		let phase = slot.try_lock().map_err(|_| duplicate())?;
		let channel = match &*phase {
			ChannelPhase::Funded(channel)
				if channel.is_repeated_open(funding_transaction, refund_transaction) =>
			{
				channel
			},
			_ => return Err(duplicate()),
		};
		let logger =
			WithContext::from(&self.logger, Some(peer.node_id), Some(channel.channel_id()));
		log_debug!(logger, "Repeating our acceptance of the channel from {}", peer.address);
		Ok(OpenChannelResponse {
			public_key: self.our_network_pubkey,
			signed_funding_transaction: self.ledger.encode_transaction(funding_transaction),
			signed_refund_transaction: self
				.ledger
				.encode_transaction(&channel.holder_transactions()[0]),
		})
	}
}

fn channel_opening() -> APIError {
	APIError::ChannelUnavailable { err: "Channel is still being opened".to_owned() }
}

impl<LA: Deref, K: Deref, CT: Deref, T: Deref, PD: Deref, L: Deref> ChannelMessageHandler
	for ChannelManager<LA, K, CT, T, PD, L>
where
	LA::Target: LedgerAdapter,
	K::Target: NodeSigner + EntropySource,
	CT::Target: ChannelTransport,
	T::Target: BroadcasterInterface,
	PD::Target: PeerDirectory,
	L::Target: Logger,
{
	fn handle_open_channel(
		&self, msg: &OpenChannelRequest,
	) -> Result<OpenChannelResponse, APIError> {
		let peer = self.peer_for_address(&msg.address)?;
		if peer.node_id != msg.public_key {
			return Err(APIError::ValidationFailed {
				err: format!("Open request does not carry the key of the peer at {}", msg.address),
			});
		}
		let funding_transaction = self.ledger.decode_transaction(&msg.funding_transaction)?;
		let refund_transaction = self.ledger.decode_transaction(&msg.refund_transaction)?;
		let existing = self.channels.read().unwrap().get(&peer.node_id).cloned();
		if let Some(slot) = existing {
			return self.repeat_open_response(
				&peer,
				&slot,
				&funding_transaction,
				&refund_transaction,
			);
		}

		let channel = Channel::new_inbound(
			self.our_network_pubkey,
			peer.node_id,
			funding_transaction,
			refund_transaction,
			&self.default_configuration.channel_handshake_limits,
			&self.keys_manager,
			&self.keys_manager,
			&self.secp_ctx,
			&self.logger,
		)?;
		let response = OpenChannelResponse {
			public_key: self.our_network_pubkey,
			signed_funding_transaction: msg.funding_transaction.clone(),
			signed_refund_transaction: self
				.ledger
				.encode_transaction(&channel.holder_transactions()[0]),
		};

		let channel_id = channel.channel_id();
		match self.channels.write().unwrap().entry(peer.node_id) {
			hash_map::Entry::Occupied(_) => {
				return Err(APIError::DuplicateChannel { counterparty_node_id: peer.node_id })
			},
			hash_map::Entry::Vacant(entry) => {
				entry.insert(Arc::new(Mutex::new(ChannelPhase::Funded(channel))));
			},
		}
		let logger = WithContext::from(&self.logger, Some(peer.node_id), Some(channel_id));
		log_info!(logger, "Accepted channel from {}", peer.address);
		Ok(response)
	}

	fn handle_update_transaction(
		&self, msg: &UpdateTransactionRequest,
	) -> Result<UpdatedTransactions, APIError> {
		let (_, mut phase) = self.lock_channel_for_request(&msg.address)?;
		let channel = match &mut *phase {
			ChannelPhase::Funded(channel) => channel,
			ChannelPhase::Opening => return Err(channel_opening()),
		};
		let proposal = self.ledger.decode_transaction(&msg.transaction)?;
		let (signed_proposal, mirror) = channel.handle_update_proposal(
			proposal,
			&self.keys_manager,
			&self.keys_manager,
			&self.secp_ctx,
			&self.logger,
		)?;
		Ok(UpdatedTransactions {
			signed_transaction: self.ledger.encode_transaction(&signed_proposal),
			unsigned_transaction: self.ledger.encode_transaction(&mirror),
		})
	}

	fn handle_reveal_revocation_key(
		&self, msg: &RevealRevocationKeyRequest,
	) -> Result<RevocationKey, APIError> {
		let (peer, mut phase) = self.lock_channel_for_request(&msg.address)?;
		let channel = match &mut *phase {
			ChannelPhase::Funded(channel) => channel,
			ChannelPhase::Opening => return Err(channel_opening()),
		};
		let signed_mirror = self.ledger.decode_transaction(&msg.signed_transaction)?;
		let prior_state = channel.state();
		let key = channel.handle_revocation_reveal(
			signed_mirror,
			msg.revocation_key,
			&self.keys_manager,
			&self.ledger,
			&self.secp_ctx,
			&self.logger,
		)?;
		if channel.state() > prior_state {
			let logger =
				WithContext::from(&self.logger, Some(peer.node_id), Some(channel.channel_id()));
			log_debug!(
				logger,
				"Completed update round initiated by {}, now at state {}",
				peer.address,
				channel.state()
			);
		}
		Ok(RevocationKey { key })
	}
}
