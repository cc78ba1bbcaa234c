// This file is Copyright its original authors, visible in version control
// history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

use bitcoin::script::ScriptBuf;
use bitcoin::secp256k1::{self, PublicKey, Secp256k1, SecretKey};
use bitcoin::transaction::{OutPoint, Transaction};
use bitcoin::Txid;

use crate::chain::ledger::LedgerAdapter;
use crate::ln::chan_utils::{
	add_commitment_signature, build_commitment_transaction, commitment_balances,
	commitment_sighash, get_p2wpkh_script, get_revokeable_redeemscript, make_funding_redeemscript,
	verify_commitment_signature, ChannelRole, CommitmentParameters, FUNDING_OUTPUT_INDEX,
	REVOCATION_CONTEST_DELAY,
};
use crate::ln::channel_id::ChannelId;
use crate::ln::revocation::{RevocationInfo, RevocationRegistry};
use crate::sign::{generate_revocation_keypair, EntropySource, NodeSigner};
use crate::util::config::ChannelHandshakeLimits;
use crate::util::errors::APIError;
use crate::util::logger::{Logger, WithContext};

use core::ops::Deref;

fn invalid(err: &str) -> APIError {
	APIError::ValidationFailed { err: err.to_owned() }
}

/// Adds our signature to the funding input of a commitment transaction.
fn sign_commitment<NS: Deref>(
	tx: &mut Transaction, funding_redeemscript: &ScriptBuf, funding_value_sat: u64,
	holder_pubkey: &PublicKey, counterparty_pubkey: &PublicKey, signer: &NS,
) -> Result<(), APIError>
where
	NS::Target: NodeSigner,
{
	let msg = commitment_sighash(tx, funding_redeemscript, funding_value_sat)
		.ok_or_else(|| invalid("Commitment transaction has no input to sign"))?;
	let sig = signer.sign_hash(&msg).map_err(|()| APIError::ChannelUnavailable {
		err: "Failed to sign commitment transaction".to_owned(),
	})?;
	add_commitment_signature(tx, funding_redeemscript, holder_pubkey, counterparty_pubkey, &sig);
	Ok(())
}

/// A channel we are opening, between building the funding and refund transactions and receiving
/// our counterparty's signature on the refund.
pub(super) struct OutboundV1Channel {
	channel_id: ChannelId,
	counterparty_node_id: PublicKey,
	holder_pubkey: PublicKey,
	funding_transaction: Transaction,
	funding_redeemscript: ScriptBuf,
	funding_value_sat: u64,
	refund_transaction: Transaction,
	revocation: RevocationRegistry,
}

impl OutboundV1Channel {
	/// Builds the refund transaction spending `funding_transaction` back to us and issues the
	/// revocation key guarding it.
	///
	/// The same funding transaction always yields the same refund transaction.
	pub fn new<NS: Deref, L: Deref>(
		holder_pubkey: PublicKey, counterparty_node_id: PublicKey, funding_transaction: Transaction,
		channel_value_satoshis: u64, signer: &NS, secp_ctx: &Secp256k1<secp256k1::All>,
		logger: &L,
	) -> Result<Self, APIError>
	where
		NS::Target: NodeSigner,
		L::Target: Logger,
	{
		let funding_redeemscript = make_funding_redeemscript(&holder_pubkey, &counterparty_node_id);
		let funding_output = funding_transaction.output.get(FUNDING_OUTPUT_INDEX as usize);
		let funding_value_sat = match funding_output {
			Some(output) if output.script_pubkey == funding_redeemscript.to_p2wsh() => {
				output.value.to_sat()
			},
			_ => {
				return Err(APIError::APIMisuseError {
					err: "Funding transaction does not pay to the channel's funding output"
						.to_owned(),
				})
			},
		};
		if funding_value_sat < channel_value_satoshis {
			return Err(APIError::APIMisuseError {
				err: format!(
					"Funding output of {} sat cannot cover a channel of {} sat",
					funding_value_sat, channel_value_satoshis
				),
			});
		}
		let funding_outpoint =
			OutPoint { txid: funding_transaction.compute_txid(), vout: FUNDING_OUTPUT_INDEX };
		let channel_id = ChannelId::v1_from_funding_outpoint(&funding_outpoint);

		let revocation_key = signer.derive_refund_revocation_secret(&funding_outpoint);
		let revocation_pubkey = PublicKey::from_secret_key(secp_ctx, &revocation_key);
		let refund_transaction = build_commitment_transaction(&CommitmentParameters {
			funding_outpoint,
			funder_pubkey: holder_pubkey,
			fundee_pubkey: counterparty_node_id,
			to_funder_value_sat: channel_value_satoshis,
			to_fundee_value_sat: 0,
			broadcaster: ChannelRole::Funder,
			revocation_pubkey,
		});
		let refund_txid = refund_transaction.compute_txid();
		let mut revocation = RevocationRegistry::new();
		revocation.issue(refund_txid, revocation_key)?;

		let logger = WithContext::from(logger, Some(counterparty_node_id), Some(channel_id));
		log_trace!(logger, "Issued revocation key for our refund transaction {}", refund_txid);

		Ok(OutboundV1Channel {
			channel_id,
			counterparty_node_id,
			holder_pubkey,
			funding_transaction,
			funding_redeemscript,
			funding_value_sat,
			refund_transaction,
			revocation,
		})
	}

	pub fn channel_id(&self) -> ChannelId {
		self.channel_id
	}

	pub fn funding_transaction(&self) -> &Transaction {
		&self.funding_transaction
	}

	pub fn refund_transaction(&self) -> &Transaction {
		&self.refund_transaction
	}

	/// Handles our counterparty's reply to our open request, moving to state 0.
	///
	/// The returned channel has no funding transaction yet, see
	/// [`Channel::set_funding_transaction`].
	pub fn funding_signed<NS: Deref, L: Deref>(
		self, counterparty_pubkey: &PublicKey, signed_funding: &Transaction,
		mut signed_refund: Transaction, signer: &NS, secp_ctx: &Secp256k1<secp256k1::All>,
		logger: &L,
	) -> Result<Channel, APIError>
	where
		NS::Target: NodeSigner,
		L::Target: Logger,
	{
		if *counterparty_pubkey != self.counterparty_node_id {
			return Err(invalid("Counterparty replied with an unexpected public key"));
		}
		if signed_funding.compute_txid() != self.funding_transaction.compute_txid() {
			return Err(invalid("Counterparty returned a different funding transaction"));
		}
		if signed_refund.compute_txid() != self.refund_transaction.compute_txid() {
			return Err(invalid("Counterparty returned a different refund transaction"));
		}
		if !verify_commitment_signature(
			secp_ctx,
			&signed_refund,
			&self.funding_redeemscript,
			self.funding_value_sat,
			&self.counterparty_node_id,
			&self.holder_pubkey,
		) {
			return Err(invalid("Invalid counterparty signature on refund transaction"));
		}
		sign_commitment(
			&mut signed_refund,
			&self.funding_redeemscript,
			self.funding_value_sat,
			&self.holder_pubkey,
			&self.counterparty_node_id,
			signer,
		)?;

		let OutboundV1Channel {
			channel_id,
			counterparty_node_id,
			holder_pubkey,
			funding_transaction,
			funding_redeemscript,
			funding_value_sat,
			refund_transaction: _,
			revocation,
		} = self;
		let (to_funder, to_fundee) = commitment_balances(&signed_refund)
			.ok_or_else(|| invalid("Refund transaction must have one input and two outputs"))?;
		let logger = WithContext::from(logger, Some(counterparty_node_id), Some(channel_id));
		log_trace!(logger, "Counterparty signed our refund transaction {}", log_tx!(signed_refund));

		Ok(Channel {
			channel_id,
			role: ChannelRole::Funder,
			counterparty_node_id,
			holder_pubkey,
			funding_transaction: None,
			funding_outpoint: OutPoint {
				txid: funding_transaction.compute_txid(),
				vout: FUNDING_OUTPUT_INDEX,
			},
			funding_redeemscript,
			funding_value_sat,
			commitment_fee_sat: funding_value_sat - to_funder - to_fundee,
			state: 0,
			holder_transactions: vec![signed_refund.clone()],
			counterparty_transactions: vec![signed_refund],
			revocation,
			pending_update: None,
		})
	}
}

/// An update round in progress, kept until the revocation secrets are exchanged.
///
/// The responder keeps one between answering the proposal and receiving the initiator's
/// revocation secret. The initiator keeps one from sending its secret until the responder's
/// secret comes back, however many attempts that takes.
struct PendingUpdate {
	/// Whether we proposed the update.
	initiated: bool,
	/// Our commitment for the next state. The responder keeps it as sent for signing.
	holder_tx: Transaction,
	/// Our counterparty's commitment for the next state, with our signature.
	counterparty_tx: Transaction,
}

/// A funded channel, at some state `n` both parties agreed on.
///
/// For each state we hold two commitment transactions: ours, whose broadcast pays out our own
/// balance only after [`REVOCATION_CONTEST_DELAY`] and whose revocation secret we hold, and our
/// counterparty's, which is the mirror image. Superseded states are revoked by exchanging the
/// secrets guarding them.
pub(super) struct Channel {
	channel_id: ChannelId,
	role: ChannelRole,
	counterparty_node_id: PublicKey,
	holder_pubkey: PublicKey,

	funding_transaction: Option<Transaction>,
	funding_outpoint: OutPoint,
	funding_redeemscript: ScriptBuf,
	funding_value_sat: u64,
	commitment_fee_sat: u64,

	state: u64,
	holder_transactions: Vec<Transaction>,
	counterparty_transactions: Vec<Transaction>,
	revocation: RevocationRegistry,

	pending_update: Option<PendingUpdate>,
}

impl Channel {
	/// Accepts an open request from our counterparty, countersigning its refund transaction.
	pub fn new_inbound<NS: Deref, ES: Deref, L: Deref>(
		holder_pubkey: PublicKey, counterparty_node_id: PublicKey, funding_transaction: Transaction,
		mut refund_transaction: Transaction, limits: &ChannelHandshakeLimits, signer: &NS,
		entropy_source: &ES, secp_ctx: &Secp256k1<secp256k1::All>, logger: &L,
	) -> Result<Channel, APIError>
	where
		NS::Target: NodeSigner,
		ES::Target: EntropySource,
		L::Target: Logger,
	{
		let funding_redeemscript = make_funding_redeemscript(&holder_pubkey, &counterparty_node_id);
		let funding_output = funding_transaction.output.get(FUNDING_OUTPUT_INDEX as usize);
		let funding_value_sat = match funding_output {
			Some(output) if output.script_pubkey == funding_redeemscript.to_p2wsh() => {
				output.value.to_sat()
			},
			_ => return Err(invalid("Funding output does not pay to our 2-of-2")),
		};
		let funding_outpoint =
			OutPoint { txid: funding_transaction.compute_txid(), vout: FUNDING_OUTPUT_INDEX };

		let (to_funder, to_fundee) = commitment_balances(&refund_transaction)
			.ok_or_else(|| invalid("Refund transaction must have one input and two outputs"))?;
		if refund_transaction.input[0].previous_output != funding_outpoint {
			return Err(invalid("Refund transaction does not spend the funding output"));
		}
		let fundee_index = ChannelRole::Fundee.balance_output_index() as usize;
		let funder_index = ChannelRole::Funder.balance_output_index() as usize;
		let fundee_script = &refund_transaction.output[fundee_index].script_pubkey;
		if *fundee_script != get_p2wpkh_script(&holder_pubkey) {
			return Err(invalid("Refund transaction does not pay our balance to us"));
		}
		if !refund_transaction.output[funder_index].script_pubkey.is_p2wsh() {
			return Err(invalid("Refund transaction does not make the funder's balance revocable"));
		}
		let channel_value_satoshis = to_funder
			.checked_add(to_fundee)
			.filter(|value| *value <= funding_value_sat)
			.ok_or_else(|| invalid("Refund transaction spends more than the funding output"))?;
		if channel_value_satoshis < limits.min_funding_satoshis {
			return Err(invalid(&format!(
				"Channel value {} sat is below our minimum of {} sat",
				channel_value_satoshis, limits.min_funding_satoshis
			)));
		}
		if channel_value_satoshis > limits.max_funding_satoshis {
			return Err(invalid(&format!(
				"Channel value {} sat is above our maximum of {} sat",
				channel_value_satoshis, limits.max_funding_satoshis
			)));
		}

		sign_commitment(
			&mut refund_transaction,
			&funding_redeemscript,
			funding_value_sat,
			&holder_pubkey,
			&counterparty_node_id,
			signer,
		)?;
		let refund_txid = refund_transaction.compute_txid();
		// Our refund output pays us directly, so this key guards nothing yet. It is disclosed in
		// the first update round all the same.
		let (_, revocation_key) = generate_revocation_keypair(entropy_source, secp_ctx);
		let mut revocation = RevocationRegistry::new();
		revocation.issue(refund_txid, revocation_key)?;

		let channel_id = ChannelId::v1_from_funding_outpoint(&funding_outpoint);
		let logger = WithContext::from(logger, Some(counterparty_node_id), Some(channel_id));
		log_trace!(logger, "Issued revocation key for refund transaction {}", refund_txid);

		Ok(Channel {
			channel_id,
			role: ChannelRole::Fundee,
			counterparty_node_id,
			holder_pubkey,
			funding_transaction: Some(funding_transaction),
			funding_outpoint,
			funding_redeemscript,
			funding_value_sat,
			commitment_fee_sat: funding_value_sat - channel_value_satoshis,
			state: 0,
			holder_transactions: vec![refund_transaction.clone()],
			counterparty_transactions: vec![refund_transaction],
			revocation,
			pending_update: None,
		})
	}

	pub fn channel_id(&self) -> ChannelId {
		self.channel_id
	}

	pub fn role(&self) -> ChannelRole {
		self.role
	}

	pub fn counterparty_node_id(&self) -> PublicKey {
		self.counterparty_node_id
	}

	pub fn state(&self) -> u64 {
		self.state
	}

	pub fn funding_outpoint(&self) -> OutPoint {
		self.funding_outpoint
	}

	pub fn funding_transaction(&self) -> Option<&Transaction> {
		self.funding_transaction.as_ref()
	}

	pub fn holder_transactions(&self) -> &[Transaction] {
		&self.holder_transactions
	}

	pub fn counterparty_transactions(&self) -> &[Transaction] {
		&self.counterparty_transactions
	}

	pub fn revocation_registry(&self) -> &RevocationRegistry {
		&self.revocation
	}

	pub fn channel_value_satoshis(&self) -> u64 {
		self.funding_value_sat - self.commitment_fee_sat
	}

	/// Our balance as of the current state.
	pub fn holder_balance(&self) -> u64 {
		self.balance_of(self.role)
	}

	/// Our counterparty's balance as of the current state.
	pub fn counterparty_balance(&self) -> u64 {
		self.balance_of(self.role.counterparty())
	}

	fn balance_of(&self, role: ChannelRole) -> u64 {
		let current = &self.holder_transactions[self.state as usize];
		current.output[role.balance_output_index() as usize].value.to_sat()
	}

	/// Sets the funding transaction once we have signed it. It may only be set once.
	pub fn set_funding_transaction(
		&mut self, funding_transaction: Transaction,
	) -> Result<(), APIError> {
		if self.funding_transaction.is_some() {
			return Err(APIError::APIMisuseError {
				err: "Funding transaction was already set".to_owned(),
			});
		}
		if funding_transaction.compute_txid() != self.funding_outpoint.txid {
			return Err(APIError::APIMisuseError {
				err: "Funding transaction does not match the channel's funding outpoint".to_owned(),
			});
		}
		self.funding_transaction = Some(funding_transaction);
		Ok(())
	}

	fn commitment_parameters(
		&self, holder_balance: u64, broadcaster: ChannelRole, revocation_pubkey: PublicKey,
	) -> CommitmentParameters {
		let counterparty_balance = self.channel_value_satoshis() - holder_balance;
		let (funder_pubkey, fundee_pubkey, to_funder_value_sat, to_fundee_value_sat) =
			match self.role {
				ChannelRole::Funder => (
					self.holder_pubkey,
					self.counterparty_node_id,
					holder_balance,
					counterparty_balance,
				),
				ChannelRole::Fundee => (
					self.counterparty_node_id,
					self.holder_pubkey,
					counterparty_balance,
					holder_balance,
				),
			};
		CommitmentParameters {
			funding_outpoint: self.funding_outpoint,
			funder_pubkey,
			fundee_pubkey,
			to_funder_value_sat,
			to_fundee_value_sat,
			broadcaster,
			revocation_pubkey,
		}
	}

	/// Checks that `tx` is a commitment transaction of this channel whose `broadcaster` balance
	/// is revokeable and whose other balance pays straight to its owner, returning our balance
	/// on it.
	fn check_commitment(
		&self, tx: &Transaction, broadcaster: ChannelRole,
	) -> Result<u64, APIError> {
		let (to_funder, to_fundee) = commitment_balances(tx)
			.ok_or_else(|| invalid("Commitment transaction must have one input and two outputs"))?;
		if tx.input[0].previous_output != self.funding_outpoint {
			return Err(invalid("Commitment transaction does not spend the funding output"));
		}
		if to_funder.checked_add(to_fundee) != Some(self.channel_value_satoshis()) {
			return Err(invalid("Commitment transaction does not preserve the channel value"));
		}
		let holder_output = &tx.output[self.role.balance_output_index() as usize];
		let counterparty_output = &tx.output[self.role.punishable_output_index() as usize];
		let (revokeable, direct, direct_key) = if broadcaster == self.role {
			(holder_output, counterparty_output, &self.counterparty_node_id)
		} else {
			(counterparty_output, holder_output, &self.holder_pubkey)
		};
		if !revokeable.script_pubkey.is_p2wsh() {
			return Err(invalid("Broadcaster's balance is not revokeable"));
		}
		if direct.script_pubkey != get_p2wpkh_script(direct_key) {
			return Err(invalid("Commitment transaction pays the wrong key"));
		}
		Ok(holder_output.value.to_sat())
	}

	fn verify_counterparty_signature(
		&self, tx: &Transaction, secp_ctx: &Secp256k1<secp256k1::All>,
	) -> Result<(), APIError> {
		if verify_commitment_signature(
			secp_ctx,
			tx,
			&self.funding_redeemscript,
			self.funding_value_sat,
			&self.counterparty_node_id,
			&self.holder_pubkey,
		) {
			Ok(())
		} else {
			Err(invalid("Invalid counterparty signature on commitment transaction"))
		}
	}

	fn sign_commitment<NS: Deref>(&self, tx: &mut Transaction, signer: &NS) -> Result<(), APIError>
	where
		NS::Target: NodeSigner,
	{
		sign_commitment(
			tx,
			&self.funding_redeemscript,
			self.funding_value_sat,
			&self.holder_pubkey,
			&self.counterparty_node_id,
			signer,
		)
	}

	/// Builds our commitment transaction for the next state, in which we hold `holder_balance`,
	/// and issues the revocation key guarding it.
	///
	/// We may only move funds to our counterparty, never pull them.
	pub fn build_update_proposal<ES: Deref, L: Deref>(
		&mut self, holder_balance: u64, entropy_source: &ES, secp_ctx: &Secp256k1<secp256k1::All>,
		logger: &L,
	) -> Result<Transaction, APIError>
	where
		ES::Target: EntropySource,
		L::Target: Logger,
	{
		if self.unacknowledged_update().is_some() {
			return Err(APIError::APIMisuseError {
				err: "Previous update must be completed before proposing another".to_owned(),
			});
		}
		if holder_balance > self.holder_balance() {
			return Err(APIError::APIMisuseError {
				err: format!(
					"Cannot raise our balance from {} sat to {} sat, only our counterparty can",
					self.holder_balance(),
					holder_balance
				),
			});
		}
		let (revocation_pubkey, revocation_key) =
			generate_revocation_keypair(entropy_source, secp_ctx);
		let proposal = build_commitment_transaction(&self.commitment_parameters(
			holder_balance,
			self.role,
			revocation_pubkey,
		));
		let txid = proposal.compute_txid();
		self.revocation.issue(txid, revocation_key)?;

		let logger =
			WithContext::from(logger, Some(self.counterparty_node_id), Some(self.channel_id));
		log_trace!(logger, "Issued revocation key for our proposed commitment {}", txid);
		Ok(proposal)
	}

	/// Forgets a proposal our counterparty never accepted.
	pub fn abandon_update_proposal<L: Deref>(&mut self, txid: &Txid, logger: &L)
	where
		L::Target: Logger,
	{
		let logger =
			WithContext::from(logger, Some(self.counterparty_node_id), Some(self.channel_id));
		match self.revocation.discard(txid) {
			Ok(()) => {
				log_trace!(logger, "Discarded revocation key for abandoned commitment {}", txid);
			},
			Err(e) => {
				log_warn!(logger, "Failed to discard revocation key: {}", e);
			},
		}
	}

	/// Handles our counterparty's proposal for the next state: signs it and builds our mirror of
	/// it, returning both. Nothing is committed until the counterparty reveals its revocation
	/// secret.
	pub fn handle_update_proposal<NS: Deref, ES: Deref, L: Deref>(
		&mut self, mut proposal: Transaction, signer: &NS, entropy_source: &ES,
		secp_ctx: &Secp256k1<secp256k1::All>, logger: &L,
	) -> Result<(Transaction, Transaction), APIError>
	where
		NS::Target: NodeSigner,
		ES::Target: EntropySource,
		L::Target: Logger,
	{
		if self.unacknowledged_update().is_some() {
			return Err(APIError::ChannelUnavailable {
				err: "Waiting for our counterparty to complete our previous update".to_owned(),
			});
		}
		let holder_balance = self.check_commitment(&proposal, self.role.counterparty())?;
		if holder_balance < self.holder_balance() {
			return Err(invalid(&format!(
				"Proposed state lowers our balance from {} sat to {} sat",
				self.holder_balance(),
				holder_balance
			)));
		}
		self.sign_commitment(&mut proposal, signer)?;

		let logger =
			WithContext::from(logger, Some(self.counterparty_node_id), Some(self.channel_id));
		if let Some(stale) = self.pending_update.take() {
			let stale_txid = stale.holder_tx.compute_txid();
			log_debug!(logger, "Replacing stale pending update {}", stale_txid);
			if let Err(e) = self.revocation.discard(&stale_txid) {
				log_warn!(logger, "Failed to discard revocation key: {}", e);
			}
		}

		let (revocation_pubkey, revocation_key) =
			generate_revocation_keypair(entropy_source, secp_ctx);
		let mirror = build_commitment_transaction(&self.commitment_parameters(
			holder_balance,
			self.role,
			revocation_pubkey,
		));
		let mirror_txid = mirror.compute_txid();
		self.revocation.issue(mirror_txid, revocation_key)?;
		log_trace!(logger, "Issued revocation key for our mirrored commitment {}", mirror_txid);

		self.pending_update = Some(PendingUpdate {
			initiated: false,
			holder_tx: mirror.clone(),
			counterparty_tx: proposal.clone(),
		});
		Ok((proposal, mirror))
	}

	/// Checks our counterparty's answer to our proposal and signs its mirrored commitment.
	///
	/// From here on the update is pending until [`Channel::complete_update`] succeeds, as our
	/// revocation secret for the current state is about to leave this node.
	pub fn counterparty_update_signed<NS: Deref>(
		&mut self, proposal: &Transaction, signed_proposal: &Transaction, mut mirror: Transaction,
		signer: &NS, secp_ctx: &Secp256k1<secp256k1::All>,
	) -> Result<Transaction, APIError>
	where
		NS::Target: NodeSigner,
	{
		if signed_proposal.compute_txid() != proposal.compute_txid() {
			return Err(invalid("Counterparty signed a different commitment than we proposed"));
		}
		self.verify_counterparty_signature(signed_proposal, secp_ctx)?;
		self.check_commitment(&mirror, self.role.counterparty())?;
		if commitment_balances(&mirror) != commitment_balances(proposal) {
			return Err(invalid("Counterparty's commitment does not mirror our proposal"));
		}
		self.sign_commitment(&mut mirror, signer)?;
		self.pending_update = Some(PendingUpdate {
			initiated: true,
			holder_tx: signed_proposal.clone(),
			counterparty_tx: mirror.clone(),
		});
		Ok(mirror)
	}

	/// The signed commitment we sent our counterparty in an update we proposed which it has not
	/// yet acknowledged with its revocation secret.
	pub fn unacknowledged_update(&self) -> Option<&Transaction> {
		match &self.pending_update {
			Some(pending) if pending.initiated => Some(&pending.counterparty_tx),
			_ => None,
		}
	}

	/// Completes an update we proposed once our counterparty revealed the secret revoking its
	/// current commitment.
	pub fn complete_update<NS: Deref, LA: Deref, L: Deref>(
		&mut self, counterparty_secret: SecretKey, signer: &NS, ledger: &LA,
		secp_ctx: &Secp256k1<secp256k1::All>, logger: &L,
	) -> Result<(), APIError>
	where
		NS::Target: NodeSigner,
		LA::Target: LedgerAdapter,
		L::Target: Logger,
	{
		let (holder_tx, counterparty_tx) = match &self.pending_update {
			Some(pending) if pending.initiated => {
				(pending.holder_tx.clone(), pending.counterparty_tx.clone())
			},
			_ => {
				return Err(APIError::APIMisuseError {
					err: "No update of ours is awaiting completion".to_owned(),
				})
			},
		};
		self.commit_update(
			holder_tx,
			counterparty_tx,
			counterparty_secret,
			signer,
			ledger,
			secp_ctx,
			logger,
		)?;
		Ok(())
	}

	/// The secret revoking our commitment for the current state. It is only handed out once a
	/// commitment for the next state exists.
	pub fn holder_revocation_secret(&self) -> Result<SecretKey, APIError> {
		let txid = self.holder_transactions[self.state as usize].compute_txid();
		Ok(self.revocation.secret(&txid)?)
	}

	/// Handles the final message of an update round we responded to, committing to the next
	/// state and returning the secret revoking our previous commitment.
	pub fn handle_revocation_reveal<NS: Deref, LA: Deref, L: Deref>(
		&mut self, signed_mirror: Transaction, counterparty_secret: SecretKey, signer: &NS,
		ledger: &LA, secp_ctx: &Secp256k1<secp256k1::All>, logger: &L,
	) -> Result<SecretKey, APIError>
	where
		NS::Target: NodeSigner,
		LA::Target: LedgerAdapter,
		L::Target: Logger,
	{
		let mirror_txid = signed_mirror.compute_txid();
		let counterparty_tx = match &self.pending_update {
			Some(pending)
				if !pending.initiated && pending.holder_tx.compute_txid() == mirror_txid =>
			{
				pending.counterparty_tx.clone()
			},
			_ => return self.repeat_revocation_reveal(&mirror_txid, &counterparty_secret, logger),
		};
		self.verify_counterparty_signature(&signed_mirror, secp_ctx)?;
		self.commit_update(
			signed_mirror,
			counterparty_tx,
			counterparty_secret,
			signer,
			ledger,
			secp_ctx,
			logger,
		)
	}

	/// Answers the final message of the update round we last committed to a second time, for
	/// when our counterparty never got our reply.
	fn repeat_revocation_reveal<L: Deref>(
		&self, mirror_txid: &Txid, counterparty_secret: &SecretKey, logger: &L,
	) -> Result<SecretKey, APIError>
	where
		L::Target: Logger,
	{
		let state = self.state as usize;
		if state == 0 || self.holder_transactions[state].compute_txid() != *mirror_txid {
			return match self.pending_update {
				Some(_) => Err(invalid("Counterparty signed a commitment we never proposed")),
				None => {
					Err(APIError::ChannelUnavailable { err: "No update in progress".to_owned() })
				},
			};
		}
		let revoked_txid = self.counterparty_transactions[state - 1].compute_txid();
		match self.revocation.revocation_for_txid(&revoked_txid) {
			Some(info) if info.revocation_key == *counterparty_secret => {},
			_ => return Err(invalid("Revocation secret differs from the one already disclosed")),
		}
		let superseded_txid = self.holder_transactions[state - 1].compute_txid();
		let secret = self.revocation.disclosed_secret(&superseded_txid).ok_or_else(|| {
			APIError::ChannelUnavailable {
				err: format!("Revocation key for {} is no longer held", superseded_txid),
			}
		})?;
		let logger =
			WithContext::from(logger, Some(self.counterparty_node_id), Some(self.channel_id));
		log_debug!(
			logger,
			"Disclosing revocation key for {} again at state {}",
			superseded_txid,
			state
		);
		Ok(secret)
	}

	/// Moves to the next state given both new commitment transactions and the secret revoking
	/// our counterparty's current one.
	///
	/// Everything is validated before anything is changed. Returns our own secret for the
	/// superseded state, which is then considered disclosed.
	fn commit_update<NS: Deref, LA: Deref, L: Deref>(
		&mut self, mut holder_tx: Transaction, counterparty_tx: Transaction,
		counterparty_secret: SecretKey, signer: &NS, ledger: &LA,
		secp_ctx: &Secp256k1<secp256k1::All>, logger: &L,
	) -> Result<SecretKey, APIError>
	where
		NS::Target: NodeSigner,
		LA::Target: LedgerAdapter,
		L::Target: Logger,
	{
		let superseded = &self.counterparty_transactions[self.state as usize];
		let output_index = self.role.punishable_output_index();
		let punishable_output = superseded.output[output_index as usize].clone();
		let revocation_pubkey = PublicKey::from_secret_key(secp_ctx, &counterparty_secret);
		if punishable_output.script_pubkey.is_p2wsh() {
			let expected = get_revokeable_redeemscript(
				&revocation_pubkey,
				REVOCATION_CONTEST_DELAY,
				&self.counterparty_node_id,
			);
			if punishable_output.script_pubkey != expected.to_p2wsh() {
				return Err(invalid("Revocation secret does not unlock the superseded commitment"));
			}
		}
		if self.revocation.counterparty_key(&revocation_pubkey).is_some() {
			return Err(invalid("Revocation secret was already disclosed for another state"));
		}
		let script_type = ledger.classify_script(&punishable_output.script_pubkey)?;
		let info = RevocationInfo {
			revocation_key: counterparty_secret,
			punishable_output,
			output_index,
			txid: superseded.compute_txid(),
			script_type,
		};
		let holder_superseded_txid = self.holder_transactions[self.state as usize].compute_txid();
		let holder_secret = self.revocation.secret(&holder_superseded_txid)?;
		self.sign_commitment(&mut holder_tx, signer)?;

		let logger =
			WithContext::from(logger, Some(self.counterparty_node_id), Some(self.channel_id));
		let revoked_txid = info.txid;
		self.revocation.record_counterparty_key(secp_ctx, info)?;
		self.revocation.mark_disclosed(&holder_superseded_txid)?;
		self.holder_transactions.push(holder_tx);
		self.counterparty_transactions.push(counterparty_tx);
		self.state += 1;
		self.pending_update = None;
		debug_assert_eq!(self.holder_transactions.len() as u64, self.state + 1);
		debug_assert_eq!(self.counterparty_transactions.len() as u64, self.state + 1);

		log_trace!(
			logger,
			"Recorded revocation key {} for counterparty commitment {}",
			log_pubkey!(revocation_pubkey),
			revoked_txid
		);
		log_trace!(
			logger,
			"Disclosed revocation key for our commitment {}",
			holder_superseded_txid
		);
		log_debug!(
			logger,
			"Channel advanced to state {}, our balance {} sat",
			self.state,
			self.holder_balance()
		);
		Ok(holder_secret)
	}

	/// Whether an open request for `funding_transaction` and `refund_transaction` is the one we
	/// accepted this channel from, with no update since.
	pub fn is_repeated_open(
		&self, funding_transaction: &Transaction, refund_transaction: &Transaction,
	) -> bool {
		self.role == ChannelRole::Fundee
			&& self.state == 0
			&& funding_transaction.compute_txid() == self.funding_outpoint.txid
			&& refund_transaction.compute_txid() == self.counterparty_transactions[0].compute_txid()
	}

	/// If `txid` is one of our counterparty's revoked commitment transactions, returns what we
	/// need to claim its balance output.
	pub fn revoked_commitment_info(&self, txid: &Txid) -> Option<&RevocationInfo> {
		self.revocation.revocation_for_txid(txid)
	}
}
