// This file is Copyright its original authors, visible in version control
// history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

//! The boundary between channels and the on-chain ledger: building and signing funding
//! transactions, classifying output scripts and (de)serializing transactions exchanged with our
//! counterparties.

use bitcoin::absolute::LockTime;
use bitcoin::amount::Amount;
use bitcoin::consensus::encode;
use bitcoin::ecdsa;
use bitcoin::hashes::Hash;
use bitcoin::script::{Script, ScriptBuf};
use bitcoin::secp256k1::{self, Message, PublicKey, Secp256k1, SecretKey};
use bitcoin::sighash::{EcdsaSighashType, SighashCache};
use bitcoin::transaction::{OutPoint, Sequence, Transaction, TxIn, TxOut, Version};
use bitcoin::Witness;

use crate::crypto::utils::sign;
use crate::ln::chan_utils::{get_p2wpkh_script, make_funding_redeemscript};
use crate::util::errors::APIError;

use core::fmt;
use std::collections::{HashMap, HashSet};
use std::sync::Mutex;

/// Outputs below this value are not worth creating; change this small is left to the miners.
pub const DUST_LIMIT_SATOSHIS: u64 = 546;

/// The locking script patterns we know how to spend from.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ScriptType {
	/// Pay to public key hash.
	P2pkh,
	/// Pay to script hash.
	P2sh,
	/// Pay to witness public key hash.
	P2wpkh,
	/// Pay to witness script hash.
	P2wsh,
	/// Pay to taproot.
	P2tr,
	/// An unspendable data carrier output.
	OpReturn,
}

/// An error returned by a [`LedgerAdapter`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LedgerError {
	/// Our wallet cannot cover the requested amount.
	InsufficientFunds {
		/// The amount, fees included, we were asked to spend.
		needed: u64,
		/// What our wallet can currently spend.
		available: u64,
	},
	/// A transaction could not be built or signed.
	InvalidTransaction {
		/// A human-readable error message
		err: String,
	},
	/// A script did not match any known [`ScriptType`].
	UnknownScript {
		/// A human-readable error message
		err: String,
	},
	/// Bytes received from a counterparty do not decode to a transaction.
	Decode {
		/// A human-readable error message
		err: String,
	},
}

impl fmt::Display for LedgerError {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		match self {
			LedgerError::InsufficientFunds { needed, available } => {
				write!(f, "Insufficient funds: need {} sat, have {} sat", needed, available)
			},
			LedgerError::InvalidTransaction { err } => write!(f, "Invalid transaction: {}", err),
			LedgerError::UnknownScript { err } => write!(f, "Unknown script: {}", err),
			LedgerError::Decode { err } => write!(f, "Failed to decode transaction: {}", err),
		}
	}
}

impl From<LedgerError> for APIError {
	fn from(e: LedgerError) -> Self {
		match e {
			LedgerError::InsufficientFunds { .. } => {
				APIError::APIMisuseError { err: e.to_string() }
			},
			LedgerError::UnknownScript { .. } => {
				APIError::ScriptClassificationFailed { err: e.to_string() }
			},
			LedgerError::InvalidTransaction { .. } | LedgerError::Decode { .. } => {
				APIError::ValidationFailed { err: e.to_string() }
			},
		}
	}
}

/// What a funding transaction must lock up.
#[derive(Clone, Debug)]
pub struct FundingRequest {
	/// The channel value, ie the amount the funder can later spend off-chain.
	pub channel_value_satoshis: u64,
	/// The fees for both the funding transaction and the refund transaction spending it. Half of
	/// it is kept in the funding output to pay for the refund.
	pub fee_budget_satoshis: u64,
	/// Our key in the 2-of-2 funding output.
	pub holder_funding_pubkey: PublicKey,
	/// Our counterparty's key in the 2-of-2 funding output.
	pub counterparty_funding_pubkey: PublicKey,
}

impl FundingRequest {
	/// The value of the funding output.
	pub fn funding_output_value(&self) -> u64 {
		self.channel_value_satoshis + self.fee_budget_satoshis / 2
	}

	/// The script_pubkey of the funding output.
	pub fn funding_script_pubkey(&self) -> ScriptBuf {
		make_funding_redeemscript(&self.holder_funding_pubkey, &self.counterparty_funding_pubkey)
			.to_p2wsh()
	}
}

/// Builds, signs, encodes and classifies on-chain transactions on behalf of our channels.
///
/// Implementations must be safe to call from several channels at once.
pub trait LedgerAdapter {
	/// Builds an unsigned funding transaction whose output 0 is the P2WSH 2-of-2 of both funding
	/// keys, worth [`FundingRequest::funding_output_value`]. Any change goes to output 1.
	///
	/// The selected inputs stay reserved until the transaction is either signed or abandoned.
	fn build_funding_transaction(
		&self, request: &FundingRequest,
	) -> Result<Transaction, LedgerError>;

	/// Signs all of our inputs of a funding transaction previously returned by
	/// [`Self::build_funding_transaction`].
	fn sign_funding_transaction(&self, tx: &mut Transaction) -> Result<(), LedgerError>;

	/// Releases the inputs of a funding transaction which will never be signed.
	fn abandon_funding_transaction(&self, _tx: &Transaction) {}

	/// Classifies a locking script.
	fn classify_script(&self, script: &Script) -> Result<ScriptType, LedgerError> {
		if script.is_p2pkh() {
			Ok(ScriptType::P2pkh)
		} else if script.is_p2sh() {
			Ok(ScriptType::P2sh)
		} else if script.is_p2wpkh() {
			Ok(ScriptType::P2wpkh)
		} else if script.is_p2wsh() {
			Ok(ScriptType::P2wsh)
		} else if script.is_p2tr() {
			Ok(ScriptType::P2tr)
		} else if script.is_op_return() {
			Ok(ScriptType::OpReturn)
		} else {
			Err(LedgerError::UnknownScript { err: format!("{}", log_bytes!(script.as_bytes())) })
		}
	}

	/// Serializes a transaction to be sent to our counterparty.
	fn encode_transaction(&self, tx: &Transaction) -> Vec<u8> {
		encode::serialize(tx)
	}

	/// Deserializes a transaction received from our counterparty.
	fn decode_transaction(&self, bytes: &[u8]) -> Result<Transaction, LedgerError> {
		encode::deserialize(bytes).map_err(|e| LedgerError::Decode { err: e.to_string() })
	}
}

/// A [`LedgerAdapter`] spending P2WPKH outputs controlled by a single key.
///
/// Coins are selected largest-first. Change below [`DUST_LIMIT_SATOSHIS`] is added to the fee.
pub struct SimpleWallet {
	secp_ctx: Secp256k1<secp256k1::All>,
	secret: SecretKey,
	pubkey: PublicKey,
	script_pubkey: ScriptBuf,
	utxos: Mutex<WalletUtxos>,
}

struct WalletUtxos {
	available: HashMap<OutPoint, TxOut>,
	locked: HashSet<OutPoint>,
}

impl SimpleWallet {
	/// Creates an empty wallet controlled by `secret`.
	pub fn new(secret: SecretKey) -> Self {
		let secp_ctx = Secp256k1::new();
		let pubkey = PublicKey::from_secret_key(&secp_ctx, &secret);
		SimpleWallet {
			script_pubkey: get_p2wpkh_script(&pubkey),
			secp_ctx,
			secret,
			pubkey,
			utxos: Mutex::new(WalletUtxos { available: HashMap::new(), locked: HashSet::new() }),
		}
	}

	/// The script_pubkey our outputs (and change) pay to.
	pub fn get_change_script(&self) -> ScriptBuf {
		self.script_pubkey.clone()
	}

	/// Makes an output paying to [`Self::get_change_script`] available for spending.
	pub fn add_utxo(&self, outpoint: OutPoint, value_satoshis: u64) {
		let output = TxOut {
			value: Amount::from_sat(value_satoshis),
			script_pubkey: self.script_pubkey.clone(),
		};
		self.utxos.lock().unwrap().available.insert(outpoint, output);
	}

	/// The value of all of our outputs not reserved by an unsigned funding transaction.
	pub fn spendable_balance(&self) -> u64 {
		let utxos = self.utxos.lock().unwrap();
		utxos
			.available
			.iter()
			.filter(|(outpoint, _)| !utxos.locked.contains(outpoint))
			.map(|(_, output)| output.value.to_sat())
			.sum()
	}
}

impl LedgerAdapter for SimpleWallet {
	fn build_funding_transaction(
		&self, request: &FundingRequest,
	) -> Result<Transaction, LedgerError> {
		let funding_value = request.funding_output_value();
		let needed = request.channel_value_satoshis + request.fee_budget_satoshis;

		let mut utxos = self.utxos.lock().unwrap();
		let mut eligible = utxos
			.available
			.iter()
			.filter(|(outpoint, _)| !utxos.locked.contains(outpoint))
			.map(|(outpoint, output)| (*outpoint, output.value.to_sat()))
			.collect::<Vec<_>>();
		eligible.sort_unstable_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));

		let available = eligible.iter().map(|(_, value)| value).sum();
		let mut selected_amount = 0;
		let mut selected = Vec::new();
		for (outpoint, value) in eligible {
			if selected_amount >= needed {
				break;
			}
			selected_amount += value;
			selected.push(outpoint);
		}
		if selected_amount < needed {
			return Err(LedgerError::InsufficientFunds { needed, available });
		}

		let mut output = vec![TxOut {
			value: Amount::from_sat(funding_value),
			script_pubkey: request.funding_script_pubkey(),
		}];
		let change = selected_amount - needed;
		if change >= DUST_LIMIT_SATOSHIS {
			output.push(TxOut {
				value: Amount::from_sat(change),
				script_pubkey: self.script_pubkey.clone(),
			});
		}
		let input = selected
			.iter()
			.map(|outpoint| TxIn {
				previous_output: *outpoint,
				script_sig: ScriptBuf::new(),
				sequence: Sequence::ENABLE_RBF_NO_LOCKTIME,
				witness: Witness::new(),
			})
			.collect();
		for outpoint in selected {
			utxos.locked.insert(outpoint);
		}
		Ok(Transaction { version: Version::TWO, lock_time: LockTime::ZERO, input, output })
	}

	fn sign_funding_transaction(&self, tx: &mut Transaction) -> Result<(), LedgerError> {
		let mut utxos = self.utxos.lock().unwrap();
		let mut witnesses = Vec::with_capacity(tx.input.len());
		{
			let mut cache = SighashCache::new(&*tx);
			for (idx, input) in tx.input.iter().enumerate() {
				let prev_output = utxos.available.get(&input.previous_output).ok_or_else(|| {
					LedgerError::InvalidTransaction {
						err: format!(
							"Input {} does not spend one of our outputs",
							input.previous_output
						),
					}
				})?;
				let sighash = cache
					.p2wpkh_signature_hash(
						idx,
						&prev_output.script_pubkey,
						prev_output.value,
						EcdsaSighashType::All,
					)
					.map_err(|e| LedgerError::InvalidTransaction { err: e.to_string() })?;
				let msg = Message::from_digest(sighash.to_byte_array());
				let sig = sign(&self.secp_ctx, &msg, &self.secret);
				witnesses.push(Witness::p2wpkh(&ecdsa::Signature::sighash_all(sig), &self.pubkey));
			}
		}
		for (input, witness) in tx.input.iter_mut().zip(witnesses) {
			input.witness = witness;
			utxos.available.remove(&input.previous_output);
			utxos.locked.remove(&input.previous_output);
		}
		let txid = tx.compute_txid();
		for (vout, output) in tx.output.iter().enumerate() {
			if output.script_pubkey == self.script_pubkey {
				utxos.available.insert(OutPoint { txid, vout: vout as u32 }, output.clone());
			}
		}
		Ok(())
	}

	fn abandon_funding_transaction(&self, tx: &Transaction) {
		let mut utxos = self.utxos.lock().unwrap();
		for input in tx.input.iter() {
			utxos.locked.remove(&input.previous_output);
		}
	}
}
