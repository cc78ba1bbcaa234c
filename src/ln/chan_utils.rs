// This file is Copyright its original authors, visible in version control
// history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

//! Various utilities for building scripts related to channels. These are
//! largely of interest for those implementing the traits on [`crate::sign`] by hand.
//!
//! Every commitment transaction (the refund transaction at state 0 included) spends the funding
//! output and has exactly two outputs: the funder's balance at index 0 and the fundee's balance
//! at index 1. The balance of whoever holds the commitment (and thus may broadcast it) is locked
//! behind a revokeable script, the other balance is paid directly to the other party.

use bitcoin::absolute::LockTime;
use bitcoin::amount::Amount;
use bitcoin::blockdata::opcodes;
use bitcoin::hashes::Hash;
use bitcoin::script::{Builder, Script, ScriptBuf};
use bitcoin::secp256k1::ecdsa::Signature;
use bitcoin::secp256k1::{Message, PublicKey, Secp256k1, Verification};
use bitcoin::sighash::{EcdsaSighashType, SighashCache};
use bitcoin::transaction::{OutPoint, Sequence, Transaction, TxIn, TxOut, Version};
use bitcoin::{WPubkeyHash, Witness};

/// The index of the funding output in the funding transaction.
pub const FUNDING_OUTPUT_INDEX: u32 = 0;

/// The relative locktime (in blocks) the holder of a commitment transaction must wait before
/// claiming its own balance, giving the counterparty time to punish a revoked state.
pub const REVOCATION_CONTEST_DELAY: u16 = 144;

// Max length of a revokeable redeemscript: 6 opcodes, a two-byte CSV push (+1 push) and two
// keys of 33 bytes (+ 1 push).
pub(crate) const REVOKEABLE_REDEEMSCRIPT_MAX_LENGTH: usize = 6 + 3 + 34 * 2;

/// The side of a channel a node is on.
///
/// The funder is the party which built and paid for the funding transaction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ChannelRole {
	/// We supplied the funding transaction.
	Funder,
	/// Our counterparty supplied the funding transaction.
	Fundee,
}

impl ChannelRole {
	/// The role our counterparty plays in the same channel.
	pub fn counterparty(&self) -> ChannelRole {
		match self {
			ChannelRole::Funder => ChannelRole::Fundee,
			ChannelRole::Fundee => ChannelRole::Funder,
		}
	}

	/// The index of the output paying this role's balance on any commitment transaction.
	pub fn balance_output_index(&self) -> u32 {
		match self {
			ChannelRole::Funder => 0,
			ChannelRole::Fundee => 1,
		}
	}

	/// The index of the counterparty's balance output, ie the output we may claim if our
	/// counterparty broadcasts one of its revoked commitment transactions.
	pub fn punishable_output_index(&self) -> u32 {
		self.counterparty().balance_output_index()
	}
}

/// A script either spendable by the revocation key or the broadcaster's key after a relative
/// locktime. Encumbers the broadcaster's balance output on a commitment transaction.
pub fn get_revokeable_redeemscript(
	revocation_key: &PublicKey, contest_delay: u16, broadcaster_key: &PublicKey,
) -> ScriptBuf {
	let res = Builder::new()
		.push_opcode(opcodes::all::OP_IF)
		.push_key(&bitcoin::PublicKey::new(*revocation_key))
		.push_opcode(opcodes::all::OP_ELSE)
		.push_int(contest_delay as i64)
		.push_opcode(opcodes::all::OP_CSV)
		.push_opcode(opcodes::all::OP_DROP)
		.push_key(&bitcoin::PublicKey::new(*broadcaster_key))
		.push_opcode(opcodes::all::OP_ENDIF)
		.push_opcode(opcodes::all::OP_CHECKSIG)
		.into_script();
	debug_assert!(res.len() <= REVOKEABLE_REDEEMSCRIPT_MAX_LENGTH);
	res
}

/// Gets the redeemscript for a funding output from the two funding public keys.
/// Note that the order of funding public keys does not matter.
pub fn make_funding_redeemscript(a: &PublicKey, b: &PublicKey) -> ScriptBuf {
	let (first, second) = if a.serialize()[..] < b.serialize()[..] { (a, b) } else { (b, a) };
	Builder::new()
		.push_opcode(opcodes::all::OP_PUSHNUM_2)
		.push_key(&bitcoin::PublicKey::new(*first))
		.push_key(&bitcoin::PublicKey::new(*second))
		.push_opcode(opcodes::all::OP_PUSHNUM_2)
		.push_opcode(opcodes::all::OP_CHECKMULTISIG)
		.into_script()
}

/// The P2WPKH script paying directly to `key`.
pub fn get_p2wpkh_script(key: &PublicKey) -> ScriptBuf {
	ScriptBuf::new_p2wpkh(&WPubkeyHash::hash(&key.serialize()))
}

/// Everything needed to lay out one commitment transaction.
#[derive(Clone, Debug)]
pub struct CommitmentParameters {
	/// The funding output being spent.
	pub funding_outpoint: OutPoint,
	/// The funder's channel key.
	pub funder_pubkey: PublicKey,
	/// The fundee's channel key.
	pub fundee_pubkey: PublicKey,
	/// The funder's balance.
	pub to_funder_value_sat: u64,
	/// The fundee's balance.
	pub to_fundee_value_sat: u64,
	/// Who holds this commitment. Their balance is the revokeable one.
	pub broadcaster: ChannelRole,
	/// The key able to sweep the broadcaster's balance once it is disclosed.
	pub revocation_pubkey: PublicKey,
}

impl CommitmentParameters {
	fn pubkey_for(&self, role: ChannelRole) -> &PublicKey {
		match role {
			ChannelRole::Funder => &self.funder_pubkey,
			ChannelRole::Fundee => &self.fundee_pubkey,
		}
	}

	fn value_for(&self, role: ChannelRole) -> u64 {
		match role {
			ChannelRole::Funder => self.to_funder_value_sat,
			ChannelRole::Fundee => self.to_fundee_value_sat,
		}
	}

	/// The script_pubkey of `role`'s balance output.
	pub fn output_script(&self, role: ChannelRole) -> ScriptBuf {
		if role == self.broadcaster {
			get_revokeable_redeemscript(
				&self.revocation_pubkey,
				REVOCATION_CONTEST_DELAY,
				self.pubkey_for(role),
			)
			.to_p2wsh()
		} else {
			get_p2wpkh_script(self.pubkey_for(role))
		}
	}
}

/// Builds an unsigned commitment transaction from the given parameters.
pub fn build_commitment_transaction(params: &CommitmentParameters) -> Transaction {
	let output = [ChannelRole::Funder, ChannelRole::Fundee]
		.iter()
		.map(|role| TxOut {
			value: Amount::from_sat(params.value_for(*role)),
			script_pubkey: params.output_script(*role),
		})
		.collect();
	Transaction {
		version: Version::TWO,
		lock_time: LockTime::ZERO,
		input: vec![TxIn {
			previous_output: params.funding_outpoint,
			script_sig: ScriptBuf::new(),
			sequence: Sequence::MAX,
			witness: Witness::new(),
		}],
		output,
	}
}

/// Returns the `(to_funder, to_fundee)` balances of a commitment transaction, if it has the
/// expected shape.
pub fn commitment_balances(tx: &Transaction) -> Option<(u64, u64)> {
	if tx.input.len() != 1 || tx.output.len() != 2 {
		return None;
	}
	Some((tx.output[0].value.to_sat(), tx.output[1].value.to_sat()))
}

/// The BIP 143 sighash both parties sign to authorize `tx` spending the funding output.
///
/// Returns `None` if `tx` has no input to sign.
pub fn commitment_sighash(
	tx: &Transaction, funding_redeemscript: &Script, funding_value_sat: u64,
) -> Option<Message> {
	let sighash = SighashCache::new(tx)
		.p2wsh_signature_hash(
			0,
			funding_redeemscript,
			Amount::from_sat(funding_value_sat),
			EcdsaSighashType::All,
		)
		.ok()?;
	Some(Message::from_digest(sighash.to_byte_array()))
}

// The witness is `<> <sig for lower key> <sig for higher key> <redeemscript>`, OP_CHECKMULTISIG
// wants the signatures in the order the keys appear in the script.
fn signature_slot(signer: &PublicKey, other: &PublicKey) -> usize {
	if signer.serialize()[..] < other.serialize()[..] {
		1
	} else {
		2
	}
}

/// Places `signer`'s signature in the funding input's witness, leaving the other party's slot
/// untouched.
pub fn add_commitment_signature(
	tx: &mut Transaction, funding_redeemscript: &Script, signer: &PublicKey, other: &PublicKey,
	sig: &Signature,
) {
	let input = match tx.input.first_mut() {
		Some(input) => input,
		None => return,
	};
	let mut elements = input.witness.to_vec();
	if elements.len() != 4 {
		elements = vec![Vec::new(), Vec::new(), Vec::new(), funding_redeemscript.to_bytes()];
	}
	let mut ser_sig = sig.serialize_der().to_vec();
	ser_sig.push(EcdsaSighashType::All as u8);
	elements[signature_slot(signer, other)] = ser_sig;
	input.witness = Witness::from_slice(&elements);
}

/// Reads `signer`'s signature back out of the funding input's witness.
pub fn get_commitment_signature(
	tx: &Transaction, signer: &PublicKey, other: &PublicKey,
) -> Option<Signature> {
	let witness = &tx.input.first()?.witness;
	if witness.len() != 4 {
		return None;
	}
	let ser_sig = witness.nth(signature_slot(signer, other))?;
	let (sighash_type, der) = ser_sig.split_last()?;
	if *sighash_type != EcdsaSighashType::All as u8 {
		return None;
	}
	Signature::from_der(der).ok()
}

/// Checks that `tx` carries a valid signature from `signer` over its funding input.
pub fn verify_commitment_signature<C: Verification>(
	secp_ctx: &Secp256k1<C>, tx: &Transaction, funding_redeemscript: &Script,
	funding_value_sat: u64, signer: &PublicKey, other: &PublicKey,
) -> bool {
	let sig = match get_commitment_signature(tx, signer, other) {
		Some(sig) => sig,
		None => return false,
	};
	match commitment_sighash(tx, funding_redeemscript, funding_value_sat) {
		Some(msg) => secp_ctx.verify_ecdsa(&msg, &sig, signer).is_ok(),
		None => false,
	}
}
