// This file is Copyright its original authors, visible in version control
// history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

//! Per-channel bookkeeping of revocation keys.
//!
//! We track two kinds of keys. The secrets we generated to guard our own commitment
//! transactions, each of which we disclose once the commitment it guards has been superseded,
//! and the secrets our counterparty disclosed for its own superseded commitments, which let us
//! claim its balance should it ever broadcast one of them.

use bitcoin::secp256k1::{PublicKey, Secp256k1, SecretKey, Signing};
use bitcoin::transaction::TxOut;
use bitcoin::Txid;

use crate::chain::ledger::ScriptType;
use crate::util::errors::APIError;

use core::fmt;
use std::collections::HashMap;

/// A revocation secret our counterparty disclosed, along with everything needed to claim the
/// output it unlocks.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RevocationInfo {
	/// The disclosed secret.
	pub revocation_key: SecretKey,
	/// The counterparty's balance output on the revoked commitment transaction.
	pub punishable_output: TxOut,
	/// The index of [`Self::punishable_output`] in the revoked commitment transaction.
	pub output_index: u32,
	/// The txid of the revoked commitment transaction.
	pub txid: Txid,
	/// The kind of script locking [`Self::punishable_output`].
	pub script_type: ScriptType,
}

enum IssuedRevocationKey {
	Pending(SecretKey),
	// Disclosed, but kept until the next disclosure in case our counterparty never got it.
	Revealed(SecretKey),
	Disclosed,
	// The transaction this key guarded was never accepted, so the key can never be used.
	Discarded,
}

/// An error returned by [`RevocationRegistry`] operations.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum RevocationError {
	/// A key was already issued for this transaction.
	AlreadyIssued {
		/// The transaction in question
		txid: Txid,
	},
	/// No key was ever issued for this transaction.
	UnknownTransaction {
		/// The transaction in question
		txid: Txid,
	},
	/// The key for this transaction was already disclosed and erased.
	AlreadyDisclosed {
		/// The transaction in question
		txid: Txid,
	},
	/// The key for this transaction was discarded along with the transaction.
	Discarded {
		/// The transaction in question
		txid: Txid,
	},
	/// Our counterparty disclosed the same key twice.
	DuplicateCounterpartyKey {
		/// The public half of the key
		key: PublicKey,
	},
}

impl fmt::Display for RevocationError {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		match self {
			RevocationError::AlreadyIssued { txid } => {
				write!(f, "A revocation key was already issued for {}", txid)
			},
			RevocationError::UnknownTransaction { txid } => {
				write!(f, "No revocation key was issued for {}", txid)
			},
			RevocationError::AlreadyDisclosed { txid } => {
				write!(f, "The revocation key for {} was already disclosed", txid)
			},
			RevocationError::Discarded { txid } => {
				write!(f, "The revocation key for {} was discarded", txid)
			},
			RevocationError::DuplicateCounterpartyKey { key } => {
				write!(f, "Revocation key {} was already disclosed to us", key)
			},
		}
	}
}

impl From<RevocationError> for APIError {
	fn from(e: RevocationError) -> Self {
		match e {
			RevocationError::AlreadyIssued { .. } => {
				APIError::APIMisuseError { err: e.to_string() }
			},
			RevocationError::DuplicateCounterpartyKey { .. } => {
				APIError::ValidationFailed { err: e.to_string() }
			},
			_ => APIError::ChannelUnavailable { err: e.to_string() },
		}
	}
}

/// The revocation keys of a single channel.
///
/// Each of our commitment transactions gets exactly one key, issued before the transaction is
/// sent to our counterparty. Secrets are erased when discarded or when the registry is dropped.
/// Only the most recently disclosed secret outlives its disclosure, so that it can be handed out
/// again if the reply carrying it was lost.
pub struct RevocationRegistry {
	holder_keys: HashMap<Txid, IssuedRevocationKey>,
	last_revealed: Option<Txid>,
	counterparty_keys: HashMap<PublicKey, RevocationInfo>,
}

impl RevocationRegistry {
	/// Creates an empty registry.
	pub fn new() -> Self {
		RevocationRegistry {
			holder_keys: HashMap::new(),
			last_revealed: None,
			counterparty_keys: HashMap::new(),
		}
	}

	/// Stores the secret guarding our commitment transaction `txid`.
	pub fn issue(&mut self, txid: Txid, secret: SecretKey) -> Result<(), RevocationError> {
		if self.holder_keys.contains_key(&txid) {
			return Err(RevocationError::AlreadyIssued { txid });
		}
		self.holder_keys.insert(txid, IssuedRevocationKey::Pending(secret));
		Ok(())
	}

	/// Looks up the secret guarding `txid` without consuming it, so an exchange which fails
	/// midway can disclose the same secret again.
	pub fn secret(&self, txid: &Txid) -> Result<SecretKey, RevocationError> {
		match self.holder_keys.get(txid) {
			Some(IssuedRevocationKey::Pending(secret)) => Ok(*secret),
			Some(IssuedRevocationKey::Revealed(_)) | Some(IssuedRevocationKey::Disclosed) => {
				Err(RevocationError::AlreadyDisclosed { txid: *txid })
			},
			Some(IssuedRevocationKey::Discarded) => Err(RevocationError::Discarded { txid: *txid }),
			None => Err(RevocationError::UnknownTransaction { txid: *txid }),
		}
	}

	/// Records that the secret guarding `txid` was sent to our counterparty.
	///
	/// The secret stays available through [`Self::disclosed_secret`] until the next disclosure,
	/// which erases it.
	pub fn mark_disclosed(&mut self, txid: &Txid) -> Result<(), RevocationError> {
		let entry = self
			.holder_keys
			.get_mut(txid)
			.ok_or(RevocationError::UnknownTransaction { txid: *txid })?;
		let secret = match entry {
			IssuedRevocationKey::Pending(secret) => *secret,
			IssuedRevocationKey::Revealed(_) | IssuedRevocationKey::Disclosed => return Ok(()),
			IssuedRevocationKey::Discarded => {
				return Err(RevocationError::Discarded { txid: *txid })
			},
		};
		*entry = IssuedRevocationKey::Revealed(secret);
		if let Some(previous) = self.last_revealed.replace(*txid) {
			if let Some(entry) = self.holder_keys.get_mut(&previous) {
				if let IssuedRevocationKey::Revealed(secret) = entry {
					secret.non_secure_erase();
				}
				*entry = IssuedRevocationKey::Disclosed;
			}
		}
		Ok(())
	}

	/// The secret guarding `txid`, if it is the one we disclosed most recently.
	pub fn disclosed_secret(&self, txid: &Txid) -> Option<SecretKey> {
		match self.holder_keys.get(txid) {
			Some(IssuedRevocationKey::Revealed(secret)) => Some(*secret),
			_ => None,
		}
	}

	/// Erases the secret of a transaction our counterparty never accepted.
	///
	/// The transaction id stays reserved, no other key may be issued for it.
	pub fn discard(&mut self, txid: &Txid) -> Result<(), RevocationError> {
		let entry = self
			.holder_keys
			.get_mut(txid)
			.ok_or(RevocationError::UnknownTransaction { txid: *txid })?;
		match entry {
			IssuedRevocationKey::Pending(secret) => secret.non_secure_erase(),
			IssuedRevocationKey::Revealed(_) | IssuedRevocationKey::Disclosed => {
				return Err(RevocationError::AlreadyDisclosed { txid: *txid })
			},
			IssuedRevocationKey::Discarded => return Ok(()),
		}
		*entry = IssuedRevocationKey::Discarded;
		Ok(())
	}

	/// Whether the secret guarding `txid` has been disclosed to our counterparty.
	pub fn is_disclosed(&self, txid: &Txid) -> bool {
		matches!(
			self.holder_keys.get(txid),
			Some(IssuedRevocationKey::Revealed(_)) | Some(IssuedRevocationKey::Disclosed)
		)
	}

	/// Stores a secret our counterparty disclosed, keyed by its public half which is returned.
	pub fn record_counterparty_key<C: Signing>(
		&mut self, secp_ctx: &Secp256k1<C>, info: RevocationInfo,
	) -> Result<PublicKey, RevocationError> {
		let key = PublicKey::from_secret_key(secp_ctx, &info.revocation_key);
		if self.counterparty_keys.contains_key(&key) {
			return Err(RevocationError::DuplicateCounterpartyKey { key });
		}
		self.counterparty_keys.insert(key, info);
		Ok(key)
	}

	/// Looks up a counterparty-disclosed secret by its public half.
	pub fn counterparty_key(&self, key: &PublicKey) -> Option<&RevocationInfo> {
		self.counterparty_keys.get(key)
	}

	/// Looks up the counterparty-disclosed secret revoking the commitment transaction `txid`.
	pub fn revocation_for_txid(&self, txid: &Txid) -> Option<&RevocationInfo> {
		self.counterparty_keys.values().find(|info| info.txid == *txid)
	}

	/// All secrets our counterparty disclosed so far.
	pub fn counterparty_revocations(&self) -> impl Iterator<Item = &RevocationInfo> {
		self.counterparty_keys.values()
	}
}

impl Drop for RevocationRegistry {
	fn drop(&mut self) {
		for entry in self.holder_keys.values_mut() {
			match entry {
				IssuedRevocationKey::Pending(secret) | IssuedRevocationKey::Revealed(secret) => {
					secret.non_secure_erase();
				},
				IssuedRevocationKey::Disclosed | IssuedRevocationKey::Discarded => {},
			}
		}
	}
}
