// This file is Copyright its original authors, visible in version control
// history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

//! Provides keys to LDK and defines some useful objects describing spendable on-chain outputs.
//!
//! The provided output descriptors follow a custom LDK data format and are currently not fully
//! compatible with Bitcoin Core output descriptors.
//!
//! Here the key material is limited to a node key (which also locks the channel funding outputs),
//! a wallet key for the on-chain funds we open channels with, and revocation keys. Those guarding
//! refund transactions are derived from the seed, all others are drawn from an [`EntropySource`].

use bitcoin::bip32::{ChildNumber, Xpriv};
use bitcoin::hashes::sha256::Hash as Sha256;
use bitcoin::hashes::{Hash, HashEngine};
use bitcoin::network::Network;
use bitcoin::secp256k1::ecdsa::Signature;
use bitcoin::secp256k1::{Message, PublicKey, Secp256k1, SecretKey, Signing};
use bitcoin::transaction::OutPoint;

use crate::crypto::utils::sign_with_aux_rand;

use core::ops::Deref;
use core::sync::atomic::{AtomicUsize, Ordering};

/// A trait that describes a source of entropy.
pub trait EntropySource {
	/// Gets a unique, cryptographically-secure, random 32-byte value. This method must return a
	/// different value each time it is called.
	fn get_secure_random_bytes(&self) -> [u8; 32];
}

/// A trait that can handle cryptographic operations at the scope level of a node.
pub trait NodeSigner {
	/// Get the node id of our node, which is also the public key locking our half of every
	/// channel funding output.
	fn get_node_id(&self) -> PublicKey;

	/// Signs a 32-byte digest (typically a transaction sighash) with our node secret.
	///
	/// Errors if the signer is currently unable to sign, in which case the operation it belongs
	/// to fails.
	fn sign_hash(&self, msg: &Message) -> Result<Signature, ()>;

	/// Derives the revocation secret guarding the refund transaction of a channel we fund from
	/// `funding_outpoint`.
	///
	/// Unlike the keys for later states this one is reproducible, so an open retried with the
	/// same funding transaction sends the same refund transaction.
	fn derive_refund_revocation_secret(&self, funding_outpoint: &OutPoint) -> SecretKey;
}

/// Draws a fresh revocation keypair from `entropy_source`.
///
/// Each call yields an unrelated key, so callers must store the secret half before the
/// transaction it protects leaves this node.
pub fn generate_revocation_keypair<ES: Deref, C: Signing>(
	entropy_source: &ES, secp_ctx: &Secp256k1<C>,
) -> (PublicKey, SecretKey)
where
	ES::Target: EntropySource,
{
	loop {
		// The odds of hitting zero or a value above the curve order are negligible, but not nil.
		if let Ok(secret) = SecretKey::from_slice(&entropy_source.get_secure_random_bytes()) {
			return (PublicKey::from_secret_key(secp_ctx, &secret), secret);
		}
	}
}

/// Simple implementation of [`EntropySource`] and [`NodeSigner`] that takes a 32-byte seed for
/// use as a BIP 32 extended key and derives keys from that.
///
/// Your `node_id` is `seed/0'`.
/// The wallet used to fund channels is `seed/1'`.
/// Refund revocation secrets are derived from `seed/2'`.
pub struct KeysManager {
	secp_ctx: Secp256k1<bitcoin::secp256k1::All>,
	node_secret: SecretKey,
	node_id: PublicKey,
	wallet_secret: SecretKey,
	refund_revocation_base_key: SecretKey,

	rand_bytes_unique_start: Sha256Engine,
	rand_bytes_index: AtomicUsize,
}

type Sha256Engine = bitcoin::hashes::sha256::HashEngine;

impl KeysManager {
	/// Constructs a `KeysManager` from a 32-byte seed. If the seed is in some way biased (e.g.,
	/// your CSRNG is busted) this may panic (but more importantly, you will possibly lose funds).
	/// `starting_time` isn't strictly required to actually be a time, but it must absolutely,
	/// without a doubt, be unique to this instance. ie if you start multiple times with the same
	/// `seed`, `starting_time` must be unique to each run. Thus, the easiest way to achieve this
	/// is to simply use the current time (with very high precision).
	///
	/// The `seed` MUST be backed up safely prior to use so that the keys can be re-created,
	/// however, obviously, `starting_time` should be unique every time you reload the library -
	/// it is only used to generate new ephemeral key data (here, revocation keys).
	pub fn new(seed: &[u8; 32], starting_time_secs: u64, starting_time_nanos: u32) -> Self {
		let secp_ctx = Secp256k1::new();
		// Note that when we aren't serializing the key, network doesn't matter
		match Xpriv::new_master(Network::Testnet, seed) {
			Ok(master_key) => {
				let node_secret = master_key
					.derive_priv(&secp_ctx, &[ChildNumber::from_hardened_idx(0).unwrap()])
					.expect("Your RNG is busted")
					.private_key;
				let node_id = PublicKey::from_secret_key(&secp_ctx, &node_secret);
				let wallet_secret = master_key
					.derive_priv(&secp_ctx, &[ChildNumber::from_hardened_idx(1).unwrap()])
					.expect("Your RNG is busted")
					.private_key;
				let refund_revocation_base_key = master_key
					.derive_priv(&secp_ctx, &[ChildNumber::from_hardened_idx(2).unwrap()])
					.expect("Your RNG is busted")
					.private_key;

				let mut rand_bytes_unique_start = Sha256::engine();
				rand_bytes_unique_start.input(&starting_time_secs.to_be_bytes());
				rand_bytes_unique_start.input(&starting_time_nanos.to_be_bytes());
				rand_bytes_unique_start.input(seed);

				KeysManager {
					secp_ctx,
					node_secret,
					node_id,
					wallet_secret,
					refund_revocation_base_key,
					rand_bytes_unique_start,
					rand_bytes_index: AtomicUsize::new(0),
				}
			},
			Err(_) => panic!("Your rng is busted"),
		}
	}

	/// Gets the secret key controlling the on-chain wallet we fund channels from.
	pub fn get_wallet_secret(&self) -> SecretKey {
		self.wallet_secret
	}
}

impl EntropySource for KeysManager {
	fn get_secure_random_bytes(&self) -> [u8; 32] {
		let index = self.rand_bytes_index.fetch_add(1, Ordering::AcqRel);
		let mut sha = self.rand_bytes_unique_start.clone();
		sha.input(&(index as u64).to_be_bytes());
		Sha256::from_engine(sha).to_byte_array()
	}
}

impl NodeSigner for KeysManager {
	fn get_node_id(&self) -> PublicKey {
		self.node_id
	}

	fn sign_hash(&self, msg: &Message) -> Result<Signature, ()> {
		Ok(sign_with_aux_rand(&self.secp_ctx, msg, &self.node_secret, &self))
	}

	fn derive_refund_revocation_secret(&self, funding_outpoint: &OutPoint) -> SecretKey {
		let mut attempt: u8 = 0;
		loop {
			let mut sha = Sha256::engine();
			sha.input(&self.refund_revocation_base_key.secret_bytes());
			sha.input(&funding_outpoint.txid.to_byte_array());
			sha.input(&funding_outpoint.vout.to_be_bytes());
			sha.input(&[attempt]);
			if let Ok(secret) = SecretKey::from_slice(&Sha256::from_engine(sha).to_byte_array()) {
				return secret;
			}
			attempt = attempt.wrapping_add(1);
		}
	}
}
