// This file is Copyright its original authors, visible in version control
// history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

//! Resolving peers by node id or by network address.

use bitcoin::secp256k1::PublicKey;

use std::collections::HashMap;
use std::sync::RwLock;

/// A peer we can open channels with.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Peer {
	/// The peer's node id
	pub node_id: PublicKey,
	/// The address the peer can be reached at
	pub address: String,
}

/// Something which knows our peers. How they were discovered and how their addresses are kept up
/// to date is up to the implementation.
pub trait PeerDirectory {
	/// Looks up the peer reachable at `address`.
	fn peer_by_address(&self, address: &str) -> Option<Peer>;
	/// Looks up the peer with the given node id.
	fn peer_by_node_id(&self, node_id: &PublicKey) -> Option<Peer>;
}

/// An in-memory [`PeerDirectory`].
pub struct PeerStore {
	peers: RwLock<HashMap<PublicKey, Peer>>,
}

impl PeerStore {
	/// Creates an empty store.
	pub fn new() -> Self {
		PeerStore { peers: RwLock::new(HashMap::new()) }
	}

	/// Adds a peer, replacing any previous address for the same node id.
	pub fn add_peer(&self, peer: Peer) {
		self.peers.write().unwrap().insert(peer.node_id, peer);
	}

	/// Forgets a peer.
	pub fn remove_peer(&self, node_id: &PublicKey) -> Option<Peer> {
		self.peers.write().unwrap().remove(node_id)
	}
}

impl PeerDirectory for PeerStore {
	fn peer_by_address(&self, address: &str) -> Option<Peer> {
		self.peers.read().unwrap().values().find(|peer| peer.address == address).cloned()
	}

	fn peer_by_node_id(&self, node_id: &PublicKey) -> Option<Peer> {
		self.peers.read().unwrap().get(node_id).cloned()
	}
}
