// This file is Copyright its original authors, visible in version control
// history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

//! A bunch of useful utilities for building networks of nodes and exchanging messages between
//! nodes for functional tests.

use crate::chain::ledger::SimpleWallet;
use crate::ln::channel_id::ChannelId;
use crate::ln::channelmanager::ChannelManager;
use crate::ln::msgs::ChannelMessageHandler;
use crate::ln::peer_directory::{Peer, PeerStore};
use crate::sign::{KeysManager, NodeSigner};
use crate::util::config::UserConfig;
use crate::util::test_utils::{TestBroadcaster, TestLogger, TestTransport};

use bitcoin::hashes::Hash;
use bitcoin::secp256k1::PublicKey;
use bitcoin::transaction::OutPoint;
use bitcoin::Txid;

use std::sync::Arc;

pub const WALLET_BALANCE_SATOSHIS: u64 = 1_000_000;
pub const FEE_SATOSHIS: u64 = 500;

pub type TestChannelManager = ChannelManager<
	Arc<SimpleWallet>,
	Arc<KeysManager>,
	Arc<TestTransport>,
	Arc<TestBroadcaster>,
	Arc<PeerStore>,
	Arc<TestLogger>,
>;

pub struct Node {
	pub node: Arc<TestChannelManager>,
	pub keys_manager: Arc<KeysManager>,
	pub wallet: Arc<SimpleWallet>,
	pub tx_broadcaster: Arc<TestBroadcaster>,
	pub peers: Arc<PeerStore>,
	pub logger: Arc<TestLogger>,
	pub address: String,
}

impl Node {
	pub fn node_id(&self) -> PublicKey {
		self.keys_manager.get_node_id()
	}
}

pub struct Network {
	pub transport: Arc<TestTransport>,
	pub nodes: Vec<Node>,
}

pub fn create_network(node_count: usize) -> Network {
	create_network_with_config(node_count, UserConfig::default())
}

/// Builds `node_count` nodes which all know each other, each with a wallet holding a single
/// output of [`WALLET_BALANCE_SATOSHIS`].
pub fn create_network_with_config(node_count: usize, config: UserConfig) -> Network {
	let transport = Arc::new(TestTransport::new());
	let mut nodes = Vec::with_capacity(node_count);
	for i in 0..node_count {
		let seed = [i as u8 + 1; 32];
		let keys_manager = Arc::new(KeysManager::new(&seed, 42, 42));
		let wallet = Arc::new(SimpleWallet::new(keys_manager.get_wallet_secret()));
		wallet.add_utxo(
			OutPoint { txid: Txid::from_byte_array([0x42 + i as u8; 32]), vout: 0 },
			WALLET_BALANCE_SATOSHIS,
		);
		let tx_broadcaster = Arc::new(TestBroadcaster::new());
		let peers = Arc::new(PeerStore::new());
		let logger = Arc::new(TestLogger::with_id(format!("node {}", i)));
		let address = format!("127.0.0.1:{}", 9735 + i);
		let node = Arc::new(ChannelManager::new(
			Arc::clone(&wallet),
			Arc::clone(&keys_manager),
			Arc::clone(&transport),
			Arc::clone(&tx_broadcaster),
			Arc::clone(&peers),
			Arc::clone(&logger),
			config,
			address.clone(),
		));
		let handler: Arc<dyn ChannelMessageHandler + Send + Sync> = node.clone();
		transport.register(&address, Arc::downgrade(&handler));
		nodes.push(Node { node, keys_manager, wallet, tx_broadcaster, peers, logger, address });
	}
	for node in nodes.iter() {
		for other in nodes.iter().filter(|other| other.address != node.address) {
			node.peers.add_peer(Peer { node_id: other.node_id(), address: other.address.clone() });
		}
	}
	Network { transport, nodes }
}

/// Checks the state number and our balance in the channel `$node` has with `$counterparty`.
macro_rules! check_channel_state {
	($node: expr, $counterparty: expr, $state: expr, $holder_balance: expr) => {{
		let details = $node.node.channel_details(&$counterparty.node_id()).await.unwrap();
		assert_eq!(details.state, $state);
		assert_eq!(details.holder_balance_satoshis, $holder_balance);
	}};
}

/// Opens a channel funded by `funder` and checks both ends agree on it.
pub async fn open_channel(funder: &Node, fundee: &Node, channel_value_satoshis: u64) -> ChannelId {
	let channel_id = funder
		.node
		.create_channel(fundee.node_id(), channel_value_satoshis, FEE_SATOSHIS)
		.await
		.unwrap();
	check_channel_state!(funder, fundee, 0, channel_value_satoshis);
	check_channel_state!(fundee, funder, 0, 0);
	assert_channels_in_sync(funder, fundee).await;
	channel_id
}

/// Checks each side's commitment transactions are the other side's counterparty transactions,
/// for every state, and that every superseded state was revoked by both.
pub async fn assert_channels_in_sync(a: &Node, b: &Node) {
	let a_txn = a
		.node
		.with_channel(&b.node_id(), |chan| {
			(chan.state(), txids(chan.holder_transactions()), txids(chan.counterparty_transactions()))
		})
		.await
		.unwrap();
	let b_txn = b
		.node
		.with_channel(&a.node_id(), |chan| {
			(chan.state(), txids(chan.holder_transactions()), txids(chan.counterparty_transactions()))
		})
		.await
		.unwrap();
	assert_eq!(a_txn.0, b_txn.0);
	assert_eq!(a_txn.1.len() as u64, a_txn.0 + 1);
	assert_eq!(a_txn.1, b_txn.2);
	assert_eq!(a_txn.2, b_txn.1);

	let state = a_txn.0;
	for (node, counterparty, counterparty_txids) in [(a, b, &b_txn.1), (b, a, &a_txn.1)] {
		node.node
			.with_channel(&counterparty.node_id(), |chan| {
				for (i, txid) in counterparty_txids.iter().enumerate() {
					let revoked = chan.revoked_commitment_info(txid).is_some();
					assert_eq!(revoked, (i as u64) < state);
				}
				assert_eq!(chan.revocation_registry().counterparty_revocations().count() as u64, state);
			})
			.await
			.unwrap();
	}
}

fn txids(txn: &[bitcoin::Transaction]) -> Vec<Txid> {
	txn.iter().map(|tx| tx.compute_txid()).collect()
}
