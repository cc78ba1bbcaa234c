// This file is Copyright its original authors, visible in version control
// history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

//! Tests that test the full channel protocol between nodes, through their ChannelManagers.

use crate::chain::ledger::ScriptType;
use crate::ln::chan_utils::{get_revokeable_redeemscript, ChannelRole, REVOCATION_CONTEST_DELAY};
use crate::ln::functional_test_utils::*;
use crate::ln::msgs::{ChannelMessageHandler, RevealRevocationKeyRequest, UpdateTransactionRequest};
use crate::util::config::UserConfig;
use crate::util::errors::APIError;

use bitcoin::consensus::encode::serialize;
use bitcoin::secp256k1::{PublicKey, Secp256k1, SecretKey};

use core::time::Duration;
use std::sync::atomic::Ordering;

const CHANNEL_MODULE: &str = "lightning_channels::ln::channel";
const MANAGER_MODULE: &str = "lightning_channels::ln::channelmanager";

#[tokio::test]
async fn test_open_channel() {
	let network = create_network(2);
	let (alice, bob) = (&network.nodes[0], &network.nodes[1]);

	let channel_id = open_channel(alice, bob, 100_000).await;

	let alice_channels = alice.node.list_channels().await;
	let bob_channels = bob.node.list_channels().await;
	assert_eq!(alice_channels.len(), 1);
	assert_eq!(bob_channels.len(), 1);
	assert_eq!(alice_channels[0].channel_id, channel_id);
	assert_eq!(bob_channels[0].channel_id, channel_id);
	assert_eq!(alice_channels[0].role, ChannelRole::Funder);
	assert_eq!(bob_channels[0].role, ChannelRole::Fundee);
	assert_eq!(alice_channels[0].counterparty_node_id, bob.node_id());
	assert_eq!(alice_channels[0].channel_value_satoshis, 100_000);
	assert_eq!(bob_channels[0].counterparty_balance_satoshis, 100_000);

	// Only the funder broadcasts, and only once the refund transaction is signed.
	let broadcast = alice.tx_broadcaster.txn_broadcast();
	assert_eq!(broadcast.len(), 1);
	assert_eq!(broadcast[0].compute_txid(), alice_channels[0].funding_txid);
	assert!(broadcast[0].input.iter().all(|input| !input.witness.is_empty()));
	assert_eq!(broadcast[0].output[0].value.to_sat(), 100_000 + FEE_SATOSHIS);
	assert!(bob.tx_broadcaster.txn_broadcast().is_empty());

	assert_eq!(alice.wallet.spendable_balance(), WALLET_BALANCE_SATOSHIS - 100_000 - 2 * FEE_SATOSHIS);
	assert_eq!(bob.wallet.spendable_balance(), WALLET_BALANCE_SATOSHIS);

	alice.logger.assert_log_contains(MANAGER_MODULE, "is open at state 0", 1);
	bob.logger.assert_log_contains(MANAGER_MODULE, "Accepted channel from", 1);
	alice.logger.assert_log_context_contains(
		CHANNEL_MODULE,
		Some(bob.node_id()),
		Some(channel_id),
		2,
	);
}

#[tokio::test]
async fn test_update_round() {
	let network = create_network(2);
	let (alice, bob) = (&network.nodes[0], &network.nodes[1]);
	open_channel(alice, bob, 100_000).await;

	assert_eq!(alice.node.update_state(bob.node_id(), 60_000).await, Ok(1));
	check_channel_state!(alice, bob, 1, 60_000);
	check_channel_state!(bob, alice, 1, 40_000);
	assert_channels_in_sync(alice, bob).await;

	// Each side revoked its refund transaction. The funder's balance output is the only one
	// worth punishing in it.
	let secp_ctx = Secp256k1::new();
	let refund = alice
		.node
		.with_channel(&bob.node_id(), |chan| chan.holder_transactions()[0].clone())
		.await
		.unwrap();
	let (cheater, info) = bob.node.find_revoked_commitment(&refund).await.unwrap();
	assert_eq!(cheater, alice.node_id());
	assert_eq!(info.output_index, 0);
	assert_eq!(info.script_type, ScriptType::P2wsh);
	assert_eq!(info.punishable_output.value.to_sat(), 100_000);
	let revocation_pubkey = PublicKey::from_secret_key(&secp_ctx, &info.revocation_key);
	let expected =
		get_revokeable_redeemscript(&revocation_pubkey, REVOCATION_CONTEST_DELAY, &alice.node_id());
	assert_eq!(info.punishable_output.script_pubkey, expected.to_p2wsh());

	// Alice holds Bob's refund secret too, but the refund pays Bob directly so there is nothing
	// to claim should it confirm.
	let info = alice
		.node
		.with_channel(&bob.node_id(), |chan| {
			chan.revoked_commitment_info(&refund.compute_txid()).cloned()
		})
		.await
		.unwrap()
		.unwrap();
	assert_eq!(info.output_index, 1);
	assert_eq!(info.script_type, ScriptType::P2wpkh);
	assert!(alice.node.find_revoked_commitment(&refund).await.is_none());
	alice.logger.assert_log_contains(MANAGER_MODULE, "Counterparty broadcast revoked commitment", 0);

	alice.logger.assert_log_contains(MANAGER_MODULE, "Completed update round with", 1);
	bob.logger.assert_log_contains(MANAGER_MODULE, "Completed update round initiated by", 1);
	bob.logger.assert_log_regex(
		CHANNEL_MODULE,
		regex::Regex::new(r"Channel advanced to state 1, our balance 40000 sat").unwrap(),
		1,
	);
}

#[tokio::test]
async fn test_rounds_in_both_directions() {
	let network = create_network(2);
	let (alice, bob) = (&network.nodes[0], &network.nodes[1]);
	open_channel(alice, bob, 100_000).await;

	assert_eq!(alice.node.transfer(bob.node_id(), 30_000).await, Ok(1));
	assert_eq!(bob.node.transfer(alice.node_id(), 10_000).await, Ok(2));
	assert_eq!(alice.node.transfer(bob.node_id(), 5_000).await, Ok(3));
	assert_eq!(bob.node.update_state(alice.node_id(), 25_000).await, Ok(4));

	check_channel_state!(alice, bob, 4, 75_000);
	check_channel_state!(bob, alice, 4, 25_000);
	assert_channels_in_sync(alice, bob).await;

	let details = alice.node.channel_details(&bob.node_id()).await.unwrap();
	assert_eq!(details.revoked_counterparty_commitments, 4);
	assert_eq!(details.holder_balance_satoshis + details.counterparty_balance_satoshis, 100_000);
}

#[tokio::test]
async fn test_revoked_commitment_detection() {
	let network = create_network(2);
	let (alice, bob) = (&network.nodes[0], &network.nodes[1]);
	open_channel(alice, bob, 100_000).await;
	alice.node.transfer(bob.node_id(), 40_000).await.unwrap();
	alice.node.transfer(bob.node_id(), 10_000).await.unwrap();

	let (alice_txn, bob_txn) = (
		alice.node.with_channel(&bob.node_id(), |chan| chan.holder_transactions().to_vec()).await.unwrap(),
		bob.node.with_channel(&alice.node_id(), |chan| chan.holder_transactions().to_vec()).await.unwrap(),
	);

	// Bob's balance of 40000 sat at state 1 pays out to Bob only after the contest delay.
	let (cheater, info) = alice.node.find_revoked_commitment(&bob_txn[1]).await.unwrap();
	assert_eq!(cheater, bob.node_id());
	assert_eq!(info.txid, bob_txn[1].compute_txid());
	assert_eq!(info.output_index, 1);
	assert_eq!(info.script_type, ScriptType::P2wsh);
	assert_eq!(info.punishable_output.value.to_sat(), 40_000);

	let (cheater, info) = bob.node.find_revoked_commitment(&alice_txn[1]).await.unwrap();
	assert_eq!(cheater, alice.node_id());
	assert_eq!(info.output_index, 0);
	assert_eq!(info.punishable_output.value.to_sat(), 60_000);

	// The current state is not revoked.
	assert!(alice.node.find_revoked_commitment(&bob_txn[2]).await.is_none());
	assert!(bob.node.find_revoked_commitment(&alice_txn[2]).await.is_none());
	// Nor are our own commitments, from our point of view.
	assert!(alice.node.find_revoked_commitment(&alice_txn[1]).await.is_none());
	alice.logger.assert_log_contains(MANAGER_MODULE, "Counterparty broadcast revoked commitment", 1);
}

#[tokio::test]
async fn test_duplicate_channel() {
	let network = create_network(2);
	let (alice, bob) = (&network.nodes[0], &network.nodes[1]);
	open_channel(alice, bob, 100_000).await;

	assert_eq!(
		alice.node.create_channel(bob.node_id(), 50_000, FEE_SATOSHIS).await,
		Err(APIError::DuplicateChannel { counterparty_node_id: bob.node_id() })
	);
	assert_eq!(
		bob.node.create_channel(alice.node_id(), 50_000, FEE_SATOSHIS).await,
		Err(APIError::DuplicateChannel { counterparty_node_id: alice.node_id() })
	);
	assert_eq!(alice.node.list_channels().await.len(), 1);
	assert_eq!(alice.tx_broadcaster.txn_broadcast().len(), 1);
	assert!(bob.tx_broadcaster.txn_broadcast().is_empty());
	assert_eq!(bob.wallet.spendable_balance(), WALLET_BALANCE_SATOSHIS);
}

#[tokio::test]
async fn test_unknown_peer_and_missing_channel() {
	let network = create_network(3);
	let (alice, bob, carol) = (&network.nodes[0], &network.nodes[1], &network.nodes[2]);
	open_channel(alice, bob, 100_000).await;

	assert_eq!(
		alice.node.transfer(carol.node_id(), 1_000).await,
		Err(APIError::ChannelNotFound { counterparty_node_id: carol.node_id() })
	);
	assert!(alice.node.channel_details(&carol.node_id()).await.is_err());

	let secp_ctx = Secp256k1::new();
	let stranger = PublicKey::from_secret_key(&secp_ctx, &SecretKey::from_slice(&[0xab; 32]).unwrap());
	assert_eq!(
		alice.node.create_channel(stranger, 100_000, FEE_SATOSHIS).await,
		Err(APIError::UnknownPeer { address: stranger.to_string() })
	);
	assert_eq!(
		alice.node.update_state(stranger, 1_000).await,
		Err(APIError::UnknownPeer { address: stranger.to_string() })
	);

	// Once Bob forgets Alice, Alice's requests are refused.
	bob.peers.remove_peer(&alice.node_id());
	match alice.node.transfer(bob.node_id(), 1_000).await {
		Err(APIError::TransportFailure { err }) => assert!(err.contains(&alice.address)),
		res => panic!("Unexpected result {:?}", res),
	}
	check_channel_state!(alice, bob, 0, 100_000);
}

#[tokio::test]
async fn test_funding_limits() {
	let network = create_network(2);
	let (alice, bob) = (&network.nodes[0], &network.nodes[1]);
	let limits = UserConfig::default().channel_handshake_limits;

	match alice.node.create_channel(bob.node_id(), limits.min_funding_satoshis - 1, FEE_SATOSHIS).await {
		Err(APIError::APIMisuseError { .. }) => {},
		res => panic!("Unexpected result {:?}", res),
	}
	match alice.node.create_channel(bob.node_id(), limits.max_funding_satoshis + 1, FEE_SATOSHIS).await {
		Err(APIError::APIMisuseError { .. }) => {},
		res => panic!("Unexpected result {:?}", res),
	}
	match alice.node.create_channel(bob.node_id(), 2 * WALLET_BALANCE_SATOSHIS, FEE_SATOSHIS).await {
		Err(APIError::APIMisuseError { err }) => assert!(err.contains("Insufficient funds")),
		res => panic!("Unexpected result {:?}", res),
	}
	assert!(alice.node.list_channels().await.is_empty());
	assert!(bob.node.list_channels().await.is_empty());
	assert_eq!(network.transport.requests_delivered.load(Ordering::Acquire), 0);

	open_channel(alice, bob, 100_000).await;
}

#[tokio::test]
async fn test_insufficient_balance() {
	let network = create_network(2);
	let (alice, bob) = (&network.nodes[0], &network.nodes[1]);
	open_channel(alice, bob, 100_000).await;

	match alice.node.transfer(bob.node_id(), 100_001).await {
		Err(APIError::APIMisuseError { .. }) => {},
		res => panic!("Unexpected result {:?}", res),
	}
	match bob.node.transfer(alice.node_id(), 1).await {
		Err(APIError::APIMisuseError { .. }) => {},
		res => panic!("Unexpected result {:?}", res),
	}
	// Bob cannot pull funds either.
	match bob.node.update_state(alice.node_id(), 50_000).await {
		Err(APIError::APIMisuseError { .. }) => {},
		res => panic!("Unexpected result {:?}", res),
	}
	check_channel_state!(alice, bob, 0, 100_000);
	check_channel_state!(bob, alice, 0, 0);
	assert_eq!(network.transport.requests_delivered.load(Ordering::Acquire), 1);

	// A transfer of the whole balance is fine.
	assert_eq!(alice.node.transfer(bob.node_id(), 100_000).await, Ok(1));
	check_channel_state!(alice, bob, 1, 0);
	assert_channels_in_sync(alice, bob).await;
}

#[tokio::test]
async fn test_concurrent_transfers_are_serialized() {
	let network = create_network(2);
	let (alice, bob) = (&network.nodes[0], &network.nodes[1]);
	open_channel(alice, bob, 100_000).await;
	network.transport.set_latency(Some(Duration::from_millis(10)));

	let (a, b, c) = tokio::join!(
		alice.node.transfer(bob.node_id(), 10_000),
		alice.node.transfer(bob.node_id(), 20_000),
		alice.node.transfer(bob.node_id(), 5_000),
	);
	let mut states = vec![a.unwrap(), b.unwrap(), c.unwrap()];
	states.sort();
	assert_eq!(states, vec![1, 2, 3]);

	check_channel_state!(alice, bob, 3, 65_000);
	check_channel_state!(bob, alice, 3, 35_000);
	assert_channels_in_sync(alice, bob).await;
}

#[tokio::test(start_paused = true)]
async fn test_simultaneous_initiation() {
	let network = create_network(2);
	let (alice, bob) = (&network.nodes[0], &network.nodes[1]);
	open_channel(alice, bob, 100_000).await;
	alice.node.transfer(bob.node_id(), 50_000).await.unwrap();
	network.transport.set_latency(Some(Duration::from_secs(1)));

	// Each side holds its own channel while its request is in flight, so at least one request
	// finds its counterparty busy. Neither side waits on the other.
	let (a, b) = tokio::join!(
		alice.node.transfer(bob.node_id(), 1_000),
		bob.node.transfer(alice.node_id(), 2_000),
	);
	assert!(a.is_err() || b.is_err());
	for res in [&a, &b] {
		if let Err(e) = res {
			match e {
				APIError::TransportFailure { err } => assert!(err.contains("busy")),
				_ => panic!("Unexpected error {:?}", e),
			}
		}
	}
	let expected_state = 1 + a.is_ok() as u64 + b.is_ok() as u64;
	let sent = if a.is_ok() { 1_000 } else { 0 };
	let received = if b.is_ok() { 2_000 } else { 0 };
	let alice_balance = 50_000 - sent + received;
	check_channel_state!(alice, bob, expected_state, alice_balance);
	assert_channels_in_sync(alice, bob).await;

	// Taking turns works.
	network.transport.set_latency(None);
	assert_eq!(alice.node.transfer(bob.node_id(), 1_000).await, Ok(expected_state + 1));
	assert_eq!(bob.node.transfer(alice.node_id(), 1_000).await, Ok(expected_state + 2));
	assert_channels_in_sync(alice, bob).await;
}

#[tokio::test]
async fn test_failed_open_rolls_back() {
	let network = create_network(2);
	let (alice, bob) = (&network.nodes[0], &network.nodes[1]);

	network.transport.fail_opens.store(true, Ordering::Release);
	match alice.node.create_channel(bob.node_id(), 100_000, FEE_SATOSHIS).await {
		Err(APIError::TransportFailure { .. }) => {},
		res => panic!("Unexpected result {:?}", res),
	}
	assert!(alice.node.list_channels().await.is_empty());
	assert!(bob.node.list_channels().await.is_empty());
	assert!(alice.tx_broadcaster.txn_broadcast().is_empty());
	assert_eq!(alice.wallet.spendable_balance(), WALLET_BALANCE_SATOSHIS);
	alice.logger.assert_log_contains(MANAGER_MODULE, "removing provisional channel", 1);

	network.transport.fail_opens.store(false, Ordering::Release);
	open_channel(alice, bob, 100_000).await;
	assert_eq!(alice.tx_broadcaster.txn_broadcast().len(), 1);
}

#[tokio::test]
async fn test_rejected_open_rolls_back() {
	let network = create_network(2);
	let (alice, bob) = (&network.nodes[0], &network.nodes[1]);

	// Bob does not know Alice, so refuses the channel.
	bob.peers.remove_peer(&alice.node_id());
	match alice.node.create_channel(bob.node_id(), 100_000, FEE_SATOSHIS).await {
		Err(APIError::TransportFailure { err }) => assert!(err.contains("Unknown peer")),
		res => panic!("Unexpected result {:?}", res),
	}
	assert!(alice.node.list_channels().await.is_empty());
	assert!(bob.node.list_channels().await.is_empty());
	assert_eq!(alice.wallet.spendable_balance(), WALLET_BALANCE_SATOSHIS);
}

#[tokio::test(start_paused = true)]
async fn test_cancelled_open_rolls_back() {
	let network = create_network(2);
	let (alice, bob) = (&network.nodes[0], &network.nodes[1]);

	network.transport.set_latency(Some(Duration::from_secs(10)));
	let res = tokio::time::timeout(
		Duration::from_secs(1),
		alice.node.create_channel(bob.node_id(), 100_000, FEE_SATOSHIS),
	)
	.await;
	assert!(res.is_err());
	assert!(alice.node.list_channels().await.is_empty());
	assert_eq!(alice.wallet.spendable_balance(), WALLET_BALANCE_SATOSHIS);

	network.transport.set_latency(None);
	open_channel(alice, bob, 100_000).await;
}

#[tokio::test(start_paused = true)]
async fn test_stalled_reveal_times_out() {
	let mut config = UserConfig::default();
	config.peer_response_timeout = Duration::from_secs(5);
	let network = create_network_with_config(2, config);
	let (alice, bob) = (&network.nodes[0], &network.nodes[1]);
	open_channel(alice, bob, 100_000).await;

	network.transport.stall_reveals.store(true, Ordering::Release);
	match alice.node.transfer(bob.node_id(), 10_000).await {
		Err(APIError::TransportFailure { err }) => assert!(err.contains("did not answer")),
		res => panic!("Unexpected result {:?}", res),
	}
	check_channel_state!(alice, bob, 0, 100_000);
	check_channel_state!(bob, alice, 0, 0);
	alice.logger.assert_log_contains(MANAGER_MODULE, "is pending until it returns its revocation", 1);

	// Alice's secret may already be with Bob, so that round is finished before the next starts.
	network.transport.stall_reveals.store(false, Ordering::Release);
	assert_eq!(alice.node.transfer(bob.node_id(), 10_000).await, Ok(2));
	alice.logger.assert_log_contains(MANAGER_MODULE, "Completed pending update round with", 1);
	bob.logger.assert_log_contains(MANAGER_MODULE, "Completed update round initiated by", 2);
	check_channel_state!(alice, bob, 2, 80_000);
	check_channel_state!(bob, alice, 2, 20_000);
	assert_channels_in_sync(alice, bob).await;
}

#[tokio::test]
async fn test_lost_revocation_reply_recovers() {
	let network = create_network(2);
	let (alice, bob) = (&network.nodes[0], &network.nodes[1]);
	open_channel(alice, bob, 100_000).await;

	// Bob commits to state 1 but Alice never hears back.
	network.transport.lose_reveal_replies.store(true, Ordering::Release);
	match alice.node.transfer(bob.node_id(), 10_000).await {
		Err(APIError::TransportFailure { err }) => assert!(err.contains("Reply lost")),
		res => panic!("Unexpected result {:?}", res),
	}
	check_channel_state!(alice, bob, 0, 100_000);
	check_channel_state!(bob, alice, 1, 10_000);

	// Bob cannot start a round while Alice's is incomplete.
	network.transport.lose_reveal_replies.store(false, Ordering::Release);
	match bob.node.transfer(alice.node_id(), 1_000).await {
		Err(APIError::TransportFailure { err }) => assert!(err.contains("previous update")),
		res => panic!("Unexpected result {:?}", res),
	}
	check_channel_state!(bob, alice, 1, 10_000);

	// Alice's next transfer completes the first round, Bob answering with the secret it already
	// disclosed, before running its own.
	assert_eq!(alice.node.transfer(bob.node_id(), 5_000).await, Ok(2));
	bob.logger.assert_log_contains(CHANNEL_MODULE, "Disclosing revocation key for", 1);
	check_channel_state!(alice, bob, 2, 85_000);
	check_channel_state!(bob, alice, 2, 15_000);
	assert_channels_in_sync(alice, bob).await;

	assert_eq!(bob.node.transfer(alice.node_id(), 1_000).await, Ok(3));
	check_channel_state!(alice, bob, 3, 86_000);
	assert_channels_in_sync(alice, bob).await;
}

#[tokio::test]
async fn test_lost_open_reply_recovers() {
	let network = create_network(2);
	let (alice, bob) = (&network.nodes[0], &network.nodes[1]);

	// Bob accepts the channel but Alice never hears back, so Alice rolls back.
	network.transport.lose_open_replies.store(true, Ordering::Release);
	match alice.node.create_channel(bob.node_id(), 100_000, FEE_SATOSHIS).await {
		Err(APIError::TransportFailure { err }) => assert!(err.contains("Reply lost")),
		res => panic!("Unexpected result {:?}", res),
	}
	assert!(alice.node.list_channels().await.is_empty());
	assert_eq!(bob.node.list_channels().await.len(), 1);
	assert_eq!(alice.wallet.spendable_balance(), WALLET_BALANCE_SATOSHIS);
	network.transport.lose_open_replies.store(false, Ordering::Release);

	// Only the same request is answered again, anything else is a second channel.
	match alice.node.create_channel(bob.node_id(), 90_000, FEE_SATOSHIS).await {
		Err(APIError::TransportFailure { err }) => assert!(err.contains("Already have a channel")),
		res => panic!("Unexpected result {:?}", res),
	}
	assert_eq!(alice.wallet.spendable_balance(), WALLET_BALANCE_SATOSHIS);

	let channel_id = open_channel(alice, bob, 100_000).await;
	assert_eq!(bob.node.list_channels().await[0].channel_id, channel_id);
	bob.logger.assert_log_contains(MANAGER_MODULE, "Accepted channel from", 1);
	bob.logger.assert_log_contains(MANAGER_MODULE, "Repeating our acceptance of the channel", 1);
	assert_eq!(alice.tx_broadcaster.txn_broadcast().len(), 1);

	assert_eq!(alice.node.transfer(bob.node_id(), 1_000).await, Ok(1));
	assert_channels_in_sync(alice, bob).await;
}

#[tokio::test]
async fn test_requests_without_channel_are_refused() {
	let network = create_network(3);
	let (alice, bob, carol) = (&network.nodes[0], &network.nodes[1], &network.nodes[2]);
	open_channel(alice, bob, 100_000).await;
	let refund = alice
		.node
		.with_channel(&bob.node_id(), |chan| chan.holder_transactions()[0].clone())
		.await
		.unwrap();

	// Carol knows Alice but has no channel with Alice.
	let update = UpdateTransactionRequest {
		transaction: serialize(&refund),
		address: alice.address.clone(),
	};
	assert_eq!(
		carol.node.handle_update_transaction(&update),
		Err(APIError::ChannelNotFound { counterparty_node_id: alice.node_id() })
	);
	let reveal = RevealRevocationKeyRequest {
		signed_transaction: serialize(&refund),
		revocation_key: SecretKey::from_slice(&[0x42; 32]).unwrap(),
		address: alice.address.clone(),
	};
	assert_eq!(
		carol.node.handle_reveal_revocation_key(&reveal),
		Err(APIError::ChannelNotFound { counterparty_node_id: alice.node_id() })
	);
	assert!(carol.node.list_channels().await.is_empty());
	check_channel_state!(alice, bob, 0, 100_000);
	check_channel_state!(bob, alice, 0, 0);
}

#[tokio::test]
async fn test_channels_with_many_peers() {
	let network = create_network(3);
	let (alice, bob, carol) = (&network.nodes[0], &network.nodes[1], &network.nodes[2]);
	open_channel(alice, bob, 100_000).await;
	open_channel(carol, alice, 200_000).await;

	alice.node.transfer(bob.node_id(), 1_000).await.unwrap();
	carol.node.transfer(alice.node_id(), 2_000).await.unwrap();
	alice.node.transfer(carol.node_id(), 500).await.unwrap();

	let mut channels = alice.node.list_channels().await;
	channels.sort_by_key(|details| details.channel_value_satoshis);
	assert_eq!(channels.len(), 2);
	assert_eq!((channels[0].counterparty_node_id, channels[0].state), (bob.node_id(), 1));
	assert_eq!(channels[0].holder_balance_satoshis, 99_000);
	assert_eq!((channels[1].counterparty_node_id, channels[1].state), (carol.node_id(), 2));
	assert_eq!(channels[1].holder_balance_satoshis, 1_500);
	assert_eq!(channels[1].role, ChannelRole::Fundee);
	assert_channels_in_sync(alice, bob).await;
	assert_channels_in_sync(alice, carol).await;
}
