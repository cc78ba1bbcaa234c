// This file is Copyright its original authors, visible in version control
// history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

//! Traits and utility impls which allow this crate to interact with the blockchain.
//!
//! Includes traits for broadcasting transactions.

use bitcoin::transaction::Transaction;

use tokio::sync::mpsc;

/// An interface to send a transaction to the Bitcoin network.
pub trait BroadcasterInterface {
	/// Sends a list of transactions out to (hopefully) be mined.
	///
	/// Implementations must not block: the channel opening flow hands off its funding transaction
	/// here and carries on without waiting for it to be relayed or confirmed.
	fn broadcast_transactions(&self, txs: &[&Transaction]);
}

/// A [`BroadcasterInterface`] which pushes every transaction onto an unbounded queue, to be
/// drained and relayed by whatever task owns the receiving end.
pub struct BroadcastQueue {
	sender: mpsc::UnboundedSender<Transaction>,
}

impl BroadcastQueue {
	/// Creates a new queue, returning the receiver transactions will be delivered to.
	pub fn new() -> (Self, mpsc::UnboundedReceiver<Transaction>) {
		let (sender, receiver) = mpsc::unbounded_channel();
		(BroadcastQueue { sender }, receiver)
	}
}

impl BroadcasterInterface for BroadcastQueue {
	fn broadcast_transactions(&self, txs: &[&Transaction]) {
		for tx in txs {
			// A dropped receiver means nobody relays anymore, which is not ours to handle.
			let _ = self.sender.send((*tx).clone());
		}
	}
}
