// This file is Copyright its original authors, visible in version control
// history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

use crate::chain::chaininterface::BroadcasterInterface;
use crate::ln::channel_id::ChannelId;
use crate::ln::msgs::{
	ChannelMessageHandler, ChannelTransport, OpenChannelRequest, OpenChannelResponse,
	RevealRevocationKeyRequest, RevocationKey, TransportError, UpdateTransactionRequest,
	UpdatedTransactions,
};
use crate::ln::peer_directory::Peer;
use crate::util::async_poll::AsyncResult;
use crate::util::errors::APIError;
use crate::util::logger::{Level, Logger, Record};

use bitcoin::secp256k1::PublicKey;
use bitcoin::transaction::Transaction;

use core::time::Duration;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Weak};

pub struct TestBroadcaster {
	pub txn_broadcasted: Mutex<Vec<Transaction>>,
}

impl TestBroadcaster {
	pub fn new() -> TestBroadcaster {
		TestBroadcaster { txn_broadcasted: Mutex::new(Vec::new()) }
	}

	pub fn txn_broadcast(&self) -> Vec<Transaction> {
		self.txn_broadcasted.lock().unwrap().clone()
	}
}

impl BroadcasterInterface for TestBroadcaster {
	fn broadcast_transactions(&self, txs: &[&Transaction]) {
		let mut txn = self.txn_broadcasted.lock().unwrap();
		for tx in txs {
			txn.push((*tx).clone());
		}
	}
}

pub struct TestLogger {
	level: Level,
	id: String,
	pub lines: Mutex<HashMap<(&'static str, String), usize>>,
	pub context: Mutex<HashMap<(&'static str, Option<PublicKey>, Option<ChannelId>), usize>>,
}

impl TestLogger {
	pub fn new() -> TestLogger {
		Self::with_id("".to_owned())
	}
	pub fn with_id(id: String) -> TestLogger {
		TestLogger {
			level: Level::Trace,
			id,
			lines: Mutex::new(HashMap::new()),
			context: Mutex::new(HashMap::new()),
		}
	}

	/// Search for the number of occurrence of the logged lines which
	/// 1. belongs to the specified module and
	/// 2. contains `line` in it.
	/// And asserts if the number of occurrences is the same with the given `count`
	pub fn assert_log_contains(&self, module: &str, line: &str, count: usize) {
		let log_entries = self.lines.lock().unwrap();
		let l: usize = log_entries
			.iter()
			.filter(|&(&(ref m, ref l), _c)| *m == module && l.contains(line))
			.map(|(_, c)| c)
			.sum();
		assert_eq!(l, count)
	}

	/// Search for the number of occurrences of logged lines which
	/// 1. belong to the specified module and
	/// 2. match the given regex pattern.
	/// Assert that the number of occurrences equals the given `count`
	pub fn assert_log_regex(&self, module: &str, pattern: regex::Regex, count: usize) {
		let log_entries = self.lines.lock().unwrap();
		let l: usize = log_entries
			.iter()
			.filter(|&(&(ref m, ref l), _c)| *m == module && pattern.is_match(&l))
			.map(|(_, c)| c)
			.sum();
		assert_eq!(l, count)
	}

	pub fn assert_log_context_contains(
		&self, module: &str, peer_id: Option<PublicKey>, channel_id: Option<ChannelId>,
		count: usize,
	) {
		let context_entries = self.context.lock().unwrap();
		let l: usize = context_entries
			.iter()
			.filter(|&(&(m, p, c), _)| m == module && p == peer_id && c == channel_id)
			.map(|(_, c)| c)
			.sum();
		assert_eq!(l, count)
	}
}

impl Logger for TestLogger {
	fn log(&self, record: Record) {
		let context =
			format!("{} {} [{}:{}]", self.id, record.level, record.module_path, record.line);
		let s = format!("{:<55} {}", context, record.args);
		*self
			.lines
			.lock()
			.unwrap()
			.entry((record.module_path, format!("{}", record.args)))
			.or_insert(0) += 1;
		*self
			.context
			.lock()
			.unwrap()
			.entry((record.module_path, record.peer_id, record.channel_id))
			.or_insert(0) += 1;
		if record.level >= self.level {
			println!("{}", s);
		}
	}
}

/// Delivers requests straight to the [`ChannelMessageHandler`] registered at the peer's address,
/// with knobs to inject the faults a real network would.
pub struct TestTransport {
	handlers: Mutex<HashMap<String, Weak<dyn ChannelMessageHandler + Send + Sync>>>,
	/// Fail every open request before it reaches the peer.
	pub fail_opens: AtomicBool,
	/// Deliver open requests but drop the peer's response.
	pub lose_open_replies: AtomicBool,
	/// Never deliver revocation reveals, leaving the sender to time out.
	pub stall_reveals: AtomicBool,
	/// Deliver revocation reveals but drop the peer's response.
	pub lose_reveal_replies: AtomicBool,
	/// Delay applied before delivering each request.
	pub latency: Mutex<Option<Duration>>,
	pub requests_delivered: AtomicUsize,
}

impl TestTransport {
	pub fn new() -> TestTransport {
		TestTransport {
			handlers: Mutex::new(HashMap::new()),
			fail_opens: AtomicBool::new(false),
			lose_open_replies: AtomicBool::new(false),
			stall_reveals: AtomicBool::new(false),
			lose_reveal_replies: AtomicBool::new(false),
			latency: Mutex::new(None),
			requests_delivered: AtomicUsize::new(0),
		}
	}

	pub fn register(&self, address: &str, handler: Weak<dyn ChannelMessageHandler + Send + Sync>) {
		self.handlers.lock().unwrap().insert(address.to_owned(), handler);
	}

	pub fn set_latency(&self, latency: Option<Duration>) {
		*self.latency.lock().unwrap() = latency;
	}

	async fn reach(
		&self, peer: &Peer,
	) -> Result<Arc<dyn ChannelMessageHandler + Send + Sync>, TransportError> {
		let latency = *self.latency.lock().unwrap();
		if let Some(latency) = latency {
			tokio::time::sleep(latency).await;
		}
		let handler = self.handlers.lock().unwrap().get(&peer.address).and_then(Weak::upgrade);
		match handler {
			Some(handler) => {
				self.requests_delivered.fetch_add(1, Ordering::AcqRel);
				Ok(handler)
			},
			None => {
				Err(TransportError::Disconnected { err: format!("No route to {}", peer.address) })
			},
		}
	}
}

fn rejected(e: APIError) -> TransportError {
	TransportError::Rejected { err: e.to_string() }
}

fn reply_lost() -> TransportError {
	TransportError::Disconnected { err: "Reply lost".to_owned() }
}

impl ChannelTransport for TestTransport {
	fn open_channel<'a>(
		&'a self, peer: &'a Peer, msg: OpenChannelRequest,
	) -> AsyncResult<'a, OpenChannelResponse, TransportError> {
		Box::pin(async move {
			if self.fail_opens.load(Ordering::Acquire) {
				return Err(TransportError::Disconnected { err: "Connection reset".to_owned() });
			}
			let handler = self.reach(peer).await?;
			let res = handler.handle_open_channel(&msg).map_err(rejected);
			if self.lose_open_replies.load(Ordering::Acquire) {
				return Err(reply_lost());
			}
			res
		})
	}

	fn update_transaction<'a>(
		&'a self, peer: &'a Peer, msg: UpdateTransactionRequest,
	) -> AsyncResult<'a, UpdatedTransactions, TransportError> {
		Box::pin(async move {
			let handler = self.reach(peer).await?;
			handler.handle_update_transaction(&msg).map_err(rejected)
		})
	}

	fn reveal_revocation_key<'a>(
		&'a self, peer: &'a Peer, msg: RevealRevocationKeyRequest,
	) -> AsyncResult<'a, RevocationKey, TransportError> {
		Box::pin(async move {
			if self.stall_reveals.load(Ordering::Acquire) {
				std::future::pending::<()>().await;
			}
			let handler = self.reach(peer).await?;
			let res = handler.handle_reveal_revocation_key(&msg).map_err(rejected);
			if self.lose_reveal_replies.load(Ordering::Acquire) {
				return Err(reply_lost());
			}
			res
		})
	}
}
