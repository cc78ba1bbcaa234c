// This file is Copyright its original authors, visible in version control
// history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

//! ChannelId definition.

use bitcoin::hashes::Hash;
use bitcoin::transaction::OutPoint;

use core::fmt;

/// A unique 32-byte identifier for a channel, derived from the funding transaction outpoint
/// (txid & index).
///
/// Both parties know the funding transaction before the channel is opened, so they agree on the
/// id from the first message on.
#[derive(Clone, Copy, Debug, Eq, Hash, Ord, PartialEq, PartialOrd)]
pub struct ChannelId(pub [u8; 32]);

impl ChannelId {
	/// Create a channel ID based on a funding TX ID and output index
	pub fn v1_from_funding_txid(txid: &[u8; 32], output_index: u16) -> Self {
		let mut res = [0; 32];
		res[..].copy_from_slice(&txid[..]);
		res[30] ^= ((output_index >> 8) & 0xff) as u8;
		res[31] ^= (output_index & 0xff) as u8;
		Self(res)
	}

	/// Create a channel ID from the funding outpoint.
	pub fn v1_from_funding_outpoint(outpoint: &OutPoint) -> Self {
		Self::v1_from_funding_txid(outpoint.txid.as_byte_array(), outpoint.vout as u16)
	}
}

impl fmt::Display for ChannelId {
	fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
		fmt::Display::fmt(&crate::util::logger::DebugBytes(&self.0), f)
	}
}
