// This file is Copyright its original authors, visible in version control
// history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

#![crate_name = "lightning_channels"]

//! Two-party revocable payment channels.
//!
//! A channel is opened by a funder who builds an on-chain funding transaction locking coins into
//! a 2-of-2 output, plus a refund (state 0) commitment which the fundee countersigns before the
//! funding transaction is ever broadcast. After that the two parties exchange successive
//! commitment transactions off-chain. Each superseded commitment is revoked by revealing the
//! secret key which guards the broadcaster's balance in it, so broadcasting a stale state lets the
//! counterparty claim that balance.
//!
//! The chain, the transport and the peer directory are supplied by the user through the traits in
//! [`chain`], [`ln::msgs`] and [`ln::peer_directory`]. Most users will want to create a
//! [`ln::channelmanager::ChannelManager`] and route inbound requests into it via its
//! [`ln::msgs::ChannelMessageHandler`] implementation.

#![warn(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![deny(rustdoc::private_intra_doc_links)]
#![cfg_attr(docsrs, feature(doc_auto_cfg))]

extern crate bitcoin;
#[cfg(test)]
extern crate regex;

#[macro_use]
pub mod util;
pub(crate) mod crypto;
pub mod chain;
pub mod ln;
pub mod sign;
