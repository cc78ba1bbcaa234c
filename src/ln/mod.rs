// This file is Copyright its original authors, visible in version control
// history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

//! High level channel structs and impls live here.
//!
//! You probably want to create a [`channelmanager::ChannelManager`] first, register it with your
//! [`msgs::ChannelTransport`] so our peers' requests reach its [`msgs::ChannelMessageHandler`]
//! implementation, and then open channels and move funds through it.

pub mod chan_utils;
pub mod channel_id;
pub mod channelmanager;
pub mod msgs;
pub mod peer_directory;
pub mod revocation;

mod channel;

#[cfg(test)]
#[macro_use]
mod functional_test_utils;
#[cfg(test)]
mod functional_tests;
