// This file is Copyright its original authors, visible in version control
// history.
//
// This file is licensed under the Apache License, Version 2.0 <LICENSE-APACHE
// or http://www.apache.org/licenses/LICENSE-2.0> or the MIT license
// <LICENSE-MIT or http://opensource.org/licenses/MIT>, at your option.
// You may not use this file except in accordance with one or both of these
// licenses.

//! Some utilities to make working with the standard library's [`Future`]s easier

use core::future::Future;
use core::pin::Pin;

/// A type alias for a future that returns a result of type T with error type E.
///
/// Used wherever a trait method has to hand back a future, e.g. requests sent through a
/// [`ChannelTransport`].
///
/// [`ChannelTransport`]: crate::ln::msgs::ChannelTransport
pub type AsyncResult<'a, T, E> = Pin<Box<dyn Future<Output = Result<T, E>> + 'a + Send>>;
