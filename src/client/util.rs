// SPDX-FileCopyrightText: Copyright (c) 2017-2024 slowtec GmbH <post@slowtec.de>
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Utilities for sharing a Modbus context

use std::{cell::RefCell, fmt, future::Future, pin::Pin, rc::Rc, time::Duration};

use crate::{client::Client, Error};

use super::Context;

/// Delay bounds for reconnect attempts.
///
/// The delay starts at `initial` and doubles on every failed attempt
/// until it reaches `max`. A successful reconnect resets it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReconnectDelay {
    pub initial: Duration,
    pub max: Duration,
}

impl Default for ReconnectDelay {
    fn default() -> Self {
        Self {
            initial: Duration::from_millis(100),
            max: Duration::from_secs(300),
        }
    }
}

/// Helper for sharing a context between multiple clients,
/// i.e. when addressing multiple slave devices in turn.
#[derive(Default)]
struct SharedContextHolder {
    context: Option<Rc<RefCell<Context>>>,
}

impl SharedContextHolder {
    fn new(initial_context: Option<Context>) -> Self {
        Self {
            context: initial_context.map(RefCell::new).map(Rc::new),
        }
    }

    fn disconnect(&mut self) {
        if let Some(context) = self.context.take() {
            context.borrow_mut().disconnect();
        }
    }

    fn reconnect(&mut self, context: Context) {
        self.context = Some(Rc::new(RefCell::new(context)));
    }

    fn is_connected(&self) -> bool {
        self.context.is_some()
    }

    fn share_context(&self) -> Option<Rc<RefCell<Context>>> {
        self.context.as_ref().map(Rc::clone)
    }
}

/// Trait for (re-)creating new contexts on demand.
///
/// Implement this trait for reconnecting a [`SharedContext`] on demand.
pub trait NewContext {
    /// Create a new context.
    fn new_context(&self) -> Pin<Box<dyn Future<Output = Result<Context, Error>>>>;
}

/// Reconnectable environment with a shared context.
pub struct SharedContext {
    shared_context: SharedContextHolder,
    new_context: Box<dyn NewContext>,
    reconnect_delay: ReconnectDelay,
    next_delay: Duration,
}

impl fmt::Debug for SharedContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedContext")
            .field("is_connected", &self.is_connected())
            .field("reconnect_delay", &self.reconnect_delay)
            .finish_non_exhaustive()
    }
}

impl SharedContext {
    /// Create a new instance with an optional, initial context and
    /// a trait object for reconnecting the shared context on demand.
    pub fn new(initial_context: Option<Context>, new_context: Box<dyn NewContext>) -> Self {
        Self::with_reconnect_delay(initial_context, new_context, ReconnectDelay::default())
    }

    pub fn with_reconnect_delay(
        initial_context: Option<Context>,
        new_context: Box<dyn NewContext>,
        reconnect_delay: ReconnectDelay,
    ) -> Self {
        Self {
            shared_context: SharedContextHolder::new(initial_context),
            new_context,
            reconnect_delay,
            next_delay: reconnect_delay.initial,
        }
    }

    /// Checks if a shared context is available.
    pub fn is_connected(&self) -> bool {
        self.shared_context.is_connected()
    }

    /// Try to obtain a shared context reference. The result is `None`
    /// if no context is available, i.e. if the shared context is not
    /// connected.
    ///
    /// The result should only be used temporarily for the next
    /// request and must not be reused later!
    pub fn share_context(&self) -> Option<Rc<RefCell<Context>>> {
        self.shared_context.share_context()
    }
}

/// Asynchronously (disconnect and) reconnect the shared context.
///
/// Failed attempts back off with the configured doubling delay before
/// returning, so a polling caller does not hammer an unreachable device.
pub async fn reconnect_shared_context(
    shared_context: &Rc<RefCell<SharedContext>>,
) -> Result<(), Error> {
    // The existing context needs to be disconnected first to release
    // any resources that might be reused for the new context, i.e. a
    // serial port with exclusive access.
    shared_context
        .borrow_mut()
        .shared_context
        .disconnect();
    debug_assert!(!shared_context.borrow().is_connected());

    let new_context_future = shared_context.borrow().new_context.new_context();
    match new_context_future.await {
        Ok(context) => {
            let mut sc = shared_context.borrow_mut();
            sc.next_delay = sc.reconnect_delay.initial;
            sc.shared_context.reconnect(context);
            Ok(())
        }
        Err(err) => {
            let delay = {
                let mut sc = shared_context.borrow_mut();
                let delay = sc.next_delay;
                sc.next_delay = (delay * 2).min(sc.reconnect_delay.max);
                delay
            };
            tokio::time::sleep(delay).await;
            Err(err)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use futures::future;

    use crate::client::tests::ClientMock;

    struct NewContextMock;

    impl NewContext for NewContextMock {
        fn new_context(&self) -> Pin<Box<dyn Future<Output = Result<Context, Error>>>> {
            let client: Box<dyn Client> = Box::new(ClientMock::default());
            Box::pin(future::ok(Context::from(client)))
        }
    }

    struct FailingContextMock;

    impl NewContext for FailingContextMock {
        fn new_context(&self) -> Pin<Box<dyn Future<Output = Result<Context, Error>>>> {
            Box::pin(future::err(Error::Connection(std::io::Error::new(
                std::io::ErrorKind::ConnectionRefused,
                "refused",
            ))))
        }
    }

    #[test]
    fn new_shared_context() {
        let disconnected = SharedContext::new(None, Box::new(NewContextMock));
        assert!(!disconnected.is_connected());
        assert!(disconnected.share_context().is_none());

        let client: Box<dyn Client> = Box::new(ClientMock::default());
        let connected = SharedContext::new(Some(Context::from(client)), Box::new(NewContextMock));
        assert!(connected.is_connected());
        assert!(connected.share_context().is_some());
    }

    #[tokio::test]
    async fn reconnect_shared_context() {
        let sc = SharedContext::new(None, Box::new(NewContextMock));
        assert!(!sc.is_connected());

        let sc = Rc::new(RefCell::new(sc));
        super::reconnect_shared_context(&sc).await.unwrap();
        assert!(sc.borrow().is_connected());
        assert!(sc.borrow().share_context().is_some());
    }

    #[tokio::test(start_paused = true)]
    async fn reconnect_failure_doubles_the_delay() {
        let delay = ReconnectDelay {
            initial: Duration::from_millis(100),
            max: Duration::from_millis(250),
        };
        let sc = Rc::new(RefCell::new(SharedContext::with_reconnect_delay(
            None,
            Box::new(FailingContextMock),
            delay,
        )));

        assert!(super::reconnect_shared_context(&sc).await.is_err());
        assert_eq!(sc.borrow().next_delay, Duration::from_millis(200));
        assert!(super::reconnect_shared_context(&sc).await.is_err());
        // Capped at the configured maximum
        assert_eq!(sc.borrow().next_delay, Duration::from_millis(250));
    }
}
