// SPDX-License-Identifier: Apache-2.0

use flume::r#async::SendFut;
use flume::{Receiver, Sender, TryRecvError};
use std::fmt;
use std::time::Duration;

pub struct BoundedSender<T> {
    tx: Sender<T>,
}

#[derive(Debug, PartialEq, Eq)]
pub enum SendError {
    Disconnected,
}

impl fmt::Display for SendError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SendError::Disconnected => write!(f, "channel disconnected"),
        }
    }
}

impl std::error::Error for SendError {}

/// Outcome of a non-blocking receive.
#[derive(Debug, PartialEq, Eq)]
pub enum TryRecv<T> {
    Item(T),
    Empty,
    Closed,
}

impl<T> BoundedSender<T> {
    /// Blocking send - blocks until there is capacity in the channel.
    /// Use this from non-async contexts (e.g., dedicated OS threads).
    pub fn send_blocking(&self, item: T) -> Result<(), SendError> {
        match self.tx.send(item) {
            Ok(()) => Ok(()),
            Err(_e) => Err(SendError::Disconnected), // receiver closed
        }
    }

    /// Blocking send that gives up after `timeout`, handing the item back so
    /// the caller can check for shutdown and retry.
    pub fn send_timeout(&self, item: T, timeout: Duration) -> Result<(), SendTimeout<T>> {
        match self.tx.send_timeout(item, timeout) {
            Ok(()) => Ok(()),
            Err(flume::SendTimeoutError::Timeout(item)) => Err(SendTimeout::Full(item)),
            Err(flume::SendTimeoutError::Disconnected(_)) => Err(SendTimeout::Disconnected),
        }
    }

    /// Send future that owns a clone of the sender, so it can be parked in a
    /// struct and polled across `select!` iterations without losing the item.
    pub fn send_owned(&self, item: T) -> SendFut<'static, T>
    where
        T: 'static,
    {
        self.tx.clone().into_send_async(item)
    }
}

/// Error returned by [`BoundedSender::send_timeout`].
#[derive(Debug, PartialEq, Eq)]
pub enum SendTimeout<T> {
    Full(T),
    Disconnected,
}

impl<T> Clone for BoundedSender<T> {
    fn clone(&self) -> Self {
        Self {
            tx: self.tx.clone(),
        }
    }
}

#[derive(Clone)]
pub struct BoundedReceiver<T> {
    rx: Receiver<T>,
}

impl<T> BoundedReceiver<T> {
    pub async fn next(&mut self) -> Option<T> {
        match self.rx.recv_async().await {
            Ok(item) => Some(item),
            Err(_e) => None, // disconnected
        }
    }

    /// Blocking receive - blocks until an item is available.
    /// Use this from non-async contexts (e.g., dedicated OS threads).
    pub fn recv_blocking(&self) -> Option<T> {
        match self.rx.recv() {
            Ok(item) => Some(item),
            Err(_e) => None, // disconnected
        }
    }

    /// Non-blocking receive that tells an empty channel apart from a closed one.
    pub fn poll_now(&self) -> TryRecv<T> {
        match self.rx.try_recv() {
            Ok(item) => TryRecv::Item(item),
            Err(TryRecvError::Empty) => TryRecv::Empty,
            Err(TryRecvError::Disconnected) => TryRecv::Closed,
        }
    }
}

pub fn bounded<T>(size: usize) -> (BoundedSender<T>, BoundedReceiver<T>) {
    let (tx, rx) = flume::bounded::<T>(size);

    let sender = BoundedSender { tx };
    let receiver = BoundedReceiver { rx };

    (sender, receiver)
}

#[cfg(test)]
mod tests {
    use super::{SendError, SendTimeout, TryRecv, bounded};
    use std::time::Duration;
    use tokio_test::{assert_ok, assert_pending, assert_ready, task::spawn};

    #[tokio::test]
    async fn basics() {
        let (tx, mut rx) = bounded(3);

        let msg = 10;

        let mut send1 = spawn(tx.send_owned(msg));
        let mut recv1 = spawn(async { rx.next().await });

        assert!(!send1.is_woken());
        assert!(!recv1.is_woken());

        assert_pending!(recv1.poll());

        assert_ok!(assert_ready!(send1.poll()));

        assert!(recv1.is_woken());

        assert_eq!(Some(msg), assert_ready!(recv1.poll()));

        drop(send1);
        drop(recv1);

        let mut recv2 = spawn(async { rx.next().await });

        drop(tx);
        // receives None since send channel was closed
        assert_eq!(None, assert_ready!(recv2.poll()));
    }

    #[tokio::test]
    async fn owned_send_waits_for_capacity() {
        let (tx, rx) = bounded::<u32>(1);
        tx.send_blocking(1).unwrap();

        let mut parked = spawn(tx.send_owned(2));
        assert_pending!(parked.poll());

        assert_eq!(rx.poll_now(), TryRecv::Item(1));
        assert_ok!(assert_ready!(parked.poll()));
        assert_eq!(rx.poll_now(), TryRecv::Item(2));
    }

    #[tokio::test]
    async fn owned_send_fails_on_rx_close() {
        let (tx, rx) = bounded::<u32>(1);

        tx.send_blocking(1).unwrap();
        let mut parked = spawn(tx.send_owned(2));
        assert_pending!(parked.poll());

        drop(rx);
        assert!(assert_ready!(parked.poll()).is_err());
        assert_eq!(tx.send_blocking(3), Err(SendError::Disconnected));
    }

    #[test]
    fn poll_now_distinguishes_empty_and_closed() {
        let (tx, rx) = bounded::<u32>(2);
        assert_eq!(rx.poll_now(), TryRecv::Empty);
        tx.send_blocking(7).unwrap();
        assert_eq!(rx.poll_now(), TryRecv::Item(7));
        drop(tx);
        assert_eq!(rx.poll_now(), TryRecv::Closed);
    }

    #[test]
    fn send_timeout_returns_item_when_full() {
        let (tx, rx) = bounded::<u32>(1);
        tx.send_blocking(1).unwrap();
        match tx.send_timeout(2, Duration::from_millis(10)) {
            Err(SendTimeout::Full(item)) => assert_eq!(item, 2),
            other => panic!("unexpected result: {:?}", other),
        }

        assert_eq!(rx.recv_blocking(), Some(1));
        drop(rx);
        assert_eq!(
            tx.send_timeout(3, Duration::from_millis(10)),
            Err(SendTimeout::Disconnected)
        );
    }
}
