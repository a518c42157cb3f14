//! Request coalescing for tile fetches.
//!
//! The first request for a tile becomes the leader and performs the fetch;
//! every later request for the same tile while it is in flight subscribes to
//! the leader's broadcast and receives the identical outcome.

use std::collections::{HashMap, HashSet};

use bytes::Bytes;
use parking_lot::Mutex;
use tokio::sync::broadcast;
use tracing::trace;

use super::key::TileKey;
use super::types::TileError;

/// Outcome broadcast to every waiter of one fetch.
pub type FetchOutcome = Result<Bytes, TileError>;

/// Result of registering interest in a tile.
#[derive(Debug)]
pub enum CoalesceResult {
    /// No fetch was in flight; the caller must fetch and then call
    /// [`RequestCoalescer::complete`].
    NewRequest {
        key: TileKey,
        rx: broadcast::Receiver<FetchOutcome>,
    },
    /// A fetch is already in flight; wait on the receiver.
    Coalesced(broadcast::Receiver<FetchOutcome>),
}

/// Tracks in-flight fetches keyed by tile.
///
/// A fetch whose waiters were already answered (timeout) but whose download
/// is still running is "abandoned": new requests start a fresh fetch, yet the
/// key stays pinned against eviction until [`release`](Self::release).
#[derive(Debug, Default)]
pub struct RequestCoalescer {
    in_flight: Mutex<HashMap<TileKey, broadcast::Sender<FetchOutcome>>>,
    abandoned: Mutex<HashMap<TileKey, usize>>,
}

impl RequestCoalescer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a request for `key`.
    pub fn register(&self, key: TileKey) -> CoalesceResult {
        let mut in_flight = self.in_flight.lock();
        if let Some(tx) = in_flight.get(&key) {
            trace!(tile = %key, waiters = tx.receiver_count(), "Coalescing tile request");
            return CoalesceResult::Coalesced(tx.subscribe());
        }
        // capacity 1: exactly one message is ever sent per channel
        let (tx, rx) = broadcast::channel(1);
        in_flight.insert(key, tx);
        CoalesceResult::NewRequest { key, rx }
    }

    /// Publishes the outcome to all waiters and forgets the fetch.
    ///
    /// Returns the number of receivers that were notified.
    pub fn complete(&self, key: TileKey, outcome: FetchOutcome) -> usize {
        let tx = self.in_flight.lock().remove(&key);
        match tx {
            Some(tx) => tx.send(outcome).unwrap_or(0),
            None => 0,
        }
    }

    /// Like [`complete`](Self::complete), but the download behind `key`
    /// keeps running. The key stays pinned until [`release`](Self::release).
    pub fn abandon(&self, key: TileKey, outcome: FetchOutcome) -> usize {
        *self.abandoned.lock().entry(key).or_insert(0) += 1;
        self.complete(key, outcome)
    }

    /// The abandoned download for `key` has finished.
    pub fn release(&self, key: TileKey) {
        let mut abandoned = self.abandoned.lock();
        if let Some(count) = abandoned.get_mut(&key) {
            *count -= 1;
            if *count == 0 {
                abandoned.remove(&key);
            }
        }
    }

    /// Fetches that still have waiters.
    pub fn in_flight_count(&self) -> usize {
        self.in_flight.lock().len()
    }

    /// Keys with a download running, abandoned ones included. Used to pin
    /// tiles against eviction.
    pub fn in_flight_keys(&self) -> HashSet<TileKey> {
        let mut keys: HashSet<TileKey> = self.in_flight.lock().keys().copied().collect();
        keys.extend(self.abandoned.lock().keys().copied());
        keys
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::catalog;

    fn key() -> TileKey {
        TileKey::new(catalog::lookup("cartoDB").unwrap(), 5, 3, 4)
    }

    #[tokio::test]
    async fn test_second_register_is_coalesced() {
        let coalescer = RequestCoalescer::new();

        let first = coalescer.register(key());
        let second = coalescer.register(key());

        let CoalesceResult::NewRequest { mut rx, .. } = first else {
            panic!("first request should lead");
        };
        let CoalesceResult::Coalesced(mut follower) = second else {
            panic!("second request should coalesce");
        };
        assert!(coalescer.in_flight_keys().contains(&key()));

        let notified = coalescer.complete(key(), Ok(Bytes::from_static(b"png")));
        assert_eq!(notified, 2);

        assert_eq!(rx.recv().await.unwrap().unwrap(), Bytes::from_static(b"png"));
        assert_eq!(
            follower.recv().await.unwrap().unwrap(),
            Bytes::from_static(b"png")
        );
        assert_eq!(coalescer.in_flight_count(), 0);
    }

    #[tokio::test]
    async fn test_failure_is_shared() {
        let coalescer = RequestCoalescer::new();
        let _leader = coalescer.register(key());
        let CoalesceResult::Coalesced(mut follower) = coalescer.register(key()) else {
            panic!("expected coalesced");
        };

        coalescer.complete(key(), Err(TileError::FetchFailed("timeout".into())));

        assert_eq!(
            follower.recv().await.unwrap(),
            Err(TileError::FetchFailed("timeout".into()))
        );
    }

    #[tokio::test]
    async fn test_abandoned_key_stays_pinned_until_released() {
        let coalescer = RequestCoalescer::new();
        let CoalesceResult::NewRequest { mut rx, .. } = coalescer.register(key()) else {
            panic!("expected new request");
        };

        let notified = coalescer.abandon(key(), Err(TileError::FetchFailed("timed out".into())));

        assert_eq!(notified, 1);
        assert!(rx.recv().await.unwrap().is_err());
        assert_eq!(coalescer.in_flight_count(), 0);
        assert!(coalescer.in_flight_keys().contains(&key()));
        // a fresh request leads again while the old download lingers
        assert!(matches!(
            coalescer.register(key()),
            CoalesceResult::NewRequest { .. }
        ));

        coalescer.complete(key(), Ok(Bytes::new()));
        coalescer.release(key());
        assert!(coalescer.in_flight_keys().is_empty());
    }

    #[test]
    fn test_register_after_complete_starts_new_request() {
        let coalescer = RequestCoalescer::new();
        let _ = coalescer.register(key());
        coalescer.complete(key(), Ok(Bytes::new()));
        assert!(matches!(
            coalescer.register(key()),
            CoalesceResult::NewRequest { .. }
        ));
        assert_eq!(coalescer.in_flight_keys().len(), 1);
    }
}
