//! # In-Flight Download Table
//!
//! Single-flight registry: at most one download runs per cache key. The
//! first caller for a key becomes the leader and owns the network fetch;
//! everyone arriving while it runs subscribes to the same broadcast channel
//! and receives the one outcome when it lands.

use std::collections::HashMap;
use std::path::PathBuf;

use parking_lot::Mutex;
use tokio::sync::broadcast;

use crate::error::CacheError;
use crate::key::CacheKey;

/// Outcome delivered to every waiter of a flight.
pub(crate) type FlightOutcome = Result<PathBuf, CacheError>;

/// How a caller participates in the flight for a key.
pub(crate) enum Flight {
    /// This caller registered the flight and must start the download.
    Leader { rx: broadcast::Receiver<FlightOutcome> },
    /// Another caller is already downloading; wait for its outcome.
    Waiter { rx: broadcast::Receiver<FlightOutcome> },
}

#[derive(Debug, Default)]
pub(crate) struct FlightTable {
    flights: Mutex<HashMap<CacheKey, broadcast::Sender<FlightOutcome>>>,
}

impl FlightTable {
    /// Atomically join the flight for `key`, creating it if absent.
    pub(crate) fn join_or_lead(&self, key: &CacheKey) -> Flight {
        let mut flights = self.flights.lock();

        if let Some(tx) = flights.get(key) {
            Flight::Waiter { rx: tx.subscribe() }
        } else {
            // Capacity 1 is enough: exactly one message is ever sent, and
            // every receiver subscribes before it goes out.
            let (tx, rx) = broadcast::channel(1);
            flights.insert(key.clone(), tx);
            Flight::Leader { rx }
        }
    }

    /// Resolve the flight for `key`: drop the record, then notify every
    /// waiter. Removal comes first so a caller arriving afterwards starts
    /// a fresh flight instead of joining a finished one.
    pub(crate) fn finish(&self, key: &CacheKey, outcome: FlightOutcome) {
        let tx = self.flights.lock().remove(key);
        if let Some(tx) = tx {
            // A send error just means nobody is left listening.
            let _ = tx.send(outcome);
        }
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.flights.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(url: &str) -> CacheKey {
        CacheKey::derive(url)
    }

    #[tokio::test]
    async fn first_caller_leads_then_others_wait() {
        let table = FlightTable::default();
        let k = key("https://cdn.example.com/a.mov");

        assert!(matches!(table.join_or_lead(&k), Flight::Leader { .. }));
        assert!(matches!(table.join_or_lead(&k), Flight::Waiter { .. }));
        assert!(matches!(table.join_or_lead(&k), Flight::Waiter { .. }));
        assert_eq!(table.len(), 1);

        // A different key gets its own flight.
        assert!(matches!(
            table.join_or_lead(&key("https://cdn.example.com/b.mov")),
            Flight::Leader { .. }
        ));
        assert_eq!(table.len(), 2);
    }

    #[tokio::test]
    async fn finish_notifies_every_waiter_once() {
        let table = FlightTable::default();
        let k = key("https://cdn.example.com/a.mov");

        let Flight::Leader { rx: mut leader_rx } = table.join_or_lead(&k) else {
            panic!("first caller must lead");
        };
        let Flight::Waiter { rx: mut waiter_rx } = table.join_or_lead(&k) else {
            panic!("second caller must wait");
        };

        let path = PathBuf::from("/cache/abc.mov");
        table.finish(&k, Ok(path.clone()));

        assert_eq!(leader_rx.recv().await.unwrap().unwrap(), path);
        assert_eq!(waiter_rx.recv().await.unwrap().unwrap(), path);
        assert_eq!(table.len(), 0);
    }

    #[tokio::test]
    async fn dropped_waiter_does_not_affect_the_rest() {
        let table = FlightTable::default();
        let k = key("https://cdn.example.com/a.mov");

        let Flight::Leader { rx: leader_rx } = table.join_or_lead(&k) else {
            panic!("first caller must lead");
        };
        let Flight::Waiter { rx: withdrawn } = table.join_or_lead(&k) else {
            panic!("second caller must wait");
        };
        let Flight::Waiter { rx: mut patient } = table.join_or_lead(&k) else {
            panic!("third caller must wait");
        };

        drop(withdrawn);
        drop(leader_rx);
        table.finish(&k, Err(CacheError::Timeout));

        assert!(matches!(
            patient.recv().await.unwrap(),
            Err(CacheError::Timeout)
        ));
    }

    #[tokio::test]
    async fn finished_key_can_fly_again() {
        let table = FlightTable::default();
        let k = key("https://cdn.example.com/a.mov");

        let _first = table.join_or_lead(&k);
        table.finish(&k, Err(CacheError::Aborted));

        assert!(matches!(table.join_or_lead(&k), Flight::Leader { .. }));
    }

    #[tokio::test]
    async fn finish_with_no_listeners_is_quiet() {
        let table = FlightTable::default();
        let k = key("https://cdn.example.com/a.mov");

        match table.join_or_lead(&k) {
            Flight::Leader { rx } => drop(rx),
            Flight::Waiter { .. } => panic!("first caller must lead"),
        }
        table.finish(&k, Ok(PathBuf::from("/cache/abc.mov")));
        assert_eq!(table.len(), 0);
    }
}
