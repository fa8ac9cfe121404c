//! Request coalescing keyed by string.

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use std::sync::atomic::{AtomicU64, Ordering};

type Flight<T> = (u64, Shared<BoxFuture<'static, T>>);

/// Coalesces concurrent calls with the same key into one execution.
///
/// The first caller for a key starts the work; callers arriving while it is
/// running await the same result. The entry is removed once the work
/// finishes, so a later call starts fresh.
pub struct SingleFlight<T>
where
    T: Clone + Send + Sync + 'static,
{
    flights: DashMap<String, Flight<T>>,
    next_id: AtomicU64,
}

impl<T> Default for SingleFlight<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self {
            flights: DashMap::new(),
            next_id: AtomicU64::new(0),
        }
    }
}

impl<T> SingleFlight<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Run `start` for `key` unless a call for the same key is in flight, in
    /// which case wait for that one instead.
    pub async fn run<F>(&self, key: &str, start: F) -> T
    where
        F: FnOnce() -> BoxFuture<'static, T>,
    {
        let (id, flight) = match self.flights.entry(key.to_string()) {
            Entry::Occupied(entry) => {
                let (id, flight) = entry.get();
                (*id, flight.clone())
            }
            Entry::Vacant(entry) => {
                let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                let flight = start().shared();
                entry.insert((id, flight.clone()));
                (id, flight)
            }
        };

        let output = flight.await;
        self.flights.remove_if(key, |_, (flight_id, _)| *flight_id == id);
        output
    }

    /// Number of keys with work in flight.
    pub fn in_flight(&self) -> usize {
        self.flights.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::AtomicUsize;
    use tokio::sync::Notify;

    #[tokio::test]
    async fn test_concurrent_calls_share_one_execution() {
        let flights = Arc::new(SingleFlight::<u32>::new());
        let runs = Arc::new(AtomicUsize::new(0));
        let release = Arc::new(Notify::new());

        let start = |runs: Arc<AtomicUsize>, release: Arc<Notify>| {
            move || {
                async move {
                    runs.fetch_add(1, Ordering::SeqCst);
                    release.notified().await;
                    7
                }
                .boxed()
            }
        };

        let first = {
            let flights = flights.clone();
            let f = start(runs.clone(), release.clone());
            tokio::spawn(async move { flights.run("tok", f).await })
        };
        while flights.in_flight() == 0 {
            tokio::task::yield_now().await;
        }
        let second = {
            let flights = flights.clone();
            let f = start(runs.clone(), release.clone());
            tokio::spawn(async move { flights.run("tok", f).await })
        };
        tokio::task::yield_now().await;

        release.notify_one();
        assert_eq!(first.await.unwrap(), 7);
        assert_eq!(second.await.unwrap(), 7);
        assert_eq!(runs.load(Ordering::SeqCst), 1);
        assert_eq!(flights.in_flight(), 0);
    }

    #[tokio::test]
    async fn test_sequential_calls_run_again() {
        let flights = SingleFlight::<usize>::new();
        let runs = Arc::new(AtomicUsize::new(0));
        for expected in 1..=2 {
            let runs = runs.clone();
            let out = flights
                .run("tok", move || {
                    async move { runs.fetch_add(1, Ordering::SeqCst) + 1 }.boxed()
                })
                .await;
            assert_eq!(out, expected);
        }
    }

    #[tokio::test]
    async fn test_different_keys_do_not_coalesce() {
        let flights = SingleFlight::<&'static str>::new();
        let a = flights.run("a", || async { "a" }.boxed());
        let b = flights.run("b", || async { "b" }.boxed());
        let (a, b) = tokio::join!(a, b);
        assert_eq!((a, b), ("a", "b"));
    }
}
