use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};

use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use tracing::debug;

type SharedCall<T, E> = Shared<BoxFuture<'static, Result<T, E>>>;

struct InFlight<T, E> {
    id: u64,
    call: SharedCall<T, E>,
    waiters: usize,
}

/// Collapses concurrent calls with the same key into one execution.
///
/// The first caller for a key starts the work; callers arriving while it is
/// in flight await the same result. The key is freed once the last waiter
/// finishes or is dropped, so abandoned calls never linger.
pub struct SingleFlight<T, E> {
    calls: Mutex<HashMap<String, InFlight<T, E>>>,
    next_id: AtomicU64,
}

impl<T, E> Default for SingleFlight<T, E> {
    fn default() -> Self {
        Self {
            calls: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(0),
        }
    }
}

impl<T, E> SingleFlight<T, E>
where
    T: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    pub fn in_flight(&self) -> usize {
        self.calls.lock().len()
    }

    pub async fn run<F, Fut>(&self, key: &str, start: F) -> Result<T, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
    {
        let (id, call) = {
            let mut calls = self.calls.lock();
            match calls.get_mut(key) {
                Some(entry) => {
                    debug!(key, waiters = entry.waiters, "joining in-flight call");
                    entry.waiters += 1;
                    (entry.id, entry.call.clone())
                }
                None => {
                    let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                    let call = start().boxed().shared();
                    calls.insert(
                        key.to_string(),
                        InFlight {
                            id,
                            call: call.clone(),
                            waiters: 1,
                        },
                    );
                    (id, call)
                }
            }
        };

        let _waiter = Waiter {
            flight: self,
            key,
            id,
        };
        call.await
    }
}

/// Releases one waiter's claim on a key when its `run` completes or is dropped.
struct Waiter<'a, T, E> {
    flight: &'a SingleFlight<T, E>,
    key: &'a str,
    id: u64,
}

impl<T, E> Drop for Waiter<'_, T, E> {
    fn drop(&mut self) {
        let mut calls = self.flight.calls.lock();
        let Some(entry) = calls.get_mut(self.key).filter(|entry| entry.id == self.id) else {
            return;
        };
        entry.waiters -= 1;
        if entry.waiters == 0 {
            debug!(key = self.key, "releasing settled or abandoned call");
            calls.remove(self.key);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;
    use std::time::Duration;

    fn slow_call(counter: Arc<AtomicUsize>, value: u32) -> impl Future<Output = Result<u32, String>> {
        async move {
            counter.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(50)).await;
            Ok(value)
        }
    }

    #[tokio::test(start_paused = true)]
    async fn concurrent_calls_share_one_execution() {
        let flight = SingleFlight::<u32, String>::new();
        let counter = Arc::new(AtomicUsize::new(0));

        let (first, second) = tokio::join!(
            flight.run("session-a", || slow_call(counter.clone(), 1)),
            flight.run("session-a", || slow_call(counter.clone(), 2)),
        );

        assert_eq!(first, Ok(1));
        assert_eq!(second, Ok(1));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(flight.in_flight(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn distinct_keys_run_independently() {
        let flight = SingleFlight::<u32, String>::new();
        let counter = Arc::new(AtomicUsize::new(0));

        let (first, second) = tokio::join!(
            flight.run("a", || slow_call(counter.clone(), 1)),
            flight.run("b", || slow_call(counter.clone(), 2)),
        );

        assert_eq!((first, second), (Ok(1), Ok(2)));
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn abandoned_calls_free_their_key() {
        let flight = SingleFlight::<u32, String>::new();
        let counter = Arc::new(AtomicUsize::new(0));

        let abandoned = tokio::time::timeout(
            Duration::from_millis(10),
            flight.run("a", || slow_call(counter.clone(), 1)),
        )
        .await;
        assert!(abandoned.is_err());
        assert_eq!(flight.in_flight(), 0);

        assert_eq!(flight.run("a", || slow_call(counter.clone(), 2)).await, Ok(2));
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn one_waiter_leaving_keeps_the_call_for_others() {
        let flight = SingleFlight::<u32, String>::new();
        let counter = Arc::new(AtomicUsize::new(0));

        let (impatient, patient) = tokio::join!(
            tokio::time::timeout(
                Duration::from_millis(10),
                flight.run("a", || slow_call(counter.clone(), 1)),
            ),
            async {
                tokio::time::sleep(Duration::from_millis(20)).await;
                flight.run("a", || slow_call(counter.clone(), 2)).await
            },
        );

        assert!(impatient.is_err());
        assert_eq!(patient, Ok(2));
        assert_eq!(counter.load(Ordering::SeqCst), 2);
        assert_eq!(flight.in_flight(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn joined_call_survives_the_first_caller_leaving() {
        let flight = SingleFlight::<u32, String>::new();
        let counter = Arc::new(AtomicUsize::new(0));

        let (impatient, patient) = tokio::join!(
            tokio::time::timeout(
                Duration::from_millis(10),
                flight.run("a", || slow_call(counter.clone(), 1)),
            ),
            flight.run("a", || slow_call(counter.clone(), 2)),
        );

        assert!(impatient.is_err());
        assert_eq!(patient, Ok(1));
        assert_eq!(counter.load(Ordering::SeqCst), 1);
        assert_eq!(flight.in_flight(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn settled_keys_start_fresh() {
        let flight = SingleFlight::<u32, String>::new();
        let counter = Arc::new(AtomicUsize::new(0));

        assert_eq!(flight.run("a", || slow_call(counter.clone(), 1)).await, Ok(1));
        assert_eq!(flight.run("a", || slow_call(counter.clone(), 2)).await, Ok(2));
        assert_eq!(counter.load(Ordering::SeqCst), 2);
    }
}
