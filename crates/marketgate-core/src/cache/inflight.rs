//! Singleflight coordination of upstream computations.
//!
//! # Lifecycle
//!
//! ```text
//! run_exclusive(key, work)
//!        │
//!        ▼
//! ┌──────────────────────────────┐
//! │ lock registry (sync section) │
//! └──────────────┬───────────────┘
//!                │
//!      ┌─────────┼──────────────────┐
//!      │         │                  │
//!   present   at bound           absent
//!      │         │                  │
//!      ▼         ▼                  ▼
//!   follow   run inline     register + spawn work
//!      │     (uncoordinated)        │
//!      │                            ▼
//!      │                   work settles (ok, err, panic)
//!      │                            │
//!      │                            ▼
//!      │                   send result, guard drops
//!      │                   and removes registration
//!      ▼                            │
//!   await shared result ◄───────────┘
//! ```
//!
//! The work runs on a detached task, so a leader whose request is dropped never strands
//! its followers. A panicking computation resolves every waiter with `None`.

use futures::{
    future::{BoxFuture, Shared},
    FutureExt,
};
use parking_lot::Mutex;
use std::{
    collections::HashMap,
    future::Future,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
};
use tokio::{sync::oneshot, time::Instant};
use tracing::debug;

/// Pending result shared between the leader and its followers.
pub type SharedResult<T> = Shared<BoxFuture<'static, Option<T>>>;

struct Registration<T: Clone> {
    id: u64,
    started_at: Instant,
    result: SharedResult<T>,
}

type Registrations<T> = Arc<Mutex<HashMap<String, Registration<T>>>>;

/// RAII guard removing a registration when its computation settles.
///
/// Only removes the entry if it still carries this guard's id, so a late drop can never
/// remove a newer registration for the same key.
struct RegistrationGuard<T: Clone> {
    registrations: Registrations<T>,
    key: String,
    id: u64,
}

impl<T: Clone> Drop for RegistrationGuard<T> {
    fn drop(&mut self) {
        let mut registrations = self.registrations.lock();
        if registrations.get(&self.key).is_some_and(|r| r.id == self.id) {
            if let Some(registration) = registrations.remove(&self.key) {
                debug!(
                    key = %self.key,
                    elapsed_ms = registration.started_at.elapsed().as_millis(),
                    "in-flight computation settled"
                );
            }
        }
    }
}

/// Registry of in-flight computations keyed by request key.
pub struct InflightRegistry<T: Clone> {
    registrations: Registrations<T>,
    next_id: AtomicU64,
    max_entries: usize,
}

impl<T> InflightRegistry<T>
where
    T: Clone + Send + Sync + 'static,
{
    #[must_use]
    pub fn new(max_entries: usize) -> Self {
        Self {
            registrations: Arc::new(Mutex::new(HashMap::new())),
            next_id: AtomicU64::new(1),
            max_entries: max_entries.max(1),
        }
    }

    /// Runs `work` unless an identical computation is already in flight, in which case
    /// its result is awaited instead.
    ///
    /// Returns `None` only if the computation panicked.
    pub async fn run_exclusive<F>(&self, key: &str, work: F) -> Option<T>
    where
        F: Future<Output = T> + Send + 'static,
    {
        let shared = {
            let mut registrations = self.registrations.lock();

            if let Some(existing) = registrations.get(key) {
                Ok(existing.result.clone())
            } else if registrations.len() >= self.max_entries {
                Err(work)
            } else {
                let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                let (tx, rx) = oneshot::channel::<T>();
                let result: SharedResult<T> = rx.map(Result::ok).boxed().shared();

                registrations.insert(
                    key.to_string(),
                    Registration { id, started_at: Instant::now(), result: result.clone() },
                );

                let guard = RegistrationGuard {
                    registrations: Arc::clone(&self.registrations),
                    key: key.to_string(),
                    id,
                };

                tokio::spawn(async move {
                    let value = work.await;
                    let _ = tx.send(value);
                    drop(guard);
                });

                Ok(result)
            }
        };

        match shared {
            Ok(result) => result.await,
            Err(work) => {
                debug!(key, "in-flight registry full, running uncoordinated");
                Some(work.await)
            }
        }
    }

    /// The pending result for `key`, if a computation is registered.
    pub fn join(&self, key: &str) -> Option<SharedResult<T>> {
        self.registrations.lock().get(key).map(|r| r.result.clone())
    }

    #[must_use]
    pub fn is_inflight(&self, key: &str) -> bool {
        self.registrations.lock().contains_key(key)
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.registrations.lock().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
