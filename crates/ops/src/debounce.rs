#![forbid(unsafe_code)]

use std::sync::{Arc, Mutex};
use std::time::Duration;

use rustc_hash::FxHashMap;
use tracing::debug;

/// Per-key trailing debounce: rapid repeated calls for the same key
/// coalesce into the last one, which runs after the delay elapses
/// undisturbed. Keys are independent of each other.
#[derive(Clone)]
pub struct Debouncer {
    delay: Duration,
    gens: Arc<Mutex<FxHashMap<String, u64>>>,
}

impl Debouncer {
    pub fn new(delay: Duration) -> Self {
        Self { delay, gens: Arc::new(Mutex::new(FxHashMap::default())) }
    }

    /// Schedule `f` to run after the delay unless a newer call with the
    /// same key supersedes it first.
    pub fn call(&self, key: impl Into<String>, f: impl FnOnce() + Send + 'static) {
        let key = key.into();
        let seq = {
            let mut gens = self.gens.lock().unwrap();
            let e = gens.entry(key.clone()).or_insert(0);
            *e = e.wrapping_add(1);
            *e
        };
        let gens = Arc::clone(&self.gens);
        let delay = self.delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let current = {
                let mut gens = gens.lock().unwrap();
                if gens.get(&key).copied() == Some(seq) {
                    // Last call for this key; drop the entry so the
                    // registry does not grow without bound.
                    gens.remove(&key);
                    true
                } else {
                    false
                }
            };
            if current {
                f();
            } else {
                debug!(key = %key, "debounced call superseded");
            }
        });
    }

    /// Cancel every pending invocation by outdating its generation.
    pub fn cancel_all(&self) {
        let mut gens = self.gens.lock().unwrap();
        for seq in gens.values_mut() {
            *seq = seq.wrapping_add(1);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn repeated_calls_coalesce_to_the_last() {
        let d = Debouncer::new(Duration::from_millis(30));
        let ran = Arc::new(AtomicUsize::new(0));
        for i in 1..=3 {
            let ran = Arc::clone(&ran);
            d.call("k", move || {
                ran.store(i, Ordering::SeqCst);
            });
        }
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(ran.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn distinct_keys_run_independently() {
        let d = Debouncer::new(Duration::from_millis(10));
        let count = Arc::new(AtomicUsize::new(0));
        for key in ["a", "b"] {
            let count = Arc::clone(&count);
            d.call(key, move || {
                count.fetch_add(1, Ordering::SeqCst);
            });
        }
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(count.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn completed_keys_leave_the_registry() {
        let d = Debouncer::new(Duration::from_millis(10));
        let ran = Arc::new(AtomicUsize::new(0));
        for key in ["a", "b"] {
            let ran = Arc::clone(&ran);
            d.call(key, move || {
                ran.fetch_add(1, Ordering::SeqCst);
            });
        }
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(ran.load(Ordering::SeqCst), 2);
        assert!(d.gens.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn cancel_all_drops_pending_calls() {
        let d = Debouncer::new(Duration::from_millis(30));
        let count = Arc::new(AtomicUsize::new(0));
        {
            let count = Arc::clone(&count);
            d.call("k", move || {
                count.fetch_add(1, Ordering::SeqCst);
            });
        }
        d.cancel_all();
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
    }
}
