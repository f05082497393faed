#![forbid(unsafe_code)]

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use kennel_core::CareCategory;
use metrics::counter;
use rustc_hash::FxHashMap;
use tracing::debug;

struct GateInner {
    last: FxHashMap<String, Instant>,
    clicks: u64,
}

/// Per-(dog, slot, category) rate limiter for rapid duplicate taps.
///
/// The verdict is advisory for remote calls only: callers perform the
/// optimistic local update regardless of the answer. The registry and the
/// click counter are cleared by [`ClickGate::reset`], which a periodic
/// sweep task also invokes.
pub struct ClickGate {
    window: Duration,
    inner: Mutex<GateInner>,
}

impl ClickGate {
    pub fn new(window: Duration) -> Self {
        Self { window, inner: Mutex::new(GateInner { last: FxHashMap::default(), clicks: 0 }) }
    }

    /// Record a click and report whether it falls outside the throttle
    /// window for its cell. Every call counts toward the diagnostics
    /// counter, accepted or not.
    pub fn check(&self, dog_name: &str, slot: &str, category: CareCategory) -> bool {
        let key = format!("{}|{}|{}", dog_name, slot, category.label());
        let now = Instant::now();
        let mut g = self.inner.lock().unwrap();
        g.clicks = g.clicks.saturating_add(1);
        counter!("kennel_gate_clicks", 1);
        match g.last.get(&key) {
            Some(t) if now.duration_since(*t) < self.window => {
                counter!("kennel_gate_throttled", 1);
                debug!(key = %key, clicks = g.clicks, "click throttled (advisory)");
                false
            }
            _ => {
                g.last.insert(key, now);
                true
            }
        }
    }

    pub fn clicks(&self) -> u64 {
        self.inner.lock().unwrap().clicks
    }

    /// Clear all throttle entries and the click counter.
    pub fn reset(&self) {
        let mut g = self.inner.lock().unwrap();
        g.last.clear();
        g.clicks = 0;
    }

    /// Spawn the periodic sweep clearing the registry. Abort the returned
    /// handle on view teardown.
    pub fn spawn_sweep(gate: Arc<ClickGate>, every: Duration) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(every);
            ticker.tick().await; // interval fires immediately; skip it
            loop {
                ticker.tick().await;
                gate.reset();
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_click_inside_window_is_throttled() {
        let gate = ClickGate::new(Duration::from_millis(80));
        assert!(gate.check("Rex", "8:00 AM", CareCategory::PottyBreaks));
        assert!(!gate.check("Rex", "8:00 AM", CareCategory::PottyBreaks));
        assert_eq!(gate.clicks(), 2);
    }

    #[test]
    fn clicks_outside_window_are_accepted() {
        let gate = ClickGate::new(Duration::from_millis(30));
        assert!(gate.check("Rex", "8:00 AM", CareCategory::PottyBreaks));
        std::thread::sleep(Duration::from_millis(40));
        assert!(gate.check("Rex", "8:00 AM", CareCategory::PottyBreaks));
    }

    #[test]
    fn distinct_cells_do_not_interfere() {
        let gate = ClickGate::new(Duration::from_secs(1));
        assert!(gate.check("Rex", "8:00 AM", CareCategory::PottyBreaks));
        assert!(gate.check("Rex", "12:00 PM", CareCategory::PottyBreaks));
        assert!(gate.check("Willow", "8:00 AM", CareCategory::PottyBreaks));
        assert!(gate.check("Rex", "8:00 AM", CareCategory::Feeding));
    }

    #[test]
    fn reset_clears_registry_and_counter() {
        let gate = ClickGate::new(Duration::from_secs(1));
        assert!(gate.check("Rex", "8:00 AM", CareCategory::PottyBreaks));
        assert!(!gate.check("Rex", "8:00 AM", CareCategory::PottyBreaks));
        gate.reset();
        assert_eq!(gate.clicks(), 0);
        assert!(gate.check("Rex", "8:00 AM", CareCategory::PottyBreaks));
    }

    #[tokio::test]
    async fn sweep_clears_periodically() {
        let gate = Arc::new(ClickGate::new(Duration::from_secs(60)));
        let h = ClickGate::spawn_sweep(Arc::clone(&gate), Duration::from_millis(30));
        assert!(gate.check("Rex", "8:00 AM", CareCategory::PottyBreaks));
        assert!(!gate.check("Rex", "8:00 AM", CareCategory::PottyBreaks));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(gate.check("Rex", "8:00 AM", CareCategory::PottyBreaks));
        h.abort();
    }
}
