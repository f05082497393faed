#![forbid(unsafe_code)]

use std::sync::atomic::{AtomicBool, Ordering};

use kennel_api::{KennelError, KennelResult, Notice};
use kennel_core::{CareCategory, Dog};
use tracing::{debug, warn};

use crate::session::CareSession;

/// Clears the busy flag on drop, including on unwind.
struct BusyGuard<'a>(&'a AtomicBool);

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

/// UI-facing entry point for the daily-care grid. Per-cell state machine:
/// Idle -> OptimisticApplied -> Idle (remote ok) or Reverted -> Idle
/// (remote failed). There is no blocking "loading" state; immediate
/// feedback wins over strict consistency.
impl CareSession {
    /// Handle one cell click. Never returns an error to the caller; every
    /// failure is logged and surfaced through the notice channel.
    pub fn on_cell_click(&self, dog: &Dog, slot: &str, category: CareCategory) {
        if self.busy.swap(true, Ordering::SeqCst) {
            debug!(dog = %dog.name, slot = %slot, "dispatch busy; click ignored");
            return;
        }
        let _busy = BusyGuard(&self.busy);
        if let Err(e) = self.dispatch(dog, slot, category) {
            warn!(dog = %dog.name, category = %category, error = %e, "cell click failed");
            let _ = self.notices.send(Notice::error(
                format!("Error logging {}", category),
                format!("could not process {} for {}", category, dog.name),
            ));
        }
    }

    fn dispatch(&self, dog: &Dog, slot: &str, category: CareCategory) -> KennelResult<()> {
        if dog.id.is_empty() || slot.is_empty() {
            return Err(KennelError::Validation("dog id and slot are required".into()));
        }
        let active = self.active_category();
        if category != active {
            debug!(category = %category, active = %active, "category mismatch; click ignored");
            return Ok(());
        }
        if !self.gate.check(&dog.name, slot, category) {
            // Advisory: the optimistic path still runs; only diagnostics here.
            debug!(dog = %dog.name, slot = %slot, "click throttled; optimistic path proceeds");
        }
        let key = format!("{}|{}|{}", dog.id, slot, category.label());
        match category {
            CareCategory::PottyBreaks => {
                // Toggle based on the board state seen at click time.
                let present = self.board.current().contains(&dog.id, slot);
                let sess = self.clone();
                let dog = dog.clone();
                let slot = slot.to_string();
                self.debounce.call(key, move || {
                    if present {
                        sess.remove_potty_break(&dog, &slot);
                    } else {
                        sess.add_potty_break(&dog, &slot);
                    }
                });
            }
            CareCategory::Feeding => {
                let sess = self.clone();
                let dog = dog.clone();
                let slot = slot.to_string();
                self.debounce.call(key, move || sess.log_feeding(&dog, &slot));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::QueueConfig;
    use crate::session::SessionConfig;
    use kennel_api::{MockApi, NoticeKind};
    use std::sync::atomic::AtomicUsize;
    use std::sync::Arc;
    use std::time::Duration;

    fn fast_cfg() -> SessionConfig {
        SessionConfig {
            queue: QueueConfig {
                cap: 5,
                op_delay: Duration::from_millis(1),
                settle_delay: Duration::from_millis(40),
            },
            click_window: Duration::from_millis(1000),
            click_debounce: Duration::from_millis(30),
            gate_sweep: Duration::from_secs(60),
        }
    }

    fn rex() -> Dog {
        Dog { id: "d1".into(), name: "Rex".into() }
    }

    #[tokio::test]
    async fn rapid_double_click_issues_a_single_remote_add() {
        let api = Arc::new(MockApi::new());
        let (sess, _rx) = CareSession::new(api.clone(), fast_cfg());
        sess.on_cell_click(&rex(), "8:00 AM", CareCategory::PottyBreaks);
        sess.on_cell_click(&rex(), "8:00 AM", CareCategory::PottyBreaks);
        tokio::time::sleep(Duration::from_millis(120)).await;
        let adds: Vec<_> = api.calls().into_iter().filter(|(op, _, _)| op == "add").collect();
        assert_eq!(adds.len(), 1);
        assert_eq!(sess.board().slots("d1"), ["8:00 AM"]);
        sess.shutdown();
    }

    #[tokio::test]
    async fn second_click_after_settle_toggles_the_slot_off() {
        let api = Arc::new(MockApi::new());
        let (sess, _rx) = CareSession::new(api.clone(), fast_cfg());
        sess.on_cell_click(&rex(), "8:00 AM", CareCategory::PottyBreaks);
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(sess.board().contains("d1", "8:00 AM"));
        sess.on_cell_click(&rex(), "8:00 AM", CareCategory::PottyBreaks);
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(sess.board().is_empty());
        let ops: Vec<String> = api.calls().into_iter().map(|(op, _, _)| op).collect();
        assert_eq!(ops, ["add", "remove"]);
        sess.shutdown();
    }

    #[tokio::test]
    async fn failed_add_reverts_after_click() {
        let api = Arc::new(MockApi { fail_adds: true, ..MockApi::new() });
        let (sess, mut rx) = CareSession::new(api, fast_cfg());
        sess.on_cell_click(&rex(), "8:00 AM", CareCategory::PottyBreaks);
        tokio::time::sleep(Duration::from_millis(120)).await;
        assert!(sess.board().is_empty());
        let mut titles = Vec::new();
        while let Ok(n) = rx.try_recv() {
            if n.kind == NoticeKind::Error {
                titles.push(n.title);
            }
        }
        assert_eq!(titles, ["Error logging potty break"]);
        sess.shutdown();
    }

    #[tokio::test]
    async fn inactive_category_clicks_are_ignored() {
        let api = Arc::new(MockApi::new());
        let (sess, _rx) = CareSession::new(api.clone(), fast_cfg());
        sess.on_cell_click(&rex(), "Breakfast", CareCategory::Feeding);
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(api.calls().is_empty());

        sess.set_active_category(CareCategory::Feeding);
        sess.on_cell_click(&rex(), "Breakfast", CareCategory::Feeding);
        tokio::time::sleep(Duration::from_millis(80)).await;
        let ops: Vec<String> = api.calls().into_iter().map(|(op, _, _)| op).collect();
        assert_eq!(ops, ["feeding"]);
        assert!(sess.board().is_empty());
        sess.shutdown();
    }

    #[test]
    fn busy_flag_clears_even_on_unwind() {
        let busy = AtomicBool::new(true);
        let caught = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            let _g = BusyGuard(&busy);
            panic!("dispatch blew up");
        }));
        assert!(caught.is_err());
        assert!(!busy.load(Ordering::SeqCst));
    }

    #[tokio::test]
    async fn clicks_dispatch_again_after_a_failed_one() {
        let api = Arc::new(MockApi::new());
        let (sess, _rx) = CareSession::new(api.clone(), fast_cfg());
        let nameless = Dog { id: String::new(), name: "Rex".into() };
        sess.on_cell_click(&nameless, "8:00 AM", CareCategory::PottyBreaks);
        sess.on_cell_click(&rex(), "8:00 AM", CareCategory::PottyBreaks);
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(sess.board().contains("d1", "8:00 AM"));
        sess.shutdown();
    }

    #[tokio::test]
    async fn invalid_click_produces_a_generic_failure_notice() {
        let api = Arc::new(MockApi::new());
        let (sess, mut rx) = CareSession::new(api, fast_cfg());
        let nameless = Dog { id: String::new(), name: "Rex".into() };
        sess.on_cell_click(&nameless, "8:00 AM", CareCategory::PottyBreaks);
        let n = rx.try_recv().expect("generic failure notice");
        assert_eq!(n.kind, NoticeKind::Error);
        assert!(n.body.contains("Rex"));
        sess.shutdown();
    }

    #[tokio::test]
    async fn throttled_click_still_applies_the_optimistic_update() {
        // Pre-warm the gate so the real click lands inside the throttle
        // window; it must still dispatch the optimistic path.
        let api = Arc::new(MockApi::new());
        let (sess, _rx) = CareSession::new(api.clone(), fast_cfg());
        assert!(sess.gate.check(&rex().name, "8:00 AM", CareCategory::PottyBreaks));
        // Gate now reports throttled for this cell, but the click proceeds.
        sess.on_cell_click(&rex(), "8:00 AM", CareCategory::PottyBreaks);
        tokio::time::sleep(Duration::from_millis(80)).await;
        assert!(sess.board().contains("d1", "8:00 AM"));
        assert_eq!(api.calls().len(), 1);
        sess.shutdown();
    }

    #[tokio::test]
    async fn settle_hook_fires_after_clicks_drain() {
        let fired = Arc::new(AtomicUsize::new(0));
        let f = Arc::clone(&fired);
        let api = Arc::new(MockApi::new());
        let (sess, _rx) = CareSession::with_on_settle(
            api,
            fast_cfg(),
            Some(Box::new(move || {
                f.fetch_add(1, Ordering::SeqCst);
            })),
        );
        sess.on_cell_click(&rex(), "8:00 AM", CareCategory::PottyBreaks);
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(fired.load(Ordering::SeqCst), 1);
        sess.shutdown();
    }
}
