#![forbid(unsafe_code)]

use std::sync::Arc;

use kennel_api::Notice;
use kennel_core::Dog;
use tracing::info;

use crate::session::CareSession;

/// Optimistic coordinator: local state first, remote call queued second,
/// compensating revert on failure. Compensation is scoped to the failed
/// (dog, slot) pair only, so pending ops for sibling slots keep their own
/// optimistic state. Success notices fire immediately, so a later failure
/// notice effectively announces the reversal.
impl CareSession {
    pub fn add_potty_break(&self, dog: &Dog, slot: &str) {
        let was_present = self.board.current().contains(&dog.id, slot);
        self.board.mutate(|b| {
            b.add_slot(&dog.id, slot);
        });
        info!(dog = %dog.name, slot = %slot, "care: potty break add (optimistic)");
        let _ = self
            .notices
            .send(Notice::success("Potty Break Logged", format!("{} at {}", dog.name, slot)));

        let api = Arc::clone(&self.api);
        let board = self.board.clone();
        let notices = self.notices.clone();
        let dog = dog.clone();
        let slot = slot.to_string();
        self.queue.enqueue(Box::pin(async move {
            if let Err(e) = api.add_potty_break(&dog.id, &slot).await {
                if !was_present {
                    board.mutate(|b| {
                        b.remove_slot(&dog.id, &slot);
                    });
                }
                let _ = notices.send(Notice::error(
                    "Error logging potty break",
                    format!("could not save potty break for {}", dog.name),
                ));
                return Err(e.into());
            }
            Ok(())
        }));
    }

    pub fn remove_potty_break(&self, dog: &Dog, slot: &str) {
        let was_present = self.board.current().contains(&dog.id, slot);
        self.board.mutate(|b| {
            b.remove_slot(&dog.id, slot);
        });
        info!(dog = %dog.name, slot = %slot, "care: potty break remove (optimistic)");
        let _ = self
            .notices
            .send(Notice::success("Potty Break Removed", format!("{} at {}", dog.name, slot)));

        let api = Arc::clone(&self.api);
        let board = self.board.clone();
        let notices = self.notices.clone();
        let dog = dog.clone();
        let slot = slot.to_string();
        self.queue.enqueue(Box::pin(async move {
            if let Err(e) = api.remove_potty_break(&dog.id, &slot).await {
                if was_present {
                    board.mutate(|b| {
                        b.add_slot(&dog.id, &slot);
                    });
                }
                let _ = notices.send(Notice::error(
                    "Error removing potty break",
                    format!("could not remove potty break for {}", dog.name),
                ));
                return Err(e.into());
            }
            Ok(())
        }));
    }

    /// Feedings are append-only: no board mutation, so a failure needs no
    /// revert; it is reported and rethrown into the queue's catch.
    pub fn log_feeding(&self, dog: &Dog, slot: &str) {
        info!(dog = %dog.name, slot = %slot, "care: feeding log");
        let _ = self
            .notices
            .send(Notice::success("Feeding Logged", format!("{} fed at {}", dog.name, slot)));

        let api = Arc::clone(&self.api);
        let notices = self.notices.clone();
        let dog = dog.clone();
        let slot = slot.to_string();
        self.queue.enqueue(Box::pin(async move {
            if let Err(e) = api.log_feeding(&dog.id, &slot).await {
                let _ = notices.send(Notice::error(
                    "Error logging feeding",
                    format!("could not save feeding for {}", dog.name),
                ));
                return Err(e.into());
            }
            Ok(())
        }));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::QueueConfig;
    use crate::session::SessionConfig;
    use kennel_api::{MockApi, NoticeKind, NoticeReceiver};
    use std::time::Duration;

    fn fast_cfg() -> SessionConfig {
        SessionConfig {
            queue: QueueConfig {
                cap: 5,
                op_delay: Duration::from_millis(1),
                settle_delay: Duration::from_millis(40),
            },
            click_window: Duration::from_millis(1000),
            click_debounce: Duration::from_millis(20),
            gate_sweep: Duration::from_secs(60),
        }
    }

    fn rex() -> Dog {
        Dog { id: "d1".into(), name: "Rex".into() }
    }

    fn drain_notices(rx: &mut NoticeReceiver) -> Vec<Notice> {
        let mut out = Vec::new();
        while let Ok(n) = rx.try_recv() {
            out.push(n);
        }
        out
    }

    #[tokio::test]
    async fn add_is_idempotent_before_remote_resolution() {
        let (sess, _rx) = CareSession::new(Arc::new(MockApi::new()), fast_cfg());
        sess.add_potty_break(&rex(), "8:00 AM");
        sess.add_potty_break(&rex(), "8:00 AM");
        assert_eq!(sess.board().slots("d1"), ["8:00 AM"]);
        sess.shutdown();
    }

    #[tokio::test]
    async fn failed_add_reverts_and_notifies() {
        let api = MockApi { fail_adds: true, ..MockApi::new() };
        let (sess, mut rx) = CareSession::new(Arc::new(api), fast_cfg());
        sess.add_potty_break(&rex(), "8:00 AM");
        assert!(sess.board().contains("d1", "8:00 AM"));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!sess.board().contains("d1", "8:00 AM"));
        let notices = drain_notices(&mut rx);
        let failure = notices
            .iter()
            .find(|n| n.kind == NoticeKind::Error)
            .expect("failure notice");
        assert_eq!(failure.title, "Error logging potty break");
        assert!(failure.body.contains("Rex"));
        sess.shutdown();
    }

    #[tokio::test]
    async fn failed_remove_readds_the_slot() {
        let api = MockApi { fail_removes: true, ..MockApi::new() };
        let (sess, mut rx) = CareSession::new(Arc::new(api), fast_cfg());
        sess.add_potty_break(&rex(), "8:00 AM");
        sess.add_potty_break(&rex(), "12:00 PM");
        tokio::time::sleep(Duration::from_millis(30)).await;
        sess.remove_potty_break(&rex(), "8:00 AM");
        assert_eq!(sess.board().slots("d1"), ["12:00 PM"]);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(sess.board().contains("d1", "8:00 AM"));
        assert!(sess.board().contains("d1", "12:00 PM"));
        let notices = drain_notices(&mut rx);
        assert!(notices.iter().any(|n| n.title == "Error removing potty break"));
        sess.shutdown();
    }

    #[tokio::test]
    async fn failed_add_leaves_sibling_pending_slots_alone() {
        // Two adds for the same dog are pending together; each failure must
        // compensate only its own slot, not the whole per-dog list.
        let api = MockApi { fail_adds: true, ..MockApi::new() };
        let (sess, mut rx) = CareSession::new(Arc::new(api), fast_cfg());
        sess.add_potty_break(&rex(), "8:00 AM");
        sess.add_potty_break(&rex(), "12:00 PM");
        assert_eq!(sess.board().slots("d1"), ["8:00 AM", "12:00 PM"]);
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(sess.board().is_empty());
        let errors = drain_notices(&mut rx)
            .into_iter()
            .filter(|n| n.kind == NoticeKind::Error)
            .count();
        assert_eq!(errors, 2);
        sess.shutdown();
    }

    #[tokio::test]
    async fn feeding_failure_notifies_without_touching_the_board() {
        let api = MockApi { fail_feedings: true, ..MockApi::new() };
        let (sess, mut rx) = CareSession::new(Arc::new(api), fast_cfg());
        sess.log_feeding(&rex(), "Breakfast");
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(sess.board().is_empty());
        let notices = drain_notices(&mut rx);
        assert!(notices.iter().any(|n| n.title == "Feeding Logged"));
        assert!(notices.iter().any(|n| n.title == "Error logging feeding"));
        sess.shutdown();
    }

    #[tokio::test]
    async fn success_notice_fires_before_remote_resolution() {
        let api = MockApi { latency: Some(Duration::from_millis(50)), ..MockApi::new() };
        let (sess, mut rx) = CareSession::new(Arc::new(api), fast_cfg());
        sess.add_potty_break(&rex(), "8:00 AM");
        let notices = drain_notices(&mut rx);
        assert_eq!(notices.len(), 1);
        assert_eq!(notices[0].kind, NoticeKind::Success);
        sess.shutdown();
    }
}
