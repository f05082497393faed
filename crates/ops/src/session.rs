#![forbid(unsafe_code)]

use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use kennel_api::{notice_channel, CareApi, NoticeReceiver, NoticeSender};
use kennel_core::{CareBoard, CareCategory, CareEvent};
use kennel_store::{BoardBuilder, BoardHandle};
use tokio::sync::watch;
use tracing::info;

use crate::debounce::Debouncer;
use crate::gate::ClickGate;
use crate::queue::{OpQueue, QueueConfig, SettleHook};

#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub queue: QueueConfig,
    /// Click gate throttle window.
    pub click_window: Duration,
    /// Trailing debounce applied to cell-click actions.
    pub click_debounce: Duration,
    /// How often the gate registry is swept clean.
    pub gate_sweep: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            queue: QueueConfig::default(),
            click_window: Duration::from_millis(1000),
            click_debounce: Duration::from_millis(300),
            gate_sweep: Duration::from_secs(5),
        }
    }
}

impl SessionConfig {
    pub fn from_env() -> Self {
        let d = Self::default();
        let click_window = std::env::var("KENNEL_CLICK_WINDOW_MS")
            .ok()
            .and_then(|s| s.parse().ok())
            .map(Duration::from_millis)
            .unwrap_or(d.click_window);
        let click_debounce = std::env::var("KENNEL_CLICK_DEBOUNCE_MS")
            .ok()
            .and_then(|s| s.parse().ok())
            .map(Duration::from_millis)
            .unwrap_or(d.click_debounce);
        let gate_sweep = std::env::var("KENNEL_GATE_SWEEP_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .map(Duration::from_secs)
            .unwrap_or(d.gate_sweep);
        Self { queue: QueueConfig::from_env(), click_window, click_debounce, gate_sweep }
    }
}

/// Per-view wiring for the daily-care grid: click gate, operation queue,
/// debouncer, the optimistic board, and the notice channel. Created once
/// per active view and torn down explicitly with [`CareSession::shutdown`].
#[derive(Clone)]
pub struct CareSession {
    pub(crate) api: Arc<dyn CareApi>,
    pub(crate) board: BoardHandle,
    pub(crate) queue: OpQueue,
    pub(crate) gate: Arc<ClickGate>,
    pub(crate) notices: NoticeSender,
    pub(crate) debounce: Debouncer,
    pub(crate) active: Arc<Mutex<CareCategory>>,
    pub(crate) busy: Arc<AtomicBool>,
    sweep: Arc<Mutex<Option<tokio::task::JoinHandle<()>>>>,
}

impl CareSession {
    pub fn new(api: Arc<dyn CareApi>, cfg: SessionConfig) -> (Self, NoticeReceiver) {
        Self::with_on_settle(api, cfg, None)
    }

    /// `on_settle` runs (debounced) each time the queue drains empty, so
    /// the caller can refetch confirmed events and re-prime the board.
    pub fn with_on_settle(
        api: Arc<dyn CareApi>,
        cfg: SessionConfig,
        on_settle: Option<SettleHook>,
    ) -> (Self, NoticeReceiver) {
        let (notices, rx) = notice_channel();
        let gate = Arc::new(ClickGate::new(cfg.click_window));
        let sweep = ClickGate::spawn_sweep(Arc::clone(&gate), cfg.gate_sweep);
        info!(
            queue_cap = cfg.queue.cap,
            window_ms = cfg.click_window.as_millis() as u64,
            debounce_ms = cfg.click_debounce.as_millis() as u64,
            "care session started"
        );
        let session = Self {
            api,
            board: BoardHandle::new(),
            queue: OpQueue::with_on_empty(cfg.queue, on_settle),
            gate,
            notices,
            debounce: Debouncer::new(cfg.click_debounce),
            active: Arc::new(Mutex::new(CareCategory::PottyBreaks)),
            busy: Arc::new(AtomicBool::new(false)),
            sweep: Arc::new(Mutex::new(Some(sweep))),
        };
        (session, rx)
    }

    pub fn board(&self) -> Arc<CareBoard> {
        self.board.current()
    }

    pub fn board_handle(&self) -> BoardHandle {
        self.board.clone()
    }

    pub fn subscribe_epoch(&self) -> watch::Receiver<u64> {
        self.board.subscribe_epoch()
    }

    pub fn active_category(&self) -> CareCategory {
        *self.active.lock().unwrap()
    }

    pub fn set_active_category(&self, category: CareCategory) {
        *self.active.lock().unwrap() = category;
    }

    /// Replace the board with the potty-break truth from a backend fetch.
    /// The board only tracks the toggle-style category; feeding logs are
    /// append-only and never held locally.
    pub fn prime(&self, events: Vec<CareEvent>) {
        let mut builder = BoardBuilder::new(CareCategory::PottyBreaks);
        builder.apply(events);
        self.board.publish(builder.freeze());
    }

    pub fn queue_len(&self) -> usize {
        self.queue.len()
    }

    pub fn clicks(&self) -> u64 {
        self.gate.clicks()
    }

    /// Tear down the view: stop the sweep task, discard queued work and
    /// pending debounced clicks, clear the gate. In-flight remote calls
    /// finish on their own.
    pub fn shutdown(&self) {
        if let Some(h) = self.sweep.lock().unwrap().take() {
            h.abort();
        }
        self.queue.shutdown();
        self.debounce.cancel_all();
        self.gate.reset();
        info!("care session shut down");
    }
}
