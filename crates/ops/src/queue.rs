#![forbid(unsafe_code)]

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use futures::future::BoxFuture;
use metrics::{counter, histogram};
use tracing::{debug, warn};

/// One queued remote mutation. The op reports failure to its own side
/// channel (revert + notice) before returning Err; the queue only logs it.
pub type PendingOp = BoxFuture<'static, anyhow::Result<()>>;

/// Hook invoked once per empty-transition after the settle delay.
pub type SettleHook = Box<dyn Fn() + Send + Sync>;

#[derive(Debug, Clone)]
pub struct QueueConfig {
    /// Maximum pending ops; exceeding it evicts the oldest (drop-oldest).
    pub cap: usize,
    /// Pause between drained ops.
    pub op_delay: Duration,
    /// Debounce before the on-empty hook fires.
    pub settle_delay: Duration,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            cap: 5,
            op_delay: Duration::from_millis(100),
            settle_delay: Duration::from_millis(2000),
        }
    }
}

impl QueueConfig {
    pub fn from_env() -> Self {
        let d = Self::default();
        let cap = std::env::var("KENNEL_QUEUE_CAP")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(d.cap);
        let op_delay = std::env::var("KENNEL_OP_DELAY_MS")
            .ok()
            .and_then(|s| s.parse().ok())
            .map(Duration::from_millis)
            .unwrap_or(d.op_delay);
        let settle_delay = std::env::var("KENNEL_SETTLE_MS")
            .ok()
            .and_then(|s| s.parse().ok())
            .map(Duration::from_millis)
            .unwrap_or(d.settle_delay);
        Self { cap: cap.max(1), op_delay, settle_delay }
    }
}

struct QueueState {
    ops: VecDeque<PendingOp>,
    draining: bool,
    settle_gen: u64,
    closed: bool,
    dropped: u64,
}

struct QueueInner {
    cfg: QueueConfig,
    on_empty: Option<SettleHook>,
    state: Mutex<QueueState>,
}

/// Size-bounded FIFO of remote-mutation ops, drained one at a time with an
/// inter-op delay. Op failures are swallowed here; a debounced settle hook
/// fires after the queue empties and stays quiet.
#[derive(Clone)]
pub struct OpQueue {
    inner: Arc<QueueInner>,
}

impl OpQueue {
    pub fn new(cfg: QueueConfig) -> Self {
        Self::with_on_empty(cfg, None)
    }

    pub fn with_on_empty(cfg: QueueConfig, on_empty: Option<SettleHook>) -> Self {
        Self {
            inner: Arc::new(QueueInner {
                cfg,
                on_empty,
                state: Mutex::new(QueueState {
                    ops: VecDeque::new(),
                    draining: false,
                    settle_gen: 0,
                    closed: false,
                    dropped: 0,
                }),
            }),
        }
    }

    /// Fire-and-forget append. Cancels any pending settle timer, evicts the
    /// oldest pending op at capacity, and kicks the drain loop if idle.
    pub fn enqueue(&self, op: PendingOp) {
        let mut st = self.inner.state.lock().unwrap();
        if st.closed {
            debug!("queue closed; discarding op");
            return;
        }
        st.settle_gen = st.settle_gen.wrapping_add(1);
        if st.ops.len() >= self.inner.cfg.cap {
            st.ops.pop_front();
            st.dropped = st.dropped.saturating_add(1);
            counter!("kennel_queue_dropped", 1);
            warn!(cap = self.inner.cfg.cap, "queue full; dropping oldest pending op");
        }
        st.ops.push_back(op);
        counter!("kennel_queue_enqueued", 1);
        if !st.draining {
            st.draining = true;
            drop(st);
            tokio::spawn(drain(Arc::clone(&self.inner)));
        }
    }

    pub fn len(&self) -> usize {
        self.inner.state.lock().unwrap().ops.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn dropped(&self) -> u64 {
        self.inner.state.lock().unwrap().dropped
    }

    /// Discard queued work and cancel any pending settle timer. The op
    /// currently being awaited (if any) runs to completion.
    pub fn shutdown(&self) {
        let mut st = self.inner.state.lock().unwrap();
        st.closed = true;
        st.ops.clear();
        st.settle_gen = st.settle_gen.wrapping_add(1);
        debug!("queue shut down");
    }
}

async fn drain(inner: Arc<QueueInner>) {
    loop {
        let op = {
            let mut st = inner.state.lock().unwrap();
            match st.ops.pop_front() {
                Some(op) => op,
                None => {
                    st.draining = false;
                    let seq = st.settle_gen;
                    drop(st);
                    schedule_settle(&inner, seq);
                    return;
                }
            }
        };
        let t0 = Instant::now();
        if let Err(e) = op.await {
            // The op already reported this to its own outcome channel.
            warn!(error = %e, "queued op failed");
        }
        histogram!("kennel_queue_op_ms", t0.elapsed().as_millis() as f64);
        tokio::time::sleep(inner.cfg.op_delay).await;
    }
}

fn schedule_settle(inner: &Arc<QueueInner>, seq: u64) {
    if inner.on_empty.is_none() {
        return;
    }
    let inner = Arc::clone(inner);
    tokio::spawn(async move {
        tokio::time::sleep(inner.cfg.settle_delay).await;
        let fire = {
            let st = inner.state.lock().unwrap();
            !st.closed && st.settle_gen == seq && st.ops.is_empty() && !st.draining
        };
        if fire {
            debug!("queue settled; firing on-empty hook");
            if let Some(hook) = &inner.on_empty {
                hook();
            }
        }
    });
}
