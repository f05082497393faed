//! Kennel backend façade.
//!
//! This crate defines the stable trait and types the care-logging core
//! depends on. The production implementation talks to the hosted backend;
//! `MemoryApi` is an in-process stand-in and `MockApi` scripts failures
//! for tests.

#![forbid(unsafe_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::Duration;

use kennel_core::{CareCategory, CareEvent, Dog};
use serde::{Deserialize, Serialize};
use tracing::info;

/// API errors suitable for transport over RPC later.
#[derive(Debug, thiserror::Error, Serialize, Deserialize)]
pub enum KennelError {
    #[error("validation: {0}")]
    Validation(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("not_found: {0}")]
    NotFound(String),
    #[error("backend: {0}")]
    Backend(String),
}

pub type KennelResult<T> = Result<T, KennelError>;

/// Severity of a user-visible notice (toast-style).
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum NoticeKind {
    Info,
    Success,
    Warn,
    Error,
}

/// Fire-and-forget user notification. Delivery is best-effort; the core
/// never waits on acknowledgment.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Notice {
    pub title: String,
    pub body: String,
    pub kind: NoticeKind,
}

impl Notice {
    pub fn success(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self { title: title.into(), body: body.into(), kind: NoticeKind::Success }
    }
    pub fn error(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self { title: title.into(), body: body.into(), kind: NoticeKind::Error }
    }
    pub fn info(title: impl Into<String>, body: impl Into<String>) -> Self {
        Self { title: title.into(), body: body.into(), kind: NoticeKind::Info }
    }
}

/// Notices flow over an unbounded channel so senders never block a click.
pub type NoticeSender = tokio::sync::mpsc::UnboundedSender<Notice>;
pub type NoticeReceiver = tokio::sync::mpsc::UnboundedReceiver<Notice>;

pub fn notice_channel() -> (NoticeSender, NoticeReceiver) {
    tokio::sync::mpsc::unbounded_channel()
}

/// Remote care mutations. Every call either fully applies or rejects;
/// there is no partial-success contract and no ordering guarantee across
/// calls beyond what the caller imposes.
#[async_trait::async_trait]
pub trait CareApi: Send + Sync {
    async fn dogs(&self) -> KennelResult<Vec<Dog>>;

    async fn add_potty_break(&self, dog_id: &str, slot: &str) -> KennelResult<()>;

    async fn remove_potty_break(&self, dog_id: &str, slot: &str) -> KennelResult<()>;

    async fn log_feeding(&self, dog_id: &str, slot: &str) -> KennelResult<()>;

    /// Confirmed events for one category, oldest first. Used by the
    /// queue-settle refresh path.
    async fn care_events(&self, category: CareCategory) -> KennelResult<Vec<CareEvent>>;
}

// ----------------- Mock implementation -----------------

/// Call record: (operation, dog_id, slot).
pub type RecordedCall = (String, String, String);

/// Scriptable in-memory mock for tests: per-operation failure switches,
/// optional artificial latency, and a full call log.
#[derive(Default)]
pub struct MockApi {
    pub dogs: Vec<Dog>,
    pub fail_adds: bool,
    pub fail_removes: bool,
    pub fail_feedings: bool,
    pub latency: Option<Duration>,
    pub events: Vec<CareEvent>,
    pub calls: Mutex<Vec<RecordedCall>>,
}

impl MockApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    async fn record(&self, op: &str, dog_id: &str, slot: &str) {
        if let Some(d) = self.latency {
            tokio::time::sleep(d).await;
        }
        self.calls.lock().unwrap().push((op.to_string(), dog_id.to_string(), slot.to_string()));
    }
}

#[async_trait::async_trait]
impl CareApi for MockApi {
    async fn dogs(&self) -> KennelResult<Vec<Dog>> {
        Ok(self.dogs.clone())
    }

    async fn add_potty_break(&self, dog_id: &str, slot: &str) -> KennelResult<()> {
        self.record("add", dog_id, slot).await;
        if self.fail_adds {
            return Err(KennelError::Backend("network error".into()));
        }
        Ok(())
    }

    async fn remove_potty_break(&self, dog_id: &str, slot: &str) -> KennelResult<()> {
        self.record("remove", dog_id, slot).await;
        if self.fail_removes {
            return Err(KennelError::Backend("network error".into()));
        }
        Ok(())
    }

    async fn log_feeding(&self, dog_id: &str, slot: &str) -> KennelResult<()> {
        self.record("feeding", dog_id, slot).await;
        if self.fail_feedings {
            return Err(KennelError::Backend("network error".into()));
        }
        Ok(())
    }

    async fn care_events(&self, category: CareCategory) -> KennelResult<Vec<CareEvent>> {
        let mut out: Vec<CareEvent> =
            self.events.iter().filter(|e| e.category == category).cloned().collect();
        out.sort_by_key(|e| e.at);
        Ok(out)
    }
}

// ----------------- In-process implementation -----------------

/// In-process backend holding events in RAM. Duplicate potty-break adds
/// are conflicts and removals of absent events are not-found, matching the
/// hosted backend's constraints.
pub struct MemoryApi {
    dogs: Vec<Dog>,
    events: Mutex<Vec<CareEvent>>,
    fail_writes: AtomicBool,
}

impl MemoryApi {
    pub fn new(dogs: Vec<Dog>) -> Self {
        Self { dogs, events: Mutex::new(Vec::new()), fail_writes: AtomicBool::new(false) }
    }

    /// Make every subsequent write reject (failure-injection for demos).
    pub fn set_fail_writes(&self, on: bool) {
        self.fail_writes.store(on, Ordering::SeqCst);
    }

    fn check_writable(&self) -> KennelResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(KennelError::Backend("injected write failure".into()));
        }
        Ok(())
    }

    fn known_dog(&self, dog_id: &str) -> KennelResult<()> {
        if self.dogs.iter().any(|d| d.id == dog_id) {
            Ok(())
        } else {
            Err(KennelError::NotFound(format!("dog: {}", dog_id)))
        }
    }
}

#[async_trait::async_trait]
impl CareApi for MemoryApi {
    async fn dogs(&self) -> KennelResult<Vec<Dog>> {
        Ok(self.dogs.clone())
    }

    async fn add_potty_break(&self, dog_id: &str, slot: &str) -> KennelResult<()> {
        self.check_writable()?;
        self.known_dog(dog_id)?;
        let mut events = self.events.lock().unwrap();
        let dup = events.iter().any(|e| {
            e.category == CareCategory::PottyBreaks && e.dog_id == dog_id && e.slot == slot
        });
        if dup {
            return Err(KennelError::Conflict(format!("potty break exists: {}/{}", dog_id, slot)));
        }
        events.push(CareEvent {
            dog_id: dog_id.to_string(),
            slot: slot.to_string(),
            category: CareCategory::PottyBreaks,
            at: chrono::Utc::now().timestamp(),
        });
        info!(dog = %dog_id, slot = %slot, "memory api: potty break added");
        Ok(())
    }

    async fn remove_potty_break(&self, dog_id: &str, slot: &str) -> KennelResult<()> {
        self.check_writable()?;
        let mut events = self.events.lock().unwrap();
        let before = events.len();
        events.retain(|e| {
            !(e.category == CareCategory::PottyBreaks && e.dog_id == dog_id && e.slot == slot)
        });
        if events.len() == before {
            return Err(KennelError::NotFound(format!("potty break: {}/{}", dog_id, slot)));
        }
        info!(dog = %dog_id, slot = %slot, "memory api: potty break removed");
        Ok(())
    }

    async fn log_feeding(&self, dog_id: &str, slot: &str) -> KennelResult<()> {
        self.check_writable()?;
        self.known_dog(dog_id)?;
        self.events.lock().unwrap().push(CareEvent {
            dog_id: dog_id.to_string(),
            slot: slot.to_string(),
            category: CareCategory::Feeding,
            at: chrono::Utc::now().timestamp(),
        });
        info!(dog = %dog_id, slot = %slot, "memory api: feeding logged");
        Ok(())
    }

    async fn care_events(&self, category: CareCategory) -> KennelResult<Vec<CareEvent>> {
        let mut out: Vec<CareEvent> = self
            .events
            .lock()
            .unwrap()
            .iter()
            .filter(|e| e.category == category)
            .cloned()
            .collect();
        out.sort_by_key(|e| e.at);
        Ok(out)
    }
}
