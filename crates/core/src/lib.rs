//! Kennel core types: dogs, care categories, and the per-day care board.

#![forbid(unsafe_code)]

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;
use std::collections::BTreeMap;

/// Backend-assigned dog identifier (opaque string, stable for the record's lifetime).
pub type DogId = String;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Dog {
    pub id: DogId,
    pub name: String,
}

/// Care grid categories. Each view shows exactly one active category.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum CareCategory {
    PottyBreaks,
    Feeding,
}

impl CareCategory {
    pub fn label(&self) -> &'static str {
        match self {
            CareCategory::PottyBreaks => "pottybreaks",
            CareCategory::Feeding => "feeding",
        }
    }
}

impl std::fmt::Display for CareCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

impl std::str::FromStr for CareCategory {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pottybreaks" => Ok(CareCategory::PottyBreaks),
            "feeding" => Ok(CareCategory::Feeding),
            other => Err(format!("unknown care category: {}", other)),
        }
    }
}

/// One confirmed care log entry as returned by the backend.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CareEvent {
    pub dog_id: DogId,
    /// Time-bucket label, e.g. "8:00 AM".
    pub slot: String,
    pub category: CareCategory,
    /// Epoch seconds when the event was recorded.
    pub at: i64,
}

/// Slots marked active for one dog, in the order they were logged.
pub type SlotList = SmallVec<[String; 8]>;

/// Optimistic local state for one category of the daily-care grid: the most
/// recent locally-known truth, updated before any remote call is queued.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CareBoard {
    pub epoch: u64,
    entries: BTreeMap<DogId, SlotList>,
}

impl CareBoard {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, dog: &str, slot: &str) -> bool {
        self.entries
            .get(dog)
            .map(|s| s.iter().any(|x| x == slot))
            .unwrap_or(false)
    }

    pub fn slots(&self, dog: &str) -> &[String] {
        self.entries.get(dog).map(|s| s.as_slice()).unwrap_or(&[])
    }

    pub fn dogs(&self) -> impl Iterator<Item = (&DogId, &[String])> {
        self.entries.iter().map(|(k, v)| (k, v.as_slice()))
    }

    /// Append `slot` for `dog`. Idempotent: returns false (and leaves the
    /// list untouched) when the slot is already present.
    pub fn add_slot(&mut self, dog: &str, slot: &str) -> bool {
        let slots = self.entries.entry(dog.to_string()).or_default();
        if slots.iter().any(|x| x == slot) {
            return false;
        }
        slots.push(slot.to_string());
        true
    }

    /// Strip `slot` for `dog`; drops the entry entirely once its list is empty.
    pub fn remove_slot(&mut self, dog: &str, slot: &str) -> bool {
        let Some(slots) = self.entries.get_mut(dog) else {
            return false;
        };
        let before = slots.len();
        slots.retain(|x| x != slot);
        let changed = slots.len() != before;
        if slots.is_empty() {
            self.entries.remove(dog);
        }
        changed
    }

    /// Replace the whole list for `dog`; an empty list drops the entry.
    pub fn set_slots(&mut self, dog: &str, slots: SlotList) {
        if slots.is_empty() {
            self.entries.remove(dog);
        } else {
            self.entries.insert(dog.to_string(), slots);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

pub mod prelude {
    pub use super::{CareBoard, CareCategory, CareEvent, Dog, DogId, SlotList};
}
