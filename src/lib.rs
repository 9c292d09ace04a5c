//! EDF Progress Tracker
//!
//! Client-side core of the class checklists:
//! - store: record store abstraction shared by every browsing context
//! - checklist: live selection state, counters and commits of one class
//! - backup: full-state export/import snapshots
//! - notifier: debounced repaints on focus, visibility and store changes
//! - board: index-page summary of every class
//!
//! Markup and styling live in the pages; `browser` binds this core to them.

pub mod backup;
pub mod board;
pub mod checklist;
pub mod config;
pub mod error;
pub mod models;
pub mod notifier;
pub mod store;

#[cfg(target_arch = "wasm32")]
mod browser;

pub use backup::{BackupSnapshot, ImportReport};
pub use board::{ProgressBoard, SummaryView};
pub use checklist::{ChecklistEngine, ChecklistView, DirtySignature};
pub use config::{ChecklistEntry, TrackerConfig};
pub use error::{TrackerError, TrackerResult};
pub use models::{Category, ChecklistDefinition, ChecklistRecord, ProgressTier, SelectAllState, SummaryCounters};
pub use notifier::{ContextEvent, FiredMarker, FrameClock, FrameId, ManualClock, PendingFrames, RepaintSlot};
pub use store::{MemoryStore, RecordStore, StorageChange};
