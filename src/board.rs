//! Progress Board
//!
//! Summary of every known checklist for the index page: marks a class
//! complete once all of its items are committed, repaints when other
//! contexts change the counters, and hosts backup export/import.

use chrono::{DateTime, Utc};
use log::{debug, warn};
use serde_json::Value;

use crate::backup::{self, BackupSnapshot, ImportReport};
use crate::config::{ChecklistEntry, TrackerConfig};
use crate::error::TrackerResult;
use crate::models::{count_key, parse_counter, total_key, SummaryCounters};
use crate::notifier::{ContextEvent, FrameClock, FrameId, RepaintSlot};
use crate::store::RecordStore;

/// Message shown after a successful import
pub const IMPORT_SUCCESS_MESSAGE: &str =
    "Progress imported! If a class page is open, refresh it to see changes.";

/// Rendering instructions for the summary
pub trait SummaryView {
    fn set_complete(&mut self, entry: &ChecklistEntry, complete: bool);
}

/// Human-readable outcome of an import attempt
pub fn import_message(result: &TrackerResult<ImportReport>) -> String {
    match result {
        Ok(_) => IMPORT_SUCCESS_MESSAGE.to_string(),
        Err(err) => format!("Import failed: {}", err),
    }
}

pub struct ProgressBoard<S: RecordStore, C: FrameClock, V: SummaryView> {
    store: S,
    config: TrackerConfig,
    view: V,
    repaint: RepaintSlot<C>,
}

impl<S: RecordStore, C: FrameClock, V: SummaryView> ProgressBoard<S, C, V> {
    pub fn new(store: S, config: TrackerConfig, clock: C, view: V) -> Self {
        Self {
            store,
            config,
            view,
            repaint: RepaintSlot::new(clock),
        }
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    pub fn view(&self) -> &V {
        &self.view
    }

    pub fn repaint(&self) -> &RepaintSlot<C> {
        &self.repaint
    }

    pub fn repaint_mut(&mut self) -> &mut RepaintSlot<C> {
        &mut self.repaint
    }

    /// Committed counters of one checklist; absent values read as 0
    pub fn counters(&self, key: &str) -> SummaryCounters {
        let read = |k: String| match self.store.get(&k) {
            None => Some(0),
            Some(raw) => parse_counter(&raw),
        };
        SummaryCounters {
            count: read(count_key(key)),
            total: read(total_key(key)),
        }
    }

    /// Repaint every class button from the stored counters
    pub fn refresh_progress(&mut self) {
        for entry in &self.config.checklists {
            let counters = self.counters(&entry.key);
            self.view.set_complete(entry, counters.is_complete());
        }
        debug!("Refreshed progress for {} classes", self.config.checklists.len());
    }

    /// Feed a focus, visibility or storage event
    pub fn handle_event(&mut self, event: &ContextEvent) -> Option<FrameId> {
        self.repaint.handle(event)
    }

    /// A paint frame fired; repaint if it is the pending one
    pub fn on_frame(&mut self, frame: FrameId) -> bool {
        if self.repaint.fire(frame) {
            self.refresh_progress();
            true
        } else {
            false
        }
    }

    // ========================
    // Backup
    // ========================

    pub fn export_snapshot(&self, now: DateTime<Utc>) -> BackupSnapshot {
        backup::build_snapshot(&self.store, &self.config, now)
    }

    pub fn export_json(&self) -> String {
        self.export_snapshot(Utc::now()).to_json()
    }

    /// Merge a parsed snapshot, repainting on success
    pub fn import_snapshot(&mut self, snapshot: Option<&Value>) -> TrackerResult<ImportReport> {
        let result = backup::apply_snapshot(&self.store, &self.config, snapshot);
        self.after_import(result)
    }

    /// Merge backup file text, repainting on success
    pub fn import_json(&mut self, raw: &str) -> TrackerResult<ImportReport> {
        let result = backup::import_json(&self.store, &self.config, raw);
        self.after_import(result)
    }

    fn after_import(&mut self, result: TrackerResult<ImportReport>) -> TrackerResult<ImportReport> {
        match &result {
            Ok(_) => self.refresh_progress(),
            Err(err) => warn!("Import rejected: {}", err),
        }
        result
    }
}
