//! Checklist State Engine
//!
//! Owns the live selection state of one class checklist. Counters and the
//! dirty flag are always recomputed from the live state rather than kept
//! incrementally; checklists are a few dozen items.
//!
//! The page's markup is an external collaborator: it forwards checkbox
//! events here and receives rendering instructions through [`ChecklistView`].

use log::{debug, info, warn};

use crate::error::{TrackerError, TrackerResult};
use crate::models::{
    count_key, total_key, ChecklistDefinition, ChecklistRecord, ProgressTier, SelectAllState,
};
use crate::store::RecordStore;

/// How long the save confirmation stays visible
pub const SAVE_TOAST_MS: u32 = 1500;

/// Rendering instructions emitted by the engine
pub trait ChecklistView {
    /// Counter in a category header, e.g. `3/12`
    fn show_category_count(&mut self, category: usize, checked: usize, total: usize);

    /// Global counter next to the title
    fn show_global_count(&mut self, checked: usize, total: usize, tier: ProgressTier);

    /// Tri-state of the "select all" toggle
    fn show_select_all(&mut self, state: SelectAllState);

    /// Enable or disable the save button
    fn set_commit_enabled(&mut self, enabled: bool);

    /// Transient, auto-dismissing confirmation after a save
    fn confirm_saved(&mut self);
}

/// Fingerprint of the live selection state
///
/// One `0`/`1` per item, categories separated by `|`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash)]
pub struct DirtySignature(String);

impl DirtySignature {
    pub fn of(selections: &[Vec<bool>]) -> Self {
        let parts: Vec<String> = selections
            .iter()
            .map(|items| items.iter().map(|&on| if on { '1' } else { '0' }).collect())
            .collect();
        Self(parts.join("|"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Live state of one checklist page
pub struct ChecklistEngine<S: RecordStore, V: ChecklistView> {
    definition: ChecklistDefinition,
    store: S,
    view: V,
    selections: Vec<Vec<bool>>,
    baseline: DirtySignature,
    commit_enabled: bool,
}

impl<S: RecordStore, V: ChecklistView> ChecklistEngine<S, V> {
    /// Build an engine with nothing selected; call [`load`](Self::load) next
    pub fn new(definition: ChecklistDefinition, store: S, view: V) -> Self {
        let selections: Vec<Vec<bool>> = definition
            .categories
            .iter()
            .map(|c| vec![false; c.len()])
            .collect();
        let baseline = DirtySignature::of(&selections);
        Self {
            definition,
            store,
            view,
            selections,
            baseline,
            commit_enabled: false,
        }
    }

    pub fn definition(&self) -> &ChecklistDefinition {
        &self.definition
    }

    pub fn view(&self) -> &V {
        &self.view
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn total(&self) -> usize {
        self.definition.total()
    }

    /// Number of selected items across all categories
    pub fn selected_count(&self) -> usize {
        self.selections
            .iter()
            .map(|items| items.iter().filter(|&&on| on).count())
            .sum()
    }

    /// `(checked, total)` of one category
    pub fn category_count(&self, category: usize) -> Option<(usize, usize)> {
        self.selections
            .get(category)
            .map(|items| (items.iter().filter(|&&on| on).count(), items.len()))
    }

    pub fn is_selected(&self, category: usize, index: usize) -> bool {
        self.selections
            .get(category)
            .and_then(|items| items.get(index))
            .copied()
            .unwrap_or(false)
    }

    pub fn select_all_state(&self) -> SelectAllState {
        SelectAllState::of(self.selected_count(), self.total())
    }

    pub fn signature(&self) -> DirtySignature {
        DirtySignature::of(&self.selections)
    }

    /// Live state differs from the last load/save baseline
    pub fn is_dirty(&self) -> bool {
        self.signature() != self.baseline
    }

    pub fn commit_enabled(&self) -> bool {
        self.commit_enabled
    }

    // ========================
    // Load / Save
    // ========================

    /// Restore saved selections and resynchronize the summary counters
    ///
    /// A missing or unreadable record loads as "nothing selected". `_total`
    /// is always rewritten from the definition and `_count` from the
    /// restored selections.
    pub fn load(&mut self) -> TrackerResult<()> {
        let key = self.definition.storage_key.clone();
        let record = match self.store.get(&key) {
            None => ChecklistRecord::default(),
            Some(raw) => ChecklistRecord::parse(&raw).unwrap_or_else(|err| {
                warn!("[{}] Ignoring unreadable record: {}", key, err);
                ChecklistRecord::default()
            }),
        };

        for items in &mut self.selections {
            items.iter_mut().for_each(|on| *on = false);
        }
        for (id, indices) in &record.selections {
            let Some(category) = self.definition.category_index(id) else {
                debug!("[{}] Skipping unknown category {}", key, id);
                continue;
            };
            let items = &mut self.selections[category];
            for &index in indices {
                if let Some(on) = items.get_mut(index) {
                    *on = true;
                }
            }
        }

        self.refresh_counters();

        let selected = self.selected_count();
        self.store.set(&total_key(&key), &self.total().to_string())?;
        self.store.set(&count_key(&key), &selected.to_string())?;

        self.baseline = self.signature();
        self.set_commit_enabled(false);
        info!("[{}] Loaded {}/{} selections", key, selected, self.total());
        Ok(())
    }

    /// Commit the live selections
    ///
    /// Returns `Ok(false)` without writing when nothing changed since the
    /// last load or save. The record and `_count` are written together: if
    /// the count write fails the previous record is put back.
    pub fn save(&mut self) -> TrackerResult<bool> {
        if !self.commit_enabled {
            return Ok(false);
        }

        let key = self.definition.storage_key.clone();
        let record = self.build_record();
        let selected = self.selected_count();

        let previous = self.store.get(&key);
        self.store.set(&key, &record.to_json())?;
        if let Err(err) = self.store.set(&count_key(&key), &selected.to_string()) {
            warn!("[{}] Count write failed, restoring record: {}", key, err);
            let restored = match &previous {
                Some(raw) => self.store.set(&key, raw),
                None => self.store.remove(&key),
            };
            if let Err(restore_err) = restored {
                warn!("[{}] Could not restore record: {}", key, restore_err);
            }
            return Err(err);
        }

        self.view.confirm_saved();
        self.baseline = self.signature();
        self.set_commit_enabled(false);
        info!("[{}] Saved {}/{} selections", key, selected, self.total());
        Ok(true)
    }

    fn build_record(&self) -> ChecklistRecord {
        let selections = self
            .definition
            .categories
            .iter()
            .zip(&self.selections)
            .map(|(category, items)| {
                let indices = items
                    .iter()
                    .enumerate()
                    .filter(|(_, on)| **on)
                    .map(|(i, _)| i)
                    .collect();
                (category.id.clone(), indices)
            })
            .collect();
        ChecklistRecord { selections }
    }

    // ========================
    // Input events
    // ========================

    /// Check or uncheck one item
    pub fn set_item(&mut self, category: usize, index: usize, checked: bool) -> TrackerResult<()> {
        let slot = self
            .selections
            .get_mut(category)
            .and_then(|items| items.get_mut(index))
            .ok_or_else(|| {
                TrackerError::InvalidInput(format!("no item {} in category {}", index, category))
            })?;
        *slot = checked;

        self.refresh_category(category);
        self.refresh_global();
        self.refresh_dirty();
        Ok(())
    }

    /// Check or uncheck one item, addressing the category by id
    pub fn set_item_by_id(&mut self, category_id: &str, index: usize, checked: bool) -> TrackerResult<()> {
        let category = self
            .definition
            .category_index(category_id)
            .ok_or_else(|| TrackerError::InvalidInput(format!("unknown category {}", category_id)))?;
        self.set_item(category, index, checked)
    }

    /// Select or deselect every item, then refresh once
    pub fn set_all(&mut self, checked: bool) {
        for items in &mut self.selections {
            items.iter_mut().for_each(|on| *on = checked);
        }
        self.refresh_counters();
        self.refresh_dirty();
    }

    // ========================
    // Recompute helpers
    // ========================

    fn refresh_counters(&mut self) {
        for category in 0..self.selections.len() {
            self.refresh_category(category);
        }
        self.refresh_global();
    }

    fn refresh_category(&mut self, category: usize) {
        if let Some((checked, total)) = self.category_count(category) {
            self.view.show_category_count(category, checked, total);
        }
    }

    fn refresh_global(&mut self) {
        let checked = self.selected_count();
        let total = self.total();
        self.view.show_global_count(checked, total, ProgressTier::of(checked, total));
        self.view.show_select_all(SelectAllState::of(checked, total));
    }

    fn refresh_dirty(&mut self) {
        let dirty = self.is_dirty();
        self.set_commit_enabled(dirty);
    }

    fn set_commit_enabled(&mut self, enabled: bool) {
        self.commit_enabled = enabled;
        self.view.set_commit_enabled(enabled);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Category;
    use crate::store::MemoryStore;
    use std::cell::Cell;
    use std::rc::Rc;

    #[derive(Default)]
    struct RecordingView {
        categories: Vec<(usize, usize)>,
        global: Option<(usize, usize, ProgressTier)>,
        select_all: Option<SelectAllState>,
        commit_enabled: Option<bool>,
        confirmations: usize,
    }

    impl ChecklistView for RecordingView {
        fn show_category_count(&mut self, category: usize, checked: usize, total: usize) {
            if self.categories.len() <= category {
                self.categories.resize(category + 1, (0, 0));
            }
            self.categories[category] = (checked, total);
        }

        fn show_global_count(&mut self, checked: usize, total: usize, tier: ProgressTier) {
            self.global = Some((checked, total, tier));
        }

        fn show_select_all(&mut self, state: SelectAllState) {
            self.select_all = Some(state);
        }

        fn set_commit_enabled(&mut self, enabled: bool) {
            self.commit_enabled = Some(enabled);
        }

        fn confirm_saved(&mut self) {
            self.confirmations += 1;
        }
    }

    fn names(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("Weapon {}", i)).collect()
    }

    fn ranger() -> ChecklistDefinition {
        ChecklistDefinition::new(
            "Ranger",
            "rangerSave",
            vec![
                Category::new("ar", "Assault Rifles", names(3)),
                Category::new("sg", "Shotguns", names(2)),
            ],
        )
    }

    fn single(n: usize) -> ChecklistDefinition {
        ChecklistDefinition::new("Fencer", "fencerSave", vec![Category::new("hm", "Hammers", names(n))])
    }

    fn engine(def: ChecklistDefinition, store: &MemoryStore) -> ChecklistEngine<MemoryStore, RecordingView> {
        ChecklistEngine::new(def, store.clone(), RecordingView::default())
    }

    /// Counts writes seen from another context
    fn count_writes(store: &MemoryStore) -> Rc<Cell<usize>> {
        let writes = Rc::new(Cell::new(0));
        let observer = store.open_context();
        let counter = Rc::clone(&writes);
        observer.subscribe(move |_| counter.set(counter.get() + 1));
        writes
    }

    #[test]
    fn test_load_empty_store() {
        let store = MemoryStore::new();
        let mut page = engine(ranger(), &store);
        page.load().unwrap();

        assert_eq!(page.selected_count(), 0);
        assert_eq!(store.get("rangerSave_total").as_deref(), Some("5"));
        assert_eq!(store.get("rangerSave_count").as_deref(), Some("0"));
        assert!(!page.commit_enabled());
        assert_eq!(page.view().commit_enabled, Some(false));
        assert_eq!(page.view().global, Some((0, 5, ProgressTier::Low)));
        assert_eq!(page.view().categories, vec![(0, 3), (0, 2)]);
        assert_eq!(page.view().select_all, Some(SelectAllState::Unchecked));
    }

    #[test]
    fn test_load_restores_and_resyncs_counters() {
        let store = MemoryStore::new();
        store.set("rangerSave", r#"{"ar":[0,2],"sg":[1]}"#).unwrap();
        store.set("rangerSave_total", "99").unwrap();
        store.set("rangerSave_count", "42").unwrap();

        let mut page = engine(ranger(), &store);
        page.load().unwrap();

        assert_eq!(page.selected_count(), 3);
        assert!(page.is_selected(0, 2));
        assert!(page.is_selected(1, 1));
        assert!(!page.is_selected(0, 1));
        assert_eq!(store.get("rangerSave_total").as_deref(), Some("5"));
        assert_eq!(store.get("rangerSave_count").as_deref(), Some("3"));
        assert_eq!(page.view().categories, vec![(2, 3), (1, 2)]);
        assert_eq!(page.view().global, Some((3, 5, ProgressTier::Medium)));
        assert!(!page.is_dirty());
    }

    #[test]
    fn test_load_ignores_out_of_range_and_unknown() {
        let store = MemoryStore::new();
        store.set("rangerSave", r#"{"ar":[0,7,1,1],"old":[0]}"#).unwrap();

        let mut page = engine(ranger(), &store);
        page.load().unwrap();

        assert_eq!(page.selected_count(), 2);
        assert!(page.selected_count() <= page.total());
        assert_eq!(store.get("rangerSave_count").as_deref(), Some("2"));
    }

    #[test]
    fn test_load_corrupt_record_is_empty() {
        let store = MemoryStore::new();
        store.set("rangerSave", "{oops").unwrap();

        let mut page = engine(ranger(), &store);
        page.load().unwrap();

        assert_eq!(page.selected_count(), 0);
        assert_eq!(store.get("rangerSave_count").as_deref(), Some("0"));
        // The unreadable record is left for the next save to replace
        assert_eq!(store.get("rangerSave").as_deref(), Some("{oops"));
    }

    #[test]
    fn test_toggle_tracks_dirty() {
        let store = MemoryStore::new();
        let mut page = engine(ranger(), &store);
        page.load().unwrap();

        page.set_item(0, 1, true).unwrap();
        assert!(page.commit_enabled());
        assert_eq!(page.view().categories[0], (1, 3));
        assert_eq!(page.view().select_all, Some(SelectAllState::Indeterminate));

        page.set_item(0, 1, false).unwrap();
        assert!(!page.commit_enabled());
        assert_eq!(page.view().commit_enabled, Some(false));
    }

    #[test]
    fn test_toggle_out_of_range() {
        let store = MemoryStore::new();
        let mut page = engine(ranger(), &store);
        page.load().unwrap();

        assert!(matches!(page.set_item(0, 3, true), Err(TrackerError::InvalidInput(_))));
        assert!(matches!(page.set_item(5, 0, true), Err(TrackerError::InvalidInput(_))));
        assert!(matches!(page.set_item_by_id("zz", 0, true), Err(TrackerError::InvalidInput(_))));
        assert!(!page.commit_enabled());
    }

    #[test]
    fn test_save_writes_record_and_count() {
        let store = MemoryStore::new();
        let mut page = engine(ranger(), &store);
        page.load().unwrap();

        page.set_item_by_id("sg", 1, true).unwrap();
        page.set_item(0, 0, true).unwrap();
        assert!(page.save().unwrap());

        assert_eq!(store.get("rangerSave").as_deref(), Some(r#"{"ar":[0],"sg":[1]}"#));
        assert_eq!(store.get("rangerSave_count").as_deref(), Some("2"));
        assert_eq!(page.view().confirmations, 1);
        assert!(!page.commit_enabled());
        assert!(!page.is_dirty());
    }

    #[test]
    fn test_second_save_is_noop() {
        let store = MemoryStore::new();
        let mut page = engine(ranger(), &store);
        page.load().unwrap();
        page.set_item(1, 0, true).unwrap();

        let writes = count_writes(&store);
        assert!(page.save().unwrap());
        let after_first = writes.get();
        assert_eq!(after_first, 2);

        assert!(!page.save().unwrap());
        assert_eq!(writes.get(), after_first);
        assert_eq!(page.view().confirmations, 1);
    }

    #[test]
    fn test_save_without_changes_is_noop() {
        let store = MemoryStore::new();
        let mut page = engine(ranger(), &store);
        page.load().unwrap();

        assert!(!page.save().unwrap());
        assert_eq!(store.get("rangerSave"), None);
    }

    #[test]
    fn test_select_all_then_deselect_one() {
        let store = MemoryStore::new();
        let mut page = engine(single(10), &store);
        page.load().unwrap();

        page.set_all(true);
        assert_eq!(page.view().select_all, Some(SelectAllState::Checked));
        assert_eq!(page.view().global, Some((10, 10, ProgressTier::Complete)));

        page.set_item(0, 4, false).unwrap();
        assert_eq!(page.view().categories[0], (9, 10));
        assert_eq!(page.view().global, Some((9, 10, ProgressTier::Medium)));
        assert_eq!(page.view().select_all, Some(SelectAllState::Indeterminate));
        assert!(page.commit_enabled());
    }

    #[test]
    fn test_deselect_all_restores_clean_state() {
        let store = MemoryStore::new();
        let mut page = engine(single(4), &store);
        page.load().unwrap();

        page.set_all(true);
        assert!(page.commit_enabled());
        page.set_all(false);
        assert!(!page.commit_enabled());
        assert_eq!(page.view().select_all, Some(SelectAllState::Unchecked));
    }

    #[test]
    fn test_failed_count_write_restores_record() {
        let store = MemoryStore::new();
        store.set("rangerSave", r#"{"ar":[0],"sg":[]}"#).unwrap();
        let mut page = engine(ranger(), &store);
        page.load().unwrap();

        page.set_item(0, 2, true).unwrap();
        store.reject_writes_to("rangerSave_count");

        assert!(matches!(page.save(), Err(TrackerError::Storage(_))));
        assert_eq!(store.get("rangerSave").as_deref(), Some(r#"{"ar":[0],"sg":[]}"#));
        assert_eq!(store.get("rangerSave_count").as_deref(), Some("1"));
        assert!(page.commit_enabled());
        assert_eq!(page.view().confirmations, 0);
    }

    #[test]
    fn test_failed_first_save_removes_record() {
        let store = MemoryStore::new();
        let mut page = engine(ranger(), &store);
        page.load().unwrap();

        page.set_item(0, 0, true).unwrap();
        store.reject_writes_to("rangerSave_count");

        assert!(page.save().is_err());
        assert_eq!(store.get("rangerSave"), None);
    }

    #[test]
    fn test_other_context_commit_leaves_baseline() {
        let store = MemoryStore::new();
        let tab_b_store = store.open_context();

        let mut tab_a = engine(ranger(), &store);
        let mut tab_b = engine(ranger(), &tab_b_store);
        tab_a.load().unwrap();
        tab_b.load().unwrap();

        tab_a.set_item(0, 0, true).unwrap();
        tab_a.save().unwrap();
        tab_b.set_item(1, 1, true).unwrap();
        tab_b.save().unwrap();

        // Last write wins; tab A keeps its own baseline until it reloads
        assert_eq!(store.get("rangerSave").as_deref(), Some(r#"{"ar":[],"sg":[1]}"#));
        assert!(!tab_a.is_dirty());
        assert!(tab_a.is_selected(0, 0));

        tab_a.load().unwrap();
        assert!(!tab_a.is_selected(0, 0));
        assert!(tab_a.is_selected(1, 1));
    }

    #[test]
    fn test_signature_format() {
        let sig = DirtySignature::of(&[vec![true, false], vec![], vec![false, true, true]]);
        assert_eq!(sig.as_str(), "10||011");
    }
}
