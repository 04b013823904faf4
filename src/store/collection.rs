//! # The configuration store.
//!
//! [`ConfigurationStore`] owns the live collection of records keyed by unique
//! id, their display order, the selection and the recency list of temporary
//! records.
//!
//! ## Locking
//! Every mutation takes the exclusive lock. Reads take the shared lock; the
//! sorted view is cached and dropped on any structural change, then rebuilt
//! lazily:
//!
//! ```text
//! sorted()
//!   ├─ read lock:  cached? ──► return it
//!   └─ write lock: cached? ──► return it (another reader rebuilt it)
//!                  else     ──► apply pending custom order, rebuild, cache
//! ```
//!
//! Events are published after the lock is released, in the order the changes
//! were made.
//!
//! ## Temporary records
//! Newly added temporary records go to the front of the recency list (capped
//! at the recents limit). When the number of temporary records exceeds the
//! limit, temporaries missing from the recency list are evicted in store order
//! until the excess is gone.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::RwLock;

use super::order::{by_custom_order, sort_records, Comparator};
use super::storage::{PersistedState, StateStorage};
use crate::error::StoreError;
use crate::events::{Bus, Event, EventKind};
use crate::model::{BeforeRunTask, ConfigurationRecord, RecordHandle, StorageTier, TypeRef};
use crate::registry::ConfigurationRegistry;

/// Records of one folder (or of no folder) inside a [`TypeGroup`].
#[derive(Clone, Debug)]
pub struct FolderGroup {
    /// Folder name; `None` for un-foldered records.
    pub folder: Option<String>,
    /// Records in display order.
    pub records: Vec<Arc<ConfigurationRecord>>,
}

/// Records of one type, split by folder.
#[derive(Clone, Debug)]
pub struct TypeGroup {
    /// Type id.
    pub type_id: String,
    /// Folders in first-seen order, un-foldered last.
    pub folders: Vec<FolderGroup>,
}

type SortedView = Arc<Vec<Arc<ConfigurationRecord>>>;

#[derive(Default)]
struct Inner {
    records: HashMap<String, Arc<ConfigurationRecord>>,
    handles: HashMap<RecordHandle, String>,
    order: Vec<String>,
    recents: Vec<String>,
    selected: Option<String>,
    custom_order: Vec<String>,
    order_dirty: bool,
    sorted: Option<SortedView>,
    recent_executors: HashMap<String, String>,
    loaded: bool,
}

impl Inner {
    fn invalidate(&mut self) {
        self.sorted = None;
    }

    fn ordered(&self) -> Vec<Arc<ConfigurationRecord>> {
        self.order
            .iter()
            .filter_map(|id| self.records.get(id).cloned())
            .collect()
    }

    fn sorted_view(&mut self, registry: &ConfigurationRegistry) -> SortedView {
        if let Some(view) = &self.sorted {
            return Arc::clone(view);
        }
        if self.order_dirty && !self.custom_order.is_empty() {
            let mut records = self.ordered();
            let cmp = by_custom_order(&self.custom_order);
            sort_records(&mut records, registry, Some(&cmp), false);
            self.order = records.iter().map(|r| r.unique_id()).collect();
        }
        self.order_dirty = false;
        let view = Arc::new(self.ordered());
        self.sorted = Some(Arc::clone(&view));
        view
    }

    fn rename(&mut self, old: &str, new: &str) {
        for list in [&mut self.order, &mut self.recents, &mut self.custom_order] {
            for id in list.iter_mut().filter(|id| id.as_str() == old) {
                *id = new.to_string();
            }
        }
        if self.selected.as_deref() == Some(old) {
            self.selected = Some(new.to_string());
        }
        if let Some(executor) = self.recent_executors.remove(old) {
            self.recent_executors.insert(new.to_string(), executor);
        }
    }

    fn forget(&mut self, id: &str) -> Option<Arc<ConfigurationRecord>> {
        let rec = self.records.remove(id)?;
        self.handles.remove(&rec.handle());
        self.order.retain(|x| x != id);
        self.recents.retain(|x| x != id);
        self.recent_executors.remove(id);
        Some(rec)
    }

    fn touch_recent(&mut self, id: &str, limit: usize) {
        self.recents.retain(|x| x != id);
        self.recents.insert(0, id.to_string());
        self.recents.truncate(limit);
    }

    fn excess_temporaries(&mut self, limit: usize) -> Vec<String> {
        self.recents.truncate(limit);
        let temporaries: Vec<&String> = self
            .order
            .iter()
            .filter(|id| self.records.get(*id).is_some_and(|r| r.temporary))
            .collect();
        let mut excess = temporaries.len().saturating_sub(limit);
        let mut evict = Vec::new();
        for id in temporaries {
            if excess == 0 {
                break;
            }
            if !self.recents.contains(id) {
                evict.push(id.clone());
                excess -= 1;
            }
        }
        evict
    }
}

/// Authoritative, orderable collection of configuration records.
pub struct ConfigurationStore {
    inner: RwLock<Inner>,
    registry: Arc<ConfigurationRegistry>,
    bus: Bus,
    recents_limit: usize,
}

impl ConfigurationStore {
    /// Creates an empty store publishing to `bus`.
    pub fn new(registry: Arc<ConfigurationRegistry>, bus: Bus, recents_limit: usize) -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            registry,
            bus,
            recents_limit,
        }
    }

    /// Type registry backing this store.
    pub fn registry(&self) -> &Arc<ConfigurationRegistry> {
        &self.registry
    }

    /// Maximum number of temporary records kept.
    pub fn recents_limit(&self) -> usize {
        self.recents_limit
    }

    fn publish(&self, events: Vec<Event>) {
        for ev in events {
            self.bus.publish(ev);
        }
    }

    // ---- mutations -------------------------------------------------------

    /// Adds a record, or updates it in place when a record with the same
    /// handle is already stored (migrating its id if the unique id changed).
    ///
    /// Template records replace the template of their `(type, factory)` pair.
    pub fn add(&self, record: ConfigurationRecord) -> Arc<ConfigurationRecord> {
        let rec = Arc::new(record);
        if rec.template {
            self.registry.put_template((*rec).clone());
            return rec;
        }

        let id = rec.unique_id();
        let mut events = Vec::new();
        {
            let mut inner = self.inner.write();
            let mut added = false;
            match inner.handles.get(&rec.handle()).cloned() {
                Some(old) if old != id => {
                    inner.records.remove(&old);
                    if inner.forget(&id).is_some() {
                        events.push(Event::new(EventKind::RecordRemoved).with_record(id.as_str()));
                    }
                    inner.rename(&old, &id);
                    events.push(
                        Event::new(EventKind::RecordChanged)
                            .with_record(id.as_str())
                            .with_previous(old),
                    );
                }
                Some(_) => {
                    events.push(Event::new(EventKind::RecordChanged).with_record(id.as_str()));
                }
                None => match inner.records.get(&id).map(|r| r.handle()) {
                    Some(replaced) => {
                        inner.handles.remove(&replaced);
                        events.push(Event::new(EventKind::RecordChanged).with_record(id.as_str()));
                    }
                    None => {
                        inner.order.push(id.clone());
                        inner.order_dirty = true;
                        if rec.temporary {
                            inner.touch_recent(&id, self.recents_limit);
                        }
                        added = true;
                    }
                },
            }
            inner.handles.insert(rec.handle(), id.clone());
            inner.records.insert(id.clone(), Arc::clone(&rec));
            if !rec.temporary {
                inner.recents.retain(|x| x != &id);
            }
            inner.invalidate();

            if added {
                if rec.temporary {
                    let evict = inner.excess_temporaries(self.recents_limit);
                    events.extend(self.remove_locked(&mut inner, &evict));
                }
                events.push(Event::new(EventKind::RecordAdded).with_record(id.as_str()));
            }
        }
        tracing::debug!(record = %id, temporary = rec.temporary, "record stored");
        self.publish(events);
        rec
    }

    /// Removes records by unique id. Returns how many were removed.
    ///
    /// Before-run tasks of the remaining records that launch a removed record
    /// are dropped. If the selection was removed, the first managed record is
    /// selected instead.
    pub fn remove<I, S>(&self, ids: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let ids: Vec<String> = ids.into_iter().map(|s| s.as_ref().to_string()).collect();
        let events = {
            let mut inner = self.inner.write();
            self.remove_locked(&mut inner, &ids)
        };
        let removed = events
            .iter()
            .filter(|e| e.kind == EventKind::RecordRemoved)
            .count();
        self.publish(events);
        removed
    }

    fn remove_locked(&self, inner: &mut Inner, ids: &[String]) -> Vec<Event> {
        let mut events = Vec::new();
        let mut removed: HashSet<&str> = HashSet::new();
        for id in ids {
            if inner.forget(id).is_some() {
                tracing::debug!(record = %id, "record removed");
                removed.insert(id.as_str());
                events.push(Event::new(EventKind::RecordRemoved).with_record(id.as_str()));
            }
        }
        if removed.is_empty() {
            return events;
        }
        inner.invalidate();

        let mut stripped = false;
        for rec in inner.records.values_mut() {
            let kept = match rec.before_run.as_deref() {
                Some(tasks)
                    if tasks
                        .iter()
                        .any(|t| t.target.as_deref().is_some_and(|x| removed.contains(x))) =>
                {
                    tasks
                        .iter()
                        .filter(|t| !t.target.as_deref().is_some_and(|x| removed.contains(x)))
                        .cloned()
                        .collect::<Vec<_>>()
                }
                _ => continue,
            };
            let mut updated = (**rec).clone();
            updated.before_run = Some(kept);
            *rec = Arc::new(updated);
            stripped = true;
        }
        if stripped {
            events.push(Event::new(EventKind::BeforeRunTasksChanged));
        }

        if inner
            .selected
            .as_deref()
            .is_some_and(|s| removed.contains(s))
        {
            let view = inner.sorted_view(&self.registry);
            inner.selected = view
                .iter()
                .find(|r| self.registry.is_managed(&r.type_id))
                .map(|r| r.unique_id());
            events.push(selection_event(inner.selected.as_deref()));
        }
        events
    }

    /// Selects a record (or clears the selection).
    ///
    /// Selecting the current selection is a no-op. Selecting a record that
    /// is not stored is an internal error: it is logged and rejected.
    pub fn select(&self, id: Option<&str>) -> Result<(), StoreError> {
        if self.inner.read().selected.as_deref() == id {
            return Ok(());
        }
        {
            let mut inner = self.inner.write();
            if inner.selected.as_deref() == id {
                return Ok(());
            }
            if let Some(id) = id {
                if !inner.records.contains_key(id) {
                    tracing::error!(record = %id, "record must be added before selecting");
                    return Err(StoreError::NotMember { id: id.to_string() });
                }
            }
            inner.selected = id.map(str::to_string);
        }
        self.bus.publish(selection_event(id));
        Ok(())
    }

    /// Reorders the collection.
    ///
    /// With `grouping`, records sort by type, folder and temporary flag
    /// before `comparator`; without a comparator the current order breaks ties.
    pub fn set_order(&self, comparator: Option<Comparator>, grouping: bool) {
        let mut inner = self.inner.write();
        let mut records = inner.ordered();
        sort_records(&mut records, &self.registry, comparator.as_ref(), grouping);
        inner.order = records.iter().map(|r| r.unique_id()).collect();
        inner.order_dirty = false;
        inner.invalidate();
    }

    /// Installs a custom order (unique ids), applied on the next read.
    pub fn set_custom_order(&self, ids: Vec<String>) {
        let mut inner = self.inner.write();
        inner.custom_order = ids;
        inner.order_dirty = true;
        inner.invalidate();
    }

    /// Evicts temporary records beyond the recents limit. Returns the count.
    pub fn trim_to_recents_limit(&self) -> usize {
        let events = {
            let mut inner = self.inner.write();
            let evict = inner.excess_temporaries(self.recents_limit);
            self.remove_locked(&mut inner, &evict)
        };
        let removed = events
            .iter()
            .filter(|e| e.kind == EventKind::RecordRemoved)
            .count();
        self.publish(events);
        removed
    }

    /// Marks `record` temporary, adds it and selects it.
    pub fn set_temporary(&self, mut record: ConfigurationRecord) -> Result<Arc<ConfigurationRecord>, StoreError> {
        record.temporary = true;
        let rec = self.add(record);
        self.select(Some(&rec.unique_id()))?;
        Ok(rec)
    }

    /// Turns a temporary record into a stable one.
    pub fn make_stable(&self, id: &str) -> Result<Arc<ConfigurationRecord>, StoreError> {
        let mut rec = self.require(id)?.as_ref().clone();
        rec.temporary = false;
        Ok(self.add(rec))
    }

    /// Moves a record to another storage tier. Sharing a temporary record
    /// makes it stable first.
    pub fn share(&self, id: &str, storage: StorageTier) -> Result<Arc<ConfigurationRecord>, StoreError> {
        let current = self.require(id)?;
        if current.storage == storage {
            return Ok(current);
        }
        let mut rec = current.as_ref().clone();
        if storage.is_shared() {
            rec.temporary = false;
        }
        rec.storage = storage;
        Ok(self.add(rec))
    }

    /// Moves a temporary record to the front of the recency list.
    pub fn refresh_usage(&self, id: &str) {
        let mut inner = self.inner.write();
        if inner.records.get(id).is_some_and(|r| r.temporary) {
            inner.touch_recent(id, self.recents_limit);
        }
    }

    /// Replaces a record's explicit before-run tasks.
    ///
    /// Returns `Ok(false)` without changes for records of unmanaged types.
    pub fn set_before_run_tasks(&self, id: &str, tasks: Vec<BeforeRunTask>) -> Result<bool, StoreError> {
        {
            let mut inner = self.inner.write();
            let Some(current) = inner.records.get(id) else {
                return Err(StoreError::UnknownRecord { id: id.to_string() });
            };
            if !self.registry.is_managed(&current.type_id) {
                return Ok(false);
            }
            let mut updated = current.as_ref().clone();
            updated.before_run = Some(tasks);
            inner.records.insert(id.to_string(), Arc::new(updated));
            inner.invalidate();
        }
        self.bus
            .publish(Event::new(EventKind::BeforeRunTasksChanged).with_record(id));
        Ok(true)
    }

    /// Records the executor last used to launch `id`.
    pub fn set_recent_executor(&self, id: &str, executor_id: &str) {
        let mut inner = self.inner.write();
        if inner.records.contains_key(id) {
            inner
                .recent_executors
                .insert(id.to_string(), executor_id.to_string());
        }
    }

    /// Drops records: everything when `all`, otherwise all but shared stable
    /// ones. Templates, recency and the selection are dropped too.
    pub fn clear(&self, all: bool) {
        let mut events = Vec::new();
        {
            let mut inner = self.inner.write();
            let doomed: Vec<String> = inner
                .order
                .iter()
                .filter(|id| {
                    all || inner
                        .records
                        .get(*id)
                        .map_or(true, |r| r.temporary || !r.storage.is_shared())
                })
                .cloned()
                .collect();
            for id in doomed {
                if inner.forget(&id).is_some() {
                    events.push(Event::new(EventKind::RecordRemoved).with_record(id));
                }
            }
            inner.recents.clear();
            if inner.selected.take().is_some() {
                events.push(selection_event(None));
            }
            inner.invalidate();
        }
        self.registry.drop_cache();
        self.publish(events);
    }

    /// Replaces the collection with persisted state.
    ///
    /// Records of unregistered types are kept and resolve to the unknown
    /// type. When the persisted selection is missing, the first managed
    /// record is selected.
    pub fn load(&self, state: PersistedState) {
        let mut events = Vec::new();
        let first;
        {
            let mut inner = self.inner.write();
            first = !inner.loaded;
            for id in std::mem::take(&mut inner.order) {
                events.push(Event::new(EventKind::RecordRemoved).with_record(id));
            }
            let previous_selection = inner.selected.take();
            *inner = Inner {
                loaded: true,
                ..Inner::default()
            };

            self.registry.drop_cache();
            for template in state.templates {
                self.registry.put_template(template);
            }
            for rec in state.records {
                if rec.template {
                    self.registry.put_template(rec);
                    continue;
                }
                let id = rec.unique_id();
                if inner.records.insert(id.clone(), Arc::new(rec)).is_none() {
                    inner.order.push(id.clone());
                }
            }
            let handles: Vec<_> = inner
                .records
                .iter()
                .map(|(id, r)| (r.handle(), id.clone()))
                .collect();
            inner.handles.extend(handles);
            for id in &inner.order {
                events.push(Event::new(EventKind::RecordAdded).with_record(id.as_str()));
            }

            inner.custom_order = state.order;
            inner.order_dirty = true;
            let mut recents: Vec<String> = state
                .recent_temporaries
                .into_iter()
                .filter(|id| inner.records.get(id).is_some_and(|r| r.temporary))
                .collect();
            recents.truncate(self.recents_limit);
            inner.recents = recents;
            let executors: HashMap<String, String> = state
                .recent_executors
                .into_iter()
                .filter(|(id, _)| inner.records.contains_key(id))
                .collect();
            inner.recent_executors = executors;

            let selected = state.selected.filter(|id| inner.records.contains_key(id));
            inner.selected = selected;
            if inner.selected.is_none() {
                let view = inner.sorted_view(&self.registry);
                inner.selected = view
                    .iter()
                    .find(|r| self.registry.is_managed(&r.type_id))
                    .map(|r| r.unique_id());
            }
            if inner.selected != previous_selection {
                events.push(selection_event(inner.selected.as_deref()));
            }
        }
        tracing::debug!(first, "store state loaded");
        events.push(
            Event::new(EventKind::StateLoaded).with_reason(if first { "first" } else { "reload" }),
        );
        self.publish(events);
    }

    /// Snapshot of the persisted state (records in display order).
    pub fn state(&self) -> PersistedState {
        let sorted = self.sorted();
        let inner = self.inner.read();
        PersistedState {
            records: sorted.iter().map(|r| r.as_ref().clone()).collect(),
            templates: self
                .registry
                .edited_templates()
                .iter()
                .map(|t| t.as_ref().clone())
                .collect(),
            selected: inner.selected.clone(),
            order: sorted.iter().map(|r| r.unique_id()).collect(),
            recent_temporaries: inner.recents.clone(),
            recent_executors: inner
                .recent_executors
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        }
    }

    /// Loads state from `storage`.
    pub fn load_from(&self, storage: &dyn StateStorage) -> Result<(), StoreError> {
        let state = storage.load()?;
        self.load(state);
        Ok(())
    }

    /// Saves state to `storage`. Returns the number of files written.
    pub fn save_to(&self, storage: &dyn StateStorage) -> Result<usize, StoreError> {
        storage.save(&self.state())
    }

    /// Registers a configuration type.
    pub fn register_type(&self, ty: TypeRef) {
        self.registry.register_type(ty);
        self.inner.write().invalidate();
    }

    /// Unregisters a configuration type; its records become unknown-typed.
    pub fn unregister_type(&self, type_id: &str) -> bool {
        let removed = self.registry.unregister_type(type_id);
        if removed {
            tracing::debug!(type_id, "configuration type unregistered");
            self.inner.write().invalidate();
        }
        removed
    }

    // ---- queries ---------------------------------------------------------

    /// Records in display order.
    pub fn sorted(&self) -> SortedView {
        if let Some(view) = self.inner.read().sorted.as_ref() {
            return Arc::clone(view);
        }
        self.inner.write().sorted_view(&self.registry)
    }

    /// Record by unique id.
    pub fn get(&self, id: &str) -> Option<Arc<ConfigurationRecord>> {
        self.inner.read().records.get(id).cloned()
    }

    /// True if a record with `id` is stored.
    pub fn has(&self, id: &str) -> bool {
        self.inner.read().records.contains_key(id)
    }

    /// First record (in display order) named `name`.
    pub fn find_by_name(&self, name: &str) -> Option<Arc<ConfigurationRecord>> {
        self.sorted().iter().find(|r| r.name == name).cloned()
    }

    /// Selected record.
    pub fn selected(&self) -> Option<Arc<ConfigurationRecord>> {
        let inner = self.inner.read();
        inner
            .selected
            .as_ref()
            .and_then(|id| inner.records.get(id))
            .cloned()
    }

    /// Temporary records in display order.
    pub fn temporaries(&self) -> Vec<Arc<ConfigurationRecord>> {
        self.sorted().iter().filter(|r| r.temporary).cloned().collect()
    }

    /// Recency list of temporary records, most recent first.
    pub fn recent_temporaries(&self) -> Vec<String> {
        self.inner.read().recents.clone()
    }

    /// Executor id last used to launch `id`.
    pub fn recent_executor(&self, id: &str) -> Option<String> {
        self.inner.read().recent_executors.get(id).cloned()
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.inner.read().records.len()
    }

    /// True if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.inner.read().records.is_empty()
    }

    /// Records grouped by type, then folder. Unknown types are skipped
    /// unless `include_unknown`.
    pub fn grouped_by_type_and_folder(&self, include_unknown: bool) -> Vec<TypeGroup> {
        let mut records: Vec<_> = self.sorted().iter().cloned().collect();
        sort_records(&mut records, &self.registry, None, true);

        let mut groups: Vec<TypeGroup> = Vec::new();
        for rec in records {
            if !include_unknown && !self.registry.is_managed(&rec.type_id) {
                continue;
            }
            if groups.last().map_or(true, |g| g.type_id != rec.type_id) {
                groups.push(TypeGroup {
                    type_id: rec.type_id.clone(),
                    folders: Vec::new(),
                });
            }
            let Some(group) = groups.last_mut() else {
                continue;
            };
            match group.folders.last_mut() {
                Some(f) if f.folder == rec.folder => f.records.push(rec),
                _ => group.folders.push(FolderGroup {
                    folder: rec.folder.clone(),
                    records: vec![rec],
                }),
            }
        }
        groups
    }

    /// Before-run tasks a launch of `record` runs.
    pub fn before_run_tasks(&self, record: &ConfigurationRecord) -> Vec<BeforeRunTask> {
        self.registry.effective_before_run(record)
    }

    /// Enabled tasks of `provider_id` across all records. Records without
    /// explicit tasks contribute their template's tasks, once per template.
    pub fn tasks_for_provider(&self, provider_id: &str) -> Vec<BeforeRunTask> {
        let mut tasks = Vec::new();
        let mut seen: Vec<Arc<ConfigurationRecord>> = Vec::new();
        for rec in self.sorted().iter() {
            let source = match &rec.before_run {
                Some(own) => own.clone(),
                None => {
                    let template = self.registry.template_of(rec);
                    if seen.iter().any(|t| Arc::ptr_eq(t, &template)) {
                        continue;
                    }
                    let inherited = template.before_run.clone().unwrap_or_default();
                    seen.push(template);
                    inherited
                }
            };
            tasks.extend(
                source
                    .into_iter()
                    .filter(|t| t.enabled && t.provider_id == provider_id),
            );
        }
        tasks
    }

    fn require(&self, id: &str) -> Result<Arc<ConfigurationRecord>, StoreError> {
        self.get(id)
            .ok_or_else(|| StoreError::UnknownRecord { id: id.to_string() })
    }
}

fn selection_event(id: Option<&str>) -> Event {
    let ev = Event::new(EventKind::SelectionChanged);
    match id {
        Some(id) => ev.with_record(id),
        None => ev,
    }
}
