// Tab registry - one per pane.
// Pure bookkeeping: owns the tabs, their display order and the active pointer,
// and broadcasts lifecycle events. Rendering and focus live in the UI layer.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::error::TabError;
use crate::modules::events::{EventBus, SubscriptionId};

pub const DEFAULT_MAX_TABS: usize = 5;
pub const UNTITLED: &str = "Untitled";

pub type TabId = String;

/// Hands out `tab-N` ids. Clones share the counter, so every pane of a
/// workspace draws from the same sequence and ids never collide.
#[derive(Debug, Clone)]
pub struct TabIdAllocator(Arc<AtomicU64>);

impl Default for TabIdAllocator {
    fn default() -> Self {
        Self(Arc::new(AtomicU64::new(1)))
    }
}

impl TabIdAllocator {
    pub fn next_id(&self) -> TabId {
        format!("tab-{}", self.0.fetch_add(1, Ordering::Relaxed))
    }
}

/// In-memory content of a tab. `revision` moves on every edit so a save can
/// tell whether the text it wrote is still current.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Document {
    text: String,
    revision: u64,
}

impl Document {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            revision: 0,
        }
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn revision(&self) -> u64 {
        self.revision
    }

    fn replace(&mut self, text: impl Into<String>) -> u64 {
        self.text = text.into();
        self.revision += 1;
        self.revision
    }
}

#[derive(Clone, Serialize, Debug)]
#[serde(rename_all = "camelCase")]
pub struct Tab {
    pub id: TabId,
    pub file_path: Option<String>,
    pub title: String,
    #[serde(skip)]
    pub document: Document,
    pub is_dirty: bool,
}

impl Tab {
    fn new(id: TabId, file_path: Option<String>, content: String) -> Self {
        let title = file_path
            .as_deref()
            .map(title_for_path)
            .unwrap_or_else(|| UNTITLED.to_string());
        Self {
            id,
            file_path,
            title,
            document: Document::new(content),
            is_dirty: false,
        }
    }
}

/// File name of a vault-relative path, used as the tab title.
pub fn title_for_path(path: &str) -> String {
    Path::new(path)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(path)
        .to_string()
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TabEvent {
    Created {
        tab_id: TabId,
    },
    Activated {
        tab_id: TabId,
        previous: Option<TabId>,
    },
    Closed {
        tab_id: TabId,
    },
    Reordered {
        tab_id: TabId,
        old_index: usize,
        new_index: usize,
    },
    /// The whole strip was rearranged at once.
    OrderChanged {
        order: Vec<TabId>,
    },
}

/// Asks the user whether to discard unsaved changes.
pub trait ConfirmPrompt {
    fn confirm(&self, message: &str) -> bool;
}

impl<F> ConfirmPrompt for F
where
    F: Fn(&str) -> bool,
{
    fn confirm(&self, message: &str) -> bool {
        self(message)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TabSnapshot {
    pub id: TabId,
    pub file_path: Option<String>,
    pub title: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TabsSnapshot {
    pub tabs: Vec<TabSnapshot>,
    pub active_tab_id: Option<TabId>,
}

#[derive(Debug)]
pub struct TabRegistry {
    tabs: HashMap<TabId, Tab>,
    order: Vec<TabId>,
    active_tab_id: Option<TabId>,
    max_tabs: usize,
    ids: TabIdAllocator,
    pending_focus: Option<TabId>,
    events: EventBus<TabEvent>,
}

impl Default for TabRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_TABS, TabIdAllocator::default())
    }
}

impl TabRegistry {
    pub fn new(max_tabs: usize, ids: TabIdAllocator) -> Self {
        Self {
            tabs: HashMap::new(),
            order: Vec::new(),
            active_tab_id: None,
            max_tabs,
            ids,
            pending_focus: None,
            events: EventBus::new(),
        }
    }

    pub fn subscribe<F>(&mut self, listener: F) -> SubscriptionId
    where
        F: FnMut(&TabEvent) + Send + 'static,
    {
        self.events.subscribe(listener)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.events.unsubscribe(id)
    }

    /// Creates a tab at the end of the strip. The new tab is not activated.
    pub fn create(
        &mut self,
        file_path: Option<String>,
        initial_content: impl Into<String>,
    ) -> Result<TabId, TabError> {
        if self.tabs.len() >= self.max_tabs {
            log::warn!("[Tabs] Refusing to open more than {} tabs", self.max_tabs);
            return Err(TabError::CapacityExceeded { max: self.max_tabs });
        }

        let id = self.ids.next_id();
        let tab = Tab::new(id.clone(), file_path, initial_content.into());
        log::debug!("[Tabs] Created {} ({})", id, tab.title);

        self.tabs.insert(id.clone(), tab);
        self.order.push(id.clone());
        self.events.emit(&TabEvent::Created { tab_id: id.clone() });
        Ok(id)
    }

    pub fn activate(&mut self, tab_id: &str) -> Result<(), TabError> {
        if !self.tabs.contains_key(tab_id) {
            return Err(TabError::NotFound(tab_id.to_string()));
        }

        let previous = self.active_tab_id.replace(tab_id.to_string());
        // Focus moves once the UI drains the request; activation doesn't wait for it.
        self.pending_focus = Some(tab_id.to_string());
        self.events.emit(&TabEvent::Activated {
            tab_id: tab_id.to_string(),
            previous,
        });
        Ok(())
    }

    /// Closes a tab, returning whether it was closed.
    ///
    /// A dirty tab backed by a file asks `prompt` first unless `force` is set;
    /// declining leaves everything untouched. When the active tab goes away the
    /// tab just before it (or the new first tab) becomes active.
    pub fn close(&mut self, tab_id: &str, force: bool, prompt: &dyn ConfirmPrompt) -> bool {
        let Some(tab) = self.tabs.get(tab_id) else {
            return false;
        };

        if !force && tab.is_dirty && tab.file_path.is_some() {
            let message = format!("\"{}\" has unsaved changes. Close anyway?", tab.title);
            if !prompt.confirm(&message) {
                log::info!("[Tabs] Close of {} cancelled", tab_id);
                return false;
            }
        }

        let old_index = self.index_of(tab_id).unwrap_or(0);
        // Dropping the tab releases its document.
        self.tabs.remove(tab_id);
        self.order.retain(|id| id != tab_id);
        if self.pending_focus.as_deref() == Some(tab_id) {
            self.pending_focus = None;
        }

        if self.active_tab_id.as_deref() == Some(tab_id) {
            if self.order.is_empty() {
                self.active_tab_id = None;
            } else {
                let next_index = old_index.saturating_sub(1).min(self.order.len() - 1);
                let next = self.order[next_index].clone();
                // Known id, cannot fail.
                let _ = self.activate(&next);
            }
        }

        log::debug!("[Tabs] Closed {}", tab_id);
        self.events.emit(&TabEvent::Closed {
            tab_id: tab_id.to_string(),
        });
        true
    }

    /// Moves a tab to `new_index`, clamped to the strip. Unknown ids are ignored.
    pub fn reorder(&mut self, tab_id: &str, new_index: usize) {
        let Some(old_index) = self.index_of(tab_id) else {
            return;
        };

        let id = self.order.remove(old_index);
        let new_index = new_index.min(self.order.len());
        self.order.insert(new_index, id);

        self.events.emit(&TabEvent::Reordered {
            tab_id: tab_id.to_string(),
            old_index,
            new_index,
        });
    }

    /// Rebuilds the strip from a full order sent by the tab bar after a drag.
    /// Returns true if the order changed.
    ///
    /// Unknown ids are skipped and tabs missing from `new_order` keep their
    /// relative order at the end, so a stale drop never loses a tab.
    pub fn apply_order(&mut self, new_order: &[TabId]) -> bool {
        if self.order.is_empty() || new_order.is_empty() {
            return false;
        }

        let mut reordered: Vec<TabId> = Vec::with_capacity(self.order.len());
        for id in new_order {
            if self.tabs.contains_key(id) && !reordered.contains(id) {
                reordered.push(id.clone());
            }
        }
        for id in &self.order {
            if !reordered.contains(id) {
                reordered.push(id.clone());
            }
        }

        if reordered == self.order {
            return false;
        }
        self.order = reordered;
        self.events.emit(&TabEvent::OrderChanged {
            order: self.order.clone(),
        });
        true
    }

    pub fn set_dirty(&mut self, tab_id: &str, is_dirty: bool) {
        if let Some(tab) = self.tabs.get_mut(tab_id) {
            tab.is_dirty = is_dirty;
        }
    }

    pub fn set_title(&mut self, tab_id: &str, title: impl Into<String>) {
        if let Some(tab) = self.tabs.get_mut(tab_id) {
            tab.title = title.into();
        }
    }

    /// Replaces a tab's text from an editor change and marks it dirty.
    /// Returns the new revision.
    pub fn edit(&mut self, tab_id: &str, text: impl Into<String>) -> Option<u64> {
        let tab = self.tabs.get_mut(tab_id)?;
        tab.is_dirty = true;
        Some(tab.document.replace(text))
    }

    /// Clears the dirty flag only if nothing was typed since `revision` was read.
    pub fn mark_saved(&mut self, tab_id: &str, revision: u64) -> bool {
        match self.tabs.get_mut(tab_id) {
            Some(tab) if tab.document.revision() == revision => {
                tab.is_dirty = false;
                true
            }
            _ => false,
        }
    }

    /// Points an existing tab at another file, replacing its content.
    /// Refused when another tab of this pane already shows `file_path`.
    pub fn retarget(&mut self, tab_id: &str, file_path: &str, content: impl Into<String>) -> bool {
        if self
            .find_by_path(file_path)
            .is_some_and(|t| t.id != tab_id)
        {
            return false;
        }
        let Some(tab) = self.tabs.get_mut(tab_id) else {
            return false;
        };
        tab.file_path = Some(file_path.to_string());
        tab.title = title_for_path(file_path);
        tab.document = Document::new(content);
        tab.is_dirty = false;
        true
    }

    /// Follows a rename or move on disk. `old` may be a folder, in which case
    /// every tab below it is updated. Returns the number of tabs touched.
    pub fn update_paths(&mut self, old: &str, new: &str) -> usize {
        let folder_prefix = format!("{}/", old.trim_end_matches('/'));
        let mut touched = 0;
        for tab in self.tabs.values_mut() {
            let Some(path) = tab.file_path.as_deref() else {
                continue;
            };
            let updated = if path == old {
                new.to_string()
            } else if let Some(rest) = path.strip_prefix(&folder_prefix) {
                format!("{}/{}", new.trim_end_matches('/'), rest)
            } else {
                continue;
            };
            tab.title = title_for_path(&updated);
            tab.file_path = Some(updated);
            touched += 1;
        }
        touched
    }

    pub fn find_by_path(&self, file_path: &str) -> Option<&Tab> {
        self.tabs
            .values()
            .find(|t| t.file_path.as_deref() == Some(file_path))
    }

    pub fn get(&self, tab_id: &str) -> Option<&Tab> {
        self.tabs.get(tab_id)
    }

    pub fn active_tab(&self) -> Option<&Tab> {
        self.active_tab_id.as_deref().and_then(|id| self.tabs.get(id))
    }

    pub fn active_tab_id(&self) -> Option<&str> {
        self.active_tab_id.as_deref()
    }

    /// Tabs in display order.
    pub fn tabs(&self) -> Vec<&Tab> {
        self.order.iter().filter_map(|id| self.tabs.get(id)).collect()
    }

    pub fn order(&self) -> &[TabId] {
        &self.order
    }

    pub fn index_of(&self, tab_id: &str) -> Option<usize> {
        self.order.iter().position(|id| id == tab_id)
    }

    pub fn len(&self) -> usize {
        self.tabs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tabs.is_empty()
    }

    pub fn max_tabs(&self) -> usize {
        self.max_tabs
    }

    pub fn is_full(&self) -> bool {
        self.tabs.len() >= self.max_tabs
    }

    /// The tab waiting for input focus, if any. Taking it clears the request.
    pub fn take_focus_request(&mut self) -> Option<TabId> {
        self.pending_focus.take()
    }

    /// Order list is a duplicate-free permutation of the owned tabs and the
    /// active pointer, if any, names one of them.
    pub fn is_consistent(&self) -> bool {
        let mut seen = std::collections::HashSet::new();
        let order_ok = self.order.len() == self.tabs.len()
            && self
                .order
                .iter()
                .all(|id| self.tabs.contains_key(id) && seen.insert(id));
        let active_ok = self
            .active_tab_id
            .as_ref()
            .map_or(true, |id| self.tabs.contains_key(id));
        order_ok && active_ok
    }

    pub fn snapshot(&self) -> TabsSnapshot {
        TabsSnapshot {
            tabs: self
                .tabs()
                .into_iter()
                .map(|t| TabSnapshot {
                    id: t.id.clone(),
                    file_path: t.file_path.clone(),
                    title: t.title.clone(),
                })
                .collect(),
            active_tab_id: self.active_tab_id.clone(),
        }
    }

    /// Reopens the file-backed tabs of a snapshot. Fresh ids are issued, files
    /// that `load` cannot read are skipped, and restoring stops at capacity.
    /// The tab matching the saved active id is activated, else the first one.
    pub fn restore<F>(&mut self, snapshot: &TabsSnapshot, mut load: F) -> Vec<TabId>
    where
        F: FnMut(&str) -> Option<String>,
    {
        let mut restored = Vec::new();
        let mut active = None;

        for saved in &snapshot.tabs {
            let Some(path) = saved.file_path.as_deref() else {
                continue;
            };
            if self.find_by_path(path).is_some() {
                continue;
            }
            let Some(content) = load(path) else {
                log::warn!("[Tabs] Skipping {} on restore, file unreadable", path);
                continue;
            };
            match self.create(Some(path.to_string()), content) {
                Ok(id) => {
                    if snapshot.active_tab_id.as_deref() == Some(saved.id.as_str()) {
                        active = Some(id.clone());
                    }
                    restored.push(id);
                }
                Err(_) => break,
            }
        }

        if let Some(id) = active.or_else(|| restored.first().cloned()) {
            let _ = self.activate(&id);
        }
        restored
    }
}
