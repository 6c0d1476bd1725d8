// Pane registry - owns one TabRegistry per pane and routes file opens to the
// active pane so the rest of the app can stay pane-agnostic.

use serde::Serialize;

use crate::error::TabError;
use crate::modules::events::{EventBus, SubscriptionId};
use crate::modules::tabs::{Tab, TabId, TabIdAllocator, TabRegistry, DEFAULT_MAX_TABS};

pub const PRIMARY_PANE: &str = "main";
pub const SECONDARY_PANE: &str = "secondary";

pub type PaneId = String;

#[derive(Debug)]
pub struct Pane {
    pub id: PaneId,
    pub tabs: TabRegistry,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaneEvent {
    Split { pane_id: PaneId },
    Unsplit { discarded: Vec<TabId> },
    Activated { pane_id: PaneId },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum OpenOutcome {
    /// The file was already open; its pane and tab were activated.
    Existing { pane_id: PaneId, tab_id: TabId },
    /// A new tab was created in the active pane and activated.
    Created { pane_id: PaneId, tab_id: TabId },
}

impl OpenOutcome {
    pub fn tab_id(&self) -> &str {
        match self {
            Self::Existing { tab_id, .. } | Self::Created { tab_id, .. } => tab_id,
        }
    }

    pub fn pane_id(&self) -> &str {
        match self {
            Self::Existing { pane_id, .. } | Self::Created { pane_id, .. } => pane_id,
        }
    }
}

#[derive(Debug)]
pub struct PaneRegistry {
    panes: Vec<Pane>,
    active_pane_id: PaneId,
    max_tabs_per_pane: usize,
    ids: TabIdAllocator,
    events: EventBus<PaneEvent>,
}

impl Default for PaneRegistry {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_TABS)
    }
}

impl PaneRegistry {
    pub fn new(max_tabs_per_pane: usize) -> Self {
        let ids = TabIdAllocator::default();
        Self {
            panes: vec![Pane {
                id: PRIMARY_PANE.to_string(),
                tabs: TabRegistry::new(max_tabs_per_pane, ids.clone()),
            }],
            active_pane_id: PRIMARY_PANE.to_string(),
            max_tabs_per_pane,
            ids,
            events: EventBus::new(),
        }
    }

    pub fn subscribe<F>(&mut self, listener: F) -> SubscriptionId
    where
        F: FnMut(&PaneEvent) + Send + 'static,
    {
        self.events.subscribe(listener)
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) -> bool {
        self.events.unsubscribe(id)
    }

    pub fn is_split(&self) -> bool {
        self.panes.len() > 1
    }

    /// Adds an empty second pane and makes it active. No-op when already split.
    pub fn split(&mut self) -> &PaneId {
        if !self.is_split() {
            self.panes.push(Pane {
                id: SECONDARY_PANE.to_string(),
                tabs: TabRegistry::new(self.max_tabs_per_pane, self.ids.clone()),
            });
            log::info!("[Panes] Split view enabled");
            self.events.emit(&PaneEvent::Split {
                pane_id: SECONDARY_PANE.to_string(),
            });
            self.activate_pane(SECONDARY_PANE);
        }
        &self.active_pane_id
    }

    /// Drops every pane but the primary one along with their tabs. Callers
    /// resolve unsaved changes (see `dirty_tabs`) before calling this.
    pub fn unsplit(&mut self) -> Vec<TabId> {
        if !self.is_split() {
            return Vec::new();
        }

        let discarded: Vec<TabId> = self
            .panes
            .drain(1..)
            .flat_map(|pane| pane.tabs.order().to_vec())
            .collect();
        log::info!("[Panes] Split view closed, discarded {} tabs", discarded.len());

        self.events.emit(&PaneEvent::Unsplit {
            discarded: discarded.clone(),
        });
        self.activate_pane(PRIMARY_PANE);
        discarded
    }

    /// Returns false for an unknown pane.
    pub fn activate_pane(&mut self, pane_id: &str) -> bool {
        if !self.panes.iter().any(|p| p.id == pane_id) {
            return false;
        }
        if self.active_pane_id != pane_id {
            self.active_pane_id = pane_id.to_string();
            self.events.emit(&PaneEvent::Activated {
                pane_id: pane_id.to_string(),
            });
        }
        true
    }

    pub fn active_pane_id(&self) -> &str {
        &self.active_pane_id
    }

    pub fn panes(&self) -> &[Pane] {
        &self.panes
    }

    pub fn registry(&self, pane_id: &str) -> Option<&TabRegistry> {
        self.panes.iter().find(|p| p.id == pane_id).map(|p| &p.tabs)
    }

    pub fn registry_mut(&mut self, pane_id: &str) -> Option<&mut TabRegistry> {
        self.panes
            .iter_mut()
            .find(|p| p.id == pane_id)
            .map(|p| &mut p.tabs)
    }

    pub fn active_registry(&self) -> &TabRegistry {
        let idx = self.active_index();
        &self.panes[idx].tabs
    }

    pub fn active_registry_mut(&mut self) -> &mut TabRegistry {
        let idx = self.active_index();
        &mut self.panes[idx].tabs
    }

    /// First pane holding a tab for `file_path`.
    pub fn find_pane_by_file_path(&self, file_path: &str) -> Option<&Pane> {
        self.panes
            .iter()
            .find(|p| p.tabs.find_by_path(file_path).is_some())
    }

    /// Pane that owns `tab_id`.
    pub fn find_pane_by_tab(&self, tab_id: &str) -> Option<&Pane> {
        self.panes.iter().find(|p| p.tabs.get(tab_id).is_some())
    }

    pub fn active_tab(&self) -> Option<&Tab> {
        self.active_registry().active_tab()
    }

    /// Shows `file_path`: switches to it if any pane already has it open,
    /// otherwise opens it in a new tab of the active pane.
    pub fn open_file(
        &mut self,
        file_path: &str,
        content: impl Into<String>,
    ) -> Result<OpenOutcome, TabError> {
        if let Some(pane) = self.find_pane_by_file_path(file_path) {
            let pane_id = pane.id.clone();
            let tab_id = pane
                .tabs
                .find_by_path(file_path)
                .map(|t| t.id.clone())
                .unwrap_or_default();
            self.activate_pane(&pane_id);
            if let Some(reg) = self.registry_mut(&pane_id) {
                reg.activate(&tab_id)?;
            }
            log::debug!("[Panes] {} already open in {}", file_path, pane_id);
            return Ok(OpenOutcome::Existing { pane_id, tab_id });
        }

        let pane_id = self.active_pane_id.clone();
        let reg = self.active_registry_mut();
        let tab_id = reg.create(Some(file_path.to_string()), content)?;
        reg.activate(&tab_id)?;
        Ok(OpenOutcome::Created { pane_id, tab_id })
    }

    /// Dirty tabs across all panes as (pane, tab) pairs.
    pub fn dirty_tabs(&self) -> Vec<(PaneId, TabId)> {
        self.panes
            .iter()
            .flat_map(|p| {
                p.tabs
                    .tabs()
                    .into_iter()
                    .filter(|t| t.is_dirty)
                    .map(|t| (p.id.clone(), t.id.clone()))
                    .collect::<Vec<_>>()
            })
            .collect()
    }

    /// Applies a rename/move to every pane. Returns the number of tabs touched.
    pub fn update_paths(&mut self, old: &str, new: &str) -> usize {
        self.panes
            .iter_mut()
            .map(|p| p.tabs.update_paths(old, new))
            .sum()
    }

    fn active_index(&self) -> usize {
        // Primary pane is never removed, so index 0 is always a valid fallback.
        self.panes
            .iter()
            .position(|p| p.id == self.active_pane_id)
            .unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_starts_with_single_primary_pane() {
        let panes = PaneRegistry::default();
        assert!(!panes.is_split());
        assert_eq!(panes.active_pane_id(), PRIMARY_PANE);
        assert!(panes.active_registry().is_empty());
    }

    #[test]
    fn test_split_creates_empty_active_pane() {
        let mut panes = PaneRegistry::default();
        panes.open_file("a.md", "a").unwrap();

        assert_eq!(panes.split(), SECONDARY_PANE);
        assert!(panes.is_split());
        assert!(panes.active_registry().is_empty());

        // second split is a no-op
        panes.split();
        assert_eq!(panes.panes().len(), 2);
    }

    #[test]
    fn test_open_targets_active_pane_and_ids_stay_unique() {
        let mut panes = PaneRegistry::default();
        let first = panes.open_file("a.md", "a").unwrap();
        panes.split();
        let second = panes.open_file("b.md", "b").unwrap();

        assert_eq!(first.pane_id(), PRIMARY_PANE);
        assert_eq!(second.pane_id(), SECONDARY_PANE);
        assert_ne!(first.tab_id(), second.tab_id());
        assert_eq!(panes.find_pane_by_file_path("b.md").unwrap().id, SECONDARY_PANE);
    }

    #[test]
    fn test_reopening_file_activates_existing_tab() {
        let mut panes = PaneRegistry::default();
        let opened = panes.open_file("a.md", "a").unwrap();
        panes.split();

        let again = panes.open_file("a.md", "ignored").unwrap();

        assert_eq!(
            again,
            OpenOutcome::Existing {
                pane_id: PRIMARY_PANE.into(),
                tab_id: opened.tab_id().into()
            }
        );
        assert_eq!(panes.active_pane_id(), PRIMARY_PANE);
        assert_eq!(panes.registry(SECONDARY_PANE).unwrap().len(), 0);
        assert_eq!(panes.active_tab().unwrap().document.text(), "a");
    }

    #[test]
    fn test_open_reports_capacity() {
        let mut panes = PaneRegistry::new(2);
        panes.open_file("a.md", "").unwrap();
        panes.open_file("b.md", "").unwrap();

        assert_eq!(
            panes.open_file("c.md", ""),
            Err(TabError::CapacityExceeded { max: 2 })
        );
    }

    #[test]
    fn test_unsplit_discards_secondary_tabs() {
        let events = Arc::new(Mutex::new(Vec::new()));
        let mut panes = PaneRegistry::default();
        let sink = events.clone();
        panes.subscribe(move |e| sink.lock().unwrap().push(e.clone()));

        panes.open_file("a.md", "").unwrap();
        panes.split();
        let b = panes.open_file("b.md", "").unwrap();

        let discarded = panes.unsplit();

        assert_eq!(discarded, vec![b.tab_id().to_string()]);
        assert!(!panes.is_split());
        assert_eq!(panes.active_pane_id(), PRIMARY_PANE);
        assert!(panes.find_pane_by_file_path("b.md").is_none());
        assert!(events.lock().unwrap().contains(&PaneEvent::Unsplit {
            discarded: vec![b.tab_id().to_string()]
        }));
        assert!(panes.unsplit().is_empty());
    }

    #[test]
    fn test_activate_unknown_pane() {
        let mut panes = PaneRegistry::default();
        assert!(!panes.activate_pane("nope"));
        assert!(panes.activate_pane(PRIMARY_PANE));
    }

    #[test]
    fn test_dirty_tabs_across_panes() {
        let mut panes = PaneRegistry::default();
        let a = panes.open_file("a.md", "").unwrap();
        panes.split();
        let b = panes.open_file("b.md", "").unwrap();
        panes.registry_mut(PRIMARY_PANE).unwrap().edit(a.tab_id(), "x");
        panes.active_registry_mut().edit(b.tab_id(), "y");

        let dirty = panes.dirty_tabs();
        assert_eq!(dirty.len(), 2);
        assert!(dirty.contains(&(SECONDARY_PANE.to_string(), b.tab_id().to_string())));
    }
}
