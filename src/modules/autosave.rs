// Debounced autosave and the per-tab in-flight save guard.
//
// Edits register a timestamp per tab; once a tab has been quiet for the delay
// it is handed back by `flush_ready` and the caller saves it. `SaveTracker`
// refuses to start a second write of the same tab while one is running.

use dashmap::DashSet;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Notify;

use crate::modules::tabs::TabId;

pub const DEFAULT_AUTOSAVE_MS: u64 = 1000;

#[derive(Debug)]
pub struct AutosaveDebouncer {
    pending: HashMap<TabId, Instant>,
    delay: Duration,
}

impl Default for AutosaveDebouncer {
    fn default() -> Self {
        Self::new(DEFAULT_AUTOSAVE_MS)
    }
}

impl AutosaveDebouncer {
    pub fn new(delay_ms: u64) -> Self {
        Self {
            pending: HashMap::new(),
            delay: Duration::from_millis(delay_ms),
        }
    }

    /// Records an edit. A tab already pending has its window restarted.
    pub fn register(&mut self, tab_id: &str, now: Instant) {
        self.pending.insert(tab_id.to_string(), now);
    }

    pub fn cancel(&mut self, tab_id: &str) {
        self.pending.remove(tab_id);
    }

    /// Tabs whose last edit is at least `delay` old, removed from the pending set.
    pub fn flush_ready(&mut self, now: Instant) -> Vec<TabId> {
        let delay = self.delay;
        let mut ready: Vec<TabId> = self
            .pending
            .iter()
            .filter(|(_, at)| now.saturating_duration_since(**at) >= delay)
            .map(|(id, _)| id.clone())
            .collect();
        for id in &ready {
            self.pending.remove(id);
        }
        ready.sort();
        ready
    }

    /// Time until the next tab becomes ready, for scheduling the next check.
    pub fn next_deadline(&self, now: Instant) -> Option<Duration> {
        self.pending
            .values()
            .map(|at| match at.checked_add(self.delay) {
                Some(deadline) => deadline.saturating_duration_since(now),
                None => Duration::MAX,
            })
            .min()
    }

    pub fn has_pending(&self) -> bool {
        !self.pending.is_empty()
    }
}

/// Tabs with a write in progress.
#[derive(Debug, Clone, Default)]
pub struct SaveTracker {
    in_flight: Arc<DashSet<TabId>>,
    released: Arc<Notify>,
}

impl SaveTracker {
    /// Claims the tab for saving. `None` means another save is still running.
    pub fn begin(&self, tab_id: &str) -> Option<SaveTicket> {
        if self.in_flight.insert(tab_id.to_string()) {
            Some(SaveTicket {
                tab_id: tab_id.to_string(),
                in_flight: self.in_flight.clone(),
                released: self.released.clone(),
            })
        } else {
            log::debug!("[Autosave] Save of {} already in flight", tab_id);
            None
        }
    }

    pub fn is_saving(&self, tab_id: &str) -> bool {
        self.in_flight.contains(tab_id)
    }

    /// Resolves once no save of `tab_id` is running.
    pub async fn wait_idle(&self, tab_id: &str) {
        loop {
            let notified = self.released.notified();
            tokio::pin!(notified);
            // Register before checking so a release in between is not missed.
            notified.as_mut().enable();
            if !self.in_flight.contains(tab_id) {
                return;
            }
            notified.await;
        }
    }
}

/// Releases the tab when dropped, including on error paths.
#[derive(Debug)]
pub struct SaveTicket {
    tab_id: TabId,
    in_flight: Arc<DashSet<TabId>>,
    released: Arc<Notify>,
}

impl SaveTicket {
    pub fn tab_id(&self) -> &str {
        &self.tab_id
    }
}

impl Drop for SaveTicket {
    fn drop(&mut self) {
        self.in_flight.remove(&self.tab_id);
        self.released.notify_waiters();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flush_waits_for_quiet_period() {
        let mut debouncer = AutosaveDebouncer::new(500);
        let t0 = Instant::now();
        debouncer.register("tab-1", t0);

        assert!(debouncer.flush_ready(t0 + Duration::from_millis(499)).is_empty());
        assert_eq!(debouncer.flush_ready(t0 + Duration::from_millis(500)), vec!["tab-1"]);
        assert!(!debouncer.has_pending());
    }

    #[test]
    fn test_new_edit_restarts_window() {
        let mut debouncer = AutosaveDebouncer::new(500);
        let t0 = Instant::now();
        debouncer.register("tab-1", t0);
        debouncer.register("tab-1", t0 + Duration::from_millis(400));

        assert!(debouncer.flush_ready(t0 + Duration::from_millis(600)).is_empty());
        assert_eq!(
            debouncer.next_deadline(t0 + Duration::from_millis(600)),
            Some(Duration::from_millis(300))
        );
        assert_eq!(debouncer.flush_ready(t0 + Duration::from_millis(900)).len(), 1);
    }

    #[test]
    fn test_cancel_drops_pending_tab() {
        let mut debouncer = AutosaveDebouncer::default();
        let t0 = Instant::now();
        debouncer.register("tab-1", t0);
        debouncer.register("tab-2", t0);
        debouncer.cancel("tab-1");

        assert_eq!(debouncer.flush_ready(t0 + Duration::from_secs(5)), vec!["tab-2"]);
    }

    #[test]
    fn test_tracker_rejects_second_save_until_ticket_dropped() {
        let tracker = SaveTracker::default();
        let ticket = tracker.begin("tab-1").expect("first save starts");

        assert!(tracker.begin("tab-1").is_none());
        assert!(tracker.begin("tab-2").is_some());
        assert!(tracker.is_saving("tab-1"));

        drop(ticket);
        assert!(!tracker.is_saving("tab-1"));
        assert!(tracker.begin("tab-1").is_some());
    }

    #[test]
    fn test_huge_delay_does_not_overflow() {
        let mut debouncer = AutosaveDebouncer::new(u64::MAX);
        let t0 = Instant::now();
        debouncer.register("tab-1", t0);

        assert_eq!(debouncer.next_deadline(t0), Some(Duration::MAX));
        assert!(debouncer.flush_ready(t0 + Duration::from_secs(60)).is_empty());
    }

    #[tokio::test]
    async fn test_wait_idle_resolves_when_ticket_dropped() {
        let tracker = SaveTracker::default();
        tracker.wait_idle("tab-1").await;

        let ticket = tracker.begin("tab-1").unwrap();
        let release = async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            drop(ticket);
        };
        tokio::join!(tracker.wait_idle("tab-1"), release);
        assert!(!tracker.is_saving("tab-1"));
    }
}
