// Shared application context handed to every command.
// Replaces ambient globals: the UI layer owns one AppState and passes it down.

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, RwLock};

use crate::modules::autosave::{AutosaveDebouncer, SaveTracker};
use crate::modules::conversation::Conversation;
use crate::modules::panes::PaneRegistry;
use crate::settings::{load_chat_history, Preferences};
use crate::vault::Vault;

pub struct AppState {
    pub config_dir: PathBuf,
    pub preferences: Arc<RwLock<Preferences>>,
    /// Held across file I/O, hence the async lock.
    pub vault: Arc<tokio::sync::RwLock<Option<Vault>>>,
    /// Never held across an `.await`.
    pub workspace: Arc<Mutex<PaneRegistry>>,
    pub autosave: Arc<Mutex<AutosaveDebouncer>>,
    pub saves: SaveTracker,
    pub conversation: Arc<Mutex<Conversation>>,
    /// Notes attached to the last chat request as (title, is_active_note).
    pub attached_notes: Arc<Mutex<Vec<(String, bool)>>>,
}

impl AppState {
    /// Loads preferences and the last chat from `config_dir` and sizes the
    /// workspace from the preferences.
    pub fn new(config_dir: impl AsRef<Path>) -> Self {
        let config_dir = config_dir.as_ref().to_path_buf();
        let preferences = Preferences::load(&config_dir);
        log::info!("[State] Using config dir {:?}", config_dir);

        Self {
            workspace: Arc::new(Mutex::new(PaneRegistry::new(preferences.max_tabs_per_pane))),
            autosave: Arc::new(Mutex::new(AutosaveDebouncer::new(preferences.autosave_delay_ms))),
            preferences: Arc::new(RwLock::new(preferences)),
            vault: Arc::new(tokio::sync::RwLock::new(None)),
            saves: SaveTracker::default(),
            conversation: Arc::new(Mutex::new(load_chat_history(&config_dir))),
            attached_notes: Arc::new(Mutex::new(Vec::new())),
            config_dir,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_workspace_sized_from_preferences() {
        let dir = tempdir().unwrap();
        let prefs = Preferences {
            max_tabs_per_pane: 2,
            ..Preferences::default()
        };
        prefs.save(dir.path()).unwrap();

        let state = AppState::new(dir.path());
        let mut workspace = state.workspace.lock().unwrap();
        workspace.open_file("a.md", "").unwrap();
        workspace.open_file("b.md", "").unwrap();
        assert!(workspace.open_file("c.md", "").is_err());
    }
}
