// Host-facing commands over the shared AppState.
// Errors cross the boundary as strings, ready for a UI bridge to forward.

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard, RwLockReadGuard};
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::ai_client::{ChatProvider, OpenAiCompatClient};
use crate::error::{ChatError, TabError, VaultError};
use crate::modules::autosave::AutosaveDebouncer;
use crate::modules::chat_context::{
    assemble_messages, cap_chars, truncate_context, ContextNote, MAX_NOTE_CHARS,
};
use crate::modules::conversation::ChatTurn;
use crate::modules::file_tree::{sort_tree, FileEntry, SortOption};
use crate::modules::panes::{OpenOutcome, PaneRegistry, PRIMARY_PANE};
use crate::modules::tabs::{title_for_path, ConfirmPrompt, TabId, TabRegistry};
use crate::settings::{save_chat_history, AiSettings, Preferences};
use crate::state::AppState;
use crate::vault::{is_image_path, NoteSearchResult, Vault, VaultInfo};

pub type CommandResult<T> = Result<T, String>;

const SAVE_WAIT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum SaveOutcome {
    /// Written to disk. `clean` is false when the tab was edited mid-save.
    Saved { clean: bool },
    AlreadyInFlight,
    NothingToSave,
}

fn lock<T>(mutex: &Mutex<T>) -> CommandResult<MutexGuard<'_, T>> {
    mutex.lock().map_err(|e| e.to_string())
}

fn read_prefs(state: &AppState) -> CommandResult<RwLockReadGuard<'_, Preferences>> {
    state.preferences.read().map_err(|e| e.to_string())
}

fn update_prefs(state: &AppState, apply: impl FnOnce(&mut Preferences)) -> CommandResult<()> {
    let mut prefs = state.preferences.write().map_err(|e| e.to_string())?;
    apply(&mut prefs);
    prefs.save(&state.config_dir).map_err(|e| e.to_string())
}

fn opened(vault: &Option<Vault>) -> CommandResult<&Vault> {
    vault.as_ref().ok_or_else(|| VaultError::NoVaultOpen.to_string())
}

fn tab_registry_mut<'a>(ws: &'a mut PaneRegistry, tab_id: &str) -> CommandResult<&'a mut TabRegistry> {
    let pane_id = ws
        .find_pane_by_tab(tab_id)
        .map(|p| p.id.clone())
        .ok_or_else(|| TabError::NotFound(tab_id.to_string()).to_string())?;
    ws.registry_mut(&pane_id)
        .ok_or_else(|| TabError::NotFound(tab_id.to_string()).to_string())
}

fn persist_chat(state: &AppState) {
    let saved = lock(&state.conversation)
        .and_then(|convo| save_chat_history(&state.config_dir, &convo).map_err(|e| e.to_string()));
    if let Err(e) = saved {
        log::warn!("[Chat] Failed to save chat history: {}", e);
    }
}

fn discard(_: &str) -> bool {
    true
}

// --- Vault ---

pub async fn open_vault(state: &AppState, path: &str) -> CommandResult<VaultInfo> {
    let vault = Vault::open(path).await.map_err(|e| e.to_string())?;
    install_vault(state, vault).await
}

pub async fn create_vault(state: &AppState, path: &str) -> CommandResult<VaultInfo> {
    let vault = Vault::create(path).await.map_err(|e| e.to_string())?;
    install_vault(state, vault).await
}

pub async fn create_named_vault(state: &AppState, parent: &str, name: &str) -> CommandResult<VaultInfo> {
    let vault = Vault::create_named(parent, name)
        .await
        .map_err(|e| e.to_string())?;
    install_vault(state, vault).await
}

/// Swaps in `vault`: pending edits of the previous vault are saved first, then
/// every tab is closed and the split collapsed.
async fn install_vault(state: &AppState, vault: Vault) -> CommandResult<VaultInfo> {
    if state.vault.read().await.is_some() {
        save_all(state).await?;
    }

    let info = vault.info();
    let root = vault.root().to_path_buf();
    *state.vault.write().await = Some(vault);

    let delay = read_prefs(state)?.autosave_delay_ms;
    {
        let mut ws = lock(&state.workspace)?;
        ws.unsplit();
        let tabs = ws.active_registry_mut();
        for id in tabs.order().to_vec() {
            tabs.close(&id, true, &discard);
        }
    }
    *lock(&state.autosave)? = AutosaveDebouncer::new(delay);
    lock(&state.attached_notes)?.clear();

    update_prefs(state, |p| p.last_vault = Some(root))?;
    Ok(info)
}

pub async fn vault_info(state: &AppState) -> Option<VaultInfo> {
    state.vault.read().await.as_ref().map(Vault::info)
}

/// The remembered vault folder, if it still exists.
pub fn last_vault(state: &AppState) -> CommandResult<Option<PathBuf>> {
    let mut prefs = state.preferences.write().map_err(|e| e.to_string())?;
    let before = prefs.last_vault.clone();
    let valid = prefs.valid_last_vault();
    if valid != before {
        prefs.save(&state.config_dir).map_err(|e| e.to_string())?;
    }
    Ok(valid)
}

pub fn remember_vault(state: &AppState, path: &str) -> CommandResult<()> {
    update_prefs(state, |p| p.last_vault = Some(PathBuf::from(path)))
}

pub async fn file_tree(state: &AppState) -> CommandResult<Vec<FileEntry>> {
    let entries = {
        let guard = state.vault.read().await;
        opened(&guard)?.file_tree().await.map_err(|e| e.to_string())?
    };
    let sort = read_prefs(state)?.sort_option;
    Ok(sort_tree(entries, sort))
}

pub fn set_sort_option(state: &AppState, sort: SortOption) -> CommandResult<()> {
    update_prefs(state, |p| p.sort_option = sort)
}

pub async fn search_notes(state: &AppState, term: &str) -> CommandResult<Vec<NoteSearchResult>> {
    let guard = state.vault.read().await;
    opened(&guard)?
        .search_notes(term)
        .await
        .map_err(|e| e.to_string())
}

/// Creates a note and opens it. Returns its relative path.
pub async fn create_note(state: &AppState, name: &str) -> CommandResult<String> {
    let relative = {
        let guard = state.vault.read().await;
        opened(&guard)?
            .create_note(name)
            .await
            .map_err(|e| e.to_string())?
    };
    open_file(state, &relative).await?;
    Ok(relative)
}

pub async fn create_folder(state: &AppState, path: &str) -> CommandResult<()> {
    let guard = state.vault.read().await;
    opened(&guard)?
        .create_folder(path)
        .await
        .map_err(|e| e.to_string())
}

/// Deletes a note and closes every tab showing it, unsaved or not.
pub async fn delete_entry(state: &AppState, path: &str) -> CommandResult<()> {
    {
        let guard = state.vault.read().await;
        opened(&guard)?
            .delete_file(path)
            .await
            .map_err(|e| e.to_string())?;
    }

    let closed: Vec<TabId> = {
        let mut ws = lock(&state.workspace)?;
        let ids: Vec<TabId> = ws
            .panes()
            .iter()
            .filter_map(|p| p.tabs.find_by_path(path).map(|t| t.id.clone()))
            .collect();
        for id in &ids {
            if let Ok(tabs) = tab_registry_mut(&mut ws, id) {
                tabs.close(id, true, &discard);
            }
        }
        ids
    };

    let mut autosave = lock(&state.autosave)?;
    for id in &closed {
        autosave.cancel(id);
    }
    Ok(())
}

/// Renames a file or folder. Returns how many open tabs followed it.
pub async fn rename_entry(state: &AppState, old_path: &str, new_path: &str) -> CommandResult<usize> {
    {
        let guard = state.vault.read().await;
        opened(&guard)?
            .rename(old_path, new_path)
            .await
            .map_err(|e| e.to_string())?;
    }
    let touched = lock(&state.workspace)?.update_paths(old_path, new_path);
    Ok(touched)
}

/// Moves an entry into `folder` ("" for the vault root). Returns the new path.
pub async fn move_entry(state: &AppState, path: &str, folder: &str) -> CommandResult<String> {
    let target = {
        let guard = state.vault.read().await;
        opened(&guard)?
            .move_into(path, folder)
            .await
            .map_err(|e| e.to_string())?
    };
    lock(&state.workspace)?.update_paths(path, &target);
    Ok(target)
}

/// Stores a pasted base64 image in the vault. Returns its relative path.
pub async fn save_pasted_image(state: &AppState, base64_data: &str, extension: &str) -> CommandResult<String> {
    let guard = state.vault.read().await;
    opened(&guard)?
        .save_pasted_image(base64_data, extension)
        .await
        .map_err(|e| e.to_string())
}

pub async fn read_image_data_url(state: &AppState, path: &str) -> CommandResult<String> {
    let guard = state.vault.read().await;
    opened(&guard)?
        .read_image_data_url(path)
        .await
        .map_err(|e| e.to_string())
}

// --- Tabs & panes ---

/// Shows a vault file, reusing whichever pane already has it open.
pub async fn open_file(state: &AppState, path: &str) -> CommandResult<OpenOutcome> {
    {
        let mut ws = lock(&state.workspace)?;
        if ws.find_pane_by_file_path(path).is_some() {
            return ws.open_file(path, String::new()).map_err(|e| e.to_string());
        }
    }

    let content = if is_image_path(path) {
        let name = title_for_path(path);
        format!("# {}\n\n![[{}]]", name, name)
    } else {
        let guard = state.vault.read().await;
        opened(&guard)?
            .read_file(path)
            .await
            .map_err(|e| e.to_string())?
    };

    let outcome = lock(&state.workspace)?
        .open_file(path, content)
        .map_err(|e| e.to_string())?;
    log::info!("[Tabs] Opened {} in {}", path, outcome.pane_id());
    Ok(outcome)
}

/// Opens an empty, unsaved tab in the active pane.
pub fn new_tab(state: &AppState) -> CommandResult<TabId> {
    let mut ws = lock(&state.workspace)?;
    let tabs = ws.active_registry_mut();
    let id = tabs.create(None, "").map_err(|e| e.to_string())?;
    tabs.activate(&id).map_err(|e| e.to_string())?;
    Ok(id)
}

pub fn activate_tab(state: &AppState, tab_id: &str) -> CommandResult<()> {
    let mut ws = lock(&state.workspace)?;
    let pane_id = ws
        .find_pane_by_tab(tab_id)
        .map(|p| p.id.clone())
        .ok_or_else(|| TabError::NotFound(tab_id.to_string()).to_string())?;
    ws.activate_pane(&pane_id);
    tab_registry_mut(&mut ws, tab_id)?
        .activate(tab_id)
        .map_err(|e| e.to_string())
}

pub fn reorder_tabs(state: &AppState, pane_id: &str, order: Vec<TabId>) -> CommandResult<()> {
    let mut ws = lock(&state.workspace)?;
    let tabs = ws
        .registry_mut(pane_id)
        .ok_or_else(|| format!("Pane {} not found", pane_id))?;
    if !tabs.apply_order(&order) {
        log::debug!("[Tabs] Order of {} unchanged", pane_id);
    }
    Ok(())
}

/// Tab the UI should move keyboard focus to, if activation asked for one.
pub fn focus_request(state: &AppState) -> CommandResult<Option<TabId>> {
    Ok(lock(&state.workspace)?
        .active_registry_mut()
        .take_focus_request())
}

/// Records an editor change. File-backed tabs are queued for autosave.
/// Returns the tab's new revision.
pub fn edit_tab(state: &AppState, tab_id: &str, text: &str) -> CommandResult<u64> {
    let (revision, file_backed) = {
        let mut ws = lock(&state.workspace)?;
        let tabs = tab_registry_mut(&mut ws, tab_id)?;
        let revision = tabs
            .edit(tab_id, text)
            .ok_or_else(|| TabError::NotFound(tab_id.to_string()).to_string())?;
        (revision, tabs.get(tab_id).is_some_and(|t| t.file_path.is_some()))
    };
    if file_backed {
        lock(&state.autosave)?.register(tab_id, Instant::now());
    }
    Ok(revision)
}

/// Writes a dirty tab to its file. Only one save per tab runs at a time, and
/// the dirty flag is cleared only if no edit landed while writing.
pub async fn save_tab(state: &AppState, tab_id: &str) -> CommandResult<SaveOutcome> {
    let (path, text, revision) = {
        let ws = lock(&state.workspace)?;
        let tab = ws
            .find_pane_by_tab(tab_id)
            .and_then(|p| p.tabs.get(tab_id))
            .ok_or_else(|| TabError::NotFound(tab_id.to_string()).to_string())?;
        match (&tab.file_path, tab.is_dirty) {
            (Some(path), true) => (
                path.clone(),
                tab.document.text().to_string(),
                tab.document.revision(),
            ),
            _ => return Ok(SaveOutcome::NothingToSave),
        }
    };

    let Some(_ticket) = state.saves.begin(tab_id) else {
        return Ok(SaveOutcome::AlreadyInFlight);
    };

    {
        let guard = state.vault.read().await;
        opened(&guard)?
            .write_file(&path, &text)
            .await
            .map_err(|e| e.to_string())?;
    }

    let clean = match tab_registry_mut(&mut *lock(&state.workspace)?, tab_id) {
        Ok(tabs) => tabs.mark_saved(tab_id, revision),
        Err(_) => false,
    };
    log::debug!("[Autosave] Saved {} (revision {}, clean: {})", path, revision, clean);
    Ok(SaveOutcome::Saved { clean })
}

/// Saves every tab whose autosave window has elapsed. Returns the saved tabs.
pub async fn save_due_tabs(state: &AppState, now: Instant) -> CommandResult<Vec<TabId>> {
    let due = lock(&state.autosave)?.flush_ready(now);
    let mut saved = Vec::new();
    for tab_id in due {
        match save_tab(state, &tab_id).await {
            Ok(SaveOutcome::Saved { .. }) => saved.push(tab_id),
            Ok(SaveOutcome::AlreadyInFlight) => lock(&state.autosave)?.register(&tab_id, now),
            Ok(SaveOutcome::NothingToSave) => {}
            Err(e) => log::error!("[Autosave] Failed to save {}: {}", tab_id, e),
        }
    }
    Ok(saved)
}

/// Saves every dirty file-backed tab in every pane. A save already running
/// for a tab is waited out and the tab written again, so no edit is left
/// behind. Returns how many tabs were written.
pub async fn save_all(state: &AppState) -> CommandResult<usize> {
    let dirty = lock(&state.workspace)?.dirty_tabs();
    let mut written = 0;
    for (_, tab_id) in dirty {
        let mut saved = false;
        loop {
            match save_tab(state, &tab_id).await? {
                SaveOutcome::Saved { clean } => {
                    saved = true;
                    if clean {
                        break;
                    }
                }
                SaveOutcome::AlreadyInFlight => {
                    tokio::time::timeout(SAVE_WAIT, state.saves.wait_idle(&tab_id))
                        .await
                        .map_err(|_| format!("Save of {} did not finish", tab_id))?;
                }
                SaveOutcome::NothingToSave => break,
            }
        }
        if saved {
            lock(&state.autosave)?.cancel(&tab_id);
            written += 1;
        }
    }
    Ok(written)
}

/// Closes a tab, asking `prompt` before discarding unsaved changes unless `force`.
pub fn close_tab(
    state: &AppState,
    tab_id: &str,
    force: bool,
    prompt: &dyn ConfirmPrompt,
) -> CommandResult<bool> {
    let closed = {
        let mut ws = lock(&state.workspace)?;
        tab_registry_mut(&mut ws, tab_id)?.close(tab_id, force, prompt)
    };
    if closed {
        lock(&state.autosave)?.cancel(tab_id);
    }
    Ok(closed)
}

/// Opens or closes the second pane. Returns whether the view is split afterwards.
pub fn toggle_split(state: &AppState, prompt: &dyn ConfirmPrompt) -> CommandResult<bool> {
    let discarded = {
        let mut ws = lock(&state.workspace)?;
        if !ws.is_split() {
            ws.split();
            return Ok(true);
        }

        let unsaved = ws
            .dirty_tabs()
            .into_iter()
            .filter(|(pane_id, _)| pane_id != PRIMARY_PANE)
            .count();
        if unsaved > 0 {
            let message = format!(
                "The split pane has {} tab(s) with unsaved changes. Close it anyway?",
                unsaved
            );
            if !prompt.confirm(&message) {
                return Ok(true);
            }
        }
        ws.unsplit()
    };

    let mut autosave = lock(&state.autosave)?;
    for id in &discarded {
        autosave.cancel(id);
    }
    Ok(false)
}

pub fn focus_pane(state: &AppState, pane_id: &str) -> CommandResult<()> {
    if lock(&state.workspace)?.activate_pane(pane_id) {
        Ok(())
    } else {
        Err(format!("Pane {} not found", pane_id))
    }
}

/// Remembers the primary pane's tabs for the next launch.
pub fn remember_session(state: &AppState) -> CommandResult<()> {
    let snapshot = lock(&state.workspace)?
        .registry(PRIMARY_PANE)
        .map(TabRegistry::snapshot);
    update_prefs(state, |p| p.session = snapshot)
}

/// Reopens the remembered tabs from the current vault.
pub async fn restore_session(state: &AppState) -> CommandResult<Vec<TabId>> {
    let snapshot = read_prefs(state)?.session.clone();
    let Some(snapshot) = snapshot else {
        return Ok(Vec::new());
    };

    let mut contents = HashMap::new();
    {
        let guard = state.vault.read().await;
        let vault = opened(&guard)?;
        for path in snapshot.tabs.iter().filter_map(|t| t.file_path.as_deref()) {
            match vault.read_file(path).await {
                Ok(content) => {
                    contents.insert(path.to_string(), content);
                }
                Err(e) => log::warn!("[Tabs] Cannot restore {}: {}", path, e),
            }
        }
    }

    let mut ws = lock(&state.workspace)?;
    let tabs = ws
        .registry_mut(PRIMARY_PANE)
        .ok_or_else(|| format!("Pane {} not found", PRIMARY_PANE))?;
    Ok(tabs.restore(&snapshot, |path| contents.remove(path)))
}

// --- Chat ---

pub fn chat_client(state: &AppState) -> CommandResult<OpenAiCompatClient> {
    let settings = read_prefs(state)?
        .ai
        .clone()
        .ok_or_else(|| ChatError::NotConfigured.to_string())?;
    OpenAiCompatClient::new(settings).map_err(|e| e.to_string())
}

pub fn save_ai_settings(state: &AppState, settings: AiSettings) -> CommandResult<()> {
    OpenAiCompatClient::new(settings.clone()).map_err(|e| e.to_string())?;
    update_prefs(state, |p| p.ai = Some(settings))
}

/// Sends `message` with the active note (when `include_active`) and the
/// `mentioned` vault notes as context. The reply, or the failure, is recorded
/// in the conversation.
pub async fn send_chat<P: ChatProvider>(
    state: &AppState,
    provider: &P,
    message: &str,
    mentioned: &[String],
    include_active: bool,
) -> CommandResult<String> {
    let message = message.trim();
    if message.is_empty() {
        return Err(ChatError::EmptyConversation.to_string());
    }

    let mut notes = Vec::new();
    let mut active_path = None;
    if include_active {
        let ws = lock(&state.workspace)?;
        if let Some(tab) = ws.active_tab().filter(|t| !t.document.text().is_empty()) {
            active_path = tab.file_path.clone();
            notes.push(ContextNote {
                title: tab.title.clone(),
                content: cap_chars(tab.document.text(), MAX_NOTE_CHARS),
                path: tab.file_path.clone(),
            });
        }
    }

    if !mentioned.is_empty() {
        let guard = state.vault.read().await;
        let vault = opened(&guard)?;
        for path in mentioned {
            if notes.iter().any(|n| n.path.as_deref() == Some(path.as_str())) {
                continue;
            }
            match vault.read_file(path).await {
                Ok(content) => notes.push(ContextNote {
                    title: title_for_path(path),
                    content: cap_chars(&content, MAX_NOTE_CHARS),
                    path: Some(path.clone()),
                }),
                Err(e) => log::warn!("[Chat] Skipping mentioned note {}: {}", path, e),
            }
        }
    }

    let budget = read_prefs(state)?.context_token_budget;
    let context = truncate_context(&notes, budget);
    *lock(&state.attached_notes)? = context
        .iter()
        .map(|n| (n.title.clone(), n.path.is_some() && n.path == active_path))
        .collect();

    let history = {
        let mut convo = lock(&state.conversation)?;
        let titles: Vec<String> = context.iter().map(|n| n.title.clone()).collect();
        convo.push_context(&titles);
        convo.push_user(message);
        convo.turns().to_vec()
    };
    let messages = assemble_messages(message, &context, &history);

    match provider.complete(&messages).await {
        Ok(reply) => {
            log::info!("[Chat] {} replied ({} chars)", provider.name(), reply.len());
            lock(&state.conversation)?.push_assistant(reply.clone());
            persist_chat(state);
            Ok(reply)
        }
        Err(e) => {
            log::error!("[Chat] {} request failed: {}", provider.name(), e);
            lock(&state.conversation)?.push_error(e.to_string());
            persist_chat(state);
            Err(e.to_string())
        }
    }
}

pub fn chat_transcript(state: &AppState) -> CommandResult<Vec<ChatTurn>> {
    Ok(lock(&state.conversation)?.turns().to_vec())
}

pub fn clear_chat(state: &AppState) -> CommandResult<()> {
    lock(&state.conversation)?.clear();
    lock(&state.attached_notes)?.clear();
    persist_chat(state);
    Ok(())
}

/// Writes the conversation as markdown into the vault. Returns the relative path.
pub async fn export_chat(state: &AppState, filename: Option<&str>) -> CommandResult<String> {
    let provider = read_prefs(state)?
        .ai
        .as_ref()
        .map(AiSettings::provider_name)
        .unwrap_or("None");
    let markdown = {
        let convo = lock(&state.conversation)?;
        if convo.is_empty() {
            return Err("No messages to export".to_string());
        }
        let attached = lock(&state.attached_notes)?;
        convo.to_markdown(provider, &attached)
    };

    let guard = state.vault.read().await;
    opened(&guard)?
        .export_chat(&markdown, filename)
        .await
        .map_err(|e| e.to_string())
}
