use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::SettingsError;
use crate::modules::autosave::DEFAULT_AUTOSAVE_MS;
use crate::modules::chat_context::DEFAULT_CONTEXT_TOKENS;
use crate::modules::conversation::Conversation;
use crate::modules::file_tree::SortOption;
use crate::modules::tabs::{TabsSnapshot, DEFAULT_MAX_TABS};

pub const PREFERENCES_FILE: &str = "preferences.json";
pub const CHAT_HISTORY_FILE: &str = "chat_history.json";

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum AiPreset {
    OpenAi,
    Ollama,
    LmStudio,
}

impl AiPreset {
    pub fn endpoint(&self) -> &'static str {
        match self {
            Self::OpenAi => "https://api.openai.com/v1",
            Self::Ollama => "http://localhost:11434/v1",
            Self::LmStudio => "http://localhost:1234/v1",
        }
    }

    pub fn default_model(&self) -> &'static str {
        match self {
            Self::OpenAi => "gpt-4",
            Self::Ollama => "llama2",
            Self::LmStudio => "local-model",
        }
    }
}

/// Connection settings for an OpenAI-compatible chat endpoint.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AiSettings {
    pub endpoint: String,
    pub api_key: Option<String>,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
}

impl Default for AiSettings {
    fn default() -> Self {
        Self::from_preset(AiPreset::OpenAi)
    }
}

impl AiSettings {
    pub fn from_preset(preset: AiPreset) -> Self {
        Self {
            endpoint: preset.endpoint().to_string(),
            api_key: None,
            model: preset.default_model().to_string(),
            temperature: 0.7,
            max_tokens: 2000,
        }
    }

    pub fn provider_name(&self) -> &'static str {
        let endpoint = self.endpoint.to_lowercase();
        if endpoint.contains("openai.com") {
            "OpenAI"
        } else if endpoint.contains("ollama") || endpoint.contains("11434") {
            "Ollama"
        } else if endpoint.contains("localhost:1234") {
            "LM Studio"
        } else {
            "Custom"
        }
    }
}

/// UI state and preferences persisted between sessions.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct Preferences {
    pub last_vault: Option<PathBuf>,
    pub chat_panel_width: u32,
    pub chat_panel_visible: bool,
    pub sort_option: SortOption,
    pub max_tabs_per_pane: usize,
    pub context_token_budget: usize,
    pub autosave_delay_ms: u64,
    pub ai: Option<AiSettings>,
    /// Tabs of the primary pane at last shutdown.
    pub session: Option<TabsSnapshot>,
}

impl Default for Preferences {
    fn default() -> Self {
        Self {
            last_vault: None,
            chat_panel_width: 400,
            chat_panel_visible: false,
            sort_option: SortOption::default(),
            max_tabs_per_pane: DEFAULT_MAX_TABS,
            context_token_budget: DEFAULT_CONTEXT_TOKENS,
            autosave_delay_ms: DEFAULT_AUTOSAVE_MS,
            ai: None,
            session: None,
        }
    }
}

impl Preferences {
    /// `<platform config dir>/aura`.
    pub fn default_dir() -> Result<PathBuf, SettingsError> {
        dirs::config_dir()
            .map(|d| d.join("aura"))
            .ok_or(SettingsError::NoConfigDir)
    }

    pub fn get_path(dir: &Path) -> PathBuf {
        dir.join(PREFERENCES_FILE)
    }

    /// Missing or unreadable files fall back to defaults.
    pub fn load(dir: &Path) -> Self {
        let path = Self::get_path(dir);
        if !path.exists() {
            return Self::default();
        }
        match fs::read_to_string(&path) {
            Ok(content) => serde_json::from_str(&content).unwrap_or_else(|e| {
                log::warn!("[Settings] Failed to parse preferences: {}, returning defaults", e);
                Self::default()
            }),
            Err(e) => {
                log::warn!("[Settings] Failed to read file: {}, returning defaults", e);
                Self::default()
            }
        }
    }

    pub fn save(&self, dir: &Path) -> Result<(), SettingsError> {
        write_json(dir, PREFERENCES_FILE, self)
    }

    /// The remembered vault, forgotten if its folder is gone.
    pub fn valid_last_vault(&mut self) -> Option<PathBuf> {
        match &self.last_vault {
            Some(path) if path.is_dir() => Some(path.clone()),
            Some(path) => {
                log::info!("[Settings] Last vault {:?} no longer exists", path);
                self.last_vault = None;
                None
            }
            None => None,
        }
    }
}

fn write_json<T: Serialize>(dir: &Path, file: &str, value: &T) -> Result<(), SettingsError> {
    let path = dir.join(file);
    let tmp_path = path.with_extension("tmp");

    fs::create_dir_all(dir)?;
    let json = serde_json::to_string_pretty(value)?;

    // Write to tmp, then rename, so a crash never leaves half a file.
    fs::write(&tmp_path, json)?;
    fs::rename(tmp_path, path)?;
    Ok(())
}

/// The chat transcript from the last session; empty when missing or unreadable.
pub fn load_chat_history(dir: &Path) -> Conversation {
    let path = dir.join(CHAT_HISTORY_FILE);
    let Ok(content) = fs::read_to_string(&path) else {
        return Conversation::default();
    };
    serde_json::from_str(&content).unwrap_or_else(|e| {
        log::warn!("[Settings] Failed to parse chat history: {}, starting empty", e);
        Conversation::default()
    })
}

pub fn save_chat_history(dir: &Path, conversation: &Conversation) -> Result<(), SettingsError> {
    write_json(dir, CHAT_HISTORY_FILE, conversation)
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use tempfile::tempdir;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = tempdir().unwrap();
        let prefs = Preferences::load(dir.path());
        assert_eq!(prefs, Preferences::default());
        assert_eq!(prefs.max_tabs_per_pane, 5);
        assert_eq!(prefs.context_token_budget, 2000);
    }

    #[test]
    fn test_save_then_load() {
        let dir = tempdir().unwrap();
        let mut prefs = Preferences::default();
        prefs.chat_panel_width = 520;
        prefs.sort_option = SortOption::Modified;
        prefs.ai = Some(AiSettings::from_preset(AiPreset::Ollama));

        prefs.save(dir.path()).unwrap();

        assert!(!dir.path().join("preferences.tmp").exists());
        assert_eq!(Preferences::load(dir.path()), prefs);
    }

    #[test]
    fn test_corrupt_file_gives_defaults() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join(PREFERENCES_FILE), "{ not json").unwrap();
        assert_eq!(Preferences::load(dir.path()), Preferences::default());
    }

    #[test]
    fn test_partial_file_fills_defaults() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join(PREFERENCES_FILE), r#"{"chat_panel_visible": true}"#).unwrap();

        let prefs = Preferences::load(dir.path());
        assert!(prefs.chat_panel_visible);
        assert_eq!(prefs.chat_panel_width, 400);
    }

    #[test]
    fn test_last_vault_forgotten_when_missing() {
        let dir = tempdir().unwrap();
        let mut prefs = Preferences {
            last_vault: Some(dir.path().to_path_buf()),
            ..Preferences::default()
        };
        assert_eq!(prefs.valid_last_vault().as_deref(), Some(dir.path()));

        prefs.last_vault = Some(dir.path().join("gone"));
        assert_eq!(prefs.valid_last_vault(), None);
        assert_eq!(prefs.last_vault, None);
    }

    #[rstest]
    #[case("https://api.openai.com/v1", "OpenAI")]
    #[case("http://localhost:11434/v1", "Ollama")]
    #[case("http://localhost:1234/v1", "LM Studio")]
    #[case("https://llm.internal.example/v1", "Custom")]
    fn test_provider_name(#[case] endpoint: &str, #[case] expected: &str) {
        let settings = AiSettings {
            endpoint: endpoint.to_string(),
            ..AiSettings::default()
        };
        assert_eq!(settings.provider_name(), expected);
    }

    #[test]
    fn test_chat_history_round_trip() {
        let dir = tempdir().unwrap();
        assert!(load_chat_history(dir.path()).is_empty());

        let mut convo = Conversation::default();
        convo.push_user("what is due today?");
        convo.push_assistant("The report.");
        save_chat_history(dir.path(), &convo).unwrap();

        let loaded = load_chat_history(dir.path());
        assert_eq!(loaded.turns(), convo.turns());
        assert!(!dir.path().join("chat_history.tmp").exists());
    }

    #[test]
    fn test_corrupt_chat_history_starts_empty() {
        let dir = tempdir().unwrap();
        fs::write(dir.path().join(CHAT_HISTORY_FILE), "[oops").unwrap();
        assert!(load_chat_history(dir.path()).is_empty());
    }
}
