// Aura core library.
// Everything the note-taking UI needs below the rendering layer: tab and pane
// bookkeeping, the on-disk vault, and AI chat context assembly. The host
// binary owns the window, installs the logger and calls into `commands`.

pub mod error;
pub mod settings;
pub mod vault;
pub mod ai_client;

// Shared state
pub mod state;

// Host command surface
pub mod commands;

// Pure logic modules (no I/O)
pub mod modules;

pub use error::{ChatError, SettingsError, TabError, VaultError};
pub use state::AppState;
