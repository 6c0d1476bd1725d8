// Error types shared by the registries, the vault host and the chat client.
// Commands flatten these to strings at the UI boundary.

use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TabError {
    #[error("Maximum {max} tabs allowed")]
    CapacityExceeded { max: usize },

    #[error("Tab {0} not found")]
    NotFound(String),
}

#[derive(Debug, Error)]
pub enum VaultError {
    #[error("Vault directory does not exist: {0}")]
    NotFound(PathBuf),

    #[error("Path is not a directory: {0}")]
    NotADirectory(PathBuf),

    #[error("Path already exists: {0}")]
    AlreadyExists(PathBuf),

    #[error("Vault name cannot be empty")]
    EmptyName,

    #[error("Path escapes the vault: {0}")]
    OutsideVault(PathBuf),

    #[error("Path is not a file: {0}")]
    NotAFile(PathBuf),

    #[error("Invalid image: {0}")]
    InvalidImage(String),

    #[error("No vault opened")]
    NoVaultOpen,

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("No AI settings configured")]
    NotConfigured,

    #[error("No messages provided")]
    EmptyConversation,

    #[error("Invalid endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("Failed to connect: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({status}): {body}")]
    Api { status: u16, body: String },

    #[error("Failed to parse response: {0}")]
    InvalidResponse(String),

    #[error("No content found in response")]
    NoContent,
}

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("Settings I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Settings JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("No config directory available")]
    NoConfigDir,
}
