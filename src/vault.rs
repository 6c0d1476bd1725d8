// Vault host: a folder of markdown notes on disk.
// Every path crossing this API is relative to the vault root and `/`-separated.

use base64::{engine::general_purpose, Engine as _};
use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};
use std::time::UNIX_EPOCH;
use tokio::fs;
use walkdir::{DirEntry, WalkDir};

use crate::error::VaultError;
use crate::modules::file_tree::FileEntry;

pub const WELCOME_NOTE: &str = "Welcome.md";
pub const CHAT_HISTORY_DIR: &str = "Chat History";
pub const PASTED_IMAGES_DIR: &str = "files";
const IMAGE_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "gif"];

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VaultInfo {
    pub path: String,
    pub name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct NoteSearchResult {
    pub name: String,
    pub path: String,
}

#[derive(Debug, Clone)]
pub struct Vault {
    root: PathBuf,
}

pub fn is_image_path(path: &str) -> bool {
    Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| IMAGE_EXTENSIONS.contains(&e.to_lowercase().as_str()))
}

fn to_slash(path: &Path) -> String {
    path.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

fn unix_secs(time: std::io::Result<std::time::SystemTime>) -> Option<i64> {
    time.ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs() as i64)
}

impl Vault {
    pub async fn open(path: impl AsRef<Path>) -> Result<Self, VaultError> {
        let root = path.as_ref().to_path_buf();
        let meta = fs::metadata(&root)
            .await
            .map_err(|_| VaultError::NotFound(root.clone()))?;
        if !meta.is_dir() {
            return Err(VaultError::NotADirectory(root));
        }
        log::info!("[Vault] Opened {:?}", root);
        Ok(Self { root })
    }

    /// Creates an empty vault folder at `path` and opens it.
    pub async fn create(path: impl AsRef<Path>) -> Result<Self, VaultError> {
        let root = path.as_ref();
        if fs::try_exists(root).await? {
            return Err(VaultError::AlreadyExists(root.to_path_buf()));
        }
        fs::create_dir_all(root).await?;
        Self::open(root).await
    }

    /// Creates `parent/name` with a welcome note and opens it.
    pub async fn create_named(parent: impl AsRef<Path>, name: &str) -> Result<Self, VaultError> {
        let name = name.trim();
        if name.is_empty() {
            return Err(VaultError::EmptyName);
        }
        let root = parent.as_ref().join(name);
        if fs::try_exists(&root).await? {
            return Err(VaultError::AlreadyExists(root));
        }
        fs::create_dir_all(&root).await?;

        let welcome = format!(
            "# Welcome to {}\n\n\
This is your new Aura vault! Start taking notes by creating new markdown files.\n\n\
## Getting Started\n\n\
- Create new notes by clicking the + button\n\
- Organize your thoughts in folders\n\
- All your notes are stored as plain markdown files\n\n\
Happy note-taking!\n",
            name
        );
        fs::write(root.join(WELCOME_NOTE), welcome).await?;
        Self::open(root).await
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn info(&self) -> VaultInfo {
        VaultInfo {
            path: self.root.to_string_lossy().to_string(),
            name: self
                .root
                .file_name()
                .and_then(|n| n.to_str())
                .unwrap_or("Untitled")
                .to_string(),
        }
    }

    /// Joins a vault-relative path onto the root, refusing anything that
    /// would land outside it.
    pub fn resolve(&self, relative: &str) -> Result<PathBuf, VaultError> {
        let rel = Path::new(relative);
        let escapes = rel.components().any(|c| {
            matches!(c, Component::ParentDir | Component::RootDir | Component::Prefix(_))
        });
        if escapes || relative.trim().is_empty() {
            return Err(VaultError::OutsideVault(rel.to_path_buf()));
        }
        Ok(self.root.join(rel))
    }

    pub async fn read_file(&self, relative: &str) -> Result<String, VaultError> {
        let path = self.resolve(relative)?;
        Ok(fs::read_to_string(path).await?)
    }

    /// Writes a note, creating missing parent folders.
    pub async fn write_file(&self, relative: &str, content: &str) -> Result<(), VaultError> {
        let path = self.resolve(relative)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(path, content).await?;
        Ok(())
    }

    /// Creates a note headed with its own name. `.md` is added when the name
    /// has no extension. Returns the note's relative path.
    pub async fn create_note(&self, name: &str) -> Result<String, VaultError> {
        let mut relative = name.trim().to_string();
        if Path::new(&relative).extension().is_none() {
            relative.push_str(".md");
        }
        let path = self.resolve(&relative)?;
        if fs::try_exists(&path).await? {
            return Err(VaultError::AlreadyExists(path));
        }
        let stem = Path::new(&relative)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("Untitled")
            .to_string();
        self.write_file(&relative, &format!("# {}", stem)).await?;
        log::info!("[Vault] Created note {}", relative);
        Ok(relative)
    }

    pub async fn create_folder(&self, relative: &str) -> Result<(), VaultError> {
        let path = self.resolve(relative)?;
        fs::create_dir_all(path).await?;
        Ok(())
    }

    /// Deletes a single file. Folders are refused.
    pub async fn delete_file(&self, relative: &str) -> Result<(), VaultError> {
        let path = self.resolve(relative)?;
        match fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => {
                fs::remove_file(&path).await?;
                log::info!("[Vault] Deleted {}", relative);
                Ok(())
            }
            _ => Err(VaultError::NotAFile(path)),
        }
    }

    /// Renames a file or folder, creating the target's parent folders.
    pub async fn rename(&self, old: &str, new: &str) -> Result<(), VaultError> {
        let from = self.resolve(old)?;
        let to = self.resolve(new)?;
        if fs::try_exists(&to).await? {
            return Err(VaultError::AlreadyExists(to));
        }
        if let Some(parent) = to.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::rename(&from, &to).await?;
        log::info!("[Vault] Renamed {} -> {}", old, new);
        Ok(())
    }

    /// Moves an entry into `folder` ("" for the root), keeping its name.
    /// Returns the new relative path.
    pub async fn move_into(&self, relative: &str, folder: &str) -> Result<String, VaultError> {
        let name = Path::new(relative)
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| VaultError::OutsideVault(PathBuf::from(relative)))?;
        let folder = folder.trim_matches('/');
        let target = if folder.is_empty() {
            name.to_string()
        } else {
            format!("{}/{}", folder, name)
        };
        self.rename(relative, &target).await?;
        Ok(target)
    }

    /// Folders, markdown notes and images below the root, sorted by path.
    /// Dot-prefixed entries are skipped.
    pub async fn list_entries(&self) -> Result<Vec<PathBuf>, VaultError> {
        let root = self.root.clone();
        tokio::task::spawn_blocking(move || walk(&root))
            .await
            .map_err(|e| VaultError::Io(std::io::Error::other(e)))
    }

    pub async fn file_tree(&self) -> Result<Vec<FileEntry>, VaultError> {
        let mut entries = Vec::new();
        for full in self.list_entries().await? {
            let Ok(relative) = full.strip_prefix(&self.root) else {
                continue;
            };
            let depth = relative.components().count();
            let parent_path = relative
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .map(to_slash);
            let (created, modified, is_dir) = match fs::metadata(&full).await {
                Ok(meta) => (unix_secs(meta.created()), unix_secs(meta.modified()), meta.is_dir()),
                Err(e) => {
                    log::warn!("[Vault] No metadata for {:?}: {}", full, e);
                    (None, None, full.is_dir())
                }
            };
            entries.push(FileEntry {
                path: to_slash(relative),
                name: relative
                    .file_name()
                    .and_then(|n| n.to_str())
                    .unwrap_or("")
                    .to_string(),
                is_dir,
                extension: if is_dir {
                    None
                } else {
                    full.extension().and_then(|e| e.to_str()).map(str::to_string)
                },
                depth,
                parent_path,
                created,
                modified,
            });
        }
        entries.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(entries)
    }

    /// Notes whose name contains `term` (case-insensitive); exact name
    /// matches first, then by name.
    pub async fn search_notes(&self, term: &str) -> Result<Vec<NoteSearchResult>, VaultError> {
        let needle = term.to_lowercase();
        let mut results: Vec<NoteSearchResult> = self
            .list_entries()
            .await?
            .into_iter()
            .filter(|p| p.extension().and_then(|e| e.to_str()) == Some("md"))
            .filter_map(|p| {
                let name = p.file_stem()?.to_str()?.to_string();
                if !name.to_lowercase().contains(&needle) {
                    return None;
                }
                let path = to_slash(p.strip_prefix(&self.root).ok()?);
                Some(NoteSearchResult { name, path })
            })
            .collect();

        results.sort_by(|a, b| {
            let a_exact = a.name.to_lowercase() == needle;
            let b_exact = b.name.to_lowercase() == needle;
            b_exact.cmp(&a_exact).then_with(|| a.name.cmp(&b.name))
        });
        Ok(results)
    }

    /// Saves a chat transcript under `Chat History/`. Without a file name a
    /// timestamped one is generated. Returns the relative path.
    pub async fn export_chat(&self, content: &str, filename: Option<&str>) -> Result<String, VaultError> {
        let name = match filename {
            Some(name) => name.to_string(),
            None => format!("chat-{}.md", chrono::Local::now().format("%Y-%m-%d_%H-%M-%S")),
        };
        let relative = format!("{}/{}", CHAT_HISTORY_DIR, name);
        self.write_file(&relative, content).await?;
        log::info!("[Vault] Chat exported to {}", relative);
        Ok(relative)
    }

    /// Stores a base64 image pasted into the editor under `files/` with a
    /// timestamped name. Returns the relative path.
    pub async fn save_pasted_image(&self, base64_data: &str, extension: &str) -> Result<String, VaultError> {
        let extension = extension.trim_start_matches('.').to_lowercase();
        if !IMAGE_EXTENSIONS.contains(&extension.as_str()) {
            return Err(VaultError::InvalidImage(format!("unsupported extension {:?}", extension)));
        }
        let bytes = general_purpose::STANDARD
            .decode(base64_data.trim())
            .map_err(|e| VaultError::InvalidImage(e.to_string()))?;

        let name = format!(
            "Pasted image {}.{}",
            chrono::Local::now().format("%Y%m%d%H%M%S"),
            extension
        );
        let relative = format!("{}/{}", PASTED_IMAGES_DIR, name);
        let path = self.resolve(&relative)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(&path, bytes).await?;
        log::info!("[Vault] Saved pasted image {}", relative);
        Ok(relative)
    }

    /// Reads an image as a `data:` URL for inline display.
    pub async fn read_image_data_url(&self, relative: &str) -> Result<String, VaultError> {
        let path = self.resolve(relative)?;
        let bytes = fs::read(&path).await?;
        let content_type = match path
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase)
            .as_deref()
        {
            Some("jpg") | Some("jpeg") => "image/jpeg",
            Some("gif") => "image/gif",
            _ => "image/png",
        };
        Ok(format!(
            "data:{};base64,{}",
            content_type,
            general_purpose::STANDARD.encode(bytes)
        ))
    }
}

fn keep_file(path: &Path) -> bool {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_lowercase);
    match ext.as_deref() {
        Some("md") => true,
        Some(e) => IMAGE_EXTENSIONS.contains(&e),
        None => false,
    }
}

fn is_hidden(entry: &DirEntry) -> bool {
    // The root itself may live under a dot folder.
    entry.depth() > 0 && entry.file_name().to_string_lossy().starts_with('.')
}

// Symlinks are followed; walkdir reports link cycles as errors, which are
// skipped along with unreadable entries.
fn walk(root: &Path) -> Vec<PathBuf> {
    let mut items: Vec<PathBuf> = WalkDir::new(root)
        .follow_links(true)
        .min_depth(1)
        .into_iter()
        .filter_entry(|e| !is_hidden(e))
        .filter_map(|e| match e {
            Ok(entry) => Some(entry),
            Err(err) => {
                log::warn!("[Vault] Skipping entry: {}", err);
                None
            }
        })
        .filter(|e| e.file_type().is_dir() || (e.file_type().is_file() && keep_file(e.path())))
        .map(DirEntry::into_path)
        .collect();

    items.sort();
    items
}
