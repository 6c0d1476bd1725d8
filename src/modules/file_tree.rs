// File tree ordering for the vault sidebar.
// Entries arrive flat; they are grouped per folder, sorted, and flattened back
// depth-first so each folder is followed by its children.

use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FileEntry {
    /// Path relative to the vault root, `/`-separated.
    pub path: String,
    pub name: String,
    pub is_dir: bool,
    pub extension: Option<String>,
    pub depth: usize,
    pub parent_path: Option<String>,
    /// Unix seconds.
    pub created: Option<i64>,
    pub modified: Option<i64>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SortOption {
    #[default]
    Alphabetical,
    Created,
    Modified,
}

fn by_name(a: &FileEntry, b: &FileEntry) -> Ordering {
    a.name.to_lowercase().cmp(&b.name.to_lowercase())
}

/// Newest first; entries without a timestamp sort after those with one.
fn by_time(a: Option<i64>, b: Option<i64>) -> Ordering {
    match (a, b) {
        (Some(a), Some(b)) => b.cmp(&a),
        (Some(_), None) => Ordering::Less,
        (None, Some(_)) => Ordering::Greater,
        (None, None) => Ordering::Equal,
    }
}

pub fn compare(a: &FileEntry, b: &FileEntry, sort: SortOption) -> Ordering {
    // Folders always first.
    if a.is_dir != b.is_dir {
        return if a.is_dir { Ordering::Less } else { Ordering::Greater };
    }
    let primary = match sort {
        SortOption::Alphabetical => Ordering::Equal,
        SortOption::Created => by_time(a.created, b.created),
        SortOption::Modified => by_time(a.modified, b.modified),
    };
    primary.then_with(|| by_name(a, b))
}

pub fn sort_tree(entries: Vec<FileEntry>, sort: SortOption) -> Vec<FileEntry> {
    let mut children: HashMap<String, Vec<FileEntry>> = HashMap::new();
    for entry in entries {
        let parent = entry.parent_path.clone().unwrap_or_default();
        children.entry(parent).or_default().push(entry);
    }
    for level in children.values_mut() {
        level.sort_by(|a, b| compare(a, b, sort));
    }

    let mut result = Vec::new();
    flatten_into(&mut children, "", &mut result);
    result
}

fn flatten_into(children: &mut HashMap<String, Vec<FileEntry>>, parent: &str, out: &mut Vec<FileEntry>) {
    let Some(level) = children.remove(parent) else {
        return;
    };
    for entry in level {
        let folder = entry.is_dir.then(|| entry.path.clone());
        out.push(entry);
        if let Some(folder) = folder {
            flatten_into(children, &folder, out);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    fn entry(path: &str, is_dir: bool, created: Option<i64>, modified: Option<i64>) -> FileEntry {
        let parent = path.rsplit_once('/').map(|(p, _)| p.to_string());
        let name = path.rsplit('/').next().unwrap().to_string();
        FileEntry {
            path: path.to_string(),
            extension: (!is_dir)
                .then(|| name.rsplit_once('.').map(|(_, e)| e.to_string()))
                .flatten(),
            name,
            is_dir,
            depth: path.matches('/').count() + 1,
            parent_path: parent,
            created,
            modified,
        }
    }

    fn sample() -> Vec<FileEntry> {
        vec![
            entry("zeta.md", false, Some(30), Some(10)),
            entry("Projects", true, None, None),
            entry("Projects/beta.md", false, Some(10), Some(50)),
            entry("alpha.md", false, Some(20), None),
            entry("Projects/Alpha.md", false, None, Some(40)),
            entry("Archive", true, None, None),
        ]
    }

    fn paths(entries: &[FileEntry]) -> Vec<&str> {
        entries.iter().map(|e| e.path.as_str()).collect()
    }

    #[rstest]
    #[case(SortOption::Alphabetical, vec!["Archive", "Projects", "Projects/Alpha.md", "Projects/beta.md", "alpha.md", "zeta.md"])]
    #[case(SortOption::Created, vec!["Archive", "Projects", "Projects/beta.md", "Projects/Alpha.md", "zeta.md", "alpha.md"])]
    #[case(SortOption::Modified, vec!["Archive", "Projects", "Projects/beta.md", "Projects/Alpha.md", "zeta.md", "alpha.md"])]
    fn test_sort_tree(#[case] sort: SortOption, #[case] expected: Vec<&str>) {
        let sorted = sort_tree(sample(), sort);
        assert_eq!(paths(&sorted), expected);
    }

    #[test]
    fn test_sort_option_serializes_lowercase() {
        assert_eq!(serde_json::to_string(&SortOption::Modified).unwrap(), "\"modified\"");
        let parsed: SortOption = serde_json::from_str("\"created\"").unwrap();
        assert_eq!(parsed, SortOption::Created);
    }
}
