use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::preview::classify;

/// One ListObjectsV2-style call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ListingRequest {
    pub bucket: String,
    pub prefix: String,
    pub page_token: Option<String>,
    pub page_size: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FolderEntry {
    pub name: String,
    pub prefix: String,
}

impl FolderEntry {
    pub fn from_prefix(prefix: &str) -> Self {
        let name = prefix
            .trim_end_matches('/')
            .rsplit('/')
            .next()
            .unwrap_or_default()
            .to_string();
        Self {
            name,
            prefix: prefix.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileEntry {
    pub name: String,
    pub key: String,
    pub size_bytes: u64,
    pub last_modified: Option<DateTime<Utc>>,
    pub extension: String,
    pub preview_supported: bool,
}

impl FileEntry {
    pub fn new(key: &str, size_bytes: u64, last_modified: Option<DateTime<Utc>>) -> Self {
        let name = key.rsplit('/').next().unwrap_or(key).to_string();
        let extension = classify::extension_of(&name);
        Self {
            preview_supported: classify::is_preview_supported(&extension),
            name,
            key: key.to_string(),
            size_bytes,
            last_modified,
            extension,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Entry {
    Folder(FolderEntry),
    File(FileEntry),
}

/// One page of a listing, in store order.
///
/// `next_token` is present exactly when the page is truncated; the only
/// constructor normalizes inconsistent store responses.
#[derive(Debug, Clone, PartialEq)]
pub struct ListingPage {
    entries: Vec<Entry>,
    next_token: Option<String>,
}

impl ListingPage {
    pub fn new(entries: Vec<Entry>, is_truncated: bool, next_token: Option<String>) -> Self {
        let next_token = match (is_truncated, next_token) {
            (true, Some(token)) if !token.is_empty() => Some(token),
            (true, _) => {
                tracing::warn!("Truncated listing without continuation token, treating as last page");
                None
            }
            (false, Some(_)) => {
                tracing::debug!("Dropping continuation token on non-truncated listing");
                None
            }
            (false, None) => None,
        };
        Self { entries, next_token }
    }

    pub fn entries(&self) -> &[Entry] {
        &self.entries
    }

    pub fn next_token(&self) -> Option<&str> {
        self.next_token.as_deref()
    }

    pub fn is_truncated(&self) -> bool {
        self.next_token.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NavigationState {
    pub current_page: u32,
    pub known_max_page: u32,
    pub has_more: bool,
}

impl Default for NavigationState {
    fn default() -> Self {
        Self {
            current_page: 1,
            known_max_page: 1,
            has_more: false,
        }
    }
}

/// Aggregates over the entries of the current page only.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectoryStats {
    pub folder_count: usize,
    pub file_count: usize,
    pub page_byte_total: u64,
}

/// What the presentation layer renders for one navigation step.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Page {
    pub prefix: String,
    pub folders: Vec<FolderEntry>,
    pub files: Vec<FileEntry>,
    pub current_page: u32,
    pub total_pages_known_lower_bound: u32,
    pub has_more: bool,
    pub stats: DirectoryStats,
}

impl Page {
    pub fn assemble(prefix: &str, listing: &ListingPage, nav: &NavigationState) -> Self {
        let mut folders = Vec::new();
        let mut files = Vec::new();
        for entry in listing.entries() {
            match entry {
                Entry::Folder(folder) => folders.push(folder.clone()),
                Entry::File(file) => files.push(file.clone()),
            }
        }
        let stats = DirectoryStats {
            folder_count: folders.len(),
            file_count: files.len(),
            page_byte_total: files.iter().map(|f| f.size_bytes).sum(),
        };

        Page {
            prefix: prefix.to_string(),
            folders,
            files,
            current_page: nav.current_page,
            total_pages_known_lower_bound: nav.known_max_page,
            has_more: nav.has_more,
            stats,
        }
    }
}
