//! Controller for one UI session.
//!
//! The UI sends discrete [`Intent`]s; the session answers each with an
//! [`Outcome`] carrying the data to render and a status line. The listing
//! cache lives here and is shared by every intent of the session.

use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::{
    cache::SessionCache,
    error::{LookupError, Result},
    lookup,
    store::{FileEntry, Folder, ObjectStore},
};

pub const MAX_VISIBLE_FILES: usize = 20;

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(tag = "intent", rename_all = "camelCase")]
pub enum Intent {
    LoadFolders,
    RefreshFolders,
    SelectFolder { folder: String },
    Search { folder: String, name: String },
    FindExact { folder: String, name: String },
    QueryChanged { text: String },
    PublicUrl { key: String },
}

/// First names of a folder for a drop-down, plus how many were left out.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileListing {
    pub visible: Vec<String>,
    pub total: usize,
    pub hidden: usize,
}

impl FileListing {
    fn from_stems(stems: &[String]) -> Self {
        let visible: Vec<String> = stems.iter().take(MAX_VISIBLE_FILES).cloned().collect();
        Self {
            total: stems.len(),
            hidden: stems.len() - visible.len(),
            visible,
        }
    }

    pub fn more_label(&self) -> Option<String> {
        (self.hidden > 0).then(|| format!("... and {} more files", self.hidden))
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "camelCase")]
pub enum Outcome {
    Folders {
        folders: Vec<String>,
        status: String,
    },
    Files {
        folder: String,
        listing: FileListing,
        status: String,
    },
    Urls {
        urls: Vec<String>,
        status: String,
    },
    Suggestions {
        names: Vec<String>,
    },
    Url {
        url: String,
    },
}

fn folders_status(count: usize) -> String {
    if count > 0 {
        format!("Ready (cache: {count} folders)")
    } else {
        "No folders found".to_string()
    }
}

fn urls_status(count: usize) -> String {
    if count > 0 {
        format!("Found: {count} files")
    } else {
        "No files found".to_string()
    }
}

fn stems(files: &[FileEntry]) -> Vec<String> {
    files
        .iter()
        .map(|file| lookup::stem_of(&file.name).to_string())
        .collect()
}

fn require_folder(folder: &str) -> Result<()> {
    if folder.trim().is_empty() {
        return Err(LookupError::InvalidQuery(
            "Specify a folder".to_string(),
        ));
    }
    Ok(())
}

fn require_search_input(folder: &str, name: &str) -> Result<()> {
    require_folder(folder)?;
    if name.trim().is_empty() {
        return Err(LookupError::InvalidQuery("Enter a file name".to_string()));
    }
    Ok(())
}

pub struct Session {
    store: ObjectStore,
    cache: Mutex<SessionCache>,
    current_stems: Mutex<Vec<String>>,
    in_flight: Mutex<Option<Arc<AtomicBool>>>,
}

impl Session {
    pub fn new(store: ObjectStore) -> Self {
        Self {
            store,
            cache: Mutex::new(SessionCache::default()),
            current_stems: Mutex::new(Vec::new()),
            in_flight: Mutex::new(None),
        }
    }

    /// Registers a new listing and raises the flag of the one it replaces.
    async fn begin_listing(&self) -> Arc<AtomicBool> {
        let flag = Arc::new(AtomicBool::new(false));
        let mut in_flight = self.in_flight.lock().await;
        if let Some(previous) = in_flight.replace(Arc::clone(&flag)) {
            if !previous.swap(true, Ordering::SeqCst) {
                tracing::debug!("superseding previous listing");
            }
        }
        flag
    }

    /// Folder list, fetched on first use. `force` refetches and, on
    /// success, drops every cached file list as well.
    pub async fn folders(&self, force: bool, cancel_flag: &AtomicBool) -> Result<Vec<Folder>> {
        let mut cache = self.cache.lock().await;
        if !force {
            if let Some(folders) = cache.folders() {
                tracing::debug!(count = folders.len(), "folder list served from cache");
                return Ok(folders.to_vec());
            }
        }

        let folders = self.store.list_folders(cancel_flag).await?;
        if force {
            tracing::info!(
                cached_folders = cache.cached_folder_count(),
                "refresh: clearing session cache"
            );
            cache.clear();
        }
        tracing::info!(count = folders.len(), "folders loaded");
        cache.set_folders(folders.clone());
        Ok(folders)
    }

    /// Files of one folder, fetched on first use. The cache stays locked
    /// across the fetch so concurrent callers never list the same folder
    /// twice.
    pub async fn files(
        &self,
        folder_prefix: &str,
        cancel_flag: &AtomicBool,
    ) -> Result<Vec<FileEntry>> {
        let mut cache = self.cache.lock().await;
        if let Some(files) = cache.files(folder_prefix) {
            tracing::debug!(
                folder = folder_prefix,
                count = files.len(),
                "file list served from cache"
            );
            return Ok(files.to_vec());
        }

        let files = self.store.list_files(folder_prefix, cancel_flag).await?;
        tracing::info!(folder = folder_prefix, count = files.len(), "files loaded");
        cache.set_files(folder_prefix, files.clone());
        Ok(files)
    }

    pub async fn load_folders(&self, force: bool) -> Result<Outcome> {
        let flag = self.begin_listing().await;
        let folders = self.folders(force, &flag).await?;
        let names: Vec<String> = folders
            .iter()
            .map(|folder| folder.display_name().to_string())
            .collect();
        Ok(Outcome::Folders {
            status: folders_status(names.len()),
            folders: names,
        })
    }

    pub async fn select_folder(&self, folder: &str) -> Result<Outcome> {
        require_folder(folder)?;
        let folder_prefix = lookup::normalize_folder_path(folder);
        let flag = self.begin_listing().await;
        let files = self.files(&folder_prefix, &flag).await?;
        let names = stems(&files);
        let listing = FileListing::from_stems(&names);
        *self.current_stems.lock().await = names;

        Ok(Outcome::Files {
            status: format!("Ready (cache: {} files)", listing.total),
            folder: folder_prefix,
            listing,
        })
    }

    pub async fn search(&self, folder: &str, name: &str) -> Result<Outcome> {
        require_search_input(folder, name)?;
        let folder_prefix = lookup::normalize_folder_path(folder);
        let flag = self.begin_listing().await;
        let files = self.files(&folder_prefix, &flag).await?;

        let urls =
            lookup::find_by_base_name(self.store.urls(), &folder_prefix, &files, name.trim());
        tracing::info!(
            folder = %folder_prefix,
            name = name.trim(),
            found = urls.len(),
            "base-name search"
        );
        Ok(Outcome::Urls {
            status: urls_status(urls.len()),
            urls,
        })
    }

    pub async fn find_exact(&self, folder: &str, name: &str) -> Result<Outcome> {
        require_search_input(folder, name)?;
        let folder_prefix = lookup::normalize_folder_path(folder);
        let flag = self.begin_listing().await;
        let files = self.files(&folder_prefix, &flag).await?;

        let urls =
            lookup::find_by_exact_stem(self.store.urls(), &folder_prefix, &files, name.trim());
        tracing::info!(
            folder = %folder_prefix,
            name = name.trim(),
            found = urls.len(),
            "exact-stem search"
        );
        Ok(Outcome::Urls {
            status: urls_status(urls.len()),
            urls,
        })
    }

    /// Suggestions from the folder selected last; no I/O.
    pub async fn query_changed(&self, text: &str) -> Outcome {
        if text.is_empty() {
            return Outcome::Suggestions { names: Vec::new() };
        }
        let current = self.current_stems.lock().await;
        Outcome::Suggestions {
            names: lookup::filter_by_prefix(&current, text),
        }
    }

    pub fn public_url(&self, key: &str) -> Outcome {
        Outcome::Url {
            url: self.store.public_url_for(key),
        }
    }

    pub async fn dispatch(&self, intent: Intent) -> Result<Outcome> {
        match intent {
            Intent::LoadFolders => self.load_folders(false).await,
            Intent::RefreshFolders => self.load_folders(true).await,
            Intent::SelectFolder { folder } => self.select_folder(&folder).await,
            Intent::Search { folder, name } => self.search(&folder, &name).await,
            Intent::FindExact { folder, name } => self.find_exact(&folder, &name).await,
            Intent::QueryChanged { text } => Ok(self.query_changed(&text).await),
            Intent::PublicUrl { key } => Ok(self.public_url(&key)),
        }
    }
}
