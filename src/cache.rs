use std::collections::HashMap;

use crate::store::{FileEntry, Folder};

/// Per-session listing cache. Populated lazily, cleared only as a whole.
#[derive(Debug, Default)]
pub struct SessionCache {
    folders: Option<Vec<Folder>>,
    files: HashMap<String, Vec<FileEntry>>,
}

impl SessionCache {
    pub fn folders(&self) -> Option<&[Folder]> {
        self.folders.as_deref()
    }

    pub fn set_folders(&mut self, folders: Vec<Folder>) {
        self.folders = Some(folders);
    }

    pub fn files(&self, folder_prefix: &str) -> Option<&[FileEntry]> {
        self.files.get(folder_prefix).map(Vec::as_slice)
    }

    pub fn set_files(&mut self, folder_prefix: &str, files: Vec<FileEntry>) {
        self.files.insert(folder_prefix.to_string(), files);
    }

    pub fn cached_folder_count(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.folders.is_none() && self.files.is_empty()
    }

    pub fn clear(&mut self) {
        self.folders = None;
        self.files.clear();
    }
}
