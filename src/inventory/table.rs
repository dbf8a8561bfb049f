//! In-memory tables shared by the store implementations.

use super::{FileRow, FileUpdate, FolderRow, NewFile};
use crate::error::{InventoryError, Result};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::PathBuf;

#[derive(Debug, Default, Clone, Serialize, Deserialize)]
pub struct InventoryTable {
    #[serde(default)]
    folders: BTreeMap<u64, FolderRow>,
    #[serde(default)]
    files: BTreeMap<u64, FileRow>,
    #[serde(default)]
    next_folder_id: u64,
    #[serde(default)]
    next_file_id: u64,
    /// `(folder_id, path) -> file_id`, rebuilt on load
    #[serde(skip)]
    locations: HashMap<(u64, String), u64>,
}

impl InventoryTable {
    /// Decode a serialized table, rejecting rows whose key and id disagree
    pub fn from_json(content: &str) -> Result<Self> {
        let mut table: InventoryTable = serde_json::from_str(content)?;

        if let Some((key, row)) = table.files.iter().find(|(k, r)| **k != r.file_id) {
            return Err(InventoryError::Validation(format!(
                "file row stored under key {} has id {}",
                key, row.file_id
            )));
        }
        if let Some((key, row)) = table.folders.iter().find(|(k, r)| **k != r.folder_id) {
            return Err(InventoryError::Validation(format!(
                "folder row stored under key {} has id {}",
                key, row.folder_id
            )));
        }

        // Never hand out an id that is already taken
        let max_file = table.files.keys().next_back().copied().unwrap_or(0);
        let max_folder = table.folders.keys().next_back().copied().unwrap_or(0);
        table.next_file_id = table.next_file_id.max(max_file);
        table.next_folder_id = table.next_folder_id.max(max_folder);

        table.locations = HashMap::with_capacity(table.files.len());
        for row in table.files.values() {
            table
                .locations
                .entry((row.folder_id, row.path.clone()))
                .or_insert(row.file_id);
        }

        Ok(table)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn select_by_folder_ids(&self, ids: &[u64]) -> Vec<FileRow> {
        let ids: HashSet<u64> = ids.iter().copied().collect();
        self.sorted(self.files.values().filter(|f| ids.contains(&f.folder_id)))
    }

    pub fn select_by_portable_paths(&self, paths: &[String]) -> Vec<FileRow> {
        let paths: HashSet<&str> = paths.iter().map(String::as_str).collect();
        self.sorted(self.files.values().filter(|f| paths.contains(f.path.as_str())))
    }

    pub fn insert(&mut self, file: NewFile) -> Result<u64> {
        if file.folder_id == 0 || file.path.is_empty() {
            return Err(InventoryError::InsertFailed {
                path: PathBuf::from(&file.path),
                reason: "folder id and path are required".to_string(),
            });
        }

        let location = (file.folder_id, file.path.clone());
        if let Some(existing) = self.locations.get(&location) {
            return Ok(*existing);
        }

        self.next_file_id += 1;
        let file_id = self.next_file_id;
        self.locations.insert(location, file_id);
        self.files.insert(
            file_id,
            FileRow {
                file_id,
                folder_id: file.folder_id,
                path: file.path,
                width: file.width,
                height: file.height,
                hash: file.hash,
                mime_type: file.mime_type,
                original_size: file.original_size,
                optimized_size: None,
                optimization_level: None,
                status: None,
                error: None,
            },
        );

        Ok(file_id)
    }

    pub fn update(&mut self, file_id: u64, fields: FileUpdate) -> bool {
        let Some(row) = self.files.get_mut(&file_id) else {
            return false;
        };

        if let Some(folder_id) = fields.folder_id {
            if folder_id != row.folder_id {
                let old = (row.folder_id, row.path.clone());
                if self.locations.get(&old) == Some(&file_id) {
                    self.locations.remove(&old);
                }
                self.locations.entry((folder_id, row.path.clone())).or_insert(file_id);
                row.folder_id = folder_id;
            }
        }
        if let Some(level) = fields.optimization_level {
            row.optimization_level = level;
        }
        if let Some(status) = fields.status {
            row.status = status;
        }
        if let Some(size) = fields.optimized_size {
            row.optimized_size = size;
        }
        if let Some(error) = fields.error {
            row.error = error;
        }

        true
    }

    pub fn folders(&self) -> Vec<FolderRow> {
        self.folders.values().cloned().collect()
    }

    pub fn insert_folder(&mut self, path: String, active: bool) -> Result<u64> {
        if path.is_empty() {
            return Err(InventoryError::Validation("folder path is empty".to_string()));
        }

        if let Some(existing) = self.folders.values().find(|f| f.path == path) {
            return Ok(existing.folder_id);
        }

        self.next_folder_id += 1;
        let folder_id = self.next_folder_id;
        self.folders.insert(
            folder_id,
            FolderRow {
                folder_id,
                path,
                active,
            },
        );

        Ok(folder_id)
    }

    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    fn sorted<'a>(&self, rows: impl Iterator<Item = &'a FileRow>) -> Vec<FileRow> {
        let mut rows: Vec<FileRow> = rows.cloned().collect();
        rows.sort_by_key(|r| (r.folder_id, r.file_id));
        rows
    }
}
