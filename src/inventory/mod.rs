//! # Inventory Module
//!
//! Interfaccia verso lo store persistente di folder e file tracciati.
//!
//! ## Responsabilità:
//! - Definisce le righe tipizzate (`FolderRow`, `FileRow`) restituite dallo store
//! - Definisce il trait `InventoryStore` consumato da registry e reconciler
//! - Fornisce due implementazioni: in memoria (`MemoryInventoryStore`) e su file JSON
//!   (`JsonInventoryStore`)
//!
//! ## Contratto dello store:
//! - Le select restituiscono righe ordinate per `(folder_id, file_id)`
//! - `insert` è idempotente sulla coppia `(folder_id, path)` (insert-if-absent)
//! - `update` restituisce `false` se la riga non esiste
//! - La validazione delle righe avviene una volta sola, al confine dello store

mod json;
mod memory;
mod table;

pub use json::JsonInventoryStore;
pub use memory::MemoryInventoryStore;
pub use table::InventoryTable;

use crate::error::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Outcome of the last optimization attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileStatus {
    Success,
    Error,
    AlreadyOptimized,
}

impl fmt::Display for FileStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Success => "success",
            Self::Error => "error",
            Self::AlreadyOptimized => "already_optimized",
        })
    }
}

/// A tracked folder as persisted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FolderRow {
    pub folder_id: u64,
    /// Portable path, always with a trailing slash
    pub path: String,
    pub active: bool,
}

/// A tracked file as persisted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileRow {
    pub file_id: u64,
    pub folder_id: u64,
    /// Portable path
    pub path: String,
    #[serde(default)]
    pub width: u32,
    #[serde(default)]
    pub height: u32,
    #[serde(default)]
    pub hash: String,
    #[serde(default)]
    pub mime_type: String,
    #[serde(default)]
    pub original_size: u64,
    #[serde(default)]
    pub optimized_size: Option<u64>,
    #[serde(default)]
    pub optimization_level: Option<u8>,
    #[serde(default)]
    pub status: Option<FileStatus>,
    #[serde(default)]
    pub error: Option<String>,
}

/// Fields of a file row to insert
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewFile {
    pub folder_id: u64,
    pub path: String,
    pub width: u32,
    pub height: u32,
    pub hash: String,
    pub mime_type: String,
    pub original_size: u64,
}

/// Partial update of a file row; `None` leaves the field untouched
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileUpdate {
    pub folder_id: Option<u64>,
    pub optimization_level: Option<Option<u8>>,
    pub status: Option<Option<FileStatus>>,
    pub optimized_size: Option<Option<u64>>,
    pub error: Option<Option<String>>,
}

impl FileUpdate {
    pub fn move_to_folder(folder_id: u64) -> Self {
        Self {
            folder_id: Some(folder_id),
            ..Default::default()
        }
    }

    /// Record the result of an optimization attempt
    pub fn optimized(level: u8, status: FileStatus) -> Self {
        Self {
            optimization_level: Some(Some(level)),
            status: Some(Some(status)),
            ..Default::default()
        }
    }
}

/// Persisted inventory of folders and files
#[async_trait]
pub trait InventoryStore: Send + Sync {
    /// Files whose `folder_id` is one of `ids`, ordered by folder then file id
    async fn select_by_folder_ids(&self, ids: &[u64]) -> Result<Vec<FileRow>>;

    /// Files whose portable path is one of `paths`, in any folder
    async fn select_by_portable_paths(&self, paths: &[String]) -> Result<Vec<FileRow>>;

    /// Insert a file unless `(folder_id, path)` already exists; returns the row id either way
    async fn insert(&self, file: NewFile) -> Result<u64>;

    /// Insert a batch with one outcome per file, in input order.
    /// Stores that persist on every write should override this to write once.
    async fn insert_many(&self, files: Vec<NewFile>) -> Vec<Result<u64>> {
        let mut results = Vec::with_capacity(files.len());
        for file in files {
            results.push(self.insert(file).await);
        }
        results
    }

    /// Apply `fields` to a row; `false` when no such row exists
    async fn update(&self, file_id: u64, fields: FileUpdate) -> Result<bool>;

    /// All folder rows, ordered by id
    async fn select_folders(&self) -> Result<Vec<FolderRow>>;

    /// Insert a folder unless the portable path is already registered; returns its id
    async fn insert_folder(&self, path: String, active: bool) -> Result<u64>;
}
