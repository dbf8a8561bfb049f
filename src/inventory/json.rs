//! # JSON Inventory Store
//!
//! Persiste l'inventario in un singolo file JSON.
//!
//! ## Strategia di persistence:
//! - Il file viene letto una volta all'apertura e decodificato in righe tipizzate
//! - Ogni modifica riscrive il file: prima su `<file>.tmp`, poi `rename` atomico
//! - Un file corrotto produce un errore tipizzato, mai un inventario vuoto silenzioso
//!
//! ## Esempio struttura file:
//! ```json
//! {
//!   "folders": { "7": { "folder_id": 7, "path": "{{ABSPATH}}/custom-path/", "active": true } },
//!   "files": {
//!     "2": {
//!       "file_id": 2,
//!       "folder_id": 7,
//!       "path": "{{ABSPATH}}/custom-path/image-1.jpg",
//!       "optimization_level": 2,
//!       "status": "success"
//!     }
//!   },
//!   "next_folder_id": 7,
//!   "next_file_id": 2
//! }
//! ```

use super::{FileRow, FileUpdate, FolderRow, InventoryStore, InventoryTable, NewFile};
use crate::error::{InventoryError, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::sync::Mutex;
use tracing::debug;

/// Inventory persisted to a JSON file
pub struct JsonInventoryStore {
    path: PathBuf,
    table: Mutex<InventoryTable>,
}

impl JsonInventoryStore {
    /// Open (or create on first write) the inventory at `path`
    pub async fn open(path: &Path) -> Result<Self> {
        let table = if path.exists() {
            let content = fs::read_to_string(path).await?;
            InventoryTable::from_json(&content)?
        } else {
            debug!("Inventory file not found, starting empty: {}", path.display());
            InventoryTable::default()
        };

        Ok(Self {
            path: path.to_path_buf(),
            table: Mutex::new(table),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn save(&self, table: &InventoryTable) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let content = table.to_json()?;
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);

        fs::write(&tmp, content).await?;
        fs::rename(&tmp, &self.path).await?;
        Ok(())
    }

    fn query_failed(e: InventoryError) -> InventoryError {
        match e {
            InventoryError::StoreQueryFailed(_) => e,
            other => InventoryError::StoreQueryFailed(other.to_string()),
        }
    }
}

#[async_trait]
impl InventoryStore for JsonInventoryStore {
    async fn select_by_folder_ids(&self, ids: &[u64]) -> Result<Vec<FileRow>> {
        Ok(self.table.lock().await.select_by_folder_ids(ids))
    }

    async fn select_by_portable_paths(&self, paths: &[String]) -> Result<Vec<FileRow>> {
        Ok(self.table.lock().await.select_by_portable_paths(paths))
    }

    async fn insert(&self, file: NewFile) -> Result<u64> {
        let mut table = self.table.lock().await;
        let path = PathBuf::from(&file.path);
        let mut staged = table.clone();
        let file_id = staged.insert(file)?;

        self.save(&staged).await.map_err(|e| InventoryError::InsertFailed {
            path,
            reason: e.to_string(),
        })?;
        *table = staged;
        Ok(file_id)
    }

    async fn insert_many(&self, files: Vec<NewFile>) -> Vec<Result<u64>> {
        let mut table = self.table.lock().await;
        let paths: Vec<PathBuf> = files.iter().map(|f| PathBuf::from(&f.path)).collect();
        let mut staged = table.clone();
        let results: Vec<Result<u64>> = files.into_iter().map(|file| staged.insert(file)).collect();

        if let Err(e) = self.save(&staged).await {
            let reason = e.to_string();
            return results
                .into_iter()
                .zip(paths)
                .map(|(result, path)| {
                    result.and_then(|_| {
                        Err(InventoryError::InsertFailed {
                            path,
                            reason: reason.clone(),
                        })
                    })
                })
                .collect();
        }

        debug!("Saved {} inserted files to {}", results.len(), self.path.display());
        *table = staged;
        results
    }

    async fn update(&self, file_id: u64, fields: FileUpdate) -> Result<bool> {
        let mut table = self.table.lock().await;
        let mut staged = table.clone();
        if !staged.update(file_id, fields) {
            return Ok(false);
        }

        self.save(&staged).await.map_err(Self::query_failed)?;
        *table = staged;
        Ok(true)
    }

    async fn select_folders(&self) -> Result<Vec<FolderRow>> {
        Ok(self.table.lock().await.folders())
    }

    async fn insert_folder(&self, path: String, active: bool) -> Result<u64> {
        let mut table = self.table.lock().await;
        let mut staged = table.clone();
        let folder_id = staged.insert_folder(path, active)?;

        self.save(&staged).await.map_err(Self::query_failed)?;
        *table = staged;
        Ok(folder_id)
    }
}
