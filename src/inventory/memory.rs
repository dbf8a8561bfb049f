use super::{FileRow, FileUpdate, FolderRow, InventoryStore, InventoryTable, NewFile};
use crate::error::Result;
use async_trait::async_trait;
use tokio::sync::Mutex;

/// Volatile store, mostly for tests and dry runs
#[derive(Debug, Default)]
pub struct MemoryInventoryStore {
    table: Mutex<InventoryTable>,
}

impl MemoryInventoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn snapshot(&self) -> InventoryTable {
        self.table.lock().await.clone()
    }
}

#[async_trait]
impl InventoryStore for MemoryInventoryStore {
    async fn select_by_folder_ids(&self, ids: &[u64]) -> Result<Vec<FileRow>> {
        Ok(self.table.lock().await.select_by_folder_ids(ids))
    }

    async fn select_by_portable_paths(&self, paths: &[String]) -> Result<Vec<FileRow>> {
        Ok(self.table.lock().await.select_by_portable_paths(paths))
    }

    async fn insert(&self, file: NewFile) -> Result<u64> {
        self.table.lock().await.insert(file)
    }

    async fn insert_many(&self, files: Vec<NewFile>) -> Vec<Result<u64>> {
        let mut table = self.table.lock().await;
        files.into_iter().map(|file| table.insert(file)).collect()
    }

    async fn update(&self, file_id: u64, fields: FileUpdate) -> Result<bool> {
        Ok(self.table.lock().await.update(file_id, fields))
    }

    async fn select_folders(&self) -> Result<Vec<FolderRow>> {
        Ok(self.table.lock().await.folders())
    }

    async fn insert_folder(&self, path: String, active: bool) -> Result<u64> {
        self.table.lock().await.insert_folder(path, active)
    }
}
