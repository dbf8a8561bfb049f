//! # File Reconciler
//!
//! Orchestratore che unisce lo scan del filesystem con l'inventario persistito.
//!
//! ## Flusso di esecuzione:
//! 1. **Scan**: ogni folder viene scansionato; un folder illeggibile viene saltato.
//!    Un file appartiene al folder registrato più profondo che lo contiene, anche se
//!    quel folder non fa parte della chiamata (in quel caso il file viene lasciato a lui).
//! 2. **Inventario**: lettura delle righe dei folder richiesti
//! 3. **Primo merge**: le righe che corrispondono a un file scansionato lo tolgono dai
//!    "pending"; si applicano esistenza ed eleggibilità
//! 4. **Riparazione spostamenti**: i pending rimasti vengono cercati per path in tutto
//!    l'inventario; le righe trovate vengono spostate nel folder giusto
//! 5. **Inserimento**: quello che resta è nuovo e viene inserito con un'unica `insert_many`
//! 6. **Ordinamento**: `(folder_id, file_id)`, e con un livello richiesto i file
//!    `already_optimized` vanno in fondo
//!
//! ## Error handling:
//! - Nessun errore interrompe la riconciliazione
//! - I fallimenti dello store finiscono in `Reconciliation::warnings`
//! - Se la ricerca globale per path fallisce, l'inserimento viene saltato per non
//!   creare duplicati

use crate::error::InventoryError;
use crate::file_manager::FileManager;
use crate::folders::Folder;
use crate::inventory::{FileRow, FileStatus, FileUpdate, InventoryStore, NewFile};
use crate::progress::ReconcileStats;
use crate::reconciler::eligibility::Eligibility;
use crate::site::Site;
use serde::Serialize;
use std::collections::btree_map::Entry;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// A file to act on, as handed to the bulk-processing caller
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FileRecord {
    pub file_id: u64,
    pub folder_id: u64,
    /// Portable path
    pub path: String,
    pub optimization_level: Option<u8>,
    pub status: Option<FileStatus>,
    pub absolute_path: PathBuf,
}

impl FileRecord {
    fn from_row(row: &FileRow, folder_id: u64, absolute_path: PathBuf) -> Self {
        Self {
            file_id: row.file_id,
            folder_id,
            path: row.path.clone(),
            optimization_level: row.optimization_level,
            status: row.status,
            absolute_path,
        }
    }
}

/// Outcome of one reconciliation call
#[derive(Debug, Default)]
pub struct Reconciliation {
    pub files: Vec<FileRecord>,
    pub stats: ReconcileStats,
    /// Store failures; when present the file list may be incomplete
    pub warnings: Vec<InventoryError>,
}

impl Reconciliation {
    pub fn is_complete(&self) -> bool {
        !self.warnings.iter().any(InventoryError::is_store_failure)
    }
}

/// Scanned files not yet matched to a row: absolute path -> scanning folder id
type Pending = BTreeMap<PathBuf, u64>;

/// Mutable state of one call
struct MergeState {
    level: Option<u8>,
    results: BTreeMap<(u64, u64), FileRecord>,
    claimed: HashSet<PathBuf>,
    stats: ReconcileStats,
    warnings: Vec<InventoryError>,
}

impl MergeState {
    fn new(level: Option<u8>) -> Self {
        Self {
            level,
            results: BTreeMap::new(),
            claimed: HashSet::new(),
            stats: ReconcileStats::new(),
            warnings: Vec::new(),
        }
    }

    fn store_failure(&mut self, context: &str, e: InventoryError) {
        warn!("{}: {}", context, e);
        let e = match e {
            InventoryError::StoreQueryFailed(_) => e,
            other => InventoryError::StoreQueryFailed(format!("{}: {}", context, other)),
        };
        self.warnings.push(e);
    }

    fn finish(self) -> Reconciliation {
        let mut files: Vec<FileRecord> = self.results.into_values().collect();

        if self.level.is_some() {
            let (mut head, tail): (Vec<_>, Vec<_>) = files
                .into_iter()
                .partition(|f| f.status != Some(FileStatus::AlreadyOptimized));
            head.extend(tail);
            files = head;
        }

        Reconciliation {
            files,
            stats: self.stats,
            warnings: self.warnings,
        }
    }
}

/// Reconciles scanned folders against the inventory
pub struct FileReconciler<'a, S: InventoryStore + ?Sized> {
    site: &'a Site,
    store: &'a S,
}

impl<'a, S: InventoryStore + ?Sized> FileReconciler<'a, S> {
    pub fn new(site: &'a Site, store: &'a S) -> Self {
        Self { site, store }
    }

    /// Produce the ordered, deduplicated list of files to act on.
    /// With `optimization_level`, only files eligible for that level are returned.
    pub async fn reconcile_files(
        &self,
        folders: &BTreeMap<u64, Folder>,
        optimization_level: Option<u8>,
    ) -> Reconciliation {
        let mut state = MergeState::new(optimization_level);
        if folders.is_empty() {
            return state.finish();
        }

        let mut pending = self.scan_folders(folders, &mut state.stats);
        let released = self.release_nested(folders, &mut pending, &mut state).await;

        self.merge_known(folders, &mut pending, &released, &mut state).await;

        if self.repair_relocations(&mut pending, &mut state).await {
            self.insert_new(pending, &mut state).await;
        } else {
            state.stats.insertion_skipped = pending.len();
        }

        info!("Reconciled {} folders: {}", folders.len(), state.stats.format_summary());
        state.finish()
    }

    fn scan_folders(&self, folders: &BTreeMap<u64, Folder>, stats: &mut ReconcileStats) -> Pending {
        let scanner = self.site.scanner();
        let mut pending = Pending::new();

        for (folder_id, folder) in folders {
            let files = match scanner.scan(&folder.absolute_path) {
                Ok(files) => files,
                Err(e) => {
                    warn!("Skipping folder {}: {}", folder_id, e);
                    stats.folders_unreadable += 1;
                    continue;
                }
            };
            stats.folders_scanned += 1;
            debug!("Folder {} ({}): {} files", folder_id, folder.absolute_path.display(), files.len());

            let depth = folder.absolute_path.components().count();
            for file in files {
                match pending.entry(file) {
                    Entry::Vacant(slot) => {
                        slot.insert(*folder_id);
                    }
                    Entry::Occupied(mut slot) => {
                        let current_depth = folders
                            .get(slot.get())
                            .map(|f| f.absolute_path.components().count())
                            .unwrap_or(0);
                        if depth > current_depth {
                            slot.insert(*folder_id);
                        }
                    }
                }
            }
        }

        stats.files_scanned = pending.len();
        pending
    }

    /// Drop scanned files owned by a deeper registered folder than the one that scanned them.
    /// Returns those files with the id of the folder that owns them.
    async fn release_nested(
        &self,
        folders: &BTreeMap<u64, Folder>,
        pending: &mut Pending,
        state: &mut MergeState,
    ) -> HashMap<PathBuf, u64> {
        let mut released = HashMap::new();
        if pending.is_empty() {
            return released;
        }

        let registered: Vec<(u64, PathBuf)> = match self.store.select_folders().await {
            Ok(rows) => rows
                .into_iter()
                .filter_map(|row| self.site.codec.decode(&row.path).ok().map(|p| (row.folder_id, p)))
                .collect(),
            Err(e) => {
                state.store_failure("Reading registered folders failed", e);
                return released;
            }
        };

        pending.retain(|path, owner| {
            let owner = *owner;
            let owner_depth = folders
                .get(&owner)
                .map(|f| f.absolute_path.components().count())
                .unwrap_or(0);
            let deepest = registered
                .iter()
                .filter(|(_, root)| path.starts_with(root))
                .max_by_key(|(_, root)| root.components().count());

            match deepest {
                Some((id, root)) if *id != owner && root.components().count() > owner_depth => {
                    debug!("{} belongs to nested folder {}", path.display(), id);
                    released.insert(path.clone(), *id);
                    false
                }
                _ => true,
            }
        });

        state.stats.out_of_scope += released.len();
        released
    }

    async fn merge_known(
        &self,
        folders: &BTreeMap<u64, Folder>,
        pending: &mut Pending,
        released: &HashMap<PathBuf, u64>,
        state: &mut MergeState,
    ) {
        let ids: Vec<u64> = folders.keys().copied().collect();
        let rows = match self.store.select_by_folder_ids(&ids).await {
            Ok(rows) => rows,
            Err(e) => {
                state.store_failure("Reading folder inventory failed", e);
                return;
            }
        };

        for row in rows {
            let absolute_path = match self.site.codec.decode(&row.path) {
                Ok(path) => path,
                Err(e) => {
                    debug!("Orphaned file {}: {}", row.file_id, e);
                    state.stats.orphaned += 1;
                    continue;
                }
            };

            match pending.get(&absolute_path).copied() {
                Some(owner) if owner == row.folder_id => {
                    pending.remove(&absolute_path);
                }
                Some(owner) => {
                    debug!(
                        "File {} recorded under folder {} but found in folder {}",
                        row.file_id, row.folder_id, owner
                    );
                    continue;
                }
                None if released.get(&absolute_path).map_or(false, |owner| *owner != row.folder_id) => {
                    debug!("File {} is left to its nested folder", row.file_id);
                    continue;
                }
                None => {
                    let inside = folders
                        .get(&row.folder_id)
                        .map(|f| absolute_path.starts_with(&f.absolute_path))
                        .unwrap_or(false);
                    if !inside || self.site.policy.is_forbidden(&absolute_path) {
                        debug!("Orphaned file {}: {}", row.file_id, absolute_path.display());
                        state.stats.orphaned += 1;
                        continue;
                    }
                }
            }

            self.consider(state, &row, row.folder_id, absolute_path);
        }
    }

    /// Returns false when the global path lookup failed
    async fn repair_relocations(&self, pending: &mut Pending, state: &mut MergeState) -> bool {
        if pending.is_empty() {
            return true;
        }

        let mut by_portable: HashMap<String, (PathBuf, u64)> = HashMap::new();
        let mut unencodable = Vec::new();
        for (path, folder_id) in pending.iter() {
            match self.site.codec.encode(path) {
                Ok(portable) => {
                    by_portable.insert(portable, (path.clone(), *folder_id));
                }
                Err(e) => {
                    debug!("{}", e);
                    unencodable.push(path.clone());
                }
            }
        }
        state.stats.not_encodable += unencodable.len();
        for path in unencodable {
            pending.remove(&path);
        }

        let portables: Vec<String> = by_portable.keys().cloned().collect();
        let rows = match self.store.select_by_portable_paths(&portables).await {
            Ok(rows) => rows,
            Err(e) => {
                state.store_failure("Looking up scanned files by path failed", e);
                return false;
            }
        };

        for row in rows {
            let Some((absolute_path, scanned_in)) = by_portable.get(&row.path).cloned() else {
                continue;
            };
            if pending.remove(&absolute_path).is_none() {
                warn!("Duplicate inventory row {} for {}", row.file_id, absolute_path.display());
                state.stats.duplicates += 1;
                continue;
            }

            if row.folder_id != scanned_in {
                match self.store.update(row.file_id, FileUpdate::move_to_folder(scanned_in)).await {
                    Ok(true) => {
                        info!(
                            "Moved file {} from folder {} to folder {}",
                            row.file_id, row.folder_id, scanned_in
                        );
                        state.stats.relocated += 1;
                    }
                    Ok(false) => {
                        // Row vanished in between: treat the file as new
                        pending.insert(absolute_path, scanned_in);
                        continue;
                    }
                    Err(e) => {
                        state.store_failure("Correcting folder id failed", e);
                        continue;
                    }
                }
            }

            self.consider(state, &row, scanned_in, absolute_path);
        }

        true
    }

    async fn insert_new(&self, pending: Pending, state: &mut MergeState) {
        let mut batch = Vec::with_capacity(pending.len());
        let mut located = Vec::with_capacity(pending.len());

        for (absolute_path, folder_id) in pending {
            let portable = match self.site.codec.encode(&absolute_path) {
                Ok(portable) => portable,
                Err(e) => {
                    debug!("{}", e);
                    state.stats.not_encodable += 1;
                    continue;
                }
            };

            let metadata = match FileManager::file_metadata(&absolute_path).await {
                Ok(metadata) => metadata,
                Err(e) => {
                    self.insert_failed(state, &absolute_path, e);
                    continue;
                }
            };

            batch.push(NewFile {
                folder_id,
                path: portable.clone(),
                width: metadata.width,
                height: metadata.height,
                hash: metadata.hash,
                mime_type: metadata.mime_type,
                original_size: metadata.original_size,
            });
            located.push((absolute_path, folder_id, portable));
        }

        if batch.is_empty() {
            return;
        }

        let mut outcomes = self.store.insert_many(batch).await.into_iter();
        for (absolute_path, folder_id, portable) in located {
            match outcomes.next() {
                Some(Ok(file_id)) => {
                    debug!("New file {} in folder {}: {}", file_id, folder_id, absolute_path.display());
                    state.stats.inserted += 1;
                    state.claimed.insert(absolute_path.clone());
                    state.results.insert(
                        (folder_id, file_id),
                        FileRecord {
                            file_id,
                            folder_id,
                            path: portable,
                            optimization_level: None,
                            status: None,
                            absolute_path,
                        },
                    );
                }
                Some(Err(e)) => self.insert_failed(state, &absolute_path, e),
                None => self.insert_failed(
                    state,
                    &absolute_path,
                    InventoryError::StoreQueryFailed("no outcome returned for insert".to_string()),
                ),
            }
        }
    }

    fn insert_failed(&self, state: &mut MergeState, path: &Path, e: InventoryError) {
        let e = match e {
            InventoryError::InsertFailed { .. } => e,
            other => InventoryError::InsertFailed {
                path: path.to_path_buf(),
                reason: other.to_string(),
            },
        };
        warn!("{}", e);
        state.stats.insert_failed += 1;
    }

    /// Existence, uniqueness and eligibility checks for a known row
    fn consider(&self, state: &mut MergeState, row: &FileRow, folder_id: u64, absolute_path: PathBuf) {
        if !absolute_path.is_file() {
            debug!("Stale file {}: {}", row.file_id, absolute_path.display());
            state.stats.stale += 1;
            return;
        }

        if !state.claimed.insert(absolute_path.clone()) {
            warn!("Duplicate inventory row {} for {}", row.file_id, absolute_path.display());
            state.stats.duplicates += 1;
            return;
        }

        if let Some(level) = state.level {
            let verdict = Eligibility::evaluate(row.status, row.optimization_level, level, || {
                self.site.backups.has_backup(&absolute_path)
            });
            if !verdict.is_eligible() {
                debug!("File {} not eligible for level {}: {:?}", row.file_id, level, verdict);
                state.stats.ineligible += 1;
                return;
            }
        }

        state.stats.known += 1;
        state
            .results
            .insert((folder_id, row.file_id), FileRecord::from_row(row, folder_id, absolute_path));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::folders::{ActiveFilter, FolderRegistry, FolderType};
    use crate::inventory::{FolderRow, MemoryInventoryStore};
    use crate::error::Result;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicBool, Ordering};
    use tempfile::TempDir;

    struct Fixture {
        dir: TempDir,
        site: Site,
        store: MemoryInventoryStore,
        registry: FolderRegistry,
    }

    impl Fixture {
        fn new() -> Self {
            let dir = TempDir::new().unwrap();
            let site = Site::from_config(&Config::for_install_root(dir.path())).unwrap();
            let registry = FolderRegistry::new(&site);
            Self {
                dir,
                site,
                store: MemoryInventoryStore::new(),
                registry,
            }
        }

        fn path(&self, rel: &str) -> PathBuf {
            self.dir.path().join(rel)
        }

        fn write(&self, rel: &str) -> PathBuf {
            let path = self.path(rel);
            std::fs::create_dir_all(path.parent().unwrap()).unwrap();
            std::fs::write(&path, b"\xff\xd8\xff fake jpeg").unwrap();
            path
        }

        async fn folder(&self, rel: &str) -> u64 {
            std::fs::create_dir_all(self.path(rel)).unwrap();
            self.registry
                .register_folder(&self.site, &self.store, &self.path(rel), true)
                .await
                .unwrap()
        }

        async fn folders(&self) -> BTreeMap<u64, Folder> {
            self.registry
                .resolve_folders(&self.site, &self.store, &FolderType::CustomFolders, ActiveFilter::All)
                .await
                .unwrap()
        }

        /// Track an existing file under `folder_id` with a prior optimization result
        async fn known(&self, folder_id: u64, rel: &str, level: Option<u8>, status: Option<FileStatus>) -> u64 {
            let portable = self.site.codec.encode(&self.path(rel)).unwrap();
            let file_id = self
                .store
                .insert(NewFile {
                    folder_id,
                    path: portable,
                    width: 0,
                    height: 0,
                    hash: String::new(),
                    mime_type: "image/jpeg".to_string(),
                    original_size: 0,
                })
                .await
                .unwrap();
            self.store
                .update(
                    file_id,
                    FileUpdate {
                        optimization_level: Some(level),
                        status: Some(status),
                        ..Default::default()
                    },
                )
                .await
                .unwrap();
            file_id
        }

        async fn reconcile(&self, level: Option<u8>) -> Reconciliation {
            let folders = self.folders().await;
            FileReconciler::new(&self.site, &self.store)
                .reconcile_files(&folders, level)
                .await
        }

        fn backup(&self, rel: &str) {
            let backup = self.site.backups.backup_path(&self.path(rel)).unwrap();
            std::fs::create_dir_all(backup.parent().unwrap()).unwrap();
            std::fs::write(backup, b"original").unwrap();
        }
    }

    fn ids(result: &Reconciliation) -> Vec<u64> {
        result.files.iter().map(|f| f.file_id).collect()
    }

    #[tokio::test]
    async fn test_new_file_is_inserted_with_metadata() {
        let fx = Fixture::new();
        let folder_id = fx.folder("gallery").await;
        let path = fx.path("gallery/pixel.png");
        image::RgbImage::new(5, 2).save(&path).unwrap();

        let result = fx.reconcile(None).await;

        assert_eq!(result.files.len(), 1);
        let record = &result.files[0];
        assert_eq!(record.folder_id, folder_id);
        assert_eq!(record.path, "{{ABSPATH}}/gallery/pixel.png");
        assert_eq!(record.absolute_path, path);
        assert_eq!(record.optimization_level, None);
        assert_eq!(record.status, None);
        assert_eq!(result.stats.inserted, 1);
        assert!(result.is_complete());

        let rows = fx.store.select_by_folder_ids(&[folder_id]).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].mime_type, "image/png");
        assert_eq!(rows[0].original_size, std::fs::metadata(&path).unwrap().len());
        assert_eq!((rows[0].width, rows[0].height), (5, 2));
    }

    #[tokio::test]
    async fn test_repeated_calls_never_duplicate() {
        let fx = Fixture::new();
        fx.folder("gallery").await;
        fx.write("gallery/a.jpg");
        fx.write("gallery/sub/b.jpg");

        let first = fx.reconcile(None).await;
        let second = fx.reconcile(None).await;
        let third = fx.reconcile(Some(1)).await;

        assert_eq!(ids(&first), ids(&second));
        assert_eq!(ids(&first), ids(&third));
        assert_eq!(second.stats.inserted, 0);
        assert_eq!(second.stats.known, 2);
        assert_eq!(fx.store.snapshot().await.file_count(), 2);

        let paths: HashSet<&PathBuf> = second.files.iter().map(|f| &f.absolute_path).collect();
        assert_eq!(paths.len(), second.files.len());
    }

    #[tokio::test]
    async fn test_relocation_preserves_history() {
        let fx = Fixture::new();
        let folder_a = fx.folder("gallery-a").await;
        let folder_b = fx.folder("gallery-b").await;
        fx.write("gallery-b/moved.jpg");
        let file_id = fx.known(folder_a, "gallery-b/moved.jpg", Some(2), Some(FileStatus::Success)).await;

        let result = fx.reconcile(None).await;

        assert_eq!(result.files.len(), 1);
        let record = &result.files[0];
        assert_eq!(record.file_id, file_id);
        assert_eq!(record.folder_id, folder_b);
        assert_eq!(record.status, Some(FileStatus::Success));
        assert_eq!(record.optimization_level, Some(2));
        assert_eq!(result.stats.relocated, 1);
        assert_eq!(result.stats.inserted, 0);

        assert!(fx.store.select_by_folder_ids(&[folder_a]).await.unwrap().is_empty());
        let rows = fx.store.select_by_folder_ids(&[folder_b]).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].file_id, file_id);
    }

    #[tokio::test]
    async fn test_relocation_reaches_folders_outside_the_call() {
        let fx = Fixture::new();
        let folder_a = fx.folder("gallery-a").await;
        let folder_b = fx.folder("gallery-b").await;
        fx.write("gallery-b/moved.jpg");
        let file_id = fx.known(folder_a, "gallery-b/moved.jpg", Some(1), Some(FileStatus::Success)).await;

        let only_b: BTreeMap<u64, Folder> = fx
            .folders()
            .await
            .into_iter()
            .filter(|(id, _)| *id == folder_b)
            .collect();

        // Ineligible at level 1, but the folder id is corrected anyway
        let result = FileReconciler::new(&fx.site, &fx.store)
            .reconcile_files(&only_b, Some(1))
            .await;
        assert!(result.files.is_empty());
        assert_eq!(result.stats.ineligible, 1);

        let rows = fx.store.select_by_folder_ids(&[folder_b]).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].file_id, file_id);
        assert_eq!(rows[0].optimization_level, Some(1));
    }

    #[tokio::test]
    async fn test_eligibility_table() {
        let fx = Fixture::new();
        let folder = fx.folder("gallery").await;
        for name in ["error.jpg", "same.jpg", "max.jpg", "other.jpg"] {
            fx.write(&format!("gallery/{}", name));
        }
        let error = fx.known(folder, "gallery/error.jpg", Some(1), Some(FileStatus::Error)).await;
        fx.known(folder, "gallery/same.jpg", Some(2), Some(FileStatus::Success)).await;
        fx.known(folder, "gallery/max.jpg", Some(3), Some(FileStatus::AlreadyOptimized)).await;
        let other = fx.known(folder, "gallery/other.jpg", Some(1), Some(FileStatus::Success)).await;

        let result = fx.reconcile(Some(2)).await;
        assert_eq!(ids(&result), vec![error]);
        assert_eq!(result.stats.ineligible, 3);

        fx.backup("gallery/other.jpg");
        let result = fx.reconcile(Some(2)).await;
        assert_eq!(ids(&result), vec![error, other]);

        // Ineligible rows stay untouched in storage
        assert_eq!(fx.store.select_by_folder_ids(&[folder]).await.unwrap().len(), 4);
    }

    #[tokio::test]
    async fn test_already_optimized_moved_last() {
        let fx = Fixture::new();
        let folder = fx.folder("gallery").await;
        for name in ["a.jpg", "b.jpg", "c.jpg"] {
            fx.write(&format!("gallery/{}", name));
        }
        let a = fx.known(folder, "gallery/a.jpg", Some(1), Some(FileStatus::AlreadyOptimized)).await;
        let b = fx.known(folder, "gallery/b.jpg", None, None).await;
        let c = fx.known(folder, "gallery/c.jpg", Some(0), Some(FileStatus::Error)).await;

        let result = fx.reconcile(Some(2)).await;
        assert_eq!(ids(&result), vec![b, c, a]);

        let result = fx.reconcile(None).await;
        assert_eq!(ids(&result), vec![a, b, c]);
    }

    #[tokio::test]
    async fn test_stale_rows_are_not_returned() {
        let fx = Fixture::new();
        let folder = fx.folder("gallery").await;
        fx.write("gallery/kept.jpg");
        let kept = fx.known(folder, "gallery/kept.jpg", None, None).await;
        fx.known(folder, "gallery/deleted.jpg", None, None).await;

        let result = fx.reconcile(None).await;
        assert_eq!(ids(&result), vec![kept]);
        assert_eq!(result.stats.stale, 1);
        assert_eq!(fx.store.snapshot().await.file_count(), 2);
    }

    #[tokio::test]
    async fn test_unreadable_folder_does_not_block_batch() {
        let fx = Fixture::new();
        fx.folder("gallery").await;
        fx.folder("doomed").await;
        fx.write("gallery/a.jpg");
        let folders = fx.folders().await;
        std::fs::remove_dir_all(fx.path("doomed")).unwrap();

        let result = FileReconciler::new(&fx.site, &fx.store)
            .reconcile_files(&folders, None)
            .await;
        assert_eq!(result.files.len(), 1);
        assert_eq!(result.stats.folders_unreadable, 1);
        assert_eq!(result.stats.folders_scanned, 1);
        assert!(result.is_complete());
    }

    #[tokio::test]
    async fn test_nested_folders_attribute_to_deepest() {
        let fx = Fixture::new();
        let outer = fx.folder("gallery").await;
        let inner = fx.folder("gallery/sub").await;
        fx.write("gallery/top.jpg");
        fx.write("gallery/sub/deep.jpg");

        let first = fx.reconcile(None).await;
        let second = fx.reconcile(None).await;

        let placement: Vec<(u64, &str)> = second
            .files
            .iter()
            .map(|f| (f.folder_id, f.path.as_str()))
            .collect();
        assert_eq!(
            placement,
            vec![(outer, "{{ABSPATH}}/gallery/top.jpg"), (inner, "{{ABSPATH}}/gallery/sub/deep.jpg")]
        );
        assert_eq!(ids(&first), ids(&second));
        assert_eq!(second.stats.relocated, 0);
        assert_eq!(fx.store.snapshot().await.file_count(), 2);
    }

    #[tokio::test]
    async fn test_empty_folder_set() {
        let fx = Fixture::new();
        let result = FileReconciler::new(&fx.site, &fx.store)
            .reconcile_files(&BTreeMap::new(), Some(1))
            .await;
        assert!(result.files.is_empty());
        assert_eq!(result.stats, ReconcileStats::default());
    }

    /// Store whose reads can be made to fail
    #[derive(Default)]
    struct FlakyStore {
        inner: MemoryInventoryStore,
        fail_by_folder: AtomicBool,
        fail_by_path: AtomicBool,
        fail_insert: AtomicBool,
        fail_update: AtomicBool,
    }

    #[async_trait]
    impl InventoryStore for FlakyStore {
        async fn select_by_folder_ids(&self, ids: &[u64]) -> Result<Vec<FileRow>> {
            if self.fail_by_folder.load(Ordering::SeqCst) {
                return Err(InventoryError::StoreQueryFailed("connection reset".to_string()));
            }
            self.inner.select_by_folder_ids(ids).await
        }

        async fn select_by_portable_paths(&self, paths: &[String]) -> Result<Vec<FileRow>> {
            if self.fail_by_path.load(Ordering::SeqCst) {
                return Err(InventoryError::StoreQueryFailed("timeout".to_string()));
            }
            self.inner.select_by_portable_paths(paths).await
        }

        async fn insert(&self, file: NewFile) -> Result<u64> {
            if self.fail_insert.load(Ordering::SeqCst) {
                return Err(InventoryError::InsertFailed {
                    path: PathBuf::from(file.path),
                    reason: "disk full".to_string(),
                });
            }
            self.inner.insert(file).await
        }

        async fn update(&self, file_id: u64, fields: FileUpdate) -> Result<bool> {
            if self.fail_update.load(Ordering::SeqCst) {
                return Err(InventoryError::StoreQueryFailed("lock wait timeout".to_string()));
            }
            self.inner.update(file_id, fields).await
        }

        async fn select_folders(&self) -> Result<Vec<FolderRow>> {
            self.inner.select_folders().await
        }

        async fn insert_folder(&self, path: String, active: bool) -> Result<u64> {
            self.inner.insert_folder(path, active).await
        }
    }

    #[tokio::test]
    async fn test_store_failures_are_reported_without_duplicates() {
        let fx = Fixture::new();
        std::fs::create_dir_all(fx.path("gallery")).unwrap();
        fx.write("gallery/a.jpg");
        fx.write("gallery/b.jpg");

        let store = FlakyStore::default();
        let folder_id = fx
            .registry
            .register_folder(&fx.site, &store, &fx.path("gallery"), true)
            .await
            .unwrap();
        let folders = fx
            .registry
            .resolve_folders(&fx.site, &store, &FolderType::CustomFolders, ActiveFilter::All)
            .await
            .unwrap();
        let reconciler = FileReconciler::new(&fx.site, &store);

        let seeded = reconciler.reconcile_files(&folders, None).await;
        assert_eq!(seeded.files.len(), 2);

        // Folder query down: the path lookup still finds both rows
        store.fail_by_folder.store(true, Ordering::SeqCst);
        let result = reconciler.reconcile_files(&folders, None).await;
        assert!(!result.is_complete());
        assert_eq!(ids(&result), ids(&seeded));
        assert_eq!(store.inner.select_by_folder_ids(&[folder_id]).await.unwrap().len(), 2);

        // Both queries down: nothing gets inserted
        fx.write("gallery/c.jpg");
        store.fail_by_path.store(true, Ordering::SeqCst);
        let result = reconciler.reconcile_files(&folders, None).await;
        assert!(result.files.is_empty());
        assert_eq!(result.warnings.len(), 2);
        assert_eq!(result.stats.insertion_skipped, 3);
        assert_eq!(store.inner.select_by_folder_ids(&[folder_id]).await.unwrap().len(), 2);
    }

    /// Register `rels` as active folders in `store` and resolve them
    async fn flaky_folders(fx: &Fixture, store: &FlakyStore, rels: &[&str]) -> (Vec<u64>, BTreeMap<u64, Folder>) {
        let mut ids = Vec::new();
        for rel in rels {
            std::fs::create_dir_all(fx.path(rel)).unwrap();
            ids.push(
                fx.registry
                    .register_folder(&fx.site, store, &fx.path(rel), true)
                    .await
                    .unwrap(),
            );
        }
        let folders = fx
            .registry
            .resolve_folders(&fx.site, store, &FolderType::CustomFolders, ActiveFilter::All)
            .await
            .unwrap();
        (ids, folders)
    }

    #[tokio::test]
    async fn test_insert_failure_omits_file_and_continues() {
        let fx = Fixture::new();
        let store = FlakyStore::default();
        let (_, folders) = flaky_folders(&fx, &store, &["gallery"]).await;
        fx.write("gallery/a.jpg");
        let reconciler = FileReconciler::new(&fx.site, &store);

        let seeded = reconciler.reconcile_files(&folders, None).await;
        assert_eq!(seeded.files.len(), 1);

        fx.write("gallery/b.jpg");
        store.fail_insert.store(true, Ordering::SeqCst);
        let result = reconciler.reconcile_files(&folders, None).await;
        assert_eq!(ids(&result), ids(&seeded));
        assert_eq!(result.stats.insert_failed, 1);
        assert_eq!(result.stats.inserted, 0);
        assert!(result.is_complete());
        assert_eq!(store.inner.snapshot().await.file_count(), 1);

        store.fail_insert.store(false, Ordering::SeqCst);
        let result = reconciler.reconcile_files(&folders, None).await;
        assert_eq!(result.files.len(), 2);
        assert_eq!(result.stats.inserted, 1);
    }

    #[tokio::test]
    async fn test_failed_folder_correction_is_reported() {
        let fx = Fixture::new();
        let store = FlakyStore::default();
        let (ids_ab, folders) = flaky_folders(&fx, &store, &["gallery-a", "gallery-b"]).await;
        let (folder_a, folder_b) = (ids_ab[0], ids_ab[1]);
        fx.write("gallery-b/moved.jpg");
        let file_id = store
            .inner
            .insert(NewFile {
                folder_id: folder_a,
                path: fx.site.codec.encode(&fx.path("gallery-b/moved.jpg")).unwrap(),
                width: 0,
                height: 0,
                hash: String::new(),
                mime_type: "image/jpeg".to_string(),
                original_size: 0,
            })
            .await
            .unwrap();
        let reconciler = FileReconciler::new(&fx.site, &store);

        store.fail_update.store(true, Ordering::SeqCst);
        let result = reconciler.reconcile_files(&folders, None).await;
        assert!(result.files.is_empty());
        assert!(!result.is_complete());
        assert_eq!(result.warnings.len(), 1);
        assert_eq!(result.stats.relocated, 0);
        assert_eq!(result.stats.inserted, 0);
        assert_eq!(store.inner.select_by_folder_ids(&[folder_a]).await.unwrap().len(), 1);
        assert_eq!(store.inner.snapshot().await.file_count(), 1);

        store.fail_update.store(false, Ordering::SeqCst);
        let result = reconciler.reconcile_files(&folders, None).await;
        assert_eq!(ids(&result), vec![file_id]);
        assert_eq!(result.files[0].folder_id, folder_b);
        assert_eq!(result.stats.relocated, 1);
    }

    #[tokio::test]
    async fn test_duplicate_rows_yield_one_record() {
        let fx = Fixture::new();
        let folder_a = fx.folder("gallery-a").await;
        let folder_b = fx.folder("gallery-b").await;
        let folder_c = fx.folder("gallery-c").await;
        fx.write("gallery-b/x.jpg");
        let first = fx.known(folder_a, "gallery-b/x.jpg", Some(1), Some(FileStatus::Success)).await;
        let second = fx.known(folder_c, "gallery-b/x.jpg", None, None).await;

        let result = fx.reconcile(None).await;
        assert_eq!(ids(&result), vec![first]);
        assert_eq!(result.files[0].folder_id, folder_b);
        assert_eq!(result.stats.duplicates, 1);
        assert_eq!(result.stats.relocated, 1);

        // The extra row is left where it was
        let rows = fx.store.select_by_folder_ids(&[folder_c]).await.unwrap();
        assert_eq!(rows.iter().map(|r| r.file_id).collect::<Vec<_>>(), vec![second]);

        let again = fx.reconcile(None).await;
        assert_eq!(ids(&again), vec![first]);
        assert_eq!(fx.store.snapshot().await.file_count(), 2);
    }

    #[tokio::test]
    async fn test_inactive_nested_folder_keeps_its_files() {
        let fx = Fixture::new();
        let outer = fx.folder("gallery").await;
        std::fs::create_dir_all(fx.path("gallery/sub")).unwrap();
        let inner = fx
            .registry
            .register_folder(&fx.site, &fx.store, &fx.path("gallery/sub"), false)
            .await
            .unwrap();
        fx.write("gallery/sub/deep.jpg");
        fx.write("gallery/top.jpg");

        let all = fx.folders().await;
        let only_active = fx
            .registry
            .resolve_folders(&fx.site, &fx.store, &FolderType::CustomFolders, ActiveFilter::OnlyActive)
            .await
            .unwrap();
        assert_eq!(only_active.keys().copied().collect::<Vec<_>>(), vec![outer]);
        let reconciler = FileReconciler::new(&fx.site, &fx.store);

        let active_first = reconciler.reconcile_files(&only_active, None).await;
        assert_eq!(active_first.files.len(), 1);
        assert_eq!(active_first.files[0].folder_id, outer);
        assert_eq!(active_first.stats.out_of_scope, 1);

        let mut deep_id = None;
        for round in 0..4 {
            let scope = if round % 2 == 0 { &all } else { &only_active };
            let result = reconciler.reconcile_files(scope, None).await;
            assert_eq!(result.stats.relocated, 0, "round {}", round);

            let deep: Vec<&FileRecord> = result
                .files
                .iter()
                .filter(|f| f.absolute_path == fx.path("gallery/sub/deep.jpg"))
                .collect();
            if round % 2 == 0 {
                assert_eq!(deep.len(), 1);
                assert_eq!(deep[0].folder_id, inner);
                assert_eq!(*deep_id.get_or_insert(deep[0].file_id), deep[0].file_id);
            } else {
                assert!(deep.is_empty());
            }

            let rows = fx.store.select_by_folder_ids(&[inner]).await.unwrap();
            assert_eq!(rows.len(), 1, "round {}", round);
        }
        assert_eq!(fx.store.snapshot().await.file_count(), 2);
    }
}
