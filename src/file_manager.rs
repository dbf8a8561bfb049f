//! # File Management Module
//!
//! Questo modulo gestisce la discovery delle immagini nei folder tracciati.
//!
//! ## Responsabilità:
//! - Scan ricorsivo di un folder con `walkdir`, riavviato da zero a ogni chiamata
//! - Pruning dei sottoalberi proibiti (la policy viene applicata a ogni entry visitata)
//! - Filtro sulle estensioni immagine configurate
//! - Estrazione metadata per i nuovi file (dimensioni, hash, MIME type, peso)
//!
//! ## Errori:
//! - Root mancante o non leggibile: `FolderUnreadable` (distinto da "folder vuoto")
//! - Root proibita: nessun file, nessun errore
//! - Entry non leggibili sotto la root: saltate con un log di debug
//!
//! ## Esempio:
//! ```rust,ignore
//! let scanner = FileScanner::new(&policy, &extensions);
//! for file in scanner.scan(&folder.absolute_path)? {
//!     let meta = FileManager::file_metadata(&file).await?;
//! }
//! ```

use crate::error::{InventoryError, Result};
use crate::forbidden::ForbiddenPathPolicy;
use sha2::{Digest, Sha256};
use std::collections::BTreeSet;
use std::io::Cursor;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;
use walkdir::WalkDir;

/// Walks folders looking for trackable images
pub struct FileScanner<'a> {
    policy: &'a ForbiddenPathPolicy,
    extensions: &'a [String],
}

impl<'a> FileScanner<'a> {
    pub fn new(policy: &'a ForbiddenPathPolicy, extensions: &'a [String]) -> Self {
        Self { policy, extensions }
    }

    /// Find all image files below `folder`
    pub fn scan(&self, folder: &Path) -> Result<BTreeSet<PathBuf>> {
        let mut files = BTreeSet::new();

        if self.policy.is_forbidden(folder) {
            debug!("Folder is forbidden, nothing to scan: {}", folder.display());
            return Ok(files);
        }

        std::fs::read_dir(folder).map_err(|source| InventoryError::FolderUnreadable {
            path: folder.to_path_buf(),
            source,
        })?;

        let policy = self.policy;
        let walker = WalkDir::new(folder)
            .follow_links(true)
            .into_iter()
            .filter_entry(|e| e.depth() == 0 || !policy.is_forbidden(e.path()));

        for entry in walker {
            let entry = match entry {
                Ok(entry) => entry,
                Err(e) => {
                    debug!("Skipping unreadable entry under {}: {}", folder.display(), e);
                    continue;
                }
            };

            if entry.file_type().is_file() && self.is_image(entry.path()) {
                files.insert(entry.into_path());
            }
        }

        Ok(files)
    }

    /// Check if a file has one of the configured image extensions
    pub fn is_image(&self, path: &Path) -> bool {
        if let Some(ext) = path.extension() {
            let ext_lower = ext.to_string_lossy().to_lowercase();
            self.extensions.iter().any(|e| e.eq_ignore_ascii_case(&ext_lower))
        } else {
            false
        }
    }
}

/// Metadata stored with a newly tracked file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMetadata {
    pub width: u32,
    pub height: u32,
    /// SHA-256 of the file content, hex encoded
    pub hash: String,
    pub mime_type: String,
    pub original_size: u64,
}

/// File-level helpers
pub struct FileManager;

impl FileManager {
    /// Read a file once and extract everything the inventory stores about it.
    /// Dimensions fall back to 0x0 when the header can't be parsed.
    pub async fn file_metadata(path: &Path) -> Result<FileMetadata> {
        let bytes = fs::read(path).await?;

        let mut hasher = Sha256::new();
        hasher.update(&bytes);
        let hash = hex::encode(hasher.finalize());

        let (width, height) = Self::dimensions(&bytes).unwrap_or_else(|| {
            debug!("Could not read pixel dimensions of {}", path.display());
            (0, 0)
        });

        Ok(FileMetadata {
            width,
            height,
            hash,
            mime_type: Self::mime_type(path).to_string(),
            original_size: bytes.len() as u64,
        })
    }

    fn dimensions(bytes: &[u8]) -> Option<(u32, u32)> {
        image::io::Reader::new(Cursor::new(bytes))
            .with_guessed_format()
            .ok()?
            .into_dimensions()
            .ok()
    }

    /// MIME type from the file extension
    pub fn mime_type(path: &Path) -> &'static str {
        let ext = path
            .extension()
            .map(|e| e.to_string_lossy().to_lowercase())
            .unwrap_or_default();

        match ext.as_str() {
            "jpg" | "jpeg" | "jpe" => "image/jpeg",
            "png" => "image/png",
            "gif" => "image/gif",
            "webp" => "image/webp",
            _ => "application/octet-stream",
        }
    }
}
