//! # Error Types Module
//!
//! Questo modulo definisce tutti i tipi di errore della libreria.
//!
//! ## Responsabilità:
//! - Definisce `InventoryError` per categorizzare gli errori di scan, codifica path e store
//! - Integra con `thiserror` per le conversioni automatiche
//! - Distingue gli errori che degradano un singolo file/folder da quelli da segnalare al chiamante
//!
//! ## Categorie di errori:
//! - `FolderUnreadable`: root di scan mancante o non leggibile (il folder viene saltato)
//! - `PathNotEncodable`: path fuori da tutte le root note (il file viene escluso)
//! - `UnknownPlaceholder`: path salvato con un token sconosciuto (record orfano)
//! - `StoreQueryFailed`: lettura/scrittura inventario fallita (warning visibile al chiamante)
//! - `InsertFailed`: nuovo file non persistito (omesso dal risultato)
//! - `RowDecode`: riga dello store non decodificabile nel tipo atteso
//!
//! ## Esempio:
//! ```rust,ignore
//! let portable = codec.encode(&path)?; // InventoryError::PathNotEncodable se fuori root
//! ```

use std::path::PathBuf;

/// Result alias used across the library
pub type Result<T> = std::result::Result<T, InventoryError>;

/// Custom error types for folder/file reconciliation
#[derive(thiserror::Error, Debug)]
pub enum InventoryError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Folder unreadable: {path}: {source}")]
    FolderUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Path is outside all known roots: {0}")]
    PathNotEncodable(PathBuf),

    #[error("Unknown placeholder in stored path: {0}")]
    UnknownPlaceholder(String),

    #[error("Inventory query failed: {0}")]
    StoreQueryFailed(String),

    #[error("Insert failed for {path}: {reason}")]
    InsertFailed { path: PathBuf, reason: String },

    #[error("Row decode error: {0}")]
    RowDecode(#[from] serde_json::Error),

    #[error("Forbidden path: {0}")]
    ForbiddenPath(PathBuf),

    #[error("Validation error: {0}")]
    Validation(String),
}

impl InventoryError {
    /// Errors that make a reconciliation result possibly incomplete
    pub fn is_store_failure(&self) -> bool {
        matches!(self, Self::StoreQueryFailed(_))
    }
}
