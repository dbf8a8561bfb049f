//! # Folder Inventory Library
//!
//! Questo è il modulo principale della libreria che espone tutte le API pubbliche.
//!
//! ## Responsabilità:
//! - Definisce la struttura modulare dell'applicazione
//! - Espone i tipi e le funzioni principali tramite re-exports
//! - Fornisce un'interfaccia pulita per il main.rs e per altri consumatori
//!
//! ## Architettura dei moduli:
//! - `config`: Configurazione del sito e validazione
//! - `error`: Tipi di errore della libreria
//! - `placeholder`: Codec tra path assoluti e path portabili (`{{ABSPATH}}`, ...)
//! - `forbidden`: Policy dei path esclusi da scan e tracking
//! - `file_manager`: Scan ricorsivo dei folder e metadati dei file
//! - `site`: Collaboratori derivati dalla configurazione
//! - `inventory`: Store persistente di folder e file
//! - `folders`: Registry dei folder tracciati per tipo
//! - `reconciler`: Riconciliazione tra filesystem e inventario
//! - `progress` / `json_output`: Statistiche e output della CLI
//!
//! ## Utilizzo:
//! ```rust,ignore
//! use folder_inventory::{ActiveFilter, Config, FileReconciler, FolderRegistry, FolderType, Site};
//!
//! let site = Site::from_config(&config)?;
//! let registry = FolderRegistry::new(&site);
//! let folders = registry
//!     .resolve_folders(&site, &store, &FolderType::CustomFolders, ActiveFilter::OnlyActive)
//!     .await?;
//! let result = FileReconciler::new(&site, &store).reconcile_files(&folders, Some(2)).await;
//! ```

pub mod config;
pub mod error;
pub mod file_manager;
pub mod folders;
pub mod forbidden;
pub mod inventory;
pub mod json_output;
pub mod placeholder;
pub mod progress;
pub mod reconciler;
pub mod site;

pub use config::Config;
pub use error::InventoryError;
pub use folders::{ActiveFilter, Folder, FolderRegistry, FolderType};
pub use inventory::{FileStatus, InventoryStore, JsonInventoryStore, MemoryInventoryStore};
pub use json_output::JsonMessage;
pub use placeholder::PathCodec;
pub use progress::{ProgressManager, ReconcileStats};
pub use reconciler::{FileReconciler, FileRecord, Reconciliation};
pub use site::Site;
