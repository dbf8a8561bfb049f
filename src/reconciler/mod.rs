//! # Reconciler Module
//!
//! Cuore del crate: confronta i file trovati su disco con l'inventario persistito.
//!
//! ## Responsabilità:
//! - `FileReconciler`: scan, merge, riparazione degli spostamenti, inserimento e ordinamento
//! - `Eligibility`: policy che decide se un file noto va riprocessato a un livello
//! - `BackupResolver`: mapping file -> copia di backup dell'originale
//!
//! ## Garanzie:
//! - Ogni file su disco compare al massimo una volta nel risultato
//! - Chiamate ripetute non creano righe duplicate
//! - Un file spostato tra folder conserva la sua storia di ottimizzazione

mod backup_resolver;
mod eligibility;
mod file_reconciler;

pub use backup_resolver::BackupResolver;
pub use eligibility::Eligibility;
pub use file_reconciler::{FileReconciler, FileRecord, Reconciliation};
