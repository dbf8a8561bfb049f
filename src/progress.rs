//! # Progress Tracking and Statistics Module
//!
//! Questo modulo gestisce il feedback visivo e le statistiche di riconciliazione.
//!
//! ## Componenti principali:
//! - `ProgressManager`: spinner `indicatif` per le operazioni di durata indeterminata (scan)
//! - `ReconcileStats`: contatori di una singola chiamata di riconciliazione
//!
//! ## Statistiche tracciate:
//! - **folders_scanned / folders_unreadable**: folder scansionati o saltati
//! - **files_scanned**: file immagine trovati su disco
//! - **known**: file già presenti nell'inventario e restituiti
//! - **stale / orphaned**: righe senza file su disco o fuori dal proprio folder
//! - **ineligible**: righe escluse dalla policy di eleggibilità
//! - **out_of_scope**: file lasciati a un folder annidato fuori dalla chiamata
//! - **relocated**: righe il cui folder è stato corretto
//! - **inserted / insert_failed**: nuovi file aggiunti o non aggiunti
//! - **not_encodable / duplicates / insertion_skipped**: casi degradati
//!
//! ## Esempio:
//! ```rust,ignore
//! let spinner = ProgressManager::spinner("Scanning folders...");
//! let result = reconciler.reconcile_files(&folders, Some(2)).await;
//! spinner.finish_with_message(result.stats.format_summary());
//! ```

use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::time::Duration;

/// Progress reporting helpers
pub struct ProgressManager;

impl ProgressManager {
    /// Create a spinner for indeterminate progress
    pub fn spinner(message: &str) -> ProgressBar {
        let spinner = ProgressBar::new_spinner();

        spinner.set_style(
            ProgressStyle::default_spinner()
                .template("{spinner:.green} [{elapsed_precise}] {msg}")
                .unwrap_or_else(|_| ProgressStyle::default_spinner()),
        );

        spinner.set_message(message.to_string());
        spinner.enable_steady_tick(Duration::from_millis(100));

        spinner
    }
}

/// Counters for one reconciliation call
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct ReconcileStats {
    pub folders_scanned: usize,
    pub folders_unreadable: usize,
    pub files_scanned: usize,
    pub known: usize,
    pub stale: usize,
    pub orphaned: usize,
    pub ineligible: usize,
    pub out_of_scope: usize,
    pub relocated: usize,
    pub inserted: usize,
    pub insert_failed: usize,
    pub not_encodable: usize,
    pub duplicates: usize,
    pub insertion_skipped: usize,
}

impl ReconcileStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Files handed back to the caller
    pub fn returned(&self) -> usize {
        self.known + self.inserted
    }

    pub fn format_summary(&self) -> String {
        let mut summary = format!(
            "Folders: {} scanned, {} unreadable | Files on disk: {} | Returned: {} ({} known, {} new) | Skipped: {} ineligible, {} stale, {} orphaned, {} nested | Relocated: {}",
            self.folders_scanned,
            self.folders_unreadable,
            self.files_scanned,
            self.returned(),
            self.known,
            self.inserted,
            self.ineligible,
            self.stale,
            self.orphaned,
            self.out_of_scope,
            self.relocated,
        );

        if self.insert_failed + self.not_encodable + self.duplicates + self.insertion_skipped > 0 {
            summary.push_str(&format!(
                " | Degraded: {} insert failures, {} unencodable, {} duplicates, {} not inserted",
                self.insert_failed, self.not_encodable, self.duplicates, self.insertion_skipped
            ));
        }

        summary
    }
}
