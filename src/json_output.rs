//! # JSON Output Module
//!
//! Output strutturato in JSON per il job che consuma la lista di file (`--json`).
//!
//! ## Responsabilità:
//! - Emette un messaggio JSON per riga su stdout
//! - Riusa `FileRecord` e `ReconcileStats` senza duplicarne i campi
//!
//! ## Tipi di messaggi:
//! - `start`: inizio della riconciliazione (tipo di folder, numero di folder, livello)
//! - `file`: un file da processare, nell'ordine restituito dal reconciler
//! - `complete`: fine con statistiche e durata
//! - `error`: errore o warning dello store

use crate::progress::ReconcileStats;
use crate::reconciler::FileRecord;
use serde::Serialize;

/// Tipo di messaggio JSON
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JsonMessage {
    /// Inizio della riconciliazione
    Start {
        folder_type: String,
        folders: usize,
        optimization_level: Option<u8>,
    },

    /// File da processare
    File(FileRecord),

    /// Riconciliazione completata
    Complete {
        files: usize,
        complete: bool,
        duration_seconds: f64,
        stats: ReconcileStats,
    },

    /// Errore o risultato degradato
    Error {
        message: String,
        details: Option<String>,
    },
}

impl JsonMessage {
    /// Emette il messaggio JSON su stdout
    pub fn emit(&self) {
        if let Ok(json) = serde_json::to_string(self) {
            println!("{}", json);
        }
    }

    pub fn start(folder_type: &str, folders: usize, optimization_level: Option<u8>) -> Self {
        Self::Start {
            folder_type: folder_type.to_string(),
            folders,
            optimization_level,
        }
    }

    pub fn file(record: &FileRecord) -> Self {
        Self::File(record.clone())
    }

    pub fn complete(files: usize, complete: bool, duration_seconds: f64, stats: &ReconcileStats) -> Self {
        Self::Complete {
            files,
            complete,
            duration_seconds,
            stats: stats.clone(),
        }
    }

    pub fn error(message: impl Into<String>, details: Option<String>) -> Self {
        Self::Error {
            message: message.into(),
            details,
        }
    }
}
