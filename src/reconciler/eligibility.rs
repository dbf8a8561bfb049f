//! # Eligibility Policy
//!
//! Decide se un file già noto va riproposto per l'ottimizzazione a un certo livello.
//! Le regole vengono valutate in ordine, vince la prima che corrisponde:
//!
//! | Stato               | Livello salvato      | Esito                         |
//! |---------------------|----------------------|-------------------------------|
//! | `error`             | qualsiasi            | eleggibile (sempre riprovare) |
//! | qualsiasi altro     | `== L`               | non eleggibile                |
//! | `already_optimized` | `>= L`               | non eleggibile                |
//! | `success`           | `!= L`               | eleggibile solo con backup    |
//! | assente / altro     | -                    | eleggibile                    |

use crate::inventory::FileStatus;

/// Verdict of the eligibility policy for one file
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Eligibility {
    Eligible,
    /// Already processed at the requested level
    SameLevel,
    /// Already maximally compressed at this level or above
    AlreadyOptimized,
    /// Optimized at another level and the original is gone
    NoBackup,
}

impl Eligibility {
    pub fn is_eligible(&self) -> bool {
        matches!(self, Self::Eligible)
    }

    /// Evaluate the policy for a file previously stored with `status`/`level`
    /// against the requested level. `has_backup` is only called when needed.
    pub fn evaluate(
        status: Option<FileStatus>,
        level: Option<u8>,
        requested: u8,
        has_backup: impl FnOnce() -> bool,
    ) -> Self {
        if status == Some(FileStatus::Error) {
            return Self::Eligible;
        }

        if level == Some(requested) {
            return Self::SameLevel;
        }

        match status {
            Some(FileStatus::AlreadyOptimized) if level.map_or(false, |l| l >= requested) => {
                Self::AlreadyOptimized
            }
            Some(FileStatus::Success) => {
                if has_backup() {
                    Self::Eligible
                } else {
                    Self::NoBackup
                }
            }
            _ => Self::Eligible,
        }
    }
}
