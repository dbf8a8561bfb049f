//! # Forbidden Path Policy
//!
//! Decide se un path deve essere escluso da scan e tracking.
//!
//! ## Regole fisse:
//! - Path fuori da tutte le root note
//! - Directory dei backup (e tutto il suo contenuto)
//! - Directory del tool stesso
//!
//! ## Regole estendibili (`DenyRule`):
//! - `HiddenEntries`: componenti che iniziano con `.` sotto la root
//! - `Name`: componenti con un nome preciso (es. `wp-admin`, `cache`)
//! - `Prefix`: tutto quello che sta sotto un path assoluto
//! - `SymlinkEscape`: symlink il cui target reale è fuori dalle root

use crate::placeholder::PathCodec;
use std::fs;
use std::path::{Path, PathBuf};

/// Extensible deny-list entry
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DenyRule {
    HiddenEntries,
    Name(String),
    Prefix(PathBuf),
    SymlinkEscape,
}

#[derive(Debug, Clone)]
pub struct ForbiddenPathPolicy {
    roots: Vec<PathBuf>,
    canonical_roots: Vec<PathBuf>,
    backup_dir: PathBuf,
    own_dir: Option<PathBuf>,
    rules: Vec<DenyRule>,
}

impl ForbiddenPathPolicy {
    pub fn new(codec: &PathCodec, backup_dir: PathBuf, own_dir: Option<PathBuf>) -> Self {
        let roots: Vec<PathBuf> = codec
            .roots()
            .filter(|r| !r.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .collect();
        let canonical_roots = roots
            .iter()
            .map(|r| fs::canonicalize(r).unwrap_or_else(|_| r.clone()))
            .collect();

        Self {
            roots,
            canonical_roots,
            backup_dir,
            own_dir,
            rules: Vec::new(),
        }
    }

    pub fn with_rule(mut self, rule: DenyRule) -> Self {
        self.add_rule(rule);
        self
    }

    pub fn add_rule(&mut self, rule: DenyRule) {
        if !self.rules.contains(&rule) {
            self.rules.push(rule);
        }
    }

    pub fn rules(&self) -> &[DenyRule] {
        &self.rules
    }

    pub fn is_forbidden(&self, path: &Path) -> bool {
        let Some(root) = self.deepest_root(path) else {
            return true;
        };

        if path.starts_with(&self.backup_dir) {
            return true;
        }

        if let Some(ref own) = self.own_dir {
            if path.starts_with(own) {
                return true;
            }
        }

        let relative = path.strip_prefix(root).unwrap_or(path);

        self.rules.iter().any(|rule| match rule {
            DenyRule::HiddenEntries => relative
                .components()
                .any(|c| c.as_os_str().to_string_lossy().starts_with('.')),
            DenyRule::Name(name) => relative
                .components()
                .any(|c| c.as_os_str() == name.as_str()),
            DenyRule::Prefix(prefix) => path.starts_with(prefix),
            DenyRule::SymlinkEscape => self.escapes_roots(path),
        })
    }

    fn deepest_root(&self, path: &Path) -> Option<&Path> {
        self.roots
            .iter()
            .filter(|root| path.starts_with(root))
            .max_by_key(|root| root.components().count())
            .map(PathBuf::as_path)
    }

    fn escapes_roots(&self, path: &Path) -> bool {
        let is_link = fs::symlink_metadata(path)
            .map(|m| m.file_type().is_symlink())
            .unwrap_or(false);
        if !is_link {
            return false;
        }

        match fs::canonicalize(path) {
            Ok(target) => !self.canonical_roots.iter().any(|root| target.starts_with(root)),
            // Dangling link
            Err(_) => true,
        }
    }
}
