//! # Backup Path Resolution Module
//!
//! Centralizza il calcolo del path di backup di un file tracciato.
//! Il backup non viene mai letto o scritto qui: serve solo a verificarne l'esistenza.

use std::path::{Path, PathBuf};
use tracing::debug;

/// Maps tracked files to where their pre-optimization backup lives
#[derive(Debug, Clone)]
pub struct BackupResolver {
    install_root: PathBuf,
    backup_dir: PathBuf,
}

impl BackupResolver {
    pub fn new(install_root: PathBuf, backup_dir: PathBuf) -> Self {
        Self {
            install_root,
            backup_dir,
        }
    }

    pub fn backup_dir(&self) -> &Path {
        &self.backup_dir
    }

    /// `<backup_dir>/<path relative to the install root>`, `None` outside the install root
    pub fn backup_path(&self, file_path: &Path) -> Option<PathBuf> {
        match file_path.strip_prefix(&self.install_root) {
            Ok(rel) if !rel.as_os_str().is_empty() => Some(self.backup_dir.join(rel)),
            Ok(_) => None,
            Err(_) => {
                debug!("No backup mapping for {} (outside install root)", file_path.display());
                None
            }
        }
    }

    pub fn has_backup(&self, file_path: &Path) -> bool {
        self.backup_path(file_path)
            .map(|p| p.is_file())
            .unwrap_or(false)
    }

    /// Create the backup directory if needed and tell whether it can be written to
    pub async fn ensure_backup_dir(&self) -> bool {
        if let Err(e) = tokio::fs::create_dir_all(&self.backup_dir).await {
            debug!("Failed to create backup dir {}: {}", self.backup_dir.display(), e);
            return false;
        }

        match tokio::fs::metadata(&self.backup_dir).await {
            Ok(metadata) => metadata.is_dir() && !metadata.permissions().readonly(),
            Err(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_backup_path_mapping() {
        let resolver = BackupResolver::new(
            PathBuf::from("/srv/site"),
            PathBuf::from("/srv/site/media-backup"),
        );
        assert_eq!(
            resolver.backup_path(Path::new("/srv/site/gallery/2023/a.jpg")),
            Some(PathBuf::from("/srv/site/media-backup/gallery/2023/a.jpg"))
        );
        assert_eq!(resolver.backup_path(Path::new("/elsewhere/a.jpg")), None);
        assert_eq!(resolver.backup_path(Path::new("/srv/site")), None);
    }

    #[tokio::test]
    async fn test_has_backup_and_ensure_dir() {
        let site = TempDir::new().unwrap();
        let resolver = BackupResolver::new(site.path().to_path_buf(), site.path().join("media-backup"));
        let file = site.path().join("gallery/a.jpg");

        assert!(!resolver.has_backup(&file));
        assert!(resolver.ensure_backup_dir().await);

        let backup = resolver.backup_path(&file).unwrap();
        std::fs::create_dir_all(backup.parent().unwrap()).unwrap();
        std::fs::write(&backup, b"original").unwrap();
        assert!(resolver.has_backup(&file));
    }
}
