//! # Configuration Management Module
//!
//! Questo modulo gestisce tutta la configurazione dell'applicazione.
//!
//! ## Responsabilità:
//! - Definisce la struct `Config` con le root del sito e le regole di scan
//! - Fornisce validazione dei parametri di input
//! - Supporta caricamento/salvataggio configurazione da/verso file JSON
//! - Deriva valori di default sensati dal layout standard (`wp-content`, `themes`, `plugins`)
//!
//! ## Parametri di configurazione:
//! - `install_root`: Root dell'installazione (obbligatoria)
//! - `content_root`: Directory dei contenuti (default: `<install_root>/wp-content`)
//! - `themes_root` / `plugins_root`: (default: `<content_root>/themes`, `<content_root>/plugins`)
//! - `backup_dir`: Directory dei backup (default: `<install_root>/media-backup`)
//! - `own_dir`: Directory del tool stesso, sempre esclusa dallo scan
//! - `extensions`: Estensioni immagine riconosciute
//! - `deny_names`: Nomi di directory sempre esclusi
//! - `inventory_path`: File JSON dell'inventario (default: `~/.folder-inventory/inventory.json`)
//!
//! ## Esempio:
//! ```rust,ignore
//! let config = Config {
//!     install_root: PathBuf::from("/var/www/site"),
//!     ..Default::default()
//! };
//! config.validate()?;
//! ```

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Directory (under the home directory) holding default config and inventory files
pub const APP_DIR_NAME: &str = ".folder-inventory";

/// Configuration for folder reconciliation
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Installation root (bound to `{{ABSPATH}}`)
    pub install_root: PathBuf,
    /// Content directory (bound to `{{CONTENT}}`)
    pub content_root: Option<PathBuf>,
    /// Themes directory (bound to `{{THEMES}}`)
    pub themes_root: Option<PathBuf>,
    /// Plugins directory (bound to `{{PLUGINS}}`)
    pub plugins_root: Option<PathBuf>,
    /// Where backups of original files live
    pub backup_dir: Option<PathBuf>,
    /// Directory of this tool, never scanned
    pub own_dir: Option<PathBuf>,
    /// Recognized image extensions (lowercase, no dot)
    pub extensions: Vec<String>,
    /// Directory names excluded anywhere below a root
    pub deny_names: Vec<String>,
    /// Exclude hidden entries (names starting with '.')
    pub skip_hidden: bool,
    /// JSON inventory file
    pub inventory_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            install_root: PathBuf::new(),
            content_root: None,
            themes_root: None,
            plugins_root: None,
            backup_dir: None,
            own_dir: None,
            extensions: ["jpg", "jpeg", "jpe", "png", "gif", "webp"]
                .iter()
                .map(|e| e.to_string())
                .collect(),
            deny_names: ["wp-admin", "wp-includes", "uploads", "cache", "node_modules"]
                .iter()
                .map(|e| e.to_string())
                .collect(),
            skip_hidden: true,
            inventory_path: None,
        }
    }
}

/// Absolute roots resolved from a `Config`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootPaths {
    pub install: PathBuf,
    pub content: PathBuf,
    pub themes: PathBuf,
    pub plugins: PathBuf,
}

impl Config {
    /// Config rooted at the given installation directory, everything else default
    pub fn for_install_root(install_root: impl Into<PathBuf>) -> Self {
        Self {
            install_root: install_root.into(),
            ..Default::default()
        }
    }

    /// Validate configuration parameters
    pub fn validate(&self) -> Result<()> {
        if self.install_root.as_os_str().is_empty() {
            return Err(anyhow::anyhow!("Install root must be set"));
        }

        let roots = self.roots();
        for (name, root) in [
            ("Install root", &roots.install),
            ("Content root", &roots.content),
            ("Themes root", &roots.themes),
            ("Plugins root", &roots.plugins),
        ] {
            if !root.is_absolute() {
                return Err(anyhow::anyhow!("{} must be an absolute path: {}", name, root.display()));
            }
        }

        if !roots.install.is_dir() {
            return Err(anyhow::anyhow!("Install root is not a directory: {}", roots.install.display()));
        }

        if self.extensions.is_empty() {
            return Err(anyhow::anyhow!("At least one image extension must be configured"));
        }

        if let Some(ext) = self.extensions.iter().find(|e| e.is_empty() || e.starts_with('.')) {
            return Err(anyhow::anyhow!("Invalid extension '{}': use bare names like \"jpg\"", ext));
        }

        Ok(())
    }

    /// Resolve the four placeholder roots, filling defaults from `install_root`
    pub fn roots(&self) -> RootPaths {
        let install = self.install_root.clone();
        let content = self
            .content_root
            .clone()
            .unwrap_or_else(|| install.join("wp-content"));
        let themes = self
            .themes_root
            .clone()
            .unwrap_or_else(|| content.join("themes"));
        let plugins = self
            .plugins_root
            .clone()
            .unwrap_or_else(|| content.join("plugins"));

        RootPaths {
            install,
            content,
            themes,
            plugins,
        }
    }

    /// Backup directory, defaulting to `<install_root>/media-backup`
    pub fn backup_dir(&self) -> PathBuf {
        self.backup_dir
            .clone()
            .unwrap_or_else(|| self.install_root.join("media-backup"))
    }

    /// Inventory file, defaulting to `~/.folder-inventory/inventory.json`
    pub fn inventory_path(&self) -> Result<PathBuf> {
        if let Some(ref path) = self.inventory_path {
            return Ok(path.clone());
        }
        Ok(default_app_dir()?.join("inventory.json"))
    }

    /// Load configuration from file
    pub async fn from_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = tokio::fs::read_to_string(path).await?;
        let config: Config = serde_json::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to file
    pub async fn save_to_file(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let content = serde_json::to_string_pretty(self)?;
        tokio::fs::write(path, content).await?;
        Ok(())
    }
}

/// `~/.folder-inventory`
pub fn default_app_dir() -> Result<PathBuf> {
    Ok(dirs::home_dir()
        .ok_or_else(|| anyhow::anyhow!("Could not find home directory"))?
        .join(APP_DIR_NAME))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_config_validation() {
        let temp_dir = TempDir::new().unwrap();

        let mut config = Config::default();
        assert!(config.validate().is_err());

        config.install_root = temp_dir.path().to_path_buf();
        assert!(config.validate().is_ok());

        config.install_root = PathBuf::from("relative/site");
        assert!(config.validate().is_err());

        config.install_root = temp_dir.path().to_path_buf();
        config.extensions = vec![".jpg".to_string()];
        assert!(config.validate().is_err());

        config.extensions.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_default_roots() {
        let config = Config::for_install_root("/srv/site");
        let roots = config.roots();
        assert_eq!(roots.content, PathBuf::from("/srv/site/wp-content"));
        assert_eq!(roots.themes, PathBuf::from("/srv/site/wp-content/themes"));
        assert_eq!(roots.plugins, PathBuf::from("/srv/site/wp-content/plugins"));
        assert_eq!(config.backup_dir(), PathBuf::from("/srv/site/media-backup"));
    }

    #[test]
    fn test_config_moved_themes_root() {
        let config = Config {
            themes_root: Some(PathBuf::from("/opt/themes")),
            ..Config::for_install_root("/srv/site")
        };
        let roots = config.roots();
        assert_eq!(roots.themes, PathBuf::from("/opt/themes"));
        assert_eq!(roots.plugins, PathBuf::from("/srv/site/wp-content/plugins"));
    }

    #[tokio::test]
    async fn test_config_save_load() {
        let temp_dir = TempDir::new().unwrap();
        let config_path = temp_dir.path().join("config.json");

        let original_config = Config {
            backup_dir: Some(temp_dir.path().join("backups")),
            extensions: vec!["png".to_string()],
            skip_hidden: false,
            ..Config::for_install_root(temp_dir.path())
        };

        original_config.save_to_file(&config_path).await.unwrap();
        let loaded_config = Config::from_file(&config_path).await.unwrap();

        assert_eq!(loaded_config.install_root, temp_dir.path());
        assert_eq!(loaded_config.backup_dir(), temp_dir.path().join("backups"));
        assert_eq!(loaded_config.extensions, vec!["png".to_string()]);
        assert!(!loaded_config.skip_hidden);
        assert_eq!(loaded_config.deny_names, Config::default().deny_names);
    }

    #[tokio::test]
    async fn test_config_missing_file_is_default() {
        let temp_dir = TempDir::new().unwrap();
        let config = Config::from_file(&temp_dir.path().join("nope.json")).await.unwrap();
        assert!(config.install_root.as_os_str().is_empty());
        assert!(config.skip_hidden);
    }
}
