//! # Folder Registry Module
//!
//! Risolve un tipo di folder (`themes`, `plugins`, `custom-folders` o un tipo esterno)
//! nell'insieme dei folder tracciati che gli appartengono.
//!
//! ## Responsabilità:
//! - Mantiene uno snapshot esplicito di temi e plugin installati (`RegistrySnapshot`),
//!   posseduto dal chiamante e aggiornato con `refresh()`
//! - Seleziona le righe dei folder dallo store applicando il filtro `active`
//! - Delega i tipi sconosciuti ai `FolderProvider` registrati
//! - Esclude in silenzio i folder il cui path non esiste più o è proibito
//!
//! ## Tipi di folder:
//! - `themes`: righe il cui path coincide con la root di un tema installato
//! - `plugins`: righe il cui path coincide con la root di un plugin installato
//! - `custom-folders`: tutte le altre righe (il complemento)
//! - altro: provider esterno, vuoto se nessun provider è registrato
//!
//! ## Esempio:
//! ```rust,ignore
//! let registry = FolderRegistry::new(&site);
//! let folders = registry
//!     .resolve_folders(&site, &store, &FolderType::CustomFolders, ActiveFilter::OnlyActive)
//!     .await?;
//! ```

use crate::error::{InventoryError, Result};
use crate::inventory::{FolderRow, InventoryStore};
use crate::placeholder::RootToken;
use crate::site::Site;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::{debug, info};

/// Classification of a tracked folder
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum FolderType {
    Themes,
    Plugins,
    CustomFolders,
    Other(String),
}

impl FromStr for FolderType {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Ok(match s.to_lowercase().as_str() {
            "themes" => Self::Themes,
            "plugins" => Self::Plugins,
            "custom-folders" => Self::CustomFolders,
            other => Self::Other(other.to_string()),
        })
    }
}

impl fmt::Display for FolderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Themes => f.write_str("themes"),
            Self::Plugins => f.write_str("plugins"),
            Self::CustomFolders => f.write_str("custom-folders"),
            Self::Other(name) => f.write_str(name),
        }
    }
}

/// Which folders to return according to their `active` flag
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ActiveFilter {
    #[default]
    OnlyActive,
    OnlyInactive,
    All,
}

impl ActiveFilter {
    pub fn accepts(&self, active: bool) -> bool {
        match self {
            Self::OnlyActive => active,
            Self::OnlyInactive => !active,
            Self::All => true,
        }
    }
}

/// A tracked folder with its absolute path resolved for the current site
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Folder {
    pub folder_id: u64,
    pub path: String,
    pub active: bool,
    pub absolute_path: PathBuf,
}

/// Supplies folders for a custom folder type
pub trait FolderProvider: Send + Sync {
    fn resolve(&self, filter: ActiveFilter) -> Vec<FolderRow>;
}

/// Installed theme and plugin roots, keyed by portable folder path
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RegistrySnapshot {
    themes: BTreeMap<String, PathBuf>,
    plugins: BTreeMap<String, PathBuf>,
}

impl RegistrySnapshot {
    /// Themes are directories under the themes root holding a `style.css`;
    /// plugins are directories under the plugins root.
    pub fn capture(site: &Site) -> Self {
        let themes_root = site.codec.root(RootToken::Themes);
        let plugins_root = site.codec.root(RootToken::Plugins);

        let themes = Self::collect(site, themes_root, |dir| dir.join("style.css").is_file());
        let plugins = Self::collect(site, plugins_root, |_| true);

        debug!("Snapshot: {} themes, {} plugins", themes.len(), plugins.len());
        Self { themes, plugins }
    }

    pub fn themes(&self) -> &BTreeMap<String, PathBuf> {
        &self.themes
    }

    pub fn plugins(&self) -> &BTreeMap<String, PathBuf> {
        &self.plugins
    }

    pub fn is_theme_or_plugin(&self, portable: &str) -> bool {
        self.themes.contains_key(portable) || self.plugins.contains_key(portable)
    }

    fn collect(site: &Site, root: &Path, keep: impl Fn(&Path) -> bool) -> BTreeMap<String, PathBuf> {
        let mut found = BTreeMap::new();

        let entries = match std::fs::read_dir(root) {
            Ok(entries) => entries,
            Err(e) => {
                debug!("Cannot list {}: {}", root.display(), e);
                return found;
            }
        };

        for entry in entries.flatten() {
            let path = entry.path();
            if !path.is_dir() || !keep(&path) || site.policy.is_forbidden(&path) {
                continue;
            }
            match site.codec.encode_dir(&path) {
                Ok(portable) => {
                    found.insert(portable, path);
                }
                Err(e) => debug!("Skipping {}: {}", path.display(), e),
            }
        }

        found
    }
}

/// Resolves folder types to tracked folders
pub struct FolderRegistry {
    snapshot: RegistrySnapshot,
    providers: HashMap<String, Box<dyn FolderProvider>>,
}

impl FolderRegistry {
    pub fn new(site: &Site) -> Self {
        Self::with_snapshot(RegistrySnapshot::capture(site))
    }

    pub fn with_snapshot(snapshot: RegistrySnapshot) -> Self {
        Self {
            snapshot,
            providers: HashMap::new(),
        }
    }

    /// Re-read installed themes and plugins
    pub fn refresh(&mut self, site: &Site) {
        self.snapshot = RegistrySnapshot::capture(site);
    }

    pub fn snapshot(&self) -> &RegistrySnapshot {
        &self.snapshot
    }

    /// Register the provider answering for folder type `name`
    pub fn register_provider(&mut self, name: &str, provider: Box<dyn FolderProvider>) {
        self.providers.insert(name.to_lowercase(), provider);
    }

    pub async fn resolve_folders<S: InventoryStore + ?Sized>(
        &self,
        site: &Site,
        store: &S,
        folder_type: &FolderType,
        filter: ActiveFilter,
    ) -> Result<BTreeMap<u64, Folder>> {
        let rows: Vec<FolderRow> = match folder_type {
            FolderType::Themes => self.select_rows(store, filter, |p| self.snapshot.themes.contains_key(p)).await?,
            FolderType::Plugins => self.select_rows(store, filter, |p| self.snapshot.plugins.contains_key(p)).await?,
            FolderType::CustomFolders => {
                self.select_rows(store, filter, |p| !self.snapshot.is_theme_or_plugin(p)).await?
            }
            FolderType::Other(name) => match self.providers.get(name) {
                Some(provider) => provider
                    .resolve(filter)
                    .into_iter()
                    .filter(|row| filter.accepts(row.active))
                    .collect(),
                None => {
                    debug!("No folder provider registered for type '{}'", name);
                    Vec::new()
                }
            },
        };

        let mut folders = BTreeMap::new();
        for row in rows {
            let absolute_path = match site.codec.decode(&row.path) {
                Ok(path) => path,
                Err(e) => {
                    debug!("Skipping folder {}: {}", row.folder_id, e);
                    continue;
                }
            };

            if !absolute_path.is_dir() || site.policy.is_forbidden(&absolute_path) {
                debug!(
                    "Skipping folder {} ({}): missing or forbidden",
                    row.folder_id,
                    absolute_path.display()
                );
                continue;
            }

            folders.insert(
                row.folder_id,
                Folder {
                    folder_id: row.folder_id,
                    path: row.path,
                    active: row.active,
                    absolute_path,
                },
            );
        }

        info!("Resolved {} folders of type {}", folders.len(), folder_type);
        Ok(folders)
    }

    /// Start tracking a directory. Returns the existing id if it is already tracked.
    pub async fn register_folder<S: InventoryStore + ?Sized>(
        &self,
        site: &Site,
        store: &S,
        path: &Path,
        active: bool,
    ) -> Result<u64> {
        if !path.is_dir() {
            return Err(InventoryError::Validation(format!(
                "Not a directory: {}",
                path.display()
            )));
        }
        if site.policy.is_forbidden(path) {
            return Err(InventoryError::ForbiddenPath(path.to_path_buf()));
        }

        let portable = site.codec.encode_dir(path)?;
        let folder_id = store.insert_folder(portable.clone(), active).await?;
        info!("Tracking folder {} as {} (id {})", path.display(), portable, folder_id);
        Ok(folder_id)
    }

    async fn select_rows<S: InventoryStore + ?Sized>(
        &self,
        store: &S,
        filter: ActiveFilter,
        belongs: impl Fn(&str) -> bool,
    ) -> Result<Vec<FolderRow>> {
        Ok(store
            .select_folders()
            .await?
            .into_iter()
            .filter(|row| belongs(&row.path) && filter.accepts(row.active))
            .collect())
    }
}
