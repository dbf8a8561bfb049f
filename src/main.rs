//! # Folder Inventory - Main Entry Point
//!
//! Punto di ingresso della CLI: fa la parte del job esterno che chiede la lista di file.
//!
//! ## Responsabilità:
//! - Parsing degli argomenti della command line con `clap`
//! - Inizializzazione del logging con `tracing` (`RUST_LOG` o `--verbose`)
//! - Caricamento della configurazione e apertura dell'inventario JSON
//! - Esecuzione dei comandi `reconcile`, `add-folder` e `folders`
//!
//! ## Flusso di `reconcile`:
//! 1. Risolve i folder del tipo richiesto
//! 2. Riconcilia scan e inventario
//! 3. Stampa la lista ordinata (testo o JSON) e le statistiche
//!
//! ## Esempio di utilizzo:
//! ```bash
//! folder-inventory --root /var/www/site add-folder /var/www/site/gallery
//! folder-inventory --root /var/www/site reconcile --type custom-folders --level 2 --json
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::time::Instant;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use folder_inventory::config::default_app_dir;
use folder_inventory::{
    ActiveFilter, Config, FileReconciler, FolderRegistry, FolderType, JsonInventoryStore, JsonMessage,
    ProgressManager, Site,
};

#[derive(Parser)]
#[command(name = "folder-inventory")]
#[command(about = "Keep an inventory of image files in tracked folders")]
struct Args {
    /// Configuration file (default: ~/.folder-inventory/config.json)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Installation root, overrides the configuration file
    #[arg(short, long)]
    root: Option<PathBuf>,

    /// Verbose logging
    #[arg(short, long)]
    verbose: bool,

    /// Emit JSON messages on stdout
    #[arg(long)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// List the files to process for a folder type
    Reconcile {
        /// Folder type: themes, plugins, custom-folders or a registered provider
        #[arg(short = 't', long = "type", default_value = "custom-folders")]
        folder_type: String,

        /// Only return files eligible for this optimization level
        #[arg(short, long)]
        level: Option<u8>,

        /// Only inactive folders
        #[arg(long, conflicts_with = "all")]
        inactive: bool,

        /// Active and inactive folders
        #[arg(long)]
        all: bool,
    },

    /// Start tracking a directory
    AddFolder {
        path: PathBuf,

        /// Register the folder as inactive
        #[arg(long)]
        inactive: bool,
    },

    /// List resolved folders of a type
    Folders {
        #[arg(short = 't', long = "type", default_value = "custom-folders")]
        folder_type: String,
    },
}

fn active_filter(inactive: bool, all: bool) -> ActiveFilter {
    if all {
        ActiveFilter::All
    } else if inactive {
        ActiveFilter::OnlyInactive
    } else {
        ActiveFilter::OnlyActive
    }
}

async fn load_config(args: &Args) -> Result<Config> {
    let path = match args.config {
        Some(ref path) => path.clone(),
        None => default_app_dir()?.join("config.json"),
    };

    let mut config = Config::from_file(&path)
        .await
        .with_context(|| format!("Failed to load configuration from {}", path.display()))?;

    if let Some(ref root) = args.root {
        config.install_root = root.clone();
    }

    Ok(config)
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let fallback = if args.verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(fallback));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    match run(&args).await {
        Ok(()) => Ok(()),
        Err(e) if args.json => {
            JsonMessage::error(e.to_string(), Some(format!("{:#}", e))).emit();
            Err(e)
        }
        Err(e) => Err(e),
    }
}

async fn run(args: &Args) -> Result<()> {
    let config = load_config(args).await?;
    let site = Site::from_config(&config)?;
    let store = JsonInventoryStore::open(&config.inventory_path()?).await?;
    let registry = FolderRegistry::new(&site);

    match args.command {
        Command::Reconcile {
            ref folder_type,
            level,
            inactive,
            all,
        } => {
            let folder_type: FolderType = folder_type.parse()?;
            let folders = registry
                .resolve_folders(&site, &store, &folder_type, active_filter(inactive, all))
                .await?;

            if level.is_some() && !site.backups.ensure_backup_dir().await {
                let message = format!(
                    "Backup directory is not writable: {}",
                    site.backups.backup_dir().display()
                );
                if args.json {
                    JsonMessage::error(message, None).emit();
                } else {
                    warn!("{}", message);
                }
            }

            if args.json {
                JsonMessage::start(&folder_type.to_string(), folders.len(), level).emit();
            }

            let start = Instant::now();
            let spinner = (!args.json).then(|| ProgressManager::spinner("Reconciling folders..."));
            let result = FileReconciler::new(&site, &store).reconcile_files(&folders, level).await;
            if let Some(spinner) = spinner {
                spinner.finish_and_clear();
            }

            for warning in &result.warnings {
                if args.json {
                    JsonMessage::error("Inventory store failure", Some(warning.to_string())).emit();
                } else {
                    warn!("{}", warning);
                }
            }

            for file in &result.files {
                if args.json {
                    JsonMessage::file(file).emit();
                } else {
                    println!(
                        "{:>6} {:>6}  {:<18} {}",
                        file.folder_id,
                        file.file_id,
                        file.status.map(|s| s.to_string()).unwrap_or_else(|| "-".to_string()),
                        file.absolute_path.display()
                    );
                }
            }

            if args.json {
                JsonMessage::complete(
                    result.files.len(),
                    result.is_complete(),
                    start.elapsed().as_secs_f64(),
                    &result.stats,
                )
                .emit();
            } else {
                info!("{}", result.stats.format_summary());
                if !result.is_complete() {
                    warn!("The file list may be incomplete");
                }
            }
        }

        Command::AddFolder { ref path, inactive } => {
            let path = if path.is_absolute() {
                path.clone()
            } else {
                std::env::current_dir()?.join(path)
            };
            let folder_id = registry.register_folder(&site, &store, &path, !inactive).await?;
            println!("{}", folder_id);
        }

        Command::Folders { ref folder_type } => {
            let folder_type: FolderType = folder_type.parse()?;
            let folders = registry
                .resolve_folders(&site, &store, &folder_type, ActiveFilter::All)
                .await?;
            for folder in folders.values() {
                println!(
                    "{:>6}  {:<8} {}",
                    folder.folder_id,
                    if folder.active { "active" } else { "inactive" },
                    folder.absolute_path.display()
                );
            }
        }
    }

    Ok(())
}
