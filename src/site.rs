//! # Site Module
//!
//! Raggruppa i collaboratori che dipendono solo dalla configurazione:
//! codec dei placeholder, policy dei path proibiti, resolver dei backup ed estensioni.
//! Viene costruito una volta e passato per riferimento a registry e reconciler.

use crate::config::Config;
use crate::file_manager::FileScanner;
use crate::forbidden::{DenyRule, ForbiddenPathPolicy};
use crate::placeholder::PathCodec;
use crate::reconciler::BackupResolver;
use anyhow::Result;

#[derive(Debug, Clone)]
pub struct Site {
    pub codec: PathCodec,
    pub policy: ForbiddenPathPolicy,
    pub backups: BackupResolver,
    pub extensions: Vec<String>,
}

impl Site {
    pub fn from_config(config: &Config) -> Result<Self> {
        config.validate()?;

        let roots = config.roots();
        let codec = PathCodec::new(&roots);
        let backup_dir = config.backup_dir();

        let mut policy = ForbiddenPathPolicy::new(&codec, backup_dir.clone(), config.own_dir.clone())
            .with_rule(DenyRule::SymlinkEscape);
        if config.skip_hidden {
            policy.add_rule(DenyRule::HiddenEntries);
        }
        for name in &config.deny_names {
            policy.add_rule(DenyRule::Name(name.clone()));
        }

        Ok(Self {
            codec,
            policy,
            backups: BackupResolver::new(roots.install, backup_dir),
            extensions: config.extensions.iter().map(|e| e.to_lowercase()).collect(),
        })
    }

    pub fn scanner(&self) -> FileScanner<'_> {
        FileScanner::new(&self.policy, &self.extensions)
    }
}
