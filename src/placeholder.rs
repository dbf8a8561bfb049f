//! # Path Placeholder Module
//!
//! Converte path assoluti in path "portabili" e viceversa.
//!
//! ## Responsabilità:
//! - Sostituisce la root di un path con un token simbolico (`{{ABSPATH}}`, `{{CONTENT}}`,
//!   `{{THEMES}}`, `{{PLUGINS}}`) così che i path salvati sopravvivano allo spostamento
//!   dell'installazione
//! - Sceglie sempre la root più specifica (prefisso più lungo)
//! - Ricostruisce il path assoluto a partire dal token e dalla root corrente
//!
//! ## Formato:
//! ```text
//! /srv/site/wp-content/themes/twentyseventeen/logo.png  ->  {{THEMES}}/twentyseventeen/logo.png
//! /srv/site/wp-content/themes/twentyseventeen/          ->  {{THEMES}}/twentyseventeen/  (encode_dir)
//! ```

use crate::config::RootPaths;
use crate::error::{InventoryError, Result};
use std::fmt;
use std::path::{Component, Path, PathBuf};

/// Symbolic root tokens
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RootToken {
    Abspath,
    Content,
    Themes,
    Plugins,
}

impl RootToken {
    pub const ALL: [RootToken; 4] = [
        RootToken::Themes,
        RootToken::Plugins,
        RootToken::Content,
        RootToken::Abspath,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Abspath => "{{ABSPATH}}",
            Self::Content => "{{CONTENT}}",
            Self::Themes => "{{THEMES}}",
            Self::Plugins => "{{PLUGINS}}",
        }
    }
}

impl fmt::Display for RootToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Encodes absolute paths to portable ones and back
#[derive(Debug, Clone)]
pub struct PathCodec {
    roots: Vec<(RootToken, PathBuf)>,
}

impl PathCodec {
    pub fn new(roots: &RootPaths) -> Self {
        let roots = RootToken::ALL
            .iter()
            .map(|token| {
                let path = match token {
                    RootToken::Abspath => roots.install.clone(),
                    RootToken::Content => roots.content.clone(),
                    RootToken::Themes => roots.themes.clone(),
                    RootToken::Plugins => roots.plugins.clone(),
                };
                (*token, path)
            })
            .collect();

        Self { roots }
    }

    /// Absolute path currently bound to a token
    pub fn root(&self, token: RootToken) -> &Path {
        self.roots
            .iter()
            .find(|(t, _)| *t == token)
            .map(|(_, p)| p.as_path())
            .unwrap_or_else(|| Path::new(""))
    }

    /// All roots, most specific tokens first
    pub fn roots(&self) -> impl Iterator<Item = &Path> {
        self.roots.iter().map(|(_, p)| p.as_path())
    }

    /// Most specific root containing `path`, with its token.
    /// On equal depth the earlier token in `RootToken::ALL` wins.
    pub fn matching_root(&self, path: &Path) -> Option<(RootToken, &Path)> {
        let mut best: Option<(RootToken, &Path, usize)> = None;

        for (token, root) in &self.roots {
            if root.as_os_str().is_empty() || !path.starts_with(root) {
                continue;
            }
            let depth = root.components().count();
            if best.map_or(true, |(_, _, d)| depth > d) {
                best = Some((*token, root.as_path(), depth));
            }
        }

        best.map(|(token, root, _)| (token, root))
    }

    /// Encode a file path: `{{TOKEN}}/relative/path`
    pub fn encode(&self, path: &Path) -> Result<String> {
        let (token, relative) = self.split(path)?;
        if relative.is_empty() {
            Ok(token.as_str().to_string())
        } else {
            Ok(format!("{}/{}", token, relative))
        }
    }

    /// Encode a folder path: `{{TOKEN}}/relative/path/` (always a trailing slash)
    pub fn encode_dir(&self, path: &Path) -> Result<String> {
        let (token, relative) = self.split(path)?;
        if relative.is_empty() {
            Ok(format!("{}/", token))
        } else {
            Ok(format!("{}/{}/", token, relative))
        }
    }

    /// Decode a portable path back to an absolute path under the current roots
    pub fn decode(&self, portable: &str) -> Result<PathBuf> {
        for (token, root) in &self.roots {
            let Some(rest) = portable.strip_prefix(token.as_str()) else {
                continue;
            };
            if !rest.is_empty() && !rest.starts_with('/') {
                continue;
            }

            let mut path = root.clone();
            for segment in rest.split('/').filter(|s| !s.is_empty()) {
                // Plain names only: the result must stay under the root
                if segment == "." || segment == ".." {
                    return Err(InventoryError::UnknownPlaceholder(portable.to_string()));
                }
                path.push(segment);
            }
            return Ok(path);
        }

        Err(InventoryError::UnknownPlaceholder(portable.to_string()))
    }

    fn split(&self, path: &Path) -> Result<(RootToken, String)> {
        let (token, root) = self
            .matching_root(path)
            .ok_or_else(|| InventoryError::PathNotEncodable(path.to_path_buf()))?;

        let relative = path
            .strip_prefix(root)
            .map_err(|_| InventoryError::PathNotEncodable(path.to_path_buf()))?;

        let mut segments = Vec::new();
        for component in relative.components() {
            match component {
                Component::Normal(name) => {
                    let name = name
                        .to_str()
                        .ok_or_else(|| InventoryError::PathNotEncodable(path.to_path_buf()))?;
                    segments.push(name);
                }
                Component::CurDir => {}
                _ => return Err(InventoryError::PathNotEncodable(path.to_path_buf())),
            }
        }

        Ok((token, segments.join("/")))
    }
}
