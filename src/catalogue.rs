//! Help text catalogue.
//!
//! In-memory one-line and help text keyed by metric id or instance domain.
//! Backs the collector daemon and [`crate::agent::StaticAgent`].

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

use crate::types::{InDom, Pmid, TextLevel, TextRequest, TextTarget};

/// Text for one ident.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HelpEntry {
    pub target: TextTarget,
    pub ident: u32,
    #[serde(default)]
    pub oneline: String,
    #[serde(default)]
    pub help: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct CatalogueFile {
    entries: Vec<HelpEntry>,
}

/// Help text keyed by `(target, ident)`.
#[derive(Debug, Clone, Default)]
pub struct HelpCatalogue {
    entries: HashMap<(TextTarget, u32), HelpEntry>,
}

impl HelpCatalogue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load `{"entries": [{"target", "ident", "oneline", "help"}, ...]}`.
    pub fn from_file(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        let file: CatalogueFile = serde_json::from_str(&raw)
            .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
        let mut catalogue = Self::new();
        for entry in file.entries {
            catalogue.insert(entry);
        }
        Ok(catalogue)
    }

    pub fn insert(&mut self, entry: HelpEntry) {
        self.entries.insert((entry.target, entry.ident), entry);
    }

    pub fn insert_pmid(&mut self, pmid: Pmid, oneline: &str, help: &str) {
        self.insert(HelpEntry {
            target: TextTarget::Pmid,
            ident: pmid.as_raw(),
            oneline: oneline.to_string(),
            help: help.to_string(),
        });
    }

    pub fn insert_indom(&mut self, indom: InDom, oneline: &str, help: &str) {
        self.insert(HelpEntry {
            target: TextTarget::Indom,
            ident: indom.as_raw(),
            oneline: oneline.to_string(),
            help: help.to_string(),
        });
    }

    /// Stored text for the request's level. `None` if the ident is unknown;
    /// an empty string if it is known but has no text at that level.
    pub fn text(&self, request: &TextRequest) -> Option<&str> {
        let entry = self.entries.get(&(request.target, request.ident))?;
        Some(match request.level {
            TextLevel::OneLine => entry.oneline.as_str(),
            TextLevel::Help => entry.help.as_str(),
        })
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
