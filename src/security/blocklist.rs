// src/security/blocklist.rs — Blocked usernames, persisted one per line

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use parking_lot::RwLock;

use crate::infra::errors::Result;

pub struct Blocklist {
    path: PathBuf,
    names: RwLock<BTreeSet<String>>,
}

impl Blocklist {
    /// Load the list from `path`. A missing file is an empty list.
    pub fn load(path: &Path) -> Result<Self> {
        let names = match std::fs::read_to_string(path) {
            Ok(content) => content
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(str::to_string)
                .collect(),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => BTreeSet::new(),
            Err(e) => return Err(e.into()),
        };
        Ok(Self {
            path: path.to_path_buf(),
            names: RwLock::new(names),
        })
    }

    pub fn contains(&self, username: &str) -> bool {
        self.names.read().contains(username)
    }

    /// Returns false if the name was already blocked. The in-memory list
    /// only changes if the file write succeeds.
    pub fn ban(&self, username: &str) -> Result<bool> {
        let mut names = self.names.write();
        if !names.insert(username.to_string()) {
            return Ok(false);
        }
        if let Err(e) = self.persist(&names) {
            names.remove(username);
            return Err(e);
        }
        Ok(true)
    }

    /// Returns false if the name was not blocked.
    pub fn unban(&self, username: &str) -> Result<bool> {
        let mut names = self.names.write();
        if !names.remove(username) {
            return Ok(false);
        }
        if let Err(e) = self.persist(&names) {
            names.insert(username.to_string());
            return Err(e);
        }
        Ok(true)
    }

    pub fn list(&self) -> Vec<String> {
        self.names.read().iter().cloned().collect()
    }

    fn persist(&self, names: &BTreeSet<String>) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut content = String::new();
        for name in names {
            content.push_str(name);
            content.push('\n');
        }
        std::fs::write(&self.path, content)?;
        Ok(())
    }
}
