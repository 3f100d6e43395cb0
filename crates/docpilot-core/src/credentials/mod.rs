//! Credential store: named secrets with fuzzy lookup.
//!
//! Credentials live in a line-oriented file (`~/.docpilot/credentials.env`
//! by default). Each non-blank, non-comment line is either
//!
//! ```text
//! OPENAI_API_KEY=sk-...
//! Airtable personal access token: pat...
//! ```
//!
//! The parsed file is an immutable [`CredentialSnapshot`]. A
//! [`CredentialStore`] hands out `Arc`s to the current snapshot and swaps in
//! a freshly parsed one on reload, so readers never observe a half-loaded
//! store.

pub mod mask;
pub mod vault;

use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use thiserror::Error;
use tracing::{debug, info, warn};

pub use mask::{mask_secret, Redactor, Secret};
pub use vault::Vault;

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("credential file error: {0}")]
    Io(#[from] std::io::Error),
    #[error("vault error: {0}")]
    Vault(String),
}

/// Words that say "this is a credential" without saying which one.
const GENERIC_WORDS: &[&str] = &[
    "api", "key", "keys", "token", "tokens", "secret", "access", "personal", "auth", "bearer",
    "the", "for", "my", "and", "of",
];

/// A single named credential.
#[derive(Debug, Clone)]
pub struct CredentialEntry {
    pub name: String,
    pub value: Secret,
    normalized: String,
}

impl CredentialEntry {
    pub fn new(name: &str, value: &str) -> Self {
        Self {
            name: name.trim().to_string(),
            value: Secret::new(value),
            normalized: normalize(name),
        }
    }
}

/// Lowercase, with every run of non-alphanumeric characters collapsed to a
/// single space: `OPENAI_API_KEY` and `OpenAI api-key` both become
/// `openai api key`.
fn normalize(s: &str) -> String {
    s.to_lowercase()
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Immutable, ordered set of credentials.
#[derive(Debug, Clone, Default)]
pub struct CredentialSnapshot {
    entries: Vec<CredentialEntry>,
}

impl CredentialSnapshot {
    /// Build a snapshot from `(name, value)` pairs in insertion order.
    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, &'a str)>) -> Self {
        let mut snapshot = Self::default();
        for (name, value) in pairs {
            snapshot.insert(CredentialEntry::new(name, value));
        }
        snapshot
    }

    /// Parse credentials file content. `vault:` values are decrypted with
    /// `vault`; entries that fail to decrypt are skipped.
    pub fn parse(content: &str, vault: &Vault) -> Self {
        let mut snapshot = Self::default();

        for (line_num, raw) in content.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let line = line.strip_prefix("export ").unwrap_or(line);

            let Some((name, value)) = split_line(line) else {
                debug!(line = line_num + 1, "Skipping unparseable credential line");
                continue;
            };
            if name.is_empty() || value.is_empty() {
                continue;
            }

            let value = match vault.decrypt(value) {
                Ok(v) => v,
                Err(e) => {
                    warn!(line = line_num + 1, name, error = %e, "Skipping undecryptable credential");
                    continue;
                }
            };

            snapshot.insert(CredentialEntry::new(name, &value));
        }

        snapshot
    }

    /// Later definitions of the same name replace the value but keep the
    /// position of the first one.
    fn insert(&mut self, entry: CredentialEntry) {
        if let Some(existing) = self
            .entries
            .iter_mut()
            .find(|e| e.normalized == entry.normalized)
        {
            existing.value = entry.value;
        } else {
            self.entries.push(entry);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Stored names, in insertion order. Never values.
    pub fn names(&self) -> Vec<&str> {
        self.entries.iter().map(|e| e.name.as_str()).collect()
    }

    pub fn contains(&self, hint: &str) -> bool {
        self.lookup(hint).is_some()
    }

    /// Resolve a human-readable hint to a credential value.
    pub fn resolve(&self, hint: &str) -> Option<Secret> {
        self.lookup(hint).map(|e| e.value.clone())
    }

    /// Resolve a hint to the matching entry.
    ///
    /// Tiers, first tier with a match wins, earliest entry wins within a tier:
    /// 1. exact (normalized) name equality
    /// 2. hint is a substring of the name, or the name of the hint
    /// 3. every hint token found in the name
    /// 4. distinctive hint tokens found in the name, the first of them
    ///    required; more matched tokens beat fewer
    pub fn lookup(&self, hint: &str) -> Option<&CredentialEntry> {
        let hint = normalize(hint);
        if hint.is_empty() {
            return None;
        }

        if let Some(e) = self.entries.iter().find(|e| e.normalized == hint) {
            debug!(hint = %hint, name = %e.name, "Exact credential match");
            return Some(e);
        }

        if let Some(e) = self.entries.iter().find(|e| {
            !e.normalized.is_empty()
                && (e.normalized.contains(hint.as_str()) || hint.contains(e.normalized.as_str()))
        }) {
            debug!(hint = %hint, name = %e.name, "Substring credential match");
            return Some(e);
        }

        let tokens: Vec<&str> = hint.split(' ').collect();
        if let Some(e) = self
            .entries
            .iter()
            .find(|e| tokens.iter().all(|t| e.normalized.contains(*t)))
        {
            debug!(hint = %hint, name = %e.name, "Token credential match");
            return Some(e);
        }

        let distinctive: Vec<&str> = tokens
            .iter()
            .copied()
            .filter(|t| t.len() >= 3 && !GENERIC_WORDS.contains(t))
            .collect();
        // The leading distinctive token names the service; an entry that
        // lacks it belongs to something else no matter what else it shares.
        let service = *distinctive.first()?;
        let mut best: Option<(usize, &CredentialEntry)> = None;
        for e in self.entries.iter().filter(|e| e.normalized.contains(service)) {
            let matched = distinctive
                .iter()
                .filter(|t| e.normalized.contains(**t))
                .count();
            if matched > 0 && best.map_or(true, |(n, _)| matched > n) {
                best = Some((matched, e));
            }
        }
        if let Some((matched, e)) = best {
            debug!(hint = %hint, name = %e.name, matched, "Partial token credential match");
        }
        best.map(|(_, e)| e)
    }

    /// A redactor pre-loaded with every value in the snapshot.
    pub fn redactor(&self) -> Redactor {
        let mut redactor = Redactor::new();
        for e in &self.entries {
            redactor.add(&e.value);
        }
        redactor
    }
}

/// Split `NAME=value` or `Name: value`, whichever separator comes first.
fn split_line(line: &str) -> Option<(&str, &str)> {
    let sep = line.find([':', '='])?;
    let name = line[..sep].trim();
    let value = unquote(line[sep + 1..].trim());
    Some((name, value))
}

fn unquote(value: &str) -> &str {
    for q in ['"', '\''] {
        if value.len() >= 2 && value.starts_with(q) && value.ends_with(q) {
            return &value[1..value.len() - 1];
        }
    }
    value
}

/// Reloadable holder of the current credential snapshot.
pub struct CredentialStore {
    path: Option<PathBuf>,
    vault: Vault,
    current: RwLock<Arc<CredentialSnapshot>>,
}

impl CredentialStore {
    /// Open the credentials file at `path`. A missing file yields an empty
    /// store, not an error.
    pub fn open(path: &Path, vault: Vault) -> Result<Self, CredentialError> {
        let store = Self {
            path: Some(path.to_path_buf()),
            vault,
            current: RwLock::new(Arc::new(CredentialSnapshot::default())),
        };
        store.reload()?;
        Ok(store)
    }

    /// A fixed store with no backing file.
    pub fn from_snapshot(snapshot: CredentialSnapshot) -> Self {
        Self {
            path: None,
            vault: Vault::default_location(),
            current: RwLock::new(Arc::new(snapshot)),
        }
    }

    pub fn empty() -> Self {
        Self::from_snapshot(CredentialSnapshot::default())
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// The current snapshot. Holding it keeps a consistent view even if a
    /// reload happens meanwhile.
    pub fn snapshot(&self) -> Arc<CredentialSnapshot> {
        let guard = self.current.read().unwrap_or_else(|p| p.into_inner());
        Arc::clone(&guard)
    }

    /// Swap in a new snapshot.
    pub fn replace(&self, snapshot: CredentialSnapshot) {
        let mut guard = self.current.write().unwrap_or_else(|p| p.into_inner());
        *guard = Arc::new(snapshot);
    }

    /// Re-read the backing file and swap the snapshot. Returns the number of
    /// loaded credentials. On error the previous snapshot stays in place.
    pub fn reload(&self) -> Result<usize, CredentialError> {
        let Some(path) = &self.path else {
            return Ok(self.snapshot().len());
        };

        let snapshot = if path.exists() {
            let content = std::fs::read_to_string(path)?;
            CredentialSnapshot::parse(&content, &self.vault)
        } else {
            info!(path = %path.display(), "No credentials file found, store is empty");
            CredentialSnapshot::default()
        };

        let count = snapshot.len();
        self.replace(snapshot);
        info!(count, "Loaded credentials");
        Ok(count)
    }

    pub fn resolve(&self, hint: &str) -> Option<Secret> {
        self.snapshot().resolve(hint)
    }
}
