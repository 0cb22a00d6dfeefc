//! Sticky provider overrides persisted per logical context.
//!
//! The state file maps a hashed context identifier to
//! `{ requested provider -> provider that last served it }`:
//!
//! ```json
//! {
//!   "5f1c…": { "deepseek": "gemini" }
//! }
//! ```
//!
//! Persistence is best-effort. Read and write failures are logged and
//! swallowed; a missing or corrupt file behaves like an empty one.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use sha2::{Digest, Sha256};
use tracing::{debug, warn};

/// Default location of the state file, relative to the working directory.
pub const DEFAULT_STATE_PATH: &str = ".agent/llm_state.json";

type StateFile = BTreeMap<String, BTreeMap<String, String>>;

/// One-way, stable hash of a caller-supplied context identifier.
///
/// # Examples
///
/// ```
/// use dialecta_llm::overrides::ContextKey;
///
/// let a = ContextKey::new("/work/paper.md");
/// assert_eq!(a, ContextKey::new("/work/paper.md"));
/// assert_eq!(a.as_str().len(), 64);
/// assert!(!a.as_str().contains("paper"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ContextKey(String);

impl ContextKey {
    pub fn new(identifier: impl AsRef<str>) -> Self {
        let digest = Sha256::digest(identifier.as_ref().as_bytes());
        Self(format!("{digest:x}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

/// Storage for sticky overrides.
///
/// Both operations are no-ops when `context` is `None`.
pub trait OverrideStore: Send + Sync {
    /// Overrides recorded for `context`.
    fn load(&self, context: Option<&ContextKey>) -> HashMap<String, String>;

    /// Records that `stable` served a request originally meant for `original`.
    fn save(&self, context: Option<&ContextKey>, original: &str, stable: &str);
}

/// JSON file store; every save re-reads the file, merges one key and rewrites it.
///
/// There is no locking: concurrent writers race and the last write wins.
#[derive(Debug, Clone)]
pub struct FileOverrideStore {
    path: PathBuf,
}

impl FileOverrideStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn read_state(&self) -> StateFile {
        let text = match fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(err) => {
                debug!(path = %self.path.display(), error = %err, "override state not readable");
                return StateFile::new();
            }
        };
        serde_json::from_str(&text).unwrap_or_else(|err| {
            warn!(path = %self.path.display(), error = %err, "override state is corrupt, ignoring it");
            StateFile::new()
        })
    }

    fn write_state(&self, state: &StateFile) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }
        let mut text = serde_json::to_string_pretty(state)?;
        text.push('\n');
        fs::write(&self.path, text)
    }
}

impl Default for FileOverrideStore {
    fn default() -> Self {
        Self::new(DEFAULT_STATE_PATH)
    }
}

impl OverrideStore for FileOverrideStore {
    fn load(&self, context: Option<&ContextKey>) -> HashMap<String, String> {
        let Some(context) = context else {
            return HashMap::new();
        };
        self.read_state()
            .remove(context.as_str())
            .map(|entries| entries.into_iter().collect())
            .unwrap_or_default()
    }

    fn save(&self, context: Option<&ContextKey>, original: &str, stable: &str) {
        let Some(context) = context else {
            return;
        };
        let mut state = self.read_state();
        state
            .entry(context.as_str().to_string())
            .or_default()
            .insert(original.to_string(), stable.to_string());
        if let Err(err) = self.write_state(&state) {
            warn!(path = %self.path.display(), error = %err, "failed to persist provider override");
        }
    }
}

/// In-process store, handy for tests and short-lived tools.
#[derive(Debug, Default)]
pub struct MemoryOverrideStore {
    state: Mutex<HashMap<ContextKey, HashMap<String, String>>>,
}

impl MemoryOverrideStore {
    pub fn new() -> Self {
        Self::default()
    }
}

impl OverrideStore for MemoryOverrideStore {
    fn load(&self, context: Option<&ContextKey>) -> HashMap<String, String> {
        let Some(context) = context else {
            return HashMap::new();
        };
        match self.state.lock() {
            Ok(state) => state.get(context).cloned().unwrap_or_default(),
            Err(_) => HashMap::new(),
        }
    }

    fn save(&self, context: Option<&ContextKey>, original: &str, stable: &str) {
        let Some(context) = context else {
            return;
        };
        if let Ok(mut state) = self.state.lock() {
            state
                .entry(context.clone())
                .or_default()
                .insert(original.to_string(), stable.to_string());
        }
    }
}
