//! Memoized provider connections.

use dashmap::DashMap;

use crate::config::ProviderSettings;
use crate::error::LLMError;
use crate::provider::{ConnectionFactory, DynProvider};

/// Which orchestration path a connection serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ConnectionMode {
    Blocking,
    Async,
}

/// One connection per `(provider, mode)`, built lazily on first use.
///
/// Lookups never hold a lock across construction: two threads racing on an
/// empty slot may both build a connection, and the first one stored wins.
/// Construction failures are returned to the caller and never stored.
#[derive(Default)]
pub struct ConnectionCache {
    entries: DashMap<(String, ConnectionMode), DynProvider>,
}

impl ConnectionCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached connection for `settings.provider`, building it with
    /// `factory` when absent.
    pub fn get_or_connect(
        &self,
        settings: &ProviderSettings,
        mode: ConnectionMode,
        factory: &dyn ConnectionFactory,
    ) -> Result<DynProvider, LLMError> {
        let key = (settings.provider.clone(), mode);
        if let Some(existing) = self.entries.get(&key) {
            return Ok(existing.value().clone());
        }

        let built = factory.connect(settings, mode)?;
        let stored = self.entries.entry(key).or_insert(built);
        Ok(stored.value().clone())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
