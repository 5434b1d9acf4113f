use crate::config::ProcessingConfig;
use crate::error::{ChunkerError, Result};
use serde::Serialize;
use serde_json::Value;
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::broadcast;

const CHANGE_CHANNEL_CAPACITY: usize = 16;

/// Notification published after a config update
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfigChange {
    pub version: u64,
    /// Dotted paths of the fields whose value changed
    pub changed: Vec<String>,
}

#[derive(Debug)]
struct Versioned {
    version: u64,
    config: Arc<ProcessingConfig>,
}

/// Versioned holder of the active [`ProcessingConfig`].
///
/// Readers take an `Arc` snapshot and keep using it for the whole run; an
/// update swaps in a new snapshot, so nobody observes a half-applied change.
#[derive(Debug)]
pub struct ConfigStore {
    current: RwLock<Versioned>,
    changes: broadcast::Sender<ConfigChange>,
}

impl ConfigStore {
    /// Create a store, rejecting an invalid initial config
    pub fn new(config: ProcessingConfig) -> Result<Self> {
        config.validate().map_err(ChunkerError::InvalidConfig)?;
        let (changes, _) = broadcast::channel(CHANGE_CHANNEL_CAPACITY);
        Ok(Self {
            current: RwLock::new(Versioned {
                version: 1,
                config: Arc::new(config),
            }),
            changes,
        })
    }

    /// Current config snapshot
    pub fn snapshot(&self) -> Arc<ProcessingConfig> {
        let guard = self.current.read().unwrap_or_else(PoisonError::into_inner);
        Arc::clone(&guard.config)
    }

    pub fn version(&self) -> u64 {
        self.current
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .version
    }

    /// Receive a [`ConfigChange`] for every accepted update from now on
    pub fn subscribe(&self) -> broadcast::Receiver<ConfigChange> {
        self.changes.subscribe()
    }

    /// Replace the whole config.
    ///
    /// Invalid configs are rejected and leave the version untouched. An update
    /// that changes nothing is accepted without bumping the version.
    pub fn update(&self, config: ProcessingConfig) -> Result<ConfigChange> {
        config.validate().map_err(ChunkerError::InvalidConfig)?;

        let change = {
            let mut current = self.current.write().unwrap_or_else(PoisonError::into_inner);
            let changed = diff_configs(&current.config, &config)?;
            if changed.is_empty() {
                return Ok(ConfigChange {
                    version: current.version,
                    changed,
                });
            }
            current.version += 1;
            current.config = Arc::new(config);
            ConfigChange {
                version: current.version,
                changed,
            }
        };

        log::info!(
            "Config updated to version {} ({} field(s) changed)",
            change.version,
            change.changed.len()
        );
        // No subscribers is fine
        let _ = self.changes.send(change.clone());
        Ok(change)
    }

    /// Apply an edit to a copy of the current config and publish it
    pub fn modify(&self, edit: impl FnOnce(&mut ProcessingConfig)) -> Result<ConfigChange> {
        let mut next = (*self.snapshot()).clone();
        edit(&mut next);
        self.update(next)
    }
}

fn diff_configs(old: &ProcessingConfig, new: &ProcessingConfig) -> Result<Vec<String>> {
    let old = serde_json::to_value(old).map_err(|e| ChunkerError::Other(e.to_string()))?;
    let new = serde_json::to_value(new).map_err(|e| ChunkerError::Other(e.to_string()))?;
    let mut changed = Vec::new();
    collect_changes("", &old, &new, &mut changed);
    Ok(changed)
}

fn collect_changes(prefix: &str, old: &Value, new: &Value, out: &mut Vec<String>) {
    match (old, new) {
        (Value::Object(a), Value::Object(b)) => {
            let mut keys: Vec<&String> = a.keys().chain(b.keys()).collect();
            keys.sort();
            keys.dedup();
            for key in keys {
                let path = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{prefix}.{key}")
                };
                match (a.get(key), b.get(key)) {
                    (Some(x), Some(y)) => collect_changes(&path, x, y, out),
                    _ => out.push(path),
                }
            }
        }
        _ if old != new => out.push(prefix.to_string()),
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn update_bumps_version_and_reports_fields() {
        let store = ConfigStore::new(ProcessingConfig::default()).unwrap();
        let mut rx = store.subscribe();

        let change = store
            .modify(|c| {
                c.chunking.max_chunk_size = 3000;
                c.guard.max_errors = 9;
            })
            .unwrap();

        assert_eq!(change.version, 2);
        assert_eq!(
            change.changed,
            vec![
                "chunking.max_chunk_size".to_string(),
                "guard.max_errors".to_string()
            ]
        );
        assert_eq!(rx.try_recv().unwrap(), change);
        assert_eq!(store.snapshot().chunking.max_chunk_size, 3000);
    }

    #[test]
    fn old_snapshots_are_unaffected() {
        let store = ConfigStore::new(ProcessingConfig::default()).unwrap();
        let before = store.snapshot();
        store.modify(|c| c.chunking.overlap_size = 10).unwrap();
        assert_eq!(before.chunking.overlap_size, 200);
        assert_eq!(store.snapshot().chunking.overlap_size, 10);
    }

    #[test]
    fn invalid_update_is_rejected() {
        let store = ConfigStore::new(ProcessingConfig::default()).unwrap();
        let err = store
            .modify(|c| c.chunking.min_chunk_size = 5000)
            .unwrap_err();
        assert!(matches!(err, ChunkerError::InvalidConfig(_)));
        assert_eq!(store.version(), 1);
    }

    #[test]
    fn noop_update_keeps_version() {
        let store = ConfigStore::new(ProcessingConfig::default()).unwrap();
        let change = store.update(ProcessingConfig::default()).unwrap();
        assert_eq!(change.version, 1);
        assert!(change.changed.is_empty());
    }
}
