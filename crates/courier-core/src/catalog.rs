// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Capability catalog: the static descriptive list of what executors can do.
//!
//! The catalog is routing metadata only; the core never enforces it. It is
//! held in an explicitly constructed, injectable cache with a bounded TTL
//! rather than a process-wide global.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::error::CourierError;

/// One capability an executor advertises.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Capability {
    pub id: String,
    pub description: String,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    capability: Vec<Capability>,
}

/// Parse a capability catalog from its TOML representation
/// (`[[capability]]` array-of-tables).
pub fn parse_catalog(toml_content: &str) -> Result<Vec<Capability>, CourierError> {
    let file: CatalogFile =
        toml::from_str(toml_content).map_err(|e| CourierError::Config(e.to_string()))?;
    Ok(file.capability)
}

/// TTL-bounded cache over a capability source.
///
/// `get` returns the cached list while it is fresh and re-invokes the loader
/// once it goes stale; `invalidate` forces the next `get` to reload.
pub struct CatalogCache {
    ttl: Duration,
    loader: Box<dyn Fn() -> Result<Vec<Capability>, CourierError> + Send + Sync>,
    cached: Mutex<Option<(DateTime<Utc>, Vec<Capability>)>>,
}

impl CatalogCache {
    pub fn new<F>(ttl: std::time::Duration, loader: F) -> Self
    where
        F: Fn() -> Result<Vec<Capability>, CourierError> + Send + Sync + 'static,
    {
        Self {
            ttl: Duration::from_std(ttl).unwrap_or(Duration::seconds(300)),
            loader: Box::new(loader),
            cached: Mutex::new(None),
        }
    }

    /// The current capability list, reloading if the cache is stale.
    pub async fn get(&self) -> Result<Vec<Capability>, CourierError> {
        let mut cached = self.cached.lock().await;
        let now = Utc::now();
        if let Some((loaded_at, entries)) = cached.as_ref() {
            if now - *loaded_at < self.ttl {
                return Ok(entries.clone());
            }
        }
        let entries = (self.loader)()?;
        *cached = Some((now, entries.clone()));
        Ok(entries)
    }

    /// Drop the cached list so the next `get` reloads.
    pub async fn invalidate(&self) {
        *self.cached.lock().await = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Arc;

    #[test]
    fn parses_capability_toml() {
        let toml = r#"
[[capability]]
id = "errand-run"
description = "Pick up or drop off items nearby"
tags = ["outdoors", "driving"]

[[capability]]
id = "home-check"
description = "Physically inspect something at home"
"#;
        let caps = parse_catalog(toml).unwrap();
        assert_eq!(caps.len(), 2);
        assert_eq!(caps[0].id, "errand-run");
        assert_eq!(caps[0].tags, vec!["outdoors", "driving"]);
        assert!(caps[1].tags.is_empty());
    }

    #[tokio::test]
    async fn cache_serves_fresh_entries_without_reloading() {
        let loads = Arc::new(AtomicU32::new(0));
        let counter = loads.clone();
        let cache = CatalogCache::new(std::time::Duration::from_secs(60), move || {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(vec![Capability {
                id: "home-check".into(),
                description: "inspect".into(),
                tags: vec![],
            }])
        });

        cache.get().await.unwrap();
        cache.get().await.unwrap();
        assert_eq!(loads.load(Ordering::SeqCst), 1);

        cache.invalidate().await;
        cache.get().await.unwrap();
        assert_eq!(loads.load(Ordering::SeqCst), 2);
    }
}
