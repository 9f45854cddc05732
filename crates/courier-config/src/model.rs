// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Courier dispatch engine.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, producing actionable diagnostics.

use serde::{Deserialize, Serialize};

/// Top-level Courier configuration.
///
/// Loaded from TOML files following the XDG hierarchy, with environment
/// variable overrides. All sections are optional and default to sensible
/// values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CourierConfig {
    /// Node identity and logging settings.
    #[serde(default)]
    pub node: NodeConfig,

    /// Thread storage backend settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// Optimistic-concurrency retry settings for the tree backend.
    #[serde(default)]
    pub retry: RetryConfig,

    /// External-change polling settings.
    #[serde(default)]
    pub poll: PollConfig,

    /// Capability catalog settings.
    #[serde(default)]
    pub catalog: CatalogConfig,
}

/// Node identity and logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct NodeConfig {
    /// Actor id this node signs system acks with.
    #[serde(default = "default_node_name")]
    pub name: String,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            name: default_node_name(),
            log_level: default_log_level(),
        }
    }
}

fn default_node_name() -> String {
    "courier".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Which transactional backend a node commits threads through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BackendKind {
    /// Local filesystem under `storage.root`.
    #[default]
    Fs,
    /// Remote tree-oriented commit API.
    Tree,
}

/// Thread storage backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Backend selection.
    #[serde(default)]
    pub backend: BackendKind,

    /// Root path (filesystem backend) or repository path (tree backend).
    #[serde(default = "default_storage_root")]
    pub root: String,

    /// Branch the tree backend advances on commit.
    #[serde(default = "default_branch")]
    pub branch: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: BackendKind::Fs,
            root: default_storage_root(),
            branch: default_branch(),
        }
    }
}

fn default_storage_root() -> String {
    "./threads".to_string()
}

fn default_branch() -> String {
    "main".to_string()
}

/// Optimistic-concurrency retry configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RetryConfig {
    /// Attempts before a commit conflict surfaces to the caller.
    #[serde(default = "default_attempts")]
    pub attempts: u32,

    /// Base backoff between attempts, in milliseconds (jittered).
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            attempts: default_attempts(),
            backoff_ms: default_backoff_ms(),
        }
    }
}

fn default_attempts() -> u32 {
    3
}

fn default_backoff_ms() -> u64 {
    50
}

/// External-change polling configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct PollConfig {
    /// Whether the change poller runs at all.
    #[serde(default = "default_poll_enabled")]
    pub enabled: bool,

    /// Fixed poll interval in seconds. Missed ticks are skipped, not queued.
    #[serde(default = "default_poll_interval")]
    pub interval_secs: u64,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            enabled: default_poll_enabled(),
            interval_secs: default_poll_interval(),
        }
    }
}

fn default_poll_enabled() -> bool {
    true
}

fn default_poll_interval() -> u64 {
    30
}

/// Capability catalog configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CatalogConfig {
    /// Path to the catalog TOML file, if any.
    #[serde(default)]
    pub path: Option<String>,

    /// Cache TTL for the loaded catalog, in seconds.
    #[serde(default = "default_catalog_ttl")]
    pub ttl_secs: u64,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            path: None,
            ttl_secs: default_catalog_ttl(),
        }
    }
}

fn default_catalog_ttl() -> u64 {
    300
}
