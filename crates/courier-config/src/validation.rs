// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Validates semantic constraints that cannot be expressed via serde
//! attributes, such as non-empty paths and non-zero retry budgets.

use crate::diagnostic::ConfigError;
use crate::model::CourierConfig;

/// Validate a deserialized configuration for semantic correctness.
///
/// Collects all failures rather than failing fast.
pub fn validate_config(config: &CourierConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    if config.node.name.trim().is_empty() {
        errors.push(ConfigError::Validation {
            message: "node.name must not be empty".to_string(),
        });
    }

    if config.storage.root.trim().is_empty() {
        errors.push(ConfigError::Validation {
            message: "storage.root must not be empty".to_string(),
        });
    }

    if config.retry.attempts == 0 {
        errors.push(ConfigError::Validation {
            message: "retry.attempts must be at least 1".to_string(),
        });
    }

    if config.poll.enabled && config.poll.interval_secs == 0 {
        errors.push(ConfigError::Validation {
            message: "poll.interval_secs must be at least 1 when polling is enabled".to_string(),
        });
    }

    let valid_levels = ["trace", "debug", "info", "warn", "error"];
    if !valid_levels.contains(&config.node.log_level.as_str()) {
        errors.push(ConfigError::Validation {
            message: format!(
                "node.log_level `{}` is not one of trace, debug, info, warn, error",
                config.node.log_level
            ),
        });
    }

    if errors.is_empty() { Ok(()) } else { Err(errors) }
}
