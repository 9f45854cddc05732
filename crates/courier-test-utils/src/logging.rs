// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Tracing setup for tests.

use std::sync::Once;

static INIT: Once = Once::new();

/// Install a tracing subscriber for test output, once per process.
///
/// Honors `RUST_LOG`; defaults to `courier` crates at debug. Safe to call
/// from every test.
pub fn init_test_logging() {
    INIT.call_once(|| {
        use tracing_subscriber::EnvFilter;

        let filter = EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("courier_core=debug,courier_storage=debug,warn"));
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(true)
            .with_test_writer()
            .try_init()
            .ok();
    });
}
