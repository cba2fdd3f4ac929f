// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

//! Tracing subscriber setup for binaries and tests.
//!
//! The library only emits `tracing` events; installing a subscriber is up to
//! the host. These helpers install the `fmt` subscriber filtered by
//! `RUST_LOG`.

use tracing_subscriber::EnvFilter;

fn env_filter(default_directive: &str) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_directive))
}

/// Install the global subscriber. Fails if one is already installed.
pub fn init(default_directive: &str) -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter(default_directive))
        .with_thread_names(true)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to install tracing subscriber: {}", e))
}

/// Install a test-writer subscriber once; later calls are no-ops.
pub fn try_init_for_tests() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter("warn"))
        .with_thread_names(true)
        .with_test_writer()
        .try_init();
}
