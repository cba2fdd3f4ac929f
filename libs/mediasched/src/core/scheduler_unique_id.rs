// Copyright (c) 2025 Jonathan Fontanez
// SPDX-License-Identifier: BUSL-1.1

use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::Deref;

/// Unique identifier for a scheduler instance.
///
/// Generated automatically or loaded from the `MEDIASCHED_SCHEDULER_ID`
/// environment variable. Prefixes every log line and worker thread name.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SchedulerUniqueId(String);

impl SchedulerUniqueId {
    pub const ENV_VAR: &'static str = "MEDIASCHED_SCHEDULER_ID";

    pub fn new() -> Self {
        Self::from_env_or_generate()
    }

    /// Load from `MEDIASCHED_SCHEDULER_ID`, or generate a new id.
    pub fn from_env_or_generate() -> Self {
        if let Ok(id) = std::env::var(Self::ENV_VAR) {
            tracing::info!("Using scheduler ID from {}: {}", Self::ENV_VAR, id);
            return Self(id);
        }
        let id = format!("S{}", cuid2::create_id());
        tracing::trace!("Generated scheduler ID: {}", id);
        Self(id)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SchedulerUniqueId {
    fn default() -> Self {
        Self::new()
    }
}

impl Deref for SchedulerUniqueId {
    type Target = str;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl fmt::Display for SchedulerUniqueId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for SchedulerUniqueId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}
