// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! Runtime configuration loaded from TOML files or constructed programmatically.
//!
//! # TOML Format
//! ```toml
//! workspace_limit = "2G"
//! alignment = 64
//! dispatch = "queued"
//! queue_capacity = 64
//! memoize_shapes = true
//! enable_profiling = true
//! ```
//!
//! Every key is optional; missing keys take the [`Default`] value.

use crate::RuntimeError;
use memory_manager::MemoryBudget;
use std::path::Path;

/// How node launches reach the stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DispatchMode {
    /// Each launch is made from the calling thread during Execute.
    #[default]
    Synchronous,
    /// Launches are queued to a dispatcher thread; Execute returns at once.
    Queued,
}

/// Configuration for an [`ExecutionContext`](crate::ExecutionContext).
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Ceiling on plan workspace size (human-readable, e.g. `"2G"`).
    pub workspace_limit: String,
    /// Byte alignment of every workspace region. Must be a power of two.
    pub alignment: usize,
    pub dispatch: DispatchMode,
    /// Bound of the dispatcher queue, in launches.
    pub queue_capacity: usize,
    /// Skip shape inference and planning when input shapes are unchanged.
    pub memoize_shapes: bool,
    /// Record per-node dispatch timings.
    pub enable_profiling: bool,
}

impl RuntimeConfig {
    /// Loads configuration from a TOML file.
    pub fn from_file(path: &Path) -> Result<Self, RuntimeError> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            RuntimeError::Config(format!("cannot read config '{}': {e}", path.display()))
        })?;
        Self::from_toml(&content)
    }

    /// Parses configuration from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self, RuntimeError> {
        toml::from_str(toml_str).map_err(|e| RuntimeError::Config(format!("TOML parse error: {e}")))
    }

    /// Serialises configuration to TOML.
    pub fn to_toml(&self) -> Result<String, RuntimeError> {
        toml::to_string_pretty(self)
            .map_err(|e| RuntimeError::Config(format!("TOML serialise error: {e}")))
    }

    /// Parses the workspace limit string.
    pub fn parse_limit(&self) -> Result<MemoryBudget, RuntimeError> {
        MemoryBudget::parse(&self.workspace_limit)
            .map_err(|e| RuntimeError::Config(format!("invalid workspace_limit: {e}")))
    }

    /// Checks every field and returns the parsed workspace limit.
    pub fn validate(&self) -> Result<MemoryBudget, RuntimeError> {
        if !self.alignment.is_power_of_two() {
            return Err(RuntimeError::Config(format!(
                "alignment must be a power of two, got {}",
                self.alignment
            )));
        }
        if self.dispatch == DispatchMode::Queued && self.queue_capacity == 0 {
            return Err(RuntimeError::Config(
                "queue_capacity must be at least 1 in queued mode".into(),
            ));
        }
        self.parse_limit()
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            workspace_limit: "2G".to_string(),
            alignment: 64,
            dispatch: DispatchMode::Synchronous,
            queue_capacity: 64,
            memoize_shapes: true,
            enable_profiling: true,
        }
    }
}
