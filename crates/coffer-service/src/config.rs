// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Configuration of the backup orchestrator.

use std::path::PathBuf;

use coffer_core::crypto;
use coffer_module_client::{ModuleClientConfig, TlsConfig};
use serde::{Deserialize, Serialize};

use crate::utils::LoadConfig;

/// Configuration of the orchestrator service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrchestratorConfig {
    /// Root of the artifact tree on the local filesystem.
    #[serde(default = "defaults::storage_path")]
    pub storage_path: PathBuf,
    /// PBKDF2 iteration count for payload encryption. The envelope does not encode the
    /// count; changing it invalidates previously encrypted artifacts.
    #[serde(default = "defaults::pbkdf2_iterations")]
    pub pbkdf2_iterations: u32,
    /// Upper bound on the page size of list operations.
    #[serde(default = "defaults::page_size_cap")]
    pub page_size_cap: i32,
    /// Connection policy for calls into module backup services.
    #[serde(default)]
    pub module_client: ModuleClientConfig,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            storage_path: defaults::storage_path(),
            pbkdf2_iterations: defaults::pbkdf2_iterations(),
            page_size_cap: defaults::page_size_cap(),
            module_client: ModuleClientConfig::default(),
        }
    }
}

impl OrchestratorConfig {
    /// Applies the documented `BACKUP_*` environment variables over the defaults:
    /// `BACKUP_STORAGE_PATH` plus the TLS material paths.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(path) = std::env::var("BACKUP_STORAGE_PATH") {
            config.storage_path = path.into();
        }
        config.module_client.tls = TlsConfig::from_env();
        config
    }
}

impl LoadConfig for OrchestratorConfig {}

/// Orchestrator-related default values.
pub mod defaults {
    use std::path::PathBuf;

    use super::crypto;

    /// Default root of the artifact tree.
    pub fn storage_path() -> PathBuf {
        PathBuf::from("/data/backups")
    }

    /// Default PBKDF2 iteration count.
    pub fn pbkdf2_iterations() -> u32 {
        crypto::DEFAULT_PBKDF2_ITERATIONS
    }

    /// Default upper bound on list page sizes.
    pub fn page_size_cap() -> i32 {
        100
    }
}
