// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Request and response shapes of the orchestrator operations.
//!
//! The server transport layer maps its wire messages onto these types; the engine
//! itself never sees transport concerns.

use coffer_core::{BackupInfo, EntityImportResult, FullBackupInfo, ModuleTarget, RestoreMode};

/// Request to back up a single module.
#[derive(Debug, Clone)]
pub struct CreateModuleBackupRequest {
    /// The module to export from.
    pub target: ModuleTarget,
    /// Tenant scope; an explicit 0 requests a platform-wide backup.
    pub tenant_id: Option<u32>,
    /// Free-form description recorded on the backup.
    pub description: String,
    /// Password for encrypting the payload at rest; empty disables encryption.
    pub password: String,
    /// Whether the module should include secret material in the export.
    pub include_secrets: bool,
}

/// Request to back up several modules under one manifest.
#[derive(Debug, Clone)]
pub struct CreateFullBackupRequest {
    /// The modules to export from; must be non-empty.
    pub targets: Vec<ModuleTarget>,
    /// Tenant scope; an explicit 0 requests a platform-wide backup.
    pub tenant_id: Option<u32>,
    /// Free-form description recorded on the manifest.
    pub description: String,
    /// Password for encrypting the payloads at rest; empty disables encryption.
    pub password: String,
    /// Whether the modules should include secret material in the export.
    pub include_secrets: bool,
}

/// Request to restore a single module backup into a target module.
#[derive(Debug, Clone)]
pub struct RestoreModuleBackupRequest {
    /// The module to reinject into.
    pub target: ModuleTarget,
    /// The backup to restore.
    pub backup_id: String,
    /// Password for decrypting the payload, if it is encrypted.
    pub password: String,
    /// How the module should reconcile the payload with its existing data.
    pub mode: RestoreMode,
}

/// Request to restore a full backup into one or more target modules.
#[derive(Debug, Clone)]
pub struct RestoreFullBackupRequest {
    /// The modules to reinject into; modules in the manifest without a matching
    /// target are reported as failed. Must be non-empty.
    pub targets: Vec<ModuleTarget>,
    /// The full backup to restore.
    pub backup_id: String,
    /// Password for decrypting the payloads, if they are encrypted.
    pub password: String,
    /// How the modules should reconcile the payloads with their existing data.
    pub mode: RestoreMode,
}

/// Request to list module backups.
#[derive(Debug, Clone, Default)]
pub struct ListBackupsRequest {
    /// Only list backups of this module, when set.
    pub module_id: Option<String>,
    /// Only list backups with exactly this tenant id, when set.
    pub tenant_id: Option<u32>,
    /// 1-based page number; values below 1 are normalized to 1.
    pub page: i32,
    /// Page size; values below 1 are normalized to 20 and capped by configuration.
    pub page_size: i32,
}

/// One page of module backups.
#[derive(Debug, Clone, Default)]
pub struct ListBackupsResponse {
    /// The page contents, sorted by creation time descending.
    pub backups: Vec<BackupInfo>,
    /// The total number of backups matching the filter, before pagination.
    pub total: i32,
}

/// Request to list full backups.
#[derive(Debug, Clone, Default)]
pub struct ListFullBackupsRequest {
    /// Only list backups with exactly this tenant id, when set.
    pub tenant_id: Option<u32>,
    /// 1-based page number; values below 1 are normalized to 1.
    pub page: i32,
    /// Page size; values below 1 are normalized to 20 and capped by configuration.
    pub page_size: i32,
}

/// One page of full backups.
#[derive(Debug, Clone, Default)]
pub struct ListFullBackupsResponse {
    /// The page contents, sorted by creation time descending.
    pub backups: Vec<FullBackupInfo>,
    /// The total number of backups matching the filter, before pagination.
    pub total: i32,
}

/// The decoded payload of a backup, ready for download.
#[derive(Debug, Clone)]
pub struct DownloadBackupResponse {
    /// The decompressed, decrypted payload.
    pub data: Vec<u8>,
    /// Suggested filename: `<module_id>-<id[..8]>-<YYYYMMDD>.json`.
    pub filename: String,
}

/// The outcome of restoring one module during a full restore.
#[derive(Debug, Clone, Default)]
pub struct ModuleRestoreResult {
    /// The module the restore was addressed to.
    pub module_id: String,
    /// Whether the module's import succeeded.
    pub success: bool,
    /// The failure description when `success` is false.
    pub error: String,
    /// Per-entity-kind counters reported by the module.
    pub results: Vec<EntityImportResult>,
    /// Warnings reported by the module.
    pub warnings: Vec<String>,
}

/// The outcome of a full restore.
#[derive(Debug, Clone, Default)]
pub struct RestoreFullBackupResponse {
    /// True iff every emitted module result succeeded.
    pub success: bool,
    /// One entry per completed module backup in manifest order.
    pub module_results: Vec<ModuleRestoreResult>,
}
