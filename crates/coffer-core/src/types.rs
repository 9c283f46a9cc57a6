// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Domain entities shared between the orchestration engine, the artifact store, and the
//! module client.

use std::{collections::BTreeMap, fmt};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Addresses one participating module instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleTarget {
    /// The module identifier, e.g. `"users"`.
    pub module_id: String,
    /// The gRPC endpoint of the running module instance, e.g. `"users:7000"`.
    pub grpc_endpoint: String,
}

impl ModuleTarget {
    /// Creates a new target from the module identifier and its endpoint.
    pub fn new(module_id: impl Into<String>, grpc_endpoint: impl Into<String>) -> Self {
        Self {
            module_id: module_id.into(),
            grpc_endpoint: grpc_endpoint.into(),
        }
    }
}

/// The terminal status of a single module backup.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackupStatus {
    /// The module's state was exported and its payload persisted.
    Completed,
    /// The export failed; a metadata record exists but no payload does.
    Failed,
}

impl fmt::Display for BackupStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackupStatus::Completed => write!(f, "completed"),
            BackupStatus::Failed => write!(f, "failed"),
        }
    }
}

/// The aggregate status of a full backup over all of its module backups.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FullBackupStatus {
    /// Every module backup completed.
    Completed,
    /// Some module backups completed and some failed.
    Partial,
    /// Every module backup failed.
    Failed,
}

impl FullBackupStatus {
    /// Derives the aggregate status from the per-module backups.
    ///
    /// `Completed` iff every entry completed, `Failed` iff every entry failed, `Partial`
    /// otherwise. An empty slice derives `Completed`.
    pub fn derive(module_backups: &[BackupInfo]) -> Self {
        if module_backups
            .iter()
            .all(|backup| backup.status == BackupStatus::Completed)
        {
            FullBackupStatus::Completed
        } else if module_backups
            .iter()
            .all(|backup| backup.status == BackupStatus::Failed)
        {
            FullBackupStatus::Failed
        } else {
            FullBackupStatus::Partial
        }
    }
}

impl fmt::Display for FullBackupStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FullBackupStatus::Completed => write!(f, "completed"),
            FullBackupStatus::Partial => write!(f, "partial"),
            FullBackupStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Metadata describing a single module backup.
///
/// Immutable once persisted; the `encrypted` flag mirrors the payload file suffix and is
/// authoritative for consumers that cannot inspect the filesystem.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackupInfo {
    /// The backup id (a UUID); empty for failed entries embedded in a manifest.
    #[serde(default)]
    pub id: String,
    /// The module this backup was taken from.
    #[serde(default)]
    pub module_id: String,
    /// Free-form description supplied by the caller.
    #[serde(default)]
    pub description: String,
    /// The tenant scope of the backup; 0 denotes a platform-wide backup.
    #[serde(default)]
    pub tenant_id: u32,
    /// True iff the backup was taken tenant-agnostic (an explicit tenant id of 0).
    #[serde(default)]
    pub full_backup: bool,
    /// The terminal status of the backup.
    pub status: BackupStatus,
    /// Size of the exported payload in bytes before compression. Unspecified for failed
    /// backups.
    #[serde(default)]
    pub size_bytes: i64,
    /// Module-defined entity kind to count mapping, as reported by the export.
    #[serde(default)]
    pub entity_counts: BTreeMap<String, i64>,
    /// Creation time of the backup.
    pub created_at: DateTime<Utc>,
    /// Username of the caller that created the backup.
    #[serde(default)]
    pub created_by: String,
    /// The module's schema version at export time.
    #[serde(default)]
    pub version: String,
    /// True iff the payload file carries the password envelope.
    #[serde(default)]
    pub encrypted: bool,
    /// Warnings collected while creating the backup; a failed backup carries at least the
    /// export error here.
    #[serde(default)]
    pub warnings: Vec<String>,
}

/// The manifest of a full backup spanning multiple modules.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FullBackupInfo {
    /// The backup id (a UUID).
    #[serde(default)]
    pub id: String,
    /// Free-form description supplied by the caller.
    #[serde(default)]
    pub description: String,
    /// The tenant scope of the backup; 0 denotes a platform-wide backup.
    #[serde(default)]
    pub tenant_id: u32,
    /// True iff the backup was taken tenant-agnostic (an explicit tenant id of 0).
    #[serde(default)]
    pub full_backup: bool,
    /// The aggregate status over all module backups.
    pub status: FullBackupStatus,
    /// Sum of `size_bytes` over the completed module backups.
    #[serde(default)]
    pub total_size_bytes: i64,
    /// One entry per requested target, in target order. Payload files exist only for
    /// completed entries.
    #[serde(default)]
    pub module_backups: Vec<BackupInfo>,
    /// Creation time of the backup.
    pub created_at: DateTime<Utc>,
    /// Username of the caller that created the backup.
    #[serde(default)]
    pub created_by: String,
    /// Per-module export errors, one per failed entry.
    #[serde(default)]
    pub errors: Vec<String>,
    /// True iff the per-module payload files carry the password envelope.
    #[serde(default)]
    pub encrypted: bool,
}

/// The outcome of a module's `ExportBackup` call. Never persisted.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportResult {
    /// The module's opaque serialized state.
    pub data: Vec<u8>,
    /// The module identifier as reported by the module itself.
    pub module: String,
    /// The module's schema version.
    pub version: String,
    /// The tenant scope the module actually exported.
    pub tenant_id: u32,
    /// Module-defined entity kind to count mapping.
    pub entity_counts: BTreeMap<String, i64>,
}

/// Per-entity-kind counters reported by a module's `ImportBackup` call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EntityImportResult {
    /// The module-defined entity kind.
    pub entity_type: String,
    /// Total number of entities of this kind in the payload.
    pub total: i64,
    /// Number of entities created.
    pub created: i64,
    /// Number of entities updated in place.
    pub updated: i64,
    /// Number of entities skipped.
    pub skipped: i64,
    /// Number of entities that failed to import.
    pub failed: i64,
}

/// The outcome of a module's `ImportBackup` call. Never persisted.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ImportOutcome {
    /// Whether the module reports the import as successful overall.
    pub success: bool,
    /// Per-entity-kind counters.
    pub results: Vec<EntityImportResult>,
    /// Warnings reported by the module.
    pub warnings: Vec<String>,
}

/// How a module should reconcile imported state with its existing data.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RestoreMode {
    /// Merge imported entities into the existing data.
    #[default]
    Merge,
    /// Replace existing data with the imported entities.
    Replace,
    /// Validate the payload without applying any change.
    DryRun,
}

/// Identity of the caller on whose behalf the orchestrator acts.
///
/// Extracted from the `x-md-global-*` request headers by the server layer and forwarded
/// verbatim on every orchestrator-to-module hop.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CallerContext {
    /// The caller's tenant id; `None` is forwarded as tenant 0.
    pub tenant_id: Option<u32>,
    /// The caller's user id, if present on the request.
    pub user_id: Option<String>,
    /// The caller's username, if present on the request.
    pub username: Option<String>,
    /// The caller's roles, if present on the request.
    pub roles: Option<String>,
}

impl CallerContext {
    /// The tenant id to forward, defaulting to the platform-wide tenant 0.
    pub fn tenant_id_or_default(&self) -> u32 {
        self.tenant_id.unwrap_or(0)
    }

    /// The username to record as `created_by`, or the empty string.
    pub fn username_or_default(&self) -> &str {
        self.username.as_deref().unwrap_or_default()
    }
}
