// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! The generic wire contract spoken by every module's backup service.
//!
//! Modules expose `ExportBackup` and `ImportBackup` under a service path derived from
//! their module id. The orchestrator never compiles a module's own schema; these four
//! hand-rolled message shapes are the entire contract, so no per-module code generation
//! exists anywhere in the workspace.

use std::collections::{BTreeMap, HashMap};

use coffer_core::{EntityImportResult, ExportResult, ImportOutcome};

/// Request for a module's `ExportBackup`.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ModuleExportRequest {
    /// Tenant scope to export; an explicit 0 requests a platform-wide export.
    #[prost(uint32, optional, tag = "1")]
    pub tenant_id: Option<u32>,
    /// Whether secret material should be included in the export.
    #[prost(bool, tag = "2")]
    pub include_secrets: bool,
}

/// Response from a module's `ExportBackup`.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ModuleExportResponse {
    /// The module's opaque serialized state.
    #[prost(bytes = "vec", tag = "1")]
    pub data: Vec<u8>,
    /// The module identifier as reported by the module.
    #[prost(string, tag = "2")]
    pub module: String,
    /// The module's schema version.
    #[prost(string, tag = "3")]
    pub version: String,
    /// The tenant scope the module actually exported.
    #[prost(uint32, tag = "4")]
    pub tenant_id: u32,
    /// Module-defined entity kind to count mapping.
    #[prost(map = "string, int64", tag = "5")]
    pub entity_counts: HashMap<String, i64>,
}

/// Request for a module's `ImportBackup`.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ModuleImportRequest {
    /// The decoded backup payload to reinject.
    #[prost(bytes = "vec", tag = "1")]
    pub data: Vec<u8>,
    /// How the module should reconcile the payload with its existing data.
    #[prost(enumeration = "RestoreMode", tag = "2")]
    pub mode: i32,
}

/// Response from a module's `ImportBackup`.
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct ModuleImportResponse {
    /// Whether the module reports the import as successful overall.
    #[prost(bool, tag = "1")]
    pub success: bool,
    /// Per-entity-kind counters.
    #[prost(message, repeated, tag = "2")]
    pub results: Vec<WireEntityImportResult>,
    /// Warnings reported by the module.
    #[prost(string, repeated, tag = "3")]
    pub warnings: Vec<String>,
}

/// Per-entity-kind counters within a [`ModuleImportResponse`].
#[derive(Clone, PartialEq, ::prost::Message)]
pub struct WireEntityImportResult {
    #[prost(string, tag = "1")]
    pub entity_type: String,
    #[prost(int64, tag = "2")]
    pub total: i64,
    #[prost(int64, tag = "3")]
    pub created: i64,
    #[prost(int64, tag = "4")]
    pub updated: i64,
    #[prost(int64, tag = "5")]
    pub skipped: i64,
    #[prost(int64, tag = "6")]
    pub failed: i64,
}

/// Wire values of the restore reconciliation mode.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, ::prost::Enumeration)]
#[repr(i32)]
pub enum RestoreMode {
    /// Default wire value; treated as [`RestoreMode::Merge`] by modules.
    Unspecified = 0,
    /// Merge imported entities into the existing data.
    Merge = 1,
    /// Replace existing data with the imported entities.
    Replace = 2,
    /// Validate the payload without applying any change.
    DryRun = 3,
}

impl From<coffer_core::RestoreMode> for RestoreMode {
    fn from(mode: coffer_core::RestoreMode) -> Self {
        match mode {
            coffer_core::RestoreMode::Merge => RestoreMode::Merge,
            coffer_core::RestoreMode::Replace => RestoreMode::Replace,
            coffer_core::RestoreMode::DryRun => RestoreMode::DryRun,
        }
    }
}

impl From<ModuleExportResponse> for ExportResult {
    fn from(response: ModuleExportResponse) -> Self {
        Self {
            data: response.data,
            module: response.module,
            version: response.version,
            tenant_id: response.tenant_id,
            entity_counts: response.entity_counts.into_iter().collect::<BTreeMap<_, _>>(),
        }
    }
}

impl From<ModuleImportResponse> for ImportOutcome {
    fn from(response: ModuleImportResponse) -> Self {
        Self {
            success: response.success,
            results: response
                .results
                .into_iter()
                .map(|result| EntityImportResult {
                    entity_type: result.entity_type,
                    total: result.total,
                    created: result.created,
                    updated: result.updated,
                    skipped: result.skipped,
                    failed: result.failed,
                })
                .collect(),
            warnings: response.warnings,
        }
    }
}
