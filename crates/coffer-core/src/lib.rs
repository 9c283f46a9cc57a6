// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Core functionality for Coffer.
//!
//! This crate defines the domain entities of the backup orchestrator, the password
//! envelope used to encrypt payloads at rest, and the codec helpers shared by the
//! artifact store and the `decrypt` tool. It performs no I/O beyond byte blobs.

pub mod codec;
pub mod crypto;
pub mod types;

pub use types::{
    BackupInfo,
    BackupStatus,
    CallerContext,
    EntityImportResult,
    ExportResult,
    FullBackupInfo,
    FullBackupStatus,
    ImportOutcome,
    ModuleTarget,
    RestoreMode,
};
