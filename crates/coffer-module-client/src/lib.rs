// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Dynamic gRPC client for module backup services.
//!
//! Participating modules expose a uniform backup contract under a service path derived
//! from their module id: `/{module_id}.service.v1.BackupService/{ExportBackup,
//! ImportBackup}`. This crate invokes that contract generically over a per-call channel
//! with mTLS, forwards the caller's identity headers across the hop, and maps dial and
//! invocation failures into structured errors.

mod backoff;
mod client;
mod config;
mod error;
mod tls;

pub mod proto;

pub use backoff::ExponentialBackoffConfig;
pub use client::{ModuleBackupService, ModuleClient};
pub use config::{defaults, ModuleClientConfig, TlsConfig};
pub use error::ClientError;
