// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Backup orchestration for a multi-module platform.
//!
//! The orchestrator does not know the schema of any module's data. It invokes a uniform
//! backup contract on each participating module to extract or reinject the module's
//! opaque serialized state, persists that state as durable, optionally encrypted
//! artifacts on local storage, and later replays artifacts back into target modules.
//!
//! The three subsystems are the [`orchestrator`] engine (fan-out export, serial
//! restore), the [`storage`] artifact store (filesystem tree with a compression and
//! encryption pipeline), and the dynamic module client from `coffer-module-client`.
//! The RPC server transport wiring them to the network lives outside this crate.

pub mod api;
pub mod config;
pub mod orchestrator;
pub mod storage;
pub mod utils;

pub use config::OrchestratorConfig;
pub use orchestrator::{Orchestrator, OrchestratorError};
pub use storage::{ArtifactStore, StorageError};
