// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! The backup orchestration engine.
//!
//! Exposes the public backup and restore operations. Export fan-out is concurrent with
//! one task per target and no early abort; restore fan-in is serial to keep error
//! attribution simple and to bound load on downstream modules. Backups appear
//! atomically: no in-progress state is ever persisted.

use std::{
    collections::{BTreeMap, HashMap},
    sync::Arc,
};

use chrono::Utc;
use coffer_core::{
    BackupInfo,
    BackupStatus,
    CallerContext,
    FullBackupInfo,
    FullBackupStatus,
    ImportOutcome,
    ModuleTarget,
};
use coffer_module_client::{ClientError, ModuleBackupService};
use tokio::task::JoinSet;
use uuid::Uuid;

use crate::{
    api::{
        CreateFullBackupRequest,
        CreateModuleBackupRequest,
        DownloadBackupResponse,
        ListBackupsRequest,
        ListBackupsResponse,
        ListFullBackupsRequest,
        ListFullBackupsResponse,
        ModuleRestoreResult,
        RestoreFullBackupRequest,
        RestoreFullBackupResponse,
        RestoreModuleBackupRequest,
    },
    storage::{ArtifactStore, StorageError},
};

const NO_TARGET_ERROR: &str = "no target endpoint provided for this module";
const DEFAULT_PAGE_SIZE: i32 = 20;

/// Errors returned by the orchestration engine.
#[derive(Debug, thiserror::Error)]
pub enum OrchestratorError {
    /// The request is malformed.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
    /// The backup is encrypted and no password was supplied.
    #[error("backup is encrypted: password required")]
    PasswordRequired,
    /// An artifact store operation failed.
    #[error(transparent)]
    Storage(#[from] StorageError),
    /// A module invocation failed.
    #[error(transparent)]
    Client(#[from] ClientError),
}

/// Coordinates module exports and imports against the artifact store.
pub struct Orchestrator {
    client: Arc<dyn ModuleBackupService>,
    storage: Arc<ArtifactStore>,
    page_size_cap: i32,
}

impl Orchestrator {
    /// Creates a new engine over the given module client and artifact store.
    pub fn new(
        client: Arc<dyn ModuleBackupService>,
        storage: Arc<ArtifactStore>,
        page_size_cap: i32,
    ) -> Self {
        Self {
            client,
            storage,
            page_size_cap,
        }
    }

    // --- Single module operations ---

    /// Backs up a single module.
    ///
    /// An export failure does not surface as an error: a record with status `failed`
    /// and the error as its only warning is persisted (without a payload) and
    /// returned, so inspection tooling sees the attempt.
    pub async fn create_module_backup(
        &self,
        ctx: &CallerContext,
        request: CreateModuleBackupRequest,
    ) -> Result<BackupInfo, OrchestratorError> {
        let now = Utc::now();
        let created_by = ctx.username_or_default().to_owned();
        let full_backup = request.tenant_id == Some(0);

        tracing::info!(
            module_id = %request.target.module_id,
            endpoint = %request.target.grpc_endpoint,
            "creating module backup",
        );

        let result = match self
            .client
            .export_backup(
                ctx,
                &request.target,
                request.tenant_id,
                request.include_secrets,
            )
            .await
        {
            Ok(result) => result,
            Err(error) => {
                tracing::warn!(
                    module_id = %request.target.module_id,
                    %error,
                    "module export failed; recording failed backup",
                );
                let info = BackupInfo {
                    id: Uuid::new_v4().to_string(),
                    module_id: request.target.module_id,
                    description: request.description,
                    tenant_id: request.tenant_id.unwrap_or(0),
                    full_backup,
                    status: BackupStatus::Failed,
                    size_bytes: 0,
                    entity_counts: BTreeMap::new(),
                    created_at: now,
                    created_by,
                    version: String::new(),
                    encrypted: false,
                    warnings: vec![error.to_string()],
                };
                self.storage.save_failed_module_backup(&info).await?;
                return Ok(info);
            }
        };

        let mut info = BackupInfo {
            id: Uuid::new_v4().to_string(),
            module_id: request.target.module_id,
            description: request.description,
            tenant_id: result.tenant_id,
            full_backup,
            status: BackupStatus::Completed,
            size_bytes: result.data.len() as i64,
            entity_counts: result.entity_counts,
            created_at: now,
            created_by,
            version: result.version,
            encrypted: false,
            warnings: vec![],
        };
        self.storage
            .save_module_backup(&mut info, &result.data, &request.password)
            .await?;

        tracing::info!(
            backup_id = %info.id,
            module_id = %info.module_id,
            bytes = info.size_bytes,
            "module backup completed",
        );
        Ok(info)
    }

    /// Restores a module backup into the target module and returns the module's
    /// per-entity results verbatim. Any failure surfaces as an error.
    pub async fn restore_module_backup(
        &self,
        ctx: &CallerContext,
        request: RestoreModuleBackupRequest,
    ) -> Result<ImportOutcome, OrchestratorError> {
        tracing::info!(
            backup_id = %request.backup_id,
            module_id = %request.target.module_id,
            endpoint = %request.target.grpc_endpoint,
            "restoring module backup",
        );

        let data = self
            .storage
            .load_module_backup_data(&request.backup_id, &request.password)
            .await?;
        let outcome = self
            .client
            .import_backup(ctx, &request.target, data, request.mode)
            .await?;

        tracing::info!(
            backup_id = %request.backup_id,
            module_id = %request.target.module_id,
            success = outcome.success,
            "module restore completed",
        );
        Ok(outcome)
    }

    /// Lists module backups with pagination.
    pub async fn list_backups(
        &self,
        request: ListBackupsRequest,
    ) -> Result<ListBackupsResponse, OrchestratorError> {
        let backups = self
            .storage
            .list_module_backups(request.module_id.as_deref(), request.tenant_id)
            .await?;
        let (page, page_size) =
            normalize_pagination(request.page, request.page_size, self.page_size_cap);
        let (backups, total) = paginate(backups, page, page_size);
        Ok(ListBackupsResponse { backups, total })
    }

    /// Reads a module backup's metadata.
    pub async fn get_backup(&self, backup_id: &str) -> Result<BackupInfo, OrchestratorError> {
        Ok(self.storage.get_module_backup(backup_id).await?)
    }

    /// Deletes a module backup irrevocably.
    pub async fn delete_backup(&self, backup_id: &str) -> Result<(), OrchestratorError> {
        self.storage.delete_module_backup(backup_id).await?;
        tracing::info!(backup_id, "deleted module backup");
        Ok(())
    }

    /// Returns the decoded payload of a module backup together with a download
    /// filename of the form `<module_id>-<id[..8]>-<YYYYMMDD>.json`.
    pub async fn download_backup(
        &self,
        backup_id: &str,
        password: &str,
    ) -> Result<DownloadBackupResponse, OrchestratorError> {
        let info = self.storage.get_module_backup(backup_id).await?;
        if info.encrypted && password.is_empty() {
            return Err(OrchestratorError::PasswordRequired);
        }

        let data = self
            .storage
            .load_module_backup_data(backup_id, password)
            .await?;
        let short_id = &info.id[..info.id.len().min(8)];
        let filename = format!(
            "{}-{}-{}.json",
            info.module_id,
            short_id,
            info.created_at.format("%Y%m%d"),
        );
        Ok(DownloadBackupResponse { data, filename })
    }

    // --- Full platform operations ---

    /// Backs up several modules under one manifest.
    ///
    /// Exports run concurrently, one task per target, sharing the caller's
    /// cancellation: dropping this future aborts all in-flight exports. Per-module
    /// failures never abort the batch; they are recorded in the manifest. Fan-out is
    /// not capped, so bounding the target list is the caller's responsibility.
    pub async fn create_full_backup(
        &self,
        ctx: &CallerContext,
        request: CreateFullBackupRequest,
    ) -> Result<FullBackupInfo, OrchestratorError> {
        if request.targets.is_empty() {
            return Err(OrchestratorError::InvalidArgument(
                "at least one target is required".to_owned(),
            ));
        }

        let now = Utc::now();
        let created_by = ctx.username_or_default().to_owned();
        let full_backup = request.tenant_id == Some(0);
        let backup_id = Uuid::new_v4().to_string();

        tracing::info!(
            backup_id = %backup_id,
            modules = request.targets.len(),
            "creating full backup",
        );

        let mut join_set = JoinSet::new();
        for (index, target) in request.targets.iter().cloned().enumerate() {
            let client = Arc::clone(&self.client);
            let ctx = ctx.clone();
            let tenant_id = request.tenant_id;
            let include_secrets = request.include_secrets;
            join_set.spawn(async move {
                let result = client
                    .export_backup(&ctx, &target, tenant_id, include_secrets)
                    .await;
                (index, target, result)
            });
        }

        // Collect into an index-aligned container to preserve target input order.
        let mut results: Vec<_> = request.targets.iter().map(|_| None).collect();
        while let Some(joined) = join_set.join_next().await {
            let (index, target, result) = joined.expect("export task does not panic");
            results[index] = Some((target, result));
        }

        let mut module_backups = Vec::with_capacity(results.len());
        let mut module_data = BTreeMap::new();
        let mut total_size: i64 = 0;
        let mut errors = Vec::new();

        for (target, result) in results.into_iter().map(|slot| {
            slot.expect("every export task reports its slot")
        }) {
            match result {
                Err(error) => {
                    tracing::warn!(module_id = %target.module_id, %error, "module export failed");
                    errors.push(format!("{}: {error}", target.module_id));
                    module_backups.push(BackupInfo {
                        id: String::new(),
                        module_id: target.module_id,
                        description: String::new(),
                        tenant_id: 0,
                        full_backup: false,
                        status: BackupStatus::Failed,
                        size_bytes: 0,
                        entity_counts: BTreeMap::new(),
                        created_at: now,
                        created_by: String::new(),
                        version: String::new(),
                        encrypted: false,
                        warnings: vec![error.to_string()],
                    });
                }
                Ok(result) => {
                    total_size += result.data.len() as i64;
                    module_backups.push(BackupInfo {
                        id: String::new(),
                        module_id: target.module_id.clone(),
                        description: String::new(),
                        tenant_id: result.tenant_id,
                        full_backup,
                        status: BackupStatus::Completed,
                        size_bytes: result.data.len() as i64,
                        entity_counts: result.entity_counts,
                        created_at: now,
                        created_by: String::new(),
                        version: result.version,
                        encrypted: false,
                        warnings: vec![],
                    });
                    module_data.insert(target.module_id, result.data);
                }
            }
        }

        let mut info = FullBackupInfo {
            id: backup_id,
            description: request.description,
            tenant_id: request.tenant_id.unwrap_or(0),
            full_backup,
            status: FullBackupStatus::derive(&module_backups),
            total_size_bytes: total_size,
            module_backups,
            created_at: now,
            created_by,
            errors,
            encrypted: false,
        };
        self.storage
            .save_full_backup(&mut info, &module_data, &request.password)
            .await?;

        tracing::info!(
            backup_id = %info.id,
            modules = info.module_backups.len(),
            status = %info.status,
            "full backup completed",
        );
        Ok(info)
    }

    /// Restores a full backup into the supplied targets, serially, one module at a
    /// time in manifest order.
    ///
    /// Only completed manifest entries are processed. A module without a matching
    /// target, a payload that cannot be loaded, and a failing import all yield a
    /// per-module failure without aborting the batch. `success` is the conjunction
    /// over the emitted per-module results; it is vacuously true when the manifest has
    /// no completed entries.
    pub async fn restore_full_backup(
        &self,
        ctx: &CallerContext,
        request: RestoreFullBackupRequest,
    ) -> Result<RestoreFullBackupResponse, OrchestratorError> {
        if request.targets.is_empty() {
            return Err(OrchestratorError::InvalidArgument(
                "at least one target is required".to_owned(),
            ));
        }

        let info = self.storage.get_full_backup(&request.backup_id).await?;

        tracing::info!(
            backup_id = %request.backup_id,
            targets = request.targets.len(),
            "restoring full backup",
        );

        let target_map: HashMap<&str, &ModuleTarget> = request
            .targets
            .iter()
            .map(|target| (target.module_id.as_str(), target))
            .collect();

        let mut module_results = Vec::new();
        let mut all_success = true;

        for module_backup in &info.module_backups {
            if module_backup.status != BackupStatus::Completed {
                continue;
            }
            let module_id = module_backup.module_id.clone();

            let Some(target) = target_map.get(module_id.as_str()) else {
                module_results.push(ModuleRestoreResult {
                    module_id,
                    success: false,
                    error: NO_TARGET_ERROR.to_owned(),
                    ..ModuleRestoreResult::default()
                });
                all_success = false;
                continue;
            };

            let data = match self
                .storage
                .load_full_backup_module_data(&request.backup_id, &module_id, &request.password)
                .await
            {
                Ok(data) => data,
                Err(error) => {
                    module_results.push(ModuleRestoreResult {
                        module_id,
                        success: false,
                        error: format!("load data: {error}"),
                        ..ModuleRestoreResult::default()
                    });
                    all_success = false;
                    continue;
                }
            };

            match self
                .client
                .import_backup(ctx, target, data, request.mode)
                .await
            {
                Ok(outcome) => {
                    all_success &= outcome.success;
                    module_results.push(ModuleRestoreResult {
                        module_id,
                        success: outcome.success,
                        error: String::new(),
                        results: outcome.results,
                        warnings: outcome.warnings,
                    });
                }
                Err(error) => {
                    module_results.push(ModuleRestoreResult {
                        module_id,
                        success: false,
                        error: error.to_string(),
                        ..ModuleRestoreResult::default()
                    });
                    all_success = false;
                }
            }
        }

        tracing::info!(
            backup_id = %request.backup_id,
            success = all_success,
            "full restore completed",
        );
        Ok(RestoreFullBackupResponse {
            success: all_success,
            module_results,
        })
    }

    /// Lists full backups with pagination.
    pub async fn list_full_backups(
        &self,
        request: ListFullBackupsRequest,
    ) -> Result<ListFullBackupsResponse, OrchestratorError> {
        let backups = self.storage.list_full_backups(request.tenant_id).await?;
        let (page, page_size) =
            normalize_pagination(request.page, request.page_size, self.page_size_cap);
        let (backups, total) = paginate(backups, page, page_size);
        Ok(ListFullBackupsResponse { backups, total })
    }

    /// Reads a full backup's manifest.
    pub async fn get_full_backup(
        &self,
        backup_id: &str,
    ) -> Result<FullBackupInfo, OrchestratorError> {
        Ok(self.storage.get_full_backup(backup_id).await?)
    }

    /// Deletes a full backup irrevocably.
    pub async fn delete_full_backup(&self, backup_id: &str) -> Result<(), OrchestratorError> {
        self.storage.delete_full_backup(backup_id).await?;
        tracing::info!(backup_id, "deleted full backup");
        Ok(())
    }
}

/// Normalizes pagination inputs: page defaults to 1, page size to
/// [`DEFAULT_PAGE_SIZE`], capped at `cap`.
fn normalize_pagination(page: i32, page_size: i32, cap: i32) -> (i32, i32) {
    let page = if page <= 0 { 1 } else { page };
    let page_size = if page_size <= 0 {
        DEFAULT_PAGE_SIZE
    } else {
        page_size.min(cap)
    };
    (page, page_size)
}

/// Slices one page out of the full result list, returning the page and the
/// pre-pagination total.
fn paginate<T>(items: Vec<T>, page: i32, page_size: i32) -> (Vec<T>, i32) {
    let total = items.len() as i32;
    let start = i64::from(page - 1) * i64::from(page_size);
    if start >= i64::from(total) {
        return (Vec::new(), total);
    }
    let end = (start + i64::from(page_size)).min(i64::from(total));
    let page_items = items
        .into_iter()
        .skip(start as usize)
        .take((end - start) as usize)
        .collect();
    (page_items, total)
}

#[cfg(test)]
mod tests {
    use std::{
        collections::{HashMap, HashSet},
        sync::Mutex,
    };

    use async_trait::async_trait;
    use chrono::{Duration, TimeZone as _};
    use coffer_core::{EntityImportResult, ExportResult, RestoreMode};
    use coffer_test_utils::param_test;
    use tempfile::TempDir;
    use tonic::Status;

    use super::*;

    const TEST_ITERATIONS: u32 = 1_000;
    const TEST_PAGE_SIZE_CAP: i32 = 100;

    /// In-memory stand-in for the module fleet: every module exports `{}` unless its
    /// export or import is configured to fail.
    #[derive(Default)]
    struct TestModuleFleet {
        failing_exports: HashSet<String>,
        failing_imports: HashSet<String>,
        imports: Mutex<Vec<(String, Vec<u8>, RestoreMode)>>,
    }

    impl TestModuleFleet {
        fn failing_export(module_id: &str) -> Self {
            Self {
                failing_exports: [module_id.to_owned()].into_iter().collect(),
                ..Self::default()
            }
        }

        fn failing_import(module_id: &str) -> Self {
            Self {
                failing_imports: [module_id.to_owned()].into_iter().collect(),
                ..Self::default()
            }
        }

        fn recorded_imports(&self) -> Vec<(String, Vec<u8>, RestoreMode)> {
            self.imports.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl ModuleBackupService for TestModuleFleet {
        async fn export_backup(
            &self,
            _ctx: &CallerContext,
            target: &ModuleTarget,
            tenant_id: Option<u32>,
            _include_secrets: bool,
        ) -> Result<ExportResult, ClientError> {
            if self.failing_exports.contains(&target.module_id) {
                return Err(ClientError::Rpc {
                    module_id: target.module_id.clone(),
                    op: "ExportBackup",
                    source: Status::unavailable("module is down"),
                });
            }
            Ok(ExportResult {
                data: vec![0x7b, 0x7d],
                module: target.module_id.clone(),
                version: "1.2.0".to_owned(),
                tenant_id: tenant_id.unwrap_or(0),
                entity_counts: [("user".to_owned(), 3)].into_iter().collect(),
            })
        }

        async fn import_backup(
            &self,
            _ctx: &CallerContext,
            target: &ModuleTarget,
            data: Vec<u8>,
            mode: RestoreMode,
        ) -> Result<ImportOutcome, ClientError> {
            if self.failing_imports.contains(&target.module_id) {
                return Err(ClientError::Rpc {
                    module_id: target.module_id.clone(),
                    op: "ImportBackup",
                    source: Status::internal("import rejected"),
                });
            }
            self.imports
                .lock()
                .unwrap()
                .push((target.module_id.clone(), data, mode));
            Ok(ImportOutcome {
                success: true,
                results: vec![EntityImportResult {
                    entity_type: "user".to_owned(),
                    total: 3,
                    created: 3,
                    ..EntityImportResult::default()
                }],
                warnings: vec![],
            })
        }
    }

    async fn engine_with(fleet: TestModuleFleet) -> (TempDir, Arc<TestModuleFleet>, Orchestrator) {
        let temp_dir = TempDir::new().unwrap();
        let storage = Arc::new(
            ArtifactStore::open(temp_dir.path(), TEST_ITERATIONS)
                .await
                .unwrap(),
        );
        let fleet = Arc::new(fleet);
        let engine = Orchestrator::new(
            Arc::clone(&fleet) as Arc<dyn ModuleBackupService>,
            storage,
            TEST_PAGE_SIZE_CAP,
        );
        (temp_dir, fleet, engine)
    }

    fn ctx_with_username(username: &str) -> CallerContext {
        CallerContext {
            username: Some(username.to_owned()),
            ..CallerContext::default()
        }
    }

    fn create_request(module_id: &str, tenant_id: Option<u32>, password: &str) -> CreateModuleBackupRequest {
        CreateModuleBackupRequest {
            target: ModuleTarget::new(module_id, format!("{module_id}:7000")),
            tenant_id,
            description: "test".to_owned(),
            password: password.to_owned(),
            include_secrets: false,
        }
    }

    #[tokio::test]
    async fn module_backup_persists_payload_and_metadata() {
        let (temp_dir, _fleet, engine) = engine_with(TestModuleFleet::default()).await;

        let info = engine
            .create_module_backup(&ctx_with_username("admin"), create_request("users", Some(5), ""))
            .await
            .unwrap();

        assert_eq!(info.status, BackupStatus::Completed);
        assert_eq!(info.size_bytes, 2);
        assert_eq!(info.tenant_id, 5);
        assert!(!info.full_backup);
        assert!(!info.encrypted);
        assert_eq!(info.created_by, "admin");
        assert_eq!(info.entity_counts.get("user"), Some(&3));
        assert!(temp_dir
            .path()
            .join("modules")
            .join(&info.id)
            .join("data.json.gz")
            .is_file());

        let persisted = engine.get_backup(&info.id).await.unwrap();
        assert_eq!(persisted, info);
    }

    #[tokio::test]
    async fn encrypted_module_backup_round_trips_through_download() {
        let (temp_dir, _fleet, engine) = engine_with(TestModuleFleet::default()).await;

        let info = engine
            .create_module_backup(
                &CallerContext::default(),
                create_request("users", Some(5), "secret"),
            )
            .await
            .unwrap();

        assert!(info.encrypted);
        assert!(temp_dir
            .path()
            .join("modules")
            .join(&info.id)
            .join("data.json.gz.enc")
            .is_file());

        let download = engine.download_backup(&info.id, "secret").await.unwrap();
        assert_eq!(download.data, vec![0x7b, 0x7d]);

        let error = engine.download_backup(&info.id, "").await.unwrap_err();
        assert!(matches!(error, OrchestratorError::PasswordRequired));

        let error = engine.download_backup(&info.id, "wrong").await.unwrap_err();
        assert!(matches!(
            error,
            OrchestratorError::Storage(StorageError::BadPassword(_))
        ));
    }

    #[tokio::test]
    async fn explicit_zero_tenant_marks_a_platform_wide_backup() {
        let (_temp_dir, _fleet, engine) = engine_with(TestModuleFleet::default()).await;
        let info = engine
            .create_module_backup(&CallerContext::default(), create_request("users", Some(0), ""))
            .await
            .unwrap();
        assert!(info.full_backup);

        let info = engine
            .create_module_backup(&CallerContext::default(), create_request("users", None, ""))
            .await
            .unwrap();
        assert!(!info.full_backup);
    }

    #[tokio::test]
    async fn failed_export_returns_a_failed_record_instead_of_an_error() {
        let (temp_dir, _fleet, engine) =
            engine_with(TestModuleFleet::failing_export("users")).await;

        let info = engine
            .create_module_backup(&ctx_with_username("admin"), create_request("users", Some(5), ""))
            .await
            .unwrap();

        assert_eq!(info.status, BackupStatus::Failed);
        assert_eq!(info.warnings.len(), 1);
        assert!(info.warnings[0].contains("invoke ExportBackup on users"));

        // The record is visible to listings, but no payload exists.
        let persisted = engine.get_backup(&info.id).await.unwrap();
        assert_eq!(persisted.status, BackupStatus::Failed);
        assert!(!temp_dir
            .path()
            .join("modules")
            .join(&info.id)
            .join("data.json.gz")
            .exists());
    }

    #[tokio::test]
    async fn restore_module_backup_reinjects_the_original_payload() {
        let (_temp_dir, fleet, engine) = engine_with(TestModuleFleet::default()).await;
        let info = engine
            .create_module_backup(&CallerContext::default(), create_request("users", Some(5), ""))
            .await
            .unwrap();

        let outcome = engine
            .restore_module_backup(
                &CallerContext::default(),
                RestoreModuleBackupRequest {
                    target: ModuleTarget::new("users", "users:7000"),
                    backup_id: info.id.clone(),
                    password: String::new(),
                    mode: RestoreMode::Replace,
                },
            )
            .await
            .unwrap();

        assert!(outcome.success);
        assert_eq!(outcome.results.len(), 1);
        let imports = fleet.recorded_imports();
        assert_eq!(imports.len(), 1);
        assert_eq!(imports[0].0, "users");
        assert_eq!(imports[0].1, vec![0x7b, 0x7d]);
        assert_eq!(imports[0].2, RestoreMode::Replace);
    }

    #[tokio::test]
    async fn restore_module_backup_surfaces_load_failures() {
        let (_temp_dir, _fleet, engine) = engine_with(TestModuleFleet::default()).await;
        let error = engine
            .restore_module_backup(
                &CallerContext::default(),
                RestoreModuleBackupRequest {
                    target: ModuleTarget::new("users", "users:7000"),
                    backup_id: "missing".to_owned(),
                    password: String::new(),
                    mode: RestoreMode::Merge,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(
            error,
            OrchestratorError::Storage(StorageError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn full_backup_with_one_failing_module_is_partial() {
        let (temp_dir, _fleet, engine) =
            engine_with(TestModuleFleet::failing_export("orders")).await;

        let info = engine
            .create_full_backup(
                &ctx_with_username("admin"),
                CreateFullBackupRequest {
                    targets: vec![
                        ModuleTarget::new("users", "users:7000"),
                        ModuleTarget::new("orders", "orders:7000"),
                        ModuleTarget::new("billing", "billing:7000"),
                    ],
                    tenant_id: Some(0),
                    description: "platform".to_owned(),
                    password: String::new(),
                    include_secrets: false,
                },
            )
            .await
            .unwrap();

        assert_eq!(info.status, FullBackupStatus::Partial);
        assert_eq!(info.module_backups.len(), 3);
        assert_eq!(
            info.module_backups
                .iter()
                .map(|backup| backup.module_id.as_str())
                .collect::<Vec<_>>(),
            ["users", "orders", "billing"],
        );
        assert_eq!(info.module_backups[1].status, BackupStatus::Failed);
        assert_eq!(info.errors.len(), 1);
        assert!(info.errors[0].starts_with("orders:"));
        assert_eq!(info.total_size_bytes, 4);
        assert!(info.full_backup);

        let full_dir = temp_dir.path().join("full").join(&info.id);
        assert!(full_dir.join("users.json.gz").is_file());
        assert!(full_dir.join("billing.json.gz").is_file());
        assert!(!full_dir.join("orders.json.gz").exists());
    }

    #[tokio::test]
    async fn full_backup_with_all_modules_failing_is_failed() {
        let (_temp_dir, _fleet, engine) = engine_with(TestModuleFleet {
            failing_exports: ["users".to_owned(), "orders".to_owned()].into_iter().collect(),
            ..TestModuleFleet::default()
        })
        .await;

        let info = engine
            .create_full_backup(
                &CallerContext::default(),
                CreateFullBackupRequest {
                    targets: vec![
                        ModuleTarget::new("users", "users:7000"),
                        ModuleTarget::new("orders", "orders:7000"),
                    ],
                    tenant_id: None,
                    description: String::new(),
                    password: String::new(),
                    include_secrets: false,
                },
            )
            .await
            .unwrap();

        assert_eq!(info.status, FullBackupStatus::Failed);
        assert_eq!(info.errors.len(), 2);
        assert_eq!(info.total_size_bytes, 0);
    }

    #[tokio::test]
    async fn empty_target_lists_are_rejected() {
        let (_temp_dir, _fleet, engine) = engine_with(TestModuleFleet::default()).await;

        let error = engine
            .create_full_backup(
                &CallerContext::default(),
                CreateFullBackupRequest {
                    targets: vec![],
                    tenant_id: None,
                    description: String::new(),
                    password: String::new(),
                    include_secrets: false,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(error, OrchestratorError::InvalidArgument(_)));

        let error = engine
            .restore_full_backup(
                &CallerContext::default(),
                RestoreFullBackupRequest {
                    targets: vec![],
                    backup_id: "any".to_owned(),
                    password: String::new(),
                    mode: RestoreMode::Merge,
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(error, OrchestratorError::InvalidArgument(_)));
    }

    async fn create_three_module_full_backup(engine: &Orchestrator) -> FullBackupInfo {
        engine
            .create_full_backup(
                &CallerContext::default(),
                CreateFullBackupRequest {
                    targets: vec![
                        ModuleTarget::new("users", "users:7000"),
                        ModuleTarget::new("orders", "orders:7000"),
                        ModuleTarget::new("billing", "billing:7000"),
                    ],
                    tenant_id: None,
                    description: String::new(),
                    password: String::new(),
                    include_secrets: false,
                },
            )
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn full_restore_reports_modules_without_targets() {
        let (_temp_dir, fleet, engine) = engine_with(TestModuleFleet::default()).await;
        let info = create_three_module_full_backup(&engine).await;

        let response = engine
            .restore_full_backup(
                &CallerContext::default(),
                RestoreFullBackupRequest {
                    targets: vec![
                        ModuleTarget::new("users", "users:7000"),
                        ModuleTarget::new("orders", "orders:7000"),
                    ],
                    backup_id: info.id.clone(),
                    password: String::new(),
                    mode: RestoreMode::Merge,
                },
            )
            .await
            .unwrap();

        assert!(!response.success);
        assert_eq!(response.module_results.len(), 3);
        assert!(response.module_results[0].success);
        assert!(response.module_results[1].success);
        let missing = &response.module_results[2];
        assert_eq!(missing.module_id, "billing");
        assert!(!missing.success);
        assert_eq!(missing.error, NO_TARGET_ERROR);

        // Only the two addressable modules were imported, in manifest order.
        let imports = fleet.recorded_imports();
        assert_eq!(
            imports.iter().map(|(module, ..)| module.as_str()).collect::<Vec<_>>(),
            ["users", "orders"],
        );
    }

    #[tokio::test]
    async fn full_restore_records_import_failures_without_aborting() {
        let (_temp_dir, fleet, engine) =
            engine_with(TestModuleFleet::failing_import("orders")).await;
        let info = create_three_module_full_backup(&engine).await;

        let response = engine
            .restore_full_backup(
                &CallerContext::default(),
                RestoreFullBackupRequest {
                    targets: vec![
                        ModuleTarget::new("users", "users:7000"),
                        ModuleTarget::new("orders", "orders:7000"),
                        ModuleTarget::new("billing", "billing:7000"),
                    ],
                    backup_id: info.id.clone(),
                    password: String::new(),
                    mode: RestoreMode::Merge,
                },
            )
            .await
            .unwrap();

        assert!(!response.success);
        assert_eq!(response.module_results.len(), 3);
        let failed = &response.module_results[1];
        assert_eq!(failed.module_id, "orders");
        assert!(!failed.success);
        assert!(failed.error.contains("invoke ImportBackup on orders"));
        // The failure did not stop the remaining module.
        assert!(response.module_results[2].success);
        assert_eq!(fleet.recorded_imports().len(), 2);
    }

    #[tokio::test]
    async fn full_restore_of_an_all_failed_backup_is_vacuously_successful() {
        let (_temp_dir, _fleet, engine) = engine_with(TestModuleFleet {
            failing_exports: ["users".to_owned()].into_iter().collect(),
            ..TestModuleFleet::default()
        })
        .await;

        let info = engine
            .create_full_backup(
                &CallerContext::default(),
                CreateFullBackupRequest {
                    targets: vec![ModuleTarget::new("users", "users:7000")],
                    tenant_id: None,
                    description: String::new(),
                    password: String::new(),
                    include_secrets: false,
                },
            )
            .await
            .unwrap();
        assert_eq!(info.status, FullBackupStatus::Failed);

        let response = engine
            .restore_full_backup(
                &CallerContext::default(),
                RestoreFullBackupRequest {
                    targets: vec![ModuleTarget::new("users", "users:7000")],
                    backup_id: info.id,
                    password: String::new(),
                    mode: RestoreMode::Merge,
                },
            )
            .await
            .unwrap();

        assert!(response.success);
        assert!(response.module_results.is_empty());
    }

    param_test! {
        normalizes_pagination: [
            zero_inputs: (0, 0, (1, 20)),
            negative_inputs: (-3, -5, (1, 20)),
            oversized_page_size: (2, 500, (2, 100)),
            in_range: (3, 25, (3, 25)),
        ]
    }
    fn normalizes_pagination(page: i32, page_size: i32, expected: (i32, i32)) {
        assert_eq!(
            normalize_pagination(page, page_size, TEST_PAGE_SIZE_CAP),
            expected
        );
    }

    #[tokio::test]
    async fn listing_pages_through_backups_newest_first() {
        let temp_dir = TempDir::new().unwrap();
        let storage = Arc::new(
            ArtifactStore::open(temp_dir.path(), TEST_ITERATIONS)
                .await
                .unwrap(),
        );
        let engine = Orchestrator::new(
            Arc::new(TestModuleFleet::default()) as Arc<dyn ModuleBackupService>,
            Arc::clone(&storage),
            TEST_PAGE_SIZE_CAP,
        );

        let base = Utc::now();
        for index in 0..45 {
            let mut info = BackupInfo {
                id: format!("backup-{index:02}"),
                module_id: "users".to_owned(),
                description: String::new(),
                tenant_id: 5,
                full_backup: false,
                status: BackupStatus::Completed,
                size_bytes: 2,
                entity_counts: BTreeMap::new(),
                created_at: base - Duration::minutes(index),
                created_by: String::new(),
                version: String::new(),
                encrypted: false,
                warnings: vec![],
            };
            storage
                .save_module_backup(&mut info, b"{}", "")
                .await
                .unwrap();
        }

        let response = engine
            .list_backups(ListBackupsRequest {
                module_id: None,
                tenant_id: None,
                page: 2,
                page_size: 20,
            })
            .await
            .unwrap();

        assert_eq!(response.total, 45);
        assert_eq!(response.backups.len(), 20);
        // Newest first, so page 2 starts at the 21st most recent entry.
        assert_eq!(response.backups[0].id, "backup-20");
        assert_eq!(response.backups[19].id, "backup-39");

        let response = engine
            .list_backups(ListBackupsRequest {
                page: 4,
                page_size: 20,
                ..ListBackupsRequest::default()
            })
            .await
            .unwrap();
        assert_eq!(response.total, 45);
        assert!(response.backups.is_empty());
    }

    #[tokio::test]
    async fn download_filename_encodes_module_short_id_and_date() {
        let temp_dir = TempDir::new().unwrap();
        let storage = Arc::new(
            ArtifactStore::open(temp_dir.path(), TEST_ITERATIONS)
                .await
                .unwrap(),
        );
        let engine = Orchestrator::new(
            Arc::new(TestModuleFleet::default()) as Arc<dyn ModuleBackupService>,
            Arc::clone(&storage),
            TEST_PAGE_SIZE_CAP,
        );
        let mut info = BackupInfo {
            id: "abcd1234-5678-90ab-cdef-1234567890ab".to_owned(),
            module_id: "users".to_owned(),
            description: String::new(),
            tenant_id: 5,
            full_backup: false,
            status: BackupStatus::Completed,
            size_bytes: 2,
            entity_counts: BTreeMap::new(),
            created_at: Utc.with_ymd_and_hms(2024, 3, 15, 10, 30, 0).unwrap(),
            created_by: String::new(),
            version: String::new(),
            encrypted: false,
            warnings: vec![],
        };
        storage
            .save_module_backup(&mut info, b"{}", "")
            .await
            .unwrap();

        let download = engine.download_backup(&info.id, "").await.unwrap();
        assert_eq!(download.filename, "users-abcd1234-20240315.json");
        assert_eq!(download.data, b"{}");
    }

    #[tokio::test]
    async fn deleting_a_missing_backup_surfaces_not_found() {
        let (_temp_dir, _fleet, engine) = engine_with(TestModuleFleet::default()).await;
        let error = engine.delete_backup("missing").await.unwrap_err();
        assert!(matches!(
            error,
            OrchestratorError::Storage(StorageError::NotFound(_))
        ));
        let error = engine.delete_full_backup("missing").await.unwrap_err();
        assert!(matches!(
            error,
            OrchestratorError::Storage(StorageError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn full_backup_listing_pages_like_module_listing() {
        let (_temp_dir, _fleet, engine) = engine_with(TestModuleFleet::default()).await;
        for _ in 0..3 {
            create_three_module_full_backup(&engine).await;
        }

        let response = engine
            .list_full_backups(ListFullBackupsRequest {
                tenant_id: None,
                page: 1,
                page_size: 2,
            })
            .await
            .unwrap();
        assert_eq!(response.total, 3);
        assert_eq!(response.backups.len(), 2);

        let response = engine
            .list_full_backups(ListFullBackupsRequest {
                tenant_id: Some(9),
                page: 0,
                page_size: 0,
            })
            .await
            .unwrap();
        assert_eq!(response.total, 0);
        assert!(response.backups.is_empty());
    }
}
