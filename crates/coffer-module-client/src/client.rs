// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! The dynamic module client.
//!
//! Every call dials its own short-lived channel, invokes the module's backup service
//! under a method path derived from the module id, and closes the channel on return.
//! Modules are never pooled; throughput is ops per minute, not per second.

use std::time::Duration;

use async_trait::async_trait;
use coffer_core::{CallerContext, ExportResult, ImportOutcome, ModuleTarget, RestoreMode};
use http::uri::PathAndQuery;
use tokio::time::Instant;
use tonic::{
    client::Grpc,
    codec::ProstCodec,
    metadata::{MetadataMap, MetadataValue},
    transport::{Channel, Endpoint},
    Status,
};

use crate::{
    config::ModuleClientConfig,
    error::ClientError,
    proto::{ModuleExportRequest, ModuleExportResponse, ModuleImportRequest, ModuleImportResponse},
    tls,
};

const EXPORT_BACKUP: &str = "ExportBackup";
const IMPORT_BACKUP: &str = "ImportBackup";

const TENANT_ID_HEADER: &str = "x-md-global-tenant-id";
const USER_ID_HEADER: &str = "x-md-global-user-id";
const USERNAME_HEADER: &str = "x-md-global-username";
const ROLES_HEADER: &str = "x-md-global-roles";

const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(5 * 60);
const KEEPALIVE_TIMEOUT: Duration = Duration::from_secs(20);

/// The backup operations every participating module exposes.
///
/// The orchestration engine consumes the client through this trait so tests can inject
/// in-memory modules.
#[async_trait]
pub trait ModuleBackupService: Send + Sync {
    /// Invokes `ExportBackup` on the target module and returns its serialized state.
    async fn export_backup(
        &self,
        ctx: &CallerContext,
        target: &ModuleTarget,
        tenant_id: Option<u32>,
        include_secrets: bool,
    ) -> Result<ExportResult, ClientError>;

    /// Invokes `ImportBackup` on the target module, reinjecting `data`.
    async fn import_backup(
        &self,
        ctx: &CallerContext,
        target: &ModuleTarget,
        data: Vec<u8>,
        mode: RestoreMode,
    ) -> Result<ImportOutcome, ClientError>;
}

/// Connects to any module's backup service dynamically, without compiling against any
/// module-specific schema.
#[derive(Debug, Clone)]
pub struct ModuleClient {
    config: ModuleClientConfig,
}

impl ModuleClient {
    /// Creates a new client with the given connection policy.
    pub fn new(config: ModuleClientConfig) -> Self {
        Self { config }
    }

    /// Dials the target, retrying with backoff within the connect deadline.
    async fn connect(&self, target: &ModuleTarget) -> Result<Channel, ClientError> {
        let tls = match tls::load_client_tls(&self.config.tls).await {
            Ok(tls) => Some(tls),
            Err(error) if self.config.tls.allow_insecure_fallback => {
                tracing::warn!(
                    module_id = %target.module_id,
                    %error,
                    "TLS credentials unavailable; falling back to insecure transport",
                );
                None
            }
            Err(error) => return Err(ClientError::Tls(error)),
        };

        let uri = normalize_endpoint(&target.grpc_endpoint, tls.is_some());
        let connection_error = |source| ClientError::Connection {
            module_id: target.module_id.clone(),
            endpoint: uri.clone(),
            source,
        };

        let mut endpoint = Endpoint::from_shared(uri.clone())
            .map_err(connection_error)?
            .connect_timeout(self.config.min_connect_timeout)
            .http2_keep_alive_interval(KEEPALIVE_INTERVAL)
            .keep_alive_timeout(KEEPALIVE_TIMEOUT)
            .keep_alive_while_idle(false);
        if let Some(tls) = tls {
            endpoint = endpoint.tls_config(tls).map_err(connection_error)?;
        }

        let started = Instant::now();
        let mut attempt = 0;
        loop {
            match endpoint.connect().await {
                Ok(channel) => return Ok(channel),
                Err(source) => {
                    let delay = self
                        .config
                        .connect_backoff
                        .delay_for_attempt(attempt, &mut rand::thread_rng());
                    if started.elapsed() + delay >= self.config.min_connect_timeout {
                        return Err(ClientError::Connection {
                            module_id: target.module_id.clone(),
                            endpoint: uri,
                            source,
                        });
                    }
                    tracing::debug!(
                        module_id = %target.module_id,
                        attempt,
                        ?delay,
                        "connection attempt failed; backing off",
                    );
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
            }
        }
    }

    async fn invoke_unary<Req, Resp>(
        &self,
        ctx: &CallerContext,
        target: &ModuleTarget,
        op: &'static str,
        timeout: Duration,
        request: Req,
    ) -> Result<Resp, ClientError>
    where
        Req: prost::Message + 'static,
        Resp: prost::Message + Default + 'static,
    {
        let path = method_path(&target.module_id, op)?;
        let metadata = forwarded_metadata(ctx);
        tracing::info!(
            module_id = %target.module_id,
            endpoint = %target.grpc_endpoint,
            method = %path,
            "invoking module backup service",
        );

        let call = async {
            let channel = self.connect(target).await?;
            let mut grpc = Grpc::new(channel);
            grpc.ready().await.map_err(|source| ClientError::Connection {
                module_id: target.module_id.clone(),
                endpoint: target.grpc_endpoint.clone(),
                source,
            })?;
            let codec: ProstCodec<Req, Resp> = ProstCodec::default();
            let mut request = tonic::Request::new(request);
            *request.metadata_mut() = metadata;
            grpc.unary(request, path, codec)
                .await
                .map(tonic::Response::into_inner)
                .map_err(|source| ClientError::Rpc {
                    module_id: target.module_id.clone(),
                    op,
                    source,
                })
        };

        match tokio::time::timeout(timeout, call).await {
            Ok(result) => result,
            Err(_) => Err(ClientError::Rpc {
                module_id: target.module_id.clone(),
                op,
                source: Status::deadline_exceeded(format!(
                    "deadline of {}s exceeded",
                    timeout.as_secs()
                )),
            }),
        }
    }
}

#[async_trait]
impl ModuleBackupService for ModuleClient {
    async fn export_backup(
        &self,
        ctx: &CallerContext,
        target: &ModuleTarget,
        tenant_id: Option<u32>,
        include_secrets: bool,
    ) -> Result<ExportResult, ClientError> {
        let request = ModuleExportRequest {
            tenant_id,
            include_secrets,
        };
        let response: ModuleExportResponse = self
            .invoke_unary(ctx, target, EXPORT_BACKUP, self.config.export_timeout, request)
            .await?;
        Ok(response.into())
    }

    async fn import_backup(
        &self,
        ctx: &CallerContext,
        target: &ModuleTarget,
        data: Vec<u8>,
        mode: RestoreMode,
    ) -> Result<ImportOutcome, ClientError> {
        let request = ModuleImportRequest {
            data,
            mode: crate::proto::RestoreMode::from(mode) as i32,
        };
        let response: ModuleImportResponse = self
            .invoke_unary(ctx, target, IMPORT_BACKUP, self.config.import_timeout, request)
            .await?;
        Ok(response.into())
    }
}

/// Builds the method path `/{module_id}.service.v1.BackupService/{op}`.
fn method_path(module_id: &str, op: &'static str) -> Result<PathAndQuery, ClientError> {
    PathAndQuery::try_from(format!("/{module_id}.service.v1.BackupService/{op}")).map_err(
        |source| ClientError::InvalidMethodPath {
            module_id: module_id.to_owned(),
            source,
        },
    )
}

/// Prepends a scheme to endpoints that lack one, matching the transport in use.
fn normalize_endpoint(endpoint: &str, tls: bool) -> String {
    if endpoint.contains("://") {
        endpoint.to_owned()
    } else if tls {
        format!("https://{endpoint}")
    } else {
        format!("http://{endpoint}")
    }
}

/// Composes the outbound call metadata from the caller's identity.
///
/// The tenant id is always forwarded; the remaining identity headers are forwarded only
/// when present on the caller context.
fn forwarded_metadata(ctx: &CallerContext) -> MetadataMap {
    let mut metadata = MetadataMap::new();
    metadata.insert(
        TENANT_ID_HEADER,
        MetadataValue::try_from(ctx.tenant_id_or_default().to_string())
            .expect("decimal strings are valid metadata values"),
    );

    for (header, value) in [
        (USER_ID_HEADER, &ctx.user_id),
        (USERNAME_HEADER, &ctx.username),
        (ROLES_HEADER, &ctx.roles),
    ] {
        let Some(value) = value else { continue };
        match MetadataValue::try_from(value.as_str()) {
            Ok(value) => {
                metadata.insert(header, value);
            }
            Err(_) => {
                tracing::warn!(header, "dropping metadata value that is not valid ASCII");
            }
        }
    }

    metadata
}

#[cfg(test)]
mod tests {
    use coffer_test_utils::param_test;

    use super::*;

    #[test]
    fn method_path_is_derived_from_the_module_id() {
        let path = method_path("users", EXPORT_BACKUP).unwrap();
        assert_eq!(path.as_str(), "/users.service.v1.BackupService/ExportBackup");
        let path = method_path("orders", IMPORT_BACKUP).unwrap();
        assert_eq!(path.as_str(), "/orders.service.v1.BackupService/ImportBackup");
    }

    #[test]
    fn method_path_rejects_invalid_module_ids() {
        let error = method_path("bad module", EXPORT_BACKUP).unwrap_err();
        assert!(matches!(error, ClientError::InvalidMethodPath { .. }));
    }

    param_test! {
        normalizes_endpoints: [
            bare_insecure: ("users:7000", false, "http://users:7000"),
            bare_tls: ("users:7000", true, "https://users:7000"),
            scheme_kept_insecure: ("https://users:7000", false, "https://users:7000"),
            scheme_kept_tls: ("http://users:7000", true, "http://users:7000"),
        ]
    }
    fn normalizes_endpoints(endpoint: &str, tls: bool, expected: &str) {
        assert_eq!(normalize_endpoint(endpoint, tls), expected);
    }

    #[test]
    fn tenant_id_is_always_forwarded() {
        let metadata = forwarded_metadata(&CallerContext::default());
        assert_eq!(metadata.get(TENANT_ID_HEADER).unwrap(), "0");
        assert!(metadata.get(USER_ID_HEADER).is_none());

        let metadata = forwarded_metadata(&CallerContext {
            tenant_id: Some(42),
            ..CallerContext::default()
        });
        assert_eq!(metadata.get(TENANT_ID_HEADER).unwrap(), "42");
    }

    #[test]
    fn identity_headers_are_forwarded_when_present() {
        let ctx = CallerContext {
            tenant_id: Some(5),
            user_id: Some("u-123".to_owned()),
            username: Some("admin".to_owned()),
            roles: Some("platform-admin".to_owned()),
        };
        let metadata = forwarded_metadata(&ctx);
        assert_eq!(metadata.get(USER_ID_HEADER).unwrap(), "u-123");
        assert_eq!(metadata.get(USERNAME_HEADER).unwrap(), "admin");
        assert_eq!(metadata.get(ROLES_HEADER).unwrap(), "platform-admin");
    }

    #[test]
    fn non_ascii_identity_values_are_dropped() {
        let ctx = CallerContext {
            username: Some("ADMÏN".to_owned()),
            ..CallerContext::default()
        };
        let metadata = forwarded_metadata(&ctx);
        assert!(metadata.get(USERNAME_HEADER).is_none());
        assert!(metadata.get(TENANT_ID_HEADER).is_some());
    }

    #[tokio::test]
    async fn dialing_an_unreachable_endpoint_is_a_connection_error() {
        let config = ModuleClientConfig {
            min_connect_timeout: Duration::from_millis(200),
            ..ModuleClientConfig::default()
        };
        let client = ModuleClient::new(config);
        // TLS material is absent, so the client falls back to insecure transport and
        // then fails to connect to the unroutable port.
        let target = ModuleTarget::new("users", "127.0.0.1:1");
        let error = client
            .export_backup(&CallerContext::default(), &target, None, false)
            .await
            .unwrap_err();
        assert!(matches!(error, ClientError::Connection { .. }), "{error:?}");
        assert!(error.to_string().contains("users"));
    }
}
