// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Configuration of the dynamic module client.

use std::{path::PathBuf, time::Duration};

use serde::{Deserialize, Serialize};
use serde_with::{serde_as, DurationSeconds};

use crate::backoff::ExponentialBackoffConfig;

/// Configuration of the per-call connections the module client opens.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleClientConfig {
    /// mTLS material used to dial modules.
    #[serde(default)]
    pub tls: TlsConfig,
    /// End-to-end deadline for `ExportBackup` calls.
    #[serde_as(as = "DurationSeconds<u64>")]
    #[serde(rename = "export_timeout_secs", default = "defaults::export_timeout")]
    pub export_timeout: Duration,
    /// End-to-end deadline for `ImportBackup` calls.
    #[serde_as(as = "DurationSeconds<u64>")]
    #[serde(rename = "import_timeout_secs", default = "defaults::import_timeout")]
    pub import_timeout: Duration,
    /// Deadline for a single connection attempt.
    #[serde_as(as = "DurationSeconds<u64>")]
    #[serde(
        rename = "min_connect_timeout_secs",
        default = "defaults::min_connect_timeout"
    )]
    pub min_connect_timeout: Duration,
    /// Backoff applied between connection attempts within a call's deadline.
    #[serde(default)]
    pub connect_backoff: ExponentialBackoffConfig,
}

impl Default for ModuleClientConfig {
    fn default() -> Self {
        Self {
            tls: TlsConfig::default(),
            export_timeout: defaults::export_timeout(),
            import_timeout: defaults::import_timeout(),
            min_connect_timeout: defaults::min_connect_timeout(),
            connect_backoff: ExponentialBackoffConfig::default(),
        }
    }
}

/// Locations of the mTLS material and the fallback policy applied when it is missing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TlsConfig {
    /// Trust anchor used to verify module server certificates.
    #[serde(default = "defaults::ca_cert_path")]
    pub ca_cert_path: PathBuf,
    /// Client certificate presented to modules.
    #[serde(default = "defaults::client_cert_path")]
    pub client_cert_path: PathBuf,
    /// Private key matching the client certificate.
    #[serde(default = "defaults::client_key_path")]
    pub client_key_path: PathBuf,
    /// Whether to fall back to insecure transport when the TLS material cannot be
    /// loaded. Hardened deployments set this to false, turning TLS setup failures into
    /// hard connection errors.
    #[serde(default = "defaults::allow_insecure_fallback")]
    pub allow_insecure_fallback: bool,
}

impl Default for TlsConfig {
    fn default() -> Self {
        Self {
            ca_cert_path: defaults::ca_cert_path(),
            client_cert_path: defaults::client_cert_path(),
            client_key_path: defaults::client_key_path(),
            allow_insecure_fallback: defaults::allow_insecure_fallback(),
        }
    }
}

impl TlsConfig {
    /// Applies the `BACKUP_CA_CERT_PATH`, `BACKUP_CLIENT_CERT_PATH`, and
    /// `BACKUP_CLIENT_KEY_PATH` environment variables over the defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(path) = std::env::var("BACKUP_CA_CERT_PATH") {
            config.ca_cert_path = path.into();
        }
        if let Ok(path) = std::env::var("BACKUP_CLIENT_CERT_PATH") {
            config.client_cert_path = path.into();
        }
        if let Ok(path) = std::env::var("BACKUP_CLIENT_KEY_PATH") {
            config.client_key_path = path.into();
        }
        config
    }
}

/// Client-related default values.
pub mod defaults {
    use std::{path::PathBuf, time::Duration};

    /// Default deadline for `ExportBackup` calls.
    pub fn export_timeout() -> Duration {
        Duration::from_secs(30)
    }

    /// Default deadline for `ImportBackup` calls.
    pub fn import_timeout() -> Duration {
        Duration::from_secs(60)
    }

    /// Default deadline for a single connection attempt.
    pub fn min_connect_timeout() -> Duration {
        Duration::from_secs(5)
    }

    /// Default trust anchor location.
    pub fn ca_cert_path() -> PathBuf {
        PathBuf::from("/app/certs/ca/ca.crt")
    }

    /// Default client certificate location.
    pub fn client_cert_path() -> PathBuf {
        PathBuf::from("/app/certs/client/client.crt")
    }

    /// Default client key location.
    pub fn client_key_path() -> PathBuf {
        PathBuf::from("/app/certs/client/client.key")
    }

    /// The insecure fallback is enabled by default for development setups.
    pub fn allow_insecure_fallback() -> bool {
        true
    }
}
