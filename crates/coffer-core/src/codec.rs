// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Payload compression and metadata encoding.
//!
//! Payloads are gzip-compressed as single-shot byte blobs. Metadata records are
//! serialized as indented JSON in the canonical representation (camelCase keys, RFC3339
//! timestamps, all fields emitted). Reading attempts the canonical representation first
//! and falls back to the legacy representation written by earlier deployments
//! (snake_case keys, `{seconds, nanos}` timestamp objects). The fallback must be kept
//! until no legacy artifacts remain in the field.

use std::io::{Read as _, Write as _};

use flate2::{read::GzDecoder, write::GzEncoder, Compression};
use serde::{de::DeserializeOwned, Serialize};

use crate::types::{BackupInfo, FullBackupInfo};

/// Errors arising from metadata encoding and decoding.
#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    /// The record could not be serialized to JSON.
    #[error("serialize metadata: {0}")]
    Serialize(#[source] serde_json::Error),
    /// The bytes match neither the canonical nor the legacy representation.
    #[error("unmarshal metadata (both canonical and legacy failed): {fallback}")]
    CorruptMetadata {
        /// The error from the canonical decode attempt.
        #[source]
        canonical: serde_json::Error,
        /// The error from the legacy decode attempt.
        fallback: serde_json::Error,
    },
}

/// Compresses a payload with gzip at the default level.
pub fn gzip_compress(data: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data)?;
    encoder.finish()
}

/// Decompresses a gzip-compressed payload.
pub fn gzip_decompress(data: &[u8]) -> std::io::Result<Vec<u8>> {
    let mut decoder = GzDecoder::new(data);
    let mut decompressed = Vec::new();
    decoder.read_to_end(&mut decompressed)?;
    Ok(decompressed)
}

/// Marker for metadata records that carry a legacy on-disk representation.
pub trait LegacyDecode: Sized {
    /// The legacy representation, converted into the canonical record after decoding.
    type Legacy: DeserializeOwned + Into<Self>;
}

impl LegacyDecode for BackupInfo {
    type Legacy = legacy::BackupInfo;
}

impl LegacyDecode for FullBackupInfo {
    type Legacy = legacy::FullBackupInfo;
}

/// Serializes a metadata record in the canonical representation.
pub fn encode_metadata<T: Serialize>(record: &T) -> Result<Vec<u8>, CodecError> {
    serde_json::to_vec_pretty(record).map_err(CodecError::Serialize)
}

/// Decodes a metadata record, attempting the canonical representation first and the
/// legacy representation second.
pub fn decode_metadata<T>(bytes: &[u8]) -> Result<T, CodecError>
where
    T: DeserializeOwned + LegacyDecode,
{
    let canonical = match serde_json::from_slice::<T>(bytes) {
        Ok(record) => return Ok(record),
        Err(error) => error,
    };
    match serde_json::from_slice::<T::Legacy>(bytes) {
        Ok(record) => Ok(record.into()),
        Err(fallback) => Err(CodecError::CorruptMetadata {
            canonical,
            fallback,
        }),
    }
}

/// The metadata representation written by deployments that predate the canonical
/// encoder: snake_case keys and protobuf-style `{seconds, nanos}` timestamps, with
/// unpopulated fields omitted.
pub mod legacy {
    use std::collections::BTreeMap;

    use chrono::{DateTime, Utc};
    use serde::Deserialize;

    use crate::types::{self, BackupStatus, FullBackupStatus};

    #[derive(Debug, Default, Deserialize)]
    pub struct Timestamp {
        #[serde(default)]
        pub seconds: i64,
        #[serde(default)]
        pub nanos: i32,
    }

    impl From<Timestamp> for DateTime<Utc> {
        fn from(timestamp: Timestamp) -> Self {
            DateTime::from_timestamp(timestamp.seconds, timestamp.nanos.max(0) as u32)
                .unwrap_or_default()
        }
    }

    #[derive(Debug, Deserialize)]
    pub struct BackupInfo {
        #[serde(default)]
        pub id: String,
        #[serde(default)]
        pub module_id: String,
        #[serde(default)]
        pub description: String,
        #[serde(default)]
        pub tenant_id: u32,
        #[serde(default)]
        pub full_backup: bool,
        pub status: BackupStatus,
        #[serde(default)]
        pub size_bytes: i64,
        #[serde(default)]
        pub entity_counts: BTreeMap<String, i64>,
        #[serde(default)]
        pub created_at: Option<Timestamp>,
        #[serde(default)]
        pub created_by: String,
        #[serde(default)]
        pub version: String,
        #[serde(default)]
        pub encrypted: bool,
        #[serde(default)]
        pub warnings: Vec<String>,
    }

    impl From<BackupInfo> for types::BackupInfo {
        fn from(info: BackupInfo) -> Self {
            Self {
                id: info.id,
                module_id: info.module_id,
                description: info.description,
                tenant_id: info.tenant_id,
                full_backup: info.full_backup,
                status: info.status,
                size_bytes: info.size_bytes,
                entity_counts: info.entity_counts,
                created_at: info.created_at.map(Into::into).unwrap_or_default(),
                created_by: info.created_by,
                version: info.version,
                encrypted: info.encrypted,
                warnings: info.warnings,
            }
        }
    }

    #[derive(Debug, Deserialize)]
    pub struct FullBackupInfo {
        #[serde(default)]
        pub id: String,
        #[serde(default)]
        pub description: String,
        #[serde(default)]
        pub tenant_id: u32,
        #[serde(default)]
        pub full_backup: bool,
        pub status: FullBackupStatus,
        #[serde(default)]
        pub total_size_bytes: i64,
        #[serde(default)]
        pub module_backups: Vec<BackupInfo>,
        #[serde(default)]
        pub created_at: Option<Timestamp>,
        #[serde(default)]
        pub created_by: String,
        #[serde(default)]
        pub errors: Vec<String>,
        #[serde(default)]
        pub encrypted: bool,
    }

    impl From<FullBackupInfo> for types::FullBackupInfo {
        fn from(info: FullBackupInfo) -> Self {
            Self {
                id: info.id,
                description: info.description,
                tenant_id: info.tenant_id,
                full_backup: info.full_backup,
                status: info.status,
                total_size_bytes: info.total_size_bytes,
                module_backups: info.module_backups.into_iter().map(Into::into).collect(),
                created_at: info.created_at.map(Into::into).unwrap_or_default(),
                created_by: info.created_by,
                errors: info.errors,
                encrypted: info.encrypted,
            }
        }
    }
}
