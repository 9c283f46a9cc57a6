// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Filesystem-backed storage for backup artifacts.
//!
//! All state lives as files under the configured root: `modules/<backup-id>/` holds one
//! metadata file plus one payload file per module backup, `full/<backup-id>/` holds one
//! manifest plus one payload file per completed module. There is no catalog; every list
//! operation enumerates the directory tree. A store-local reader/writer lock serializes
//! writers and admits concurrent readers; coordination is advisory within one process
//! and deployments assume a single writer.
//!
//! Writes are not atomic with respect to power loss. A torn write surfaces as a
//! metadata parse failure on the next read and the entry is skipped by listing.

use std::{
    collections::BTreeMap,
    io::ErrorKind,
    path::{Path, PathBuf},
};

use coffer_core::{
    codec::{self, CodecError},
    crypto::{self, CryptoError},
    BackupInfo,
    FullBackupInfo,
};
use tokio::sync::RwLock;

const MODULES_SUBDIR: &str = "modules";
const FULL_SUBDIR: &str = "full";
const METADATA_FILE: &str = "metadata.json";
const MODULE_PAYLOAD_FILE: &str = "data.json.gz";
const ENCRYPTED_SUFFIX: &str = ".enc";

/// Errors arising from artifact store operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// No backup with the given id exists.
    #[error("backup not found: {0}")]
    NotFound(String),
    /// The payload is encrypted and no password was supplied.
    #[error("backup is encrypted: password required")]
    PasswordRequired,
    /// The payload could not be decrypted with the supplied password.
    #[error("decrypt backup data: {0}")]
    BadPassword(#[source] CryptoError),
    /// The payload could not be encrypted.
    #[error("encrypt backup data: {0}")]
    Crypto(#[source] CryptoError),
    /// The metadata file matches neither the canonical nor the legacy representation.
    #[error("{context}: {source}")]
    CorruptMetadata {
        /// The operation that hit the corrupt file.
        context: String,
        /// The underlying codec error.
        #[source]
        source: CodecError,
    },
    /// A filesystem operation failed.
    #[error("{context}: {source}")]
    Io {
        /// The operation that failed.
        context: String,
        /// The underlying I/O error.
        #[source]
        source: std::io::Error,
    },
}

fn io_context<S: Into<String>>(context: S) -> impl FnOnce(std::io::Error) -> StorageError {
    let context = context.into();
    move |source| StorageError::Io { context, source }
}

/// Persists backup metadata and payloads on the local filesystem.
#[derive(Debug)]
pub struct ArtifactStore {
    base_path: PathBuf,
    pbkdf2_iterations: u32,
    lock: RwLock<()>,
}

impl ArtifactStore {
    /// Opens the store rooted at `base_path`, creating the `modules/` and `full/`
    /// subdirectories if necessary.
    pub async fn open(
        base_path: impl Into<PathBuf>,
        pbkdf2_iterations: u32,
    ) -> Result<Self, StorageError> {
        let base_path = base_path.into();
        for subdir in [MODULES_SUBDIR, FULL_SUBDIR] {
            let dir = base_path.join(subdir);
            ensure_dir(&dir)
                .await
                .map_err(io_context(format!("create storage directory {}", dir.display())))?;
        }
        tracing::info!(path = %base_path.display(), "artifact store initialized");
        Ok(Self {
            base_path,
            pbkdf2_iterations,
            lock: RwLock::new(()),
        })
    }

    fn module_dir(&self, backup_id: &str) -> PathBuf {
        self.base_path.join(MODULES_SUBDIR).join(backup_id)
    }

    fn full_dir(&self, backup_id: &str) -> PathBuf {
        self.base_path.join(FULL_SUBDIR).join(backup_id)
    }

    /// Compresses and, for a non-empty password, encrypts a payload.
    async fn seal_payload(
        &self,
        data: &[u8],
        password: &str,
    ) -> Result<(Vec<u8>, bool), StorageError> {
        let compressed = codec::gzip_compress(data).map_err(io_context("compress data"))?;
        if password.is_empty() {
            return Ok((compressed, false));
        }

        let password = password.to_owned();
        let iterations = self.pbkdf2_iterations;
        let encrypted = tokio::task::spawn_blocking(move || {
            crypto::encrypt_with_password(&compressed, &password, iterations)
        })
        .await
        .expect("encryption task does not panic")
        .map_err(StorageError::Crypto)?;
        Ok((encrypted, true))
    }

    /// Reads a payload file pair, decrypting and decompressing as indicated by which
    /// file exists. The `.enc` variant wins when present.
    async fn read_payload(
        &self,
        backup_id: &str,
        plain_path: PathBuf,
        password: &str,
    ) -> Result<Vec<u8>, StorageError> {
        let mut encrypted_path = plain_path.clone().into_os_string();
        encrypted_path.push(ENCRYPTED_SUFFIX);
        let encrypted_path = PathBuf::from(encrypted_path);

        let compressed = if tokio::fs::try_exists(&encrypted_path)
            .await
            .unwrap_or(false)
        {
            if password.is_empty() {
                return Err(StorageError::PasswordRequired);
            }
            let envelope = tokio::fs::read(&encrypted_path)
                .await
                .map_err(io_context("read encrypted backup data"))?;
            let password = password.to_owned();
            let iterations = self.pbkdf2_iterations;
            tokio::task::spawn_blocking(move || {
                crypto::decrypt_with_password(&envelope, &password, iterations)
            })
            .await
            .expect("decryption task does not panic")
            .map_err(StorageError::BadPassword)?
        } else {
            match tokio::fs::read(&plain_path).await {
                Ok(compressed) => compressed,
                Err(error) if error.kind() == ErrorKind::NotFound => {
                    return Err(StorageError::NotFound(backup_id.to_owned()));
                }
                Err(source) => return Err(io_context("read backup data")(source)),
            }
        };

        codec::gzip_decompress(&compressed).map_err(io_context("decompress backup data"))
    }

    async fn write_metadata<T: serde::Serialize>(
        &self,
        dir: &Path,
        record: &T,
    ) -> Result<(), StorageError> {
        let bytes = codec::encode_metadata(record).map_err(|source| StorageError::CorruptMetadata {
            context: "marshal metadata".to_owned(),
            source,
        })?;
        tokio::fs::write(dir.join(METADATA_FILE), bytes)
            .await
            .map_err(io_context("write metadata"))
    }

    // --- Module backups ---

    /// Persists a module backup: metadata plus the gzipped, optionally encrypted
    /// payload. Sets `info.encrypted` when a password is supplied.
    pub async fn save_module_backup(
        &self,
        info: &mut BackupInfo,
        data: &[u8],
        password: &str,
    ) -> Result<(), StorageError> {
        let _guard = self.lock.write().await;

        let dir = self.module_dir(&info.id);
        ensure_dir(&dir)
            .await
            .map_err(io_context("create backup dir"))?;

        let (payload, encrypted) = self.seal_payload(data, password).await?;
        let mut filename = MODULE_PAYLOAD_FILE.to_owned();
        if encrypted {
            filename.push_str(ENCRYPTED_SUFFIX);
            info.encrypted = true;
        }

        self.write_metadata(&dir, info).await?;
        tokio::fs::write(dir.join(&filename), &payload)
            .await
            .map_err(io_context("write data"))?;

        tracing::info!(
            backup_id = %info.id,
            bytes = payload.len(),
            encrypted = info.encrypted,
            "saved module backup",
        );
        Ok(())
    }

    /// Persists the metadata record of a failed module backup. No payload exists for
    /// such records; loading their data reports [`StorageError::NotFound`].
    pub async fn save_failed_module_backup(
        &self,
        info: &BackupInfo,
    ) -> Result<(), StorageError> {
        let _guard = self.lock.write().await;

        let dir = self.module_dir(&info.id);
        ensure_dir(&dir)
            .await
            .map_err(io_context("create backup dir"))?;
        self.write_metadata(&dir, info).await?;

        tracing::info!(backup_id = %info.id, "saved failed module backup record");
        Ok(())
    }

    /// Reads, optionally decrypts, and decompresses a module backup payload.
    pub async fn load_module_backup_data(
        &self,
        backup_id: &str,
        password: &str,
    ) -> Result<Vec<u8>, StorageError> {
        let _guard = self.lock.read().await;
        let plain_path = self.module_dir(backup_id).join(MODULE_PAYLOAD_FILE);
        self.read_payload(backup_id, plain_path, password).await
    }

    /// Reads a module backup's metadata.
    pub async fn get_module_backup(&self, backup_id: &str) -> Result<BackupInfo, StorageError> {
        let _guard = self.lock.read().await;
        self.read_module_metadata(backup_id).await
    }

    async fn read_module_metadata(&self, backup_id: &str) -> Result<BackupInfo, StorageError> {
        read_metadata(&self.module_dir(backup_id), backup_id).await
    }

    /// Lists all module backups, optionally filtered by module and tenant, sorted by
    /// creation time descending. Unreadable entries are skipped with a warning.
    pub async fn list_module_backups(
        &self,
        module_id: Option<&str>,
        tenant_id: Option<u32>,
    ) -> Result<Vec<BackupInfo>, StorageError> {
        let _guard = self.lock.read().await;

        let mut backups = Vec::new();
        for backup_id in list_backup_ids(&self.base_path.join(MODULES_SUBDIR)).await? {
            let info = match self.read_module_metadata(&backup_id).await {
                Ok(info) => info,
                Err(error) => {
                    tracing::warn!(backup_id, %error, "skipping unreadable module backup");
                    continue;
                }
            };
            if module_id.is_some_and(|module_id| info.module_id != module_id) {
                continue;
            }
            if tenant_id.is_some_and(|tenant_id| info.tenant_id != tenant_id) {
                continue;
            }
            backups.push(info);
        }

        backups.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(backups)
    }

    /// Removes a module backup's directory recursively.
    pub async fn delete_module_backup(&self, backup_id: &str) -> Result<(), StorageError> {
        let _guard = self.lock.write().await;

        let dir = self.module_dir(backup_id);
        if !tokio::fs::try_exists(&dir).await.unwrap_or(false) {
            return Err(StorageError::NotFound(backup_id.to_owned()));
        }
        tokio::fs::remove_dir_all(&dir)
            .await
            .map_err(io_context("delete backup dir"))
    }

    // --- Full backups ---

    /// Persists a full backup: one payload file per completed module plus the manifest.
    /// Sets `info.encrypted` when a password is supplied.
    pub async fn save_full_backup(
        &self,
        info: &mut FullBackupInfo,
        module_data: &BTreeMap<String, Vec<u8>>,
        password: &str,
    ) -> Result<(), StorageError> {
        let _guard = self.lock.write().await;

        let dir = self.full_dir(&info.id);
        ensure_dir(&dir)
            .await
            .map_err(io_context("create full backup dir"))?;

        if !password.is_empty() {
            info.encrypted = true;
        }

        for (module_id, data) in module_data {
            let (payload, encrypted) = self.seal_payload(data, password).await?;
            let mut filename = format!("{module_id}.json.gz");
            if encrypted {
                filename.push_str(ENCRYPTED_SUFFIX);
            }
            tokio::fs::write(dir.join(&filename), &payload)
                .await
                .map_err(io_context(format!("write {module_id} data")))?;
        }

        self.write_metadata(&dir, info).await?;

        tracing::info!(
            backup_id = %info.id,
            modules = module_data.len(),
            encrypted = info.encrypted,
            "saved full backup",
        );
        Ok(())
    }

    /// Reads, optionally decrypts, and decompresses one module's payload from a full
    /// backup.
    pub async fn load_full_backup_module_data(
        &self,
        backup_id: &str,
        module_id: &str,
        password: &str,
    ) -> Result<Vec<u8>, StorageError> {
        let _guard = self.lock.read().await;
        let plain_path = self.full_dir(backup_id).join(format!("{module_id}.json.gz"));
        self.read_payload(backup_id, plain_path, password).await
    }

    /// Reads a full backup's manifest.
    pub async fn get_full_backup(&self, backup_id: &str) -> Result<FullBackupInfo, StorageError> {
        let _guard = self.lock.read().await;
        self.read_full_metadata(backup_id).await
    }

    async fn read_full_metadata(&self, backup_id: &str) -> Result<FullBackupInfo, StorageError> {
        read_metadata(&self.full_dir(backup_id), backup_id).await
    }

    /// Lists all full backups, optionally filtered by tenant, sorted by creation time
    /// descending. Unreadable entries are skipped with a warning.
    pub async fn list_full_backups(
        &self,
        tenant_id: Option<u32>,
    ) -> Result<Vec<FullBackupInfo>, StorageError> {
        let _guard = self.lock.read().await;

        let mut backups = Vec::new();
        for backup_id in list_backup_ids(&self.base_path.join(FULL_SUBDIR)).await? {
            let info = match self.read_full_metadata(&backup_id).await {
                Ok(info) => info,
                Err(error) => {
                    tracing::warn!(backup_id, %error, "skipping unreadable full backup");
                    continue;
                }
            };
            if tenant_id.is_some_and(|tenant_id| info.tenant_id != tenant_id) {
                continue;
            }
            backups.push(info);
        }

        backups.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(backups)
    }

    /// Removes a full backup's directory recursively.
    pub async fn delete_full_backup(&self, backup_id: &str) -> Result<(), StorageError> {
        let _guard = self.lock.write().await;

        let dir = self.full_dir(backup_id);
        if !tokio::fs::try_exists(&dir).await.unwrap_or(false) {
            return Err(StorageError::NotFound(backup_id.to_owned()));
        }
        tokio::fs::remove_dir_all(&dir)
            .await
            .map_err(io_context("delete full backup dir"))
    }
}

async fn ensure_dir(path: &Path) -> std::io::Result<()> {
    tokio::fs::create_dir_all(path).await?;
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        tokio::fs::set_permissions(path, std::fs::Permissions::from_mode(0o755)).await?;
    }
    Ok(())
}

async fn read_metadata<T>(dir: &Path, backup_id: &str) -> Result<T, StorageError>
where
    T: serde::de::DeserializeOwned + codec::LegacyDecode,
{
    let bytes = match tokio::fs::read(dir.join(METADATA_FILE)).await {
        Ok(bytes) => bytes,
        Err(error) if error.kind() == ErrorKind::NotFound => {
            return Err(StorageError::NotFound(backup_id.to_owned()));
        }
        Err(source) => return Err(io_context("read metadata")(source)),
    };
    codec::decode_metadata(&bytes).map_err(|source| StorageError::CorruptMetadata {
        context: format!("unmarshal metadata for {backup_id}"),
        source,
    })
}

/// Enumerates the backup ids (subdirectory names) under `dir`. A missing directory
/// yields an empty list.
async fn list_backup_ids(dir: &Path) -> Result<Vec<String>, StorageError> {
    let mut entries = match tokio::fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(error) if error.kind() == ErrorKind::NotFound => return Ok(vec![]),
        Err(source) => return Err(io_context(format!("read {}", dir.display()))(source)),
    };

    let mut ids = Vec::new();
    while let Some(entry) = entries
        .next_entry()
        .await
        .map_err(io_context(format!("read {}", dir.display())))?
    {
        let Ok(file_type) = entry.file_type().await else {
            continue;
        };
        if !file_type.is_dir() {
            continue;
        }
        ids.push(entry.file_name().to_string_lossy().into_owned());
    }
    Ok(ids)
}
