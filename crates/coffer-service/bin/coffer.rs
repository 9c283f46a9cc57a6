// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Coffer command-line entry point.
//!
//! The orchestrator itself is started by the service runtime; this binary carries the
//! operator tooling, currently the single `decrypt` subcommand for opening encrypted
//! backup payloads outside the service.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context as _, Result};
use clap::{Parser, Subcommand};
use coffer_core::{codec, crypto};
use coffer_service::utils;

/// Operator tooling for the Coffer backup orchestrator.
#[derive(Debug, Parser)]
#[clap(rename_all = "kebab-case")]
#[clap(name = env!("CARGO_BIN_NAME"))]
#[clap(version = env!("CARGO_PKG_VERSION"))]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug, Clone)]
#[clap(rename_all = "kebab-case")]
enum Commands {
    /// Decrypt an encrypted backup payload file.
    Decrypt {
        /// Path to the encrypted backup file (`.enc`).
        #[clap(long)]
        file: PathBuf,
        /// Decryption password.
        #[clap(long)]
        password: String,
        /// Output file path; defaults to the input path without its `.enc` and `.gz`
        /// suffixes.
        #[clap(long)]
        output: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    utils::init_tracing_subscriber()?;
    let args = Args::parse();

    match args.command {
        Commands::Decrypt {
            file,
            password,
            output,
        } => commands::decrypt(&file, &password, output),
    }
}

mod commands {
    use super::*;

    pub(super) fn decrypt(file: &Path, password: &str, output: Option<PathBuf>) -> Result<()> {
        if password.is_empty() {
            bail!("--password must not be empty");
        }

        let envelope = std::fs::read(file)
            .with_context(|| format!("read file {}", file.display()))?;
        let compressed =
            crypto::decrypt_with_password(&envelope, password, crypto::DEFAULT_PBKDF2_ITERATIONS)
                .context("decrypt")?;
        let plaintext = codec::gzip_decompress(&compressed).context("decompress")?;

        let output = output.unwrap_or_else(|| default_output_path(file));
        std::fs::write(&output, &plaintext)
            .with_context(|| format!("write output {}", output.display()))?;

        println!(
            "Decrypted {} -> {} ({} bytes)",
            file.display(),
            output.display(),
            plaintext.len(),
        );
        Ok(())
    }

    /// Strips the `.enc` and `.gz` suffixes, turning `data.json.gz.enc` into
    /// `data.json`.
    pub(super) fn default_output_path(input: &Path) -> PathBuf {
        let mut path = input.as_os_str().to_string_lossy().into_owned();
        for suffix in [".enc", ".gz"] {
            if let Some(stripped) = path.strip_suffix(suffix) {
                path = stripped.to_owned();
            }
        }
        PathBuf::from(path)
    }
}

#[cfg(test)]
mod tests {
    use coffer_test_utils::param_test;

    use super::commands::default_output_path;
    use super::*;

    param_test! {
        strips_archive_suffixes: [
            encrypted_payload: ("/tmp/data.json.gz.enc", "/tmp/data.json"),
            plain_payload: ("/tmp/data.json.gz", "/tmp/data.json"),
            no_suffixes: ("/tmp/data.json", "/tmp/data.json"),
            enc_only: ("/tmp/data.enc", "/tmp/data"),
        ]
    }
    fn strips_archive_suffixes(input: &str, expected: &str) {
        assert_eq!(default_output_path(Path::new(input)), PathBuf::from(expected));
    }

    #[test]
    fn decrypt_round_trips_a_sealed_payload() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("data.json.gz.enc");
        let plaintext = br#"{"users": []}"#;
        let compressed = codec::gzip_compress(plaintext).unwrap();
        let envelope = crypto::encrypt_with_password(
            &compressed,
            "secret",
            crypto::DEFAULT_PBKDF2_ITERATIONS,
        )
        .unwrap();
        std::fs::write(&input, envelope).unwrap();

        commands::decrypt(&input, "secret", None).unwrap();
        let output = dir.path().join("data.json");
        assert_eq!(std::fs::read(output).unwrap(), plaintext);
    }

    #[test]
    fn decrypt_rejects_an_empty_password() {
        assert!(commands::decrypt(Path::new("/tmp/x.enc"), "", None).is_err());
    }
}
