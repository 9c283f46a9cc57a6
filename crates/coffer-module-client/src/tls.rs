// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! mTLS credential loading for module connections.

use std::{io, path::Path};

use tonic::transport::{Certificate, ClientTlsConfig, Identity};

use crate::config::TlsConfig;

async fn read_pem(path: &Path, what: &str) -> io::Result<Vec<u8>> {
    tokio::fs::read(path).await.map_err(|error| {
        io::Error::new(
            error.kind(),
            format!("read {what} from {}: {error}", path.display()),
        )
    })
}

/// Loads the client TLS configuration from the paths in `config`.
///
/// The returned configuration pins the CA as the only trust anchor and presents the
/// client certificate for mutual authentication.
pub(crate) async fn load_client_tls(config: &TlsConfig) -> io::Result<ClientTlsConfig> {
    let ca_cert = read_pem(&config.ca_cert_path, "CA cert").await?;
    let client_cert = read_pem(&config.client_cert_path, "client cert").await?;
    let client_key = read_pem(&config.client_key_path, "client key").await?;

    Ok(ClientTlsConfig::new()
        .ca_certificate(Certificate::from_pem(ca_cert))
        .identity(Identity::from_pem(client_cert, client_key)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn missing_material_reports_the_path() {
        let config = TlsConfig {
            ca_cert_path: "/nonexistent/ca.crt".into(),
            ..TlsConfig::default()
        };
        let error = load_client_tls(&config).await.unwrap_err();
        assert!(error.to_string().contains("/nonexistent/ca.crt"));
    }
}
