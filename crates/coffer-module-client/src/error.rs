// Copyright (c) Mysten Labs, Inc.
// SPDX-License-Identifier: Apache-2.0

//! Errors returned by the dynamic module client.

/// Errors arising when dialing a module or invoking one of its backup operations.
#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// The module's endpoint could not be dialed.
    #[error("dial {module_id} at {endpoint}: {source}")]
    Connection {
        /// The module that could not be reached.
        module_id: String,
        /// The endpoint that was dialed.
        endpoint: String,
        /// The underlying transport error.
        #[source]
        source: tonic::transport::Error,
    },
    /// The invocation itself failed, including deadline expiry.
    #[error("invoke {op} on {module_id}: {source}")]
    Rpc {
        /// The module the call was addressed to.
        module_id: String,
        /// The operation that was invoked.
        op: &'static str,
        /// The gRPC status returned for the call.
        #[source]
        source: tonic::Status,
    },
    /// The module id does not form a valid service path.
    #[error("invalid method path for module {module_id}: {source}")]
    InvalidMethodPath {
        /// The offending module id.
        module_id: String,
        /// The underlying URI error.
        #[source]
        source: http::uri::InvalidUri,
    },
    /// mTLS credentials could not be loaded and the insecure fallback is disabled.
    #[error("load mTLS credentials: {0}")]
    Tls(#[source] std::io::Error),
}

impl ClientError {
    /// The module id the failed call was addressed to.
    pub fn module_id(&self) -> &str {
        match self {
            ClientError::Connection { module_id, .. }
            | ClientError::Rpc { module_id, .. }
            | ClientError::InvalidMethodPath { module_id, .. } => module_id,
            ClientError::Tls(_) => "",
        }
    }
}
