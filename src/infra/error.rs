//! Failures while bringing up the database, uploads, telemetry and listener.

use std::{io, net::SocketAddr, path::PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum InfraError {
    #[error("database url is not configured; set `database.url` or `BLOGROLL__DATABASE__URL`")]
    MissingDatabaseUrl,
    #[error("failed to connect to the database")]
    Connect(#[source] sqlx::Error),
    #[error("failed to apply database migrations")]
    Migrate(#[source] sqlx::Error),
    #[error("failed to prepare upload directory `{}`", .path.display())]
    Uploads {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to listen on {addr}")]
    Bind {
        addr: SocketAddr,
        #[source]
        source: io::Error,
    },
    #[error("server stopped unexpectedly")]
    Serve(#[source] io::Error),
    #[error("telemetry initialization failed: {0}")]
    Telemetry(String),
}

impl InfraError {
    pub fn telemetry(message: impl Into<String>) -> Self {
        Self::Telemetry(message.into())
    }
}
