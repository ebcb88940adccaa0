use thiserror::Error;

use crate::config::ConfigError;
use crate::ingest_listener::IngestError;
use crate::store::StoreError;
use crate::transport::TransportError;

/// Startup failures. Any of these ends the process with status 1.
#[derive(Debug, Error)]
pub enum InitError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Transport(#[from] TransportError),

    #[error(transparent)]
    Listener(#[from] IngestError),
}

impl InitError {
    /// Short category used as a structured log field.
    pub fn kind(&self) -> &'static str {
        match self {
            InitError::Config(_) => "config_invalid",
            InitError::Store(_) => "store_unavailable",
            InitError::Transport(_) => "transport_init_failed",
            InitError::Listener(_) => "listener_bind_failed",
        }
    }
}

/// Faults that stop a running relay.
#[derive(Debug, Error)]
pub enum ExitError {
    #[error("{0}")]
    RuntimeFailure(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn init_error_displays_inner() {
        let err = InitError::Config(ConfigError::InvalidCompression("snappy".into()));
        assert_eq!(
            err.to_string(),
            ConfigError::InvalidCompression("snappy".into()).to_string()
        );
        assert_eq!(err.kind(), "config_invalid");
    }

    #[test]
    fn listener_bind_kind() {
        let err = InitError::from(IngestError::Bind {
            port: 4320,
            source: std::io::Error::from(std::io::ErrorKind::AddrInUse),
        });
        assert_eq!(err.kind(), "listener_bind_failed");
        assert!(err.to_string().contains("4320"));
    }

    #[test]
    fn exit_error_runtime_failure_display() {
        let err = ExitError::RuntimeFailure("something broke".into());
        assert_eq!(err.to_string(), "something broke");
    }
}
