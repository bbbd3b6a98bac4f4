use std::collections::HashMap;

use async_trait::async_trait;
use thiserror::Error;

use crate::sandbox::Failure;

/// Errors reported by a container engine.
#[derive(Error, Debug)]
pub enum EngineError {
    /// The engine's control endpoint could not be reached at all
    #[error("container engine unreachable: {0}")]
    Unavailable(String),

    #[error("container engine API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("unexpected response from container engine: {0}")]
    Protocol(String),
}

impl From<EngineError> for Failure {
    fn from(err: EngineError) -> Self {
        match err {
            EngineError::Unavailable(_) => Failure::unavailable(err.to_string()),
            EngineError::Api { .. } | EngineError::Protocol(_) => {
                Failure::internal(err.to_string())
            }
        }
    }
}

/// Everything needed to create one sandbox container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerSpec {
    pub image: String,
    /// Command run as the container's entry, never through a shell
    pub cmd: Vec<String>,
    pub working_dir: String,
    pub memory_bytes: i64,
    pub pids_limit: i64,
    pub network_disabled: bool,
    pub labels: HashMap<String, String>,
}

/// Output captured from a finished container, one buffer per stream.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ContainerLogs {
    pub stdout: Vec<u8>,
    pub stderr: Vec<u8>,
}

/// The container operations a sandbox execution needs.
///
/// Implementations are shared across concurrent executions and must not keep
/// per-container state of their own.
#[async_trait]
pub trait ContainerEngine: Send + Sync {
    /// Check that the engine answers.
    async fn ping(&self) -> Result<(), EngineError>;

    /// Create (but do not start) a container, returning its id.
    async fn create(&self, spec: &ContainerSpec) -> Result<String, EngineError>;

    /// Extract a tar archive into `path` inside the container.
    async fn put_archive(&self, id: &str, path: &str, archive: Vec<u8>)
        -> Result<(), EngineError>;

    async fn start(&self, id: &str) -> Result<(), EngineError>;

    /// Block until the container exits and return its exit status.
    async fn wait(&self, id: &str) -> Result<i64, EngineError>;

    /// Read everything the container wrote, stdout and stderr kept apart.
    async fn logs(&self, id: &str) -> Result<ContainerLogs, EngineError>;

    async fn kill(&self, id: &str) -> Result<(), EngineError>;

    /// Force-remove the container. Removing a container that is already gone succeeds.
    async fn remove(&self, id: &str) -> Result<(), EngineError>;
}

/// Split a Docker log stream into stdout and stderr.
///
/// Without a TTY the engine frames each chunk with an 8-byte header: the
/// stream type, three zero bytes, then the big-endian payload length.
pub fn demux_logs(raw: &[u8]) -> Result<ContainerLogs, EngineError> {
    let mut logs = ContainerLogs::default();
    let mut rest = raw;

    while !rest.is_empty() {
        if rest.len() < 8 {
            return Err(EngineError::Protocol(format!(
                "truncated log frame header ({} bytes)",
                rest.len()
            )));
        }
        let stream = rest[0];
        let len = u32::from_be_bytes([rest[4], rest[5], rest[6], rest[7]]) as usize;
        let frame = rest
            .get(8..8 + len)
            .ok_or_else(|| EngineError::Protocol("truncated log frame payload".to_string()))?;

        match stream {
            // stdin frames carry nothing we report
            0 => {}
            1 => logs.stdout.extend_from_slice(frame),
            2 => logs.stderr.extend_from_slice(frame),
            other => {
                return Err(EngineError::Protocol(format!(
                    "unknown log stream type {}",
                    other
                )))
            }
        }
        rest = &rest[8 + len..];
    }

    Ok(logs)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sandbox::FailureKind;

    fn frame(stream: u8, payload: &[u8]) -> Vec<u8> {
        let mut out = vec![stream, 0, 0, 0];
        out.extend_from_slice(&(payload.len() as u32).to_be_bytes());
        out.extend_from_slice(payload);
        out
    }

    #[test]
    fn test_demux_keeps_streams_apart() {
        let mut raw = frame(1, b"main.py:1: error: ");
        raw.extend(frame(2, b"warning\n"));
        raw.extend(frame(1, b"Unsupported operand\n"));

        let logs = demux_logs(&raw).unwrap();
        assert_eq!(logs.stdout, b"main.py:1: error: Unsupported operand\n");
        assert_eq!(logs.stderr, b"warning\n");
    }

    #[test]
    fn test_demux_empty_stream() {
        assert_eq!(demux_logs(&[]).unwrap(), ContainerLogs::default());
    }

    #[test]
    fn test_demux_rejects_truncated_frames() {
        let mut raw = frame(1, b"hello");
        raw.truncate(raw.len() - 2);
        assert!(matches!(demux_logs(&raw), Err(EngineError::Protocol(_))));
        assert!(matches!(
            demux_logs(&[1, 0, 0]),
            Err(EngineError::Protocol(_))
        ));
    }

    #[test]
    fn test_engine_errors_map_to_failures() {
        let failure: Failure = EngineError::Unavailable("no socket".to_string()).into();
        assert_eq!(failure.kind, FailureKind::BackendUnavailable);

        let failure: Failure = EngineError::Api {
            status: 404,
            message: "no such image".to_string(),
        }
        .into();
        assert_eq!(failure.kind, FailureKind::InternalError);
    }
}
