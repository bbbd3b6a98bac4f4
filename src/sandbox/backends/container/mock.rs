//! In-memory container engine for tests.
//!
//! Tracks every container it hands out so tests can assert that nothing is
//! left behind, and fakes a type checker by looking at the uploaded source.

use std::collections::HashMap;
use std::io::{Cursor, Read};
use std::sync::Mutex;

use async_trait::async_trait;

use super::engine::{ContainerEngine, ContainerLogs, ContainerSpec, EngineError};

/// What the fake tool reports for a source file.
pub(crate) type Checker = fn(&ContainerSpec, &str) -> (i64, String, String);

#[derive(Default)]
struct MockContainer {
    spec: Option<ContainerSpec>,
    files: HashMap<String, String>,
    exit: Option<(i64, String, String)>,
}

#[derive(Default)]
struct MockState {
    next_id: u64,
    live: HashMap<String, MockContainer>,
    created: Vec<(String, ContainerSpec)>,
    killed: Vec<String>,
    removed: Vec<String>,
}

pub(crate) struct MockEngine {
    state: Mutex<MockState>,
    checker: Checker,
    /// Every call fails as if the socket were missing
    pub unreachable: bool,
    /// `wait` never returns
    pub hang: bool,
    /// `put_archive` is rejected by the engine
    pub reject_archive: bool,
}

impl MockEngine {
    pub fn new() -> Self {
        Self::with_checker(fake_mypy)
    }

    pub fn with_checker(checker: Checker) -> Self {
        Self {
            state: Mutex::new(MockState::default()),
            checker,
            unreachable: false,
            hang: false,
            reject_archive: false,
        }
    }

    pub fn unreachable() -> Self {
        Self {
            unreachable: true,
            ..Self::new()
        }
    }

    pub fn rejecting_archive() -> Self {
        Self {
            reject_archive: true,
            ..Self::new()
        }
    }

    pub fn hanging() -> Self {
        Self {
            hang: true,
            ..Self::new()
        }
    }

    /// Ids of containers that were created and not yet removed.
    pub fn live_containers(&self) -> Vec<String> {
        self.state.lock().unwrap().live.keys().cloned().collect()
    }

    /// Every container ever created, in order.
    pub fn created(&self) -> Vec<(String, ContainerSpec)> {
        self.state.lock().unwrap().created.clone()
    }

    pub fn killed(&self) -> Vec<String> {
        self.state.lock().unwrap().killed.clone()
    }

    pub fn removed(&self) -> Vec<String> {
        self.state.lock().unwrap().removed.clone()
    }

    fn check_reachable(&self) -> Result<(), EngineError> {
        if self.unreachable {
            return Err(EngineError::Unavailable(
                "cannot connect to /var/run/docker.sock".to_string(),
            ));
        }
        Ok(())
    }

    fn with_container<T>(
        &self,
        id: &str,
        f: impl FnOnce(&mut MockContainer) -> Result<T, EngineError>,
    ) -> Result<T, EngineError> {
        let mut state = self.state.lock().unwrap();
        match state.live.get_mut(id) {
            Some(container) => f(container),
            None => Err(EngineError::Api {
                status: 404,
                message: format!("No such container: {}", id),
            }),
        }
    }
}

/// Mimics mypy's output for the handful of sources the tests use.
pub(crate) fn fake_mypy(_spec: &ContainerSpec, source: &str) -> (i64, String, String) {
    if source.contains("+'a'") || source.contains("+ 'a'") {
        (
            1,
            "main.py:1: error: Unsupported operand types for + (\"int\" and \"str\")  [operator]\n\
             Found 1 error in 1 file (checked 1 source file)\n"
                .to_string(),
            String::new(),
        )
    } else {
        (
            0,
            "Success: no issues found in 1 source file\n".to_string(),
            String::new(),
        )
    }
}

#[async_trait]
impl ContainerEngine for MockEngine {
    async fn ping(&self) -> Result<(), EngineError> {
        self.check_reachable()
    }

    async fn create(&self, spec: &ContainerSpec) -> Result<String, EngineError> {
        self.check_reachable()?;
        let mut state = self.state.lock().unwrap();
        state.next_id += 1;
        let id = format!("mock-{:04}", state.next_id);
        state.live.insert(
            id.clone(),
            MockContainer {
                spec: Some(spec.clone()),
                ..MockContainer::default()
            },
        );
        state.created.push((id.clone(), spec.clone()));
        Ok(id)
    }

    async fn put_archive(
        &self,
        id: &str,
        path: &str,
        archive: Vec<u8>,
    ) -> Result<(), EngineError> {
        self.check_reachable()?;
        if self.reject_archive {
            return Err(EngineError::Api {
                status: 500,
                message: "failed to extract archive".to_string(),
            });
        }

        let mut unpacked = Vec::new();
        let mut tar = tar::Archive::new(Cursor::new(archive));
        for entry in tar
            .entries()
            .map_err(|e| EngineError::Protocol(e.to_string()))?
        {
            let mut entry = entry.map_err(|e| EngineError::Protocol(e.to_string()))?;
            let name = entry
                .path()
                .map_err(|e| EngineError::Protocol(e.to_string()))?
                .display()
                .to_string();
            let mut content = String::new();
            entry
                .read_to_string(&mut content)
                .map_err(|e| EngineError::Protocol(e.to_string()))?;
            unpacked.push((format!("{}/{}", path, name), content));
        }

        self.with_container(id, |container| {
            container.files.extend(unpacked);
            Ok(())
        })
    }

    async fn start(&self, id: &str) -> Result<(), EngineError> {
        self.check_reachable()?;
        let checker = self.checker;
        self.with_container(id, |container| {
            let spec = container
                .spec
                .as_ref()
                .ok_or_else(|| EngineError::Protocol("container has no spec".to_string()))?;
            let source_arg = spec.cmd.last().cloned().unwrap_or_default();
            let path = format!("{}/{}", spec.working_dir, source_arg);
            let source = container.files.get(&path).cloned().ok_or_else(|| EngineError::Api {
                status: 500,
                message: format!("{} does not exist", path),
            })?;
            container.exit = Some(checker(spec, &source));
            Ok(())
        })
    }

    async fn wait(&self, id: &str) -> Result<i64, EngineError> {
        self.check_reachable()?;
        if self.hang {
            std::future::pending::<()>().await;
        }
        self.with_container(id, |container| {
            container
                .exit
                .as_ref()
                .map(|(code, _, _)| *code)
                .ok_or_else(|| EngineError::Api {
                    status: 409,
                    message: "container is not started".to_string(),
                })
        })
    }

    async fn logs(&self, id: &str) -> Result<ContainerLogs, EngineError> {
        self.check_reachable()?;
        self.with_container(id, |container| {
            Ok(container
                .exit
                .as_ref()
                .map(|(_, stdout, stderr)| ContainerLogs {
                    stdout: stdout.clone().into_bytes(),
                    stderr: stderr.clone().into_bytes(),
                })
                .unwrap_or_default())
        })
    }

    async fn kill(&self, id: &str) -> Result<(), EngineError> {
        self.check_reachable()?;
        self.state.lock().unwrap().killed.push(id.to_string());
        Ok(())
    }

    async fn remove(&self, id: &str) -> Result<(), EngineError> {
        self.check_reachable()?;
        let mut state = self.state.lock().unwrap();
        state.live.remove(id);
        state.removed.push(id.to_string());
        Ok(())
    }
}
