mod container;
mod remote;

pub use container::{
    ContainerBackend, ContainerEngine, ContainerLogs, ContainerSpec, DockerEngine, EngineError,
};
pub use remote::RemoteFunctionBackend;

#[cfg(test)]
pub(crate) use container::mock;
