// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2025-present Datadog, Inc.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::debug;
use nix::sys::signal::Signal;
use tonic::Code;
use tonic::metadata::AsciiMetadataValue;
use tonic::transport::Channel;

use super::proto::{self, containerd as pb};
use super::transport::{STEP_CONNECT, bounded, connect_unix_channel, status_error, unavailable};
use super::{ContainerRuntimeInfoClient, DEFAULT_CALL_TIMEOUT};
use crate::container_id::RuntimeKind;
use crate::errors::{Error, Result};

const RUNTIME: RuntimeKind = RuntimeKind::Containerd;
const STEP_LOAD: &str = "load container";
const STEP_TASK: &str = "get task";
const STEP_KILL: &str = "kill task";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerdContainer {
    pub id: String,
    pub image: String,
}

/// The running task of a container.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContainerdTask {
    pub container_id: String,
    pub pid: u32,
}

/// containerd API calls used by [`ContainerdClient`].
#[async_trait]
pub trait ContainerdApi: Send + Sync {
    async fn load_container(&self, id: &str) -> Result<ContainerdContainer>;

    /// Fails with [`Error::NotRunning`] when the container has no task.
    async fn task(&self, container: &ContainerdContainer) -> Result<ContainerdTask>;

    async fn kill_task(&self, task: &ContainerdTask, signal: u32) -> Result<()>;
}

pub struct ContainerdClient {
    api: Arc<dyn ContainerdApi>,
    call_timeout: Duration,
}

impl ContainerdClient {
    pub fn new(api: Arc<dyn ContainerdApi>) -> Self {
        Self {
            api,
            call_timeout: DEFAULT_CALL_TIMEOUT,
        }
    }

    pub fn with_call_timeout(mut self, call_timeout: Duration) -> Self {
        self.call_timeout = call_timeout;
        self
    }

    async fn running_task(&self, id: &str) -> Result<ContainerdTask> {
        let container = bounded(
            RUNTIME,
            STEP_LOAD,
            self.call_timeout,
            self.api.load_container(id),
        )
        .await?;
        let task = bounded(
            RUNTIME,
            STEP_TASK,
            self.call_timeout,
            self.api.task(&container),
        )
        .await?;

        if task.pid == 0 {
            return Err(Error::NotRunning {
                runtime: RUNTIME,
                id: id.to_string(),
            });
        }
        Ok(task)
    }
}

#[async_trait]
impl ContainerRuntimeInfoClient for ContainerdClient {
    fn runtime(&self) -> RuntimeKind {
        RUNTIME
    }

    async fn get_pid_from_container_id(&self, container_id: &str) -> Result<u32> {
        let id = RUNTIME.format_container_id(container_id)?;
        let task = self.running_task(id).await?;
        Ok(task.pid)
    }

    async fn container_kill_by_container_id(&self, container_id: &str) -> Result<()> {
        let id = RUNTIME.format_container_id(container_id)?;
        let task = self.running_task(id).await?;
        bounded(
            RUNTIME,
            STEP_KILL,
            self.call_timeout,
            self.api.kill_task(&task, Signal::SIGKILL as u32),
        )
        .await
    }
}

/// containerd's containers and tasks services, reached over its gRPC socket.
pub struct ContainerdGrpcApi {
    channel: Channel,
    namespace: AsciiMetadataValue,
}

impl ContainerdGrpcApi {
    pub async fn connect(socket: &Path, namespace: &str, timeout: Duration) -> Result<Self> {
        let namespace = AsciiMetadataValue::try_from(namespace)
            .map_err(|e| unavailable(RUNTIME, STEP_CONNECT, &e))?;
        let channel = connect_unix_channel(RUNTIME, socket, timeout).await?;
        Ok(Self { channel, namespace })
    }

    /// Wraps `message` with the namespace every containerd call is scoped to.
    fn request<T>(&self, message: T) -> tonic::Request<T> {
        let mut request = tonic::Request::new(message);
        request
            .metadata_mut()
            .insert(pb::NAMESPACE_HEADER, self.namespace.clone());
        request
    }
}

#[async_trait]
impl ContainerdApi for ContainerdGrpcApi {
    async fn load_container(&self, id: &str) -> Result<ContainerdContainer> {
        let request = self.request(pb::GetContainerRequest { id: id.to_string() });
        let response: pb::GetContainerResponse =
            proto::unary(&self.channel, pb::CONTAINERS_GET, request)
                .await
                .map_err(|status| status_error(RUNTIME, STEP_LOAD, id, status))?;

        let container = response.container.ok_or(Error::MissingField {
            runtime: RUNTIME,
            field: "container",
        })?;
        debug!("{RUNTIME}: loaded container {} ({})", container.id, container.image);
        Ok(ContainerdContainer {
            id: container.id,
            image: container.image,
        })
    }

    async fn task(&self, container: &ContainerdContainer) -> Result<ContainerdTask> {
        let request = self.request(pb::GetTaskRequest {
            container_id: container.id.clone(),
            exec_id: String::new(),
        });
        let response: pb::GetTaskResponse = proto::unary(&self.channel, pb::TASKS_GET, request)
            .await
            .map_err(|status| match status.code() {
                // The container exists, it just was never started or has exited.
                Code::NotFound => Error::NotRunning {
                    runtime: RUNTIME,
                    id: container.id.clone(),
                },
                _ => status_error(RUNTIME, STEP_TASK, &container.id, status),
            })?;

        let process = response.process.ok_or(Error::MissingField {
            runtime: RUNTIME,
            field: "process",
        })?;
        Ok(ContainerdTask {
            container_id: container.id.clone(),
            pid: process.pid,
        })
    }

    async fn kill_task(&self, task: &ContainerdTask, signal: u32) -> Result<()> {
        let request = self.request(pb::KillRequest {
            container_id: task.container_id.clone(),
            exec_id: String::new(),
            signal,
            all: false,
        });
        proto::unary::<_, ()>(&self.channel, pb::TASKS_KILL, request)
            .await
            .map_err(|status| status_error(RUNTIME, STEP_KILL, &task.container_id, status))
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    #[derive(Default)]
    struct FakeContainerd {
        // (container id, task pid), a pid of None means no task
        containers: Vec<(&'static str, Option<u32>)>,
        fail_step: Option<&'static str>,
        calls: Mutex<Vec<String>>,
    }

    impl FakeContainerd {
        fn record(&self, step: &'static str, id: &str) -> Result<()> {
            self.calls.lock().unwrap().push(format!("{step} {id}"));
            if self.fail_step == Some(step) {
                return Err(Error::BackendUnavailable {
                    runtime: RUNTIME,
                    step,
                    message: "Unavailable: connection reset".to_string(),
                });
            }
            Ok(())
        }
    }

    #[async_trait]
    impl ContainerdApi for FakeContainerd {
        async fn load_container(&self, id: &str) -> Result<ContainerdContainer> {
            self.record(STEP_LOAD, id)?;
            self.containers
                .iter()
                .find(|(name, _)| *name == id)
                .map(|(name, _)| ContainerdContainer {
                    id: name.to_string(),
                    image: "docker.io/library/nginx:latest".to_string(),
                })
                .ok_or_else(|| Error::NotFound {
                    runtime: RUNTIME,
                    step: STEP_LOAD,
                    id: id.to_string(),
                    message: format!("container \"{id}\" in namespace \"k8s.io\": not found"),
                })
        }

        async fn task(&self, container: &ContainerdContainer) -> Result<ContainerdTask> {
            self.record(STEP_TASK, &container.id)?;
            let pid = self
                .containers
                .iter()
                .find(|(name, _)| *name == container.id)
                .and_then(|(_, pid)| *pid)
                .ok_or_else(|| Error::NotRunning {
                    runtime: RUNTIME,
                    id: container.id.clone(),
                })?;
            Ok(ContainerdTask {
                container_id: container.id.clone(),
                pid,
            })
        }

        async fn kill_task(&self, task: &ContainerdTask, signal: u32) -> Result<()> {
            self.record(STEP_KILL, &format!("{} {signal}", task.container_id))
        }
    }

    fn client(fake: FakeContainerd) -> (Arc<FakeContainerd>, ContainerdClient) {
        let fake = Arc::new(fake);
        let client = ContainerdClient::new(fake.clone());
        (fake, client)
    }

    #[tokio::test]
    async fn test_get_pid() {
        let (fake, client) = client(FakeContainerd {
            containers: vec![("abc", Some(31337))],
            ..Default::default()
        });

        let pid = client
            .get_pid_from_container_id("containerd://abc")
            .await
            .unwrap();
        assert_eq!(pid, 31337);
        assert_eq!(
            *fake.calls.lock().unwrap(),
            vec!["load container abc", "get task abc"]
        );
    }

    #[tokio::test]
    async fn test_get_pid_without_task() {
        let (_, client) = client(FakeContainerd {
            containers: vec![("created", None)],
            ..Default::default()
        });

        let err = client
            .get_pid_from_container_id("containerd://created")
            .await
            .unwrap_err();
        assert_eq!(
            err,
            Error::NotRunning {
                runtime: RUNTIME,
                id: "created".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn test_get_pid_zero_is_not_running() {
        let (_, client) = client(FakeContainerd {
            containers: vec![("exited", Some(0))],
            ..Default::default()
        });

        let err = client
            .get_pid_from_container_id("containerd://exited")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::NotRunning { .. }));
    }

    #[tokio::test]
    async fn test_unknown_container() {
        let (fake, client) = client(FakeContainerd::default());

        let err = client
            .get_pid_from_container_id("containerd://ghost")
            .await
            .unwrap_err();
        assert!(err.is_not_found());
        assert_eq!(*fake.calls.lock().unwrap(), vec!["load container ghost"]);
    }

    #[tokio::test]
    async fn test_kill_sends_sigkill_to_the_task() {
        let (fake, client) = client(FakeContainerd {
            containers: vec![("abc", Some(31337))],
            ..Default::default()
        });

        client
            .container_kill_by_container_id("containerd://abc")
            .await
            .unwrap();
        assert_eq!(
            *fake.calls.lock().unwrap(),
            vec!["load container abc", "get task abc", "kill task abc 9"]
        );
    }

    #[tokio::test]
    async fn test_failing_step_is_reported() {
        let (fake, client) = client(FakeContainerd {
            containers: vec![("abc", Some(31337))],
            fail_step: Some(STEP_TASK),
            ..Default::default()
        });

        let err = client
            .container_kill_by_container_id("containerd://abc")
            .await
            .unwrap_err();
        assert_eq!(
            err.to_string(),
            "containerd: get task failed: Unavailable: connection reset"
        );
        assert_eq!(
            *fake.calls.lock().unwrap(),
            vec!["load container abc", "get task abc"]
        );
    }

    #[tokio::test]
    async fn test_rejects_docker_ids() {
        let (fake, client) = client(FakeContainerd {
            containers: vec![("abc", Some(31337))],
            ..Default::default()
        });

        let err = client
            .get_pid_from_container_id("docker://abcdef")
            .await
            .unwrap_err();
        assert_eq!(
            err,
            Error::SchemeMismatch {
                expected: "containerd://",
                got: "docker://abcd".to_string(),
            }
        );
        assert!(fake.calls.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_namespace() {
        let dir = tempfile::tempdir().unwrap();
        let result =
            ContainerdGrpcApi::connect(&dir.path().join("c.sock"), "k8s\nio", DEFAULT_CALL_TIMEOUT)
                .await;
        assert!(matches!(
            result,
            Err(Error::BackendUnavailable {
                step: STEP_CONNECT,
                ..
            })
        ));
    }
}
