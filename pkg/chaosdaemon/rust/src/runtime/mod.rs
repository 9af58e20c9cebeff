// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2025-present Datadog, Inc.

//! Container runtime clients.
//!
//! Every supported runtime implements [`ContainerRuntimeInfoClient`] on top of
//! a narrow API trait ([`DockerApi`], [`ContainerdApi`], [`CriApi`]) that owns
//! the wire protocol. The factory picks one runtime at startup and connects to
//! it through a [`BackendConnector`], which tests replace with fakes.

mod containerd;
mod cri;
mod docker;
pub mod proto;
mod transport;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::info;

use crate::config::RuntimeConfig;
use crate::container_id::RuntimeKind;
use crate::errors::Result;

pub use containerd::{
    ContainerdApi, ContainerdClient, ContainerdContainer, ContainerdGrpcApi, ContainerdTask,
};
pub use cri::{CriApi, CriClient, CriGrpcApi};
pub use docker::{ContainerInspect, ContainerState, DockerApi, DockerClient, DockerSocketApi};

/// Runtime calls not bounded by the configuration use this deadline.
pub const DEFAULT_CALL_TIMEOUT: Duration = Duration::from_secs(10);

/// What the fault injection actions need to know about, and do to, a
/// container, whatever runtime manages it.
#[async_trait]
pub trait ContainerRuntimeInfoClient: Send + Sync {
    fn runtime(&self) -> RuntimeKind;

    /// PID of the container's root process, as seen from the host.
    async fn get_pid_from_container_id(&self, container_id: &str) -> Result<u32>;

    /// Kills the container's root process.
    async fn container_kill_by_container_id(&self, container_id: &str) -> Result<()>;

    /// Strips the runtime scheme from `container_id`.
    fn format_container_id(&self, container_id: &str) -> Result<String> {
        self.runtime()
            .format_container_id(container_id)
            .map(str::to_string)
    }
}

/// Opens the connection each runtime client is built on.
#[async_trait]
pub trait BackendConnector: Send + Sync {
    async fn connect_docker(&self, config: &RuntimeConfig) -> Result<Arc<dyn DockerApi>>;
    async fn connect_containerd(&self, config: &RuntimeConfig) -> Result<Arc<dyn ContainerdApi>>;
    async fn connect_cri(&self, config: &RuntimeConfig) -> Result<Arc<dyn CriApi>>;
}

/// Connects to the runtimes' unix sockets.
#[derive(Debug, Default, Clone, Copy)]
pub struct SocketConnector;

#[async_trait]
impl BackendConnector for SocketConnector {
    async fn connect_docker(&self, config: &RuntimeConfig) -> Result<Arc<dyn DockerApi>> {
        let api = DockerSocketApi::connect(&config.docker_socket).await?;
        Ok(Arc::new(api))
    }

    async fn connect_containerd(&self, config: &RuntimeConfig) -> Result<Arc<dyn ContainerdApi>> {
        let api = ContainerdGrpcApi::connect(
            &config.containerd_socket,
            &config.containerd_namespace,
            config.call_timeout(),
        )
        .await?;
        Ok(Arc::new(api))
    }

    async fn connect_cri(&self, config: &RuntimeConfig) -> Result<Arc<dyn CriApi>> {
        let api = CriGrpcApi::connect(&config.crio_socket, config.call_timeout()).await?;
        Ok(Arc::new(api))
    }
}

/// Creates the client for the runtime named `runtime`.
///
/// Every call the returned client makes to the runtime is bounded by the
/// configured call timeout.
pub async fn create_container_runtime_info_client(
    runtime: &str,
    config: &RuntimeConfig,
    connector: &dyn BackendConnector,
) -> Result<Box<dyn ContainerRuntimeInfoClient>> {
    let kind: RuntimeKind = runtime.parse()?;
    let call_timeout = config.call_timeout();

    let client: Box<dyn ContainerRuntimeInfoClient> = match kind {
        RuntimeKind::Docker => {
            let api = connector.connect_docker(config).await?;
            Box::new(DockerClient::new(api).with_call_timeout(call_timeout))
        }
        RuntimeKind::Containerd => {
            let api = connector.connect_containerd(config).await?;
            Box::new(ContainerdClient::new(api).with_call_timeout(call_timeout))
        }
        RuntimeKind::Crio => {
            let api = connector.connect_cri(config).await?;
            Box::new(CriClient::new(api).with_call_timeout(call_timeout))
        }
    };

    info!("connected to {kind} runtime");
    Ok(client)
}
