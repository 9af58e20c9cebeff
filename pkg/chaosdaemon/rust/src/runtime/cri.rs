// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2025-present Datadog, Inc.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use log::error;
use tonic::transport::Channel;

use super::proto::{self, cri as pb};
use super::transport::{bounded, connect_unix_channel, status_error};
use super::{ContainerRuntimeInfoClient, DEFAULT_CALL_TIMEOUT};
use crate::container_id::RuntimeKind;
use crate::errors::{Error, Result};

const RUNTIME: RuntimeKind = RuntimeKind::Crio;
const STEP_STATUS: &str = "container status";
const STEP_STOP: &str = "stop container";
const STEP_REMOVE: &str = "remove container";

const PID_FIELD: &str = "pid";
const INFO_FIELD: &str = "info";

/// CRI runtime service calls used by [`CriClient`].
#[async_trait]
pub trait CriApi: Send + Sync {
    /// The verbose `info` map of the container's status.
    async fn container_status(&self, id: &str) -> Result<HashMap<String, String>>;
    async fn stop_container(&self, id: &str, timeout_secs: i64) -> Result<()>;
    async fn remove_container(&self, id: &str) -> Result<()>;
}

pub struct CriClient {
    api: Arc<dyn CriApi>,
    call_timeout: Duration,
}

impl CriClient {
    pub fn new(api: Arc<dyn CriApi>) -> Self {
        Self {
            api,
            call_timeout: DEFAULT_CALL_TIMEOUT,
        }
    }

    pub fn with_call_timeout(mut self, call_timeout: Duration) -> Self {
        self.call_timeout = call_timeout;
        self
    }
}

/// Finds the pid in a verbose status `info` map.
///
/// CRI-O reports it as a top-level `pid` entry, containerd's CRI plugin only
/// inside the JSON document stored under `info`.
fn pid_from_info(id: &str, info: &HashMap<String, String>) -> Result<u32> {
    let raw = match info.get(PID_FIELD) {
        Some(pid) => pid.trim().to_string(),
        None => match nested_pid(info) {
            Some(pid) => pid,
            None => {
                let mut keys: Vec<_> = info.keys().collect();
                keys.sort();
                error!("{RUNTIME}: no pid in status of container {id}, got keys {keys:?}");
                return Err(Error::MissingField {
                    runtime: RUNTIME,
                    field: PID_FIELD,
                });
            }
        },
    };

    let pid = raw.parse::<u32>().map_err(|source| Error::ParseError {
        runtime: RUNTIME,
        field: PID_FIELD,
        value: raw.clone(),
        source,
    })?;
    if pid == 0 {
        return Err(Error::NotRunning {
            runtime: RUNTIME,
            id: id.to_string(),
        });
    }
    Ok(pid)
}

fn nested_pid(info: &HashMap<String, String>) -> Option<String> {
    let document: serde_json::Value = serde_json::from_str(info.get(INFO_FIELD)?).ok()?;
    match document.get(PID_FIELD)? {
        serde_json::Value::Number(n) => Some(n.to_string()),
        serde_json::Value::String(s) => Some(s.trim().to_string()),
        _ => None,
    }
}

#[async_trait]
impl ContainerRuntimeInfoClient for CriClient {
    fn runtime(&self) -> RuntimeKind {
        RUNTIME
    }

    async fn get_pid_from_container_id(&self, container_id: &str) -> Result<u32> {
        let id = RUNTIME.format_container_id(container_id)?;
        // The status lookup is keyed by the full `crio://` id, while
        // stop and removal take the native one.
        let info = bounded(
            RUNTIME,
            STEP_STATUS,
            self.call_timeout,
            self.api.container_status(container_id),
        )
        .await?;
        pid_from_info(id, &info)
    }

    async fn container_kill_by_container_id(&self, container_id: &str) -> Result<()> {
        let id = RUNTIME.format_container_id(container_id)?;
        // A zero timeout makes the runtime skip the graceful stop and SIGKILL.
        bounded(
            RUNTIME,
            STEP_STOP,
            self.call_timeout,
            self.api.stop_container(id, 0),
        )
        .await?;
        bounded(
            RUNTIME,
            STEP_REMOVE,
            self.call_timeout,
            self.api.remove_container(id),
        )
        .await
    }
}

/// The CRI runtime service, reached over CRI-O's gRPC socket.
pub struct CriGrpcApi {
    channel: Channel,
}

impl CriGrpcApi {
    pub async fn connect(socket: &Path, timeout: Duration) -> Result<Self> {
        let channel = connect_unix_channel(RUNTIME, socket, timeout).await?;
        Ok(Self { channel })
    }
}

#[async_trait]
impl CriApi for CriGrpcApi {
    async fn container_status(&self, id: &str) -> Result<HashMap<String, String>> {
        let request = tonic::Request::new(pb::ContainerStatusRequest {
            container_id: id.to_string(),
            verbose: true,
        });
        let response: pb::ContainerStatusResponse =
            proto::unary(&self.channel, pb::CONTAINER_STATUS, request)
                .await
                .map_err(|status| status_error(RUNTIME, STEP_STATUS, id, status))?;
        Ok(response.info)
    }

    async fn stop_container(&self, id: &str, timeout_secs: i64) -> Result<()> {
        let request = tonic::Request::new(pb::StopContainerRequest {
            container_id: id.to_string(),
            timeout: timeout_secs,
        });
        proto::unary::<_, pb::StopContainerResponse>(&self.channel, pb::STOP_CONTAINER, request)
            .await
            .map(drop)
            .map_err(|status| status_error(RUNTIME, STEP_STOP, id, status))
    }

    async fn remove_container(&self, id: &str) -> Result<()> {
        let request = tonic::Request::new(pb::RemoveContainerRequest {
            container_id: id.to_string(),
        });
        proto::unary::<_, pb::RemoveContainerResponse>(&self.channel, pb::REMOVE_CONTAINER, request)
            .await
            .map(drop)
            .map_err(|status| status_error(RUNTIME, STEP_REMOVE, id, status))
    }
}
