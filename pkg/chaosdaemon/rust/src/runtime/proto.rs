// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2025-present Datadog, Inc.

//! The subset of the containerd and CRI protobuf messages read by this crate.
//! Fields that are not declared here are skipped when decoding.

use tonic::client::Grpc;
use tonic::codegen::http::uri::PathAndQuery;
use tonic::transport::Channel;

/// Issues a unary call on `channel`.
pub(crate) async fn unary<Req, Resp>(
    channel: &Channel,
    path: &'static str,
    request: tonic::Request<Req>,
) -> Result<Resp, tonic::Status>
where
    Req: prost::Message + Send + Sync + 'static,
    Resp: prost::Message + Default + Send + Sync + 'static,
{
    let mut grpc = Grpc::new(channel.clone());
    grpc.ready()
        .await
        .map_err(|e| tonic::Status::unavailable(format!("service was not ready: {e}")))?;
    let codec = tonic_prost::ProstCodec::<Req, Resp>::default();
    let response = grpc
        .unary(request, PathAndQuery::from_static(path), codec)
        .await?;
    Ok(response.into_inner())
}

pub mod containerd {
    pub const CONTAINERS_GET: &str = "/containerd.services.containers.v1.Containers/Get";
    pub const TASKS_GET: &str = "/containerd.services.tasks.v1.Tasks/Get";
    pub const TASKS_KILL: &str = "/containerd.services.tasks.v1.Tasks/Kill";

    /// Metadata key selecting the containerd namespace of a request.
    pub const NAMESPACE_HEADER: &str = "containerd-namespace";

    #[derive(Clone, PartialEq, prost::Message)]
    pub struct GetContainerRequest {
        #[prost(string, tag = "1")]
        pub id: String,
    }

    #[derive(Clone, PartialEq, prost::Message)]
    pub struct GetContainerResponse {
        #[prost(message, optional, tag = "1")]
        pub container: Option<Container>,
    }

    #[derive(Clone, PartialEq, prost::Message)]
    pub struct Container {
        #[prost(string, tag = "1")]
        pub id: String,
        #[prost(string, tag = "3")]
        pub image: String,
    }

    #[derive(Clone, PartialEq, prost::Message)]
    pub struct GetTaskRequest {
        #[prost(string, tag = "1")]
        pub container_id: String,
        #[prost(string, tag = "2")]
        pub exec_id: String,
    }

    #[derive(Clone, PartialEq, prost::Message)]
    pub struct GetTaskResponse {
        #[prost(message, optional, tag = "1")]
        pub process: Option<Process>,
    }

    #[derive(Clone, PartialEq, prost::Message)]
    pub struct Process {
        #[prost(string, tag = "1")]
        pub container_id: String,
        #[prost(string, tag = "2")]
        pub id: String,
        #[prost(uint32, tag = "3")]
        pub pid: u32,
    }

    #[derive(Clone, PartialEq, prost::Message)]
    pub struct KillRequest {
        #[prost(string, tag = "1")]
        pub container_id: String,
        #[prost(string, tag = "2")]
        pub exec_id: String,
        #[prost(uint32, tag = "3")]
        pub signal: u32,
        #[prost(bool, tag = "4")]
        pub all: bool,
    }
}

pub mod cri {
    use std::collections::HashMap;

    pub const CONTAINER_STATUS: &str = "/runtime.v1.RuntimeService/ContainerStatus";
    pub const STOP_CONTAINER: &str = "/runtime.v1.RuntimeService/StopContainer";
    pub const REMOVE_CONTAINER: &str = "/runtime.v1.RuntimeService/RemoveContainer";

    #[derive(Clone, PartialEq, prost::Message)]
    pub struct ContainerStatusRequest {
        #[prost(string, tag = "1")]
        pub container_id: String,
        #[prost(bool, tag = "2")]
        pub verbose: bool,
    }

    #[derive(Clone, PartialEq, prost::Message)]
    pub struct ContainerStatusResponse {
        #[prost(message, optional, tag = "1")]
        pub status: Option<ContainerStatus>,
        #[prost(map = "string, string", tag = "2")]
        pub info: HashMap<String, String>,
    }

    #[derive(Clone, PartialEq, prost::Message)]
    pub struct ContainerStatus {
        #[prost(string, tag = "1")]
        pub id: String,
        #[prost(int32, tag = "4")]
        pub state: i32,
    }

    #[derive(Clone, PartialEq, prost::Message)]
    pub struct StopContainerRequest {
        #[prost(string, tag = "1")]
        pub container_id: String,
        #[prost(int64, tag = "2")]
        pub timeout: i64,
    }

    #[derive(Clone, PartialEq, prost::Message)]
    pub struct StopContainerResponse {}

    #[derive(Clone, PartialEq, prost::Message)]
    pub struct RemoveContainerRequest {
        #[prost(string, tag = "1")]
        pub container_id: String,
    }

    #[derive(Clone, PartialEq, prost::Message)]
    pub struct RemoveContainerResponse {}
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use prost::Message;

    #[test]
    fn test_decode_skips_undeclared_fields() {
        // Process{container_id: "c", id: "c", pid: 4242, status: RUNNING(2)}
        let encoded = [
            0x0a, 0x01, b'c', 0x12, 0x01, b'c', 0x18, 0x92, 0x21, 0x20, 0x02,
        ];
        let process = containerd::Process::decode(&encoded[..]).unwrap();
        assert_eq!(process.container_id, "c");
        assert_eq!(process.pid, 4242);
    }

    #[test]
    fn test_status_info_map() {
        let mut response = cri::ContainerStatusResponse::default();
        response.info.insert("pid".to_string(), "99".to_string());

        let decoded = cri::ContainerStatusResponse::decode(&*response.encode_to_vec()).unwrap();
        assert_eq!(decoded.info.get("pid").map(String::as_str), Some("99"));
        assert!(decoded.status.is_none());
    }
}
