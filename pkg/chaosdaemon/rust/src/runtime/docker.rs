// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2025-present Datadog, Inc.

use std::fmt::Write as _;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use http_body_util::{BodyExt, Full};
use hyper::body::Bytes;
use hyper::client::conn::http1::{self, SendRequest};
use hyper::header::HOST;
use hyper::{Method, Request, StatusCode};
use hyper_util::rt::TokioIo;
use log::{debug, warn};
use serde::Deserialize;
use tokio::net::UnixStream;
use tokio::sync::Mutex;

use super::transport::{self, STEP_CONNECT, bounded, unavailable};
use super::{ContainerRuntimeInfoClient, DEFAULT_CALL_TIMEOUT};
use crate::container_id::RuntimeKind;
use crate::errors::{Error, Result};

const RUNTIME: RuntimeKind = RuntimeKind::Docker;
const STEP_INSPECT: &str = "inspect container";
const STEP_KILL: &str = "kill container";

/// The part of `GET /containers/{id}/json` this crate reads.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ContainerInspect {
    #[serde(default)]
    pub id: String,
    pub state: ContainerState,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ContainerState {
    #[serde(default)]
    pub pid: i64,
    #[serde(default)]
    pub running: bool,
}

/// Docker Engine API calls used by [`DockerClient`].
#[async_trait]
pub trait DockerApi: Send + Sync {
    async fn container_inspect(&self, id: &str) -> Result<ContainerInspect>;
    async fn container_kill(&self, id: &str, signal: &str) -> Result<()>;
}

pub struct DockerClient {
    api: Arc<dyn DockerApi>,
    call_timeout: Duration,
}

impl DockerClient {
    pub fn new(api: Arc<dyn DockerApi>) -> Self {
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

#[async_trait]
impl ContainerRuntimeInfoClient for DockerClient {
    fn runtime(&self) -> RuntimeKind {
        RUNTIME
    }

    async fn get_pid_from_container_id(&self, container_id: &str) -> Result<u32> {
        let id = RUNTIME.format_container_id(container_id)?;
        let container = bounded(
            RUNTIME,
            STEP_INSPECT,
            self.call_timeout,
            self.api.container_inspect(id),
        )
        .await?;

        // Stopped containers report pid 0.
        u32::try_from(container.state.pid)
            .ok()
            .filter(|&pid| pid > 0)
            .ok_or_else(|| Error::NotRunning {
                runtime: RUNTIME,
                id: id.to_string(),
            })
    }

    async fn container_kill_by_container_id(&self, container_id: &str) -> Result<()> {
        let id = RUNTIME.format_container_id(container_id)?;
        bounded(
            RUNTIME,
            STEP_KILL,
            self.call_timeout,
            self.api.container_kill(id, "SIGKILL"),
        )
        .await
    }
}

#[derive(Debug, Deserialize)]
struct ErrorResponse {
    message: String,
}

/// Talks HTTP/1.1 to the Docker daemon over its unix socket, on one
/// connection opened at construction time.
pub struct DockerSocketApi {
    sender: Mutex<SendRequest<Full<Bytes>>>,
}

impl DockerSocketApi {
    pub async fn connect(socket: &Path) -> Result<Self> {
        let socket = transport::unix_socket_path(socket);
        debug!("{RUNTIME}: connecting to {}", socket.display());

        let stream = UnixStream::connect(&socket)
            .await
            .map_err(|e| Error::BackendUnavailable {
                runtime: RUNTIME,
                step: STEP_CONNECT,
                message: format!("{}: {e}", socket.display()),
            })?;
        let (sender, connection) = http1::handshake(TokioIo::new(stream))
            .await
            .map_err(|e| unavailable(RUNTIME, STEP_CONNECT, &e))?;

        tokio::spawn(async move {
            if let Err(e) = connection.await {
                warn!("{RUNTIME}: connection closed: {e}");
            }
        });

        Ok(Self {
            sender: Mutex::new(sender),
        })
    }

    async fn request(
        &self,
        step: &'static str,
        method: Method,
        uri: String,
    ) -> Result<(StatusCode, Bytes)> {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header(HOST, "docker")
            .body(Full::new(Bytes::new()))
            .map_err(|e| unavailable(RUNTIME, step, &e))?;

        // HTTP/1 carries one exchange at a time, keep the lock until the body
        // has been read.
        let mut sender = self.sender.lock().await;
        sender
            .ready()
            .await
            .map_err(|e| unavailable(RUNTIME, step, &e))?;
        let response = sender
            .send_request(request)
            .await
            .map_err(|e| unavailable(RUNTIME, step, &e))?;

        let status = response.status();
        let body = response
            .into_body()
            .collect()
            .await
            .map_err(|e| unavailable(RUNTIME, step, &e))?
            .to_bytes();
        Ok((status, body))
    }
}

/// Maps a non-success Docker API response to an error.
fn response_error(step: &'static str, id: &str, status: StatusCode, body: &[u8]) -> Error {
    let message = serde_json::from_slice::<ErrorResponse>(body)
        .map(|e| e.message)
        .unwrap_or_else(|_| String::from_utf8_lossy(body).trim().to_string());

    if status == StatusCode::NOT_FOUND {
        Error::NotFound {
            runtime: RUNTIME,
            step,
            id: id.to_string(),
            message,
        }
    } else {
        Error::BackendUnavailable {
            runtime: RUNTIME,
            step,
            message: format!("HTTP {status}: {message}"),
        }
    }
}

/// Percent-encodes everything but RFC 3986 unreserved characters.
fn encode_path_segment(segment: &str) -> String {
    let mut encoded = String::with_capacity(segment.len());
    for byte in segment.bytes() {
        if byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'.' | b'_' | b'~') {
            encoded.push(char::from(byte));
        } else {
            let _ = write!(encoded, "%{byte:02X}");
        }
    }
    encoded
}

#[async_trait]
impl DockerApi for DockerSocketApi {
    async fn container_inspect(&self, id: &str) -> Result<ContainerInspect> {
        let uri = format!("/containers/{}/json", encode_path_segment(id));
        let (status, body) = self.request(STEP_INSPECT, Method::GET, uri).await?;
        if !status.is_success() {
            return Err(response_error(STEP_INSPECT, id, status, &body));
        }

        serde_json::from_slice(&body).map_err(|e| Error::BackendUnavailable {
            runtime: RUNTIME,
            step: STEP_INSPECT,
            message: format!("invalid response: {e}"),
        })
    }

    async fn container_kill(&self, id: &str, signal: &str) -> Result<()> {
        let uri = format!(
            "/containers/{}/kill?signal={}",
            encode_path_segment(id),
            encode_path_segment(signal)
        );
        let (status, body) = self.request(STEP_KILL, Method::POST, uri).await?;
        if !status.is_success() {
            return Err(response_error(STEP_KILL, id, status, &body));
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    #[derive(Default)]
    struct FakeDocker {
        containers: Vec<(&'static str, i64)>,
        kills: StdMutex<Vec<(String, String)>>,
        delay: Option<Duration>,
    }

    impl FakeDocker {
        fn lookup(&self, step: &'static str, id: &str) -> Result<i64> {
            self.containers
                .iter()
                .find(|(name, _)| *name == id)
                .map(|(_, pid)| *pid)
                .ok_or_else(|| Error::NotFound {
                    runtime: RUNTIME,
                    step,
                    id: id.to_string(),
                    message: format!("No such container: {id}"),
                })
        }
    }

    #[async_trait]
    impl DockerApi for FakeDocker {
        async fn container_inspect(&self, id: &str) -> Result<ContainerInspect> {
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            let pid = self.lookup(STEP_INSPECT, id)?;
            Ok(ContainerInspect {
                id: id.to_string(),
                state: ContainerState {
                    pid,
                    running: pid > 0,
                },
            })
        }

        async fn container_kill(&self, id: &str, signal: &str) -> Result<()> {
            self.lookup(STEP_KILL, id)?;
            self.kills
                .lock()
                .unwrap()
                .push((id.to_string(), signal.to_string()));
            Ok(())
        }
    }

    fn client(fake: FakeDocker) -> (Arc<FakeDocker>, DockerClient) {
        let fake = Arc::new(fake);
        let client = DockerClient::new(fake.clone());
        (fake, client)
    }

    #[tokio::test]
    async fn test_get_pid() {
        let (_, client) = client(FakeDocker {
            containers: vec![("abc123", 4242)],
            ..Default::default()
        });

        let pid = client
            .get_pid_from_container_id("docker://abc123")
            .await
            .unwrap();
        assert_eq!(pid, 4242);
    }

    #[tokio::test]
    async fn test_get_pid_not_found() {
        let (_, client) = client(FakeDocker::default());

        let err = client
            .get_pid_from_container_id("docker://missing")
            .await
            .unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_get_pid_stopped_container() {
        let (_, client) = client(FakeDocker {
            containers: vec![("stopped", 0)],
            ..Default::default()
        });

        let err = client
            .get_pid_from_container_id("docker://stopped")
            .await
            .unwrap_err();
        assert_eq!(
            err,
            Error::NotRunning {
                runtime: RUNTIME,
                id: "stopped".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn test_wrong_scheme_never_reaches_the_daemon() {
        let (fake, client) = client(FakeDocker {
            containers: vec![("abc123", 4242)],
            ..Default::default()
        });

        let err = client
            .container_kill_by_container_id("containerd://abc123")
            .await
            .unwrap_err();
        assert!(matches!(err, Error::SchemeMismatch { .. }));
        assert!(fake.kills.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_kill_sends_sigkill() {
        let (fake, client) = client(FakeDocker {
            containers: vec![("abc123", 4242)],
            ..Default::default()
        });

        client
            .container_kill_by_container_id("docker://abc123")
            .await
            .unwrap();
        assert_eq!(
            *fake.kills.lock().unwrap(),
            vec![("abc123".to_string(), "SIGKILL".to_string())]
        );
    }

    #[tokio::test]
    async fn test_call_timeout() {
        let fake = Arc::new(FakeDocker {
            containers: vec![("abc123", 4242)],
            delay: Some(Duration::from_secs(10)),
            ..Default::default()
        });
        let client = DockerClient::new(fake).with_call_timeout(Duration::from_millis(20));

        let err = client
            .get_pid_from_container_id("docker://abc123")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::BackendUnavailable {
                step: STEP_INSPECT,
                ..
            }
        ));
    }

    #[test]
    fn test_response_error() {
        let err = response_error(
            STEP_INSPECT,
            "abc",
            StatusCode::NOT_FOUND,
            br#"{"message":"No such container: abc"}"#,
        );
        assert_eq!(
            err,
            Error::NotFound {
                runtime: RUNTIME,
                step: STEP_INSPECT,
                id: "abc".to_string(),
                message: "No such container: abc".to_string(),
            }
        );

        let err = response_error(
            STEP_KILL,
            "abc",
            StatusCode::CONFLICT,
            br#"{"message":"Container abc is not running"}"#,
        );
        assert_eq!(
            err.to_string(),
            "docker: kill container failed: HTTP 409 Conflict: Container abc is not running"
        );
    }

    #[test]
    fn test_encode_path_segment() {
        assert_eq!(encode_path_segment("abc123"), "abc123");
        assert_eq!(encode_path_segment("my_app-1.web"), "my_app-1.web");
        assert_eq!(encode_path_segment("../images"), "..%2Fimages");
        assert_eq!(encode_path_segment("a b?c"), "a%20b%3Fc");
    }

    #[test]
    fn test_inspect_deserialization() {
        let body = r#"{"Id":"abc123","Name":"/web","State":{"Status":"running","Running":true,"Pid":4242,"ExitCode":0}}"#;
        let inspect: ContainerInspect = serde_json::from_str(body).unwrap();
        assert_eq!(inspect.id, "abc123");
        assert_eq!(inspect.state.pid, 4242);
        assert!(inspect.state.running);
    }
}
