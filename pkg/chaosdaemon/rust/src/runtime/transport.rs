// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2025-present Datadog, Inc.

//! Plumbing shared by the runtime backends: unix socket channels, the
//! per-call deadline and the mapping of transport failures to [`Error`].

use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;

use hyper_util::rt::TokioIo;
use log::debug;
use tokio::net::UnixStream;
use tonic::Code;
use tonic::transport::{Channel, Endpoint, Uri};
use tower::service_fn;

use crate::container_id::RuntimeKind;
use crate::errors::{Error, Result};

pub(crate) const STEP_CONNECT: &str = "connect";

/// Accepts both `/run/x.sock` and `unix:///run/x.sock`.
pub(crate) fn unix_socket_path(path: &Path) -> PathBuf {
    path.to_str()
        .and_then(|s| s.strip_prefix("unix://"))
        .map(PathBuf::from)
        .unwrap_or_else(|| path.to_path_buf())
}

/// Renders an error together with its sources, tonic and hyper errors keep
/// the useful part (e.g. the OS error) in the source chain.
pub(crate) fn error_chain(err: &(dyn std::error::Error + 'static)) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}

pub(crate) fn unavailable(
    runtime: RuntimeKind,
    step: &'static str,
    err: &(dyn std::error::Error + 'static),
) -> Error {
    Error::BackendUnavailable {
        runtime,
        step,
        message: error_chain(err),
    }
}

/// Maps a gRPC status returned by `step` for container `id`.
pub(crate) fn status_error(
    runtime: RuntimeKind,
    step: &'static str,
    id: &str,
    status: tonic::Status,
) -> Error {
    match status.code() {
        Code::NotFound => Error::NotFound {
            runtime,
            step,
            id: id.to_string(),
            message: status.message().to_string(),
        },
        code => Error::BackendUnavailable {
            runtime,
            step,
            message: format!("{code:?}: {}", status.message()),
        },
    }
}

/// Runs one runtime call under `limit`.
pub(crate) async fn bounded<T, F>(
    runtime: RuntimeKind,
    step: &'static str,
    limit: Duration,
    call: F,
) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(Error::BackendUnavailable {
            runtime,
            step,
            message: format!("timed out after {}ms", limit.as_millis()),
        }),
    }
}

/// Opens a gRPC channel over the unix socket at `socket`.
pub(crate) async fn connect_unix_channel(
    runtime: RuntimeKind,
    socket: &Path,
    timeout: Duration,
) -> Result<Channel> {
    let socket = unix_socket_path(socket);
    debug!("{runtime}: connecting to {}", socket.display());

    // The authority is ignored, every connection goes through the socket.
    let endpoint = Endpoint::from_static("http://[::]:50051").connect_timeout(timeout);
    let target = socket.clone();
    endpoint
        .connect_with_connector(service_fn(move |_: Uri| {
            let target = target.clone();
            async move {
                let stream = UnixStream::connect(target).await?;
                Ok::<_, std::io::Error>(TokioIo::new(stream))
            }
        }))
        .await
        .map_err(|e| Error::BackendUnavailable {
            runtime,
            step: STEP_CONNECT,
            message: format!("{}: {}", socket.display(), error_chain(&e)),
        })
}
