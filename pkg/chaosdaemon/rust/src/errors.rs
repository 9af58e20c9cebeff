// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2025-present Datadog, Inc.

use std::num::ParseIntError;
use std::path::PathBuf;

use thiserror::Error;

use crate::container_id::RuntimeKind;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    // Container ID errors, caused by the caller
    #[error("container id {id} is not a {runtime} container id")]
    InvalidFormat { id: String, runtime: RuntimeKind },

    #[error("expected {expected} but got {got}")]
    SchemeMismatch { expected: &'static str, got: String },

    // Runtime lookup errors
    #[error("{runtime}: {step}: container {id} not found: {message}")]
    NotFound {
        runtime: RuntimeKind,
        step: &'static str,
        id: String,
        message: String,
    },

    #[error("{runtime}: container {id} has no running process")]
    NotRunning { runtime: RuntimeKind, id: String },

    #[error("{runtime}: {step} failed: {message}")]
    BackendUnavailable {
        runtime: RuntimeKind,
        step: &'static str,
        message: String,
    },

    // Protocol contract violations
    #[error("{runtime}: no {field} in response")]
    MissingField {
        runtime: RuntimeKind,
        field: &'static str,
    },

    #[error("{runtime}: invalid {field} {value:?}: {source}")]
    ParseError {
        runtime: RuntimeKind,
        field: &'static str,
        value: String,
        #[source]
        source: ParseIntError,
    },

    // Configuration errors
    #[error("only docker, containerd and crio are supported, but got {0}")]
    UnsupportedRuntime(String),

    // Process table errors
    #[error("could not read process table at {path}: {message}")]
    ProcessTableUnreadable { path: PathBuf, message: String },

    #[error("no readable process entries under {0}")]
    EmptyProcessTable(PathBuf),
}

impl Error {
    /// Whether the container is already gone from the runtime's point of view.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound { .. })
    }
}

pub type Result<T> = std::result::Result<T, Error>;
