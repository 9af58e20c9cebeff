// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2025-present Datadog, Inc.

// Correctness
#![deny(clippy::indexing_slicing)]
#![deny(clippy::string_slice)]
#![deny(clippy::cast_possible_wrap)]
#![deny(clippy::undocumented_unsafe_blocks)]
// Panicking code
#![deny(clippy::unwrap_used)]
#![deny(clippy::expect_used)]
#![deny(clippy::panic)]
#![deny(clippy::unimplemented)]
#![deny(clippy::todo)]
// Debug code that shouldn't be in production
#![deny(clippy::dbg_macro)]
#![deny(clippy::print_stdout)]
#![deny(clippy::print_stderr)]

pub mod config;
mod container_id;
mod errors;
mod graph;
pub mod netns;
pub mod procfs;
pub mod runtime;
mod scanner;

// Re-export the public API
pub use config::RuntimeConfig;
pub use container_id::RuntimeKind;
pub use errors::{Error, Result};
pub use graph::ProcessGraph;
pub use netns::{netns_path, with_netns};
pub use procfs::ProcessRecord;
pub use runtime::{
    BackendConnector, ContainerRuntimeInfoClient, SocketConnector,
    create_container_runtime_info_client,
};
pub use scanner::{ProcessTableScanner, ProcessTree, get_child_processes};
