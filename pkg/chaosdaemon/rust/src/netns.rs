// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2025-present Datadog, Inc.

use tokio::process::Command;

use crate::procfs::DEFAULT_PROC_PREFIX;

/// Path of the network namespace of `pid`, as seen from the host.
pub fn netns_path(pid: u32) -> String {
    format!("{DEFAULT_PROC_PREFIX}/{pid}/ns/net")
}

/// Builds a command that runs `cmd` inside the network namespace at `ns_path`.
pub fn with_netns<I, S>(ns_path: &str, cmd: &str, args: I) -> Command
where
    I: IntoIterator<Item = S>,
    S: AsRef<std::ffi::OsStr>,
{
    // BusyBox's nsenter only accepts the namespace path glued to the flag.
    let mut command = Command::new("nsenter");
    command.arg(format!("-n{ns_path}")).arg("--").arg(cmd).args(args);
    command.kill_on_drop(true);
    command
}
