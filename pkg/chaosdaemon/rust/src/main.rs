// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2025-present Datadog, Inc.

use std::path::PathBuf;

use anyhow::{Context, Result};
use chaos_daemon::config::{config_path, load_config};
use chaos_daemon::{SocketConnector, create_container_runtime_info_client, netns_path};
use clap::{Parser, Subcommand};
use log::{debug, info};
use serde_json::json;

#[derive(Parser, Debug)]
#[command(name = "chaosd-probe")]
#[command(about = "Inspect containers and processes the way the chaos daemon sees them", long_about = None)]
struct Args {
    /// Configuration file, defaults to $CHAOS_DAEMON_CONFIG or /etc/chaos-daemon/runtime.yaml
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Container runtime to talk to, overrides the configuration
    #[arg(short, long)]
    runtime: Option<String>,

    #[arg(long, default_value = "info")]
    log_level: log::Level,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the host PID of a container's root process
    Pid {
        #[arg(long)]
        container_id: String,
    },
    /// Kill a container
    Kill {
        #[arg(long)]
        container_id: String,
    },
    /// List the descendants of a process
    Children {
        #[arg(long)]
        pid: u32,

        /// Also list the process itself
        #[arg(long)]
        include_root: bool,
    },
    /// Print the network namespace path of a process
    Netns {
        #[arg(long)]
        pid: u32,
    },
}

#[allow(clippy::print_stdout)]
fn print_json(value: &serde_json::Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    simple_logger::init_with_level(args.log_level)?;
    debug!(
        "chaosd-probe starting (version {})",
        env!("CARGO_PKG_VERSION")
    );

    let path = args.config.unwrap_or_else(config_path);
    let mut config = load_config(&path)?;
    if let Some(runtime) = args.runtime {
        config.runtime = runtime;
    }

    match args.command {
        Command::Pid { container_id } => {
            let client =
                create_container_runtime_info_client(&config.runtime, &config, &SocketConnector)
                    .await?;
            let pid = client
                .get_pid_from_container_id(&container_id)
                .await
                .with_context(|| format!("resolving pid of {container_id}"))?;
            print_json(&json!({ "container_id": container_id, "pid": pid }))
        }
        Command::Kill { container_id } => {
            let client =
                create_container_runtime_info_client(&config.runtime, &config, &SocketConnector)
                    .await?;
            client
                .container_kill_by_container_id(&container_id)
                .await
                .with_context(|| format!("killing {container_id}"))?;
            info!("killed {container_id}");
            print_json(&json!({ "container_id": container_id, "killed": true }))
        }
        Command::Children { pid, include_root } => {
            let tree = config.process_tree();
            let mut pids = tree.build_descendants(pid).await?;
            if include_root {
                pids.insert(0, pid);
            }
            print_json(&json!({ "pid": pid, "descendants": pids }))
        }
        Command::Netns { pid } => print_json(&json!({ "pid": pid, "netns": netns_path(pid) })),
    }
}
