// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2025-present Datadog, Inc.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result};
use log::{debug, warn};
use serde::Deserialize;

use crate::procfs;
use crate::scanner::{ProcessTableScanner, ProcessTree};

const DEFAULT_CONFIG_PATH: &str = "/etc/chaos-daemon/runtime.yaml";

pub const DEFAULT_RUNTIME: &str = "docker";
pub const DEFAULT_DOCKER_SOCKET: &str = "/var/run/docker.sock";
pub const DEFAULT_CONTAINERD_SOCKET: &str = "/run/containerd/containerd.sock";
pub const DEFAULT_CONTAINERD_NAMESPACE: &str = "k8s.io";
pub const DEFAULT_CRIO_SOCKET: &str = "/var/run/crio/crio.sock";
pub const DEFAULT_CALL_TIMEOUT_SECS: u64 = 10;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RuntimeConfig {
    /// One of `docker`, `containerd` or `crio`. Validated when the client is
    /// created.
    pub runtime: String,
    pub docker_socket: PathBuf,
    pub containerd_socket: PathBuf,
    pub containerd_namespace: String,
    pub crio_socket: PathBuf,
    /// Upper bound for every single call to the container runtime.
    pub call_timeout_secs: u64,
    /// Defaults to `HOST_PROC`, then `/proc`.
    pub proc_root: Option<PathBuf>,
    /// Defaults to four stat readers per CPU.
    pub scan_concurrency: Option<usize>,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            runtime: DEFAULT_RUNTIME.to_string(),
            docker_socket: PathBuf::from(DEFAULT_DOCKER_SOCKET),
            containerd_socket: PathBuf::from(DEFAULT_CONTAINERD_SOCKET),
            containerd_namespace: DEFAULT_CONTAINERD_NAMESPACE.to_string(),
            crio_socket: PathBuf::from(DEFAULT_CRIO_SOCKET),
            call_timeout_secs: DEFAULT_CALL_TIMEOUT_SECS,
            proc_root: None,
            scan_concurrency: None,
        }
    }
}

impl RuntimeConfig {
    pub fn call_timeout(&self) -> Duration {
        Duration::from_secs(self.call_timeout_secs.max(1))
    }

    pub fn proc_root(&self) -> &Path {
        match &self.proc_root {
            Some(root) => root,
            None => procfs::root_path(),
        }
    }

    pub fn process_tree(&self) -> ProcessTree {
        let mut scanner = ProcessTableScanner::new(self.proc_root());
        if let Some(concurrency) = self.scan_concurrency {
            scanner = scanner.with_concurrency(concurrency);
        }
        ProcessTree::new(scanner)
    }

    /// Applies `CHAOS_DAEMON_*` overrides obtained through `lookup`.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(v) = lookup("CHAOS_DAEMON_RUNTIME") {
            self.runtime = v;
        }
        if let Some(v) = lookup("CHAOS_DAEMON_DOCKER_SOCKET") {
            self.docker_socket = v.into();
        }
        if let Some(v) = lookup("CHAOS_DAEMON_CONTAINERD_SOCKET") {
            self.containerd_socket = v.into();
        }
        if let Some(v) = lookup("CHAOS_DAEMON_CONTAINERD_NAMESPACE") {
            self.containerd_namespace = v;
        }
        if let Some(v) = lookup("CHAOS_DAEMON_CRIO_SOCKET") {
            self.crio_socket = v.into();
        }
        if let Some(v) = lookup("CHAOS_DAEMON_CALL_TIMEOUT_SECS") {
            self.call_timeout_secs = v
                .parse()
                .with_context(|| format!("invalid CHAOS_DAEMON_CALL_TIMEOUT_SECS: {v}"))?;
        }
        if let Some(v) = lookup("CHAOS_DAEMON_SCAN_CONCURRENCY") {
            self.scan_concurrency = Some(
                v.parse()
                    .with_context(|| format!("invalid CHAOS_DAEMON_SCAN_CONCURRENCY: {v}"))?,
            );
        }
        Ok(())
    }
}

pub fn config_path() -> PathBuf {
    std::env::var("CHAOS_DAEMON_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH))
}

/// Loads the configuration file at `path`, falling back to the defaults when it
/// does not exist, then applies environment overrides.
pub fn load_config(path: &Path) -> Result<RuntimeConfig> {
    let mut config = if path.exists() {
        parse_config(path)?
    } else {
        warn!(
            "config file not found at {}, using defaults",
            path.display()
        );
        RuntimeConfig::default()
    };

    config.apply_env_overrides(|key| std::env::var(key).ok())?;
    debug!("runtime config: {config:?}");
    Ok(config)
}

fn parse_config(path: &Path) -> Result<RuntimeConfig> {
    let contents =
        std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    // An empty file deserializes to null rather than to an empty mapping.
    if contents.trim().is_empty() {
        return Ok(RuntimeConfig::default());
    }
    let config: RuntimeConfig =
        serde_yaml::from_str(&contents).with_context(|| format!("parsing {}", path.display()))?;
    Ok(config)
}
