// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2025-present Datadog, Inc.

use std::env;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

pub const DEFAULT_PROC_PREFIX: &str = "/proc";

static PROC_ROOT: OnceLock<PathBuf> = OnceLock::new();

/// Root of the process table to inspect. `HOST_PROC` lets the daemon look at
/// the host's process table when it runs inside a container.
pub fn root_path() -> &'static Path {
    PROC_ROOT.get_or_init(|| {
        if let Ok(v) = env::var("HOST_PROC") {
            return v.into();
        }

        DEFAULT_PROC_PREFIX.into()
    })
}

/// The part of `/proc/<pid>/stat` the process graph needs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProcessRecord {
    pub pid: u32,
    pub parent_pid: u32,
}

/// Parses the leading `pid (comm) state ppid` fields of a stat line.
///
/// The command name is usually wrapped in parentheses and may itself contain
/// spaces or parentheses, so the closing parenthesis is searched from the end.
/// A bare command name without parentheses is accepted as well.
pub fn parse_stat(content: &str) -> Option<ProcessRecord> {
    let content = content.trim_start();
    let (pid, rest) = content.split_once(char::is_whitespace)?;
    let pid = pid.parse().ok()?;

    let rest = rest.trim_start();
    let after_comm = if rest.starts_with('(') {
        let close = rest.rfind(')')?;
        rest.get(close + 1..)?
    } else {
        rest.split_once(char::is_whitespace)?.1
    };

    let mut fields = after_comm.split_ascii_whitespace();
    let state = fields.next()?;
    if state.chars().count() != 1 {
        return None;
    }
    let parent_pid = fields.next()?.parse().ok()?;

    Some(ProcessRecord { pid, parent_pid })
}

/// Path of the stat file for `pid` under `root`.
pub fn stat_path(root: &Path, pid: &str) -> PathBuf {
    root.join(pid).join("stat")
}
