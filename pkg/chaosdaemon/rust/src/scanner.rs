// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2025-present Datadog, Inc.

use std::io::ErrorKind;
use std::num::NonZeroUsize;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use log::{debug, error, warn};
use nix::errno::Errno;
use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinSet;

use crate::errors::{Error, Result};
use crate::graph::ProcessGraph;
use crate::procfs::{self, ProcessRecord};

const READERS_PER_CPU: usize = 4;

pub fn default_concurrency() -> usize {
    std::thread::available_parallelism()
        .map(NonZeroUsize::get)
        .unwrap_or(1)
        * READERS_PER_CPU
}

/// Reads `<root>/<pid>/stat` for every PID directory under a process root.
#[derive(Debug, Clone)]
pub struct ProcessTableScanner {
    root: PathBuf,
    concurrency: usize,
}

impl ProcessTableScanner {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            concurrency: default_concurrency(),
        }
    }

    /// Caps how many stat files are read at the same time.
    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Starts a scan and returns the stream of records it produces.
    ///
    /// The receiver yields `None` only once every reader has handed off its
    /// record, so draining it to the end observes the complete table.
    /// Unreadable or malformed entries are logged and skipped.
    pub async fn scan(&self) -> Result<mpsc::Receiver<ProcessRecord>> {
        let mut entries = tokio::fs::read_dir(&self.root).await.map_err(|e| {
            Error::ProcessTableUnreadable {
                path: self.root.clone(),
                message: e.to_string(),
            }
        })?;

        let (tx, rx) = mpsc::channel(self.concurrency);
        let permits = Arc::new(Semaphore::new(self.concurrency));
        let root = self.root.clone();

        tokio::spawn(async move {
            let mut readers = JoinSet::new();

            loop {
                let entry = match entries.next_entry().await {
                    Ok(Some(entry)) => entry,
                    Ok(None) => break,
                    Err(e) => {
                        warn!("stopped listing {}: {e}", root.display());
                        break;
                    }
                };

                let file_name = entry.file_name();
                let Some(name) = file_name.to_str() else {
                    continue;
                };
                let Ok(pid) = name.parse::<u32>() else {
                    continue;
                };

                let Ok(permit) = Arc::clone(&permits).acquire_owned().await else {
                    break;
                };
                let path = procfs::stat_path(&root, name);
                let tx = tx.clone();
                readers.spawn(async move {
                    let _permit = permit;
                    if let Some(record) = read_record(pid, &path).await {
                        // Fails only if the consumer stopped listening.
                        let _ = tx.send(record).await;
                    }
                });

                while let Some(finished) = readers.try_join_next() {
                    log_reader_failure(finished);
                }
            }

            drop(tx);
            while let Some(finished) = readers.join_next().await {
                log_reader_failure(finished);
            }
        });

        Ok(rx)
    }
}

fn log_reader_failure(result: std::result::Result<(), tokio::task::JoinError>) {
    if let Err(e) = result {
        error!("process table reader failed: {e}");
    }
}

async fn read_record(pid: u32, path: &Path) -> Option<ProcessRecord> {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        // The process exited between listing and reading.
        Err(e)
            if e.kind() == ErrorKind::NotFound
                || e.raw_os_error() == Some(Errno::ESRCH as i32) =>
        {
            debug!("{} vanished during scan", path.display());
            return None;
        }
        Err(e) => {
            warn!("read status file error: {}: {e}", path.display());
            return None;
        }
    };

    let Some(record) = procfs::parse_stat(&content) else {
        warn!("could not parse status file {}", path.display());
        return None;
    };
    if record.pid != pid {
        warn!(
            "status file {} belongs to pid {}, skipping",
            path.display(),
            record.pid
        );
        return None;
    }
    Some(record)
}

/// Builds process graphs from full scans of a process table.
#[derive(Debug, Clone)]
pub struct ProcessTree {
    scanner: ProcessTableScanner,
}

impl ProcessTree {
    pub fn new(scanner: ProcessTableScanner) -> Self {
        Self { scanner }
    }

    pub fn scanner(&self) -> &ProcessTableScanner {
        &self.scanner
    }

    /// Scans the whole table and returns the populated graph. A scan without a
    /// single readable entry is an error, so that an unreadable table is not
    /// mistaken for a process without children.
    pub async fn build_graph(&self) -> Result<ProcessGraph> {
        let mut records = self.scanner.scan().await?;
        let mut graph = ProcessGraph::new();
        let mut scanned = 0usize;

        while let Some(record) = records.recv().await {
            graph.insert(record.parent_pid, record.pid);
            scanned += 1;
        }

        if graph.is_empty() {
            return Err(Error::EmptyProcessTable(self.scanner.root().to_path_buf()));
        }
        debug!(
            "scanned {scanned} processes under {}",
            self.scanner.root().display()
        );
        Ok(graph)
    }

    /// All descendants of `root_pid`, excluding `root_pid` itself.
    pub async fn build_descendants(&self, root_pid: u32) -> Result<Vec<u32>> {
        Ok(self.build_graph().await?.flatten(root_pid))
    }
}

/// Returns the PIDs of every generation of children of `ppid` on this host.
pub async fn get_child_processes(ppid: u32) -> Result<Vec<u32>> {
    ProcessTree::new(ProcessTableScanner::new(procfs::root_path()))
        .build_descendants(ppid)
        .await
}
