// Unless explicitly stated otherwise all files in this repository are licensed
// under the Apache License Version 2.0.
// This product includes software developed at Datadog (https://www.datadoghq.com/).
// Copyright 2025-present Datadog, Inc.

use std::collections::{HashMap, HashSet};

/// Parent to children edges collected from one process table scan.
#[derive(Debug, Default)]
pub struct ProcessGraph {
    children: HashMap<u32, HashSet<u32>>,
}

impl ProcessGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records `child` as an immediate child of `parent`. Inserting the same
    /// edge twice has no effect.
    pub fn insert(&mut self, parent: u32, child: u32) {
        self.children.entry(parent).or_default().insert(child);
    }

    pub fn is_empty(&self) -> bool {
        self.children.is_empty()
    }

    /// Returns every PID transitively reachable from `root`, sorted, excluding
    /// `root` itself. Each PID is visited once, so self-parented entries and
    /// cycles terminate.
    pub fn flatten(&self, root: u32) -> Vec<u32> {
        let mut visited = HashSet::from([root]);
        let mut stack = vec![root];
        let mut descendants = Vec::new();

        while let Some(pid) = stack.pop() {
            let Some(children) = self.children.get(&pid) else {
                continue;
            };
            for &child in children {
                if visited.insert(child) {
                    descendants.push(child);
                    stack.push(child);
                }
            }
        }

        descendants.sort_unstable();
        descendants
    }
}
