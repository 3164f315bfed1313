//! Shared fixtures for the forkstat integration tests.
//!
//! The fixture corpus has three storage roots and six records:
//!
//! - `r-shared` holds `upstream`, `alice` and `bob`
//! - `r-extra` holds a second branch of `alice`
//! - `r-solo` holds `solo`, and is also referenced by `broken`, which has no
//!   HEAD reference
//! - `pending` is not fetched and never exported

#![allow(dead_code)]

use std::io::{self, Write};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use forkstat::model::{FetchStatus, RecordReference, HEAD_REFERENCE};
use forkstat::storage::memory::{MemoryRoot, MemoryTransactioner};
use forkstat::{CancelToken, ExportConfig, ManifestStore, RepositoryRecord, RootId};

pub const MIT: &str = "MIT License\n\nPermission is hereby granted, free of charge, to any person obtaining a copy\nof this software and associated documentation files (the \"Software\"), to deal\nin the Software without restriction.\n";

pub const SHARED: &str = "r-shared";
pub const EXTRA: &str = "r-extra";
pub const SOLO: &str = "r-solo";

pub fn record(id: &str, status: FetchStatus, endpoints: &[&str], refs: &[(&str, &str)]) -> RepositoryRecord {
    RepositoryRecord {
        id: id.to_string(),
        status,
        endpoints: endpoints.iter().map(|e| e.to_string()).collect(),
        references: refs
            .iter()
            .map(|(name, root)| RecordReference {
                name: name.to_string(),
                root: RootId::new(*root),
            })
            .collect(),
    }
}

pub fn records() -> Vec<RepositoryRecord> {
    use FetchStatus::*;
    vec![
        record(
            "upstream",
            Fetched,
            &["https://github.com/org/project"],
            &[(HEAD_REFERENCE, SHARED), ("refs/heads/master", SHARED)],
        ),
        record(
            "alice",
            Fetched,
            &["https://github.com/alice/project"],
            &[(HEAD_REFERENCE, SHARED), ("refs/heads/feature", EXTRA)],
        ),
        record(
            "bob",
            Fetched,
            &["https://github.com/bob/project"],
            &[(HEAD_REFERENCE, SHARED)],
        ),
        record(
            "solo",
            Fetched,
            &["git://gitlab.com/solo/tool.git", "https://github.com/solo/tool"],
            &[(HEAD_REFERENCE, SOLO)],
        ),
        record(
            "broken",
            Fetched,
            &["https://github.com/broken/thing"],
            &[("refs/heads/master", SOLO)],
        ),
        record(
            "pending",
            Pending,
            &["https://github.com/pending/thing"],
            &[(HEAD_REFERENCE, SOLO)],
        ),
    ]
}

pub fn store() -> Arc<ManifestStore> {
    Arc::new(ManifestStore::from_records(records()))
}

pub fn transactioner(latency: Option<Duration>) -> Arc<MemoryTransactioner> {
    let txer = match latency {
        Some(latency) => MemoryTransactioner::new().with_latency(latency),
        None => MemoryTransactioner::new(),
    };

    txer.insert(
        RootId::new(SHARED),
        MemoryRoot::new()
            .remote("upstream", "https://github.com/org/project")
            .remote("alice", "https://github.com/alice/project")
            .remote("bob", "https://github.com/bob/project")
            .commit("c1", &[], &[("LICENSE", MIT), ("main.go", "package main\n")])
            .commit(
                "c2",
                &["c1"],
                &[
                    ("LICENSE", MIT),
                    ("main.go", "package main\n\nfunc main() {}\n"),
                    ("util/util.go", "package util\n// Helper does nothing.\nfunc Helper() {}\n"),
                ],
            )
            .commit(
                "c3",
                &["c2"],
                &[
                    ("LICENSE", MIT),
                    ("main.go", "package main\n\nfunc main() {}\n"),
                    ("README.md", "# project\n"),
                ],
            )
            .commit("c4", &["c1"], &[("main.go", "package main\n")])
            .reference("refs/heads/HEAD/upstream", "c2")
            .reference("refs/heads/master/upstream", "c2")
            .reference("refs/heads/HEAD/alice", "c3")
            .reference("refs/heads/HEAD/bob", "c4")
            .reference("refs/tags/v1/upstream", "c1"),
    );
    txer.insert(
        RootId::new(EXTRA),
        MemoryRoot::new()
            .remote("alice", "https://github.com/alice/project")
            .commit("x1", &[], &[])
            .commit("x2", &["x1"], &[])
            .reference("refs/heads/feature/alice", "x2"),
    );
    txer.insert(
        RootId::new(SOLO),
        MemoryRoot::new()
            .remote("origin", "git://gitlab.com/solo/tool.git")
            .remote("origin", "https://github.com/solo/tool")
            .commit(
                "s1",
                &[],
                &[("tool.py", "#!/usr/bin/env python3\n# tool\nprint('hi')\n")],
            )
            .reference("refs/heads/HEAD/origin", "s1"),
    );

    Arc::new(txer)
}

pub fn config(workers: usize) -> ExportConfig {
    ExportConfig {
        workers,
        poll_interval: Duration::from_millis(10),
        ..ExportConfig::default()
    }
}

/// Split CSV text into rows of fields, handling quoted fields.
pub fn parse_csv(text: &str) -> Vec<Vec<String>> {
    let mut rows = Vec::new();
    for line in text.lines() {
        let mut fields = Vec::new();
        let mut field = String::new();
        let mut quoted = false;
        let mut chars = line.chars().peekable();
        while let Some(c) = chars.next() {
            match c {
                '"' if quoted && chars.peek() == Some(&'"') => {
                    field.push('"');
                    chars.next();
                }
                '"' => quoted = !quoted,
                ',' if !quoted => fields.push(std::mem::take(&mut field)),
                c => field.push(c),
            }
        }
        fields.push(field);
        rows.push(fields);
    }
    rows
}

/// Data row whose URL column equals `url`.
pub fn row<'a>(rows: &'a [Vec<String>], url: &str) -> &'a [String] {
    rows.iter()
        .find(|r| r[0] == url)
        .unwrap_or_else(|| panic!("no row for {url}"))
}

/// In-memory writer shared with the test.
#[derive(Clone, Default)]
pub struct SharedBuffer(pub Arc<Mutex<Vec<u8>>>);

impl SharedBuffer {
    pub fn contents(&self) -> String {
        String::from_utf8(self.0.lock().unwrap().clone()).unwrap()
    }
}

impl Write for SharedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Trips the token once the writer has been flushed `after` times.
pub struct CancellingWriter {
    pub inner: SharedBuffer,
    pub cancel: CancelToken,
    pub after: usize,
    pub flushes: usize,
}

impl Write for CancellingWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.flushes += 1;
        if self.flushes == self.after {
            self.cancel.cancel();
        }
        Ok(())
    }
}
