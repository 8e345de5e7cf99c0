// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Zelkova Contributors

//! Binary-level specs for the export and import commands.

use assert_cmd::Command;
use std::io::Write;

struct Run {
    success: bool,
    stdout: String,
    stderr: String,
}

impl Run {
    fn passes(self) -> Self {
        assert!(self.success, "expected success; stderr: {}", self.stderr);
        self
    }

    fn fails(self) -> Self {
        assert!(!self.success, "expected failure; stdout: {}", self.stdout);
        self
    }

    fn stdout_is(self, want: &str) -> Self {
        assert_eq!(self.stdout, want);
        self
    }

    fn stderr_has(self, want: &str) -> Self {
        assert!(self.stderr.contains(want), "stderr: {}", self.stderr);
        self
    }
}

fn run(name: &str, args: &[&str], stdin: Option<&str>) -> Run {
    let mut cmd = Command::cargo_bin(name).unwrap();
    cmd.args(args);
    if let Some(text) = stdin {
        cmd.write_stdin(text);
    }
    let out = cmd.output().unwrap();
    Run {
        success: out.status.success(),
        stdout: String::from_utf8_lossy(&out.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&out.stderr).into_owned(),
    }
}

#[test]
fn export_requires_a_connection() {
    run("zookeeper-export", &[], None)
        .fails()
        .stderr_has("Usage");
}

#[test]
fn import_rejects_extra_positionals() {
    run(
        "zookeeper-import",
        &["mem:cli", "-", "/", "surplus"],
        None,
    )
    .fails()
    .stderr_has("Usage");
}

#[test]
fn export_of_a_fresh_memory_service_is_empty() {
    run("zookeeper-export", &["mem:cli-export"], None)
        .passes()
        .stdout_is("");
}

#[test]
fn export_can_write_to_a_file() {
    let dir = tempfile::tempdir().unwrap();
    let out = dir.path().join("tree.txt");
    run(
        "zookeeper-export",
        &["-o", &out.display().to_string(), "mem:cli-export-file"],
        None,
    )
    .passes()
    .stdout_is("");
    assert_eq!(std::fs::read_to_string(&out).unwrap(), "");
}

#[test]
fn import_dry_run_reports_adds_from_stdin() {
    run(
        "zookeeper-import",
        &["-d", "mem:cli-import"],
        Some("/svc\n  threads = 1\n  /kid\n"),
    )
    .passes()
    .stdout_is("add /svc\nadd /svc/kid\n");
}

#[test]
fn import_reads_a_definition_file() {
    let dir = tempfile::tempdir().unwrap();
    let file = dir.path().join("tree.zk");
    let mut f = std::fs::File::create(&file).unwrap();
    writeln!(f, "/svc").unwrap();
    drop(f);

    run(
        "zookeeper-import",
        &["-d", "mem:cli-import-file", &file.display().to_string()],
        None,
    )
    .passes()
    .stdout_is("add /svc\n");
}

#[test]
fn unknown_connection_fails_cleanly() {
    run("zookeeper-export", &["nowhere.example.com:2181"], None)
        .fails()
        .stderr_has("can't connect");
}
