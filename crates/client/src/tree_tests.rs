// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Zelkova Contributors

use super::*;
use crate::session::{ConnectOptions, Session};
use crate::testing::{MemoryConnector, MemoryService};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use zelkova_core::acl;

fn connect(service: &Arc<MemoryService>) -> Session {
    Session::connect_with(
        Box::new(MemoryConnector {
            service: service.clone(),
        }),
        "memory",
        ConnectOptions::new().retry_interval(Duration::from_millis(5)),
    )
    .unwrap()
}

#[test]
fn import_builds_the_tree() {
    let service = MemoryService::new();
    let session = connect(&service);

    let report = session
        .import_tree(
            "
/provision
  threads = 1
  /databases
    main -> /databases/main
",
            ImportOptions::new(),
        )
        .unwrap();
    assert!(report.is_empty(), "{report:?}");

    assert_eq!(
        session.get_properties("/provision").unwrap().get("threads"),
        Some(&json!(1))
    );
    assert_eq!(
        session
            .get_properties("/provision/databases")
            .unwrap()
            .get("main ->"),
        Some(&json!("/databases/main"))
    );
}

#[test]
fn import_then_export_round_trips() {
    let service = MemoryService::new();
    let session = connect(&service);

    let canonical = "\
/provision
  threads = 1
  /databases
    main -> /databases/main
  /providers
    secret => /vault password
/stores : kv
  names = [\"a\",\"b\"]
";
    session
        .import_tree(canonical, ImportOptions::new())
        .unwrap();
    let exported = session.export_tree("/", false, None).unwrap();
    assert_eq!(exported, canonical);
}

#[test]
fn export_subtree_with_name_override() {
    let service = MemoryService::new();
    service.seed("/svc", br#"{"a":1}"#);
    service.seed("/svc/kid", b"");
    let session = connect(&service);

    let exported = session.export_tree("/svc", false, Some("renamed")).unwrap();
    assert_eq!(exported, "/renamed\n  a = 1\n  /kid\n");
}

#[test]
fn export_skips_ephemerals_unless_asked() {
    let service = MemoryService::new();
    service.seed("/svc", b"");
    let session = connect(&service);
    session
        .create("/svc/e", b"", &acl::open_acl_unsafe(), true)
        .unwrap();

    assert_eq!(session.export_tree("/svc", false, None).unwrap(), "/svc\n");
    assert_eq!(
        session.export_tree("/svc", true, None).unwrap(),
        "/svc\n  /e\n"
    );
}

// The full dry-run diff vocabulary in one scenario.
#[test]
fn dry_run_reports_the_exact_diff() {
    let service = MemoryService::new();
    service.seed(
        "/t",
        br#"{"a":1,"ad ->":"/y","ae ->":"/x","b":2}"#,
    );
    service.seed("/t/c1/c12", b"");
    service.seed("/t/c2", b"");
    let session = connect(&service);

    let report = session
        .import_tree(
            "
/t
 a=2
 /c1
  /c12
   a=1
   b -> /b
   /c123
 ae->/z
",
            ImportOptions::new().dry_run(true),
        )
        .unwrap();

    assert_eq!(
        report,
        vec![
            "/t a change from 1 to 2",
            "/t remove link ad -> /y",
            "/t ae link change from /x to /z",
            "/t remove property b = 2",
            "extra path not trimmed: /t/c2",
            "/t/c1/c12 add property a = 1",
            "/t/c1/c12 add link b -> /b",
            "add /t/c1/c12/c123",
        ]
    );
    // dry run left the tree alone
    assert_eq!(
        session.get_properties("/t").unwrap().get("a"),
        Some(&json!(1))
    );
    assert!(!session.exists("/t/c1/c12/c123").unwrap());
}

#[test]
fn trim_prunes_extras_but_never_ephemerals() {
    let service = MemoryService::new();
    service.seed("/t/keep", b"");
    service.seed("/t/extra/deep", b"");
    service.seed("/t/pinned", b"");
    let session = connect(&service);
    session
        .create("/t/pinned/e", b"", &acl::open_acl_unsafe(), true)
        .unwrap();

    let report = session
        .import_tree("/t\n  /keep\n", ImportOptions::new().base("/").trim(Trim::Prune))
        .unwrap();

    assert!(!session.exists("/t/extra").unwrap());
    assert!(session.exists("/t/keep").unwrap());
    // the ephemeral spared its whole chain
    assert!(session.exists("/t/pinned/e").unwrap());
    assert!(report
        .iter()
        .any(|l| l == "not deleting ephemeral node: /t/pinned/e"));
}

#[test]
fn import_reconciles_acls_at_the_current_version() {
    let service = MemoryService::new();
    service.seed("/t/svc", b"");
    let session = connect(&service);

    session
        .import_tree(
            "/svc\n",
            ImportOptions::new().base("/t").acls(acl::read_acl_unsafe()),
        )
        .unwrap();
    assert_eq!(
        session.get_acls("/t/svc").unwrap(),
        (acl::read_acl_unsafe(), 1)
    );

    // second run: ACLs already match, version untouched
    session
        .import_tree(
            "/svc\n",
            ImportOptions::new().base("/t").acls(acl::read_acl_unsafe()),
        )
        .unwrap();
    assert_eq!(session.get_acls("/t/svc").unwrap().1, 1);
}

#[test]
fn delete_recursive_spares_chains_with_ephemerals() {
    let service = MemoryService::new();
    service.seed("/t/a/b", b"");
    service.seed("/t/c", b"");
    let session = connect(&service);
    session
        .create("/t/a/b/e", b"", &acl::open_acl_unsafe(), true)
        .unwrap();

    let report = session
        .delete_recursive("/t", DeleteOptions::new())
        .unwrap();
    assert!(report
        .iter()
        .any(|l| l == "not deleting ephemeral node: /t/a/b/e"));
    // whole chain intact, sibling gone
    assert!(session.exists("/t/a/b/e").unwrap());
    assert!(session.exists("/t/a").unwrap());
    assert!(!session.exists("/t/c").unwrap());

    let report = session
        .delete_recursive("/t", DeleteOptions::new().force(true))
        .unwrap();
    assert!(report.is_empty(), "{report:?}");
    assert!(!session.exists("/t").unwrap());
}

#[test]
fn delete_recursive_dry_run_reports_children_first() {
    let service = MemoryService::new();
    service.seed("/t/a", b"");
    let session = connect(&service);

    let report = session
        .delete_recursive("/t", DeleteOptions::new().dry_run(true))
        .unwrap();
    assert_eq!(report, vec!["would delete: /t/a", "would delete: /t"]);
    assert!(session.exists("/t").unwrap());
}

#[test]
fn delete_recursive_can_ignore_an_ephemeral_target() {
    let service = MemoryService::new();
    service.seed("/t", b"");
    let session = connect(&service);
    session
        .create("/t/e", b"", &acl::open_acl_unsafe(), true)
        .unwrap();

    let report = session
        .delete_recursive("/t/e", DeleteOptions::new().ignore_if_ephemeral(true))
        .unwrap();
    assert!(report.is_empty());
    assert!(session.exists("/t/e").unwrap());
}

#[test]
fn walk_is_depth_first_in_lexical_order() {
    let service = MemoryService::new();
    service.seed("/t/b/deep", b"");
    service.seed("/t/a", b"");
    let session = connect(&service);

    let paths: Vec<String> = session
        .walk("/t", true)
        .unwrap()
        .map(|entry| entry.path)
        .collect();
    assert_eq!(paths, vec!["/t", "/t/a", "/t/b", "/t/b/deep"]);

    let entries: Vec<WalkEntry> = session.walk("/t/b", true).unwrap().collect();
    assert_eq!(entries[0].children, vec!["deep".to_string()]);
}

#[test]
fn walk_can_skip_ephemerals() {
    let service = MemoryService::new();
    service.seed("/t/a", b"");
    let session = connect(&service);
    session
        .create("/t/e", b"", &acl::open_acl_unsafe(), true)
        .unwrap();

    let paths: Vec<String> = session
        .walk("/t", false)
        .unwrap()
        .map(|entry| entry.path)
        .collect();
    assert_eq!(paths, vec!["/t", "/t/a"]);
}

#[test]
fn ln_writes_a_link_on_the_parent() {
    let service = MemoryService::new();
    service.seed("/databases/main", b"");
    service.seed("/svc", br#"{"a":1}"#);
    let session = connect(&service);

    session.ln("/databases/main", "/svc/db").unwrap();
    assert_eq!(
        session.get_properties("/svc").unwrap().get("db ->"),
        Some(&json!("/databases/main"))
    );
    assert_eq!(session.resolve("/svc/db").unwrap(), "/databases/main");

    // trailing slash borrows the target's base name
    session.ln("/databases/main", "/svc/").unwrap();
    assert_eq!(session.resolve("/svc/main").unwrap(), "/databases/main");
}
