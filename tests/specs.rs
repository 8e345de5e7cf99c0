// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Zelkova Contributors

//! End-to-end scenarios against the in-memory service.

use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use zelkova_client::testing::{MemoryConnector, MemoryService};
use zelkova_client::{
    acl, CancelWatch, ConnectOptions, DeleteOptions, ImportOptions, KeeperState, PropertyMap,
    Session, TreeError, Trim,
};

use parking_lot::Mutex;

fn connect(service: &Arc<MemoryService>) -> Session {
    Session::connect_with(
        Box::new(MemoryConnector {
            service: service.clone(),
        }),
        "zookeeper.example.com:2181",
        ConnectOptions::new().retry_interval(Duration::from_millis(5)),
    )
    .expect("connect")
}

fn map_of(value: serde_json::Value) -> PropertyMap {
    match value {
        serde_json::Value::Object(map) => map,
        other => panic!("not an object: {other:?}"),
    }
}

#[test]
fn basic_property_observer_lifecycle() {
    let service = MemoryService::new();
    service.seed("/svc", br#"{"a":1}"#);
    let session = connect(&service);

    let properties = session.properties("/svc").expect("observer");
    let values: Arc<Mutex<Vec<PropertyMap>>> = Arc::new(Mutex::new(Vec::new()));
    let deletions = Arc::new(Mutex::new(0usize));

    let sink = values.clone();
    properties.subscribe(move |snapshot| {
        sink.lock().push(snapshot.clone());
        Ok(())
    });
    let sink = deletions.clone();
    properties.on_delete(move || {
        *sink.lock() += 1;
        Ok(())
    });

    assert_eq!(values.lock().clone(), vec![map_of(json!({"a": 1}))]);

    session.set("/svc", br#"{"b":2}"#).expect("set");
    session.sync();
    assert_eq!(values.lock().last(), Some(&map_of(json!({"b": 2}))));

    session.delete("/svc").expect("delete");
    session.sync();
    assert_eq!(*deletions.lock(), 1, "zero-argument callbacks fire");
    assert_eq!(values.lock().len(), 2, "value callbacks do not fire on deletion");
}

#[test]
fn node_link_resolution_collapses_and_detects_loops() {
    let service = MemoryService::new();
    service.seed("/top", b"");
    service.seed("/top/a", br#"{"top ->":"/top"}"#);
    let session = connect(&service);

    assert_eq!(
        session.resolve("/top/a/top/a/top/a/top").expect("resolve"),
        "/top"
    );

    service.seed("/", br#"{"x ->":"/y","y ->":"/x"}"#);
    assert_eq!(
        session.resolve("/x"),
        Err(TreeError::LinkLoop(vec![
            "/x".to_string(),
            "/y".to_string(),
            "/x".to_string(),
        ]))
    );
}

#[test]
fn resolver_is_idempotent() {
    let service = MemoryService::new();
    service.seed("/databases/main", b"");
    service.seed("/svc", br#"{"db ->":"/databases/main"}"#);
    let session = connect(&service);

    for input in ["/svc/db", "/svc/../svc/db", "/databases/main", "/"] {
        let once = session.resolve(input).expect("resolve");
        assert_eq!(session.resolve(&once).expect("resolve"), once);
    }
}

#[test]
fn ephemeral_registration_survives_session_expiry() {
    let service = MemoryService::new();
    service.seed("/svc/providers", b"");
    let session = connect(&service);

    session
        .register("/svc/providers", "1.2.3.4:5678", PropertyMap::new())
        .expect("register");

    service.expire_all();
    session.sync();

    let node = "/svc/providers/1.2.3.4:5678";
    assert_eq!(session.state(), KeeperState::Connected);
    assert!(session.exists(node).expect("exists"));
    let properties = session.get_properties(node).expect("props");
    assert_eq!(properties.get("pid"), Some(&json!(std::process::id())));
    assert_eq!(
        session.get_acls(node).expect("acls").0,
        vec![acl::world_acl(acl::perms::READ)]
    );
}

#[test]
fn dry_run_import_reports_the_documented_vocabulary() {
    let service = MemoryService::new();
    service.seed("/t", br#"{"a":1,"ad ->":"/y","ae ->":"/x","b":2}"#);
    service.seed("/t/c1/c12", b"");
    service.seed("/t/c2", b"");
    let session = connect(&service);

    let report = session
        .import_tree(
            "/t\n a=2\n /c1\n  /c12\n   a=1\n   b -> /b\n   /c123\n ae->/z\n",
            ImportOptions::new().dry_run(true),
        )
        .expect("import");

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
}

#[test]
fn property_links_notify_transitively() {
    let service = MemoryService::new();
    service.seed("/a", b"");
    service.seed("/a/b", br#"{"x =>":"../c"}"#);
    service.seed("/a/c", br#"{"x":1}"#);
    let session = connect(&service);

    let properties = session.properties("/a/b").expect("observer");
    let fired = Arc::new(Mutex::new(0usize));
    let sink = fired.clone();
    properties.subscribe(move |_| {
        *sink.lock() += 1;
        Ok(())
    });
    assert_eq!(*fired.lock(), 1);
    assert_eq!(properties.get("x").expect("get"), json!(1));

    session.set("/a/c", br#"{"x":2}"#).expect("set");
    session.sync();
    assert!(*fired.lock() >= 2, "linked change must notify the dependent");
    assert_eq!(properties.get("x").expect("get"), json!(2));
}

#[test]
fn bad_property_link_is_rejected_atomically() {
    let service = MemoryService::new();
    service.seed("/svc", br#"{"database":"/databases/foomain","threads":1}"#);
    let session = connect(&service);

    let properties = session.properties("/svc").expect("observer");
    let err = properties
        .update(map_of(json!({"c =>": "/missing x"})))
        .expect_err("must fail");
    assert!(matches!(err, TreeError::BadPropertyLink { .. }), "{err:?}");
    assert_eq!(
        session.get_properties("/svc").expect("props"),
        map_of(json!({"database": "/databases/foomain", "threads": 1}))
    );
}

#[test]
fn import_export_round_trip_is_canonical() {
    let service = MemoryService::new();
    let session = connect(&service);

    // unsorted keys and uneven indentation on the way in
    session
        .import_tree(
            "/svc\n    zeta = 2\n    alpha = 1\n    db -> /databases/main\n    /kid\n",
            ImportOptions::new(),
        )
        .expect("import");

    let exported = session.export_tree("/", false, None).expect("export");
    similar_asserts::assert_eq!(
        exported,
        "/svc\n  alpha = 1\n  zeta = 2\n  db -> /databases/main\n  /kid\n"
    );

    // importing the canonical form back is a no-op
    let service2 = MemoryService::new();
    let session2 = connect(&service2);
    session2
        .import_tree(&exported, ImportOptions::new())
        .expect("reimport");
    assert_eq!(
        session2.export_tree("/", false, None).expect("export"),
        exported
    );
}

#[test]
fn observers_keep_firing_after_recovery() {
    let service = MemoryService::new();
    service.seed("/svc", b"");
    let session = connect(&service);

    let children = session.children("/svc").expect("observer");
    let fired = Arc::new(Mutex::new(0usize));
    let sink = fired.clone();
    children.subscribe(move |_| {
        *sink.lock() += 1;
        Ok(())
    });

    for round in 0..3u8 {
        service.expire_all();
        session.sync();
        session
            .create(
                &format!("/svc/n{round}"),
                b"",
                &acl::open_acl_unsafe(),
                false,
            )
            .expect("create");
        session.sync();
    }
    assert_eq!(children.current().len(), 3);
    assert!(*fired.lock() >= 4, "one initial call plus one per change");
}

#[test]
fn registry_forgets_dropped_observers() {
    let service = MemoryService::new();
    service.seed("/svc", b"");
    let session = connect(&service);

    let a = session.children("/svc").expect("observer");
    let b = session.properties("/svc").expect("observer");
    assert_eq!(session.watch_count(), 2);

    drop(a);
    assert_eq!(session.watch_count(), 1);
    drop(b);
    assert_eq!(session.watch_count(), 0);
}

#[test]
fn cancel_watch_unsubscribes_from_inside() {
    let service = MemoryService::new();
    service.seed("/svc", b"");
    let session = connect(&service);

    let children = session.children("/svc").expect("observer");
    let calls = Arc::new(Mutex::new(0usize));
    let sink = calls.clone();
    children.subscribe(move |_| {
        *sink.lock() += 1;
        Err(CancelWatch)
    });

    session
        .create("/svc/a", b"", &acl::open_acl_unsafe(), false)
        .expect("create");
    session.sync();
    assert_eq!(*calls.lock(), 1, "cancelled on the immediate call");
}

#[test]
fn delete_recursive_honors_ephemeral_chains() {
    let service = MemoryService::new();
    service.seed("/svc/sub", b"");
    let session = connect(&service);
    session
        .create("/svc/sub/worker", b"", &acl::open_acl_unsafe(), true)
        .expect("create");

    session
        .delete_recursive("/svc", DeleteOptions::new())
        .expect("delete");
    assert!(session.exists("/svc/sub/worker").expect("exists"));

    session
        .delete_recursive("/svc", DeleteOptions::new().force(true))
        .expect("delete");
    assert!(!session.exists("/svc").expect("exists"));
}

#[test]
fn trim_import_respects_the_modes() {
    for (trim, expect_extra, expect_warn) in [
        (Trim::Ignore, true, false),
        (Trim::Warn, true, true),
        (Trim::Prune, false, false),
    ] {
        let service = MemoryService::new();
        service.seed("/t/keep", b"");
        service.seed("/t/extra", b"");
        let session = connect(&service);

        let report = session
            .import_tree("/t\n  /keep\n", ImportOptions::new().trim(trim))
            .expect("import");
        assert_eq!(
            session.exists("/t/extra").expect("exists"),
            expect_extra,
            "{trim:?}"
        );
        assert_eq!(
            report.contains(&"extra path not trimmed: /t/extra".to_string()),
            expect_warn,
            "{trim:?}"
        );
    }
}
