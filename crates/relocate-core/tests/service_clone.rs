//! Deep clones of composite services and identifier handling.

mod support;

use serde_json::Value;

use relocate_core::clone::{CloneEngine, CloneOptions};
use relocate_core::error::MigrationError;
use relocate_core::locate::Locator;
use relocate_core::migrate::{MigrationOptions, MoveRequest};
use relocate_core::schema::{ENV_VARS_TABLE, VOLUMES_TABLE};
use relocate_core::store::ConfigStore;
use relocate_core::types::{OwnerRef, ResourceKind, SubResourceKind};

use support::{Fixture, GIB};

struct Service {
    id: i64,
    app: i64,
    db: i64,
}

/// Service `blog` (svc1) on alpha with a `ghost` application and a `mysql`
/// database, each carrying one variable and one volume.
fn seed_service(f: &Fixture) -> Service {
    let store = &f.store;
    let id = store.add_resource(ResourceKind::Service, "svc1", "blog", f.alpha);
    store.add_env_var(
        OwnerRef::resource(ResourceKind::Service, id),
        "SERVICE_FQDN_GHOST",
        "https://blog.example.com",
    );

    let app = store.add_sub_resource(SubResourceKind::Application, id, "app1", "ghost");
    let app_owner = OwnerRef::sub(SubResourceKind::Application, app);
    store.add_env_var(app_owner, "url", "https://blog.example.com");
    store.add_volume(app_owner, "app1-content", "/var/lib/ghost/content");

    let db = store.add_sub_resource(SubResourceKind::Database, id, "db1", "mysql");
    let db_owner = OwnerRef::sub(SubResourceKind::Database, db);
    store.add_env_var(db_owner, "MYSQL_PASSWORD", "secret");
    store.add_volume(db_owner, "db1-mysql-data", "/var/lib/mysql");

    f.shell.with_host("alpha", |h| {
        h.volumes.insert("app1-content".to_string(), GIB / 2);
        h.volumes.insert("db1-mysql-data".to_string(), GIB / 4);
    });
    Service { id, app, db }
}

#[test]
fn service_clone_copies_every_member_variable_and_volume() {
    let f = Fixture::new();
    let service = seed_service(&f);
    let target = f.store.find_host("beta").unwrap().unwrap();
    let destination = f.store.find_destination(target.id).unwrap().unwrap();

    let engine = CloneEngine::new(&f.store, &f.ids);
    let descriptor = Locator::new(&f.store).locate("blog", None).unwrap();
    let cloned = engine
        .clone_resource(&descriptor, &target, &destination, &CloneOptions::default())
        .unwrap();

    assert_eq!(cloned.kind, ResourceKind::Service);
    assert_eq!(cloned.uuid, "new001");
    assert_eq!(cloned.environment_variables, 3);

    let root = f.store.row("services", cloned.id.unwrap()).unwrap();
    assert_eq!(root["server_id"], Value::from(target.id));
    assert_eq!(root["destination_id"], Value::from(destination.id));
    assert_eq!(root["config_hash"], Value::Null);
    assert_eq!(root["description"], Value::from("blog description"));

    // Members are re-parented under the new service with fresh identifiers.
    let pairs: Vec<(&str, &str)> = cloned
        .sub_resources
        .iter()
        .map(|p| (p.old.as_str(), p.new.as_str()))
        .collect();
    assert_eq!(pairs, vec![("app1", "new003"), ("db1", "new005")]);
    let apps = f.store.rows("service_applications");
    assert_eq!(apps.len(), 2);
    let new_app = apps.iter().find(|r| r["uuid"] == Value::from("new003")).unwrap();
    assert_eq!(new_app["service_id"], Value::from(cloned.id.unwrap()));
    assert_eq!(new_app["name"], Value::from("ghost"));
    assert_eq!(new_app["fqdn"], Value::Null);
    assert_eq!(new_app["status"], Value::from("exited"));
    let dbs = f.store.rows("service_databases");
    assert_eq!(dbs.len(), 2);

    // Every variable is duplicated, none is moved.
    let env = f.store.rows(ENV_VARS_TABLE);
    assert_eq!(env.len(), 6);
    let keys_of = |uuid: &str| -> Vec<String> {
        env.iter()
            .filter(|r| r["uuid"] == Value::from(uuid))
            .map(|r| r["key"].as_str().unwrap().to_string())
            .collect()
    };
    assert_eq!(keys_of("new002"), vec!["SERVICE_FQDN_GHOST"]);
    assert_eq!(keys_of("new004"), vec!["url"]);
    assert_eq!(keys_of("new006"), vec!["MYSQL_PASSWORD"]);

    let targets: Vec<&str> = cloned.volumes.iter().map(|v| v.target.as_str()).collect();
    assert_eq!(targets, vec!["new003-content", "new005-mysql-data"]);
    let volume_names: Vec<String> = f
        .store
        .rows(VOLUMES_TABLE)
        .iter()
        .map(|r| r["name"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(
        volume_names,
        vec!["app1-content", "db1-mysql-data", "new003-content", "new005-mysql-data"]
    );

    // The source graph is untouched.
    let original = f.store.row("services", service.id).unwrap();
    assert_eq!(original["name"], Value::from("blog"));
    assert_eq!(original["uuid"], Value::from("svc1"));
    assert_eq!(
        f.store.row("service_applications", service.app).unwrap()["fqdn"],
        Value::from("https://ghost.example.com")
    );
    assert_eq!(
        f.store.row("service_databases", service.db).unwrap()["uuid"],
        Value::from("db1")
    );
}

#[test]
fn colliding_identifiers_are_redrawn() {
    let f = Fixture::new();
    seed_service(&f);
    let target = f.store.find_host("beta").unwrap().unwrap();
    let destination = f.store.find_destination(target.id).unwrap().unwrap();
    f.ids.queue(&["svc1", "svc1"]);

    let engine = CloneEngine::new(&f.store, &f.ids);
    let descriptor = Locator::new(&f.store).locate("svc1", None).unwrap();
    let cloned = engine
        .clone_resource(&descriptor, &target, &destination, &CloneOptions::default())
        .unwrap();

    assert_eq!(cloned.uuid, "new001");
    assert_eq!(f.store.rows("services").len(), 2);
}

#[test]
fn persistent_collisions_give_up_without_a_root_row() {
    let f = Fixture::new();
    seed_service(&f);
    let target = f.store.find_host("beta").unwrap().unwrap();
    let destination = f.store.find_destination(target.id).unwrap().unwrap();
    f.ids.queue(&["svc1"; 5]);

    let engine = CloneEngine::new(&f.store, &f.ids);
    let descriptor = Locator::new(&f.store).locate("blog", None).unwrap();
    let err = engine
        .clone_resource(&descriptor, &target, &destination, &CloneOptions::default())
        .unwrap_err();

    assert!(matches!(err, MigrationError::CloneFailure(_)));
    assert_eq!(f.store.rows("services").len(), 1);
    assert_eq!(f.ids.issued(), 0);
}

#[test]
fn moving_a_service_transfers_member_volumes() {
    let f = Fixture::new();
    let service = seed_service(&f);

    let report = f
        .migrator()
        .run_move(&MoveRequest {
            resource: "blog".to_string(),
            from: "alpha".to_string(),
            to: "beta".to_string(),
            options: MigrationOptions {
                expected: Some(ResourceKind::Service),
                ..Default::default()
            },
        })
        .unwrap();

    assert!(report.completed());
    assert_eq!(report.space.unwrap().total, GIB / 2 + GIB / 4);
    assert_eq!(report.transferred.len(), 2);
    assert!(f.shell.has_volume("beta", "new003-content"));
    assert!(f.shell.has_volume("beta", "new005-mysql-data"));
    assert_eq!(f.runner.calls().len(), 4);
    assert_eq!(
        f.store.row("services", service.id).unwrap()["name"],
        Value::from("blog-old")
    );
}

#[test]
fn soft_deleted_resources_are_invisible() {
    let f = Fixture::new();
    let service = seed_service(&f);
    f.store.soft_delete("services", service.id);

    let err = Locator::new(&f.store).locate("blog", None).unwrap_err();
    assert!(matches!(err, MigrationError::NotFound { .. }));
}

#[test]
fn member_volume_named_after_the_service_follows_the_clone() {
    let f = Fixture::new();
    let id = f.store.add_resource(ResourceKind::Service, "svc1", "blog", f.alpha);
    let app = f.store.add_sub_resource(SubResourceKind::Application, id, "app1", "ghost");
    f.store.add_volume(
        OwnerRef::sub(SubResourceKind::Application, app),
        "svc1_ghost-content",
        "/var/lib/ghost/content",
    );
    f.shell.with_host("alpha", |h| {
        h.volumes.insert("svc1_ghost-content".to_string(), GIB / 2);
    });

    let report = f
        .migrator()
        .run_move(&MoveRequest {
            resource: "svc1".to_string(),
            from: "alpha".to_string(),
            to: "beta".to_string(),
            options: MigrationOptions::default(),
        })
        .unwrap();

    assert!(report.completed());
    let cloned = report.clone.unwrap();
    assert_eq!(cloned.uuid, "new001");
    assert_eq!(cloned.volumes[0].target, "new001_ghost-content");
    assert!(f.shell.has_volume("beta", "new001_ghost-content"));
    let volume_names: Vec<String> = f
        .store
        .rows(VOLUMES_TABLE)
        .iter()
        .map(|r| r["name"].as_str().unwrap().to_string())
        .collect();
    assert_eq!(volume_names, vec!["svc1_ghost-content", "new001_ghost-content"]);
}
