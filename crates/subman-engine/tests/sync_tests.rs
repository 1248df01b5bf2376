//! Engine scenarios against the filesystem store and an in-memory service.

use std::cell::RefCell;
use std::path::Path;

use serde_json::{json, Value};
use subman_core::config::PathsConfig;
use subman_core::errors::{RemoteError, SyncError};
use subman_core::register::Facts;
use subman_core::traits::{CertificateStore, EntitlementService};
use subman_core::types::{CertificateBundle, ConsumerIdentity, EntitlementGrant, Pool};
use subman_engine::certd::{run_job, Job};
use subman_engine::store::FsCertStore;
use subman_engine::sync::SyncEngine;

/// Service double holding the server-side grant list.
#[derive(Default)]
struct ScriptedService {
    grants: RefCell<Vec<EntitlementGrant>>,
    calls: RefCell<Vec<String>>,
    reject_products: Vec<String>,
    next_serial: RefCell<u32>,
}

impl ScriptedService {
    fn with_grants(grants: Value) -> Self {
        Self {
            grants: RefCell::new(serde_json::from_value(grants).unwrap()),
            ..Self::default()
        }
    }

    fn calls(&self) -> Vec<String> {
        self.calls.borrow().clone()
    }

    fn count(&self, prefix: &str) -> usize {
        self.calls
            .borrow()
            .iter()
            .filter(|c| c.starts_with(prefix))
            .count()
    }

    fn grant_product(&self, product_id: &str) -> Vec<CertificateBundle> {
        let mut serial = self.next_serial.borrow_mut();
        *serial += 1;
        let grant: EntitlementGrant = serde_json::from_value(json!({
            "id": format!("ent-{serial}"),
            "pool": {"id": format!("pool-{product_id}"), "productId": product_id},
            "endDate": "2099-01-01T00:00:00Z",
            "certificates": [{
                "serial": format!("{}", 1000 + *serial),
                "cert": format!("CERT {product_id}"),
                "key": "KEY"
            }]
        }))
        .unwrap();
        let bundles = grant.certificates.clone();
        self.grants.borrow_mut().push(grant);
        bundles
    }
}

impl EntitlementService for ScriptedService {
    fn register_consumer(
        &self,
        username: &str,
        _password: &str,
        payload: &Value,
    ) -> Result<ConsumerIdentity, RemoteError> {
        self.calls.borrow_mut().push("register".into());
        Ok(ConsumerIdentity {
            uuid: "c0ffee".into(),
            name: payload["name"].as_str().unwrap_or_default().into(),
            user: username.into(),
        })
    }

    fn bind_by_product(
        &self,
        _consumer_id: &str,
        product_id: &str,
    ) -> Result<Vec<CertificateBundle>, RemoteError> {
        self.calls
            .borrow_mut()
            .push(format!("bind_product {product_id}"));
        if self.reject_products.iter().any(|p| p == product_id) {
            return Err(RemoteError::Rejected {
                status: 400,
                message: format!("no subscription for {product_id}"),
            });
        }
        Ok(self.grant_product(product_id))
    }

    fn bind_by_reg_number(
        &self,
        _consumer_id: &str,
        token: &str,
    ) -> Result<Vec<CertificateBundle>, RemoteError> {
        self.calls.borrow_mut().push(format!("bind_token {token}"));
        Ok(self.grant_product("token-bundle"))
    }

    fn bind_by_entitlement_pool(
        &self,
        _consumer_id: &str,
        pool_id: &str,
    ) -> Result<Vec<CertificateBundle>, RemoteError> {
        self.calls.borrow_mut().push(format!("bind_pool {pool_id}"));
        Err(RemoteError::Rejected {
            status: 404,
            message: format!("pool {pool_id} not found"),
        })
    }

    fn get_entitlement_list(&self, _consumer_id: &str) -> Result<Vec<EntitlementGrant>, RemoteError> {
        self.calls.borrow_mut().push("list".into());
        Ok(self.grants.borrow().clone())
    }

    fn unbind_by_entitlement_id(
        &self,
        _consumer_id: &str,
        entitlement_id: &str,
    ) -> Result<(), RemoteError> {
        self.calls
            .borrow_mut()
            .push(format!("unbind {entitlement_id}"));
        self.grants.borrow_mut().retain(|g| g.id != entitlement_id);
        Ok(())
    }

    fn unbind_all(&self, _consumer_id: &str) -> Result<(), RemoteError> {
        self.calls.borrow_mut().push("unbind_all".into());
        self.grants.borrow_mut().clear();
        Ok(())
    }

    fn get_pools(&self, _consumer_id: &str) -> Result<Vec<Pool>, RemoteError> {
        self.calls.borrow_mut().push("pools".into());
        Ok(vec![])
    }
}

fn paths(root: &Path) -> PathsConfig {
    PathsConfig {
        consumer_dir: root.join("consumer"),
        entitlement_dir: root.join("entitlement"),
        product_dir: root.join("product"),
    }
}

fn install_products(root: &Path, ids: &[&str]) {
    let dir = root.join("product");
    std::fs::create_dir_all(&dir).unwrap();
    for id in ids {
        std::fs::write(
            dir.join(format!("{id}.json")),
            json!({"id": id, "name": format!("Product {id}")}).to_string(),
        )
        .unwrap();
    }
}

fn consumer() -> ConsumerIdentity {
    ConsumerIdentity {
        uuid: "c0ffee".into(),
        name: "admin".into(),
        user: "alice".into(),
    }
}

fn dir_snapshot(dir: &Path) -> Vec<(String, Vec<u8>)> {
    let mut files: Vec<_> = std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap())
        .filter(|e| !e.file_name().to_string_lossy().starts_with('.'))
        .map(|e| {
            (
                e.file_name().to_string_lossy().to_string(),
                std::fs::read(e.path()).unwrap(),
            )
        })
        .collect();
    files.sort();
    files
}

fn grant_json(id: &str, product: Value, serial: u32) -> Value {
    json!({
        "id": id,
        "pool": {"id": format!("pool-{id}"), "productId": product},
        "certificates": [{"serial": serial, "cert": format!("CERT {id}"), "key": "KEY"}]
    })
}

#[test]
fn reconcile_twice_yields_identical_store() {
    let tmp = tempfile::tempdir().unwrap();
    let service = ScriptedService::with_grants(json!([
        grant_json("e1", json!("X"), 11),
        grant_json("e2", json!("Y"), 12),
    ]));
    let engine = SyncEngine::new(service, FsCertStore::new(&paths(tmp.path())));

    engine.reconcile(&consumer()).unwrap();
    let first = dir_snapshot(&tmp.path().join("entitlement"));
    let summary = engine.reconcile(&consumer()).unwrap();
    let second = dir_snapshot(&tmp.path().join("entitlement"));

    assert_eq!(first, second);
    assert_eq!(summary.removed, 2);
    assert_eq!(summary.written, 2);
    assert_eq!(engine.store().certificates().unwrap().len(), 2);
}

#[test]
fn register_with_partial_auto_bind_failure_succeeds() {
    let tmp = tempfile::tempdir().unwrap();
    install_products(tmp.path(), &["p1", "p2", "p3"]);
    let service = ScriptedService {
        reject_products: vec!["p2".into()],
        ..ScriptedService::default()
    };
    let engine = SyncEngine::new(service, FsCertStore::new(&paths(tmp.path())));

    let reg = engine.register("alice", "secret", &Facts::new()).unwrap();

    assert_eq!(engine.service().count("bind_product"), 3);
    let failed: Vec<_> = reg
        .auto_bind
        .iter()
        .filter(|o| !o.is_ok())
        .map(|o| o.product_id.as_str())
        .collect();
    assert_eq!(failed, vec!["p2"]);
    assert_eq!(reg.refresh.written, 2);
    assert!(engine.store().identity_exists());
    assert_eq!(engine.require_identity().unwrap().uuid, "c0ffee");
}

#[test]
fn unsubscribe_unknown_product_makes_no_unbind_call() {
    let tmp = tempfile::tempdir().unwrap();
    let service = ScriptedService::with_grants(json!([grant_json("e1", json!("Y"), 1)]));
    let engine = SyncEngine::new(service, FsCertStore::new(&paths(tmp.path())));

    assert_eq!(engine.unsubscribe_product(&consumer(), "X").unwrap(), None);
    assert_eq!(engine.service().count("unbind"), 0);
}

#[test]
fn unsubscribe_duplicate_product_unbinds_last() {
    let tmp = tempfile::tempdir().unwrap();
    let service = ScriptedService::with_grants(json!([
        grant_json("e1", json!("X"), 1),
        grant_json("e2", json!("X"), 2),
    ]));
    let engine = SyncEngine::new(service, FsCertStore::new(&paths(tmp.path())));

    let unbound = engine.unsubscribe_product(&consumer(), "X").unwrap();
    assert_eq!(unbound.as_deref(), Some("e2"));

    let serials: Vec<_> = engine
        .store()
        .certificates()
        .unwrap()
        .into_iter()
        .map(|c| c.serial)
        .collect();
    assert_eq!(serials, vec!["1"]);
}

#[test]
fn malformed_product_ids_are_skipped() {
    let tmp = tempfile::tempdir().unwrap();
    let service = ScriptedService::with_grants(json!([
        grant_json("e1", json!(7), 1),
        {"id": "e2", "pool": {"id": "p"}},
        grant_json("e3", json!("X"), 3),
    ]));
    let engine = SyncEngine::new(service, FsCertStore::new(&paths(tmp.path())));

    let unbound = engine.unsubscribe_product(&consumer(), "X").unwrap();
    assert_eq!(unbound.as_deref(), Some("e3"));
    assert_eq!(engine.unsubscribe_product(&consumer(), "7").unwrap(), None);
}

#[test]
fn refresh_failure_after_unbind_keeps_server_change() {
    let tmp = tempfile::tempdir().unwrap();
    let mut p = paths(tmp.path());
    // a regular file where the directory should be
    p.entitlement_dir = tmp.path().join("not-a-dir");
    std::fs::write(&p.entitlement_dir, b"").unwrap();

    let service = ScriptedService::with_grants(json!([grant_json("e1", json!("X"), 1)]));
    let engine = SyncEngine::new(service, FsCertStore::new(&p));

    let err = engine.unsubscribe_product(&consumer(), "X").unwrap_err();
    assert!(matches!(err, SyncError::Reconciliation { .. }));
    assert_eq!(err.exit_code(), 1);
    assert!(err.to_string().contains("stale"));
    assert!(engine.service().calls().contains(&"unbind e1".to_string()));
    assert!(engine.consumed(&consumer()).unwrap().is_empty());
}

#[test]
fn subscribe_remote_rejection_propagates() {
    let tmp = tempfile::tempdir().unwrap();
    let engine = SyncEngine::new(
        ScriptedService::default(),
        FsCertStore::new(&paths(tmp.path())),
    );

    let err = engine.subscribe_by_pool(&consumer(), "missing").unwrap_err();
    assert!(matches!(err, SyncError::Remote(_)));
    assert_eq!(engine.service().count("list"), 0);
}

#[test]
fn subscribe_then_unsubscribe_all_empties_store() {
    let tmp = tempfile::tempdir().unwrap();
    let engine = SyncEngine::new(
        ScriptedService::default(),
        FsCertStore::new(&paths(tmp.path())),
    );

    engine.subscribe_by_token(&consumer(), "TOKEN").unwrap();
    assert_eq!(engine.store().certificates().unwrap().len(), 1);

    engine.unsubscribe_all(&consumer()).unwrap();
    assert!(engine.store().certificates().unwrap().is_empty());
}

#[test]
fn heal_binds_only_missing_products() {
    let tmp = tempfile::tempdir().unwrap();
    install_products(tmp.path(), &["a", "b"]);
    let engine = SyncEngine::new(
        ScriptedService::default(),
        FsCertStore::new(&paths(tmp.path())),
    );
    let c = consumer();

    engine.subscribe_by_product(&c, "a").unwrap();
    let report = engine.heal(&c).unwrap();

    let healed: Vec<_> = report.attempts.iter().map(|a| a.product_id.as_str()).collect();
    assert_eq!(healed, vec!["b"]);
    assert_eq!(engine.store().certificates().unwrap().len(), 2);
}

#[test]
fn daemon_job_requires_registration() {
    let tmp = tempfile::tempdir().unwrap();
    let engine = SyncEngine::new(
        ScriptedService::default(),
        FsCertStore::new(&paths(tmp.path())),
    );

    assert!(matches!(
        run_job(&engine, Job::Cert),
        Err(SyncError::NotRegistered)
    ));
    assert!(engine.service().calls().is_empty());

    engine.store().persist(&consumer()).unwrap();
    run_job(&engine, Job::Cert).unwrap();
    run_job(&engine, Job::Heal).unwrap();
}
