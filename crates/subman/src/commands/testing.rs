//! In-process entitlement service and host layout for handler tests.

use std::cell::RefCell;
use std::path::Path;

use clap::Parser;
use serde_json::{json, Value};
use subman_core::config::{PathsConfig, SubmanConfig};
use subman_core::errors::RemoteError;
use subman_core::traits::EntitlementService;
use subman_core::types::{CertificateBundle, ConsumerIdentity, EntitlementGrant, Pool};

use super::Context;

#[derive(Default)]
pub struct StubService {
    pub pools: Vec<Pool>,
    pub grants: Vec<EntitlementGrant>,
    pub calls: RefCell<Vec<String>>,
}

impl StubService {
    fn log(&self, call: String) {
        self.calls.borrow_mut().push(call);
    }
}

impl EntitlementService for StubService {
    fn register_consumer(
        &self,
        username: &str,
        _password: &str,
        payload: &Value,
    ) -> Result<ConsumerIdentity, RemoteError> {
        self.log("register".into());
        Ok(ConsumerIdentity {
            uuid: "c0ffee".into(),
            name: payload["name"].as_str().unwrap_or("admin").into(),
            user: username.into(),
        })
    }

    fn bind_by_product(
        &self,
        _consumer_id: &str,
        product_id: &str,
    ) -> Result<Vec<CertificateBundle>, RemoteError> {
        self.log(format!("bind product {product_id}"));
        Ok(vec![])
    }

    fn bind_by_reg_number(
        &self,
        _consumer_id: &str,
        token: &str,
    ) -> Result<Vec<CertificateBundle>, RemoteError> {
        self.log(format!("bind token {token}"));
        Ok(vec![])
    }

    fn bind_by_entitlement_pool(
        &self,
        _consumer_id: &str,
        pool_id: &str,
    ) -> Result<Vec<CertificateBundle>, RemoteError> {
        self.log(format!("bind pool {pool_id}"));
        Ok(vec![])
    }

    fn get_entitlement_list(&self, _consumer_id: &str) -> Result<Vec<EntitlementGrant>, RemoteError> {
        self.log("list".into());
        Ok(self.grants.clone())
    }

    fn unbind_by_entitlement_id(
        &self,
        _consumer_id: &str,
        entitlement_id: &str,
    ) -> Result<(), RemoteError> {
        self.log(format!("unbind {entitlement_id}"));
        Ok(())
    }

    fn unbind_all(&self, _consumer_id: &str) -> Result<(), RemoteError> {
        self.log("unbind_all".into());
        Ok(())
    }

    fn get_pools(&self, _consumer_id: &str) -> Result<Vec<Pool>, RemoteError> {
        self.log("pools".into());
        Ok(self.pools.clone())
    }
}

/// A context whose store lives under `root`.
pub fn context(root: &Path, service: StubService) -> Context<StubService> {
    let config = SubmanConfig {
        paths: PathsConfig {
            consumer_dir: root.join("consumer"),
            entitlement_dir: root.join("entitlement"),
            product_dir: root.join("product"),
        },
        ..SubmanConfig::default()
    };
    Context::new(config, service)
}

pub fn write_identity(root: &Path) {
    let dir = root.join("consumer");
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(
        dir.join("identity.json"),
        json!({"uuid": "c0ffee", "name": "admin", "user": "alice"}).to_string(),
    )
    .unwrap();
}

pub fn install_product(root: &Path, id: &str, name: &str) {
    let dir = root.join("product");
    std::fs::create_dir_all(&dir).unwrap();
    std::fs::write(
        dir.join(format!("{id}.json")),
        json!({"id": id, "name": name}).to_string(),
    )
    .unwrap();
}

pub fn pool(id: &str, product: &str) -> Pool {
    serde_json::from_value(json!({
        "id": id,
        "productId": product,
        "productName": format!("{product} Server"),
        "quantity": 10,
        "consumed": 2,
    }))
    .unwrap()
}

pub fn grant(id: &str, product: &str) -> EntitlementGrant {
    serde_json::from_value(json!({"id": id, "pool": {"id": "pool-1", "productId": product}}))
        .unwrap()
}

/// Run `C` directly against `ctx` and capture what it prints.
pub fn execute<C: super::Command>(
    args: &[&str],
    ctx: &Context<StubService>,
) -> anyhow::Result<String> {
    let options = C::Options::try_parse_from(std::iter::once(C::NAME).chain(args.iter().copied()))?;
    let mut out = Vec::new();
    C::execute(options, ctx, &mut out)?;
    Ok(String::from_utf8(out)?)
}
