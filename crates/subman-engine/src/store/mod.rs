//! Filesystem certificate store.
//!
//! Layout:
//! - `consumer_dir/identity.json`: the consumer identity record
//! - `entitlement_dir/<serial>.pem`, `<serial>-key.pem`, `<serial>.json`
//! - `product_dir/<id>.json`: installed product descriptors

pub mod atomic;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use subman_core::config::PathsConfig;
use subman_core::errors::StoreError;
use subman_core::traits::{CertificateStore, RefreshSummary};
use subman_core::types::{Certificate, ConsumerIdentity, EntitlementGrant, InstalledProduct};
use tracing::{debug, warn};

use self::atomic::{atomic_write, AdvisoryLock};

const IDENTITY_FILE: &str = "identity.json";
const REFRESH_LOCK: &str = ".refresh.lock";
const REFRESH_LOCK_STALE: Duration = Duration::from_secs(60);

pub struct FsCertStore {
    consumer_dir: PathBuf,
    entitlement_dir: PathBuf,
    product_dir: PathBuf,
}

impl FsCertStore {
    pub fn new(paths: &PathsConfig) -> Self {
        Self {
            consumer_dir: paths.consumer_dir.clone(),
            entitlement_dir: paths.entitlement_dir.clone(),
            product_dir: paths.product_dir.clone(),
        }
    }

    fn identity_path(&self) -> PathBuf {
        self.consumer_dir.join(IDENTITY_FILE)
    }
}

impl CertificateStore for FsCertStore {
    fn identity_exists(&self) -> bool {
        self.identity_path().is_file()
    }

    fn read_identity(&self) -> Result<ConsumerIdentity, StoreError> {
        let path = self.identity_path();
        let content = std::fs::read_to_string(&path).map_err(|e| StoreError::io(&path, e))?;
        serde_json::from_str(&content).map_err(|source| StoreError::Corrupt { path, source })
    }

    fn persist(&self, consumer: &ConsumerIdentity) -> Result<(), StoreError> {
        std::fs::create_dir_all(&self.consumer_dir)
            .map_err(|e| StoreError::io(&self.consumer_dir, e))?;
        let json = serde_json::to_string_pretty(consumer).map_err(|source| StoreError::Corrupt {
            path: self.identity_path(),
            source,
        })?;
        atomic_write(&self.identity_path(), json.as_bytes())?;
        debug!(uuid = %consumer.uuid, "persisted consumer identity");
        Ok(())
    }

    /// Lock → build target set → delete everything → write everything.
    fn refresh(&self, grants: &[EntitlementGrant]) -> Result<RefreshSummary, StoreError> {
        let dir = &self.entitlement_dir;
        std::fs::create_dir_all(dir).map_err(|e| StoreError::io(dir, e))?;
        let _lock = AdvisoryLock::acquire(&dir.join(REFRESH_LOCK), Some(REFRESH_LOCK_STALE))?;

        let target = target_set(grants)?;
        let removed = remove_managed_files(dir)?;
        for cert in target.values() {
            write_certificate(dir, cert)?;
        }

        debug!(removed, written = target.len(), dir = %dir.display(), "refreshed entitlement certificates");
        Ok(RefreshSummary {
            removed,
            written: target.len(),
        })
    }

    fn certificates(&self) -> Result<Vec<Certificate>, StoreError> {
        let mut certs = Vec::new();
        for path in json_files(&self.entitlement_dir)? {
            let content = std::fs::read_to_string(&path).map_err(|e| StoreError::io(&path, e))?;
            let mut cert: Certificate = serde_json::from_str(&content)
                .map_err(|source| StoreError::Corrupt {
                    path: path.clone(),
                    source,
                })?;
            let pem = cert_path(&self.entitlement_dir, &cert.serial);
            cert.content = std::fs::read(&pem).map_err(|e| StoreError::io(&pem, e))?;
            cert.key =
                std::fs::read(key_path(&self.entitlement_dir, &cert.serial)).unwrap_or_default();
            certs.push(cert);
        }
        certs.sort_by(|a, b| a.serial.cmp(&b.serial));
        Ok(certs)
    }

    fn installed_products(&self) -> Result<Vec<InstalledProduct>, StoreError> {
        let mut products = Vec::new();
        for path in json_files(&self.product_dir)? {
            match load_product(&path) {
                Ok(product) => products.push(product),
                Err(e) => warn!("skip {}: {e}", path.display()),
            }
        }
        Ok(products)
    }
}

/// Every certificate carried by `grants`, keyed by serial.
fn target_set(grants: &[EntitlementGrant]) -> Result<BTreeMap<String, Certificate>, StoreError> {
    let mut target = BTreeMap::new();
    for grant in grants {
        for bundle in &grant.certificates {
            if !is_safe_serial(&bundle.serial) {
                return Err(StoreError::Other(anyhow::anyhow!(
                    "entitlement {} carries unusable certificate serial {:?}",
                    grant.id,
                    bundle.serial
                )));
            }
            target
                .entry(bundle.serial.clone())
                .or_insert_with(|| Certificate::from_grant(grant, bundle));
        }
    }
    Ok(target)
}

fn is_safe_serial(serial: &str) -> bool {
    !serial.is_empty()
        && !serial.starts_with('.')
        && serial
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

/// Remove certificate, key, and sidecar files. Returns the number of certificates removed.
fn remove_managed_files(dir: &Path) -> Result<usize, StoreError> {
    let mut removed = 0;
    let entries = std::fs::read_dir(dir).map_err(|e| StoreError::io(dir, e))?;
    for entry in entries.filter_map(|e| e.ok()) {
        let path = entry.path();
        let hidden = entry.file_name().to_string_lossy().starts_with('.');
        let managed = path
            .extension()
            .is_some_and(|ext| ext == "pem" || ext == "json");
        if hidden || !managed || !path.is_file() {
            continue;
        }
        std::fs::remove_file(&path).map_err(|e| StoreError::io(&path, e))?;
        if path.extension().is_some_and(|ext| ext == "json") {
            removed += 1;
        }
    }
    Ok(removed)
}

/// Sidecar goes last so a half-written certificate is never enumerated.
fn write_certificate(dir: &Path, cert: &Certificate) -> Result<(), StoreError> {
    atomic_write(&cert_path(dir, &cert.serial), &cert.content)?;
    if !cert.key.is_empty() {
        atomic_write(&key_path(dir, &cert.serial), &cert.key)?;
    }
    let sidecar = dir.join(format!("{}.json", cert.serial));
    let json = serde_json::to_string_pretty(cert).map_err(|source| StoreError::Corrupt {
        path: sidecar.clone(),
        source,
    })?;
    atomic_write(&sidecar, json.as_bytes())?;
    Ok(())
}

fn cert_path(dir: &Path, serial: &str) -> PathBuf {
    dir.join(format!("{serial}.pem"))
}

fn key_path(dir: &Path, serial: &str) -> PathBuf {
    dir.join(format!("{serial}-key.pem"))
}

/// Visible `.json` files in `dir`, sorted. A missing directory is empty.
fn json_files(dir: &Path) -> Result<Vec<PathBuf>, StoreError> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let entries = std::fs::read_dir(dir).map_err(|e| StoreError::io(dir, e))?;
    let mut paths: Vec<PathBuf> = entries
        .filter_map(|e| e.ok())
        .filter(|e| !e.file_name().to_string_lossy().starts_with('.'))
        .map(|e| e.path())
        .filter(|p| p.is_file() && p.extension().is_some_and(|ext| ext == "json"))
        .collect();
    paths.sort();
    Ok(paths)
}

fn load_product(path: &Path) -> anyhow::Result<InstalledProduct> {
    use anyhow::Context;
    let content =
        std::fs::read_to_string(path).with_context(|| format!("cannot read {}", path.display()))?;
    let mut product: InstalledProduct = serde_json::from_str(&content)
        .with_context(|| format!("{}: invalid product descriptor", path.display()))?;
    if product.name.is_empty() {
        product.name = product.id.clone();
    }
    Ok(product)
}
