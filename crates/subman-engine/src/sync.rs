//! Entitlement lifecycle: remote mutation followed by local reconciliation.
//!
//! Every mutating operation talks to the service first and then replaces the
//! local certificate set with the server's full list. Any failure of that
//! refresh after a successful mutation, fetching the list or writing the
//! store, is reported as [`SyncError::Reconciliation`]; nothing on the server
//! is rolled back.

use chrono::Utc;
use subman_core::errors::{RefreshFailure, SyncError};
use subman_core::register::{build_payload, Facts, DEFAULT_CONSUMER_NAME};
use subman_core::status::unentitled_products;
use subman_core::traits::{CertificateStore, EntitlementService, RefreshSummary};
use subman_core::types::{
    CertificateBundle, ConsumerIdentity, EntitlementGrant, InstalledProduct, Pool,
    SubscribeSelector,
};
use tracing::{debug, info, warn};

/// Result of one bind attempt inside a best-effort loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BindOutcome {
    pub product_id: String,
    /// Number of certificates issued, or the failure message.
    pub result: Result<usize, String>,
}

impl BindOutcome {
    pub fn is_ok(&self) -> bool {
        self.result.is_ok()
    }
}

/// What a registration produced.
#[derive(Debug)]
pub struct Registration {
    pub identity: ConsumerIdentity,
    pub auto_bind: Vec<BindOutcome>,
    pub refresh: RefreshSummary,
}

/// Outcome of a heal pass.
#[derive(Debug)]
pub struct HealReport {
    pub attempts: Vec<BindOutcome>,
    pub refresh: RefreshSummary,
}

pub struct SyncEngine<S, C> {
    service: S,
    store: C,
}

impl<S: EntitlementService, C: CertificateStore> SyncEngine<S, C> {
    pub fn new(service: S, store: C) -> Self {
        Self { service, store }
    }

    pub fn service(&self) -> &S {
        &self.service
    }

    pub fn store(&self) -> &C {
        &self.store
    }

    /// The persisted identity, or [`SyncError::NotRegistered`].
    pub fn require_identity(&self) -> Result<ConsumerIdentity, SyncError> {
        if !self.store.identity_exists() {
            return Err(SyncError::NotRegistered);
        }
        Ok(self.store.read_identity()?)
    }

    pub fn register(
        &self,
        username: &str,
        password: &str,
        facts: &Facts,
    ) -> Result<Registration, SyncError> {
        self.register_as(username, password, DEFAULT_CONSUMER_NAME, facts)
    }

    /// Create a consumer, persist it, then bind every installed product.
    ///
    /// Does not check for an existing identity; calling this twice creates
    /// two consumers on the server.
    pub fn register_as(
        &self,
        username: &str,
        password: &str,
        name: &str,
        facts: &Facts,
    ) -> Result<Registration, SyncError> {
        let payload = build_payload(name, facts);
        let identity = self.service.register_consumer(username, password, &payload)?;
        self.store.persist(&identity)?;
        info!(uuid = %identity.uuid, "registered consumer");

        let installed = match self.store.installed_products() {
            Ok(products) => products,
            Err(e) => {
                warn!(error = %e, "cannot enumerate installed products, skipping auto-bind");
                Vec::new()
            }
        };
        let auto_bind = self.bind_each(&identity, installed.iter());
        let refresh = self.reconcile_after("register", &identity)?;

        Ok(Registration {
            identity,
            auto_bind,
            refresh,
        })
    }

    pub fn subscribe(
        &self,
        consumer: &ConsumerIdentity,
        selector: &SubscribeSelector,
    ) -> Result<Vec<CertificateBundle>, SyncError> {
        match selector {
            SubscribeSelector::Product(id) => self.subscribe_by_product(consumer, id),
            SubscribeSelector::Token(token) => self.subscribe_by_token(consumer, token),
            SubscribeSelector::Pool(id) => self.subscribe_by_pool(consumer, id),
        }
    }

    pub fn subscribe_by_product(
        &self,
        consumer: &ConsumerIdentity,
        product_id: &str,
    ) -> Result<Vec<CertificateBundle>, SyncError> {
        let bundles = self.service.bind_by_product(&consumer.uuid, product_id)?;
        self.reconcile_after("subscribe", consumer)?;
        Ok(bundles)
    }

    pub fn subscribe_by_token(
        &self,
        consumer: &ConsumerIdentity,
        token: &str,
    ) -> Result<Vec<CertificateBundle>, SyncError> {
        let bundles = self.service.bind_by_reg_number(&consumer.uuid, token)?;
        self.reconcile_after("subscribe", consumer)?;
        Ok(bundles)
    }

    pub fn subscribe_by_pool(
        &self,
        consumer: &ConsumerIdentity,
        pool_id: &str,
    ) -> Result<Vec<CertificateBundle>, SyncError> {
        let bundles = self.service.bind_by_entitlement_pool(&consumer.uuid, pool_id)?;
        self.reconcile_after("subscribe", consumer)?;
        Ok(bundles)
    }

    /// Unbind the entitlement granting `product_id`.
    ///
    /// When several grants match, the last one in server order is unbound.
    /// No match is not an error: nothing is unbound and the store is left
    /// alone. Returns the unbound entitlement id.
    pub fn unsubscribe_product(
        &self,
        consumer: &ConsumerIdentity,
        product_id: &str,
    ) -> Result<Option<String>, SyncError> {
        let grants = self.service.get_entitlement_list(&consumer.uuid)?;
        let Some(entitlement_id) = last_match(&grants, product_id) else {
            debug!(product_id, "no entitlement for product, nothing to unsubscribe");
            return Ok(None);
        };
        let entitlement_id = entitlement_id.to_string();

        self.service
            .unbind_by_entitlement_id(&consumer.uuid, &entitlement_id)?;
        self.reconcile_after("unsubscribe", consumer)?;
        Ok(Some(entitlement_id))
    }

    pub fn unsubscribe_all(&self, consumer: &ConsumerIdentity) -> Result<RefreshSummary, SyncError> {
        self.service.unbind_all(&consumer.uuid)?;
        self.reconcile_after("unsubscribe", consumer)
    }

    /// Replace the local certificate set with the server's current list.
    pub fn reconcile(&self, consumer: &ConsumerIdentity) -> Result<RefreshSummary, SyncError> {
        self.refresh_from_server(consumer).map_err(|e| match e {
            RefreshFailure::Remote(e) => SyncError::Remote(e),
            RefreshFailure::Store(e) => SyncError::Store(e),
        })
    }

    fn refresh_from_server(
        &self,
        consumer: &ConsumerIdentity,
    ) -> Result<RefreshSummary, RefreshFailure> {
        let grants = self.service.get_entitlement_list(&consumer.uuid)?;
        let summary = self.store.refresh(&grants)?;
        debug!(
            removed = summary.removed,
            written = summary.written,
            "reconciled certificate store"
        );
        Ok(summary)
    }

    /// Bind installed products that lack a valid certificate, then reconcile.
    pub fn heal(&self, consumer: &ConsumerIdentity) -> Result<HealReport, SyncError> {
        let installed = self.store.installed_products()?;
        let certificates = self.store.certificates()?;
        let missing = unentitled_products(&installed, &certificates, Utc::now());
        let attempts = self.bind_each(consumer, missing.into_iter());
        let refresh = self.reconcile_after("heal", consumer)?;
        Ok(HealReport { attempts, refresh })
    }

    pub fn available_pools(&self, consumer: &ConsumerIdentity) -> Result<Vec<Pool>, SyncError> {
        Ok(self.service.get_pools(&consumer.uuid)?)
    }

    pub fn consumed(&self, consumer: &ConsumerIdentity) -> Result<Vec<EntitlementGrant>, SyncError> {
        Ok(self.service.get_entitlement_list(&consumer.uuid)?)
    }

    fn bind_each<'a>(
        &self,
        consumer: &ConsumerIdentity,
        products: impl Iterator<Item = &'a InstalledProduct>,
    ) -> Vec<BindOutcome> {
        products
            .map(|product| {
                let result = self
                    .service
                    .bind_by_product(&consumer.uuid, &product.id)
                    .map(|bundles| bundles.len())
                    .map_err(|e| {
                        warn!(product_id = %product.id, error = %e, "bind failed");
                        e.to_string()
                    });
                BindOutcome {
                    product_id: product.id.clone(),
                    result,
                }
            })
            .collect()
    }

    fn reconcile_after(
        &self,
        operation: &str,
        consumer: &ConsumerIdentity,
    ) -> Result<RefreshSummary, SyncError> {
        self.refresh_from_server(consumer)
            .map_err(|source| SyncError::Reconciliation {
                operation: operation.to_string(),
                source,
            })
    }
}

/// Entitlement id of the last grant for `product_id`, in server order.
///
/// Grants without a readable product id never match.
fn last_match<'a>(grants: &'a [EntitlementGrant], product_id: &str) -> Option<&'a str> {
    grants
        .iter()
        .rev()
        .find(|g| g.product_id() == Some(product_id))
        .map(|g| g.id.as_str())
}
